pub mod client;
pub mod logging;
pub mod sse;
pub mod stream_client;
