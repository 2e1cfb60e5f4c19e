pub mod api;
pub mod changes;
pub mod config;
pub mod engine;
#[cfg(test)]
pub mod test_support;
pub mod types;
pub mod util;
pub mod workspace;
