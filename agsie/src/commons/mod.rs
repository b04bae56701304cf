pub mod basic_functions;
pub mod config;
pub mod host_limiter;
pub mod retry;
