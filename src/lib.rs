pub mod aggregate;
pub mod cli;
pub mod config;
pub mod export;
pub mod loader;
pub mod logging;
pub mod nutrients;
pub mod pipeline;
pub mod search;
