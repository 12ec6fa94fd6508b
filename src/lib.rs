pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod observability;
pub mod relay;
pub mod server;
