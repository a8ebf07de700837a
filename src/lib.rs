pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod forwarding;
pub mod jump;
pub mod ssh;
pub mod transfer;
pub mod utils;

pub use cli::Cli;
pub use client::Client;
pub use config::Config;
pub use error::{Error, Result};
pub use executor::OutputHandlers;
pub use jump::{ChainSpec, HopConfig, LogicalTransport};
pub use ssh::{Endpoint, ExitStatus, HostVerification, RusshProvider};
