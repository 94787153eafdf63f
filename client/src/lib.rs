//! Roam Client - HTTP collaborator for the Roam engine.
//!
//! Provides the `reqwest`-backed [`HttpRemote`] that engine stores call for
//! every network operation, plus environment-driven [`Config`].

pub mod config;
pub mod http;

pub use config::{Config, ConfigError};
pub use http::{status_error, HttpRemote};
