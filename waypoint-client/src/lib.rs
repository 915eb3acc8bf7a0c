//! Client library for the Waypoint server API.
//!
//! This crate provides:
//! - TLS connection setup that waits until the server connection is ready
//! - Static token authentication and protocol version headers on every call
//! - Typed operations for projects, users and tokens, OIDC auth methods,
//!   and runner profiles
//!
//! ```no_run
//! # async fn run() -> waypoint_client::Result<()> {
//! use waypoint_client::{ClientConfig, UserRef, WaypointClient};
//!
//! let config = ClientConfig::new("localhost:9701", "token").insecure();
//! let client = WaypointClient::connect(config).await?;
//! let user = client.get_user(&UserRef::username("alice")).await?;
//! println!("{}", user.id);
//! client.close();
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
mod connector;
mod error;
pub mod interceptor;
mod oidc;
mod runner_profile;
mod user;

pub use client::{RawClient, Waypoint, WaypointClient};
pub use config::{ClientConfig, ConfigError, TlsSettings};
pub use connector::ConnectionState;
pub use error::Error;
pub use interceptor::{ProtocolHeaders, current_version};
pub use oidc::{AuthMethodConfig, OidcConfig};
pub use runner_profile::{ConfigFormat, RunnerConfig, RunnerTarget};
pub use user::UserRef;

pub use waypoint_proto as proto;

pub type Result<T, E = Error> = std::result::Result<T, E>;
