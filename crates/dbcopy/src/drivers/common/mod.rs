//! Utilities shared by the drivers.
//!
//! - [`tls`]: `sslmode` handling and connectors for PostgreSQL

pub mod tls;

pub use tls::{split_ssl_mode, Connector, SslMode};
