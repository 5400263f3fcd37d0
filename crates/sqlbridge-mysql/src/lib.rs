//! MySQL backend for sqlbridge.
//!
//! A synchronous, pure-Rust implementation of the MySQL client protocol:
//! handshake v10, `mysql_native_password` and `caching_sha2_password`
//! authentication, the text query protocol, and optional TLS behind the
//! `tls` feature.
//!
//! The public surface is [`MysqlDriver`] and [`MysqlDriverFactory`]; the
//! lower layers are exposed for integration tooling.

pub mod auth;
pub mod client;
pub mod driver;
pub mod protocol;
#[cfg(feature = "tls")]
pub mod tls;

pub use client::{CLIENT_VERSION, QueryOutput, RawClient, TextResultSet, quote};
pub use driver::{MysqlDriver, MysqlDriverFactory};
