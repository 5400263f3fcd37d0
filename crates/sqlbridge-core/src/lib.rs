//! Core types and traits for sqlbridge.
//!
//! This crate defines the contract between the session facade and the
//! concrete database drivers:
//!
//! - `Driver` trait: the operation set every backend must implement
//! - `DriverFactory` trait: named constructors with a runtime support probe
//! - `ConnectionSettings`: explicit configuration passed at construction
//! - `Value`, `Row`, `ColumnMeta`: result materialization types
//! - `QueryClass`: leading-keyword statement classification
//!
//! Driver-level failures never cross the trait boundary as panics or `Err`
//! returns: drivers record a structured [`DriverError`] and hand back a
//! failure sentinel, which the facade inspects after every call.

pub mod classify;
pub mod driver;
pub mod error;
pub mod row;
pub mod settings;
pub mod value;
pub mod version;

pub use classify::{QueryClass, classify, is_insert_or_replace};
pub use driver::{Capability, Driver, DriverFactory, QueryValue, default_capability};
pub use error::{
    ConnectionError, ConnectionErrorKind, DriverError, DriverErrorKind, Error, QueryError, Result,
};
pub use row::{ColumnInfo, ColumnMeta, Row};
pub use settings::{ConnectionSettings, ResolvedTls, TlsOptions};
pub use value::Value;
pub use version::{ServerVersion, canonical_version, version_at_least};
