//! The driver contract.
//!
//! Every backend implements [`Driver`]; the session facade only ever talks
//! to `Box<dyn Driver>`. Failure reporting is sentinel-based: operations
//! return `bool` / `Option` and record the most recent failure where
//! [`Driver::last_error`] can retrieve it. Panicking or returning `Err`
//! across this boundary is not part of the contract.

use crate::error::DriverError;
use crate::row::{ColumnMeta, Row};
use crate::settings::TlsOptions;
use crate::value::Value;
use crate::version::version_at_least;

/// Feature probes the facade asks drivers about before relying on
/// server-side behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Per-connection collation support
    Collation,
    /// GROUP_CONCAT aggregate
    GroupConcat,
    /// Subquery support
    Subqueries,
    /// Native charset negotiation (rather than SET NAMES)
    SetCharset,
    /// Full utf8mb4 character set
    Utf8mb4,
}

/// The default capability table, keyed on server version alone.
///
/// Drivers with more context (client library version, collation probes)
/// override [`Driver::has_cap`] and refine this answer.
pub fn default_capability(server_version: &str, cap: Capability) -> bool {
    match cap {
        Capability::Collation | Capability::GroupConcat | Capability::Subqueries => {
            version_at_least(server_version, "4.1")
        }
        Capability::SetCharset => version_at_least(server_version, "5.0.7"),
        Capability::Utf8mb4 => version_at_least(server_version, "5.5.3"),
    }
}

/// What a successful statement produced, by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryValue {
    /// A schema-changing statement succeeded
    Ddl,
    /// A write statement succeeded, affecting this many rows
    Affected(u64),
    /// A read statement succeeded, returning this many rows
    Rows(usize),
    /// Some other statement succeeded
    Other,
}

/// Operations every database backend must provide.
///
/// Connection-shaped failures are reported by returning `false` / `None`
/// and recording a [`DriverError`]; callers check [`Driver::last_error`]
/// when they need the cause.
pub trait Driver: Send {
    /// Establish a connection.
    ///
    /// Idempotent: returns `true` immediately when a live connection
    /// already exists. `port_or_socket` is either a numeric port or a
    /// socket path ending in `.sock`.
    fn connect(
        &mut self,
        host: &str,
        user: &str,
        password: &str,
        port_or_socket: &str,
        tls: &TlsOptions,
    ) -> bool;

    /// Whether a connection is currently believed live.
    ///
    /// This is local state only; use [`Driver::ping`] to actually probe
    /// the server.
    fn is_connected(&self) -> bool;

    /// Escape a string for interpolation into a statement, without
    /// surrounding quotes.
    fn escape(&mut self, text: &str) -> String;

    /// Switch the connection to the given database.
    fn select_db(&mut self, database: &str) -> bool;

    /// Run a statement. `None` means failure; the cause is recorded in
    /// [`Driver::last_error`].
    fn query(&mut self, sql: &str) -> Option<QueryValue>;

    /// One cell from the most recent result set, by row and column index.
    fn query_result(&mut self, row: usize, field: usize) -> Option<Value>;

    /// Rows affected by the most recent write statement.
    fn affected_rows(&self) -> u64;

    /// Auto-increment id generated by the most recent insert.
    fn insert_id(&self) -> u64;

    /// All rows of the most recent result set. Memoized per statement.
    fn get_results(&mut self) -> &[Row];

    /// Column metadata for the most recent result set. Memoized per
    /// statement.
    fn load_col_info(&mut self) -> &[ColumnMeta];

    /// The server version string, canonicalized to its numeric part.
    /// `None` before the first successful connection.
    fn db_version(&self) -> Option<String>;

    /// Probe a capability against the connected server.
    fn has_cap(&self, cap: Capability) -> bool {
        match self.db_version() {
            Some(version) => default_capability(&version, cap),
            None => false,
        }
    }

    /// Negotiate connection character set, and collation when given.
    fn set_charset(&mut self, charset: &str, collation: Option<&str>) -> bool;

    /// Drop cached result state and the recorded error.
    fn flush(&mut self);

    /// Close the connection. Returns `false` when there was nothing to
    /// close.
    fn close(&mut self) -> bool;

    /// Probe whether the server is still reachable on this connection.
    fn ping(&mut self) -> bool;

    /// The most recent recorded failure, if any.
    fn last_error(&self) -> Option<&DriverError>;

    /// Human-readable form of the most recent failure.
    fn error_message(&self) -> Option<String> {
        self.last_error().map(ToString::to_string)
    }
}

/// Named driver constructors with a runtime support probe.
///
/// Registered factories are consulted in order at startup; the first one
/// whose [`DriverFactory::is_supported`] returns `true` wins unless an
/// explicit override names another supported factory.
pub trait DriverFactory: Send + Sync {
    /// Registry key, e.g. `"mysql"`.
    fn name(&self) -> &str;

    /// Whether this driver can run in the current environment.
    fn is_supported(&self) -> bool;

    /// Construct a fresh, unconnected driver.
    fn create(&self) -> Box<dyn Driver>;
}
