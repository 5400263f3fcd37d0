//! Pluggable database-access layer with runtime driver selection.
//!
//! [`Session`] is the entry point: it resolves a driver through the
//! [`DriverRegistry`], connects with charset and SQL-mode negotiation,
//! classifies statements to collect the right result metadata, and
//! transparently reconnects when the server goes away.
//!
//! ```no_run
//! use sqlbridge::{ConnectionSettings, DriverRegistry, Session};
//!
//! # fn main() -> sqlbridge::Result<()> {
//! let settings = ConnectionSettings::new("app", "secret", "app_db", "127.0.0.1:3306");
//! let mut session = Session::initialize(settings, DriverRegistry::builtin())?;
//! session.query("SELECT id, name FROM users")?;
//! for row in session.last_result() {
//!     let _ = row.get_by_name("name");
//! }
//! # Ok(())
//! # }
//! ```

pub mod registry;
pub mod session;

pub use registry::{DEFAULT_DRIVER, DriverRegistry};
pub use session::{DbError, LoggedError, SavedQuery, Session, SessionState};

pub use sqlbridge_core::{
    Capability, ColumnInfo, ColumnMeta, ConnectionError, ConnectionErrorKind, ConnectionSettings,
    Driver, DriverError, DriverErrorKind, DriverFactory, Error, QueryClass, QueryValue, Result,
    Row, TlsOptions, Value, classify, is_insert_or_replace,
};
pub use sqlbridge_mysql::{MysqlDriver, MysqlDriverFactory};
