//! Error types for sqlbridge operations.

use std::fmt;

/// The primary error type surfaced to callers of the facade.
///
/// Only two conditions are ever fatal (returned as `Err` when bailing is
/// permitted): no usable driver at startup, and reconnect exhaustion.
/// Everything else is reported through failure sentinels plus a recorded
/// [`DriverError`].
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, disconnect, reconnect exhaustion)
    Connection(ConnectionError),
    /// Query execution errors
    Query(QueryError),
    /// No registered driver passed its support probe
    NoDriver(String),
    /// I/O errors
    Io(std::io::Error),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Authentication failed
    Authentication,
    /// Connection lost during operation
    Disconnected,
    /// SSL/TLS negotiation failed
    Ssl,
    /// Connection refused
    Refused,
    /// Could not switch to the target database
    SelectDatabase,
    /// Bounded reconnect attempts were exhausted
    ReconnectExhausted,
}

#[derive(Debug)]
pub struct QueryError {
    pub message: String,
    pub code: Option<u16>,
    pub sqlstate: Option<String>,
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// A failure recorded by a driver.
///
/// Drivers never raise across the [`Driver`](crate::Driver) boundary; they
/// store the most recent failure here and return a sentinel. The facade
/// reads it back to distinguish "never connected", "lost connection", and
/// plain execution errors without string matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    /// Backend error code, when the server reported one
    pub code: Option<u16>,
    /// Five-character SQLSTATE, when available
    pub sqlstate: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// No connection has been established
    NotConnected,
    /// The connection existed but was severed ("server has gone away")
    ConnectionLost,
    /// The connection attempt itself failed
    Connect,
    /// Authentication handshake failed
    Authentication,
    /// The statement was rejected or failed at runtime
    Execution,
    /// The target database could not be selected
    SelectDatabase,
}

impl DriverError {
    /// Build a plain execution error with just a message.
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Execution,
            code: None,
            sqlstate: None,
            message: message.into(),
        }
    }

    /// Build an error of the given kind with just a message.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            sqlstate: None,
            message: message.into(),
        }
    }

    /// Whether this failure means the connection is no longer usable.
    pub fn is_lost_connection(&self) -> bool {
        matches!(
            self.kind,
            DriverErrorKind::ConnectionLost | DriverErrorKind::NotConnected
        )
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, &self.sqlstate) {
            (Some(code), Some(state)) => {
                write!(f, "{} ({}, SQLSTATE {})", self.message, code, state)
            }
            (Some(code), None) => write!(f, "{} ({})", self.message, code),
            _ => write!(f, "{}", self.message),
        }
    }
}

impl Error {
    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => !matches!(c.kind, ConnectionErrorKind::SelectDatabase),
            Error::Io(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::NoDriver(msg) => write!(f, "No database drivers found: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Self {
        match err.kind {
            DriverErrorKind::Execution => Error::Query(QueryError {
                message: err.message,
                code: err.code,
                sqlstate: err.sqlstate,
                sql: None,
                source: None,
            }),
            DriverErrorKind::Authentication => Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Authentication,
                message: err.message,
                source: None,
            }),
            DriverErrorKind::SelectDatabase => Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::SelectDatabase,
                message: err.message,
                source: None,
            }),
            DriverErrorKind::ConnectionLost => Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Disconnected,
                message: err.message,
                source: None,
            }),
            DriverErrorKind::NotConnected | DriverErrorKind::Connect => {
                Error::Connection(ConnectionError {
                    kind: ConnectionErrorKind::Connect,
                    message: err.message,
                    source: None,
                })
            }
        }
    }
}

/// Result type alias for sqlbridge operations.
pub type Result<T> = std::result::Result<T, Error>;
