//! The session facade.
//!
//! A `Session` owns one driver, negotiates charset and SQL mode after
//! connecting, classifies statements to decide what result metadata to
//! collect, and recovers from dropped connections with bounded retries.
//!
//! Failure policy: only two conditions are fatal (`Err`) when bailing is
//! allowed, a missing driver at startup and reconnect exhaustion. All
//! other failures return a sentinel (`Ok(None)` / `false`) with the cause
//! retrievable through [`Session::error`] and [`Session::last_error`].

use std::borrow::Cow;
use std::thread;
use std::time::{Duration, Instant};

use sqlbridge_core::{
    Capability, ColumnMeta, ConnectionError, ConnectionErrorKind, ConnectionSettings, Driver,
    Error, QueryClass, QueryValue, Result, Row, classify, is_insert_or_replace,
};

use crate::registry::{DEFAULT_DRIVER, DriverRegistry};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No driver resolved yet (or driver resolution failed)
    Uninitialized,
    /// Connection attempt in progress
    Connecting,
    /// Accepting queries
    Ready,
    /// Connection lost or database not selected; queries refused
    Disconnected,
    /// Closed by the caller
    Closed,
}

/// A structured failure recorded by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    /// Stable machine-readable code, e.g. `db_connect_fail`
    pub code: &'static str,
    pub message: String,
}

/// One entry in the accumulated error log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedError {
    pub message: String,
    /// The statement that failed, when the failure came from a query
    pub sql: Option<String>,
}

/// One entry in the timed query log (recorded when `save_queries` is on).
#[derive(Debug, Clone)]
pub struct SavedQuery {
    pub sql: String,
    pub elapsed: Duration,
}

/// A database session over a pluggable driver.
pub struct Session {
    settings: ConnectionSettings,
    registry: DriverRegistry,
    driver: Option<Box<dyn Driver>>,
    driver_name: String,
    state: SessionState,
    /// Whether any connection has ever succeeded (gates driver fallback)
    has_connected: bool,
    /// Whether the late-binding dispatch hook has fired; after that point
    /// some failures degrade from fatal to soft
    dispatch_hook_fired: bool,
    charset: Option<String>,
    collation: Option<String>,
    /// One-shot flag: when armed, non-ASCII statements are checked
    /// against the active charset before dispatch
    check_current_query: bool,
    suppress_errors: bool,
    show_errors: bool,
    last_query: Option<String>,
    last_result: Vec<Row>,
    col_info: Option<Vec<ColumnMeta>>,
    rows_affected: u64,
    num_rows: usize,
    insert_id: u64,
    last_error: Option<String>,
    error: Option<DbError>,
    error_log: Vec<LoggedError>,
    num_queries: u64,
    queries: Vec<SavedQuery>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("driver", &self.driver_name)
            .field("state", &self.state)
            .field("charset", &self.charset)
            .field("num_queries", &self.num_queries)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Resolve a driver, negotiate the charset, and connect.
    ///
    /// With `allow_bail` set (the default), a missing driver or a failed
    /// connection is returned as `Err`. With it cleared, the session is
    /// returned in a not-ready state with the failure recorded.
    pub fn initialize(settings: ConnectionSettings, registry: DriverRegistry) -> Result<Self> {
        let allow_bail = settings.allow_bail;
        let mut session = Self {
            settings,
            registry,
            driver: None,
            driver_name: String::new(),
            state: SessionState::Uninitialized,
            has_connected: false,
            dispatch_hook_fired: false,
            charset: None,
            collation: None,
            check_current_query: true,
            suppress_errors: false,
            show_errors: true,
            last_query: None,
            last_result: Vec::new(),
            col_info: None,
            rows_affected: 0,
            num_rows: 0,
            insert_id: 0,
            last_error: None,
            error: None,
            error_log: Vec::new(),
            num_queries: 0,
            queries: Vec::new(),
        };

        session.init_charset();

        let factory = match session
            .registry
            .current(session.settings.driver.as_deref())
        {
            Ok(factory) => factory,
            Err(err) => {
                session.record_error("db_driver_missing", err.to_string());
                if allow_bail {
                    return Err(err);
                }
                return Ok(session);
            }
        };
        session.driver_name = factory.name().to_string();
        session.driver = Some(factory.create());

        session.db_connect(allow_bail)?;
        Ok(session)
    }

    /// Connect (or reconnect) the current driver.
    ///
    /// When the configured driver is not the default type, has never
    /// connected, and fallback is permitted, a failed attempt is retried
    /// once with the default factory. Never recursive.
    pub fn db_connect(&mut self, allow_bail: bool) -> Result<bool> {
        if self.driver.is_none() {
            return Ok(false);
        }
        self.state = SessionState::Connecting;

        let mut connected = self.connect_current_driver();

        if !connected
            && !self.has_connected
            && self.settings.allow_fallback
            && self.driver_name != DEFAULT_DRIVER
        {
            if let Some(factory) = self.registry.get(DEFAULT_DRIVER) {
                if factory.is_supported() {
                    tracing::warn!(
                        driver = %self.driver_name,
                        fallback = DEFAULT_DRIVER,
                        "driver failed to connect, retrying with the default driver"
                    );
                    self.driver_name = DEFAULT_DRIVER.to_string();
                    self.driver = Some(factory.create());
                    connected = self.connect_current_driver();
                }
            }
        }

        if !connected {
            let message = self
                .driver_error_message()
                .unwrap_or_else(|| "could not connect to the database server".to_string());
            self.state = SessionState::Disconnected;
            self.record_error("db_connect_fail", message.clone());
            if allow_bail {
                return Err(Error::Connection(ConnectionError {
                    kind: ConnectionErrorKind::Connect,
                    message,
                    source: None,
                }));
            }
            return Ok(false);
        }

        self.has_connected = true;
        self.state = SessionState::Ready;

        // The capability probes are live now; the charset decision may
        // upgrade before negotiation.
        self.determine_charset();
        self.negotiate_charset();
        self.set_sql_mode(None);
        self.select_database(allow_bail)?;

        Ok(true)
    }

    /// Run a statement.
    ///
    /// `Ok(None)` is the soft-failure sentinel; the cause is retrievable
    /// through [`Session::last_error`]. `Err` is reserved for reconnect
    /// exhaustion with bailing allowed.
    pub fn query(&mut self, sql: &str) -> Result<Option<QueryValue>> {
        if self.state != SessionState::Ready || self.driver.is_none() {
            self.check_current_query = true;
            return Ok(None);
        }

        self.flush();

        if self.check_current_query && !sql.is_ascii() {
            let stripped = strip_invalid_text(sql, self.charset.as_deref());
            // The charset check may itself have touched the connection.
            self.flush();
            if stripped.as_ref() != sql {
                self.insert_id = 0;
                self.check_current_query = true;
                tracing::warn!("query rejected: text not representable in the active charset");
                return Ok(None);
            }
        }
        self.check_current_query = true;

        self.last_query = Some(sql.to_string());
        let mut outcome = self.do_query(sql);

        if self.driver_lost_connection() {
            let allow_bail = self.settings.allow_bail;
            if self.check_connection(allow_bail)? {
                self.flush();
                self.last_query = Some(sql.to_string());
                outcome = self.do_query(sql);
            } else {
                self.insert_id = 0;
                return Ok(None);
            }
        }

        if let Some(message) = self.driver_error_message() {
            // A failed insert must not leak the previous statement's id.
            if self.insert_id > 0 && is_insert_or_replace(sql) {
                self.insert_id = 0;
            }
            self.print_error(message, Some(sql.to_string()));
            return Ok(None);
        }

        if outcome.is_none() {
            return Ok(None);
        }

        let Some(driver) = self.driver.as_mut() else {
            return Ok(None);
        };
        let class = classify(sql);
        if class == QueryClass::Write {
            self.rows_affected = driver.affected_rows();
            if is_insert_or_replace(sql) {
                self.insert_id = driver.insert_id();
                if self.rows_affected == 0 {
                    self.insert_id = 0;
                }
            }
        }

        // Any successful statement may carry rows; SHOW and DESCRIBE
        // produce result sets without being select-class.
        self.last_result = driver.get_results().to_vec();
        self.num_rows = self.last_result.len();

        let value = match class {
            QueryClass::Ddl => QueryValue::Ddl,
            QueryClass::Write => QueryValue::Affected(self.rows_affected),
            QueryClass::Read => QueryValue::Rows(self.num_rows),
            QueryClass::Other => QueryValue::Other,
        };
        Ok(Some(value))
    }

    /// Probe the connection and reconnect with bounded retries.
    ///
    /// Warnings from intermediate attempts are suppressed; the final
    /// attempt reports normally. Returns `Ok(false)` on exhaustion when
    /// bailing is suppressed or the dispatch hook has fired, `Err`
    /// otherwise.
    pub fn check_connection(&mut self, allow_bail: bool) -> Result<bool> {
        if self.driver.as_mut().is_some_and(|d| d.ping()) {
            return Ok(true);
        }

        let saved_suppress = self.suppress_errors;
        self.suppress_errors = true;

        let retries = self.settings.reconnect_retries;
        for attempt in 1..=retries {
            if attempt == retries {
                self.suppress_errors = saved_suppress;
            }
            tracing::warn!(attempt, retries, "database connection lost, reconnecting");

            if matches!(self.db_connect(false), Ok(true)) {
                self.suppress_errors = saved_suppress;
                return Ok(true);
            }

            if attempt < retries {
                thread::sleep(self.settings.reconnect_delay);
            }
        }
        self.suppress_errors = saved_suppress;

        let message = format!(
            "the database server has gone away and could not be reconnected after {retries} attempts"
        );
        self.state = SessionState::Disconnected;
        self.record_error("db_connect_fail", message.clone());

        // Too late in the request lifecycle to abort, or the caller asked
        // for soft failure.
        if self.dispatch_hook_fired || !allow_bail {
            return Ok(false);
        }

        Err(Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::ReconnectExhausted,
            message,
            source: None,
        }))
    }

    /// Clear per-statement result state, here and in the driver.
    pub fn flush(&mut self) {
        self.last_result.clear();
        self.col_info = None;
        self.last_query = None;
        self.rows_affected = 0;
        self.num_rows = 0;
        self.last_error = None;
        if let Some(driver) = self.driver.as_mut() {
            driver.flush();
        }
    }

    /// Close the session. Idempotent; `false` when there was nothing to
    /// close.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        let Some(driver) = self.driver.as_mut() else {
            return false;
        };
        let closed = driver.close();
        if closed {
            self.state = SessionState::Closed;
            self.has_connected = false;
        }
        closed
    }

    /// Escape a string for interpolation into a statement.
    ///
    /// Uses the driver's connection-aware escaping when connected; the
    /// fallback escapes quotes, backslashes, and NUL only.
    pub fn escape(&mut self, text: &str) -> String {
        if let Some(driver) = self.driver.as_mut() {
            if driver.is_connected() {
                return driver.escape(text);
            }
        }
        tracing::warn!("string escaped before a database connection was established");
        let mut escaped = String::with_capacity(text.len());
        for ch in text.chars() {
            match ch {
                '\\' => escaped.push_str("\\\\"),
                '\'' => escaped.push_str("\\'"),
                '"' => escaped.push_str("\\\""),
                '\0' => escaped.push_str("\\0"),
                _ => escaped.push(ch),
            }
        }
        escaped
    }

    /// Disarm the charset validity check for exactly the next query.
    pub fn skip_next_validity_check(&mut self) {
        self.check_current_query = false;
    }

    /// Record that the late-binding dispatch hook has fired; subsequent
    /// reconnect exhaustion and select failures become soft.
    pub fn mark_dispatch_hook(&mut self) {
        self.dispatch_hook_fired = true;
    }

    /// Replace the session SQL mode.
    ///
    /// `None` reads the current mode list from the server. Modes on the
    /// incompatible list are dropped; the order of the rest is kept.
    pub fn set_sql_mode(&mut self, modes: Option<Vec<String>>) {
        let Some(driver) = self.driver.as_mut() else {
            return;
        };

        let modes = match modes {
            Some(modes) => modes,
            None => {
                if driver.query("SELECT @@SESSION.sql_mode").is_none() {
                    return;
                }
                let Some(value) = driver.query_result(0, 0) else {
                    return;
                };
                let Some(text) = value.as_str() else {
                    return;
                };
                if text.is_empty() {
                    Vec::new()
                } else {
                    text.split(',').map(str::to_string).collect()
                }
            }
        };

        let incompatible = &self.settings.incompatible_modes;
        let kept: Vec<String> = modes
            .into_iter()
            .map(|mode| mode.to_ascii_uppercase())
            .filter(|mode| !incompatible.iter().any(|inc| inc.eq_ignore_ascii_case(mode)))
            .collect();

        driver.query(&format!("SET SESSION sql_mode='{}'", kept.join(",")));
    }

    // Accessors

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn collation(&self) -> Option<&str> {
        self.collation.as_deref()
    }

    /// Rows from the most recent read statement.
    pub fn last_result(&self) -> &[Row] {
        &self.last_result
    }

    /// Column metadata for the most recent result set, pulled from the
    /// driver on first access and cached until the next flush.
    pub fn col_info(&mut self) -> &[ColumnMeta] {
        if self.col_info.is_none() {
            if let Some(driver) = self.driver.as_mut() {
                self.col_info = Some(driver.load_col_info().to_vec());
            }
        }
        self.col_info.as_deref().unwrap_or(&[])
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn insert_id(&self) -> u64 {
        self.insert_id
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    pub fn num_queries(&self) -> u64 {
        self.num_queries
    }

    /// The timed query log (populated when `save_queries` is enabled).
    pub fn queries(&self) -> &[SavedQuery] {
        &self.queries
    }

    /// The most recent session-level failure.
    pub fn error(&self) -> Option<&DbError> {
        self.error.as_ref()
    }

    /// Every query failure recorded over the session's lifetime.
    pub fn error_log(&self) -> &[LoggedError] {
        &self.error_log
    }

    /// Toggle error suppression. Returns the previous setting.
    pub fn suppress_errors(&mut self, suppress: bool) -> bool {
        std::mem::replace(&mut self.suppress_errors, suppress)
    }

    /// Toggle error display. Returns the previous setting.
    pub fn show_errors(&mut self, show: bool) -> bool {
        std::mem::replace(&mut self.show_errors, show)
    }

    pub fn db_version(&self) -> Option<String> {
        self.driver.as_ref().and_then(|d| d.db_version())
    }

    pub fn has_cap(&self, cap: Capability) -> bool {
        self.driver.as_ref().is_some_and(|d| d.has_cap(cap))
    }

    // Internals

    /// Seed charset and collation from the settings, defaulting to
    /// `utf8` / `utf8_unicode_ci`.
    fn init_charset(&mut self) {
        let charset = self
            .settings
            .charset
            .clone()
            .unwrap_or_else(|| "utf8".to_string());
        let collation = self
            .settings
            .collation
            .clone()
            .unwrap_or_else(|| "utf8_unicode_ci".to_string());
        self.charset = Some(charset);
        self.collation = Some(collation);
        self.determine_charset();
    }

    /// Reconcile charset and collation with the connected server's
    /// capabilities. Upgrades `utf8` to `utf8mb4` when supported, and
    /// downgrades a configured `utf8mb4` when it is not.
    fn determine_charset(&mut self) {
        let Some(mut charset) = self.charset.clone() else {
            return;
        };
        let mut collation = self.collation.clone();

        if charset == "utf8" && self.has_cap(Capability::Utf8mb4) {
            charset = "utf8mb4".to_string();
        }

        if charset == "utf8mb4" && !self.has_cap(Capability::Utf8mb4) {
            charset = "utf8".to_string();
            collation = collation.map(|c| c.replace("utf8mb4_", "utf8_"));
        }

        if charset == "utf8mb4" {
            let needs_default = match &collation {
                Some(c) => c.is_empty() || c.starts_with("utf8_"),
                None => true,
            };
            if needs_default {
                collation = Some("utf8mb4_unicode_ci".to_string());
            }
        }

        self.charset = Some(charset);
        self.collation = collation;
    }

    /// Apply the negotiated charset on the live connection.
    fn negotiate_charset(&mut self) {
        let Some(charset) = self.charset.clone() else {
            return;
        };
        let collation = self.collation.clone().filter(|c| !c.is_empty());
        let Some(driver) = self.driver.as_mut() else {
            return;
        };

        if driver.has_cap(Capability::SetCharset)
            && driver.set_charset(&charset, collation.as_deref())
        {
            return;
        }

        let mut sql = format!("SET NAMES '{charset}'");
        if let Some(collation) = collation {
            if driver.has_cap(Capability::Collation) {
                sql.push_str(&format!(" COLLATE '{collation}'"));
            }
        }
        driver.query(&sql);
    }

    fn select_database(&mut self, allow_bail: bool) -> Result<()> {
        if self.settings.database.is_empty() {
            return Ok(());
        }
        let database = self.settings.database.clone();
        let selected = self
            .driver
            .as_mut()
            .is_some_and(|d| d.select_db(&database));
        if selected {
            return Ok(());
        }

        self.state = SessionState::Disconnected;
        let message = self
            .driver_error_message()
            .unwrap_or_else(|| format!("cannot select database {database}"));
        self.record_error("db_select_fail", message.clone());

        if allow_bail && self.dispatch_hook_fired {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::SelectDatabase,
                message,
                source: None,
            }));
        }
        Ok(())
    }

    fn connect_current_driver(&mut self) -> bool {
        let (host, port_or_socket) = self.settings.split_host();
        let user = self.settings.user.clone();
        let password = self.settings.password.clone();
        let tls = self.settings.tls.clone();
        match self.driver.as_mut() {
            Some(driver) => driver.connect(&host, &user, &password, &port_or_socket, &tls),
            None => false,
        }
    }

    /// Dispatch to the driver with timing and counting.
    fn do_query(&mut self, sql: &str) -> Option<QueryValue> {
        let timer = self.settings.save_queries.then(Instant::now);
        tracing::debug!(%sql, "dispatching query");

        let result = self.driver.as_mut().and_then(|driver| driver.query(sql));
        self.num_queries += 1;

        if let Some(start) = timer {
            self.queries.push(SavedQuery {
                sql: sql.to_string(),
                elapsed: start.elapsed(),
            });
        }
        result
    }

    fn driver_lost_connection(&self) -> bool {
        self.driver
            .as_ref()
            .and_then(|d| d.last_error())
            .is_some_and(|e| e.is_lost_connection())
    }

    fn driver_error_message(&self) -> Option<String> {
        self.driver.as_ref().and_then(|d| d.error_message())
    }

    fn record_error(&mut self, code: &'static str, message: String) {
        tracing::warn!(code, %message, "database error");
        self.error = Some(DbError { code, message });
    }

    /// Record a query failure in the error log and surface it per the
    /// suppression and display settings.
    fn print_error(&mut self, message: String, sql: Option<String>) {
        self.error_log.push(LoggedError {
            message: message.clone(),
            sql: sql.clone(),
        });
        self.last_error = Some(message.clone());

        if self.suppress_errors {
            return;
        }
        if self.show_errors {
            tracing::error!(sql = sql.as_deref().unwrap_or(""), %message, "query failed");
        } else {
            tracing::debug!(sql = sql.as_deref().unwrap_or(""), %message, "query failed");
        }
    }
}

/// Strip characters the active charset cannot represent.
///
/// `utf8mb4` passes everything through; plain `utf8` (3-byte limit in
/// the server's legacy encoding) drops supplementary-plane characters;
/// `latin1` drops anything above U+00FF; unknown charsets keep ASCII
/// only.
fn strip_invalid_text<'a>(text: &'a str, charset: Option<&str>) -> Cow<'a, str> {
    let keep: fn(char) -> bool = match charset {
        Some(cs) if cs.starts_with("utf8mb4") => return Cow::Borrowed(text),
        Some(cs) if cs.starts_with("utf8") => |c| (c as u32) <= 0xFFFF,
        Some("latin1") => |c| (c as u32) <= 0xFF,
        _ => |c: char| c.is_ascii(),
    };

    if text.chars().all(keep) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|c| keep(*c)).collect())
    }
}
