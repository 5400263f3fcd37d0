//! The MySQL driver.
//!
//! Wraps [`RawClient`] behind the [`Driver`] contract: sentinel returns,
//! a recorded [`DriverError`] for the most recent failure, and result
//! state that persists until the next statement or flush.

use sqlbridge_core::{
    Capability, ColumnMeta, Driver, DriverError, DriverErrorKind, DriverFactory, QueryClass,
    QueryValue, Row, TlsOptions, Value, canonical_version, classify, default_capability,
    version_at_least,
};

use crate::client::{CLIENT_VERSION, QueryOutput, RawClient, TextResultSet, quote};
use crate::protocol::charset;

/// Whether utf8mb4 works end to end: the server and this client library
/// must both be at least 5.5.3.
fn utf8mb4_supported(server_version: &str, client_version: &str) -> bool {
    version_at_least(server_version, "5.5.3") && version_at_least(client_version, "5.5.3")
}

/// Result state from the most recent statement.
#[derive(Debug, Default)]
struct ResultState {
    set: Option<TextResultSet>,
    affected: u64,
    insert_id: u64,
}

/// MySQL backend for the session facade.
#[derive(Debug, Default)]
pub struct MysqlDriver {
    client: Option<RawClient>,
    result: ResultState,
    last_error: Option<DriverError>,
}

impl MysqlDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, error: DriverError) {
        tracing::debug!(error = %error, "driver error");
        self.last_error = Some(error);
    }

    /// The live client, or a recorded NotConnected error.
    fn live_client(&mut self) -> Option<&mut RawClient> {
        let lost = match &self.client {
            Some(client) => client.is_lost(),
            None => {
                self.last_error = Some(DriverError::new(
                    DriverErrorKind::NotConnected,
                    "not connected to a database server",
                ));
                return None;
            }
        };
        if lost {
            self.last_error = Some(DriverError::new(
                DriverErrorKind::ConnectionLost,
                "server has gone away",
            ));
            return None;
        }
        self.client.as_mut()
    }
}

impl Driver for MysqlDriver {
    fn connect(
        &mut self,
        host: &str,
        user: &str,
        password: &str,
        port_or_socket: &str,
        tls: &TlsOptions,
    ) -> bool {
        if let Some(client) = &self.client {
            if !client.is_lost() {
                return true;
            }
        }
        self.client = None;

        let resolved = tls.resolve();
        match RawClient::connect(
            host,
            user,
            password,
            port_or_socket,
            "",
            charset::UTF8MB4_GENERAL_CI,
            resolved.as_ref(),
        ) {
            Ok(client) => {
                self.client = Some(client);
                self.last_error = None;
                true
            }
            Err(err) => {
                self.record(err);
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_lost())
    }

    fn escape(&mut self, text: &str) -> String {
        // The quoting primitive wraps in single quotes; callers of escape
        // expect the bare escaped body.
        let quoted = quote(text);
        quoted[1..quoted.len() - 1].to_string()
    }

    fn select_db(&mut self, database: &str) -> bool {
        let Some(client) = self.live_client() else {
            return false;
        };
        match client.com_init_db(database) {
            Ok(()) => true,
            Err(err) => {
                self.record(err);
                false
            }
        }
    }

    fn query(&mut self, sql: &str) -> Option<QueryValue> {
        self.result = ResultState::default();
        let Some(client) = self.live_client() else {
            return None;
        };
        match client.com_query(sql) {
            Ok(QueryOutput::Ok { affected, insert_id }) => {
                self.result.affected = affected;
                self.result.insert_id = insert_id;
            }
            Ok(QueryOutput::ResultSet(set)) => {
                self.result.set = Some(set);
            }
            Err(err) => {
                self.record(err);
                return None;
            }
        }
        // The leading keyword, not the wire response shape, decides what
        // the caller gets back.
        Some(match classify(sql) {
            QueryClass::Ddl => QueryValue::Ddl,
            QueryClass::Write => QueryValue::Affected(self.result.affected),
            QueryClass::Read => QueryValue::Rows(
                self.result.set.as_ref().map_or(0, |set| set.rows.len()),
            ),
            QueryClass::Other => QueryValue::Other,
        })
    }

    fn query_result(&mut self, row: usize, field: usize) -> Option<Value> {
        self.result
            .set
            .as_ref()
            .and_then(|set| set.rows.get(row))
            .and_then(|r| r.get(field))
            .cloned()
    }

    fn affected_rows(&self) -> u64 {
        self.result.affected
    }

    fn insert_id(&self) -> u64 {
        self.result.insert_id
    }

    fn get_results(&mut self) -> &[Row] {
        self.result.set.as_ref().map_or(&[], |set| &set.rows)
    }

    fn load_col_info(&mut self) -> &[ColumnMeta] {
        self.result.set.as_ref().map_or(&[], |set| &set.columns)
    }

    fn db_version(&self) -> Option<String> {
        self.client
            .as_ref()
            .map(|c| canonical_version(c.server_version()))
    }

    fn has_cap(&self, cap: Capability) -> bool {
        let Some(version) = self.db_version() else {
            return false;
        };
        match cap {
            Capability::Utf8mb4 => utf8mb4_supported(&version, CLIENT_VERSION),
            _ => default_capability(&version, cap),
        }
    }

    fn set_charset(&mut self, charset: &str, collation: Option<&str>) -> bool {
        if !self.has_cap(Capability::SetCharset) {
            return false;
        }
        let sql = match collation {
            Some(collation) if !collation.is_empty() => {
                format!("SET NAMES {} COLLATE {}", quote(charset), quote(collation))
            }
            _ => format!("SET NAMES {}", quote(charset)),
        };
        self.query(&sql).is_some()
    }

    fn flush(&mut self) {
        self.result = ResultState::default();
        self.last_error = None;
    }

    fn close(&mut self) -> bool {
        match self.client.take() {
            Some(mut client) => {
                client.quit();
                true
            }
            None => false,
        }
    }

    fn ping(&mut self) -> bool {
        match &mut self.client {
            Some(client) if !client.is_lost() => client.com_ping(),
            _ => false,
        }
    }

    fn last_error(&self) -> Option<&DriverError> {
        self.last_error.as_ref()
    }
}

/// Registry entry for the MySQL backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct MysqlDriverFactory;

impl DriverFactory for MysqlDriverFactory {
    fn name(&self) -> &str {
        "mysql"
    }

    fn is_supported(&self) -> bool {
        // Pure-Rust protocol implementation; no system library to probe.
        true
    }

    fn create(&self) -> Box<dyn Driver> {
        Box::new(MysqlDriver::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_strips_surrounding_quotes() {
        let mut driver = MysqlDriver::new();
        assert_eq!(driver.escape("plain"), "plain");
        assert_eq!(driver.escape("it's"), r"it\'s");
        assert_eq!(driver.escape(""), "");
    }

    #[test]
    fn unconnected_driver_fails_softly() {
        let mut driver = MysqlDriver::new();
        assert!(!driver.is_connected());
        assert!(driver.query("SELECT 1").is_none());
        assert_eq!(
            driver.last_error().map(|e| e.kind),
            Some(DriverErrorKind::NotConnected)
        );
        assert!(driver.get_results().is_empty());
        assert_eq!(driver.affected_rows(), 0);
        assert!(!driver.ping());
        assert!(driver.db_version().is_none());
        assert!(!driver.has_cap(Capability::Utf8mb4));
    }

    #[test]
    fn results_are_cached_until_flush() {
        use sqlbridge_core::ColumnInfo;
        use std::sync::Arc;

        let columns = vec![ColumnMeta {
            catalog: "def".to_string(),
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            name: "n".to_string(),
            org_name: "n".to_string(),
            charset: 224,
            column_length: 11,
            column_type: 0x03,
            flags: 0,
            decimals: 0,
        }];
        let info = Arc::new(ColumnInfo::new(vec!["n".to_string()]));
        let rows = vec![Row::with_columns(info, vec![Value::Int(1)])];

        let mut driver = MysqlDriver::new();
        driver.result.set = Some(TextResultSet { columns, rows });
        driver.result.affected = 1;
        driver.result.insert_id = 3;

        let first: Vec<Row> = driver.get_results().to_vec();
        assert_eq!(first.len(), 1);
        assert_eq!(driver.get_results().len(), 1);
        assert_eq!(driver.load_col_info().len(), 1);
        assert_eq!(driver.insert_id(), 3);

        driver.flush();
        assert!(driver.get_results().is_empty());
        assert!(driver.load_col_info().is_empty());
        assert_eq!(driver.affected_rows(), 0);
        assert_eq!(driver.insert_id(), 0);
    }

    #[test]
    fn flush_clears_recorded_error() {
        let mut driver = MysqlDriver::new();
        driver.query("SELECT 1");
        assert!(driver.last_error().is_some());
        driver.flush();
        assert!(driver.last_error().is_none());
    }

    #[test]
    fn close_without_connection() {
        let mut driver = MysqlDriver::new();
        assert!(!driver.close());
    }

    #[test]
    fn utf8mb4_needs_both_sides() {
        assert!(utf8mb4_supported("5.5.3", CLIENT_VERSION));
        assert!(!utf8mb4_supported("5.5.2", CLIENT_VERSION));
        assert!(!utf8mb4_supported("8.0.32", "5.1.0"));
        assert!(utf8mb4_supported("5.5.5-10.4.12-MariaDB", CLIENT_VERSION));
    }

    #[test]
    fn factory_identity() {
        let factory = MysqlDriverFactory;
        assert_eq!(factory.name(), "mysql");
        assert!(factory.is_supported());
        let driver = factory.create();
        assert!(!driver.is_connected());
    }
}
