//! Scriptable in-memory driver for exercising the session facade.

// Not every integration test uses every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sqlbridge::{
    Capability, ColumnInfo, ColumnMeta, Driver, DriverError, DriverErrorKind, DriverFactory,
    QueryValue, Row, TlsOptions, Value,
};
use sqlbridge_core::default_capability;

/// What the scripted driver does with the next ordinary statement.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Rows(Vec<Vec<Value>>),
    Affected { affected: u64, insert_id: u64 },
    Error(String),
    /// The connection drops mid-statement.
    Lost,
}

/// Shared script and call record.
///
/// Charset negotiation and SQL-mode statements (`SET ...` and the
/// sql_mode read) are answered inline so scripts only cover the
/// statements a test actually issues.
#[derive(Debug)]
pub struct Script {
    pub connect_results: VecDeque<bool>,
    pub connect_calls: u32,
    pub select_results: VecDeque<bool>,
    pub responses: VecDeque<MockResponse>,
    pub ping_results: VecDeque<bool>,
    pub queries: Vec<String>,
    pub set_charset_calls: Vec<(String, Option<String>)>,
    pub close_calls: u32,
    pub server_version: String,
    pub sql_mode: String,
    pub columns: Vec<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            connect_results: VecDeque::new(),
            connect_calls: 0,
            select_results: VecDeque::new(),
            responses: VecDeque::new(),
            ping_results: VecDeque::new(),
            queries: Vec::new(),
            set_charset_calls: Vec::new(),
            close_calls: 0,
            server_version: "8.0.0".to_string(),
            sql_mode: String::new(),
            columns: vec!["value".to_string()],
        }
    }
}

pub type SharedScript = Arc<Mutex<Script>>;

pub fn shared_script(script: Script) -> SharedScript {
    Arc::new(Mutex::new(script))
}

#[derive(Debug, Default)]
struct MockResult {
    rows: Vec<Row>,
    columns: Vec<ColumnMeta>,
    affected: u64,
    insert_id: u64,
}

pub struct MockDriver {
    script: SharedScript,
    connected: bool,
    lost: bool,
    result: MockResult,
    last_error: Option<DriverError>,
}

impl MockDriver {
    pub fn new(script: SharedScript) -> Self {
        Self {
            script,
            connected: false,
            lost: false,
            result: MockResult::default(),
            last_error: None,
        }
    }

    fn build_rows(&self, data: Vec<Vec<Value>>) -> (Vec<Row>, Vec<ColumnMeta>) {
        let names = self.script.lock().unwrap().columns.clone();
        let info = Arc::new(ColumnInfo::new(names.clone()));
        let rows = data
            .into_iter()
            .map(|values| Row::with_columns(Arc::clone(&info), values))
            .collect();
        let columns = names
            .into_iter()
            .map(|name| ColumnMeta {
                catalog: "def".to_string(),
                schema: String::new(),
                table: String::new(),
                org_table: String::new(),
                org_name: name.clone(),
                name,
                charset: 224,
                column_length: 255,
                column_type: 0xFD,
                flags: 0,
                decimals: 0,
            })
            .collect();
        (rows, columns)
    }
}

impl Driver for MockDriver {
    fn connect(
        &mut self,
        _host: &str,
        _user: &str,
        _password: &str,
        _port_or_socket: &str,
        _tls: &TlsOptions,
    ) -> bool {
        if self.connected && !self.lost {
            return true;
        }
        let ok = {
            let mut script = self.script.lock().unwrap();
            script.connect_calls += 1;
            script.connect_results.pop_front().unwrap_or(true)
        };
        if ok {
            self.connected = true;
            self.lost = false;
            self.last_error = None;
        } else {
            self.last_error = Some(DriverError::new(
                DriverErrorKind::Connect,
                "scripted connection refusal",
            ));
        }
        ok
    }

    fn is_connected(&self) -> bool {
        self.connected && !self.lost
    }

    fn escape(&mut self, text: &str) -> String {
        text.replace('\\', "\\\\").replace('\'', "\\'")
    }

    fn select_db(&mut self, _database: &str) -> bool {
        let ok = self
            .script
            .lock()
            .unwrap()
            .select_results
            .pop_front()
            .unwrap_or(true);
        if !ok {
            self.last_error = Some(DriverError::new(
                DriverErrorKind::SelectDatabase,
                "scripted select refusal",
            ));
        }
        ok
    }

    fn query(&mut self, sql: &str) -> Option<QueryValue> {
        self.result = MockResult::default();
        if !self.connected {
            self.last_error = Some(DriverError::new(
                DriverErrorKind::NotConnected,
                "not connected",
            ));
            return None;
        }
        if self.lost {
            self.last_error = Some(DriverError::new(
                DriverErrorKind::ConnectionLost,
                "server has gone away",
            ));
            return None;
        }

        let response = {
            let mut script = self.script.lock().unwrap();
            script.queries.push(sql.to_string());

            // Negotiation traffic is answered inline; the scripted
            // responses stay reserved for the statements under test.
            if sql == "SELECT @@SESSION.sql_mode" {
                let mode = script.sql_mode.clone();
                drop(script);
                let info = Arc::new(ColumnInfo::new(vec!["@@SESSION.sql_mode".to_string()]));
                self.result.rows = vec![Row::with_columns(info, vec![Value::Text(mode)])];
                return Some(QueryValue::Rows(1));
            }
            if sql.starts_with("SET ") {
                return Some(QueryValue::Affected(0));
            }

            script
                .responses
                .pop_front()
                .unwrap_or(MockResponse::Affected {
                    affected: 0,
                    insert_id: 0,
                })
        };

        match response {
            MockResponse::Rows(data) => {
                let (rows, columns) = self.build_rows(data);
                let count = rows.len();
                self.result.rows = rows;
                self.result.columns = columns;
                Some(QueryValue::Rows(count))
            }
            MockResponse::Affected {
                affected,
                insert_id,
            } => {
                self.result.affected = affected;
                self.result.insert_id = insert_id;
                Some(QueryValue::Affected(affected))
            }
            MockResponse::Error(message) => {
                self.last_error = Some(DriverError::execution(message));
                None
            }
            MockResponse::Lost => {
                self.lost = true;
                self.last_error = Some(DriverError::new(
                    DriverErrorKind::ConnectionLost,
                    "server has gone away",
                ));
                None
            }
        }
    }

    fn query_result(&mut self, row: usize, field: usize) -> Option<Value> {
        self.result
            .rows
            .get(row)
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
        &self.result.rows
    }

    fn load_col_info(&mut self) -> &[ColumnMeta] {
        &self.result.columns
    }

    fn db_version(&self) -> Option<String> {
        if self.connected {
            Some(self.script.lock().unwrap().server_version.clone())
        } else {
            None
        }
    }

    fn has_cap(&self, cap: Capability) -> bool {
        match self.db_version() {
            Some(version) => default_capability(&version, cap),
            None => false,
        }
    }

    fn set_charset(&mut self, charset: &str, collation: Option<&str>) -> bool {
        self.script
            .lock()
            .unwrap()
            .set_charset_calls
            .push((charset.to_string(), collation.map(str::to_string)));
        true
    }

    fn flush(&mut self) {
        self.result = MockResult::default();
        self.last_error = None;
    }

    fn close(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        self.connected = false;
        self.script.lock().unwrap().close_calls += 1;
        true
    }

    fn ping(&mut self) -> bool {
        let scripted = self.script.lock().unwrap().ping_results.pop_front();
        scripted.unwrap_or(self.connected && !self.lost)
    }

    fn last_error(&self) -> Option<&DriverError> {
        self.last_error.as_ref()
    }
}

/// Factory handing every created driver the same shared script, so a
/// test can observe calls across reconnects and fallbacks.
pub struct MockFactory {
    name: &'static str,
    supported: bool,
    script: SharedScript,
}

impl MockFactory {
    pub fn new(name: &'static str, script: SharedScript) -> Self {
        Self {
            name,
            supported: true,
            script,
        }
    }

    pub fn unsupported(name: &'static str, script: SharedScript) -> Self {
        Self {
            name,
            supported: false,
            script,
        }
    }
}

impl DriverFactory for MockFactory {
    fn name(&self) -> &str {
        self.name
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(&self) -> Box<dyn Driver> {
        Box::new(MockDriver::new(Arc::clone(&self.script)))
    }
}
