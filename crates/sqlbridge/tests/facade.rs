//! Session behavior against a scripted driver.

mod common;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use common::{MockFactory, MockResponse, Script, SharedScript, shared_script};
use sqlbridge::{
    ConnectionErrorKind, ConnectionSettings, DriverRegistry, Error, QueryValue, Session,
    SessionState, Value,
};

fn settings() -> ConnectionSettings {
    ConnectionSettings::new("app", "secret", "app_db", "localhost")
}

fn registry_with(script: &SharedScript) -> DriverRegistry {
    let mut registry = DriverRegistry::empty();
    registry.register(Arc::new(MockFactory::new("mysql", Arc::clone(script))));
    registry
}

fn connect(script: &SharedScript, settings: ConnectionSettings) -> Session {
    Session::initialize(settings, registry_with(script)).unwrap()
}

#[test]
fn statements_classify_by_leading_keyword() {
    let script = shared_script(Script {
        responses: VecDeque::from(vec![
            MockResponse::Affected {
                affected: 0,
                insert_id: 0,
            },
            MockResponse::Affected {
                affected: 1,
                insert_id: 42,
            },
            MockResponse::Rows(vec![
                vec![Value::Text("alice".to_string())],
                vec![Value::Text("bob".to_string())],
            ]),
            MockResponse::Affected {
                affected: 0,
                insert_id: 0,
            },
        ]),
        columns: vec!["name".to_string()],
        ..Script::default()
    });
    let mut session = connect(&script, settings());
    assert!(session.is_ready());

    assert_eq!(
        session.query("CREATE TABLE t (id INT)").unwrap(),
        Some(QueryValue::Ddl)
    );

    assert_eq!(
        session.query("INSERT INTO t VALUES (1)").unwrap(),
        Some(QueryValue::Affected(1))
    );
    assert_eq!(session.rows_affected(), 1);
    assert_eq!(session.insert_id(), 42);

    assert_eq!(
        session.query("SELECT name FROM t").unwrap(),
        Some(QueryValue::Rows(2))
    );
    assert_eq!(session.num_rows(), 2);
    assert_eq!(
        session.last_result()[0].get_by_name("name"),
        Some(&Value::Text("alice".to_string()))
    );

    assert_eq!(session.query("BEGIN").unwrap(), Some(QueryValue::Other));
    assert_eq!(session.num_queries(), 4);
}

#[test]
fn show_statement_rows_are_retrievable() {
    let script = shared_script(Script {
        responses: VecDeque::from(vec![MockResponse::Rows(vec![
            vec![Value::Text("users".to_string())],
            vec![Value::Text("orders".to_string())],
        ])]),
        columns: vec!["Tables_in_app_db".to_string()],
        ..Script::default()
    });
    let mut session = connect(&script, settings());

    // SHOW is not select-class, but its rows must still be cached.
    assert_eq!(session.query("SHOW TABLES").unwrap(), Some(QueryValue::Other));
    assert_eq!(session.num_rows(), 2);
    assert_eq!(session.last_result().len(), 2);
    assert_eq!(
        session.last_result()[1].get_by_name("Tables_in_app_db"),
        Some(&Value::Text("orders".to_string()))
    );
}

#[test]
fn failed_insert_does_not_leak_previous_insert_id() {
    let script = shared_script(Script {
        responses: VecDeque::from(vec![
            MockResponse::Affected {
                affected: 1,
                insert_id: 7,
            },
            MockResponse::Error("duplicate key".to_string()),
        ]),
        ..Script::default()
    });
    let mut session = connect(&script, settings());

    session.query("INSERT INTO t VALUES (1)").unwrap();
    assert_eq!(session.insert_id(), 7);

    let outcome = session.query("INSERT INTO t VALUES (1)").unwrap();
    assert_eq!(outcome, None);
    assert_eq!(session.insert_id(), 0);
    assert_eq!(session.last_error(), Some("duplicate key"));

    let log = session.error_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].sql.as_deref(), Some("INSERT INTO t VALUES (1)"));
}

#[test]
fn insert_id_zeroed_when_no_rows_affected() {
    let script = shared_script(Script {
        responses: VecDeque::from(vec![MockResponse::Affected {
            affected: 0,
            insert_id: 9,
        }]),
        ..Script::default()
    });
    let mut session = connect(&script, settings());

    session
        .query("INSERT IGNORE INTO t VALUES (1)")
        .unwrap();
    assert_eq!(session.insert_id(), 0);
}

#[test]
fn dropped_connection_is_retried_transparently() {
    let script = shared_script(Script {
        responses: VecDeque::from(vec![
            MockResponse::Lost,
            MockResponse::Affected {
                affected: 1,
                insert_id: 0,
            },
        ]),
        ..Script::default()
    });
    let mut session = connect(&script, settings());

    let outcome = session.query("UPDATE t SET n = 1").unwrap();
    assert_eq!(outcome, Some(QueryValue::Affected(1)));
    assert!(session.is_ready());

    let script = script.lock().unwrap();
    assert_eq!(script.connect_calls, 2);
    assert_eq!(session.num_queries(), 2);
}

#[test]
fn reconnect_exhaustion_is_fatal_when_bailing() {
    let script = shared_script(Script {
        connect_results: VecDeque::from(vec![true, false, false, false]),
        responses: VecDeque::from(vec![MockResponse::Lost]),
        ..Script::default()
    });
    let config = settings()
        .reconnect_retries(3)
        .reconnect_delay(Duration::from_millis(1));
    let mut session = connect(&script, config);

    let err = session.query("SELECT 1").unwrap_err();
    match err {
        Error::Connection(conn) => {
            assert_eq!(conn.kind, ConnectionErrorKind::ReconnectExhausted);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(script.lock().unwrap().connect_calls, 4);

    // Further statements fail softly once disconnected.
    assert_eq!(session.query("SELECT 1").unwrap(), None);
}

#[test]
fn reconnect_exhaustion_is_soft_without_bailing() {
    let script = shared_script(Script {
        connect_results: VecDeque::from(vec![true, false, false, false]),
        responses: VecDeque::from(vec![MockResponse::Lost]),
        ..Script::default()
    });
    let config = settings()
        .reconnect_retries(3)
        .reconnect_delay(Duration::from_millis(1))
        .allow_bail(false);
    let mut session = connect(&script, config);

    assert_eq!(session.query("SELECT 1").unwrap(), None);
    assert_eq!(session.insert_id(), 0);
    assert_eq!(session.error().map(|e| e.code), Some("db_connect_fail"));
}

#[test]
fn failed_driver_falls_back_to_default() {
    let primary = shared_script(Script {
        connect_results: VecDeque::from(vec![false]),
        ..Script::default()
    });
    let fallback = shared_script(Script::default());

    let mut registry = DriverRegistry::empty();
    registry.register(Arc::new(MockFactory::new("mysql", Arc::clone(&fallback))));
    registry.register(Arc::new(MockFactory::new("primary", Arc::clone(&primary))));

    let session = Session::initialize(settings().driver("primary"), registry).unwrap();
    assert!(session.is_ready());
    assert_eq!(session.driver_name(), "mysql");
    assert_eq!(primary.lock().unwrap().connect_calls, 1);
    assert_eq!(fallback.lock().unwrap().connect_calls, 1);
}

#[test]
fn fallback_disabled_leaves_session_disconnected() {
    let primary = shared_script(Script {
        connect_results: VecDeque::from(vec![false]),
        ..Script::default()
    });
    let fallback = shared_script(Script::default());

    let mut registry = DriverRegistry::empty();
    registry.register(Arc::new(MockFactory::new("mysql", Arc::clone(&fallback))));
    registry.register(Arc::new(MockFactory::new("primary", Arc::clone(&primary))));

    let config = settings()
        .driver("primary")
        .allow_fallback(false)
        .allow_bail(false);
    let session = Session::initialize(config, registry).unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.error().map(|e| e.code), Some("db_connect_fail"));
    assert_eq!(fallback.lock().unwrap().connect_calls, 0);
}

#[test]
fn missing_driver_is_fatal_when_bailing() {
    let err = Session::initialize(settings(), DriverRegistry::empty()).unwrap_err();
    assert!(matches!(err, Error::NoDriver(_)));
}

#[test]
fn missing_driver_is_recorded_without_bailing() {
    let mut session =
        Session::initialize(settings().allow_bail(false), DriverRegistry::empty()).unwrap();
    assert_eq!(session.state(), SessionState::Uninitialized);
    assert_eq!(session.error().map(|e| e.code), Some("db_driver_missing"));
    assert_eq!(session.query("SELECT 1").unwrap(), None);
}

#[test]
fn utf8_upgrades_to_utf8mb4_when_supported() {
    let script = shared_script(Script {
        server_version: "5.7.0".to_string(),
        ..Script::default()
    });
    let session = connect(&script, settings());

    assert_eq!(session.charset(), Some("utf8mb4"));
    assert_eq!(session.collation(), Some("utf8mb4_unicode_ci"));

    let script = script.lock().unwrap();
    assert_eq!(
        script.set_charset_calls,
        vec![(
            "utf8mb4".to_string(),
            Some("utf8mb4_unicode_ci".to_string())
        )]
    );
}

#[test]
fn old_server_keeps_utf8_and_uses_set_names() {
    let script = shared_script(Script {
        server_version: "5.0.0".to_string(),
        ..Script::default()
    });
    let session = connect(&script, settings());

    assert_eq!(session.charset(), Some("utf8"));
    assert_eq!(session.collation(), Some("utf8_unicode_ci"));

    let script = script.lock().unwrap();
    assert!(script.set_charset_calls.is_empty());
    assert!(
        script
            .queries
            .iter()
            .any(|q| q == "SET NAMES 'utf8' COLLATE 'utf8_unicode_ci'")
    );
}

#[test]
fn configured_utf8mb4_downgrades_without_support() {
    let script = shared_script(Script {
        server_version: "5.2.0".to_string(),
        ..Script::default()
    });
    let config = settings()
        .charset("utf8mb4")
        .collation("utf8mb4_general_ci");
    let session = connect(&script, config);

    assert_eq!(session.charset(), Some("utf8"));
    assert_eq!(session.collation(), Some("utf8_general_ci"));
}

#[test]
fn incompatible_sql_modes_are_scrubbed() {
    let script = shared_script(Script {
        sql_mode: "ONLY_FULL_GROUP_BY,NO_ENGINE_SUBSTITUTION,STRICT_TRANS_TABLES,NO_ZERO_IN_DATE"
            .to_string(),
        ..Script::default()
    });
    let mut session = connect(&script, settings());

    {
        let script = script.lock().unwrap();
        assert!(
            script
                .queries
                .iter()
                .any(|q| q == "SET SESSION sql_mode='NO_ENGINE_SUBSTITUTION,NO_ZERO_IN_DATE'")
        );
    }

    session.set_sql_mode(Some(vec![
        "traditional".to_string(),
        "allow_invalid_dates".to_string(),
    ]));
    let script = script.lock().unwrap();
    assert!(
        script
            .queries
            .iter()
            .any(|q| q == "SET SESSION sql_mode='ALLOW_INVALID_DATES'")
    );
}

#[test]
fn close_is_idempotent() {
    let script = shared_script(Script::default());
    let mut session = connect(&script, settings());

    assert!(session.close());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.close());
    assert_eq!(script.lock().unwrap().close_calls, 1);

    assert_eq!(session.query("SELECT 1").unwrap(), None);
}

#[test]
fn charset_validity_check_blocks_unrepresentable_text() {
    let script = shared_script(Script {
        server_version: "5.0.0".to_string(),
        ..Script::default()
    });
    let mut session = connect(&script, settings());
    assert_eq!(session.charset(), Some("utf8"));

    let emoji_sql = "INSERT INTO t VALUES ('\u{1F600}')";
    assert_eq!(session.query(emoji_sql).unwrap(), None);
    assert_eq!(session.num_queries(), 0);

    // A one-shot override lets the next statement through, then re-arms.
    session.skip_next_validity_check();
    assert!(session.query(emoji_sql).unwrap().is_some());
    assert_eq!(session.num_queries(), 1);

    assert_eq!(session.query(emoji_sql).unwrap(), None);
    assert_eq!(session.num_queries(), 1);
}

#[test]
fn utf8mb4_session_accepts_emoji() {
    let script = shared_script(Script::default());
    let mut session = connect(&script, settings());
    assert_eq!(session.charset(), Some("utf8mb4"));

    assert!(
        session
            .query("INSERT INTO t VALUES ('\u{1F600}')")
            .unwrap()
            .is_some()
    );
}

#[test]
fn save_queries_records_timing() {
    let script = shared_script(Script::default());
    let mut session = connect(&script, settings().save_queries(true));

    session.query("SELECT 1").unwrap();
    session.query("SELECT 2").unwrap();

    let log = session.queries();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].sql, "SELECT 1");
    assert_eq!(log[1].sql, "SELECT 2");
}

#[test]
fn select_failure_leaves_session_disconnected() {
    let script = shared_script(Script {
        select_results: VecDeque::from(vec![false]),
        ..Script::default()
    });
    let mut session = connect(&script, settings());

    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.error().map(|e| e.code), Some("db_select_fail"));
    assert_eq!(session.query("SELECT 1").unwrap(), None);
}

#[test]
fn escape_falls_back_before_connection() {
    let mut session =
        Session::initialize(settings().allow_bail(false), DriverRegistry::empty()).unwrap();
    assert_eq!(session.escape("it's"), "it\\'s");
    assert_eq!(session.escape("a\\b"), "a\\\\b");
}

#[test]
fn error_toggles_return_previous_setting() {
    let script = shared_script(Script::default());
    let mut session = connect(&script, settings());

    assert!(!session.suppress_errors(true));
    assert!(session.suppress_errors(false));
    assert!(session.show_errors(false));
    assert!(!session.show_errors(true));
}

#[test]
fn flush_clears_result_state_but_not_insert_id() {
    let script = shared_script(Script {
        responses: VecDeque::from(vec![MockResponse::Affected {
            affected: 1,
            insert_id: 5,
        }]),
        ..Script::default()
    });
    let mut session = connect(&script, settings());

    session.query("INSERT INTO t VALUES (1)").unwrap();
    assert_eq!(session.insert_id(), 5);

    session.flush();
    assert_eq!(session.rows_affected(), 0);
    assert!(session.last_query().is_none());
    assert_eq!(session.insert_id(), 5);
}
