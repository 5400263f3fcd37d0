//! Connection configuration.
//!
//! Settings are explicit values handed over at construction. The optional
//! [`ConnectionSettings::from_env`] constructor reads the conventional
//! `DB_*` environment variables for deployments that configure through
//! the environment.

use std::env;
use std::time::Duration;

/// SQL modes stripped from the session because the layer's generated
/// statements rely on permissive server behavior.
pub const INCOMPATIBLE_MODES: [&str; 6] = [
    "NO_ZERO_DATE",
    "ONLY_FULL_GROUP_BY",
    "STRICT_TRANS_TABLES",
    "STRICT_ALL_TABLES",
    "TRADITIONAL",
    "ANSI",
];

/// TLS material for an encrypted connection.
///
/// Encryption is all-or-nothing: it engages only when the client key,
/// client certificate, and CA bundle are all present and non-empty.
/// Partial material is ignored rather than producing a half-configured
/// session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Path to the client private key
    pub key: Option<String>,
    /// Path to the client certificate
    pub cert: Option<String>,
    /// Path to the certificate authority bundle
    pub ca: Option<String>,
    /// Path to a directory of CA certificates
    pub ca_path: Option<String>,
    /// Cipher list restriction
    pub cipher: Option<String>,
}

/// TLS options that passed the all-or-nothing gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTls {
    pub key: String,
    pub cert: String,
    pub ca: String,
    pub ca_path: Option<String>,
    pub cipher: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(String::from)
}

impl TlsOptions {
    /// Apply the all-or-nothing gate.
    ///
    /// `Some` only when key, cert, and CA are all set and non-empty.
    /// `ca_path` and `cipher` ride along when present.
    pub fn resolve(&self) -> Option<ResolvedTls> {
        let key = non_empty(&self.key)?;
        let cert = non_empty(&self.cert)?;
        let ca = non_empty(&self.ca)?;
        Some(ResolvedTls {
            key,
            cert,
            ca,
            ca_path: non_empty(&self.ca_path),
            cipher: non_empty(&self.cipher),
        })
    }
}

/// Everything needed to open and maintain a database session.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Database to select after connecting
    pub database: String,
    /// Host, optionally with `:port` or `:/path/to.sock` appended
    pub host: String,
    /// Connection character set; `None` means the session layer's
    /// default of `utf8` (upgraded to `utf8mb4` when supported)
    pub charset: Option<String>,
    /// Connection collation; `None` lets the charset pick its default
    pub collation: Option<String>,
    /// TLS material, gated all-or-nothing
    pub tls: TlsOptions,
    /// Explicit driver override by registry name
    pub driver: Option<String>,
    /// SQL modes stripped from the session after connecting
    pub incompatible_modes: Vec<String>,
    /// Reconnect attempts before giving up on a dropped connection
    pub reconnect_retries: u32,
    /// Pause between reconnect attempts
    pub reconnect_delay: Duration,
    /// Whether a failed non-default driver may fall back to the default
    pub allow_fallback: bool,
    /// Whether fatal conditions surface as errors (vs. silent failure
    /// sentinels)
    pub allow_bail: bool,
    /// Whether per-statement timing is recorded
    pub save_queries: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            database: String::new(),
            host: "localhost".to_string(),
            charset: None,
            collation: None,
            tls: TlsOptions::default(),
            driver: None,
            incompatible_modes: INCOMPATIBLE_MODES.iter().map(ToString::to_string).collect(),
            reconnect_retries: 5,
            reconnect_delay: Duration::from_secs(1),
            allow_fallback: true,
            allow_bail: true,
            save_queries: false,
        }
    }
}

impl ConnectionSettings {
    /// Start from defaults with the required connection coordinates.
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            database: database.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    /// Read settings from the conventional `DB_*` environment variables.
    ///
    /// Unset variables keep their defaults. `DB_RECONNECT_RETRIES` must
    /// parse as an integer to take effect; `SAVEQUERIES` engages on any
    /// value other than `0`, `false`, or empty.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(user) = env::var("DB_USER") {
            settings.user = user;
        }
        if let Ok(password) = env::var("DB_PASSWORD") {
            settings.password = password;
        }
        if let Ok(database) = env::var("DB_NAME") {
            settings.database = database;
        }
        if let Ok(host) = env::var("DB_HOST") {
            settings.host = host;
        }
        settings.charset = env::var("DB_CHARSET").ok().filter(|v| !v.is_empty());
        settings.collation = env::var("DB_COLLATE").ok().filter(|v| !v.is_empty());
        settings.driver = env::var("DB_DRIVER").ok().filter(|v| !v.is_empty());
        settings.tls = TlsOptions {
            key: env::var("DB_SSL_KEY").ok(),
            cert: env::var("DB_SSL_CERT").ok(),
            ca: env::var("DB_SSL_CA").ok(),
            ca_path: env::var("DB_SSL_CA_PATH").ok(),
            cipher: env::var("DB_SSL_CIPHER").ok(),
        };
        if let Some(retries) = env::var("DB_RECONNECT_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            settings.reconnect_retries = retries;
        }
        if let Ok(flag) = env::var("SAVEQUERIES") {
            settings.save_queries = !matches!(flag.as_str(), "" | "0" | "false");
        }
        settings
    }

    /// Set the connection character set.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Set the connection collation.
    #[must_use]
    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    /// Force a specific driver by registry name.
    #[must_use]
    pub fn driver(mut self, name: impl Into<String>) -> Self {
        self.driver = Some(name.into());
        self
    }

    /// Set TLS material.
    #[must_use]
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Set the reconnect attempt count.
    #[must_use]
    pub fn reconnect_retries(mut self, retries: u32) -> Self {
        self.reconnect_retries = retries;
        self
    }

    /// Set the pause between reconnect attempts.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Permit or forbid falling back to the default driver when the
    /// selected one cannot connect.
    #[must_use]
    pub fn allow_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = allow;
        self
    }

    /// Choose whether fatal conditions surface as errors.
    #[must_use]
    pub fn allow_bail(mut self, allow: bool) -> Self {
        self.allow_bail = allow;
        self
    }

    /// Record per-statement timing.
    #[must_use]
    pub fn save_queries(mut self, save: bool) -> Self {
        self.save_queries = save;
        self
    }

    /// Split the configured host into `(host, port_or_socket)`.
    ///
    /// A `:` suffix carries either a port number or a socket path; with
    /// no suffix the default port 3306 applies.
    pub fn split_host(&self) -> (String, String) {
        match self.host.split_once(':') {
            Some((host, port_or_socket)) => (host.to_string(), port_or_socket.to_string()),
            None => (self.host.clone(), "3306".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_gate_is_all_or_nothing() {
        let mut tls = TlsOptions {
            key: Some("/etc/ssl/client-key.pem".to_string()),
            cert: Some("/etc/ssl/client-cert.pem".to_string()),
            ca: None,
            ca_path: None,
            cipher: None,
        };
        assert!(tls.resolve().is_none());

        tls.ca = Some(String::new());
        assert!(tls.resolve().is_none());

        tls.ca = Some("/etc/ssl/ca.pem".to_string());
        let resolved = tls.resolve().unwrap();
        assert_eq!(resolved.ca, "/etc/ssl/ca.pem");
        assert_eq!(resolved.ca_path, None);
    }

    #[test]
    fn tls_riders_filtered_when_empty() {
        let tls = TlsOptions {
            key: Some("k".to_string()),
            cert: Some("c".to_string()),
            ca: Some("a".to_string()),
            ca_path: Some(String::new()),
            cipher: Some("TLS_AES_256_GCM_SHA384".to_string()),
        };
        let resolved = tls.resolve().unwrap();
        assert_eq!(resolved.ca_path, None);
        assert_eq!(resolved.cipher.as_deref(), Some("TLS_AES_256_GCM_SHA384"));
    }

    #[test]
    fn host_splitting() {
        let mut settings = ConnectionSettings::new("u", "p", "db", "db.example.com:3307");
        assert_eq!(
            settings.split_host(),
            ("db.example.com".to_string(), "3307".to_string())
        );

        settings.host = "localhost".to_string();
        assert_eq!(
            settings.split_host(),
            ("localhost".to_string(), "3306".to_string())
        );

        settings.host = "localhost:/var/run/mysqld/mysqld.sock".to_string();
        let (host, port) = settings.split_host();
        assert_eq!(host, "localhost");
        assert_eq!(port, "/var/run/mysqld/mysqld.sock");
    }

    #[test]
    fn defaults() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.reconnect_retries, 5);
        assert_eq!(settings.reconnect_delay, Duration::from_secs(1));
        assert!(settings.allow_fallback);
        assert!(settings.allow_bail);
        assert!(!settings.save_queries);
        assert!(settings.incompatible_modes.contains(&"TRADITIONAL".to_string()));
    }
}
