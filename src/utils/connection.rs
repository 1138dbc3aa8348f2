// backuptool/src/utils/connection.rs
use std::fmt;
use url::Url;

use crate::errors::{BackupError, Result};

/// Database engines whose connection strings we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Postgres,
    MySql,
    MongoDb,
}

impl DatabaseKind {
    pub fn default_port(self) -> u16 {
        match self {
            DatabaseKind::Postgres => 5432,
            DatabaseKind::MySql => 3306,
            DatabaseKind::MongoDb => 27017,
        }
    }

    /// Scheme used when the connection string carries none.
    fn canonical_scheme(self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::MySql => "mysql",
            DatabaseKind::MongoDb => "mongodb",
        }
    }

    fn known_prefixes(self) -> &'static [&'static str] {
        match self {
            DatabaseKind::Postgres => &["postgres://", "postgresql://"],
            DatabaseKind::MySql => &["mysql://"],
            DatabaseKind::MongoDb => &["mongodb://"],
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_scheme())
    }
}

/// Connection parameters extracted from a job's `source` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub auth_database: Option<String>,
}

impl ConnectionParams {
    /// Returns the database name, failing when the connection string had none.
    pub fn require_database(&self) -> Result<&str> {
        if self.database.is_empty() {
            return Err(BackupError::Parse("database name is required".to_string()));
        }
        Ok(&self.database)
    }

    /// `host:port` as most dump tools expect it.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses a database connection string such as `postgres://user:pw@db.internal:5432/app`.
///
/// The scheme prefix is optional, but a scheme belonging to another engine is
/// rejected. Missing ports fall back to the engine's well-known port and a
/// missing host to `localhost`. For MongoDB only the first path segment is used
/// as the database name and `authSource` is captured.
pub fn parse_connection_string(raw: &str, kind: DatabaseKind) -> Result<ConnectionParams> {
    let raw = raw.trim();
    let without_scheme = match kind.known_prefixes().iter().find_map(|prefix| raw.strip_prefix(prefix)) {
        Some(rest) => rest,
        None if has_scheme(raw) => {
            return Err(BackupError::Parse(format!(
                "unexpected scheme in {} connection string, expected one of {}",
                kind,
                kind.known_prefixes().join(", ")
            )));
        }
        None => raw,
    };
    let normalized = format!("{}://{}", kind.canonical_scheme(), without_scheme);

    let url = Url::parse(&normalized)
        .map_err(|e| BackupError::Parse(format!("invalid {} connection string: {}", kind, e)))?;

    let host = match url.host_str() {
        Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']').to_string(),
        _ => "localhost".to_string(),
    };
    let port = url.port().unwrap_or_else(|| kind.default_port());
    let user = decode_component(url.username())?;
    let password = match url.password() {
        Some(p) => decode_component(p)?,
        None => String::new(),
    };

    let path = url.path().trim_start_matches('/');
    let database = match kind {
        DatabaseKind::MongoDb => path.split('/').next().unwrap_or_default(),
        _ => path,
    };
    let database = decode_component(database)?;

    let auth_database = match kind {
        DatabaseKind::MongoDb => url
            .query_pairs()
            .find(|(key, _)| key == "authSource")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty()),
        _ => None,
    };

    Ok(ConnectionParams {
        host,
        port,
        user,
        password,
        database,
        auth_database,
    })
}

fn has_scheme(raw: &str) -> bool {
    raw.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn decode_component(value: &str) -> Result<String> {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .map_err(|e| BackupError::Parse(format!("invalid percent-encoding in '{}': {}", value, e)))
}
