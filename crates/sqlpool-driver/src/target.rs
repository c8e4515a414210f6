//! Connection target parsing.
//!
//! A connection target is the `;`-separated `key=value` string that tells a
//! driver where the backing store lives and how to authenticate:
//!
//! ```text
//! Server=db.internal,5432;Database=app;User Id=svc;Password=secret
//! ```
//!
//! Keys are case-insensitive. Keys the pool layer does not understand are
//! kept in [`ConnectionTarget::options`] for the driver to interpret.

use std::fmt;

use crate::error::DriverError;

/// A parsed connection target.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    raw: String,
    host: String,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    options: Vec<(String, String)>,
}

impl ConnectionTarget {
    /// Parse a connection target string.
    ///
    /// Fails when the string is empty, contains a part without `=`, carries an
    /// invalid port, or names no server.
    pub fn parse(target: &str) -> Result<Self, DriverError> {
        let raw = target.trim();
        if raw.is_empty() {
            return Err(DriverError::Config("connection target is empty".into()));
        }

        let mut host = None;
        let mut port = None;
        let mut database = None;
        let mut user = None;
        let mut password = None;
        let mut options = Vec::new();

        for part in raw.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| DriverError::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "server" | "data source" | "host" => {
                    // host,port or host:port
                    if let Some((h, p)) = value.split_once(',').or_else(|| value.split_once(':')) {
                        host = Some(h.trim().to_string());
                        port = Some(parse_port(p.trim())?);
                    } else {
                        host = Some(value.to_string());
                    }
                }
                "port" => {
                    port = Some(parse_port(value)?);
                }
                "database" | "initial catalog" => {
                    database = Some(value.to_string());
                }
                "user id" | "uid" | "user" | "username" => {
                    user = Some(value.to_string());
                }
                "password" | "pwd" => {
                    password = Some(value.to_string());
                }
                _ => {
                    tracing::debug!(key = %key, "passing connection target option to driver");
                    options.push((key, value.to_string()));
                }
            }
        }

        let host = host
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DriverError::Config("connection target names no server".into()))?;

        Ok(Self {
            raw: raw.to_string(),
            host,
            port,
            database,
            user,
            password,
            options,
        })
    }

    /// The target string as given (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Server host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port, if one was given.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Database name, if one was given.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// User name, if one was given.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Password, if one was given.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Driver-specific options, keys lowercased, in the order given.
    #[must_use]
    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }

    /// Look up a driver-specific option by (case-insensitive) key.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.options
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn parse_port(value: &str) -> Result<u16, DriverError> {
    value
        .parse()
        .map_err(|_| DriverError::Config(format!("invalid port: {value}")))
}

// Credentials stay out of logs.
impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("options", &self.options)
            .finish()
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.host, port)?,
            None => write!(f, "{}", self.host)?,
        }
        if let Some(db) = &self.database {
            write!(f, "/{db}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ConnectionTarget {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_target() {
        let target = ConnectionTarget::parse(
            "Server=db.internal,5433;Database=app;User Id=svc;Password=secret;SslMode=require",
        )
        .unwrap();

        assert_eq!(target.host(), "db.internal");
        assert_eq!(target.port(), Some(5433));
        assert_eq!(target.database(), Some("app"));
        assert_eq!(target.user(), Some("svc"));
        assert_eq!(target.password(), Some("secret"));
        assert_eq!(target.option("sslmode"), Some("require"));
        assert_eq!(target.option("SSLMODE"), Some("require"));
    }

    #[test]
    fn test_parse_host_colon_port_and_aliases() {
        let target = ConnectionTarget::parse("host=localhost:5432;initial catalog=test;uid=sa").unwrap();
        assert_eq!(target.host(), "localhost");
        assert_eq!(target.port(), Some(5432));
        assert_eq!(target.database(), Some("test"));
        assert_eq!(target.user(), Some("sa"));
    }

    #[test]
    fn test_parse_rejects_empty() {
        let err = ConnectionTarget::parse("   ").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_parse_rejects_missing_server() {
        let err = ConnectionTarget::parse("Database=app;User Id=svc").unwrap_err();
        assert!(err.to_string().contains("names no server"));
    }

    #[test]
    fn test_parse_rejects_bad_pair_and_port() {
        assert!(ConnectionTarget::parse("Server=db;garbage").is_err());
        assert!(ConnectionTarget::parse("Server=db,notaport").is_err());
        assert!(ConnectionTarget::parse("Server=db;Port=70000").is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let target = ConnectionTarget::parse("Server=db;Password=hunter2").unwrap();
        let debug = format!("{target:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_display() {
        let target = ConnectionTarget::parse("Server=db,1;Database=app").unwrap();
        assert_eq!(target.to_string(), "db:1/app");
        let target: ConnectionTarget = "Server=db".parse().unwrap();
        assert_eq!(target.to_string(), "db");
    }
}
