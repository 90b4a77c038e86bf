//! Configuration handling for the SSMS MCP Server.
//!
//! Settings come from CLI arguments with environment-variable fallbacks.
//! Each database target is configured by its own `<PREFIX>_SERVER`,
//! `<PREFIX>_NAME`, `<PREFIX>_USER` and `<PREFIX>_PASSWORD` variables.

use crate::models::DatabaseTarget;
use clap::{ArgAction, Parser, ValueEnum};
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_SQL_SERVER_PORT: u16 = 1433;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_ROWS: u32 = 1000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// HTTP with Server-Sent Events (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// A SQL Server address after normalisation.
///
/// Accepts `host`, `host,port`, `host:port`, `host\instance`, `host/instance`
/// and any of those behind a `tcp:` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: Option<u16>,
    pub instance: Option<String>,
}

impl ServerAddress {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut s = raw.trim();
        if s.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("tcp:")) {
            s = &s[4..];
        }
        if s.is_empty() {
            return Err("server address is empty".to_string());
        }

        let (rest, port) = match s.rfind([',', ':']) {
            Some(idx) => {
                let port_text = s[idx + 1..].trim();
                let port = port_text
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port '{port_text}' in server '{raw}'"))?;
                (&s[..idx], Some(port))
            }
            None => (s, None),
        };

        let (host, instance) = match rest.find(['\\', '/']) {
            Some(idx) => {
                let instance = rest[idx + 1..].trim();
                if instance.is_empty() {
                    return Err(format!("empty instance name in server '{raw}'"));
                }
                (&rest[..idx], Some(instance.to_string()))
            }
            None => (rest, None),
        };

        let host = host.trim();
        if host.is_empty() {
            return Err(format!("missing host in server '{raw}'"));
        }
        // "." and "(local)" are ODBC aliases for the local machine
        let host = match host {
            "." | "(local)" => "localhost",
            other => other,
        };

        Ok(Self {
            host: host.to_string(),
            port,
            instance,
        })
    }
}

impl std::fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.host)?;
        if let Some(instance) = &self.instance {
            write!(f, "\\{instance}")?;
        }
        if let Some(port) = self.port {
            write!(f, ",{port}")?;
        }
        Ok(())
    }
}

/// How a target authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    SqlServer { user: String, password: String },
    /// Windows integrated authentication, selected when user or password is empty
    Integrated,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SqlServer { user, .. } => f
                .debug_struct("SqlServer")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
            Self::Integrated => f.write_str("Integrated"),
        }
    }
}

/// Fully resolved connection parameters for one target.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub target: DatabaseTarget,
    pub server: ServerAddress,
    pub database: String,
    pub credentials: Credentials,
}

/// Pool and statement settings shared by both targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub query_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_connections: u32,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            encrypt: true,
            trust_server_certificate: true,
        }
    }
}

/// Configuration for the SSMS MCP Server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ssms-mcp-server",
    about = "MCP server exposing SQL Server introspection and CRUD tools",
    version,
    author
)]
pub struct Config {
    /// Master database server (host, host,port or host\instance)
    #[arg(long, env = "MASTER_DB_SERVER")]
    pub master_server: Option<String>,

    /// Master database name
    #[arg(long, env = "MASTER_DB_NAME")]
    pub master_database: Option<String>,

    /// Master database user. Leave empty for integrated authentication.
    #[arg(long, env = "MASTER_DB_USER")]
    pub master_user: Option<String>,

    /// Master database password
    #[arg(long, env = "MASTER_DB_PASSWORD", hide_env_values = true)]
    pub master_password: Option<String>,

    /// Master database port when not given in the server address
    #[arg(long, env = "MASTER_DB_PORT")]
    pub master_port: Option<u16>,

    /// Data-management database server
    #[arg(long, env = "DATA_MGMT_DB_SERVER")]
    pub datamgmt_server: Option<String>,

    /// Data-management database name
    #[arg(long, env = "DATA_MGMT_DB_NAME")]
    pub datamgmt_database: Option<String>,

    /// Data-management database user. Leave empty for integrated authentication.
    #[arg(long, env = "DATA_MGMT_DB_USER")]
    pub datamgmt_user: Option<String>,

    /// Data-management database password
    #[arg(long, env = "DATA_MGMT_DB_PASSWORD", hide_env_values = true)]
    pub datamgmt_password: Option<String>,

    /// Data-management database port when not given in the server address
    #[arg(long, env = "DATA_MGMT_DB_PORT")]
    pub datamgmt_port: Option<u16>,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "MCP_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "MCP_HTTP_PORT")]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(long, default_value = DEFAULT_MCP_ENDPOINT, env = "MCP_ENDPOINT")]
    pub mcp_endpoint: String,

    /// Statement timeout in seconds
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT_SECS, env = "QUERY_TIMEOUT")]
    pub query_timeout: u64,

    /// Connection (pool checkout) timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECTION_TIMEOUT_SECS,
        env = "CONNECTION_TIMEOUT"
    )]
    pub connection_timeout: u64,

    /// Maximum rows returned by a single query
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS, env = "MAX_ROWS")]
    pub max_rows: u32,

    /// Maximum pooled connections per target
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS, env = "MAX_CONNECTIONS")]
    pub max_connections: u32,

    /// Require TLS encryption
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "DB_ENCRYPT")]
    pub encrypt: bool,

    /// Accept the server certificate without validation
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        env = "DB_TRUST_SERVER_CERTIFICATE"
    )]
    pub trust_server_certificate: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            master_server: None,
            master_database: None,
            master_user: None,
            master_password: None,
            master_port: None,
            datamgmt_server: None,
            datamgmt_database: None,
            datamgmt_user: None,
            datamgmt_password: None,
            datamgmt_port: None,
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT_SECS,
            max_rows: DEFAULT_MAX_ROWS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            encrypt: true,
            trust_server_certificate: true,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Validate numeric settings and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("MAX_CONNECTIONS must be greater than 0".to_string());
        }
        if self.max_rows == 0 {
            return Err("MAX_ROWS must be greater than 0".to_string());
        }
        if self.query_timeout == 0 {
            return Err("QUERY_TIMEOUT must be greater than 0".to_string());
        }
        if self.connection_timeout == 0 {
            return Err("CONNECTION_TIMEOUT must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Resolve the connection parameters for a target.
    ///
    /// Returns `Ok(None)` when the target's server or database name is unset;
    /// such a target stays unavailable without failing startup.
    pub fn target(&self, target: DatabaseTarget) -> Result<Option<TargetConfig>, String> {
        let (server, database, user, password, port) = match target {
            DatabaseTarget::Master => (
                &self.master_server,
                &self.master_database,
                &self.master_user,
                &self.master_password,
                self.master_port,
            ),
            DatabaseTarget::DataMgmt => (
                &self.datamgmt_server,
                &self.datamgmt_database,
                &self.datamgmt_user,
                &self.datamgmt_password,
                self.datamgmt_port,
            ),
        };

        let (Some(server), Some(database)) = (non_empty(server), non_empty(database)) else {
            return Ok(None);
        };

        let mut address = ServerAddress::parse(server)
            .map_err(|e| format!("{}_SERVER: {e}", target.env_prefix()))?;
        if address.port.is_none() {
            address.port = port;
        }

        let credentials = match (non_empty(user), non_empty(password)) {
            (Some(user), Some(password)) => Credentials::SqlServer {
                user: user.to_string(),
                password: password.to_string(),
            },
            _ => Credentials::Integrated,
        };

        Ok(Some(TargetConfig {
            target,
            server: address,
            database: database.to_string(),
            credentials,
        }))
    }

    /// Get the shared pool and statement settings.
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            query_timeout: Duration::from_secs(self.query_timeout),
            connect_timeout: Duration::from_secs(self.connection_timeout),
            max_connections: self.max_connections,
            encrypt: self.encrypt,
            trust_server_certificate: self.trust_server_certificate,
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        Config {
            master_server: Some("sql01".to_string()),
            master_database: Some("MasterDB".to_string()),
            master_user: Some("sa".to_string()),
            master_password: Some("secret".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.max_rows, DEFAULT_MAX_ROWS);
        assert!(config.encrypt);
        assert!(config.trust_server_certificate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_bind_addr() {
        let config = Config {
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            ..Config::default()
        };
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = Config {
            max_connections: 0,
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().contains("MAX_CONNECTIONS"));

        let config = Config {
            max_rows: 0,
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().contains("MAX_ROWS"));
    }

    #[test]
    fn test_connection_settings_durations() {
        let config = Config {
            query_timeout: 45,
            connection_timeout: 5,
            ..Config::default()
        };
        let settings = config.connection_settings();
        assert_eq!(settings.query_timeout, Duration::from_secs(45));
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_plain_host() {
        let addr = ServerAddress::parse("sql01").unwrap();
        assert_eq!(addr.host, "sql01");
        assert_eq!(addr.port, None);
        assert_eq!(addr.instance, None);
    }

    #[test]
    fn test_parse_strips_tcp_prefix() {
        let addr = ServerAddress::parse("TCP:10.0.0.5,1444").unwrap();
        assert_eq!(addr.host, "10.0.0.5");
        assert_eq!(addr.port, Some(1444));
    }

    #[test]
    fn test_parse_colon_port() {
        let addr = ServerAddress::parse("db.internal:1533").unwrap();
        assert_eq!(addr.port, Some(1533));
    }

    #[test]
    fn test_parse_named_instance_both_separators() {
        let back = ServerAddress::parse("SERVER\\SQLEXPRESS").unwrap();
        let fwd = ServerAddress::parse("SERVER/SQLEXPRESS").unwrap();
        assert_eq!(back, fwd);
        assert_eq!(back.instance.as_deref(), Some("SQLEXPRESS"));
        assert_eq!(back.to_string(), "SERVER\\SQLEXPRESS");
    }

    #[test]
    fn test_parse_local_alias() {
        assert_eq!(ServerAddress::parse(".\\SQLEXPRESS").unwrap().host, "localhost");
        assert_eq!(ServerAddress::parse("(local)").unwrap().host, "localhost");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ServerAddress::parse("").is_err());
        assert!(ServerAddress::parse("tcp:").is_err());
        assert!(ServerAddress::parse("host,notaport").is_err());
        assert!(ServerAddress::parse("host\\").is_err());
    }

    #[test]
    fn test_target_unconfigured_is_none() {
        let config = Config::default();
        assert!(config.target(DatabaseTarget::Master).unwrap().is_none());
        let config = Config {
            master_server: Some("sql01".to_string()),
            master_database: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(config.target(DatabaseTarget::Master).unwrap().is_none());
    }

    #[test]
    fn test_target_sql_server_credentials() {
        let target = configured().target(DatabaseTarget::Master).unwrap().unwrap();
        assert_eq!(target.database, "MasterDB");
        assert_eq!(
            target.credentials,
            Credentials::SqlServer {
                user: "sa".to_string(),
                password: "secret".to_string()
            }
        );
        assert!(!format!("{:?}", target.credentials).contains("secret"));
    }

    #[test]
    fn test_target_empty_password_selects_integrated() {
        let config = Config {
            master_password: Some(String::new()),
            ..configured()
        };
        let target = config.target(DatabaseTarget::Master).unwrap().unwrap();
        assert_eq!(target.credentials, Credentials::Integrated);
    }

    #[test]
    fn test_target_port_fallback() {
        let config = Config {
            master_port: Some(1500),
            ..configured()
        };
        let target = config.target(DatabaseTarget::Master).unwrap().unwrap();
        assert_eq!(target.server.port, Some(1500));

        let config = Config {
            master_server: Some("sql01,1600".to_string()),
            master_port: Some(1500),
            ..configured()
        };
        let target = config.target(DatabaseTarget::Master).unwrap().unwrap();
        assert_eq!(target.server.port, Some(1600));
    }

    #[test]
    fn test_targets_are_independent() {
        let config = configured();
        assert!(config.target(DatabaseTarget::DataMgmt).unwrap().is_none());
    }

    #[test]
    fn test_target_bad_server_names_prefix() {
        let config = Config {
            master_server: Some("host,abc".to_string()),
            ..configured()
        };
        assert!(config.target(DatabaseTarget::Master).unwrap_err().contains("MASTER_DB_SERVER"));
    }
}
