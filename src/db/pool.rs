//! Connection pool management.
//!
//! One `bb8` pool of `tiberius` connections per database target, created on
//! first use. A failed connect leaves the slot empty so the next call starts
//! from scratch; nothing is cached about the failure.

use crate::config::{
    Config, ConnectionSettings, Credentials, DEFAULT_SQL_SERVER_PORT, TargetConfig,
};
use crate::db::params::bind_param;
use crate::db::provider::{SqlExecutor, SqlStatement};
use crate::db::types::convert_result_sets;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseTarget, ResultSet};
use async_trait::async_trait;
use bb8::{ManageConnection, Pool, PooledConnection, RunError};
use bb8_tiberius::ConnectionManager as TiberiusManager;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tiberius::{AuthMethod, EncryptionLevel, Query};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

type MssqlPool = Pool<TiberiusManager>;

struct PoolSlot {
    config: Option<TargetConfig>,
    pool: RwLock<Option<MssqlPool>>,
}

#[derive(Clone)]
pub struct ConnectionManager {
    slots: Arc<HashMap<DatabaseTarget, PoolSlot>>,
    settings: ConnectionSettings,
}

impl ConnectionManager {
    /// Create a manager for the given targets. Targets not listed stay unconfigured.
    pub fn new(targets: Vec<TargetConfig>, settings: ConnectionSettings) -> Self {
        let mut by_target: HashMap<DatabaseTarget, TargetConfig> =
            targets.into_iter().map(|t| (t.target, t)).collect();

        let slots = DatabaseTarget::ALL
            .into_iter()
            .map(|target| {
                let slot = PoolSlot {
                    config: by_target.remove(&target),
                    pool: RwLock::new(None),
                };
                (target, slot)
            })
            .collect();

        Self {
            slots: Arc::new(slots),
            settings,
        }
    }

    /// Build a manager from CLI/environment configuration.
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let mut targets = Vec::new();
        for target in DatabaseTarget::ALL {
            match config.target(target)? {
                Some(t) => targets.push(t),
                None => warn!(
                    database = %target,
                    "Target not configured; set {}_SERVER and {}_NAME to enable it",
                    target.env_prefix(),
                    target.env_prefix()
                ),
            }
        }
        Ok(Self::new(targets, config.connection_settings()))
    }

    pub fn is_configured(&self, target: DatabaseTarget) -> bool {
        self.slots
            .get(&target)
            .is_some_and(|slot| slot.config.is_some())
    }

    pub async fn is_connected(&self, target: DatabaseTarget) -> bool {
        match self.slots.get(&target) {
            Some(slot) => slot.pool.read().await.is_some(),
            None => false,
        }
    }

    /// Establish the target's pool, or reuse the existing one.
    pub async fn connect(&self, target: DatabaseTarget) -> DbResult<()> {
        self.pool(target).await.map(|_| ())
    }

    /// Release the target's pool. No-op when not connected.
    pub async fn disconnect(&self, target: DatabaseTarget) {
        let Some(slot) = self.slots.get(&target) else {
            return;
        };
        if slot.pool.write().await.take().is_some() {
            info!(database = %target, "Disconnected");
        }
    }

    /// Close all database connections.
    pub async fn close_all(&self) {
        for target in DatabaseTarget::ALL {
            self.disconnect(target).await;
        }
    }

    fn slot(&self, target: DatabaseTarget) -> DbResult<(&PoolSlot, &TargetConfig)> {
        let slot = self
            .slots
            .get(&target)
            .ok_or_else(|| DbError::internal(format!("no pool slot for target '{target}'")))?;
        let config = slot.config.as_ref().ok_or_else(|| {
            DbError::connection(
                format!("Database target '{target}' is not configured"),
                format!(
                    "Set {p}_SERVER, {p}_NAME, {p}_USER and {p}_PASSWORD",
                    p = target.env_prefix()
                ),
            )
        })?;
        Ok((slot, config))
    }

    async fn pool(&self, target: DatabaseTarget) -> DbResult<MssqlPool> {
        let (slot, config) = self.slot(target)?;

        if let Some(pool) = slot.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }

        let mut guard = slot.pool.write().await;
        // Another task may have connected while we waited for the write lock
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let pool = self.open_pool(config).await?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    async fn open_pool(&self, target: &TargetConfig) -> DbResult<MssqlPool> {
        info!(
            database = %target.target,
            server = %target.server,
            catalog = %target.database,
            "Connecting to SQL Server"
        );

        let tds_config = tiberius_config(target, &self.settings)?;
        let mut manager = TiberiusManager::new(tds_config);
        if target.server.port.is_none() && target.server.instance.is_some() {
            manager = manager.using_named_connection();
        }

        // Open one connection directly so refusals and login failures surface
        // as they are, rather than as a pool checkout timeout
        let first = match timeout(self.settings.connect_timeout, manager.connect()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(DbError::connection(
                    format!("Failed to connect to '{}': {}", target.target, e),
                    "Check server address, credentials, and that SQL Server accepts TCP connections",
                ));
            }
            Err(_) => {
                return Err(DbError::connection(
                    format!(
                        "Connecting to '{}' did not complete within {:?}",
                        target.target, self.settings.connect_timeout
                    ),
                    "Check that the server is reachable and CONNECTION_TIMEOUT is large enough",
                ));
            }
        };

        let pool = Pool::builder()
            .max_size(self.settings.max_connections)
            .connection_timeout(self.settings.connect_timeout)
            .build_unchecked(manager);
        pool.add(first).map_err(|_| {
            DbError::internal(format!("Failed to seed pool for '{}'", target.target))
        })?;

        info!(
            database = %target.target,
            max_connections = self.settings.max_connections,
            "Connection pool ready"
        );
        Ok(pool)
    }

    async fn checkout<'a>(
        &self,
        pool: &'a MssqlPool,
    ) -> DbResult<PooledConnection<'a, TiberiusManager>> {
        pool.get().await.map_err(|e| match e {
            RunError::TimedOut => {
                DbError::timeout("connection pool acquire", self.settings.connect_timeout)
            }
            RunError::User(e) => DbError::connection(
                format!("Failed to open connection: {e}"),
                "Check server address, credentials, and that SQL Server accepts TCP connections",
            ),
        })
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = DbResult<T>>,
    ) -> DbResult<T> {
        match timeout(self.settings.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DbError::timeout(operation, self.settings.query_timeout)),
        }
    }
}

/// Translate a target's settings into a driver configuration.
fn tiberius_config(
    target: &TargetConfig,
    settings: &ConnectionSettings,
) -> DbResult<tiberius::Config> {
    let mut config = tiberius::Config::new();
    config.host(&target.server.host);
    match (target.server.port, &target.server.instance) {
        (Some(port), _) => config.port(port),
        (None, Some(instance)) => config.instance_name(instance),
        (None, None) => config.port(DEFAULT_SQL_SERVER_PORT),
    }
    config.database(&target.database);
    config.application_name(env!("CARGO_PKG_NAME"));

    match &target.credentials {
        Credentials::SqlServer { user, password } => {
            config.authentication(AuthMethod::sql_server(user, password));
        }
        Credentials::Integrated => integrated_auth(&mut config, target.target)?,
    }

    if settings.trust_server_certificate {
        config.trust_cert();
    }
    config.encryption(if settings.encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });

    Ok(config)
}

#[cfg(windows)]
fn integrated_auth(config: &mut tiberius::Config, _target: DatabaseTarget) -> DbResult<()> {
    config.authentication(AuthMethod::Integrated);
    Ok(())
}

#[cfg(not(windows))]
fn integrated_auth(_config: &mut tiberius::Config, target: DatabaseTarget) -> DbResult<()> {
    Err(DbError::connection(
        format!("Integrated authentication for '{target}' is only supported on Windows"),
        format!(
            "Set {p}_USER and {p}_PASSWORD to use SQL Server authentication",
            p = target.env_prefix()
        ),
    ))
}

#[async_trait]
impl SqlExecutor for ConnectionManager {
    async fn query(&self, target: DatabaseTarget, stmt: &SqlStatement) -> DbResult<Vec<ResultSet>> {
        let pool = self.pool(target).await?;
        let started = Instant::now();
        debug!(database = %target, sql = %stmt.sql, params = stmt.params.len(), "Executing query");

        let sets = self
            .with_timeout("query", async {
                let mut conn = self.checkout(&pool).await?;
                let mut query = Query::new(stmt.sql.as_str());
                for param in &stmt.params {
                    bind_param(&mut query, param);
                }
                let stream = query.query(&mut *conn).await?;
                convert_result_sets(stream.into_results().await?)
            })
            .await?;

        debug!(
            database = %target,
            result_sets = sets.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query completed"
        );
        Ok(sets)
    }

    async fn execute(&self, target: DatabaseTarget, stmt: &SqlStatement) -> DbResult<u64> {
        let pool = self.pool(target).await?;
        let started = Instant::now();
        debug!(database = %target, sql = %stmt.sql, params = stmt.params.len(), "Executing statement");

        let affected = self
            .with_timeout("execute", async {
                let mut conn = self.checkout(&pool).await?;
                let mut query = Query::new(stmt.sql.as_str());
                for param in &stmt.params {
                    bind_param(&mut query, param);
                }
                Ok(query.execute(&mut *conn).await?.total())
            })
            .await?;

        debug!(
            database = %target,
            rows_affected = affected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Statement completed"
        );
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerAddress;
    use std::time::Duration;

    fn target_config(target: DatabaseTarget, server: &str, credentials: Credentials) -> TargetConfig {
        TargetConfig {
            target,
            server: ServerAddress::parse(server).unwrap(),
            database: "TestDB".to_string(),
            credentials,
        }
    }

    fn sql_login() -> Credentials {
        Credentials::SqlServer {
            user: "sa".to_string(),
            password: "pw".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_target_is_connection_error() {
        let manager = ConnectionManager::new(Vec::new(), ConnectionSettings::default());
        assert!(!manager.is_configured(DatabaseTarget::Master));
        let err = manager.connect(DatabaseTarget::Master).await.unwrap_err();
        assert_eq!(err.kind(), "connection");
        assert!(err.suggestion().unwrap().contains("MASTER_DB_SERVER"));
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected_is_noop() {
        let manager = ConnectionManager::new(Vec::new(), ConnectionSettings::default());
        manager.disconnect(DatabaseTarget::DataMgmt).await;
        manager.close_all().await;
        assert!(!manager.is_connected(DatabaseTarget::DataMgmt).await);
    }

    #[tokio::test]
    async fn test_failed_connect_does_not_poison_slot() {
        let settings = ConnectionSettings {
            connect_timeout: Duration::from_millis(500),
            encrypt: false,
            ..ConnectionSettings::default()
        };
        let manager = ConnectionManager::new(
            vec![target_config(DatabaseTarget::Master, "127.0.0.1,1", sql_login())],
            settings,
        );

        let err = manager.connect(DatabaseTarget::Master).await.unwrap_err();
        assert_eq!(err.kind(), "connection");
        assert!(!manager.is_connected(DatabaseTarget::Master).await);
        // A second attempt goes through the full connect path again
        let err = manager.connect(DatabaseTarget::Master).await.unwrap_err();
        assert_eq!(err.kind(), "connection");
        assert!(!manager.is_connected(DatabaseTarget::Master).await);
    }

    #[test]
    fn test_tiberius_config_accepts_sql_login() {
        let target = target_config(DatabaseTarget::Master, "sql01\\SQLEXPRESS", sql_login());
        assert!(tiberius_config(&target, &ConnectionSettings::default()).is_ok());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_integrated_auth_rejected_off_windows() {
        let target = target_config(DatabaseTarget::DataMgmt, "sql01", Credentials::Integrated);
        let err = tiberius_config(&target, &ConnectionSettings::default()).unwrap_err();
        assert_eq!(err.kind(), "connection");
        assert!(err.suggestion().unwrap().contains("DATA_MGMT_DB_USER"));
    }
}
