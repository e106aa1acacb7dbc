//! PostgreSQL server adapter
//!
//! Statements run over a short-lived connection to the `postgres`
//! maintenance database; backups are restored with `pg_restore`.

use std::path::Path;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Row};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{quote_pg_ident, DatabaseServer};
use crate::errors::DeployError;
use crate::models::platform::EngineConnection;

/// SQLSTATE raised when a database already exists
const DUPLICATE_DATABASE: &str = "42P04";

/// PostgreSQL server reached over TCP
pub struct PostgresServer {
    connection: EngineConnection,
    restore_binary: String,
}

impl PostgresServer {
    pub fn new(connection: EngineConnection, restore_binary: impl Into<String>) -> Self {
        Self {
            connection,
            restore_binary: restore_binary.into(),
        }
    }

    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.connection.host)
            .port(self.connection.port)
            .username(&self.connection.username)
            .password(self.connection.password())
            .database("postgres")
    }

    async fn connect(&self) -> Result<PgConnection, DeployError> {
        PgConnection::connect_with(&self.connect_options())
            .await
            .map_err(|e| {
                DeployError::DatabaseProvisioningFailed(format!(
                    "Could not connect to PostgreSQL at {}:{}: {}",
                    self.connection.host, self.connection.port, e
                ))
            })
    }

    /// Run one statement, treating "database already exists" as success
    async fn execute(&self, sql: &str) -> Result<(), DeployError> {
        let mut conn = self.connect().await?;
        debug!("PostgreSQL: {}", sql);
        let result = sqlx::query(sql).execute(&mut conn).await;
        let _ = conn.close().await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_database(&e) => {
                warn!("PostgreSQL reported an existing object, continuing: {}", e);
                Ok(())
            }
            Err(e) => Err(native_error(e)),
        }
    }
}

fn is_duplicate_database(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == DUPLICATE_DATABASE)
        .unwrap_or(false)
}

fn native_error(error: sqlx::Error) -> DeployError {
    match error.as_database_error() {
        Some(db) => DeployError::DatabaseProvisioningFailed(format!(
            "[{}] - {}",
            db.code().unwrap_or_default(),
            db.message()
        )),
        None => DeployError::DatabaseProvisioningFailed(error.to_string()),
    }
}

#[async_trait]
impl DatabaseServer for PostgresServer {
    fn connection(&self) -> EngineConnection {
        self.connection.clone()
    }

    async fn check_exists(&self, name: &str, as_template: bool) -> Result<bool, DeployError> {
        let mut conn = self.connect().await?;
        let row = sqlx::query(
            "SELECT COUNT(datname) AS found FROM pg_catalog.pg_database \
             WHERE datname = $1 AND (datistemplate OR NOT $2)",
        )
        .bind(name)
        .bind(as_template)
        .fetch_one(&mut conn)
        .await
        .map_err(native_error)?;
        let _ = conn.close().await;

        let found: i64 = row.get("found");
        Ok(found == 1)
    }

    async fn terminate_connections(&self, name: &str) -> Result<(), DeployError> {
        let mut conn = self.connect().await?;
        sqlx::query(
            "SELECT pg_terminate_backend(pg_stat_activity.pid) FROM pg_stat_activity \
             WHERE pg_stat_activity.datname = $1 AND pid <> pg_backend_pid()",
        )
        .bind(name)
        .execute(&mut conn)
        .await
        .map_err(native_error)?;
        let _ = conn.close().await;
        Ok(())
    }

    async fn create(&self, name: &str) -> Result<(), DeployError> {
        self.execute(&format!(
            "CREATE DATABASE {} ENCODING UTF8 CONNECTION LIMIT -1",
            quote_pg_ident(name)
        ))
        .await
    }

    async fn drop_database(&self, name: &str) -> Result<(), DeployError> {
        // Templates refuse DROP
        let mut conn = self.connect().await?;
        sqlx::query("UPDATE pg_database SET datistemplate = false WHERE datname = $1")
            .bind(name)
            .execute(&mut conn)
            .await
            .map_err(native_error)?;
        let _ = conn.close().await;

        self.execute(&format!("DROP DATABASE IF EXISTS {}", quote_pg_ident(name)))
            .await
    }

    async fn restore(&self, backup: &Path, name: &str) -> Result<(), DeployError> {
        debug!("Restoring {} into {}", backup.display(), name);
        let output = Command::new(&self.restore_binary)
            .arg("--host")
            .arg(&self.connection.host)
            .arg("--port")
            .arg(self.connection.port.to_string())
            .arg("--username")
            .arg(&self.connection.username)
            .arg("--dbname")
            .arg(name)
            .arg("--no-owner")
            .arg("--no-privileges")
            .arg(backup)
            .env("PGPASSWORD", self.connection.password())
            .output()
            .await
            .map_err(|e| {
                DeployError::DatabaseProvisioningFailed(format!(
                    "Failed to run {}: {}",
                    self.restore_binary, e
                ))
            })?;

        if !output.status.success() {
            return Err(DeployError::DatabaseProvisioningFailed(format!(
                "Restore of {} into {} failed: {}",
                backup.display(),
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn mark_as_template(&self, name: &str) -> Result<(), DeployError> {
        let mut conn = self.connect().await?;
        sqlx::query("UPDATE pg_database SET datistemplate = true WHERE datname = $1")
            .bind(name)
            .execute(&mut conn)
            .await
            .map_err(native_error)?;
        let _ = conn.close().await;
        Ok(())
    }

    async fn clone_from_template(&self, template: &str, name: &str) -> Result<(), DeployError> {
        // A template cannot be copied while sessions are attached to it
        self.terminate_connections(template).await?;
        self.execute(&format!(
            "CREATE DATABASE {} TEMPLATE {} ENCODING UTF8 CONNECTION LIMIT -1",
            quote_pg_ident(name),
            quote_pg_ident(template)
        ))
        .await
    }
}
