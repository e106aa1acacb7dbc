//! SQL Server adapter driven through `sqlcmd`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{quote_mssql_ident, quote_mssql_literal, DatabaseServer};
use crate::errors::DeployError;
use crate::models::platform::EngineConnection;

/// Server error number for "database already exists"
const DUPLICATE_DATABASE: &str = "Msg 1801,";

/// One row of `RESTORE FILELISTONLY`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    pub logical_name: String,
    pub is_log: bool,
}

/// SQL Server reached through the `sqlcmd` client
pub struct MsSqlServer {
    connection: EngineConnection,
    sqlcmd: String,
    /// Backup folder as seen from this machine
    local_backup_dir: PathBuf,
    /// Same folder as seen from the server
    server_backup_dir: String,
}

impl MsSqlServer {
    pub fn new(
        connection: EngineConnection,
        sqlcmd: impl Into<String>,
        local_backup_dir: impl Into<PathBuf>,
        server_backup_dir: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            sqlcmd: sqlcmd.into(),
            local_backup_dir: local_backup_dir.into(),
            server_backup_dir: server_backup_dir.into(),
        }
    }

    /// Run a query and return its raw stdout.
    async fn query(&self, sql: &str) -> Result<String, DeployError> {
        debug!("MSSQL: {}", sql);
        let output = Command::new(&self.sqlcmd)
            .arg("-S")
            .arg(format!("{},{}", self.connection.host, self.connection.port))
            .arg("-U")
            .arg(&self.connection.username)
            .arg("-b")
            .arg("-h")
            .arg("-1")
            .arg("-W")
            .arg("-s")
            .arg("|")
            .arg("-Q")
            .arg(sql)
            .env("SQLCMDPASSWORD", self.connection.password())
            .output()
            .await
            .map_err(|e| {
                DeployError::DatabaseProvisioningFailed(format!("Failed to run {}: {}", self.sqlcmd, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = format!("{}{}", stdout.trim(), stderr.trim());
        if message.contains(DUPLICATE_DATABASE) {
            warn!("SQL Server reported an existing database, continuing: {}", message);
            return Ok(stdout);
        }
        Err(DeployError::DatabaseProvisioningFailed(message))
    }

    fn server_path(&self, file_name: &str) -> String {
        let dir = self.server_backup_dir.trim_end_matches(['/', '\\']);
        let separator = if dir.contains('\\') { '\\' } else { '/' };
        format!("{}{}{}", dir, separator, file_name)
    }

    async fn restore_copied(&self, server_backup: &str, name: &str) -> Result<(), DeployError> {
        let listing = self
            .query(&format!(
                "SET NOCOUNT ON; RESTORE FILELISTONLY FROM DISK = {}",
                quote_mssql_literal(server_backup)
            ))
            .await?;
        let files = parse_file_list(&listing);
        if files.is_empty() {
            return Err(DeployError::DatabaseProvisioningFailed(format!(
                "Backup {} lists no database files",
                server_backup
            )));
        }

        let data_dir = self
            .query("SET NOCOUNT ON; SELECT CAST(SERVERPROPERTY('InstanceDefaultDataPath') AS nvarchar(4000))")
            .await?;
        let data_dir = data_dir.trim();

        let statement = restore_statement(name, server_backup, data_dir, &files);
        self.query(&statement).await?;
        Ok(())
    }
}

/// Parse `RESTORE FILELISTONLY` output produced with `-h -1 -W -s |`
pub fn parse_file_list(output: &str) -> Vec<BackupFile> {
    output
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split('|').collect();
            if columns.len() < 3 || columns[0].trim().is_empty() {
                return None;
            }
            let kind = columns[2].trim();
            if kind != "D" && kind != "L" {
                return None;
            }
            Some(BackupFile {
                logical_name: columns[0].trim().to_string(),
                is_log: kind == "L",
            })
        })
        .collect()
}

/// Build a `RESTORE DATABASE` statement relocating every file into `data_dir`
pub fn restore_statement(name: &str, backup: &str, data_dir: &str, files: &[BackupFile]) -> String {
    let data_dir = data_dir.trim_end_matches(['/', '\\']);
    let separator = if data_dir.contains('\\') { '\\' } else { '/' };

    // Data and log files are numbered separately so every target is unique
    let (mut data_files, mut log_files) = (0, 0);
    let moves = files
        .iter()
        .map(|file| {
            let suffix = if file.is_log {
                log_files += 1;
                match log_files {
                    1 => "_log.ldf".to_string(),
                    n => format!("_log{}.ldf", n - 1),
                }
            } else {
                data_files += 1;
                match data_files {
                    1 => ".mdf".to_string(),
                    n => format!("_{}.ndf", n - 1),
                }
            };
            format!(
                "MOVE {} TO {}",
                quote_mssql_literal(&file.logical_name),
                quote_mssql_literal(&format!("{}{}{}{}", data_dir, separator, name, suffix))
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "RESTORE DATABASE {} FROM DISK = {} WITH {}, RECOVERY",
        quote_mssql_ident(name),
        quote_mssql_literal(backup),
        moves
    )
}

fn unsupported(operation: &str) -> DeployError {
    DeployError::DatabaseProvisioningFailed(format!("SQL Server does not support {}", operation))
}

#[async_trait]
impl DatabaseServer for MsSqlServer {
    fn connection(&self) -> EngineConnection {
        self.connection.clone()
    }

    async fn check_exists(&self, name: &str, as_template: bool) -> Result<bool, DeployError> {
        if as_template {
            return Ok(false);
        }
        let output = self
            .query(&format!(
                "SET NOCOUNT ON; SELECT COUNT(*) FROM sys.databases WHERE name = {}",
                quote_mssql_literal(name)
            ))
            .await?;
        let count = output
            .lines()
            .find_map(|line| line.trim().parse::<i64>().ok())
            .unwrap_or(0);
        Ok(count > 0)
    }

    async fn terminate_connections(&self, name: &str) -> Result<(), DeployError> {
        self.query(&format!(
            "IF DB_ID({lit}) IS NOT NULL ALTER DATABASE {ident} SET SINGLE_USER WITH ROLLBACK IMMEDIATE; \
             IF DB_ID({lit}) IS NOT NULL ALTER DATABASE {ident} SET MULTI_USER",
            lit = quote_mssql_literal(name),
            ident = quote_mssql_ident(name)
        ))
        .await?;
        Ok(())
    }

    async fn create(&self, name: &str) -> Result<(), DeployError> {
        self.query(&format!("CREATE DATABASE {}", quote_mssql_ident(name)))
            .await?;
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<(), DeployError> {
        self.query(&format!(
            "IF DB_ID({lit}) IS NOT NULL BEGIN \
             ALTER DATABASE {ident} SET SINGLE_USER WITH ROLLBACK IMMEDIATE; \
             DROP DATABASE {ident}; END",
            lit = quote_mssql_literal(name),
            ident = quote_mssql_ident(name)
        ))
        .await?;
        Ok(())
    }

    /// Copies the backup into the server's backup folder as `<name>.bak`,
    /// restores it, then removes the copy.
    async fn restore(&self, backup: &Path, name: &str) -> Result<(), DeployError> {
        let file_name = format!("{}.bak", name);
        let local_copy = self.local_backup_dir.join(&file_name);
        tokio::fs::create_dir_all(&self.local_backup_dir).await?;
        tokio::fs::copy(backup, &local_copy).await.map_err(|e| {
            DeployError::DatabaseProvisioningFailed(format!(
                "Could not copy {} to {}: {}",
                backup.display(),
                local_copy.display(),
                e
            ))
        })?;

        let result = self.restore_copied(&self.server_path(&file_name), name).await;

        if let Err(e) = tokio::fs::remove_file(&local_copy).await {
            warn!("Could not remove {}: {}", local_copy.display(), e);
        }
        result
    }

    async fn mark_as_template(&self, _name: &str) -> Result<(), DeployError> {
        Err(unsupported("template databases"))
    }

    async fn clone_from_template(&self, _template: &str, _name: &str) -> Result<(), DeployError> {
        Err(unsupported("cloning from templates"))
    }
}
