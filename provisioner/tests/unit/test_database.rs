//! Database provisioning tests

use std::sync::Arc;

use provisioner::database::DatabaseProvisioner;
use provisioner::errors::DeployError;
use provisioner::models::platform::{DatabaseEngine, RuntimeVariant, StagedArtifact};

use crate::support::{write_release, FakeDatabaseServer};

fn provisioner() -> (DatabaseProvisioner, Arc<FakeDatabaseServer>, Arc<FakeDatabaseServer>) {
    let postgres = Arc::new(FakeDatabaseServer::new(DatabaseEngine::Postgres, 5432));
    let mssql = Arc::new(FakeDatabaseServer::new(DatabaseEngine::MsSql, 1433));
    (DatabaseProvisioner::new(postgres.clone(), mssql.clone()), postgres, mssql)
}

fn staged(root: std::path::PathBuf, engine: DatabaseEngine) -> StagedArtifact {
    StagedArtifact {
        root,
        engine,
        runtime: RuntimeVariant::Core,
    }
}

#[tokio::test]
async fn test_postgres_template_restored_once() {
    let tmp = tempfile::tempdir().unwrap();
    let root = write_release(tmp.path(), "8.1.1.3480_Studio_Softkey_PostgreSQL_ENU", "studio.backup", true);
    let artifact = staged(root, DatabaseEngine::Postgres);
    let (sut, postgres, _) = provisioner();

    let first = sut.provision(&artifact, "dev1").await.unwrap();
    let second = sut.provision(&artifact, "dev2").await.unwrap();

    assert!(first.restored);
    assert!(!second.restored);
    assert_eq!(
        first.template_name.as_deref(),
        Some("template_8.1.1.3480_Studio_Softkey_PostgreSQL_ENU")
    );
    assert_eq!(postgres.restores(), 1);
    assert_eq!(postgres.clones(), 2);
    assert!(postgres.exists("dev1"));
    assert!(postgres.exists("dev2"));
    assert_eq!(second.connection.port, 5432);
}

#[tokio::test]
async fn test_concurrent_provisioning_shares_template() {
    let tmp = tempfile::tempdir().unwrap();
    let root = write_release(tmp.path(), "8.1.1.3480_Studio_Softkey_PostgreSQL_ENU", "studio.backup", true);
    let artifact = staged(root, DatabaseEngine::Postgres);
    let (sut, postgres, _) = provisioner();

    let (a, b) = tokio::join!(sut.provision(&artifact, "a"), sut.provision(&artifact, "b"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(postgres.restores(), 1);
    assert_eq!(postgres.clones(), 2);
    assert!(a.restored != b.restored);
}

#[tokio::test]
async fn test_mssql_restore_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let root = write_release(tmp.path(), "8.1.2.629_Studio_Softkey_MSSQL_ENU", "studio.bak", false);
    let artifact = staged(root, DatabaseEngine::MsSql);
    let (sut, postgres, mssql) = provisioner();

    let first = sut.provision(&artifact, "dev1").await.unwrap();
    let again = sut.provision(&artifact, "dev1").await.unwrap();

    assert!(first.restored);
    assert!(!again.restored);
    assert!(first.template_name.is_none());
    assert_eq!(mssql.restores(), 1);
    assert_eq!(postgres.restores(), 0);
    assert_eq!(first.connection.username, "sa");
}

#[tokio::test]
async fn test_missing_backup_is_unsupported() {
    let tmp = tempfile::tempdir().unwrap();
    let root = write_release(tmp.path(), "8.1.2.629_Studio_Softkey_MSSQL_ENU", "studio.bak", false);
    let artifact = staged(root, DatabaseEngine::Postgres);
    let (sut, postgres, _) = provisioner();

    let err = sut.provision(&artifact, "dev1").await.unwrap_err();
    assert!(matches!(err, DeployError::UnsupportedEngine(_)));
    assert_eq!(postgres.restores(), 0);
}

#[tokio::test]
async fn test_failed_template_restore_is_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let root = write_release(tmp.path(), "8.1.1.3480_Studio_Softkey_PostgreSQL_ENU", "studio.backup", true);
    let artifact = staged(root, DatabaseEngine::Postgres);
    let template = "template_8.1.1.3480_Studio_Softkey_PostgreSQL_ENU";
    let postgres = Arc::new(FakeDatabaseServer::new(DatabaseEngine::Postgres, 5432).fail_restores(1));
    let mssql = Arc::new(FakeDatabaseServer::new(DatabaseEngine::MsSql, 1433));
    let sut = DatabaseProvisioner::new(postgres.clone(), mssql);

    let err = sut.provision(&artifact, "dev1").await.unwrap_err();
    assert!(matches!(err, DeployError::DatabaseProvisioningFailed(_)));
    assert!(postgres.exists(template));
    assert!(!postgres.is_template(template));

    let database = sut.provision(&artifact, "dev1").await.unwrap();
    assert!(database.restored);
    assert_eq!(postgres.drops(), 1);
    assert_eq!(postgres.restores(), 1);
    assert!(postgres.is_template(template));
    assert!(postgres.exists("dev1"));
}
