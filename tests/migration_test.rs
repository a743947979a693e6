//! Integration tests for the migration runner through the manager.

use async_trait::async_trait;
use unidb::db::{Adapter, DatabaseManager, LEDGER_TABLE, Migration, MigrationDirection};
use unidb::error::DbResult;
use unidb::models::{ColumnDefinition, ColumnType, ConnectionConfig, IndexOptions};

struct CreateUsers;

#[async_trait]
impl Migration for CreateUsers {
    fn name(&self) -> &str {
        "001_create_users"
    }

    async fn up(&self, adapter: &Adapter) -> DbResult<()> {
        adapter
            .create_table(
                "users",
                &[
                    ColumnDefinition::new("id", ColumnType::Integer)
                        .primary_key()
                        .auto_increment(),
                    ColumnDefinition::new("email", ColumnType::STRING).not_null(),
                ],
            )
            .await
    }

    async fn down(&self, adapter: &Adapter) -> DbResult<()> {
        adapter.drop_table("users").await
    }
}

struct IndexEmails;

#[async_trait]
impl Migration for IndexEmails {
    fn name(&self) -> &str {
        "002_index_emails"
    }

    async fn up(&self, adapter: &Adapter) -> DbResult<()> {
        adapter
            .create_index("users", "users_email_idx", &["email"], IndexOptions::unique())
            .await
    }

    async fn down(&self, adapter: &Adapter) -> DbResult<()> {
        adapter.query("DROP INDEX users_email_idx", &[]).await?;
        Ok(())
    }
}

fn units() -> Vec<Box<dyn Migration>> {
    vec![Box::new(CreateUsers), Box::new(IndexEmails)]
}

/// Units run in the order given, so reverting passes them newest first.
fn units_newest_first() -> Vec<Box<dyn Migration>> {
    vec![Box::new(IndexEmails), Box::new(CreateUsers)]
}

async fn manager() -> DatabaseManager {
    let manager = DatabaseManager::new();
    manager
        .register_adapter("main", ConnectionConfig::sqlite_memory(), true)
        .await
        .unwrap();
    manager
}

#[tokio::test]
async fn test_up_is_idempotent() {
    let manager = manager().await;
    let units = units();

    let first = manager
        .run_migrations(MigrationDirection::Up, &units, None)
        .await
        .unwrap();
    assert_eq!(first.applied, vec!["001_create_users", "002_index_emails"]);
    assert!(first.skipped.is_empty());

    let second = manager
        .run_migrations(MigrationDirection::Up, &units, None)
        .await
        .unwrap();
    assert!(second.applied.is_empty());
    assert_eq!(second.skipped.len(), 2);

    let adapter = manager.get_adapter(None).await.unwrap();
    assert!(adapter.table_exists(LEDGER_TABLE).await.unwrap());
    let ledger = adapter
        .query("SELECT name FROM migrations ORDER BY id", &[])
        .await
        .unwrap();
    assert_eq!(ledger.row_count, 2);

    let statuses = manager.migration_status(&units, None).await.unwrap();
    assert!(statuses.iter().all(|s| s.applied && s.executed_at.is_some()));

    manager.shutdown().await;
}

#[tokio::test]
async fn test_down_reverts_and_clears_ledger() {
    let manager = manager().await;
    let units = units();

    manager
        .run_migrations(MigrationDirection::Up, &units, Some("main"))
        .await
        .unwrap();
    let report = manager
        .run_migrations(MigrationDirection::Down, &units_newest_first(), Some("main"))
        .await
        .unwrap();
    assert_eq!(report.direction, MigrationDirection::Down);
    assert_eq!(report.applied, vec!["002_index_emails", "001_create_users"]);

    let adapter = manager.get_adapter(Some("main")).await.unwrap();
    assert!(!adapter.table_exists("users").await.unwrap());

    let statuses = manager.migration_status(&units, Some("main")).await.unwrap();
    assert!(statuses.iter().all(|s| !s.applied));

    let again = manager
        .run_migrations(MigrationDirection::Down, &units_newest_first(), Some("main"))
        .await
        .unwrap();
    assert_eq!(again.skipped.len(), 2);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_status_before_any_run() {
    let manager = manager().await;
    let statuses = manager.migration_status(&units(), None).await.unwrap();
    let names: Vec<_> = statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["001_create_users", "002_index_emails"]);
    assert!(statuses.iter().all(|s| !s.applied && s.executed_at.is_none()));

    manager.shutdown().await;
}
