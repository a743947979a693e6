//! End-to-end tests against in-memory and file-backed SQLite.

use serde_json::json;
use unidb::db::{Adapter, QueryBuilder, SortDirection};
use unidb::error::DbError;
use unidb::models::{ColumnDefinition, ColumnType, ConnectionConfig, IndexOptions, QueryParam};

async fn users_adapter() -> Adapter {
    let adapter = Adapter::new("main", ConnectionConfig::sqlite_memory()).unwrap();
    adapter.connect().await.unwrap();
    adapter
        .query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, email TEXT UNIQUE)",
            &[],
        )
        .await
        .unwrap();
    adapter
}

#[tokio::test]
async fn test_users_round_trip() {
    let adapter = users_adapter().await;

    let inserted = adapter
        .query(
            "INSERT INTO users (name, email) VALUES (?, ?)",
            &[QueryParam::from("Ann"), QueryParam::from("ann@x.com")],
        )
        .await
        .unwrap();
    assert_eq!(inserted.insert_id, Some(1));
    assert_eq!(inserted.affected_rows, Some(1));

    let stmt = QueryBuilder::new()
        .select(["*"])
        .from("users")
        .where_eq("name", "Ann")
        .to_sql()
        .unwrap();
    assert_eq!(stmt.sql, "SELECT * FROM users WHERE name = ?");
    assert_eq!(stmt.params, vec![QueryParam::from("Ann")]);

    let result = adapter.query(&stmt.sql, &stmt.params).await.unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.scalar("name"), Some(&json!("Ann")));
    assert_eq!(result.scalar("email"), Some(&json!("ann@x.com")));

    let err = adapter
        .query(
            "INSERT INTO users (name, email) VALUES (?, ?)",
            &[QueryParam::from("Other"), QueryParam::from("ann@x.com")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Query { .. }));
    assert!(err.is_unique_violation());
    assert!(err.to_string().contains("UNIQUE"));

    adapter.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_builder_execute_through_adapter() {
    let adapter = std::sync::Arc::new(users_adapter().await);

    let mut insert = QueryBuilder::for_adapter(adapter.clone())
        .insert([("name", QueryParam::from("Bob")), ("email", QueryParam::from("bob@x.com"))])
        .table("users");
    insert.execute().await.unwrap();
    assert!(insert.operation().is_none());

    for (name, email) in [("Cy", "cy@x.com"), ("Di", "di@x.com")] {
        QueryBuilder::for_adapter(adapter.clone())
            .insert([("name", QueryParam::from(name)), ("email", QueryParam::from(email))])
            .table("users")
            .execute()
            .await
            .unwrap();
    }

    let result = QueryBuilder::for_adapter(adapter.clone())
        .select(["name"])
        .from("users")
        .where_in("name", ["Bob", "Di", "Zed"])
        .order_by("name", SortDirection::Desc)
        .execute()
        .await
        .unwrap();
    let names: Vec<_> = result.rows.iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![json!("Di"), json!("Bob")]);

    let updated = QueryBuilder::for_adapter(adapter.clone())
        .update([("email", QueryParam::from("bob@y.com"))])
        .table("users")
        .where_eq("name", "Bob")
        .execute()
        .await
        .unwrap();
    assert_eq!(updated.affected_rows, Some(1));

    let page = QueryBuilder::for_adapter(adapter.clone())
        .select(["name"])
        .from("users")
        .order_by("id", SortDirection::Asc)
        .paginate(2, 2)
        .execute()
        .await
        .unwrap();
    assert_eq!(page.row_count, 1);
    assert_eq!(page.scalar("name"), Some(&json!("Di")));

    let deleted = QueryBuilder::for_adapter(adapter.clone())
        .delete()
        .from("users")
        .where_like("email", "%@x.com")
        .execute()
        .await
        .unwrap();
    assert_eq!(deleted.affected_rows, Some(2));
}

#[tokio::test]
async fn test_schema_helpers() {
    let adapter = Adapter::new("main", ConnectionConfig::sqlite_memory()).unwrap();
    adapter.connect().await.unwrap();

    assert!(!adapter.table_exists("accounts").await.unwrap());
    let columns = [
        ColumnDefinition::new("id", ColumnType::Integer)
            .primary_key()
            .auto_increment(),
        ColumnDefinition::new("email", ColumnType::STRING).not_null(),
        ColumnDefinition::new("balance", ColumnType::DECIMAL),
        ColumnDefinition::new("active", ColumnType::Boolean),
    ];
    adapter.create_table("accounts", &columns).await.unwrap();
    // Second call is a no-op.
    adapter.create_table("accounts", &columns).await.unwrap();
    assert!(adapter.table_exists("accounts").await.unwrap());

    adapter
        .create_index("accounts", "accounts_email_idx", &["email"], IndexOptions::unique())
        .await
        .unwrap();
    adapter
        .create_index("accounts", "accounts_email_idx", &["email"], IndexOptions::unique())
        .await
        .unwrap();

    let schema = adapter.get_schema("accounts").await.unwrap();
    let names: Vec<_> = schema.iter().map(|c| c.column_name.as_str()).collect();
    assert_eq!(names, ["id", "email", "balance", "active"]);
    assert!(schema[0].primary_key);
    assert!(!schema[1].is_nullable);
    assert!(schema[2].is_nullable);

    assert!(adapter.get_schema("missing").await.unwrap().is_empty());

    adapter.drop_table("accounts").await.unwrap();
    adapter.drop_table("accounts").await.unwrap();
    assert!(!adapter.table_exists("accounts").await.unwrap());
}

#[tokio::test]
async fn test_transaction_atomicity() {
    let adapter = users_adapter().await;

    let err = adapter
        .transaction(|tx| {
            Box::pin(async move {
                tx.query(
                    "INSERT INTO users (name, email) VALUES (?, ?)",
                    &[QueryParam::from("Eve"), QueryParam::from("eve@x.com")],
                )
                .await?;
                tx.query(
                    "INSERT INTO users (name, email) VALUES (?, ?)",
                    &[QueryParam::from("Eve2"), QueryParam::from("eve@x.com")],
                )
                .await?;
                Ok::<_, DbError>(())
            })
        })
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());

    let count = adapter
        .query("SELECT COUNT(*) AS n FROM users", &[])
        .await
        .unwrap();
    assert_eq!(count.scalar("n"), Some(&json!(0)));

    let id = adapter
        .transaction(|tx| {
            Box::pin(async move {
                let r = tx
                    .query(
                        "INSERT INTO users (name, email) VALUES (?, ?)",
                        &[QueryParam::from("Fay"), QueryParam::from("fay@x.com")],
                    )
                    .await?;
                Ok::<_, DbError>(r.insert_id)
            })
        })
        .await
        .unwrap();
    assert_eq!(id, Some(1));
}

#[tokio::test]
async fn test_file_database_persists_across_adapters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let storage = path.to_string_lossy().to_string();

    let writer = Adapter::new("writer", ConnectionConfig::sqlite(storage.clone())).unwrap();
    writer.connect().await.unwrap();
    writer
        .query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT, score REAL, raw BLOB)", &[])
        .await
        .unwrap();
    writer
        .query(
            "INSERT INTO notes (body, score, raw) VALUES (?, ?, X'CAFE')",
            &[QueryParam::from("hello"), QueryParam::Float(1.5)],
        )
        .await
        .unwrap();
    writer.disconnect().await.unwrap();
    assert!(path.exists());

    let reader = Adapter::new("reader", ConnectionConfig::sqlite(storage)).unwrap();
    reader.connect().await.unwrap();
    let row = reader
        .query("SELECT body, score, raw, NULL AS nothing FROM notes", &[])
        .await
        .unwrap();
    assert_eq!(row.scalar("body"), Some(&json!("hello")));
    assert_eq!(row.scalar("score"), Some(&json!(1.5)));
    assert_eq!(row.scalar("raw"), Some(&json!("yv4=")));
    assert_eq!(row.scalar("nothing"), Some(&json!(null)));
    reader.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_query_before_connect_fails() {
    let adapter = Adapter::new("main", ConnectionConfig::sqlite_memory()).unwrap();
    let err = adapter.query("SELECT 1", &[]).await.unwrap_err();
    assert!(err.to_string().contains("not connected"));

    let health = adapter.health_check().await;
    assert!(!health.healthy);
}
