//! SQLite-specific behaviour: file databases, reopening and the storage
//! encoding of positions.

use ordinal::{
    Board, Config, MoveRequest, Position, Record,
    backend::{BackendImpl, Driver, database::{InMemory, Sqlite}},
    config::ConfigError,
};
use tempfile::tempdir;

use crate::helpers::assert_strictly_increasing;

fn record(id: &str, position: &str) -> Record {
    Record {
        id: id.into(),
        group: "todo".to_string(),
        position: Some(position.parse().unwrap()),
        payload: serde_json::Value::Null,
        created_at: 0,
    }
}

#[tokio::test]
async fn file_database_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ordinal.db");

    let (a, b) = {
        let board = Board::open(Box::new(Sqlite::open_sqlite(&path).await.unwrap()));
        let a = board.create_record("todo", serde_json::json!({"t": "a"})).await.unwrap();
        let b = board.create_record("todo", serde_json::json!({"t": "b"})).await.unwrap();
        board
            .move_record(&MoveRequest::new(b.id.clone(), "todo").before(a.id.clone()))
            .await
            .unwrap();
        (a, b)
    };

    let reopened = Sqlite::open_sqlite(&path).await.unwrap();
    assert_eq!(reopened.driver(), Driver::Sqlite);
    assert!(reopened.is_sqlite());
    let order: Vec<_> = reopened
        .list_group("todo")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(order, vec![b.id, a.id.clone()]);
    let stored = reopened.get(&a.id).await.unwrap();
    assert_eq!(stored.payload, serde_json::json!({"t": "a"}));
}

#[tokio::test]
async fn positions_sort_numerically_across_magnitudes() {
    let backend = Sqlite::sqlite_in_memory().await.unwrap();
    for (id, position) in [
        ("c", "1000000"),
        ("a", "-0.5"),
        ("d", "0.0000000001"),
        ("b", "9.9999999999"),
        ("e", "-1000000"),
    ] {
        backend.insert(record(id, position)).await.unwrap();
    }

    let ids: Vec<String> = backend
        .list_group("todo")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["e", "a", "d", "b", "c"]);

    let positions = backend.group_positions("todo").await.unwrap();
    assert_strictly_increasing(&positions);
    assert_eq!(positions[2], "0.0000000001".parse::<Position>().unwrap());
}

#[tokio::test]
async fn constraint_violation_is_classified_as_conflict() {
    let backend = Sqlite::sqlite_in_memory().await.unwrap();
    backend.insert(record("a", "5")).await.unwrap();
    backend.insert(record("b", "6")).await.unwrap();

    let err = backend
        .update_placement(&"b".into(), "todo", Some("5".parse().unwrap()))
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");
    assert_eq!(
        backend.get(&"b".into()).await.unwrap().position,
        Some("6".parse().unwrap())
    );
}

#[tokio::test]
async fn positions_beyond_the_column_range_are_rejected() {
    let backend = Sqlite::sqlite_in_memory().await.unwrap();
    let err = backend
        .insert(record("huge", "10000000000"))
        .await
        .unwrap_err();
    assert!(!err.is_conflict());
    assert!(err.is_storage_error());
}

#[tokio::test]
async fn group_near_the_column_limit_is_flagged_and_heals_on_append() {
    let backend = Sqlite::sqlite_in_memory().await.unwrap();
    backend.insert(record("low", "922200000")).await.unwrap();
    backend.insert(record("high", "922337000")).await.unwrap();
    let board = Board::open(Box::new(backend));

    assert_eq!(
        board.find_groups_needing_rebalancing().await.unwrap(),
        vec!["todo".to_string()]
    );

    // One default gap past `high` does not fit the column.
    let appended = board.create_record("todo", serde_json::json!({})).await.unwrap();
    assert_eq!(appended.position.unwrap().to_string(), "196605.0000000000");
    let order: Vec<String> = board
        .list_group("todo")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id.as_str().to_string())
        .collect();
    assert_eq!(order, vec!["low".to_string(), "high".to_string(), appended.id.to_string()]);
    assert!(board.find_groups_needing_rebalancing().await.unwrap().is_empty());
}

#[tokio::test]
async fn move_past_the_column_limit_heals() {
    let backend = Sqlite::sqlite_in_memory().await.unwrap();
    backend.insert(record("low", "922200000")).await.unwrap();
    backend.insert(record("high", "922337000")).await.unwrap();
    let board = Board::open(Box::new(backend));
    let mover = board.create_record("backlog", serde_json::json!({})).await.unwrap();

    let outcome = board
        .move_record(&MoveRequest::new(mover.id.clone(), "todo").after("high"))
        .await
        .unwrap();
    assert!(outcome.rebalanced);
    assert_eq!(outcome.position.to_string(), "196605.0000000000");
    let last = board.list_group("todo").await.unwrap().pop().unwrap();
    assert_eq!(last.id, mover.id);
}

#[tokio::test]
async fn scales_beyond_the_column_are_rejected_at_open() {
    let mut config = Config::default();
    config.position.scale = 12;

    let err = Board::open_with_config(
        Box::new(Sqlite::sqlite_in_memory().await.unwrap()),
        config.clone(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ordinal::Error::Config(ConfigError::UnsupportedScale {
            scale: 12,
            supported: 10
        })
    ));

    // The in-memory backend stores any scale.
    Board::open_with_config(Box::new(InMemory::new()), config).unwrap();
}

#[tokio::test]
async fn concurrent_writers_on_a_file_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stress.db");
    let board = Board::open(Box::new(Sqlite::open_sqlite(&path).await.unwrap()));

    let first = board.create_record("todo", serde_json::json!({})).await.unwrap();
    let last = board.create_record("todo", serde_json::json!({})).await.unwrap();
    let mut movers = Vec::new();
    for _ in 0..32 {
        movers.push(board.create_record("backlog", serde_json::json!({})).await.unwrap());
    }

    let mut handles = Vec::new();
    for record in movers {
        let board = board.clone();
        let request = MoveRequest::new(record.id, "todo")
            .after(first.id.clone())
            .before(last.id.clone());
        handles.push(tokio::spawn(async move { board.move_record(&request).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let records = board.list_group("todo").await.unwrap();
    assert_eq!(records.len(), 34);
    assert_eq!(records.first().map(|r| &r.id), Some(&first.id));
    assert_eq!(records.last().map(|r| &r.id), Some(&last.id));
    let positions: Vec<Position> = records.iter().filter_map(|r| r.position).collect();
    assert_strictly_increasing(&positions);
}
