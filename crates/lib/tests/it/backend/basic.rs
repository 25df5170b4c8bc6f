//! Contract tests for `BackendImpl`, run against the configured backend.

use ordinal::{Position, Record, RecordId, backend::BackendImpl};

use crate::helpers::test_backend;

fn pos(s: &str) -> Position {
    s.parse().unwrap()
}

fn record(id: &str, group: &str, position: Option<&str>, created_at: i64) -> Record {
    Record {
        id: id.into(),
        group: group.to_string(),
        position: position.map(pos),
        payload: serde_json::json!({ "id": id }),
        created_at,
    }
}

async fn seeded(records: &[Record]) -> Box<dyn BackendImpl> {
    let backend = test_backend().await;
    for record in records {
        backend.insert(record.clone()).await.unwrap();
    }
    backend
}

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn get_returns_what_was_inserted() {
    let backend = seeded(&[record("a", "todo", Some("1.5"), 10)]).await;
    let stored = backend.get(&"a".into()).await.unwrap();
    assert_eq!(stored.position, Some(pos("1.5")));
    assert_eq!(stored.payload, serde_json::json!({ "id": "a" }));
    assert_eq!(stored.created_at, 10);

    assert!(backend.get(&"missing".into()).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn duplicate_position_in_group_is_a_conflict() {
    let backend = seeded(&[record("a", "todo", Some("1"), 0)]).await;

    let err = backend
        .insert(record("b", "todo", Some("1"), 1))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // Same position in another group is fine, and so are many nulls.
    backend.insert(record("c", "done", Some("1"), 2)).await.unwrap();
    backend.insert(record("d", "todo", None, 3)).await.unwrap();
    backend.insert(record("e", "todo", None, 4)).await.unwrap();
}

#[tokio::test]
async fn duplicate_id_is_not_a_conflict() {
    let backend = seeded(&[record("a", "todo", Some("1"), 0)]).await;
    let err = backend
        .insert(record("a", "todo", Some("2"), 1))
        .await
        .unwrap_err();
    assert!(!err.is_conflict());
    assert!(matches!(
        err,
        ordinal::Error::Backend(ordinal::backend::BackendError::RecordExists { .. })
    ));
}

#[tokio::test]
async fn update_placement_moves_between_groups() {
    let backend = seeded(&[
        record("a", "todo", Some("1"), 0),
        record("b", "done", Some("1"), 1),
    ])
    .await;

    let err = backend
        .update_placement(&"a".into(), "done", Some(pos("1")))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    let a = backend.get(&"a".into()).await.unwrap();
    assert_eq!((a.group.as_str(), a.position), ("todo", Some(pos("1"))));

    backend
        .update_placement(&"a".into(), "done", Some(pos("2")))
        .await
        .unwrap();
    assert_eq!(ids(&backend.list_group("done").await.unwrap()), vec!["b", "a"]);
    assert!(backend.list_group("todo").await.unwrap().is_empty());

    let err = backend
        .update_placement(&"ghost".into(), "done", Some(pos("3")))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn list_group_orders_by_position_then_creation() {
    let backend = seeded(&[
        record("late-null", "todo", None, 5),
        record("early-null", "todo", None, 1),
        record("big", "todo", Some("100000"), 0),
        record("negative", "todo", Some("-2.5"), 0),
        record("small", "todo", Some("0.0000000001"), 0),
        record("other", "done", Some("1"), 0),
    ])
    .await;

    let listed = backend.list_group("todo").await.unwrap();
    assert_eq!(
        ids(&listed),
        vec!["negative", "small", "big", "early-null", "late-null"]
    );
    assert_eq!(
        backend.group_positions("todo").await.unwrap(),
        vec![pos("-2.5"), pos("0.0000000001"), pos("100000")]
    );
    assert_eq!(
        backend.last_position("todo").await.unwrap(),
        Some(pos("100000"))
    );
    assert_eq!(backend.last_position("empty").await.unwrap(), None);
    assert_eq!(
        backend.groups().await.unwrap(),
        vec!["done".to_string(), "todo".to_string()]
    );
}

#[tokio::test]
async fn rewrite_positions_accepts_permutations() {
    let backend = seeded(&[
        record("a", "todo", Some("1"), 0),
        record("b", "todo", Some("2"), 1),
        record("c", "todo", None, 2),
    ])
    .await;

    let updates: Vec<(RecordId, Position)> = vec![
        ("a".into(), pos("2")),
        ("b".into(), pos("1")),
        ("c".into(), pos("3")),
    ];
    assert_eq!(backend.rewrite_positions("todo", &updates).await.unwrap(), 3);
    assert_eq!(
        ids(&backend.list_group("todo").await.unwrap()),
        vec!["b", "a", "c"]
    );
}

#[tokio::test]
async fn failed_rewrite_changes_nothing() {
    let backend = seeded(&[
        record("a", "todo", Some("1"), 0),
        record("b", "todo", Some("2"), 1),
        record("c", "todo", Some("3"), 2),
    ])
    .await;

    // "c" is not part of the rewrite and still holds 3.
    let updates: Vec<(RecordId, Position)> =
        vec![("a".into(), pos("10")), ("b".into(), pos("3"))];
    let err = backend
        .rewrite_positions("todo", &updates)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        backend.group_positions("todo").await.unwrap(),
        vec![pos("1"), pos("2"), pos("3")]
    );
}

#[tokio::test]
async fn delete_releases_the_position() {
    let backend = seeded(&[record("a", "todo", Some("1"), 0)]).await;
    backend.delete(&"a".into()).await.unwrap();
    assert!(backend.delete(&"a".into()).await.unwrap_err().is_not_found());
    backend.insert(record("b", "todo", Some("1"), 1)).await.unwrap();
    assert!(backend.groups().await.unwrap() == vec!["todo".to_string()]);
}
