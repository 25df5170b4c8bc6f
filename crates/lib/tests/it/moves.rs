//! Tests for the move protocol.

use std::sync::Arc;

use ordinal::{
    BroadcastObserver, Config, MoveConfig, MoveRequest, Position, PositionConfig, mover::MoveError,
};

use crate::helpers::*;

#[tokio::test]
async fn scenario_positions_follow_default_gap() {
    let board = test_board().await;
    let records = create_records(&board, "todo", 2).await;
    assert_eq!(
        records[0].position.unwrap().to_string(),
        "65535.0000000000"
    );
    assert_eq!(
        records[1].position.unwrap().to_string(),
        "131070.0000000000"
    );

    let exact = board
        .algebra()
        .between_exact(records[0].position.unwrap(), records[1].position.unwrap())
        .unwrap();
    assert_eq!(exact.to_string(), "98302.5000000000");
}

#[tokio::test]
async fn move_to_top_and_bottom() {
    let board = test_board().await;
    let records = create_records(&board, "todo", 3).await;
    let (a, b, c) = (&records[0], &records[1], &records[2]);

    // Top: no preceding neighbour.
    let outcome = board
        .move_record(&MoveRequest::new(c.id.clone(), "todo").before(a.id.clone()))
        .await
        .unwrap();
    assert!(outcome.position < a.position.unwrap());
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.from_group, "todo");

    // Bottom: no following neighbour.
    let outcome = board
        .move_record(&MoveRequest::new(a.id.clone(), "todo").after(b.id.clone()))
        .await
        .unwrap();
    assert!(outcome.position > b.position.unwrap());

    assert_eq!(
        group_ids(&board, "todo").await,
        vec![c.id.clone(), b.id.clone(), a.id.clone()]
    );
}

#[tokio::test]
async fn move_between_neighbours_across_groups() {
    let board = test_board().await;
    let todo = create_records(&board, "todo", 2).await;
    let done = create_records(&board, "done", 1).await;

    let request = MoveRequest::new(done[0].id.clone(), "todo")
        .after(todo[0].id.clone())
        .before(todo[1].id.clone());
    let outcome = board.move_record(&request).await.unwrap();

    assert_eq!(outcome.from_group, "done");
    assert_eq!(outcome.group, "todo");
    assert!(todo[0].position.unwrap() < outcome.position);
    assert!(outcome.position < todo[1].position.unwrap());
    assert_eq!(
        group_ids(&board, "todo").await,
        vec![todo[0].id.clone(), done[0].id.clone(), todo[1].id.clone()]
    );
    // The source group vanished with its last record.
    assert_eq!(board.groups().await.unwrap(), vec!["todo".to_string()]);
}

#[tokio::test]
async fn move_into_empty_group_uses_first_position() {
    let board = test_board().await;
    let records = create_records(&board, "todo", 1).await;
    let outcome = board
        .move_record(&MoveRequest::new(records[0].id.clone(), "done"))
        .await
        .unwrap();
    assert_eq!(outcome.position, board.algebra().for_empty_group());
}

#[tokio::test]
async fn vanished_neighbour_degrades_to_open_ended_move() {
    let board = test_board().await;
    let records = create_records(&board, "todo", 2).await;

    let request = MoveRequest::new(records[0].id.clone(), "todo")
        .after(records[1].id.clone())
        .before("deleted-meanwhile");
    let outcome = board.move_record(&request).await.unwrap();
    assert!(outcome.position > records[1].position.unwrap());
}

#[tokio::test]
async fn neighbour_in_other_group_is_ignored() {
    let board = test_board().await;
    let todo = create_records(&board, "todo", 1).await;
    let done = create_records(&board, "done", 1).await;
    let backlog = create_records(&board, "backlog", 1).await;

    // `done[0]` is not in "todo", so only the upper bound counts.
    let request = MoveRequest::new(backlog[0].id.clone(), "todo")
        .after(done[0].id.clone())
        .before(todo[0].id.clone());
    let outcome = board.move_record(&request).await.unwrap();
    assert!(outcome.position < todo[0].position.unwrap());
}

#[tokio::test]
async fn missing_record_is_not_found() {
    let board = test_board().await;
    let err = board
        .move_record(&MoveRequest::new("ghost", "todo"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        err,
        ordinal::Error::Move(MoveError::RecordNotFound { .. })
    ));
}

#[tokio::test]
async fn conflict_on_first_attempt_is_retried_transparently() {
    let board = flaky_board(Fault::Conflict, Config::default()).await;
    let records = create_records(&board, "todo", 3).await;

    flaky(&board).arm(1);
    let request = MoveRequest::new(records[2].id.clone(), "todo")
        .after(records[0].id.clone())
        .before(records[1].id.clone());
    let outcome = board.move_record(&request).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(
        group_ids(&board, "todo").await,
        vec![
            records[0].id.clone(),
            records[2].id.clone(),
            records[1].id.clone()
        ]
    );
}

#[tokio::test]
async fn exhausted_retry_budget_reports_conflict() {
    let config = Config {
        moves: MoveConfig {
            max_retries: 2,
            ..MoveConfig::default()
        },
        ..Config::default()
    };
    let board = flaky_board(Fault::Conflict, config).await;
    let records = create_records(&board, "todo", 2).await;
    let before = flaky(&board).writes();

    flaky(&board).arm(u32::MAX);
    let err = board
        .move_record(&MoveRequest::new(records[1].id.clone(), "todo").before(records[0].id.clone()))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    match err {
        ordinal::Error::Move(MoveError::PersistenceConflict { attempts, .. }) => {
            assert_eq!(attempts, 3)
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(flaky(&board).writes() - before, 3);

    // The record kept its place.
    flaky(&board).arm(0);
    assert_eq!(
        board.get_record(&records[1].id).await.unwrap().position,
        records[1].position
    );
}

#[tokio::test]
async fn storage_errors_pass_through_without_retry() {
    let board = flaky_board(Fault::Storage, Config::default()).await;
    let records = create_records(&board, "todo", 2).await;
    let before = flaky(&board).writes();

    flaky(&board).arm(1);
    let err = board
        .move_record(&MoveRequest::new(records[0].id.clone(), "todo").after(records[1].id.clone()))
        .await
        .unwrap_err();

    assert!(!err.is_conflict());
    assert!(err.is_storage_error());
    assert_eq!(err.module(), "backend");
    assert_eq!(flaky(&board).writes() - before, 1);
}

#[tokio::test]
async fn create_retries_after_conflict() {
    let board = flaky_board(Fault::Conflict, Config::default()).await;
    create_records(&board, "todo", 1).await;

    flaky(&board).arm(2);
    let record = board
        .create_record("todo", serde_json::json!({}))
        .await
        .unwrap();
    // Retries split the next default gap instead of repeating the append.
    let position = record.position.unwrap();
    assert!(position > "65535".parse::<Position>().unwrap());
    assert!(position < "131070".parse::<Position>().unwrap());
    assert_eq!(group_ids(&board, "todo").await.last(), Some(&record.id));
}

#[tokio::test]
async fn move_after_inner_neighbour_lands_directly_behind_it() {
    let board = test_board().await;
    let records = create_records(&board, "todo", 3).await;
    let (a, b, c) = (&records[0], &records[1], &records[2]);

    // `after(a)` is exactly where `b` sits; the retry splits (a, b).
    let outcome = board
        .move_record(&MoveRequest::new(c.id.clone(), "todo").after(a.id.clone()))
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 2);
    assert_eq!(
        group_ids(&board, "todo").await,
        vec![a.id.clone(), c.id.clone(), b.id.clone()]
    );
}

#[tokio::test]
async fn repeated_splits_trigger_rebalance_and_keep_order() {
    let board = test_board().await;
    let anchors = create_records(&board, "todo", 2).await;
    let movers = create_records(&board, "backlog", 80).await;

    // Always insert directly after the first anchor, so the gap halves.
    let mut expected = vec![anchors[0].id.clone()];
    let mut rebalanced = false;
    let mut upper = anchors[1].id.clone();
    for record in &movers {
        let request = MoveRequest::new(record.id.clone(), "todo")
            .after(anchors[0].id.clone())
            .before(upper.clone());
        let outcome = board.move_record(&request).await.unwrap();
        rebalanced |= outcome.rebalanced;
        upper = record.id.clone();
        expected.insert(1, record.id.clone());
    }
    expected.push(anchors[1].id.clone());

    assert!(rebalanced, "repeated splits should have crossed the minimum gap");
    assert_eq!(group_ids(&board, "todo").await, expected);
    assert_strictly_increasing(&group_positions(&board, "todo").await);
}

#[tokio::test]
async fn precision_exhaustion_heals_by_rebalancing() {
    // One fractional digit: the interval runs out of digits while every
    // gap is still at least min_gap.
    let config = Config {
        position: PositionConfig {
            default_gap: "10".parse().unwrap(),
            min_gap: "0.1".parse().unwrap(),
            scale: 1,
        },
        moves: MoveConfig {
            rebalance_on_move: false,
            ..MoveConfig::default()
        },
    };
    let board = test_board_with(config).await;
    let anchors = create_records(&board, "todo", 2).await;
    let movers = create_records(&board, "backlog", 30).await;

    let mut healed = false;
    let mut expected = vec![anchors[0].id.clone()];
    let mut upper = anchors[1].id.clone();
    for record in &movers {
        let request = MoveRequest::new(record.id.clone(), "todo")
            .after(anchors[0].id.clone())
            .before(upper.clone());
        let outcome = board.move_record(&request).await.unwrap();
        healed |= outcome.rebalanced;
        upper = record.id.clone();
        expected.insert(1, record.id.clone());
    }
    expected.push(anchors[1].id.clone());

    assert!(healed);
    assert_eq!(group_ids(&board, "todo").await, expected);
    assert_strictly_increasing(&group_positions(&board, "todo").await);
}

#[tokio::test]
async fn observers_receive_completed_moves() {
    let board = test_board().await;
    let observer = BroadcastObserver::new(16);
    let mut events = observer.subscribe();
    board.add_observer(Arc::new(observer));

    let records = create_records(&board, "todo", 1).await;
    let outcome = board
        .move_record(&MoveRequest::new(records[0].id.clone(), "done"))
        .await
        .unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.record_id, records[0].id);
    assert_eq!(event.from_group, "todo");
    assert_eq!(event.group, "done");
    assert_eq!(event.position, outcome.position);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_moves_between_same_neighbours_never_collide() {
    let board = test_board().await;
    let anchors = create_records(&board, "todo", 2).await;
    let movers = create_records(&board, "backlog", 64).await;

    let mut handles = Vec::new();
    for record in movers.iter() {
        let board = board.clone();
        let request = MoveRequest::new(record.id.clone(), "todo")
            .after(anchors[0].id.clone())
            .before(anchors[1].id.clone());
        handles.push(tokio::spawn(async move { board.move_record(&request).await }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.group, "todo");
    }

    let positions: Vec<Position> = group_positions(&board, "todo").await;
    assert_eq!(positions.len(), 66);
    assert_strictly_increasing(&positions);

    let ids = group_ids(&board, "todo").await;
    assert_eq!(ids.first(), Some(&anchors[0].id));
    assert_eq!(ids.last(), Some(&anchors[1].id));
    assert_eq!(board.groups().await.unwrap(), vec!["todo".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_moves_to_the_bottom_all_succeed() {
    let board = test_board().await;
    let anchor = create_records(&board, "todo", 1).await.remove(0);
    let movers = create_records(&board, "backlog", 24).await;

    let mut handles = Vec::new();
    for record in movers.iter() {
        let board = board.clone();
        let request = MoveRequest::new(record.id.clone(), "todo").after(anchor.id.clone());
        handles.push(tokio::spawn(async move { board.move_record(&request).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let positions = group_positions(&board, "todo").await;
    assert_eq!(positions.len(), 25);
    assert_strictly_increasing(&positions);
    assert_eq!(group_ids(&board, "todo").await.first(), Some(&anchor.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_moves_to_the_top_all_succeed() {
    let board = test_board().await;
    let anchor = create_records(&board, "todo", 1).await.remove(0);
    let movers = create_records(&board, "backlog", 24).await;

    let mut handles = Vec::new();
    for record in movers.iter() {
        let board = board.clone();
        let request = MoveRequest::new(record.id.clone(), "todo").before(anchor.id.clone());
        handles.push(tokio::spawn(async move { board.move_record(&request).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let positions = group_positions(&board, "todo").await;
    assert_eq!(positions.len(), 25);
    assert_strictly_increasing(&positions);
    assert_eq!(group_ids(&board, "todo").await.last(), Some(&anchor.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_all_succeed() {
    let board = test_board().await;

    let mut handles = Vec::new();
    for i in 0..50 {
        let board = board.clone();
        handles.push(tokio::spawn(async move {
            board.create_record("todo", serde_json::json!({ "n": i })).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let positions = group_positions(&board, "todo").await;
    assert_eq!(positions.len(), 50);
    assert_strictly_increasing(&positions);
}
