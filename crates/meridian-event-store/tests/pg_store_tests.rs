//! Integration tests for the PostgreSQL backends.
//!
//! These need a live database: set `DATABASE_URL` and run with
//! `cargo test -- --ignored`. Migrations are applied on first connect.

use meridian_core::dead_letter::NewDeadLetter;
use meridian_core::envelope::NewEvent;
use meridian_core::error::StoreError;
use meridian_core::snapshot::NewSnapshot;
use meridian_core::store::{DeadLetterStore, EventStore, SnapshotStore, SubscriptionStore};
use meridian_core::subscription::NewSubscription;
use meridian_event_store::pg_dead_letter_store::PgDeadLetterStore;
use meridian_event_store::pg_event_store::PgEventStore;
use meridian_event_store::pg_snapshot_store::PgSnapshotStore;
use meridian_event_store::pg_subscription_store::PgSubscriptionStore;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for pg tests");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to PostgreSQL");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    pool
}

fn make_event(aggregate_id: Uuid, sequence_number: i64) -> NewEvent {
    NewEvent::new(
        aggregate_id,
        "Spacecraft",
        "SpacecraftCreated",
        sequence_number,
        serde_json::json!({"sequence": sequence_number}),
    )
}

// --- event log ---

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_append_and_read_stream_round_trip() {
    let store = PgEventStore::new(pool().await);
    let aggregate_id = Uuid::new_v4();

    for sequence in 1..=3 {
        let stored = store.append(make_event(aggregate_id, sequence)).await.unwrap();
        assert_eq!(stored.sequence_number, sequence);
        assert!(stored.verify_payload_hash());
    }

    let events = store.read_stream(aggregate_id, 1).await.unwrap();
    assert_eq!(events.len(), 3);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence_number, i64::try_from(i + 1).unwrap());
        assert_eq!(event.aggregate_id, aggregate_id);
    }
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_append_conflict_reports_current_sequence() {
    let store = PgEventStore::new(pool().await);
    let aggregate_id = Uuid::new_v4();

    store.append(make_event(aggregate_id, 1)).await.unwrap();

    let result = store.append(make_event(aggregate_id, 1)).await;
    match result.unwrap_err() {
        StoreError::ConcurrencyConflict {
            aggregate_id: conflict_id,
            attempted,
            current,
        } => {
            assert_eq!(conflict_id, aggregate_id);
            assert_eq!(attempted, 1);
            assert_eq!(current, 1);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_read_matching_filters_and_orders_by_global_position() {
    let store = PgEventStore::new(pool().await);
    let spacecraft = Uuid::new_v4();
    let mission = Uuid::new_v4();

    store.append(make_event(spacecraft, 1)).await.unwrap();
    store
        .append(NewEvent::new(
            mission,
            "Mission",
            "MissionClosed",
            1,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    store.append(make_event(spacecraft, 2)).await.unwrap();

    let matched = store
        .read_matching(
            &["SpacecraftCreated".to_owned()],
            &["Spacecraft".to_owned()],
            0,
            100,
        )
        .await
        .unwrap();

    let ours: Vec<_> = matched
        .iter()
        .filter(|e| e.aggregate_id == spacecraft)
        .collect();
    assert_eq!(ours.len(), 2);
    assert!(ours[0].global_position < ours[1].global_position);
}

// --- snapshots ---

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_latest_snapshot_wins() {
    let store = PgSnapshotStore::new(pool().await);
    let aggregate_id = Uuid::new_v4();

    for sequence in [2, 9, 4] {
        store
            .save(NewSnapshot {
                aggregate_id,
                aggregate_type: "Spacecraft".to_owned(),
                sequence_number: sequence,
                payload: serde_json::json!({"upTo": sequence}),
            })
            .await
            .unwrap();
    }

    let latest = store.latest(aggregate_id).await.unwrap().unwrap();
    assert_eq!(latest.sequence_number, 9);
}

// --- subscriptions ---

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_register_duplicate_name_conflicts() {
    let store = PgSubscriptionStore::new(pool().await);
    let name = format!("ops-{}", Uuid::new_v4());

    store
        .register(NewSubscription::new(
            name.clone(),
            vec!["SpacecraftCreated".to_owned()],
            "http://localhost/hook",
        ))
        .await
        .unwrap();

    let result = store
        .register(NewSubscription::new(
            name.clone(),
            vec!["SpacecraftCreated".to_owned()],
            "http://localhost/hook",
        ))
        .await;

    match result.unwrap_err() {
        StoreError::DuplicateSubscriptionName(dup) => assert_eq!(dup, name),
        other => panic!("expected DuplicateSubscriptionName, got {other:?}"),
    }
}

// --- dead letters ---

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_enqueue_and_advance_is_atomic_with_cursor() {
    let db = pool().await;
    let subscriptions = PgSubscriptionStore::new(db.clone());
    let dead_letters = PgDeadLetterStore::new(db);

    let subscription = subscriptions
        .register(NewSubscription::new(
            format!("dlq-{}", Uuid::new_v4()),
            vec!["SpacecraftCreated".to_owned()],
            "http://localhost/hook",
        ))
        .await
        .unwrap();

    let event_id = Uuid::new_v4();
    let entry = NewDeadLetter {
        subscription_id: subscription.id,
        original_event_id: event_id,
        event_type: "SpacecraftCreated".to_owned(),
        payload: serde_json::json!({"eventId": event_id}),
        error_message: "500 from callback".to_owned(),
        exception_type: Some("Rejected".to_owned()),
        retry_count: 3,
        max_retries: 3,
    };

    let first = dead_letters.enqueue_and_advance(entry.clone(), 17).await.unwrap();
    let updated = subscriptions.get(subscription.id).await.unwrap();
    assert_eq!(updated.position, 17);
    assert!(updated.next_retry_at.is_none());

    // Re-dead-lettering the same pair updates in place.
    let second = dead_letters.enqueue_and_advance(entry, 17).await.unwrap();
    assert_eq!(first.id, second.id);
    let entries = dead_letters.list(Some(subscription.id), None).await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server"]
async fn test_retry_request_flag_is_consumed_once() {
    let db = pool().await;
    let subscriptions = PgSubscriptionStore::new(db.clone());
    let dead_letters = PgDeadLetterStore::new(db);

    let subscription = subscriptions
        .register(NewSubscription::new(
            format!("retry-{}", Uuid::new_v4()),
            vec!["SpacecraftCreated".to_owned()],
            "http://localhost/hook",
        ))
        .await
        .unwrap();

    let entry = dead_letters
        .enqueue(NewDeadLetter {
            subscription_id: subscription.id,
            original_event_id: Uuid::new_v4(),
            event_type: "SpacecraftCreated".to_owned(),
            payload: serde_json::json!({}),
            error_message: "timeout".to_owned(),
            exception_type: Some("Timeout".to_owned()),
            retry_count: 3,
            max_retries: 3,
        })
        .await
        .unwrap();

    let flagged = dead_letters.request_retry(entry.id).await.unwrap();
    assert!(flagged.retry_requested);
    assert_eq!(flagged.retry_count, 0);

    let taken = dead_letters.take_retry_requests(subscription.id).await.unwrap();
    assert_eq!(taken.len(), 1);
    let empty = dead_letters.take_retry_requests(subscription.id).await.unwrap();
    assert!(empty.is_empty());
}
