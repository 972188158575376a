//! Snapshot-plus-tail replay.
//!
//! Consumers rebuilding aggregate state load the latest snapshot (if any)
//! and fold the remaining events onto it; the result must equal folding
//! the entire stream from sequence 1.

use uuid::Uuid;

use meridian_core::envelope::EventEnvelope;
use meridian_core::error::StoreError;
use meridian_core::snapshot::Snapshot;
use meridian_core::store::{EventStore, SnapshotStore};

/// The inputs a replay client folds: the authoritative snapshot and the
/// events past it.
#[derive(Debug)]
pub struct ReplaySource {
    /// Latest snapshot for the aggregate, if one exists.
    pub snapshot: Option<Snapshot>,
    /// Events after the snapshot (or the full stream when no snapshot
    /// exists), in ascending sequence order.
    pub events: Vec<EventEnvelope>,
}

/// Loads the latest snapshot and the event tail for one aggregate.
///
/// # Errors
///
/// Returns `StoreError` if either store read fails.
pub async fn load_for_replay(
    events: &dyn EventStore,
    snapshots: &dyn SnapshotStore,
    aggregate_id: Uuid,
) -> Result<ReplaySource, StoreError> {
    let snapshot = snapshots.latest(aggregate_id).await?;
    let from_sequence = snapshot.as_ref().map_or(1, |s| s.sequence_number + 1);
    let events = events.read_stream(aggregate_id, from_sequence).await?;
    Ok(ReplaySource { snapshot, events })
}
