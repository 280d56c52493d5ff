#![forbid(unsafe_code)]

use trellis_storage::repo::OutboxRepo;

/// Renders outbox rows newer than `after_id` as JSON lines for the
/// notification collaborator. The consumer tracks its own high-water mark;
/// the outbox itself stays append-only.
pub fn collect_outbound_json<R: OutboxRepo>(
    repo: &R,
    after_id: u64,
) -> Result<Vec<String>, serde_json::Error> {
    repo.outbound_rows()
        .iter()
        .filter(|r| r.outbound_event_id > after_id)
        .map(serde_json::to_string)
        .collect()
}
