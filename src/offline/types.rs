use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::content::{ActionPayload, ContentItem};
use crate::error::ReplayError;

/// Snapshot of a content item kept for offline viewing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedContentItem {
  pub item: ContentItem,
  pub cached_at: DateTime<Utc>,
}

/// A write captured while offline, waiting to be replayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction {
  pub id: String,
  pub payload: ActionPayload,
  pub user_id: String,
  pub queued_at: DateTime<Utc>,
  /// Replay passes that failed for this action so far
  #[serde(default)]
  pub attempts: u32,
}

impl QueuedAction {
  pub fn new(user_id: &str, payload: ActionPayload) -> Self {
    let queued_at = Utc::now();
    Self {
      id: action_id(user_id, &payload, queued_at),
      payload,
      user_id: user_id.to_string(),
      queued_at,
      attempts: 0,
    }
  }
}

/// Stable id for a queued action: SHA256 of who, what and when.
fn action_id(user_id: &str, payload: &ActionPayload, queued_at: DateTime<Utc>) -> String {
  let mut hasher = Sha256::new();
  hasher.update(user_id.as_bytes());
  hasher.update(b"\n");
  hasher.update(serde_json::to_vec(payload).unwrap_or_default());
  hasher.update(b"\n");
  hasher.update(
    queued_at
      .timestamp_nanos_opt()
      .unwrap_or_default()
      .to_be_bytes(),
  );
  hex::encode(hasher.finalize())
}

/// How `queue_action` routed an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
  /// Stored for replay; the caller must not perform the request
  Queued(String),
  /// Online; the caller performs the request itself
  PassThrough,
}

/// Result of one replay pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayReport {
  /// Ids of actions the service acknowledged
  pub completed: Vec<String>,
  /// Failed actions left in the queue for a later pass
  pub retained: Vec<ReplayError>,
  /// Actions dropped after too many failed passes
  pub abandoned: Vec<QueuedAction>,
}
