//! Offline cache and action queue.
//!
//! Keeps a bounded cache of recently seen items for offline viewing and a
//! queue of writes attempted while disconnected. When connectivity returns,
//! a snapshot of the queue is replayed against the content service in a
//! spawned task; the result is applied from `poll()` on the UI tick.
//!
//! Only acknowledged actions leave the queue. A failed action stays queued
//! for the next pass until the service has rejected it `max_replay_attempts`
//! times, at which point it is abandoned and reported. Transport failures
//! carry no status code and do not count as attempts. Anything queued while a pass is
//! running waits for the next reconnect or a manual `replay_queue()`.
//!
//! Both collections are stored as whole JSON blobs and rewritten on every
//! change. A blob that can't be read is treated as empty and replaced by the
//! next successful write.

use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::store::KeyValueStore;
use super::types::{CachedContentItem, QueueOutcome, QueuedAction, ReplayReport};
use crate::config::OfflineConfig;
use crate::content::{ActionPayload, ContentItem, ContentService, ItemPatch};
use crate::error::{PersistenceError, ReplayError, ServiceError};

#[derive(Debug, Clone)]
pub struct OfflineSettings {
  /// Most recent items kept in the cache
  pub cache_capacity: usize,
  /// Cached items older than this are purged on load
  pub retention: Duration,
  /// Rejections by the service after which a queued action is abandoned
  pub max_replay_attempts: u32,
}

impl Default for OfflineSettings {
  fn default() -> Self {
    Self {
      cache_capacity: 20,
      retention: Duration::hours(24),
      max_replay_attempts: 3,
    }
  }
}

impl From<&OfflineConfig> for OfflineSettings {
  fn from(config: &OfflineConfig) -> Self {
    Self {
      cache_capacity: config.cache_capacity,
      retention: config.retention(),
      max_replay_attempts: config.max_replay_attempts.max(1),
    }
  }
}

/// Key prefix separating data of different backends and accounts.
pub fn store_namespace(backend_url: &str, user_id: Option<&str>) -> String {
  let mut hasher = Sha256::new();
  hasher.update(backend_url.trim_end_matches('/').as_bytes());
  hasher.update(b"\n");
  hasher.update(user_id.unwrap_or("").as_bytes());
  let digest = hex::encode(hasher.finalize());
  digest[..16].to_string()
}

struct ReplayCompletion {
  outcomes: Vec<(String, Result<(), ServiceError>)>,
}

pub struct OfflineSync<S: KeyValueStore + ?Sized, C: ContentService> {
  store: Arc<S>,
  service: Arc<C>,
  settings: OfflineSettings,
  cache_key: String,
  queue_key: String,

  online: bool,
  replaying: bool,
  cached: Vec<CachedContentItem>,
  /// Queue length as of the last read or write
  pending: usize,

  tx: mpsc::UnboundedSender<ReplayCompletion>,
  rx: mpsc::UnboundedReceiver<ReplayCompletion>,
}

impl<S: KeyValueStore + ?Sized, C: ContentService> OfflineSync<S, C> {
  pub fn new(store: Arc<S>, service: Arc<C>, settings: OfflineSettings, namespace: &str) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      store,
      service,
      settings,
      cache_key: format!("{}:offline_cache", namespace),
      queue_key: format!("{}:offline_queue", namespace),
      online: true,
      replaying: false,
      cached: Vec::new(),
      pending: 0,
      tx,
      rx,
    }
  }

  /// Start-up: take the current connectivity once and load the cache.
  ///
  /// If already online, actions left over from an earlier session are
  /// replayed. Returns true if a replay pass started.
  pub fn init(&mut self, online: bool) -> bool {
    self.online = online;
    self.load_cache();
    self.pending = self.pending_actions().len();
    if online {
      self.replay_queue()
    } else {
      false
    }
  }

  /// Logout: drop everything this account has stored.
  pub fn teardown(&mut self) {
    self.clear_cache();
  }

  pub fn is_online(&self) -> bool {
    self.online
  }

  pub fn is_replaying(&self) -> bool {
    self.replaying
  }

  /// Record an online/offline signal from the environment.
  ///
  /// Returns true if the transition to online started a replay pass.
  pub fn record_connectivity(&mut self, online: bool) -> bool {
    if self.online == online {
      return false;
    }
    self.online = online;
    info!(online, "connectivity changed");
    if online {
      self.replay_queue()
    } else {
      false
    }
  }

  /// Cache the most recent fetch batch.
  ///
  /// Items are appended in write order (an item written again moves to the
  /// newest position) and only the newest `cache_capacity` entries are kept.
  pub fn cache_pages(&mut self, items: &[ContentItem]) {
    if items.is_empty() {
      return;
    }
    let now = Utc::now();
    let mut entries: Vec<CachedContentItem> = self.read_blob(&self.cache_key);
    entries.retain(|entry| !items.iter().any(|item| item.id == entry.item.id));
    entries.extend(items.iter().map(|item| CachedContentItem {
      item: item.clone(),
      cached_at: now,
    }));

    let excess = entries.len().saturating_sub(self.settings.cache_capacity);
    entries.drain(..excess);

    if let Err(e) = self.write_blob(&self.cache_key, &entries) {
      warn!(error = %e, "failed to persist offline cache");
    }
    debug!(cached = entries.len(), dropped = excess, "offline cache updated");
    self.cached = entries;
  }

  /// Read the cache, purge expired entries and persist the filtered result.
  pub fn load_cache(&mut self) -> &[CachedContentItem] {
    let mut entries: Vec<CachedContentItem> = self.read_blob(&self.cache_key);
    let before = entries.len();
    let cutoff = Utc::now() - self.settings.retention;
    entries.retain(|entry| entry.cached_at > cutoff);

    let purged = before - entries.len();
    if purged > 0 {
      info!(purged, remaining = entries.len(), "purged expired offline cache entries");
    }
    if let Err(e) = self.write_blob(&self.cache_key, &entries) {
      warn!(error = %e, "failed to persist offline cache");
    }
    self.cached = entries;
    &self.cached
  }

  pub fn cached_items(&self) -> &[CachedContentItem] {
    &self.cached
  }

  /// Merge a local edit into a cached entry, keeping its `cached_at`.
  /// Returns false if the item is not cached.
  pub fn update_cached_item(&mut self, item_id: &str, patch: &ItemPatch) -> bool {
    let Some(entry) = self.cached.iter_mut().find(|entry| entry.item.id == item_id) else {
      return false;
    };
    if entry.item.apply(patch) {
      if let Err(e) = self.write_blob(&self.cache_key, &self.cached) {
        warn!(error = %e, "failed to persist offline cache");
      }
    }
    true
  }

  /// Route a write. Offline, it is persisted for replay and the caller must
  /// not send it; online, the caller performs the request normally.
  pub fn queue_action(
    &mut self,
    user_id: &str,
    payload: ActionPayload,
  ) -> Result<QueueOutcome, PersistenceError> {
    if self.online {
      return Ok(QueueOutcome::PassThrough);
    }
    let action = QueuedAction::new(user_id, payload);
    let mut queue: Vec<QueuedAction> = self.read_blob(&self.queue_key);
    queue.push(action.clone());
    self.write_blob(&self.queue_key, &queue)?;
    self.pending = queue.len();

    info!(id = %action.id, pending = queue.len(), "queued offline action");
    Ok(QueueOutcome::Queued(action.id))
  }

  /// Actions currently waiting for replay, oldest first.
  pub fn pending_actions(&self) -> Vec<QueuedAction> {
    self.read_blob(&self.queue_key)
  }

  /// Number of queued actions, without touching the store.
  pub fn pending_count(&self) -> usize {
    self.pending
  }

  /// Start a replay pass over a snapshot of the queue.
  ///
  /// No-op (returns false) while offline, while a pass is running, or with
  /// nothing queued.
  pub fn replay_queue(&mut self) -> bool {
    if self.replaying || !self.online {
      return false;
    }
    let snapshot: Vec<QueuedAction> = self.read_blob(&self.queue_key);
    if snapshot.is_empty() {
      return false;
    }
    self.replaying = true;
    info!(count = snapshot.len(), "replaying queued actions");

    let service = Arc::clone(&self.service);
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let mut outcomes = Vec::with_capacity(snapshot.len());
      for action in snapshot {
        let result = service
          .submit_action(action.user_id.clone(), action.payload.clone())
          .await;
        outcomes.push((action.id, result));
      }
      // Ignore send errors - the sync layer may have been dropped
      let _ = tx.send(ReplayCompletion { outcomes });
    });
    true
  }

  /// Apply a finished replay pass, if any, without blocking.
  pub fn poll(&mut self) -> Option<ReplayReport> {
    match self.rx.try_recv() {
      Ok(completion) => Some(self.finish_replay(completion)),
      Err(_) => None,
    }
  }

  /// Wait for the running replay pass to finish and apply it.
  #[cfg(test)]
  pub async fn wait(&mut self) -> Option<ReplayReport> {
    if !self.replaying {
      return None;
    }
    let completion = self.rx.recv().await?;
    Some(self.finish_replay(completion))
  }

  /// Empty both the cache and the queue.
  pub fn clear_cache(&mut self) {
    for key in [&self.cache_key, &self.queue_key] {
      if let Err(e) = self.store.remove(key) {
        warn!(key = %key, error = %e, "failed to clear offline data");
      }
    }
    self.cached.clear();
    self.pending = 0;
    info!("offline cache and queue cleared");
  }

  fn finish_replay(&mut self, completion: ReplayCompletion) -> ReplayReport {
    self.replaying = false;
    let results: HashMap<String, Result<(), ServiceError>> =
      completion.outcomes.into_iter().collect();

    let mut report = ReplayReport::default();
    let mut kept = Vec::new();
    // Re-read: actions queued during the pass are not in `results`
    for mut action in self.read_blob::<QueuedAction>(&self.queue_key) {
      match results.get(&action.id) {
        None => kept.push(action),
        Some(Ok(())) => report.completed.push(action.id),
        Some(Err(err)) if err.code.is_none() => {
          debug!(id = %action.id, error = %err, "queued action unreachable, retained");
          report.retained.push(ReplayError {
            action_id: action.id.clone(),
            source: err.clone(),
          });
          kept.push(action);
        }
        Some(Err(err)) => {
          action.attempts += 1;
          if action.attempts >= self.settings.max_replay_attempts {
            warn!(id = %action.id, attempts = action.attempts, error = %err, "abandoning queued action");
            report.abandoned.push(action);
          } else {
            debug!(id = %action.id, attempts = action.attempts, error = %err, "queued action failed, retained");
            report.retained.push(ReplayError {
              action_id: action.id.clone(),
              source: err.clone(),
            });
            kept.push(action);
          }
        }
      }
    }

    if let Err(e) = self.write_blob(&self.queue_key, &kept) {
      error!(error = %e, "failed to persist action queue after replay");
    }
    self.pending = kept.len();
    info!(
      completed = report.completed.len(),
      retained = report.retained.len(),
      abandoned = report.abandoned.len(),
      "replay pass finished"
    );
    report
  }

  fn read_blob<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
    let raw = match self.store.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Vec::new(),
      Err(e) => {
        warn!(key, error = %e, "offline store unavailable, treating as empty");
        return Vec::new();
      }
    };
    match serde_json::from_str(&raw) {
      Ok(values) => values,
      Err(e) => {
        let err = PersistenceError::Corrupt {
          key: key.to_string(),
          reason: e.to_string(),
        };
        warn!(error = %err, "discarding unreadable offline data");
        Vec::new()
      }
    }
  }

  fn write_blob<T: Serialize>(&self, key: &str, values: &[T]) -> Result<(), PersistenceError> {
    let raw = serde_json::to_string(values).map_err(|e| PersistenceError::Corrupt {
      key: key.to_string(),
      reason: e.to_string(),
    })?;
    self.store.set(key, &raw)
  }
}
