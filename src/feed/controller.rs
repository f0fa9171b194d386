//! Paginated feed controller.
//!
//! Accumulates pages of content from a [`ContentService`] with at most one
//! page request in flight. Requests run as spawned tasks and report back over
//! a channel; results are applied when the owner calls `poll()` on every UI
//! tick.
//!
//! # Example
//!
//! ```ignore
//! let mut feed = FeedController::new(service, FeedQuery::default());
//! feed.set_user(Some(user_id));
//! feed.reset();
//!
//! // In event loop tick
//! if feed.poll() {
//!     // Items or interactions changed, re-render
//! }
//! ```
//!
//! Every request is tagged with the generation that issued it. `reset()`
//! bumps the generation, so anything still in flight from before the reset
//! is dropped when it arrives instead of being mixed into the fresh list.
//!
//! Interaction lookups also record the local edit sequence at the time they
//! were issued. An id patched locally after that point keeps its local state
//! when the lookup lands.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::sentinel::Sentinel;
use crate::content::{
  ContentItem, ContentService, Cursor, InteractionMap, InteractionPatch, InteractionState,
  ItemPatch, Page, PageFilter, SortOrder,
};
use crate::error::ServiceError;

/// Query parameters the controller fetches with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
  pub category: Option<String>,
  pub sort: SortOrder,
  pub page_size: u32,
}

impl Default for FeedQuery {
  fn default() -> Self {
    Self {
      category: None,
      sort: SortOrder::Recent,
      page_size: 10,
    }
  }
}

/// What the view should show for the list as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
  /// Nothing requested yet
  Idle,
  /// First page is on its way
  Loading,
  /// At least one item is available
  Ready,
  /// The service has no content for this query
  Empty,
  /// Nothing could be loaded; distinct from `Empty`
  Failed,
}

enum Completion {
  Page {
    generation: u64,
    result: Result<Page, ServiceError>,
  },
  Interactions {
    generation: u64,
    /// Local edit sequence when the lookup was issued
    issued_at: u64,
    result: Result<InteractionMap, ServiceError>,
  },
}

type ErrorCallback = Box<dyn FnMut(&ServiceError) + Send>;

pub struct FeedController<C: ContentService> {
  service: Arc<C>,
  query: FeedQuery,
  user_id: Option<String>,

  items: Vec<ContentItem>,
  interactions: InteractionMap,
  cursor: Cursor,
  has_more: bool,
  /// Observable loading indicator
  loading: bool,
  /// Guard checked before issuing a page request
  in_flight: bool,
  error: Option<ServiceError>,
  /// Last local edit sequence per item id, this generation only
  local_edits: HashMap<String, u64>,
  edit_seq: u64,

  generation: u64,
  /// Spawned tasks whose results have not been received yet, any generation
  outstanding: usize,
  tx: mpsc::UnboundedSender<Completion>,
  rx: mpsc::UnboundedReceiver<Completion>,

  on_error: Option<ErrorCallback>,
  sentinel: Option<Sentinel>,
  /// Items appended since the last `take_new_items()`
  new_items: Vec<ContentItem>,
}

impl<C: ContentService> FeedController<C> {
  pub fn new(service: Arc<C>, query: FeedQuery) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      service,
      query,
      user_id: None,
      items: Vec::new(),
      interactions: InteractionMap::new(),
      cursor: Cursor::default(),
      has_more: true,
      loading: false,
      in_flight: false,
      error: None,
      local_edits: HashMap::new(),
      edit_seq: 0,
      generation: 0,
      outstanding: 0,
      tx,
      rx,
      on_error: None,
      sentinel: None,
      new_items: Vec::new(),
    }
  }

  /// Set the user whose interactions are looked up for each new page.
  pub fn set_user(&mut self, user_id: Option<String>) {
    self.user_id = user_id;
  }

  /// Register a callback invoked whenever a page fetch fails.
  pub fn on_error(&mut self, callback: impl FnMut(&ServiceError) + Send + 'static) {
    self.on_error = Some(Box::new(callback));
  }

  /// Change the query. A different category or sort order resets the feed;
  /// a page size change alone applies from the next page.
  ///
  /// Returns true if a reset was triggered.
  pub fn configure(&mut self, category: Option<String>, sort: SortOrder, page_size: u32) -> bool {
    let needs_reset = category != self.query.category || sort != self.query.sort;
    self.query = FeedQuery {
      category,
      sort,
      page_size,
    };
    if needs_reset {
      self.reset();
    }
    needs_reset
  }

  /// Request the next page.
  ///
  /// No-op (returns false) while a request is in flight or once the service
  /// has reported there is nothing more.
  pub fn load_more(&mut self) -> bool {
    if self.in_flight || !self.has_more {
      return false;
    }
    self.in_flight = true;
    self.loading = true;

    let filter = PageFilter {
      category: self.query.category.clone(),
      sort: self.query.sort,
      page_size: self.query.page_size,
      cursor: self.cursor.clone(),
    };
    debug!(generation = self.generation, cursor = ?filter.cursor, "fetching feed page");

    let generation = self.generation;
    let request = self.service.fetch_page(filter);
    self.spawn(async move {
      Completion::Page {
        generation,
        result: request.await,
      }
    });
    true
  }

  /// Drop everything and fetch page one again.
  pub fn reset(&mut self) {
    self.generation += 1;
    self.items.clear();
    self.interactions.clear();
    self.local_edits.clear();
    self.new_items.clear();
    self.cursor = Cursor::default();
    self.has_more = true;
    self.error = None;
    self.in_flight = false;
    self.loading = false;
    if let Some(sentinel) = self.sentinel.as_mut() {
      sentinel.disconnect();
    }
    self.load_more();
  }

  /// Merge fields into the interaction state of `item_id` without a request.
  ///
  /// Ids not in the list are kept in the map so a later page can use them.
  pub fn update_local_interaction(&mut self, item_id: &str, patch: InteractionPatch) {
    self.edit_seq += 1;
    self.local_edits.insert(item_id.to_string(), self.edit_seq);
    self
      .interactions
      .entry(item_id.to_string())
      .or_default()
      .apply(&patch);
  }

  /// Merge fields into the listed item in place. Returns false if no item matched.
  pub fn update_local_item(&mut self, item_id: &str, patch: &ItemPatch) -> bool {
    match self.items.iter_mut().find(|item| item.id == item_id) {
      Some(item) => {
        item.apply(patch);
        true
      }
      None => false,
    }
  }

  /// Observe `element` (normally the last rendered item) so that it loads
  /// the next page once visible. Ignored while a page is loading.
  pub fn attach_sentinel(&mut self, element: impl Into<String>) {
    if self.loading {
      return;
    }
    self
      .sentinel
      .get_or_insert_with(Sentinel::default)
      .observe(element);
  }

  /// Report that `element` is visible. Returns true if it started a page load.
  pub fn notify_visible(&mut self, element: &str) -> bool {
    let fired = self
      .sentinel
      .as_mut()
      .is_some_and(|sentinel| sentinel.notify_visible(element));
    fired && self.load_more()
  }

  /// Apply every completed request without blocking.
  ///
  /// Returns true if anything arrived. Call this in the event loop tick.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(completion) = self.rx.try_recv() {
      self.apply(completion);
      changed = true;
    }
    changed
  }

  #[cfg(test)]
  /// Wait for the next completed request and apply it.
  ///
  /// Returns false immediately when nothing is outstanding.
  pub async fn wait(&mut self) -> bool {
    if self.outstanding == 0 {
      return false;
    }
    match self.rx.recv().await {
      Some(completion) => {
        self.apply(completion);
        true
      }
      None => false,
    }
  }

  #[cfg(test)]
  /// Wait until every outstanding request has been applied or discarded.
  pub async fn settle(&mut self) {
    while self.wait().await {}
  }

  /// Items appended since the previous call, for pushing into the offline cache.
  pub fn take_new_items(&mut self) -> Vec<ContentItem> {
    std::mem::take(&mut self.new_items)
  }

  pub fn items(&self) -> &[ContentItem] {
    &self.items
  }

  #[cfg(test)]
  pub fn interactions(&self) -> &InteractionMap {
    &self.interactions
  }

  pub fn interaction(&self, item_id: &str) -> Option<InteractionState> {
    self.interactions.get(item_id).copied()
  }

  #[cfg(test)]
  pub fn cursor(&self) -> &Cursor {
    &self.cursor
  }

  pub fn has_more(&self) -> bool {
    self.has_more
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn error(&self) -> Option<&ServiceError> {
    self.error.as_ref()
  }

  pub fn query(&self) -> &FeedQuery {
    &self.query
  }

  #[cfg(test)]
  pub fn sentinel(&self) -> Option<&Sentinel> {
    self.sentinel.as_ref()
  }

  pub fn status(&self) -> FeedStatus {
    if !self.items.is_empty() {
      FeedStatus::Ready
    } else if self.loading {
      FeedStatus::Loading
    } else if self.error.is_some() {
      FeedStatus::Failed
    } else if self.has_more {
      FeedStatus::Idle
    } else {
      FeedStatus::Empty
    }
  }

  fn spawn<F>(&mut self, task: F)
  where
    F: Future<Output = Completion> + Send + 'static,
  {
    self.outstanding += 1;
    let tx = self.tx.clone();
    tokio::spawn(async move {
      // Ignore send errors - the controller may have been dropped
      let _ = tx.send(task.await);
    });
  }

  fn apply(&mut self, completion: Completion) {
    self.outstanding = self.outstanding.saturating_sub(1);
    match completion {
      Completion::Page { generation, result } => {
        if generation != self.generation {
          debug!(generation, current = self.generation, "discarding stale feed page");
          return;
        }
        self.in_flight = false;
        self.loading = false;
        match result {
          Ok(page) => self.apply_page(page),
          Err(err) => {
            warn!(error = %err, code = ?err.code, "feed page fetch failed");
            if let Some(callback) = self.on_error.as_mut() {
              callback(&err);
            }
            self.error = Some(err);
          }
        }
      }
      Completion::Interactions {
        generation,
        issued_at,
        result,
      } => {
        if generation != self.generation {
          debug!(generation, current = self.generation, "discarding stale interactions");
          return;
        }
        match result {
          Ok(map) => {
            for (id, state) in map {
              let edited_since = self
                .local_edits
                .get(&id)
                .is_some_and(|&seq| seq > issued_at);
              if edited_since {
                debug!(id = %id, "keeping local interaction over older lookup");
                continue;
              }
              self.interactions.insert(id, state);
            }
          }
          Err(err) => warn!(error = %err, "interaction lookup failed, keeping page"),
        }
      }
    }
  }

  fn apply_page(&mut self, page: Page) {
    debug!(
      count = page.items.len(),
      has_more = page.has_more,
      "applied feed page"
    );
    let new_ids: Vec<String> = page.items.iter().map(|item| item.id.clone()).collect();

    self.new_items.extend(page.items.iter().cloned());
    self.items.extend(page.items);
    self.cursor = page.next_cursor;
    self.has_more = page.has_more;
    self.error = None;

    if let Some(user_id) = self.user_id.clone() {
      if !new_ids.is_empty() {
        let generation = self.generation;
        let issued_at = self.edit_seq;
        let request = self.service.fetch_interactions(new_ids, user_id);
        self.spawn(async move {
          Completion::Interactions {
            generation,
            issued_at,
            result: request.await,
          }
        });
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::content::fake::FakeService;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn controller(service: &Arc<FakeService>) -> FeedController<FakeService> {
    FeedController::new(service.clone(), FeedQuery::default())
  }

  fn ids<C: ContentService>(feed: &FeedController<C>) -> Vec<&str> {
    feed.items().iter().map(|item| item.id.as_str()).collect()
  }

  #[tokio::test]
  async fn test_pages_accumulate_in_order() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a", "b"], true);
    service.push_page(&["c", "d"], false);
    let mut feed = controller(&service);

    assert!(feed.load_more());
    feed.settle().await;
    assert!(feed.load_more());
    feed.settle().await;

    assert_eq!(ids(&feed), vec!["a", "b", "c", "d"]);
    assert_eq!(feed.cursor(), &Cursor::Offset(4));
    assert!(!feed.has_more());
    assert_eq!(feed.status(), FeedStatus::Ready);

    let cursors: Vec<Cursor> = service.filters().into_iter().map(|f| f.cursor).collect();
    assert_eq!(cursors, vec![Cursor::Offset(0), Cursor::Offset(2)]);
  }

  #[tokio::test]
  async fn test_rapid_load_more_issues_single_request() {
    let service = Arc::new(FakeService::new());
    let release = service.push_gated_page(&["a", "b"], true);
    let mut feed = controller(&service);

    assert!(feed.load_more());
    for _ in 0..5 {
      assert!(!feed.load_more());
    }
    assert!(feed.is_loading());
    assert_eq!(service.page_calls(), 1);

    release.send(()).unwrap();
    feed.settle().await;
    assert_eq!(ids(&feed), vec!["a", "b"]);
    assert!(!feed.is_loading());
  }

  #[tokio::test]
  async fn test_load_more_when_exhausted_is_noop() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a"], false);
    let mut feed = controller(&service);

    feed.load_more();
    feed.settle().await;

    assert!(!feed.load_more());
    assert_eq!(service.page_calls(), 1);
  }

  #[tokio::test]
  async fn test_failed_fetch_keeps_cursor_and_items() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a", "b"], true);
    service.push_error("gateway timeout");
    service.push_page(&["c"], false);
    let failures = Arc::new(AtomicUsize::new(0));
    let mut feed = controller(&service);
    let counter = failures.clone();
    feed.on_error(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    feed.load_more();
    feed.settle().await;
    feed.load_more();
    feed.settle().await;

    assert_eq!(ids(&feed), vec!["a", "b"]);
    assert_eq!(feed.cursor(), &Cursor::Offset(2));
    assert!(!feed.is_loading());
    assert_eq!(feed.error().map(|e| e.message.as_str()), Some("gateway timeout"));
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    // No automatic retry
    assert_eq!(service.page_calls(), 2);

    // A manual retry resumes from the same cursor
    assert!(feed.load_more());
    feed.settle().await;
    assert_eq!(ids(&feed), vec!["a", "b", "c"]);
    assert!(feed.error().is_none());
    assert_eq!(service.filters()[2].cursor, Cursor::Offset(2));
  }

  #[tokio::test]
  async fn test_reset_discards_in_flight_page() {
    let service = Arc::new(FakeService::new());
    let release = service.push_gated_page(&["old1", "old2"], true);
    service.push_page(&["new1"], false);
    let mut feed = controller(&service);

    feed.load_more();
    feed.reset();
    assert_eq!(service.page_calls(), 2);

    release.send(()).unwrap();
    feed.settle().await;

    assert_eq!(ids(&feed), vec!["new1"]);
    assert_eq!(feed.cursor(), &Cursor::Offset(1));
    assert!(!feed.is_loading());
  }

  #[tokio::test]
  async fn test_reset_clears_state_before_refetch() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a", "b"], true);
    service.push_page(&["x"], true);
    let mut feed = controller(&service);
    feed.load_more();
    feed.settle().await;
    feed.update_local_interaction("a", InteractionPatch {
      liked: Some(true),
      ..Default::default()
    });

    feed.reset();
    assert!(feed.items().is_empty());
    assert!(feed.interactions().is_empty());
    assert_eq!(feed.cursor(), &Cursor::Offset(0));
    assert_eq!(feed.status(), FeedStatus::Loading);

    feed.settle().await;
    assert_eq!(ids(&feed), vec!["x"]);
    assert_eq!(service.filters()[1].cursor, Cursor::Offset(0));
  }

  #[tokio::test]
  async fn test_configure_resets_only_on_category_or_sort_change() {
    let service = Arc::new(FakeService::new());
    let mut feed = controller(&service);

    assert!(!feed.configure(None, SortOrder::Recent, 10));
    assert!(!feed.configure(None, SortOrder::Recent, 30));
    assert_eq!(service.page_calls(), 0);
    assert_eq!(feed.query().page_size, 30);

    assert!(feed.configure(Some("mentorship".to_string()), SortOrder::Recent, 30));
    feed.settle().await;
    assert!(feed.configure(Some("mentorship".to_string()), SortOrder::Popular, 30));
    feed.settle().await;

    let filters = service.filters();
    assert_eq!(filters.len(), 2);
    assert_eq!(filters[0].category.as_deref(), Some("mentorship"));
    assert_eq!(filters[0].page_size, 30);
    assert_eq!(filters[1].sort, SortOrder::Popular);
  }

  #[tokio::test]
  async fn test_interactions_merged_for_new_items() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a", "b"], true);
    service.push_page(&["c"], false);
    service.set_interaction(
      "a",
      InteractionState {
        liked: true,
        bookmarked: false,
      },
    );
    service.set_interaction(
      "c",
      InteractionState {
        liked: false,
        bookmarked: true,
      },
    );
    let mut feed = controller(&service);
    feed.set_user(Some("user-1".to_string()));

    feed.load_more();
    feed.settle().await;
    feed.load_more();
    feed.settle().await;

    assert!(feed.interaction("a").is_some_and(|s| s.liked));
    assert!(feed.interaction("c").is_some_and(|s| s.bookmarked));
    assert_eq!(
      service.interaction_calls(),
      vec![
        vec!["a".to_string(), "b".to_string()],
        vec!["c".to_string()]
      ]
    );
  }

  #[tokio::test]
  async fn test_interaction_failure_keeps_page() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a"], true);
    service.fail_interactions();
    let mut feed = controller(&service);
    feed.set_user(Some("user-1".to_string()));

    feed.load_more();
    feed.settle().await;

    assert_eq!(ids(&feed), vec!["a"]);
    assert!(feed.error().is_none());
    assert!(feed.interactions().is_empty());
  }

  #[tokio::test]
  async fn test_no_user_skips_interaction_lookup() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a"], true);
    let mut feed = controller(&service);

    feed.load_more();
    feed.settle().await;

    assert!(service.interaction_calls().is_empty());
  }

  #[tokio::test]
  async fn test_stale_interactions_discarded_after_reset() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a"], true);
    service.push_page(&["b"], false);
    service.set_interaction(
      "a",
      InteractionState {
        liked: true,
        bookmarked: true,
      },
    );
    let release = service.gate_next_interactions();
    let mut feed = controller(&service);
    feed.set_user(Some("user-1".to_string()));

    feed.load_more();
    // Page applied; its interaction lookup is held by the gate
    assert!(feed.wait().await);
    assert_eq!(ids(&feed), vec!["a"]);

    feed.reset();
    release.send(()).unwrap();
    feed.settle().await;

    assert_eq!(ids(&feed), vec!["b"]);
    assert_eq!(feed.interaction("a"), None);
  }

  #[tokio::test]
  async fn test_local_like_survives_older_interaction_lookup() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a", "b"], true);
    service.set_interaction("a", InteractionState::default());
    service.set_interaction(
      "b",
      InteractionState {
        liked: false,
        bookmarked: true,
      },
    );
    let release = service.gate_next_interactions();
    let mut feed = controller(&service);
    feed.set_user(Some("user-1".to_string()));

    feed.load_more();
    assert!(feed.wait().await);
    feed.update_local_interaction(
      "a",
      InteractionPatch {
        liked: Some(true),
        ..Default::default()
      },
    );
    release.send(()).unwrap();
    feed.settle().await;

    assert!(feed.interaction("a").is_some_and(|s| s.liked));
    // Untouched ids still take the looked-up state
    assert!(feed.interaction("b").is_some_and(|s| s.bookmarked));
  }

  #[tokio::test]
  async fn test_lookup_issued_after_local_edit_applies() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a"], true);
    service.set_interaction(
      "a",
      InteractionState {
        liked: true,
        bookmarked: true,
      },
    );
    let mut feed = controller(&service);
    feed.set_user(Some("user-1".to_string()));
    feed.update_local_interaction(
      "a",
      InteractionPatch {
        liked: Some(false),
        ..Default::default()
      },
    );

    feed.load_more();
    feed.settle().await;

    assert_eq!(
      feed.interaction("a"),
      Some(InteractionState {
        liked: true,
        bookmarked: true,
      })
    );
  }

  #[tokio::test]
  async fn test_update_local_interaction_for_unknown_item() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a"], true);
    let mut feed = controller(&service);
    feed.load_more();
    feed.settle().await;

    feed.update_local_interaction(
      "zzz",
      InteractionPatch {
        liked: Some(true),
        ..Default::default()
      },
    );

    assert_eq!(ids(&feed), vec!["a"]);
    assert!(feed.interaction("zzz").is_some_and(|s| s.liked));
  }

  #[tokio::test]
  async fn test_update_local_item_merges_in_place() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a", "b"], true);
    let mut feed = controller(&service);
    feed.load_more();
    feed.settle().await;

    let patch = ItemPatch {
      like_count: Some(7),
      comment_count: Some(2),
      ..Default::default()
    };
    assert!(feed.update_local_item("b", &patch));
    assert!(!feed.update_local_item("missing", &patch));

    assert_eq!(ids(&feed), vec!["a", "b"]);
    assert_eq!(feed.items()[1].like_count, 7);
    assert_eq!(feed.items()[1].comment_count, 2);
    assert_eq!(feed.items()[0].like_count, 0);
  }

  #[tokio::test]
  async fn test_sentinel_triggers_one_load() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a", "b"], true);
    service.push_page(&["c"], true);
    let mut feed = controller(&service);
    feed.load_more();
    feed.settle().await;

    assert!(!feed.notify_visible("b"));
    feed.attach_sentinel("b");
    assert!(feed.notify_visible("b"));
    assert!(!feed.notify_visible("b"));
    feed.settle().await;

    assert_eq!(ids(&feed), vec!["a", "b", "c"]);
    assert_eq!(service.page_calls(), 2);
  }

  #[tokio::test]
  async fn test_sentinel_not_attached_while_loading() {
    let service = Arc::new(FakeService::new());
    let release = service.push_gated_page(&["a"], true);
    let mut feed = controller(&service);

    feed.load_more();
    feed.attach_sentinel("a");
    assert!(feed.sentinel().is_none());

    release.send(()).unwrap();
    feed.settle().await;
  }

  #[tokio::test]
  async fn test_failed_reset_is_distinct_from_empty() {
    let service = Arc::new(FakeService::new());
    service.push_error("unreachable");
    let mut feed = controller(&service);
    feed.reset();
    feed.settle().await;
    assert_eq!(feed.status(), FeedStatus::Failed);

    service.push_page(&[], false);
    feed.reset();
    feed.settle().await;
    assert_eq!(feed.status(), FeedStatus::Empty);
  }

  #[tokio::test]
  async fn test_take_new_items_drains_fresh_batch() {
    let service = Arc::new(FakeService::new());
    service.push_page(&["a", "b"], true);
    let mut feed = controller(&service);
    assert_eq!(feed.status(), FeedStatus::Idle);

    feed.load_more();
    feed.settle().await;

    assert_eq!(feed.take_new_items().len(), 2);
    assert!(feed.take_new_items().is_empty());
  }
}
