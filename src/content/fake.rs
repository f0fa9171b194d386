//! Scripted in-process content service for tests.

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::oneshot;

use super::service::ContentService;
use super::types::{
  ActionPayload, AuthorRef, ContentItem, Cursor, InteractionMap, InteractionState, Page,
  PageFilter,
};
use crate::error::ServiceError;

struct Scripted<T> {
  result: Result<T, ServiceError>,
  gate: Option<oneshot::Receiver<()>>,
}

/// Content service whose responses are queued up front by the test.
#[derive(Default)]
pub struct FakeService {
  pages: Mutex<VecDeque<Scripted<(Vec<ContentItem>, bool)>>>,
  filters: Mutex<Vec<PageFilter>>,
  interactions: Mutex<InteractionMap>,
  interactions_fail: Mutex<bool>,
  interaction_gate: Mutex<Option<oneshot::Receiver<()>>>,
  interaction_calls: Mutex<Vec<Vec<String>>>,
  failing_items: Mutex<HashSet<String>>,
  unreachable_items: Mutex<HashSet<String>>,
  submitted: Mutex<Vec<(String, ActionPayload)>>,
}

impl FakeService {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push_page(&self, ids: &[&str], has_more: bool) {
    self.pages.lock().unwrap().push_back(Scripted {
      result: Ok((ids.iter().map(|id| item(id)).collect(), has_more)),
      gate: None,
    });
  }

  /// Queue a page that is only delivered once the returned sender fires.
  pub fn push_gated_page(&self, ids: &[&str], has_more: bool) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    self.pages.lock().unwrap().push_back(Scripted {
      result: Ok((ids.iter().map(|id| item(id)).collect(), has_more)),
      gate: Some(rx),
    });
    tx
  }

  pub fn push_error(&self, message: &str) {
    self.pages.lock().unwrap().push_back(Scripted {
      result: Err(ServiceError::new(message).with_code("500")),
      gate: None,
    });
  }

  pub fn set_interaction(&self, id: &str, state: InteractionState) {
    self
      .interactions
      .lock()
      .unwrap()
      .insert(id.to_string(), state);
  }

  pub fn fail_interactions(&self) {
    *self.interactions_fail.lock().unwrap() = true;
  }

  /// Hold the next interaction lookup until the returned sender fires.
  pub fn gate_next_interactions(&self) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    *self.interaction_gate.lock().unwrap() = Some(rx);
    tx
  }

  pub fn fail_actions_for(&self, item_id: &str) {
    self
      .failing_items
      .lock()
      .unwrap()
      .insert(item_id.to_string());
  }

  /// Writes for `item_id` fail without a status code, like a dropped connection.
  pub fn drop_actions_for(&self, item_id: &str) {
    self
      .unreachable_items
      .lock()
      .unwrap()
      .insert(item_id.to_string());
  }

  pub fn page_calls(&self) -> usize {
    self.filters.lock().unwrap().len()
  }

  pub fn filters(&self) -> Vec<PageFilter> {
    self.filters.lock().unwrap().clone()
  }

  pub fn interaction_calls(&self) -> Vec<Vec<String>> {
    self.interaction_calls.lock().unwrap().clone()
  }

  pub fn submitted(&self) -> Vec<(String, ActionPayload)> {
    self.submitted.lock().unwrap().clone()
  }
}

impl ContentService for FakeService {
  fn fetch_page(&self, filter: PageFilter) -> BoxFuture<'static, Result<Page, ServiceError>> {
    let offset = match filter.cursor {
      Cursor::Offset(o) => o,
      Cursor::Token(_) => 0,
    };
    self.filters.lock().unwrap().push(filter);
    let scripted = self.pages.lock().unwrap().pop_front();

    async move {
      let Some(scripted) = scripted else {
        return Ok(Page {
          items: Vec::new(),
          has_more: false,
          next_cursor: Cursor::Offset(offset),
        });
      };
      if let Some(gate) = scripted.gate {
        let _ = gate.await;
      }
      scripted.result.map(|(items, has_more)| Page {
        next_cursor: Cursor::Offset(offset + items.len() as u64),
        items,
        has_more,
      })
    }
    .boxed()
  }

  fn fetch_interactions(
    &self,
    item_ids: Vec<String>,
    _user_id: String,
  ) -> BoxFuture<'static, Result<InteractionMap, ServiceError>> {
    self.interaction_calls.lock().unwrap().push(item_ids.clone());
    let gate = self.interaction_gate.lock().unwrap().take();
    let result = if *self.interactions_fail.lock().unwrap() {
      Err(ServiceError::new("interactions unavailable"))
    } else {
      let known = self.interactions.lock().unwrap();
      Ok(
        item_ids
          .into_iter()
          .filter_map(|id| known.get(&id).map(|state| (id, *state)))
          .collect(),
      )
    };

    async move {
      if let Some(gate) = gate {
        let _ = gate.await;
      }
      result
    }
    .boxed()
  }

  fn submit_action(
    &self,
    user_id: String,
    action: ActionPayload,
  ) -> BoxFuture<'static, Result<(), ServiceError>> {
    let fails = self.failing_items.lock().unwrap().contains(action.item_id());
    let dropped = self.unreachable_items.lock().unwrap().contains(action.item_id());
    self.submitted.lock().unwrap().push((user_id, action));
    async move {
      if fails {
        Err(ServiceError::new("rejected").with_code("503"))
      } else if dropped {
        Err(ServiceError::new("connection reset"))
      } else {
        Ok(())
      }
    }
    .boxed()
  }
}

pub fn item(id: &str) -> ContentItem {
  ContentItem {
    id: id.to_string(),
    author: AuthorRef {
      id: "author-1".to_string(),
      display_name: Some("Otieno Builders".to_string()),
    },
    body: format!("Site update {}", id),
    category: Some("projects".to_string()),
    created_at: Utc::now(),
    like_count: 0,
    comment_count: 0,
  }
}
