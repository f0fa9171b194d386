//! The narrow query interface the feed and offline layers consume.

use futures::future::BoxFuture;

use super::types::{ActionPayload, InteractionMap, Page, PageFilter};
use crate::error::ServiceError;

/// Remote content service.
///
/// Futures are `'static` so callers can spawn them and apply the result
/// later from their own event loop.
pub trait ContentService: Send + Sync + 'static {
  /// Fetch one page. Either the whole page or an error, never partial.
  fn fetch_page(&self, filter: PageFilter) -> BoxFuture<'static, Result<Page, ServiceError>>;

  /// Best-effort lookup of the user's interactions with the given items.
  fn fetch_interactions(
    &self,
    item_ids: Vec<String>,
    user_id: String,
  ) -> BoxFuture<'static, Result<InteractionMap, ServiceError>>;

  /// Perform a write on behalf of the user. `Ok` means the backend acknowledged it.
  fn submit_action(
    &self,
    user_id: String,
    action: ActionPayload,
  ) -> BoxFuture<'static, Result<(), ServiceError>>;
}
