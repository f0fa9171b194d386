use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reference to the profile that authored a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
  pub id: String,
  pub display_name: Option<String>,
}

/// A feed entry as returned by the content service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
  pub id: String,
  pub author: AuthorRef,
  pub body: String,
  pub category: Option<String>,
  pub created_at: DateTime<Utc>,
  pub like_count: u32,
  pub comment_count: u32,
}

impl ContentItem {
  /// Apply a local patch, returning true if any field changed.
  pub fn apply(&mut self, patch: &ItemPatch) -> bool {
    let before = self.clone();
    if let Some(body) = &patch.body {
      self.body = body.clone();
    }
    if let Some(likes) = patch.like_count {
      self.like_count = likes;
    }
    if let Some(comments) = patch.comment_count {
      self.comment_count = comments;
    }
    *self != before
  }
}

/// Partial fields for an optimistic item update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
  pub body: Option<String>,
  pub like_count: Option<u32>,
  pub comment_count: Option<u32>,
}

/// The requesting user's relationship to an item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionState {
  pub liked: bool,
  pub bookmarked: bool,
}

impl InteractionState {
  pub fn apply(&mut self, patch: &InteractionPatch) {
    if let Some(liked) = patch.liked {
      self.liked = liked;
    }
    if let Some(bookmarked) = patch.bookmarked {
      self.bookmarked = bookmarked;
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionPatch {
  pub liked: Option<bool>,
  pub bookmarked: Option<bool>,
}

/// Item id -> interaction state for the current user
pub type InteractionMap = HashMap<String, InteractionState>;

/// Position where the next page fetch resumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cursor {
  Offset(u64),
  Token(String),
}

impl Default for Cursor {
  fn default() -> Self {
    Cursor::Offset(0)
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  #[default]
  Recent,
  Popular,
}

impl SortOrder {
  pub fn toggled(self) -> Self {
    match self {
      SortOrder::Recent => SortOrder::Popular,
      SortOrder::Popular => SortOrder::Recent,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      SortOrder::Recent => "recent",
      SortOrder::Popular => "popular",
    }
  }
}

/// Query parameters for one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFilter {
  pub category: Option<String>,
  pub sort: SortOrder,
  pub page_size: u32,
  pub cursor: Cursor,
}

/// One batch of items from a single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
  pub items: Vec<ContentItem>,
  pub has_more: bool,
  pub next_cursor: Cursor,
}

/// A user-initiated write against the content service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
  Like { item_id: String },
  Unlike { item_id: String },
  Bookmark { item_id: String },
  Unbookmark { item_id: String },
  Comment { item_id: String, body: String },
}

impl ActionPayload {
  pub fn item_id(&self) -> &str {
    match self {
      ActionPayload::Like { item_id }
      | ActionPayload::Unlike { item_id }
      | ActionPayload::Bookmark { item_id }
      | ActionPayload::Unbookmark { item_id }
      | ActionPayload::Comment { item_id, .. } => item_id,
    }
  }

  /// The interaction change this action produces once it lands
  pub fn interaction_patch(&self) -> InteractionPatch {
    match self {
      ActionPayload::Like { .. } => InteractionPatch {
        liked: Some(true),
        ..Default::default()
      },
      ActionPayload::Unlike { .. } => InteractionPatch {
        liked: Some(false),
        ..Default::default()
      },
      ActionPayload::Bookmark { .. } => InteractionPatch {
        bookmarked: Some(true),
        ..Default::default()
      },
      ActionPayload::Unbookmark { .. } => InteractionPatch {
        bookmarked: Some(false),
        ..Default::default()
      },
      ActionPayload::Comment { .. } => InteractionPatch::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(id: &str) -> ContentItem {
    ContentItem {
      id: id.to_string(),
      author: AuthorRef {
        id: "author-1".to_string(),
        display_name: Some("Wanjiku Mwangi".to_string()),
      },
      body: format!("post {}", id),
      category: None,
      created_at: Utc::now(),
      like_count: 0,
      comment_count: 0,
    }
  }

  #[test]
  fn test_item_patch_only_touches_given_fields() {
    let mut post = item("a");
    let changed = post.apply(&ItemPatch {
      like_count: Some(4),
      ..Default::default()
    });
    assert!(changed);
    assert_eq!(post.like_count, 4);
    assert_eq!(post.body, "post a");
  }

  #[test]
  fn test_empty_patch_reports_no_change() {
    let mut post = item("a");
    assert!(!post.apply(&ItemPatch::default()));
  }

  #[test]
  fn test_interaction_patch_merges() {
    let mut state = InteractionState {
      liked: true,
      bookmarked: false,
    };
    state.apply(&InteractionPatch {
      bookmarked: Some(true),
      ..Default::default()
    });
    assert!(state.liked);
    assert!(state.bookmarked);
  }

  #[test]
  fn test_action_payload_serializes_tagged() {
    let action = ActionPayload::Comment {
      item_id: "p1".to_string(),
      body: "Great site photos".to_string(),
    };
    let json = serde_json::to_value(&action).unwrap();
    assert_eq!(json["kind"], "comment");
    assert_eq!(json["item_id"], "p1");
  }

  #[test]
  fn test_sort_order_toggles() {
    assert_eq!(SortOrder::Recent.toggled(), SortOrder::Popular);
    assert_eq!(SortOrder::Popular.toggled(), SortOrder::Recent);
  }
}
