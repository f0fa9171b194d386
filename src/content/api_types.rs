//! Serde-deserializable rows matching the backend's REST responses.
//!
//! These are kept apart from the domain types so the column names of the
//! hosted tables don't leak into the rest of the crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{AuthorRef, ContentItem, InteractionMap};

/// Columns requested for a feed page, with the author profile embedded
pub const POST_SELECT: &str =
  "id,author_id,content,category,created_at,likes_count,comments_count,author:profiles(id,full_name)";

#[derive(Debug, Deserialize)]
pub struct ApiProfile {
  pub id: String,
  pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPost {
  pub id: String,
  pub author_id: String,
  #[serde(default)]
  pub content: String,
  pub category: Option<String>,
  pub created_at: DateTime<Utc>,
  // Counters are nullable columns
  pub likes_count: Option<u32>,
  pub comments_count: Option<u32>,
  pub author: Option<ApiProfile>,
}

/// A row of `post_likes` or `bookmarks`, reduced to the post it points at
#[derive(Debug, Deserialize)]
pub struct ApiPostRef {
  pub post_id: String,
}

#[derive(Debug, Serialize)]
pub struct NewPostRef<'a> {
  pub post_id: &'a str,
  pub user_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct NewComment<'a> {
  pub post_id: &'a str,
  pub user_id: &'a str,
  pub content: &'a str,
}

impl From<ApiPost> for ContentItem {
  fn from(post: ApiPost) -> Self {
    let author = match post.author {
      Some(profile) => AuthorRef {
        id: profile.id,
        display_name: profile.full_name,
      },
      None => AuthorRef {
        id: post.author_id,
        display_name: None,
      },
    };
    ContentItem {
      id: post.id,
      author,
      body: post.content,
      category: post.category,
      created_at: post.created_at,
      like_count: post.likes_count.unwrap_or_default(),
      comment_count: post.comments_count.unwrap_or_default(),
    }
  }
}

/// Combine like and bookmark rows into one interaction map.
///
/// Every requested id gets an entry so a lookup also records "not liked".
pub fn merge_interactions(
  item_ids: &[String],
  likes: Vec<ApiPostRef>,
  bookmarks: Vec<ApiPostRef>,
) -> InteractionMap {
  let mut map: InteractionMap = item_ids
    .iter()
    .map(|id| (id.clone(), Default::default()))
    .collect();
  for like in likes {
    map.entry(like.post_id).or_default().liked = true;
  }
  for bookmark in bookmarks {
    map.entry(bookmark.post_id).or_default().bookmarked = true;
  }
  map
}
