use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::api_types::{
  merge_interactions, ApiPost, ApiPostRef, NewComment, NewPostRef, POST_SELECT,
};
use super::service::ContentService;
use super::types::{ActionPayload, ContentItem, Cursor, InteractionMap, Page, PageFilter, SortOrder};
use crate::config::Config;
use crate::error::ServiceError;

/// Content service backed by the hosted backend's REST API
#[derive(Clone)]
pub struct RestContentService {
  http: reqwest::Client,
  /// `<project url>/rest/v1/`
  base: Url,
  api_key: String,
}

impl RestContentService {
  pub fn new(config: &Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;

    let mut project = config.backend.url.clone();
    if !project.ends_with('/') {
      project.push('/');
    }
    let base = Url::parse(&project)
      .and_then(|u| u.join("rest/v1/"))
      .map_err(|e| eyre!("Invalid backend url {}: {}", config.backend.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.backend.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      api_key,
    })
  }

  fn table_url(&self, table: &str) -> Result<Url, ServiceError> {
    self
      .base
      .join(table)
      .map_err(|e| ServiceError::new(format!("Invalid table url {}: {}", table, e)))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    self
      .http
      .request(method, url)
      .header("apikey", &self.api_key)
      .bearer_auth(&self.api_key)
  }

  /// Whether the backend answers at all. Any HTTP status counts as reachable.
  pub async fn is_reachable(&self) -> bool {
    self
      .request(Method::GET, self.base.clone())
      .send()
      .await
      .is_ok()
  }

  /// `posts` query for one page: embedded author, ordering, offset window
  /// and optional category filter.
  fn page_url(&self, filter: &PageFilter) -> Result<Url, ServiceError> {
    let offset = cursor_offset(&filter.cursor)?;
    let order = match filter.sort {
      SortOrder::Recent => "created_at.desc",
      SortOrder::Popular => "likes_count.desc.nullslast,created_at.desc",
    };

    let mut url = self.table_url("posts")?;
    {
      let mut query = url.query_pairs_mut();
      query
        .append_pair("select", POST_SELECT)
        .append_pair("order", order)
        .append_pair("offset", &offset.to_string())
        .append_pair("limit", &filter.page_size.to_string());
      if let Some(category) = &filter.category {
        query.append_pair("category", &format!("eq.{}", category));
      }
    }
    Ok(url)
  }

  /// Like and bookmark lookups for `item_ids`, in that order.
  fn interaction_urls(
    &self,
    item_ids: &[String],
    user_id: &str,
  ) -> Result<(Url, Url), ServiceError> {
    let id_list = format!(
      "in.({})",
      item_ids
        .iter()
        .map(|id| format!("\"{}\"", id))
        .collect::<Vec<_>>()
        .join(",")
    );

    let mut likes_url = self.table_url("post_likes")?;
    let mut bookmarks_url = self.table_url("bookmarks")?;
    for url in [&mut likes_url, &mut bookmarks_url] {
      url
        .query_pairs_mut()
        .append_pair("select", "post_id")
        .append_pair("user_id", &format!("eq.{}", user_id))
        .append_pair("post_id", &id_list);
    }
    Ok((likes_url, bookmarks_url))
  }

  async fn get_page(self, filter: PageFilter) -> Result<Page, ServiceError> {
    let offset = cursor_offset(&filter.cursor)?;
    let url = self.page_url(&filter)?;
    let rows: Vec<ApiPost> = send_json(self.request(Method::GET, url)).await?;
    Ok(page_from_rows(offset, filter.page_size, rows))
  }

  async fn get_interactions(
    self,
    item_ids: Vec<String>,
    user_id: String,
  ) -> Result<InteractionMap, ServiceError> {
    if item_ids.is_empty() {
      return Ok(InteractionMap::new());
    }
    let (likes_url, bookmarks_url) = self.interaction_urls(&item_ids, &user_id)?;

    let (likes, bookmarks) = tokio::join!(
      send_json::<Vec<ApiPostRef>>(self.request(Method::GET, likes_url)),
      send_json::<Vec<ApiPostRef>>(self.request(Method::GET, bookmarks_url)),
    );

    Ok(merge_interactions(&item_ids, likes?, bookmarks?))
  }

  async fn post_action(self, user_id: String, action: ActionPayload) -> Result<(), ServiceError> {
    match &action {
      ActionPayload::Like { item_id } => self.insert_ref("post_likes", item_id, &user_id).await,
      ActionPayload::Unlike { item_id } => self.delete_ref("post_likes", item_id, &user_id).await,
      ActionPayload::Bookmark { item_id } => self.insert_ref("bookmarks", item_id, &user_id).await,
      ActionPayload::Unbookmark { item_id } => {
        self.delete_ref("bookmarks", item_id, &user_id).await
      }
      ActionPayload::Comment { item_id, body } => {
        let url = self.table_url("comments")?;
        let row = NewComment {
          post_id: item_id,
          user_id: &user_id,
          content: body,
        };
        send_empty(
          self
            .request(Method::POST, url)
            .header("Prefer", "return=minimal")
            .json(&row),
        )
        .await
      }
    }
  }

  async fn insert_ref(&self, table: &str, item_id: &str, user_id: &str) -> Result<(), ServiceError> {
    let url = self.table_url(table)?;
    let row = NewPostRef {
      post_id: item_id,
      user_id,
    };
    send_empty(
      self
        .request(Method::POST, url)
        .header("Prefer", "return=minimal")
        .json(&row),
    )
    .await
  }

  async fn delete_ref(&self, table: &str, item_id: &str, user_id: &str) -> Result<(), ServiceError> {
    let mut url = self.table_url(table)?;
    url
      .query_pairs_mut()
      .append_pair("post_id", &format!("eq.{}", item_id))
      .append_pair("user_id", &format!("eq.{}", user_id));
    send_empty(self.request(Method::DELETE, url)).await
  }
}

impl ContentService for RestContentService {
  fn fetch_page(&self, filter: PageFilter) -> BoxFuture<'static, Result<Page, ServiceError>> {
    self.clone().get_page(filter).boxed()
  }

  fn fetch_interactions(
    &self,
    item_ids: Vec<String>,
    user_id: String,
  ) -> BoxFuture<'static, Result<InteractionMap, ServiceError>> {
    self.clone().get_interactions(item_ids, user_id).boxed()
  }

  fn submit_action(
    &self,
    user_id: String,
    action: ActionPayload,
  ) -> BoxFuture<'static, Result<(), ServiceError>> {
    self.clone().post_action(user_id, action).boxed()
  }
}

fn cursor_offset(cursor: &Cursor) -> Result<u64, ServiceError> {
  match cursor {
    Cursor::Offset(offset) => Ok(*offset),
    Cursor::Token(token) => token
      .parse::<u64>()
      .map_err(|_| ServiceError::new(format!("Unsupported cursor token '{}'", token))),
  }
}

/// A full page means there may be more; a short one ends the feed.
fn page_from_rows(offset: u64, page_size: u32, rows: Vec<ApiPost>) -> Page {
  let items: Vec<ContentItem> = rows.into_iter().map(ContentItem::from).collect();
  Page {
    has_more: items.len() as u64 == u64::from(page_size),
    next_cursor: Cursor::Offset(offset + items.len() as u64),
    items,
  }
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ServiceError> {
  let response = request.send().await.map_err(transport_error)?;
  let response = check_status(response).await?;
  response
    .json::<T>()
    .await
    .map_err(|e| ServiceError::new(format!("Failed to parse response: {}", e)))
}

async fn send_empty(request: RequestBuilder) -> Result<(), ServiceError> {
  let response = request.send().await.map_err(transport_error)?;
  check_status(response).await.map(|_| ())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().await.unwrap_or_default();
  Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> ServiceError {
  let message = if body.is_empty() {
    format!("Request failed with status {}", status)
  } else {
    format!("Request failed with status {}: {}", status, body)
  };
  ServiceError::new(message).with_code(status.as_u16().to_string())
}

fn transport_error(e: reqwest::Error) -> ServiceError {
  ServiceError::new(format!("Network error: {}", e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn service() -> RestContentService {
    RestContentService {
      http: reqwest::Client::new(),
      base: Url::parse("https://jengapro.example.co/rest/v1/").unwrap(),
      api_key: "anon-key".to_string(),
    }
  }

  fn query(url: &Url) -> HashMap<String, String> {
    url.query_pairs().into_owned().collect()
  }

  fn filter(category: Option<&str>, sort: SortOrder, cursor: Cursor) -> PageFilter {
    PageFilter {
      category: category.map(str::to_string),
      sort,
      page_size: 10,
      cursor,
    }
  }

  fn row(id: &str) -> ApiPost {
    serde_json::from_value(serde_json::json!({
      "id": id,
      "author_id": "u1",
      "content": "Slab poured on level 3",
      "category": "projects",
      "created_at": "2024-03-01T08:00:00Z",
      "likes_count": 2,
      "comments_count": null,
      "author": null
    }))
    .unwrap()
  }

  #[test]
  fn test_page_url_recent_first_page() {
    let url = service()
      .page_url(&filter(None, SortOrder::Recent, Cursor::Offset(0)))
      .unwrap();
    let params = query(&url);

    assert_eq!(url.path(), "/rest/v1/posts");
    assert_eq!(params["select"], POST_SELECT);
    assert_eq!(params["order"], "created_at.desc");
    assert_eq!(params["offset"], "0");
    assert_eq!(params["limit"], "10");
    assert!(!params.contains_key("category"));
  }

  #[test]
  fn test_page_url_popular_with_category() {
    let url = service()
      .page_url(&filter(Some("tenders"), SortOrder::Popular, Cursor::Offset(20)))
      .unwrap();
    let params = query(&url);

    assert_eq!(params["order"], "likes_count.desc.nullslast,created_at.desc");
    assert_eq!(params["category"], "eq.tenders");
    assert_eq!(params["offset"], "20");
  }

  #[test]
  fn test_page_url_numeric_token_cursor() {
    let url = service()
      .page_url(&filter(None, SortOrder::Recent, Cursor::Token("30".to_string())))
      .unwrap();
    assert_eq!(query(&url)["offset"], "30");

    let err = service()
      .page_url(&filter(None, SortOrder::Recent, Cursor::Token("abc".to_string())))
      .unwrap_err();
    assert!(err.message.contains("abc"));
  }

  #[test]
  fn test_full_page_has_more() {
    let rows = (0..10).map(|i| row(&format!("p{}", i))).collect();
    let page = page_from_rows(20, 10, rows);

    assert!(page.has_more);
    assert_eq!(page.next_cursor, Cursor::Offset(30));
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.items[0].like_count, 2);
    assert_eq!(page.items[0].comment_count, 0);
  }

  #[test]
  fn test_short_page_ends_feed() {
    let page = page_from_rows(10, 10, vec![row("a"), row("b"), row("c")]);

    assert!(!page.has_more);
    assert_eq!(page.next_cursor, Cursor::Offset(13));

    let empty = page_from_rows(13, 10, Vec::new());
    assert!(!empty.has_more);
    assert_eq!(empty.next_cursor, Cursor::Offset(13));
  }

  #[test]
  fn test_interaction_urls_filter_by_user_and_ids() {
    let ids = vec!["p1".to_string(), "p2".to_string()];
    let (likes, bookmarks) = service().interaction_urls(&ids, "user-7").unwrap();

    assert_eq!(likes.path(), "/rest/v1/post_likes");
    assert_eq!(bookmarks.path(), "/rest/v1/bookmarks");
    for url in [&likes, &bookmarks] {
      let params = query(url);
      assert_eq!(params["select"], "post_id");
      assert_eq!(params["user_id"], "eq.user-7");
      assert_eq!(params["post_id"], "in.(\"p1\",\"p2\")");
    }
  }

  #[test]
  fn test_status_error_carries_code() {
    let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "");
    assert_eq!(err.code.as_deref(), Some("503"));
    assert_eq!(err.message, "Request failed with status 503 Service Unavailable");

    let err = status_error(StatusCode::UNAUTHORIZED, "JWT expired");
    assert_eq!(err.code.as_deref(), Some("401"));
    assert!(err.message.ends_with(": JWT expired"));
  }
}
