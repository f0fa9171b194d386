//! Content domain types and the remote content service.

pub mod api_types;
pub mod client;
#[cfg(test)]
pub mod fake;
pub mod service;
pub mod types;

pub use client::RestContentService;
pub use service::ContentService;
pub use types::{
  ActionPayload, ContentItem, Cursor, InteractionMap, InteractionPatch, InteractionState,
  ItemPatch, Page, PageFilter, SortOrder,
};
