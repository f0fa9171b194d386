//! Infinite-scroll pagination over the content service.

mod controller;
mod sentinel;

pub use controller::{FeedController, FeedQuery, FeedStatus};
