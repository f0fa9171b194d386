use chrono::{DateTime, Utc};

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Collapse newlines and runs of whitespace into single spaces
pub fn single_line(s: &str) -> String {
  s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Short relative age of a timestamp ("now", "5m", "3h", "2d")
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let elapsed = now - then;
  if elapsed.num_minutes() < 1 {
    "now".to_string()
  } else if elapsed.num_hours() < 1 {
    format!("{}m", elapsed.num_minutes())
  } else if elapsed.num_days() < 1 {
    format!("{}h", elapsed.num_hours())
  } else {
    format!("{}d", elapsed.num_days())
  }
}
