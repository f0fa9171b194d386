use super::utils::{single_line, time_ago, truncate};
use crate::app::{App, FeedSource, Row};
use crate::feed::FeedStatus;
use chrono::Utc;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

pub fn draw_feed(frame: &mut Frame, area: Rect, app: &App) {
  let (source, rows) = app.rows();
  let status = app.feed_status();

  let title = match (source, status) {
    (FeedSource::Cached, _) => format!(" Posts (cached, {}) ", rows.len()),
    (_, FeedStatus::Loading) if rows.is_empty() => " Posts (loading...) ".to_string(),
    _ if app.is_loading_more() => format!(" Posts ({}, loading more...) ", rows.len()),
    _ if app.has_more() => format!(" Posts ({}+) ", rows.len()),
    _ => format!(" Posts ({}) ", rows.len()),
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if rows.is_empty() {
    let content = match status {
      FeedStatus::Loading => "Loading posts...".to_string(),
      FeedStatus::Failed => format!(
        "Could not load posts: {}. Press r to retry.",
        app.feed_error().unwrap_or_default()
      ),
      FeedStatus::Idle => "Offline and nothing cached yet.".to_string(),
      FeedStatus::Empty | FeedStatus::Ready => "No posts yet.".to_string(),
    };
    let paragraph = Paragraph::new(content)
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let width = area.width.saturating_sub(40) as usize;
  let items: Vec<ListItem> = rows.iter().map(|row| draw_row(row, width)).collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  let mut state = ListState::default();
  state.select(Some(app.selected()));

  frame.render_stateful_widget(list, area, &mut state);
}

fn draw_row<'a>(row: &Row<'_>, body_width: usize) -> ListItem<'a> {
  let item = row.item;
  let age = time_ago(row.cached_at.unwrap_or(item.created_at), Utc::now());

  let author = item.author.display_name.as_deref().unwrap_or("Unknown");
  let like = if row.interaction.liked { "♥" } else { "♡" };
  let mark = if row.interaction.bookmarked { "★" } else { " " };

  let line = Line::from(vec![
    Span::styled(
      format!("{:<16}", truncate(author, 16)),
      Style::default().fg(Color::Cyan),
    ),
    Span::raw(" "),
    Span::styled(format!("{:>4}", age), Style::default().fg(Color::DarkGray)),
    Span::raw(" "),
    Span::styled(
      format!("{} {:<4}", like, item.like_count),
      Style::default().fg(if row.interaction.liked {
        Color::Red
      } else {
        Color::White
      }),
    ),
    Span::styled(
      format!("💬{:<4}", item.comment_count),
      Style::default().fg(Color::White),
    ),
    Span::styled(mark.to_string(), Style::default().fg(Color::Yellow)),
    Span::raw(" "),
    Span::raw(truncate(&single_line(&item.body), body_width.max(10))),
  ]);
  ListItem::new(line)
}
