mod feed;
mod header;
pub mod utils;

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Feed
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  header::draw_header(frame, chunks[0], &app.header());
  feed::draw_feed(frame, chunks[1], app);
  draw_status_bar(frame, chunks[2], app);
}

fn draw_status_bar(frame: &mut Frame, area: Rect, app: &App) {
  let (content, style) = match app.status_message() {
    Some(msg) => (format!(" {}", msg), Style::default().fg(Color::Yellow)),
    None => {
      let hint = " j/k:nav  l:like  b:bookmark  s:sort  r:refresh  S:sync  X:clear offline  q:quit";
      (hint.to_string(), Style::default().fg(Color::DarkGray))
    }
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);
}
