use crate::app::HeaderInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with feed query and connectivity
pub fn draw_header(frame: &mut Frame, area: Rect, info: &HeaderInfo) {
  let (link, link_color) = if info.online {
    ("online", Color::Green)
  } else {
    ("offline", Color::Red)
  };

  let mut spans = vec![
    Span::styled(" sitefeed ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", info.sort.label()),
      Style::default().fg(Color::Yellow).bold(),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", info.category.unwrap_or("all categories")),
      Style::default().fg(Color::White),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", link), Style::default().fg(link_color)),
  ];

  if let Some(queue) = queue_label(info.pending_actions, info.replaying) {
    spans.push(Span::styled("│", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(
      format!(" {} ", queue),
      Style::default().fg(Color::Magenta),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Label for pending offline writes, if there is anything to say
fn queue_label(pending: usize, replaying: bool) -> Option<String> {
  match (pending, replaying) {
    (_, true) => Some(format!("syncing {} queued", pending)),
    (0, false) => None,
    (n, false) => Some(format!("{} queued", n)),
  }
}
