use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Periodic tick for UI refresh and polling pending requests
  Tick,
  /// Backend reachability changed
  Connectivity(bool),
  /// A background request failed; shown in the status bar
  Error(String),
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm polling blocks, keep it off the async workers
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      if event::poll(tick_rate).unwrap_or(false) {
        if let Ok(CrosstermEvent::Key(key)) = event::read() {
          if key.kind == KeyEventKind::Press && input_tx.send(Event::Key(key)).is_err() {
            break;
          }
        }
      } else if input_tx.send(Event::Tick).is_err() {
        break;
      }
    });

    Self { tx, rx }
  }

  /// Sender for async tasks that report back to the app
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Forward connectivity transitions into the event stream
  pub fn forward_connectivity(&self, mut rx: watch::Receiver<bool>) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      while rx.changed().await.is_ok() {
        let online = *rx.borrow_and_update();
        if tx.send(Event::Connectivity(online)).is_err() {
          break;
        }
      }
    });
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
