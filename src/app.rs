use crate::config::Config;
use crate::content::{
  ActionPayload, ContentItem, ContentService, InteractionState, ItemPatch, RestContentService,
  SortOrder,
};
use crate::event::{Event, EventHandler};
use crate::feed::{FeedController, FeedQuery, FeedStatus};
use crate::offline::{
  store_namespace, Connectivity, ConnectivityProbe, KeyValueStore, MemoryStore, OfflineSettings,
  OfflineSync, QueueOutcome, ReplayReport, SqliteStore,
};
use crate::ui;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Where the rendered rows come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
  Live,
  Cached,
}

/// One rendered feed entry
pub struct Row<'a> {
  pub item: &'a ContentItem,
  pub interaction: InteractionState,
  /// Set when the row comes from the offline cache
  pub cached_at: Option<DateTime<Utc>>,
}

/// Summary shown in the header line
pub struct HeaderInfo<'a> {
  pub sort: SortOrder,
  pub category: Option<&'a str>,
  pub online: bool,
  pub pending_actions: usize,
  pub replaying: bool,
}

/// Main application state
pub struct App {
  config: Config,
  service: Arc<RestContentService>,
  feed: FeedController<RestContentService>,
  offline: OfflineSync<dyn KeyValueStore, RestContentService>,
  connectivity: Connectivity,

  /// Selected row index
  selected: usize,

  /// Last notable event, shown in the status bar
  status_message: Option<String>,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let service = Arc::new(RestContentService::new(&config)?);

    let store: Arc<dyn KeyValueStore> = if config.offline.persist {
      let path = Config::data_dir()?.join("offline.db");
      Arc::new(SqliteStore::open(&path).map_err(|e| eyre!("Failed to open offline store: {}", e))?)
    } else {
      Arc::new(MemoryStore::new())
    };
    let namespace = store_namespace(&config.backend.url, config.user_id.as_deref());
    let offline = OfflineSync::new(
      store,
      service.clone(),
      OfflineSettings::from(&config.offline),
      &namespace,
    );

    let mut feed = FeedController::new(
      service.clone(),
      FeedQuery {
        category: config.feed.category.clone(),
        sort: config.feed.sort,
        page_size: config.feed.page_size,
      },
    );
    feed.set_user(config.user_id.clone());

    let (tx, _rx) = mpsc::unbounded_channel();

    Ok(Self {
      config,
      service,
      feed,
      offline,
      connectivity: Connectivity::new(true),
      selected: 0,
      status_message: None,
      event_tx: tx,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();

    let tx = events.sender();
    self.feed.on_error(move |err| {
      let _ = tx.send(Event::Error(format!("Could not load feed: {} (r to retry)", err)));
    });

    // Evaluated once here; afterwards the probe publishes transitions
    let online = self.service.is_reachable().await;
    self.connectivity.set(online);
    events.forward_connectivity(self.connectivity.subscribe());
    let service = self.service.clone();
    let probe = ConnectivityProbe::new(
      Duration::from_secs(self.config.offline.probe_interval_secs),
      move || {
        let service = service.clone();
        async move { service.is_reachable().await }
      },
    );
    let probe_handle = probe.spawn(self.connectivity.clone());

    info!(online, "starting feed");
    self.offline.init(online);
    if online {
      self.feed.reset();
    } else {
      self.status_message = Some("Offline: showing cached posts".to_string());
    }

    // Main loop
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      if let Some(event) = events.next().await {
        self.handle_event(event);
      }
    }

    probe_handle.abort();

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(),
      Event::Connectivity(online) => self.handle_connectivity(online),
      Event::Error(msg) => {
        error!("{}", msg);
        self.status_message = Some(msg);
      }
    }
  }

  fn tick(&mut self) {
    if self.feed.poll() {
      let fresh = self.feed.take_new_items();
      self.offline.cache_pages(&fresh);
      self.clamp_selection();
    }
    if let Some(last) = self.feed.items().last().map(|item| item.id.clone()) {
      self.feed.attach_sentinel(last);
    }
    if let Some(report) = self.offline.poll() {
      self.status_message = Some(describe_report(&report));
    }
  }

  fn handle_connectivity(&mut self, online: bool) {
    let replaying = self.offline.record_connectivity(online);
    if online {
      self.status_message = Some(if replaying {
        "Back online, syncing queued actions".to_string()
      } else {
        "Back online".to_string()
      });
      if matches!(self.feed.status(), FeedStatus::Idle | FeedStatus::Failed) {
        self.feed.reset();
      }
    } else {
      self.offline.load_cache();
      self.status_message =
        Some("Offline: likes and bookmarks will be queued until reconnect".to_string());
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
      KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),

      // Feed
      KeyCode::Char('r') => {
        self.selected = 0;
        self.feed.reset();
      }
      KeyCode::Char('s') => {
        let query = self.feed.query().clone();
        self.selected = 0;
        self.feed.configure(query.category, query.sort.toggled(), query.page_size);
      }

      // Actions
      KeyCode::Char('l') => self.toggle_like(),
      KeyCode::Char('b') => self.toggle_bookmark(),
      KeyCode::Char('S') => {
        self.status_message = Some(if self.offline.replay_queue() {
          "Syncing queued actions...".to_string()
        } else {
          "Nothing to sync".to_string()
        });
      }
      KeyCode::Char('X') => {
        self.offline.teardown();
        self.status_message = Some("Offline cache and queue cleared".to_string());
      }

      _ => {}
    }
  }

  fn move_selection(&mut self, delta: i32) {
    let (source, rows) = self.rows();
    let len = rows.len();
    if len == 0 {
      return;
    }
    let last_id = rows[len - 1].item.id.clone();
    self.selected = (self.selected as i32 + delta).clamp(0, len as i32 - 1) as usize;

    // Reaching the last row makes it visible in the viewport
    if source == FeedSource::Live && self.selected == len - 1 {
      self.feed.notify_visible(&last_id);
    }
  }

  fn clamp_selection(&mut self) {
    let len = self.rows().1.len();
    self.selected = self.selected.min(len.saturating_sub(1));
  }

  fn selected_item(&self) -> Option<(String, InteractionState, u32)> {
    let (_, rows) = self.rows();
    rows
      .get(self.selected)
      .map(|row| (row.item.id.clone(), row.interaction, row.item.like_count))
  }

  fn toggle_like(&mut self) {
    let Some((item_id, interaction, likes)) = self.selected_item() else {
      return;
    };
    let (payload, like_count) = if interaction.liked {
      (
        ActionPayload::Unlike {
          item_id: item_id.clone(),
        },
        likes.saturating_sub(1),
      )
    } else {
      (
        ActionPayload::Like {
          item_id: item_id.clone(),
        },
        likes + 1,
      )
    };
    if self.route_action(payload) {
      let patch = ItemPatch {
        like_count: Some(like_count),
        ..Default::default()
      };
      // Cached rows are only in the offline cache
      if !self.feed.update_local_item(&item_id, &patch) {
        self.offline.update_cached_item(&item_id, &patch);
      }
    }
  }

  fn toggle_bookmark(&mut self) {
    let Some((item_id, interaction, _)) = self.selected_item() else {
      return;
    };
    let payload = if interaction.bookmarked {
      ActionPayload::Unbookmark { item_id }
    } else {
      ActionPayload::Bookmark { item_id }
    };
    self.route_action(payload);
  }

  /// Send or queue a write, then apply it optimistically.
  /// Returns false if the action went nowhere.
  fn route_action(&mut self, payload: ActionPayload) -> bool {
    let Some(user_id) = self.config.user_id.clone() else {
      self.status_message = Some("Set user_id in the config to like or bookmark posts".to_string());
      return false;
    };
    let item_id = payload.item_id().to_string();
    let patch = payload.interaction_patch();

    match self.offline.queue_action(&user_id, payload.clone()) {
      Ok(QueueOutcome::Queued(_)) => {
        self.status_message = Some("Offline: action queued".to_string());
      }
      Ok(QueueOutcome::PassThrough) => {
        let request = self.service.submit_action(user_id, payload);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
          if let Err(err) = request.await {
            let _ = tx.send(Event::Error(format!("Action failed: {}", err)));
          }
        });
      }
      Err(e) => {
        self.status_message = Some(format!("Could not queue action: {}", e));
        return false;
      }
    }

    self.feed.update_local_interaction(&item_id, patch);
    true
  }

  // Accessors for UI rendering

  /// Live feed rows, or cached rows when the feed has nothing to show.
  pub fn rows(&self) -> (FeedSource, Vec<Row<'_>>) {
    let show_cached = self.feed.items().is_empty()
      && matches!(self.feed.status(), FeedStatus::Idle | FeedStatus::Failed)
      && !self.offline.cached_items().is_empty();

    if show_cached {
      let rows = self
        .offline
        .cached_items()
        .iter()
        .map(|entry| Row {
          item: &entry.item,
          interaction: self.feed.interaction(&entry.item.id).unwrap_or_default(),
          cached_at: Some(entry.cached_at),
        })
        .collect();
      (FeedSource::Cached, rows)
    } else {
      let rows = self
        .feed
        .items()
        .iter()
        .map(|item| Row {
          item,
          interaction: self.feed.interaction(&item.id).unwrap_or_default(),
          cached_at: None,
        })
        .collect();
      (FeedSource::Live, rows)
    }
  }

  pub fn selected(&self) -> usize {
    self.selected
  }

  pub fn feed_status(&self) -> FeedStatus {
    self.feed.status()
  }

  pub fn feed_error(&self) -> Option<String> {
    self.feed.error().map(|e| e.to_string())
  }

  pub fn is_loading_more(&self) -> bool {
    self.feed.is_loading() && !self.feed.items().is_empty()
  }

  pub fn has_more(&self) -> bool {
    self.feed.has_more()
  }

  pub fn header(&self) -> HeaderInfo<'_> {
    let query = self.feed.query();
    HeaderInfo {
      sort: query.sort,
      category: query.category.as_deref(),
      online: self.offline.is_online(),
      pending_actions: self.offline.pending_count(),
      replaying: self.offline.is_replaying(),
    }
  }

  pub fn status_message(&self) -> Option<&str> {
    self.status_message.as_deref()
  }
}

/// One-line summary of a finished replay pass
fn describe_report(report: &ReplayReport) -> String {
  let mut parts = vec![format!("Synced {} queued action(s)", report.completed.len())];
  if !report.retained.is_empty() {
    parts.push(format!("{} will retry", report.retained.len()));
  }
  if !report.abandoned.is_empty() {
    parts.push(format!("{} dropped", report.abandoned.len()));
  }
  parts.join(", ")
}
