//! Online/offline state.
//!
//! A terminal has no browser-style online events, so a probe checks the
//! backend on an interval and publishes transitions. Everything else
//! observes passively through a watch channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Clone)]
pub struct Connectivity {
  tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
  pub fn new(initially_online: bool) -> Self {
    let (tx, _rx) = watch::channel(initially_online);
    Self { tx: Arc::new(tx) }
  }

  #[cfg(test)]
  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Receiver notified on every online/offline transition.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }

  /// Publish the current state. Returns true if it was a transition.
  pub fn set(&self, online: bool) -> bool {
    self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    })
  }
}

/// Periodic reachability check feeding a [`Connectivity`].
pub struct ConnectivityProbe<F> {
  check: F,
  interval: Duration,
}

impl<F, Fut> ConnectivityProbe<F>
where
  F: Fn() -> Fut + Send + 'static,
  Fut: Future<Output = bool> + Send + 'static,
{
  pub fn new(interval: Duration, check: F) -> Self {
    Self { check, interval }
  }

  pub fn spawn(self, connectivity: Connectivity) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.interval);
      loop {
        ticker.tick().await;
        let online = (self.check)().await;
        if connectivity.set(online) {
          info!(online, "backend reachability changed");
        }
      }
    })
  }
}
