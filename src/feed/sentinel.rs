/// One-shot visibility trigger attached to the last rendered item.
///
/// The view reports which elements became visible; the sentinel fires once
/// for the element it observes and then detaches itself.
#[derive(Debug, Default)]
pub struct Sentinel {
  target: Option<String>,
}

impl Sentinel {
  /// Observe `element`, replacing any earlier observation.
  pub fn observe(&mut self, element: impl Into<String>) {
    self.target = Some(element.into());
  }

  pub fn disconnect(&mut self) {
    self.target = None;
  }

  #[cfg(test)]
  pub fn target(&self) -> Option<&str> {
    self.target.as_deref()
  }

  /// Returns true the first time the observed element is reported visible.
  pub fn notify_visible(&mut self, element: &str) -> bool {
    if self.target.as_deref() == Some(element) {
      self.target = None;
      true
    } else {
      false
    }
  }
}
