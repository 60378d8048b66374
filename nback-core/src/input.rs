use crate::level::Level;
use std::time::Duration;

/// The discrete input classes the trial loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Level chosen on the selection screen.
    Select(Level),
    /// The single action key: starts the test, then marks a response.
    Press,
    /// Ends the session from any polling point.
    Cancel,
}

/// Source of key-down signals, polled from the controlling thread only.
pub trait InputSource {
    /// Waits at most `timeout` for the next signal.
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Signal>>;

    /// Drops every queued signal without waiting. Returns true if a
    /// [`Signal::Cancel`] was among them.
    fn discard_pending(&mut self) -> anyhow::Result<bool>;
}
