//! Readiness signalling: a background process's drain task resolves a
//! one-shot signal on the first line matching a marker, and the caller waits
//! on it with a deadline.

use super::LineCallback;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// How a marker line is recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyMarker {
    Contains(String),
    ContainsIgnoreCase(String),
    StartsWith(String),
}

impl ReadyMarker {
    pub fn contains<S: Into<String>>(s: S) -> Self {
        Self::Contains(s.into())
    }

    pub fn contains_ignore_case<S: Into<String>>(s: S) -> Self {
        Self::ContainsIgnoreCase(s.into().to_lowercase())
    }

    pub fn starts_with<S: Into<String>>(s: S) -> Self {
        Self::StartsWith(s.into())
    }

    pub fn matches(&self, line: &str) -> bool {
        match self {
            Self::Contains(needle) => line.contains(needle.as_str()),
            Self::ContainsIgnoreCase(needle) => line.to_lowercase().contains(needle.as_str()),
            Self::StartsWith(prefix) => line.starts_with(prefix.as_str()),
        }
    }
}

/// What happens when the marker does not show up in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessPolicy {
    /// Raise a setup timeout
    Required,
    /// Log a warning and carry on
    BestEffort,
}

/// Result of waiting on a [`ReadySignal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
    /// The process closed its output without ever printing the marker
    Closed,
}

/// Sending half, resolved at most once
#[derive(Clone)]
pub struct ReadySignal {
    marker: ReadyMarker,
    sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Receiving half, consumed by [`ReadyWaiter::wait`]
pub struct ReadyWaiter {
    receiver: oneshot::Receiver<()>,
}

/// Create a linked signal/waiter pair for `marker`
pub fn ready_signal(marker: ReadyMarker) -> (ReadySignal, ReadyWaiter) {
    let (sender, receiver) = oneshot::channel();
    (
        ReadySignal {
            marker,
            sender: Arc::new(Mutex::new(Some(sender))),
        },
        ReadyWaiter { receiver },
    )
}

impl ReadySignal {
    /// Check one line; fires the signal on the first match
    pub fn observe(&self, line: &str) {
        if !self.marker.matches(line) {
            return;
        }
        if let Ok(mut sender) = self.sender.lock() {
            if let Some(sender) = sender.take() {
                let _ = sender.send(());
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.sender.lock().map(|s| s.is_none()).unwrap_or(true)
    }

    /// Wrap `inner` so every line is observed before being passed on
    pub fn wrap(self, inner: Option<LineCallback>) -> LineCallback {
        Arc::new(move |line: &str| {
            self.observe(line);
            if let Some(inner) = &inner {
                inner(line);
            }
        })
    }
}

impl ReadyWaiter {
    pub async fn wait(self, timeout: Duration) -> Readiness {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(())) => Readiness::Ready,
            Ok(Err(_)) => Readiness::Closed,
            Err(_) => Readiness::TimedOut,
        }
    }
}
