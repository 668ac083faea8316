use tokio::sync::mpsc;

use crate::error::Result;
use crate::fs::watcher::{WatchKind, WatchMessage};

/// Session events, processed one at a time.
#[derive(Debug)]
pub enum Event {
    /// Re-enumerate the backend.
    Refresh,
    /// Select a file by path.
    Select(String),
    /// Expand or collapse a directory.
    Toggle(String),
    /// New search query for the open document.
    Search(String),
    /// Focus the next match, wrapping around.
    SearchNext,
    /// Focus the previous match, wrapping around.
    SearchPrevious,
    /// A message from an open watch channel.
    Watch {
        kind: WatchKind,
        session: u64,
        message: WatchMessage,
    },
    /// A watch channel ended on its own.
    WatchClosed {
        kind: WatchKind,
        session: u64,
        error: Option<String>,
    },
    Quit,
}

/// Queue feeding the session loop. Watch tasks and user actions both send
/// through clones of the same sender.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    tx: mpsc::UnboundedSender<Event>,
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { rx, tx }
    }

    /// Get a sender clone for watch tasks and input sources.
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    /// Receive the next event (waits until one is available).
    pub async fn next(&mut self) -> Result<Event> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| crate::error::AppError::Channel("Event channel closed".into()))
    }

    /// Next event if one is already queued.
    pub fn try_next(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let mut events = EventHandler::new();
        let tx = events.sender();
        tx.send(Event::Refresh).unwrap();
        tx.send(Event::Toggle("b".into())).unwrap();

        assert!(matches!(events.next().await.unwrap(), Event::Refresh));
        assert!(matches!(events.next().await.unwrap(), Event::Toggle(p) if p == "b"));
        assert!(events.try_next().is_none());
    }
}
