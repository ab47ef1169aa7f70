//! In-process event bus
//!
//! Built on `tokio::sync::broadcast`. Emitting never blocks and never
//! fails: with no subscribers the event is dropped, and a lagging
//! subscriber loses its oldest events.
//!
//! ```no_run
//! use libcrosspost::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::PostingStarted {
//!     submission_id: "abc123".to_string(),
//!     accounts: vec!["masto-main".to_string()],
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{PostResponse, PostState};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A posting run started for these accounts
    PostingStarted {
        submission_id: String,
        accounts: Vec<String>,
    },

    /// One account's pipeline moved to a new state
    PostingProgress {
        submission_id: String,
        account_id: String,
        state: PostState,
    },

    PostSucceeded {
        submission_id: String,
        account_id: String,
        source: Option<String>,
    },

    PostFailed {
        submission_id: String,
        account_id: String,
        message: String,
        chunk_number: Option<usize>,
    },

    PostCancelled {
        submission_id: String,
        account_id: String,
    },

    /// Every account finished; results are in request order
    PostingCompleted {
        submission_id: String,
        results: Vec<PostResponse>,
    },

    TemplateCreated {
        id: String,
    },

    TemplateUpdated {
        id: String,
    },

    TemplateRemoved {
        id: String,
    },
}
