//! Session-scoped event fan-out
//!
//! The hub is a single task that owns the subscriber registry. Handles talk
//! to it over an unbounded command channel, so publishing never waits on a
//! subscriber. Each subscriber gets a bounded buffer; one that falls a full
//! buffer behind is dropped instead of stalling everyone else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::combat::{ActionResult, CombatSession};

/// Default per-subscriber buffer
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Messages sent to combat observers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// Greeting sent first on every subscription
    Connect { message: String },
    CombatInitiated(CombatSession),
    CombatUpdated(CombatSession),
    ActionResult(ActionResult),
}

enum Command {
    Subscribe {
        session_id: String,
        subscriber_id: String,
        user_id: Option<String>,
        generation: u64,
        sender: mpsc::Sender<Event>,
    },
    Unsubscribe {
        subscriber_id: String,
        /// Only this registration; None removes whoever holds the id
        generation: Option<u64>,
    },
    Publish {
        session_id: String,
        event: Event,
    },
    SendToUser {
        user_id: String,
        event: Event,
    },
    SubscriberCount {
        session_id: String,
        reply: oneshot::Sender<usize>,
    },
}

struct Subscriber {
    session_id: String,
    user_id: Option<String>,
    generation: u64,
    sender: mpsc::Sender<Event>,
}

/// Handle to the broadcast hub task
#[derive(Clone)]
pub struct BroadcastHub {
    commands: mpsc::UnboundedSender<Command>,
    buffer: usize,
    generations: Arc<AtomicU64>,
}

impl BroadcastHub {
    /// Spawn the hub task. Must be called inside a tokio runtime.
    pub fn spawn(buffer: usize) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(HubState::default().run(rx));
        Self {
            commands,
            buffer: buffer.max(1),
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to one combat session's events
    pub fn subscribe(
        &self,
        session_id: &str,
        subscriber_id: &str,
        user_id: Option<&str>,
    ) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        self.send(Command::Subscribe {
            session_id: session_id.to_string(),
            subscriber_id: subscriber_id.to_string(),
            user_id: user_id.map(str::to_string),
            generation,
            sender,
        });
        Subscription {
            id: subscriber_id.to_string(),
            generation,
            receiver,
            hub: self.clone(),
        }
    }

    /// Drop a subscriber by id, whichever subscription currently holds it
    pub fn unsubscribe(&self, subscriber_id: &str) {
        self.send(Command::Unsubscribe {
            subscriber_id: subscriber_id.to_string(),
            generation: None,
        });
    }

    /// Queue an event for every subscriber of a session
    pub fn publish(&self, session_id: &str, event: Event) {
        self.send(Command::Publish {
            session_id: session_id.to_string(),
            event,
        });
    }

    /// Deliver to the user's most recent subscription, if any
    pub fn send_to_user(&self, user_id: &str, event: Event) {
        self.send(Command::SendToUser {
            user_id: user_id.to_string(),
            event,
        });
    }

    /// Number of live subscribers for a session
    pub async fn subscriber_count(&self, session_id: &str) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SubscriberCount {
            session_id: session_id.to_string(),
            reply,
        });
        rx.await.unwrap_or(0)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Broadcast hub is gone, dropping command");
        }
    }
}

/// A live subscription; unsubscribes when dropped
pub struct Subscription {
    id: String,
    generation: u64,
    receiver: mpsc::Receiver<Event>,
    hub: BroadcastHub,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next event, or None once the hub has disconnected us
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // A newer subscription may have reused the id
        self.hub.send(Command::Unsubscribe {
            subscriber_id: self.id.clone(),
            generation: Some(self.generation),
        });
    }
}

#[derive(Default)]
struct HubState {
    /// session id -> subscriber ids
    rooms: HashMap<String, Vec<String>>,
    subscribers: HashMap<String, Subscriber>,
    /// user id -> most recent subscriber id
    users: HashMap<String, String>,
}

impl HubState {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Subscribe {
                    session_id,
                    subscriber_id,
                    user_id,
                    generation,
                    sender,
                } => self.subscribe(session_id, subscriber_id, user_id, generation, sender),
                Command::Unsubscribe {
                    subscriber_id,
                    generation,
                } => {
                    let current = self.subscribers.get(&subscriber_id).map(|s| s.generation);
                    if generation.is_none() || generation == current {
                        self.remove(&subscriber_id);
                    }
                }
                Command::Publish { session_id, event } => self.publish(&session_id, event),
                Command::SendToUser { user_id, event } => self.send_to_user(&user_id, event),
                Command::SubscriberCount { session_id, reply } => {
                    let count = self.rooms.get(&session_id).map_or(0, Vec::len);
                    let _ = reply.send(count);
                }
            }
        }
        debug!("Broadcast hub stopped");
    }

    fn subscribe(
        &mut self,
        session_id: String,
        subscriber_id: String,
        user_id: Option<String>,
        generation: u64,
        sender: mpsc::Sender<Event>,
    ) {
        // A reused id replaces the old subscription
        self.remove(&subscriber_id);

        let welcome = Event::Connect {
            message: format!("Connected to combat session {}", session_id),
        };
        if sender.try_send(welcome).is_err() {
            return;
        }

        if let Some(user) = &user_id {
            self.users.insert(user.clone(), subscriber_id.clone());
        }
        self.rooms
            .entry(session_id.clone())
            .or_default()
            .push(subscriber_id.clone());

        info!(session = %session_id, subscriber = %subscriber_id, "Subscriber joined");

        self.subscribers.insert(
            subscriber_id,
            Subscriber {
                session_id,
                user_id,
                generation,
                sender,
            },
        );
    }

    fn remove(&mut self, subscriber_id: &str) {
        let Some(subscriber) = self.subscribers.remove(subscriber_id) else {
            return;
        };

        if let Some(room) = self.rooms.get_mut(&subscriber.session_id) {
            room.retain(|id| id != subscriber_id);
            if room.is_empty() {
                self.rooms.remove(&subscriber.session_id);
            }
        }

        // Only clear the directory if a newer connection hasn't taken over
        if let Some(user) = &subscriber.user_id {
            if self.users.get(user).map(String::as_str) == Some(subscriber_id) {
                self.users.remove(user);
            }
        }

        debug!(session = %subscriber.session_id, subscriber = %subscriber_id, "Subscriber left");
    }

    /// Try to hand one event to a subscriber; false means drop them
    fn deliver(&self, subscriber_id: &str, event: Event) -> bool {
        let Some(subscriber) = self.subscribers.get(subscriber_id) else {
            return true;
        };

        match subscriber.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber = %subscriber_id, "Subscriber buffer full, disconnecting");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    fn publish(&mut self, session_id: &str, event: Event) {
        let Some(room) = self.rooms.get(session_id) else {
            return;
        };

        let dropped: Vec<String> = room
            .iter()
            .filter(|id| !self.deliver(id, event.clone()))
            .cloned()
            .collect();

        for id in dropped {
            self.remove(&id);
        }
    }

    fn send_to_user(&mut self, user_id: &str, event: Event) {
        let Some(subscriber_id) = self.users.get(user_id).cloned() else {
            return;
        };
        if !self.deliver(&subscriber_id, event) {
            self.remove(&subscriber_id);
        }
    }
}
