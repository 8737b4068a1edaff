use tokio::sync::broadcast;
use tracing::debug;

use super::events::GamificationEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Event bus for distributing events throughout the application
///
/// A single broadcast channel carries every gamification fact; subscribers
/// filter for what they care about. Slow subscribers that fall behind the
/// channel capacity lose the oldest events, never block the emitter.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GamificationEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Emits an event to all current subscribers
    pub fn emit(&self, event: GamificationEvent) {
        match self.sender.send(event) {
            Ok(receiver_count) => {
                debug!(receivers = receiver_count, "Event emitted");
            }
            Err(_) => {
                debug!("Event emitted with no receivers");
            }
        }
    }

    /// Subscribe to all events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<GamificationEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_events_to_subscriber() {
        let bus = EventBus::with_default_capacity();
        let mut receiver = bus.subscribe();

        bus.emit(GamificationEvent::BadgeAwarded {
            user_id: "user-1".to_string(),
            badge_id: "early_adopter".to_string(),
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "badge_awarded");
        assert_eq!(event.user_id(), Some("user-1"));
    }

    #[tokio::test]
    async fn emitting_without_subscribers_does_not_fail() {
        let bus = EventBus::new(4);
        bus.emit(GamificationEvent::LeaderboardGenerated {
            leaderboard_type: "weekly_pc".to_string(),
            entry_count: 0,
        });
    }
}
