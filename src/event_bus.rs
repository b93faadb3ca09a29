// =============================================================================
// Event Bus — typed broadcast of engine lifecycle events
// =============================================================================
//
// Grounded on cooprefr-bettersys's `signal_broadcast` channel wiring: a
// single `tokio::sync::broadcast::Sender`, many subscribers, no buffering
// and no replay. A lagged receiver logs and continues from the next
// available message rather than being torn down.
// =============================================================================

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

const CHANNEL_CAPACITY: usize = 256;

/// One entry per named event in the pipeline's lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    Started,
    Stopped,
    CycleStart { cycle: u64 },
    CoinSelected { symbol: String, side: String },
    SpecialistAnalysis { analyst_id: String },
    TournamentComplete { champion_id: String },
    ChampionSelected { analyst_id: String, symbol: String },
    RiskCouncilDecision { approved: bool },
    TradeExecuted { symbol: String, dry_run: bool },
    CycleComplete { cycle: u64, errors: Vec<String> },
    EmergencyClose { symbols: Vec<String> },
    DebatesComplete { stage: String },
}

/// Publisher handle. Cheap to clone; every clone shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: EngineEvent) {
        // No subscribers is not an error — the event is simply dropped.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive the next event from `rx`, logging and continuing past any
/// `Lagged` gap rather than treating it as fatal.
pub async fn recv_resilient(rx: &mut broadcast::Receiver<EngineEvent>) -> Option<EngineEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "event bus subscriber lagged, continuing");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::Started);
        let event = recv_resilient(&mut rx).await.unwrap();
        matches!(event, EngineEvent::Started);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_their_own_copy() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(EngineEvent::Stopped);
        assert!(recv_resilient(&mut rx1).await.is_some());
        assert!(recv_resilient(&mut rx2).await.is_some());
    }

    #[tokio::test]
    async fn lagged_receiver_continues_rather_than_terminating() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for cycle in 0..(CHANNEL_CAPACITY as u64 + 10) {
            bus.publish(EngineEvent::CycleStart { cycle });
        }
        // The receiver is far behind; recv_resilient must still return Some
        // rather than None or panicking.
        assert!(recv_resilient(&mut rx).await.is_some());
    }
}
