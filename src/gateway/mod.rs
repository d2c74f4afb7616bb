//! Outbound side of the round: message delivery, disconnects and rewards

pub mod sessions;

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::game::round::Effect;
use crate::rewards::{RewardGrant, RewardLedger};
use crate::ws::protocol::ServerMsg;

pub use sessions::{Outbound, SessionRegistry};

/// Per-channel delivery failures
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no session for channel {0}")]
    UnknownChannel(Uuid),

    #[error("outbound buffer full for channel {0}")]
    Backpressure(Uuid),

    #[error("session {0} already closed")]
    Closed(Uuid),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything the round needs from the outside world. Calls are
/// fire-and-forget; a failure for one channel never affects another.
pub trait Gateway: Send + Sync + 'static {
    fn send(&self, channel_id: Uuid, msg: &ServerMsg) -> Result<(), GatewayError>;

    fn disconnect(&self, channel_id: Uuid, reason: &str);

    fn grant_reward(&self, channel_id: Uuid, account_id: Uuid, amount: u32, reason: &str);

    /// Deliver to each recipient independently
    fn broadcast(&self, recipients: &[Uuid], msg: &ServerMsg) {
        for &channel_id in recipients {
            if let Err(e) = self.send(channel_id, msg) {
                warn!(channel_id = %channel_id, error = %e, "Delivery failed");
            }
        }
    }
}

/// Execute effects in the order the round produced them
pub fn dispatch<G: Gateway + ?Sized>(gateway: &G, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Broadcast { recipients, msg } => gateway.broadcast(&recipients, &msg),
            Effect::Disconnect { channel_id, reason } => gateway.disconnect(channel_id, &reason),
            Effect::GrantReward {
                channel_id,
                account_id,
                amount,
                reason,
            } => gateway.grant_reward(channel_id, account_id, amount, &reason),
        }
    }
}

/// Production gateway: WebSocket sessions plus the reward ledger
pub struct LiveGateway {
    sessions: Arc<SessionRegistry>,
    ledger: Option<RewardLedger>,
}

impl LiveGateway {
    pub fn new(sessions: Arc<SessionRegistry>, ledger: Option<RewardLedger>) -> Self {
        Self { sessions, ledger }
    }
}

impl Gateway for LiveGateway {
    fn send(&self, channel_id: Uuid, msg: &ServerMsg) -> Result<(), GatewayError> {
        let frame: Arc<str> = serde_json::to_string(msg)?.into();
        self.sessions.deliver(channel_id, Outbound::Frame(frame))
    }

    fn disconnect(&self, channel_id: Uuid, reason: &str) {
        info!(
            channel_id = %channel_id,
            account_id = ?self.sessions.account_of(&channel_id),
            reason,
            "Closing session"
        );
        if let Err(e) = self
            .sessions
            .deliver(channel_id, Outbound::Close(reason.to_string()))
        {
            warn!(channel_id = %channel_id, error = %e, "Disconnect not delivered");
        }
    }

    fn grant_reward(&self, channel_id: Uuid, account_id: Uuid, amount: u32, reason: &str) {
        let grant = RewardGrant::new(account_id, amount, reason);

        let Some(ledger) = self.ledger.clone() else {
            info!(
                channel_id = %channel_id,
                account_id = %account_id,
                amount,
                reason,
                "Reward granted (ledger not configured)"
            );
            return;
        };

        tokio::spawn(async move {
            match ledger.record(&grant).await {
                Ok(()) => info!(
                    account_id = %grant.account_id,
                    amount = grant.amount,
                    "Reward recorded"
                ),
                Err(e) => warn!(
                    account_id = %grant.account_id,
                    amount = grant.amount,
                    error = %e,
                    "Failed to record reward"
                ),
            }
        });
    }

    /// Encode once, queue per channel
    fn broadcast(&self, recipients: &[Uuid], msg: &ServerMsg) {
        let frame: Arc<str> = match serde_json::to_string(msg) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(error = %e, "Failed to encode broadcast");
                return;
            }
        };

        for &channel_id in recipients {
            if let Err(e) = self
                .sessions
                .deliver(channel_id, Outbound::Frame(frame.clone()))
            {
                warn!(channel_id = %channel_id, error = %e, "Delivery failed");
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory gateway that records every call

    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Recorded {
        Sent { channel_id: Uuid, msg: ServerMsg },
        Disconnected { channel_id: Uuid, reason: String },
        Rewarded { account_id: Uuid, amount: u32 },
    }

    #[derive(Default)]
    pub struct RecordingGateway {
        calls: Mutex<Vec<Recorded>>,
    }

    impl RecordingGateway {
        pub fn calls(&self) -> Vec<Recorded> {
            self.calls.lock().unwrap().clone()
        }

        /// Messages delivered to one channel, in order
        pub fn sent_to(&self, channel_id: Uuid) -> Vec<ServerMsg> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Recorded::Sent { channel_id: to, msg } if to == channel_id => Some(msg),
                    _ => None,
                })
                .collect()
        }

        pub fn disconnects(&self) -> Vec<Uuid> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Recorded::Disconnected { channel_id, .. } => Some(channel_id),
                    _ => None,
                })
                .collect()
        }
    }

    impl Gateway for RecordingGateway {
        fn send(&self, channel_id: Uuid, msg: &ServerMsg) -> Result<(), GatewayError> {
            self.calls.lock().unwrap().push(Recorded::Sent {
                channel_id,
                msg: msg.clone(),
            });
            Ok(())
        }

        fn disconnect(&self, channel_id: Uuid, reason: &str) {
            self.calls.lock().unwrap().push(Recorded::Disconnected {
                channel_id,
                reason: reason.to_string(),
            });
        }

        fn grant_reward(&self, _channel_id: Uuid, account_id: Uuid, amount: u32, _reason: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(Recorded::Rewarded { account_id, amount });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Recorded, RecordingGateway};
    use super::*;

    #[test]
    fn dispatch_preserves_effect_order() {
        let gateway = RecordingGateway::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let account = Uuid::new_v4();

        dispatch(
            &gateway,
            vec![
                Effect::Broadcast {
                    recipients: vec![a, b],
                    msg: ServerMsg::Pong { t: 1 },
                },
                Effect::Disconnect {
                    channel_id: b,
                    reason: "Inactivity timeout".into(),
                },
                Effect::GrantReward {
                    channel_id: a,
                    account_id: account,
                    amount: 4,
                    reason: "Snake game: 4 credits".into(),
                },
            ],
        );

        assert_eq!(
            gateway.calls(),
            vec![
                Recorded::Sent {
                    channel_id: a,
                    msg: ServerMsg::Pong { t: 1 }
                },
                Recorded::Sent {
                    channel_id: b,
                    msg: ServerMsg::Pong { t: 1 }
                },
                Recorded::Disconnected {
                    channel_id: b,
                    reason: "Inactivity timeout".into()
                },
                Recorded::Rewarded {
                    account_id: account,
                    amount: 4
                },
            ]
        );
    }

    #[tokio::test]
    async fn live_broadcast_skips_missing_channels() {
        let sessions = Arc::new(SessionRegistry::new());
        let present = Uuid::new_v4();
        let mut rx = sessions.register(present, Uuid::new_v4());
        let gateway = LiveGateway::new(sessions.clone(), None);

        gateway.broadcast(&[Uuid::new_v4(), present], &ServerMsg::Pong { t: 9 });

        match rx.recv().await {
            Some(Outbound::Frame(json)) => assert_eq!(&*json, r#"{"type":"pong","t":9}"#),
            other => panic!("unexpected outbound: {:?}", other),
        }
    }

    #[tokio::test]
    async fn live_disconnect_queues_close() {
        let sessions = Arc::new(SessionRegistry::new());
        let channel = Uuid::new_v4();
        let mut rx = sessions.register(channel, Uuid::new_v4());
        let gateway = LiveGateway::new(sessions, None);

        gateway.disconnect(channel, "Inactivity timeout");
        gateway.grant_reward(channel, Uuid::new_v4(), 3, "Snake game: 3 credits");

        assert_eq!(
            rx.recv().await,
            Some(Outbound::Close("Inactivity timeout".to_string()))
        );
    }
}
