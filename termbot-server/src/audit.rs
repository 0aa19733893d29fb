//! Audit relay: logs gateway events and forwards blocks and persist failures
//! to the operator chat, if one is configured.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use termbot_core::{GatewayEvent, Reply};

use crate::transport::{deliver, BotApi};

/// Where operator notices go.
#[derive(Clone)]
pub struct OperatorChannel {
    pub api: Arc<dyn BotApi>,
    pub chat_id: i64,
}

/// Text sent to the operator for an event, if it warrants one.
pub fn operator_notice(event: &GatewayEvent) -> Option<String> {
    if !event.needs_operator() {
        return None;
    }
    let notice = match event {
        GatewayEvent::AttemptDenied {
            identity,
            attempt,
            max_attempts,
            ..
        } => format!("⚠️ User {identity} failed attempt {attempt} of {max_attempts}."),
        GatewayEvent::IdentityBlocked {
            identity, attempts, ..
        } => format!("🚫 User {identity} was blocked after {attempts} unauthorized attempts."),
        GatewayEvent::PersistFailed {
            identity,
            attempt,
            reason,
            ..
        } => format!(
            "⚠️ Could not record the block of user {identity} (attempt {attempt}): {reason}\n\
             The block will be retried on their next message."
        ),
    };
    Some(notice)
}

fn log_event(event: &GatewayEvent) {
    match event {
        GatewayEvent::PersistFailed { .. } => {
            error!(target: "termbot::audit", identity = %event.identity(), ?event, "Gateway event")
        }
        _ => info!(target: "termbot::audit", identity = %event.identity(), ?event, "Gateway event"),
    }
}

pub fn spawn_audit_relay(
    mut events: broadcast::Receiver<GatewayEvent>,
    operator: Option<OperatorChannel>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Audit relay lagged; events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            log_event(&event);

            if let (Some(operator), Some(notice)) = (&operator, operator_notice(&event)) {
                deliver(operator.api.as_ref(), operator.chat_id, &Reply::Text(notice)).await;
            }
        }
        info!("Audit relay stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{TelegramError, Update};
    use async_trait::async_trait;
    use termbot_core::{Identity, OutboundMessage};
    use tokio::sync::mpsc;

    struct Outbox(mpsc::UnboundedSender<(i64, String)>);

    #[async_trait]
    impl BotApi for Outbox {
        async fn get_updates(
            &self,
            _offset: Option<i64>,
            _timeout_secs: u64,
        ) -> Result<Vec<Update>, TelegramError> {
            Ok(Vec::new())
        }

        async fn send(&self, chat_id: i64, message: &OutboundMessage) -> Result<(), TelegramError> {
            let _ = self.0.send((chat_id, message.text.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_forwards_only_operator_events() {
        let (events_tx, events_rx) = broadcast::channel(16);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let relay = spawn_audit_relay(
            events_rx,
            Some(OperatorChannel {
                api: Arc::new(Outbox(out_tx)),
                chat_id: 900,
            }),
        );

        events_tx
            .send(GatewayEvent::AttemptDenied {
                identity: Identity(5),
                attempt: 1,
                max_attempts: 3,
                at: 0,
            })
            .unwrap();
        events_tx
            .send(GatewayEvent::IdentityBlocked {
                identity: Identity(5),
                attempts: 3,
                at: 0,
            })
            .unwrap();
        drop(events_tx);
        relay.await.unwrap();

        let (chat, text) = out_rx.recv().await.unwrap();
        assert_eq!(chat, 900);
        assert!(text.contains("User 5 was blocked after 3"));
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_runs_without_operator() {
        let (events_tx, events_rx) = broadcast::channel(4);
        let relay = spawn_audit_relay(events_rx, None);
        events_tx
            .send(GatewayEvent::PersistFailed {
                identity: Identity(9),
                attempt: 3,
                reason: "disk full".into(),
                at: 0,
            })
            .unwrap();
        drop(events_tx);
        relay.await.unwrap();
    }

    #[test]
    fn test_denied_attempts_stay_out_of_the_operator_chat() {
        let denied = GatewayEvent::AttemptDenied {
            identity: Identity(5),
            attempt: 2,
            max_attempts: 3,
            at: 0,
        };
        assert!(!denied.needs_operator());
        assert!(operator_notice(&denied).is_none());
    }

    #[test]
    fn test_persist_failure_notice_names_reason() {
        let notice = operator_notice(&GatewayEvent::PersistFailed {
            identity: Identity(9),
            attempt: 4,
            reason: "disk full".into(),
            at: 0,
        })
        .unwrap();
        assert!(notice.contains("disk full"));
        assert!(notice.contains("attempt 4"));
    }
}
