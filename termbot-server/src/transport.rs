//! Long-polling transport: turns Telegram updates into dispatcher requests
//! and delivers the replies.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use termbot_core::dispatcher::spawn_handle;
use termbot_core::{Identity, OutboundMessage, Reply, Request, RequestDispatcher, MESSAGE_CHUNK_CHARS};

use crate::telegram::{TelegramClient, TelegramError, Update};

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// The slice of the Bot API the transport and the audit relay need.
#[async_trait]
pub trait BotApi: Send + Sync {
    async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError>;

    async fn send(&self, chat_id: i64, message: &OutboundMessage) -> Result<(), TelegramError>;
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        TelegramClient::get_updates(self, offset, timeout_secs).await
    }

    async fn send(&self, chat_id: i64, message: &OutboundMessage) -> Result<(), TelegramError> {
        self.send_message(chat_id, message).await.map(|_| ())
    }
}

/// Send every message of a reply, in order. Delivery failures are logged.
pub async fn deliver(api: &dyn BotApi, chat_id: i64, reply: &Reply) {
    for message in reply.to_messages(MESSAGE_CHUNK_CHARS) {
        if let Err(e) = api.send(chat_id, &message).await {
            warn!(chat_id, error = %e, "Failed to deliver reply");
            return;
        }
    }
}

/// Build a dispatcher request from an update. Updates without a text message
/// or without a sender carry nothing to authorize.
pub fn request_from_update(update: &Update) -> Option<Request> {
    let message = update.message.as_ref()?;
    let sender = message.from.as_ref()?;
    let text = message.text.as_ref()?;
    Some(Request {
        identity: Identity(sender.id),
        chat_id: message.chat.id,
        first_name: Some(sender.first_name.clone()),
        text: text.clone(),
    })
}

pub struct PollingTransport {
    api: Arc<dyn BotApi>,
    dispatcher: Arc<RequestDispatcher>,
    poll_timeout_secs: u64,
}

impl PollingTransport {
    pub fn new(api: Arc<dyn BotApi>, dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            api,
            dispatcher,
            poll_timeout_secs: 30,
        }
    }

    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    /// Poll until `shutdown` resolves. Each request is handled on its own task,
    /// so a slow command never holds up the poll loop.
    pub async fn run<S>(self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut offset: Option<i64> = None;
        let mut backoff = MIN_BACKOFF;

        info!(poll_timeout_secs = self.poll_timeout_secs, "Polling for updates");

        loop {
            let polled = tokio::select! {
                _ = &mut shutdown => break,
                polled = self.api.get_updates(offset, self.poll_timeout_secs) => polled,
            };

            let updates = match polled {
                Ok(updates) => {
                    backoff = MIN_BACKOFF;
                    updates
                }
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "getUpdates failed");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                let Some(request) = request_from_update(&update) else {
                    debug!(update_id = update.update_id, "Ignoring update without text");
                    continue;
                };
                let api = Arc::clone(&self.api);
                spawn_handle(Arc::clone(&self.dispatcher), request, move |request, reply| async move {
                    deliver(api.as_ref(), request.chat_id, &reply).await;
                });
            }
        }

        info!("Transport stopped");
    }
}
