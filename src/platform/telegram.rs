use std::time::Duration;

use futures::{Stream, StreamExt};
use teloxide::adaptors::trace::{Settings, Trace};
use teloxide::prelude::*;
use teloxide::types::{Update, UpdateKind};
use teloxide::update_listeners::{AsUpdateStream, Polling};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::platform::InboundMessage;

/// Idle timeout of each `getUpdates` long-poll request.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Slack on top of [`POLL_TIMEOUT`] before the HTTP client gives up on a
/// held `getUpdates` request.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// A bot session. With debug on, every Bot API request and response is
/// logged at trace level.
pub type TelegramBot = Trace<Bot>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to build the Bot API client")]
    Client(#[source] reqwest::Error),

    #[error("getMe request failed")]
    Request(#[source] teloxide::RequestError),
}

/// The Bot API rejected the token (or could not be reached) at startup.
#[derive(Debug, Error)]
#[error("failed to authorize bot {label}")]
pub struct AuthError {
    pub label: usize,
    #[source]
    pub source: SessionError,
}

impl InboundMessage {
    /// Extract the forwarded fields from a new-message update.
    ///
    /// Returns `None` for every other update kind (edits, callbacks,
    /// channel posts, ...).
    pub fn from_update(update: &Update) -> Option<Self> {
        let UpdateKind::Message(msg) = &update.kind else {
            return None;
        };

        let (from_username, from_first_name) = msg
            .from
            .as_ref()
            .map(|user| {
                (
                    user.username.clone().unwrap_or_default(),
                    user.first_name.clone(),
                )
            })
            .unwrap_or_default();

        Some(Self {
            text: msg.text().unwrap_or_default().to_string(),
            chat_id: msg.chat.id.0,
            from_username,
            from_first_name,
        })
    }
}

/// Request tracing for a session.
pub fn trace_settings(debug: bool) -> Settings {
    if debug {
        Settings::TRACE_REQUESTS | Settings::TRACE_RESPONSES
    } else {
        Settings::empty()
    }
}

/// Create a bot session for `token` and verify it with `getMe`.
///
/// Returns the bot together with its account username.
pub async fn connect(
    label: usize,
    token: &str,
    api_url: Option<&Url>,
    debug: bool,
) -> Result<(TelegramBot, String), AuthError> {
    // teloxide's default client times out after 17s, well inside a 60s poll.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(POLL_TIMEOUT + CLIENT_TIMEOUT_SLACK)
        .build()
        .map_err(|e| AuthError {
            label,
            source: SessionError::Client(e),
        })?;

    let mut bot = Bot::with_client(token, client);
    if let Some(url) = api_url {
        bot = bot.set_api_url(url.clone());
    }
    let bot = Trace::new(bot, trace_settings(debug));

    let me = bot.get_me().await.map_err(|e| AuthError {
        label,
        source: SessionError::Request(e),
    })?;

    Ok((bot, me.user.username.clone().unwrap_or_default()))
}

/// Long-poll listener starting from the current point: updates queued
/// before startup are dropped, not replayed.
pub fn long_poll(bot: TelegramBot) -> Polling<TelegramBot> {
    Polling::builder(bot)
        .timeout(POLL_TIMEOUT)
        .drop_pending_updates()
        .build()
}

/// Turn the raw update stream into the stream of inbound messages.
///
/// Non-message updates are skipped. Fetch errors are logged and polling
/// carries on; the stream only ends if the listener itself stops.
pub fn inbound_messages(
    label: usize,
    listener: &mut Polling<TelegramBot>,
) -> impl Stream<Item = InboundMessage> + Send + '_ {
    listener.as_stream().filter_map(move |result| async move {
        match result {
            Ok(update) => {
                let message = InboundMessage::from_update(&update);
                if message.is_none() {
                    debug!("Bot {} skipping update {:?} without a message", label, update.id);
                }
                message
            }
            Err(e) => {
                warn!("Bot {} failed to fetch updates: {}", label, e);
                None
            }
        }
    })
}
