use futures::{Stream, StreamExt};
use tracing::{error, info, warn};
use url::Url;

use crate::config::BotConfig;
use crate::platform::telegram::{self, AuthError};
use crate::platform::InboundMessage;
use crate::webhook::{OutboundPayload, WebhookForwarder};

/// Run one bot: authorize, then forward its messages until the update
/// stream ends.
///
/// Authorization is the only failure that escapes. Everything after it is
/// logged per message. `debug` turns on Bot API request tracing.
pub async fn run(
    label: usize,
    config: BotConfig,
    api_url: Option<Url>,
    debug: bool,
) -> Result<(), AuthError> {
    let (bot, username) =
        telegram::connect(label, &config.token, api_url.as_ref(), debug).await?;

    info!("Bot {} authorized on account {}", label, username);
    info!("Bot {} webhook URL: {}", label, config.webhook_url);

    let forwarder = WebhookForwarder::new();
    let mut listener = telegram::long_poll(bot);
    let messages = telegram::inbound_messages(label, &mut listener);

    info!("Bot {} listening for messages...", label);

    relay(label, &config.webhook_url, &forwarder, messages).await;

    Ok(())
}

/// Forward every message from `messages` to `webhook_url`, one POST each, in
/// the order they arrive. A failed forward drops that message.
pub async fn relay<S>(
    label: usize,
    webhook_url: &str,
    forwarder: &WebhookForwarder,
    messages: S,
) where
    S: Stream<Item = InboundMessage>,
{
    futures::pin_mut!(messages);

    while let Some(message) = messages.next().await {
        info!(
            "Bot {} received message from {}: {}",
            label, message.from_username, message.text
        );

        let payload = OutboundPayload::from(&message);
        match forwarder.forward(webhook_url, &payload).await {
            Ok(status) => info!("Bot {} message forwarded successfully ({})", label, status),
            Err(e) => error!(
                "Bot {} error sending to webhook: {:#}",
                label,
                anyhow::Error::new(e)
            ),
        }
    }

    warn!("Bot {} update stream closed, no longer listening", label);
}
