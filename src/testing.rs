//! Local HTTP fixtures shared by the unit tests: a fake Bot API and a
//! webhook that records every request it receives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

/// A Bot API `message` update sent by a user in a private chat.
pub fn text_update(
    update_id: u32,
    chat_id: i64,
    username: &str,
    first_name: &str,
    text: &str,
) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 1706529600,
            "chat": {"id": chat_id, "type": "private", "first_name": first_name},
            "from": {
                "id": chat_id,
                "is_bot": false,
                "first_name": first_name,
                "username": username
            },
            "text": text
        }
    })
}

#[derive(Default)]
struct FakeBot {
    /// Updates not yet confirmed by a later `offset`.
    updates: Vec<Value>,
    /// `timeout` of every regular (non-negative offset) `getUpdates` call.
    poll_timeouts: Vec<Option<u64>>,
}

/// A Bot API serving a fixed set of bot tokens, each with its own update
/// queue. Unknown tokens get 401.
///
/// `getUpdates` follows the real offset rules: a negative offset returns
/// the newest updates and forgets the older ones, a positive offset
/// confirms everything below it, and an empty poll is held for up to the
/// requested `timeout`.
#[derive(Clone)]
pub struct FakeBotApi {
    bots: Arc<Mutex<HashMap<String, FakeBot>>>,
}

impl FakeBotApi {
    /// `bots` pairs each token with the updates already pending for it.
    pub fn new(bots: Vec<(&str, Vec<Value>)>) -> Self {
        let bots = bots
            .into_iter()
            .map(|(token, updates)| {
                let bot = FakeBot {
                    updates,
                    ..FakeBot::default()
                };
                (token.to_string(), bot)
            })
            .collect();
        Self {
            bots: Arc::new(Mutex::new(bots)),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .fallback(bot_api_call)
            .with_state(self.clone())
    }

    /// Queue a new update for `token`, waking any held poll.
    pub async fn push(&self, token: &str, update: Value) {
        if let Some(bot) = self.bots.lock().await.get_mut(token) {
            bot.updates.push(update);
        }
    }

    /// `timeout` parameters of the regular polls made by `token` so far.
    pub async fn poll_timeouts(&self, token: &str) -> Vec<Option<u64>> {
        self.bots
            .lock()
            .await
            .get(token)
            .map(|bot| bot.poll_timeouts.clone())
            .unwrap_or_default()
    }

    /// Wait until `token` has started at least one regular poll.
    pub async fn wait_for_polling(&self, token: &str) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.poll_timeouts(token).await.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("bot never started polling");
    }

    async fn get_updates(&self, token: &str, params: &Value) -> Vec<Value> {
        let offset = params["offset"].as_i64().unwrap_or(0);
        let timeout = params["timeout"].as_u64();

        {
            let mut bots = self.bots.lock().await;
            let Some(bot) = bots.get_mut(token) else {
                return Vec::new();
            };
            if offset < 0 {
                let keep = offset.unsigned_abs() as usize;
                let skip = bot.updates.len().saturating_sub(keep);
                bot.updates.drain(..skip);
                return bot.updates.clone();
            }
            bot.poll_timeouts.push(timeout);
            bot.updates
                .retain(|update| update["update_id"].as_i64().unwrap_or(0) >= offset);
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout.unwrap_or(0));
        loop {
            let batch = self
                .bots
                .lock()
                .await
                .get(token)
                .map(|bot| bot.updates.clone())
                .unwrap_or_default();
            if !batch.is_empty() || tokio::time::Instant::now() >= deadline {
                return batch;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// A Bot API serving `bots`; see [`FakeBotApi`].
pub fn bot_api(bots: Vec<(&str, Vec<Value>)>) -> Router {
    FakeBotApi::new(bots).router()
}

async fn bot_api_call(State(api): State<FakeBotApi>, uri: Uri, body: Bytes) -> Response {
    let Some((token, method)) = uri
        .path()
        .strip_prefix("/bot")
        .and_then(|rest| rest.split_once('/'))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if !api.bots.lock().await.contains_key(token) {
        let body = json!({"ok": false, "error_code": 401, "description": "Unauthorized"});
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    let result = match method.to_ascii_lowercase().as_str() {
        "getme" => json!({
            "id": 111,
            "is_bot": true,
            "first_name": "Bridge",
            "username": "bridge_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "can_connect_to_business": false,
            "has_main_web_app": false
        }),
        "getupdates" => {
            let params: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            Value::Array(api.get_updates(token, &params).await)
        }
        "getwebhookinfo" => json!({
            "url": "",
            "has_custom_certificate": false,
            "pending_update_count": 0
        }),
        "deletewebhook" => {
            let params: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            if params["drop_pending_updates"] == json!(true) {
                if let Some(bot) = api.bots.lock().await.get_mut(token) {
                    bot.updates.clear();
                }
            }
            json!(true)
        }
        _ => json!(true),
    };

    Json(json!({"ok": true, "result": result})).into_response()
}

/// Requests received by [`capture_webhook`], as (path, JSON body).
pub type Captured = Arc<Mutex<Vec<(String, Value)>>>;

/// A webhook that answers 200 to any POST and records it.
pub fn capture_webhook() -> (Router, Captured) {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .fallback(
            |State(captured): State<Captured>, uri: Uri, body: Bytes| async move {
                let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                captured.lock().await.push((uri.path().to_string(), value));
                StatusCode::OK
            },
        )
        .with_state(captured.clone());
    (app, captured)
}
