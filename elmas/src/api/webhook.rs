//! Telegram webhook endpoint
//!
//! Accepts a Bot API `Update`, runs it through the dispatcher and answers
//! with a `sendMessage` call in the response body, which Telegram executes
//! on the bot's behalf. Only the fields the dispatcher needs are parsed.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use lib_identity::ct_eq_bytes;
use lib_storage::StorageBackend;
use lib_types::UserId;

use super::ApiState;
use crate::bot::{BotReply, BotUpdate, Button, MAIN_MENU};

pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub from: User,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

impl Update {
    /// Chat to answer in, plus the dispatcher input
    pub fn into_bot_update(self) -> Option<(i64, BotUpdate)> {
        if let Some(query) = self.callback_query {
            let chat_id = query.message.as_ref().map_or(query.from.id, |m| m.chat.id);
            return Some((
                chat_id,
                BotUpdate::Callback {
                    user_id: UserId(query.from.id),
                    data: query.data?,
                },
            ));
        }
        let message = self.message?;
        let from = message.from?;
        Some((
            message.chat.id,
            BotUpdate::Message {
                user_id: UserId(from.id),
                text: message.text?,
            },
        ))
    }
}

/// Render a reply as a Bot API `sendMessage` call
pub fn send_message(chat_id: i64, reply: &BotReply) -> Value {
    let mut call = json!({
        "method": "sendMessage",
        "chat_id": chat_id,
        "text": reply.text,
    });

    let markup = if !reply.buttons.is_empty() {
        let rows: Vec<Value> = reply
            .buttons
            .iter()
            .map(|button| match button {
                Button::WebApp { label, url } => json!([{ "text": label, "web_app": { "url": url } }]),
                Button::Callback { label, data } => json!([{ "text": label, "callback_data": data }]),
            })
            .collect();
        Some(json!({ "inline_keyboard": rows }))
    } else if reply.show_menu {
        let rows: Vec<Value> = MAIN_MENU.iter().map(|label| json!([{ "text": label }])).collect();
        Some(json!({ "keyboard": rows, "resize_keyboard": true }))
    } else {
        None
    };

    if let (Some(markup), Value::Object(map)) = (markup, &mut call) {
        map.insert("reply_markup".to_string(), markup);
    }
    call
}

/// POST /bot/webhook
pub async fn webhook_handler<B: StorageBackend + 'static>(
    State(state): State<ApiState<B>>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Response {
    if let Some(expected) = &state.webhook_secret {
        let supplied = headers
            .get(SECRET_TOKEN_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();
        if !ct_eq_bytes(supplied, expected.as_bytes()) {
            warn!("webhook call with bad secret token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let update_id = update.update_id;
    let Some((chat_id, bot_update)) = update.into_bot_update() else {
        debug!(update_id, "ignoring update without text or callback data");
        return StatusCode::OK.into_response();
    };

    let reply = state.dispatcher.handle(bot_update).await;
    Json(send_message(chat_id, &reply)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_update() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "message": { "chat": { "id": 55 }, "from": { "id": 7 }, "text": "/wallet" }
        }))
        .unwrap();
        assert_eq!(
            update.into_bot_update(),
            Some((
                55,
                BotUpdate::Message {
                    user_id: UserId(7),
                    text: "/wallet".to_string()
                }
            ))
        );
    }

    #[test]
    fn test_callback_update_and_sticker() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 2,
            "callback_query": {
                "id": "q",
                "from": { "id": 7 },
                "data": "cAAAA",
                "message": { "chat": { "id": 55 } }
            }
        }))
        .unwrap();
        assert!(matches!(update.into_bot_update(), Some((55, BotUpdate::Callback { .. }))));

        let sticker: Update = serde_json::from_value(json!({
            "update_id": 3,
            "message": { "chat": { "id": 55 }, "from": { "id": 7 } }
        }))
        .unwrap();
        assert!(sticker.into_bot_update().is_none());
    }

    #[test]
    fn test_send_message_markup() {
        let call = send_message(
            55,
            &BotReply {
                text: "hi".to_string(),
                buttons: vec![Button::WebApp {
                    label: "Watch".to_string(),
                    url: "https://example.com/w".to_string(),
                }],
                show_menu: true,
            },
        );
        assert_eq!(call["method"], "sendMessage");
        assert_eq!(call["reply_markup"]["inline_keyboard"][0][0]["web_app"]["url"], "https://example.com/w");

        let menu = send_message(55, &BotReply::menu("Menu:"));
        assert_eq!(menu["reply_markup"]["keyboard"].as_array().unwrap().len(), 3);

        let plain = send_message(55, &BotReply::text("plain"));
        assert!(plain.get("reply_markup").is_none());
    }
}
