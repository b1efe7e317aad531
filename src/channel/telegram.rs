//! Telegram Bot API client using raw reqwest (no framework).
//!
//! Uses long-polling via `getUpdates`; outbound traffic is `sendMessage`,
//! `editMessageText` and `answerCallbackQuery`.

use super::{Channel, ChannelEvent, Choice};
use async_trait::async_trait;
use color_eyre::eyre::Result;
use serde::Deserialize;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// Telegram Bot API client.
pub struct TelegramChannel {
    bot_token: String,
    allowed_user_ids: Vec<i64>,
    client: reqwest::Client,
}

// --- Telegram API response types ---

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    message: Option<TgMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    from: Option<TgUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    username: Option<String>,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_user_ids: Vec<i64>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            bot_token,
            allowed_user_ids,
            client,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn is_user_allowed(&self, user_id: i64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }

    /// Parse a message into a Command event. Non-command text is ignored —
    /// the bot only reacts to slash commands and button presses.
    fn parse_message(msg: &TgMessage) -> Option<ChannelEvent> {
        let text = msg.text.as_deref()?.trim();
        let rest = text.strip_prefix('/')?;

        let user = msg.from.as_ref()?;
        let user_name = user
            .username
            .clone()
            .unwrap_or_else(|| user.first_name.clone());

        // Split command from args: "/build frontend" -> ("build", "frontend")
        let (command, args) = match rest.split_once(' ') {
            Some((cmd, args)) => (cmd, args),
            None => (rest, ""),
        };
        // Strip @botname suffix from commands like "/build@mybot"
        let command = command.split('@').next().unwrap_or(command);

        Some(ChannelEvent::Command {
            chat_id: msg.chat.id,
            user_id: user.id,
            user_name,
            command: command.to_owned(),
            args: args.trim().to_owned(),
        })
    }

    /// Long-poll for updates from Telegram.
    async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>> {
        let resp = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", "30".to_string()),
            ])
            .send()
            .await?;

        let body: TgResponse<Vec<TgUpdate>> = resp.json().await?;

        if !body.ok {
            let desc = body.description.unwrap_or_default();
            color_eyre::eyre::bail!("Telegram API error: {desc}");
        }

        Ok(body.result.unwrap_or_default())
    }

    /// POST a sendMessage payload and return the created message's id.
    async fn post_message(&self, payload: serde_json::Value) -> Result<i64> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&payload)
            .send()
            .await?;

        let body: TgResponse<TgMessage> = resp.json().await?;
        if !body.ok {
            let desc = body.description.unwrap_or_default();
            color_eyre::eyre::bail!("sendMessage failed: {desc}");
        }

        body.result
            .map(|m| m.message_id)
            .ok_or_else(|| color_eyre::eyre::eyre!("sendMessage returned no message"))
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn run(&self, tx: Sender<ChannelEvent>, cancel: CancellationToken) {
        let mut offset: i64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.get_updates(offset) => {
                    match result {
                        Ok(updates) => updates,
                        Err(e) => {
                            eprintln!("[telegram] Poll error: {e}");
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                            continue;
                        }
                    }
                }
            };

            for update in updates {
                offset = update.update_id + 1;

                // Inline keyboard button presses.
                if let Some(cq) = update.callback_query {
                    if !self.is_user_allowed(cq.from.id) {
                        eprintln!(
                            "[telegram] Ignoring callback query from unauthorized user {}",
                            cq.from.id
                        );
                        continue;
                    }

                    let (chat_id, message_id) = match cq.message.as_ref() {
                        Some(m) => (m.chat.id, m.message_id),
                        // Without the originating message there is nothing to edit.
                        None => continue,
                    };
                    let user_name = cq.from.username.unwrap_or(cq.from.first_name);

                    if let Some(data) = cq.data {
                        let event = ChannelEvent::CallbackQuery {
                            chat_id,
                            message_id,
                            user_name,
                            data,
                            callback_query_id: cq.id,
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    continue;
                }

                let Some(msg) = update.message else {
                    continue;
                };

                if let Some(user) = &msg.from {
                    if !self.is_user_allowed(user.id) {
                        eprintln!(
                            "[telegram] Ignoring message from unauthorized user {}",
                            user.id
                        );
                        continue;
                    }
                }

                if let Some(event) = Self::parse_message(&msg) {
                    if tx.send(event).await.is_err() {
                        // Receiver dropped — shut down.
                        return;
                    }
                }
            }
        }
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64> {
        self.post_message(serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        }))
        .await
    }

    async fn send_choices(&self, chat_id: i64, text: &str, choices: &[Choice]) -> Result<i64> {
        let keyboard: Vec<Vec<serde_json::Value>> = choices
            .iter()
            .map(|c| {
                vec![serde_json::json!({
                    "text": c.label,
                    "callback_data": c.value,
                })]
            })
            .collect();

        self.post_message(serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "reply_markup": { "inline_keyboard": keyboard },
        }))
        .await
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.api_url("editMessageText"))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "text": text,
            }))
            .send()
            .await?;

        let body: TgResponse<serde_json::Value> = resp.json().await?;
        if !body.ok {
            let desc = body.description.unwrap_or_default();
            color_eyre::eyre::bail!("editMessageText failed: {desc}");
        }
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) {
        let resp = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&serde_json::json!({
                "callback_query_id": callback_query_id,
            }))
            .send()
            .await;

        if let Err(e) = resp {
            eprintln!("[telegram] answerCallbackQuery failed: {e}");
        }
    }
}
