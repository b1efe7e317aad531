//! Channel abstraction for the chat transport (Telegram today).

pub mod telegram;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// An event received from a channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A slash command from a user (e.g. /build frontend).
    Command {
        chat_id: i64,
        user_id: i64,
        user_name: String,
        command: String,
        args: String,
    },

    /// An inline keyboard button press.
    CallbackQuery {
        chat_id: i64,
        /// The message carrying the keyboard that was pressed.
        message_id: i64,
        user_name: String,
        data: String,
        callback_query_id: String,
    },
}

/// One inline keyboard choice: a label and the callback payload it sends.
#[derive(Debug, Clone)]
pub struct Choice {
    pub label: String,
    pub value: String,
}

/// Trait for messaging channel integrations.
///
/// Implementations run a background loop that produces `ChannelEvent`s
/// and expose the outbound operations the bot needs. Send operations that
/// create a message return its id so callers can edit it later.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Run the channel's receive loop, sending events to `tx`.
    /// Should run until `cancel` is triggered.
    async fn run(&self, tx: Sender<ChannelEvent>, cancel: CancellationToken);

    /// Send a plain text message; returns the new message's id.
    async fn send_message(&self, chat_id: i64, text: &str) -> color_eyre::Result<i64>;

    /// Send a message with an inline keyboard (one choice per row);
    /// returns the new message's id.
    async fn send_choices(
        &self,
        chat_id: i64,
        text: &str,
        choices: &[Choice],
    ) -> color_eyre::Result<i64>;

    /// Replace the text of an existing message (drops any keyboard).
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> color_eyre::Result<()>;

    /// Acknowledge a callback query to dismiss the client's loading spinner.
    async fn answer_callback_query(&self, callback_query_id: &str);
}
