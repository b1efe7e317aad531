//! The bot event loop — binds chat commands and button presses to job
//! resolution, triggering, and tracking.

use crate::build::matcher::{self, Resolution};
use crate::build::tracker::{render_waiting, BuildTracker};
use crate::build::trigger;
use crate::channel::{Channel, ChannelEvent, Choice};
use crate::config::BotConfig;
use crate::jenkins::JenkinsClient;
use color_eyre::eyre::Result;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Max number of already-triggered message ids kept for duplicate-press
/// detection (FIFO eviction).
const TRIGGERED_CACHE_MAX: usize = 500;

/// Main bot event loop.
///
/// One instance owns the shared Jenkins client and chat channel; every
/// triggered build gets its own detached tracker task, so a slow poll for
/// one build never delays another or the loop itself.
pub struct BotRunner {
    config: BotConfig,
    jenkins: Arc<JenkinsClient>,
    channel: Arc<dyn Channel>,
    /// Messages whose keyboard already triggered a build. Triggering is not
    /// idempotent, so a stale or duplicate button press on the same message
    /// must not enqueue a second build.
    triggered: HashSet<(i64, i64)>,
    /// Insertion-order tracking for FIFO eviction of `triggered`.
    triggered_order: VecDeque<(i64, i64)>,
    /// Cancellation token handed to every tracker task.
    cancel: CancellationToken,
}

impl BotRunner {
    pub fn new(
        config: BotConfig,
        jenkins: Arc<JenkinsClient>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            config,
            jenkins,
            channel,
            triggered: HashSet::new(),
            triggered_order: VecDeque::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let cancel = self.cancel.clone();

        // Set up SIGTERM/SIGINT handler.
        let shutdown_cancel = cancel.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        tokio::select! {
                            _ = ctrl_c => {}
                            _ = sigterm.recv() => {}
                        }
                    }
                    Err(_) => {
                        let _ = ctrl_c.await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            eprintln!("\n[bot] Shutdown signal received");
            shutdown_cancel.cancel();
        });

        // Start the Telegram polling loop in a background task.
        let (tx, mut rx) = mpsc::channel::<ChannelEvent>(64);
        let channel_clone = self.channel.clone();
        let poll_cancel = cancel.clone();
        tokio::spawn(async move {
            channel_clone.run(tx, poll_cancel).await;
        });

        eprintln!(
            "[bot] Ready. Listening for /build commands ({}).",
            self.channel.name()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    eprintln!("[bot] Shutting down...");
                    break;
                }

                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = self.handle_event(event).await {
                                eprintln!("[bot] Error handling event: {e}");
                            }
                        }
                        None => {
                            eprintln!("[bot] Channel closed, shutting down.");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_event(&mut self, event: ChannelEvent) -> Result<()> {
        match event {
            ChannelEvent::Command {
                chat_id,
                user_name,
                command,
                args,
                ..
            } => {
                if !self.config.is_chat_allowed(chat_id) {
                    eprintln!("[bot] Ignoring command from disallowed chat {chat_id}");
                    return Ok(());
                }
                eprintln!("[bot] Command from {user_name}: /{command} {args}");
                self.handle_command(chat_id, &command, &args).await
            }
            ChannelEvent::CallbackQuery {
                chat_id,
                message_id,
                user_name,
                data,
                callback_query_id,
            } => {
                // Always acknowledge to dismiss Telegram's spinner.
                self.channel.answer_callback_query(&callback_query_id).await;
                if !self.config.is_chat_allowed(chat_id) {
                    return Ok(());
                }
                eprintln!("[bot] Callback from {user_name}: {data}");
                self.handle_callback(chat_id, message_id, &data).await
            }
        }
    }

    async fn handle_command(&mut self, chat_id: i64, command: &str, args: &str) -> Result<()> {
        match command {
            "build" => self.handle_build(chat_id, args).await,
            "builds" => self.handle_running_builds(chat_id).await,
            "start" => {
                self.send(
                    chat_id,
                    "Foreman is running. Send /build <fragment> to trigger a job.",
                )
                .await
            }
            "help" => {
                self.send(
                    chat_id,
                    "Commands:\n\
                     /build <fragment> — Fuzzy-match a job and build it\n\
                     /builds — List builds currently running\n\
                     /help — Show this message",
                )
                .await
            }
            _ => {
                self.send(
                    chat_id,
                    &format!("Unknown command: /{command}\nSend /help for available commands."),
                )
                .await
            }
        }
    }

    /// `/build <fragment>` — resolve the fragment against the job list and
    /// either trigger directly or offer a keyboard of candidates.
    async fn handle_build(&mut self, chat_id: i64, fragment: &str) -> Result<()> {
        let jobs = match self.jenkins.list_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                eprintln!("[bot] Failed to list jobs: {e}");
                return self
                    .send(chat_id, "Couldn't reach the build server, try again later.")
                    .await;
            }
        };

        let resolution = matcher::resolve(fragment, &self.config.default_query, jobs);

        if let Some(job) = resolution.single() {
            let job_name = job.full_name.clone();
            return self.trigger_and_track(chat_id, None, &job_name).await;
        }

        if resolution.candidates.is_empty() {
            return self
                .send(
                    chat_id,
                    &format!("No jobs match \"{}\".", resolution.query),
                )
                .await;
        }

        self.offer_choices(chat_id, &resolution).await
    }

    /// Present up to five candidates as an inline keyboard, one per row.
    async fn offer_choices(&self, chat_id: i64, resolution: &Resolution) -> Result<()> {
        let text = if resolution.truncated() {
            format!(
                "Which job? Showing only {} of {} matches.",
                resolution.candidates.len(),
                resolution.total_matches
            )
        } else {
            "Which job?".to_owned()
        };

        let choices: Vec<Choice> = resolution
            .candidates
            .iter()
            .map(|c| Choice {
                label: c.full_name.clone(),
                value: c.full_name.clone(),
            })
            .collect();

        self.channel.send_choices(chat_id, &text, &choices).await?;
        Ok(())
    }

    /// A button press carrying a job name.
    async fn handle_callback(&mut self, chat_id: i64, message_id: i64, job_name: &str) -> Result<()> {
        if !self.mark_triggered(chat_id, message_id) {
            eprintln!(
                "[bot] Ignoring duplicate press on message {message_id} in chat {chat_id}"
            );
            return Ok(());
        }
        self.trigger_and_track(chat_id, Some(message_id), job_name)
            .await
    }

    /// Trigger `job_name` and spawn a tracker editing a status message.
    ///
    /// With `message_id`, the existing choice message is edited into the
    /// status message; otherwise a fresh one is sent.
    async fn trigger_and_track(
        &mut self,
        chat_id: i64,
        message_id: Option<i64>,
        job_name: &str,
    ) -> Result<()> {
        let triggered = match trigger::trigger(&self.jenkins, job_name).await {
            Ok(t) => t,
            Err(e) => {
                eprintln!("[bot] Failed to trigger {job_name}: {e}");
                let text = format!("❌ Couldn't trigger {job_name}.");
                return match message_id {
                    Some(id) => self.channel.edit_message(chat_id, id, &text).await,
                    None => self.send(chat_id, &text).await,
                };
            }
        };

        let text = render_waiting(job_name);
        let message_id = match message_id {
            Some(id) => {
                self.channel.edit_message(chat_id, id, &text).await?;
                id
            }
            None => self.channel.send_message(chat_id, &text).await?,
        };

        let tracker = BuildTracker::new(
            triggered.handle,
            chat_id,
            message_id,
            Some(text),
            self.config.give_up_ticks,
        );
        let poll_interval = std::time::Duration::from_secs(self.config.poll_interval_secs.max(1));

        tokio::spawn(tracker.run(
            self.jenkins.clone(),
            self.channel.clone(),
            poll_interval,
            self.cancel.clone(),
        ));

        Ok(())
    }

    /// `/builds` — list builds currently occupying executors.
    async fn handle_running_builds(&self, chat_id: i64) -> Result<()> {
        let names = match self.jenkins.running_builds().await {
            Ok(names) => names,
            Err(e) => {
                eprintln!("[bot] Failed to list running builds: {e}");
                return self
                    .send(chat_id, "Couldn't reach the build server, try again later.")
                    .await;
            }
        };

        if names.is_empty() {
            return self.send(chat_id, "No builds running.").await;
        }
        let mut text = String::from("Running builds:");
        for name in &names {
            text.push_str("\n• ");
            text.push_str(name);
        }
        self.send(chat_id, &text).await
    }

    /// Record that `message_id` triggered a build; false if it already did.
    fn mark_triggered(&mut self, chat_id: i64, message_id: i64) -> bool {
        let key = (chat_id, message_id);
        if !self.triggered.insert(key) {
            return false;
        }
        self.triggered_order.push_back(key);
        while self.triggered_order.len() > TRIGGERED_CACHE_MAX {
            if let Some(old) = self.triggered_order.pop_front() {
                self.triggered.remove(&old);
            }
        }
        true
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.channel.send_message(chat_id, text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;

    fn config() -> BotConfig {
        toml::from_str(
            r#"
[jenkins]
url = "https://ci.example.com"
user = "bot"
token = "secret"

[telegram]
bot_token = "tok"
"#,
        )
        .unwrap()
    }

    fn runner() -> BotRunner {
        let jenkins = Arc::new(
            JenkinsClient::new(
                "https://ci.example.com".into(),
                "bot".into(),
                "secret".into(),
            )
            .unwrap(),
        );
        let channel: Arc<dyn Channel> = Arc::new(
            crate::channel::telegram::TelegramChannel::new("tok".into(), vec![]).unwrap(),
        );
        BotRunner::new(config(), jenkins, channel)
    }

    #[test]
    fn test_mark_triggered_rejects_duplicates() {
        let mut r = runner();
        assert!(r.mark_triggered(100, 1));
        assert!(!r.mark_triggered(100, 1));
        // Same message id in another chat is a different message.
        assert!(r.mark_triggered(200, 1));
    }

    #[test]
    fn test_mark_triggered_evicts_fifo() {
        let mut r = runner();
        for id in 0..(TRIGGERED_CACHE_MAX as i64 + 10) {
            assert!(r.mark_triggered(100, id));
        }
        assert!(r.triggered.len() <= TRIGGERED_CACHE_MAX);
        // The oldest entries were evicted and can trigger again.
        assert!(r.mark_triggered(100, 0));
        // Recent entries are still guarded.
        assert!(!r.mark_triggered(100, TRIGGERED_CACHE_MAX as i64 + 9));
    }
}
