//! Polling state machine for one in-flight build.
//!
//! Each triggered build gets its own tracker task that polls Jenkins on a
//! fixed interval and edits a single Telegram message in place. The tick
//! logic ([`BuildTracker::step`]) is pure — it takes the fetch outcome and a
//! clock value and returns a render decision — so the state machine is
//! testable without a server.
//!
//! A build that Jenkins does not know about yet is indistinguishable from
//! one it will never know about, so a single not-found response keeps the
//! tracker polling. Only a long streak of them (or of transport errors)
//! forces the `Lost` terminal state.

use crate::build::trigger::BuildHandle;
use crate::channel::Channel;
use crate::jenkins::{BuildInfo, JenkinsClient};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How many ticks a terminal ("Finished"/"lost track") edit is retried
/// before the tracker exits without delivering it. During polling a failed
/// edit is simply dropped — the next tick re-fetches and re-renders — but
/// the terminal text has no next tick to fall back on.
pub const FINAL_EDIT_ATTEMPTS: u32 = 5;

/// Number of cells in the rendered progress bar.
const BAR_CELLS: i64 = 10;
const BAR_FILLED: char = '▰';
const BAR_EMPTY: char = '▱';

/// Tracker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Still polling the server.
    Polling,
    /// Build reached a result; no further ticks.
    Done,
    /// Gave up after too many consecutive not-found or failed polls.
    Lost,
}

/// What one tick decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The rendered text changed; the message should be edited to this.
    Render(String),
    /// Rendered text is identical to what the message already shows.
    Unchanged,
    /// The poll failed; nothing to render, retry on the next tick.
    Retry,
}

/// Tracks one in-flight build against one chat message.
pub struct BuildTracker {
    handle: BuildHandle,
    chat_id: i64,
    message_id: i64,
    /// Last text successfully written to the message; edits are suppressed
    /// when a tick renders the same text again.
    last_rendered: Option<String>,
    not_found_streak: u32,
    error_streak: u32,
    give_up_ticks: u32,
    state: TrackerState,
}

impl BuildTracker {
    /// `initial_text` is what the dispatcher already put on the message, so
    /// the first tick does not redundantly edit it.
    pub fn new(
        handle: BuildHandle,
        chat_id: i64,
        message_id: i64,
        initial_text: Option<String>,
        give_up_ticks: u32,
    ) -> Self {
        Self {
            handle,
            chat_id,
            message_id,
            last_rendered: initial_text,
            not_found_streak: 0,
            error_streak: 0,
            give_up_ticks: give_up_ticks.max(1),
            state: TrackerState::Polling,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state != TrackerState::Polling
    }

    /// Advance the state machine by one tick.
    ///
    /// `fetch` is the outcome of polling Jenkins: `Ok(None)` means the
    /// server has no record of the build, `Err` is a transport or decoding
    /// failure. `now_ms` is the current time in epoch milliseconds.
    pub fn step(
        &mut self,
        fetch: color_eyre::Result<Option<BuildInfo>>,
        now_ms: i64,
    ) -> Step {
        if self.is_terminal() {
            return Step::Unchanged;
        }

        let text = match fetch {
            Err(e) => {
                self.error_streak += 1;
                eprintln!(
                    "[tracker] {} #{}: poll failed ({}/{}): {e}",
                    self.handle.job_name, self.handle.number, self.error_streak, self.give_up_ticks
                );
                if self.error_streak < self.give_up_ticks {
                    return Step::Retry;
                }
                self.state = TrackerState::Lost;
                render_lost(&self.handle.job_name)
            }
            Ok(None) => {
                self.error_streak = 0;
                self.not_found_streak += 1;
                if self.not_found_streak < self.give_up_ticks {
                    render_waiting(&self.handle.job_name)
                } else {
                    self.state = TrackerState::Lost;
                    render_lost(&self.handle.job_name)
                }
            }
            Ok(Some(info)) => {
                self.error_streak = 0;
                self.not_found_streak = 0;
                if info.building {
                    render_progress(&self.handle.job_name, &info, now_ms)
                } else {
                    self.state = TrackerState::Done;
                    render_finished(&self.handle.job_name, info.result.as_deref())
                }
            }
        };

        if self.last_rendered.as_deref() == Some(text.as_str()) {
            Step::Unchanged
        } else {
            Step::Render(text)
        }
    }

    /// Record that `text` was successfully written to the message.
    pub fn commit(&mut self, text: String) {
        self.last_rendered = Some(text);
    }

    /// Poll until the build reaches a terminal state or the bot shuts down.
    pub async fn run(
        self,
        client: Arc<JenkinsClient>,
        channel: Arc<dyn Channel>,
        poll_interval: std::time::Duration,
        cancel: CancellationToken,
    ) {
        let job_name = self.handle.job_name.clone();
        let number = self.handle.number;
        self.run_with(
            move || {
                let client = client.clone();
                let job_name = job_name.clone();
                async move { client.build_info(&job_name, number).await }
            },
            channel,
            poll_interval,
            cancel,
        )
        .await;
    }

    /// The poll loop with an injectable status fetch.
    ///
    /// Once the state machine goes terminal no further fetches happen, but
    /// the loop keeps ticking until the terminal text is actually delivered
    /// (bounded by [`FINAL_EDIT_ATTEMPTS`]) — otherwise a transient edit
    /// failure on the last tick would leave the message stuck on a stale
    /// progress bar.
    pub async fn run_with<F, Fut>(
        mut self,
        mut fetch: F,
        channel: Arc<dyn Channel>,
        poll_interval: std::time::Duration,
        cancel: CancellationToken,
    ) where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = color_eyre::Result<Option<BuildInfo>>> + Send,
    {
        let mut timer = tokio::time::interval(poll_interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Skip the first immediate tick.
        timer.tick().await;

        eprintln!(
            "[tracker] Watching {} #{}",
            self.handle.job_name, self.handle.number
        );

        let mut pending: Option<String> = None;
        let mut failed_edits: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    eprintln!(
                        "[tracker] {} #{}: shutdown before completion",
                        self.handle.job_name, self.handle.number
                    );
                    return;
                }
                _ = timer.tick() => {}
            }

            if !self.is_terminal() {
                let now_ms = chrono::Utc::now().timestamp_millis();
                if let Step::Render(text) = self.step(fetch().await, now_ms) {
                    pending = Some(text);
                }
            }

            if let Some(text) = pending.take() {
                match channel
                    .edit_message(self.chat_id, self.message_id, &text)
                    .await
                {
                    Ok(()) => self.commit(text),
                    Err(e) => {
                        eprintln!(
                            "[tracker] {} #{}: edit failed: {e}",
                            self.handle.job_name, self.handle.number
                        );
                        // While polling, drop it — the next tick re-fetches
                        // and re-renders. The terminal text is the last
                        // word, so keep retrying it for a few ticks.
                        if self.is_terminal() {
                            failed_edits += 1;
                            if failed_edits < FINAL_EDIT_ATTEMPTS {
                                pending = Some(text);
                            } else {
                                eprintln!(
                                    "[tracker] {} #{}: giving up on final edit after {failed_edits} attempt(s)",
                                    self.handle.job_name, self.handle.number
                                );
                            }
                        }
                    }
                }
            }

            if self.is_terminal() && pending.is_none() {
                match self.state {
                    TrackerState::Done => {
                        eprintln!(
                            "[tracker] {} #{}: finished",
                            self.handle.job_name, self.handle.number
                        );
                    }
                    TrackerState::Lost => {
                        eprintln!(
                            "[tracker] {} #{}: lost track after {} tick(s)",
                            self.handle.job_name, self.handle.number, self.give_up_ticks
                        );
                    }
                    TrackerState::Polling => {}
                }
                return;
            }
        }
    }
}

/// Placeholder shown until the server has indexed the build.
pub fn render_waiting(job_name: &str) -> String {
    format!("Building: {job_name}\nwaiting")
}

fn render_lost(job_name: &str) -> String {
    format!("Build: {job_name}\nlost track of this build")
}

fn render_finished(job_name: &str, result: Option<&str>) -> String {
    format!("Build: {job_name}\nFinished: {}", result.unwrap_or("UNKNOWN"))
}

/// Progress estimate from the build's start time and estimated duration,
/// as a 10-cell bar.
fn render_progress(job_name: &str, info: &BuildInfo, now_ms: i64) -> String {
    let percent = percent_complete(info, now_ms);
    let filled = (percent / BAR_CELLS).min(BAR_CELLS);

    let mut bar = String::new();
    for i in 0..BAR_CELLS {
        bar.push(if i < filled { BAR_FILLED } else { BAR_EMPTY });
    }
    format!("Building: {job_name}\n{bar} {percent}%")
}

/// `100 · (now − start) / estimated_duration`, clamped to 0..=100.
/// An estimate of zero (first-ever run) reads as 0%.
fn percent_complete(info: &BuildInfo, now_ms: i64) -> i64 {
    if info.estimated_duration <= 0 {
        return 0;
    }
    let elapsed = now_ms - info.timestamp;
    (100 * elapsed / info.estimated_duration).clamp(0, 100)
}
