//! Foreman — a Telegram bot that triggers and monitors Jenkins builds.

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

use foreman::bot::BotRunner;
use foreman::build::matcher;
use foreman::channel::telegram::TelegramChannel;
use foreman::config::BotConfig;
use foreman::jenkins::JenkinsClient;

/// Trigger and monitor Jenkins builds from Telegram.
#[derive(Parser)]
#[command(name = "foreman", version, about)]
struct Cli {
    /// Path to the config file.
    #[arg(short, long, global = true, default_value = "foreman.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot (foreground).
    Run,

    /// Resolve a job fragment against the server, without Telegram.
    Jobs {
        /// Fragment to match (uses the configured default when omitted).
        fragment: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = BotConfig::load(&cli.config)?;

    match cli.command {
        Command::Run => cmd_run(config).await,
        Command::Jobs { fragment } => cmd_jobs(config, fragment.as_deref().unwrap_or("")).await,
    }
}

/// Run the bot event loop until shutdown.
async fn cmd_run(config: BotConfig) -> Result<()> {
    let jenkins = Arc::new(JenkinsClient::new(
        config.jenkins.url.clone(),
        config.jenkins.user.clone(),
        config.jenkins.token.clone(),
    )?);
    let channel = Arc::new(TelegramChannel::new(
        config.telegram.bot_token.clone(),
        config.allowed_user_ids.clone(),
    )?);

    eprintln!("[foreman] Jenkins: {}", config.jenkins.url);
    eprintln!("[foreman] Poll interval: {}s", config.poll_interval_secs);

    let mut runner = BotRunner::new(config, jenkins, channel);
    runner.run().await
}

/// Resolve a fragment from the terminal — handy for checking what a
/// `/build` command would match.
async fn cmd_jobs(config: BotConfig, fragment: &str) -> Result<()> {
    let jenkins = JenkinsClient::new(
        config.jenkins.url.clone(),
        config.jenkins.user.clone(),
        config.jenkins.token.clone(),
    )?;

    let jobs = jenkins.list_jobs().await?;
    let resolution = matcher::resolve(fragment, &config.default_query, jobs);

    if resolution.candidates.is_empty() {
        println!("No jobs match \"{}\".", resolution.query);
        return Ok(());
    }

    println!(
        "{} job(s) match \"{}\":",
        resolution.total_matches, resolution.query
    );
    for job in &resolution.candidates {
        println!("  {}", job.full_name);
    }
    if resolution.truncated() {
        println!(
            "  ... and {} more",
            resolution.total_matches - resolution.candidates.len()
        );
    }

    Ok(())
}
