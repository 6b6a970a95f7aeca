//! `mailcast` - bulk campaign sender and bounce reconciler.
//!
//! `send` mails every pending recipient, `parse` folds unsubscribe replies
//! and bounces from the mailbox back into the recipient table, and `stuck`
//! lists recipients whose send never completed.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mailcast_core::{
    Campaign, Composer, Config, Dispatcher, GmailClient, Mailbox, Pass, Reconciler,
    RecipientStore, SmtpConnector, SqliteRecipientStore, TeraRenderer,
};
use mailcast_oauth::{Authorizer, OAuthClient, Provider, TokenCache};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bulk campaign sender with bounce and unsubscribe reconciliation
#[derive(Parser, Debug)]
#[command(name = "mailcast")]
#[command(about = "Send a campaign and reconcile replies and bounces", long_about = None)]
#[command(version)]
struct Cli {
    /// What to run
    #[arg(value_enum)]
    function: Function,

    /// JSON configuration file (`-` reads standard input)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Function {
    /// Mail every pending recipient
    Send,
    /// Record unsubscribes and bounces found in the mailbox
    Parse,
    /// List recipients left in progress
    Stuck,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Unknown functions exit with status 2 from here.
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailcast=info,mailcast_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.function {
        Function::Send => send(&config).await,
        Function::Parse => parse(&config).await,
        Function::Stuck => stuck(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<SqliteRecipientStore> {
    SqliteRecipientStore::connect(&config.dsn, &config.recipient_table)
        .await
        .with_context(|| format!("opening recipient table {}", config.recipient_table))
}

async fn send(config: &Config) -> Result<()> {
    config.validate_for_send()?;
    let store = open_store(config).await?;
    let templates = [config.html_template.as_str(), config.text_template.as_str()];
    let renderer = TeraRenderer::load(&config.template_root, &templates).with_context(|| {
        format!("loading templates from {}", config.template_root.display())
    })?;
    let composer = Composer::new(renderer, Campaign::from_config(config));
    let connector = SmtpConnector::from_config(config)?;

    let report = Dispatcher::new(&store, &connector, &composer)
        .rotate_after(config.smtp.rotate_after)
        .run()
        .await
        .context("send run aborted")?;

    if report.failed + report.unconfirmed > 0 {
        info!(
            stuck = report.failed + report.unconfirmed,
            "some recipients are left in progress; see `mailcast stuck`"
        );
    }
    Ok(())
}

async fn parse(config: &Config) -> Result<()> {
    config.validate_for_parse()?;
    let store = open_store(config).await?;

    let redirect = if config.oauth.redirect_url.is_empty() {
        format!("http://{}", config.server_bind)
    } else {
        config.oauth.redirect_url.clone()
    };
    let mut client =
        OAuthClient::new(&config.oauth.client_id, Provider::google()?).with_redirect_uri(redirect);
    if !config.oauth.client_secret.is_empty() {
        client = client.with_client_secret(&config.oauth.client_secret);
    }
    let authorizer = Authorizer::new(
        client,
        TokenCache::new(&config.oauth.token_file),
        &config.server_bind,
    );
    authorizer
        .authorize(|url| {
            println!("Open this URL in a browser to authorize mailbox access:\n\n  {url}\n");
        })
        .await
        .context("authorizing mailbox access")?;

    let gmail = GmailClient::new(authorizer, &config.user_id)?;
    for label in gmail.list_labels().await.context("listing labels")? {
        info!(id = %label.id, name = %label.name, "label");
    }

    let passes = [Pass::unsubscribe(config)?, Pass::undeliverable(config)?];
    let reports = Reconciler::new(&store, &gmail)
        .run(&passes)
        .await
        .context("reconcile run aborted")?;

    let unmatched: usize = reports.iter().map(|r| r.unmatched).sum();
    if unmatched > 0 {
        info!(unmatched, "unclassified messages were left in the inbox");
    }
    Ok(())
}

async fn stuck(config: &Config) -> Result<()> {
    config.validate_for_store()?;
    let store = open_store(config).await?;

    let stuck = store.stuck().await?;
    for recipient in &stuck {
        println!(
            "{}\t{}\t{}",
            recipient.id,
            recipient.email.as_deref().unwrap_or("-"),
            recipient.error.as_deref().unwrap_or("-")
        );
    }
    info!(count = stuck.len(), "in-progress recipients");
    Ok(())
}
