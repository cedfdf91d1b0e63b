// bridgeportal — operator CLI for the portal draft & retry store
//
// Works against a sled-backed copy of the store, so support staff can inspect
// drafts, clean up expired ones and nurse the retry queue.

mod config;

use anyhow::{Context, Result};
use bridgeportal_core::{
    ContactEdits, DraftManager, DraftRecord, FieldMap, NewRetryItem, RetryItem, RetryKind,
    SledStorage, TokioTimerDriver,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "bridgeportal")]
#[command(about = "BridgePortal — draft and retry store tooling", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and edit per-account drafts
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },
    /// Inspect and manage the failed-write retry queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DraftAction {
    /// Show the live draft for an account
    Show { account: String },
    /// Save a draft immediately
    Save {
        account: String,
        /// Company fields as a JSON object
        #[arg(long)]
        company: Option<String>,
        /// Contact fields as ID=JSON, repeatable
        #[arg(long = "contact")]
        contacts: Vec<String>,
    },
    /// Save through the debounced autosave path
    Autosave {
        account: String,
        #[arg(long)]
        company: Option<String>,
        #[arg(long = "contact")]
        contacts: Vec<String>,
    },
    /// Delete the draft for an account
    Clear { account: String },
    /// List accounts holding a live draft
    List,
    /// Remove expired and unreadable drafts
    Purge,
}

#[derive(Subcommand)]
enum QueueAction {
    /// Show every queued write
    List,
    /// Queue a failed write
    Add {
        /// company | contact
        kind: RetryKind,
        account: String,
        #[arg(long)]
        contact_id: Option<String>,
        /// Payload as JSON
        #[arg(long)]
        data: String,
    },
    /// Drop a queued write
    Remove { id: String },
    /// Writes due for a retry now
    Retryable,
    /// Writes that used up their retries
    Exhausted,
    /// Record the outcome of a retry attempt
    Mark {
        id: String,
        #[arg(long, conflicts_with = "failed", required_unless_present = "failed")]
        success: bool,
        #[arg(long)]
        failed: bool,
    },
    /// Empty the queue
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let _log_guard = init_logging(&config)?;

    match cli.command {
        Commands::Draft { action } => cmd_draft(&config, action).await,
        Commands::Queue { action } => cmd_queue(&config, action).await,
        Commands::Config { action } => cmd_config(config, action).await,
    }
}

fn init_logging(config: &config::Config) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            let appender = tracing_appender::rolling::daily(dir, "bridgeportal.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn open_store(config: &config::Config) -> Result<DraftManager> {
    let path = config.storage_path()?;
    tracing::debug!("Opening store at {}", path.display());
    let storage = SledStorage::open(&path)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    let timers =
        TokioTimerDriver::current().context("Autosave timers need a running tokio runtime")?;
    let manager = DraftManager::with_config(
        Arc::new(storage),
        Arc::new(timers),
        Arc::new(bridgeportal_core::SystemClock),
        config.store.clone(),
    )?;
    Ok(manager)
}

fn parse_object(raw: &str, what: &str) -> Result<FieldMap> {
    let value: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", what))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} must be a JSON object", what),
    }
}

fn parse_edits(
    company: Option<String>,
    contacts: Vec<String>,
) -> Result<(Option<FieldMap>, Option<ContactEdits>)> {
    let company = company
        .as_deref()
        .map(|raw| parse_object(raw, "--company"))
        .transpose()?;

    let mut edits = ContactEdits::new();
    for entry in &contacts {
        let (id, raw) = entry
            .split_once('=')
            .with_context(|| format!("Expected ID=JSON, got {}", entry))?;
        edits.insert(id.to_string(), parse_object(raw, "--contact")?);
    }
    let contacts = if edits.is_empty() { None } else { Some(edits) };

    Ok((company, contacts))
}

fn ensure_saved(manager: &DraftManager, account: &str) -> Result<()> {
    if !manager.has_draft(account) {
        anyhow::bail!("Draft for {} could not be saved (see log)", account);
    }
    Ok(())
}

fn format_millis(ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms as i64)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn print_draft(account: &str, draft: &DraftRecord) -> Result<()> {
    println!("{} {}", "Draft for".bold(), account.bright_cyan());
    println!("  Saved:    {}", format_millis(draft.timestamp));

    match &draft.company {
        Some(company) => println!(
            "  Company:  {}",
            serde_json::to_string_pretty(company)?.bright_yellow()
        ),
        None => println!("  Company:  {}", "(no edits)".dimmed()),
    }

    match &draft.contacts {
        Some(contacts) if !contacts.is_empty() => {
            println!("  Contacts:");
            for (id, fields) in contacts {
                println!(
                    "    {} {}",
                    id.bright_cyan(),
                    serde_json::to_string(fields)?
                );
            }
        }
        _ => println!("  Contacts: {}", "(no edits)".dimmed()),
    }
    Ok(())
}

fn print_items(items: &[RetryItem], max_retries: u32) {
    for item in items {
        let target = item.contact_id.as_deref().unwrap_or("company");
        let attempts = format!("{}/{}", item.retry_count, max_retries);
        let attempts = if item.retry_count >= max_retries {
            attempts.bright_red()
        } else {
            attempts.normal()
        };
        println!("  {} {}", "•".bright_green(), item.id.bright_cyan());
        println!(
            "    {} {} / {}  attempts {}",
            item.kind, item.account_id, target, attempts
        );
        if item.last_attempt > 0 {
            println!("    last attempt {}", format_millis(item.last_attempt).dimmed());
        }
    }
}

async fn cmd_draft(config: &config::Config, action: DraftAction) -> Result<()> {
    let manager = open_store(config)?;

    match action {
        DraftAction::Show { account } => match manager.load_draft(&account) {
            Some(draft) => print_draft(&account, &draft)?,
            None => println!("{}", format!("No live draft for {}", account).dimmed()),
        },

        DraftAction::Save {
            account,
            company,
            contacts,
        } => {
            let (company, contacts) = parse_edits(company, contacts)?;
            manager.save_draft(&account, company, contacts);
            ensure_saved(&manager, &account)?;
            println!("{} Draft saved for {}", "✓".green(), account.bright_cyan());
        }

        DraftAction::Autosave {
            account,
            company,
            contacts,
        } => {
            let (company, contacts) = parse_edits(company, contacts)?;
            let delay = Duration::from_millis(manager.config().autosave_delay_ms);
            manager.schedule_auto_save(&account, company, contacts);
            println!(
                "  Autosave pending for {} ({} ms)...",
                account.bright_cyan(),
                delay.as_millis()
            );

            while manager.has_pending_auto_save(&account) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            ensure_saved(&manager, &account)?;
            println!("{} Draft saved for {}", "✓".green(), account.bright_cyan());
        }

        DraftAction::Clear { account } => {
            manager.clear_draft(&account);
            println!("{} Draft cleared for {}", "✓".green(), account.bright_cyan());
        }

        DraftAction::List => {
            let accounts = manager.draft_accounts();
            if accounts.is_empty() {
                println!("{}", "No drafts.".dimmed());
            } else {
                println!("{} ({} total)", "Drafts".bold(), accounts.len());
                for account in accounts {
                    let saved = manager
                        .load_draft(&account)
                        .map(|d| format_millis(d.timestamp))
                        .unwrap_or_default();
                    println!("  {} {}  {}", "•".bright_green(), account.bright_cyan(), saved.dimmed());
                }
            }
        }

        DraftAction::Purge => {
            let removed = manager.purge_expired_drafts();
            println!("{} Removed {} stale draft(s)", "✓".green(), removed);
        }
    }

    manager.flush();
    Ok(())
}

async fn cmd_queue(config: &config::Config, action: QueueAction) -> Result<()> {
    let manager = open_store(config)?;
    let max_retries = manager.config().retry.max_retries;

    match action {
        QueueAction::List => {
            let items = manager.get_retry_queue();
            if items.is_empty() {
                println!("{}", "Retry queue is empty.".dimmed());
            } else {
                println!("{} ({} total)", "Retry queue".bold(), items.len());
                print_items(&items, max_retries);
            }
        }

        QueueAction::Add {
            kind,
            account,
            contact_id,
            data,
        } => {
            if kind == RetryKind::Contact && contact_id.is_none() {
                anyhow::bail!("Contact retries need --contact-id");
            }
            let data: serde_json::Value =
                serde_json::from_str(&data).context("--data is not valid JSON")?;
            let item = NewRetryItem {
                kind,
                account_id: account,
                contact_id,
                data,
            };
            let id = manager
                .add_to_retry_queue(item)
                .context("Retry item could not be queued (see log)")?;
            println!("{} Queued {}", "✓".green(), id.bright_cyan());
        }

        QueueAction::Remove { id } => {
            manager.remove_from_retry_queue(&id);
            println!("{} Removed {}", "✓".green(), id);
        }

        QueueAction::Retryable => {
            let items = manager.get_retryable_items();
            println!("{} ({} due)", "Retryable".bold(), items.len());
            print_items(&items, max_retries);
        }

        QueueAction::Exhausted => {
            let items = manager.exhausted_retry_items();
            println!("{} ({} total)", "Exhausted".bold(), items.len());
            print_items(&items, max_retries);
        }

        QueueAction::Mark { id, success, .. } => {
            manager.mark_retry_attempt(&id, success);
            let outcome = if success {
                "delivered".green()
            } else {
                "failed".yellow()
            };
            println!("{} Marked {} as {}", "✓".green(), id.bright_cyan(), outcome);
        }

        QueueAction::Clear => {
            manager.clear_retry_queue();
            println!("{} Retry queue cleared", "✓".green());
        }
    }

    manager.flush();
    Ok(())
}

async fn cmd_config(mut config: config::Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                println!("{} = {}", key.bright_cyan(), "(unset)".dimmed());
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();
            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
            println!();
            println!("  Config file: {}", config::Config::config_file()?.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edits() {
        let (company, contacts) = parse_edits(
            Some(r#"{"englishName": "Acme"}"#.to_string()),
            vec![r#"c9={"email": "a=b@acme.example"}"#.to_string()],
        )
        .unwrap();

        assert_eq!(company.unwrap()["englishName"], "Acme");
        let contacts = contacts.unwrap();
        assert_eq!(contacts["c9"]["email"], "a=b@acme.example");
    }

    #[test]
    fn test_parse_edits_rejects_bad_input() {
        assert!(parse_edits(Some("[1, 2]".to_string()), vec![]).is_err());
        assert!(parse_edits(None, vec!["c9".to_string()]).is_err());
        assert!(parse_edits(None, vec!["c9={".to_string()]).is_err());

        let (company, contacts) = parse_edits(None, vec![]).unwrap();
        assert!(company.is_none() && contacts.is_none());
    }

    #[test]
    fn test_cli_parses_queue_mark() {
        let cli = Cli::try_parse_from(["bridgeportal", "queue", "mark", "abc", "--failed"]).unwrap();
        match cli.command {
            Commands::Queue {
                action: QueueAction::Mark { id, success, failed },
            } => {
                assert_eq!(id, "abc");
                assert!(!success && failed);
            }
            _ => panic!("Wrong command"),
        }

        assert!(Cli::try_parse_from(["bridgeportal", "queue", "mark", "abc"]).is_err());
    }

    struct IdleDriver;

    struct IdleHandle;

    impl bridgeportal_core::TimerHandle for IdleHandle {
        fn cancel(self: Box<Self>) {}
    }

    impl bridgeportal_core::TimerDriver for IdleDriver {
        fn arm(
            &self,
            _delay: Duration,
            _task: bridgeportal_core::TimerTask,
        ) -> Box<dyn bridgeportal_core::TimerHandle> {
            Box::new(IdleHandle)
        }
    }

    #[test]
    fn test_ensure_saved_reports_failed_write() {
        let manager = DraftManager::new(
            Arc::new(bridgeportal_core::MemoryStorage::with_quota(8)),
            Arc::new(IdleDriver),
        );
        manager.save_draft("acc-1", None, None);
        assert!(ensure_saved(&manager, "acc-1").is_err());

        let manager = DraftManager::new(
            Arc::new(bridgeportal_core::MemoryStorage::new()),
            Arc::new(IdleDriver),
        );
        manager.save_draft("acc-1", None, None);
        assert!(ensure_saved(&manager, "acc-1").is_ok());
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01 00:00:00");
    }
}
