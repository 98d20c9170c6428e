use crate::Target;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use parley_application::{ConversationHistory, HistoryKey};
use parley_core::content::ContentItem;
use parley_core::history::NoopResolver;
use parley_core::message::{MessageEnvelope, MessageRecord};
use parley_infrastructure::{ConfigService, ParleyPaths};
use serde::Serialize;
use std::sync::Arc;

/// Opens the history selected on the command line.
pub async fn open(target: &Target) -> Result<ConversationHistory> {
    let paths = ParleyPaths::new(target.base_dir.clone());
    let config_service = match &target.config {
        Some(path) => ConfigService::new(path.clone()),
        None => ConfigService::from_paths(&paths).context("Failed to locate config directory")?,
    };
    tracing::debug!("[Cli] Using config {}", config_service.path().display());
    let config = config_service.get_config().history;
    let key = HistoryKey::new(target.workspace.clone(), target.project.clone());

    ConversationHistory::open(key.clone(), &paths, &config, Arc::new(NoopResolver))
        .await
        .with_context(|| format!("Failed to open history for {}", key))
}

pub async fn latest(history: &ConversationHistory, count: usize, raw: bool) -> Result<()> {
    let records = history.get_latest(count).await?;
    print_records(history, records, raw)
}

pub async fn before(
    history: &ConversationHistory,
    message_id: &str,
    count: usize,
    date: Option<NaiveDate>,
    raw: bool,
) -> Result<()> {
    let records = history.get_before(message_id, count, date).await?;
    print_records(history, records, raw)
}

pub async fn after(
    history: &ConversationHistory,
    message_id: &str,
    count: usize,
    date: Option<NaiveDate>,
    raw: bool,
) -> Result<()> {
    let records = history.get_after(message_id, count, date).await?;
    print_records(history, records, raw)
}

pub async fn around(
    history: &ConversationHistory,
    message_id: &str,
    before: usize,
    after: usize,
    date: Option<NaiveDate>,
    raw: bool,
) -> Result<()> {
    if raw {
        let window = history.get_around(message_id, before, after, date).await?;
        print_json(&window)
    } else {
        let window = history.messages_around(message_id, before, after, date).await?;
        print_json(&window)
    }
}

pub async fn by_date(history: &ConversationHistory, date: NaiveDate, raw: bool) -> Result<()> {
    let records = history.get_by_date(date).await?;
    print_records(history, records, raw)
}

pub async fn dates(history: &ConversationHistory) -> Result<()> {
    let dates: Vec<String> = history
        .list_dates()
        .await?
        .into_iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();
    print_json(&dates)
}

pub struct AppendArgs {
    pub message_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content_id: String,
    pub text: String,
    pub append_mode: bool,
}

pub async fn append(history: &ConversationHistory, args: AppendArgs) -> Result<()> {
    let envelope = MessageEnvelope::new(args.message_id, args.sender_id, args.sender_name);
    let delta = [ContentItem::text(args.content_id, args.text)];

    let record = history
        .append_record(&envelope, &delta, args.append_mode)
        .await
        .context("Failed to append to history")?;
    print_json(&record)
}

fn print_records(
    history: &ConversationHistory,
    records: Vec<MessageRecord>,
    raw: bool,
) -> Result<()> {
    if raw {
        print_json(&records)
    } else {
        print_json(&history.to_messages(records))
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
