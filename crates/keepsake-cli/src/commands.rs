use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use colored::Colorize;
use keepsake_storage::{
    EnvelopeMeta, FileStorage, Snapshot, StorageAdapter, StorageBackend, METADATA_FIELD,
};
use keepsake_sync::{PersistDefaults, StorageOptions};
use serde_json::Value;
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let defaults = load_defaults(cli.config.as_deref())?;
    let storage = Arc::new(
        FileStorage::open(&cli.dir)
            .await
            .with_context(|| format!("cannot open storage directory {}", cli.dir.display()))?,
    );
    debug!(dir = %cli.dir.display(), "storage opened");

    let output = match cli.command {
        Command::List => cmd_list(&storage, cli.format).await?,
        Command::Get(args) => cmd_get(&storage, &args.name, cli.format).await?,
        Command::Show(args) => cmd_show(&storage, &defaults, args, cli.format).await?,
        Command::Set(args) => cmd_set(&storage, &defaults, args).await?,
        Command::Remove(args) => cmd_remove(&storage, &args.name).await?,
    };
    println!("{output}");
    Ok(())
}

fn load_defaults(path: Option<&Path>) -> anyhow::Result<PersistDefaults> {
    let Some(path) = path else {
        return Ok(PersistDefaults::default());
    };
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    PersistDefaults::from_toml_str(&source)
        .with_context(|| format!("invalid config {}", path.display()))
}

/// Adapter over `storage` with CLI flags layered on the configured defaults.
fn adapter(
    storage: &Arc<FileStorage>,
    defaults: &PersistDefaults,
    overrides: StorageOptions,
) -> StorageAdapter {
    let backend: Arc<dyn StorageBackend> = Arc::clone(storage) as Arc<dyn StorageBackend>;
    let options = overrides
        .merged_over(&defaults.storage)
        .with_storage(backend)
        .to_adapter_options();
    StorageAdapter::new(options)
}

async fn cmd_list(storage: &FileStorage, format: OutputFormat) -> anyhow::Result<String> {
    let keys = storage.keys().await?;
    Ok(match format {
        OutputFormat::Json => serde_json::to_string(&keys)?,
        OutputFormat::Text if keys.is_empty() => "No stored entries.".dimmed().to_string(),
        OutputFormat::Text => keys
            .iter()
            .map(|k| format!("  {}", k.yellow()))
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

async fn cmd_get(storage: &FileStorage, name: &str, format: OutputFormat) -> anyhow::Result<String> {
    let raw = storage
        .get_item(name)
        .await?
        .with_context(|| format!("no entry named {name}"))?;
    let text = match &raw {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    if format == OutputFormat::Json {
        return Ok(text);
    }

    let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::String(text.clone()));
    let meta = match &parsed {
        Value::Object(map) => EnvelopeMeta::from_stored(map.get(METADATA_FIELD)),
        _ => EnvelopeMeta::default(),
    };
    let mut lines = vec![format!("{} {}", "entry".bold(), name.yellow())];
    if let Some(version) = meta.version {
        lines.push(format!("  version: {}", version.to_string().cyan()));
    }
    if let Some(ts) = meta.expire_in_timestamp {
        let status = if meta.is_expired(Utc::now().timestamp_millis()) {
            "expired".red()
        } else {
            "live".green()
        };
        lines.push(format!("  expires: {} ({status})", format_millis(ts)));
    }
    lines.push(text);
    Ok(lines.join("\n"))
}

async fn cmd_show(
    storage: &Arc<FileStorage>,
    defaults: &PersistDefaults,
    args: ShowArgs,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let overrides = StorageOptions {
        version: args.version,
        remove_on_expiration: args.keep_expired.then_some(false),
        ..StorageOptions::default()
    };
    let data = adapter(storage, defaults, overrides).get_item(&args.name).await;
    render_snapshot(&args.name, &data, format)
}

async fn cmd_set(
    storage: &Arc<FileStorage>,
    defaults: &PersistDefaults,
    args: SetArgs,
) -> anyhow::Result<String> {
    let data = parse_snapshot(&args.data)?;
    let overrides = StorageOptions {
        expire_in: args.expire_in,
        version: args.version,
        ..StorageOptions::default()
    };
    adapter(storage, defaults, overrides)
        .set_item(&args.name, data)
        .await
        .with_context(|| format!("failed to write {}", args.name))?;
    Ok(format!("{} Stored {}", "✓".green().bold(), args.name.yellow()))
}

async fn cmd_remove(storage: &FileStorage, name: &str) -> anyhow::Result<String> {
    storage.remove_item(name).await?;
    Ok(format!("{} Removed {}", "✓".green().bold(), name.yellow()))
}

fn parse_snapshot(text: &str) -> anyhow::Result<Snapshot> {
    match serde_json::from_str::<Value>(text).context("data is not valid JSON")? {
        Value::Object(map) if map.contains_key(METADATA_FIELD) => {
            anyhow::bail!("{METADATA_FIELD} is reserved")
        }
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("data must be a JSON object, got {other}"),
    }
}

fn render_snapshot(name: &str, data: &Snapshot, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(data)?);
    }
    if data.is_empty() {
        return Ok(format!("{} {}", name.yellow(), "(empty)".dimmed()));
    }
    let mut lines = vec![name.yellow().bold().to_string()];
    for (key, value) in data {
        lines.push(format!("  {}: {value}", key.cyan()));
    }
    Ok(lines.join("\n"))
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
