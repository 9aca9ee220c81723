//! `attempts` and `export` commands.

use std::path::Path;

use anyhow::Context;
use console::style;

use super::helpers::truncate;
use crate::config::Settings;
use crate::models::Attempt;
use crate::repository::SqliteAttemptStore;
use crate::utils::normalize_url;

fn open_store(settings: &Settings) -> anyhow::Result<SqliteAttemptStore> {
    let db_path = settings.database_path();
    SqliteAttemptStore::new(&db_path)
        .with_context(|| format!("failed to open attempt store {}", db_path.display()))
}

fn attempt_line(attempt: &Attempt) -> String {
    let mark = if attempt.succeeded {
        style("✓").green()
    } else {
        style("✗").red()
    };
    let detail = if attempt.succeeded {
        truncate(&attempt.title, 50)
    } else {
        truncate(attempt.error_message.as_deref().unwrap_or(""), 50)
    };
    format!(
        "{} #{} {:<36} {:>3} {:>6} ms  {}",
        mark,
        attempt.strategy_ordinal,
        attempt.strategy_name,
        attempt.status_code,
        attempt.load_time_ms,
        detail
    )
}

pub async fn cmd_attempts(
    settings: &Settings,
    url: Option<String>,
    limit: usize,
) -> anyhow::Result<()> {
    let store = open_store(settings)?;

    let Some(url) = url else {
        let attempts = store.recent(limit)?;
        if attempts.is_empty() {
            println!("{} No attempts recorded yet", style("!").yellow());
            return Ok(());
        }
        println!(
            "{} {} most recent attempts ({} total)",
            style("→").cyan(),
            attempts.len(),
            store.count()?
        );
        for attempt in &attempts {
            println!(
                "{}  {}  {}",
                attempt.scraped_at.format("%Y-%m-%d %H:%M:%S"),
                truncate(&attempt.url, 40),
                attempt_line(attempt)
            );
        }
        return Ok(());
    };

    let url = normalize_url(&url);
    let runs = store.runs_for(&url)?;
    if runs.is_empty() {
        println!("{} No attempts recorded for {}", style("!").yellow(), url);
        return Ok(());
    }
    for run in &runs {
        let started = run
            .started_at()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "\n{} {} ({}) final: {}",
            style("Session").bold(),
            run.session_id,
            started,
            run.final_method()
        );
        for attempt in &run.attempts {
            println!("  {}", attempt_line(attempt));
        }
    }
    Ok(())
}

pub async fn cmd_export(settings: &Settings, output: &Path) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let count = store
        .export_csv(output)
        .with_context(|| format!("failed to export to {}", output.display()))?;
    println!(
        "{} Exported {} attempts to {}",
        style("✓").green(),
        count,
        output.display()
    );
    Ok(())
}
