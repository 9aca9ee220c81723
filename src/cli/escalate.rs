//! `scrape`, `escalate` and `run` commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use console::style;
use tokio_util::sync::CancellationToken;

use super::helpers::{apply_limit, progress_bar, truncate};
use super::probe::probe_sites;
use crate::config::Settings;
use crate::escalation::{EscalationController, EscalationPool, RunOutcome, RunReport};
use crate::models::WorkItem;
use crate::probe::{read_probe_report, scrape_list, worklist};
use crate::repository::SqliteAttemptStore;
use crate::utils::normalize_url;

pub async fn cmd_escalate(
    settings: &Settings,
    report: &Path,
    limit: usize,
    workers: Option<usize>,
    all: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let records = read_probe_report(report)
        .with_context(|| format!("failed to read probe report {}", report.display()))?;
    let items = apply_limit(worklist(&records, all), limit);

    println!(
        "{} {} of {} sites eligible for escalation",
        style("→").cyan(),
        items.len(),
        records.len()
    );
    let reports = process_items(settings, items, workers, Mode::Escalate, cancel).await?;
    if !reports.is_empty() {
        print_totals(&reports, Mode::Escalate, &settings.database_path());
    }
    Ok(())
}

pub async fn cmd_scrape(
    settings: &Settings,
    report: &Path,
    limit: usize,
    workers: Option<usize>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let records = read_probe_report(report)
        .with_context(|| format!("failed to read probe report {}", report.display()))?;
    let items = apply_limit(scrape_list(&records), limit);

    println!(
        "{} {} of {} sites reachable with a known method",
        style("→").cyan(),
        items.len(),
        records.len()
    );
    let reports = process_items(settings, items, workers, Mode::Scrape, cancel).await?;
    if !reports.is_empty() {
        print_totals(&reports, Mode::Scrape, &settings.database_path());
    }
    Ok(())
}

pub async fn cmd_run(
    settings: &Settings,
    input: &Path,
    limit: usize,
    workers: Option<usize>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let (_, records) = probe_sites(settings, input, limit, None, cancel).await?;
    if cancel.is_cancelled() {
        return Ok(());
    }

    let reachable = scrape_list(&records);
    println!(
        "\n{} {} of {} sites reachable with a known method",
        style("→").cyan(),
        reachable.len(),
        records.len()
    );
    let scraped = process_items(settings, reachable, workers, Mode::Scrape, cancel).await?;
    if !scraped.is_empty() {
        print_totals(&scraped, Mode::Scrape, &settings.database_path());
    }
    if cancel.is_cancelled() {
        return Ok(());
    }

    let items = remaining_worklist(worklist(&records, false), &scraped);
    println!(
        "\n{} {} of {} sites need escalation",
        style("→").cyan(),
        items.len(),
        records.len()
    );
    let escalated = process_items(settings, items, workers, Mode::Escalate, cancel).await?;
    if !escalated.is_empty() {
        print_totals(&escalated, Mode::Escalate, &settings.database_path());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Scrape,
    Escalate,
}

impl Mode {
    fn verb(&self) -> &'static str {
        match self {
            Self::Scrape => "Fetching",
            Self::Escalate => "Escalating",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Scrape => "Scrape summary",
            Self::Escalate => "Escalation summary",
        }
    }
}

/// Drop work items already fetched successfully.
fn remaining_worklist(items: Vec<WorkItem>, done: &[RunReport]) -> Vec<WorkItem> {
    items
        .into_iter()
        .filter(|item| {
            !done
                .iter()
                .any(|r| r.outcome.is_success() && r.url == normalize_url(&item.url))
        })
        .collect()
}

/// Run `items` through the pool and print one line per site.
async fn process_items(
    settings: &Settings,
    items: Vec<WorkItem>,
    workers: Option<usize>,
    mode: Mode,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<RunReport>> {
    if items.is_empty() {
        println!("{} Nothing to do", style("✓").green());
        return Ok(Vec::new());
    }

    let db_path = settings.database_path();
    let store = Arc::new(
        SqliteAttemptStore::new(&db_path)
            .with_context(|| format!("failed to open attempt store {}", db_path.display()))?,
    );
    let controller = Arc::new(EscalationController::from_settings(settings, store));
    let workers = workers.unwrap_or(settings.workers).max(1);

    println!(
        "{} {} {} sites with {} workers (session {})",
        style("→").cyan(),
        mode.verb(),
        items.len(),
        workers,
        controller.session_id()
    );

    let site_delay = match mode {
        Mode::Scrape => settings.scrape_delay,
        Mode::Escalate => settings.site_delay,
    };
    let pb = progress_bar(items.len());
    let pool = EscalationPool::new(controller, workers)
        .with_site_delay(site_delay)
        .with_progress(pb.clone());
    let reports = match mode {
        Mode::Scrape => pool.scrape(items, cancel).await,
        Mode::Escalate => pool.run(items, cancel).await,
    }
    .context("failed to record attempts")?;
    pb.finish_and_clear();

    for report in &reports {
        print_report(report);
    }
    Ok(reports)
}

fn print_report(report: &RunReport) {
    let rows = report.attempts.len();
    match &report.outcome {
        RunOutcome::Succeeded { method, final_url } => println!(
            "  {} {} via {} ({} attempts) -> {}",
            style("✓").green(),
            report.url,
            method,
            rows,
            truncate(final_url, 60)
        ),
        RunOutcome::Relocated { final_url } => println!(
            "  {} {} moved to {} (content not fetched)",
            style("↻").cyan(),
            report.url,
            final_url
        ),
        RunOutcome::Exhausted => {
            let reason = report
                .attempts
                .last()
                .and_then(|a| a.error_message.as_deref())
                .unwrap_or("all strategies failed");
            println!(
                "  {} {} ({})",
                style("✗").red(),
                report.url,
                truncate(reason, 60)
            )
        }
        RunOutcome::Cancelled => {
            println!("  {} {} cancelled", style("!").yellow(), report.url)
        }
    }
}

fn print_totals(reports: &[RunReport], mode: Mode, db_path: &Path) {
    let succeeded = reports.iter().filter(|r| r.outcome.is_success()).count();
    let relocated = reports
        .iter()
        .filter(|r| matches!(r.outcome, RunOutcome::Relocated { .. }))
        .count();
    let failed = reports
        .iter()
        .filter(|r| r.outcome == RunOutcome::Exhausted)
        .count();
    let cancelled = reports
        .iter()
        .filter(|r| r.outcome == RunOutcome::Cancelled)
        .count();

    println!("\n{}", style(mode.title()).bold());
    println!("  Succeeded: {}", succeeded);
    println!("  Relocated: {}", relocated);
    println!("  Failed:    {}", failed);
    if cancelled > 0 {
        println!("  Cancelled: {}", cancelled);
    }

    let mut methods: Vec<(&str, usize)> = Vec::new();
    for report in reports.iter().filter(|r| r.outcome.is_success()) {
        let label = report.outcome.method_label();
        match methods.iter_mut().find(|(m, _)| *m == label) {
            Some((_, count)) => *count += 1,
            None => methods.push((label, 1)),
        }
    }
    if !methods.is_empty() {
        println!("\n{}", style("Successful methods").bold());
        for (method, count) in methods {
            println!("  - {}: {}", method, count);
        }
    }
    println!("\n{} Attempts logged to {}", style("✓").green(), db_path.display());
}
