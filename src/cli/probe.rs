//! `probe` command.

use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;
use tokio_util::sync::CancellationToken;

use super::helpers::{apply_limit, truncate};
use crate::config::Settings;
use crate::models::{ProbeRecord, ProbeResult};
use crate::probe::{
    default_report_path, load_urls, write_probe_report, ProbeSummary, SiteProbe, SiteProber,
};

pub async fn cmd_probe(
    settings: &Settings,
    input: &Path,
    limit: usize,
    output: Option<PathBuf>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    probe_sites(settings, input, limit, output, cancel).await?;
    Ok(())
}

/// Probe every URL in `input`, write the report, print a summary.
/// Returns the report path and rows.
pub async fn probe_sites(
    settings: &Settings,
    input: &Path,
    limit: usize,
    output: Option<PathBuf>,
    cancel: &CancellationToken,
) -> anyhow::Result<(PathBuf, Vec<ProbeRecord>)> {
    let urls = load_urls(input).with_context(|| format!("failed to load URLs from {}", input.display()))?;
    let urls = apply_limit(urls, limit);
    if urls.is_empty() {
        anyhow::bail!("no URLs found in {}", input.display());
    }

    println!(
        "{} Probing {} sites from {}",
        style("→").cyan(),
        urls.len(),
        input.display()
    );

    let prober = SiteProber::from_settings(settings);
    let total = urls.len();
    let probes = prober
        .probe_all(&urls, settings.probe_delay, cancel, |i, probe| {
            print_probe(i + 1, total, probe)
        })
        .await;

    let records: Vec<ProbeRecord> = probes.iter().map(SiteProbe::record).collect();
    let path = output.unwrap_or_else(|| default_report_path(&settings.reports_dir));
    write_probe_report(&records, &path)
        .with_context(|| format!("failed to write report {}", path.display()))?;

    print_summary(&records, &path);
    Ok((path, records))
}

fn access_line(label: &str, probe: &ProbeResult) -> String {
    if probe.succeeded {
        format!(
            "  {} {} {} ({} ms)",
            style("✓").green(),
            label,
            probe.status_code,
            probe.load_time_ms
        )
    } else {
        format!(
            "  {} {} {}",
            style("✗").red(),
            label,
            probe.error_message.as_deref().unwrap_or("failed")
        )
    }
}

fn print_probe(position: usize, total: usize, probe: &SiteProbe) {
    println!("\n[{}/{}] {}", position, total, style(&probe.url).bold());
    println!("{}", access_line("HTTP", &probe.plain));
    println!("{}", access_line("Browser", &probe.rendered));
    if probe.rendered.bot_detected {
        println!("  {} Bot detection present", style("!").yellow());
    }
    if !probe.plain.title.is_empty() {
        println!("  Title: {}", truncate(&probe.plain.title, 60));
    }
    println!(
        "  {} Recommended: {}",
        style("→").cyan(),
        probe.recommendation.recommended_method
    );
    for note in &probe.recommendation.notes {
        println!("    - {}", note);
    }
}

fn print_summary(records: &[ProbeRecord], path: &Path) {
    let summary = ProbeSummary::from_records(records);
    println!("\n{}", style("Probe summary").bold());
    println!(
        "  Accessible via HTTP:    {}/{}",
        summary.request_accessible, summary.total
    );
    println!(
        "  Accessible via browser: {}/{}",
        summary.browser_accessible, summary.total
    );
    println!(
        "  Bot detection present:  {}/{}",
        summary.bot_detected, summary.total
    );
    println!("\n{}", style("Recommended methods").bold());
    for (method, count) in &summary.methods {
        println!("  - {}: {} sites", method, count);
    }
    println!("\n{} Report written to {}", style("✓").green(), path.display());
}
