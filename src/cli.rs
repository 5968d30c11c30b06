use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;

use crate::analytics::PerformanceMetrics;
use crate::domain::{
    ConnectionHealth, HealthCheckResult, HealthSummary, JobHandle, JobStatus, RecordSet,
    ReportKind,
};

/// Records printed by `fetch` before the listing is truncated
const PREVIEW_ROWS: usize = 10;

#[derive(Parser)]
#[command(name = "flexmon")]
#[command(version = "0.1.0")]
#[command(about = "Broker report jobs and connection health monitoring", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml, then <FLEXMON_ENV>.toml)
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit the configured query for a report kind (trades, positions, cash)
    Execute {
        kind: ReportKind,
        /// Wait for the statement and print it
        #[arg(long)]
        wait: bool,
        /// Maximum wait in seconds
        #[arg(long)]
        max_wait: Option<u64>,
    },
    /// Fetch a statement by reference code
    Fetch {
        reference: String,
        /// Poll until the statement is ready
        #[arg(long)]
        wait: bool,
        /// Maximum wait in seconds
        #[arg(long)]
        max_wait: Option<u64>,
    },
    /// Compute performance metrics for a statement
    Metrics {
        reference: String,
        /// Period start (YYYY-MM-DD), default 90 days before end
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Period end (YYYY-MM-DD), default today
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Maximum wait in seconds
        #[arg(long)]
        max_wait: Option<u64>,
    },
    /// Run one forced health check round
    Health {
        /// Only check this target
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Run the HTTP API and health monitor until Ctrl+C
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn health_color(health: ConnectionHealth) -> &'static str {
    match health {
        ConnectionHealth::Healthy => "\x1b[32m",
        ConnectionHealth::Degraded => "\x1b[33m",
        ConnectionHealth::Unhealthy => "\x1b[31m",
        ConnectionHealth::Unknown => "\x1b[90m",
    }
}

pub fn print_job(handle: &JobHandle) {
    match handle.status {
        JobStatus::Failed => {
            println!("\x1b[31m✗ Job {} failed\x1b[0m", handle.job_id);
            if let Some(err) = &handle.error_message {
                println!("    Error: {}", err);
            }
        }
        status => {
            println!("\x1b[32m✓ Job {} {}\x1b[0m", handle.job_id, status);
            if let Some(reference) = &handle.reference {
                println!("    Reference: {}", reference);
            }
        }
    }
}

pub fn print_records(records: &RecordSet) {
    println!(
        "\n  {} {} records{}\n",
        records.total_records,
        records.data_type,
        records
            .reference
            .as_deref()
            .map(|r| format!(" (reference {})", r))
            .unwrap_or_default()
    );

    for (i, record) in records.records.iter().take(PREVIEW_ROWS).enumerate() {
        let fields = record
            .fields()
            .into_iter()
            .map(|(k, v)| match v.as_f64() {
                Some(n) => format!("{}={}", k, n),
                None => format!("{}={}", k, v.as_str().unwrap_or_default()),
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!("  {}. {}", i + 1, fields);
    }

    if records.total_records > PREVIEW_ROWS {
        println!("  ... {} more", records.total_records - PREVIEW_ROWS);
    }
    println!();
}

pub fn print_metrics(metrics: &PerformanceMetrics) {
    println!(
        "\n  Period: {} .. {}",
        metrics.period_start.date_naive(),
        metrics.period_end.date_naive()
    );
    println!(
        "  Trades: {} ({} won, {} lost)",
        metrics.total_trades, metrics.winning_trades, metrics.losing_trades
    );
    println!("  Realized P&L:   {:>12.2}", metrics.total_realized_pnl);
    println!("  Unrealized P&L: {:>12.2}", metrics.total_unrealized_pnl);
    println!("  Commissions:    {:>12.2}", metrics.total_commissions);
    println!("  Fees:           {:>12.2}", metrics.total_fees);
    println!("  Net P&L:        {:>12.2}", metrics.net_pnl);
    println!("  Win rate:       {:>11.1}%", metrics.win_rate * 100.0);
    if metrics.profit_factor.is_infinite() {
        println!("  Profit factor:  {:>12}", "inf");
    } else {
        println!("  Profit factor:  {:>12.2}", metrics.profit_factor);
    }
    println!("  Max drawdown:   {:>11.1}%", metrics.max_drawdown * 100.0);
    println!(
        "  Avg win/loss:   {:.2} / {:.2}",
        metrics.avg_winning_trade, metrics.avg_losing_trade
    );
    println!(
        "  Largest win/loss: {:.2} / {:.2}\n",
        metrics.largest_win, metrics.largest_loss
    );
}

pub fn print_health(results: &BTreeMap<String, HealthCheckResult>, summary: &HealthSummary) {
    if results.is_empty() {
        println!("  No health targets configured.\n");
        return;
    }

    for (id, result) in results {
        println!(
            "  {}{:<10}\x1b[0m {}",
            health_color(result.health),
            result.health.to_string(),
            id
        );
        if let Some(err) = &result.error {
            println!("      error: {}", err);
        }
        for (name, check) in &result.details {
            let mark = if check.success { "ok" } else { "FAIL" };
            let latency = check
                .latency_ms
                .map(|ms| format!(" {:.0}ms", ms))
                .unwrap_or_default();
            let warning = if check.quality_warning { " (warning)" } else { "" };
            println!("      {:<18} {}{}{}", name, mark, latency, warning);
        }
    }

    println!(
        "\n  Overall: {}{}\x1b[0m ({}/{} healthy)",
        health_color(summary.overall),
        summary.overall,
        summary.healthy_targets,
        summary.total_targets
    );
    for rec in &summary.recommendations {
        println!("  - {}", rec);
    }
    println!();
}
