//! Trading performance over a reporting period
//!
//! Derived from parsed trade and position records: realized and unrealized
//! P&L, costs, win/loss statistics and peak-relative drawdown.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Record, TradeRecord};

/// Performance summary for one period. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_realized_pnl: f64,
    pub total_unrealized_pnl: f64,
    pub total_commissions: f64,
    pub total_fees: f64,
    pub net_pnl: f64,
    /// Fraction of trades with positive realized P&L
    pub win_rate: f64,
    /// Gross profit over gross loss; infinite when nothing was lost
    pub profit_factor: f64,
    /// Largest fall from a positive cumulative P&L peak, as a fraction of the peak
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_winning_trade: f64,
    /// Negative or zero
    pub avg_losing_trade: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl PerformanceMetrics {
    /// All-zero metrics for an empty period
    pub fn empty(period_start: DateTime<Utc>, period_end: DateTime<Utc>) -> Self {
        Self {
            total_realized_pnl: 0.0,
            total_unrealized_pnl: 0.0,
            total_commissions: 0.0,
            total_fees: 0.0,
            net_pnl: 0.0,
            win_rate: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            avg_winning_trade: 0.0,
            avg_losing_trade: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            period_start,
            period_end,
        }
    }
}

fn in_period(trade: &TradeRecord, start: NaiveDate, end: NaiveDate) -> bool {
    match trade.traded_at() {
        Some(at) => (start..=end).contains(&at.date()),
        None => true,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Compute metrics over `records`.
///
/// Trades dated outside `[period_start, period_end]` (compared by calendar
/// day) are ignored; undated trades always count. Position records
/// contribute unrealized P&L only.
pub fn compute_metrics(
    records: &[Record],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> PerformanceMetrics {
    let mut metrics = PerformanceMetrics::empty(period_start, period_end);
    let (start, end) = (period_start.date_naive(), period_end.date_naive());

    let mut trades: Vec<&TradeRecord> = records
        .iter()
        .filter_map(Record::as_trade)
        .filter(|t| in_period(t, start, end))
        .collect();

    metrics.total_unrealized_pnl = records
        .iter()
        .filter_map(Record::as_position)
        .map(|p| p.unrealized_pnl())
        .sum();

    if trades.is_empty() {
        return metrics;
    }

    metrics.total_realized_pnl = trades.iter().map(|t| t.realized_pnl()).sum();
    metrics.total_commissions = trades.iter().map(|t| t.commission_cost()).sum();
    metrics.total_fees = trades.iter().map(|t| t.fee_cost()).sum();
    metrics.net_pnl = metrics.total_realized_pnl - metrics.total_commissions - metrics.total_fees;

    let wins: Vec<f64> = trades
        .iter()
        .map(|t| t.realized_pnl())
        .filter(|pnl| *pnl > 0.0)
        .collect();
    let losses: Vec<f64> = trades
        .iter()
        .map(|t| t.realized_pnl())
        .filter(|pnl| *pnl < 0.0)
        .collect();

    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = -losses.iter().sum::<f64>();

    metrics.total_trades = trades.len();
    metrics.winning_trades = wins.len();
    metrics.losing_trades = losses.len();
    metrics.win_rate = wins.len() as f64 / trades.len() as f64;
    metrics.profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        f64::INFINITY
    };
    metrics.avg_winning_trade = mean(&wins);
    metrics.avg_losing_trade = mean(&losses);
    metrics.largest_win = wins.iter().copied().fold(0.0, f64::max);
    metrics.largest_loss = losses.iter().copied().fold(0.0, f64::min);

    // Stable: undated trades sort first and keep document order
    trades.sort_by_key(|t| t.traded_at());
    metrics.max_drawdown = max_drawdown(trades.iter().map(|t| t.realized_pnl()));

    metrics
}

fn max_drawdown(pnls: impl Iterator<Item = f64>) -> f64 {
    let mut running = 0.0f64;
    let mut peak = 0.0f64;
    let mut max_dd = 0.0f64;

    for pnl in pnls {
        running += pnl;
        peak = peak.max(running);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - running) / peak);
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldValue, PositionRecord};
    use chrono::TimeZone;

    fn trade(date: Option<&str>, pnl: f64, commission: f64) -> Record {
        Record::Trade(TradeRecord {
            trade_date: date.map(str::to_string),
            realized_pnl: Some(FieldValue::Number(pnl)),
            commission: Some(FieldValue::Number(commission)),
            ..Default::default()
        })
    }

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap(),
        )
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        let (start, end) = period();
        let metrics = compute_metrics(&[], start, end);
        assert_eq!(metrics, PerformanceMetrics::empty(start, end));
        assert_eq!(metrics.profit_factor, 0.0);
        assert_eq!(metrics.win_rate, 0.0);
    }

    #[test]
    fn test_one_win_one_loss() {
        let (start, end) = period();
        let records = vec![trade(None, 100.0, 0.0), trade(None, -40.0, 0.0)];
        let metrics = compute_metrics(&records, start, end);

        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.win_rate, 0.5);
        assert_eq!(metrics.profit_factor, 2.5);
        assert_eq!(metrics.net_pnl, 60.0);
        assert_eq!(metrics.avg_losing_trade, -40.0);
        assert_eq!(metrics.largest_win, 100.0);
        assert_eq!(metrics.largest_loss, -40.0);
    }

    #[test]
    fn test_no_losses_gives_infinite_profit_factor() {
        let (start, end) = period();
        let metrics = compute_metrics(&[trade(None, 10.0, -1.5)], start, end);
        assert!(metrics.profit_factor.is_infinite());
        assert_eq!(metrics.total_commissions, 1.5);
        assert_eq!(metrics.net_pnl, 8.5);
    }

    #[test]
    fn test_drawdown_follows_trade_date_order() {
        let (start, end) = period();
        // Chronologically: +100, -50, +20 -> peak 100, trough 50
        let records = vec![
            trade(Some("20240120"), 20.0, 0.0),
            trade(Some("20240105"), 100.0, 0.0),
            trade(Some("20240110"), -50.0, 0.0),
        ];
        let metrics = compute_metrics(&records, start, end);
        assert!((metrics.max_drawdown - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_period_filter_and_unrealized() {
        let (start, end) = period();
        let records = vec![
            trade(Some("20231229"), 500.0, 0.0),
            trade(Some("20240131"), 30.0, 0.0),
            trade(None, -10.0, 0.0),
            Record::Position(PositionRecord {
                unrealized_pnl: Some(FieldValue::Number(12.5)),
                ..Default::default()
            }),
        ];
        let metrics = compute_metrics(&records, start, end);
        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.total_realized_pnl, 20.0);
        assert_eq!(metrics.total_unrealized_pnl, 12.5);
    }
}
