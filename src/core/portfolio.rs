//! Aggregates single-position simulations into one portfolio frame.
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, prelude::*};
use rust_finprim::rate::cagr;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::config::{Costs, Position};
use super::inflation::{DAYS_PER_YEAR, InflationModel};
use super::series::{PriceSeries, calendar};
use super::simulation::{FrameRow, InflationInput, NEAR_ZERO, SimulationFrame, simulate_position};

/// How many days before its first row a position's values may be carried back.
pub const BACKFILL_LIMIT_DAYS: i64 = 5;

// Above this the Decimal power series is no longer trustworthy.
const DECIMAL_CAGR_LIMIT_PCT: f64 = 1e6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPosition {
    pub name: String,
    pub identifier: String,
    pub reason: String,
}

/// Outcome of a historical portfolio run.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSimulation {
    pub frame: SimulationFrame,
    /// Realized annualized return in percent, by position name. Positions
    /// whose return is undefined are absent.
    pub annualized_returns: BTreeMap<String, f64>,
    /// Final nominal value by position name.
    pub final_values: BTreeMap<String, f64>,
    pub skipped: Vec<SkippedPosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistorySummary {
    pub total_contribution: f64,
    pub final_nominal: f64,
    pub final_real: f64,
    pub profit_loss: f64,
    pub absolute_return_pct: f64,
}

impl PortfolioSimulation {
    pub fn summary(&self) -> Option<HistorySummary> {
        let last = self.frame.last()?;
        let absolute_return_pct = if last.contribution > 0.0 {
            (last.nominal / last.contribution - 1.0) * 100.0
        } else {
            0.0
        };
        Some(HistorySummary {
            total_contribution: last.contribution,
            final_nominal: last.nominal,
            final_real: last.real,
            profit_loss: last.nominal - last.contribution,
            absolute_return_pct,
        })
    }
}

/// Simulates every position with a schedule over `[start, end]` and sums the
/// results on one daily calendar.
///
/// `prices` holds the outcome of the price lookup per identifier. Positions
/// whose lookup failed, is missing or yields nothing to simulate are reported
/// in `skipped`. Returns `None` when no position could be simulated.
pub fn simulate_portfolio(
    positions: &[Position],
    prices: &HashMap<String, Result<PriceSeries>>,
    start: NaiveDate,
    end: NaiveDate,
    costs: &Costs,
    inflation: &InflationModel,
) -> Option<PortfolioSimulation> {
    let days = calendar(start, end);
    if days.is_empty() {
        return None;
    }
    let inflation_series = inflation.factor_series(start, end);

    let mut frames = Vec::new();
    let mut realized_returns = Vec::new();
    let mut final_values = BTreeMap::new();
    let mut skipped = Vec::new();

    for position in positions.iter().filter(|p| p.has_schedule()) {
        let name = position.display_name().to_string();
        let mut skip = |reason: String| {
            warn!("Skipping position {}: {}", name, reason);
            skipped.push(SkippedPosition {
                name: name.clone(),
                identifier: position.identifier.clone(),
                reason,
            });
        };

        let series = match prices.get(&position.identifier) {
            Some(Ok(series)) => series.between(start, end),
            Some(Err(e)) => {
                skip(format!("{e:#}"));
                continue;
            }
            None => {
                skip("no price data requested".to_string());
                continue;
            }
        };
        if series.is_empty() {
            skip(format!("no prices between {start} and {end}"));
            continue;
        }

        let frame = simulate_position(
            &series,
            position.periodic_amount,
            position.lump_sum,
            position.interval,
            InflationInput::Series(&inflation_series),
            costs,
        );
        let (Some(first), Some(last)) = (frame.first(), frame.last()) else {
            skip("position never holds a positive value".to_string());
            continue;
        };

        match realized_return_pct(first, last, position.lump_sum) {
            Some(rate) => realized_returns.push((name.clone(), rate, last.nominal)),
            None => debug!("Annualized return of {} is undefined", name),
        }
        *final_values.entry(name.clone()).or_insert(0.0) += last.nominal;

        // Rows dropped before the first purchase are not a price gap.
        let backfill = series.first().map(|(date, _)| date) == Some(first.date);
        frames.push((frame, backfill));
    }
    let annualized_returns = combine_returns(realized_returns);

    if frames.is_empty() {
        warn!("No position could be simulated");
        return None;
    }

    let mut rows: Vec<FrameRow> = days
        .iter()
        .map(|&date| FrameRow {
            date,
            contribution: 0.0,
            nominal: 0.0,
            real: 0.0,
        })
        .collect();
    for (frame, backfill) in &frames {
        for (total, aligned) in rows.iter_mut().zip(align_to_calendar(frame, &days, *backfill)) {
            total.contribution += aligned.contribution;
            total.nominal += aligned.nominal;
            total.real += aligned.real;
        }
    }

    let basis = match rows.first() {
        Some(first) if first.nominal > NEAR_ZERO && first.real > NEAR_ZERO => {
            first.nominal / first.real
        }
        _ => 1.0,
    };

    let mut custody_total = 0.0;
    for i in 0..rows.len() {
        if i > 0 && rows[i].date.year() != rows[i - 1].date.year() {
            custody_total += costs.custody_fee;
        }
        let row = &mut rows[i];
        row.nominal = (row.nominal - custody_total).max(0.0);
        row.real = row.nominal / (inflation_series.factor_on(row.date) * basis);
    }

    Some(PortfolioSimulation {
        frame: SimulationFrame::from_rows(rows),
        annualized_returns,
        final_values,
        skipped,
    })
}

/// Value-weighted mean return per name, for positions that share a name.
fn combine_returns(returns: Vec<(String, f64, f64)>) -> BTreeMap<String, f64> {
    let mut grouped: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
    for (name, rate, value) in returns {
        grouped.entry(name).or_default().push((rate, value));
    }
    grouped
        .into_iter()
        .map(|(name, entries)| {
            let weight: f64 = entries.iter().map(|(_, value)| value).sum();
            let rate = if weight > NEAR_ZERO {
                entries.iter().map(|(rate, value)| rate * value).sum::<f64>() / weight
            } else {
                entries.iter().map(|(rate, _)| rate).sum::<f64>() / entries.len() as f64
            };
            (name, rate)
        })
        .collect()
}

/// Places a position's frame on `days`: carried forward after its last row,
/// carried back at most [`BACKFILL_LIMIT_DAYS`] before its first row when
/// `backfill` is set, zero elsewhere.
fn align_to_calendar(frame: &SimulationFrame, days: &[NaiveDate], backfill: bool) -> Vec<FrameRow> {
    let first = frame.first().filter(|_| backfill);
    days.iter()
        .map(|&date| {
            let source = frame.at_or_before(date).or_else(|| {
                first.filter(|row| (row.date - date).num_days() <= BACKFILL_LIMIT_DAYS)
            });
            match source {
                Some(row) => FrameRow { date, ..*row },
                None => FrameRow {
                    date,
                    contribution: 0.0,
                    nominal: 0.0,
                    real: 0.0,
                },
            }
        })
        .collect()
}

/// Annualized return of one simulated position.
///
/// The total gross contribution is the base. When nothing was contributed but
/// a lump sum exists, the first day's value is used instead.
fn realized_return_pct(first: &FrameRow, last: &FrameRow, lump_sum: f64) -> Option<f64> {
    let years = (last.date - first.date).num_days() as f64 / DAYS_PER_YEAR;
    let base = if last.contribution > NEAR_ZERO {
        last.contribution
    } else if lump_sum > 0.0 {
        debug!("No contributions recorded, using first-day value as base");
        first.nominal
    } else {
        0.0
    };
    annualized_return_pct(base, last.nominal, years)
}

/// Compound annual growth rate in percent.
///
/// `None` when the base or the period is not positive. A non-positive end
/// value is a total loss of -100%.
pub fn annualized_return_pct(begin: f64, end: f64, years: f64) -> Option<f64> {
    if begin <= NEAR_ZERO || years <= 0.0 || !begin.is_finite() || !end.is_finite() {
        return None;
    }
    let ratio = end / begin;
    if ratio <= 0.0 {
        return Some(-100.0);
    }

    let estimate = (ratio.powf(1.0 / years) - 1.0) * 100.0;
    if !estimate.is_finite() {
        return None;
    }
    if estimate.abs() > DECIMAL_CAGR_LIMIT_PCT {
        return Some(estimate);
    }
    decimal_cagr_pct(begin, end, years).or(Some(estimate))
}

fn decimal_cagr_pct(begin: f64, end: f64, years: f64) -> Option<f64> {
    let begin_bal = Decimal::from_f64(begin)?;
    let end_bal = Decimal::from_f64(end)?;
    let n_years = Decimal::from_f64(years)?;
    if n_years.is_zero() || begin_bal.is_zero() {
        return None;
    }
    let rate = cagr(begin_bal, end_bal, n_years);
    (rate * Decimal::from(100)).to_f64()
}
