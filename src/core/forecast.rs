//! Monte Carlo projection of a portfolio into the future.
//!
//! Every path starts from the last state of the historical run and follows a
//! discretized geometric random walk with one blended drift and a single
//! portfolio-level volatility. Paths are reduced to percentile bands day by
//! day, so a band is the distribution across all paths on that day rather
//! than one representative path.

use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::config::{Costs, Position};
use super::inflation::{DAYS_PER_YEAR, InflationModel};
use super::series::ContributionInterval;
use super::simulation::{NEAR_ZERO, SimulationFrame, daily_fee_factor};

/// Longest projection the engine accepts, in years.
pub const MAX_HORIZON_YEARS: u32 = 200;

const PESSIMISTIC_PERCENTILE: f64 = 5.0;
const MEDIAN_PERCENTILE: f64 = 50.0;
const OPTIMISTIC_PERCENTILE: f64 = 95.0;

/// Portfolio state the projection continues from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StartState {
    pub date: NaiveDate,
    pub nominal: f64,
    pub real: f64,
    pub contribution: f64,
}

impl StartState {
    /// The last day of a historical frame.
    pub fn from_frame(frame: &SimulationFrame) -> Option<Self> {
        frame.last().map(|row| StartState {
            date: row.date,
            nominal: row.nominal,
            real: row.real,
            contribution: row.contribution,
        })
    }

    /// Nominal over real value, i.e. the inflation already accrued. 1.0 when
    /// either side is zero.
    fn deflator_basis(&self) -> f64 {
        if self.nominal > NEAR_ZERO && self.real > NEAR_ZERO {
            self.nominal / self.real
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastParams {
    pub horizon_years: u32,
    pub continue_contributions: bool,
    pub costs: Costs,
    pub expected_volatility_pct: f64,
    pub paths: usize,
    /// Fixed seed for reproducible runs. Drawn from the OS when absent.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileBand {
    pub median: f64,
    /// 95th percentile.
    pub optimistic: f64,
    /// 5th percentile.
    pub pessimistic: f64,
}

impl PercentileBand {
    fn scaled(&self, divisor: f64) -> Self {
        PercentileBand {
            median: self.median / divisor,
            optimistic: self.optimistic / divisor,
            pessimistic: self.pessimistic / divisor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastRow {
    pub date: NaiveDate,
    /// Deterministic cumulative gross contribution.
    pub contribution: f64,
    pub nominal: PercentileBand,
    pub real: PercentileBand,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub rows: Vec<ForecastRow>,
    pub blended_return_pct: f64,
    pub volatility_pct: f64,
    pub paths: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastSummary {
    pub starting_capital: f64,
    pub planned_contributions: f64,
    pub total_contribution: f64,
    pub median_nominal: f64,
    pub median_real: f64,
    pub optimistic_nominal: f64,
    pub pessimistic_nominal: f64,
    pub expected_return_nominal_pct: f64,
    pub expected_return_real_pct: f64,
}

impl ForecastResult {
    pub fn summary(&self, start: &StartState) -> Option<ForecastSummary> {
        let last = self.rows.last()?;
        let relative = |value: f64| {
            if last.contribution > 0.0 {
                (value / last.contribution - 1.0) * 100.0
            } else {
                0.0
            }
        };
        Some(ForecastSummary {
            starting_capital: start.nominal,
            planned_contributions: last.contribution - start.contribution,
            total_contribution: last.contribution,
            median_nominal: last.nominal.median,
            median_real: last.real.median,
            optimistic_nominal: last.nominal.optimistic,
            pessimistic_nominal: last.nominal.pessimistic,
            expected_return_nominal_pct: relative(last.nominal.median),
            expected_return_real_pct: relative(last.real.median),
        })
    }

    /// The first row of every completed forecast year, plus the final day.
    pub fn yearly_checkpoints(&self) -> Vec<ForecastRow> {
        // Row i lies i + 1 days after the start.
        let years = |days: usize| (days as f64 / DAYS_PER_YEAR).floor();
        let mut checkpoints: Vec<ForecastRow> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| years(i + 1) > years(*i))
            .map(|(_, row)| *row)
            .collect();
        if let Some(last) = self.rows.last() {
            if checkpoints.last().map(|row| row.date) != Some(last.date) {
                checkpoints.push(*last);
            }
        }
        checkpoints
    }
}

/// Historical annualized returns with explicit per-position overrides on top.
pub fn expected_returns(
    realized: &BTreeMap<String, f64>,
    overrides: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    let mut expected = realized.clone();
    expected.extend(overrides.iter().map(|(name, rate)| (name.clone(), *rate)));
    expected
}

/// Value-weighted average of the expected annual returns, in percent.
/// Positions without an expectation count as 0%.
pub fn blended_expected_return(
    expected_returns: &BTreeMap<String, f64>,
    final_values: &BTreeMap<String, f64>,
) -> f64 {
    let total: f64 = final_values.values().sum();
    if total <= NEAR_ZERO {
        return 0.0;
    }
    final_values
        .iter()
        .map(|(name, value)| {
            let expected = if expected_returns.contains_key(name) {
                expected_returns[name]
            } else {
                debug!("No expected return for {}, assuming 0%", name);
                0.0
            };
            expected * value / total
        })
        .sum()
}

/// Linear-interpolated percentile. Sorts `values` in place.
fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}

/// Gross periodic amount due on `date` across all positions.
fn contribution_on(date: NaiveDate, totals: &BTreeMap<ContributionInterval, f64>) -> f64 {
    totals
        .iter()
        .filter(|(interval, _)| interval.is_period_start(date))
        .map(|(_, amount)| amount)
        .sum()
}

/// Projects the portfolio `params.horizon_years` past `start`.
///
/// Returns `None` for a zero horizon or path count.
pub fn forecast(
    start: &StartState,
    positions: &[Position],
    params: &ForecastParams,
    expected_returns: &BTreeMap<String, f64>,
    final_values: &BTreeMap<String, f64>,
    inflation: &InflationModel,
) -> Option<ForecastResult> {
    if params.horizon_years == 0 || params.paths == 0 {
        return None;
    }

    let blended_return_pct = blended_expected_return(expected_returns, final_values);
    let mu = (1.0 + blended_return_pct / 100.0).max(0.0).powf(1.0 / DAYS_PER_YEAR) - 1.0;
    let sigma = (params.expected_volatility_pct / 100.0).max(0.0) / DAYS_PER_YEAR.sqrt();
    let normal = match Normal::new(mu, sigma) {
        Ok(normal) => normal,
        Err(e) => {
            warn!("Invalid return distribution (mu {mu}, sigma {sigma}): {e}");
            return None;
        }
    };
    debug!(
        "Forecast over {} years: blended return {:.3}%, mu {:.6}, sigma {:.6}, {} paths",
        params.horizon_years, blended_return_pct, mu, sigma, params.paths
    );

    if params.horizon_years > MAX_HORIZON_YEARS {
        warn!(
            "Forecast horizon of {} years exceeds the limit of {}",
            params.horizon_years, MAX_HORIZON_YEARS
        );
        return None;
    }
    let horizon_days = (params.horizon_years as f64 * DAYS_PER_YEAR) as i64;
    let (Some(first_day), Some(last_day)) = (
        start.date.checked_add_signed(Duration::days(1)),
        start.date.checked_add_signed(Duration::days(horizon_days + 1)),
    ) else {
        warn!("Forecast calendar starting {} is out of the date range", start.date);
        return None;
    };

    // The inflation series starts on the last historical day, so the first
    // forecast day already carries one day of inflation.
    let basis = start.deflator_basis();
    let deflators: Vec<f64> = inflation
        .factor_series(start.date, last_day)
        .factors()
        .iter()
        .skip(1)
        .map(|factor| factor * basis)
        .collect();

    let mut interval_totals: BTreeMap<ContributionInterval, f64> = BTreeMap::new();
    if params.continue_contributions {
        for position in positions.iter().filter(|p| p.periodic_amount > 0.0) {
            *interval_totals.entry(position.interval).or_insert(0.0) += position.periodic_amount;
        }
    }

    let purchase_factor = params.costs.purchase_factor();
    let fee_factor = daily_fee_factor(params.costs.management_fee_pct, DAYS_PER_YEAR);
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut values = vec![start.nominal.max(0.0); params.paths];
    let mut scratch = vec![0.0; params.paths];
    let mut contribution = start.contribution;
    let mut rows = Vec::with_capacity(deflators.len());

    for (offset, deflator) in deflators.iter().enumerate() {
        let date = first_day + Duration::days(offset as i64);
        let gross = contribution_on(date, &interval_totals);
        let net = gross * purchase_factor;
        let custody = if date.month() == 1 && date.day() == 1 {
            params.costs.custody_fee
        } else {
            0.0
        };
        contribution += gross;

        for value in values.iter_mut() {
            let daily_return = normal.sample(&mut rng);
            *value = ((*value * (1.0 + daily_return) + net) * fee_factor - custody).max(0.0);
        }

        scratch.copy_from_slice(&values);
        let nominal = PercentileBand {
            median: percentile(&mut scratch, MEDIAN_PERCENTILE),
            optimistic: percentile(&mut scratch, OPTIMISTIC_PERCENTILE),
            pessimistic: percentile(&mut scratch, PESSIMISTIC_PERCENTILE),
        };
        rows.push(ForecastRow {
            date,
            contribution,
            nominal,
            real: nominal.scaled(*deflator),
        });
    }

    Some(ForecastResult {
        rows,
        blended_return_pct,
        volatility_pct: params.expected_volatility_pct,
        paths: params.paths,
    })
}
