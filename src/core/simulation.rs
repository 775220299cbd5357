//! Daily value simulation of a single savings-plan position.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::config::Costs;
use super::inflation::{InflationSeries, daily_growth_factor};
use super::series::{ContributionInterval, PriceSeries};

/// Values at or below this are treated as "nothing invested yet".
pub const NEAR_ZERO: f64 = 1e-9;

/// Day count for compounding the management fee.
const FEE_DAYS_PER_YEAR: f64 = 365.0;

/// Daily multiplicative factor for an annual percentage-of-assets fee.
pub fn daily_fee_factor(annual_pct: f64, days_per_year: f64) -> f64 {
    (1.0 - annual_pct / 100.0).max(0.0).powf(1.0 / days_per_year)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRow {
    pub date: NaiveDate,
    /// Cumulative gross contribution.
    pub contribution: f64,
    pub nominal: f64,
    pub real: f64,
}

/// Date-ordered daily rows of contribution, nominal and real value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationFrame {
    rows: Vec<FrameRow>,
}

impl SimulationFrame {
    pub fn from_rows(rows: Vec<FrameRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[FrameRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&FrameRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&FrameRow> {
        self.rows.last()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&FrameRow> {
        self.rows
            .binary_search_by_key(&date, |row| row.date)
            .ok()
            .map(|index| &self.rows[index])
    }

    /// The latest row dated on or before `date`.
    pub fn at_or_before(&self, date: NaiveDate) -> Option<&FrameRow> {
        let index = self.rows.partition_point(|row| row.date <= date);
        index.checked_sub(1).map(|index| &self.rows[index])
    }
}

/// How nominal values are deflated.
#[derive(Debug, Clone, Copy)]
pub enum InflationInput<'a> {
    /// Constant annual percentage, compounded daily from the first simulated day.
    AnnualRate(f64),
    /// Year-exact deflator, looked up by date.
    Series(&'a InflationSeries),
}

/// Simulates one position on a contiguous daily calendar.
///
/// Periodic contributions are bought on the first day of every period except
/// the first one, so the lump sum and the first instalment never land on the
/// same day. The lump sum is bought at the first available close. Both pay
/// the purchase cost. The management fee is compounded into the nominal value
/// every day.
///
/// Leading days without any invested value are dropped. An empty frame means
/// the position cannot be simulated.
pub fn simulate_position(
    prices: &PriceSeries,
    periodic_amount: f64,
    lump_sum: f64,
    interval: ContributionInterval,
    inflation: InflationInput<'_>,
    costs: &Costs,
) -> SimulationFrame {
    let daily = prices.daily();
    let Some(&(_, first_price)) = daily.first() else {
        return SimulationFrame::default();
    };

    let purchase_factor = costs.purchase_factor();
    let fee_factor = daily_fee_factor(costs.management_fee_pct, FEE_DAYS_PER_YEAR);
    let lump_sum_shares = if lump_sum > 0.0 && first_price > 0.0 {
        lump_sum * purchase_factor / first_price
    } else {
        0.0
    };
    let lump_sum = lump_sum.max(0.0);

    let mut periodic_shares = 0.0;
    let mut periodic_contribution = 0.0;
    let mut fee = 1.0;
    let mut rate_deflator = 1.0;
    let rate_growth = match inflation {
        InflationInput::AnnualRate(rate) => daily_growth_factor(rate),
        InflationInput::Series(_) => 1.0,
    };

    let mut rows = Vec::with_capacity(daily.len());
    for (i, (date, price)) in daily.into_iter().enumerate() {
        if i > 0 {
            rate_deflator *= rate_growth;
            if periodic_amount > 0.0 && interval.is_period_start(date) {
                if price > 0.0 {
                    periodic_shares += periodic_amount * purchase_factor / price;
                }
                periodic_contribution += periodic_amount;
            }
        }
        fee *= fee_factor;

        let nominal = ((periodic_shares + lump_sum_shares) * price * fee).max(0.0);
        let deflator = match inflation {
            InflationInput::AnnualRate(_) => rate_deflator,
            InflationInput::Series(series) => series.factor_on(date),
        };
        let real = if deflator > 0.0 {
            nominal / deflator
        } else {
            nominal
        };

        rows.push(FrameRow {
            date,
            contribution: periodic_contribution + lump_sum,
            nominal,
            real,
        });
    }

    let leading = rows
        .iter()
        .take_while(|row| row.nominal <= NEAR_ZERO)
        .count();
    rows.drain(..leading);
    SimulationFrame { rows }
}
