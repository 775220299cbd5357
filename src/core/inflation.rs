//! Year-by-year inflation model used to deflate nominal values.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::series::calendar;

/// Annual rate assumed for years missing from the table, including all future years.
pub const DEFAULT_INFLATION_PCT: f64 = 2.0;

/// Day count used to turn annual inflation and growth rates into daily factors.
pub const DAYS_PER_YEAR: f64 = 365.25;

// Austrian HICP, annual average (Eurostat / Statistik Austria).
const HISTORICAL_RATES: [(i32, f64); 16] = [
    (2010, 1.8),
    (2011, 3.3),
    (2012, 2.4),
    (2013, 2.0),
    (2014, 1.7),
    (2015, 0.9),
    (2016, 0.9),
    (2017, 2.1),
    (2018, 2.0),
    (2019, 1.5),
    (2020, 1.14),
    (2021, 4.25),
    (2022, 10.15),
    (2023, 5.60),
    (2024, 2.04),
    (2025, 4.00),
];

/// Daily multiplicative factor equivalent to `annual_pct` compounded over a 365.25-day year.
pub fn daily_growth_factor(annual_pct: f64) -> f64 {
    (1.0 + annual_pct / 100.0).powf(1.0 / DAYS_PER_YEAR)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflationModel {
    rates: BTreeMap<i32, f64>,
    default_rate: f64,
}

impl Default for InflationModel {
    fn default() -> Self {
        Self {
            rates: HISTORICAL_RATES.into_iter().collect(),
            default_rate: DEFAULT_INFLATION_PCT,
        }
    }
}

impl InflationModel {
    pub fn new(rates: BTreeMap<i32, f64>, default_rate: f64) -> Self {
        Self {
            rates,
            default_rate,
        }
    }

    /// A model that applies `rate` to every year.
    pub fn flat(rate: f64) -> Self {
        Self::new(BTreeMap::new(), rate)
    }

    /// Overlays user supplied rates on top of this table.
    pub fn with_overrides(mut self, rates: &BTreeMap<i32, f64>, default_rate: Option<f64>) -> Self {
        self.rates
            .extend(rates.iter().map(|(year, rate)| (*year, *rate)));
        if let Some(rate) = default_rate {
            self.default_rate = rate;
        }
        self
    }

    pub fn rate_for_year(&self, year: i32) -> f64 {
        self.rates.get(&year).copied().unwrap_or(self.default_rate)
    }

    /// Cumulative deflator for every day in `[start, end]`, re-based to exactly
    /// 1.0 on `start`. Each day after the first compounds the daily factor of
    /// its own calendar year.
    pub fn factor_series(&self, start: NaiveDate, end: NaiveDate) -> InflationSeries {
        let days = calendar(start, end);
        let mut factors = Vec::with_capacity(days.len());
        let mut cumulative = 1.0;
        let mut year_factor: Option<(i32, f64)> = None;

        for (i, day) in days.iter().enumerate() {
            if i > 0 {
                let factor = match year_factor {
                    Some((year, factor)) if year == day.year() => factor,
                    _ => {
                        let factor = daily_growth_factor(self.rate_for_year(day.year()));
                        year_factor = Some((day.year(), factor));
                        factor
                    }
                };
                cumulative *= factor;
            }
            factors.push(cumulative);
        }

        InflationSeries { start, factors }
    }
}

/// Daily deflator values over a contiguous calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct InflationSeries {
    start: NaiveDate,
    factors: Vec<f64>,
}

impl InflationSeries {
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Deflator applicable on `date`. Days before the series start map to 1.0,
    /// days after its end keep the last value.
    pub fn factor_on(&self, date: NaiveDate) -> f64 {
        let offset = (date - self.start).num_days();
        if offset < 0 || self.factors.is_empty() {
            return 1.0;
        }
        let index = (offset as usize).min(self.factors.len() - 1);
        self.factors[index]
    }
}
