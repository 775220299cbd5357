//! Price series and calendar helpers shared by the simulators.

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributionInterval {
    #[default]
    Monthly,
    Quarterly,
    #[serde(alias = "yearly")]
    Annual,
}

impl ContributionInterval {
    pub const ALL: [ContributionInterval; 3] = [
        ContributionInterval::Monthly,
        ContributionInterval::Quarterly,
        ContributionInterval::Annual,
    ];

    /// First calendar day of the period that contains `date`.
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        let month = match self {
            ContributionInterval::Monthly => date.month(),
            ContributionInterval::Quarterly => (date.month0() / 3) * 3 + 1,
            ContributionInterval::Annual => 1,
        };
        NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
    }

    pub fn is_period_start(&self, date: NaiveDate) -> bool {
        self.period_start(date) == date
    }
}

impl Display for ContributionInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ContributionInterval::Monthly => "monthly",
                ContributionInterval::Quarterly => "quarterly",
                ContributionInterval::Annual => "annual",
            }
        )
    }
}

impl FromStr for ContributionInterval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" | "m" => Ok(ContributionInterval::Monthly),
            "quarterly" | "q" => Ok(ContributionInterval::Quarterly),
            "annual" | "yearly" | "y" => Ok(ContributionInterval::Annual),
            _ => Err(anyhow!("Invalid contribution interval: {}", s)),
        }
    }
}

/// Every calendar day from `start` to `end`, both inclusive. Empty when `end < start`.
pub fn calendar(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = Some(start);
    while let Some(day) = current {
        if day > end {
            break;
        }
        days.push(day);
        current = day.succ_opt();
    }
    days
}

/// Ordered closing prices for one instrument.
///
/// Non-finite and negative closes are discarded on construction, and a date
/// appearing twice keeps its first close.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<(NaiveDate, f64)>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<(NaiveDate, f64)>) -> Self {
        points.retain(|(_, price)| price.is_finite() && *price >= 0.0);
        points.sort_by_key(|(date, _)| *date);
        points.dedup_by_key(|(date, _)| *date);
        Self { points }
    }

    /// A flat series, mostly useful for what-if runs and tests.
    pub fn constant(start: NaiveDate, end: NaiveDate, price: f64) -> Self {
        Self::new(calendar(start, end).into_iter().map(|d| (d, price)).collect())
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<(NaiveDate, f64)> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        self.points.last().copied()
    }

    /// The closes dated within `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            points: self
                .points
                .iter()
                .filter(|(date, _)| *date >= start && *date <= end)
                .copied()
                .collect(),
        }
    }

    /// Contiguous daily closes from the first to the last observation.
    /// Missing days (weekends, holidays) carry the last known close forward.
    pub fn daily(&self) -> Vec<(NaiveDate, f64)> {
        let (Some((first, _)), Some((last, _))) = (self.first(), self.last()) else {
            return Vec::new();
        };

        let mut observed = self.points.iter().peekable();
        let mut price = f64::NAN;
        calendar(first, last)
            .into_iter()
            .map(|day| {
                while let Some((date, close)) = observed.peek() {
                    if *date > day {
                        break;
                    }
                    price = *close;
                    observed.next();
                }
                (day, price)
            })
            .collect()
    }
}
