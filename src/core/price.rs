//! Price-history abstraction consumed by the simulation commands.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::series::PriceSeries;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    /// Ticker the prices were looked up with, after any ISIN resolution.
    pub symbol: String,
    pub name: Option<String>,
    pub currency: Option<String>,
    pub series: PriceSeries,
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Daily closes for `identifier` (ticker or ISIN) within `[start, end]`.
    /// Gaps are allowed; an empty series means nothing is known for the range.
    async fn fetch_history(
        &self,
        identifier: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory>;
}
