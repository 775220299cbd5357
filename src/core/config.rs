use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::PathBuf};
use tracing::debug;

use super::forecast::MAX_HORIZON_YEARS;
use super::inflation::InflationModel;
use super::series::ContributionInterval;
use super::templates;

/// One instrument in the savings plan.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Position {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "isin", alias = "symbol")]
    pub identifier: String,
    #[serde(default)]
    pub lump_sum: f64,
    #[serde(default)]
    pub periodic_amount: f64,
    #[serde(default)]
    pub interval: ContributionInterval,
}

impl Position {
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.identifier,
        }
    }

    /// A position only takes part in a simulation when it names an instrument
    /// and invests something.
    pub fn has_schedule(&self) -> bool {
        !self.identifier.trim().is_empty() && (self.lump_sum > 0.0 || self.periodic_amount > 0.0)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq)]
pub struct Costs {
    /// One-time charge on every purchase, in percent of the gross amount.
    #[serde(default)]
    pub purchase_cost_pct: f64,
    /// Annual percentage of assets, compounded daily.
    #[serde(default)]
    pub management_fee_pct: f64,
    /// Flat currency amount charged once per calendar year.
    #[serde(default)]
    pub custody_fee: f64,
}

impl Costs {
    /// Share of a gross purchase that ends up invested.
    pub fn purchase_factor(&self) -> f64 {
        1.0 - self.purchase_cost_pct / 100.0
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TemplateConfig {
    pub name: String,
    #[serde(default)]
    pub budget: f64,
    #[serde(default)]
    pub savings_rate: f64,
    #[serde(default)]
    pub interval: ContributionInterval,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PortfolioConfig {
    pub name: String,
    #[serde(default)]
    pub positions: Vec<Position>,
    pub template: Option<TemplateConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HistoryConfig {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl HistoryConfig {
    pub fn end_date_or_today(&self) -> NaiveDate {
        self.end_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl RiskProfile {
    /// Expected annual volatility in percent.
    pub fn volatility_pct(&self) -> f64 {
        match self {
            RiskProfile::Conservative => 10.0,
            RiskProfile::Balanced => 17.0,
            RiskProfile::Aggressive => 25.0,
        }
    }
}

fn default_paths() -> usize {
    100
}

fn default_horizon_years() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ForecastConfig {
    #[serde(default = "default_horizon_years")]
    pub horizon_years: u32,
    #[serde(default = "default_true")]
    pub continue_contributions: bool,
    #[serde(default)]
    pub risk_profile: RiskProfile,
    pub volatility_pct: Option<f64>,
    #[serde(default = "default_paths")]
    pub paths: usize,
    pub seed: Option<u64>,
    /// Expected annual return per position name, in percent. Positions not
    /// listed use their realized historical return.
    #[serde(default)]
    pub expected_returns: BTreeMap<String, f64>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            horizon_years: default_horizon_years(),
            continue_contributions: true,
            risk_profile: RiskProfile::default(),
            volatility_pct: None,
            paths: default_paths(),
            seed: None,
            expected_returns: BTreeMap::new(),
        }
    }
}

impl ForecastConfig {
    pub fn volatility_pct(&self) -> f64 {
        self.volatility_pct
            .unwrap_or_else(|| self.risk_profile.volatility_pct())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct InflationConfig {
    pub default_rate: Option<f64>,
    #[serde(default)]
    pub rates: BTreeMap<i32, f64>,
}

impl InflationConfig {
    pub fn model(&self) -> InflationModel {
        InflationModel::default().with_overrides(&self.rates, self.default_rate)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub portfolio: PortfolioConfig,
    pub history: HistoryConfig,
    #[serde(default)]
    pub costs: Costs,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub inflation: InflationConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub data_path: Option<String>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn check_pct(label: &str, value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        bail!("{label} must be between 0 and 100, got {value}");
    }
    Ok(())
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "pfsim", "pfsim")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("org", "pfsim", "pfsim")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Explicit positions followed by the ones expanded from the template, if any.
    pub fn positions(&self) -> Vec<Position> {
        let mut positions = self.portfolio.positions.clone();
        if let Some(template) = &self.portfolio.template {
            positions.extend(templates::load_template(
                &template.name,
                template.budget,
                template.savings_rate,
                template.interval,
            ));
        }
        positions
    }

    pub fn validate(&self) -> Result<()> {
        check_pct("purchase_cost_pct", self.costs.purchase_cost_pct)?;
        check_pct("management_fee_pct", self.costs.management_fee_pct)?;
        if self.costs.custody_fee < 0.0 {
            bail!("custody_fee must not be negative");
        }

        if let Some(end) = self.history.end_date {
            if end < self.history.start_date {
                bail!(
                    "History end date {} is before start date {}",
                    end,
                    self.history.start_date
                );
            }
        }

        if let Some(template) = &self.portfolio.template {
            if templates::find_template(&template.name).is_none() {
                bail!("Unknown portfolio template: {}", template.name);
            }
        }

        let positions = self.positions();
        if positions.is_empty() {
            bail!("Portfolio '{}' has no positions", self.portfolio.name);
        }
        for position in &positions {
            if position.lump_sum < 0.0 || position.periodic_amount < 0.0 {
                bail!(
                    "Position '{}' has a negative contribution amount",
                    position.display_name()
                );
            }
        }

        if self.forecast.paths == 0 {
            bail!("forecast.paths must be greater than zero");
        }
        if self.forecast.volatility_pct() < 0.0 {
            bail!("forecast.volatility_pct must not be negative");
        }
        if self.forecast.horizon_years > MAX_HORIZON_YEARS {
            bail!(
                "forecast.horizon_years must be at most {MAX_HORIZON_YEARS}, got {}",
                self.forecast.horizon_years
            );
        }
        if let Some(rate) = self.inflation.default_rate {
            if rate <= -100.0 {
                bail!("Default inflation rate must be above -100%, got {rate}");
            }
        }
        for (year, rate) in &self.inflation.rates {
            if *rate <= -100.0 {
                bail!("Inflation rate for {year} must be above -100%");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
portfolio:
  name: "Savings Plan"
  positions:
    - name: "S&P 500 ETF"
      isin: "IE00B5BMR087"
      lump_sum: 1000
      periodic_amount: 100
      interval: monthly
    - symbol: "AAPL"
      periodic_amount: 50
      interval: quarterly
history:
  start_date: 2020-01-01
  end_date: 2024-12-31
costs:
  purchase_cost_pct: 3.0
  management_fee_pct: 0.85
  custody_fee: 25
forecast:
  horizon_years: 15
  risk_profile: aggressive
  paths: 250
  seed: 7
  expected_returns:
    "S&P 500 ETF": 7.5
inflation:
  default_rate: 2.5
  rates:
    2026: 3.1
currency: "EUR"
"#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = serde_yaml::from_str(FULL_CONFIG).expect("Failed to deserialize");

        assert_eq!(config.portfolio.name, "Savings Plan");
        assert_eq!(config.portfolio.positions.len(), 2);
        let etf = &config.portfolio.positions[0];
        assert_eq!(etf.identifier, "IE00B5BMR087");
        assert_eq!(etf.display_name(), "S&P 500 ETF");
        assert_eq!(etf.lump_sum, 1000.0);
        assert_eq!(etf.interval, ContributionInterval::Monthly);
        let apple = &config.portfolio.positions[1];
        assert_eq!(apple.display_name(), "AAPL");
        assert_eq!(apple.lump_sum, 0.0);
        assert_eq!(apple.interval, ContributionInterval::Quarterly);

        assert_eq!(
            config.history.end_date,
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
        assert_eq!(config.costs.custody_fee, 25.0);
        assert!((config.costs.purchase_factor() - 0.97).abs() < 1e-12);

        assert_eq!(config.forecast.horizon_years, 15);
        assert!(config.forecast.continue_contributions);
        assert_eq!(config.forecast.volatility_pct(), 25.0);
        assert_eq!(config.forecast.paths, 250);
        assert_eq!(config.forecast.seed, Some(7));
        assert_eq!(config.forecast.expected_returns.get("S&P 500 ETF"), Some(&7.5));

        let model = config.inflation.model();
        assert_eq!(model.rate_for_year(2026), 3.1);
        assert_eq!(model.rate_for_year(2040), 2.5);

        assert_eq!(
            config.providers.yahoo.unwrap().base_url,
            "https://query1.finance.yahoo.com"
        );
        assert!(config.data_path.is_none());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let yaml_str = r#"
portfolio:
  name: "Minimal"
  positions:
    - identifier: "VWCE.DE"
      lump_sum: 500
history:
  start_date: 2021-03-01
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(config.costs, Costs::default());
        assert_eq!(config.forecast, ForecastConfig::default());
        assert_eq!(config.forecast.volatility_pct(), 17.0);
        assert_eq!(config.currency, "EUR");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_volatility_wins_over_profile() {
        let forecast = ForecastConfig {
            risk_profile: RiskProfile::Conservative,
            volatility_pct: Some(12.5),
            ..ForecastConfig::default()
        };
        assert_eq!(forecast.volatility_pct(), 12.5);
    }

    #[test]
    fn test_template_positions_are_appended() {
        let yaml_str = r#"
portfolio:
  name: "Template"
  positions:
    - identifier: "VWCE.DE"
      lump_sum: 500
  template:
    name: "growth"
    budget: 10000
    savings_rate: 200
history:
  start_date: 2021-03-01
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        let positions = config.positions();
        assert_eq!(positions.len(), 5);
        assert_eq!(positions[0].identifier, "VWCE.DE");
        let budget: f64 = positions[1..].iter().map(|p| p.lump_sum).sum();
        assert!((budget - 10000.0).abs() < 1e-9);
    }

    #[test]
    fn test_validation_errors() {
        let mut config: AppConfig = serde_yaml::from_str(FULL_CONFIG).unwrap();
        assert!(config.validate().is_ok());

        config.costs.management_fee_pct = 120.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("management_fee_pct"));

        config.costs.management_fee_pct = 1.0;
        config.forecast.paths = 0;
        assert!(config.validate().is_err());

        config.forecast.paths = 10;
        config.history.end_date = NaiveDate::from_ymd_opt(2019, 1, 1);
        assert!(config.validate().unwrap_err().to_string().contains("before start date"));

        config.history.end_date = None;
        config.inflation.default_rate = Some(-150.0);
        assert!(config.validate().unwrap_err().to_string().contains("Default inflation rate"));
        config.inflation.default_rate = Some(-99.0);
        assert!(config.validate().is_ok());

        config.forecast.horizon_years = MAX_HORIZON_YEARS + 1;
        assert!(config.validate().unwrap_err().to_string().contains("horizon_years"));
        config.forecast.horizon_years = 10;

        config.history.end_date = None;
        config.portfolio.positions.clear();
        assert!(config.validate().unwrap_err().to_string().contains("no positions"));

        config.portfolio.template = Some(TemplateConfig {
            name: "unknown".to_string(),
            budget: 1.0,
            savings_rate: 1.0,
            interval: ContributionInterval::Monthly,
        });
        assert!(config.validate().unwrap_err().to_string().contains("Unknown portfolio template"));
    }

    #[test]
    fn test_position_schedule() {
        let mut position = Position {
            name: Some("  ".to_string()),
            identifier: "AAPL".to_string(),
            lump_sum: 0.0,
            periodic_amount: 0.0,
            interval: ContributionInterval::Monthly,
        };
        assert_eq!(position.display_name(), "AAPL");
        assert!(!position.has_schedule());
        position.periodic_amount = 25.0;
        assert!(position.has_schedule());
        position.identifier = String::new();
        assert!(!position.has_schedule());
    }
}
