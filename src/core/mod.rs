//! Simulation engine and the abstractions it is fed through

pub mod cache;
pub mod config;
pub mod forecast;
pub mod inflation;
pub mod log;
pub mod portfolio;
pub mod price;
pub mod series;
pub mod simulation;
pub mod templates;

// Re-export main types for cleaner imports
pub use cache::KeyValueCollection;
pub use forecast::{ForecastParams, ForecastResult, StartState, forecast};
pub use inflation::{InflationModel, InflationSeries};
pub use portfolio::{PortfolioSimulation, simulate_portfolio};
pub use price::{PriceHistory, PriceProvider};
pub use series::{ContributionInterval, PriceSeries};
pub use simulation::{InflationInput, SimulationFrame, simulate_position};
