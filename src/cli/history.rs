use super::{ui, write_json};
use crate::core::config::{AppConfig, Position};
use crate::core::portfolio::{HistorySummary, PortfolioSimulation, simulate_portfolio};
use crate::core::{PriceHistory, PriceProvider, PriceSeries};
use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;
use comfy_table::Cell;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Fetches the price history of every distinct identifier concurrently.
pub async fn fetch_price_histories(
    positions: &[Position],
    provider: &(dyn PriceProvider + Send + Sync),
    start: NaiveDate,
    end: NaiveDate,
) -> HashMap<String, Result<PriceHistory>> {
    let identifiers: BTreeSet<&str> = positions
        .iter()
        .filter(|p| p.has_schedule())
        .map(|p| p.identifier.as_str())
        .collect();

    let pb = ui::fetch_progress_bar(identifiers.len() as u64, "Fetching prices...");

    let futures = identifiers.into_iter().map(|id| {
        let pb_clone = pb.clone();
        async move {
            let res = provider.fetch_history(id, start, end).await;
            pb_clone.inc(1);
            (id.to_string(), res)
        }
    });

    let results = join_all(futures).await.into_iter().collect();
    pb.finish_and_clear();
    results
}

/// The series part of each lookup, in the shape the aggregator consumes.
pub fn price_series(histories: &HashMap<String, Result<PriceHistory>>) -> HashMap<String, Result<PriceSeries>> {
    histories
        .iter()
        .map(|(id, result)| {
            let series = match result {
                Ok(history) => Ok(history.series.clone()),
                Err(e) => Err(anyhow!("{e:#}")),
            };
            (id.clone(), series)
        })
        .collect()
}

/// Runs the historical simulation for the configured portfolio.
pub fn simulate_history(
    config: &AppConfig,
    positions: &[Position],
    histories: &HashMap<String, Result<PriceHistory>>,
) -> Option<PortfolioSimulation> {
    for (id, history) in histories.iter().filter_map(|(id, r)| r.as_ref().ok().map(|h| (id, h))) {
        if let Some(currency) = &history.currency {
            if !currency.eq_ignore_ascii_case(&config.currency) {
                warn!(
                    "{} is quoted in {} but the portfolio uses {}; prices are not converted",
                    id, currency, config.currency
                );
            }
        }
    }

    simulate_portfolio(
        positions,
        &price_series(histories),
        config.history.start_date,
        config.history.end_date_or_today(),
        &config.costs,
        &config.inflation.model(),
    )
}

/// Fetches prices and simulates the configured history, failing when no
/// position could be simulated.
pub async fn load_history(
    config: &AppConfig,
    provider: &(dyn PriceProvider + Send + Sync),
) -> Result<(Vec<Position>, HashMap<String, Result<PriceHistory>>, PortfolioSimulation)> {
    let positions = config.positions();
    let start = config.history.start_date;
    let end = config.history.end_date_or_today();
    info!(
        "Simulating {} positions from {} to {}",
        positions.len(),
        start,
        end
    );

    let histories = fetch_price_histories(&positions, provider, start, end).await;
    let Some(simulation) = simulate_history(config, &positions, &histories) else {
        bail!(
            "No position of portfolio '{}' could be simulated between {} and {}",
            config.portfolio.name,
            start,
            end
        );
    };
    Ok((positions, histories, simulation))
}

pub struct HistoryReport<'a> {
    pub portfolio_name: &'a str,
    pub currency: &'a str,
    pub positions: &'a [Position],
    pub histories: &'a HashMap<String, Result<PriceHistory>>,
    pub simulation: &'a PortfolioSimulation,
}

impl HistoryReport<'_> {
    fn instrument_name(&self, position: &Position) -> String {
        match (&position.name, self.histories.get(&position.identifier)) {
            (Some(name), _) => name.clone(),
            (None, Some(Ok(PriceHistory { name: Some(name), .. }))) => name.clone(),
            _ => position.identifier.clone(),
        }
    }

    pub fn display_as_table(&self) -> String {
        let currency = self.currency;
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Position"),
            ui::header_cell("Identifier"),
            ui::header_cell(&format!("Final Value ({currency})")),
            ui::header_cell("Return p.a."),
        ]);

        for position in self.positions.iter().filter(|p| p.has_schedule()) {
            let key = position.display_name();
            let skipped = self
                .simulation
                .skipped
                .iter()
                .find(|s| s.identifier == position.identifier && s.name == key);

            let name = Cell::new(self.instrument_name(position));
            let identifier = Cell::new(&position.identifier);
            if let Some(skipped) = skipped {
                table.add_row(vec![
                    name,
                    identifier,
                    ui::skipped_cell(&format!("skipped: {}", skipped.reason)),
                    ui::skipped_cell("N/A"),
                ]);
                continue;
            }

            let final_value =
                ui::format_optional_cell(self.simulation.final_values.get(key).copied(), ui::format_money);
            let annual_return = match self.simulation.annualized_returns.get(key) {
                Some(rate) => ui::return_cell(*rate),
                None => ui::format_optional_cell(None::<f64>, |r| format!("{r:.2}%")),
            };
            table.add_row(vec![name, identifier, final_value, annual_return]);
        }

        let mut output = format!(
            "Portfolio: {}\n\n",
            ui::style_text(self.portfolio_name, ui::StyleType::Title)
        );
        output.push_str(&table.to_string());

        if let Some(summary) = self.simulation.summary() {
            output.push_str("\n\n");
            output.push_str(&display_summary(&summary, currency));
        }
        output
    }
}

fn display_summary(summary: &HistorySummary, currency: &str) -> String {
    let profit_style = if summary.profit_loss >= 0.0 {
        ui::StyleType::Gain
    } else {
        ui::StyleType::Loss
    };
    [
        ui::kpi_line(
            "Total contribution",
            &format!("{} {currency}", ui::format_money(summary.total_contribution)),
        ),
        ui::kpi_line(
            "Final value (nominal)",
            &ui::style_text(
                &format!("{} {currency}", ui::format_money(summary.final_nominal)),
                ui::StyleType::Gain,
            ),
        ),
        ui::kpi_line(
            "Profit / loss",
            &ui::style_text(
                &format!("{} {currency}", ui::format_money(summary.profit_loss)),
                profit_style,
            ),
        ),
        ui::kpi_line(
            "Absolute return",
            &format!("{:.2}%", summary.absolute_return_pct),
        ),
        ui::kpi_line(
            "Final value (real)",
            &format!("{} {currency}", ui::format_money(summary.final_real)),
        ),
    ]
    .join("\n")
}

#[derive(Serialize)]
struct HistoryExport<'a> {
    portfolio: &'a str,
    currency: &'a str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    summary: Option<HistorySummary>,
    #[serde(flatten)]
    simulation: &'a PortfolioSimulation,
}

pub async fn run(
    config: &AppConfig,
    provider: &(dyn PriceProvider + Send + Sync),
    export: Option<&Path>,
) -> Result<()> {
    let (positions, histories, simulation) = load_history(config, provider).await?;

    let report = HistoryReport {
        portfolio_name: &config.portfolio.name,
        currency: &config.currency,
        positions: &positions,
        histories: &histories,
        simulation: &simulation,
    };
    println!("{}", report.display_as_table());

    if let Some(path) = export {
        let export = HistoryExport {
            portfolio: &config.portfolio.name,
            currency: &config.currency,
            start_date: config.history.start_date,
            end_date: config.history.end_date_or_today(),
            summary: simulation.summary(),
            simulation: &simulation,
        };
        write_json(path, &export)?;
        println!(
            "\n{}",
            ui::style_text(&format!("Daily frame written to {}", path.display()), ui::StyleType::Note)
        );
    }
    Ok(())
}
