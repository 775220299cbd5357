use super::history::load_history;
use super::{ui, write_json};
use crate::core::config::{AppConfig, Position};
use crate::core::forecast::{ForecastSummary, expected_returns};
use crate::core::portfolio::PortfolioSimulation;
use crate::core::{ForecastParams, ForecastResult, PriceProvider, StartState, forecast};
use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Positions that keep contributing in the projection: scheduled and not
/// dropped by the historical run.
pub fn forecast_positions(positions: &[Position], simulation: &PortfolioSimulation) -> Vec<Position> {
    positions
        .iter()
        .filter(|p| p.has_schedule())
        .filter(|p| {
            !simulation
                .skipped
                .iter()
                .any(|s| s.identifier == p.identifier && s.name == p.display_name())
        })
        .cloned()
        .collect()
}

pub fn forecast_params(config: &AppConfig, horizon_years: Option<u32>) -> ForecastParams {
    ForecastParams {
        horizon_years: horizon_years.unwrap_or(config.forecast.horizon_years),
        continue_contributions: config.forecast.continue_contributions,
        costs: config.costs,
        expected_volatility_pct: config.forecast.volatility_pct(),
        paths: config.forecast.paths,
        seed: config.forecast.seed,
    }
}

/// Continues the historical simulation into the future.
pub fn project(
    config: &AppConfig,
    positions: &[Position],
    simulation: &PortfolioSimulation,
    params: &ForecastParams,
) -> Result<(StartState, BTreeMap<String, f64>, ForecastResult)> {
    let Some(start) = StartState::from_frame(&simulation.frame) else {
        bail!("The historical simulation produced no rows to forecast from");
    };
    let expected = expected_returns(&simulation.annualized_returns, &config.forecast.expected_returns);
    let active = forecast_positions(positions, simulation);

    let Some(result) = forecast(
        &start,
        &active,
        params,
        &expected,
        &simulation.final_values,
        &config.inflation.model(),
    ) else {
        bail!(
            "Forecast for portfolio '{}' produced no result (horizon {} years, {} paths)",
            config.portfolio.name,
            params.horizon_years,
            params.paths
        );
    };
    Ok((start, expected, result))
}

fn display_as_table(result: &ForecastResult, currency: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell(&format!("Contribution ({currency})")),
        ui::header_cell("Pessimistic (p5)"),
        ui::header_cell("Median"),
        ui::header_cell("Optimistic (p95)"),
        ui::header_cell("Median (real)"),
    ]);

    for row in result.yearly_checkpoints() {
        table.add_row(vec![
            comfy_table::Cell::new(row.date.to_string()),
            ui::money_cell(row.contribution),
            ui::money_cell(row.nominal.pessimistic),
            ui::money_cell(row.nominal.median),
            ui::money_cell(row.nominal.optimistic),
            ui::money_cell(row.real.median),
        ]);
    }
    table.to_string()
}

fn display_summary(summary: &ForecastSummary, result: &ForecastResult, currency: &str) -> String {
    let money = |value: f64| format!("{} {currency}", ui::format_money(value));
    [
        ui::kpi_line("Starting capital", &money(summary.starting_capital)),
        ui::kpi_line("Planned contributions", &money(summary.planned_contributions)),
        ui::kpi_line("Total contribution", &money(summary.total_contribution)),
        ui::kpi_line(
            "Median final value",
            &ui::style_text(&money(summary.median_nominal), ui::StyleType::Gain),
        ),
        ui::kpi_line("Median final value (real)", &money(summary.median_real)),
        ui::kpi_line("Optimistic (p95)", &money(summary.optimistic_nominal)),
        ui::kpi_line("Pessimistic (p5)", &money(summary.pessimistic_nominal)),
        ui::kpi_line(
            "Expected return",
            &format!(
                "{:.2}% nominal, {:.2}% real",
                summary.expected_return_nominal_pct, summary.expected_return_real_pct
            ),
        ),
        ui::style_text(
            &format!(
                "Blended return {:.2}% p.a., volatility {:.1}%, {} paths",
                result.blended_return_pct, result.volatility_pct, result.paths
            ),
            ui::StyleType::Note,
        ),
    ]
    .join("\n")
}

#[derive(Serialize)]
struct ForecastExport<'a> {
    portfolio: &'a str,
    currency: &'a str,
    start: StartState,
    end_date: Option<NaiveDate>,
    expected_returns: &'a BTreeMap<String, f64>,
    summary: Option<ForecastSummary>,
    #[serde(flatten)]
    result: &'a ForecastResult,
}

pub async fn run(
    config: &AppConfig,
    provider: &(dyn PriceProvider + Send + Sync),
    horizon_years: Option<u32>,
    export: Option<&Path>,
) -> Result<()> {
    let (positions, _, simulation) = load_history(config, provider).await?;
    let params = forecast_params(config, horizon_years);
    info!(
        "Forecasting {} years with {} paths",
        params.horizon_years, params.paths
    );
    let (start, expected, result) = project(config, &positions, &simulation, &params)?;
    let summary = result.summary(&start);

    println!(
        "Forecast for {} from {}\n",
        ui::style_text(&config.portfolio.name, ui::StyleType::Title),
        start.date
    );
    println!("{}", display_as_table(&result, &config.currency));
    if let Some(summary) = &summary {
        ui::print_separator();
        println!("{}", display_summary(summary, &result, &config.currency));
    }

    if let Some(path) = export {
        let export = ForecastExport {
            portfolio: &config.portfolio.name,
            currency: &config.currency,
            start,
            end_date: result.rows.last().map(|row| row.date),
            expected_returns: &expected,
            summary,
            result: &result,
        };
        write_json(path, &export)?;
        println!(
            "\n{}",
            ui::style_text(&format!("Forecast written to {}", path.display()), ui::StyleType::Note)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Costs;
    use crate::core::portfolio::SkippedPosition;
    use crate::core::series::ContributionInterval;
    use crate::core::simulation::{FrameRow, SimulationFrame};

    fn position(name: Option<&str>, identifier: &str, periodic_amount: f64) -> Position {
        Position {
            name: name.map(str::to_string),
            identifier: identifier.to_string(),
            lump_sum: 0.0,
            periodic_amount,
            interval: ContributionInterval::Monthly,
        }
    }

    fn simulation(rows: Vec<FrameRow>) -> PortfolioSimulation {
        PortfolioSimulation {
            frame: SimulationFrame::from_rows(rows),
            annualized_returns: BTreeMap::from([("A".to_string(), 5.0)]),
            final_values: BTreeMap::from([("A".to_string(), 1000.0)]),
            skipped: vec![SkippedPosition {
                name: "B".to_string(),
                identifier: "B".to_string(),
                reason: "no price data requested".to_string(),
            }],
        }
    }

    fn config() -> AppConfig {
        serde_yaml::from_str(
            r#"
portfolio:
  name: "Plan"
  positions:
    - identifier: "A"
      periodic_amount: 100
history:
  start_date: 2023-01-01
forecast:
  horizon_years: 3
  paths: 50
  seed: 7
  expected_returns:
    A: 6.0
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_skipped_and_unscheduled_positions_do_not_continue() {
        let positions = vec![
            position(None, "A", 100.0),
            position(None, "B", 100.0),
            position(Some("Idle"), "C", 0.0),
        ];
        let active = forecast_positions(&positions, &simulation(vec![]));
        assert_eq!(active, vec![position(None, "A", 100.0)]);
    }

    #[test]
    fn test_params_follow_config_and_override() {
        let config = config();
        let params = forecast_params(&config, None);
        assert_eq!(params.horizon_years, 3);
        assert_eq!(params.paths, 50);
        assert_eq!(params.seed, Some(7));
        assert_eq!(params.costs, Costs::default());
        assert!(params.continue_contributions);
        assert_eq!(params.expected_volatility_pct, 17.0);

        assert_eq!(forecast_params(&config, Some(12)).horizon_years, 12);
    }

    #[test]
    fn test_project_uses_overrides_and_last_row() {
        let config = config();
        let day = |d| NaiveDate::from_ymd_opt(2023, 12, d).unwrap();
        let sim = simulation(vec![
            FrameRow {
                date: day(30),
                contribution: 900.0,
                nominal: 990.0,
                real: 960.0,
            },
            FrameRow {
                date: day(31),
                contribution: 900.0,
                nominal: 1000.0,
                real: 970.0,
            },
        ]);
        let positions = config.positions();
        let params = forecast_params(&config, Some(1));

        let (start, expected, result) = project(&config, &positions, &sim, &params).unwrap();
        assert_eq!(start.date, day(31));
        assert_eq!(expected["A"], 6.0);
        assert_eq!(result.blended_return_pct, 6.0);
        assert_eq!(result.rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(result.rows[0].contribution, 1000.0);
    }

    #[test]
    fn test_empty_history_cannot_be_projected() {
        let config = config();
        let params = forecast_params(&config, None);
        let err = project(&config, &config.positions(), &simulation(vec![]), &params).unwrap_err();
        assert!(err.to_string().contains("no rows"));
    }
}
