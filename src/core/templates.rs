//! Predefined model portfolios that can be expanded into positions.

use super::config::Position;
use super::series::ContributionInterval;

#[derive(Debug)]
pub struct TemplateAsset {
    pub ticker: &'static str,
    pub name: &'static str,
    /// Share of the template in percent. `None` means an equal split.
    pub weight: Option<f64>,
}

#[derive(Debug)]
pub struct PortfolioTemplate {
    pub key: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub assets: &'static [TemplateAsset],
}

const fn asset(ticker: &'static str, name: &'static str, weight: f64) -> TemplateAsset {
    TemplateAsset {
        ticker,
        name,
        weight: Some(weight),
    }
}

pub static TEMPLATES: &[PortfolioTemplate] = &[
    PortfolioTemplate {
        key: "esg",
        display_name: "Sustainability (ESG)",
        description: "Focus on sustainable investments and ESG criteria",
        assets: &[
            asset("LLY", "Eli Lilly", 35.0),
            asset("GOOGL", "Alphabet", 30.0),
            asset("KO", "Coca-Cola", 20.0),
            asset("AAPL", "Apple", 15.0),
        ],
    },
    PortfolioTemplate {
        key: "quantitative",
        display_name: "Quantitative (rule-based)",
        description: "Data-driven selection by quantitative criteria",
        assets: &[
            asset("NVDA", "NVIDIA", 40.0),
            asset("MSFT", "Microsoft", 30.0),
            asset("ADBE", "Adobe", 20.0),
            asset("ORCL", "Oracle", 10.0),
        ],
    },
    PortfolioTemplate {
        key: "growth",
        display_name: "Growth (equity focus)",
        description: "Growth oriented equities with high potential",
        assets: &[
            asset("PSTG", "Pure Storage", 30.0),
            asset("QCOM", "Qualcomm", 30.0),
            asset("MRVL", "Marvell Technology", 25.0),
            asset("CRM", "Salesforce", 15.0),
        ],
    },
    PortfolioTemplate {
        key: "balanced",
        display_name: "Balanced (multi-asset)",
        description: "Blue chips and dividend payers",
        assets: &[
            asset("NESN.SW", "Nestle", 30.0),
            asset("V", "Visa", 30.0),
            asset("JPM", "JPMorgan Chase", 25.0),
            asset("AAPL", "Apple", 15.0),
        ],
    },
];

/// Looks a template up by key or display name, ignoring case.
pub fn find_template(name: &str) -> Option<&'static PortfolioTemplate> {
    let name = name.trim();
    TEMPLATES.iter().find(|template| {
        template.key.eq_ignore_ascii_case(name) || template.display_name.eq_ignore_ascii_case(name)
    })
}

/// Splits `budget` (lump sums) and `savings_rate` (periodic amounts) across
/// the template's assets by weight. Unknown templates yield no positions.
pub fn load_template(
    name: &str,
    budget: f64,
    savings_rate: f64,
    interval: ContributionInterval,
) -> Vec<Position> {
    let Some(template) = find_template(name) else {
        return Vec::new();
    };
    let equal_weight = 100.0 / template.assets.len() as f64;

    template
        .assets
        .iter()
        .map(|asset| {
            let weight = asset.weight.unwrap_or(equal_weight);
            Position {
                name: Some(asset.name.to_string()),
                identifier: asset.ticker.to_string(),
                lump_sum: budget * weight / 100.0,
                periodic_amount: savings_rate * weight / 100.0,
                interval,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_weights_sum_to_hundred() {
        for template in TEMPLATES {
            let total: f64 = template.assets.iter().filter_map(|a| a.weight).sum();
            assert!((total - 100.0).abs() < 1e-9, "{}", template.key);
        }
    }

    #[test]
    fn test_load_template_distributes_amounts() {
        let positions = load_template("ESG", 10_000.0, 500.0, ContributionInterval::Quarterly);
        assert_eq!(positions.len(), 4);
        assert_eq!(positions[0].identifier, "LLY");
        assert_eq!(positions[0].display_name(), "Eli Lilly");
        assert!((positions[0].lump_sum - 3500.0).abs() < 1e-9);
        assert!((positions[0].periodic_amount - 175.0).abs() < 1e-9);
        assert!(
            positions
                .iter()
                .all(|p| p.interval == ContributionInterval::Quarterly)
        );
    }

    #[test]
    fn test_lookup_by_display_name() {
        let template = find_template("balanced (multi-asset)").unwrap();
        assert_eq!(template.key, "balanced");
    }

    #[test]
    fn test_unknown_template_is_empty() {
        assert!(load_template("crypto", 1000.0, 10.0, ContributionInterval::Monthly).is_empty());
        assert!(find_template("crypto").is_none());
    }
}
