use super::ui;
use crate::core::templates::{PortfolioTemplate, TEMPLATES};
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

fn display_template(template: &PortfolioTemplate) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Name"),
        ui::header_cell("Weight"),
    ]);
    let equal_weight = 100.0 / template.assets.len() as f64;
    for asset in template.assets {
        table.add_row(vec![
            Cell::new(asset.ticker),
            Cell::new(asset.name),
            Cell::new(format!("{:.1}%", asset.weight.unwrap_or(equal_weight)))
                .set_alignment(CellAlignment::Right),
        ]);
    }

    format!(
        "{} ({})\n{}\n{}",
        ui::style_text(template.display_name, ui::StyleType::Title),
        template.key,
        ui::style_text(template.description, ui::StyleType::Note),
        table
    )
}

/// Renders every model portfolio usable as `portfolio.template`.
pub fn display_templates() -> String {
    TEMPLATES
        .iter()
        .map(display_template)
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn run() -> Result<()> {
    println!("{}", display_templates());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_template_is_listed() {
        let output = display_templates();
        for template in TEMPLATES {
            assert!(output.contains(template.key));
            for asset in template.assets {
                assert!(output.contains(asset.ticker), "{}", asset.ticker);
            }
        }
        assert!(output.contains("35.0%"));
    }
}
