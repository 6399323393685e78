use super::ui;
use crate::core::rate::ResolvedRate;
use crate::resolver::RangeResolution;
use crate::service::RateService;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::{Cell, CellAlignment};

pub fn rates_table(rates: &[ResolvedRate]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Pair"),
        ui::header_cell("Rate"),
        ui::header_cell("Origin"),
        ui::header_cell("Provider"),
    ]);

    for rate in rates {
        table.add_row(vec![
            Cell::new(rate.date.to_string()),
            Cell::new(format!("{}/{}", rate.source, rate.target)),
            Cell::new(rate.rate.to_string()).set_alignment(CellAlignment::Right),
            ui::origin_cell(rate.origin),
            ui::format_optional_cell(rate.provider.as_deref(), |p| p.to_string()),
        ]);
    }
    table.to_string()
}

pub async fn run(
    service: &RateService,
    source: &str,
    target: &str,
    date: NaiveDate,
) -> Result<()> {
    let resolved = service.rate(source, target, date).await?;
    println!("{}", rates_table(std::slice::from_ref(&resolved)));
    Ok(())
}

pub async fn run_range(
    service: &RateService,
    source: &str,
    target: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<()> {
    let resolution = service.rates_range(source, target, from, to).await?;
    display_resolution(&resolution);
    Ok(())
}

fn display_resolution(resolution: &RangeResolution) {
    if !resolution.rates.is_empty() {
        println!("{}", rates_table(&resolution.rates));
    }
    if !resolution.missing.is_empty() {
        println!(
            "{}",
            ui::style_text(
                &format!(
                    "No rate available for {} of the requested dates.",
                    resolution.missing.len()
                ),
                ui::StyleType::Error
            )
        );
    }
    if let Some(job) = resolution.backfill {
        println!(
            "{}",
            ui::style_text(
                &format!("Submitted backfill job {job}; rerun once it completes."),
                ui::StyleType::Subtle
            )
        );
    }
}
