use super::ui;
use crate::service::RateService;
use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;

pub async fn run(
    service: &RateService,
    amount: Decimal,
    source: &str,
    target: &str,
    date: NaiveDate,
) -> Result<()> {
    let conversion = service.convert(amount, source, target, date).await?;
    let rate = &conversion.rate;

    println!(
        "{} {} = {} {}",
        conversion.amount,
        rate.source,
        ui::style_text(&conversion.converted.to_string(), ui::StyleType::TotalValue),
        rate.target
    );

    let attribution = match &rate.provider {
        Some(provider) => format!(
            "rate {} on {} from {} via {}",
            rate.rate, rate.date, rate.origin, provider
        ),
        None => format!("rate {} on {}", rate.rate, rate.date),
    };
    println!("{}", ui::style_text(&attribution, ui::StyleType::Subtle));
    Ok(())
}
