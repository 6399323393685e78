use super::rate::rates_table;
use super::ui;
use crate::service::RateService;
use anyhow::Result;
use chrono::NaiveDate;

pub async fn run(service: &RateService, base: Option<&str>, date: NaiveDate) -> Result<()> {
    let pairs = service.currencies().len().saturating_sub(1) as u64;
    let pb = ui::new_progress_bar(pairs, true);
    pb.set_message("Refreshing rates...");

    let outcome = service.refresh(base, date, &|| pb.inc(1)).await?;
    pb.finish_and_clear();

    if !outcome.refreshed.is_empty() {
        println!("{}", rates_table(&outcome.refreshed));
    }
    if !outcome.failures.is_empty() {
        println!(
            "{}",
            ui::style_text(
                &format!("{} currencies failed to refresh:", outcome.failures.len()),
                ui::StyleType::Error
            )
        );
        for (code, err) in &outcome.failures {
            println!("  {code}: {err}");
        }
    }
    Ok(())
}
