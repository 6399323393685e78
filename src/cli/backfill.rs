use super::ui;
use crate::backfill::{BackfillReport, DateStatus};
use crate::service::RateService;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;
use std::time::Duration;

pub async fn run(
    service: &RateService,
    source: &str,
    target: &str,
    from: NaiveDate,
    to: NaiveDate,
    wait: bool,
) -> Result<()> {
    let id = service.submit_backfill(source, target, from, to)?;
    println!("Submitted backfill job {id} for {source}/{target} over {from}..{to}");

    if !wait {
        println!(
            "{}",
            ui::style_text(
                "The job runs in the background; pass --wait to watch it finish.",
                ui::StyleType::Subtle
            )
        );
        return Ok(());
    }

    let total = (to - from).num_days() as u64 + 1;
    let pb = ui::new_progress_bar(total, true);
    pb.set_message("Backfilling rates...");

    let report = loop {
        let Some(report) = service.backfill_report(id) else {
            anyhow::bail!("Backfill job {id} is gone");
        };
        pb.set_position((report.succeeded() + report.skipped() + report.failed()) as u64);
        if report.is_complete() || report.cancelled {
            break report;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };
    pb.finish_and_clear();

    display_report(&report);
    Ok(())
}

fn display_report(report: &BackfillReport) {
    let summary = format!(
        "Backfill {}/{} over {}..{}: {} fetched, {} already stored, {} failed",
        report.source,
        report.target,
        report.from,
        report.to,
        report.succeeded(),
        report.skipped(),
        report.failed()
    );
    println!("{}", ui::style_text(&summary, ui::StyleType::TotalLabel));
    if report.cancelled {
        println!(
            "{}",
            ui::style_text(
                &format!("Cancelled with {} dates outstanding.", report.outstanding()),
                ui::StyleType::Error
            )
        );
    }

    let failures: Vec<_> = report
        .statuses
        .iter()
        .filter(|(_, status)| matches!(status, DateStatus::Failed { .. }))
        .collect();
    if failures.is_empty() {
        return;
    }

    ui::print_separator();
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Date"), ui::header_cell("Status")]);
    for (date, status) in failures {
        table.add_row(vec![Cell::new(date.to_string()), ui::status_cell(status)]);
    }
    println!("{table}");
}
