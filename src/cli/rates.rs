use super::ui;
use crate::core::cache::RateSnapshot;
use crate::core::currency::Currency;
use crate::core::engine::ConversionEngine;
use crate::core::format::format_amount;
use anyhow::Result;
use chrono_tz::Tz;

/// Renders a snapshot as a table of base-currency prices.
pub fn display_rates(snapshot: &RateSnapshot, timezone: Tz) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell(&format!("1 unit in {}", Currency::BASE)),
        ui::header_cell(&format!("1 {} in unit", Currency::BASE)),
    ]);
    for (currency, rate) in snapshot.table.iter() {
        table.add_row(vec![
            ui::amount_cell(currency.to_string()),
            ui::result_cell(format_amount(rate)),
            ui::amount_cell(format_amount(1.0 / rate)),
        ]);
    }

    let updated = snapshot
        .fetched_at
        .with_timezone(&timezone)
        .format("%Y-%m-%d %H:%M %Z")
        .to_string();
    format!(
        "{}\n{}\n{} {}",
        ui::style_text("Central Bank of Uzbekistan rates", ui::StyleType::Title),
        table,
        ui::style_text("Updated:", ui::StyleType::Label),
        ui::style_text(&updated, ui::StyleType::Subtle)
    )
}

pub async fn run(engine: &ConversionEngine, timezone: Tz) -> Result<()> {
    let pb = ui::new_spinner("Fetching rates");
    let snapshot = engine.cache().usable_snapshot().await;
    pb.finish_and_clear();

    let snapshot = snapshot?;
    println!("{}", display_rates(&snapshot, timezone));
    Ok(())
}
