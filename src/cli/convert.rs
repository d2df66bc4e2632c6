use super::ui;
use crate::core::engine::ConversionEngine;
use crate::core::format::format_amount;
use crate::core::session::{ConversionReport, ConversionSession, SessionLimits, Toggled};
use anyhow::{Result, bail};
use chrono_tz::Tz;
use tracing::info;

/// Renders one row per target, in selection order, with failures inline.
pub fn display_report(report: &ConversionReport, timezone: Tz) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell("Amount"),
        ui::header_cell(&format!("Rate (1 {})", report.source)),
    ]);
    for line in &report.lines {
        match &line.outcome {
            Ok(converted) => table.add_row(vec![
                ui::amount_cell(line.target.to_string()),
                ui::result_cell(format_amount(converted.value)),
                ui::amount_cell(format_amount(converted.rate)),
            ]),
            Err(e) => table.add_row(vec![
                ui::amount_cell(line.target.to_string()),
                ui::error_cell("N/A"),
                ui::error_cell(&e.to_string()),
            ]),
        };
    }

    let mut output = format!(
        "{}\n{}",
        ui::style_text(
            &format!("{} {}", format_amount(report.amount), report.source),
            ui::StyleType::Title
        ),
        table
    );
    if let Some(as_of) = report.as_of() {
        let as_of = as_of.with_timezone(&timezone).format("%Y-%m-%d %H:%M %Z");
        output.push_str(&format!(
            "\n{} {}",
            ui::style_text("Rates as of:", ui::StyleType::Label),
            ui::style_text(&as_of.to_string(), ui::StyleType::Subtle)
        ));
    }
    output
}

/// Drives a single session through pick, toggles and amount submission.
pub async fn convert(
    engine: &ConversionEngine,
    limits: SessionLimits,
    amount: &str,
    source: &str,
    targets: &[String],
) -> Result<ConversionReport> {
    let mut session = ConversionSession::new(limits);
    session.pick(source)?;
    for target in targets {
        if session.toggle(target)? == Toggled::Removed {
            bail!("Currency {} is listed more than once", target.trim().to_uppercase());
        }
    }
    session.request_amount()?;
    let report = session.submit_amount(amount, engine).await?;
    info!(
        source = %report.source,
        targets = report.lines.len(),
        "Conversion completed"
    );
    Ok(report)
}

pub async fn run(
    engine: &ConversionEngine,
    limits: SessionLimits,
    timezone: Tz,
    amount: &str,
    source: &str,
    targets: &[String],
) -> Result<()> {
    let pb = ui::new_spinner("Converting");
    let report = convert(engine, limits, amount, source, targets).await;
    pb.finish_and_clear();

    println!("{}", display_report(&report?, timezone));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{CachePolicy, RateCache};
    use crate::core::currency::Currency;
    use crate::core::error::ConversionError;
    use crate::core::rates::{RateSource, RateTable};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedSource;

    #[async_trait]
    impl RateSource for FixedSource {
        async fn fetch(&self) -> anyhow::Result<RateTable> {
            Ok(RateTable::new([(Currency::Usd, 12700.0), (Currency::Eur, 13600.0)]))
        }
    }

    fn engine() -> ConversionEngine {
        ConversionEngine::new(RateCache::new(Arc::new(FixedSource), CachePolicy::default()))
    }

    fn targets(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_convert_keeps_target_order() {
        let report = convert(
            &engine(),
            SessionLimits::default(),
            "100",
            "usd",
            &targets(&["UZS", "EUR", "RUB"]),
        )
        .await
        .unwrap();

        let order: Vec<Currency> = report.lines.iter().map(|l| l.target).collect();
        assert_eq!(order, vec![Currency::Uzs, Currency::Eur, Currency::Rub]);
        assert_eq!(report.lines[0].outcome.as_ref().unwrap().value, 1_270_000.0);
        assert_eq!(
            report.lines[2].outcome,
            Err(ConversionError::RatesUnavailable)
        );

        let rendered = display_report(&report, chrono_tz::Asia::Tashkent);
        assert!(rendered.contains("1,270,000"));
        assert!(rendered.contains("Exchange rates are not available"));
    }

    #[tokio::test]
    async fn test_convert_rejects_bad_input() {
        let engine = engine();
        let limits = SessionLimits::default();

        let err = convert(&engine, limits.clone(), "100", "USD", &targets(&["EUR", "eur"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("listed more than once"));

        let err = convert(&engine, limits.clone(), "100", "USD", &targets(&["USD"]))
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConversionError>(),
            Some(&ConversionError::SameAsSource(Currency::Usd))
        );

        let err = convert(&engine, limits.clone(), "abc", "USD", &targets(&["EUR"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConversionError>(),
            Some(ConversionError::AmountOutOfRange { .. })
        ));

        let err = convert(&engine, limits, "100", "XYZ", &targets(&["EUR"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConversionError>(),
            Some(ConversionError::InvalidCurrency(_))
        ));
    }
}
