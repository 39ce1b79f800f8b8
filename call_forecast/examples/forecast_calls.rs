//! Forecast both call directions and write run reports.
//!
//! Usage: `forecast_calls [records.csv] [output_dir]`
//!
//! Without a records file, four months of calls are simulated. Set
//! `RUST_LOG=call_forecast=debug` for per-model detail.

use call_forecast::config::EnsembleConfig;
use call_forecast::health;
use call_forecast::holidays::HolidayCalendar;
use call_forecast::pipeline::ForecastPipeline;
use call_forecast::records::{load_records_csv, Direction};
use call_forecast::report::RunReport;
use call_forecast::utils::simulate_records;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let records_path = args.next();
    let output_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("target").join("reports"));

    let (records, cutoff) = match records_path {
        Some(path) => {
            println!("Loading call records from: {}", path);
            (load_records_csv(&path)?, None)
        }
        None => {
            let start = NaiveDate::from_ymd_opt(2024, 3, 1).ok_or("invalid start date")?;
            let mut records = simulate_records(start, 120, Direction::Inbound, 140.0, 7)?;
            records.extend(simulate_records(start, 120, Direction::Outbound, 55.0, 8)?);
            println!("Simulated {} call records", records.len());
            (records, NaiveDate::from_ymd_opt(2024, 6, 28))
        }
    };

    let mut holidays = HolidayCalendar::new();
    for (date, name) in [
        ((2024, 5, 1), "Día del Trabajo"),
        ((2024, 5, 21), "Día de las Glorias Navales"),
        ((2024, 6, 20), "Día Nacional de los Pueblos Indígenas"),
        ((2024, 6, 29), "San Pedro y San Pablo"),
        ((2024, 7, 16), "Virgen del Carmen"),
    ] {
        if let Some(date) = NaiveDate::from_ymd_opt(date.0, date.1, date.2) {
            holidays.add(date, name);
        }
    }

    let config = EnsembleConfig::default();
    let pipeline = ForecastPipeline::new(config.clone())?
        .with_cutoff(cutoff)
        .with_holidays(holidays);

    let mut assessments = Vec::new();
    for (direction, result) in pipeline.run_all(&records) {
        let run = match result {
            Ok(run) => run,
            Err(e) => {
                println!("{}: no forecast ({})", direction, e);
                continue;
            }
        };

        println!("\n{} forecast", direction);
        if let Some(audit) = &run.audit {
            let peaks: Vec<u32> = audit.patterns.peak_hours.iter().map(|h| h.hour).collect();
            println!(
                "  history: {:.1} calls/workday, {} outlier days, {} duplicates, peak hours {:?}",
                audit.volumes.mean,
                audit.volumes.outlier_days(),
                audit.quality.duplicate_records,
                peaks
            );
        }
        for (kind, weight) in run.weights.iter() {
            let mae = run.handle(kind).map(|h| h.cv_mae).unwrap_or(f64::NAN);
            println!("  {:<18} weight {:.3}  cv MAE {:.2}", kind, weight, mae);
        }
        for point in run.forecast.iter().take(7) {
            println!(
                "  {}  {:>7.1}  [{:>6.1}, {:>6.1}]{}",
                point.date,
                point.yhat_ensemble,
                point.yhat_lower,
                point.yhat_upper,
                if point.is_holiday { "  holiday" } else { "" }
            );
        }
        for alert in run.alerts.iter().take(5) {
            println!("  [{}] {} {}", alert.severity, alert.date, alert.message);
        }
        for warning in &run.warnings {
            println!("  warning: {}", warning);
        }

        let report = RunReport::from_run(&run, &config)?;
        let files = report.write_to_dir(&output_dir)?;
        println!("  report: {}", files.json.display());
        assessments.push(report.health);
    }

    if let Some((score, status)) = health::overall(&assessments) {
        println!("\nSystem health: {:?} ({:.0}%)", status, score);
    }

    Ok(())
}
