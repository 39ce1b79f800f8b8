use call_forecast::config::EnsembleConfig;
use call_forecast::holidays::{HolidayCalendar, HolidayCategory};
use call_forecast::models::ModelKind;
use call_forecast::pipeline::{DirectionRun, ForecastPipeline};
use call_forecast::records::{load_records_csv, CallRecord, Direction};
use call_forecast::report::{read_forecast_csv, RunReport};
use call_forecast::series::TimeSeriesBuilder;
use call_forecast::utils::simulate_records;
use call_forecast::validation::TemporalCrossValidator;
use call_forecast::{ForecastError, Warning};
use chrono::NaiveDate;
use rstest::rstest;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn both_directions(days: usize, seed: u64) -> Vec<CallRecord> {
    let start = date(2024, 1, 1);
    let mut records = simulate_records(start, days, Direction::Inbound, 120.0, seed).unwrap();
    records.extend(simulate_records(start, days, Direction::Outbound, 45.0, seed + 100).unwrap());
    records
}

fn assert_run_invariants(run: &DirectionRun) {
    let last_historical = run.series.last_date().unwrap();
    assert!(run.series.is_contiguous());

    // no overlap with history, consecutive days
    assert!(run.forecast[0].date > last_historical);
    for pair in run.forecast.windows(2) {
        assert_eq!((pair[1].date - pair[0].date).num_days(), 1);
    }

    for p in &run.forecast {
        assert!(p.yhat_ensemble >= 0.0 && p.yhat_lower >= 0.0 && p.yhat_upper >= 0.0);
        assert!(p.model_predictions.values().all(|v| *v >= 0.0));
        assert!(p.yhat_lower <= p.yhat_ensemble && p.yhat_ensemble <= p.yhat_upper);
    }

    approx::assert_relative_eq!(run.weights.sum(), 1.0, epsilon = 1e-9);
    assert!(run.weights.iter().all(|(_, w)| w > 0.0));

    let keys: Vec<(u8, NaiveDate)> = run.alerts.iter().map(|a| (a.severity.rank(), a.date)).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_full_ensemble_both_directions() {
    let records = both_directions(120, 11);
    let pipeline = ForecastPipeline::new(EnsembleConfig::default())
        .unwrap()
        .with_cutoff(Some(date(2024, 4, 29)));

    let runs = pipeline.run_all(&records);
    for direction in Direction::ALL {
        let run = runs[&direction].as_ref().unwrap();
        assert_eq!(run.direction, direction);
        assert_eq!(run.forecast.len(), 28);
        assert_eq!(run.forecast[0].date, date(2024, 4, 30));
        assert_run_invariants(run);

        for handle in &run.handles {
            assert!(handle.cv_mae.is_finite() && handle.cv_mae >= 0.0);
            assert_eq!(handle.trained_until, date(2024, 4, 29));
            assert_eq!(handle.training_horizon, 28);
        }
        // every fold trains strictly before its test window
        for fold in &run.cv.folds {
            assert!(fold.train_end < fold.test_start);
        }
    }
}

#[rstest]
#[case(60, 1)]
#[case(75, 2)]
#[case(100, 3)]
fn test_invariants_hold_across_histories(#[case] days: usize, #[case] seed: u64) {
    let records = both_directions(days, seed);
    let config = EnsembleConfig {
        forecast_horizon_days: 21,
        active_models: vec![ModelKind::Arima, ModelKind::Decomposable],
        ..EnsembleConfig::default()
    };
    let pipeline = ForecastPipeline::new(config).unwrap().with_cutoff(Some(date(2024, 12, 31)));

    for (_, result) in pipeline.run_all(&records) {
        let run = result.unwrap();
        assert_eq!(run.series.len(), days);
        assert_run_invariants(&run);
    }
}

#[test]
fn test_builder_is_idempotent() {
    let records = both_directions(45, 9);
    let builder = TimeSeriesBuilder::new().with_cutoff(date(2024, 2, 10));
    let first = builder.build(&records, Direction::Outbound).unwrap();
    let second = builder.build(&records, Direction::Outbound).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.last_date(), Some(date(2024, 2, 10)));
}

#[test]
fn test_cross_validation_folds_never_leak() {
    for len in [30, 64, 120, 365] {
        let cv = TemporalCrossValidator::new(7, 5).unwrap();
        for fold in cv.plan(len) {
            assert!(fold.train_range().end <= fold.test_start);
            assert!(fold.test_end <= len);
            assert!(fold.train_end >= fold.test_end - fold.test_start);
        }
    }
}

#[test]
fn test_short_history_is_fatal_for_that_direction_only() {
    let mut records = simulate_records(date(2024, 1, 1), 60, Direction::Inbound, 100.0, 21).unwrap();
    records.extend(simulate_records(date(2024, 2, 25), 6, Direction::Outbound, 30.0, 22).unwrap());
    let config = EnsembleConfig {
        active_models: vec![ModelKind::Decomposable],
        ..EnsembleConfig::default()
    };
    let runs = ForecastPipeline::new(config)
        .unwrap()
        .with_cutoff(Some(date(2024, 3, 1)))
        .run_all(&records);

    assert!(runs[&Direction::Inbound].is_ok());
    match &runs[&Direction::Outbound] {
        Err(ForecastError::InsufficientData { available, required, .. }) => {
            assert!(*available <= 6);
            assert_eq!(*required, 10);
        }
        other => panic!("expected insufficient data, got {:?}", other.as_ref().map(|r| r.direction)),
    }
}

#[test]
fn test_outbound_holiday_policy() {
    let records = both_directions(90, 31);
    let holiday = date(2024, 4, 5);
    let calendar = HolidayCalendar::from_entries([
        (date(2024, 1, 1), "Año Nuevo"),
        (holiday, "Feriado regional"),
    ]);
    let config = EnsembleConfig {
        forecast_horizon_days: 14,
        active_models: vec![ModelKind::Arima, ModelKind::Decomposable],
        ..EnsembleConfig::default()
    };
    let runs = ForecastPipeline::new(config)
        .unwrap()
        .with_cutoff(Some(date(2024, 3, 30)))
        .with_holidays(calendar)
        .run_all(&records);

    let outbound = runs[&Direction::Outbound].as_ref().unwrap();
    assert!(outbound.warnings.contains(&Warning::HolidaysImputed { days: 1 }));
    let inbound = runs[&Direction::Inbound].as_ref().unwrap();
    assert!(!inbound.warnings.iter().any(|w| matches!(w, Warning::HolidaysImputed { .. })));

    for run in [inbound, outbound] {
        let point = run.forecast.iter().find(|p| p.date == holiday).unwrap();
        assert!(point.is_holiday);
        assert_eq!(point.holiday_category, Some(HolidayCategory::Other));
        assert_eq!(run.forecast.iter().filter(|p| p.is_holiday).count(), 1);
    }
}

#[test]
fn test_report_round_trip() {
    let records = both_directions(90, 41);
    let config = EnsembleConfig {
        active_models: vec![ModelKind::Arima, ModelKind::Decomposable, ModelKind::GradientBoosting],
        ..EnsembleConfig::default()
    };
    let pipeline = ForecastPipeline::new(config.clone())
        .unwrap()
        .with_cutoff(Some(date(2024, 3, 30)));
    let run = pipeline.run_direction(&records, Direction::Inbound).unwrap();

    let report = RunReport::from_run(&run, &config).unwrap();
    assert_eq!(report.models.len(), run.handles.len());
    assert_eq!(report.metadata.forecast_start, Some(date(2024, 3, 31)));
    approx::assert_relative_eq!(report.summary.total_calls, run.forecast.iter().map(|p| p.yhat_ensemble).sum::<f64>());
    assert_eq!(report.health.active_models, run.weights.len());

    let dir = tempdir().unwrap();
    let files = report.write_to_dir(dir.path().join("reports")).unwrap();

    let rows = read_forecast_csv(&files.csv).unwrap();
    assert_eq!(rows.len(), run.forecast.len());
    assert_eq!(rows[0].date, date(2024, 3, 31));
    approx::assert_relative_eq!(rows[0].forecast, run.forecast[0].yhat_ensemble, epsilon = 1e-9);

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&files.json).unwrap()).unwrap();
    assert_eq!(json["metadata"]["direction"], "inbound");
    assert_eq!(json["forecast"].as_array().unwrap().len(), 28);
    assert!(json["forecast"][0]["yhat_arima"].is_number());
    assert!(json["weights"]["decomposable"].is_number());
    assert!(json["forecast"][0].get("holiday_category").is_none());

    let audit = &json["audit"];
    assert_eq!(audit["direction"], "inbound");
    assert_eq!(audit["quality"]["duplicate_records"], 0);
    assert_eq!(audit["patterns"]["peak_hours"].as_array().unwrap().len(), 3);
    assert!(audit["volumes"]["median"].is_number());
}

#[test]
fn test_config_file_overrides_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{"forecast_horizon_days": 14, "n_folds": 3, "active_models": ["sarima", "prophet"]}}"#
    )
    .unwrap();

    let config = EnsembleConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.forecast_horizon_days, 14);
    assert_eq!(config.n_folds, 3);
    assert_eq!(config.cv_horizon_days, 7);
    assert_eq!(config.active_models, vec![ModelKind::Arima, ModelKind::Decomposable]);

    let mut bad = NamedTempFile::new().unwrap();
    writeln!(bad, r#"{{"min_weight": 0.7, "max_weight": 0.5}}"#).unwrap();
    assert!(matches!(
        EnsembleConfig::from_json_file(bad.path()),
        Err(ForecastError::InvalidParameter(_))
    ));
}

#[test]
fn test_records_csv_feeds_the_builder() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "timestamp,direction,answered,phone").unwrap();
    for day in 1..=12 {
        writeln!(file, "2024-06-{:02} 09:15:00,in,1,+56221234567", day).unwrap();
        writeln!(file, "2024-06-{:02} 10:30:00,entrante,0,+56221234568", day).unwrap();
        writeln!(file, "2024-06-{:02} 11:00:00,saliente,si,+56221234569", day).unwrap();
    }
    writeln!(file, "not a date,in,1,+56220000000").unwrap();

    let records = load_records_csv(file.path()).unwrap();
    assert_eq!(records.len(), 36);

    let series = TimeSeriesBuilder::new()
        .with_cutoff(date(2024, 6, 30))
        .build(&records, Direction::Inbound)
        .unwrap();
    assert_eq!(series.len(), 12);
    assert!(series.values().iter().all(|v| *v == 2.0));
    assert!(series.answered().iter().all(|a| *a == 1));
}
