//! End-to-end cleaning of a month-shaped trip table.
//!
//! These tests run the built-in cleaning and custom specs through the public
//! API, from parquet on disk to the cleaned table.

use polars::prelude::*;
use taxi_etl::extract::read_trip_file;
use taxi_etl::pipeline::{PipelineSpec, Step, StepError, TransformError, apply, run_pipeline};
use taxi_etl::schema::{CBD_CONGESTION_FEE, PASSENGER_COUNT, PAYMENT_TYPE, TRIP_DISTANCE};

const FARES: [f64; 10] = [10.0, 11.0, 10.0, 12.0, 20.0, 11.0, 21.0, 13.0, 22.0, 12.0];
const PASSENGERS: [Option<i64>; 10] = [
    Some(1),
    Some(1),
    Some(1),
    Some(2),
    None,
    Some(1),
    None,
    Some(3),
    Some(1),
    Some(2),
];
const PAYMENTS: [i64; 10] = [1, 1, 1, 2, 1, 1, 1, 2, 9, 2];

/// Ten raw trips: rows 2, 5 and 9 repeat rows 0, 1 and 3 exactly, rows 4 and
/// 6 have no passenger count, row 8 has an unknown payment type.
fn raw_trips() -> DataFrame {
    let n = FARES.len();
    let pickups: Vec<String> = FARES
        .iter()
        .map(|fare| format!("2024-01-{:02} 08:00:00", *fare as i64 - 9))
        .collect();
    let dropoffs: Vec<String> = FARES
        .iter()
        .map(|fare| format!("2024-01-{:02} 08:25:00", *fare as i64 - 9))
        .collect();
    let constant = |name: &str, value: f64| -> Column { Series::new(name.into(), vec![value; n]).into() };
    let constant_int =
        |name: &str, value: i64| -> Column { Series::new(name.into(), vec![value; n]).into() };

    let columns: Vec<Column> = vec![
        constant_int("VendorID", 2),
        Series::new("tpep_pickup_datetime".into(), pickups).into(),
        Series::new("tpep_dropoff_datetime".into(), dropoffs).into(),
        Series::new(PASSENGER_COUNT.into(), PASSENGERS).into(),
        constant(TRIP_DISTANCE, 1.0),
        constant_int("RatecodeID", 1),
        Series::new("store_and_fwd_flag".into(), vec!["N"; n]).into(),
        constant_int("PULocationID", 161),
        constant_int("DOLocationID", 237),
        Series::new(PAYMENT_TYPE.into(), PAYMENTS).into(),
        Series::new("fare_amount".into(), FARES).into(),
        constant("extra", 1.0),
        constant("mta_tax", 0.5),
        constant("tip_amount", 2.0),
        constant("tolls_amount", 0.0),
        constant("improvement_surcharge", 1.0),
        constant("total_amount", 15.0),
        constant("congestion_surcharge", 2.5),
        constant("airport_fee", 0.0),
    ];
    DataFrame::new(columns).expect("fixture has unique column names")
}

fn fares(df: &DataFrame) -> Vec<Option<f64>> {
    df.column("fare_amount")
        .and_then(|c| c.f64().map(|ca| ca.into_iter().collect()))
        .expect("fare_amount is f64")
}

#[test]
fn test_default_cleaning_keeps_four_valid_trips_in_order() {
    let raw = raw_trips();
    let spec = PipelineSpec::default_trip_cleaning();

    let run = apply(&raw, &spec.steps).expect("default cleaning succeeds");

    assert_eq!(run.table.height(), 4);
    assert_eq!(
        fares(&run.table),
        vec![Some(10.0), Some(11.0), Some(12.0), Some(13.0)]
    );
    assert_eq!(run.report.rows_before, 10);
    assert_eq!(run.report.rows_after, 4);
    assert_eq!(run.report.steps_applied, spec.steps.len());
    assert!(matches!(
        run.table.column("tpep_pickup_datetime").map(|c| c.dtype().clone()),
        Ok(DataType::Datetime(TimeUnit::Microseconds, None))
    ));
    // the caller's table is untouched
    assert_eq!(raw.height(), 10);
}

#[test]
fn test_parquet_file_through_default_cleaning() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("yellow_tripdata_2024-01.parquet");
    let output = dir.path().join("cleaned").join("2024-01.parquet");
    let mut raw = raw_trips();
    ParquetWriter::new(std::fs::File::create(&input)?).finish(&mut raw)?;

    let aligned = read_trip_file(&input)?;
    assert_eq!(aligned.width(), raw.width() + 1);
    assert_eq!(aligned.column(CBD_CONGESTION_FEE)?.null_count(), 10);

    let report = run_pipeline(&PipelineSpec::default_trip_cleaning(), &input, &output)?;
    assert_eq!(report.rows_after, 4);

    let written = ParquetReader::new(std::fs::File::open(&output)?).finish()?;
    assert_eq!(written.height(), 4);
    Ok(())
}

#[test]
fn test_custom_spec_from_json() -> anyhow::Result<()> {
    let spec = PipelineSpec::from_json(
        r#"{
            "version": "0.1",
            "name": "metric_euro",
            "steps": [
                {"op": "deduplicate"},
                {"op": "normalize_strings", "columns": ["store_and_fwd_flag"]},
                {"op": "allow_list_filter", "column": "store_and_fwd_flag", "values": ["n"]},
                {"op": "convert_distance_units"},
                {"op": "convert_currency_columns", "columns": ["fare_amount"]},
                {"op": "rename_columns", "mapping": {"trip_distance": "trip_distance_km"}}
            ]
        }"#,
    )?;

    let run = apply(&raw_trips(), &spec.steps)?;

    assert_eq!(run.table.height(), 7);
    assert_eq!(
        fares(&run.table)[..2],
        [Some(9.2), Some(10.12)]
    );
    let km = run.table.column("trip_distance_km")?.f64()?.get(0);
    assert_eq!(km, Some(1.61));
    assert!(run.table.column(TRIP_DISTANCE).is_err());
    Ok(())
}

#[test]
fn test_failing_step_reports_position() {
    let mut mapping = std::collections::BTreeMap::new();
    mapping.insert("VendorID".to_owned(), "PULocationID".to_owned());
    let steps = vec![Step::Deduplicate, Step::RenameColumns { mapping }];
    let raw = raw_trips();

    let err: StepError = apply(&raw, &steps).expect_err("PULocationID already exists");

    assert_eq!(err.index, 1);
    assert_eq!(err.operation, "rename_columns");
    assert!(matches!(
        err.kind(),
        TransformError::DuplicateColumn { column } if column == "PULocationID"
    ));
    assert!(raw.column("VendorID").is_ok());
}

#[test]
fn test_unparseable_dates_abort_cleaning() {
    let mut raw = raw_trips();
    raw.replace(
        "tpep_pickup_datetime",
        Series::new("tpep_pickup_datetime".into(), vec!["01/02/2024"; 10]),
    )
    .expect("same length");

    let err = apply(&raw, &PipelineSpec::default_trip_cleaning().steps)
        .expect_err("no pickup parses");

    assert_eq!(err.operation, "enforce_date_format");
    assert!(matches!(err.kind(), TransformError::AllValuesInvalid { .. }));
}
