//! The fixed yellow-taxi trip-record schema.
//!
//! Source files carry 20 data fields; the destination table adds an identity
//! column. `cbd_congestion_fee` only exists in files published from 2025
//! onward and is null for older months.

use polars::prelude::*;

pub const VENDOR_ID: &str = "VendorID";
pub const PICKUP_DATETIME: &str = "tpep_pickup_datetime";
pub const DROPOFF_DATETIME: &str = "tpep_dropoff_datetime";
pub const PASSENGER_COUNT: &str = "passenger_count";
pub const TRIP_DISTANCE: &str = "trip_distance";
pub const RATECODE_ID: &str = "RatecodeID";
pub const STORE_AND_FWD_FLAG: &str = "store_and_fwd_flag";
pub const PU_LOCATION_ID: &str = "PULocationID";
pub const DO_LOCATION_ID: &str = "DOLocationID";
pub const PAYMENT_TYPE: &str = "payment_type";
pub const CBD_CONGESTION_FEE: &str = "cbd_congestion_fee";

/// Default format accepted by date enforcement.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kilometres per statute mile.
pub const KM_PER_MILE: f64 = 1.609344;

/// Default USD → EUR rate applied to monetary columns.
pub const USD_TO_EUR: f64 = 0.92;

/// Columns that must be non-null for a trip to be kept.
pub const REQUIRED_TRIP_COLUMNS: [&str; 19] = [
    VENDOR_ID,
    PICKUP_DATETIME,
    DROPOFF_DATETIME,
    PASSENGER_COUNT,
    TRIP_DISTANCE,
    RATECODE_ID,
    STORE_AND_FWD_FLAG,
    PU_LOCATION_ID,
    DO_LOCATION_ID,
    PAYMENT_TYPE,
    "fare_amount",
    "extra",
    "mta_tax",
    "tip_amount",
    "tolls_amount",
    "improvement_surcharge",
    "total_amount",
    "congestion_surcharge",
    "airport_fee",
];

/// Pickup and dropoff timestamps.
pub const TRIP_DATETIME_COLUMNS: [&str; 2] = [PICKUP_DATETIME, DROPOFF_DATETIME];

/// Monetary columns converted by default. `cbd_congestion_fee` is left out
/// because most months do not have it.
pub const MONETARY_COLUMNS: [&str; 9] = [
    "fare_amount",
    "extra",
    "mta_tax",
    "tip_amount",
    "tolls_amount",
    "improvement_surcharge",
    "total_amount",
    "congestion_surcharge",
    "airport_fee",
];

/// Storage class of a trip field in the destination table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Timestamp,
    Flag,
}

impl FieldKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "BIGINT",
            Self::Float => "DOUBLE PRECISION",
            Self::Timestamp => "TIMESTAMP",
            Self::Flag => "VARCHAR(1)",
        }
    }

    /// Engine dtype a column is cast to before it is written.
    pub fn dtype(self) -> DataType {
        match self {
            Self::Integer => DataType::Int64,
            Self::Float => DataType::Float64,
            Self::Timestamp => DataType::Datetime(TimeUnit::Microseconds, None),
            Self::Flag => DataType::String,
        }
    }
}

/// One field of the trip schema: its name in source files and its column in
/// the destination table.
#[derive(Clone, Copy, Debug)]
pub struct TripField {
    pub source: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

const fn field(source: &'static str, column: &'static str, kind: FieldKind) -> TripField {
    TripField {
        source,
        column,
        kind,
    }
}

pub const TRIP_FIELDS: [TripField; 20] = [
    field(VENDOR_ID, "vendor_id", FieldKind::Integer),
    field(PICKUP_DATETIME, "tpep_pickup_datetime", FieldKind::Timestamp),
    field(DROPOFF_DATETIME, "tpep_dropoff_datetime", FieldKind::Timestamp),
    field(PASSENGER_COUNT, "passenger_count", FieldKind::Integer),
    field(TRIP_DISTANCE, "trip_distance", FieldKind::Float),
    field(RATECODE_ID, "ratecode_id", FieldKind::Integer),
    field(STORE_AND_FWD_FLAG, "store_and_fwd_flag", FieldKind::Flag),
    field(PU_LOCATION_ID, "pickup_location_id", FieldKind::Integer),
    field(DO_LOCATION_ID, "dropoff_location_id", FieldKind::Integer),
    field(PAYMENT_TYPE, "payment_type", FieldKind::Integer),
    field("fare_amount", "fare_amount", FieldKind::Float),
    field("extra", "extra", FieldKind::Float),
    field("mta_tax", "mta_tax", FieldKind::Float),
    field("tip_amount", "tip_amount", FieldKind::Float),
    field("tolls_amount", "tolls_amount", FieldKind::Float),
    field("improvement_surcharge", "improvement_surcharge", FieldKind::Float),
    field("total_amount", "total_amount", FieldKind::Float),
    field("congestion_surcharge", "congestion_surcharge", FieldKind::Float),
    field("airport_fee", "airport_fee", FieldKind::Float),
    field(CBD_CONGESTION_FEE, "cbd_congestion_fee", FieldKind::Float),
];

pub fn trip_field(source: &str) -> Option<&'static TripField> {
    TRIP_FIELDS.iter().find(|f| f.source == source)
}

/// Bring a decoded file onto the canonical trip schema.
///
/// Publishers have changed the capitalisation of some fields over the years
/// (`Airport_fee`), so fields are matched case-insensitively and renamed to the
/// canonical spelling. A missing `cbd_congestion_fee` is added as an all-null
/// float column. Unknown extra columns are kept.
pub fn align_to_trip_schema(df: &DataFrame) -> PolarsResult<DataFrame> {
    let mut aligned = df.clone();
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    for field in &TRIP_FIELDS {
        if names.iter().any(|name| name == field.source) {
            continue;
        }
        if let Some(found) = names
            .iter()
            .find(|name| name.eq_ignore_ascii_case(field.source))
        {
            aligned.rename(found, field.source.into())?;
        }
    }

    let has_cbd = aligned
        .get_column_names()
        .iter()
        .any(|name| name.as_str() == CBD_CONGESTION_FEE);
    if !has_cbd {
        let nulls = Series::full_null(
            CBD_CONGESTION_FEE.into(),
            aligned.height(),
            &DataType::Float64,
        );
        aligned.with_column(nulls)?;
    }

    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_shape() {
        assert_eq!(TRIP_FIELDS.len(), 20);
        for name in REQUIRED_TRIP_COLUMNS.iter().chain(MONETARY_COLUMNS.iter()) {
            assert!(trip_field(name).is_some(), "{name} is not a trip field");
        }
        assert!(!REQUIRED_TRIP_COLUMNS.contains(&CBD_CONGESTION_FEE));
    }

    #[test]
    fn test_align_renames_case_variants_and_adds_cbd_fee() -> anyhow::Result<()> {
        let df = df!(
            "vendorid" => [1i32, 2],
            "Airport_fee" => [Some(1.75), None]
        )?;

        let aligned = align_to_trip_schema(&df)?;

        assert!(aligned.column(VENDOR_ID).is_ok());
        assert!(aligned.column("airport_fee").is_ok());
        assert!(aligned.column("Airport_fee").is_err());
        let cbd = aligned.column(CBD_CONGESTION_FEE)?;
        assert_eq!(cbd.null_count(), 2);
        assert_eq!(cbd.dtype(), &DataType::Float64);
        // input untouched
        assert!(df.column("Airport_fee").is_ok());
        Ok(())
    }

    #[test]
    fn test_align_keeps_existing_cbd_fee() -> anyhow::Result<()> {
        let df = df!(CBD_CONGESTION_FEE => [0.75, 0.0])?;
        let aligned = align_to_trip_schema(&df)?;
        assert_eq!(aligned.width(), 1);
        assert_eq!(aligned.column(CBD_CONGESTION_FEE)?.null_count(), 0);
        Ok(())
    }
}
