//! The catalog of cleaning operations.
//!
//! Every operation borrows its input table and returns a new one; the input is
//! never modified. Column preconditions are checked up front through the
//! assertions in [`super::validation`], before any column is rewritten.

use super::error::TransformError;
use super::spec::AllowedValue;
use super::validation::{SemanticType, column_exists, is_numeric_column, is_string_column};
use crate::schema::{KM_PER_MILE, TRIP_DISTANCE, USD_TO_EUR};
use polars::prelude::*;
use std::collections::{BTreeMap, HashSet};

type Result<T> = std::result::Result<T, TransformError>;

/// One method per operation kind. The executor dispatches every [`super::Step`]
/// through this trait, so a caller can swap in its own conversion rules by
/// overriding a single method and keeping the rest.
pub trait Catalog {
    fn deduplicate(&self, df: &DataFrame) -> Result<DataFrame> {
        deduplicate(df)
    }

    fn allow_list_filter(
        &self,
        df: &DataFrame,
        column: &str,
        values: &[AllowedValue],
    ) -> Result<DataFrame> {
        allow_list_filter(df, column, values)
    }

    fn drop_null_rows(&self, df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
        drop_null_rows(df, columns)
    }

    fn normalize_strings(&self, df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
        normalize_strings(df, columns)
    }

    fn enforce_date_format(
        &self,
        df: &DataFrame,
        columns: &[String],
        format: &str,
    ) -> Result<DataFrame> {
        enforce_date_format(df, columns, format)
    }

    fn rename_columns(
        &self,
        df: &DataFrame,
        mapping: &BTreeMap<String, String>,
    ) -> Result<DataFrame> {
        rename_columns(df, mapping)
    }

    fn convert_distance_units(&self, df: &DataFrame) -> Result<DataFrame> {
        convert_distance_units(df)
    }

    fn convert_currency_columns(
        &self,
        df: &DataFrame,
        columns: &[String],
        rate: f64,
    ) -> Result<DataFrame> {
        convert_currency_columns(df, columns, |amount| convert_at_rate(amount, rate))
    }
}

/// The catalog with the stock behaviour of every operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardCatalog;

impl Catalog for StandardCatalog {}

/// Remove rows identical across all columns, keeping the first occurrence in
/// its original position.
pub fn deduplicate(df: &DataFrame) -> Result<DataFrame> {
    Ok(df.unique_stable(None, UniqueKeepStrategy::First, None)?)
}

/// Keep only rows whose value in `column` is one of `values`. Nulls are never
/// members of the allow-list.
pub fn allow_list_filter(
    df: &DataFrame,
    column: &str,
    values: &[AllowedValue],
) -> Result<DataFrame> {
    let target = column_exists(df, column)?;
    let allowed = allowed_series(column, values, target.dtype())?;

    let filtered = df
        .clone()
        .lazy()
        .filter(col(column).is_in(lit(allowed)))
        .collect()?;
    Ok(filtered)
}

fn allowed_series(column: &str, values: &[AllowedValue], dtype: &DataType) -> Result<Series> {
    let series = if values.iter().all(AllowedValue::is_text) {
        let texts: Vec<&str> = values.iter().filter_map(AllowedValue::as_text).collect();
        Series::new(column.into(), texts)
    } else if values.iter().all(AllowedValue::is_integer) {
        let ints: Vec<i64> = values.iter().filter_map(AllowedValue::as_integer).collect();
        Series::new(column.into(), ints)
    } else {
        let floats = values
            .iter()
            .map(|value| value.as_float().ok_or_else(|| mixed_allow_list(column, dtype)))
            .collect::<Result<Vec<f64>>>()?;
        // Casting to an integer type truncates, so 1.5 would match 1.
        if dtype.is_integer() && floats.iter().any(|v| v.fract() != 0.0) {
            return Err(mixed_allow_list(column, dtype));
        }
        Series::new(column.into(), floats)
    };

    // Values that cannot be represented in the column's own type would never
    // match; report that as a schema problem rather than filtering everything.
    series
        .strict_cast(dtype)
        .map_err(|_| mixed_allow_list(column, dtype))
}

fn mixed_allow_list(column: &str, dtype: &DataType) -> TransformError {
    TransformError::TypeMismatch {
        column: column.to_owned(),
        expected: "allow-list values of the column's type",
        actual: SemanticType::of(dtype),
    }
}

/// Remove rows with a missing value in any of `columns`. Float NaN counts as
/// missing.
pub fn drop_null_rows(df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
    let mut keep = lit(true);
    for name in columns {
        let column = column_exists(df, name)?;
        let mut present = col(name.as_str()).is_not_null();
        if column.dtype().is_float() {
            present = present.and(col(name.as_str()).is_not_nan());
        }
        keep = keep.and(present);
    }

    Ok(df.clone().lazy().filter(keep).collect()?)
}

/// Trim surrounding whitespace and lowercase every value of `columns`.
pub fn normalize_strings(df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
    for name in columns {
        is_string_column(df, name)?;
    }

    let exprs: Vec<Expr> = columns
        .iter()
        .map(|name| {
            col(name.as_str())
                .str()
                .strip_chars(lit(NULL))
                .str()
                .to_lowercase()
                .alias(name.as_str())
        })
        .collect();

    Ok(df.clone().lazy().with_columns(exprs).collect()?)
}

/// Parse `columns` against `format` and drop the rows where any of them is
/// missing or unparseable.
///
/// String columns are parsed; values not matching the format become null.
/// Columns that already hold timestamps are kept as they are, dates are
/// widened to timestamps. Fails with `AllValuesInvalid` when a column has no
/// valid value left, including when the input has no rows at all.
pub fn enforce_date_format(df: &DataFrame, columns: &[String], format: &str) -> Result<DataFrame> {
    let mut exprs = Vec::with_capacity(columns.len());
    for name in columns {
        let column = column_exists(df, name)?;
        match (SemanticType::of(column.dtype()), column.dtype()) {
            (SemanticType::String, _) => exprs.push(
                col(name.as_str())
                    .str()
                    .to_datetime(
                        Some(TimeUnit::Microseconds),
                        None,
                        StrptimeOptions {
                            format: Some(format.into()),
                            strict: false,
                            exact: true,
                            ..Default::default()
                        },
                        lit("raise"),
                    )
                    .alias(name.as_str()),
            ),
            (SemanticType::Timestamp, DataType::Date) => exprs.push(
                col(name.as_str())
                    .cast(DataType::Datetime(TimeUnit::Microseconds, None))
                    .alias(name.as_str()),
            ),
            (SemanticType::Timestamp, _) => {}
            (actual, _) => {
                return Err(TransformError::TypeMismatch {
                    column: name.clone(),
                    expected: "temporal or parseable string",
                    actual,
                });
            }
        }
    }

    // An empty column has no valid value either.
    let parsed = df.clone().lazy().with_columns(exprs).collect()?;
    for name in columns {
        if parsed.column(name)?.null_count() == parsed.height() {
            return Err(TransformError::AllValuesInvalid {
                column: name.clone(),
            });
        }
    }

    let keep = columns
        .iter()
        .fold(lit(true), |acc, name| acc.and(col(name.as_str()).is_not_null()));
    let filtered = parsed.lazy().filter(keep).collect()?;

    // Valid values in every column individually, but never on the same row.
    if filtered.height() == 0
        && let Some(first) = columns.first()
    {
        return Err(TransformError::AllValuesInvalid {
            column: first.clone(),
        });
    }

    Ok(filtered)
}

/// Rename columns per `mapping` (old → new). Nothing is renamed unless every
/// source exists and no target collides.
pub fn rename_columns(df: &DataFrame, mapping: &BTreeMap<String, String>) -> Result<DataFrame> {
    for from in mapping.keys() {
        column_exists(df, from)?;
    }

    let existing: HashSet<&str> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .collect();
    let mut targets = HashSet::new();
    for to in mapping.values() {
        if existing.contains(to.as_str()) || !targets.insert(to.as_str()) {
            return Err(TransformError::DuplicateColumn { column: to.clone() });
        }
    }

    let mut renamed = df.clone();
    for (from, to) in mapping {
        renamed.rename(from, to.as_str().into())?;
    }
    Ok(renamed)
}

/// Convert `trip_distance` from miles to kilometres, rounded to 2 decimals.
pub fn convert_distance_units(df: &DataFrame) -> Result<DataFrame> {
    is_numeric_column(df, TRIP_DISTANCE)?;
    let mut converted = df.clone();
    map_float_column(&mut converted, TRIP_DISTANCE, miles_to_km)?;
    Ok(converted)
}

/// Apply `convert` to every non-null value of `columns`. Nulls stay null.
pub fn convert_currency_columns(
    df: &DataFrame,
    columns: &[String],
    convert: impl Fn(f64) -> f64,
) -> Result<DataFrame> {
    for name in columns {
        is_numeric_column(df, name)?;
    }

    let mut converted = df.clone();
    for name in columns {
        map_float_column(&mut converted, name, &convert)?;
    }
    Ok(converted)
}

fn map_float_column(df: &mut DataFrame, name: &str, f: impl Fn(f64) -> f64) -> Result<()> {
    let values = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let mapped: Float64Chunked = values.f64()?.into_iter().map(|v| v.map(&f)).collect();
    df.replace(name, mapped.with_name(name.into()).into_series())?;
    Ok(())
}

/// Round half to even at `decimals` places.
pub fn round_half_even(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

pub fn miles_to_km(miles: f64) -> f64 {
    round_half_even(miles * KM_PER_MILE, 2)
}

pub fn convert_at_rate(amount: f64, rate: f64) -> f64 {
    round_half_even(amount * rate, 2)
}

pub fn dollars_to_euros(dollars: f64) -> f64 {
    convert_at_rate(dollars, USD_TO_EUR)
}
