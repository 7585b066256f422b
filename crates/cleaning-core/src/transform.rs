use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::CleaningError;

pub const PRICE_COLUMN: &str = "price";
pub const LAST_REVIEW_COLUMN: &str = "last_review";

/// `NaiveDate::num_days_from_ce` of 1970-01-01, the origin of polars' `Date` physical value.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Inclusive price range. `min_price > max_price` is accepted and retains nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBounds {
    pub min_price: f64,
    pub max_price: f64,
}

impl PriceBounds {
    pub fn new(min_price: f64, max_price: f64) -> Self {
        Self {
            min_price,
            max_price,
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        self.min_price <= price && price <= self.max_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleaningSummary {
    pub input_rows: usize,
    pub retained_rows: usize,
    pub dropped_rows: usize,
    pub null_review_dates: usize,
}

#[derive(Debug, Clone)]
pub struct CleanedDataset {
    pub frame: DataFrame,
    pub summary: CleaningSummary,
}

/// Drop rows whose `price` is outside `bounds` and type `last_review` as a date.
///
/// Missing or non-numeric prices never satisfy the range and are dropped. Review dates
/// that do not parse become null. Row order and the column set are preserved, and the
/// input frame is left untouched.
pub fn clean_listings(df: &DataFrame, bounds: PriceBounds) -> Result<CleanedDataset, CleaningError> {
    require_column(df, PRICE_COLUMN)?;
    require_column(df, LAST_REVIEW_COLUMN)?;

    let mask = price_mask(df.column(PRICE_COLUMN)?.as_materialized_series(), bounds)?;
    let mut frame = df.filter(&mask)?;

    let review_dates =
        normalize_review_dates(frame.column(LAST_REVIEW_COLUMN)?.as_materialized_series())?;
    let null_review_dates = review_dates.null_count();
    frame.with_column(review_dates)?;

    let summary = CleaningSummary {
        input_rows: df.height(),
        retained_rows: frame.height(),
        dropped_rows: df.height() - frame.height(),
        null_review_dates,
    };

    Ok(CleanedDataset { frame, summary })
}

fn require_column(df: &DataFrame, column: &'static str) -> Result<(), CleaningError> {
    match df.get_column_index(column) {
        Some(_) => Ok(()),
        None => Err(CleaningError::MissingColumn { column }),
    }
}

fn price_mask(prices: &Series, bounds: PriceBounds) -> PolarsResult<BooleanChunked> {
    // Non-strict cast: anything that is not a number becomes null and fails the range.
    let prices = prices.cast(&DataType::Float64)?;
    let mask: BooleanChunked = prices
        .f64()?
        .into_iter()
        .map(|price| Some(price.is_some_and(|value| bounds.contains(value))))
        .collect();
    Ok(mask)
}

fn normalize_review_dates(reviews: &Series) -> PolarsResult<Series> {
    match reviews.dtype() {
        DataType::Date => Ok(reviews.clone()),
        DataType::Datetime(_, _) => reviews.cast(&DataType::Date),
        _ => {
            let text = reviews.cast(&DataType::String)?;
            let days: Vec<Option<i32>> = text
                .str()?
                .into_iter()
                .map(|value| value.and_then(parse_review_date).map(days_since_epoch))
                .collect();
            Series::new(reviews.name().clone(), days).cast(&DataType::Date)
        }
    }
}

/// Parse a review date, keeping only the calendar date of date-time values.
pub fn parse_review_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                .map(|datetime| datetime.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|datetime| datetime.date_naive())
        })
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}
