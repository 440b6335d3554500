use std::collections::BTreeSet;

use log::debug;
use polars::prelude::*;

use crate::dataset::{records_from_frame, CategoryKey, Dataset, RidershipRecord};
use crate::error::RidershipError;
use crate::filter::{FilterSpec, YearMode};
use crate::schema::ridership;

/// Rows of a dataset matching one filter, in dataset order.
///
/// Zero rows is a valid state; every aggregation returns an empty view for it.
#[derive(Debug, Clone)]
pub struct Selection {
    frame: DataFrame,
    year_mode: YearMode,
}

impl Selection {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// The year field the producing filter was expressed in.
    pub fn year_mode(&self) -> YearMode {
        self.year_mode
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn total_count(&self) -> Result<u64, RidershipError> {
        let counts = self.frame.column(ridership::COUNT)?.i64()?;
        Ok(counts
            .into_iter()
            .flatten()
            .map(|c| u64::try_from(c).unwrap_or_default())
            .sum())
    }

    pub fn records(&self) -> Result<Vec<RidershipRecord>, RidershipError> {
        records_from_frame(&self.frame)
    }
}

/// Apply `spec` to `dataset`.
pub fn select(dataset: &Dataset, spec: &FilterSpec) -> Result<Selection, RidershipError> {
    let year_col = spec.year_mode().column();
    let range = spec.year_range();

    let mut predicate = col(year_col)
        .gt_eq(lit(range.lo()))
        .and(col(year_col).lt_eq(lit(range.hi())));

    for key in CategoryKey::ALL {
        if let Some(allowed) = spec.restriction(key).and_then(|v| membership(key, v)) {
            predicate = predicate.and(allowed);
        }
    }

    let frame = dataset.frame().clone().lazy().filter(predicate).collect()?;

    debug!(
        "Selected {} of {} rows for {} years {}",
        frame.height(),
        dataset.len(),
        spec.year_mode(),
        range
    );

    Ok(Selection {
        frame,
        year_mode: spec.year_mode(),
    })
}

/// `None` for an empty set: no restriction.
fn membership(key: CategoryKey, values: &BTreeSet<String>) -> Option<Expr> {
    if values.is_empty() {
        return None;
    }
    let allowed: Vec<&str> = values.iter().map(String::as_str).collect();
    let allowed = Series::new(key.column().into(), allowed);
    Some(col(key.column()).is_in(lit(allowed), false))
}
