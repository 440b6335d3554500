use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use polars::prelude::*;

use crate::dataset::{CategoryKey, YearMonth};
use crate::error::RidershipError;
use crate::filter::YearMode;
use crate::schema::{derived, ridership, views};
use crate::selection::Selection;

// ── View values ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearTotal {
    pub year: i32,
    pub total: u64,
}

/// Passenger totals per year, ascending by year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearlyTotals {
    pub year_mode: YearMode,
    pub rows: Vec<YearTotal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: u64,
}

/// Passenger totals per value of one category, largest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTotals {
    pub key: CategoryKey,
    pub rows: Vec<CategoryTotal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryShare {
    pub category: String,
    pub total: u64,
    /// Share of the grand total, rounded to one decimal place.
    pub percent: f64,
    /// `"<category> (<percent>%)"`, ready for chart labels.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PercentageBreakdown {
    pub key: CategoryKey,
    pub shares: Vec<CategoryShare>,
}

/// Sums keyed by `outer` then `inner`, e.g. ticket group -> ticket types.
///
/// Outer keys iterate in ascending order; each inner list is ascending by
/// category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedSums {
    pub outer: CategoryKey,
    pub inner: CategoryKey,
    pub groups: BTreeMap<String, Vec<CategoryTotal>>,
}

/// One pivot column: a combination of category values, in key order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PivotColumn {
    pub values: Vec<String>,
}

impl PivotColumn {
    pub fn label(&self) -> String {
        self.values.join(" / ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotRow {
    pub period: YearMonth,
    /// One cell per entry of [`MonthPivot::columns`], zero where absent.
    pub values: Vec<u64>,
    pub row_total: u64,
}

/// Month x category table.
///
/// The column set comes from the selection itself, so two pivots computed
/// under different filters can have different schemas. Consumers must
/// replace schema and rows together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthPivot {
    pub keys: Vec<CategoryKey>,
    pub columns: Vec<PivotColumn>,
    pub rows: Vec<PivotRow>,
}

// ── Operations ──────────────────────────────────────────────────────────────

pub fn total_ridership(selection: &Selection) -> Result<u64, RidershipError> {
    selection.total_count()
}

pub fn yearly_totals(selection: &Selection) -> Result<YearlyTotals, RidershipError> {
    let year_mode = selection.year_mode();
    if selection.is_empty() {
        return Ok(YearlyTotals {
            year_mode,
            rows: Vec::new(),
        });
    }

    let grouped = sum_by(selection.frame(), &[year_mode.column()])?;
    let years = grouped.column(year_mode.column())?.i32()?;
    let totals = grouped.column(views::TOTAL)?.i64()?;

    let mut rows: Vec<YearTotal> = years
        .into_iter()
        .zip(totals)
        .map(|(year, total)| YearTotal {
            year: year.unwrap_or_default(),
            total: to_count(total),
        })
        .collect();
    rows.sort_by_key(|r| r.year);

    Ok(YearlyTotals { year_mode, rows })
}

pub fn category_totals(
    selection: &Selection,
    key: CategoryKey,
) -> Result<CategoryTotals, RidershipError> {
    if selection.is_empty() {
        return Ok(CategoryTotals {
            key,
            rows: Vec::new(),
        });
    }

    let grouped = sum_by(selection.frame(), &[key.column()])?;
    let categories = str_values(&grouped, key.column())?;
    let totals = grouped.column(views::TOTAL)?.i64()?;

    let mut rows: Vec<CategoryTotal> = categories
        .into_iter()
        .zip(totals)
        .map(|(category, total)| CategoryTotal {
            category,
            total: to_count(total),
        })
        .collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category.cmp(&b.category)));

    Ok(CategoryTotals { key, rows })
}

/// Share of the grand total per category.
///
/// Returns no shares when the grand total is zero.
pub fn percentage_breakdown(
    selection: &Selection,
    key: CategoryKey,
) -> Result<PercentageBreakdown, RidershipError> {
    let totals = category_totals(selection, key)?;
    let grand_total: u64 = totals.rows.iter().map(|r| r.total).sum();
    if grand_total == 0 {
        return Ok(PercentageBreakdown {
            key,
            shares: Vec::new(),
        });
    }

    let shares = totals
        .rows
        .into_iter()
        .map(|row| {
            let percent = round_one_decimal(100.0 * row.total as f64 / grand_total as f64);
            CategoryShare {
                label: format!("{} ({percent:.1}%)", row.category),
                category: row.category,
                total: row.total,
                percent,
            }
        })
        .collect();

    Ok(PercentageBreakdown { key, shares })
}

pub fn grouped_sum(
    selection: &Selection,
    outer: CategoryKey,
    inner: CategoryKey,
) -> Result<GroupedSums, RidershipError> {
    let mut groups: BTreeMap<String, Vec<CategoryTotal>> = BTreeMap::new();
    if !selection.is_empty() {
        let keys = distinct_columns(&[outer, inner]);
        let grouped = sum_by(selection.frame(), &keys)?;
        let outer_values = str_values(&grouped, outer.column())?;
        let inner_values = str_values(&grouped, inner.column())?;
        let totals = grouped.column(views::TOTAL)?.i64()?;

        for ((group, category), total) in outer_values.into_iter().zip(inner_values).zip(totals) {
            groups.entry(group).or_default().push(CategoryTotal {
                category,
                total: to_count(total),
            });
        }
        for entries in groups.values_mut() {
            entries.sort_by(|a, b| a.category.cmp(&b.category));
        }
    }

    Ok(GroupedSums {
        outer,
        inner,
        groups,
    })
}

/// Pivot passenger sums into one row per month and one column per
/// combination of `keys` values observed in the selection, plus a row total.
pub fn month_pivot(
    selection: &Selection,
    keys: &[CategoryKey],
) -> Result<MonthPivot, RidershipError> {
    let mut seen = HashSet::new();
    let keys: Vec<CategoryKey> = keys.iter().copied().filter(|k| seen.insert(*k)).collect();
    if keys.is_empty() {
        return Err(RidershipError::InvalidData(
            "Month pivot needs at least one category key".to_string(),
        ));
    }
    if selection.is_empty() {
        return Ok(MonthPivot {
            keys,
            columns: Vec::new(),
            rows: Vec::new(),
        });
    }

    let mut group_cols = vec![derived::YEAR_MONTH];
    group_cols.extend(keys.iter().map(|k| k.column()));
    let grouped = sum_by(selection.frame(), &group_cols)?;

    let periods = str_values(&grouped, derived::YEAR_MONTH)?;
    let key_values = keys
        .iter()
        .map(|k| str_values(&grouped, k.column()))
        .collect::<Result<Vec<_>, _>>()?;
    let totals = grouped.column(views::TOTAL)?.i64()?;

    let mut columns = BTreeSet::new();
    let mut cells: BTreeMap<YearMonth, HashMap<PivotColumn, u64>> = BTreeMap::new();
    for (i, period) in periods.iter().enumerate() {
        let period: YearMonth = period.parse()?;
        let column = PivotColumn {
            values: key_values.iter().map(|v| v[i].clone()).collect(),
        };
        columns.insert(column.clone());
        *cells.entry(period).or_default().entry(column).or_default() += to_count(totals.get(i));
    }

    let columns: Vec<PivotColumn> = columns.into_iter().collect();
    let rows = cells
        .into_iter()
        .map(|(period, cell)| {
            let values: Vec<u64> = columns
                .iter()
                .map(|c| cell.get(c).copied().unwrap_or(0))
                .collect();
            PivotRow {
                period,
                row_total: values.iter().sum(),
                values,
            }
        })
        .collect();

    Ok(MonthPivot {
        keys,
        columns,
        rows,
    })
}

// ── Tabular form ────────────────────────────────────────────────────────────

impl YearlyTotals {
    pub fn to_frame(&self) -> Result<DataFrame, RidershipError> {
        let years: Vec<i32> = self.rows.iter().map(|r| r.year).collect();
        let totals: Vec<u64> = self.rows.iter().map(|r| r.total).collect();
        Ok(DataFrame::new(vec![
            Column::new(self.year_mode.column().into(), &years),
            Column::new(views::TOTAL.into(), &totals),
        ])?)
    }
}

impl CategoryTotals {
    pub fn to_frame(&self) -> Result<DataFrame, RidershipError> {
        let categories: Vec<&str> = self.rows.iter().map(|r| r.category.as_str()).collect();
        let totals: Vec<u64> = self.rows.iter().map(|r| r.total).collect();
        Ok(DataFrame::new(vec![
            Column::new(self.key.column().into(), &categories),
            Column::new(views::TOTAL.into(), &totals),
        ])?)
    }
}

impl PercentageBreakdown {
    pub fn to_frame(&self) -> Result<DataFrame, RidershipError> {
        let categories: Vec<&str> = self.shares.iter().map(|s| s.category.as_str()).collect();
        let totals: Vec<u64> = self.shares.iter().map(|s| s.total).collect();
        let percents: Vec<f64> = self.shares.iter().map(|s| s.percent).collect();
        let labels: Vec<&str> = self.shares.iter().map(|s| s.label.as_str()).collect();
        Ok(DataFrame::new(vec![
            Column::new(self.key.column().into(), &categories),
            Column::new(views::TOTAL.into(), &totals),
            Column::new(views::PERCENT.into(), &percents),
            Column::new(views::LABEL.into(), &labels),
        ])?)
    }
}

impl GroupedSums {
    /// Long form: one row per (outer, inner) pair.
    pub fn to_frame(&self) -> Result<DataFrame, RidershipError> {
        let mut outer = Vec::new();
        let mut inner = Vec::new();
        let mut totals = Vec::new();
        for (group, entries) in &self.groups {
            for entry in entries {
                outer.push(group.as_str());
                inner.push(entry.category.as_str());
                totals.push(entry.total);
            }
        }

        let mut columns = vec![Column::new(self.outer.column().into(), &outer)];
        if self.inner != self.outer {
            columns.push(Column::new(self.inner.column().into(), &inner));
        }
        columns.push(Column::new(views::TOTAL.into(), &totals));
        Ok(DataFrame::new(columns)?)
    }
}

impl MonthPivot {
    /// Frame column names, one per entry of `columns`.
    ///
    /// Unique among themselves and distinct from the period and row-total
    /// columns: a label already taken gets a ` (n)` suffix.
    pub fn column_labels(&self) -> Vec<String> {
        let mut taken: HashSet<String> =
            [views::PERIOD, views::ROW_TOTAL].iter().map(|s| s.to_string()).collect();
        self.columns
            .iter()
            .map(|column| {
                let base = column.label();
                let mut label = base.clone();
                let mut n = 2;
                while taken.contains(&label) {
                    label = format!("{base} ({n})");
                    n += 1;
                }
                taken.insert(label.clone());
                label
            })
            .collect()
    }

    pub fn to_frame(&self) -> Result<DataFrame, RidershipError> {
        let periods: Vec<String> = self.rows.iter().map(|r| r.period.to_string()).collect();
        let mut columns = vec![Column::new(views::PERIOD.into(), &periods)];
        for (j, label) in self.column_labels().into_iter().enumerate() {
            let values: Vec<u64> = self.rows.iter().map(|r| r.values[j]).collect();
            columns.push(Column::new(label.into(), &values));
        }
        let row_totals: Vec<u64> = self.rows.iter().map(|r| r.row_total).collect();
        columns.push(Column::new(views::ROW_TOTAL.into(), &row_totals));
        Ok(DataFrame::new(columns)?)
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

/// Group by `keys` and sum passenger counts into `views::TOTAL`.
fn sum_by(frame: &DataFrame, keys: &[&str]) -> Result<DataFrame, RidershipError> {
    let by: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    let grouped = frame
        .clone()
        .lazy()
        .group_by(by)
        .agg([col(ridership::COUNT).sum().alias(views::TOTAL)])
        .collect()?;
    Ok(grouped)
}

fn distinct_columns(keys: &[CategoryKey]) -> Vec<&'static str> {
    let mut seen = HashSet::new();
    keys.iter()
        .filter(|k| seen.insert(**k))
        .map(|k| k.column())
        .collect()
}

fn str_values(df: &DataFrame, column: &str) -> Result<Vec<String>, RidershipError> {
    Ok(df
        .column(column)?
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

fn to_count(value: Option<i64>) -> u64 {
    value.and_then(|v| u64::try_from(v).ok()).unwrap_or(0)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
