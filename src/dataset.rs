use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{Cursor, Read};
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use log::info;
use polars::datatypes::TimeUnit;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::RidershipError;
use crate::filter::YearMode;
use crate::schema::{derived, ridership};

/// Formats tried, in order, when parsing the timestamp column.
pub const DEFAULT_TIMESTAMP_FORMATS: [&str; 4] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d", "%m/%d/%Y"];

// ── Calendar helpers ────────────────────────────────────────────────────────

/// How a July-June fiscal year is labelled.
///
/// `EndingYear` names the span after the calendar year it ends in
/// (July 2020 - June 2021 is fiscal 2021). `StartingYear` names it after the
/// year it starts in (fiscal 2020).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FiscalConvention {
    #[default]
    EndingYear,
    StartingYear,
}

impl FiscalConvention {
    pub fn fiscal_year(self, date: NaiveDate) -> i32 {
        let start = if date.month() >= 7 {
            date.year()
        } else {
            date.year() - 1
        };
        match self {
            Self::EndingYear => start + 1,
            Self::StartingYear => start,
        }
    }
}

/// Calendar month, used as the row key of the monthly pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = RidershipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RidershipError::InvalidData(format!("Not a year-month period: '{s}'"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }
}

// ── Records ─────────────────────────────────────────────────────────────────

/// One row of ridership data: passengers for a date, route, ticket and day type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RidershipRecord {
    pub timestamp: NaiveDate,
    pub service: String,
    pub ticket_type: String,
    pub ticket_group: String,
    pub day_type: String,
    pub count: u64,
}

impl RidershipRecord {
    pub fn new(
        timestamp: NaiveDate,
        service: impl Into<String>,
        ticket_type: impl Into<String>,
        ticket_group: impl Into<String>,
        day_type: impl Into<String>,
        count: u64,
    ) -> Self {
        Self {
            timestamp,
            service: service.into(),
            ticket_type: ticket_type.into(),
            ticket_group: ticket_group.into(),
            day_type: day_type.into(),
            count,
        }
    }

    pub fn category(&self, key: CategoryKey) -> &str {
        match key {
            CategoryKey::Service => &self.service,
            CategoryKey::TicketType => &self.ticket_type,
            CategoryKey::TicketGroup => &self.ticket_group,
            CategoryKey::DayType => &self.day_type,
        }
    }
}

/// Categorical columns a selection can be restricted or grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKey {
    Service,
    TicketType,
    TicketGroup,
    DayType,
}

impl CategoryKey {
    pub const ALL: [CategoryKey; 4] = [
        CategoryKey::Service,
        CategoryKey::TicketType,
        CategoryKey::TicketGroup,
        CategoryKey::DayType,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Self::Service => ridership::SERVICE,
            Self::TicketType => ridership::TICKET_TYPE,
            Self::TicketGroup => ridership::TICKET_GROUP,
            Self::DayType => ridership::DAY_TYPE,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::TicketType => "ticket type",
            Self::TicketGroup => "ticket group",
            Self::DayType => "day type",
        }
    }
}

// ── Load options ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub fiscal_convention: FiscalConvention,
    pub timestamp_formats: Vec<String>,
    /// Source header -> canonical column name, applied after trimming.
    pub rename: HashMap<String, String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            fiscal_convention: FiscalConvention::default(),
            timestamp_formats: DEFAULT_TIMESTAMP_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            rename: HashMap::new(),
        }
    }
}

// ── Dataset ─────────────────────────────────────────────────────────────────

/// The immutable, time-sorted ridership table.
///
/// Besides the six source columns the frame carries `year`, `fiscal_year`
/// and `year_month`, computed once when the dataset is built.
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
    fiscal_convention: FiscalConvention,
    services: Vec<String>,
    ticket_types: Vec<String>,
    ticket_groups: Vec<String>,
    day_types: Vec<String>,
    calendar_years: (i32, i32),
    fiscal_years: (i32, i32),
}

impl Dataset {
    /// Load the ridership CSV at `path`.
    ///
    /// Required columns: timestamp, service, ticket_type, ticket_group,
    /// day_type, count. Other columns are ignored.
    pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self, RidershipError> {
        let path = path.as_ref();
        let raw = read_csv_as_strings(path, &options.rename)?;
        let dataset = Self::from_string_frame(&raw, options)?;
        info!(
            "Loaded {} ridership rows from {} (years {}-{})",
            dataset.len(),
            path.display(),
            dataset.calendar_years.0,
            dataset.calendar_years.1
        );
        Ok(dataset)
    }

    /// Load ridership CSV content from any reader.
    pub fn load_from_reader<R: Read>(
        reader: R,
        options: &LoadOptions,
    ) -> Result<Self, RidershipError> {
        let raw = read_csv_reader_as_strings(reader, &options.rename)?;
        let dataset = Self::from_string_frame(&raw, options)?;
        info!("Loaded {} ridership rows from stream", dataset.len());
        Ok(dataset)
    }

    /// Build a dataset from in-memory records using the default fiscal convention.
    pub fn from_records(records: Vec<RidershipRecord>) -> Result<Self, RidershipError> {
        Self::from_records_with(records, FiscalConvention::default())
    }

    pub fn from_records_with(
        mut records: Vec<RidershipRecord>,
        fiscal_convention: FiscalConvention,
    ) -> Result<Self, RidershipError> {
        if records.is_empty() {
            return Err(RidershipError::DataLoad(
                "Ridership source contains no rows".to_string(),
            ));
        }
        records.sort_by_key(|r| r.timestamp);

        let n = records.len();
        let mut timestamps = Vec::with_capacity(n);
        let mut counts = Vec::with_capacity(n);
        let mut years = Vec::with_capacity(n);
        let mut fiscal_years = Vec::with_capacity(n);
        let mut periods = Vec::with_capacity(n);
        for record in &records {
            timestamps.push(record.timestamp.and_time(NaiveTime::MIN).and_utc().timestamp_micros());
            counts.push(i64::try_from(record.count).map_err(|_| {
                RidershipError::DataLoad(format!("Passenger count {} is out of range", record.count))
            })?);
            years.push(record.timestamp.year());
            fiscal_years.push(fiscal_convention.fiscal_year(record.timestamp));
            periods.push(YearMonth::from_date(record.timestamp).to_string());
        }

        let text_column = |key: CategoryKey| -> Column {
            let values: Vec<&str> = records.iter().map(|r| r.category(key)).collect();
            Column::new(key.column().into(), &values)
        };

        let timestamp = Series::new(ridership::TIMESTAMP.into(), timestamps)
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;

        let frame = DataFrame::new(vec![
            timestamp.into(),
            text_column(CategoryKey::Service),
            text_column(CategoryKey::TicketType),
            text_column(CategoryKey::TicketGroup),
            text_column(CategoryKey::DayType),
            Column::new(ridership::COUNT.into(), &counts),
            Column::new(derived::YEAR.into(), &years),
            Column::new(derived::FISCAL_YEAR.into(), &fiscal_years),
            Column::new(derived::YEAR_MONTH.into(), &periods),
        ])?;

        Ok(Self {
            services: distinct(&records, CategoryKey::Service),
            ticket_types: distinct(&records, CategoryKey::TicketType),
            ticket_groups: distinct(&records, CategoryKey::TicketGroup),
            day_types: distinct(&records, CategoryKey::DayType),
            calendar_years: bounds(&years),
            fiscal_years: bounds(&fiscal_years),
            frame,
            fiscal_convention,
        })
    }

    /// Type the all-string frame produced by the CSV reader.
    fn from_string_frame(raw: &DataFrame, options: &LoadOptions) -> Result<Self, RidershipError> {
        require_columns(raw, &ridership::REQUIRED)?;

        let timestamps = string_column(raw, ridership::TIMESTAMP)?;
        let services = string_column(raw, ridership::SERVICE)?;
        let ticket_types = string_column(raw, ridership::TICKET_TYPE)?;
        let ticket_groups = string_column(raw, ridership::TICKET_GROUP)?;
        let day_types = string_column(raw, ridership::DAY_TYPE)?;
        let counts = string_column(raw, ridership::COUNT)?;

        let mut records = Vec::with_capacity(raw.height());
        for i in 0..raw.height() {
            // Data rows start on line 2 of the file.
            let line = i + 2;
            let field = |values: &StringChunked, name: &str| -> Result<String, RidershipError> {
                values
                    .get(i)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        RidershipError::DataLoad(format!("Line {line}: empty '{name}' value"))
                    })
            };

            let raw_timestamp = field(timestamps, ridership::TIMESTAMP)?;
            let timestamp = parse_date(&raw_timestamp, &options.timestamp_formats).ok_or_else(|| {
                RidershipError::DataLoad(format!(
                    "Line {line}: cannot parse timestamp '{raw_timestamp}'"
                ))
            })?;
            let raw_count = field(counts, ridership::COUNT)?;
            let count = parse_count(&raw_count).ok_or_else(|| {
                RidershipError::DataLoad(format!(
                    "Line {line}: count '{raw_count}' is not a non-negative integer"
                ))
            })?;

            records.push(RidershipRecord {
                timestamp,
                service: field(services, ridership::SERVICE)?,
                ticket_type: field(ticket_types, ridership::TICKET_TYPE)?,
                ticket_group: field(ticket_groups, ridership::TICKET_GROUP)?,
                day_type: field(day_types, ridership::DAY_TYPE)?,
                count,
            });
        }

        Self::from_records_with(records, options.fiscal_convention)
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn fiscal_convention(&self) -> FiscalConvention {
        self.fiscal_convention
    }

    /// Inclusive (min, max) of the year field selected by `mode`.
    pub fn year_bounds(&self, mode: YearMode) -> (i32, i32) {
        match mode {
            YearMode::Calendar => self.calendar_years,
            YearMode::Fiscal => self.fiscal_years,
        }
    }

    /// Distinct values of a category column, in first-seen order.
    pub fn domain(&self, key: CategoryKey) -> &[String] {
        match key {
            CategoryKey::Service => &self.services,
            CategoryKey::TicketType => &self.ticket_types,
            CategoryKey::TicketGroup => &self.ticket_groups,
            CategoryKey::DayType => &self.day_types,
        }
    }

    pub fn records(&self) -> Result<Vec<RidershipRecord>, RidershipError> {
        records_from_frame(&self.frame)
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

fn distinct(records: &[RidershipRecord], key: CategoryKey) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .map(|r| r.category(key))
        .filter(|v| seen.insert(*v))
        .map(|v| v.to_string())
        .collect()
}

fn bounds(years: &[i32]) -> (i32, i32) {
    let min = years.iter().copied().min().unwrap_or_default();
    let max = years.iter().copied().max().unwrap_or_default();
    (min, max)
}

fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    formats.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt)
            .map(|dt| dt.date())
            .or_else(|_| NaiveDate::parse_from_str(raw, fmt))
            .ok()
    })
}

/// Accepts plain integers and integral floats such as `12.0`.
fn parse_count(raw: &str) -> Option<u64> {
    if let Ok(v) = raw.parse::<u64>() {
        return Some(v);
    }
    let f = raw.parse::<f64>().ok()?;
    let integral = f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64;
    integral.then_some(f as u64)
}

/// Materialize typed records from a frame with the dataset layout.
pub(crate) fn records_from_frame(frame: &DataFrame) -> Result<Vec<RidershipRecord>, RidershipError> {
    let timestamps = frame.column(ridership::TIMESTAMP)?.as_materialized_series();
    let services = frame.column(ridership::SERVICE)?.str()?;
    let ticket_types = frame.column(ridership::TICKET_TYPE)?.str()?;
    let ticket_groups = frame.column(ridership::TICKET_GROUP)?.str()?;
    let day_types = frame.column(ridership::DAY_TYPE)?.str()?;
    let counts = frame.column(ridership::COUNT)?.i64()?;

    (0..frame.height())
        .map(|i| {
            let timestamp = match timestamps.get(i)? {
                AnyValue::Datetime(us, _, _) => {
                    DateTime::from_timestamp_micros(us).map(|dt| dt.date_naive())
                }
                _ => None,
            }
            .ok_or_else(|| RidershipError::InvalidData(format!("Row {i} has no timestamp")))?;

            Ok(RidershipRecord {
                timestamp,
                service: services.get(i).unwrap_or_default().to_string(),
                ticket_type: ticket_types.get(i).unwrap_or_default().to_string(),
                ticket_group: ticket_groups.get(i).unwrap_or_default().to_string(),
                day_type: day_types.get(i).unwrap_or_default().to_string(),
                count: u64::try_from(counts.get(i).unwrap_or_default()).unwrap_or_default(),
            })
        })
        .collect()
}

/// Read a CSV file with all columns as String dtype.
/// Trims whitespace from column names and applies the rename map.
pub(crate) fn read_csv_as_strings(
    path: &Path,
    rename: &HashMap<String, String>,
) -> Result<DataFrame, RidershipError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| RidershipError::DataLoad(format!("{}: {e}", path.display())))?;
    normalize_headers(df, rename)
}

/// Same as [`read_csv_as_strings`] for an arbitrary byte stream.
pub(crate) fn read_csv_reader_as_strings<R: Read>(
    mut reader: R,
    rename: &HashMap<String, String>,
) -> Result<DataFrame, RidershipError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| RidershipError::DataLoad(format!("stream: {e}")))?;
    normalize_headers(df, rename)
}

fn normalize_headers(
    mut df: DataFrame,
    rename: &HashMap<String, String>,
) -> Result<DataFrame, RidershipError> {
    let names: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| {
            let trimmed = c.trim();
            rename
                .get(trimmed)
                .cloned()
                .unwrap_or_else(|| trimmed.to_string())
        })
        .collect();
    df.set_column_names(names.as_slice())
        .map_err(|e| RidershipError::DataLoad(format!("Invalid header {names:?}: {e}")))?;
    Ok(df)
}

/// A string column of a freshly read source, as a load failure if unusable.
pub(crate) fn string_column<'a>(
    df: &'a DataFrame,
    name: &str,
) -> Result<&'a StringChunked, RidershipError> {
    df.column(name)
        .and_then(|c| c.str())
        .map_err(|e| RidershipError::DataLoad(format!("Column '{name}': {e}")))
}

pub(crate) fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), RidershipError> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(RidershipError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}
