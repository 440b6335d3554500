use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::{CategoryKey, Dataset};
use crate::error::RidershipError;
use crate::schema::derived;

/// Which derived year field a year range applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearMode {
    #[default]
    Calendar,
    Fiscal,
}

impl YearMode {
    pub fn column(self) -> &'static str {
        match self {
            Self::Calendar => derived::YEAR,
            Self::Fiscal => derived::FISCAL_YEAR,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Calendar => "Ridership by Calendar Year",
            Self::Fiscal => "Ridership by Financial Year (July to June)",
        }
    }
}

impl fmt::Display for YearMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calendar => f.write_str("calendar"),
            Self::Fiscal => f.write_str("fiscal"),
        }
    }
}

impl FromStr for YearMode {
    type Err = RidershipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "calendar" => Ok(Self::Calendar),
            "fiscal" | "financial" => Ok(Self::Fiscal),
            other => Err(RidershipError::InvalidFilter(format!(
                "Unknown year mode '{other}'. Must be 'calendar' or 'fiscal'"
            ))),
        }
    }
}

/// Inclusive year interval with `lo <= hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct YearRange {
    lo: i32,
    hi: i32,
}

impl YearRange {
    pub fn new(lo: i32, hi: i32) -> Result<Self, RidershipError> {
        if lo > hi {
            return Err(RidershipError::InvalidFilter(format!(
                "Year range is inverted: {lo} > {hi}"
            )));
        }
        Ok(Self { lo, hi })
    }

    pub fn lo(&self) -> i32 {
        self.lo
    }

    pub fn hi(&self) -> i32 {
        self.hi
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.lo..=self.hi).contains(&year)
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

/// Raw filter input as received from a presentation collaborator.
///
/// Nothing is checked until [`FilterRequest::validate`] turns it into a
/// [`FilterSpec`] against a concrete dataset. An empty category list means
/// "no restriction", never "nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub year_start: i32,
    pub year_end: i32,
    #[serde(default)]
    pub year_mode: YearMode,
    #[serde(default)]
    pub ticket_types: Vec<String>,
    #[serde(default)]
    pub day_types: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

impl FilterRequest {
    pub fn years(year_start: i32, year_end: i32) -> Self {
        Self {
            year_start,
            year_end,
            ..Self::default()
        }
    }

    pub fn mode(mut self, year_mode: YearMode) -> Self {
        self.year_mode = year_mode;
        self
    }

    pub fn ticket_types<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ticket_types = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn day_types<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.day_types = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn services<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = values.into_iter().map(Into::into).collect();
        self
    }

    /// Check the request against the dataset's domain.
    ///
    /// Fails with `InvalidFilter` if the range is inverted or leaves the
    /// dataset's year bounds for the chosen mode, or if any category value
    /// does not occur in the dataset.
    pub fn validate(self, dataset: &Dataset) -> Result<FilterSpec, RidershipError> {
        let year_range = YearRange::new(self.year_start, self.year_end)?;
        let (min, max) = dataset.year_bounds(self.year_mode);
        if year_range.lo() < min || year_range.hi() > max {
            return Err(RidershipError::InvalidFilter(format!(
                "{} year range {year_range} is outside the dataset bounds [{min}, {max}]",
                self.year_mode
            )));
        }

        Ok(FilterSpec {
            year_range,
            year_mode: self.year_mode,
            ticket_types: known_values(dataset, CategoryKey::TicketType, self.ticket_types)?,
            day_types: known_values(dataset, CategoryKey::DayType, self.day_types)?,
            services: known_values(dataset, CategoryKey::Service, self.services)?,
        })
    }
}

fn known_values(
    dataset: &Dataset,
    key: CategoryKey,
    values: Vec<String>,
) -> Result<BTreeSet<String>, RidershipError> {
    let domain = dataset.domain(key);
    let unknown: Vec<&str> = values
        .iter()
        .filter(|v| !domain.contains(*v))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(RidershipError::InvalidFilter(format!(
            "Unknown {}: {}",
            key.label(),
            unknown.join(", ")
        )));
    }
    Ok(values.into_iter().collect())
}

/// A validated, immutable selection over one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterSpec {
    year_range: YearRange,
    year_mode: YearMode,
    ticket_types: BTreeSet<String>,
    day_types: BTreeSet<String>,
    services: BTreeSet<String>,
}

impl FilterSpec {
    /// The dashboard's opening state: calendar years, the last `window_years`
    /// years of data (clamped to the dataset), no category restriction.
    pub fn initial(dataset: &Dataset, window_years: u32) -> Self {
        let (min, max) = dataset.year_bounds(YearMode::Calendar);
        let span = i32::try_from(window_years.max(1)).unwrap_or(i32::MAX);
        let lo = max.saturating_sub(span - 1).max(min);
        Self {
            year_range: YearRange { lo, hi: max },
            year_mode: YearMode::Calendar,
            ticket_types: BTreeSet::new(),
            day_types: BTreeSet::new(),
            services: BTreeSet::new(),
        }
    }

    pub fn year_range(&self) -> YearRange {
        self.year_range
    }

    pub fn year_mode(&self) -> YearMode {
        self.year_mode
    }

    pub fn ticket_types(&self) -> &BTreeSet<String> {
        &self.ticket_types
    }

    pub fn day_types(&self) -> &BTreeSet<String> {
        &self.day_types
    }

    pub fn services(&self) -> &BTreeSet<String> {
        &self.services
    }

    /// Allowed values for a category; empty means unrestricted.
    pub fn restriction(&self, key: CategoryKey) -> Option<&BTreeSet<String>> {
        match key {
            CategoryKey::TicketType => Some(&self.ticket_types),
            CategoryKey::DayType => Some(&self.day_types),
            CategoryKey::Service => Some(&self.services),
            CategoryKey::TicketGroup => None,
        }
    }

    pub fn to_request(&self) -> FilterRequest {
        FilterRequest {
            year_start: self.year_range.lo,
            year_end: self.year_range.hi,
            year_mode: self.year_mode,
            ticket_types: self.ticket_types.iter().cloned().collect(),
            day_types: self.day_types.iter().cloned().collect(),
            services: self.services.iter().cloned().collect(),
        }
    }
}
