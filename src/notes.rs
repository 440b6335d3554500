use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use log::info;
use polars::prelude::*;

use crate::dataset::{
    read_csv_as_strings, read_csv_reader_as_strings, require_columns, string_column,
};
use crate::error::RidershipError;
use crate::filter::{YearMode, YearRange};
use crate::schema::notes;

pub const NO_NOTES_MESSAGE: &str = "No notes for this time period.";

/// A free-text remark about service in a given year. Display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNote {
    pub year: Option<i32>,
    pub fiscal_year: Option<i32>,
    pub note: String,
    pub service: String,
}

impl ServiceNote {
    fn year_in(&self, mode: YearMode) -> Option<i32> {
        match mode {
            YearMode::Calendar => self.year,
            YearMode::Fiscal => self.fiscal_year,
        }
    }
}

/// The auxiliary notes table, sorted by calendar year.
#[derive(Debug, Clone, Default)]
pub struct NotesTable {
    notes: Vec<ServiceNote>,
}

impl NotesTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load notes from a CSV with columns year, fiscal_year, note, service.
    /// Either year cell may be blank.
    pub fn load(
        path: impl AsRef<Path>,
        rename: &HashMap<String, String>,
    ) -> Result<Self, RidershipError> {
        let path = path.as_ref();
        let raw = read_csv_as_strings(path, rename)?;
        let table = Self::from_string_frame(&raw)?;
        info!("Loaded {} service notes from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn load_from_reader<R: Read>(
        reader: R,
        rename: &HashMap<String, String>,
    ) -> Result<Self, RidershipError> {
        let raw = read_csv_reader_as_strings(reader, rename)?;
        Self::from_string_frame(&raw)
    }

    pub fn from_notes(mut notes: Vec<ServiceNote>) -> Self {
        notes.sort_by_key(|n| n.year);
        Self { notes }
    }

    fn from_string_frame(raw: &DataFrame) -> Result<Self, RidershipError> {
        require_columns(raw, &notes::REQUIRED)?;

        let years = string_column(raw, notes::YEAR)?;
        let fiscal_years = string_column(raw, notes::FISCAL_YEAR)?;
        let texts = string_column(raw, notes::NOTE)?;
        let services = string_column(raw, notes::SERVICE)?;

        let mut rows = Vec::with_capacity(raw.height());
        for i in 0..raw.height() {
            let line = i + 2;
            rows.push(ServiceNote {
                year: parse_year(years.get(i), line)?,
                fiscal_year: parse_year(fiscal_years.get(i), line)?,
                note: texts.get(i).unwrap_or_default().trim().to_string(),
                service: services.get(i).unwrap_or_default().trim().to_string(),
            });
        }
        Ok(Self::from_notes(rows))
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn notes(&self) -> &[ServiceNote] {
        &self.notes
    }

    /// Notes whose year (in `mode`) falls inside `range`.
    ///
    /// Never empty: a placeholder row stands in when nothing matches.
    pub fn for_range(&self, mode: YearMode, range: YearRange) -> NotesView {
        let mut rows: Vec<NoteRow> = self
            .notes
            .iter()
            .filter_map(|n| {
                let year = n.year_in(mode)?;
                range.contains(year).then(|| NoteRow {
                    year: Some(year),
                    note: n.note.clone(),
                    service: n.service.clone(),
                })
            })
            .collect();

        if rows.is_empty() {
            rows.push(NoteRow {
                year: None,
                note: NO_NOTES_MESSAGE.to_string(),
                service: String::new(),
            });
        }

        NotesView {
            year_mode: mode,
            rows,
        }
    }
}

fn parse_year(raw: Option<&str>, line: usize) -> Result<Option<i32>, RidershipError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<i32>().map(Some).map_err(|_| {
            RidershipError::DataLoad(format!("Line {line}: year '{value}' is not an integer"))
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRow {
    /// `None` only on the placeholder row.
    pub year: Option<i32>,
    pub note: String,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesView {
    pub year_mode: YearMode,
    pub rows: Vec<NoteRow>,
}

impl NotesView {
    pub fn is_placeholder(&self) -> bool {
        self.rows.len() == 1 && self.rows[0].year.is_none()
    }

    pub fn to_frame(&self) -> Result<DataFrame, RidershipError> {
        let years: Vec<Option<i32>> = self.rows.iter().map(|r| r.year).collect();
        let texts: Vec<&str> = self.rows.iter().map(|r| r.note.as_str()).collect();
        let services: Vec<&str> = self.rows.iter().map(|r| r.service.as_str()).collect();
        let year_col = match self.year_mode {
            YearMode::Calendar => notes::YEAR,
            YearMode::Fiscal => notes::FISCAL_YEAR,
        };
        Ok(DataFrame::new(vec![
            Column::new(year_col.into(), &years),
            Column::new(notes::NOTE.into(), &texts),
            Column::new(notes::SERVICE.into(), &services),
        ])?)
    }
}
