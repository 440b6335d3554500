use std::collections::HashMap;
use std::sync::Arc;

use log::warn;
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::binding::{SubscriberId, ViewBinding};
use crate::config::DashboardConfig;
use crate::dataset::{CategoryKey, Dataset, LoadOptions};
use crate::error::RidershipError;
use crate::filter::{FilterRequest, YearMode};
use crate::notes::NotesTable;
use crate::views::ViewBundle;

/// Python handle on one dashboard session.
#[pyclass(name = "Dashboard", unsendable)]
pub struct Dashboard {
    binding: ViewBinding,
    subscribers: HashMap<String, SubscriberId>,
}

#[pymethods]
impl Dashboard {
    /// Open a session from a TOML configuration file.
    #[new]
    fn new(config_path: &str) -> PyResult<Self> {
        let config = DashboardConfig::from_file(config_path)?;
        let dataset = config.load_dataset()?;
        let notes = config.load_notes()?;
        Self::start(dataset, notes, config.calendar.default_window_years)
    }

    /// Open a session straight from CSV files, using default settings.
    #[staticmethod]
    #[pyo3(signature = (ridership_path, notes_path=None, rename=None))]
    fn from_paths(
        ridership_path: &str,
        notes_path: Option<&str>,
        rename: Option<HashMap<String, String>>,
    ) -> PyResult<Self> {
        let options = LoadOptions {
            rename: rename.unwrap_or_default(),
            ..LoadOptions::default()
        };
        let dataset = Dataset::load(ridership_path, &options)?;
        let notes = match notes_path {
            Some(path) => NotesTable::load(path, &options.rename)?,
            None => NotesTable::empty(),
        };
        Self::start(dataset, notes, 4)
    }

    // ── Filter updates ──────────────────────────────────────────────────────

    /// Apply a new filter and return every view as a DataFrame.
    /// Raises ValueError if the filter is rejected.
    #[pyo3(signature = (
        year_start,
        year_end,
        year_mode="calendar",
        ticket_types=None,
        day_types=None,
        services=None
    ))]
    fn update(
        &mut self,
        year_start: i32,
        year_end: i32,
        year_mode: &str,
        ticket_types: Option<Vec<String>>,
        day_types: Option<Vec<String>>,
        services: Option<Vec<String>>,
    ) -> PyResult<HashMap<String, PyDataFrame>> {
        let mode: YearMode = year_mode.parse()?;
        let request = FilterRequest::years(year_start, year_end)
            .mode(mode)
            .ticket_types(ticket_types.unwrap_or_default())
            .day_types(day_types.unwrap_or_default())
            .services(services.unwrap_or_default());
        let bundle = self.binding.recompute(request)?;
        let frames = bundle_frames(&bundle)?;
        self.binding.publish(bundle);
        Ok(frames)
    }

    /// Views for the current filter.
    fn views(&self) -> PyResult<HashMap<String, PyDataFrame>> {
        Ok(bundle_frames(self.binding.current_views())?)
    }

    /// Register `callback(views: dict[str, DataFrame])`, called after each
    /// accepted update. Returns an id for `unsubscribe`.
    fn subscribe(&mut self, callback: PyObject) -> String {
        let id = self.binding.subscribe(move |bundle| {
            let frames = match bundle_frames(bundle) {
                Ok(frames) => frames,
                Err(err) => {
                    warn!("Could not convert views for subscriber: {err}");
                    return;
                }
            };
            Python::with_gil(|py| {
                if let Err(err) = callback.call1(py, (frames,)) {
                    warn!("Subscriber callback raised: {err}");
                }
            });
        });
        let key = id.to_string();
        self.subscribers.insert(key.clone(), id);
        key
    }

    fn unsubscribe(&mut self, id: &str) -> bool {
        match self.subscribers.remove(id) {
            Some(sid) => self.binding.unsubscribe(sid),
            None => false,
        }
    }

    // ── Domains ─────────────────────────────────────────────────────────────

    #[getter]
    fn services(&self) -> Vec<String> {
        self.domain(CategoryKey::Service)
    }

    #[getter]
    fn ticket_types(&self) -> Vec<String> {
        self.domain(CategoryKey::TicketType)
    }

    #[getter]
    fn ticket_groups(&self) -> Vec<String> {
        self.domain(CategoryKey::TicketGroup)
    }

    #[getter]
    fn day_types(&self) -> Vec<String> {
        self.domain(CategoryKey::DayType)
    }

    #[pyo3(signature = (year_mode="calendar"))]
    fn year_bounds(&self, year_mode: &str) -> PyResult<(i32, i32)> {
        let mode: YearMode = year_mode.parse()?;
        Ok(self.binding.dataset().year_bounds(mode))
    }

    /// Current filter as (year_start, year_end, year_mode).
    fn current_filter(&self) -> (i32, i32, String) {
        let spec = self.binding.current_filter();
        let range = spec.year_range();
        (range.lo(), range.hi(), spec.year_mode().to_string())
    }

    /// Heading for the yearly totals chart under the current year mode.
    fn yearly_title(&self) -> &'static str {
        self.binding.current_filter().year_mode().title()
    }
}

impl Dashboard {
    fn start(dataset: Dataset, notes: NotesTable, window_years: u32) -> PyResult<Self> {
        let binding =
            ViewBinding::with_default_filter(Arc::new(dataset), Arc::new(notes), window_years)?;
        Ok(Self {
            binding,
            subscribers: HashMap::new(),
        })
    }

    fn domain(&self, key: CategoryKey) -> Vec<String> {
        self.binding.dataset().domain(key).to_vec()
    }
}

fn bundle_frames(bundle: &ViewBundle) -> Result<HashMap<String, PyDataFrame>, RidershipError> {
    Ok(bundle
        .to_frames()?
        .into_iter()
        .map(|(name, df)| (name.to_string(), PyDataFrame(df)))
        .collect())
}
