//! Ridership aggregation and filtering engine for the Loop transit dashboard.
//!
//! Loads the ridership table once, turns each filter change into a new
//! selection, and recomputes the published views from it.

pub mod aggregation;
pub mod binding;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod notes;
pub mod schema;
pub mod selection;
pub mod views;

#[cfg(feature = "python")]
mod python;

pub use binding::{SubscriberId, ViewBinding, ViewGraph};
pub use config::DashboardConfig;
pub use dataset::{CategoryKey, Dataset, FiscalConvention, LoadOptions, RidershipRecord, YearMonth};
pub use error::RidershipError;
pub use filter::{FilterRequest, FilterSpec, YearMode, YearRange};
pub use notes::{NotesTable, ServiceNote};
pub use selection::{select, Selection};
pub use views::{ViewBundle, ViewName, ViewValue};

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyModule;

/// Export schema constants as Python submodules
#[cfg(feature = "python")]
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Ridership
    let ridership = PyModule::new(m.py(), "ridership")?;
    ridership.add("TIMESTAMP", schema::ridership::TIMESTAMP)?;
    ridership.add("SERVICE", schema::ridership::SERVICE)?;
    ridership.add("TICKET_TYPE", schema::ridership::TICKET_TYPE)?;
    ridership.add("TICKET_GROUP", schema::ridership::TICKET_GROUP)?;
    ridership.add("DAY_TYPE", schema::ridership::DAY_TYPE)?;
    ridership.add("COUNT", schema::ridership::COUNT)?;
    m.add_submodule(&ridership)?;

    // Derived
    let derived = PyModule::new(m.py(), "derived")?;
    derived.add("YEAR", schema::derived::YEAR)?;
    derived.add("FISCAL_YEAR", schema::derived::FISCAL_YEAR)?;
    derived.add("YEAR_MONTH", schema::derived::YEAR_MONTH)?;
    m.add_submodule(&derived)?;

    // Notes
    let notes = PyModule::new(m.py(), "notes")?;
    notes.add("YEAR", schema::notes::YEAR)?;
    notes.add("FISCAL_YEAR", schema::notes::FISCAL_YEAR)?;
    notes.add("NOTE", schema::notes::NOTE)?;
    notes.add("SERVICE", schema::notes::SERVICE)?;
    m.add_submodule(&notes)?;

    // Views
    let views = PyModule::new(m.py(), "views")?;
    views.add("TOTAL", schema::views::TOTAL)?;
    views.add("PERCENT", schema::views::PERCENT)?;
    views.add("LABEL", schema::views::LABEL)?;
    views.add("PERIOD", schema::views::PERIOD)?;
    views.add("ROW_TOTAL", schema::views::ROW_TOTAL)?;
    views.add(
        "NAMES",
        crate::views::ViewName::ALL.map(crate::views::ViewName::as_str).to_vec(),
    )?;
    m.add_submodule(&views)?;

    Ok(())
}

#[cfg(feature = "python")]
#[pymodule]
fn loop_ridership(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::Dashboard>()?;
    m.add("NO_NOTES_MESSAGE", notes::NO_NOTES_MESSAGE)?;
    add_schema_exports(m)?;
    Ok(())
}
