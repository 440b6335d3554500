use std::collections::BTreeMap;
use std::fmt;

use polars::prelude::*;

use crate::aggregation::{
    self, CategoryTotals, GroupedSums, MonthPivot, PercentageBreakdown, YearlyTotals,
};
use crate::dataset::CategoryKey;
use crate::error::RidershipError;
use crate::filter::FilterSpec;
use crate::notes::{NotesTable, NotesView};
use crate::schema::views;
use crate::selection::Selection;

/// Category tuple forming the columns of the monthly pivot.
pub const PIVOT_KEYS: [CategoryKey; 2] = [CategoryKey::TicketGroup, CategoryKey::TicketType];

/// Every view the dashboard publishes after a filter change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViewName {
    YearlyTotals,
    TotalRidership,
    DayTypeBreakdown,
    TicketTypeByGroup,
    TicketGroupTotals,
    ServiceTotals,
    MonthPivot,
    Notes,
}

impl ViewName {
    pub const ALL: [ViewName; 8] = [
        ViewName::YearlyTotals,
        ViewName::TotalRidership,
        ViewName::DayTypeBreakdown,
        ViewName::TicketTypeByGroup,
        ViewName::TicketGroupTotals,
        ViewName::ServiceTotals,
        ViewName::MonthPivot,
        ViewName::Notes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::YearlyTotals => "yearly_totals",
            Self::TotalRidership => "total_ridership",
            Self::DayTypeBreakdown => "day_type_breakdown",
            Self::TicketTypeByGroup => "ticket_type_by_group",
            Self::TicketGroupTotals => "ticket_group_totals",
            Self::ServiceTotals => "service_totals",
            Self::MonthPivot => "month_pivot",
            Self::Notes => "notes",
        }
    }

    /// Notes read the filter directly; everything else needs the selection.
    pub fn needs_selection(self) -> bool {
        !matches!(self, Self::Notes)
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewValue {
    YearlyTotals(YearlyTotals),
    Total(u64),
    Breakdown(PercentageBreakdown),
    Grouped(GroupedSums),
    Totals(CategoryTotals),
    Pivot(MonthPivot),
    Notes(NotesView),
}

impl ViewValue {
    pub fn to_frame(&self) -> Result<DataFrame, RidershipError> {
        match self {
            Self::YearlyTotals(v) => v.to_frame(),
            Self::Total(total) => Ok(DataFrame::new(vec![Column::new(
                views::TOTAL.into(),
                &[*total],
            )])?),
            Self::Breakdown(v) => v.to_frame(),
            Self::Grouped(v) => v.to_frame(),
            Self::Totals(v) => v.to_frame(),
            Self::Pivot(v) => v.to_frame(),
            Self::Notes(v) => v.to_frame(),
        }
    }
}

/// Compute a single named view.
///
/// `selection` must be the selection produced from `spec`; it may only be
/// `None` for views that do not need it.
pub fn compute_view(
    name: ViewName,
    selection: Option<&Selection>,
    notes: &NotesTable,
    spec: &FilterSpec,
) -> Result<ViewValue, RidershipError> {
    let value = match name {
        ViewName::YearlyTotals => {
            ViewValue::YearlyTotals(aggregation::yearly_totals(selected(selection, name)?)?)
        }
        ViewName::TotalRidership => {
            ViewValue::Total(aggregation::total_ridership(selected(selection, name)?)?)
        }
        ViewName::DayTypeBreakdown => ViewValue::Breakdown(aggregation::percentage_breakdown(
            selected(selection, name)?,
            CategoryKey::DayType,
        )?),
        ViewName::TicketTypeByGroup => ViewValue::Grouped(aggregation::grouped_sum(
            selected(selection, name)?,
            CategoryKey::TicketGroup,
            CategoryKey::TicketType,
        )?),
        ViewName::TicketGroupTotals => ViewValue::Totals(aggregation::category_totals(
            selected(selection, name)?,
            CategoryKey::TicketGroup,
        )?),
        ViewName::ServiceTotals => ViewValue::Totals(aggregation::category_totals(
            selected(selection, name)?,
            CategoryKey::Service,
        )?),
        ViewName::MonthPivot => ViewValue::Pivot(aggregation::month_pivot(
            selected(selection, name)?,
            &PIVOT_KEYS,
        )?),
        ViewName::Notes => {
            ViewValue::Notes(notes.for_range(spec.year_mode(), spec.year_range()))
        }
    };
    Ok(value)
}

fn selected(selection: Option<&Selection>, name: ViewName) -> Result<&Selection, RidershipError> {
    selection.ok_or_else(|| {
        RidershipError::InvalidData(format!("View '{name}' evaluated without a selection"))
    })
}

/// The full set of views for one filter, replaced wholesale on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewBundle {
    filter: FilterSpec,
    views: BTreeMap<ViewName, ViewValue>,
}

impl ViewBundle {
    pub(crate) fn new(filter: FilterSpec, views: BTreeMap<ViewName, ViewValue>) -> Self {
        Self { filter, views }
    }

    /// The filter these views were computed from.
    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    pub fn get(&self, name: ViewName) -> Option<&ViewValue> {
        self.views.get(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ViewName, &ViewValue)> {
        self.views.iter().map(|(name, value)| (*name, value))
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn yearly_totals(&self) -> Option<&YearlyTotals> {
        match self.get(ViewName::YearlyTotals)? {
            ViewValue::YearlyTotals(v) => Some(v),
            _ => None,
        }
    }

    pub fn total_ridership(&self) -> Option<u64> {
        match self.get(ViewName::TotalRidership)? {
            ViewValue::Total(v) => Some(*v),
            _ => None,
        }
    }

    pub fn day_type_breakdown(&self) -> Option<&PercentageBreakdown> {
        match self.get(ViewName::DayTypeBreakdown)? {
            ViewValue::Breakdown(v) => Some(v),
            _ => None,
        }
    }

    pub fn ticket_type_by_group(&self) -> Option<&GroupedSums> {
        match self.get(ViewName::TicketTypeByGroup)? {
            ViewValue::Grouped(v) => Some(v),
            _ => None,
        }
    }

    pub fn month_pivot(&self) -> Option<&MonthPivot> {
        match self.get(ViewName::MonthPivot)? {
            ViewValue::Pivot(v) => Some(v),
            _ => None,
        }
    }

    pub fn notes(&self) -> Option<&NotesView> {
        match self.get(ViewName::Notes)? {
            ViewValue::Notes(v) => Some(v),
            _ => None,
        }
    }

    /// Every view as a DataFrame, keyed by view name.
    pub fn to_frames(&self) -> Result<BTreeMap<&'static str, DataFrame>, RidershipError> {
        self.views
            .iter()
            .map(|(name, value)| Ok((name.as_str(), value.to_frame()?)))
            .collect()
    }
}
