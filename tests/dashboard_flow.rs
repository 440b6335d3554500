mod support;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use loop_ridership::notes::NO_NOTES_MESSAGE;
use loop_ridership::schema::views as view_cols;
use loop_ridership::{
    select, CategoryKey, DashboardConfig, FilterRequest, NotesTable, RidershipError, ViewBinding,
    ViewName, YearMode,
};
use loop_ridership::aggregation::{percentage_breakdown, yearly_totals};
use tempfile::TempDir;

use support::*;

fn configured_binding(dir: &TempDir) -> ViewBinding {
    write_file(dir.path(), "loop.csv", RIDERSHIP_CSV);
    write_file(dir.path(), "notes.csv", NOTES_CSV);
    let config_path = write_file(
        dir.path(),
        "dashboard.toml",
        "[data]\nridership_path = \"loop.csv\"\nnotes_path = \"notes.csv\"\n\n[calendar]\ndefault_window_years = 4\n",
    );

    let config = DashboardConfig::from_file(config_path).unwrap();
    let dataset = config.load_dataset().unwrap();
    let notes = config.load_notes().unwrap();
    ViewBinding::with_default_filter(
        Arc::new(dataset),
        Arc::new(notes),
        config.calendar.default_window_years,
    )
    .unwrap()
}

#[test]
fn config_driven_session_computes_initial_views() {
    let dir = TempDir::new().unwrap();
    let binding = configured_binding(&dir);

    let filter = binding.current_filter();
    assert_eq!(filter.year_mode(), YearMode::Calendar);
    assert_eq!((filter.year_range().lo(), filter.year_range().hi()), (2020, 2021));

    let views = binding.current_views();
    assert_eq!(views.total_ridership(), Some(35));
    let years: Vec<(i32, u64)> = views
        .yearly_totals()
        .unwrap()
        .rows
        .iter()
        .map(|r| (r.year, r.total))
        .collect();
    assert_eq!(years, vec![(2020, 15), (2021, 20)]);
    assert_eq!(views.notes().unwrap().rows.len(), 2);
}

#[test]
fn worked_example_yearly_totals_and_breakdown() {
    let dataset = example_dataset();
    let spec = FilterRequest::years(2020, 2021).validate(&dataset).unwrap();
    let selection = select(&dataset, &spec).unwrap();

    let years: Vec<(i32, u64)> = yearly_totals(&selection)
        .unwrap()
        .rows
        .into_iter()
        .map(|r| (r.year, r.total))
        .collect();
    assert_eq!(years, vec![(2020, 15), (2021, 20)]);

    let breakdown = percentage_breakdown(&selection, CategoryKey::DayType).unwrap();
    let shares: Vec<(&str, f64, &str)> = breakdown
        .shares
        .iter()
        .map(|s| (s.category.as_str(), s.percent, s.label.as_str()))
        .collect();
    assert_eq!(
        shares,
        vec![
            ("Weekday", 85.7, "Weekday (85.7%)"),
            ("Weekend", 14.3, "Weekend (14.3%)"),
        ]
    );
}

#[test]
fn single_year_range_excludes_earlier_records() {
    let dataset = example_dataset();
    let spec = FilterRequest::years(2021, 2021).validate(&dataset).unwrap();
    let selection = select(&dataset, &spec).unwrap();

    let years: Vec<(i32, u64)> = yearly_totals(&selection)
        .unwrap()
        .rows
        .into_iter()
        .map(|r| (r.year, r.total))
        .collect();
    assert_eq!(years, vec![(2021, 20)]);

    let breakdown = percentage_breakdown(&selection, CategoryKey::DayType).unwrap();
    assert_eq!(breakdown.shares.len(), 1);
    assert_eq!(breakdown.shares[0].percent, 100.0);
    assert_eq!(breakdown.shares[0].label, "Weekday (100.0%)");
}

#[test]
fn unknown_ticket_type_is_rejected_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let mut binding = configured_binding(&dir);
    let before = binding.current_views().clone();

    let notified = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&notified);
    binding.subscribe(move |_| *flag.borrow_mut() = true);

    let err = binding
        .on_filter_change(FilterRequest::years(2020, 2021).ticket_types(["Nonexistent Pass"]))
        .unwrap_err();
    assert!(matches!(err, RidershipError::InvalidFilter(_)));
    assert!(!err.is_load_error());
    assert_eq!(binding.current_views(), &before);
    assert!(!*notified.borrow());
}

#[test]
fn fiscal_mode_regroups_by_fiscal_year() {
    let dir = TempDir::new().unwrap();
    let mut binding = configured_binding(&dir);

    // March 2020 is FY2020, April 2021 is FY2021 under the ending-year convention.
    let bundle = binding
        .on_filter_change(FilterRequest::years(2020, 2020).mode(YearMode::Fiscal))
        .unwrap();
    let yearly = bundle.yearly_totals().unwrap();
    assert_eq!(yearly.year_mode, YearMode::Fiscal);
    assert_eq!(yearly.rows.len(), 1);
    assert_eq!(yearly.rows[0].total, 15);
}

#[test]
fn empty_selection_publishes_empty_views() {
    let mut binding = ViewBinding::with_default_filter(
        Arc::new(example_dataset()),
        Arc::new(NotesTable::empty()),
        4,
    )
    .unwrap();

    // No weekend travel in 2021.
    let bundle = binding
        .on_filter_change(FilterRequest::years(2021, 2021).day_types(["Weekend"]))
        .unwrap();
    assert_eq!(bundle.total_ridership(), Some(0));
    assert!(bundle.yearly_totals().unwrap().rows.is_empty());
    assert!(bundle.day_type_breakdown().unwrap().shares.is_empty());
    assert!(bundle.ticket_type_by_group().unwrap().groups.is_empty());
    assert!(bundle.month_pivot().unwrap().rows.is_empty());

    let notes = bundle.notes().unwrap();
    assert!(notes.is_placeholder());
    assert_eq!(notes.rows[0].note, NO_NOTES_MESSAGE);
}

#[test]
fn pivot_frame_has_data_driven_columns() {
    let mut binding = ViewBinding::with_default_filter(
        Arc::new(example_dataset()),
        Arc::new(NotesTable::empty()),
        4,
    )
    .unwrap();

    let all = binding
        .on_filter_change(FilterRequest::years(2020, 2021))
        .unwrap()
        .month_pivot()
        .unwrap()
        .to_frame()
        .unwrap();
    let names: Vec<String> = all.get_column_names().iter().map(|n| n.to_string()).collect();
    assert_eq!(
        names,
        vec![
            view_cols::PERIOD.to_string(),
            "Regular / Day Pass".to_string(),
            "Regular / Monthly Pass".to_string(),
            view_cols::ROW_TOTAL.to_string(),
        ]
    );

    let narrowed = binding
        .on_filter_change(FilterRequest::years(2021, 2021))
        .unwrap()
        .month_pivot()
        .unwrap()
        .to_frame()
        .unwrap();
    assert_eq!(narrowed.width(), 3);
    assert_eq!(narrowed.height(), 1);
}

#[test]
fn bundle_exports_every_view_as_a_frame() {
    let dir = TempDir::new().unwrap();
    let binding = configured_binding(&dir);

    let frames = binding.current_views().to_frames().unwrap();
    let names: Vec<&str> = frames.keys().copied().collect();
    let mut expected: Vec<&str> = ViewName::ALL.iter().map(|n| n.as_str()).collect();
    expected.sort_unstable();
    assert_eq!(names, expected);
    assert_eq!(frames["total_ridership"].height(), 1);
}

#[test]
fn malformed_source_aborts_load() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "loop.csv",
        "timestamp,service,ticket_type,ticket_group,day_type,count\nyesterday,A,B,C,D,1\n",
    );
    let config = DashboardConfig::new(dir.path().join("loop.csv"));
    let err = config.load_dataset().unwrap_err();
    assert!(err.is_load_error());

    let config = DashboardConfig::new(dir.path().join("missing.csv"));
    assert!(config.load_dataset().unwrap_err().is_load_error());
}
