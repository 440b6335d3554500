mod support;

use std::collections::BTreeMap;

use loop_ridership::aggregation::{month_pivot, percentage_breakdown};
use loop_ridership::views::PIVOT_KEYS;
use loop_ridership::{
    select, CategoryKey, Dataset, FilterRequest, NotesTable, RidershipRecord, ViewGraph,
    YearMode, YearMonth,
};
use proptest::prelude::*;

use support::date;

const SERVICES: [&str; 3] = ["Campus Connector 1", "Campus Connector 2", "US 20 Commuter"];
const TICKETS: [(&str, &str); 4] = [
    ("Day Pass", "Regular"),
    ("Monthly Pass", "Regular"),
    ("Student", "Reduced"),
    ("Senior", "Reduced"),
];
const DAY_TYPES: [&str; 3] = ["Weekday", "Saturday", "Sunday"];

fn record_strategy() -> impl Strategy<Value = RidershipRecord> {
    (
        2017i32..=2022,
        1u32..=12,
        1u32..=28,
        0usize..SERVICES.len(),
        0usize..TICKETS.len(),
        0usize..DAY_TYPES.len(),
        0u64..500,
    )
        .prop_map(|(y, m, d, s, t, dt, count)| {
            let (ticket_type, ticket_group) = TICKETS[t];
            RidershipRecord::new(date(y, m, d), SERVICES[s], ticket_type, ticket_group, DAY_TYPES[dt], count)
        })
}

fn dataset_strategy() -> impl Strategy<Value = (Vec<RidershipRecord>, Dataset)> {
    prop::collection::vec(record_strategy(), 1..60).prop_map(|records| {
        let dataset = Dataset::from_records(records.clone()).unwrap();
        (records, dataset)
    })
}

/// A valid calendar range inside the dataset's bounds.
fn range_within(dataset: &Dataset, a: u8, b: u8) -> (i32, i32) {
    let (min, max) = dataset.year_bounds(YearMode::Calendar);
    let span = (max - min + 1) as u8;
    let lo = min + i32::from(a % span);
    let hi = min + i32::from(b % span);
    (lo.min(hi), lo.max(hi))
}

proptest! {
    #[test]
    fn unrestricted_selection_matches_year_predicate(
        (records, dataset) in dataset_strategy(),
        a in any::<u8>(),
        b in any::<u8>(),
    ) {
        let (lo, hi) = range_within(&dataset, a, b);
        let spec = FilterRequest::years(lo, hi).validate(&dataset).unwrap();
        let selection = select(&dataset, &spec).unwrap();

        let expected = records
            .iter()
            .filter(|r| (lo..=hi).contains(&chrono::Datelike::year(&r.timestamp)))
            .count();
        prop_assert_eq!(selection.len(), expected);

        let dates: Vec<_> = selection.records().unwrap().iter().map(|r| r.timestamp).collect();
        prop_assert!(dates.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn percentages_sum_to_one_hundred(
        (_records, dataset) in dataset_strategy(),
        a in any::<u8>(),
        b in any::<u8>(),
    ) {
        let (lo, hi) = range_within(&dataset, a, b);
        let spec = FilterRequest::years(lo, hi).validate(&dataset).unwrap();
        let selection = select(&dataset, &spec).unwrap();
        let breakdown = percentage_breakdown(&selection, CategoryKey::DayType).unwrap();

        if selection.total_count().unwrap() == 0 {
            prop_assert!(breakdown.shares.is_empty());
        } else {
            let sum: f64 = breakdown.shares.iter().map(|s| s.percent).sum();
            let tolerance = 0.1 * breakdown.shares.len() as f64 + 1e-9;
            prop_assert!((sum - 100.0).abs() <= tolerance, "sum was {}", sum);
            prop_assert!(breakdown.shares.windows(2).all(|w| w[0].total >= w[1].total));
        }
    }

    #[test]
    fn pivot_row_totals_match_raw_sums(
        (records, dataset) in dataset_strategy(),
        a in any::<u8>(),
        b in any::<u8>(),
        day in 0usize..DAY_TYPES.len(),
    ) {
        let (lo, hi) = range_within(&dataset, a, b);
        let spec = FilterRequest::years(lo, hi)
            .day_types([DAY_TYPES[day]])
            .validate(&dataset);
        // The drawn day type may not occur in this dataset.
        prop_assume!(spec.is_ok());
        let spec = spec.unwrap();
        let selection = select(&dataset, &spec).unwrap();
        let pivot = month_pivot(&selection, &PIVOT_KEYS).unwrap();

        let mut raw: BTreeMap<YearMonth, u64> = BTreeMap::new();
        for r in records.iter().filter(|r| {
            let year = chrono::Datelike::year(&r.timestamp);
            (lo..=hi).contains(&year) && r.day_type == DAY_TYPES[day]
        }) {
            *raw.entry(YearMonth::from_date(r.timestamp)).or_default() += r.count;
        }

        prop_assert_eq!(pivot.rows.len(), raw.len());
        for row in &pivot.rows {
            prop_assert_eq!(row.values.len(), pivot.columns.len());
            prop_assert_eq!(row.row_total, row.values.iter().sum::<u64>());
            prop_assert_eq!(Some(&row.row_total), raw.get(&row.period));
        }
        prop_assert!(pivot.rows.windows(2).all(|w| w[0].period < w[1].period));
    }

    #[test]
    fn recomputation_is_deterministic(
        (_records, dataset) in dataset_strategy(),
        a in any::<u8>(),
        b in any::<u8>(),
        fiscal in any::<bool>(),
    ) {
        let mode = if fiscal { YearMode::Fiscal } else { YearMode::Calendar };
        let (lo, hi) = range_within(&dataset, a, b);
        let (fmin, fmax) = dataset.year_bounds(mode);
        let request = FilterRequest::years(lo.max(fmin), hi.min(fmax).max(lo.max(fmin))).mode(mode);
        let spec = request.validate(&dataset);
        prop_assume!(spec.is_ok());
        let spec = spec.unwrap();

        let graph = ViewGraph::new();
        let notes = NotesTable::empty();
        let first = graph.evaluate(&dataset, &notes, &spec).unwrap();
        let second = graph.evaluate(&dataset, &notes, &spec).unwrap();
        prop_assert_eq!(first, second);
    }
}
