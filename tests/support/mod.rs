#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use loop_ridership::{Dataset, RidershipRecord};

pub const RIDERSHIP_CSV: &str = "\
 timestamp , service,ticket_type,ticket_group,day_type,count
2021-04-01,Campus Connector 2,Day Pass,Regular,Weekday,20
2020-03-01,Campus Connector 1,Day Pass,Regular,Weekday,10
2020-03-01 08:15:00,Campus Connector 1,Monthly Pass,Regular,Weekend,5
";

pub const NOTES_CSV: &str = "\
year,fiscal_year,note,service
2020,2020,Spring schedule reduced,Campus Connector 1
2021,2021,Route extended to Hub,Campus Connector 2
";

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// The three-record dataset used throughout the examples.
pub fn example_dataset() -> Dataset {
    Dataset::from_records(vec![
        RidershipRecord::new(date(2020, 3, 1), "Campus Connector 1", "Day Pass", "Regular", "Weekday", 10),
        RidershipRecord::new(date(2020, 3, 1), "Campus Connector 1", "Monthly Pass", "Regular", "Weekend", 5),
        RidershipRecord::new(date(2021, 4, 1), "Campus Connector 2", "Day Pass", "Regular", "Weekday", 20),
    ])
    .unwrap()
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}
