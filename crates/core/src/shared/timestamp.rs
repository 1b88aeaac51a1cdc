use chrono::{Local, NaiveDateTime};

/// Wall-clock capture time in the local timezone, without offset.
pub type Timestamp = NaiveDateTime;

pub fn now() -> Timestamp {
    Local::now().naive_local()
}
