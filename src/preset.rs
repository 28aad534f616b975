use core::ops::Range;

use chrono::Utc;

use crate::{
    interval::{Calendar, Interval},
    Time,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug)]
struct PresetRow {
    title: &'static str,
    interval: Interval,
    labels: &'static [&'static str],
}

const DAILY: PresetRow = PresetRow {
    title: "Daily",
    interval: Interval::Day,
    labels: &["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"],
};
const WEEKLY: PresetRow = PresetRow {
    title: "Weekly",
    interval: Interval::Week,
    labels: &["Week1", "Week2", "Week3", "Week4"],
};
const MONTHLY: PresetRow = PresetRow {
    title: "Monthly",
    interval: Interval::Month,
    labels: &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12"],
};

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Daily, Preset::Weekly, Preset::Monthly];

    fn row(self) -> &'static PresetRow {
        match self {
            Preset::Daily => &DAILY,
            Preset::Weekly => &WEEKLY,
            Preset::Monthly => &MONTHLY,
        }
    }

    pub fn title(self) -> &'static str {
        self.row().title
    }
    pub fn interval(self) -> Interval {
        self.row().interval
    }
    pub fn labels(self) -> &'static [&'static str] {
        self.row().labels
    }
    pub fn bucket_count(self) -> usize {
        self.labels().len()
    }

    /// Query range ending with the bucket that holds `now`.
    ///
    /// The anchor is local midnight of `now`'s day moved back
    /// `bucket_count - 1` intervals; the range spans `bucket_count` intervals
    /// from there.
    pub fn range(self, calendar: &Calendar, now: Time) -> Option<Range<Time>> {
        let buckets = u32::try_from(self.bucket_count()).ok()?;
        let midnight = calendar.start_of_day(now)?;
        let anchor = self.interval().retreat(midnight, buckets - 1)?;
        let end = self.interval().advance(anchor, buckets)?;
        Some(anchor.with_timezone(&Utc)..end.with_timezone(&Utc))
    }
}
