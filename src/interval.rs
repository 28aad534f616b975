use core::ops::Range;

use chrono::{DateTime, Days, FixedOffset, Months, NaiveTime, Offset, Utc};

use crate::Time;

/// Bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Day,
    Week,
    Month,
}
impl Interval {
    /// `anchor` moved forward by `n` widths with calendar arithmetic.
    ///
    /// Month steps are always taken from the anchor, so a Jan 31 anchor yields
    /// Feb 28 (or 29), Mar 31, Apr 30 and so on.
    pub fn advance(self, anchor: DateTime<FixedOffset>, n: u32) -> Option<DateTime<FixedOffset>> {
        match self {
            Interval::Day => anchor.checked_add_days(Days::new(u64::from(n))),
            Interval::Week => anchor.checked_add_days(Days::new(u64::from(n) * 7)),
            Interval::Month => anchor.checked_add_months(Months::new(n)),
        }
    }

    pub fn retreat(self, anchor: DateTime<FixedOffset>, n: u32) -> Option<DateTime<FixedOffset>> {
        match self {
            Interval::Day => anchor.checked_sub_days(Days::new(u64::from(n))),
            Interval::Week => anchor.checked_sub_days(Days::new(u64::from(n) * 7)),
            Interval::Month => anchor.checked_sub_months(Months::new(n)),
        }
    }
}

/// Calendar used to place bucket boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}
impl Calendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(minutes.checked_mul(60)?)?;
        Some(Self::new(offset))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
    pub fn local(&self, time: Time) -> DateTime<FixedOffset> {
        time.with_timezone(&self.offset)
    }

    /// Local midnight of the day containing `time`.
    pub fn start_of_day(&self, time: Time) -> Option<DateTime<FixedOffset>> {
        self.local(time)
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_local_timezone(self.offset)
            .single()
    }

    /// Chronological buckets `[anchor + k * interval, anchor + (k + 1) * interval)`
    /// anchored at `range.start`, the last one clipped to `range.end`.
    pub fn buckets(&self, range: Range<Time>, interval: Interval) -> Vec<Range<Time>> {
        let anchor = self.local(range.start);
        let mut buckets = vec![];
        let mut start = range.start;
        let mut k: u32 = 1;
        while start < range.end {
            let end = interval
                .advance(anchor, k)
                .map(|end| end.with_timezone(&Utc).min(range.end))
                .unwrap_or(range.end);
            buckets.push(start..end);
            start = end;
            let Some(next) = k.checked_add(1) else {
                break;
            };
            k = next;
        }
        buckets
    }

    pub fn bucket_count(&self, range: Range<Time>, interval: Interval) -> usize {
        self.buckets(range, interval).len()
    }
}
impl Default for Calendar {
    fn default() -> Self {
        Self::utc()
    }
}
