use chrono::{DateTime, Duration, Utc};

use crate::entries::prelude::*;

pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Window {
    pub count: usize,
    pub sum: f64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Stats {
    pub day: Window,
    pub week: Window,
    pub month: Window,
    pub total: Window,
}

/// Successful sales over trailing windows ending at `now`.
pub fn stats(rows: &[OrderRecord], now: DateTime<Utc>) -> Stats {
    let day = now - Duration::seconds(86_400);
    let week = now - Duration::seconds(604_800);
    let month = now - Duration::seconds(2_592_000);

    rows.iter()
        .filter(|r| r.status == RecordStatus::Success)
        .fold(Stats::default(), |mut stats, r| {
            let mut add = |w: &mut Window| {
                w.count += 1;
                w.sum += r.sum;
            };

            add(&mut stats.total);
            if r.timestamp >= month {
                add(&mut stats.month);
            }
            if r.timestamp >= week {
                add(&mut stats.week);
            }
            if r.timestamp >= day {
                add(&mut stats.day);
            }
            stats
        })
}

pub struct Page<'a> {
    pub items: Vec<&'a OrderRecord>,
    pub page: usize,
    pub pages: usize,
}

impl Page<'_> {
    pub fn has_prev(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.pages
    }
}

/// Newest first; an out-of-range page is clamped to the last one.
pub fn history(rows: &[OrderRecord], page: usize) -> Page<'_> {
    let pages = rows.len().div_ceil(PAGE_SIZE).max(1);
    let page = page.min(pages - 1);

    let items = rows
        .iter()
        .rev()
        .skip(page * PAGE_SIZE)
        .take(PAGE_SIZE)
        .collect();

    Page { items, page, pages }
}

pub fn success_count(rows: &[OrderRecord]) -> usize {
    rows.iter()
        .filter(|r| r.status == RecordStatus::Success)
        .count()
}
