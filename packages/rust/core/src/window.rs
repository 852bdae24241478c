//! Inclusive range of calendar months visited by a crawl.

use harvest_shared::{CrawlConfig, HarvestError, Result, YearMonth};

/// Months `start..=end`, visited oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlWindow {
    start: YearMonth,
    end: YearMonth,
}

impl CrawlWindow {
    pub fn new(start: YearMonth, end: YearMonth) -> Result<Self> {
        if start > end {
            return Err(HarvestError::validation(format!(
                "crawl window starts after it ends ({start} > {end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Window for a crawl config; an open end means the current UTC month.
    pub fn from_config(config: &CrawlConfig) -> Result<Self> {
        Self::new(config.from, config.until.unwrap_or_else(YearMonth::current))
    }

    pub fn start(&self) -> YearMonth {
        self.start
    }

    pub fn end(&self) -> YearMonth {
        self.end
    }

    /// Number of months in the window (always at least one).
    pub fn month_count(&self) -> usize {
        let span = (self.end.year() - self.start.year()) * 12 + self.end.month() as i32
            - self.start.month() as i32;
        span as usize + 1
    }

    pub fn months(&self) -> Months {
        Months {
            next: Some(self.start),
            end: self.end,
        }
    }
}

/// Iterator over the months of a [`CrawlWindow`].
#[derive(Debug, Clone)]
pub struct Months {
    next: Option<YearMonth>,
    end: YearMonth,
}

impl Iterator for Months {
    type Item = YearMonth;

    fn next(&mut self) -> Option<YearMonth> {
        let current = self.next?;
        self.next = (current < self.end).then(|| current.next());
        Some(current)
    }
}
