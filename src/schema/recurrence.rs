use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Upper bound on expansion when a pattern carries no occurrence count.
pub const DEFAULT_OCCURRENCE_CAP: u32 = 52;

fn default_interval() -> u32 {
    1
}

/// Recurrence frequency. Each variant carries only the fields meaningful
/// to it; weekday selectors use 0=Sunday..6=Saturday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frequency", rename_all = "snake_case")]
pub enum Frequency {
    Daily {
        #[serde(default = "default_interval")]
        interval: u32,
    },
    Weekly {
        #[serde(default = "default_interval")]
        interval: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        days_of_week: Option<Vec<u8>>,
    },
    Monthly {
        #[serde(default = "default_interval")]
        interval: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringPattern {
    #[serde(flatten)]
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<u32>,
}

impl RecurringPattern {
    pub fn interval(&self) -> u32 {
        match self.frequency {
            Frequency::Daily { interval }
            | Frequency::Weekly { interval, .. }
            | Frequency::Monthly { interval } => interval,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interval() == 0 {
            return Err("recurrence interval must be at least 1".to_string());
        }
        if let Frequency::Weekly {
            days_of_week: Some(days),
            ..
        } = &self.frequency
        {
            if days.is_empty() {
                return Err("weekday selector must not be empty".to_string());
            }
            if let Some(bad) = days.iter().find(|d| **d > 6) {
                return Err(format!("invalid weekday selector {bad} (expected 0..=6)"));
            }
        }
        if self.occurrences == Some(0) {
            return Err("occurrence count must be at least 1".to_string());
        }
        Ok(())
    }

    /// Lazy sequence of occurrence dates starting at `start` (inclusive
    /// when `start` itself matches the pattern). Finite: bounded by the
    /// occurrence cap and the optional end date.
    pub fn occurrences_from(&self, start: NaiveDate) -> Occurrences {
        let cursor = match &self.frequency {
            Frequency::Daily { interval } => Cursor::FixedDays {
                next: Some(start),
                step_days: u64::from((*interval).max(1)),
            },
            Frequency::Weekly {
                interval,
                days_of_week,
            } => match days_of_week {
                Some(days) if !days.is_empty() => Cursor::WeekdayScan {
                    next: Some(start),
                    selected: days.clone(),
                    skip_days: u64::from((*interval).max(1) - 1) * 7,
                    scanned: 0,
                },
                _ => Cursor::FixedDays {
                    next: Some(start),
                    step_days: u64::from((*interval).max(1)) * 7,
                },
            },
            Frequency::Monthly { interval } => Cursor::Months {
                start,
                step_months: (*interval).max(1),
                k: 0,
            },
        };

        Occurrences {
            remaining: self.occurrences.unwrap_or(DEFAULT_OCCURRENCE_CAP),
            end_date: self.end_date,
            cursor,
        }
    }

    pub fn expand_from(&self, start: NaiveDate) -> Vec<NaiveDate> {
        self.occurrences_from(start).collect()
    }
}

enum Cursor {
    FixedDays {
        next: Option<NaiveDate>,
        step_days: u64,
    },
    /// Occurrence k sits at `start + k * step_months`, so the day of month
    /// is held from the start date; chrono clamps month-end overflow.
    Months {
        start: NaiveDate,
        step_months: u32,
        k: u32,
    },
    /// Day-by-day scan; after each full 7-day window the cursor skips the
    /// weeks excluded by the interval.
    WeekdayScan {
        next: Option<NaiveDate>,
        selected: Vec<u8>,
        skip_days: u64,
        scanned: u8,
    },
}

pub struct Occurrences {
    remaining: u32,
    end_date: Option<NaiveDate>,
    cursor: Cursor,
}

fn past_end(end: Option<NaiveDate>, candidate: NaiveDate) -> bool {
    end.is_some_and(|e| candidate > e)
}

impl Iterator for Occurrences {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        if self.remaining == 0 {
            return None;
        }
        let end = self.end_date;

        let date = match &mut self.cursor {
            Cursor::FixedDays { next, step_days } => {
                let current = (*next)?;
                if past_end(end, current) {
                    return None;
                }
                *next = current.checked_add_days(Days::new(*step_days));
                current
            }
            Cursor::Months {
                start,
                step_months,
                k,
            } => {
                let months = step_months.checked_mul(*k)?;
                let current = start.checked_add_months(Months::new(months))?;
                if past_end(end, current) {
                    return None;
                }
                *k += 1;
                current
            }
            Cursor::WeekdayScan {
                next,
                selected,
                skip_days,
                scanned,
            } => loop {
                let current = (*next)?;
                if past_end(end, current) {
                    return None;
                }
                let matched =
                    selected.contains(&(current.weekday().num_days_from_sunday() as u8));
                *scanned += 1;
                let mut advanced = current.checked_add_days(Days::new(1));
                if *scanned == 7 {
                    advanced = advanced.and_then(|d| d.checked_add_days(Days::new(*skip_days)));
                    *scanned = 0;
                }
                *next = advanced;
                if matched {
                    break current;
                }
            },
        };

        self.remaining -= 1;
        Some(date)
    }
}
