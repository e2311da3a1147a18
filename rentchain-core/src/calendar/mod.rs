//! Per-day property availability and the lock manager that owns it.

pub mod catalog;
pub mod lock_manager;
pub mod store;

pub use lock_manager::{LockGrant, LockManager};

use crate::framework::StoreError;
use time::Date;

/// Longest range accepted anywhere, one calendar horizon.
pub const MAX_RANGE_NIGHTS: i64 = lock_manager::CALENDAR_HORIZON_DAYS as i64;

/// A half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    /// Rejects zero-length, inverted and over-long ranges.
    pub fn new(start: Date, end: Date) -> Result<Self, LockError> {
        if end <= start {
            return Err(LockError::InvalidRange { start, end });
        }
        let nights = (end - start).whole_days();
        if nights > MAX_RANGE_NIGHTS {
            return Err(LockError::RangeTooLong { nights });
        }
        Ok(Self { start, end })
    }

    pub fn nights(&self) -> u32 {
        (self.end - self.start).whole_days().max(0) as u32
    }

    /// Every date in the range, ascending.
    pub fn dates(&self) -> Vec<Date> {
        let mut dates = Vec::with_capacity(self.nights() as usize);
        let mut cursor = Some(self.start);
        while let Some(date) = cursor
            && date < self.end
        {
            dates.push(date);
            cursor = date.next_day();
        }
        dates
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("invalid date range: {start} .. {end}")]
    InvalidRange { start: Date, end: Date },

    #[error("date range spans {nights} nights, at most {MAX_RANGE_NIGHTS} allowed")]
    RangeTooLong { nights: i64 },

    #[error("one or more dates are not available")]
    Unavailable,

    #[error("lock token is invalid or expired")]
    InvalidOrExpiredLock,

    #[error("property {0} not found")]
    PropertyNotFound(i64),

    #[error("user {user_id} does not own property {property_id}")]
    NotOwner { property_id: i64, user_id: i64 },

    #[error("minimum stay is {min_nights} nights, requested {nights}")]
    MinimumStay { min_nights: u32, nights: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for LockError {
    fn from(err: sqlx::Error) -> Self {
        LockError::Store(StoreError::Database(err))
    }
}
