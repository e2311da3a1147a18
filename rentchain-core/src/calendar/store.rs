use crate::calendar::DateRange;
use crate::entities::availability_day::{
    AvailabilityDay, CompareAndSwapDays, DayExpectation, DayTransition, ExpiredLock,
    GenerateCalendarDays, GetDaysInRange, GetExpiredLocks, GetLockedDatesByToken,
};
use crate::entities::AvailabilityStatus;
use crate::framework::{DatabaseProcessor, StoreError};
use kanau::processor::Processor;
use std::collections::BTreeMap;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Storage for availability days.
///
/// Every mutation goes through [`CalendarStore::compare_and_swap`], which is
/// all-or-nothing over the listed dates.
#[async_trait::async_trait]
pub trait CalendarStore: Send + Sync {
    /// Move every day in `dates` from `expect` to `next`, or none of them.
    ///
    /// Returns `false` when at least one day does not satisfy `expect`.
    async fn compare_and_swap(
        &self,
        property_id: i64,
        dates: &[Date],
        expect: DayExpectation,
        next: DayTransition,
    ) -> Result<bool, StoreError>;

    /// Materialized days in the range. Missing days are implicitly available.
    async fn days_in_range(
        &self,
        property_id: i64,
        range: DateRange,
    ) -> Result<Vec<AvailabilityDay>, StoreError>;

    async fn locked_dates(&self, property_id: i64, token: Uuid) -> Result<Vec<Date>, StoreError>;

    async fn expired_locks(&self, now: OffsetDateTime) -> Result<Vec<ExpiredLock>, StoreError>;

    /// Create `days` available rows from `from` on, keeping existing rows.
    async fn generate(&self, property_id: i64, from: Date, days: u32) -> Result<u64, StoreError>;
}

#[async_trait::async_trait]
impl CalendarStore for DatabaseProcessor {
    async fn compare_and_swap(
        &self,
        property_id: i64,
        dates: &[Date],
        expect: DayExpectation,
        next: DayTransition,
    ) -> Result<bool, StoreError> {
        Ok(self
            .process(CompareAndSwapDays {
                property_id,
                dates: dates.to_vec(),
                expect,
                next,
            })
            .await?)
    }

    async fn days_in_range(
        &self,
        property_id: i64,
        range: DateRange,
    ) -> Result<Vec<AvailabilityDay>, StoreError> {
        Ok(self
            .process(GetDaysInRange {
                property_id,
                start: range.start,
                end: range.end,
            })
            .await?)
    }

    async fn locked_dates(&self, property_id: i64, token: Uuid) -> Result<Vec<Date>, StoreError> {
        Ok(self
            .process(GetLockedDatesByToken {
                property_id,
                lock_token: token,
            })
            .await?)
    }

    async fn expired_locks(&self, now: OffsetDateTime) -> Result<Vec<ExpiredLock>, StoreError> {
        Ok(self.process(GetExpiredLocks { now }).await?)
    }

    async fn generate(&self, property_id: i64, from: Date, days: u32) -> Result<u64, StoreError> {
        Ok(self
            .process(GenerateCalendarDays {
                property_id,
                from,
                days,
            })
            .await?)
    }
}

/// In-process calendar used by tests and single-node deployments without Postgres.
#[derive(Debug, Default)]
pub struct MemoryCalendarStore {
    days: Mutex<BTreeMap<(i64, Date), AvailabilityDay>>,
}

impl MemoryCalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current row for a day, if materialized.
    pub async fn day(&self, property_id: i64, date: Date) -> Option<AvailabilityDay> {
        self.days.lock().await.get(&(property_id, date)).cloned()
    }
}

#[async_trait::async_trait]
impl CalendarStore for MemoryCalendarStore {
    async fn compare_and_swap(
        &self,
        property_id: i64,
        dates: &[Date],
        expect: DayExpectation,
        next: DayTransition,
    ) -> Result<bool, StoreError> {
        if dates.is_empty() {
            return Ok(false);
        }
        let mut days = self.days.lock().await;

        let mut staged = Vec::with_capacity(dates.len());
        for date in dates {
            let current = match days.get(&(property_id, *date)) {
                Some(day) => day.clone(),
                None if expect.materializes_missing() => {
                    AvailabilityDay::available(property_id, *date)
                }
                None => return Ok(false),
            };
            if !expect.matches(&current) {
                return Ok(false);
            }
            staged.push(current);
        }

        for mut day in staged {
            next.apply(&mut day);
            days.insert((property_id, day.date), day);
        }
        Ok(true)
    }

    async fn days_in_range(
        &self,
        property_id: i64,
        range: DateRange,
    ) -> Result<Vec<AvailabilityDay>, StoreError> {
        let days = self.days.lock().await;
        Ok(days
            .range((property_id, range.start)..(property_id, range.end))
            .map(|(_, day)| day.clone())
            .collect())
    }

    async fn locked_dates(&self, property_id: i64, token: Uuid) -> Result<Vec<Date>, StoreError> {
        let days = self.days.lock().await;
        Ok(days
            .values()
            .filter(|day| {
                day.property_id == property_id
                    && day.status == AvailabilityStatus::Locked
                    && day.lock_token == Some(token)
            })
            .map(|day| day.date)
            .collect())
    }

    async fn expired_locks(&self, now: OffsetDateTime) -> Result<Vec<ExpiredLock>, StoreError> {
        let days = self.days.lock().await;
        let mut expired: Vec<ExpiredLock> = days
            .values()
            .filter(|day| day.status == AvailabilityStatus::Locked)
            .filter_map(|day| match (day.lock_token, day.lock_expires_at) {
                (Some(lock_token), Some(at)) if at < now => Some(ExpiredLock {
                    property_id: day.property_id,
                    date: day.date,
                    lock_token,
                }),
                _ => None,
            })
            .collect();
        expired.sort_by_key(|lock| (lock.property_id, lock.lock_token, lock.date));
        Ok(expired)
    }

    async fn generate(&self, property_id: i64, from: Date, days: u32) -> Result<u64, StoreError> {
        let mut map = self.days.lock().await;
        let mut created = 0;
        let mut cursor = Some(from);
        for _ in 0..days {
            let Some(date) = cursor else { break };
            map.entry((property_id, date)).or_insert_with(|| {
                created += 1;
                AvailabilityDay::available(property_id, date)
            });
            cursor = date.next_day();
        }
        Ok(created)
    }
}
