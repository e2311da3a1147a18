//! Lock, commit and release of date ranges.
//!
//! The lock manager is the only writer of availability days. Every mutation
//! is a single compare-and-swap on the calendar store, so overlapping claims
//! on a property are serialized per day and the first writer wins.

use crate::calendar::catalog::PropertyCatalog;
use crate::calendar::store::CalendarStore;
use crate::calendar::{DateRange, LockError};
use crate::entities::AvailabilityStatus;
use crate::entities::availability_day::{DayExpectation, DayTransition, LockExpiry};
use itertools::Itertools;
use rentchain_sdk::objects::{PriceQuote, PropertySnapshot, PropertyStatus};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Days materialized by [`LockManager::generate_calendar`] when no count is given.
pub const CALENDAR_HORIZON_DAYS: u32 = 365;

/// A granted provisional lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockGrant {
    pub lock_token: Uuid,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn CalendarStore>,
    catalog: Arc<dyn PropertyCatalog>,
    lock_window: Duration,
}

impl LockManager {
    pub fn new(
        store: Arc<dyn CalendarStore>,
        catalog: Arc<dyn PropertyCatalog>,
        lock_window: Duration,
    ) -> Self {
        Self {
            store,
            catalog,
            lock_window,
        }
    }

    pub async fn snapshot(&self, property_id: i64) -> Result<PropertySnapshot, LockError> {
        self.catalog
            .snapshot(property_id)
            .await?
            .ok_or(LockError::PropertyNotFound(property_id))
    }

    pub async fn lock(
        &self,
        property_id: i64,
        range: DateRange,
        tenant_id: i64,
    ) -> Result<LockGrant, LockError> {
        self.lock_at(property_id, range, tenant_id, OffsetDateTime::now_utc())
            .await
    }

    /// Lock every day of `range` under one fresh token.
    ///
    /// Fails with [`LockError::Unavailable`] when any day is `LOCKED` or
    /// `BOOKED`, including locks that expired but were not swept yet.
    pub async fn lock_at(
        &self,
        property_id: i64,
        range: DateRange,
        tenant_id: i64,
        now: OffsetDateTime,
    ) -> Result<LockGrant, LockError> {
        self.snapshot(property_id).await?;

        let grant = LockGrant {
            lock_token: Uuid::new_v4(),
            expires_at: now + self.lock_window,
        };
        let locked = self
            .store
            .compare_and_swap(
                property_id,
                &range.dates(),
                DayExpectation::Available,
                DayTransition::Lock {
                    token: grant.lock_token,
                    expires_at: grant.expires_at,
                    holder_id: tenant_id,
                },
            )
            .await?;
        if !locked {
            tracing::debug!(property_id, start = %range.start, end = %range.end, "Lock refused");
            return Err(LockError::Unavailable);
        }

        tracing::info!(
            property_id,
            tenant_id,
            lock_token = %grant.lock_token,
            start = %range.start,
            end = %range.end,
            "Dates locked"
        );
        Ok(grant)
    }

    pub async fn commit(
        &self,
        property_id: i64,
        lock_token: Uuid,
        range: Option<DateRange>,
    ) -> Result<(), LockError> {
        self.commit_at(property_id, lock_token, range, OffsetDateTime::now_utc())
            .await
    }

    /// Turn the days locked by `lock_token` into `BOOKED`.
    ///
    /// When `range` is given, the locked days must be exactly that range.
    pub async fn commit_at(
        &self,
        property_id: i64,
        lock_token: Uuid,
        range: Option<DateRange>,
        now: OffsetDateTime,
    ) -> Result<(), LockError> {
        let dates = self.store.locked_dates(property_id, lock_token).await?;
        if dates.is_empty() {
            return Err(LockError::InvalidOrExpiredLock);
        }
        if let Some(range) = range
            && range.dates() != dates
        {
            tracing::warn!(
                property_id,
                lock_token = %lock_token,
                start = %range.start,
                end = %range.end,
                locked_days = dates.len(),
                "Commit range does not match the locked days"
            );
            return Err(LockError::InvalidOrExpiredLock);
        }

        let committed = self
            .store
            .compare_and_swap(
                property_id,
                &dates,
                DayExpectation::LockedBy {
                    token: lock_token,
                    expiry: LockExpiry::Unexpired(now),
                },
                DayTransition::Commit,
            )
            .await?;
        if !committed {
            return Err(LockError::InvalidOrExpiredLock);
        }

        tracing::info!(property_id, lock_token = %lock_token, days = dates.len(), "Lock committed");
        Ok(())
    }

    /// Free the days locked by `lock_token`. A no-op when nothing matches.
    ///
    /// Returns the number of days released.
    pub async fn release(&self, property_id: i64, lock_token: Uuid) -> Result<usize, LockError> {
        let dates = self.store.locked_dates(property_id, lock_token).await?;
        if dates.is_empty() {
            return Ok(0);
        }
        let released = self
            .store
            .compare_and_swap(
                property_id,
                &dates,
                DayExpectation::LockedBy {
                    token: lock_token,
                    expiry: LockExpiry::Any,
                },
                DayTransition::Free,
            )
            .await?;
        if !released {
            // the sweep or a commit got there first
            return Ok(0);
        }
        tracing::info!(property_id, lock_token = %lock_token, days = dates.len(), "Lock released");
        Ok(dates.len())
    }

    /// Free committed days of `range` held by `holder_id`.
    ///
    /// Used when a confirmed booking is cancelled: its days no longer carry a
    /// token, so [`LockManager::release`] cannot reach them.
    pub async fn unbook(
        &self,
        property_id: i64,
        range: DateRange,
        holder_id: i64,
    ) -> Result<usize, LockError> {
        let dates: Vec<Date> = self
            .store
            .days_in_range(property_id, range)
            .await?
            .into_iter()
            .filter(|day| {
                day.status == AvailabilityStatus::Booked && day.holder_id == Some(holder_id)
            })
            .map(|day| day.date)
            .collect();
        if dates.is_empty() {
            return Ok(0);
        }
        let freed = self
            .store
            .compare_and_swap(
                property_id,
                &dates,
                DayExpectation::BookedBy {
                    holder: Some(holder_id),
                },
                DayTransition::Free,
            )
            .await?;
        if !freed {
            return Ok(0);
        }
        tracing::info!(property_id, holder_id, days = dates.len(), "Booked days freed");
        Ok(dates.len())
    }

    /// Whether every day of `range` is committed for `holder_id`.
    pub async fn is_booked_by(
        &self,
        property_id: i64,
        range: DateRange,
        holder_id: i64,
    ) -> Result<bool, LockError> {
        let days = self.store.days_in_range(property_id, range).await?;
        Ok(days.len() == range.nights() as usize
            && days.iter().all(|day| {
                day.status == AvailabilityStatus::Booked && day.holder_id == Some(holder_id)
            }))
    }

    pub async fn sweep_expired(&self) -> Result<usize, LockError> {
        self.sweep_expired_at(OffsetDateTime::now_utc()).await
    }

    /// Free every lock whose expiry is before `now`. Returns the number of days freed.
    pub async fn sweep_expired_at(&self, now: OffsetDateTime) -> Result<usize, LockError> {
        let expired = self.store.expired_locks(now).await?;
        let groups: Vec<((i64, Uuid), Vec<Date>)> = expired
            .into_iter()
            .chunk_by(|lock| (lock.property_id, lock.lock_token))
            .into_iter()
            .map(|(key, group)| (key, group.map(|lock| lock.date).collect()))
            .collect();

        let mut freed = 0;
        for ((property_id, lock_token), dates) in groups {
            let swapped = self
                .store
                .compare_and_swap(
                    property_id,
                    &dates,
                    DayExpectation::LockedBy {
                        token: lock_token,
                        expiry: LockExpiry::Expired(now),
                    },
                    DayTransition::Free,
                )
                .await?;
            if swapped {
                tracing::info!(property_id, lock_token = %lock_token, days = dates.len(), "Expired lock swept");
                freed += dates.len();
            }
        }
        Ok(freed)
    }

    /// Materialize `days` available days from `from` on. Existing days are kept.
    pub async fn generate_calendar(
        &self,
        property_id: i64,
        from: Date,
        days: u32,
    ) -> Result<u64, LockError> {
        self.snapshot(property_id).await?;
        let created = self.store.generate(property_id, from, days).await?;
        tracing::info!(property_id, %from, days, created, "Calendar generated");
        Ok(created)
    }

    /// Whether the property is active and every day of `range` is free.
    pub async fn is_available(&self, property_id: i64, range: DateRange) -> Result<bool, LockError> {
        let snapshot = self.snapshot(property_id).await?;
        if snapshot.status != PropertyStatus::Active {
            return Ok(false);
        }
        Ok(self.unavailable_dates(property_id, range).await?.is_empty())
    }

    /// `LOCKED` or `BOOKED` dates inside `range`.
    pub async fn unavailable_dates(
        &self,
        property_id: i64,
        range: DateRange,
    ) -> Result<Vec<Date>, LockError> {
        Ok(self
            .store
            .days_in_range(property_id, range)
            .await?
            .into_iter()
            .filter(|day| !day.is_free())
            .map(|day| day.date)
            .collect())
    }

    pub async fn quote(&self, property_id: i64, range: DateRange) -> Result<PriceQuote, LockError> {
        let snapshot = self.snapshot(property_id).await?;
        let nights = range.nights();
        if nights < snapshot.min_stay_nights {
            return Err(LockError::MinimumStay {
                min_nights: snapshot.min_stay_nights,
                nights,
            });
        }
        let available = self.is_available(property_id, range).await?;
        Ok(PriceQuote {
            property_id,
            start_date: range.start,
            end_date: range.end,
            number_of_nights: nights,
            price_per_night: snapshot.price_per_night,
            total_price: snapshot.price_per_night * Decimal::from(nights),
            security_deposit: snapshot.security_deposit,
            min_stay_nights: snapshot.min_stay_nights,
            available,
        })
    }

    /// Owner block of free days. Past and unavailable days are skipped.
    ///
    /// Returns the number of days blocked.
    pub async fn block_dates(
        &self,
        property_id: i64,
        owner_id: i64,
        dates: &[Date],
        today: Date,
    ) -> Result<usize, LockError> {
        self.ensure_owner(property_id, owner_id).await?;
        self.swap_each(
            property_id,
            dates,
            today,
            DayExpectation::Available,
            DayTransition::Block,
        )
        .await
    }

    /// Revert owner blocks. Days booked by a tenant are never touched.
    pub async fn unblock_dates(
        &self,
        property_id: i64,
        owner_id: i64,
        dates: &[Date],
        today: Date,
    ) -> Result<usize, LockError> {
        self.ensure_owner(property_id, owner_id).await?;
        self.swap_each(
            property_id,
            dates,
            today,
            DayExpectation::BookedBy { holder: None },
            DayTransition::Free,
        )
        .await
    }

    pub async fn ensure_owner(&self, property_id: i64, user_id: i64) -> Result<(), LockError> {
        let snapshot = self.snapshot(property_id).await?;
        if snapshot.owner_id != user_id {
            return Err(LockError::NotOwner {
                property_id,
                user_id,
            });
        }
        Ok(())
    }

    async fn swap_each(
        &self,
        property_id: i64,
        dates: &[Date],
        today: Date,
        expect: DayExpectation,
        next: DayTransition,
    ) -> Result<usize, LockError> {
        let mut changed = 0;
        let pending: Vec<&Date> = dates.iter().filter(|d| **d >= today).unique().collect();
        for date in pending {
            if self
                .store
                .compare_and_swap(property_id, &[*date], expect, next)
                .await?
            {
                changed += 1;
            }
        }
        tracing::info!(property_id, requested = dates.len(), changed, ?next, "Owner calendar update");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::catalog::MemoryPropertyCatalog;
    use crate::calendar::store::MemoryCalendarStore;
    use rust_decimal_macros::dec;
    use time::macros::{date, datetime};

    const PROPERTY: i64 = 42;
    const OWNER: i64 = 1;

    fn snapshot() -> PropertySnapshot {
        PropertySnapshot {
            property_id: PROPERTY,
            owner_id: OWNER,
            owner_wallet: Some("0x00000000000000000000000000000000000000aa".to_string()),
            price_per_night: dec!(0.5),
            security_deposit: dec!(0.5),
            status: PropertyStatus::Active,
            min_stay_nights: 2,
            max_guests: Some(4),
        }
    }

    async fn manager() -> (LockManager, Arc<MemoryCalendarStore>) {
        let store = Arc::new(MemoryCalendarStore::new());
        let catalog = Arc::new(MemoryPropertyCatalog::new());
        catalog.insert(snapshot()).await;
        let manager = LockManager::new(store.clone(), catalog, Duration::from_secs(15 * 60));
        (manager, store)
    }

    fn range(start: Date, end: Date) -> DateRange {
        DateRange::new(start, end).unwrap()
    }

    #[tokio::test]
    async fn test_overlapping_lock_conflicts_until_released() {
        let (manager, _) = manager().await;
        let now = datetime!(2025-05-01 10:00 UTC);

        let first = manager
            .lock_at(PROPERTY, range(date!(2025 - 06 - 01), date!(2025 - 06 - 04)), 7, now)
            .await
            .unwrap();
        assert_eq!(first.expires_at, datetime!(2025-05-01 10:15 UTC));

        let overlapping = range(date!(2025 - 06 - 03), date!(2025 - 06 - 05));
        assert!(matches!(
            manager.lock_at(PROPERTY, overlapping, 8, now).await,
            Err(LockError::Unavailable)
        ));

        assert_eq!(manager.release(PROPERTY, first.lock_token).await.unwrap(), 3);
        manager.lock_at(PROPERTY, overlapping, 8, now).await.unwrap();
    }

    #[tokio::test]
    async fn test_adjacent_ranges_do_not_conflict() {
        let (manager, _) = manager().await;
        let now = datetime!(2025-05-01 10:00 UTC);
        manager
            .lock_at(PROPERTY, range(date!(2025 - 06 - 01), date!(2025 - 06 - 04)), 7, now)
            .await
            .unwrap();
        manager
            .lock_at(PROPERTY, range(date!(2025 - 06 - 04), date!(2025 - 06 - 06)), 8, now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (manager, store) = manager().await;
        let grant = manager
            .lock(PROPERTY, range(date!(2025 - 06 - 01), date!(2025 - 06 - 03)), 7)
            .await
            .unwrap();

        assert_eq!(manager.release(PROPERTY, grant.lock_token).await.unwrap(), 2);
        assert_eq!(manager.release(PROPERTY, grant.lock_token).await.unwrap(), 0);
        assert_eq!(manager.release(PROPERTY, Uuid::new_v4()).await.unwrap(), 0);

        let day = store.day(PROPERTY, date!(2025 - 06 - 01)).await.unwrap();
        assert_eq!(day.status, AvailabilityStatus::Available);
        assert_eq!(day.lock_token, None);
        assert_eq!(day.holder_id, None);
    }

    #[tokio::test]
    async fn test_commit_books_days_and_keeps_holder() {
        let (manager, store) = manager().await;
        let stay = range(date!(2025 - 06 - 01), date!(2025 - 06 - 04));
        let grant = manager.lock(PROPERTY, stay, 7).await.unwrap();

        manager
            .commit(PROPERTY, grant.lock_token, Some(stay))
            .await
            .unwrap();

        for date in stay.dates() {
            let day = store.day(PROPERTY, date).await.unwrap();
            assert_eq!(day.status, AvailabilityStatus::Booked);
            assert_eq!(day.lock_token, None);
            assert_eq!(day.lock_expires_at, None);
            assert_eq!(day.holder_id, Some(7));
        }
        // committing twice is not allowed
        assert!(matches!(
            manager.commit(PROPERTY, grant.lock_token, Some(stay)).await,
            Err(LockError::InvalidOrExpiredLock)
        ));
    }

    #[tokio::test]
    async fn test_booked_by_needs_every_day_for_the_holder() {
        let (manager, _) = manager().await;
        let stay = range(date!(2025 - 06 - 01), date!(2025 - 06 - 04));
        let grant = manager.lock(PROPERTY, stay, 7).await.unwrap();
        assert!(!manager.is_booked_by(PROPERTY, stay, 7).await.unwrap());

        manager
            .commit(PROPERTY, grant.lock_token, Some(stay))
            .await
            .unwrap();
        assert!(manager.is_booked_by(PROPERTY, stay, 7).await.unwrap());
        assert!(!manager.is_booked_by(PROPERTY, stay, 8).await.unwrap());

        // a longer range reaches unmaterialized days
        let longer = range(date!(2025 - 06 - 01), date!(2025 - 06 - 06));
        assert!(!manager.is_booked_by(PROPERTY, longer, 7).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_after_release_fails() {
        let (manager, _) = manager().await;
        let stay = range(date!(2025 - 06 - 01), date!(2025 - 06 - 04));
        let grant = manager.lock(PROPERTY, stay, 7).await.unwrap();
        manager.release(PROPERTY, grant.lock_token).await.unwrap();

        assert!(matches!(
            manager.commit(PROPERTY, grant.lock_token, Some(stay)).await,
            Err(LockError::InvalidOrExpiredLock)
        ));
    }

    #[tokio::test]
    async fn test_commit_after_expiry_fails() {
        let (manager, _) = manager().await;
        let stay = range(date!(2025 - 06 - 01), date!(2025 - 06 - 04));
        let locked_at = datetime!(2025-05-01 10:00 UTC);
        let grant = manager.lock_at(PROPERTY, stay, 7, locked_at).await.unwrap();

        let late = datetime!(2025-05-01 10:20 UTC);
        assert!(matches!(
            manager
                .commit_at(PROPERTY, grant.lock_token, Some(stay), late)
                .await,
            Err(LockError::InvalidOrExpiredLock)
        ));
    }

    #[tokio::test]
    async fn test_commit_rejects_mismatched_range() {
        let (manager, _) = manager().await;
        let stay = range(date!(2025 - 06 - 01), date!(2025 - 06 - 04));
        let grant = manager.lock(PROPERTY, stay, 7).await.unwrap();

        let shorter = range(date!(2025 - 06 - 01), date!(2025 - 06 - 03));
        assert!(matches!(
            manager.commit(PROPERTY, grant.lock_token, Some(shorter)).await,
            Err(LockError::InvalidOrExpiredLock)
        ));
        manager.commit(PROPERTY, grant.lock_token, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lock_blocks_until_swept() {
        let (manager, store) = manager().await;
        let stay = range(date!(2025 - 06 - 01), date!(2025 - 06 - 04));
        let locked_at = datetime!(2025-05-01 10:00 UTC);
        manager.lock_at(PROPERTY, stay, 7, locked_at).await.unwrap();

        let later = datetime!(2025-05-01 10:30 UTC);
        assert!(matches!(
            manager.lock_at(PROPERTY, stay, 8, later).await,
            Err(LockError::Unavailable)
        ));

        assert_eq!(manager.sweep_expired_at(later).await.unwrap(), 3);
        assert_eq!(
            store.day(PROPERTY, date!(2025 - 06 - 02)).await.unwrap().status,
            AvailabilityStatus::Available
        );
        manager.lock_at(PROPERTY, stay, 8, later).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_leaves_live_locks() {
        let (manager, _) = manager().await;
        let now = datetime!(2025-05-01 10:00 UTC);
        manager
            .lock_at(PROPERTY, range(date!(2025 - 06 - 01), date!(2025 - 06 - 03)), 7, now)
            .await
            .unwrap();
        assert_eq!(
            manager
                .sweep_expired_at(datetime!(2025-05-01 10:05 UTC))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_unbook_frees_only_the_holders_days() {
        let (manager, store) = manager().await;
        let stay = range(date!(2025 - 06 - 01), date!(2025 - 06 - 04));
        let grant = manager.lock(PROPERTY, stay, 7).await.unwrap();
        manager.commit(PROPERTY, grant.lock_token, None).await.unwrap();
        let today = date!(2025 - 05 - 01);
        manager
            .block_dates(PROPERTY, OWNER, &[date!(2025 - 06 - 05)], today)
            .await
            .unwrap();

        let wide = range(date!(2025 - 06 - 01), date!(2025 - 06 - 10));
        assert_eq!(manager.unbook(PROPERTY, wide, 99).await.unwrap(), 0);
        assert_eq!(manager.unbook(PROPERTY, wide, 7).await.unwrap(), 3);
        assert_eq!(
            manager.unavailable_dates(PROPERTY, wide).await.unwrap(),
            vec![date!(2025 - 06 - 05)]
        );
        assert!(store.day(PROPERTY, date!(2025 - 06 - 01)).await.unwrap().is_free());
    }

    #[tokio::test]
    async fn test_owner_block_and_unblock() {
        let (manager, _) = manager().await;
        let today = date!(2025 - 06 - 02);
        let dates = [
            date!(2025 - 06 - 01),
            date!(2025 - 06 - 10),
            date!(2025 - 06 - 11),
        ];

        assert!(matches!(
            manager.block_dates(PROPERTY, 99, &dates, today).await,
            Err(LockError::NotOwner { .. })
        ));
        // the past date is skipped
        assert_eq!(
            manager.block_dates(PROPERTY, OWNER, &dates, today).await.unwrap(),
            2
        );

        let stay = range(date!(2025 - 06 - 09), date!(2025 - 06 - 12));
        assert!(!manager.is_available(PROPERTY, stay).await.unwrap());
        assert!(matches!(
            manager.lock(PROPERTY, stay, 7).await,
            Err(LockError::Unavailable)
        ));

        assert_eq!(
            manager.unblock_dates(PROPERTY, OWNER, &dates, today).await.unwrap(),
            2
        );
        assert!(manager.is_available(PROPERTY, stay).await.unwrap());
    }

    #[tokio::test]
    async fn test_quote_enforces_min_stay() {
        let (manager, _) = manager().await;
        let one_night = range(date!(2025 - 06 - 01), date!(2025 - 06 - 02));
        assert!(matches!(
            manager.quote(PROPERTY, one_night).await,
            Err(LockError::MinimumStay {
                min_nights: 2,
                nights: 1
            })
        ));

        let quote = manager
            .quote(PROPERTY, range(date!(2025 - 06 - 01), date!(2025 - 06 - 04)))
            .await
            .unwrap();
        assert_eq!(quote.number_of_nights, 3);
        assert_eq!(quote.total_price, dec!(1.5));
        assert!(quote.available);
    }

    #[tokio::test]
    async fn test_unknown_property() {
        let (manager, _) = manager().await;
        let stay = range(date!(2025 - 06 - 01), date!(2025 - 06 - 04));
        assert!(matches!(
            manager.lock(PROPERTY + 1, stay, 7).await,
            Err(LockError::PropertyNotFound(43))
        ));
    }

    #[tokio::test]
    async fn test_generate_calendar() {
        let (manager, _) = manager().await;
        let from = date!(2025 - 01 - 01);
        assert_eq!(
            manager
                .generate_calendar(PROPERTY, from, CALENDAR_HORIZON_DAYS)
                .await
                .unwrap(),
            365
        );
        assert_eq!(
            manager
                .generate_calendar(PROPERTY, from, CALENDAR_HORIZON_DAYS)
                .await
                .unwrap(),
            0
        );
    }
}
