use crate::entities::BookingStatus;
use crate::entities::booking::{
    Booking, BookingFilter, BookingPatch, GetBooking, GetBookingByRentalId, GetBookingByTxHash,
    GetOwnerStatusTotals, InsertBooking, ListBookings, NewBooking, StatusTotal,
    TransitionBooking,
};
use crate::framework::{DatabaseProcessor, StoreError};
use kanau::processor::Processor;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// Storage for booking records.
///
/// Status changes go through [`BookingStore::transition`], a compare-and-swap
/// on the current status. A payment tx hash is unique across all bookings;
/// reusing one yields [`StoreError::UniqueViolation`].
#[async_trait::async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: NewBooking) -> Result<Booking, StoreError>;

    async fn get(&self, booking_id: i64) -> Result<Option<Booking>, StoreError>;

    async fn find_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Booking>, StoreError>;

    async fn find_by_rental_id(&self, rental_id: i64) -> Result<Option<Booking>, StoreError>;

    /// Newest first.
    async fn list(&self, filter: BookingFilter) -> Result<Vec<Booking>, StoreError>;

    /// Move the booking from `from` to `to`, applying `patch`.
    ///
    /// Returns `None` when the booking is missing or no longer in `from`.
    async fn transition(
        &self,
        booking_id: i64,
        from: BookingStatus,
        to: BookingStatus,
        patch: BookingPatch,
        now: OffsetDateTime,
    ) -> Result<Option<Booking>, StoreError>;

    async fn owner_totals(&self, owner_id: i64) -> Result<Vec<StatusTotal>, StoreError>;
}

#[async_trait::async_trait]
impl BookingStore for DatabaseProcessor {
    async fn insert(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        self.process(InsertBooking(booking))
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn get(&self, booking_id: i64) -> Result<Option<Booking>, StoreError> {
        Ok(self.process(GetBooking { booking_id }).await?)
    }

    async fn find_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .process(GetBookingByTxHash {
                tx_hash: tx_hash.to_string(),
            })
            .await?)
    }

    async fn find_by_rental_id(&self, rental_id: i64) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .process(GetBookingByRentalId {
                blockchain_rental_id: rental_id,
            })
            .await?)
    }

    async fn list(&self, filter: BookingFilter) -> Result<Vec<Booking>, StoreError> {
        Ok(self.process(ListBookings(filter)).await?)
    }

    async fn transition(
        &self,
        booking_id: i64,
        from: BookingStatus,
        to: BookingStatus,
        patch: BookingPatch,
        now: OffsetDateTime,
    ) -> Result<Option<Booking>, StoreError> {
        self.process(TransitionBooking {
            booking_id,
            from,
            to,
            patch,
            now,
        })
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn owner_totals(&self, owner_id: i64) -> Result<Vec<StatusTotal>, StoreError> {
        Ok(self.process(GetOwnerStatusTotals { owner_id }).await?)
    }
}

#[derive(Debug, Default)]
struct MemoryBookings {
    next_id: i64,
    rows: BTreeMap<i64, Booking>,
}

/// In-process booking store with the same uniqueness rules as the database.
#[derive(Debug, Default)]
pub struct MemoryBookingStore {
    inner: Mutex<MemoryBookings>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BookingStore for MemoryBookingStore {
    async fn insert(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let booking = booking.into_booking(inner.next_id);
        inner.rows.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get(&self, booking_id: i64) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.lock().await.rows.get(&booking_id).cloned())
    }

    async fn find_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .rows
            .values()
            .find(|b| b.payment_tx_hash.as_deref() == Some(tx_hash))
            .cloned())
    }

    async fn find_by_rental_id(&self, rental_id: i64) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .rows
            .values()
            .filter(|b| b.blockchain_rental_id == Some(rental_id))
            .max_by_key(|b| (b.created_at, b.id))
            .cloned())
    }

    async fn list(&self, filter: BookingFilter) -> Result<Vec<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        let mut bookings: Vec<Booking> = inner
            .rows
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        if let Some(limit) = filter.limit {
            bookings.truncate(limit.max(0) as usize);
        }
        Ok(bookings)
    }

    async fn transition(
        &self,
        booking_id: i64,
        from: BookingStatus,
        to: BookingStatus,
        patch: BookingPatch,
        now: OffsetDateTime,
    ) -> Result<Option<Booking>, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(hash) = &patch.payment_tx_hash
            && inner
                .rows
                .values()
                .any(|b| {
                    b.id != booking_id && b.payment_tx_hash.as_deref() == Some(hash.as_str())
                })
        {
            return Err(StoreError::UniqueViolation(
                "bookings_payment_tx_hash_key".to_string(),
            ));
        }
        let Some(booking) = inner.rows.get_mut(&booking_id) else {
            return Ok(None);
        };
        if booking.status != from {
            return Ok(None);
        }
        booking.status = to;
        booking.updated_at = now;
        patch.apply(booking);
        Ok(Some(booking.clone()))
    }

    async fn owner_totals(&self, owner_id: i64) -> Result<Vec<StatusTotal>, StoreError> {
        let inner = self.inner.lock().await;
        let mut totals: HashMap<BookingStatus, (i64, Decimal)> = HashMap::new();
        for booking in inner.rows.values().filter(|b| b.owner_id == owner_id) {
            let entry = totals.entry(booking.status).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += booking.total_price;
        }
        Ok(totals
            .into_iter()
            .map(|(status, (bookings, total_price))| StatusTotal {
                status,
                bookings,
                total_price,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::{date, datetime};
    use uuid::Uuid;

    fn new_booking(tenant_id: i64) -> NewBooking {
        NewBooking {
            property_id: 42,
            tenant_id,
            tenant_wallet: "0x00000000000000000000000000000000000000bb".into(),
            owner_id: 1,
            owner_wallet: "0x00000000000000000000000000000000000000aa".into(),
            check_in: date!(2025 - 06 - 01),
            check_out: date!(2025 - 06 - 04),
            number_of_guests: Some(2),
            total_price: dec!(1.5),
            security_deposit: dec!(0.5),
            lock_token: Uuid::new_v4(),
            created_at: datetime!(2025-05-01 10:00 UTC),
        }
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_swap() {
        let store = MemoryBookingStore::new();
        let booking = store.insert(new_booking(7)).await.unwrap();
        let now = datetime!(2025-05-01 10:01 UTC);

        let patch = BookingPatch {
            payment_tx_hash: Some("0xabc".into()),
            ..Default::default()
        };
        let moved = store
            .transition(
                booking.id,
                BookingStatus::PendingPayment,
                BookingStatus::PaymentProcessing,
                patch.clone(),
                now,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.status, BookingStatus::PaymentProcessing);
        assert_eq!(moved.payment_tx_hash.as_deref(), Some("0xabc"));

        // stale expectation
        assert!(
            store
                .transition(
                    booking.id,
                    BookingStatus::PendingPayment,
                    BookingStatus::PaymentProcessing,
                    patch,
                    now,
                )
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_tx_hash_is_unique() {
        let store = MemoryBookingStore::new();
        let first = store.insert(new_booking(7)).await.unwrap();
        let second = store.insert(new_booking(8)).await.unwrap();
        let now = datetime!(2025-05-01 10:01 UTC);
        let patch = BookingPatch {
            payment_tx_hash: Some("0xabc".into()),
            ..Default::default()
        };

        store
            .transition(
                first.id,
                BookingStatus::PendingPayment,
                BookingStatus::PaymentProcessing,
                patch.clone(),
                now,
            )
            .await
            .unwrap();
        let err = store
            .transition(
                second.id,
                BookingStatus::PendingPayment,
                BookingStatus::PaymentProcessing,
                patch,
                now,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
        assert_eq!(
            store.find_by_tx_hash("0xabc").await.unwrap().unwrap().id,
            first.id
        );
    }

    #[tokio::test]
    async fn test_booking_may_keep_its_own_tx_hash() {
        let store = MemoryBookingStore::new();
        let booking = store.insert(new_booking(7)).await.unwrap();
        let now = datetime!(2025-05-01 10:01 UTC);
        let patch = BookingPatch {
            payment_tx_hash: Some("0xabc".into()),
            ..Default::default()
        };

        store
            .transition(
                booking.id,
                BookingStatus::PendingPayment,
                BookingStatus::PaymentProcessing,
                patch.clone(),
                now,
            )
            .await
            .unwrap()
            .unwrap();
        // a retry on the same booking with the same hash is not a duplicate
        let back = store
            .transition(
                booking.id,
                BookingStatus::PaymentProcessing,
                BookingStatus::PendingPayment,
                patch,
                now,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(back.payment_tx_hash.as_deref(), Some("0xabc"));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let store = MemoryBookingStore::new();
        let a = store.insert(new_booking(7)).await.unwrap();
        let mut later = new_booking(8);
        later.created_at = datetime!(2025-05-02 10:00 UTC);
        later.check_in = date!(2025 - 07 - 01);
        later.check_out = date!(2025 - 07 - 03);
        let b = store.insert(later).await.unwrap();

        let all = store.list(BookingFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|b| b.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        let overlapping = store
            .list(BookingFilter {
                property_id: Some(42),
                overlaps: Some((date!(2025 - 06 - 03), date!(2025 - 06 - 10))),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(overlapping.len(), 1);
        assert_eq!(overlapping[0].id, a.id);

        let untouched = store
            .list(BookingFilter {
                updated_before: Some(datetime!(2025-05-02 00:00 UTC)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(untouched.iter().map(|b| b.id).collect::<Vec<_>>(), vec![a.id]);

        let totals = store.owner_totals(1).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].bookings, 2);
        assert_eq!(totals[0].total_price, dec!(3.0));
    }
}
