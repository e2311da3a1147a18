use crate::entities::BookingStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rentchain_sdk::objects::BookingResponse;
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, property_id, tenant_id, tenant_wallet, owner_id, owner_wallet, \
    check_in, check_out, number_of_guests, total_price, security_deposit, status, lock_token, \
    payment_tx_hash, blockchain_rental_id, cancellation_reason, created_at, updated_at, \
    confirmed_at, payment_confirmed_at, cancelled_at, completed_at";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Booking {
    pub id: i64,
    pub property_id: i64,
    pub tenant_id: i64,
    pub tenant_wallet: String,
    pub owner_id: i64,
    pub owner_wallet: String,
    pub check_in: Date,
    /// Exclusive.
    pub check_out: Date,
    pub number_of_guests: Option<i32>,
    /// In ETH.
    pub total_price: Decimal,
    /// In ETH.
    pub security_deposit: Decimal,
    pub status: BookingStatus,
    pub lock_token: Uuid,
    pub payment_tx_hash: Option<String>,
    pub blockchain_rental_id: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub confirmed_at: Option<OffsetDateTime>,
    pub payment_confirmed_at: Option<OffsetDateTime>,
    pub cancelled_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

impl From<&Booking> for BookingResponse {
    fn from(b: &Booking) -> Self {
        BookingResponse {
            id: b.id,
            property_id: b.property_id,
            tenant_id: b.tenant_id,
            tenant_wallet: b.tenant_wallet.clone(),
            owner_id: b.owner_id,
            owner_wallet: b.owner_wallet.clone(),
            check_in: b.check_in,
            check_out: b.check_out,
            number_of_guests: b.number_of_guests.map(|g| g.max(0) as u32),
            total_price: b.total_price,
            security_deposit: b.security_deposit,
            status: b.status.into(),
            lock_token: b.lock_token,
            payment_tx_hash: b.payment_tx_hash.clone(),
            blockchain_rental_id: b.blockchain_rental_id,
            cancellation_reason: b.cancellation_reason.clone(),
            created_at: b.created_at.unix_timestamp(),
            confirmed_at: b.confirmed_at.map(OffsetDateTime::unix_timestamp),
            payment_confirmed_at: b.payment_confirmed_at.map(OffsetDateTime::unix_timestamp),
            cancelled_at: b.cancelled_at.map(OffsetDateTime::unix_timestamp),
            completed_at: b.completed_at.map(OffsetDateTime::unix_timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub property_id: i64,
    pub tenant_id: i64,
    pub tenant_wallet: String,
    pub owner_id: i64,
    pub owner_wallet: String,
    pub check_in: Date,
    pub check_out: Date,
    pub number_of_guests: Option<i32>,
    pub total_price: Decimal,
    pub security_deposit: Decimal,
    pub lock_token: Uuid,
    pub created_at: OffsetDateTime,
}

impl NewBooking {
    /// The row this insert produces, given the id the store assigned.
    pub fn into_booking(self, id: i64) -> Booking {
        Booking {
            id,
            property_id: self.property_id,
            tenant_id: self.tenant_id,
            tenant_wallet: self.tenant_wallet,
            owner_id: self.owner_id,
            owner_wallet: self.owner_wallet,
            check_in: self.check_in,
            check_out: self.check_out,
            number_of_guests: self.number_of_guests,
            total_price: self.total_price,
            security_deposit: self.security_deposit,
            status: BookingStatus::PendingPayment,
            lock_token: self.lock_token,
            payment_tx_hash: None,
            blockchain_rental_id: None,
            cancellation_reason: None,
            created_at: self.created_at,
            updated_at: self.created_at,
            confirmed_at: None,
            payment_confirmed_at: None,
            cancelled_at: None,
            completed_at: None,
        }
    }
}

/// Fields set alongside a status transition. `None` leaves a column as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub payment_tx_hash: Option<String>,
    pub blockchain_rental_id: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub confirmed_at: Option<OffsetDateTime>,
    pub payment_confirmed_at: Option<OffsetDateTime>,
    pub cancelled_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

impl BookingPatch {
    pub fn apply(&self, booking: &mut Booking) {
        if let Some(hash) = &self.payment_tx_hash {
            booking.payment_tx_hash = Some(hash.clone());
        }
        if let Some(id) = self.blockchain_rental_id {
            booking.blockchain_rental_id = Some(id);
        }
        if let Some(reason) = &self.cancellation_reason {
            booking.cancellation_reason = Some(reason.clone());
        }
        booking.confirmed_at = self.confirmed_at.or(booking.confirmed_at);
        booking.payment_confirmed_at = self.payment_confirmed_at.or(booking.payment_confirmed_at);
        booking.cancelled_at = self.cancelled_at.or(booking.cancelled_at);
        booking.completed_at = self.completed_at.or(booking.completed_at);
    }
}

/// Criteria for listing bookings. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub tenant_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub property_id: Option<i64>,
    /// Empty means any status.
    pub statuses: Vec<BookingStatus>,
    pub created_before: Option<OffsetDateTime>,
    pub updated_before: Option<OffsetDateTime>,
    pub check_in_on_or_before: Option<Date>,
    pub check_out_before: Option<Date>,
    /// Keep bookings whose `[check_in, check_out)` overlaps `[start, end)`.
    pub overlaps: Option<(Date, Date)>,
    pub limit: Option<i64>,
}

impl BookingFilter {
    pub fn matches(&self, b: &Booking) -> bool {
        self.tenant_id.is_none_or(|id| b.tenant_id == id)
            && self.owner_id.is_none_or(|id| b.owner_id == id)
            && self.property_id.is_none_or(|id| b.property_id == id)
            && (self.statuses.is_empty() || self.statuses.contains(&b.status))
            && self.created_before.is_none_or(|at| b.created_at < at)
            && self.updated_before.is_none_or(|at| b.updated_at < at)
            && self.check_in_on_or_before.is_none_or(|d| b.check_in <= d)
            && self.check_out_before.is_none_or(|d| b.check_out < d)
            && self
                .overlaps
                .is_none_or(|(start, end)| b.check_in < end && start < b.check_out)
    }
}

/// Per-status booking count and price sum of one owner.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StatusTotal {
    pub status: BookingStatus,
    pub bookings: i64,
    pub total_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct InsertBooking(pub NewBooking);

impl Processor<InsertBooking> for DatabaseProcessor {
    type Output = Booking;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertBooking")]
    async fn process(&self, insert: InsertBooking) -> Result<Booking, sqlx::Error> {
        let new = insert.0;
        sqlx::query_as(&format!(
            "INSERT INTO bookings (property_id, tenant_id, tenant_wallet, owner_id, owner_wallet, \
             check_in, check_out, number_of_guests, total_price, security_deposit, status, \
             lock_token, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13) \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(new.property_id)
        .bind(new.tenant_id)
        .bind(new.tenant_wallet)
        .bind(new.owner_id)
        .bind(new.owner_wallet)
        .bind(new.check_in)
        .bind(new.check_out)
        .bind(new.number_of_guests)
        .bind(new.total_price)
        .bind(new.security_deposit)
        .bind(BookingStatus::PendingPayment)
        .bind(new.lock_token)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetBooking {
    pub booking_id: i64,
}

impl Processor<GetBooking> for DatabaseProcessor {
    type Output = Option<Booking>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBooking")]
    async fn process(&self, query: GetBooking) -> Result<Option<Booking>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(query.booking_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetBookingByTxHash {
    pub tx_hash: String,
}

impl Processor<GetBookingByTxHash> for DatabaseProcessor {
    type Output = Option<Booking>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBookingByTxHash")]
    async fn process(&self, query: GetBookingByTxHash) -> Result<Option<Booking>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE payment_tx_hash = $1"
        ))
        .bind(query.tx_hash)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// The most recent booking carrying an escrow rental id.
pub struct GetBookingByRentalId {
    pub blockchain_rental_id: i64,
}

impl Processor<GetBookingByRentalId> for DatabaseProcessor {
    type Output = Option<Booking>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBookingByRentalId")]
    async fn process(&self, query: GetBookingByRentalId) -> Result<Option<Booking>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE blockchain_rental_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(query.blockchain_rental_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// List bookings matching a [`BookingFilter`], newest first.
pub struct ListBookings(pub BookingFilter);

impl Processor<ListBookings> for DatabaseProcessor {
    type Output = Vec<Booking>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListBookings")]
    async fn process(&self, query: ListBookings) -> Result<Vec<Booking>, sqlx::Error> {
        let filter = query.0;
        let mut builder =
            sqlx::QueryBuilder::new(format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE TRUE"));

        if let Some(id) = filter.tenant_id {
            builder.push(" AND tenant_id = ").push_bind(id);
        }
        if let Some(id) = filter.owner_id {
            builder.push(" AND owner_id = ").push_bind(id);
        }
        if let Some(id) = filter.property_id {
            builder.push(" AND property_id = ").push_bind(id);
        }
        if !filter.statuses.is_empty() {
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for status in filter.statuses {
                separated.push_bind(status);
            }
            separated.push_unseparated(")");
        }
        if let Some(at) = filter.created_before {
            builder.push(" AND created_at < ").push_bind(at);
        }
        if let Some(at) = filter.updated_before {
            builder.push(" AND updated_at < ").push_bind(at);
        }
        if let Some(date) = filter.check_in_on_or_before {
            builder.push(" AND check_in <= ").push_bind(date);
        }
        if let Some(date) = filter.check_out_before {
            builder.push(" AND check_out < ").push_bind(date);
        }
        if let Some((start, end)) = filter.overlaps {
            builder
                .push(" AND check_in < ")
                .push_bind(end)
                .push(" AND check_out > ")
                .push_bind(start);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        builder
            .build_query_as::<Booking>()
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Compare-and-swap on a booking's status.
///
/// The row changes only while its status is still `from`. Returns the
/// updated booking, or `None` if the status had already moved on.
pub struct TransitionBooking {
    pub booking_id: i64,
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub patch: BookingPatch,
    pub now: OffsetDateTime,
}

impl Processor<TransitionBooking> for DatabaseProcessor {
    type Output = Option<Booking>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:TransitionBooking")]
    async fn process(&self, cmd: TransitionBooking) -> Result<Option<Booking>, sqlx::Error> {
        let TransitionBooking {
            booking_id,
            from,
            to,
            patch,
            now,
        } = cmd;
        sqlx::query_as(&format!(
            r#"
            UPDATE bookings SET
                status = $3,
                updated_at = $4,
                payment_tx_hash = COALESCE($5, payment_tx_hash),
                blockchain_rental_id = COALESCE($6, blockchain_rental_id),
                cancellation_reason = COALESCE($7, cancellation_reason),
                confirmed_at = COALESCE($8, confirmed_at),
                payment_confirmed_at = COALESCE($9, payment_confirmed_at),
                cancelled_at = COALESCE($10, cancelled_at),
                completed_at = COALESCE($11, completed_at)
            WHERE id = $1 AND status = $2
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking_id)
        .bind(from)
        .bind(to)
        .bind(now)
        .bind(patch.payment_tx_hash)
        .bind(patch.blockchain_rental_id)
        .bind(patch.cancellation_reason)
        .bind(patch.confirmed_at)
        .bind(patch.payment_confirmed_at)
        .bind(patch.cancelled_at)
        .bind(patch.completed_at)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetOwnerStatusTotals {
    pub owner_id: i64,
}

impl Processor<GetOwnerStatusTotals> for DatabaseProcessor {
    type Output = Vec<StatusTotal>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOwnerStatusTotals")]
    async fn process(&self, query: GetOwnerStatusTotals) -> Result<Vec<StatusTotal>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT
                status,
                COUNT(*) AS bookings,
                COALESCE(SUM(total_price), 0) AS total_price
            FROM bookings
            WHERE owner_id = $1
            GROUP BY status
            "#,
        )
        .bind(query.owner_id)
        .fetch_all(&self.pool)
        .await
    }
}
