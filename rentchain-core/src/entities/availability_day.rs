use crate::entities::AvailabilityStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

const DAY_COLUMNS: &str =
    "property_id, date, status, lock_token, lock_expires_at, holder_id, price_multiplier";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AvailabilityDay {
    pub property_id: i64,
    pub date: Date,
    pub status: AvailabilityStatus,
    pub lock_token: Option<Uuid>,
    pub lock_expires_at: Option<OffsetDateTime>,
    /// Tenant holding the lock or the booking. `None` on owner blocks.
    pub holder_id: Option<i64>,
    pub price_multiplier: Decimal,
}

impl AvailabilityDay {
    /// A freshly materialized day.
    pub fn available(property_id: i64, date: Date) -> Self {
        Self {
            property_id,
            date,
            status: AvailabilityStatus::Available,
            lock_token: None,
            lock_expires_at: None,
            holder_id: None,
            price_multiplier: Decimal::ONE,
        }
    }

    pub fn is_free(&self) -> bool {
        self.status == AvailabilityStatus::Available
    }
}

/// How a lock's expiry must compare to `now` for a [`DayExpectation::LockedBy`] to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockExpiry {
    Any,
    Unexpired(OffsetDateTime),
    Expired(OffsetDateTime),
}

/// Prior state every day must be in for a compare-and-swap to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayExpectation {
    /// The day is `AVAILABLE`, or has no row yet.
    Available,
    LockedBy { token: Uuid, expiry: LockExpiry },
    /// `BOOKED` with exactly this holder. `None` matches owner blocks only.
    BookedBy { holder: Option<i64> },
}

impl DayExpectation {
    pub fn matches(&self, day: &AvailabilityDay) -> bool {
        match *self {
            DayExpectation::Available => day.status == AvailabilityStatus::Available,
            DayExpectation::LockedBy { token, expiry } => {
                if day.status != AvailabilityStatus::Locked || day.lock_token != Some(token) {
                    return false;
                }
                match (expiry, day.lock_expires_at) {
                    (LockExpiry::Any, _) => true,
                    (LockExpiry::Unexpired(now), Some(at)) => at > now,
                    (LockExpiry::Expired(now), Some(at)) => at < now,
                    (_, None) => false,
                }
            }
            DayExpectation::BookedBy { holder } => {
                day.status == AvailabilityStatus::Booked && day.holder_id == holder
            }
        }
    }

    /// Only a claim on free days may create missing rows.
    pub fn materializes_missing(&self) -> bool {
        matches!(self, DayExpectation::Available)
    }
}

/// State every matched day moves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayTransition {
    Lock {
        token: Uuid,
        expires_at: OffsetDateTime,
        holder_id: i64,
    },
    /// `LOCKED` to `BOOKED`. The holder is kept, token and expiry are cleared.
    Commit,
    /// Owner block: `BOOKED` without a holder.
    Block,
    /// Back to `AVAILABLE` with every lock field cleared.
    Free,
}

impl DayTransition {
    pub fn apply(&self, day: &mut AvailabilityDay) {
        match *self {
            DayTransition::Lock {
                token,
                expires_at,
                holder_id,
            } => {
                day.status = AvailabilityStatus::Locked;
                day.lock_token = Some(token);
                day.lock_expires_at = Some(expires_at);
                day.holder_id = Some(holder_id);
            }
            DayTransition::Commit => {
                day.status = AvailabilityStatus::Booked;
                day.lock_token = None;
                day.lock_expires_at = None;
            }
            DayTransition::Block => {
                day.status = AvailabilityStatus::Booked;
                day.lock_token = None;
                day.lock_expires_at = None;
                day.holder_id = None;
            }
            DayTransition::Free => {
                day.status = AvailabilityStatus::Available;
                day.lock_token = None;
                day.lock_expires_at = None;
                day.holder_id = None;
            }
        }
    }
}

/// A day whose lock outlived its expiry.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ExpiredLock {
    pub property_id: i64,
    pub date: Date,
    pub lock_token: Uuid,
}

#[derive(Debug, Clone)]
/// Atomically move every listed day from `expect` to `next`.
///
/// Runs in one transaction: missing rows are materialized (only when the
/// expectation is [`DayExpectation::Available`]), the rows are locked with
/// `FOR UPDATE`, checked, then updated. Returns `false` without touching
/// anything when a single day fails the expectation.
pub struct CompareAndSwapDays {
    pub property_id: i64,
    pub dates: Vec<Date>,
    pub expect: DayExpectation,
    pub next: DayTransition,
}

impl Processor<CompareAndSwapDays> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CompareAndSwapDays")]
    async fn process(&self, cmd: CompareAndSwapDays) -> Result<bool, sqlx::Error> {
        let CompareAndSwapDays {
            property_id,
            mut dates,
            expect,
            next,
        } = cmd;
        dates.sort_unstable();
        dates.dedup();
        if dates.is_empty() {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;

        if expect.materializes_missing() {
            let mut insert = sqlx::QueryBuilder::new(
                "INSERT INTO availability_days (property_id, date, status, price_multiplier) ",
            );
            insert.push_values(&dates, |mut b, date| {
                b.push_bind(property_id)
                    .push_bind(*date)
                    .push_bind(AvailabilityStatus::Available)
                    .push_bind(Decimal::ONE);
            });
            insert.push(" ON CONFLICT (property_id, date) DO NOTHING");
            insert.build().execute(&mut *tx).await?;
        }

        let rows: Vec<AvailabilityDay> = sqlx::query_as(&format!(
            "SELECT {DAY_COLUMNS} FROM availability_days \
             WHERE property_id = $1 AND date = ANY($2) \
             ORDER BY date FOR UPDATE"
        ))
        .bind(property_id)
        .bind(dates.as_slice())
        .fetch_all(&mut *tx)
        .await?;

        if rows.len() != dates.len() || !rows.iter().all(|day| expect.matches(day)) {
            tx.rollback().await?;
            return Ok(false);
        }

        let mut update = sqlx::QueryBuilder::new("UPDATE availability_days SET ");
        match next {
            DayTransition::Lock {
                token,
                expires_at,
                holder_id,
            } => {
                update
                    .push("status = ")
                    .push_bind(AvailabilityStatus::Locked)
                    .push(", lock_token = ")
                    .push_bind(token)
                    .push(", lock_expires_at = ")
                    .push_bind(expires_at)
                    .push(", holder_id = ")
                    .push_bind(holder_id);
            }
            DayTransition::Commit => {
                update
                    .push("status = ")
                    .push_bind(AvailabilityStatus::Booked)
                    .push(", lock_token = NULL, lock_expires_at = NULL");
            }
            DayTransition::Block => {
                update
                    .push("status = ")
                    .push_bind(AvailabilityStatus::Booked)
                    .push(", lock_token = NULL, lock_expires_at = NULL, holder_id = NULL");
            }
            DayTransition::Free => {
                update
                    .push("status = ")
                    .push_bind(AvailabilityStatus::Available)
                    .push(", lock_token = NULL, lock_expires_at = NULL, holder_id = NULL");
            }
        }
        update
            .push(", updated_at = NOW() WHERE property_id = ")
            .push_bind(property_id)
            .push(" AND date = ANY(")
            .push_bind(dates)
            .push(")");
        update.build().execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[derive(Debug, Clone)]
/// Days of a property inside `[start, end)` that have a row.
pub struct GetDaysInRange {
    pub property_id: i64,
    pub start: Date,
    pub end: Date,
}

impl Processor<GetDaysInRange> for DatabaseProcessor {
    type Output = Vec<AvailabilityDay>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDaysInRange")]
    async fn process(&self, query: GetDaysInRange) -> Result<Vec<AvailabilityDay>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {DAY_COLUMNS} FROM availability_days \
             WHERE property_id = $1 AND date >= $2 AND date < $3 \
             ORDER BY date"
        ))
        .bind(query.property_id)
        .bind(query.start)
        .bind(query.end)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Dates currently `LOCKED` with a token, expired or not.
pub struct GetLockedDatesByToken {
    pub property_id: i64,
    pub lock_token: Uuid,
}

impl Processor<GetLockedDatesByToken> for DatabaseProcessor {
    type Output = Vec<Date>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetLockedDatesByToken")]
    async fn process(&self, query: GetLockedDatesByToken) -> Result<Vec<Date>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT date
            FROM availability_days
            WHERE property_id = $1
              AND status = 'LOCKED'
              AND lock_token = $2
            ORDER BY date
            "#,
        )
        .bind(query.property_id)
        .bind(query.lock_token)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Every `LOCKED` day whose expiry is before `now`, grouped by property and token.
pub struct GetExpiredLocks {
    pub now: OffsetDateTime,
}

impl Processor<GetExpiredLocks> for DatabaseProcessor {
    type Output = Vec<ExpiredLock>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetExpiredLocks")]
    async fn process(&self, query: GetExpiredLocks) -> Result<Vec<ExpiredLock>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT property_id, date, lock_token
            FROM availability_days
            WHERE status = 'LOCKED'
              AND lock_token IS NOT NULL
              AND lock_expires_at < $1
            ORDER BY property_id, lock_token, date
            "#,
        )
        .bind(query.now)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Materialize `days` consecutive `AVAILABLE` days starting at `from`.
///
/// Existing rows are never overwritten. Returns the number of rows created.
pub struct GenerateCalendarDays {
    pub property_id: i64,
    pub from: Date,
    pub days: u32,
}

impl Processor<GenerateCalendarDays> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GenerateCalendarDays")]
    async fn process(&self, cmd: GenerateCalendarDays) -> Result<u64, sqlx::Error> {
        if cmd.days == 0 {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            INSERT INTO availability_days (property_id, date, status, price_multiplier)
            SELECT $1, d::date, 'AVAILABLE', 1
            FROM generate_series($2::date, $2::date + ($3::int - 1), INTERVAL '1 day') AS d
            ON CONFLICT (property_id, date) DO NOTHING
            "#,
        )
        .bind(cmd.property_id)
        .bind(cmd.from)
        .bind(cmd.days as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
