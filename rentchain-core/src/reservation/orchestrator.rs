//! The booking state machine.
//!
//! ```text
//! PENDING_PAYMENT -> PAYMENT_PROCESSING -> CONFIRMED -> ACTIVE -> COMPLETED
//!        |                  |                 |
//!        +--> CANCELLED <---+-----------------+      PAYMENT_PROCESSING -> DISPUTED
//! ```
//!
//! Every status change is a compare-and-swap on the booking store, so a
//! redelivered event or a racing sweep can never apply the same transition
//! twice. Cross-service compensations are best effort: they are logged and
//! never block the primary transition, the sweeps catch what they miss.

use crate::calendar::DateRange;
use crate::entities::BookingStatus;
use crate::entities::booking::{Booking, BookingFilter, BookingPatch, NewBooking};
use crate::events::EventPublisher;
use crate::framework::StoreError;
use crate::reservation::BookingError;
use crate::reservation::gateway::{GatewayError, PropertyGateway, TenantDirectory};
use crate::reservation::pricing::{expected_deposit, price_stay};
use crate::reservation::store::BookingStore;
use crate::utils::evm::is_valid_tx_hash;
use rentchain_sdk::objects::{
    BookingCancelled, BookingRole, BookingStatus as SdkBookingStatus, BusMessage,
    CreateBookingRequest, OwnerStats, RoutingKey, VerificationOutcome, VerificationRequest,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// Statuses that still occupy their dates.
const OCCUPYING: [BookingStatus; 6] = [
    BookingStatus::PendingPayment,
    BookingStatus::PaymentProcessing,
    BookingStatus::Confirmed,
    BookingStatus::Active,
    BookingStatus::Completed,
    BookingStatus::Disputed,
];

/// What handling a payment status event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeEffect {
    Confirmed,
    /// Payment verified but the dates could not be committed.
    Disputed,
    Completed,
    ReturnedToPending,
    /// Acknowledged without side effects.
    Ignored(&'static str),
}

#[derive(Clone)]
pub struct ReservationOrchestrator {
    bookings: Arc<dyn BookingStore>,
    properties: Arc<dyn PropertyGateway>,
    tenants: Arc<dyn TenantDirectory>,
    publisher: Arc<dyn EventPublisher>,
    pending_timeout: Duration,
    reverify_after: Duration,
}

/// Default age of a `PAYMENT_PROCESSING` booking before it is verified again.
pub const DEFAULT_REVERIFY_AFTER: Duration = Duration::from_secs(300);

impl ReservationOrchestrator {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        properties: Arc<dyn PropertyGateway>,
        tenants: Arc<dyn TenantDirectory>,
        publisher: Arc<dyn EventPublisher>,
        pending_timeout: Duration,
    ) -> Self {
        Self {
            bookings,
            properties,
            tenants,
            publisher,
            pending_timeout,
            reverify_after: DEFAULT_REVERIFY_AFTER,
        }
    }

    pub fn with_reverify_after(mut self, reverify_after: Duration) -> Self {
        self.reverify_after = reverify_after;
        self
    }

    pub async fn create(
        &self,
        tenant_id: i64,
        request: CreateBookingRequest,
    ) -> Result<Booking, BookingError> {
        self.create_at(tenant_id, request, OffsetDateTime::now_utc())
            .await
    }

    /// Lock the dates and record a `PENDING_PAYMENT` booking.
    pub async fn create_at(
        &self,
        tenant_id: i64,
        request: CreateBookingRequest,
        now: OffsetDateTime,
    ) -> Result<Booking, BookingError> {
        let range = DateRange::new(request.check_in, request.check_out)
            .map_err(|e| BookingError::Validation(e.to_string()))?;
        if range.start < now.date() {
            return Err(BookingError::Validation(
                "check-in date is in the past".into(),
            ));
        }

        let tenant = self.tenants.tenant(tenant_id).await.map_err(|e| match e {
            GatewayError::NotFound(_) => BookingError::Unauthorized(format!("unknown user {tenant_id}")),
            other => BookingError::ServiceIntegration(other.to_string()),
        })?;
        if !tenant.is_eligible() {
            return Err(BookingError::Unauthorized(
                "wallet must be verified and KYC complete before booking".into(),
            ));
        }
        let tenant_wallet = tenant.wallet_address.unwrap_or_default();

        let property = self.properties.snapshot(request.property_id).await?;
        if property.owner_id == tenant_id {
            return Err(BookingError::Validation(
                "owners cannot book their own property".into(),
            ));
        }
        let price = price_stay(&property, range, request.number_of_guests)?;
        let owner_wallet = property.owner_wallet.clone().unwrap_or_default();

        let overlapping = self
            .bookings
            .list(BookingFilter {
                property_id: Some(request.property_id),
                statuses: OCCUPYING.to_vec(),
                overlaps: Some((range.start, range.end)),
                limit: Some(1),
                ..Default::default()
            })
            .await?;
        if !overlapping.is_empty() {
            debug!(property_id = request.property_id, "Overlapping booking found");
            return Err(BookingError::Conflict);
        }

        let lock = self
            .properties
            .lock(request.property_id, range, tenant_id)
            .await?;

        let new = NewBooking {
            property_id: request.property_id,
            tenant_id,
            tenant_wallet,
            owner_id: property.owner_id,
            owner_wallet,
            check_in: range.start,
            check_out: range.end,
            number_of_guests: request.number_of_guests.map(|g| g as i32),
            total_price: price.total_price,
            security_deposit: price.security_deposit,
            lock_token: lock.lock_token,
            created_at: now,
        };
        let booking = match self.bookings.insert(new).await {
            Ok(booking) => booking,
            Err(e) => {
                self.release_quietly(request.property_id, lock.lock_token).await;
                return Err(e.into());
            }
        };

        info!(
            booking_id = booking.id,
            property_id = booking.property_id,
            tenant_id,
            lock_token = %booking.lock_token,
            total_price = %booking.total_price,
            "Booking created"
        );
        Ok(booking)
    }

    pub async fn confirm(
        &self,
        booking_id: i64,
        caller_id: i64,
        tx_hash: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.require(booking_id).await?;
        if booking.tenant_id != caller_id {
            return Err(BookingError::Unauthorized(
                "only the tenant can confirm a booking".into(),
            ));
        }
        self.begin_verification(booking, tx_hash, None).await
    }

    /// Attach the escrow's rental id to the caller's latest unpaid booking.
    ///
    /// With a tx hash the booking also moves on to verification.
    pub async fn link_rental(
        &self,
        caller_id: i64,
        property_id: i64,
        blockchain_rental_id: i64,
        tx_hash: Option<&str>,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .bookings
            .list(BookingFilter {
                tenant_id: Some(caller_id),
                property_id: Some(property_id),
                statuses: vec![BookingStatus::PendingPayment],
                limit: Some(1),
                ..Default::default()
            })
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                BookingError::Validation(format!(
                    "no booking awaiting payment for property {property_id}"
                ))
            })?;

        if let Some(tx_hash) = tx_hash {
            return self
                .begin_verification(booking, tx_hash, Some(blockchain_rental_id))
                .await;
        }

        let patch = BookingPatch {
            blockchain_rental_id: Some(blockchain_rental_id),
            ..Default::default()
        };
        let updated = self
            .bookings
            .transition(
                booking.id,
                BookingStatus::PendingPayment,
                BookingStatus::PendingPayment,
                patch,
                OffsetDateTime::now_utc(),
            )
            .await?
            .ok_or(BookingError::InvalidState {
                booking_id: booking.id,
                status: booking.status,
            })?;
        info!(booking_id = updated.id, blockchain_rental_id, "Rental id linked");
        Ok(updated)
    }

    /// `PENDING_PAYMENT -> PAYMENT_PROCESSING`, then ask the verifier.
    ///
    /// The status transition guards the request: it is published at most once
    /// per attempt. If publishing fails the booking goes back to
    /// `PENDING_PAYMENT` so the tenant can retry.
    async fn begin_verification(
        &self,
        booking: Booking,
        tx_hash: &str,
        blockchain_rental_id: Option<i64>,
    ) -> Result<Booking, BookingError> {
        let tx_hash = tx_hash.trim().to_ascii_lowercase();
        if !is_valid_tx_hash(&tx_hash) {
            return Err(BookingError::Validation(
                "tx hash must be 0x followed by 64 hex digits".into(),
            ));
        }
        if booking.status != BookingStatus::PendingPayment {
            return Err(BookingError::InvalidState {
                booking_id: booking.id,
                status: booking.status,
            });
        }
        if let Some(other) = self.bookings.find_by_tx_hash(&tx_hash).await?
            && other.id != booking.id
        {
            return Err(BookingError::DuplicateTransaction(tx_hash));
        }
        let expected_amount = expected_deposit(booking.total_price, booking.security_deposit)
            .ok_or_else(|| BookingError::Validation("price cannot be expressed in wei".into()))?;

        let patch = BookingPatch {
            payment_tx_hash: Some(tx_hash.clone()),
            blockchain_rental_id,
            ..Default::default()
        };
        let processing = match self
            .bookings
            .transition(
                booking.id,
                BookingStatus::PendingPayment,
                BookingStatus::PaymentProcessing,
                patch,
                OffsetDateTime::now_utc(),
            )
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                let current = self.require(booking.id).await?;
                return Err(BookingError::InvalidState {
                    booking_id: current.id,
                    status: current.status,
                });
            }
            Err(StoreError::UniqueViolation(_)) => {
                return Err(BookingError::DuplicateTransaction(tx_hash));
            }
            Err(e) => return Err(e.into()),
        };

        let request = BusMessage::VerificationRequest(VerificationRequest {
            booking_id: processing.id,
            tx_hash: tx_hash.clone(),
            expected_amount: Some(expected_amount),
            blockchain_rental_id: processing.blockchain_rental_id,
        });
        if let Err(e) = self
            .publisher
            .publish(RoutingKey::TransactionVerification, &request)
            .await
        {
            error!(booking_id = processing.id, error = %e, "Failed to publish verification request");
            let reverted = self
                .bookings
                .transition(
                    processing.id,
                    BookingStatus::PaymentProcessing,
                    BookingStatus::PendingPayment,
                    BookingPatch::default(),
                    OffsetDateTime::now_utc(),
                )
                .await;
            if let Err(revert_err) = reverted {
                error!(booking_id = processing.id, error = %revert_err, "Failed to revert booking to PENDING_PAYMENT");
            }
            return Err(BookingError::ServiceIntegration(e.to_string()));
        }

        info!(
            booking_id = processing.id,
            tx_hash = %tx_hash,
            expected_amount = %expected_amount,
            "Verification requested"
        );
        Ok(processing)
    }

    /// React to a payment status event. Safe to call again with the same event.
    pub async fn handle_outcome(
        &self,
        routing_key: RoutingKey,
        outcome: &VerificationOutcome,
    ) -> Result<OutcomeEffect, BookingError> {
        let Some(booking) = self.resolve(outcome).await? else {
            warn!(
                booking_id = outcome.booking_id,
                blockchain_rental_id = outcome.blockchain_rental_id,
                "Outcome for unknown booking"
            );
            return Ok(OutcomeEffect::Ignored("unknown booking"));
        };
        if booking.status == BookingStatus::Cancelled {
            info!(booking_id = booking.id, %routing_key, "Outcome for cancelled booking discarded");
            return Ok(OutcomeEffect::Ignored("booking cancelled"));
        }

        match routing_key {
            RoutingKey::PaymentCompleted => self.complete_from_escrow(booking).await,
            RoutingKey::PaymentSuccess if outcome.success => {
                self.apply_success(booking, &outcome.tx_hash).await
            }
            RoutingKey::PaymentFailed if !outcome.success => {
                self.apply_failure(booking, outcome).await
            }
            _ => {
                warn!(booking_id = booking.id, %routing_key, success = outcome.success, "Inconsistent outcome ignored");
                Ok(OutcomeEffect::Ignored("inconsistent outcome"))
            }
        }
    }

    async fn resolve(&self, outcome: &VerificationOutcome) -> Result<Option<Booking>, BookingError> {
        if outcome.booking_id > 0
            && let Some(booking) = self.bookings.get(outcome.booking_id).await?
        {
            return Ok(Some(booking));
        }
        match outcome.blockchain_rental_id {
            Some(rental_id) => Ok(self.bookings.find_by_rental_id(rental_id).await?),
            None => Ok(None),
        }
    }

    async fn apply_success(
        &self,
        booking: Booking,
        tx_hash: &str,
    ) -> Result<OutcomeEffect, BookingError> {
        if booking.status != BookingStatus::PaymentProcessing
            || !booking
                .payment_tx_hash
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(tx_hash))
        {
            debug!(booking_id = booking.id, status = ?booking.status, "Success already handled");
            return Ok(OutcomeEffect::Ignored("already processed"));
        }

        let range = booking_range(&booking)?;
        let now = OffsetDateTime::now_utc();
        let committed = match self
            .properties
            .commit(booking.property_id, range, booking.lock_token, Some(tx_hash))
            .await
        {
            Ok(()) => true,
            Err(GatewayError::Transport(reason)) => {
                return Err(BookingError::ServiceIntegration(reason));
            }
            Err(e) => {
                // a redelivery after the commit went through finds the days already booked
                let already = self.dates_committed_for(&booking, range).await?;
                if already {
                    info!(booking_id = booking.id, error = %e, "Dates already committed for this booking");
                } else {
                    error!(
                        booking_id = booking.id,
                        lock_token = %booking.lock_token,
                        tx_hash,
                        error = %e,
                        "Verified payment could not be committed, booking disputed"
                    );
                }
                already
            }
        };

        let (to, patch, effect) = if committed {
            (
                BookingStatus::Confirmed,
                BookingPatch {
                    confirmed_at: Some(now),
                    payment_confirmed_at: Some(now),
                    ..Default::default()
                },
                OutcomeEffect::Confirmed,
            )
        } else {
            (
                BookingStatus::Disputed,
                BookingPatch {
                    payment_confirmed_at: Some(now),
                    ..Default::default()
                },
                OutcomeEffect::Disputed,
            )
        };

        match self
            .bookings
            .transition(booking.id, BookingStatus::PaymentProcessing, to, patch, now)
            .await?
        {
            Some(_) => {
                info!(booking_id = booking.id, status = ?to, "Payment applied");
                Ok(effect)
            }
            None => Ok(OutcomeEffect::Ignored("status changed concurrently")),
        }
    }

    async fn apply_failure(
        &self,
        booking: Booking,
        outcome: &VerificationOutcome,
    ) -> Result<OutcomeEffect, BookingError> {
        if booking.status != BookingStatus::PaymentProcessing
            || !booking
                .payment_tx_hash
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(&outcome.tx_hash))
        {
            return Ok(OutcomeEffect::Ignored("already processed"));
        }
        let reverted = self
            .bookings
            .transition(
                booking.id,
                BookingStatus::PaymentProcessing,
                BookingStatus::PendingPayment,
                BookingPatch::default(),
                OffsetDateTime::now_utc(),
            )
            .await?;
        if reverted.is_none() {
            return Ok(OutcomeEffect::Ignored("status changed concurrently"));
        }
        warn!(
            booking_id = booking.id,
            tx_hash = %outcome.tx_hash,
            reason = outcome.reason.as_deref().unwrap_or("unknown"),
            "Payment verification failed, booking back to PENDING_PAYMENT"
        );
        Ok(OutcomeEffect::ReturnedToPending)
    }

    async fn complete_from_escrow(&self, booking: Booking) -> Result<OutcomeEffect, BookingError> {
        let from = match booking.status {
            BookingStatus::Completed => return Ok(OutcomeEffect::Ignored("already completed")),
            status @ (BookingStatus::Confirmed | BookingStatus::Active | BookingStatus::Disputed) => {
                status
            }
            status => {
                warn!(booking_id = booking.id, ?status, "Escrow released funds for an unconfirmed booking");
                return Ok(OutcomeEffect::Ignored("booking not confirmed"));
            }
        };
        let now = OffsetDateTime::now_utc();
        let patch = BookingPatch {
            completed_at: Some(now),
            ..Default::default()
        };
        match self
            .bookings
            .transition(booking.id, from, BookingStatus::Completed, patch, now)
            .await?
        {
            Some(_) => {
                info!(booking_id = booking.id, "Booking completed by escrow release");
                Ok(OutcomeEffect::Completed)
            }
            None => Ok(OutcomeEffect::Ignored("status changed concurrently")),
        }
    }

    pub async fn cancel(
        &self,
        booking_id: i64,
        caller_id: i64,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        self.cancel_at(booking_id, caller_id, reason, OffsetDateTime::now_utc())
            .await
    }

    pub async fn cancel_at(
        &self,
        booking_id: i64,
        caller_id: i64,
        reason: Option<String>,
        now: OffsetDateTime,
    ) -> Result<Booking, BookingError> {
        let booking = self.require(booking_id).await?;
        if booking.tenant_id != caller_id && booking.owner_id != caller_id {
            return Err(BookingError::Unauthorized(
                "only the tenant or the owner can cancel a booking".into(),
            ));
        }
        if booking.status.is_terminal() || booking.status == BookingStatus::Active {
            return Err(BookingError::InvalidState {
                booking_id,
                status: booking.status,
            });
        }
        if booking.check_in < now.date() {
            return Err(BookingError::Validation(
                "cannot cancel after the check-in date".into(),
            ));
        }

        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "cancelled by user".to_string());

        let patch = BookingPatch {
            cancellation_reason: Some(reason.clone()),
            cancelled_at: Some(now),
            ..Default::default()
        };
        let Some(cancelled) = self
            .bookings
            .transition(booking_id, booking.status, BookingStatus::Cancelled, patch, now)
            .await?
        else {
            let current = self.require(booking_id).await?;
            return Err(BookingError::InvalidState {
                booking_id,
                status: current.status,
            });
        };

        // only the winner of the status change may give the dates back
        self.free_dates(&booking).await;
        info!(booking_id, caller_id, reason = %reason, "Booking cancelled");
        self.announce_cancellation(&cancelled).await;
        Ok(cancelled)
    }

    pub async fn sweep_pending(&self) -> Result<usize, BookingError> {
        self.sweep_pending_at(OffsetDateTime::now_utc()).await
    }

    /// Cancel bookings left in `PENDING_PAYMENT` past the timeout and free their dates.
    pub async fn sweep_pending_at(&self, now: OffsetDateTime) -> Result<usize, BookingError> {
        let stale = self
            .bookings
            .list(BookingFilter {
                statuses: vec![BookingStatus::PendingPayment],
                created_before: Some(now - self.pending_timeout),
                ..Default::default()
            })
            .await?;

        let mut cancelled = 0;
        for booking in stale {
            let patch = BookingPatch {
                cancellation_reason: Some("payment timeout".into()),
                cancelled_at: Some(now),
                ..Default::default()
            };
            if let Some(updated) = self
                .bookings
                .transition(
                    booking.id,
                    BookingStatus::PendingPayment,
                    BookingStatus::Cancelled,
                    patch,
                    now,
                )
                .await?
            {
                self.free_dates(&booking).await;
                info!(booking_id = updated.id, "Unpaid booking expired");
                self.announce_cancellation(&updated).await;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    pub async fn reverify_stale(&self) -> Result<usize, BookingError> {
        self.reverify_stale_at(OffsetDateTime::now_utc()).await
    }

    /// Ask for verification again for bookings stuck in `PAYMENT_PROCESSING`.
    ///
    /// Covers outcomes lost on the way back. A second outcome for the same
    /// attempt is ignored, so asking twice is harmless.
    pub async fn reverify_stale_at(&self, now: OffsetDateTime) -> Result<usize, BookingError> {
        let stuck = self
            .bookings
            .list(BookingFilter {
                statuses: vec![BookingStatus::PaymentProcessing],
                updated_before: Some(now - self.reverify_after),
                ..Default::default()
            })
            .await?;

        let mut requested = 0;
        for booking in stuck {
            let Some(tx_hash) = booking.payment_tx_hash.clone() else {
                warn!(booking_id = booking.id, "Booking in PAYMENT_PROCESSING without a tx hash");
                continue;
            };
            let request = BusMessage::VerificationRequest(VerificationRequest {
                booking_id: booking.id,
                tx_hash,
                expected_amount: expected_deposit(booking.total_price, booking.security_deposit),
                blockchain_rental_id: booking.blockchain_rental_id,
            });
            self.publisher
                .publish(RoutingKey::TransactionVerification, &request)
                .await
                .map_err(|e| BookingError::ServiceIntegration(e.to_string()))?;
            info!(booking_id = booking.id, "Verification requested again for a stuck payment");
            requested += 1;
        }
        Ok(requested)
    }

    pub async fn sweep_lifecycle(&self) -> Result<(usize, usize), BookingError> {
        self.sweep_lifecycle_at(OffsetDateTime::now_utc()).await
    }

    /// `CONFIRMED -> ACTIVE` once check-in is reached, `ACTIVE -> COMPLETED`
    /// once check-out has passed. Returns `(activated, completed)`.
    pub async fn sweep_lifecycle_at(
        &self,
        now: OffsetDateTime,
    ) -> Result<(usize, usize), BookingError> {
        let today = now.date();

        let starting = self
            .bookings
            .list(BookingFilter {
                statuses: vec![BookingStatus::Confirmed],
                check_in_on_or_before: Some(today),
                ..Default::default()
            })
            .await?;
        let mut activated = 0;
        for booking in starting {
            if self
                .bookings
                .transition(
                    booking.id,
                    BookingStatus::Confirmed,
                    BookingStatus::Active,
                    BookingPatch::default(),
                    now,
                )
                .await?
                .is_some()
            {
                activated += 1;
            }
        }

        let finished = self
            .bookings
            .list(BookingFilter {
                statuses: vec![BookingStatus::Active],
                check_out_before: Some(today),
                ..Default::default()
            })
            .await?;
        let mut completed = 0;
        for booking in finished {
            let patch = BookingPatch {
                completed_at: Some(now),
                ..Default::default()
            };
            if self
                .bookings
                .transition(
                    booking.id,
                    BookingStatus::Active,
                    BookingStatus::Completed,
                    patch,
                    now,
                )
                .await?
                .is_some()
            {
                completed += 1;
            }
        }

        if activated + completed > 0 {
            info!(activated, completed, "Booking lifecycle advanced");
        }
        Ok((activated, completed))
    }

    pub async fn get(&self, booking_id: i64) -> Result<Booking, BookingError> {
        self.require(booking_id).await
    }

    /// A booking, visible to its tenant and its owner only.
    pub async fn get_for(&self, booking_id: i64, caller_id: i64) -> Result<Booking, BookingError> {
        let booking = self.require(booking_id).await?;
        if booking.tenant_id != caller_id && booking.owner_id != caller_id {
            return Err(BookingError::Unauthorized(
                "booking belongs to someone else".into(),
            ));
        }
        Ok(booking)
    }

    pub async fn list_for(
        &self,
        caller_id: i64,
        role: BookingRole,
        status: Option<SdkBookingStatus>,
    ) -> Result<Vec<Booking>, BookingError> {
        let mut filter = BookingFilter {
            statuses: status.map(|s| vec![s.into()]).unwrap_or_default(),
            ..Default::default()
        };
        match role {
            BookingRole::Tenant => filter.tenant_id = Some(caller_id),
            BookingRole::Owner => filter.owner_id = Some(caller_id),
        }
        Ok(self.bookings.list(filter).await?)
    }

    pub async fn owner_stats(&self, owner_id: i64) -> Result<OwnerStats, BookingError> {
        let totals = self.bookings.owner_totals(owner_id).await?;

        let mut by_status: BTreeMap<String, u64> = SdkBookingStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut revenue = Decimal::ZERO;
        let count = |status: BookingStatus| -> u64 {
            totals
                .iter()
                .find(|t| t.status == status)
                .map(|t| t.bookings.max(0) as u64)
                .unwrap_or(0)
        };
        for total in &totals {
            let status: SdkBookingStatus = total.status.into();
            by_status.insert(status.as_str().to_string(), total.bookings.max(0) as u64);
            if matches!(
                total.status,
                BookingStatus::Confirmed | BookingStatus::Active | BookingStatus::Completed
            ) {
                revenue += total.total_price;
            }
        }

        Ok(OwnerStats {
            total_bookings: by_status.values().sum(),
            confirmed_bookings: count(BookingStatus::Confirmed),
            pending_bookings: count(BookingStatus::PendingPayment)
                + count(BookingStatus::PaymentProcessing),
            cancelled_bookings: count(BookingStatus::Cancelled),
            active_bookings: count(BookingStatus::Active),
            total_revenue: revenue,
            bookings_by_status: by_status,
        })
    }

    async fn require(&self, booking_id: i64) -> Result<Booking, BookingError> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::NotFound(booking_id))
    }

    /// Whether the calendar already holds `range` as booked for this booking's
    /// tenant, with no other live booking claiming those days.
    async fn dates_committed_for(
        &self,
        booking: &Booking,
        range: DateRange,
    ) -> Result<bool, BookingError> {
        if !self
            .properties
            .booked_by(booking.property_id, range, booking.tenant_id)
            .await?
        {
            return Ok(false);
        }
        let claimants = self
            .bookings
            .list(BookingFilter {
                property_id: Some(booking.property_id),
                statuses: vec![
                    BookingStatus::Confirmed,
                    BookingStatus::Active,
                    BookingStatus::Completed,
                    BookingStatus::Disputed,
                ],
                overlaps: Some((range.start, range.end)),
                ..Default::default()
            })
            .await?;
        Ok(claimants.iter().all(|other| other.id == booking.id))
    }

    /// Give the booking's dates back to the calendar, whatever state they are in.
    async fn free_dates(&self, booking: &Booking) {
        if booking.status == BookingStatus::Confirmed {
            let Ok(range) = booking_range(booking) else {
                return;
            };
            if let Err(e) = self
                .properties
                .unbook(booking.property_id, range, booking.tenant_id)
                .await
            {
                error!(booking_id = booking.id, error = %e, "Failed to free booked dates");
            }
        } else if booking.status.holds_lock() {
            self.release_quietly(booking.property_id, booking.lock_token)
                .await;
        }
    }

    async fn release_quietly(&self, property_id: i64, lock_token: uuid::Uuid) {
        if let Err(e) = self.properties.release(property_id, lock_token).await {
            warn!(property_id, lock_token = %lock_token, error = %e, "Lock release failed, the sweep will reclaim it");
        }
    }

    async fn announce_cancellation(&self, booking: &Booking) {
        let message = BusMessage::BookingCancelled(BookingCancelled {
            booking_id: booking.id,
            property_id: booking.property_id,
            lock_token: booking.lock_token,
            reason: booking.cancellation_reason.clone(),
        });
        if let Err(e) = self
            .publisher
            .publish(RoutingKey::BookingCancelled, &message)
            .await
        {
            warn!(booking_id = booking.id, error = %e, "Failed to publish BOOKING_CANCELLED");
        }
    }
}

fn booking_range(booking: &Booking) -> Result<DateRange, BookingError> {
    DateRange::new(booking.check_in, booking.check_out)
        .map_err(|e| BookingError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::LockManager;
    use crate::calendar::catalog::MemoryPropertyCatalog;
    use crate::calendar::store::MemoryCalendarStore;
    use crate::entities::AvailabilityStatus;
    use crate::events::{BusError, EventBus, QueueReceiver};
    use crate::events::{BOOKING_CANCELLED_QUEUE, TRANSACTION_VERIFICATION_QUEUE};
    use crate::reservation::gateway::{LocalPropertyGateway, MemoryTenantDirectory};
    use crate::reservation::testing::{Interleaved, ScriptedBookingStore};
    use rentchain_sdk::objects::{
        LockDatesResponse, PropertySnapshot, PropertyStatus, TenantProfile, Wei,
    };
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::Date;
    use uuid::Uuid;

    const PROPERTY: i64 = 42;
    const OWNER: i64 = 1;
    const TENANT: i64 = 10;
    const OTHER_TENANT: i64 = 12;
    const UNVERIFIED: i64 = 11;
    const TX: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const TX2: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    /// Counts commits on the way to the real lock manager.
    struct RecordingGateway {
        inner: LocalPropertyGateway,
        commits: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PropertyGateway for RecordingGateway {
        async fn snapshot(&self, property_id: i64) -> Result<PropertySnapshot, GatewayError> {
            self.inner.snapshot(property_id).await
        }

        async fn lock(
            &self,
            property_id: i64,
            range: DateRange,
            tenant_id: i64,
        ) -> Result<LockDatesResponse, GatewayError> {
            self.inner.lock(property_id, range, tenant_id).await
        }

        async fn commit(
            &self,
            property_id: i64,
            range: DateRange,
            lock_token: Uuid,
            tx_hash: Option<&str>,
        ) -> Result<(), GatewayError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.inner
                .commit(property_id, range, lock_token, tx_hash)
                .await
        }

        async fn release(&self, property_id: i64, lock_token: Uuid) -> Result<(), GatewayError> {
            self.inner.release(property_id, lock_token).await
        }

        async fn unbook(
            &self,
            property_id: i64,
            range: DateRange,
            holder_id: i64,
        ) -> Result<(), GatewayError> {
            self.inner.unbook(property_id, range, holder_id).await
        }

        async fn booked_by(
            &self,
            property_id: i64,
            range: DateRange,
            holder_id: i64,
        ) -> Result<bool, GatewayError> {
            self.inner.booked_by(property_id, range, holder_id).await
        }
    }

    struct ClosedPublisher;

    #[async_trait::async_trait]
    impl EventPublisher for ClosedPublisher {
        async fn publish(&self, _: RoutingKey, _: &BusMessage) -> Result<(), BusError> {
            Err(BusError::Closed(TRANSACTION_VERIFICATION_QUEUE))
        }
    }

    struct Harness {
        orchestrator: ReservationOrchestrator,
        bookings: Arc<ScriptedBookingStore>,
        gateway: Arc<RecordingGateway>,
        calendar: Arc<MemoryCalendarStore>,
        verification: QueueReceiver,
        cancelled: QueueReceiver,
    }

    fn profile(id: i64, verified: bool) -> TenantProfile {
        TenantProfile {
            id,
            wallet_address: Some(format!("0x{id:040x}")),
            wallet_verified: verified,
            kyc_complete: true,
        }
    }

    async fn harness_with(publisher: Option<Arc<dyn EventPublisher>>) -> Harness {
        let calendar = Arc::new(MemoryCalendarStore::new());
        let catalog = Arc::new(MemoryPropertyCatalog::new());
        catalog
            .insert(PropertySnapshot {
                property_id: PROPERTY,
                owner_id: OWNER,
                owner_wallet: Some("0x00000000000000000000000000000000000000aa".to_string()),
                price_per_night: dec!(0.5),
                security_deposit: dec!(0.5),
                status: PropertyStatus::Active,
                min_stay_nights: 1,
                max_guests: Some(4),
            })
            .await;
        let locks = LockManager::new(calendar.clone(), catalog, Duration::from_secs(15 * 60));
        let gateway = Arc::new(RecordingGateway {
            inner: LocalPropertyGateway::new(locks),
            commits: AtomicUsize::new(0),
        });

        let tenants = Arc::new(MemoryTenantDirectory::new());
        tenants.insert(profile(TENANT, true)).await;
        tenants.insert(profile(OTHER_TENANT, true)).await;
        tenants.insert(profile(UNVERIFIED, false)).await;

        let mut bus = EventBus::new(3);
        let verification =
            bus.declare_queue(TRANSACTION_VERIFICATION_QUEUE, &[RoutingKey::TransactionVerification]);
        let cancelled = bus.declare_queue(BOOKING_CANCELLED_QUEUE, &[RoutingKey::BookingCancelled]);
        let publisher = publisher.unwrap_or_else(|| Arc::new(bus));

        let bookings = Arc::new(ScriptedBookingStore::new());
        let orchestrator = ReservationOrchestrator::new(
            bookings.clone(),
            gateway.clone(),
            tenants,
            publisher,
            Duration::from_secs(15 * 60),
        );
        Harness {
            orchestrator,
            bookings,
            gateway,
            calendar,
            verification,
            cancelled,
        }
    }

    async fn harness() -> Harness {
        harness_with(None).await
    }

    fn in_days(days: i64) -> Date {
        OffsetDateTime::now_utc().date() + time::Duration::days(days)
    }

    fn stay(from: i64, nights: i64) -> CreateBookingRequest {
        CreateBookingRequest {
            property_id: PROPERTY,
            check_in: in_days(from),
            check_out: in_days(from + nights),
            number_of_guests: Some(2),
        }
    }

    async fn confirmed(h: &Harness) -> Booking {
        let booking = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        h.orchestrator.confirm(booking.id, TENANT, TX).await.unwrap();
        let effect = h
            .orchestrator
            .handle_outcome(
                RoutingKey::PaymentSuccess,
                &VerificationOutcome::success(booking.id, TX),
            )
            .await
            .unwrap();
        assert_eq!(effect, OutcomeEffect::Confirmed);
        h.orchestrator.get(booking.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_confirm_requests_verification() {
        let mut h = harness().await;
        let booking = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        assert_eq!(booking.status, BookingStatus::PendingPayment);
        assert_eq!(booking.total_price, dec!(1.5));
        assert_eq!(booking.owner_id, OWNER);
        let day = h.calendar.day(PROPERTY, in_days(31)).await.unwrap();
        assert_eq!(day.status, AvailabilityStatus::Locked);
        assert_eq!(day.lock_token, Some(booking.lock_token));

        let processing = h
            .orchestrator
            .confirm(booking.id, TENANT, &TX.to_uppercase().replacen("0X", "0x", 1))
            .await
            .unwrap();
        assert_eq!(processing.status, BookingStatus::PaymentProcessing);
        assert_eq!(processing.payment_tx_hash.as_deref(), Some(TX));

        let delivery = h.verification.recv().await.unwrap();
        let BusMessage::VerificationRequest(request) = delivery.decode().unwrap() else {
            panic!("expected a verification request");
        };
        delivery.ack();
        assert_eq!(request.booking_id, booking.id);
        assert_eq!(request.tx_hash, TX);
        assert_eq!(
            request.expected_amount,
            Some(Wei::from(2_000_000_000_000_000_000u128))
        );
    }

    #[tokio::test]
    async fn test_create_rejections() {
        let h = harness().await;
        assert!(matches!(
            h.orchestrator.create(UNVERIFIED, stay(30, 3)).await,
            Err(BookingError::Unauthorized(_))
        ));
        assert!(matches!(
            h.orchestrator.create(99, stay(30, 3)).await,
            Err(BookingError::Unauthorized(_))
        ));
        assert!(matches!(
            h.orchestrator.create(TENANT, stay(-2, 3)).await,
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            h.orchestrator.create(TENANT, stay(30, 4000)).await,
            Err(BookingError::Validation(_))
        ));
        let mut too_many = stay(30, 3);
        too_many.number_of_guests = Some(9);
        assert!(matches!(
            h.orchestrator.create(TENANT, too_many).await,
            Err(BookingError::Validation(_))
        ));

        h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        assert!(matches!(
            h.orchestrator.create(OTHER_TENANT, stay(32, 2)).await,
            Err(BookingError::Conflict)
        ));
        // back-to-back stays share only the turnover day
        h.orchestrator.create(OTHER_TENANT, stay(33, 2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_success_commits_once() {
        let h = harness().await;
        let booking = confirmed(&h).await;
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert!(booking.confirmed_at.is_some());

        let again = h
            .orchestrator
            .handle_outcome(
                RoutingKey::PaymentSuccess,
                &VerificationOutcome::success(booking.id, TX),
            )
            .await
            .unwrap();
        assert!(matches!(again, OutcomeEffect::Ignored(_)));
        assert_eq!(h.gateway.commits.load(Ordering::SeqCst), 1);

        let day = h.calendar.day(PROPERTY, in_days(30)).await.unwrap();
        assert_eq!(day.status, AvailabilityStatus::Booked);
        assert_eq!(day.holder_id, Some(TENANT));
    }

    #[tokio::test]
    async fn test_redelivered_success_after_store_error_confirms() {
        let h = harness().await;
        let booking = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        h.orchestrator.confirm(booking.id, TENANT, TX).await.unwrap();
        let success = VerificationOutcome::success(booking.id, TX);

        // dates committed, then the store drops the CONFIRMED write
        h.bookings.fail_confirms(1);
        let err = h
            .orchestrator
            .handle_outcome(RoutingKey::PaymentSuccess, &success)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        let day = h.calendar.day(PROPERTY, in_days(30)).await.unwrap();
        assert_eq!(day.status, AvailabilityStatus::Booked);

        let effect = h
            .orchestrator
            .handle_outcome(RoutingKey::PaymentSuccess, &success)
            .await
            .unwrap();
        assert_eq!(effect, OutcomeEffect::Confirmed);
        assert_eq!(h.gateway.commits.load(Ordering::SeqCst), 2);
        let current = h.orchestrator.get(booking.id).await.unwrap();
        assert_eq!(current.status, BookingStatus::Confirmed);
        assert!(current.confirmed_at.is_some());
    }

    fn confirm_lands_first() -> Interleaved {
        Interleaved {
            before: BookingStatus::Cancelled,
            from: BookingStatus::PendingPayment,
            to: BookingStatus::PaymentProcessing,
            patch: BookingPatch {
                payment_tx_hash: Some(TX.to_string()),
                ..Default::default()
            },
        }
    }

    async fn assert_still_locked(h: &Harness, booking: &Booking) {
        for offset in 30..33 {
            let day = h.calendar.day(PROPERTY, in_days(offset)).await.unwrap();
            assert_eq!(day.status, AvailabilityStatus::Locked, "day {offset}");
            assert_eq!(day.lock_token, Some(booking.lock_token));
        }
    }

    #[tokio::test]
    async fn test_sweep_losing_to_confirm_keeps_the_lock() {
        let h = harness().await;
        let now = OffsetDateTime::now_utc();
        let booking = h
            .orchestrator
            .create_at(TENANT, stay(30, 3), now)
            .await
            .unwrap();

        h.bookings.interleave(confirm_lands_first());
        let swept = h
            .orchestrator
            .sweep_pending_at(now + time::Duration::minutes(16))
            .await
            .unwrap();
        assert_eq!(swept, 0);
        assert_still_locked(&h, &booking).await;

        let effect = h
            .orchestrator
            .handle_outcome(
                RoutingKey::PaymentSuccess,
                &VerificationOutcome::success(booking.id, TX),
            )
            .await
            .unwrap();
        assert_eq!(effect, OutcomeEffect::Confirmed);
    }

    #[tokio::test]
    async fn test_cancel_losing_to_confirm_keeps_the_lock() {
        let h = harness().await;
        let booking = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();

        h.bookings.interleave(confirm_lands_first());
        assert!(matches!(
            h.orchestrator.cancel(booking.id, TENANT, None).await,
            Err(BookingError::InvalidState {
                status: BookingStatus::PaymentProcessing,
                ..
            })
        ));
        assert_still_locked(&h, &booking).await;
    }

    #[tokio::test]
    async fn test_stuck_payment_is_verified_again() {
        let mut h = harness().await;
        let booking = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        h.orchestrator.confirm(booking.id, TENANT, TX).await.unwrap();
        h.verification.recv().await.unwrap().ack();

        let now = OffsetDateTime::now_utc();
        assert_eq!(h.orchestrator.reverify_stale_at(now).await.unwrap(), 0);
        let later = now + time::Duration::minutes(6);
        assert_eq!(h.orchestrator.reverify_stale_at(later).await.unwrap(), 1);

        let delivery = h.verification.recv().await.unwrap();
        let BusMessage::VerificationRequest(request) = delivery.decode().unwrap() else {
            panic!("expected a verification request");
        };
        delivery.ack();
        assert_eq!(request.booking_id, booking.id);
        assert_eq!(request.tx_hash, TX);
        assert!(request.expected_amount.is_some());

        h.orchestrator
            .handle_outcome(
                RoutingKey::PaymentSuccess,
                &VerificationOutcome::success(booking.id, TX),
            )
            .await
            .unwrap();
        assert_eq!(h.orchestrator.reverify_stale_at(later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_disputes_booking() {
        let h = harness().await;
        let booking = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        h.orchestrator.confirm(booking.id, TENANT, TX).await.unwrap();
        h.gateway
            .release(PROPERTY, booking.lock_token)
            .await
            .unwrap();

        let effect = h
            .orchestrator
            .handle_outcome(
                RoutingKey::PaymentSuccess,
                &VerificationOutcome::success(booking.id, TX),
            )
            .await
            .unwrap();
        assert_eq!(effect, OutcomeEffect::Disputed);
        let disputed = h.orchestrator.get(booking.id).await.unwrap();
        assert_eq!(disputed.status, BookingStatus::Disputed);
        assert!(disputed.payment_confirmed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_verification_allows_retry() {
        let h = harness().await;
        let booking = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        h.orchestrator.confirm(booking.id, TENANT, TX).await.unwrap();

        let failure = VerificationOutcome::failure(
            booking.id,
            TX,
            "amount mismatch: expected 2000000000000000000 wei, found 1500000000000000000 wei",
        );
        let effect = h
            .orchestrator
            .handle_outcome(RoutingKey::PaymentFailed, &failure)
            .await
            .unwrap();
        assert_eq!(effect, OutcomeEffect::ReturnedToPending);
        let pending = h.orchestrator.get(booking.id).await.unwrap();
        assert_eq!(pending.status, BookingStatus::PendingPayment);
        assert_eq!(h.gateway.commits.load(Ordering::SeqCst), 0);

        // a late success for the abandoned attempt changes nothing
        assert!(matches!(
            h.orchestrator
                .handle_outcome(
                    RoutingKey::PaymentSuccess,
                    &VerificationOutcome::success(booking.id, TX),
                )
                .await
                .unwrap(),
            OutcomeEffect::Ignored(_)
        ));

        let retried = h.orchestrator.confirm(booking.id, TENANT, TX2).await.unwrap();
        assert_eq!(retried.status, BookingStatus::PaymentProcessing);
        assert_eq!(retried.payment_tx_hash.as_deref(), Some(TX2));
    }

    #[tokio::test]
    async fn test_confirm_guards() {
        let h = harness().await;
        let first = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        let second = h.orchestrator.create(OTHER_TENANT, stay(40, 2)).await.unwrap();

        assert!(matches!(
            h.orchestrator.confirm(first.id, OTHER_TENANT, TX).await,
            Err(BookingError::Unauthorized(_))
        ));
        assert!(matches!(
            h.orchestrator.confirm(first.id, TENANT, "0x1234").await,
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            h.orchestrator.confirm(404, TENANT, TX).await,
            Err(BookingError::NotFound(404))
        ));

        h.orchestrator.confirm(first.id, TENANT, TX).await.unwrap();
        assert!(matches!(
            h.orchestrator.confirm(first.id, TENANT, TX).await,
            Err(BookingError::InvalidState { .. })
        ));
        assert!(matches!(
            h.orchestrator.confirm(second.id, OTHER_TENANT, TX).await,
            Err(BookingError::DuplicateTransaction(_))
        ));
        let untouched = h.bookings.get(second.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, BookingStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_publish_failure_reverts_to_pending() {
        let h = harness_with(Some(Arc::new(ClosedPublisher))).await;
        let booking = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        assert!(matches!(
            h.orchestrator.confirm(booking.id, TENANT, TX).await,
            Err(BookingError::ServiceIntegration(_))
        ));
        let current = h.orchestrator.get(booking.id).await.unwrap();
        assert_eq!(current.status, BookingStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_completion_for_cancelled_booking_is_ignored() {
        let h = harness().await;
        let booking = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        h.orchestrator
            .cancel(booking.id, TENANT, Some("changed plans".into()))
            .await
            .unwrap();

        let effect = h
            .orchestrator
            .handle_outcome(
                RoutingKey::PaymentCompleted,
                &VerificationOutcome::success(booking.id, TX),
            )
            .await
            .unwrap();
        assert!(matches!(effect, OutcomeEffect::Ignored(_)));
        let current = h.orchestrator.get(booking.id).await.unwrap();
        assert_eq!(current.status, BookingStatus::Cancelled);
        assert_eq!(current.completed_at, None);
    }

    #[tokio::test]
    async fn test_escrow_release_completes_by_rental_id() {
        let h = harness().await;
        let booking = h.orchestrator.create(TENANT, stay(30, 3)).await.unwrap();
        let linked = h
            .orchestrator
            .link_rental(TENANT, PROPERTY, 1001, Some(TX))
            .await
            .unwrap();
        assert_eq!(linked.id, booking.id);
        assert_eq!(linked.blockchain_rental_id, Some(1001));
        assert_eq!(linked.status, BookingStatus::PaymentProcessing);

        let mut success = VerificationOutcome::success(booking.id, TX);
        success.blockchain_rental_id = Some(1001);
        h.orchestrator
            .handle_outcome(RoutingKey::PaymentSuccess, &success)
            .await
            .unwrap();

        let mut released = VerificationOutcome::success(0, "");
        released.blockchain_rental_id = Some(1001);
        assert_eq!(
            h.orchestrator
                .handle_outcome(RoutingKey::PaymentCompleted, &released)
                .await
                .unwrap(),
            OutcomeEffect::Completed
        );
        assert_eq!(
            h.orchestrator
                .handle_outcome(RoutingKey::PaymentCompleted, &released)
                .await
                .unwrap(),
            OutcomeEffect::Ignored("already completed")
        );
        let done = h.orchestrator.get(booking.id).await.unwrap();
        assert_eq!(done.status, BookingStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_confirmed_frees_booked_dates() {
        let mut h = harness().await;
        let booking = confirmed(&h).await;

        assert!(matches!(
            h.orchestrator.cancel(booking.id, OTHER_TENANT, None).await,
            Err(BookingError::Unauthorized(_))
        ));

        let cancelled = h.orchestrator.cancel(booking.id, OWNER, None).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("cancelled by user"));
        for offset in 30..33 {
            let day = h.calendar.day(PROPERTY, in_days(offset)).await.unwrap();
            assert!(day.is_free(), "day {offset} still taken");
        }

        let delivery = h.cancelled.recv().await.unwrap();
        let BusMessage::BookingCancelled(notice) = delivery.decode().unwrap() else {
            panic!("expected a cancellation notice");
        };
        delivery.ack();
        assert_eq!(notice.booking_id, booking.id);
        assert_eq!(notice.lock_token, booking.lock_token);

        assert!(matches!(
            h.orchestrator.cancel(booking.id, TENANT, None).await,
            Err(BookingError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_abandoned_booking_is_swept_and_dates_relock() {
        let h = harness().await;
        let now = OffsetDateTime::now_utc();
        let booking = h
            .orchestrator
            .create_at(TENANT, stay(30, 3), now)
            .await
            .unwrap();

        assert_eq!(h.orchestrator.sweep_pending_at(now).await.unwrap(), 0);
        let swept = h
            .orchestrator
            .sweep_pending_at(now + time::Duration::minutes(16))
            .await
            .unwrap();
        assert_eq!(swept, 1);

        let expired = h.orchestrator.get(booking.id).await.unwrap();
        assert_eq!(expired.status, BookingStatus::Cancelled);
        assert_eq!(expired.cancellation_reason.as_deref(), Some("payment timeout"));

        let rebooked = h.orchestrator.create(OTHER_TENANT, stay(30, 3)).await.unwrap();
        assert_ne!(rebooked.lock_token, booking.lock_token);
    }

    #[tokio::test]
    async fn test_lifecycle_sweep() {
        let h = harness().await;
        let booking = confirmed(&h).await;

        let before = OffsetDateTime::now_utc();
        assert_eq!(h.orchestrator.sweep_lifecycle_at(before).await.unwrap(), (0, 0));

        let check_in_day = before + time::Duration::days(30);
        assert_eq!(
            h.orchestrator.sweep_lifecycle_at(check_in_day).await.unwrap(),
            (1, 0)
        );
        assert_eq!(
            h.orchestrator.get(booking.id).await.unwrap().status,
            BookingStatus::Active
        );

        // still the check-out day
        let check_out_day = before + time::Duration::days(33);
        assert_eq!(
            h.orchestrator.sweep_lifecycle_at(check_out_day).await.unwrap(),
            (0, 0)
        );
        let after = before + time::Duration::days(34);
        assert_eq!(h.orchestrator.sweep_lifecycle_at(after).await.unwrap(), (0, 1));
        let done = h.orchestrator.get(booking.id).await.unwrap();
        assert_eq!(done.status, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn test_listing_and_owner_stats() {
        let h = harness().await;
        confirmed(&h).await;
        let pending = h.orchestrator.create(OTHER_TENANT, stay(40, 2)).await.unwrap();

        let mine = h
            .orchestrator
            .list_for(TENANT, BookingRole::Tenant, None)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        let owned = h
            .orchestrator
            .list_for(OWNER, BookingRole::Owner, Some(SdkBookingStatus::PendingPayment))
            .await
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, pending.id);

        assert!(h.orchestrator.get_for(pending.id, OWNER).await.is_ok());
        assert!(matches!(
            h.orchestrator.get_for(pending.id, TENANT).await,
            Err(BookingError::Unauthorized(_))
        ));

        let stats = h.orchestrator.owner_stats(OWNER).await.unwrap();
        assert_eq!(stats.total_bookings, 2);
        assert_eq!(stats.confirmed_bookings, 1);
        assert_eq!(stats.pending_bookings, 1);
        assert_eq!(stats.total_revenue, dec!(1.5));
        assert_eq!(stats.bookings_by_status["CANCELLED"], 0);
    }
}
