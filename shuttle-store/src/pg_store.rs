use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shuttle_core::{
    Booking, BookingStatus, BookingStore, FareBreakdown, Feedback, SettlementRecord, Stop, StoreError,
    StoreResult, StoreTx, Trip, TripStatus, User, WalletDebit,
};
use shuttle_shared::Masked;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, user_id, trip_id, departure_time, pickup_stop_id, drop_off_stop_id, \
    booked_seat_ids, number_of_seats_booked, base_fare_cents, discount_cents, tax_cents, total_cents, \
    payment_method, payment_gateway, payment_reference, payment_amount_cents, payment_currency, \
    payment_status, settled_at, status, round_trip_id, boarding_code, boarding_code_expires_at, \
    cancellation_reason, driver_decline_reason, feedback_rating, feedback_comment, feedback_tip_cents, \
    feedback_at, idempotency_key, onboarded_at, cancelled_at, completed_at, created_at, updated_at";

const TRIP_COLUMNS: &str = "id, route_id, vehicle_id, driver_id, series_id, departure_time, \
    estimated_arrival_time, price_per_seat_cents, currency, initial_seats, current_seats, status, is_active";

/// Postgres-backed store. Row locks are `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgBookingStore {
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self { pool, lock_timeout_ms }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if self.lock_timeout_ms > 0 {
            // SET does not accept bind parameters.
            let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms);
            sqlx::query(&stmt).execute(&mut *tx).await.map_err(db_err)?;
        }
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, full_name, is_active, wallet_balance_cents FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(row.map(User::from))
    }

    async fn lock_trip(&mut self, id: Uuid) -> StoreResult<Option<Trip>> {
        let sql = format!("SELECT {} FROM trips WHERE id = $1 FOR UPDATE", TRIP_COLUMNS);
        let row: Option<TripRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.map(Trip::try_from).transpose()
    }

    async fn route_stops(&mut self, route_id: Uuid) -> StoreResult<Vec<Stop>> {
        let rows: Vec<StopRow> = sqlx::query_as(
            "SELECT id, route_id, name, sequence FROM stops WHERE route_id = $1 ORDER BY sequence",
        )
        .bind(route_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Stop::from).collect())
    }

    async fn held_seat_ids(&mut self, trip_id: Uuid) -> StoreResult<Vec<String>> {
        let holding: Vec<String> = BookingStatus::SEAT_HOLDING.iter().map(|s| s.as_str().to_string()).collect();
        sqlx::query_scalar(
            "SELECT unnest(booked_seat_ids) FROM bookings WHERE trip_id = $1 AND status = ANY($2)",
        )
        .bind(trip_id)
        .bind(holding)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn write_trip_capacity(
        &mut self,
        trip_id: Uuid,
        current_seats: i32,
        status: TripStatus,
    ) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE trips SET current_seats = $2, status = $3 WHERE id = $1")
            .bind(trip_id)
            .bind(current_seats)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn debit_wallet(&mut self, user_id: Uuid, amount_cents: i64) -> StoreResult<WalletDebit> {
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET wallet_balance_cents = wallet_balance_cents - $2 \
             WHERE id = $1 AND wallet_balance_cents >= $2 RETURNING wallet_balance_cents",
        )
        .bind(user_id)
        .bind(amount_cents)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        match updated {
            Some(balance) => Ok(WalletDebit::debited(balance)),
            None => {
                let balance: Option<i64> = sqlx::query_scalar("SELECT wallet_balance_cents FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_optional(&mut *self.tx)
                    .await
                    .map_err(db_err)?;
                Ok(WalletDebit::insufficient(balance.unwrap_or(0), amount_cents))
            }
        }
    }

    async fn insert_booking(&mut self, b: &Booking) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO bookings ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
             $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34, $35)",
            BOOKING_COLUMNS
        );
        let feedback = b.feedback.as_ref();
        sqlx::query(&sql)
            .bind(b.id)
            .bind(b.user_id)
            .bind(b.trip_id)
            .bind(b.departure_time)
            .bind(b.pickup_stop_id)
            .bind(b.drop_off_stop_id)
            .bind(&b.booked_seat_ids)
            .bind(b.number_of_seats_booked)
            .bind(b.fare.base_fare_cents)
            .bind(b.fare.discount_cents)
            .bind(b.fare.tax_cents)
            .bind(b.fare.total_cents)
            .bind(b.payment.method.as_str())
            .bind(&b.payment.gateway)
            .bind(&b.payment.transaction_reference)
            .bind(b.payment.amount_cents)
            .bind(&b.payment.currency)
            .bind(b.payment.status.as_str())
            .bind(b.payment.settled_at)
            .bind(b.status.as_str())
            .bind(b.round_trip_id)
            .bind(b.boarding_code.expose())
            .bind(b.boarding_code_expires_at)
            .bind(&b.cancellation_reason)
            .bind(&b.driver_decline_reason)
            .bind(feedback.map(|f| f.rating))
            .bind(feedback.and_then(|f| f.comment.clone()))
            .bind(feedback.map(|f| f.tip_cents))
            .bind(feedback.map(|f| f.created_at))
            .bind(&b.idempotency_key)
            .bind(b.onboarded_at)
            .bind(b.cancelled_at)
            .bind(b.completed_at)
            .bind(b.created_at)
            .bind(b.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        debug!(booking_id = %b.id, "booking row inserted");
        Ok(())
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1 FOR UPDATE", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.map(Booking::try_from).transpose()
    }

    async fn update_booking(&mut self, b: &Booking) -> StoreResult<u64> {
        let feedback = b.feedback.as_ref();
        let result = sqlx::query(
            "UPDATE bookings SET status = $2, cancellation_reason = $3, driver_decline_reason = $4, \
             feedback_rating = $5, feedback_comment = $6, feedback_tip_cents = $7, feedback_at = $8, \
             onboarded_at = $9, cancelled_at = $10, completed_at = $11, updated_at = $12 WHERE id = $1",
        )
        .bind(b.id)
        .bind(b.status.as_str())
        .bind(&b.cancellation_reason)
        .bind(&b.driver_decline_reason)
        .bind(feedback.map(|f| f.rating))
        .bind(feedback.and_then(|f| f.comment.clone()))
        .bind(feedback.map(|f| f.tip_cents))
        .bind(feedback.map(|f| f.created_at))
        .bind(b.onboarded_at)
        .bind(b.cancelled_at)
        .bind(b.completed_at)
        .bind(b.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn delete_booking(&mut self, id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn bookings_by_idempotency_key(&mut self, user_id: Uuid, key: &str) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_id = $1 AND idempotency_key = $2 ORDER BY created_at",
            BOOKING_COLUMNS
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(key)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(db_err)
    }
}

/// Classify driver errors: lock timeouts and unique violations are surfaced
/// distinctly, everything else is a backend failure.
pub fn db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some("55P03") => return StoreError::LockTimeout(db.message().to_string()),
            Some("23505") => return StoreError::UniqueViolation(db.message().to_string()),
            _ => {}
        }
    }
    StoreError::Backend(e.to_string())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    full_name: String,
    is_active: bool,
    wallet_balance_cents: i64,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            full_name: r.full_name,
            is_active: r.is_active,
            wallet_balance_cents: r.wallet_balance_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StopRow {
    id: Uuid,
    route_id: Uuid,
    name: String,
    sequence: i32,
}

impl From<StopRow> for Stop {
    fn from(r: StopRow) -> Self {
        Stop { id: r.id, route_id: r.route_id, name: r.name, sequence: r.sequence }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    route_id: Uuid,
    vehicle_id: Uuid,
    driver_id: Uuid,
    series_id: Option<Uuid>,
    departure_time: DateTime<Utc>,
    estimated_arrival_time: DateTime<Utc>,
    price_per_seat_cents: i64,
    currency: String,
    initial_seats: i32,
    current_seats: i32,
    status: String,
    is_active: bool,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(r: TripRow) -> Result<Self, Self::Error> {
        Ok(Trip {
            id: r.id,
            route_id: r.route_id,
            vehicle_id: r.vehicle_id,
            driver_id: r.driver_id,
            series_id: r.series_id,
            departure_time: r.departure_time,
            estimated_arrival_time: r.estimated_arrival_time,
            price_per_seat_cents: r.price_per_seat_cents,
            currency: r.currency,
            initial_seats: r.initial_seats,
            current_seats: r.current_seats,
            status: r.status.parse().map_err(StoreError::Decode)?,
            is_active: r.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    trip_id: Uuid,
    departure_time: DateTime<Utc>,
    pickup_stop_id: Uuid,
    drop_off_stop_id: Uuid,
    booked_seat_ids: Vec<String>,
    number_of_seats_booked: i32,
    base_fare_cents: i64,
    discount_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    payment_method: String,
    payment_gateway: String,
    payment_reference: String,
    payment_amount_cents: i64,
    payment_currency: String,
    payment_status: String,
    settled_at: DateTime<Utc>,
    status: String,
    round_trip_id: Option<Uuid>,
    boarding_code: String,
    boarding_code_expires_at: DateTime<Utc>,
    cancellation_reason: Option<String>,
    driver_decline_reason: Option<String>,
    feedback_rating: Option<i16>,
    feedback_comment: Option<String>,
    feedback_tip_cents: Option<i64>,
    feedback_at: Option<DateTime<Utc>>,
    idempotency_key: Option<String>,
    onboarded_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(r: BookingRow) -> Result<Self, Self::Error> {
        let feedback = match (r.feedback_rating, r.feedback_at) {
            (Some(rating), Some(created_at)) => Some(Feedback {
                rating,
                comment: r.feedback_comment,
                tip_cents: r.feedback_tip_cents.unwrap_or(0),
                created_at,
            }),
            _ => None,
        };
        Ok(Booking {
            id: r.id,
            user_id: r.user_id,
            trip_id: r.trip_id,
            departure_time: r.departure_time,
            pickup_stop_id: r.pickup_stop_id,
            drop_off_stop_id: r.drop_off_stop_id,
            booked_seat_ids: r.booked_seat_ids,
            number_of_seats_booked: r.number_of_seats_booked,
            fare: FareBreakdown {
                base_fare_cents: r.base_fare_cents,
                discount_cents: r.discount_cents,
                tax_cents: r.tax_cents,
                total_cents: r.total_cents,
            },
            payment: SettlementRecord {
                method: r.payment_method.parse().map_err(StoreError::Decode)?,
                gateway: r.payment_gateway,
                transaction_reference: r.payment_reference,
                amount_cents: r.payment_amount_cents,
                currency: r.payment_currency,
                status: r.payment_status.parse().map_err(StoreError::Decode)?,
                settled_at: r.settled_at,
            },
            status: r.status.parse().map_err(StoreError::Decode)?,
            round_trip_id: r.round_trip_id,
            boarding_code: Masked::new(r.boarding_code),
            boarding_code_expires_at: r.boarding_code_expires_at,
            cancellation_reason: r.cancellation_reason,
            driver_decline_reason: r.driver_decline_reason,
            feedback,
            idempotency_key: r.idempotency_key,
            onboarded_at: r.onboarded_at,
            cancelled_at: r.cancelled_at,
            completed_at: r.completed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}
