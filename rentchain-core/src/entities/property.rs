use crate::entities::PropertyStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rentchain_sdk::objects::PropertySnapshot;
use rust_decimal::Decimal;

/// The columns of `properties` the reservation flow reads.
///
/// Listing CRUD lives elsewhere; this service only ever reads the table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PropertyRecord {
    pub id: i64,
    pub owner_id: i64,
    pub owner_wallet: Option<String>,
    pub price_per_night: Decimal,
    pub security_deposit: Decimal,
    pub status: PropertyStatus,
    pub min_stay_nights: i32,
    pub max_guests: Option<i32>,
}

impl From<PropertyRecord> for PropertySnapshot {
    fn from(record: PropertyRecord) -> Self {
        PropertySnapshot {
            property_id: record.id,
            owner_id: record.owner_id,
            owner_wallet: record.owner_wallet,
            price_per_night: record.price_per_night,
            security_deposit: record.security_deposit,
            status: record.status.into(),
            min_stay_nights: record.min_stay_nights.max(1) as u32,
            max_guests: record.max_guests.map(|g| g.max(0) as u32),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetPropertySnapshot {
    pub property_id: i64,
}

impl Processor<GetPropertySnapshot> for DatabaseProcessor {
    type Output = Option<PropertySnapshot>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPropertySnapshot")]
    async fn process(
        &self,
        query: GetPropertySnapshot,
    ) -> Result<Option<PropertySnapshot>, sqlx::Error> {
        let record: Option<PropertyRecord> = sqlx::query_as(
            r#"
            SELECT
                id,
                owner_id,
                owner_wallet,
                price_per_night,
                security_deposit,
                status,
                min_stay_nights,
                max_guests
            FROM properties
            WHERE id = $1
            "#,
        )
        .bind(query.property_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(Into::into))
    }
}
