use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{insert_into, prelude::*};
use std::sync::Arc;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::payments},
};
use domain::{
    entities::payments::{InsertPaymentEntity, PaymentEntity},
    repositories::payments::PaymentRepository,
    value_objects::{enums::payment_statuses::PaymentStatus, payments::PaymentUpsert},
};

pub struct PaymentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }

    fn write_merged(
        conn: &mut PgConnection,
        existing: &PaymentEntity,
        upsert: &PaymentUpsert,
    ) -> Result<PaymentEntity> {
        let merged = existing.merge(upsert, Utc::now());
        let updated = diesel::update(payments::table.find(existing.id))
            .set(&merged)
            .returning(PaymentEntity::as_select())
            .get_result::<PaymentEntity>(conn)?;
        Ok(updated)
    }
}

#[async_trait]
impl PaymentRepository for PaymentPostgres {
    async fn upsert_by_provider_payment_id(
        &self,
        upsert: PaymentUpsert,
    ) -> Result<PaymentEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<PaymentEntity, anyhow::Error, _>(|conn| {
            let existing = payments::table
                .filter(payments::provider_payment_id.eq(&upsert.provider_payment_id))
                .select(PaymentEntity::as_select())
                .for_update()
                .first::<PaymentEntity>(conn)
                .optional()?;

            if let Some(existing) = existing {
                return Self::write_merged(conn, &existing, &upsert);
            }

            let insert = InsertPaymentEntity::from_upsert(&upsert, Utc::now());
            let inserted = insert_into(payments::table)
                .values(&insert)
                .on_conflict(payments::provider_payment_id)
                .do_nothing()
                .returning(PaymentEntity::as_select())
                .get_result::<PaymentEntity>(conn)
                .optional()?;

            match inserted {
                Some(row) => Ok(row),
                // Lost the insert race to a concurrent delivery; merge into
                // the row that won so both writers converge on one record.
                None => {
                    let existing = payments::table
                        .filter(payments::provider_payment_id.eq(&upsert.provider_payment_id))
                        .select(PaymentEntity::as_select())
                        .for_update()
                        .first::<PaymentEntity>(conn)?;
                    Self::write_merged(conn, &existing, &upsert)
                }
            }
        })
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: String,
        statuses: Option<Vec<PaymentStatus>>,
    ) -> Result<Vec<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let mut query = payments::table
            .filter(payments::provider_subscription_id.eq(provider_subscription_id))
            .select(PaymentEntity::as_select())
            .into_boxed();

        if let Some(statuses) = statuses {
            let status_strings: Vec<String> =
                statuses.iter().map(|status| status.to_string()).collect();
            query = query.filter(payments::status.eq_any(status_strings));
        }

        let results = query
            .order(payments::created_at.desc())
            .load::<PaymentEntity>(&mut conn)?;

        Ok(results)
    }

    async fn exists(&self, provider_payment_id: String) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let found = payments::table
            .filter(payments::provider_payment_id.eq(provider_payment_id))
            .select(payments::id)
            .first::<uuid::Uuid>(&mut conn)
            .optional()?;

        Ok(found.is_some())
    }
}
