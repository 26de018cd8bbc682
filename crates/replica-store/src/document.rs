use async_trait::async_trait;
use common::{ItemId, OrderId};
use domain::{
    Item, ItemFilter, ItemPatch, NewItem, NewOrder, Order, OrderFilter, OrderPatch, Page,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{Replica, ReplicaStore, Result, StoreError};

const REPLICA: Replica = Replica::Document;

/// Document replica storing each record as one JSONB body keyed by id.
///
/// Runs against its own pool (normally its own database), so it fails
/// independently of the relational replica. Records keep the identifier
/// the relational replica assigned; when none is given a fresh one is
/// generated, like a document store's own object id.
#[derive(Clone)]
pub struct PgDocumentReplica {
    pool: PgPool,
}

impl PgDocumentReplica {
    /// Creates a new document replica over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the document collection migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/document")
            .run(&self.pool)
            .await
    }

    async fn insert_document<T: Serialize + Sync>(
        &self,
        table: &'static str,
        kind: &'static str,
        id: Uuid,
        body: &T,
    ) -> Result<()> {
        sqlx::query(&format!("INSERT INTO {table} (id, body) VALUES ($1, $2)"))
            .bind(id)
            .bind(Json(body))
            .execute(&self.pool)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    StoreError::Duplicate {
                        replica: REPLICA,
                        kind,
                        id: id.to_string(),
                    }
                }
                err => db(err),
            })?;
        Ok(())
    }

    async fn read_document<T: DeserializeOwned>(
        &self,
        table: &'static str,
        id: Uuid,
    ) -> Result<Option<T>> {
        let row = sqlx::query(&format!("SELECT body FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.map(|row| decode(row.try_get("body").map_err(db)?))
            .transpose()
    }

    async fn fetch_documents<T: DeserializeOwned>(
        &self,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<T>> {
        let rows = query.fetch_all(&self.pool).await.map_err(db)?;
        rows.into_iter()
            .map(|row| decode(row.try_get("body").map_err(db)?))
            .collect()
    }

    /// Read-modify-write of one document under a row lock.
    async fn modify_document<T, F>(&self, table: &'static str, id: Uuid, modify: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce(&mut T) + Send,
    {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let row = sqlx::query(&format!("SELECT body FROM {table} WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut document: T = decode(row.try_get("body").map_err(db)?)?;
        modify(&mut document);

        sqlx::query(&format!("UPDATE {table} SET body = $2 WHERE id = $1"))
            .bind(id)
            .bind(Json(&document))
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(Some(document))
    }

    async fn delete_document(&self, table: &'static str, id: Uuid) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }
}

fn db(err: sqlx::Error) -> StoreError {
    StoreError::database(REPLICA, err)
}

fn decode<T: DeserializeOwned>(body: serde_json::Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| StoreError::corrupt(REPLICA, e.to_string()))
}

#[async_trait]
impl ReplicaStore for PgDocumentReplica {
    fn replica(&self) -> Replica {
        REPLICA
    }

    async fn insert_item(&self, item: NewItem) -> Result<Item> {
        let id = item.id.unwrap_or_default();
        let item = item.into_item(id);
        self.insert_document("piece_documents", "item", id.as_uuid(), &item)
            .await?;
        Ok(item)
    }

    async fn read_item(&self, id: ItemId) -> Result<Option<Item>> {
        self.read_document("piece_documents", id.as_uuid()).await
    }

    async fn find_items(&self, filter: &ItemFilter, page: Page) -> Result<Vec<Item>> {
        let query = sqlx::query(
            r#"
            SELECT body FROM piece_documents
            WHERE ($1::text IS NULL OR body->>'name' = $1)
              AND ($2::text IS NULL OR body->>'type' = $2)
              AND ($3::bigint IS NULL OR (body->'unit_cost'->>'cents')::bigint = $3)
              AND ($4::bigint IS NULL OR (body->>'quantity')::bigint = $4)
              AND ($5::bigint IS NULL OR (body->>'alert_threshold')::bigint = $5)
            ORDER BY body->>'name' ASC, id ASC
            OFFSET $6 LIMIT $7
            "#,
        )
        .bind(filter.name.as_deref())
        .bind(filter.kind.as_deref())
        .bind(filter.unit_cost.map(|cost| cost.cents()))
        .bind(filter.quantity.map(i64::from))
        .bind(filter.alert_threshold.map(i64::from))
        .bind(i64::from(page.offset))
        .bind(i64::from(page.limit));
        self.fetch_documents(query).await
    }

    async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<Option<Item>> {
        self.modify_document("piece_documents", id.as_uuid(), |item: &mut Item| {
            patch.apply(item)
        })
        .await
    }

    async fn write_quantity(&self, id: ItemId, quantity: u32) -> Result<Option<Item>> {
        let row = sqlx::query(
            r#"
            UPDATE piece_documents
            SET body = jsonb_set(body, '{quantity}', to_jsonb($2::bigint))
            WHERE id = $1
            RETURNING body
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.map(|row| decode(row.try_get("body").map_err(db)?))
            .transpose()
    }

    async fn delete_item(&self, id: ItemId) -> Result<bool> {
        self.delete_document("piece_documents", id.as_uuid()).await
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        let id = order.id.unwrap_or_default();
        let order = order.into_order(id);
        self.insert_document("order_documents", "order", id.as_uuid(), &order)
            .await?;
        Ok(order)
    }

    async fn read_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.read_document("order_documents", id.as_uuid()).await
    }

    async fn find_orders(&self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>> {
        let query = sqlx::query(
            r#"
            SELECT body FROM order_documents
            WHERE ($1::text IS NULL OR body->>'status' = $1)
              AND ($2::date IS NULL OR (body->>'order_date')::date = $2)
              AND ($3::date IS NULL OR (body->>'delivery_date')::date = $3)
              AND ($4::bigint IS NULL OR (body->'total_amount'->>'cents')::bigint = $4)
            ORDER BY body->>'order_date' ASC, id ASC
            OFFSET $5 LIMIT $6
            "#,
        )
        .bind(filter.status.as_deref())
        .bind(filter.order_date)
        .bind(filter.delivery_date)
        .bind(filter.total_amount.map(|total| total.cents()))
        .bind(i64::from(page.offset))
        .bind(i64::from(page.limit));
        self.fetch_documents(query).await
    }

    async fn update_order(&self, id: OrderId, patch: &OrderPatch) -> Result<Option<Order>> {
        self.modify_document("order_documents", id.as_uuid(), |order: &mut Order| {
            patch.apply(order)
        })
        .await
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        self.delete_document("order_documents", id.as_uuid()).await
    }
}
