use async_trait::async_trait;
use common::{ItemId, OrderId};
use domain::{
    Item, ItemFilter, ItemPatch, LineItem, Money, NewItem, NewOrder, Order, OrderFilter,
    OrderPatch, Page,
};
use sqlx::types::Json;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{Replica, ReplicaStore, Result, StoreError};

const REPLICA: Replica = Replica::Relational;

const ITEM_COLUMNS: &str = "id, name, kind, unit_cost_cents, quantity, alert_threshold";
const ORDER_COLUMNS: &str =
    "id, line_items, status, order_date, delivery_date, total_amount_cents";

/// PostgreSQL-backed relational replica.
///
/// Identifiers default to `gen_random_uuid()`, so this replica is the one
/// that assigns them.
#[derive(Clone)]
pub struct PostgresReplica {
    pool: PgPool,
}

impl PostgresReplica {
    /// Creates a new relational replica over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the relational migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/relational")
            .run(&self.pool)
            .await
    }

    fn row_to_item(row: PgRow) -> Result<Item> {
        Ok(Item {
            id: ItemId::from_uuid(row.try_get::<Uuid, _>("id").map_err(db)?),
            name: row.try_get("name").map_err(db)?,
            kind: row.try_get("kind").map_err(db)?,
            unit_cost: Money::from_cents(row.try_get("unit_cost_cents").map_err(db)?),
            quantity: to_u32("quantity", row.try_get("quantity").map_err(db)?)?,
            alert_threshold: to_u32("alert_threshold", row.try_get("alert_threshold").map_err(db)?)?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let line_items: Json<Vec<LineItem>> = row.try_get("line_items").map_err(db)?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id").map_err(db)?),
            line_items: line_items.0,
            status: row.try_get("status").map_err(db)?,
            order_date: row.try_get("order_date").map_err(db)?,
            delivery_date: row.try_get("delivery_date").map_err(db)?,
            total_amount: Money::from_cents(row.try_get("total_amount_cents").map_err(db)?),
        })
    }
}

fn db(err: sqlx::Error) -> StoreError {
    StoreError::database(REPLICA, err)
}

/// Maps an insert error, turning primary-key collisions into `Duplicate`.
fn insert_error(kind: &'static str, id: Option<Uuid>, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return StoreError::Duplicate {
            replica: REPLICA,
            kind,
            id: id.map(|id| id.to_string()).unwrap_or_default(),
        };
    }
    db(err)
}

fn to_u32(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::corrupt(REPLICA, format!("{column} out of range: {value}")))
}

#[async_trait]
impl ReplicaStore for PostgresReplica {
    fn replica(&self) -> Replica {
        REPLICA
    }

    async fn insert_item(&self, item: NewItem) -> Result<Item> {
        let id = item.id.map(|id| id.as_uuid());
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO pieces (id, name, kind, unit_cost_cents, quantity, alert_threshold)
            VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&item.name)
        .bind(&item.kind)
        .bind(item.unit_cost.cents())
        .bind(i64::from(item.quantity))
        .bind(i64::from(item.alert_threshold))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error("item", id, e))?;

        Self::row_to_item(row)
    }

    async fn read_item(&self, id: ItemId) -> Result<Option<Item>> {
        sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM pieces WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .map(Self::row_to_item)
            .transpose()
    }

    async fn find_items(&self, filter: &ItemFilter, page: Page) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM pieces
            WHERE ($1::text IS NULL OR name = $1)
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::bigint IS NULL OR unit_cost_cents = $3)
              AND ($4::bigint IS NULL OR quantity = $4)
              AND ($5::bigint IS NULL OR alert_threshold = $5)
            ORDER BY name ASC, id ASC
            OFFSET $6 LIMIT $7
            "#
        ))
        .bind(filter.name.as_deref())
        .bind(filter.kind.as_deref())
        .bind(filter.unit_cost.map(|cost| cost.cents()))
        .bind(filter.quantity.map(i64::from))
        .bind(filter.alert_threshold.map(i64::from))
        .bind(i64::from(page.offset))
        .bind(i64::from(page.limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<Option<Item>> {
        sqlx::query(&format!(
            r#"
            UPDATE pieces SET
                name = COALESCE($2, name),
                kind = COALESCE($3, kind),
                unit_cost_cents = COALESCE($4, unit_cost_cents),
                quantity = COALESCE($5, quantity),
                alert_threshold = COALESCE($6, alert_threshold)
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(patch.name.as_deref())
        .bind(patch.kind.as_deref())
        .bind(patch.unit_cost.map(|c| c.cents()))
        .bind(patch.quantity.map(i64::from))
        .bind(patch.alert_threshold.map(i64::from))
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(Self::row_to_item)
        .transpose()
    }

    async fn write_quantity(&self, id: ItemId, quantity: u32) -> Result<Option<Item>> {
        sqlx::query(&format!(
            "UPDATE pieces SET quantity = $2 WHERE id = $1 RETURNING {ITEM_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(Self::row_to_item)
        .transpose()
    }

    async fn delete_item(&self, id: ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pieces WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        let id = order.id.map(|id| id.as_uuid());
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (id, line_items, status, order_date, delivery_date, total_amount_cents)
            VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5, $6)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(Json(&order.line_items))
        .bind(&order.status)
        .bind(order.order_date)
        .bind(order.delivery_date)
        .bind(order.total_amount.cents())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error("order", id, e))?;

        Self::row_to_order(row)
    }

    async fn read_order(&self, id: OrderId) -> Result<Option<Order>> {
        sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .map(Self::row_to_order)
            .transpose()
    }

    async fn find_orders(&self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::date IS NULL OR order_date = $2)
              AND ($3::date IS NULL OR delivery_date = $3)
              AND ($4::bigint IS NULL OR total_amount_cents = $4)
            ORDER BY order_date ASC, id ASC
            OFFSET $5 LIMIT $6
            "#
        ))
        .bind(filter.status.as_deref())
        .bind(filter.order_date)
        .bind(filter.delivery_date)
        .bind(filter.total_amount.map(|total| total.cents()))
        .bind(i64::from(page.offset))
        .bind(i64::from(page.limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update_order(&self, id: OrderId, patch: &OrderPatch) -> Result<Option<Order>> {
        sqlx::query(&format!(
            r#"
            UPDATE orders SET
                status = COALESCE($2, status),
                order_date = COALESCE($3, order_date),
                delivery_date = COALESCE($4, delivery_date)
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(patch.status.as_deref())
        .bind(patch.order_date)
        .bind(patch.delivery_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(Self::row_to_order)
        .transpose()
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }
}
