use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    NewOrder, NewOrderItem, NewProduct, OrderFilter, OrderId, OrderItemRecord, OrderPage,
    OrderRecord, Product, ProductId, Result, StoreError, SubjectId, TrackingEventRecord,
    store::{OrderStore, StoreTransaction},
};

const PRODUCT_COLUMNS: &str = "id, name, description, price, stock, category, image_url";
const ORDER_COLUMNS: &str =
    "id, user_id, total_amount, shipping_address, status, created_at, updated_at";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: row.try_get::<Decimal, _>("price")?,
            stock: row.try_get("stock")?,
            category: row.try_get("category")?,
            image_url: row.try_get("image_url")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<OrderRecord> {
        Ok(OrderRecord {
            id: OrderId::new(row.try_get("id")?),
            subject_id: SubjectId::new(row.try_get("user_id")?),
            total_amount: row.try_get::<Decimal, _>("total_amount")?,
            shipping_address: row.try_get("shipping_address")?,
            status: row.try_get("status")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<OrderItemRecord> {
        Ok(OrderItemRecord {
            id: row.try_get("id")?,
            order_id: OrderId::new(row.try_get("order_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: row.try_get("quantity")?,
            price: row.try_get::<Decimal, _>("price")?,
            product_name: row.try_get("name")?,
            product_image: row.try_get("image_url")?,
        })
    }

    fn row_to_tracking(row: PgRow) -> Result<TrackingEventRecord> {
        Ok(TrackingEventRecord {
            id: row.try_get("id")?,
            order_id: OrderId::new(row.try_get("order_id")?),
            status: row.try_get("status")?,
            description: row.try_get("description")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx: Some(tx) }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, description, price, stock, category, image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .bind(&product.category)
        .bind(&product.image_url)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_order_for_subject(
        &self,
        subject_id: SubjectId,
        id: OrderId,
    ) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"
        ))
        .bind(id.as_i64())
        .bind(subject_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn orders_for_subject(&self, subject_id: SubjectId) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(subject_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<OrderPage> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut count_sql = String::from("SELECT COUNT(*) FROM orders WHERE 1=1");
        let mut param_count = 0;

        if filter.status.is_some() {
            param_count += 1;
            let clause = format!(" AND status = ${param_count}");
            sql.push_str(&clause);
            count_sql.push_str(&clause);
        }

        sql.push_str(&format!(
            " ORDER BY created_at DESC, id DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        ));

        let mut query = sqlx::query(&sql);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(status) = &filter.status {
            query = query.bind(status);
            count_query = count_query.bind(status);
        }

        let rows = query
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;
        let total = count_query.fetch_one(&self.pool).await?;

        let orders = rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        Ok(OrderPage { orders, total })
    }

    async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT oi.id, oi.order_id, oi.product_id, oi.quantity, oi.price, p.name, p.image_url
            FROM order_items oi
            JOIN products p ON oi.product_id = p.id
            WHERE oi.order_id = $1
            ORDER BY oi.id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn tracking_for_order(&self, order_id: OrderId) -> Result<Vec<TrackingEventRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, status, description, created_at
            FROM order_tracking
            WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_tracking).collect()
    }
}

/// Transaction handle for [`PostgresOrderStore`].
///
/// Wraps a pooled `sqlx` transaction; sqlx rolls it back when dropped
/// uncommitted.
pub struct PgStoreTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStoreTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_i64())
        .fetch_optional(self.conn()?)
        .await?;

        row.map(PostgresOrderStore::row_to_product).transpose()
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            "#,
        )
        .bind(id.as_i64())
        .bind(quantity)
        .execute(self.conn()?)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (user_id, total_amount, shipping_address, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.subject_id.as_i64())
        .bind(order.total_amount)
        .bind(&order.shipping_address)
        .bind(&order.status)
        .fetch_one(self.conn()?)
        .await?;

        PostgresOrderStore::row_to_order(row)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(item.order_id.as_i64())
        .bind(item.product_id.as_i64())
        .bind(item.quantity)
        .bind(item.price)
        .execute(self.conn()?)
        .await?;

        Ok(())
    }

    async fn set_order_status(&mut self, id: OrderId, status: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id.as_i64())
                .bind(status)
                .execute(self.conn()?)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_tracking_event(
        &mut self,
        order_id: OrderId,
        status: &str,
        description: &str,
    ) -> Result<TrackingEventRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO order_tracking (order_id, status, description)
            VALUES ($1, $2, $3)
            RETURNING id, order_id, status, description, created_at
            "#,
        )
        .bind(order_id.as_i64())
        .bind(status)
        .bind(description)
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| {
            // Foreign key violation: the order does not exist
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return StoreError::OrderNotFound(order_id);
            }
            StoreError::Database(e)
        })?;

        PostgresOrderStore::row_to_tracking(row)
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}
