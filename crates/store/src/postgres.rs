use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartId, HistoryEntryId, Money, OrderId, OrderItemId, PaymentId, ProductId, SessionId, ShopId,
    UserId,
};
use domain::{
    Cart, CartItem, CartOwner, CheckoutLine, DomainError, HistoryEntry, NewOrder, Order,
    OrderChange, OrderItem, OrderScope, Payment, Product, ShippingAddress, plan_checkout,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow, types::Json};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{CartStore, CheckoutRequest, InventoryLedger, OrderStore},
};

const PRODUCT_COLUMNS: &str =
    "id, shop_id, name, price_cents, stock_quantity, lifecycle, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, user_id, total_amount_cents, status, shipping_address, \
     tracking_number, carrier, shipped_at, delivered_at, cancelled_at, cancellation_reason, \
     version, created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, shop_id, quantity, unit_price_cents, \
     status, tracking_number, carrier_name, notes, status_updated_at, status_updated_by";

/// PostgreSQL-backed store implementation.
///
/// Checkout and fulfillment writes run in a single transaction each. Product
/// rows are locked with `SELECT ... FOR UPDATE` in id order before stock is
/// re-checked, so concurrent checkouts of the same product serialize.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get("id")?),
            shop_id: ShopId::from_uuid(row.try_get("shop_id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock_quantity: quantity(row, "stock_quantity")?,
            lifecycle: parse(row, "lifecycle")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_cart(row: &PgRow) -> Result<Cart> {
        let user_id: Option<Uuid> = row.try_get("user_id")?;
        let session_id: Option<Uuid> = row.try_get("session_id")?;
        let owner = match (user_id, session_id) {
            (Some(user_id), None) => CartOwner::User(UserId::from_uuid(user_id)),
            (None, Some(session_id)) => CartOwner::Session(SessionId::from_uuid(session_id)),
            _ => return Err(decode_error("cart must have exactly one owner")),
        };

        Ok(Cart {
            id: CartId::from_uuid(row.try_get("id")?),
            owner,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
        Ok(CartItem {
            cart_id: CartId::from_uuid(row.try_get("cart_id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            quantity: quantity(row, "quantity")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let shipping_address: Json<ShippingAddress> = row.try_get("shipping_address")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            status: parse(row, "status")?,
            shipping_address: shipping_address.0,
            tracking_number: row.try_get("tracking_number")?,
            carrier: row.try_get("carrier")?,
            shipped_at: row.try_get("shipped_at")?,
            delivered_at: row.try_get("delivered_at")?,
            cancelled_at: row.try_get("cancelled_at")?,
            cancellation_reason: row.try_get("cancellation_reason")?,
            items: Vec::new(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }

    fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
        let status_updated_by: Option<Uuid> = row.try_get("status_updated_by")?;

        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get("id")?),
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            shop_id: ShopId::from_uuid(row.try_get("shop_id")?),
            quantity: quantity(row, "quantity")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            status: parse(row, "status")?,
            tracking_number: row.try_get("tracking_number")?,
            carrier_name: row.try_get("carrier_name")?,
            notes: row.try_get("notes")?,
            status_updated_at: row.try_get("status_updated_at")?,
            status_updated_by: status_updated_by.map(UserId::from_uuid),
        })
    }

    fn row_to_payment(row: &PgRow) -> Result<Payment> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get("id")?),
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            method: parse(row, "method")?,
            status: parse(row, "status")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_history(row: &PgRow) -> Result<HistoryEntry> {
        let order_item_id: Option<Uuid> = row.try_get("order_item_id")?;
        let actor_id: Option<Uuid> = row.try_get("actor_id")?;

        Ok(HistoryEntry {
            id: HistoryEntryId::from_uuid(row.try_get("id")?),
            order_id: OrderId::from_uuid(row.try_get("order_id")?),
            order_item_id: order_item_id.map(OrderItemId::from_uuid),
            status: row.try_get("status")?,
            note: row.try_get("note")?,
            actor_id: actor_id.map(UserId::from_uuid),
            created_at: row.try_get("created_at")?,
        })
    }

    /// Attaches items to order rows, keeping the row order.
    async fn assemble_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let mut orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<Uuid> = orders.iter().map(|order| order.id.as_uuid()).collect();
        let item_rows = sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY position ASC"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let item = Self::row_to_order_item(row)?;
            items.entry(item.order_id).or_default().push(item);
        }
        for order in &mut orders {
            order.items = items.remove(&order.id).unwrap_or_default();
        }
        Ok(orders)
    }

    /// Locks the given products for the rest of the transaction.
    async fn lock_products(
        conn: &mut PgConnection,
        ids: impl IntoIterator<Item = ProductId>,
    ) -> Result<HashMap<ProductId, Product>> {
        let mut ids: Vec<Uuid> = ids.into_iter().map(|id| id.as_uuid()).collect();
        ids.sort();
        ids.dedup();

        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(&ids)
        .fetch_all(conn)
        .await?;

        rows.iter()
            .map(|row| Self::row_to_product(row).map(|product| (product.id, product)))
            .collect()
    }

    async fn write_stock(conn: &mut PgConnection, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = $2, lifecycle = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(i64::from(product.stock_quantity))
        .bind(product.lifecycle.as_str())
        .bind(product.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn update_product(
        &self,
        id: ProductId,
        apply: impl FnOnce(&mut Product) + Send,
    ) -> Result<Product> {
        let mut tx = self.pool.begin().await?;
        let mut locked = Self::lock_products(&mut tx, [id]).await?;
        let mut product = locked
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        apply(&mut product);
        Self::write_stock(&mut tx, &product).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total_amount_cents, status, shipping_address,
                                tracking_number, carrier, shipped_at, delivered_at, cancelled_at,
                                cancellation_reason, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.total_amount.cents())
        .bind(order.status.as_str())
        .bind(Json(&order.shipping_address))
        .bind(&order.tracking_number)
        .bind(&order.carrier)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(&order.cancellation_reason)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, shop_id, quantity,
                                         unit_price_cents, status, tracking_number, carrier_name,
                                         notes, status_updated_at, status_updated_by, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(item.shop_id.as_uuid())
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .bind(item.status.as_str())
            .bind(&item.tracking_number)
            .bind(&item.carrier_name)
            .bind(&item.notes)
            .bind(item.status_updated_at)
            .bind(item.status_updated_by.map(|id| id.as_uuid()))
            .bind(position as i32)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn insert_history(conn: &mut PgConnection, entry: &HistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_history (id, order_id, order_item_id, status, note, actor_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.order_id.as_uuid())
        .bind(entry.order_item_id.map(|id| id.as_uuid()))
        .bind(&entry.status)
        .bind(&entry.note)
        .bind(entry.actor_id.map(|id| id.as_uuid()))
        .bind(entry.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn touch_cart(conn: &mut PgConnection, cart_id: CartId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE carts SET updated_at = $2 WHERE id = $1")
            .bind(cart_id.as_uuid())
            .bind(now)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn decode_error(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(err.into()))
}

fn quantity(row: &PgRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(decode_error)
}

fn parse<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr<Err = DomainError>,
{
    let value: String = row.try_get(column)?;
    value.parse().map_err(decode_error)
}

fn owner_columns(owner: CartOwner) -> (Option<Uuid>, Option<Uuid>) {
    match owner {
        CartOwner::User(id) => (Some(id.as_uuid()), None),
        CartOwner::Session(id) => (None, Some(id.as_uuid())),
    }
}

#[async_trait]
impl InventoryLedger for PostgresStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn catalog(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE lifecycle <> 'REMOVED' ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, shop_id, name, price_cents, stock_quantity, lifecycle, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
            SET shop_id = EXCLUDED.shop_id,
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock_quantity = EXCLUDED.stock_quantity,
                lifecycle = EXCLUDED.lifecycle,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.shop_id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.stock_quantity))
        .bind(product.lifecycle.as_str())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn restock(&self, id: ProductId, quantity: u32, now: DateTime<Utc>) -> Result<Product> {
        self.update_product(id, |product| product.restock(quantity, now))
            .await
    }

    async fn remove_product(&self, id: ProductId, now: DateTime<Utc>) -> Result<Product> {
        self.update_product(id, |product| product.remove(now)).await
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn resolve(&self, owner: CartOwner, now: DateTime<Utc>) -> Result<(Cart, bool)> {
        let (user_id, session_id) = owner_columns(owner);
        let candidate = Cart::new(owner, now);

        // Concurrent first requests for one identity race on the unique
        // owner columns; the loser reads the winner's cart.
        let inserted = sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, session_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(candidate.id.as_uuid())
        .bind(user_id)
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;
        if inserted {
            return Ok((candidate, true));
        }

        let row = sqlx::query(
            r#"
            SELECT id, user_id, session_id, created_at, updated_at
            FROM carts
            WHERE user_id = $1 OR session_id = $2
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((Self::row_to_cart(&row)?, false))
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(
            "SELECT id, user_id, session_id, created_at, updated_at FROM carts WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_cart).transpose()
    }

    async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(
            r#"
            SELECT cart_id, product_id, quantity, updated_at
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_cart_item).collect()
    }

    async fn item(&self, cart_id: CartId, product_id: ProductId) -> Result<Option<CartItem>> {
        let row = sqlx::query(
            r#"
            SELECT cart_id, product_id, quantity, updated_at
            FROM cart_items
            WHERE cart_id = $1 AND product_id = $2
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_cart_item).transpose()
    }

    async fn upsert_item(&self, item: &CartItem) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if !Self::touch_cart(&mut tx, item.cart_id, item.updated_at).await? {
            return Err(StoreError::not_found("Cart", item.cart_id));
        }

        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, product_id, quantity, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cart_id, product_id) DO UPDATE
            SET quantity = EXCLUDED.quantity, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(item.cart_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(i64::from(item.quantity))
        .bind(item.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id.as_uuid())
            .bind(product_id.as_uuid())
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        if removed {
            Self::touch_cart(&mut tx, cart_id, now).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn clear(&self, cart_id: CartId, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        Self::touch_cart(&mut tx, cart_id, now).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn sweep_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM carts WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn place_order(&self, request: CheckoutRequest) -> Result<NewOrder> {
        let mut tx = self.pool.begin().await?;

        let mut locked =
            Self::lock_products(&mut tx, request.lines.iter().map(|(id, _)| *id)).await?;
        let lines = request
            .lines
            .iter()
            .map(|(product_id, quantity)| {
                locked
                    .get(product_id)
                    .cloned()
                    .map(|product| CheckoutLine {
                        product,
                        quantity: *quantity,
                    })
                    .ok_or_else(|| StoreError::not_found("Product", product_id))
            })
            .collect::<Result<Vec<_>>>()?;

        let placed = plan_checkout(
            request.user_id,
            request.cart_id,
            lines,
            request.shipping_address,
            request.payment_method,
            request.now,
        )?;

        Self::insert_order(&mut tx, &placed.order).await?;

        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, amount_cents, method, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(placed.payment.id.as_uuid())
        .bind(placed.payment.order_id.as_uuid())
        .bind(placed.payment.amount.cents())
        .bind(placed.payment.method.as_str())
        .bind(placed.payment.status.as_str())
        .bind(placed.payment.created_at)
        .execute(&mut *tx)
        .await?;

        Self::insert_history(&mut tx, &placed.history).await?;

        for withdrawal in placed.stock_withdrawals() {
            let product = locked
                .get_mut(&withdrawal.product_id)
                .ok_or_else(|| StoreError::not_found("Product", withdrawal.product_id))?;
            product.withdraw(withdrawal.quantity, request.now)?;
            Self::write_stock(&mut tx, product).await?;
        }

        tx.commit().await?;
        tracing::debug!(order_id = %placed.order.id, "order committed");
        Ok(placed)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        Ok(self.assemble_orders(rows).await?.into_iter().next())
    }

    async fn find_order_by_item(&self, item_id: OrderItemId) -> Result<Option<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE id = (SELECT order_id FROM order_items WHERE id = $1)"
        ))
        .bind(item_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(self.assemble_orders(rows).await?.into_iter().next())
    }

    async fn list_orders(&self, scope: OrderScope) -> Result<Vec<Order>> {
        let rows = match scope {
            OrderScope::All => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
            OrderScope::Shop(shop_id) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders \
                     WHERE id IN (SELECT order_id FROM order_items WHERE shop_id = $1) \
                     ORDER BY created_at DESC"
                ))
                .bind(shop_id.as_uuid())
                .fetch_all(&self.pool)
                .await?
            }
            OrderScope::Purchaser(user_id) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
                ))
                .bind(user_id.as_uuid())
                .fetch_all(&self.pool)
                .await?
            }
        };

        self.assemble_orders(rows).await
    }

    async fn apply_change(&self, change: &OrderChange) -> Result<()> {
        let order = &change.order;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, tracking_number = $3, carrier = $4, shipped_at = $5,
                delivered_at = $6, cancelled_at = $7, cancellation_reason = $8,
                version = $9, updated_at = $10
            WHERE id = $1 AND version = $11
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(&order.tracking_number)
        .bind(&order.carrier)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(&order.cancellation_reason)
        .bind(order.version)
        .bind(order.updated_at)
        .bind(change.expected_version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(order.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    order_id: order.id,
                    expected: change.expected_version,
                    actual,
                },
                None => StoreError::not_found("Order", order.id),
            });
        }

        for item in &order.items {
            sqlx::query(
                r#"
                UPDATE order_items
                SET status = $2, tracking_number = $3, carrier_name = $4, notes = $5,
                    status_updated_at = $6, status_updated_by = $7
                WHERE id = $1
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.status.as_str())
            .bind(&item.tracking_number)
            .bind(&item.carrier_name)
            .bind(&item.notes)
            .bind(item.status_updated_at)
            .bind(item.status_updated_by.map(|id| id.as_uuid()))
            .execute(&mut *tx)
            .await?;
        }

        for entry in &change.history {
            Self::insert_history(&mut tx, entry).await?;
        }

        if !change.restock.is_empty() {
            let mut locked =
                Self::lock_products(&mut tx, change.restock.iter().map(|adj| adj.product_id))
                    .await?;
            for adjustment in &change.restock {
                if let Some(product) = locked.get_mut(&adjustment.product_id) {
                    product.restock(adjustment.quantity, order.updated_at);
                    Self::write_stock(&mut tx, product).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount_cents, method, status, created_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_payment).transpose()
    }

    async fn history(&self, order_id: OrderId) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, order_item_id, status, note, actor_id, created_at
            FROM order_history
            WHERE order_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_history).collect()
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        for table in ["order_history", "payments", "order_items"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE order_id = $1"))
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }
        let deleted = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        tx.commit().await?;
        Ok(deleted)
    }
}
