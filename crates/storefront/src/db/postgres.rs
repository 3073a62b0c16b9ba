//! `PostgreSQL` [`Store`] implementation.
//!
//! Queries are checked at runtime (`query_as` with `FromRow` rows) and row
//! types are converted to domain types here, so invalid stored data surfaces
//! as `RepositoryError::DataCorruption`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use kiosk_core::{
    CartItemId, IdentityId, OrderId, OrderStatus, Phone, PickupType, Price, PriceTier, Role,
    VariantId,
};

use super::{
    CartRepository, CatalogRepository, IdentityRepository, OrderRepository, RepositoryError,
    Store,
};
use crate::models::{
    CartItem, CartSnapshot, CatalogVariant, Identity, LineItem, NewCartItem, NewOrder, Order,
    OrderFilter, PickupPreference, ProfileUpdate,
};

const IDENTITY_COLUMNS: &str = "id, phone, name, price_tier, role, pickup_type, pickup_date, \
     pickup_time, address, cart_revision, created_at, updated_at";

const CART_ITEM_COLUMNS: &str = "id, identity_id, variant_id, quantity, note";

const ORDER_COLUMNS: &str = "id, identity_id, line_items, total, pickup_type, pickup_date, \
     pickup_time, address, note, status, printed, version, created_at, updated_at";

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: i32,
    phone: String,
    name: String,
    price_tier: PriceTier,
    role: Role,
    pickup_type: PickupType,
    pickup_date: Option<NaiveDate>,
    pickup_time: Option<NaiveTime>,
    address: Option<String>,
    cart_revision: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = RepositoryError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        let phone = Phone::parse(&row.phone).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid phone in database: {e}"))
        })?;

        Ok(Self {
            id: IdentityId::new(row.id),
            phone,
            name: row.name,
            price_tier: row.price_tier,
            role: row.role,
            pickup: PickupPreference {
                pickup_type: row.pickup_type,
                date: row.pickup_date,
                time: row.pickup_time,
                address: row.address,
            },
            cart_revision: row.cart_revision,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: i32,
    name: String,
    unit_price: Decimal,
    available: bool,
}

impl TryFrom<VariantRow> for CatalogVariant {
    type Error = RepositoryError;

    fn try_from(row: VariantRow) -> Result<Self, Self::Error> {
        let unit_price = Price::new(row.unit_price).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid price for variant {}: {e}", row.id))
        })?;

        Ok(Self {
            id: VariantId::new(row.id),
            name: row.name,
            unit_price,
            available: row.available,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: i32,
    identity_id: i32,
    variant_id: i32,
    quantity: i32,
    note: String,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!("invalid quantity for cart item {}", row.id))
        })?;

        Ok(Self {
            id: CartItemId::new(row.id),
            identity_id: IdentityId::new(row.identity_id),
            variant_id: VariantId::new(row.variant_id),
            quantity,
            note: Some(row.note).filter(|note| !note.is_empty()),
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i32,
    identity_id: i32,
    line_items: Json<Vec<LineItem>>,
    total: Decimal,
    pickup_type: PickupType,
    pickup_date: Option<NaiveDate>,
    pickup_time: Option<NaiveTime>,
    address: Option<String>,
    note: Option<String>,
    status: OrderStatus,
    printed: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let total = Price::new(row.total).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid total for order {}: {e}", row.id))
        })?;

        Ok(Self {
            id: OrderId::new(row.id),
            identity_id: IdentityId::new(row.identity_id),
            line_items: row.line_items.0,
            total,
            pickup: PickupPreference {
                pickup_type: row.pickup_type,
                date: row.pickup_date,
                time: row.pickup_time,
                address: row.address,
            },
            note: row.note,
            status: row.status,
            printed: row.printed,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

fn db_quantity(quantity: u32) -> Result<i32, RepositoryError> {
    i32::try_from(quantity)
        .map_err(|_| RepositoryError::DataCorruption(format!("quantity {quantity} out of range")))
}

fn db_note(note: Option<&String>) -> &str {
    note.map_or("", String::as_str)
}

// =============================================================================
// PgStore
// =============================================================================

/// [`Store`] backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Bump the cart revision, taking the identity row lock for the rest of
    /// the transaction.
    async fn bump_cart_revision(
        tx: &mut Transaction<'_, Postgres>,
        identity: IdentityId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE storefront.identity SET cart_revision = cart_revision + 1 WHERE id = $1",
        )
        .bind(identity.as_i32())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Tell a lost conditional write apart from a missing order.
    async fn missing_or_conflict(&self, id: OrderId) -> RepositoryError {
        let exists = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM storefront.customer_order WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await;

        match exists {
            Ok(Some(_)) => RepositoryError::Conflict(format!("order {id} was modified")),
            Ok(None) => RepositoryError::NotFound,
            Err(e) => RepositoryError::Database(e),
        }
    }
}

#[async_trait]
impl IdentityRepository for PgStore {
    async fn identity_by_id(&self, id: IdentityId) -> Result<Option<Identity>, RepositoryError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM storefront.identity WHERE id = $1");
        sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id.as_i32())
            .fetch_optional(&self.pool)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn upsert_identity(
        &self,
        phone: &Phone,
        profile: &ProfileUpdate,
    ) -> Result<Identity, RepositoryError> {
        let pickup = profile.pickup.clone().unwrap_or_default();
        let sql = format!(
            r"
            INSERT INTO storefront.identity AS i
                (phone, name, pickup_type, pickup_date, pickup_time, address)
            VALUES ($1, COALESCE($2, $1), $3, $4, $5, $6)
            ON CONFLICT (phone) DO UPDATE SET
                name = COALESCE($2, i.name),
                pickup_type = CASE WHEN $7 THEN EXCLUDED.pickup_type ELSE i.pickup_type END,
                pickup_date = CASE WHEN $7 THEN EXCLUDED.pickup_date ELSE i.pickup_date END,
                pickup_time = CASE WHEN $7 THEN EXCLUDED.pickup_time ELSE i.pickup_time END,
                address = CASE WHEN $7 THEN EXCLUDED.address ELSE i.address END,
                updated_at = now()
            RETURNING {IDENTITY_COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(phone.as_str())
            .bind(profile.name.as_deref())
            .bind(pickup.pickup_type)
            .bind(pickup.date)
            .bind(pickup.time)
            .bind(pickup.address.as_deref())
            .bind(profile.pickup.is_some())
            .fetch_one(&self.pool)
            .await?;

        Identity::try_from(row)
    }

    async fn set_role(&self, phone: &Phone, role: Role) -> Result<Identity, RepositoryError> {
        let sql = format!(
            "UPDATE storefront.identity SET role = $2, updated_at = now() \
             WHERE phone = $1 RETURNING {IDENTITY_COLUMNS}"
        );
        sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(phone.as_str())
            .bind(role)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
            .and_then(Identity::try_from)
    }

    async fn set_price_tier(
        &self,
        phone: &Phone,
        tier: PriceTier,
    ) -> Result<Identity, RepositoryError> {
        let sql = format!(
            "UPDATE storefront.identity SET price_tier = $2, updated_at = now() \
             WHERE phone = $1 RETURNING {IDENTITY_COLUMNS}"
        );
        sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(phone.as_str())
            .bind(tier)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
            .and_then(Identity::try_from)
    }
}

#[async_trait]
impl CatalogRepository for PgStore {
    async fn resolve_variants(
        &self,
        ids: &[VariantId],
        tier: PriceTier,
    ) -> Result<Vec<CatalogVariant>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(VariantId::as_i32).collect();
        let rows = sqlx::query_as::<_, VariantRow>(
            r"
            SELECT v.id, v.name, COALESCE(tp.price, v.base_price) AS unit_price, v.available
            FROM catalog.variant v
            LEFT JOIN catalog.variant_tier_price tp
                ON tp.variant_id = v.id AND tp.price_tier = $2
            WHERE v.id = ANY($1)
            ",
        )
        .bind(&ids)
        .bind(tier)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CatalogVariant::try_from).collect()
    }
}

#[async_trait]
impl CartRepository for PgStore {
    async fn cart(&self, identity: IdentityId) -> Result<CartSnapshot, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // FOR SHARE waits out in-flight cart writes, so items match the revision.
        let revision = sqlx::query_scalar::<_, i64>(
            "SELECT cart_revision FROM storefront.identity WHERE id = $1 FOR SHARE",
        )
        .bind(identity.as_i32())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let sql = format!(
            "SELECT {CART_ITEM_COLUMNS} FROM storefront.cart_item \
             WHERE identity_id = $1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, CartItemRow>(&sql)
            .bind(identity.as_i32())
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let items = rows
            .into_iter()
            .map(CartItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CartSnapshot { items, revision })
    }

    async fn add_cart_item(
        &self,
        identity: IdentityId,
        item: &NewCartItem,
        max_quantity: u32,
    ) -> Result<CartItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        Self::bump_cart_revision(&mut tx, identity).await?;

        // A merge that fails the cap updates nothing and returns no row; the
        // transaction is dropped, so the revision bump rolls back too.
        let sql = format!(
            r"
            INSERT INTO storefront.cart_item AS c (identity_id, variant_id, quantity, note)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (identity_id, variant_id, note)
                DO UPDATE SET quantity = c.quantity + EXCLUDED.quantity
                WHERE c.quantity::BIGINT + EXCLUDED.quantity <= $5
            RETURNING {CART_ITEM_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, CartItemRow>(&sql)
            .bind(identity.as_i32())
            .bind(item.variant_id.as_i32())
            .bind(db_quantity(item.quantity)?)
            .bind(db_note(item.note.as_ref()))
            .bind(i64::from(max_quantity))
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::QuantityLimit)?;
        tx.commit().await?;

        CartItem::try_from(row)
    }

    async fn set_cart_item_quantity(
        &self,
        identity: IdentityId,
        item: CartItemId,
        quantity: u32,
    ) -> Result<CartItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        Self::bump_cart_revision(&mut tx, identity).await?;

        let sql = format!(
            "UPDATE storefront.cart_item SET quantity = $3 \
             WHERE id = $1 AND identity_id = $2 RETURNING {CART_ITEM_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CartItemRow>(&sql)
            .bind(item.as_i32())
            .bind(identity.as_i32())
            .bind(db_quantity(quantity)?)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await?;

        CartItem::try_from(row)
    }

    async fn remove_cart_item(
        &self,
        identity: IdentityId,
        item: CartItemId,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let result =
            sqlx::query("DELETE FROM storefront.cart_item WHERE id = $1 AND identity_id = $2")
                .bind(item.as_i32())
                .bind(identity.as_i32())
                .execute(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::bump_cart_revision(&mut tx, identity).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM storefront.customer_order WHERE id = $1");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id.as_i32())
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {ORDER_COLUMNS} FROM storefront.customer_order
            WHERE ($1::storefront.order_status IS NULL OR status = $1)
              AND ($2::INTEGER IS NULL OR identity_id = $2)
            ORDER BY created_at DESC, id DESC
            "
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(filter.status)
            .bind(filter.identity_id.map(|id| id.as_i32()))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn place_order(
        &self,
        order: &NewOrder,
        cart_revision: i64,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_scalar::<_, i64>(
            "SELECT cart_revision FROM storefront.identity WHERE id = $1 FOR UPDATE",
        )
        .bind(order.identity_id.as_i32())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if current != cart_revision {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "cart revision is {current}, expected {cart_revision}"
            )));
        }

        let sql = format!(
            r"
            INSERT INTO storefront.customer_order
                (identity_id, line_items, total, pickup_type, pickup_date, pickup_time, address, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order.identity_id.as_i32())
            .bind(Json(&order.line_items))
            .bind(order.total)
            .bind(order.pickup.pickup_type)
            .bind(order.pickup.date)
            .bind(order.pickup.time)
            .bind(order.pickup.address.as_deref())
            .bind(order.note.as_deref())
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM storefront.cart_item WHERE identity_id = $1")
            .bind(order.identity_id.as_i32())
            .execute(&mut *tx)
            .await?;
        Self::bump_cart_revision(&mut tx, order.identity_id).await?;

        tx.commit().await?;
        Order::try_from(row)
    }

    async fn save_order(&self, order: &Order) -> Result<Order, RepositoryError> {
        let sql = format!(
            r"
            UPDATE storefront.customer_order SET
                line_items = $3,
                total = $4,
                pickup_type = $5,
                pickup_date = $6,
                pickup_time = $7,
                address = $8,
                note = $9,
                status = $10,
                printed = $11,
                version = version + 1,
                updated_at = now()
            WHERE id = $1 AND version = $2
            RETURNING {ORDER_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order.id.as_i32())
            .bind(order.version)
            .bind(Json(&order.line_items))
            .bind(order.total)
            .bind(order.pickup.pickup_type)
            .bind(order.pickup.date)
            .bind(order.pickup.time)
            .bind(order.pickup.address.as_deref())
            .bind(order.note.as_deref())
            .bind(order.status)
            .bind(order.printed)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Order::try_from(row),
            None => Err(self.missing_or_conflict(order.id).await),
        }
    }

    async fn delete_order(&self, id: OrderId, version: i64) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM storefront.customer_order WHERE id = $1 AND version = $2")
                .bind(id.as_i32())
                .bind(version)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(self.missing_or_conflict(id).await);
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
