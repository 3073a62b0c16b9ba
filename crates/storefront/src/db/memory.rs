//! In-memory [`Store`] for tests and local demos.
//!
//! Mirrors the transactional behaviour of [`super::PgStore`]: cart writes bump
//! the cart revision, `place_order` checks it, and order writes check the
//! version. All state sits behind one async mutex, so every operation is
//! atomic.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use kiosk_core::{
    CartItemId, IdentityId, OrderId, OrderStatus, Phone, Price, PriceTier, Role, VariantId,
};

use super::{
    CartRepository, CatalogRepository, IdentityRepository, OrderRepository, RepositoryError,
    Store,
};
use crate::models::{
    CartItem, CartSnapshot, CatalogVariant, Identity, NewCartItem, NewOrder, Order, OrderFilter,
    ProfileUpdate,
};

#[derive(Debug, Clone)]
struct VariantRow {
    name: String,
    base_price: Price,
    tier_prices: HashMap<PriceTier, Price>,
    available: bool,
}

#[derive(Debug, Default)]
struct State {
    last_id: i32,
    identities: BTreeMap<IdentityId, Identity>,
    variants: BTreeMap<VariantId, VariantRow>,
    cart_items: Vec<CartItem>,
    orders: BTreeMap<OrderId, Order>,
    fail_next_place_order: bool,
    interleaved_add: Option<(IdentityId, NewCartItem)>,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn bump_cart_revision(&mut self, identity: IdentityId) -> Result<(), RepositoryError> {
        let row = self
            .identities
            .get_mut(&identity)
            .ok_or(RepositoryError::NotFound)?;
        row.cart_revision += 1;
        Ok(())
    }

    fn add_cart_item(
        &mut self,
        identity: IdentityId,
        item: &NewCartItem,
        max_quantity: u32,
    ) -> Result<CartItem, RepositoryError> {
        if !self.identities.contains_key(&identity) {
            return Err(RepositoryError::NotFound);
        }

        if let Some(existing) = self.cart_items.iter_mut().find(|row| {
            row.identity_id == identity && row.variant_id == item.variant_id && row.note == item.note
        }) {
            let merged = existing
                .quantity
                .checked_add(item.quantity)
                .filter(|q| *q <= max_quantity)
                .ok_or(RepositoryError::QuantityLimit)?;
            existing.quantity = merged;
            let merged = existing.clone();
            self.bump_cart_revision(identity)?;
            return Ok(merged);
        }

        self.bump_cart_revision(identity)?;

        let row = CartItem {
            id: CartItemId::new(self.next_id()),
            identity_id: identity,
            variant_id: item.variant_id,
            quantity: item.quantity,
            note: item.note.clone(),
        };
        self.cart_items.push(row.clone());
        Ok(row)
    }
}

/// A [`Store`] that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an available catalog variant with a base price.
    pub async fn insert_variant(&self, name: &str, base_price: Price) -> VariantId {
        let mut state = self.state.lock().await;
        let id = VariantId::new(state.next_id());
        state.variants.insert(
            id,
            VariantRow {
                name: name.to_string(),
                base_price,
                tier_prices: HashMap::new(),
                available: true,
            },
        );
        id
    }

    /// Change a variant's base price.
    pub async fn set_base_price(&self, id: VariantId, price: Price) {
        if let Some(row) = self.state.lock().await.variants.get_mut(&id) {
            row.base_price = price;
        }
    }

    /// Define a tier-specific price for a variant.
    pub async fn set_tier_price(&self, id: VariantId, tier: PriceTier, price: Price) {
        if let Some(row) = self.state.lock().await.variants.get_mut(&id) {
            row.tier_prices.insert(tier, price);
        }
    }

    /// Mark a variant available or unavailable.
    pub async fn set_available(&self, id: VariantId, available: bool) {
        if let Some(row) = self.state.lock().await.variants.get_mut(&id) {
            row.available = available;
        }
    }

    /// Make the next `place_order` fail before writing anything.
    pub async fn fail_next_place_order(&self) {
        self.state.lock().await.fail_next_place_order = true;
    }

    /// Add `item` to `identity`'s cart right before the next `place_order`
    /// commits, as if a concurrent request got there first.
    pub async fn interleave_next_place_order(&self, identity: IdentityId, item: NewCartItem) {
        self.state.lock().await.interleaved_add = Some((identity, item));
    }
}

#[async_trait]
impl IdentityRepository for MemoryStore {
    async fn identity_by_id(&self, id: IdentityId) -> Result<Option<Identity>, RepositoryError> {
        Ok(self.state.lock().await.identities.get(&id).cloned())
    }

    async fn upsert_identity(
        &self,
        phone: &Phone,
        profile: &ProfileUpdate,
    ) -> Result<Identity, RepositoryError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if let Some(existing) = state
            .identities
            .values_mut()
            .find(|identity| &identity.phone == phone)
        {
            if let Some(name) = &profile.name {
                existing.name.clone_from(name);
            }
            if let Some(pickup) = &profile.pickup {
                existing.pickup = pickup.clone();
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let id = IdentityId::new(state.next_id());
        let identity = Identity {
            id,
            phone: phone.clone(),
            name: profile
                .name
                .clone()
                .unwrap_or_else(|| phone.as_str().to_string()),
            price_tier: PriceTier::default(),
            role: Role::default(),
            pickup: profile.pickup.clone().unwrap_or_default(),
            cart_revision: 0,
            created_at: now,
            updated_at: now,
        };
        state.identities.insert(id, identity.clone());
        Ok(identity)
    }

    async fn set_role(&self, phone: &Phone, role: Role) -> Result<Identity, RepositoryError> {
        let mut state = self.state.lock().await;
        let identity = state
            .identities
            .values_mut()
            .find(|identity| &identity.phone == phone)
            .ok_or(RepositoryError::NotFound)?;
        identity.role = role;
        identity.updated_at = Utc::now();
        Ok(identity.clone())
    }

    async fn set_price_tier(
        &self,
        phone: &Phone,
        tier: PriceTier,
    ) -> Result<Identity, RepositoryError> {
        let mut state = self.state.lock().await;
        let identity = state
            .identities
            .values_mut()
            .find(|identity| &identity.phone == phone)
            .ok_or(RepositoryError::NotFound)?;
        identity.price_tier = tier;
        identity.updated_at = Utc::now();
        Ok(identity.clone())
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn resolve_variants(
        &self,
        ids: &[VariantId],
        tier: PriceTier,
    ) -> Result<Vec<CatalogVariant>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                state.variants.get(id).map(|row| CatalogVariant {
                    id: *id,
                    name: row.name.clone(),
                    unit_price: row.tier_prices.get(&tier).copied().unwrap_or(row.base_price),
                    available: row.available,
                })
            })
            .collect())
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn cart(&self, identity: IdentityId) -> Result<CartSnapshot, RepositoryError> {
        let state = self.state.lock().await;
        let revision = state
            .identities
            .get(&identity)
            .map(|row| row.cart_revision)
            .ok_or(RepositoryError::NotFound)?;
        let items = state
            .cart_items
            .iter()
            .filter(|row| row.identity_id == identity)
            .cloned()
            .collect();
        Ok(CartSnapshot { items, revision })
    }

    async fn add_cart_item(
        &self,
        identity: IdentityId,
        item: &NewCartItem,
        max_quantity: u32,
    ) -> Result<CartItem, RepositoryError> {
        self.state
            .lock()
            .await
            .add_cart_item(identity, item, max_quantity)
    }

    async fn set_cart_item_quantity(
        &self,
        identity: IdentityId,
        item: CartItemId,
        quantity: u32,
    ) -> Result<CartItem, RepositoryError> {
        let mut state = self.state.lock().await;
        let position = state
            .cart_items
            .iter()
            .position(|row| row.id == item && row.identity_id == identity)
            .ok_or(RepositoryError::NotFound)?;
        state.bump_cart_revision(identity)?;
        let row = state
            .cart_items
            .get_mut(position)
            .ok_or(RepositoryError::NotFound)?;
        row.quantity = quantity;
        Ok(row.clone())
    }

    async fn remove_cart_item(
        &self,
        identity: IdentityId,
        item: CartItemId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        let before = state.cart_items.len();
        state
            .cart_items
            .retain(|row| !(row.id == item && row.identity_id == identity));
        let removed = state.cart_items.len() != before;
        if removed {
            state.bump_cart_revision(identity)?;
        }
        Ok(removed)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn place_order(
        &self,
        order: &NewOrder,
        cart_revision: i64,
    ) -> Result<Order, RepositoryError> {
        let mut state = self.state.lock().await;

        if std::mem::take(&mut state.fail_next_place_order) {
            return Err(RepositoryError::Unavailable(
                "injected place_order failure".to_string(),
            ));
        }
        if let Some((identity, item)) = state.interleaved_add.take() {
            state.add_cart_item(identity, &item, u32::MAX)?;
        }

        let owner = state
            .identities
            .get_mut(&order.identity_id)
            .ok_or(RepositoryError::NotFound)?;
        if owner.cart_revision != cart_revision {
            return Err(RepositoryError::Conflict(format!(
                "cart revision is {}, expected {cart_revision}",
                owner.cart_revision
            )));
        }
        owner.cart_revision += 1;

        let now = Utc::now();
        let placed = Order {
            id: OrderId::new(state.next_id()),
            identity_id: order.identity_id,
            line_items: order.line_items.clone(),
            total: order.total,
            pickup: order.pickup.clone(),
            note: order.note.clone(),
            status: OrderStatus::PendingReview,
            printed: false,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        state.orders.insert(placed.id, placed.clone());
        state
            .cart_items
            .retain(|row| row.identity_id != order.identity_id);
        Ok(placed)
    }

    async fn save_order(&self, order: &Order) -> Result<Order, RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state
            .orders
            .get_mut(&order.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != order.version {
            return Err(RepositoryError::Conflict(format!(
                "order {} is at version {}, expected {}",
                order.id, stored.version, order.version
            )));
        }
        *stored = Order {
            version: order.version + 1,
            updated_at: Utc::now(),
            ..order.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_order(&self, id: OrderId, version: i64) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state.orders.get(&id).ok_or(RepositoryError::NotFound)?;
        if stored.version != version {
            return Err(RepositoryError::Conflict(format!(
                "order {id} is at version {}, expected {version}",
                stored.version
            )));
        }
        state.orders.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
