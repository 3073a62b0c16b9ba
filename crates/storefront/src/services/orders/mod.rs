//! Checkout and order workflow.
//!
//! Every write is read, pure transition, conditional write. When the
//! conditional write loses a race the operation starts over from a fresh
//! read, up to `max_retries` times.

mod error;
pub mod machine;

pub use error::OrderError;
pub use machine::{LineItemInput, OrderEvent, Transition};

use chrono::NaiveDate;
use tracing::instrument;

use kiosk_core::{IdentityId, OrderId, PriceTier, VariantId};

use crate::db::{
    CartRepository, CatalogRepository, IdentityRepository, OrderRepository, RepositoryError, Store,
};
use crate::models::{CartItem, LineItem, NewOrder, Order, OrderFilter, compute_total};

/// Order service.
pub struct OrderService<'a> {
    store: &'a dyn Store,
    max_retries: u32,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(store: &'a dyn Store, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Turn the identity's cart into a `pending_review` order.
    ///
    /// Prices are resolved at the identity's current tier and frozen into the
    /// order. The order is written and the cart cleared in one transaction;
    /// if the cart changed since it was read, checkout starts over so the
    /// change is included.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::EmptyCart` if the cart is empty,
    /// `OrderError::UnknownVariant` or `OrderError::VariantUnavailable` if a
    /// line cannot be ordered, and `OrderError::StorageConflict` if the cart
    /// kept changing. On any error the cart is left as it was.
    #[instrument(skip(self, note), fields(identity_id = %identity))]
    pub async fn checkout(
        &self,
        identity: IdentityId,
        note: Option<String>,
    ) -> Result<Order, OrderError> {
        let note = machine::normalize_note(note)?;

        for attempt in 0..=self.max_retries {
            let owner = self
                .store
                .identity_by_id(identity)
                .await?
                .ok_or(OrderError::IdentityNotFound)?;
            let snapshot = self.store.cart(identity).await?;
            if snapshot.items.is_empty() {
                return Err(OrderError::EmptyCart);
            }

            let line_items = self.freeze(&snapshot.items, owner.price_tier).await?;
            let order = NewOrder {
                identity_id: identity,
                total: compute_total(&line_items).ok_or_else(machine::total_out_of_range)?,
                line_items,
                pickup: owner.pickup,
                note: note.clone(),
            };

            match self.store.place_order(&order, snapshot.revision).await {
                Ok(placed) => {
                    tracing::info!(
                        order_id = %placed.id,
                        total = %placed.total,
                        lines = placed.line_items.len(),
                        "Order placed"
                    );
                    return Ok(placed);
                }
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "Cart changed during checkout, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!("Checkout retries exhausted");
        Err(OrderError::StorageConflict)
    }

    /// Resolve every cart line at `tier` and copy name and price into a
    /// frozen line item.
    async fn freeze(
        &self,
        items: &[CartItem],
        tier: PriceTier,
    ) -> Result<Vec<LineItem>, OrderError> {
        let ids: Vec<VariantId> = items.iter().map(|item| item.variant_id).collect();
        let variants = self.store.resolve_variants(&ids, tier).await?;

        items
            .iter()
            .map(|item| {
                let variant = variants
                    .iter()
                    .find(|v| v.id == item.variant_id)
                    .ok_or(OrderError::UnknownVariant(item.variant_id))?;
                if !variant.available {
                    return Err(OrderError::VariantUnavailable(item.variant_id));
                }
                Ok(LineItem {
                    variant_id: Some(variant.id),
                    name: variant.name.clone(),
                    quantity: item.quantity,
                    unit_price: variant.unit_price,
                    note: item.note.clone(),
                })
            })
            .collect()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get one order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    pub async fn get(&self, id: OrderId) -> Result<Order, OrderError> {
        self.store.order(id).await?.ok_or(OrderError::NotFound)
    }

    /// List orders matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.orders(filter).await?)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Confirm a `pending_review` order.
    ///
    /// # Errors
    ///
    /// See [`machine::apply`]; also `OrderError::NotFound` and
    /// `OrderError::StorageConflict`.
    pub async fn confirm(
        &self,
        id: OrderId,
        ship_date: Option<NaiveDate>,
    ) -> Result<Order, OrderError> {
        self.transition(id, &OrderEvent::Confirm { ship_date }).await
    }

    /// Replace an order's line items and recompute its total.
    ///
    /// # Errors
    ///
    /// See [`machine::apply`]; also `OrderError::NotFound` and
    /// `OrderError::StorageConflict`.
    pub async fn edit(
        &self,
        id: OrderId,
        line_items: Vec<LineItemInput>,
        note: Option<String>,
    ) -> Result<Order, OrderError> {
        self.transition(id, &OrderEvent::Edit { line_items, note })
            .await
    }

    /// Complete a `pending` order.
    ///
    /// # Errors
    ///
    /// See [`machine::apply`]; also `OrderError::NotFound` and
    /// `OrderError::StorageConflict`.
    pub async fn complete(&self, id: OrderId) -> Result<Order, OrderError> {
        self.transition(id, &OrderEvent::Complete).await
    }

    /// Mark an order printed. Printing again changes nothing.
    ///
    /// # Errors
    ///
    /// See [`machine::apply`]; also `OrderError::NotFound` and
    /// `OrderError::StorageConflict`.
    pub async fn print(&self, id: OrderId) -> Result<Order, OrderError> {
        self.transition(id, &OrderEvent::Print).await
    }

    /// Delete an order that is not completed.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidTransition` for completed orders,
    /// `OrderError::NotFound` if the order is gone, and
    /// `OrderError::StorageConflict` if retries run out.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn delete(&self, id: OrderId) -> Result<(), OrderError> {
        for attempt in 0..=self.max_retries {
            let order = self.get(id).await?;
            machine::check_delete(&order)?;

            match self.store.delete_order(id, order.version).await {
                Ok(()) => {
                    tracing::info!("Order deleted");
                    return Ok(());
                }
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "Order changed before delete, retrying");
                }
                Err(RepositoryError::NotFound) => return Err(OrderError::NotFound),
                Err(e) => return Err(e.into()),
            }
        }

        Err(OrderError::StorageConflict)
    }

    #[instrument(skip(self, event), fields(order_id = %id, action = event.action()))]
    async fn transition(&self, id: OrderId, event: &OrderEvent) -> Result<Order, OrderError> {
        for attempt in 0..=self.max_retries {
            let order = self.get(id).await?;

            let next = match machine::apply(&order, event)? {
                Transition::Unchanged => return Ok(order),
                Transition::Updated(next) => next,
            };

            match self.store.save_order(&next).await {
                Ok(saved) => {
                    tracing::info!(status = %saved.status, "Order updated");
                    return Ok(saved);
                }
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "Order changed concurrently, retrying");
                }
                Err(RepositoryError::NotFound) => return Err(OrderError::NotFound),
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!("Order transition retries exhausted");
        Err(OrderError::StorageConflict)
    }
}
