//! Order state machine.
//!
//! ```text
//! pending_review --confirm--> pending --complete--> completed
//!       |  edit                 |  edit, print          |  print
//!       +--delete               +--delete
//! ```
//!
//! Transitions are pure: [`apply`] takes the current order and returns the
//! next one without touching storage.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use kiosk_core::{OrderStatus, PickupType, Price, VariantId};

use super::OrderError;
use crate::models::{LineItem, Order, compute_total};

/// Longest accepted order note, in characters.
pub const MAX_ORDER_NOTE_LENGTH: usize = 500;

/// A line item as submitted by staff when editing an order.
///
/// Kept loose so bad values surface as `OrderError` rather than a decoding
/// failure.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemInput {
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

impl LineItemInput {
    fn validate(self) -> Result<LineItem, OrderError> {
        let quantity = u32::try_from(self.quantity)
            .ok()
            .filter(|q| *q >= 1)
            .ok_or(OrderError::InvalidQuantity)?;
        let unit_price = Price::new(self.unit_price)
            .map_err(|e| OrderError::InvalidLineItem(e.to_string()))?;
        let name = self.name.trim();
        if name.is_empty() {
            return Err(OrderError::InvalidLineItem(
                "name cannot be empty".to_string(),
            ));
        }

        Ok(LineItem {
            variant_id: self.variant_id,
            name: name.to_string(),
            quantity,
            unit_price,
            note: self
                .note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        })
    }
}

/// Something staff do to an order.
#[derive(Debug, Clone)]
pub enum OrderEvent {
    /// Accept the order for preparation.
    Confirm { ship_date: Option<NaiveDate> },
    /// Replace the line items (and optionally the note).
    Edit {
        line_items: Vec<LineItemInput>,
        note: Option<String>,
    },
    /// Hand the order over.
    Complete,
    /// Mark the order as printed.
    Print,
}

impl OrderEvent {
    /// Verb used in error messages.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Confirm { .. } => "confirm",
            Self::Edit { .. } => "edit",
            Self::Complete => "complete",
            Self::Print => "print",
        }
    }
}

/// Result of applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The order changed and must be written back.
    Updated(Order),
    /// Nothing to write (e.g. re-printing).
    Unchanged,
}

/// Normalize an optional note.
///
/// # Errors
///
/// Returns `OrderError::InvalidNote` if the note is too long.
pub fn normalize_note(note: Option<String>) -> Result<Option<String>, OrderError> {
    let note = note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if note
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_ORDER_NOTE_LENGTH)
    {
        return Err(OrderError::InvalidNote {
            max: MAX_ORDER_NOTE_LENGTH,
        });
    }
    Ok(note)
}

/// The error for a line item set whose total does not fit in a price.
#[must_use]
pub fn total_out_of_range() -> OrderError {
    OrderError::InvalidLineItem(format!("order total cannot exceed {}", Price::MAX))
}

/// Apply `event` to `order`.
///
/// # Errors
///
/// Returns `OrderError::InvalidTransition` if the event is not allowed in the
/// order's status, `OrderError::MissingShipDate` when confirming a delivery
/// order without a date, and line item errors for invalid edits.
pub fn apply(order: &Order, event: &OrderEvent) -> Result<Transition, OrderError> {
    let invalid = || OrderError::InvalidTransition {
        status: order.status,
        action: event.action(),
    };

    match (order.status, event) {
        (OrderStatus::PendingReview, OrderEvent::Confirm { ship_date }) => {
            if order.pickup.pickup_type == PickupType::Delivery && ship_date.is_none() {
                return Err(OrderError::MissingShipDate);
            }
            let mut next = order.clone();
            next.status = OrderStatus::Pending;
            if let Some(date) = ship_date {
                next.pickup.date = Some(*date);
            }
            Ok(Transition::Updated(next))
        }

        (
            OrderStatus::PendingReview | OrderStatus::Pending,
            OrderEvent::Edit { line_items, note },
        ) => {
            if line_items.is_empty() {
                return Err(OrderError::InvalidLineItem(
                    "an order needs at least one line item".to_string(),
                ));
            }
            let line_items = line_items
                .iter()
                .cloned()
                .map(LineItemInput::validate)
                .collect::<Result<Vec<_>, _>>()?;

            let mut next = order.clone();
            next.total = compute_total(&line_items).ok_or_else(total_out_of_range)?;
            next.line_items = line_items;
            if note.is_some() {
                next.note = normalize_note(note.clone())?;
            }
            Ok(Transition::Updated(next))
        }

        (OrderStatus::Pending, OrderEvent::Complete) => {
            let mut next = order.clone();
            next.status = OrderStatus::Completed;
            Ok(Transition::Updated(next))
        }

        (OrderStatus::Pending | OrderStatus::Completed, OrderEvent::Print) => {
            if order.printed {
                return Ok(Transition::Unchanged);
            }
            let mut next = order.clone();
            next.printed = true;
            Ok(Transition::Updated(next))
        }

        _ => Err(invalid()),
    }
}

/// Check that `order` may be deleted.
///
/// # Errors
///
/// Returns `OrderError::InvalidTransition` for completed orders.
pub fn check_delete(order: &Order) -> Result<(), OrderError> {
    if order.status.is_terminal() {
        return Err(OrderError::InvalidTransition {
            status: order.status,
            action: "delete",
        });
    }
    Ok(())
}
