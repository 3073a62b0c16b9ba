//! Order route handlers.
//!
//! Customers read their own orders. Staff list every order and drive the
//! order through review, confirmation, edits, printing and completion.

use askama::Template;
use askama_web::WebTemplate;
use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use chrono::NaiveDate;
use serde::Deserialize;

use kiosk_core::{OrderId, OrderStatus, PickupType};

use crate::db::IdentityRepository;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{RequireIdentity, RequireStaff, has_staff_role};
use crate::models::{Order, OrderFilter};
use crate::services::orders::LineItemInput;
use crate::state::AppState;

use super::extract::{ApiJson, ApiPath, ApiQuery, optional_json};

// =============================================================================
// Request Types
// =============================================================================

/// Query of `GET /orders`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

/// Body of `PUT /orders/{id}/confirm`; may be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmBody {
    #[serde(default)]
    pub ship_date: Option<NaiveDate>,
}

/// Body of `PUT /orders/{id}`.
#[derive(Debug, Deserialize)]
pub struct EditBody {
    pub line_items: Vec<LineItemInput>,
    #[serde(default)]
    pub note: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// One line on a printed ticket.
#[derive(Debug, Clone)]
pub struct TicketLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: String,
    pub subtotal: String,
    pub note: Option<String>,
}

/// Printable order ticket.
#[derive(Template, WebTemplate)]
#[template(path = "orders/ticket.html")]
pub struct TicketTemplate {
    pub order_id: String,
    pub status: String,
    pub placed_at: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub pickup_label: &'static str,
    pub pickup_date: Option<String>,
    pub pickup_time: Option<String>,
    pub address: Option<String>,
    pub lines: Vec<TicketLine>,
    pub total: String,
    pub note: Option<String>,
}

impl TicketTemplate {
    fn new(order: &Order, customer_name: String, customer_phone: String) -> Self {
        Self {
            order_id: order.id.to_string(),
            status: order.status.to_string(),
            placed_at: order.created_at.format("%Y-%m-%d %H:%M").to_string(),
            customer_name,
            customer_phone,
            pickup_label: match order.pickup.pickup_type {
                PickupType::SelfPickup => "Pickup",
                PickupType::Delivery => "Delivery",
            },
            pickup_date: order.pickup.date.map(|d| d.format("%Y-%m-%d").to_string()),
            pickup_time: order.pickup.time.map(|t| t.format("%H:%M").to_string()),
            address: order.pickup.address.clone(),
            lines: order
                .line_items
                .iter()
                .map(|line| TicketLine {
                    name: line.name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price.to_string(),
                    subtotal: line
                        .subtotal()
                        .map(|subtotal| subtotal.to_string())
                        .unwrap_or_default(),
                    note: line.note.clone(),
                })
                .collect(),
            total: order.total.to_string(),
            note: order.note.clone(),
        }
    }
}

// =============================================================================
// Customer Handlers
// =============================================================================

/// List the caller's own orders, newest first.
///
/// GET /account/orders
pub async fn mine(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<Json<Vec<Order>>> {
    let filter = OrderFilter {
        identity_id: Some(identity.id),
        ..OrderFilter::default()
    };
    Ok(Json(state.orders().list(&filter).await?))
}

/// Show one order to its owner or to staff.
///
/// GET /orders/{id}
pub async fn show(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    let order = state.orders().get(id).await?;
    if order.identity_id != identity.id && !has_staff_role(&state, &identity).await? {
        return Err(AppError::Forbidden(
            "This order belongs to someone else".to_string(),
        ));
    }
    Ok(Json(order))
}

// =============================================================================
// Staff Handlers
// =============================================================================

/// List all orders, optionally by status.
///
/// GET /orders?status=pending_review
pub async fn index(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Vec<Order>>> {
    let filter = OrderFilter {
        status: query.status,
        ..OrderFilter::default()
    };
    Ok(Json(state.orders().list(&filter).await?))
}

/// Confirm an order under review.
///
/// PUT /orders/{id}/confirm
pub async fn confirm(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<OrderId>,
    body: Bytes,
) -> Result<Json<Order>> {
    let body: ConfirmBody = optional_json(&body)?;
    let order = state.orders().confirm(id, body.ship_date).await?;
    record_action(&order, "Order confirmed", &staff.id.to_string());
    Ok(Json(order))
}

/// Replace an order's line items and note.
///
/// PUT /orders/{id}
pub async fn update(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(body): ApiJson<EditBody>,
) -> Result<Json<Order>> {
    let order = state.orders().edit(id, body.line_items, body.note).await?;
    record_action(&order, "Order edited", &staff.id.to_string());
    Ok(Json(order))
}

/// Complete a confirmed order.
///
/// PUT /orders/{id}/complete
pub async fn complete(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    let order = state.orders().complete(id).await?;
    record_action(&order, "Order completed", &staff.id.to_string());
    Ok(Json(order))
}

/// Delete an order that is not completed.
///
/// DELETE /orders/{id}
pub async fn delete(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<StatusCode> {
    state.orders().delete(id).await?;
    let order_id = id.to_string();
    let staff_id = staff.id.to_string();
    add_breadcrumb(
        "order",
        "Order deleted",
        Some(&[("order_id", order_id.as_str()), ("staff_id", staff_id.as_str())]),
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Mark an order printed and render its ticket.
///
/// GET /orders/{id}/print
pub async fn print(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<TicketTemplate> {
    let order = state.orders().print(id).await?;
    let (name, phone) = state
        .store()
        .identity_by_id(order.identity_id)
        .await?
        .map_or_else(
            || (String::from("Unknown"), String::new()),
            |owner| (owner.name, owner.phone.into_inner()),
        );
    Ok(TicketTemplate::new(&order, name, phone))
}

fn record_action(order: &Order, message: &str, staff_id: &str) {
    let order_id = order.id.to_string();
    let status = order.status.to_string();
    add_breadcrumb(
        "order",
        message,
        Some(&[
            ("order_id", order_id.as_str()),
            ("status", status.as_str()),
            ("staff_id", staff_id),
        ]),
    );
}
