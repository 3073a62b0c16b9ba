//! Cart and checkout route handlers.
//!
//! Every handler is scoped to the session identity; cart item IDs from other
//! carts behave as if they did not exist.

use axum::{Json, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;

use kiosk_core::{CartItemId, PriceTier, VariantId};

use crate::db::IdentityRepository;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireIdentity;
use crate::models::CurrentIdentity;
use crate::services::cart::CartView;
use crate::state::AppState;

use super::extract::{ApiJson, ApiPath, optional_json};

/// Body of `POST /cart`.
#[derive(Debug, Deserialize)]
pub struct AddItemBody {
    pub variant_id: VariantId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub note: Option<String>,
}

const fn default_quantity() -> i64 {
    1
}

/// Body of `PUT /cart/{id}`.
#[derive(Debug, Deserialize)]
pub struct SetQuantityBody {
    pub quantity: i64,
}

/// Body of `POST /checkout`; the whole body may be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutBody {
    #[serde(default)]
    pub note: Option<String>,
}

/// The tier stored for the identity, which staff may have changed since the
/// session was issued.
async fn current_tier(state: &AppState, identity: &CurrentIdentity) -> Result<PriceTier> {
    Ok(state
        .store()
        .identity_by_id(identity.id)
        .await?
        .map_or(identity.price_tier, |stored| stored.price_tier))
}

/// Show the cart with current prices.
///
/// GET /cart
pub async fn show(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
) -> Result<Json<CartView>> {
    let tier = current_tier(&state, &identity).await?;
    Ok(Json(state.carts().view(identity.id, tier).await?))
}

/// Add a variant to the cart.
///
/// POST /cart
pub async fn add(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    ApiJson(body): ApiJson<AddItemBody>,
) -> Result<impl IntoResponse> {
    let tier = current_tier(&state, &identity).await?;
    let item = state
        .carts()
        .add(identity.id, tier, body.variant_id, body.quantity, body.note)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Replace the quantity of a cart line.
///
/// PUT /cart/{id}
pub async fn update(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    ApiPath(item_id): ApiPath<CartItemId>,
    ApiJson(body): ApiJson<SetQuantityBody>,
) -> Result<impl IntoResponse> {
    let item = state
        .carts()
        .set_quantity(identity.id, item_id, body.quantity)
        .await?;
    Ok(Json(item))
}

/// Remove a cart line.
///
/// DELETE /cart/{id}
pub async fn remove(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    ApiPath(item_id): ApiPath<CartItemId>,
) -> Result<StatusCode> {
    state.carts().remove(identity.id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Turn the cart into an order.
///
/// POST /checkout
pub async fn checkout(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let body: CheckoutBody = optional_json(&body)?;

    let order = state.orders().checkout(identity.id, body.note).await?;

    let order_id = order.id.to_string();
    add_breadcrumb("order", "Order placed", Some(&[("order_id", order_id.as_str())]));

    Ok((StatusCode::CREATED, Json(order)))
}
