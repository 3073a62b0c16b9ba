//! Staff order workflow through the HTTP surface.

#![allow(clippy::unwrap_used)]

use axum::http::{StatusCode, header};
use serde_json::{Value, json};

use kiosk_core::Role;
use kiosk_integration_tests::{TestContext, price_at, price_of};

const CUSTOMER: &str = "0911111111";
const OTHER: &str = "0922222222";
const STAFF: &str = "0933333333";

/// A customer with one placed order, plus a staff session.
struct Shop {
    ctx: TestContext,
    customer: String,
    staff: String,
    order: Value,
}

impl Shop {
    fn order_id(&self) -> i64 {
        self.order["id"].as_i64().unwrap()
    }

    fn uri(&self, suffix: &str) -> String {
        format!("/orders/{}{suffix}", self.order_id())
    }
}

async fn place_order(ctx: &TestContext, cookie: &str) -> Value {
    let tea = ctx.variant("Oolong tea", "12.50").await;
    ctx.post("/cart", Some(cookie), json!({ "variant_id": tea, "quantity": 2 }))
        .await;
    let response = ctx.post("/checkout", Some(cookie), json!({})).await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
    response.json()
}

async fn shop() -> Shop {
    let ctx = TestContext::new();
    let customer = ctx.login(CUSTOMER).await;
    let staff = ctx.login_staff(STAFF).await;
    let order = place_order(&ctx, &customer).await;
    Shop {
        ctx,
        customer,
        staff,
        order,
    }
}

/// Log in with a delivery profile.
async fn login_for_delivery(ctx: &TestContext, phone: &str) -> String {
    let code = ctx.request_code(phone).await;
    let response = ctx
        .post(
            "/login/verify-code",
            None,
            json!({
                "phone": phone,
                "code": code,
                "pickup": { "pickup_type": "delivery", "address": "No. 7, Lane 3, Taipei" }
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    response.session_cookie().unwrap()
}

#[tokio::test]
async fn test_staff_routes_need_staff() {
    let shop = shop().await;

    let anonymous = shop.ctx.get("/orders", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.error_kind(), "AuthInvalid");

    let customer = shop.ctx.get("/orders", Some(&shop.customer)).await;
    assert_eq!(customer.status, StatusCode::FORBIDDEN);
    assert_eq!(customer.error_kind(), "Forbidden");

    let confirm = shop
        .ctx
        .put(&shop.uri("/confirm"), Some(&shop.customer), None)
        .await;
    assert_eq!(confirm.status, StatusCode::FORBIDDEN);

    let delete = shop.ctx.delete(&shop.uri(""), Some(&shop.customer)).await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);

    let staff = shop.ctx.get("/orders", Some(&shop.staff)).await;
    assert_eq!(staff.status, StatusCode::OK);
    assert_eq!(staff.json().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_revoked_staff_loses_access_immediately() {
    let shop = shop().await;
    shop.ctx.set_role(STAFF, Role::Customer).await;

    let list = shop.ctx.get("/orders", Some(&shop.staff)).await;
    assert_eq!(list.status, StatusCode::FORBIDDEN);
    assert_eq!(list.error_kind(), "Forbidden");

    let show = shop.ctx.get(&shop.uri(""), Some(&shop.staff)).await;
    assert_eq!(show.status, StatusCode::FORBIDDEN);

    shop.ctx.set_role(CUSTOMER, Role::Staff).await;
    let promoted = shop.ctx.get("/orders", Some(&shop.customer)).await;
    assert_eq!(promoted.status, StatusCode::OK);
}

#[tokio::test]
async fn test_order_visibility() {
    let shop = shop().await;
    let other = shop.ctx.login(OTHER).await;

    let own = shop.ctx.get(&shop.uri(""), Some(&shop.customer)).await;
    assert_eq!(own.status, StatusCode::OK);

    let staff = shop.ctx.get(&shop.uri(""), Some(&shop.staff)).await;
    assert_eq!(staff.status, StatusCode::OK);

    let stranger = shop.ctx.get(&shop.uri(""), Some(&other)).await;
    assert_eq!(stranger.status, StatusCode::FORBIDDEN);

    let theirs = shop.ctx.get("/account/orders", Some(&other)).await;
    assert!(theirs.json().as_array().unwrap().is_empty());

    let missing = shop.ctx.get("/orders/9999", Some(&shop.staff)).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_confirm_then_complete() {
    let shop = shop().await;

    let confirmed = shop.ctx.put(&shop.uri("/confirm"), Some(&shop.staff), None).await;
    assert_eq!(confirmed.status, StatusCode::OK);
    assert_eq!(confirmed.json()["status"], "pending");

    let again = shop.ctx.put(&shop.uri("/confirm"), Some(&shop.staff), None).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.error_kind(), "InvalidTransition");

    let completed = shop
        .ctx
        .put(&shop.uri("/complete"), Some(&shop.staff), None)
        .await;
    assert_eq!(completed.status, StatusCode::OK);
    assert_eq!(completed.json()["status"], "completed");

    let again = shop
        .ctx
        .put(&shop.uri("/complete"), Some(&shop.staff), None)
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.error_kind(), "InvalidTransition");

    let delete = shop.ctx.delete(&shop.uri(""), Some(&shop.staff)).await;
    assert_eq!(delete.status, StatusCode::CONFLICT);

    let edit = shop
        .ctx
        .put(
            &shop.uri(""),
            Some(&shop.staff),
            Some(json!({
                "line_items": [{ "name": "Tea", "quantity": 1, "unit_price": "10" }]
            })),
        )
        .await;
    assert_eq!(edit.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_complete_requires_confirmation() {
    let shop = shop().await;
    let response = shop
        .ctx
        .put(&shop.uri("/complete"), Some(&shop.staff), None)
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.error_kind(), "InvalidTransition");
}

#[tokio::test]
async fn test_delivery_confirm_needs_ship_date() {
    let ctx = TestContext::new();
    let customer = login_for_delivery(&ctx, CUSTOMER).await;
    let staff = ctx.login_staff(STAFF).await;
    let order = place_order(&ctx, &customer).await;
    assert_eq!(order["pickup"]["pickup_type"], "delivery");
    let uri = format!("/orders/{}/confirm", order["id"]);

    let response = ctx.put(&uri, Some(&staff), None).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.error_kind(), "MissingShipDate");

    let response = ctx
        .put(&uri, Some(&staff), Some(json!({ "ship_date": "2026-11-02" })))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "pending");
    assert_eq!(response.json()["pickup"]["date"], "2026-11-02");
}

#[tokio::test]
async fn test_edit_recomputes_total() {
    let shop = shop().await;
    assert_eq!(price_at(&shop.order["total"]), price_of("25"));

    let response = shop
        .ctx
        .put(
            &shop.uri(""),
            Some(&shop.staff),
            Some(json!({
                "line_items": [
                    { "name": "Oolong tea", "quantity": 3, "unit_price": "12.50" },
                    { "name": "Delivery fee", "quantity": 1, "unit_price": "60" }
                ],
                "note": "customer called"
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    let order = response.json();
    assert_eq!(order["line_items"].as_array().unwrap().len(), 2);
    assert_eq!(price_at(&order["total"]), price_of("97.50"));
    assert_eq!(order["note"], "customer called");
    assert_eq!(order["status"], "pending_review");

    // Without a note the existing one stays.
    let response = shop
        .ctx
        .put(
            &shop.uri(""),
            Some(&shop.staff),
            Some(json!({
                "line_items": [{ "name": "Oolong tea", "quantity": 1, "unit_price": "12.50" }]
            })),
        )
        .await;
    assert_eq!(response.json()["note"], "customer called");
    assert_eq!(price_at(&response.json()["total"]), price_of("12.50"));
}

#[tokio::test]
async fn test_edit_rejects_bad_lines() {
    let shop = shop().await;

    let response = shop
        .ctx
        .put(
            &shop.uri(""),
            Some(&shop.staff),
            Some(json!({
                "line_items": [{ "name": "Oolong tea", "quantity": 0, "unit_price": "12.50" }]
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_kind(), "InvalidQuantity");

    let response = shop
        .ctx
        .put(&shop.uri(""), Some(&shop.staff), Some(json!({ "line_items": [] })))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_kind(), "InvalidLineItem");

    let response = shop
        .ctx
        .put(
            &shop.uri(""),
            Some(&shop.staff),
            Some(json!({
                "line_items": [{ "name": "Oolong tea", "quantity": 1, "unit_price": "-1" }]
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_kind(), "InvalidLineItem");

    // Sub-cent prices and totals past the stored range.
    for (quantity, unit_price) in [
        (3, "0.333"),
        (2, "9999999999.99"),
        (2, "79228162514264337593543950335"),
    ] {
        let response = shop
            .ctx
            .put(
                &shop.uri(""),
                Some(&shop.staff),
                Some(json!({
                    "line_items": [
                        { "name": "Oolong tea", "quantity": quantity, "unit_price": unit_price }
                    ]
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{unit_price}");
        assert_eq!(response.error_kind(), "InvalidLineItem");
    }

    let unchanged = shop.ctx.get(&shop.uri(""), Some(&shop.staff)).await.json();
    assert_eq!(price_at(&unchanged["total"]), price_of("25"));
}

#[tokio::test]
async fn test_print_ticket() {
    let shop = shop().await;

    let early = shop.ctx.get(&shop.uri("/print"), Some(&shop.staff)).await;
    assert_eq!(early.status, StatusCode::CONFLICT);
    assert_eq!(early.error_kind(), "InvalidTransition");

    shop.ctx
        .put(&shop.uri("/confirm"), Some(&shop.staff), None)
        .await;

    let ticket = shop.ctx.get(&shop.uri("/print"), Some(&shop.staff)).await;
    assert_eq!(ticket.status, StatusCode::OK);
    let content_type = ticket
        .headers
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/html"));
    let html = ticket.text();
    assert!(html.contains("Oolong tea"));
    assert!(html.contains(CUSTOMER));

    let order = shop.ctx.get(&shop.uri(""), Some(&shop.staff)).await.json();
    assert_eq!(order["printed"], true);

    // Printing again is allowed and changes nothing.
    let again = shop.ctx.get(&shop.uri("/print"), Some(&shop.staff)).await;
    assert_eq!(again.status, StatusCode::OK);
    let reread = shop.ctx.get(&shop.uri(""), Some(&shop.staff)).await.json();
    assert_eq!(reread["updated_at"], order["updated_at"]);
}

#[tokio::test]
async fn test_delete_order() {
    let shop = shop().await;

    let response = shop.ctx.delete(&shop.uri(""), Some(&shop.staff)).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = shop.ctx.get(&shop.uri(""), Some(&shop.staff)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = shop.ctx.delete(&shop.uri(""), Some(&shop.staff)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let mine = shop.ctx.get("/account/orders", Some(&shop.customer)).await;
    assert!(mine.json().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let shop = shop().await;
    let second = place_order(&shop.ctx, &shop.customer).await;
    shop.ctx
        .put(&shop.uri("/confirm"), Some(&shop.staff), None)
        .await;

    let pending = shop
        .ctx
        .get("/orders?status=pending", Some(&shop.staff))
        .await
        .json();
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["id"], shop.order["id"]);

    let review = shop
        .ctx
        .get("/orders?status=pending_review", Some(&shop.staff))
        .await
        .json();
    assert_eq!(review.as_array().unwrap().len(), 1);
    assert_eq!(review[0]["id"], second["id"]);

    let all = shop.ctx.get("/orders", Some(&shop.staff)).await.json();
    assert_eq!(all.as_array().unwrap().len(), 2);
    // Newest first.
    assert_eq!(all[0]["id"], second["id"]);

    let bad = shop.ctx.get("/orders?status=shipped", Some(&shop.staff)).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad.error_kind(), "BadRequest");
}
