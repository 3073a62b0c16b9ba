//! Cart management and checkout through the HTTP surface.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use kiosk_core::{Phone, PriceTier};
use kiosk_integration_tests::{TestContext, price_at, price_of};
use kiosk_storefront::db::IdentityRepository;

const ALICE: &str = "0911111111";
const BOB: &str = "0922222222";

#[tokio::test]
async fn test_cart_requires_login() {
    let ctx = TestContext::new();
    let response = ctx.get("/cart", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_kind(), "AuthInvalid");

    let response = ctx.post("/checkout", None, json!({})).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_add_view_update_remove() {
    let ctx = TestContext::new();
    let tea = ctx.variant("Oolong tea", "12.50").await;
    let cookie = ctx.login(ALICE).await;

    let added = ctx
        .post("/cart", Some(&cookie), json!({ "variant_id": tea, "quantity": 2 }))
        .await;
    assert_eq!(added.status, StatusCode::CREATED);
    assert_eq!(added.json()["quantity"], 2);
    let item_id = added.json()["id"].as_i64().unwrap();

    // Same variant, same note: quantities merge.
    let again = ctx
        .post("/cart", Some(&cookie), json!({ "variant_id": tea }))
        .await;
    assert_eq!(again.status, StatusCode::CREATED);
    assert_eq!(again.json()["id"].as_i64().unwrap(), item_id);
    assert_eq!(again.json()["quantity"], 3);

    let cart = ctx.get("/cart", Some(&cookie)).await.json();
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart["items"][0]["name"], "Oolong tea");
    assert_eq!(price_at(&cart["items"][0]["unit_price"]), price_of("12.50"));
    assert_eq!(price_at(&cart["total"]), price_of("37.50"));

    let updated = ctx
        .put(
            &format!("/cart/{item_id}"),
            Some(&cookie),
            Some(json!({ "quantity": 1 })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["quantity"], 1);

    let removed = ctx.delete(&format!("/cart/{item_id}"), Some(&cookie)).await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);

    let cart = ctx.get("/cart", Some(&cookie)).await.json();
    assert!(cart["items"].as_array().unwrap().is_empty());
    assert_eq!(price_at(&cart["total"]), price_of("0"));
}

#[tokio::test]
async fn test_different_notes_are_separate_lines() {
    let ctx = TestContext::new();
    let tea = ctx.variant("Oolong tea", "12.50").await;
    let cookie = ctx.login(ALICE).await;

    ctx.post("/cart", Some(&cookie), json!({ "variant_id": tea, "note": "less ice" }))
        .await;
    ctx.post("/cart", Some(&cookie), json!({ "variant_id": tea, "note": "no sugar" }))
        .await;

    let cart = ctx.get("/cart", Some(&cookie)).await.json();
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_add_rejects_bad_input() {
    let ctx = TestContext::new();
    let tea = ctx.variant("Oolong tea", "12.50").await;
    let gone = ctx.variant("Seasonal cake", "80").await;
    ctx.store.set_available(gone, false).await;
    let cookie = ctx.login(ALICE).await;

    let response = ctx
        .post("/cart", Some(&cookie), json!({ "variant_id": 9999 }))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.error_kind(), "NotFound");

    let response = ctx
        .post("/cart", Some(&cookie), json!({ "variant_id": gone }))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.error_kind(), "VariantUnavailable");

    for quantity in [0, -3] {
        let response = ctx
            .post(
                "/cart",
                Some(&cookie),
                json!({ "variant_id": tea, "quantity": quantity }),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error_kind(), "InvalidQuantity");
    }

    let cart = ctx.get("/cart", Some(&cookie)).await.json();
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_merged_quantity_is_capped() {
    let ctx = TestContext::new();
    let tea = ctx.variant("Oolong tea", "12.50").await;
    let cookie = ctx.login(ALICE).await;

    let first = ctx
        .post("/cart", Some(&cookie), json!({ "variant_id": tea, "quantity": 999 }))
        .await;
    assert_eq!(first.status, StatusCode::CREATED);

    let merged = ctx
        .post("/cart", Some(&cookie), json!({ "variant_id": tea, "quantity": 999 }))
        .await;
    assert_eq!(merged.status, StatusCode::BAD_REQUEST);
    assert_eq!(merged.error_kind(), "InvalidQuantity");

    let cart = ctx.get("/cart", Some(&cookie)).await.json();
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart["items"][0]["quantity"], 999);
}

#[tokio::test]
async fn test_cannot_touch_another_cart() {
    let ctx = TestContext::new();
    let tea = ctx.variant("Oolong tea", "12.50").await;
    let alice = ctx.login(ALICE).await;
    let bob = ctx.login(BOB).await;

    let added = ctx
        .post("/cart", Some(&alice), json!({ "variant_id": tea }))
        .await;
    let item_id = added.json()["id"].as_i64().unwrap();

    let response = ctx
        .put(
            &format!("/cart/{item_id}"),
            Some(&bob),
            Some(json!({ "quantity": 5 })),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = ctx.delete(&format!("/cart/{item_id}"), Some(&bob)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let cart = ctx.get("/cart", Some(&alice)).await.json();
    assert_eq!(cart["items"][0]["quantity"], 1);
}

#[tokio::test]
async fn test_checkout_empty_cart() {
    let ctx = TestContext::new();
    let cookie = ctx.login(ALICE).await;

    let response = ctx.post("/checkout", Some(&cookie), json!({})).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.error_kind(), "EmptyCart");
}

#[tokio::test]
async fn test_checkout_places_order_and_clears_cart() {
    let ctx = TestContext::new();
    let tea = ctx.variant("Oolong tea", "12.50").await;
    let cake = ctx.variant("Pineapple cake", "30").await;
    let cookie = ctx.login(ALICE).await;

    ctx.post("/cart", Some(&cookie), json!({ "variant_id": tea, "quantity": 2 }))
        .await;
    ctx.post("/cart", Some(&cookie), json!({ "variant_id": cake }))
        .await;

    let response = ctx
        .post("/checkout", Some(&cookie), json!({ "note": "  call on arrival " }))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let order = response.json();
    assert_eq!(order["status"], "pending_review");
    assert_eq!(order["printed"], false);
    assert_eq!(order["note"], "call on arrival");
    assert_eq!(order["line_items"].as_array().unwrap().len(), 2);
    assert_eq!(price_at(&order["total"]), price_of("55"));
    assert!(order.get("version").is_none());

    let cart = ctx.get("/cart", Some(&cookie)).await.json();
    assert!(cart["items"].as_array().unwrap().is_empty());

    let mine = ctx.get("/account/orders", Some(&cookie)).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.json().as_array().unwrap().len(), 1);
    assert_eq!(mine.json()[0]["id"], order["id"]);
}

#[tokio::test]
async fn test_checkout_without_body() {
    let ctx = TestContext::new();
    let tea = ctx.variant("Oolong tea", "12.50").await;
    let cookie = ctx.login(ALICE).await;
    ctx.post("/cart", Some(&cookie), json!({ "variant_id": tea }))
        .await;

    let response = ctx
        .request(axum::http::Method::POST, "/checkout", Some(&cookie), None)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert!(response.json()["note"].is_null());
}

#[tokio::test]
async fn test_order_prices_are_frozen() {
    let ctx = TestContext::new();
    let tea = ctx.variant("Oolong tea", "12.50").await;
    let cookie = ctx.login(ALICE).await;
    ctx.post("/cart", Some(&cookie), json!({ "variant_id": tea, "quantity": 2 }))
        .await;
    let order = ctx.post("/checkout", Some(&cookie), json!({})).await.json();
    let id = order["id"].as_i64().unwrap();

    ctx.store.set_base_price(tea, price_of("99")).await;

    let reread = ctx.get(&format!("/orders/{id}"), Some(&cookie)).await.json();
    assert_eq!(price_at(&reread["total"]), price_of("25"));
    assert_eq!(
        price_at(&reread["line_items"][0]["unit_price"]),
        price_of("12.50")
    );
}

#[tokio::test]
async fn test_unavailable_at_checkout_keeps_cart() {
    let ctx = TestContext::new();
    let tea = ctx.variant("Oolong tea", "12.50").await;
    let cookie = ctx.login(ALICE).await;
    ctx.post("/cart", Some(&cookie), json!({ "variant_id": tea }))
        .await;
    ctx.store.set_available(tea, false).await;

    let response = ctx.post("/checkout", Some(&cookie), json!({})).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.error_kind(), "VariantUnavailable");

    let cart = ctx.get("/cart", Some(&cookie)).await.json();
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart["items"][0]["available"], false);
    assert_eq!(price_at(&cart["total"]), price_of("0"));

    let mine = ctx.get("/account/orders", Some(&cookie)).await.json();
    assert!(mine.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_tier_pricing_follows_identity() {
    let ctx = TestContext::new();
    let tea = ctx.variant("Oolong tea", "12.50").await;
    ctx.store
        .set_tier_price(tea, PriceTier::Wholesale, price_of("9"))
        .await;
    let cookie = ctx.login(ALICE).await;
    ctx.post("/cart", Some(&cookie), json!({ "variant_id": tea, "quantity": 2 }))
        .await;

    let cart = ctx.get("/cart", Some(&cookie)).await.json();
    assert_eq!(price_at(&cart["total"]), price_of("25"));

    // The tier change applies without logging in again.
    ctx.store
        .set_price_tier(&Phone::parse(ALICE).unwrap(), PriceTier::Wholesale)
        .await
        .unwrap();

    let cart = ctx.get("/cart", Some(&cookie)).await.json();
    assert_eq!(price_at(&cart["total"]), price_of("18"));

    let order = ctx.post("/checkout", Some(&cookie), json!({})).await.json();
    assert_eq!(price_at(&order["total"]), price_of("18"));
}
