//! End-to-end tests for the portal's HTTP surface.

#![allow(clippy::unwrap_used)]

use axum::http::{StatusCode, header};
use serde_json::json;

use courier_portal::db::Store;
use courier_portal::models::NewUser;
use courier_portal_core::{Email, IdentityId, OrderStatus, UserRole};
use courier_portal_integration_tests::{ISSUER_URL, STORAGE_BASE_URL, TestApp, identity, seed_order};

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let res = app.get("/health", None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!("ok"));

    let res = app.get("/health/ready", None).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let app = TestApp::new();
    let res = app.get("/", None).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.headers["x-frame-options"], "DENY");
    assert_eq!(res.headers["x-content-type-options"], "nosniff");
    assert!(res.headers.contains_key(header::CONTENT_SECURITY_POLICY));
    assert!(res.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_delivery_api_requires_session() {
    let app = TestApp::new();

    for uri in ["/api/delivery/orders", "/api/delivery/profile", "/api/delivery/history"] {
        let res = app.get(uri, None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(res.error(), "Unauthorized");
    }

    let res = app.post("/api/auth/sync", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_delivery_api_requires_sync() {
    let app = TestApp::new();
    let cookie = app.sign_in(&identity("idp|unsynced", "unsynced@example.com")).await;

    let res = app.get("/api/delivery/orders", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.error(), "Agent profile not found");
}

#[tokio::test]
async fn test_sync_messages() {
    let app = TestApp::new();
    let me = identity("idp|sync", "sync@example.com");
    let cookie = app.sign_in(&me).await;

    let res = app.post("/api/auth/sync", Some(&cookie), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["message"], "Account created successfully");
    assert_eq!(res.body["agent"]["email"], "sync@example.com");

    let res = app.post("/api/auth/sync", Some(&cookie), None).await;
    assert_eq!(res.body["message"], "User already synced");
}

#[tokio::test]
async fn test_sync_rejects_other_roles() {
    let app = TestApp::new();
    app.store
        .seed_user(&NewUser {
            email: Email::parse("chemist@example.com").unwrap(),
            name: None,
            role: UserRole::Pharmacist,
            identity_id: Some(IdentityId::new("idp|chemist")),
            is_verified: true,
        })
        .unwrap();
    let cookie = app.sign_in(&identity("idp|chemist", "chemist@example.com")).await;

    let res = app.post("/api/auth/sync", Some(&cookie), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert!(res.error().contains("delivery agents only"));
    assert!(res.error().contains("pharmacist"));
}

#[tokio::test]
async fn test_inactive_agent_is_refused() {
    let app = TestApp::new();
    let me = identity("idp|benched", "benched@example.com");
    let cookie = app.sign_in_agent(&me).await;

    app.store.set_agent_active(&me.email, false).await.unwrap();

    let res = app.get("/api/delivery/orders", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.error(), "Agent account is inactive");
}

#[tokio::test]
async fn test_accept_flow_over_http() {
    let app = TestApp::new();
    let order_id = seed_order(&app.store, OrderStatus::Paid);
    let alice = app.sign_in_agent(&identity("idp|alice", "alice@example.com")).await;
    let bob = app.sign_in_agent(&identity("idp|bob", "bob@example.com")).await;

    let res = app.get("/api/delivery/orders", Some(&alice)).await;
    assert_eq!(res.status, StatusCode::OK);
    let orders = res.body["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["id"], order_id.to_string());
    assert_eq!(orders[0]["total_price"], 24.5);
    assert_eq!(orders[0]["total_items"], 3);
    assert_eq!(orders[0]["delivery_address"], "3 Canal Walk, Leeds, LS1 4AB");

    let accept = format!("/api/delivery/orders/{order_id}/accept");
    let res = app.post(&accept, Some(&alice), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "Order accepted successfully");
    assert_eq!(res.body["assignment"]["order_id"], order_id.to_string());

    let res = app.post(&accept, Some(&bob), None).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.error(), "Order is no longer available");

    let res = app.get("/api/delivery/orders", Some(&bob)).await;
    assert!(res.body["orders"].as_array().unwrap().is_empty());

    let res = app.get("/api/delivery/accepted", Some(&alice)).await;
    let accepted = res.body["orders"].as_array().unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0]["status"], "accepted");
    assert!(accepted[0]["assigned_at"].is_string());
}

#[tokio::test]
async fn test_dispatch_and_complete_over_http() {
    let app = TestApp::new();
    let order_id = seed_order(&app.store, OrderStatus::Pending);
    let owner = app.sign_in_agent(&identity("idp|owner", "owner@example.com")).await;
    let other = app.sign_in_agent(&identity("idp|other", "other@example.com")).await;

    app.post(&format!("/api/delivery/orders/{order_id}/accept"), Some(&owner), None)
        .await;

    let complete = format!("/api/delivery/orders/{order_id}/complete");
    let res = app.post(&complete, Some(&other), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.error(), "Order is not assigned to you");

    let res = app
        .post(&format!("/api/delivery/orders/{order_id}/dispatch"), Some(&owner), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["order"]["status"], "out_for_delivery");

    let res = app.post(&complete, Some(&owner), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["already_delivered"], false);

    let res = app.post(&complete, Some(&owner), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["already_delivered"], true);

    let res = app.get("/api/delivery/delivered", Some(&owner)).await;
    let delivered = res.body["orders"].as_array().unwrap();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0]["delivered_at"].is_string());

    let res = app.get("/api/delivery/history", Some(&owner)).await;
    assert_eq!(res.body["orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ignore_over_http() {
    let app = TestApp::new();
    let order_id = seed_order(&app.store, OrderStatus::Paid);
    let cookie = app.sign_in_agent(&identity("idp|picky", "picky@example.com")).await;

    let ignore = format!("/api/delivery/orders/{order_id}/ignore");
    for _ in 0..2 {
        let res = app.post(&ignore, Some(&cookie), None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["message"], "Order ignored");
    }

    let res = app.get("/api/delivery/orders", Some(&cookie)).await;
    assert!(res.body["orders"].as_array().unwrap().is_empty());

    let res = app.get("/api/delivery/ignored", Some(&cookie)).await;
    let ignored = res.body["orders"].as_array().unwrap();
    assert_eq!(ignored.len(), 1);
    assert_eq!(ignored[0]["status"], "paid");
    assert!(ignored[0]["ignored_at"].is_string());
}

#[tokio::test]
async fn test_order_detail_and_not_found() {
    let app = TestApp::new();
    let order_id = seed_order(&app.store, OrderStatus::Paid);
    let cookie = app.sign_in_agent(&identity("idp|look", "look@example.com")).await;

    let res = app
        .get(&format!("/api/delivery/orders/{order_id}"), Some(&cookie))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["items"].as_array().unwrap().len(), 2);

    let unknown = courier_portal_core::OrderId::generate();
    let res = app
        .get(&format!("/api/delivery/orders/{unknown}"), Some(&cookie))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.error(), "Order not found");

    let res = app
        .post("/api/delivery/orders/not-a-uuid/accept", Some(&cookie), None)
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_edit_and_stats() {
    let app = TestApp::new();
    let cookie = app.sign_in_agent(&identity("idp|edit", "edit@example.com")).await;

    let res = app
        .put(
            "/api/delivery/profile",
            Some(&cookie),
            json!({
                "name": "Edited Rider",
                "phone": "+44 (0) 7700 900123",
                "age": "34",
                "vehicle_number": "LS21 ABC"
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    assert_eq!(res.body["message"], "Profile updated successfully");
    assert_eq!(res.body["agent"]["age"], 34);

    let res = app.get("/api/delivery/profile", Some(&cookie)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["agent"]["name"], "Edited Rider");
    assert_eq!(res.body["agent"]["vehicle_number"], "LS21 ABC");
    assert_eq!(res.body["stats"]["total_accepted"], 0);

    let res = app
        .put("/api/delivery/profile", Some(&cookie), json!({ "age": 12 }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app.put("/api/delivery/profile", Some(&cookie), json!({})).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_profile_image_upload() {
    let app = TestApp::new();
    let me = identity("idp|photo", "photo@example.com");
    let cookie = app.sign_in_agent(&me).await;

    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    let res = app
        .upload("/api/delivery/profile/upload", &cookie, "image/png", &png)
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    assert_eq!(res.body["message"], "Profile image uploaded successfully");

    let url = res.body["url"].as_str().unwrap();
    assert!(url.starts_with(&format!("{STORAGE_BASE_URL}/profile-images/idp|photo_")));
    assert!(url.ends_with(".png"));

    let paths = app.storage.paths();
    assert_eq!(paths.len(), 1);
    assert_eq!(app.storage.get(&paths[0]).unwrap().body, png);

    let agent = app.store.agent_by_identity(&me.id).await.unwrap().unwrap();
    assert_eq!(agent.profile_image_url.as_deref(), Some(url));

    let res = app
        .upload("/api/delivery/profile/upload", &cookie, "application/pdf", b"%PDF")
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.storage.paths().len(), 1);
}

#[tokio::test]
async fn test_login_redirects_to_provider() {
    let app = TestApp::new();
    let res = app.get("/auth/login", None).await;

    assert_eq!(res.status, StatusCode::SEE_OTHER);
    let location = res.headers[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&format!("{ISSUER_URL}/oauth2/auth?")));
    assert!(location.contains("client_id=portal-tests"));
    assert!(location.contains("state="));
    assert!(res.headers.contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_callback_rejects_bad_state() {
    let app = TestApp::new();

    let res = app.get("/auth/callback?code=abc&state=forged", None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error(), "Invalid state parameter");

    let res = app.get("/auth/callback?error=access_denied", None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unauthorized_landing() {
    let app = TestApp::new();
    let res = app.get("/unauthorized", None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert!(res.error().contains("delivery agents only"));
}
