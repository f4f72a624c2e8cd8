//! API integration tests against a running server
//!
//! Needs the server on localhost:8080, the default `jwt_secret`, and a
//! member row with id `ELIDUNE_TEST_MEMBER_ID` (default 1).

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use elidune_circulation::models::member::{AccountType, Rights, UserClaims, UserRights};

const BASE_URL: &str = "http://localhost:8080/api/v1";
const JWT_SECRET: &str = "change-this-secret-in-production";

fn staff_token() -> String {
    let now = Utc::now().timestamp();
    UserClaims {
        sub: "integration".into(),
        user_id: 9000,
        account_type: AccountType::Librarian,
        rights: UserRights {
            books_rights: Rights::Write,
            borrows_rights: Rights::Write,
        },
        exp: now + 600,
        iat: now,
    }
    .create_token(JWT_SECRET)
    .expect("Failed to sign token")
}

fn member_id() -> i64 {
    std::env::var("ELIDUNE_TEST_MEMBER_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
}

async fn create_book(client: &Client, token: &str, copies: i32) -> i64 {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(token)
        .json(&json!({
            "title": "Integration Test Book",
            "author": "Test Author",
            "total_copies": copies
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.expect("Failed to parse response");
    body["data"]["id"].as_i64().expect("No book ID")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_reaches_database() {
    let response = Client::new()
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore]
async fn test_requires_token() {
    let response = Client::new()
        .post(format!("{}/borrow", BASE_URL))
        .json(&json!({ "user_id": 1, "book_id": 1 }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "NOT_AUTHENTICATED");
}

#[tokio::test]
#[ignore]
async fn test_checkout_renew_return() {
    let client = Client::new();
    let token = staff_token();
    let book_id = create_book(&client, &token, 1).await;

    let response = client
        .post(format!("{}/borrow", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "user_id": member_id(), "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["status"], "active");
    let borrow_id = body["data"]["id"].as_i64().expect("No borrow ID");

    // The only copy is out now.
    let response = client
        .post(format!("{}/borrow", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "user_id": member_id(), "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "NO_COPIES_AVAILABLE");

    let response = client
        .patch(format!("{}/borrow/{}/renew", BASE_URL, borrow_id))
        .bearer_auth(&token)
        .json(&json!({ "reason": "integration test" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["renewal_count"], 1);

    let response = client
        .patch(format!("{}/borrow/{}/return", BASE_URL, borrow_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["status"], "returned");
    assert!(body["data"]["fines"].as_array().is_some_and(|f| f.is_empty()));

    let response = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["data"]["available_copies"], 1);
}

#[tokio::test]
#[ignore]
async fn test_fine_resolves_once() {
    let client = Client::new();
    let token = staff_token();
    let book_id = create_book(&client, &token, 2).await;

    let response = client
        .post(format!("{}/borrow", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "user_id": member_id(), "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    let borrow_id = body["data"]["id"].as_i64().expect("No borrow ID");

    let response = client
        .post(format!("{}/borrow/{}/fines", BASE_URL, borrow_id))
        .bearer_auth(&token)
        .json(&json!({ "type": "damage", "amount": "4.50", "description": "Torn cover" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse response");
    let fine_id = body["data"]["id"].as_i64().expect("No fine ID");

    let pay = format!("{}/borrow/{}/fines/{}/pay", BASE_URL, borrow_id, fine_id);
    let first = client.patch(&pay).bearer_auth(&token).send().await.expect("Failed to send request");
    assert_eq!(first.status(), StatusCode::OK);

    let waive = format!("{}/borrow/{}/fines/{}/waive", BASE_URL, borrow_id, fine_id);
    let second = client.patch(&waive).bearer_auth(&token).send().await.expect("Failed to send request");
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let _ = client
        .patch(format!("{}/borrow/{}/return", BASE_URL, borrow_id))
        .bearer_auth(&token)
        .send()
        .await;
}
