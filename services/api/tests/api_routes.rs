//! End-to-end tests of the HTTP surface against the in-memory store.

use api_lib::config::Config;
use api_lib::web::{self, state::AppState};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

use station_fit_core::document::{paths, Fields, SetMode};
use station_fit_core::memory::MemoryStore;
use station_fit_core::ports::DocumentStore;

fn test_config() -> Config {
    let vars: HashMap<&str, &str> = [
        ("STATION_FIT_PROJECT_ID", "station1-fit"),
        ("STATION_FIT_API_KEY", "test-key"),
        ("STATION_FIT_AUTH_DOMAIN", "station1-fit.example.org"),
        ("STATION_FIT_STORAGE_BUCKET", "station1-fit-media"),
        ("STATION_FIT_MESSAGING_SENDER_ID", "1234"),
        ("STATION_FIT_APP_ID", "web-app"),
        ("STORE_BACKEND", "memory"),
    ]
    .into_iter()
    .collect();
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

fn app() -> (Router, Arc<MemoryStore>) {
    let memory = Arc::new(MemoryStore::default());
    let state = Arc::new(AppState {
        store: memory.clone(),
        credentials: memory.clone(),
        config: Arc::new(test_config()),
    });
    (web::router(state), memory)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, set_cookie, json)
}

/// Signs up a new account and returns its cookie and user id.
async fn sign_up(app: &Router, email: &str) -> (String, String) {
    let (status, set_cookie, body) = call(
        app,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({ "email": email, "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
    let set_cookie = set_cookie.expect("signup sets a cookie");
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    (cookie, body["userId"].as_str().unwrap().to_string())
}

async fn promote(memory: &MemoryStore, uid: &str, role: &str) {
    let mut fields = Fields::new();
    fields.insert("role".to_string(), json!(role));
    memory
        .set(&paths::profile(uid), fields, SetMode::Merge)
        .await
        .unwrap();
}

#[tokio::test]
async fn signup_opens_a_session_and_creates_a_member_profile() {
    let (app, _) = app();
    let (cookie, uid) = sign_up(&app, "alice@station1.org").await;
    assert!(cookie.starts_with("session="));

    let (status, _, me) = call(&app, Method::GET, "/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], uid.as_str());
    assert_eq!(me["displayName"], "alice");
    assert_eq!(me["role"], "member");
}

#[tokio::test]
async fn duplicate_signup_and_bad_password_are_rejected() {
    let (app, _) = app();
    sign_up(&app, "bob@station1.org").await;

    let (status, _, _) = call(
        &app,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({ "email": "bob@station1.org", "password": "another one" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "bob@station1.org", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let (app, _) = app();
    let (status, _, _) = call(&app, Method::GET, "/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = call(&app, Method::GET, "/standards", Some("session=made-up"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let (app, _) = app();
    let (cookie, _) = sign_up(&app, "carol@station1.org").await;

    let (status, set_cookie, _) = call(&app, Method::POST, "/auth/logout", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(set_cookie.unwrap().contains("Max-Age=0"));

    let (status, _, _) = call(&app, Method::GET, "/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn project_config_is_public() {
    let (app, _) = app();
    let (status, _, body) = call(&app, Method::GET, "/config", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projectId"], "station1-fit");
    assert_eq!(body["appId"], "web-app");
}

#[tokio::test]
async fn empty_catalog_serves_the_built_in_standards() {
    let (app, _) = app();
    let (cookie, _) = sign_up(&app, "dana@station1.org").await;

    let (status, _, page) = call(&app, Method::GET, "/standards?tier=elite", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["tier"], "elite");
    assert_eq!(page["standards"]["usedFallback"], true);
    let titles: Vec<&str> = page["standards"]["view"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles.first(), Some(&"Push-ups"));

    let (status, _, _) = call(&app, Method::GET, "/standards?tier=legendary", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn members_cannot_edit_the_catalog_and_nothing_is_written() {
    let (app, memory) = app();
    let (cookie, _) = sign_up(&app, "erin@station1.org").await;
    let writes_before = memory.write_calls();

    let (status, _, body) = call(
        &app,
        Method::POST,
        "/standards",
        Some(&cookie),
        Some(json!({ "title": "Rope climb", "tier": "elite" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().is_some());
    assert_eq!(memory.write_calls(), writes_before);
}

#[tokio::test]
async fn staff_standard_replaces_the_fallback_list() {
    let (app, memory) = app();
    let (cookie, uid) = sign_up(&app, "frank@station1.org").await;
    promote(&memory, &uid, "admin").await;

    let (status, _, created) = call(
        &app,
        Method::POST,
        "/standards",
        Some(&cookie),
        Some(json!({ "title": "Rope climb", "tier": "elite", "category": "Strength" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (_, _, page) = call(&app, Method::GET, "/standards?tier=elite", Some(&cookie), None).await;
    assert_eq!(page["standards"]["usedFallback"], false);
    let view = page["standards"]["view"].as_array().unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0]["id"], id.as_str());
    assert_eq!(view[0]["title"], "Rope climb");
}

#[tokio::test]
async fn weekly_logs_add_up_on_the_board() {
    let (app, _) = app();
    let (cookie, uid) = sign_up(&app, "gina@station1.org").await;

    for value in [json!(20), json!("15")] {
        let (status, _, body) = call(
            &app,
            Method::POST,
            "/weekly/2024-W07/logs",
            Some(&cookie),
            Some(json!({ "value": value, "unit": "reps" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "log failed: {}", body);
    }

    let (status, _, page) = call(&app, Method::GET, "/weekly/2024-W07", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page["challenge"].is_null());
    let rows = page["board"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["profileId"], uid.as_str());
    assert_eq!(rows[0]["score"], 35.0);
    assert_eq!(rows[0]["rank"], 1);

    let (status, _, _) = call(&app, Method::GET, "/weekly/week-seven", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_scores_are_rejected_before_writing() {
    let (app, memory) = app();
    let (cookie, _) = sign_up(&app, "hank@station1.org").await;
    let writes_before = memory.write_calls();

    let (status, _, body) = call(
        &app,
        Method::PUT,
        "/monthly/2024-02/entry",
        Some(&cookie),
        Some(json!({ "value": "a lot" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "'a lot' is not a number");
    assert_eq!(memory.write_calls(), writes_before);
}

#[tokio::test]
async fn only_the_owner_assigns_roles() {
    let (app, memory) = app();
    let (member, _) = sign_up(&app, "ivy@station1.org").await;
    let (admin, admin_id) = sign_up(&app, "jack@station1.org").await;
    let (owner, owner_id) = sign_up(&app, "kate@station1.org").await;
    let (_, target) = sign_up(&app, "liam@station1.org").await;
    promote(&memory, &admin_id, "admin").await;
    promote(&memory, &owner_id, "owner").await;
    let uri = format!("/profiles/{}/role", target);

    for cookie in [&member, &admin] {
        let writes_before = memory.write_calls();
        let (status, _, body) =
            call(&app, Method::PUT, &uri, Some(cookie), Some(json!({ "role": "mentor" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().is_some());
        assert_eq!(memory.write_calls(), writes_before);
    }

    let (status, _, _) = call(
        &app,
        Method::PUT,
        "/profiles/nobody-here/role",
        Some(&owner),
        Some(json!({ "role": "mentor" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = call(&app, Method::PUT, &uri, Some(&owner), Some(json!({ "role": "mentor" }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, _, roster) = call(&app, Method::GET, "/roster?role=mentor", Some(&owner), None).await;
    let ids: Vec<&str> = roster
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![target.as_str()]);
}

#[tokio::test]
async fn hall_of_fame_and_streak_follow_monthly_entries() {
    let (app, _) = app();
    let (ivy, ivy_id) = sign_up(&app, "ivy@station1.org").await;
    let (jack, _) = sign_up(&app, "jack@station1.org").await;

    for (cookie, month, value) in [
        (&ivy, "2024-04", 10),
        (&ivy, "2024-05", 30),
        (&jack, "2024-05", 20),
    ] {
        let (status, _, body) = call(
            &app,
            Method::PUT,
            &format!("/monthly/{}/entry", month),
            Some(cookie),
            Some(json!({ "value": value, "done": true })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT, "entry failed: {}", body);
    }

    let (status, _, fame) = call(&app, Method::GET, "/hall-of-fame?through=2024-05&months=1", Some(&ivy), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fame["months"], json!(["2024-05"]));
    let rows: Vec<(&str, f64)> = fame["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| (r["name"].as_str().unwrap(), r["score"].as_f64().unwrap()))
        .collect();
    assert_eq!(rows, vec![("ivy", 3.0), ("jack", 2.0)]);

    let (status, _, streak) = call(
        &app,
        Method::GET,
        &format!("/streak/{}?through=2024-05", ivy_id),
        Some(&jack),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(streak["streak"], 2);
    assert_eq!(streak["through"], "2024-05");
}

#[tokio::test]
async fn hall_of_fame_rejects_out_of_range_months() {
    let (app, _) = app();
    let (cookie, _) = sign_up(&app, "mia@station1.org").await;

    for months in ["0", "61", "1000", "1152921504606846976", "-1"] {
        let uri = format!("/hall-of-fame?through=2024-05&months={}", months);
        let (status, _, _) = call(&app, Method::GET, &uri, Some(&cookie), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "months={}", months);
    }

    let (status, _, fame) =
        call(&app, Method::GET, "/hall-of-fame?through=2024-05&months=60", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fame["months"].as_array().unwrap().len(), 60);
}

#[tokio::test]
async fn pinned_messages_come_first() {
    let (app, memory) = app();
    let (cookie, uid) = sign_up(&app, "nora@station1.org").await;
    promote(&memory, &uid, "mentor").await;

    let mut ids = Vec::new();
    for title in ["Shift swap rules", "Hydrate"] {
        let (status, _, created) = call(
            &app,
            Method::POST,
            "/messages",
            Some(&cookie),
            Some(json!({ "title": title, "body": "Read me" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(created["id"].as_str().unwrap().to_string());
    }

    let (status, _, _) = call(
        &app,
        Method::PUT,
        &format!("/messages/{}/pinned", ids[0]),
        Some(&cookie),
        Some(json!({ "pinned": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, messages) = call(&app, Method::GET, "/messages", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<(&str, bool)> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| (m["title"].as_str().unwrap(), m["pinned"].as_bool().unwrap()))
        .collect();
    assert_eq!(titles, vec![("Shift swap rules", true), ("Hydrate", false)]);
}

#[tokio::test]
async fn tier_signoff_is_readable_after_staff_writes_it() {
    let (app, memory) = app();
    let (staff, staff_id) = sign_up(&app, "omar@station1.org").await;
    let (member, member_id) = sign_up(&app, "pia@station1.org").await;
    promote(&memory, &staff_id, "mentor").await;

    let (status, _, _) = call(
        &app,
        Method::PUT,
        &format!("/profiles/{}/tiers/elite", member_id),
        Some(&staff),
        Some(json!({ "done": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, tiers) = call(&app, Method::GET, &format!("/profiles/{}/tiers", member_id), Some(&member), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tiers.as_array().unwrap().len(), 1);
    assert_eq!(tiers[0]["tier"], "elite");
    assert_eq!(tiers[0]["done"], true);

    let (_, _, page) = call(
        &app,
        Method::GET,
        &format!("/standards?tier=elite&profileId={}", member_id),
        Some(&member),
        None,
    )
    .await;
    assert_eq!(page["tierCompleted"], true);
    let (_, _, page) = call(&app, Method::GET, "/standards?tier=elite", Some(&member), None).await;
    assert!(page["tierCompleted"].is_null());
}
