//! API integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use campus_loans_server::{
    api,
    config::AppConfig,
    models::user::{Role, UserClaims},
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::common::{catalogue, device, harness, user};

struct TestApp {
    router: Router,
    secret: String,
}

impl TestApp {
    fn new() -> Self {
        let config = AppConfig::default();
        let secret = config.auth.jwt_secret.clone();
        let h = harness(catalogue(vec![device("d1", 1, 1), device("d2", 1, 1)]));

        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(h.services),
        };

        Self {
            router: api::router(state),
            secret,
        }
    }

    fn token(&self, claims: &UserClaims) -> String {
        claims.create_token(&self.secret).unwrap()
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        as_user: Option<&UserClaims>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(claims) = as_user {
            request = request.header("authorization", format!("Bearer {}", self.token(claims)));
        }
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, body) = app.call("GET", "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.call("GET", "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app.call("GET", "/api/v1/loans", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_reserve_and_conflict() {
    let app = TestApp::new();
    let student = user("u1", Role::Student);

    let (status, body) = app
        .call("POST", "/api/v1/loans", Some(&student), Some(json!({ "deviceId": "d1" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["loanId"].is_string());
    assert_eq!(body["deviceModel"], "Apple MacBook d1");

    let other = user("u2", Role::Student);
    let (status, _) = app
        .call("POST", "/api/v1/loans", Some(&other), Some(json!({ "deviceId": "d1" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call("POST", "/api/v1/loans", Some(&other), Some(json!({ "deviceId": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call("POST", "/api/v1/loans", Some(&other), Some(json!({ "deviceId": "missing" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_desk_operations_require_staff() {
    let app = TestApp::new();
    let student = user("u1", Role::Student);
    let staff = user("desk", Role::Staff);

    let (_, receipt) = app
        .call("POST", "/api/v1/loans", Some(&student), Some(json!({ "deviceId": "d1" })))
        .await;
    let loan_id = receipt["loanId"].as_str().unwrap().to_string();

    let collect = format!("/api/v1/loans/{}/collect", loan_id);
    let (status, _) = app.call("POST", &collect, Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.call("POST", &collect, Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "collected");

    let (status, body) = app.call("POST", &collect, Some(&staff), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "InvalidTransition");

    let ret = format!("/api/v1/loans/{}/return", loan_id);
    let (status, body) = app.call("POST", &ret, Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "returned");

    let (status, _) = app.call("GET", "/api/v1/loans/overdue", Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.call("GET", "/api/v1/loans/overdue", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_students_only_list_their_own_loans() {
    let app = TestApp::new();
    let u1 = user("u1", Role::Student);
    let u2 = user("u2", Role::Student);
    let staff = user("desk", Role::Staff);

    app.call("POST", "/api/v1/loans", Some(&u1), Some(json!({ "deviceId": "d1" })))
        .await;
    app.call("POST", "/api/v1/loans", Some(&u2), Some(json!({ "deviceId": "d2" })))
        .await;

    let (status, body) = app.call("GET", "/api/v1/loans", Some(&u1), None).await;
    assert_eq!(status, StatusCode::OK);
    let loans = body.as_array().unwrap();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0]["userId"], "u1");

    let (status, _) = app
        .call("GET", "/api/v1/loans?userId=u2", Some(&u1), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app.call("GET", "/api/v1/loans", Some(&staff), None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = app
        .call("GET", "/api/v1/loans?deviceId=d2&status=reserved", Some(&staff), None)
        .await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_student_device_filter_applies_to_own_loans() {
    let app = TestApp::new();
    let u1 = user("u1", Role::Student);

    for device_id in ["d1", "d2"] {
        let (status, _) = app
            .call("POST", "/api/v1/loans", Some(&u1), Some(json!({ "deviceId": device_id })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .call("GET", "/api/v1/loans?deviceId=d2", Some(&u1), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let loans = body.as_array().unwrap();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0]["deviceId"], "d2");
    assert_eq!(loans[0]["userId"], "u1");
}

#[tokio::test]
async fn test_cancel_own_reservation() {
    let app = TestApp::new();
    let u1 = user("u1", Role::Student);
    let u2 = user("u2", Role::Student);

    let (_, receipt) = app
        .call("POST", "/api/v1/loans", Some(&u1), Some(json!({ "deviceId": "d1" })))
        .await;
    let uri = format!("/api/v1/loans/{}", receipt["loanId"].as_str().unwrap());

    let (status, _) = app.call("GET", &uri, Some(&u2), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.call("DELETE", &uri, Some(&u2), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.call("DELETE", &uri, Some(&u1), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call("GET", &uri, Some(&u1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_waitlist_and_notifications() {
    let app = TestApp::new();
    let u1 = user("u1", Role::Student);
    let u3 = user("u3", Role::Student);
    let staff = user("desk", Role::Staff);

    let (status, entry) = app
        .call("POST", "/api/v1/waitlist", Some(&u3), Some(json!({ "deviceId": "d1" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["notified"], false);

    let (status, _) = app
        .call("POST", "/api/v1/waitlist", Some(&u3), Some(json!({ "deviceId": "d1" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, receipt) = app
        .call("POST", "/api/v1/loans", Some(&u1), Some(json!({ "deviceId": "d1" })))
        .await;
    let loan_id = receipt["loanId"].as_str().unwrap().to_string();
    app.call("POST", &format!("/api/v1/loans/{}/collect", loan_id), Some(&staff), None)
        .await;
    app.call("POST", &format!("/api/v1/loans/{}/return", loan_id), Some(&staff), None)
        .await;

    let (_, waitlist) = app.call("GET", "/api/v1/waitlist/me", Some(&u3), None).await;
    assert_eq!(waitlist[0]["notified"], true);

    let (status, inbox) = app.call("GET", "/api/v1/notifications", Some(&u3), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox[0]["type"], "device.available");
    assert_eq!(inbox[0]["read"], false);
    let id = inbox[0]["id"].as_str().unwrap().to_string();

    let read = format!("/api/v1/notifications/{}/read", id);
    let (status, _) = app.call("PATCH", &read, Some(&u1), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call("PATCH", &read, Some(&u3), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, inbox) = app.call("GET", "/api/v1/notifications", Some(&u1), None).await;
    assert!(inbox.as_array().unwrap().len() >= 3);
    let (status, _) = app
        .call("POST", "/api/v1/notifications/read-all", Some(&u1), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, inbox) = app.call("GET", "/api/v1/notifications", Some(&u1), None).await;
    assert!(inbox.as_array().unwrap().iter().all(|n| n["read"] == true));
}
