use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};
use slot_cell::router::slot_routes;

fn create_test_app(config: AppConfig) -> Router {
    slot_routes(Arc::new(config))
}

fn slot_json(
    slot_id: Uuid,
    doctor_id: Uuid,
    date: &str,
    start: &str,
    end: &str,
    state: &str,
) -> Value {
    json!({
        "id": slot_id,
        "doctor_id": doctor_id,
        "slot_date": date,
        "start_time": start,
        "end_time": end,
        "duration_minutes": 20,
        "delivery_mode": "telemedicine",
        "state": state,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    })
}

async fn authed_request(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn bearer(user: &TestUser, config: &TestConfig) -> String {
    format!(
        "Bearer {}",
        JwtTestUtils::create_test_token(user, &config.jwt_secret, Some(1))
    )
}

#[tokio::test]
async fn generate_slots_reports_created_and_skipped() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_supabase_url(&mock_server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let doctor_id = Uuid::parse_str(&doctor.id).unwrap();

    // Existing 10:00-10:20 slot collides with the first candidate.
    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_json(Uuid::new_v4(), doctor_id, "2030-01-15", "10:00:00", "10:20:00", "free")
        ])))
        .mount(&mock_server)
        .await;

    let created: Vec<Value> = (0..8)
        .map(|i| {
            slot_json(
                Uuid::new_v4(),
                doctor_id,
                "2030-01-15",
                &format!("10:{:02}:00", 20 + i),
                &format!("10:{:02}:00", 40 + i),
                "free",
            )
        })
        .collect();
    Mock::given(method("POST"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!(created)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("POST")
        .uri("/generate")
        .header("Authorization", bearer(&doctor, &test_config))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "doctor_id": doctor_id,
                "delivery_mode": "telemedicine",
                "start_date": "2030-01-15",
                "end_date": "2030-01-15",
                "start_time": "10:00:00",
                "end_time": "13:00:00",
                "duration_minutes": 20
            })
            .to_string(),
        ))
        .unwrap();

    let (status, body) = authed_request(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created_count"], 8);
    assert_eq!(body["skipped_count"], 1);
}

#[tokio::test]
async fn generate_slots_rejects_past_range() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_supabase_url(&mock_server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let doctor_id = Uuid::parse_str(&doctor.id).unwrap();

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("POST")
        .uri("/generate")
        .header("Authorization", bearer(&doctor, &test_config))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "doctor_id": doctor_id,
                "delivery_mode": "physical",
                "start_date": "2020-01-15",
                "end_date": "2020-01-15",
                "start_time": "10:00:00",
                "end_time": "13:00:00",
                "duration_minutes": 20
            })
            .to_string(),
        ))
        .unwrap();

    let (status, _) = authed_request(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generate_slots_for_another_doctor_is_forbidden() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_supabase_url(&mock_server.uri());
    let patient = TestUser::patient("patient@example.com");

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("POST")
        .uri("/generate")
        .header("Authorization", bearer(&patient, &test_config))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "doctor_id": Uuid::new_v4(),
                "delivery_mode": "physical",
                "start_date": "2030-01-15",
                "end_date": "2030-01-15",
                "start_time": "10:00:00",
                "end_time": "13:00:00",
                "duration_minutes": 20
            })
            .to_string(),
        ))
        .unwrap();

    let (status, _) = authed_request(app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn doctor_day_view_returns_slots_with_states() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_supabase_url(&mock_server.uri());
    let patient = TestUser::patient("patient@example.com");
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_json(Uuid::new_v4(), doctor_id, "2030-01-15", "10:00:00", "10:20:00", "booked"),
            slot_json(Uuid::new_v4(), doctor_id, "2030-01-15", "10:20:00", "10:40:00", "free")
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("GET")
        .uri(format!("/doctors/{}?date=2030-01-15", doctor_id))
        .header("Authorization", bearer(&patient, &test_config))
        .body(Body::empty())
        .unwrap();

    let (status, body) = authed_request(app, request).await;

    assert_eq!(status, StatusCode::OK);
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0]["state"], "booked");
    assert_eq!(slots[1]["state"], "free");
}

#[tokio::test]
async fn specialty_search_spans_matching_doctors() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_supabase_url(&mock_server.uri());
    let patient = TestUser::patient("patient@example.com");
    let specialty_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": doctor_id,
                "full_name": "Dr. Test",
                "specialty_ids": [specialty_id]
            }
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("state", "eq.free"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_json(Uuid::new_v4(), doctor_id, "2030-01-15", "10:00:00", "10:20:00", "free"),
            slot_json(Uuid::new_v4(), doctor_id, "2030-01-16", "09:00:00", "09:20:00", "free")
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("GET")
        .uri(format!("/specialties/{}", specialty_id))
        .header("Authorization", bearer(&patient, &test_config))
        .body(Body::empty())
        .unwrap();

    let (status, body) = authed_request(app, request).await;

    assert_eq!(status, StatusCode::OK);
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0]["doctor_id"], json!(doctor_id));
}

#[tokio::test]
async fn shift_into_occupied_window_is_a_conflict() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_supabase_url(&mock_server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let doctor_id = Uuid::parse_str(&doctor.id).unwrap();
    let slot_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_json(slot_id, doctor_id, "2030-01-15", "10:00:00", "10:20:00", "booked")
        ])))
        .mount(&mock_server)
        .await;

    // The 12:00 window on the target date is already taken.
    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_json(Uuid::new_v4(), doctor_id, "2030-01-16", "12:00:00", "12:20:00", "free")
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/{}/shift", slot_id))
        .header("Authorization", bearer(&doctor, &test_config))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "new_date": "2030-01-16",
                "new_time": "12:00:00"
            })
            .to_string(),
        ))
        .unwrap();

    let (status, _) = authed_request(app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn shift_to_free_window_updates_schedule_in_place() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_supabase_url(&mock_server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let doctor_id = Uuid::parse_str(&doctor.id).unwrap();
    let slot_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_json(slot_id, doctor_id, "2030-01-15", "10:00:00", "10:20:00", "booked")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_json(slot_id, doctor_id, "2030-01-16", "12:00:00", "12:20:00", "booked")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/{}/shift", slot_id))
        .header("Authorization", bearer(&doctor, &test_config))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "new_date": "2030-01-16",
                "new_time": "12:00:00"
            })
            .to_string(),
        ))
        .unwrap();

    let (status, body) = authed_request(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slot"]["id"], json!(slot_id));
    assert_eq!(body["slot"]["slot_date"], "2030-01-16");
    assert_eq!(body["slot"]["state"], "booked");
}

#[tokio::test]
async fn cancelling_slots_twice_is_idempotent() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_supabase_url(&mock_server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let doctor_id = Uuid::parse_str(&doctor.id).unwrap();
    let live_id = Uuid::new_v4();
    let already_cancelled_id = Uuid::new_v4();

    // First sweep flips one slot; the second finds nothing left to change.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_json(live_id, doctor_id, "2030-01-15", "10:00:00", "10:20:00", "cancelled")
        ])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let payload = json!({ "slot_ids": [live_id, already_cancelled_id] }).to_string();

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("POST")
        .uri("/cancel")
        .header("Authorization", bearer(&doctor, &test_config))
        .header("content-type", "application/json")
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, body) = authed_request(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled_count"], 1);

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("POST")
        .uri("/cancel")
        .header("Authorization", bearer(&doctor, &test_config))
        .header("content-type", "application/json")
        .body(Body::from(payload))
        .unwrap();
    let (status, body) = authed_request(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled_count"], 0);
}

#[tokio::test]
async fn converting_a_cancelled_slot_is_rejected() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_supabase_url(&mock_server.uri());
    let doctor = TestUser::doctor("doc@example.com");
    let doctor_id = Uuid::parse_str(&doctor.id).unwrap();
    let slot_id = Uuid::new_v4();

    // The guarded update matches nothing because the slot is cancelled.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_json(slot_id, doctor_id, "2030-01-15", "10:00:00", "10:20:00", "cancelled")
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/{}/delivery-mode", slot_id))
        .header("Authorization", bearer(&doctor, &test_config))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "delivery_mode": "physical" }).to_string()))
        .unwrap();

    let (status, _) = authed_request(app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_supabase_url(&mock_server.uri());

    let app = create_test_app(test_config.to_app_config());
    let request = Request::builder()
        .method("GET")
        .uri(format!("/doctors/{}?date=2030-01-15", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
