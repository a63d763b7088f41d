//! End-to-end tests over the HTTP API with an in-process server.

mod common;

use axum::http::StatusCode;
use parcelhub_core::MeasurementError;
use serde_json::json;

use common::{fixtures, TestConfig, TestFixture, BOB_KEY, CAROL_KEY, MAX_UPLOAD_BYTES};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

fn approx(value: &serde_json::Value, expected: f64) -> bool {
    value
        .as_f64()
        .is_some_and(|v| (v - expected).abs() < 1e-9)
}

fn upload_count(fixture: &TestFixture) -> usize {
    std::fs::read_dir(&fixture.uploads_dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

// ============================================================================
// Health, auth and config
// ============================================================================

#[tokio::test]
async fn test_health_needs_no_credentials() {
    let fixture = TestFixture::new().await;

    let response = fixture.get_as(None, "/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
}

#[tokio::test]
async fn test_protected_routes_require_valid_key() {
    let fixture = TestFixture::new().await;

    let missing = fixture.get_as(None, "/api/v1/batches").await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let wrong = fixture.get_as(Some("nope"), "/api/v1/batches").await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let driver = fixture.get_as(Some(BOB_KEY), "/api/v1/batches").await;
    assert_status!(driver, StatusCode::OK);
}

#[tokio::test]
async fn test_config_is_admin_only_and_hides_keys() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body["auth"], "method", json!("api_key"));
    let text = response.body.to_string();
    assert!(!text.contains("admin-key"));
    assert!(!text.contains("bob-key"));

    let driver = fixture.get_as(Some(BOB_KEY), "/api/v1/config").await;
    assert_eq!(driver.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_raw("/api/v1/parcels", "{not json").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Measurement
// ============================================================================

#[tokio::test]
async fn test_measure_stores_upload_and_returns_draft() {
    let fixture = TestFixture::new().await;
    fixture
        .measurement
        .push_measurement(fixtures::measurement("SPX123ABC", 0.03))
        .await;

    let response = fixture
        .post_multipart("/api/v1/parcels/measure", "image", "label.JPG", JPEG)
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body["measurement"], "external_id", json!("SPX123ABC"));
    assert_json_path!(response.body, "size_class", json!("medium"));

    let image_name = response.body["image_name"].as_str().unwrap().to_string();
    assert!(image_name.ends_with(".jpg"));
    assert_eq!(
        response.body["image_url"],
        json!(format!("/uploads/{}", image_name))
    );

    let calls = fixture.measurement.recorded_calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].file_name, image_name);
    assert_eq!(calls[0].size_bytes, JPEG.len());

    // Served back read-only
    let (status, bytes) = fixture.get_bytes(&format!("/uploads/{}", image_name)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, JPEG);

    // A draft is not a parcel
    let parcels = fixture.get("/api/v1/parcels").await;
    assert_json_path!(parcels.body, "total", json!(0));

    let events = fixture.wait_for_audit("parcel_measured", 1).await;
    assert_eq!(events[0].user_id.as_deref(), Some("admin"));
}

#[tokio::test]
async fn test_measure_without_backend_is_unavailable() {
    let fixture = TestFixture::with_config(TestConfig::without_measurement()).await;

    let response = fixture
        .post_multipart("/api/v1/parcels/measure", "image", "label.jpg", JPEG)
        .await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_measure_backend_failure_leaves_nothing_behind() {
    let fixture = TestFixture::new().await;
    fixture
        .measurement
        .set_next_error(MeasurementError::Backend("HTTP 500".to_string()))
        .await;

    let response = fixture
        .post_multipart("/api/v1/parcels/measure", "image", "label.jpg", JPEG)
        .await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(upload_count(&fixture), 0);
    let batches = fixture.get("/api/v1/batches").await;
    assert_json_path!(batches.body, "total", json!(0));
}

#[tokio::test]
async fn test_measure_rejects_oversized_and_missing_images() {
    let fixture = TestFixture::new().await;

    let big = vec![0u8; MAX_UPLOAD_BYTES + 1];
    let response = fixture
        .post_multipart("/api/v1/parcels/measure", "image", "big.jpg", &big)
        .await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);

    let response = fixture
        .post_multipart("/api/v1/parcels/measure", "photo", "label.jpg", JPEG)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    assert_eq!(fixture.measurement.call_count().await, 0);
    assert_eq!(upload_count(&fixture), 0);
}

// ============================================================================
// Confirmation and allocation
// ============================================================================

#[tokio::test]
async fn test_confirm_creates_medium_batch() {
    let fixture = TestFixture::new().await;

    let allocation = fixture.confirm("P-0001", 0.03).await;

    assert_eq!(allocation["created_batch"], json!(true));
    assert_eq!(allocation["batch"]["size_class"], json!("medium"));
    assert_eq!(allocation["batch"]["status"], json!("in_progress"));
    assert!(approx(&allocation["batch"]["max_volume"], 2.0));
    assert!(approx(&allocation["batch"]["current_volume"], 0.03));
    assert_eq!(allocation["parcel"]["created_by"], json!("admin"));

    let batch_id = allocation["batch"]["id"].as_i64().unwrap();
    let detail = fixture.get(&format!("/api/v1/batches/{}", batch_id)).await;
    assert_status!(detail, StatusCode::OK);
    assert_json_path!(detail.body, "parcel_count", json!(1));
    assert!(approx(&detail.body["load_percent"], 1.5));

    let members = fixture
        .get(&format!("/api/v1/batches/{}/parcels", batch_id))
        .await;
    assert_eq!(members.body["parcels"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_confirm_rejects_bad_input() {
    let fixture = TestFixture::new().await;

    let mut body = serde_json::to_value(fixtures::confirm_request("P-1", -0.01)).unwrap();
    let response = fixture.post("/api/v1/parcels", body.clone()).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    body["volume"] = json!(0.02);
    body["image_name"] = json!("../../etc/passwd");
    let response = fixture.post("/api/v1/parcels", body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let batches = fixture.get("/api/v1/batches").await;
    assert_json_path!(batches.body, "total", json!(0));
}

#[tokio::test]
async fn test_drivers_cannot_confirm() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_as(
            Some(BOB_KEY),
            "/api/v1/parcels",
            serde_json::to_value(fixtures::confirm_request("P-1", 0.03)).unwrap(),
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_full_batch_gets_successor() {
    let fixture = TestFixture::new().await;

    let first = fixture.confirm("P-L1", 3.0).await;
    assert_eq!(first["batch"]["size_class"], json!("large"));
    assert_eq!(first["became_full"], json!(false));

    let second = fixture.confirm("P-L2", 1.6).await;
    assert_eq!(second["became_full"], json!(true));
    assert_eq!(second["batch"]["status"], json!("full"));
    assert_eq!(second["successor"]["status"], json!("in_progress"));

    let full = fixture.get("/api/v1/batches?status=full").await;
    assert_json_path!(full.body, "total", json!(1));

    let open = fixture
        .get("/api/v1/batches?status=in_progress&size_class=large")
        .await;
    assert_json_path!(open.body, "total", json!(1));

    // The next large parcel lands in the successor
    let third = fixture.confirm("P-L3", 0.5).await;
    assert_eq!(third["batch"]["id"], second["successor"]["id"]);
}

#[tokio::test]
async fn test_list_batches_rejects_unknown_filters() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/batches?status=lost").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = fixture.get("/api/v1/batches?size_class=huge").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_parcel_search() {
    let fixture = TestFixture::new().await;
    fixture.confirm("SPXAAA1", 0.02).await;
    fixture.confirm("P-77-1", 0.02).await;

    let response = fixture.get("/api/v1/parcels?search=SPX").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "total", json!(1));
    assert_eq!(response.body["parcels"][0]["external_id"], json!("SPXAAA1"));
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn test_delete_parcel_releases_volume() {
    let fixture = TestFixture::new().await;
    let first = fixture.confirm("P-1", 0.03).await;
    let second = fixture.confirm("P-2", 0.04).await;
    let batch_id = first["batch"]["id"].as_i64().unwrap();

    let parcel_id = second["parcel"]["id"].as_i64().unwrap();
    let response = fixture.delete(&format!("/api/v1/parcels/{}", parcel_id)).await;
    assert_status!(response, StatusCode::OK);

    let batch = fixture.get(&format!("/api/v1/batches/{}", batch_id)).await;
    assert!(approx(&batch.body["current_volume"], 0.03));

    let gone = fixture.get(&format!("/api/v1/parcels/{}", parcel_id)).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_parcel_delete_is_all_or_nothing() {
    let fixture = TestFixture::new().await;
    let parcel = fixture.confirm("P-1", 0.03).await;
    let parcel_id = parcel["parcel"]["id"].as_i64().unwrap();

    let response = fixture
        .post(
            "/api/v1/parcels/bulk-delete",
            json!({ "ids": [parcel_id, 9999] }),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let still_there = fixture.get(&format!("/api/v1/parcels/{}", parcel_id)).await;
    assert_status!(still_there, StatusCode::OK);
}

#[tokio::test]
async fn test_bulk_delete_batches_cascades() {
    let fixture = TestFixture::new().await;
    let allocation = fixture.confirm("P-1", 0.03).await;
    fixture.confirm("P-2", 0.03).await;
    let batch_id = allocation["batch"]["id"].as_i64().unwrap();

    let response = fixture
        .post("/api/v1/batches/bulk-delete", json!({ "ids": [batch_id] }))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["deleted"][0]["parcels_removed"], json!(2));
    let parcels = fixture.get("/api/v1/parcels").await;
    assert_json_path!(parcels.body, "total", json!(0));
}

// ============================================================================
// Vehicles and lifecycle
// ============================================================================

#[tokio::test]
async fn test_vehicle_registry_is_admin_only() {
    let fixture = TestFixture::new().await;
    let vehicle_id = fixture.create_vehicle("V-1", "bob", 2.0).await;

    let listed = fixture.get("/api/v1/vehicles?driver=BOB").await;
    assert_status!(listed, StatusCode::OK);
    assert_eq!(listed.body["vehicles"].as_array().unwrap().len(), 1);

    let denied = fixture.get_as(Some(BOB_KEY), "/api/v1/vehicles").await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let mut spec = serde_json::to_value(fixtures::vehicle_spec("V-1", "bob", 2.0)).unwrap();
    spec["color"] = json!("red");
    let updated = fixture
        .put(&format!("/api/v1/vehicles/{}", vehicle_id), spec)
        .await;
    assert_status!(updated, StatusCode::OK);
    assert_json_path!(updated.body, "color", json!("red"));

    let deleted = fixture
        .delete(&format!("/api/v1/vehicles/{}", vehicle_id))
        .await;
    assert_status!(deleted, StatusCode::OK);
    let missing = fixture
        .get(&format!("/api/v1/vehicles/{}", vehicle_id))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dispatch_without_vehicle_is_rejected() {
    let fixture = TestFixture::new().await;
    let allocation = fixture.confirm("P-1", 0.03).await;
    let batch_id = allocation["batch"]["id"].as_i64().unwrap();

    let response = fixture
        .post(&format!("/api/v1/batches/{}/dispatch", batch_id), json!({}))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let batch = fixture.get(&format!("/api/v1/batches/{}", batch_id)).await;
    assert_json_path!(batch.body, "status", json!("in_progress"));
}

#[tokio::test]
async fn test_vehicle_cannot_serve_two_batches() {
    let fixture = TestFixture::new().await;
    let vehicle_id = fixture.create_vehicle("V-1", "bob", 2.0).await;
    let small = fixture.confirm("P-S", 0.005).await;
    let medium = fixture.confirm("P-M", 0.03).await;

    let first = fixture
        .post(
            &format!("/api/v1/batches/{}/assign", small["batch"]["id"]),
            json!({ "vehicle_id": vehicle_id }),
        )
        .await;
    assert_status!(first, StatusCode::OK);
    assert_eq!(first.body["vehicle"]["status"], json!("reserved"));

    let second = fixture
        .post(
            &format!("/api/v1/batches/{}/assign", medium["batch"]["id"]),
            json!({ "vehicle_id": vehicle_id }),
        )
        .await;
    assert_eq!(second.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_full_mission_lifecycle() {
    let fixture = TestFixture::new().await;
    let vehicle_id = fixture.create_vehicle("V-1", "bob", 2.0).await;
    let allocation = fixture.confirm("P-1", 0.03).await;
    let batch_id = allocation["batch"]["id"].as_i64().unwrap();

    let assigned = fixture
        .post(
            &format!("/api/v1/batches/{}/assign", batch_id),
            json!({ "vehicle_id": vehicle_id }),
        )
        .await;
    assert_status!(assigned, StatusCode::OK);

    let dispatched = fixture
        .post(&format!("/api/v1/batches/{}/dispatch", batch_id), json!({}))
        .await;
    assert_status!(dispatched, StatusCode::OK);
    assert_json_path!(dispatched.body["batch"], "status", json!("ready"));
    assert_eq!(dispatched.body["warnings"][0]["kind"], json!("low_load"));

    // Bob sees the mission, Carol does not
    let missions = fixture.get_as(Some(BOB_KEY), "/api/v1/driver/missions").await;
    assert_status!(missions, StatusCode::OK);
    assert_eq!(missions.body["batches"][0]["id"], json!(batch_id));
    let others = fixture
        .get_as(Some(CAROL_KEY), "/api/v1/driver/missions")
        .await;
    assert!(others.body["batches"].as_array().unwrap().is_empty());

    let start_path = format!("/api/v1/driver/missions/{}/start", batch_id);
    let stolen = fixture.post_as(Some(CAROL_KEY), &start_path, json!({})).await;
    assert_eq!(stolen.status, StatusCode::FORBIDDEN);
    let by_admin = fixture.post(&start_path, json!({})).await;
    assert_eq!(by_admin.status, StatusCode::FORBIDDEN);

    let started = fixture.post_as(Some(BOB_KEY), &start_path, json!({})).await;
    assert_status!(started, StatusCode::OK);
    assert_json_path!(started.body["batch"], "status", json!("transporting"));
    assert_json_path!(started.body["vehicle"], "status", json!("transporting"));

    let completed = fixture
        .post_as(
            Some(BOB_KEY),
            &format!("/api/v1/driver/missions/{}/complete", batch_id),
            json!({}),
        )
        .await;
    assert_status!(completed, StatusCode::OK);
    assert_json_path!(completed.body["batch"], "status", json!("completed"));
    assert!(completed.body["batch"]["completed_at"].is_string());

    let vehicle = fixture
        .get(&format!("/api/v1/vehicles/{}", vehicle_id))
        .await;
    assert_json_path!(vehicle.body, "status", json!("available"));

    // Closing an already completed batch changes nothing
    let finalized = fixture
        .post(&format!("/api/v1/batches/{}/finalize", batch_id), json!({}))
        .await;
    assert_status!(finalized, StatusCode::OK);
    assert_json_path!(finalized.body["batch"], "status", json!("completed"));
}

#[tokio::test]
async fn test_start_requires_ready_batch() {
    let fixture = TestFixture::new().await;
    let vehicle_id = fixture.create_vehicle("V-1", "bob", 2.0).await;
    let allocation = fixture.confirm("P-1", 0.03).await;
    let batch_id = allocation["batch"]["id"].as_i64().unwrap();
    fixture
        .post(
            &format!("/api/v1/batches/{}/assign", batch_id),
            json!({ "vehicle_id": vehicle_id }),
        )
        .await;

    let response = fixture
        .post_as(
            Some(BOB_KEY),
            &format!("/api/v1/driver/missions/{}/start", batch_id),
            json!({}),
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_edit_batch() {
    let fixture = TestFixture::new().await;
    let vehicle_id = fixture.create_vehicle("V-1", "bob", 2.0).await;
    let created = fixture
        .post(
            "/api/v1/batches",
            json!({ "name": "Morning run", "size_class": "small", "vehicle_id": vehicle_id }),
        )
        .await;
    assert_status!(created, StatusCode::CREATED);
    assert_json_path!(created.body["batch"], "name", json!("Morning run (small)"));
    let path = format!("/api/v1/batches/{}", created.body["batch"]["id"]);

    let both = fixture
        .patch(&path, json!({ "vehicle_id": vehicle_id, "clear_vehicle": true }))
        .await;
    assert_eq!(both.status, StatusCode::BAD_REQUEST);

    let edited = fixture
        .patch(
            &path,
            json!({ "name": "Evening run", "max_volume": 0.8, "clear_vehicle": true }),
        )
        .await;
    assert_status!(edited, StatusCode::OK);
    assert_json_path!(edited.body["batch"], "name", json!("Evening run"));
    assert!(approx(&edited.body["batch"]["max_volume"], 0.8));
    assert!(edited.body["batch"]["vehicle_id"].is_null());
    assert_json_path!(edited.body["released_vehicle"], "status", json!("available"));

    let duplicate = fixture
        .post(
            "/api/v1/batches",
            json!({ "name": "Morning run", "size_class": "small" }),
        )
        .await;
    assert_status!(duplicate, StatusCode::CREATED);
    let clash = fixture
        .post(
            "/api/v1/batches",
            json!({ "name": "Morning run", "size_class": "small" }),
        )
        .await;
    assert_eq!(clash.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_bulk_finalize_only_touches_full_batches() {
    let fixture = TestFixture::new().await;
    fixture.confirm("P-L1", 3.0).await;
    let full = fixture.confirm("P-L2", 1.6).await;
    let full_id = full["batch"]["id"].as_i64().unwrap();
    let open_id = full["successor"]["id"].as_i64().unwrap();

    let response = fixture
        .post(
            "/api/v1/batches/bulk-finalize",
            json!({ "ids": [full_id, open_id] }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    let finalized = response.body["finalized"].as_array().unwrap();
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0]["batch"]["id"], json!(full_id));
    assert_eq!(finalized[0]["batch"]["status"], json!("completed"));

    let open = fixture.get(&format!("/api/v1/batches/{}", open_id)).await;
    assert_json_path!(open.body, "status", json!("in_progress"));
}

// ============================================================================
// Analysis, audit and metrics
// ============================================================================

#[tokio::test]
async fn test_analysis_counts() {
    let fixture = TestFixture::new().await;
    fixture.confirm("P-S", 0.005).await;
    fixture.confirm("P-M1", 0.03).await;
    fixture.confirm("P-M2", 0.02).await;

    let response = fixture.get_as(Some(BOB_KEY), "/api/v1/analysis").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "parcels_today", json!(3));
    assert_json_path!(response.body, "parcels_total", json!(3));
    assert_json_path!(response.body, "small_batches", json!(1));
    assert_json_path!(response.body, "medium_batches", json!(1));
    assert_json_path!(response.body, "large_batches", json!(0));
}

#[tokio::test]
async fn test_audit_filter_by_batch() {
    let fixture = TestFixture::new().await;
    let first = fixture.confirm("P-S", 0.005).await;
    fixture.confirm("P-M", 0.03).await;
    let batch_id = first["batch"]["id"].as_i64().unwrap();
    fixture.wait_for_audit("parcel_confirmed", 2).await;

    let response = fixture
        .get(&format!("/api/v1/audit?batch_id={}", batch_id))
        .await;

    assert_status!(response, StatusCode::OK);
    let events = response.body["events"].as_array().unwrap();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e["batch_id"] == json!(batch_id)));
    assert!(events
        .iter()
        .any(|e| e["event_type"] == json!("parcel_confirmed")));

    let driver = fixture.get_as(Some(BOB_KEY), "/api/v1/audit").await;
    assert_eq!(driver.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.confirm("P-1", 0.03).await;

    let (status, bytes) = fixture.get_bytes("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("parcelhub_batches_by_status"));
    assert!(text.contains("parcelhub_parcels_allocated_total"));
    assert!(text.contains("parcelhub_http_requests_total"));
}
