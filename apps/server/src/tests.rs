use std::sync::Arc;

use actix_web::{App, http::StatusCode, test, web};
use serde_json::Value;
use vigil_service::dashboard::{Dashboard, UpDownStats, UptimeBucket};
use vigil_service::database::{self, Database, Monitor};
use vigil_service::monitoring::{CheckResult, Status};

use crate::routes;

async fn seeded_dashboard(dir: &tempfile::TempDir) -> web::Data<Dashboard> {
    let path = dir.path().join("server-test.db");
    let database = database::open(&path.to_string_lossy(), 2).await.unwrap();

    let up = database.save_monitor(&Monitor::new("https://up.example", Some("https"))).await.unwrap();
    let down = database.save_monitor(&Monitor::new("10.0.0.2:22", None)).await.unwrap();

    database.save_log(&CheckResult::new(up, Status::Up, "HTTP check successful")).await.unwrap();
    database.save_log(&CheckResult::failure(down, "Connection refused")).await.unwrap();

    web::Data::new(Dashboard::new(Arc::new(database)))
}

#[actix_web::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(seeded_dashboard(&dir).await).configure(routes::routes),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_up_down_stats() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(seeded_dashboard(&dir).await).configure(routes::routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/up-down-stats").to_request();
    let stats: UpDownStats = test::call_and_read_body_json(&app, req).await;

    assert_eq!(stats.total, 2);
    assert_eq!(stats.up, 1);
    assert_eq!(stats.down, 1);
    assert_eq!(stats.percentage_up, 50.0);
}

#[actix_web::test]
async fn test_devices_down() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(seeded_dashboard(&dir).await).configure(routes::routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/devices-down?limit=5").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["url"], "10.0.0.2:22");
    assert_eq!(rows[0]["status"], "down");
    assert_eq!(rows[0]["type"], Value::Null);
    assert_eq!(rows[0]["error_message"], "Connection refused");
}

#[actix_web::test]
async fn test_uptime_graph() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(seeded_dashboard(&dir).await).configure(routes::routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/uptime-graph?hours=6&interval=30").to_request();
    let buckets: Vec<UptimeBucket> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(buckets.len(), 13);

    let up: u64 = buckets.iter().map(|bucket| bucket.up).sum();
    assert_eq!(up, 1);
}

#[actix_web::test]
async fn test_uptime_graph_rejects_bad_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(seeded_dashboard(&dir).await).configure(routes::routes),
    )
    .await;

    for uri in [
        "/api/uptime-graph?interval=0",
        "/api/uptime-graph?hours=0",
        "/api/uptime-graph?hours=721",
        "/api/uptime-graph?hours=2&interval=121",
        "/api/uptime-graph?interval=4611686018427387903",
    ] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }
}
