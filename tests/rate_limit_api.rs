use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, App};
use serde_json::json;

use noticiero::config::{AuthApiConfig, LocalConfig, UploadTransportConfig};
use noticiero::external::ExternalAuthClient;
use noticiero::proxy::ImageProxy;
use noticiero::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use noticiero::repo::inmem::InMemRepo;
use noticiero::upload::Uploader;
use noticiero::{routes_config, AppState};

fn ensure_secret() {
    if std::env::var("JWT_SECRET").is_err() {
        std::env::set_var("JWT_SECRET", "testsecret-abcdefghijklmnopqrstuvwxyz012345");
    }
}

fn tiny_limits() -> RateLimiterFacade {
    RateLimiterFacade::new(
        InMemoryRateLimiter::new(true),
        RateLimitConfig {
            auth_limit: 2,
            auth_window: Duration::from_secs(60),
            news_read_limit: 3,
            news_read_window: Duration::from_secs(60),
            write_limit: 2,
            write_window: Duration::from_secs(60),
        },
    )
}

fn test_state(rate_limiter: Option<RateLimiterFacade>) -> (AppState, tempfile::TempDir, tempfile::TempDir) {
    ensure_secret();
    let data_dir = tempfile::tempdir().unwrap();
    std::env::set_var("NOTICIERO_DATA_DIR", data_dir.path());
    let storage_dir = tempfile::tempdir().unwrap();
    let storage_root = storage_dir.path().to_path_buf();
    let state = AppState {
        repo: Arc::new(InMemRepo::new()),
        uploader: Arc::new(Uploader::from_config(UploadTransportConfig::Local(LocalConfig {
            storage_root: storage_root.clone(),
            public_base: "/storage/images".into(),
        }))),
        proxy: Arc::new(ImageProxy::new(storage_root.clone())),
        auth_api: Arc::new(ExternalAuthClient::new(AuthApiConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout: Duration::from_secs(1),
        })),
        storage_root,
        rate_limiter,
    };
    (state, data_dir, storage_dir)
}

#[actix_web::test]
#[serial_test::serial]
async fn auth_endpoints_are_throttled() {
    let (state, _d, _s) = test_state(Some(tiny_limits()));
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(routes_config),
    )
    .await;

    // invalid payloads still consume the auth budget
    let payload = json!({"email": "x", "password": "y"});
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/login")
            .peer_addr("9.9.9.9:4444".parse().unwrap())
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
    }
    let req = test::TestRequest::post()
        .uri("/api/login")
        .peer_addr("9.9.9.9:4444".parse().unwrap())
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);

    // reads use a separate, more lenient budget
    let req = test::TestRequest::get()
        .uri("/api/news")
        .peer_addr("9.9.9.9:4444".parse().unwrap())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
#[serial_test::serial]
async fn read_throttle_is_per_ip() {
    let (state, _d, _s) = test_state(Some(tiny_limits()));
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(routes_config),
    )
    .await;

    for _ in 0..3 {
        let req = test::TestRequest::get()
            .uri("/api/news")
            .peer_addr("1.1.1.1:1000".parse().unwrap())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
    let req = test::TestRequest::get()
        .uri("/api/news")
        .peer_addr("1.1.1.1:1000".parse().unwrap())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 429);

    // another client is unaffected
    let req = test::TestRequest::get()
        .uri("/api/news")
        .peer_addr("2.2.2.2:1000".parse().unwrap())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
#[serial_test::serial]
async fn no_limiter_means_no_throttling() {
    let (state, _d, _s) = test_state(None);
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(routes_config),
    )
    .await;

    for _ in 0..20 {
        let req = test::TestRequest::get()
            .uri("/api/news")
            .peer_addr("1.1.1.1:1000".parse().unwrap())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
}
