use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, App};

use noticiero::config::{AuthApiConfig, LocalConfig, UploadTransportConfig};
use noticiero::external::ExternalAuthClient;
use noticiero::proxy::ImageProxy;
use noticiero::repo::inmem::InMemRepo;
use noticiero::upload::Uploader;
use noticiero::{routes_config, AppState, SecurityHeaders};

fn ensure_secret() {
    if std::env::var("JWT_SECRET").is_err() {
        std::env::set_var("JWT_SECRET", "testsecret-abcdefghijklmnopqrstuvwxyz012345");
    }
}

fn test_state() -> (AppState, tempfile::TempDir, tempfile::TempDir) {
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
        rate_limiter: None,
    };
    (state, data_dir, storage_dir)
}

#[actix_web::test]
#[serial_test::serial]
async fn default_headers_are_applied() {
    let (state, _d, _s) = test_state();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::default())
            .app_data(actix_web::web::Data::new(state))
            .configure(routes_config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/news").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let headers = resp.headers();
    assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
    assert_eq!(headers.get("Referrer-Policy").unwrap(), "no-referrer");
    let csp = headers.get("Content-Security-Policy").unwrap().to_str().unwrap();
    // proxied remote images must stay renderable under the CSP
    assert!(csp.contains("img-src 'self' https: data:"));
    assert!(headers.get("Strict-Transport-Security").is_none());
}

#[actix_web::test]
#[serial_test::serial]
async fn hsts_is_opt_in() {
    let (state, _d, _s) = test_state();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders { enable_hsts: true })
            .app_data(actix_web::web::Data::new(state))
            .configure(routes_config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/news").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.headers().get("Strict-Transport-Security").is_some());
}
