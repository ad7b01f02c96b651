use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, App};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use noticiero::config::{AuthApiConfig, LocalConfig, UploadTransportConfig};
use noticiero::external::ExternalAuthClient;
use noticiero::proxy::ImageProxy;
use noticiero::repo::inmem::InMemRepo;
use noticiero::repo::UserRepo;
use noticiero::upload::Uploader;
use noticiero::{routes_config, AppState};

fn ensure_secret() {
    if std::env::var("JWT_SECRET").is_err() {
        std::env::set_var("JWT_SECRET", "testsecret-abcdefghijklmnopqrstuvwxyz012345");
    }
}

struct TestCtx {
    state: AppState,
    repo: InMemRepo,
    _data_dir: tempfile::TempDir,
    _storage_dir: tempfile::TempDir,
}

fn test_ctx(auth_base: &str) -> TestCtx {
    ensure_secret();
    let data_dir = tempfile::tempdir().unwrap();
    std::env::set_var("NOTICIERO_DATA_DIR", data_dir.path());
    let storage_dir = tempfile::tempdir().unwrap();
    let storage_root = storage_dir.path().to_path_buf();

    let repo = InMemRepo::new();
    let uploader = Arc::new(Uploader::from_config(UploadTransportConfig::Local(LocalConfig {
        storage_root: storage_root.clone(),
        public_base: "/storage/images".into(),
    })));
    let state = AppState {
        repo: Arc::new(repo.clone()),
        uploader,
        proxy: Arc::new(ImageProxy::new(storage_root.clone())),
        auth_api: Arc::new(ExternalAuthClient::new(AuthApiConfig {
            base_url: auth_base.into(),
            timeout: Duration::from_secs(2),
        })),
        storage_root,
        rate_limiter: None,
    };
    TestCtx { state, repo, _data_dir: data_dir, _storage_dir: storage_dir }
}

#[actix_web::test]
#[serial_test::serial]
async fn login_provisions_a_local_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"user": {"name": "Ana López"}}
        })))
        .mount(&server)
        .await;

    let ctx = test_ctx(&server.uri());
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(ctx.state.clone()))
            .configure(routes_config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({"email": "ana@example.com", "password": "secreto123"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["data"]["user"]["name"], "Ana López");
    assert_eq!(body["data"]["token_type"], "Bearer");
    let token = body["data"]["token"].as_str().unwrap().to_string();
    // password hashes are never serialized
    assert!(body["data"]["user"].get("password").is_none());

    let stored = ctx.repo.find_user_by_email("ana@example.com").await.unwrap().unwrap();
    assert_eq!(stored.name, "Ana López");

    // local JWT opens the session endpoint
    let req = test::TestRequest::get()
        .uri("/api/user")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["data"]["email"], "ana@example.com");
}

#[actix_web::test]
#[serial_test::serial]
async fn login_refreshes_the_local_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"user": {"firstname": "Ana", "lastname": "García"}}
        })))
        .mount(&server)
        .await;

    let ctx = test_ctx(&server.uri());
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(ctx.state.clone()))
            .configure(routes_config),
    )
    .await;

    // pre-existing local user with a stale name
    ctx.repo
        .create_user(noticiero::models::NewUser {
            name: "Nombre Viejo".into(),
            email: "ana@example.com".into(),
            password: "hash".into(),
        })
        .await
        .unwrap();

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({"email": "ana@example.com", "password": "secreto123"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let stored = ctx.repo.find_user_by_email("ana@example.com").await.unwrap().unwrap();
    assert_eq!(stored.name, "Ana García");
}

#[actix_web::test]
#[serial_test::serial]
async fn rejected_credentials_surface_the_upstream_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "msg": "Credenciales incorrectas"
        })))
        .mount(&server)
        .await;

    let ctx = test_ctx(&server.uri());
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(ctx.state.clone()))
            .configure(routes_config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({"email": "ana@example.com", "password": "secreto123"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["message"], "Credenciales incorrectas");
    // no local user gets provisioned on rejection
    assert!(ctx.repo.find_user_by_email("ana@example.com").await.unwrap().is_none());
}

#[actix_web::test]
#[serial_test::serial]
async fn auth_server_failure_reports_a_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let ctx = test_ctx(&server.uri());
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(ctx.state.clone()))
            .configure(routes_config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({"email": "ana@example.com", "password": "secreto123"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["message"], "Error de conexión con el servidor de autenticación");
}

#[actix_web::test]
#[serial_test::serial]
async fn login_validates_the_payload() {
    let ctx = test_ctx("http://127.0.0.1:1");
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(ctx.state.clone()))
            .configure(routes_config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({"email": "no-es-un-email", "password": "corta"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(body["errors"]["email"].is_array());
    assert!(body["errors"]["password"].is_array());
}

#[actix_web::test]
#[serial_test::serial]
async fn register_and_reject_duplicate_email() {
    let ctx = test_ctx("http://127.0.0.1:1");
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(ctx.state.clone()))
            .configure(routes_config),
    )
    .await;

    let payload = json!({
        "name": "Ana",
        "email": "ana@example.com",
        "password": "secreto123",
        "password_confirmation": "secreto123",
    });
    let req = test::TestRequest::post().uri("/api/register").set_json(&payload).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(body["data"]["token"].as_str().unwrap().len() > 20);

    let req = test::TestRequest::post().uri("/api/register").set_json(&payload).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(body["errors"]["email"][0]
        .as_str()
        .unwrap()
        .contains("ya está registrado"));
}

#[actix_web::test]
#[serial_test::serial]
async fn register_requires_matching_confirmation() {
    let ctx = test_ctx("http://127.0.0.1:1");
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(ctx.state.clone()))
            .configure(routes_config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(json!({
            "name": "Ana",
            "email": "ana@example.com",
            "password": "secreto123",
            "password_confirmation": "distinta",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);
}

#[actix_web::test]
#[serial_test::serial]
async fn webs_views_passthrough_forwards_with_external_token() {
    let server = MockServer::start().await;
    // token validation probe + the actual forwarded call
    Mock::given(method("GET"))
        .and(path("/webs-views"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [1, 2, 3]})))
        .mount(&server)
        .await;

    let ctx = test_ctx(&server.uri());
    let user = ctx
        .repo
        .create_user(noticiero::models::NewUser {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password: "hash".into(),
        })
        .await
        .unwrap();
    let token = noticiero::auth::create_jwt(&user).unwrap();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(ctx.state.clone()))
            .configure(routes_config),
    )
    .await;

    // missing external token is a 401
    let req = test::TestRequest::get()
        .uri("/api/webs-views")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/webs-views")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .insert_header(("X-External-Token", "tok-externo"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["data"], json!([1, 2, 3]));
}
