use actix_cors::Cors;
use actix_web::{middleware::Compress, App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod config;
mod error;
mod external;
mod models;
mod openapi;
mod proxy;
mod rate_limit;
mod repo;
mod routes;
mod security;
mod slug;
mod upload;

use config::{storage_root_from_env, AuthApiConfig, UploadTransportConfig};
use external::ExternalAuthClient;
use openapi::ApiDoc;
use proxy::ImageProxy;
use rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
#[cfg(feature = "inmem-store")]
use repo::inmem::InMemRepo;
use routes::{config as routes_config, AppState};
use security::SecurityHeaders;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use upload::Uploader;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment comes from the shell, systemd or Docker; .env is loaded
    // automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping noticiero server");

    // Upload transport is validated up-front; a misconfigured FTP/HTTP
    // remote should stop the boot, not the first upload.
    let upload_cfg = match UploadTransportConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Upload configuration error: {e}");
            std::process::exit(1);
        }
    };
    let transport_name = match &upload_cfg {
        UploadTransportConfig::Local(_) => "local",
        UploadTransportConfig::Ftp(_) => "ftp",
        UploadTransportConfig::Http(_) => "http",
    };
    info!("Upload transport: {transport_name}");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        repo::pg::PgRepo::new(pool)
    };

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let storage_root = storage_root_from_env();
    let uploader = Arc::new(Uploader::from_config(upload_cfg));
    let image_proxy = Arc::new(ImageProxy::new(storage_root.clone()));
    let auth_api = Arc::new(ExternalAuthClient::new(AuthApiConfig::from_env()));
    let rate_limiting_enabled = std::env::var("RATE_LIMIT_ENABLED")
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(true);
    let rate_limiter = rate_limiting_enabled.then(|| {
        RateLimiterFacade::new(InMemoryRateLimiter::new(true), RateLimitConfig::from_env())
    });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .configure(routes_config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                uploader: uploader.clone(),
                proxy: image_proxy.clone(),
                auth_api: auth_api.clone(),
                storage_root: storage_root.clone(),
                rate_limiter: rate_limiter.clone(),
            }))
    })
    .bind(("0.0.0.0", port))?;

    info!("Listening on http://0.0.0.0:{port}");

    server.run().await
}

/// Validate required environment variables before anything else starts.
fn validate_env_vars() {
    use std::env;

    let required = vec!["JWT_SECRET"];

    let mut missing = Vec::new();
    for var in required {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {missing:?}");
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }

    if env::var("AUTH_API_BASE_URL").is_err() {
        eprintln!("Warning: AUTH_API_BASE_URL not set; external login will use the built-in default");
    }
}
