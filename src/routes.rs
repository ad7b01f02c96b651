use std::path::PathBuf;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;
use serde_json::json;

use crate::auth::{create_jwt, hash_password, Auth};
use crate::error::{ApiError, FieldErrors};
use crate::external::{ExternalApiError, ExternalAuthClient};
use crate::models::*;
use crate::proxy::{http_date, ImageProxy, Resolution, PLACEHOLDER_PNG};
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};
use crate::slug::unique_slug;
use crate::upload::{UploadSource, UploadedFile, Uploader};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub uploader: Arc<Uploader>,
    pub proxy: Arc<ImageProxy>,
    pub auth_api: Arc<ExternalAuthClient>,
    pub storage_root: PathBuf,
    pub rate_limiter: Option<RateLimiterFacade>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/register").route(web::post().to(register)))
            .service(web::resource("/user").route(web::get().to(me)))
            .service(web::resource("/logout").route(web::post().to(logout)))
            // fixed segments must be registered before /news/{id}
            .service(web::resource("/news/top10").route(web::get().to(news_top10)))
            .service(web::resource("/news/trashed").route(web::get().to(news_trashed)))
            .service(web::resource("/news/upload").route(web::post().to(upload_file)))
            .service(web::resource("/news/upload-base64").route(web::post().to(upload_base64)))
            .service(
                web::resource("/news/upload-and-save").route(web::post().to(upload_and_save)),
            )
            .service(
                web::resource("/news/upload-base64-and-save")
                    .route(web::post().to(upload_base64_and_save)),
            )
            .service(
                web::resource("/news")
                    .route(web::get().to(news_index))
                    .route(web::post().to(news_store)),
            )
            .service(
                web::resource("/news/{id}")
                    .route(web::get().to(news_show))
                    .route(web::put().to(news_update))
                    .route(web::delete().to(news_destroy)),
            )
            .service(web::resource("/news/{id}/restore").route(web::post().to(news_restore)))
            .service(web::resource("/news/{id}/force").route(web::delete().to(news_force_delete)))
            .service(
                web::resource("/webs-views")
                    .route(web::get().to(webs_views_index))
                    .route(web::post().to(webs_views_store)),
            )
            .service(
                web::resource("/webs-views/{id}")
                    .route(web::put().to(webs_views_update))
                    .route(web::delete().to(webs_views_destroy)),
            )
            .service(
                web::resource("/webs-views-detail/{id}")
                    .route(web::get().to(webs_views_detail_show))
                    .route(web::put().to(webs_views_detail_update))
                    .route(web::delete().to(webs_views_detail_destroy)),
            )
            .service(
                web::resource("/webs-views-detail").route(web::post().to(webs_views_detail_store)),
            ),
    );
    // public binary endpoints, no /api prefix so <img src="/images/{slug}"> works
    cfg.route("/images/{slug}", web::get().to(image_show));
    cfg.route("/storage/{path:.*}", web::get().to(storage_serve));
}

// ---------------- helpers ----------------

fn client_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

fn check_rate(
    data: &AppState,
    req: &HttpRequest,
    allow: impl Fn(&RateLimiterFacade, &str) -> bool,
) -> Result<(), ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !allow(rl, &client_ip(req)) {
            return Err(ApiError::TooManyRequests);
        }
    }
    Ok(())
}

fn require_text(errors: &mut FieldErrors, field: &str, value: Option<&str>, max: usize) {
    match value.map(str::trim) {
        None | Some("") => {
            errors
                .entry(field.to_string())
                .or_default()
                .push(format!("El campo {field} es obligatorio"));
        }
        Some(v) if v.chars().count() > max => {
            errors
                .entry(field.to_string())
                .or_default()
                .push(format!("El campo {field} no debe exceder {max} caracteres"));
        }
        _ => {}
    }
}

fn finish_validation(errors: FieldErrors) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

#[derive(serde::Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

fn page_envelope(page: &PageOf<News>) -> serde_json::Value {
    json!({
        "success": true,
        "data": page.items,
        "pagination": page.pagination_json(),
    })
}

// ---------------- auth ----------------

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if !email.contains('@') {
        errors
            .entry("email".into())
            .or_default()
            .push("El email no es válido".into());
    }
    if password.len() < 6 {
        errors
            .entry("password".into())
            .or_default()
            .push("La contraseña debe tener al menos 6 caracteres".into());
    }
    finish_validation(errors)
}

/// Credential check is delegated to the external auth API; on success a local
/// user row is provisioned (or its name refreshed) and a local JWT issued.
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_auth)?;
    validate_credentials(&payload.email, &payload.password)?;

    let external = data
        .auth_api
        .login(&payload.email, &payload.password)
        .await
        .map_err(|e| match e {
            ExternalApiError::Rejected { message } => ApiError::Unauthorized(message),
            ExternalApiError::Connection => ApiError::Unauthorized(e.to_string()),
        })?;

    let name = if external.name.is_empty() {
        payload.email.split('@').next().unwrap_or("usuario").to_string()
    } else {
        external.name
    };

    let user = match data.repo.find_user_by_email(&payload.email).await? {
        Some(existing) => {
            if existing.name != name {
                data.repo.update_user_name(existing.id, &name).await?
            } else {
                existing
            }
        }
        None => {
            let hashed = hash_password(&payload.password)?;
            data.repo
                .create_user(NewUser { name, email: payload.email.clone(), password: hashed })
                .await?
        }
    };

    let token = create_jwt(&user).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Login exitoso",
        "data": { "user": user, "token": token, "token_type": "Bearer" }
    })))
}

pub async fn register(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_auth)?;

    let mut errors = FieldErrors::new();
    require_text(&mut errors, "name", Some(&payload.name), 255);
    if !payload.email.contains('@') {
        errors.entry("email".into()).or_default().push("El email no es válido".into());
    }
    if payload.password.len() < 6 {
        errors
            .entry("password".into())
            .or_default()
            .push("La contraseña debe tener al menos 6 caracteres".into());
    }
    if payload.password != payload.password_confirmation {
        errors
            .entry("password".into())
            .or_default()
            .push("La confirmación de contraseña no coincide".into());
    }
    if data.repo.find_user_by_email(&payload.email).await?.is_some() {
        errors.entry("email".into()).or_default().push("El email ya está registrado".into());
    }
    finish_validation(errors)?;

    let hashed = hash_password(&payload.password)?;
    let user = data
        .repo
        .create_user(NewUser {
            name: payload.name.trim().to_string(),
            email: payload.email.clone(),
            password: hashed,
        })
        .await
        .map_err(|e| match e {
            // lost the uniqueness race between check and insert
            RepoError::Conflict => ApiError::validation("email", "El email ya está registrado"),
            other => other.into(),
        })?;
    let token = create_jwt(&user).map_err(|_| ApiError::Internal)?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Usuario registrado exitosamente",
        "data": { "user": user, "token": token, "token_type": "Bearer" }
    })))
}

pub async fn me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data
        .repo
        .get_user(auth.0.sub)
        .await
        .map_err(|_| ApiError::Unauthorized("No autenticado".into()))?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": user })))
}

/// Local sessions are stateless JWTs; only the external session (if the
/// caller passes its token) has anything to revoke.
pub async fn logout(req: HttpRequest, _auth: Auth, data: web::Data<AppState>) -> HttpResponse {
    if let Some(token) = req
        .headers()
        .get("X-External-Token")
        .and_then(|v| v.to_str().ok())
    {
        data.auth_api.logout(token).await;
    }
    HttpResponse::Ok().json(json!({ "success": true, "message": "Logout exitoso" }))
}

// ---------------- news CRUD ----------------

#[utoipa::path(
    get,
    path = "/api/news",
    params(("page" = Option<u32>, Query, description = "Page number, 10 per page")),
    responses((status = 200, description = "Paginated news listing"))
)]
pub async fn news_index(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_news_read)?;
    let page = data.repo.list_news(query.page.unwrap_or(1)).await?;
    Ok(HttpResponse::Ok().json(page_envelope(&page)))
}

pub async fn news_top10(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_news_read)?;
    let news = data.repo.top_visible(10).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": news })))
}

#[utoipa::path(
    get,
    path = "/api/news/{id}",
    params(("id" = i64, Path, description = "News id")),
    responses(
        (status = 200, description = "News record", body = News),
        (status = 404, description = "Not found")
    )
)]
pub async fn news_show(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_news_read)?;
    let news = data.repo.get_news(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": news })))
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct StoreNewsRequest {
    pub titulo: String,
    pub sub_titulo: String,
    pub ruta: Option<String>,
    pub link_final: Option<String>,
    pub fecha_hora: Option<chrono::DateTime<chrono::Utc>>,
    pub display: Option<bool>,
}

#[utoipa::path(
    post,
    path = "/api/news",
    request_body = StoreNewsRequest,
    responses(
        (status = 201, description = "News created", body = News),
        (status = 422, description = "Validation error"),
        (status = 409, description = "Duplicate slug")
    )
)]
pub async fn news_store(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<StoreNewsRequest>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_write)?;
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "titulo", Some(&payload.titulo), 255);
    require_text(&mut errors, "sub_titulo", Some(&payload.sub_titulo), 255);
    finish_validation(errors)?;

    let slug = unique_slug(data.repo.as_ref(), &payload.titulo).await?;
    let news = data
        .repo
        .create_news(NewNews {
            titulo: payload.titulo.clone(),
            sub_titulo: payload.sub_titulo.clone(),
            ruta: payload.ruta.clone(),
            link_final: payload.link_final.clone(),
            fecha_hora: payload.fecha_hora,
            user_id: auth.0.sub,
            slug,
            display: payload.display.unwrap_or(true),
        })
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Noticia creada exitosamente",
        "data": news
    })))
}

pub async fn news_update(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateNews>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_write)?;
    // fields are optional on update but must be valid when present
    let mut errors = FieldErrors::new();
    if let Some(titulo) = payload.titulo.as_deref() {
        require_text(&mut errors, "titulo", Some(titulo), 255);
    }
    if let Some(sub_titulo) = payload.sub_titulo.as_deref() {
        require_text(&mut errors, "sub_titulo", Some(sub_titulo), 255);
    }
    finish_validation(errors)?;

    let news = data.repo.update_news(path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Noticia actualizada exitosamente",
        "data": news
    })))
}

#[utoipa::path(
    delete,
    path = "/api/news/{id}",
    params(("id" = i64, Path, description = "News id")),
    responses(
        (status = 200, description = "Soft-deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn news_destroy(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_write)?;
    let news = data.repo.soft_delete_news(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Noticia eliminada exitosamente (borrado lógico)",
        "data": { "id": news.id, "titulo": news.titulo, "deleted_at": news.deleted_at }
    })))
}

pub async fn news_trashed(
    _auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = data.repo.list_trashed(query.page.unwrap_or(1)).await?;
    Ok(HttpResponse::Ok().json(page_envelope(&page)))
}

#[utoipa::path(
    post,
    path = "/api/news/{id}/restore",
    params(("id" = i64, Path, description = "News id")),
    responses(
        (status = 200, description = "Restored", body = News),
        (status = 400, description = "Record is not deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn news_restore(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let news = data.repo.restore_news(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Noticia restaurada exitosamente",
        "data": news
    })))
}

/// Irreversible. Also unlinks a locally stored file; remote files are never
/// touched by this operation.
pub async fn news_force_delete(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let news = data.repo.hard_delete_news(path.into_inner()).await?;
    if let Some(ruta) = &news.ruta {
        if ImageProxy::is_local_storage_url(ruta) {
            if let Some(file) = ImageProxy::local_path_for(&data.storage_root, ruta) {
                if let Err(e) = std::fs::remove_file(&file) {
                    log::warn!("could not remove '{}': {e}", file.display());
                }
            }
        }
    }
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Noticia eliminada permanentemente"
    })))
}

// ---------------- uploads ----------------

/// Hard cap while draining multipart, above the validation limit so the
/// resolver can produce its descriptive size error.
const MULTIPART_READ_LIMIT: usize = 10 * 1024 * 1024;

struct UploadForm {
    file: Option<Vec<u8>>,
    filename: Option<String>,
    titulo: Option<String>,
    sub_titulo: Option<String>,
    display: Option<bool>,
}

async fn read_upload_form(mut payload: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm {
        file: None,
        filename: None,
        titulo: None,
        sub_titulo: None,
        display: None,
    };
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        let disposition = field.content_disposition();
        let Some(name) = disposition.get_name().map(str::to_string) else {
            continue;
        };
        // the part's own filename is a fallback for an explicit field
        let part_filename = disposition.get_filename().map(str::to_string);
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::error!("multipart read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > MULTIPART_READ_LIMIT {
                return Err(ApiError::validation(
                    "file",
                    "File size exceeds maximum allowed size of 5MB",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        match name.as_str() {
            "file" => {
                form.file = Some(bytes);
                if form.filename.is_none() {
                    form.filename = part_filename;
                }
            }
            "filename" => form.filename = Some(String::from_utf8_lossy(&bytes).into_owned()),
            "titulo" => form.titulo = Some(String::from_utf8_lossy(&bytes).into_owned()),
            "sub_titulo" => form.sub_titulo = Some(String::from_utf8_lossy(&bytes).into_owned()),
            "display" => {
                let v = String::from_utf8_lossy(&bytes);
                form.display = Some(v == "1" || v.eq_ignore_ascii_case("true"));
            }
            _ => {}
        }
    }
    Ok(form)
}

fn uploaded_envelope(message: &str, uploaded: &UploadedFile) -> serde_json::Value {
    json!({
        "success": true,
        "message": message,
        "data": {
            "filename": uploaded.filename,
            "url": uploaded.url,
            "size": uploaded.size,
            "mime_type": uploaded.mime_type,
        }
    })
}

#[utoipa::path(
    post,
    path = "/api/news/upload",
    responses(
        (status = 200, description = "File uploaded", body = UploadedFile),
        (status = 422, description = "Validation error")
    )
)]
pub async fn upload_file(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_write)?;
    let form = read_upload_form(payload).await?;
    let bytes = form
        .file
        .ok_or_else(|| ApiError::validation("file", "El campo file es obligatorio"))?;
    let uploaded = data
        .uploader
        .upload(UploadSource::Bytes { data: bytes, filename: form.filename })
        .await?;
    Ok(HttpResponse::Ok().json(uploaded_envelope("Archivo subido exitosamente", &uploaded)))
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct Base64UploadRequest {
    pub file: String,
    pub filename: String,
}

pub async fn upload_base64(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<Base64UploadRequest>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_write)?;
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "file", Some(&payload.file), usize::MAX);
    require_text(&mut errors, "filename", Some(&payload.filename), 255);
    finish_validation(errors)?;

    let uploaded = data
        .uploader
        .upload(UploadSource::Base64 {
            payload: payload.file.clone(),
            filename: Some(payload.filename.clone()),
        })
        .await?;
    Ok(HttpResponse::Ok().json(uploaded_envelope("Archivo subido exitosamente", &uploaded)))
}

/// Upload + slug + persist in one step. If the insert loses the slug race the
/// client gets a 409; the already-uploaded file is left behind (accepted gap,
/// no compensating delete).
async fn save_uploaded_news(
    data: &AppState,
    auth: &Auth,
    uploaded: &UploadedFile,
    titulo: String,
    sub_titulo: String,
    display: bool,
) -> Result<News, ApiError> {
    let slug = unique_slug(data.repo.as_ref(), &titulo).await?;
    let link_final = format!("/images/{slug}");
    let news = data
        .repo
        .create_news(NewNews {
            titulo,
            sub_titulo,
            ruta: Some(uploaded.url.clone()),
            link_final: Some(link_final),
            fecha_hora: Some(chrono::Utc::now()),
            user_id: auth.0.sub,
            slug,
            display,
        })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::DuplicateSlug,
            other => other.into(),
        })?;
    Ok(news)
}

#[utoipa::path(
    post,
    path = "/api/news/upload-and-save",
    responses(
        (status = 201, description = "File uploaded and news created", body = News),
        (status = 422, description = "Validation error"),
        (status = 409, description = "Duplicate slug")
    )
)]
pub async fn upload_and_save(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_write)?;
    let form = read_upload_form(payload).await?;

    let mut errors = FieldErrors::new();
    if form.file.is_none() {
        errors.entry("file".into()).or_default().push("El campo file es obligatorio".into());
    }
    require_text(&mut errors, "filename", form.filename.as_deref(), 255);
    require_text(&mut errors, "titulo", form.titulo.as_deref(), 255);
    require_text(&mut errors, "sub_titulo", form.sub_titulo.as_deref(), 255);
    finish_validation(errors)?;

    let uploaded = data
        .uploader
        .upload(UploadSource::Bytes { data: form.file.unwrap(), filename: form.filename })
        .await?;
    let news = save_uploaded_news(
        &data,
        &auth,
        &uploaded,
        form.titulo.unwrap(),
        form.sub_titulo.unwrap(),
        form.display.unwrap_or(true),
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Archivo subido y noticia guardada exitosamente",
        "data": news
    })))
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct Base64SaveRequest {
    pub file: String,
    pub filename: String,
    pub titulo: String,
    pub sub_titulo: String,
    pub display: Option<bool>,
}

pub async fn upload_base64_and_save(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<Base64SaveRequest>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, &req, RateLimiterFacade::allow_write)?;
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "file", Some(&payload.file), usize::MAX);
    require_text(&mut errors, "filename", Some(&payload.filename), 255);
    require_text(&mut errors, "titulo", Some(&payload.titulo), 255);
    require_text(&mut errors, "sub_titulo", Some(&payload.sub_titulo), 255);
    finish_validation(errors)?;

    let uploaded = data
        .uploader
        .upload(UploadSource::Base64 {
            payload: payload.file.clone(),
            filename: Some(payload.filename.clone()),
        })
        .await?;
    let news = save_uploaded_news(
        &data,
        &auth,
        &uploaded,
        payload.titulo.clone(),
        payload.sub_titulo.clone(),
        payload.display.unwrap_or(true),
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Archivo subido y noticia guardada exitosamente",
        "data": news
    })))
}

// ---------------- image proxy & static storage ----------------

fn placeholder_response(message: &str, original_url: Option<&str>) -> HttpResponse {
    let mut builder = HttpResponse::build(StatusCode::NOT_FOUND);
    builder
        .insert_header(("Content-Type", "image/png"))
        .insert_header(("X-Proxy-Status", "error"))
        .insert_header(("X-Error-Message", message.to_string()));
    if let Some(url) = original_url {
        builder.insert_header(("X-Original-URL", url.to_string()));
    }
    builder.body(PLACEHOLDER_PNG)
}

/// Serve the image behind a news slug from wherever it lives. Failures always
/// yield renderable placeholder bytes so `<img>` tags degrade gracefully.
#[utoipa::path(
    get,
    path = "/images/{slug}",
    params(("slug" = String, Path, description = "News slug")),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 404, description = "Placeholder image")
    )
)]
pub async fn image_show(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let slug = path.into_inner();
    let news = match data.repo.find_by_slug(&slug).await {
        Ok(n) => n,
        Err(_) => return placeholder_response("Noticia no encontrada", None),
    };
    let Some(ruta) = news.ruta.as_deref() else {
        return placeholder_response("URL de imagen no disponible", None);
    };

    match data.proxy.resolve(ruta).await {
        Resolution::Found { bytes, mime, last_modified, origin } => HttpResponse::Ok()
            .insert_header(("Content-Type", mime))
            .insert_header(("Cache-Control", "public, max-age=3600"))
            .insert_header(("Last-Modified", http_date(last_modified)))
            .insert_header(("X-Original-URL", ruta.to_string()))
            .insert_header(("X-Proxy-Status", origin.as_str()))
            .body(bytes),
        Resolution::NotFound => {
            placeholder_response("No se pudo cargar la imagen", Some(ruta))
        }
        Resolution::UpstreamError => {
            placeholder_response("No se pudo cargar la imagen remota", Some(ruta))
        }
    }
}

/// Raw static passthrough for `storage/app/public`.
pub async fn storage_serve(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let rel = path.into_inner();
    if rel.is_empty() || rel.split('/').any(|seg| seg == "..") {
        return Err(ApiError::NotFound("Archivo no encontrado".into()));
    }
    let full = data.storage_root.join(&rel);
    let bytes = tokio::fs::read(&full)
        .await
        .map_err(|_| ApiError::NotFound("Archivo no encontrado".into()))?;
    let mime = infer::get(&bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| crate::proxy::mime_from_extension(&rel).to_string());
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", mime))
        .insert_header(("Cache-Control", "public, max-age=3600"))
        .body(bytes))
}

// ---------------- webs-views passthrough ----------------

/// These resources live entirely on the external API; we validate the
/// caller's external token and forward verbatim.
async fn forward_webs_views(
    req: &HttpRequest,
    data: &AppState,
    method: reqwest::Method,
    path: String,
    body: Option<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    let token = req
        .headers()
        .get("X-External-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Token externo requerido".into()))?;

    let valid = data
        .auth_api
        .validate_token(token)
        .await
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
    if !valid {
        return Err(ApiError::Unauthorized("Token externo inválido".into()));
    }

    let (status, body) = data
        .auth_api
        .forward(method, &path, token, body)
        .await
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok(HttpResponse::build(status).json(body))
}

pub async fn webs_views_index(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    forward_webs_views(&req, &data, reqwest::Method::GET, "webs-views".into(), None).await
}

pub async fn webs_views_store(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    forward_webs_views(&req, &data, reqwest::Method::POST, "webs-views".into(), Some(payload.into_inner())).await
}

pub async fn webs_views_update(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    let path = format!("webs-views/{}", path.into_inner());
    forward_webs_views(&req, &data, reqwest::Method::PUT, path, Some(payload.into_inner())).await
}

pub async fn webs_views_destroy(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let path = format!("webs-views/{}", path.into_inner());
    forward_webs_views(&req, &data, reqwest::Method::DELETE, path, None).await
}

pub async fn webs_views_detail_show(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let path = format!("webs-views-detail/{}", path.into_inner());
    forward_webs_views(&req, &data, reqwest::Method::GET, path, None).await
}

pub async fn webs_views_detail_store(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    forward_webs_views(&req, &data, reqwest::Method::POST, "webs-views-detail".into(), Some(payload.into_inner())).await
}

pub async fn webs_views_detail_update(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ApiError> {
    let path = format!("webs-views-detail/{}", path.into_inner());
    forward_webs_views(&req, &data, reqwest::Method::PUT, path, Some(payload.into_inner())).await
}

pub async fn webs_views_detail_destroy(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let path = format!("webs-views-detail/{}", path.into_inner());
    forward_webs_views(&req, &data, reqwest::Method::DELETE, path, None).await
}
