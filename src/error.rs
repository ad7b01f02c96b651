use std::collections::HashMap;

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::repo::RepoError;
use crate::upload::UploadError;

pub type FieldErrors = HashMap<String, Vec<String>>;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Error de validación")]
    Validation(FieldErrors),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    /// Remote upload/transport failure. The upstream detail is logged,
    /// the client only sees a generic message.
    #[error("Error al subir archivo")]
    Upload,
    #[error("Ya existe una noticia con un título similar. Intenta con un título diferente.")]
    DuplicateSlug,
    #[error("La noticia no está eliminada")]
    NotDeleted,
    #[error("Demasiadas solicitudes. Intenta de nuevo más tarde.")]
    TooManyRequests,
    #[error("Error interno del servidor")]
    Internal,
}

impl ApiError {
    pub fn not_found_news() -> Self {
        ApiError::NotFound("Noticia no encontrada".into())
    }

    pub fn validation(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        ApiError::Validation(errors)
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::not_found_news(),
            RepoError::Conflict => ApiError::DuplicateSlug,
            RepoError::NotDeleted => ApiError::NotDeleted,
            RepoError::Internal(detail) => {
                log::error!("repository error: {detail}");
                ApiError::Internal
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Validation(msg) => ApiError::validation("file", &msg),
            UploadError::UnsupportedFormat => {
                ApiError::validation("file", "No se pudo determinar la extensión del archivo")
            }
            UploadError::Transport(detail) => {
                log::error!("upload transport error: {detail}");
                ApiError::Upload
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Upload | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DuplicateSlug => StatusCode::CONFLICT,
            ApiError::NotDeleted => StatusCode::BAD_REQUEST,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        };
        let mut body = json!({
            "success": false,
            "message": self.to_string(),
        });
        match self {
            ApiError::Validation(errors) => {
                body["errors"] = serde_json::to_value(errors).unwrap_or_default();
            }
            ApiError::DuplicateSlug => {
                body["error_type"] = json!("duplicate_slug");
            }
            _ => {}
        }
        HttpResponse::build(status).json(body)
    }
}
