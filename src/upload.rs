use std::io::Cursor;
use std::io::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use image::GenericImageView;
use log::{info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};

use crate::config::{FtpConfig, HttpConfig, LocalConfig, UploadTransportConfig};

const MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const MAX_DIMENSION: u32 = 4000;
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),
    #[error("could not determine file extension")]
    UnsupportedFormat,
    #[error("{0}")]
    Transport(String),
}

/// Result of a successful upload, regardless of transport.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct UploadedFile {
    pub filename: String,
    pub url: String,
    pub size: usize,
    pub mime_type: String,
}

/// Incoming payload: raw multipart bytes or a base64 string.
pub enum UploadSource {
    Bytes { data: Vec<u8>, filename: Option<String> },
    Base64 { payload: String, filename: Option<String> },
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Persist `bytes` under `filename` and return the public URL.
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError>;
}

pub struct Uploader {
    transport: Box<dyn UploadTransport>,
}

impl Uploader {
    pub fn from_config(cfg: UploadTransportConfig) -> Self {
        let transport: Box<dyn UploadTransport> = match cfg {
            UploadTransportConfig::Local(c) => Box::new(LocalTransport::new(c)),
            UploadTransportConfig::Ftp(c) => Box::new(FtpTransport::new(c)),
            UploadTransportConfig::Http(c) => Box::new(HttpTransport::new(c)),
        };
        Self { transport }
    }

    pub async fn upload(&self, source: UploadSource) -> Result<UploadedFile, UploadError> {
        let (bytes, filename) = match source {
            UploadSource::Bytes { data, filename } => (data, filename),
            UploadSource::Base64 { payload, filename } => {
                let data = stage_base64(&payload)?;
                let filename = match filename {
                    Some(f) => Some(f),
                    None => Some(format!("file.{}", sniff_extension(&data)?)),
                };
                (data, filename)
            }
        };

        let extension = filename
            .as_deref()
            .and_then(extension_of)
            .map(str::to_string)
            .or_else(|| sniff_extension(&bytes).ok())
            .ok_or(UploadError::UnsupportedFormat)?;

        validate_image(&bytes, &extension)?;

        let filename = filename.unwrap_or_else(|| generate_filename(&extension));
        validate_filename(&filename)?;
        let url = self.transport.store(&filename, &bytes).await?;
        info!("uploaded '{filename}' ({} bytes) -> {url}", bytes.len());

        Ok(UploadedFile {
            mime_type: mime_for_extension(&extension),
            size: bytes.len(),
            filename,
            url,
        })
    }
}

/// Decode a base64 payload through a temp file. The file is removed on every
/// exit path when the handle drops.
fn stage_base64(payload: &str) -> Result<Vec<u8>, UploadError> {
    // Strip a data-URL prefix ("data:image/png;base64,....") if present.
    let raw = if payload.starts_with("data:") {
        payload.split_once(',').map(|(_, rest)| rest).unwrap_or(payload)
    } else {
        payload
    };
    let decoded = BASE64
        .decode(raw.trim())
        .map_err(|_| UploadError::Validation("Invalid base64 data".into()))?;

    let mut staging = tempfile::NamedTempFile::new()
        .map_err(|e| UploadError::Transport(format!("temp file: {e}")))?;
    staging
        .write_all(&decoded)
        .map_err(|e| UploadError::Transport(format!("temp file: {e}")))?;
    let bytes = std::fs::read(staging.path())
        .map_err(|e| UploadError::Transport(format!("temp file: {e}")))?;
    Ok(bytes)
}

/// Caller-supplied names reach every transport (filesystem join, FTP STOR,
/// constructed URLs) verbatim; anything that could leave the target directory
/// is refused rather than normalized.
fn validate_filename(name: &str) -> Result<(), UploadError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(UploadError::Validation("Invalid filename".into()));
    }
    Ok(())
}

fn extension_of(filename: &str) -> Option<&str> {
    let ext = filename.rsplit_once('.').map(|(_, e)| e)?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Sniff content MIME against the fixed allow-list.
fn sniff_extension(bytes: &[u8]) -> Result<String, UploadError> {
    let mime = infer::get(bytes).map(|t| t.mime_type().to_string());
    match mime.as_deref() {
        Some("image/jpeg") => Ok("jpg".into()),
        Some("image/png") => Ok("png".into()),
        Some("image/gif") => Ok("gif".into()),
        Some("image/webp") => Ok("webp".into()),
        _ => Err(UploadError::UnsupportedFormat),
    }
}

pub fn mime_for_extension(extension: &str) -> String {
    match extension.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg".into(),
        ext => format!("image/{ext}"),
    }
}

/// All violations are reported before anything is persisted.
fn validate_image(bytes: &[u8], extension: &str) -> Result<(), UploadError> {
    if bytes.len() > MAX_FILE_SIZE {
        return Err(UploadError::Validation(format!(
            "File size exceeds maximum allowed size of {}MB",
            MAX_FILE_SIZE / 1024 / 1024
        )));
    }
    if !ALLOWED_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
        return Err(UploadError::Validation(format!(
            "File type not allowed. Allowed types: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    let mime = infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_default();
    if !mime.starts_with("image/") {
        return Err(UploadError::Validation("File must be an image".into()));
    }
    let img = image::load_from_memory(bytes)
        .map_err(|_| UploadError::Validation("File is not a valid image".into()))?;
    let (width, height) = img.dimensions();
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(UploadError::Validation(format!(
            "Image dimensions exceed maximum allowed size of {MAX_DIMENSION}x{MAX_DIMENSION}px"
        )));
    }
    Ok(())
}

fn generate_filename(extension: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{timestamp}_{random}.{extension}")
}

// ---------------- Local filesystem transport ----------------

pub struct LocalTransport {
    images_dir: PathBuf,
    public_base: String,
}

impl LocalTransport {
    pub fn new(cfg: LocalConfig) -> Self {
        Self {
            images_dir: cfg.storage_root.join("images"),
            public_base: cfg.public_base,
        }
    }
}

#[async_trait]
impl UploadTransport for LocalTransport {
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError> {
        tokio::fs::create_dir_all(&self.images_dir)
            .await
            .map_err(|e| UploadError::Transport(format!("create storage dir: {e}")))?;
        let path = self.images_dir.join(filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| UploadError::Transport(format!("write '{}': {e}", path.display())))?;
        Ok(format!("{}/{}", self.public_base.trim_end_matches('/'), filename))
    }
}

// ---------------- Remote HTTP API transport ----------------

pub struct HttpTransport {
    cfg: HttpConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(cfg: HttpConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { cfg, client }
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(format!("{}/upload.php", self.cfg.server_url.trim_end_matches('/')))
            .bearer_auth(&self.cfg.api_key)
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(format!("remote upload: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Transport(format!(
                "remote server returned {status}: {body}"
            )));
        }
        // Only the success flag is trusted; the URL is always built locally.
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UploadError::Transport(format!("remote upload response: {e}")))?;
        if body.get("success").and_then(|v| v.as_bool()) != Some(true) {
            return Err(UploadError::Transport("remote server upload failed".into()));
        }
        Ok(format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), filename))
    }
}

// ---------------- FTP transport ----------------

pub struct FtpTransport {
    cfg: FtpConfig,
}

impl FtpTransport {
    pub fn new(cfg: FtpConfig) -> Self {
        Self { cfg }
    }

    fn put_once(cfg: &FtpConfig, filename: &str, bytes: &[u8]) -> Result<(), suppaftp::FtpError> {
        let mut ftp = FtpStream::connect((cfg.host.as_str(), cfg.port))?;
        ftp.login(&cfg.username, &cfg.password)?;
        ftp.set_mode(Mode::Passive);
        ftp.transfer_type(FileType::Binary)?;
        if ftp.cwd(&cfg.directory).is_err() {
            Self::make_directory_tree(&mut ftp, &cfg.directory)?;
            ftp.cwd(&cfg.directory)?;
        }
        ftp.put_file(filename, &mut Cursor::new(bytes))?;
        let _ = ftp.quit();
        Ok(())
    }

    fn make_directory_tree(
        ftp: &mut FtpStream,
        directory: &str,
    ) -> Result<(), suppaftp::FtpError> {
        let mut current = String::new();
        for part in directory.trim_matches('/').split('/') {
            current.push('/');
            current.push_str(part);
            if ftp.cwd(&current).is_err() {
                ftp.mkdir(&current)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UploadTransport for FtpTransport {
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError> {
        let cfg = self.cfg.clone();
        let name = filename.to_string();
        let data = bytes.to_vec();
        let result = tokio::task::spawn_blocking(move || {
            match Self::put_once(&cfg, &name, &data) {
                Ok(()) => Ok(()),
                Err(first) => {
                    // Stale or half-open sessions are the common failure; one
                    // fresh connection covers them before giving up.
                    warn!("ftp upload failed, retrying on a fresh session: {first}");
                    Self::put_once(&cfg, &name, &data)
                }
            }
        })
        .await
        .map_err(|e| UploadError::Transport(format!("ftp task: {e}")))?;

        result.map_err(|e| UploadError::Transport(format!("ftp upload: {e}")))?;
        // The URL is constructed, never read back from the server listing.
        Ok(format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), filename))
    }
}
