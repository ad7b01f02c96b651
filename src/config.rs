use std::path::PathBuf;
use std::time::Duration;

/// Immutable upload configuration, resolved once at startup. Handlers never
/// read transport settings from the environment directly.
#[derive(Debug, Clone)]
pub enum UploadTransportConfig {
    Local(LocalConfig),
    Ftp(FtpConfig),
    Http(HttpConfig),
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Physical directory backing the public `/storage/` path.
    pub storage_root: PathBuf,
    /// Public URL prefix for uploaded images.
    pub public_base: String,
}

#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub directory: String,
    /// Base URL prepended to the filename; the FTP listing is never queried.
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub server_url: String,
    pub api_key: String,
    pub base_url: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} is required for the '{1}' upload method")]
    MissingVar(&'static str, &'static str),
    #[error("Invalid upload method '{0}'. Must be \"http\", \"ftp\" or \"local\"")]
    InvalidMethod(String),
}

fn required(name: &'static str, method: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(name, method))
}

pub fn storage_root_from_env() -> PathBuf {
    std::env::var("STORAGE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("storage/app/public"))
}

impl UploadTransportConfig {
    /// Fails fast when the selected method is missing its settings, before
    /// any upload is attempted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let method = std::env::var("UPLOAD_METHOD").unwrap_or_else(|_| "local".into());
        match method.as_str() {
            "local" => Ok(Self::Local(LocalConfig {
                storage_root: storage_root_from_env(),
                public_base: "/storage/images".into(),
            })),
            "ftp" => Ok(Self::Ftp(FtpConfig {
                host: required("REMOTE_SERVER_FTP_HOST", "ftp")?,
                port: std::env::var("REMOTE_SERVER_FTP_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(21),
                username: required("REMOTE_SERVER_FTP_USERNAME", "ftp")?,
                password: required("REMOTE_SERVER_FTP_PASSWORD", "ftp")?,
                directory: std::env::var("REMOTE_SERVER_FTP_DIRECTORY")
                    .unwrap_or_else(|_| "/public_html/myimages".into()),
                base_url: required("REMOTE_SERVER_BASE_URL", "ftp")?,
            })),
            "http" => Ok(Self::Http(HttpConfig {
                server_url: required("REMOTE_SERVER_URL", "http")?,
                api_key: required("REMOTE_SERVER_API_KEY", "http")?,
                base_url: required("REMOTE_SERVER_BASE_URL", "http")?,
            })),
            other => Err(ConfigError::InvalidMethod(other.to_string())),
        }
    }
}

/// External authentication API (login delegation + webs-views passthrough).
#[derive(Debug, Clone)]
pub struct AuthApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl AuthApiConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("AUTH_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.tibaan.example/api".into()),
            timeout: Duration::from_secs(
                std::env::var("AUTH_API_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(15),
            ),
        }
    }
}
