use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;

/// 1x1 transparent PNG served whenever the real image cannot be produced.
/// `<img>` tags must always receive renderable bytes, never an empty body.
pub const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0xDA, 0x63, 0x64,
    0x60, 0xF8, 0x5F, 0x0F, 0x00, 0x02, 0x87, 0x01, 0x80, 0xEB, 0x47, 0xBA, 0x92, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Where the bytes physically came from; reported via `X-Proxy-Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    Local,
    Remote,
}

impl ImageOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageOrigin::Local => "local",
            ImageOrigin::Remote => "success",
        }
    }
}

/// Typed outcome of the resolve step; converted to HTTP at the boundary.
#[derive(Debug)]
pub enum Resolution {
    Found {
        bytes: Vec<u8>,
        mime: &'static str,
        last_modified: DateTime<Utc>,
        origin: ImageOrigin,
    },
    NotFound,
    UpstreamError,
}

pub struct ImageProxy {
    storage_root: PathBuf,
    client: reqwest::Client,
}

impl ImageProxy {
    pub fn new(storage_root: PathBuf) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("Noticiero Image Proxy/1.0")
            .build()
            .expect("reqwest client");
        Self { storage_root, client }
    }

    /// A stored value with the `/storage/` marker is local; anything else is
    /// treated as an external URL.
    pub fn is_local_storage_url(url: &str) -> bool {
        url.contains("/storage/")
    }

    /// Map a public URL back to the physical file under the storage root.
    /// `http://host/storage/images/a.jpg` -> `<root>/images/a.jpg`.
    pub fn local_path_for(storage_root: &Path, url: &str) -> Option<PathBuf> {
        let (_, rest) = url.split_once("/storage/")?;
        let rest = rest.split(['?', '#']).next().unwrap_or(rest);
        if rest.is_empty() || rest.split('/').any(|seg| seg == "..") {
            return None;
        }
        Some(storage_root.join(rest))
    }

    pub async fn resolve(&self, ruta: &str) -> Resolution {
        if Self::is_local_storage_url(ruta) {
            self.resolve_local(ruta).await
        } else {
            self.resolve_remote(ruta).await
        }
    }

    async fn resolve_local(&self, ruta: &str) -> Resolution {
        let Some(path) = Self::local_path_for(&self.storage_root, ruta) else {
            return Resolution::NotFound;
        };
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(_) => return Resolution::NotFound,
        };
        let last_modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Resolution::Found {
            mime: mime_from_extension(ruta),
            bytes,
            last_modified,
            origin: ImageOrigin::Local,
        }
    }

    async fn resolve_remote(&self, url: &str) -> Resolution {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("remote image fetch failed url={url}: {e}");
                return Resolution::UpstreamError;
            }
        };
        if !response.status().is_success() {
            warn!("remote image fetch url={url} status={}", response.status());
            return Resolution::NotFound;
        }
        match response.bytes().await {
            Ok(bytes) => Resolution::Found {
                mime: mime_from_extension(url),
                bytes: bytes.to_vec(),
                // Origin timestamps aren't queried; now() is close enough
                // for a 1-hour cache window.
                last_modified: Utc::now(),
                origin: ImageOrigin::Remote,
            },
            Err(e) => {
                warn!("remote image body read failed url={url}: {e}");
                Resolution::UpstreamError
            }
        }
    }
}

/// Extension lookup only, no content sniffing: a lying extension mis-tags the
/// response, which callers tolerate.
pub fn mime_from_extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit_once('.').map(|(_, e)| e.to_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        _ => "image/jpeg",
    }
}

/// RFC 7231 HTTP-date for the Last-Modified header.
pub fn http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_lookup_table() {
        assert_eq!(mime_from_extension("/storage/images/a.png"), "image/png");
        assert_eq!(mime_from_extension("https://cdn.example.com/x.JPG?v=2"), "image/jpeg");
        assert_eq!(mime_from_extension("foto.webp"), "image/webp");
        // unknown extensions default to jpeg
        assert_eq!(mime_from_extension("archivo.dat"), "image/jpeg");
        assert_eq!(mime_from_extension("sin-extension"), "image/jpeg");
    }

    #[test]
    fn local_marker_detection() {
        assert!(ImageProxy::is_local_storage_url("/storage/images/a.jpg"));
        assert!(ImageProxy::is_local_storage_url("http://localhost:8000/storage/images/a.jpg"));
        assert!(!ImageProxy::is_local_storage_url("https://cdn.example.com/images/a.jpg"));
    }

    #[test]
    fn local_path_mapping() {
        let root = Path::new("/var/storage");
        assert_eq!(
            ImageProxy::local_path_for(root, "http://localhost/storage/images/a.jpg"),
            Some(PathBuf::from("/var/storage/images/a.jpg"))
        );
        assert_eq!(ImageProxy::local_path_for(root, "https://cdn.example.com/a.jpg"), None);
        // traversal is refused
        assert_eq!(ImageProxy::local_path_for(root, "/storage/../secrets"), None);
    }

    #[test]
    fn placeholder_is_a_valid_png() {
        image::load_from_memory(PLACEHOLDER_PNG).expect("placeholder must decode");
    }

    #[actix_web::test]
    async fn missing_local_file_resolves_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = ImageProxy::new(dir.path().to_path_buf());
        let res = proxy.resolve("/storage/images/desaparecida.jpg").await;
        assert!(matches!(res, Resolution::NotFound));
    }

    #[actix_web::test]
    async fn local_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/foto.png"), PLACEHOLDER_PNG).unwrap();
        let proxy = ImageProxy::new(dir.path().to_path_buf());
        match proxy.resolve("/storage/images/foto.png").await {
            Resolution::Found { bytes, mime, origin, .. } => {
                assert_eq!(bytes, PLACEHOLDER_PNG);
                assert_eq!(mime, "image/png");
                assert_eq!(origin, ImageOrigin::Local);
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }
}
