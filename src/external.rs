use log::{error, warn};
use serde_json::Value;

use crate::config::AuthApiConfig;

/// Generic user-facing message; upstream internals are logged, never exposed.
pub const CONNECTION_ERROR_MSG: &str = "Error de conexión con el servidor de autenticación";

#[derive(thiserror::Error, Debug)]
pub enum ExternalApiError {
    /// Network-level failure or non-2xx from the auth server.
    #[error("{CONNECTION_ERROR_MSG}")]
    Connection,
    /// The auth server answered but rejected the operation.
    #[error("{message}")]
    Rejected { message: String },
}

/// Fields of interest from the external login payload; everything else is
/// passed through untouched.
#[derive(Debug, Clone)]
pub struct ExternalUser {
    pub name: String,
}

/// Client for the third-party auth API: credential checks, token validation
/// and the webs-views passthrough all go through here.
pub struct ExternalAuthClient {
    cfg: AuthApiConfig,
    client: reqwest::Client,
}

impl ExternalAuthClient {
    pub fn new(cfg: AuthApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .expect("reqwest client");
        Self { cfg, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Delegate a credential check. The upstream contract is
    /// `{status: "success", data: {user: {...}}}` on success and
    /// `{msg: "..."} ` on rejection.
    pub async fn login(&self, email: &str, password: &str) -> Result<ExternalUser, ExternalApiError> {
        let response = self
            .client
            .post(self.url("auth/login"))
            .json(&serde_json::json!({"email": email, "password": password}))
            .send()
            .await
            .map_err(|e| {
                error!("external login failed email={email}: {e}");
                ExternalApiError::Connection
            })?;

        if !response.status().is_success() {
            warn!("external login email={email} status={}", response.status());
            return Err(ExternalApiError::Connection);
        }

        let body: Value = response.json().await.map_err(|e| {
            error!("external login body parse email={email}: {e}");
            ExternalApiError::Connection
        })?;

        if body.get("status").and_then(Value::as_str) != Some("success") {
            let message = body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("Credenciales incorrectas")
                .to_string();
            return Err(ExternalApiError::Rejected { message });
        }

        let user = &body["data"]["user"];
        let name = user
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                let first = user.get("firstname").and_then(Value::as_str).unwrap_or_default();
                let last = user.get("lastname").and_then(Value::as_str).unwrap_or_default();
                format!("{first} {last}").trim().to_string()
            });
        Ok(ExternalUser { name })
    }

    /// Best-effort upstream logout; failures are logged, not surfaced.
    pub async fn logout(&self, token: &str) {
        let result = self
            .client
            .post(self.url("auth/logout"))
            .bearer_auth(token)
            .send()
            .await;
        match result {
            Ok(r) if r.status().is_success() => {}
            Ok(r) => warn!("external logout status={}", r.status()),
            Err(e) => warn!("external logout failed: {e}"),
        }
    }

    /// Check an external token by hitting a protected upstream endpoint.
    pub async fn validate_token(&self, token: &str) -> Result<bool, ExternalApiError> {
        let response = self
            .client
            .get(self.url("webs-views"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                error!("external token validation failed: {e}");
                ExternalApiError::Connection
            })?;
        Ok(response.status().is_success())
    }

    /// Forward a webs-views request verbatim and hand back the upstream
    /// status and JSON body.
    pub async fn forward(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &str,
        body: Option<Value>,
    ) -> Result<(u16, Value), ExternalApiError> {
        let mut req = self.client.request(method, self.url(path)).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| {
            error!("webs-views passthrough path={path}: {e}");
            ExternalApiError::Connection
        })?;
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}
