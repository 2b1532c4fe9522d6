// Control-plane HTTP client
//
// Wraps `reqwest::Client` with base-URL joining, FastAPI error envelope
// decoding, and status-code classification. Every endpoint returns the
// decoded payload; the raw response never leaves this module.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{
    ErrorBody, FederatedLoginRequest, IssuedKey, IssuedKeysResponse, LoginResponse,
    PaymentReceipt, PaymentSlip, PhoneLoginRequest, PlanCatalog, UserStatus,
};
use crate::transport::TransportConfig;

/// Async client for the subscription control-plane.
///
/// Cheap to clone: `reqwest::Client` is internally reference counted.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ControlPlaneClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client for `base_url` using the given transport settings.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, base_url)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, Error> {
        let mut base_url = Url::parse(base_url)?;
        // `Url::join` drops the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    /// The control-plane base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Exchange a federated identity token for an account and key material.
    pub async fn login_federated(&self, token: &SecretString) -> Result<LoginResponse, Error> {
        let body = FederatedLoginRequest {
            token: token.expose_secret(),
        };
        self.post_json("api/auth/google", &body).await
    }

    /// Authenticate with a phone number.
    pub async fn login_phone(&self, phone: &str) -> Result<LoginResponse, Error> {
        self.post_json("api/auth/phone", &PhoneLoginRequest { phone })
            .await
    }

    // ── Account data ─────────────────────────────────────────────────

    /// Subscription and quota state for `identity`.
    pub async fn user_status(&self, identity: &str) -> Result<UserStatus, Error> {
        self.get(&format!("api/status/{identity}")).await
    }

    /// Keys issued to the account whose master identity is `owner`.
    pub async fn issued_keys(&self, owner: &str) -> Result<Vec<IssuedKey>, Error> {
        let resp: IssuedKeysResponse = self.get(&format!("api/keys/{owner}")).await?;
        Ok(resp.keys)
    }

    /// Payment instructions and purchasable protocols.
    pub async fn plan_catalog(&self) -> Result<PlanCatalog, Error> {
        self.get("api/bot/config").await
    }

    /// Upload a payment slip; on success the receipt carries a fresh key.
    pub async fn verify_payment(
        &self,
        owner: &str,
        protocol: &str,
        slip: PaymentSlip,
    ) -> Result<PaymentReceipt, Error> {
        let url = self.url("api/payment/verify")?;
        debug!("POST {url} (multipart, {} bytes)", slip.bytes.len());

        let file = reqwest::multipart::Part::bytes(slip.bytes)
            .file_name(slip.file_name)
            .mime_str(&slip.mime_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("uuid", owner.to_owned())
            .text("protocol", protocol.to_owned());

        let resp = self.http.post(url).multipart(form).send().await?;
        self.handle_response(resp).await
    }

    /// Reachability probe against the service root.
    pub async fn ping(&self) -> Result<(), Error> {
        let url = self.base_url.clone();
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        self.handle_response(resp).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        self.handle_response(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    async fn parse_error(status: StatusCode, resp: reqwest::Response) -> Error {
        let resource = resp.url().path().to_owned();
        let raw = resp.text().await.unwrap_or_default();
        let message = detail_message(&raw).unwrap_or_else(|| status.to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication { message },
            StatusCode::NOT_FOUND => Error::NotFound { resource },
            _ => Error::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

/// Pull a human-readable message out of a `{"detail": ...}` body.
///
/// `detail` is a string for handled errors and a list of objects for
/// request-validation failures.
fn detail_message(raw: &str) -> Option<String> {
    let body: ErrorBody = serde_json::from_str(raw).ok()?;
    match body.detail? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Array(items) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .map(str::to_owned)
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        other => Some(other.to_string()),
    }
}
