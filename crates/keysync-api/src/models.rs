// Wire types for the control-plane REST API.
//
// Field names follow the server's JSON; status responses have been seen in
// both camelCase and snake_case, so both spellings are accepted.

use serde::{Deserialize, Serialize};

// ── Authentication ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct FederatedLoginRequest<'a> {
    pub token: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PhoneLoginRequest<'a> {
    pub phone: &'a str,
}

/// Successful response from either login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// The account's master identity, used for status and key lookups.
    pub uuid: String,
    #[serde(default)]
    pub email: String,
    /// Key material issued with this login, if any.
    #[serde(default)]
    pub key: Option<String>,
    /// Identity of the primary, auto-provisioned key inside `key`.
    #[serde(default)]
    pub key_uuid: Option<String>,
}

// ── Status ──────────────────────────────────────────────────────────

/// Subscription and quota state for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub uuid: String,
    #[serde(alias = "is_active")]
    pub is_active: bool,
    #[serde(alias = "expiry_date", default)]
    pub expiry_date: String,
    #[serde(alias = "data_limit_gb", default)]
    pub data_limit_gb: f64,
    #[serde(alias = "daily_usage_bytes", default)]
    pub daily_usage_bytes: u64,
    #[serde(default)]
    pub protocol: String,
    #[serde(alias = "usage_percentage", default)]
    pub usage_percentage: f64,
    #[serde(alias = "in_grace_period", default)]
    pub in_grace_period: bool,
    #[serde(alias = "grace_remaining_hours", default)]
    pub grace_remaining_hours: f64,
    #[serde(alias = "warnings_sent", default)]
    pub warnings_sent: Vec<String>,
}

// ── Issued keys ─────────────────────────────────────────────────────

/// A key the control-plane has issued to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedKey {
    pub id: i64,
    pub user_uuid: String,
    pub key_name: String,
    pub protocol: String,
    pub server_address: String,
    pub server_port: u16,
    #[serde(default)]
    pub key_uuid: Option<String>,
    #[serde(default)]
    pub key_password: Option<String>,
    #[serde(default)]
    pub config_link: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl IssuedKey {
    /// The text handed to the key parser: the config link, or the key name
    /// when the server did not store one.
    pub fn import_text(&self) -> &str {
        self.config_link
            .as_deref()
            .filter(|link| !link.trim().is_empty())
            .unwrap_or(&self.key_name)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct IssuedKeysResponse {
    #[serde(default)]
    pub keys: Vec<IssuedKey>,
}

/// SQLite-backed servers send `is_active` as `0`/`1`, others as a bool.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

// ── Plans & payment ─────────────────────────────────────────────────

/// Payment instructions, support contact, and purchasable protocols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCatalog {
    pub payment: PaymentInfo,
    pub support: SupportInfo,
    #[serde(default)]
    pub protocols: Vec<ProtocolPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub kbz: String,
    pub wave: String,
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportInfo {
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolPlan {
    pub code: String,
    pub name: String,
}

/// Result of uploading a payment slip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub transaction_id: String,
}

/// A payment slip image to upload for verification.
#[derive(Debug, Clone)]
pub struct PaymentSlip {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

// ── Error body ──────────────────────────────────────────────────────

/// FastAPI-style error envelope: `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}
