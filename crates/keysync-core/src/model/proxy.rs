// ── Proxy configuration records ──
//
// What the key parser produces: one protocol-specific connection
// descriptor per link. Records are immutable once parsed; the embedded
// identity is lifted out of the protocol variant so matching never has
// to inspect the variant itself.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Protocol-specific connection secrets.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[serde(tag = "protocol", rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProxyKind {
    Vless {
        uuid: String,
    },
    Vmess {
        uuid: String,
        alter_id: u32,
        cipher: String,
    },
    Trojan {
        password: String,
    },
    Shadowsocks {
        method: String,
        password: String,
    },
    Tuic {
        uuid: String,
        password: String,
    },
    Hysteria2 {
        password: String,
    },
}

/// One parsed proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub kind: ProxyKind,
    pub server: String,
    pub port: u16,
    /// Credential id carried inside the link, when the protocol has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_identity: Option<String>,
    /// Name carried by the link itself.
    pub name: String,
    /// The link exactly as it was parsed, for copy/export.
    pub raw_link: String,
    /// Transport and security parameters, sorted by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

// ── Placeholder ─────────────────────────────────────────────────────

const PLACEHOLDER_SERVER: &str = "127.0.0.1";
const PLACEHOLDER_PORT: u16 = 8388;
const PLACEHOLDER_METHOD: &str = "chacha20-ietf-poly1305";
const PLACEHOLDER_PASSWORD: &str = "placeholder";

impl ProxyConfig {
    /// The embedded identity, treating an empty string as absent.
    pub fn identity(&self) -> Option<&str> {
        self.embedded_identity
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    /// Lower-case protocol name (`vless`, `shadowsocks`, ...).
    pub fn protocol(&self) -> &'static str {
        (&self.kind).into()
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn endpoint(&self) -> String {
        if self.server.contains(':') {
            format!("[{}]:{}", self.server, self.port)
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }

    /// Deterministic loopback record used when an account has no keys.
    ///
    /// The same `name` always yields an identical record, so repeated
    /// fallbacks can recognise and reuse an earlier placeholder.
    pub fn placeholder(name: &str) -> Self {
        let userinfo =
            URL_SAFE_NO_PAD.encode(format!("{PLACEHOLDER_METHOD}:{PLACEHOLDER_PASSWORD}"));
        let raw_link = format!(
            "ss://{userinfo}@{PLACEHOLDER_SERVER}:{PLACEHOLDER_PORT}#{}",
            utf8_percent_encode(name, NON_ALPHANUMERIC)
        );
        Self {
            kind: ProxyKind::Shadowsocks {
                method: PLACEHOLDER_METHOD.into(),
                password: PLACEHOLDER_PASSWORD.into(),
            },
            server: PLACEHOLDER_SERVER.into(),
            port: PLACEHOLDER_PORT,
            embedded_identity: None,
            name: name.into(),
            raw_link,
            options: BTreeMap::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.server == PLACEHOLDER_SERVER
            && self.port == PLACEHOLDER_PORT
            && matches!(
                &self.kind,
                ProxyKind::Shadowsocks { password, .. } if password == PLACEHOLDER_PASSWORD
            )
    }
}
