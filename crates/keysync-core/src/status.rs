// ── Status reporting ──
//
// Presentation-ready view of a control-plane status response: protocol
// label, usage in GiB, clamped percentage and a coarse usage band.

use serde::Serialize;

use keysync_api::UserStatus;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Coarse usage level, for colouring and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UsageBand {
    Normal,
    Elevated,
    High,
    Critical,
}

impl UsageBand {
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            95.. => Self::Critical,
            65.. => Self::High,
            30.. => Self::Elevated,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Identity the status was queried with.
    pub identity: String,
    pub active: bool,
    pub expiry_date: String,
    pub protocol: String,
    pub protocol_label: String,
    pub data_limit_gb: f64,
    pub used_gb: f64,
    /// Server-reported usage, clamped to `0..=100`.
    pub usage_percentage: u8,
    pub band: UsageBand,
    pub in_grace_period: bool,
    pub grace_remaining_hours: u32,
    pub warnings_sent: Vec<String>,
}

impl StatusReport {
    pub fn from_status(identity: impl Into<String>, status: UserStatus) -> Self {
        let usage_percentage = clamp_percentage(status.usage_percentage);
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let used_gb = status.daily_usage_bytes as f64 / BYTES_PER_GIB;

        Self {
            identity: identity.into(),
            active: status.is_active,
            expiry_date: status.expiry_date,
            protocol_label: protocol_label(&status.protocol),
            protocol: status.protocol,
            data_limit_gb: status.data_limit_gb,
            used_gb,
            usage_percentage,
            band: UsageBand::from_percentage(usage_percentage),
            in_grace_period: status.in_grace_period,
            grace_remaining_hours: whole_hours(status.grace_remaining_hours),
            warnings_sent: status.warnings_sent,
        }
    }
}

/// Human label for a control-plane protocol code.
pub fn protocol_label(code: &str) -> String {
    match code {
        "vless_limited" => "VLESS Limited (12 Mbps)".into(),
        "vless" => "VLESS Reality".into(),
        "tuic" => "TUIC".into(),
        "vlessplain" => "VLESS + TLS".into(),
        "ss" => "Shadowsocks".into(),
        "ss_legacy" => "Shadowsocks (Legacy)".into(),
        "admin_tuic" => "Admin TUIC".into(),
        other => other.to_uppercase(),
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
fn clamp_percentage(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, 100.0) as u8
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
fn whole_hours(raw: f64) -> u32 {
    if raw.is_nan() || raw <= 0.0 {
        return 0;
    }
    raw.min(f64::from(u32::MAX)) as u32
}
