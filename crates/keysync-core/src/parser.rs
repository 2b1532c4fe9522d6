// ── Key material parser ──
//
// Turns opaque key material (one or more share links, or a base64
// subscription blob) into proxy configuration records. Pure: no I/O,
// never fails past its boundary. Links that do not decode are skipped,
// so an unrecognisable input yields an empty vector.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::model::{ProxyConfig, ProxyKind};

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decode every recognisable link in `raw`, in input order.
pub fn parse(raw: &str) -> Vec<ProxyConfig> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let expanded;
    let text = if raw.contains("://") {
        raw
    } else {
        let compact: String = raw.split_whitespace().collect();
        match decode_base64_text(&compact) {
            Some(decoded) => {
                expanded = decoded;
                expanded.as_str()
            }
            None => {
                debug!(len = raw.len(), "key material is neither links nor a subscription blob");
                return Vec::new();
            }
        }
    };

    text.split_whitespace()
        .filter_map(|link| {
            let parsed = parse_link(link);
            if parsed.is_none() {
                debug!(link = %redact(link), "skipping undecodable link");
            }
            parsed
        })
        .collect()
}

/// Decode one share link.
pub fn parse_link(link: &str) -> Option<ProxyConfig> {
    let (scheme, rest) = link.split_once("://")?;
    match scheme.to_ascii_lowercase().as_str() {
        "vless" => parse_vless(link, rest),
        "vmess" => parse_vmess(link, rest),
        "trojan" => parse_trojan(link, rest),
        "ss" => parse_shadowsocks(link, rest),
        "tuic" => parse_tuic(link, rest),
        "hysteria2" | "hy2" => parse_hysteria2(link, rest),
        _ => None,
    }
}

// ── Per-scheme decoders ─────────────────────────────────────────────

fn parse_vless(link: &str, rest: &str) -> Option<ProxyConfig> {
    let parts = LinkParts::split(rest)?;
    let uuid = decode_component(parts.userinfo?);
    if uuid.is_empty() {
        return None;
    }
    Some(parts.into_config(
        link,
        ProxyKind::Vless { uuid: uuid.clone() },
        Some(uuid),
    ))
}

fn parse_trojan(link: &str, rest: &str) -> Option<ProxyConfig> {
    let parts = LinkParts::split(rest)?;
    let password = decode_component(parts.userinfo?);
    if password.is_empty() {
        return None;
    }
    Some(parts.into_config(link, ProxyKind::Trojan { password }, None))
}

fn parse_tuic(link: &str, rest: &str) -> Option<ProxyConfig> {
    let parts = LinkParts::split(rest)?;
    let userinfo = decode_component(parts.userinfo?);
    let (uuid, password) = match userinfo.split_once(':') {
        Some((uuid, password)) => (uuid.to_owned(), password.to_owned()),
        None => (userinfo.clone(), String::new()),
    };
    if uuid.is_empty() {
        return None;
    }
    Some(parts.into_config(
        link,
        ProxyKind::Tuic {
            uuid: uuid.clone(),
            password,
        },
        Some(uuid),
    ))
}

fn parse_hysteria2(link: &str, rest: &str) -> Option<ProxyConfig> {
    let parts = LinkParts::split(rest)?;
    let password = decode_component(parts.userinfo?);
    if password.is_empty() {
        return None;
    }
    Some(parts.into_config(link, ProxyKind::Hysteria2 { password }, None))
}

fn parse_shadowsocks(link: &str, rest: &str) -> Option<ProxyConfig> {
    let body = rest.split('#').next().unwrap_or_default();
    if body.contains('@') {
        // SIP002: userinfo is base64(method:password) or plain method:password
        let parts = LinkParts::split(rest)?;
        let userinfo = parts.userinfo?;
        let plain = decode_component(userinfo);
        let credentials = if plain.contains(':') {
            plain
        } else {
            decode_base64_text(&plain)?
        };
        let (method, password) = credentials.split_once(':')?;
        let kind = ProxyKind::Shadowsocks {
            method: method.to_owned(),
            password: password.to_owned(),
        };
        Some(parts.into_config(link, kind, None))
    } else {
        // Legacy: base64(method:password@host:port)#tag
        let (encoded, tag) = match rest.split_once('#') {
            Some((encoded, tag)) => (encoded, Some(tag)),
            None => (rest, None),
        };
        let decoded = decode_base64_text(encoded.trim_end_matches('/'))?;
        let mut reassembled = decoded;
        if let Some(tag) = tag {
            reassembled.push('#');
            reassembled.push_str(tag);
        }
        let parts = LinkParts::split(&reassembled)?;
        let (method, password) = parts.userinfo?.split_once(':')?;
        let kind = ProxyKind::Shadowsocks {
            method: method.to_owned(),
            password: password.to_owned(),
        };
        Some(parts.into_config(link, kind, None))
    }
}

fn parse_vmess(link: &str, rest: &str) -> Option<ProxyConfig> {
    let encoded = rest.split('#').next().unwrap_or_default();
    let json = decode_base64_text(encoded)?;
    let value: serde_json::Value = serde_json::from_str(&json).ok()?;
    let obj = value.as_object()?;

    let field = |key: &str| -> Option<String> {
        match obj.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    let server = field("add").filter(|s| !s.is_empty())?;
    let port: u16 = field("port")?.trim().parse().ok().filter(|p| *p != 0)?;
    let uuid = field("id").filter(|s| !s.is_empty())?;
    let alter_id = field("aid").and_then(|a| a.parse().ok()).unwrap_or(0);
    let cipher = field("scy")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "auto".into());

    let options: BTreeMap<String, String> = obj
        .keys()
        .filter(|k| !matches!(k.as_str(), "v" | "ps" | "add" | "port" | "id" | "aid" | "scy"))
        .filter_map(|k| field(k).filter(|v| !v.is_empty()).map(|v| (k.clone(), v)))
        .collect();

    let mut config = ProxyConfig {
        kind: ProxyKind::Vmess {
            uuid: uuid.clone(),
            alter_id,
            cipher,
        },
        server,
        port,
        embedded_identity: Some(uuid),
        name: String::new(),
        raw_link: link.to_owned(),
        options,
    };
    config.name = field("ps")
        .map(|ps| ps.trim().to_owned())
        .filter(|ps| !ps.is_empty())
        .unwrap_or_else(|| config.endpoint());
    Some(config)
}

// ── Link splitting ──────────────────────────────────────────────────

/// `[userinfo@]host:port[/path][?query][#fragment]`, split but not decoded.
struct LinkParts<'a> {
    userinfo: Option<&'a str>,
    host: String,
    port: u16,
    query: Option<&'a str>,
    fragment: Option<&'a str>,
}

impl<'a> LinkParts<'a> {
    fn split(rest: &'a str) -> Option<Self> {
        let (rest, fragment) = match rest.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (rest, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };
        // userinfo may itself contain '/' (standard base64), so split it
        // off before looking for the path
        let (userinfo, hostport) = match rest.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, rest),
        };
        let hostport = hostport.split('/').next().unwrap_or_default();

        let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']')?;
            (host, tail.strip_prefix(':')?)
        } else {
            hostport.rsplit_once(':')?
        };
        let port: u16 = port.parse().ok().filter(|p| *p != 0)?;
        if host.is_empty() {
            return None;
        }

        Some(Self {
            userinfo,
            host: host.to_owned(),
            port,
            query,
            fragment,
        })
    }

    fn options(&self) -> BTreeMap<String, String> {
        self.query
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (decode_component(k), decode_component(v)),
                None => (decode_component(pair), String::new()),
            })
            .collect()
    }

    fn into_config(
        self,
        link: &str,
        kind: ProxyKind,
        embedded_identity: Option<String>,
    ) -> ProxyConfig {
        let options = self.options();
        let mut config = ProxyConfig {
            kind,
            server: self.host,
            port: self.port,
            embedded_identity,
            name: String::new(),
            raw_link: link.to_owned(),
            options,
        };
        config.name = self
            .fragment
            .map(decode_component)
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| config.endpoint());
        config
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn decode_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Decode base64 (standard or URL-safe, padding optional) into UTF-8.
fn decode_base64_text(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let engine = if s.contains(['-', '_']) {
        &URL_SAFE_LENIENT
    } else {
        &STANDARD_LENIENT
    };
    let bytes = engine.decode(s).ok()?;
    String::from_utf8(bytes).ok()
}

/// Scheme plus host part only; never log secrets.
fn redact(link: &str) -> String {
    let scheme = link.split("://").next().unwrap_or_default();
    let host = link
        .split_once('@')
        .map(|(_, tail)| tail.split(['?', '#', '/']).next().unwrap_or_default())
        .unwrap_or("?");
    format!("{scheme}://***@{host}")
}
