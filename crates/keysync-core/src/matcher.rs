// ── Identity matching & naming policy ──
//
// Both are pure functions over data the engine has already fetched.
// The pool must be listed fresh at the start of every pass.

use crate::model::{Profile, ProxyConfig};

/// Find the stored profile that represents the same remote credential.
///
/// Matches on exact embedded-identity equality, first hit in pool order.
/// A candidate without an embedded identity never matches anything.
pub fn find_existing<'a>(candidate: &ProxyConfig, pool: &'a [Profile]) -> Option<&'a Profile> {
    let identity = candidate.identity()?;
    pool.iter()
        .find(|profile| profile.embedded_identity() == Some(identity))
}

/// Whether `record` is the key the control-plane flagged as primary.
pub fn is_primary(record: &ProxyConfig, primary_key_identity: Option<&str>) -> bool {
    match (record.identity(), primary_key_identity.map(str::trim)) {
        (Some(identity), Some(primary)) if !primary.is_empty() => identity == primary,
        _ => false,
    }
}

/// Display name a profile should carry after `record` is applied.
///
/// The primary key gets the fixed auto label; every other record keeps
/// the name from its own link.
pub fn target_name(
    record: &ProxyConfig,
    primary_key_identity: Option<&str>,
    auto_label: &str,
) -> String {
    if is_primary(record, primary_key_identity) {
        auto_label.to_owned()
    } else {
        record.name.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{GroupId, NewProfile, ProfileId};
    use crate::parser::parse_link;
    use chrono::Utc;

    fn profile(id: u64, link: &str) -> Profile {
        NewProfile {
            group_id: GroupId::DEFAULT,
            owner_identity: None,
            display_name: "stored".into(),
            config: parse_link(link).unwrap(),
        }
        .into_profile(ProfileId(id), Utc::now())
    }

    #[test]
    fn matches_on_embedded_identity() {
        let pool = vec![
            profile(1, "vless://A@h:1#one"),
            profile(2, "vless://B@h:2#two"),
        ];
        let candidate = parse_link("vless://B@other:9#renamed").unwrap();
        assert_eq!(find_existing(&candidate, &pool).map(|p| p.id), Some(ProfileId(2)));
    }

    #[test]
    fn first_match_wins() {
        let pool = vec![
            profile(4, "tuic://A:x@h:1#first"),
            profile(9, "vless://A@h:2#second"),
        ];
        let candidate = parse_link("vless://A@h:3").unwrap();
        assert_eq!(find_existing(&candidate, &pool).map(|p| p.id), Some(ProfileId(4)));
    }

    #[test]
    fn empty_identity_never_matches() {
        let pool = vec![
            profile(1, "trojan://pw@h:1#t"),
            profile(2, "ss://YWVzLTEyOC1nY206cHc@h:2#s"),
        ];
        let trojan = parse_link("trojan://pw@h:1#t").unwrap();
        assert!(find_existing(&trojan, &pool).is_none());

        let mut blank = parse_link("vless://A@h:1").unwrap();
        blank.embedded_identity = Some(String::new());
        let mut blank_pool = vec![profile(3, "vless://X@h:1")];
        blank_pool[0].config.embedded_identity = Some(String::new());
        assert!(find_existing(&blank, &blank_pool).is_none());
    }

    #[test]
    fn primary_gets_auto_label() {
        let record = parse_link("vless://U1@h:1#FromLink").unwrap();
        assert_eq!(target_name(&record, Some("U1"), "Auto"), "Auto");
        assert_eq!(target_name(&record, Some("U2"), "Auto"), "FromLink");
        assert_eq!(target_name(&record, None, "Auto"), "FromLink");
        assert_eq!(target_name(&record, Some(""), "Auto"), "FromLink");
    }

    #[test]
    fn identityless_record_is_never_primary() {
        let record = parse_link("trojan://pw@h:1#T").unwrap();
        assert!(!is_primary(&record, Some("pw")));
    }
}
