//! ID & Cookie Service (C10) — generates `vid`/`sid`/`cid` identifiers and
//! reconciles them against whatever a request's cookies and client-supplied
//! `zar` block already carry. Grounded on
//! `original_source/.../utils.py::create_vid/create_sid/create_cid/
//! get_zar_ids` and spec §4.6's cookie-reconciliation rules.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::IdentityError;

const BASE36_DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36_DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 alphabet is ASCII")
}

/// `to_base36(unix_ms) + "." + to_base36(random)`, matching the client-side
/// `Date.now().toString(36) + '.' + Math.random().toString(36).substring(2)`
/// shape (the random suffix here is a plain random u64 rather than a
/// digit-for-digit port of Python's float-string slicing, which has no
/// stable meaning outside that implementation).
pub fn create_vid(now_unix_ms: u64) -> String {
    format!("{}.{}", to_base36(now_unix_ms), to_base36(rand::random::<u64>()))
}

pub fn create_sid() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn create_cid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One `{id, isNew, visits, origReferrer, t, resetParamValue?}` cookie
/// payload (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZarId {
    pub id: String,
    #[serde(rename = "isNew")]
    pub is_new: bool,
    pub visits: u64,
    #[serde(rename = "origReferrer", default)]
    pub orig_referrer: String,
    pub t: u64,
    #[serde(rename = "resetParamValue", skip_serializing_if = "Option::is_none", default)]
    pub reset_param_value: Option<String>,
    #[serde(rename = "cookie_mismatch", skip_serializing_if = "Option::is_none", default)]
    pub cookie_mismatch: Option<bool>,
    #[serde(rename = "session_reset", skip_serializing_if = "Option::is_none", default)]
    pub session_reset: Option<bool>,
}

impl ZarId {
    pub fn fresh(id: String, now_unix_ms: u64, orig_referrer: String) -> Self {
        ZarId {
            id,
            is_new: true,
            visits: 1,
            orig_referrer,
            t: now_unix_ms,
            reset_param_value: None,
            cookie_mismatch: None,
            session_reset: None,
        }
    }

    /// Decode a URL-encoded JSON cookie value.
    pub fn decode(raw: &str) -> Result<Self, IdentityError> {
        let decoded = urlencoding::decode(raw)
            .map(|cow| cow.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        Ok(serde_json::from_str(&decoded)?)
    }

    /// URL-encode this cookie value as JSON, for the `Set-Cookie` header.
    pub fn encode(&self) -> String {
        let raw = serde_json::to_string(self).expect("ZarId always serializes");
        urlencoding::encode(&raw).into_owned()
    }
}

/// `{vid, sid, cid}` cookie payload, plus whether the session was rotated
/// this call (spec §4.6: session-reset clears the pool cookie).
#[derive(Debug, Clone)]
pub struct ZarIds {
    pub vid: ZarId,
    pub sid: ZarId,
    pub cid: ZarId,
    pub session_reset: bool,
}

/// Reconcile server-generated ids against an incoming client `zar` block
/// and existing cookies, matching `get_zar_ids` plus the cookie max-age
/// reconciliation described in spec §4.6:
/// - a cookie-borne sid/cid always overrides whatever the client body says
///   (and flags `cookie_mismatch` when they disagree);
/// - the first call for a new vid increments `visits` and flips `isNew`
///   to `false` on the next one;
/// - if `reset_param_value` is present in the request and differs from the
///   cookie's stored value, the session is rotated (`session_reset=true`).
pub fn reconcile(
    zar_body: Option<&Map<String, Value>>,
    cookie_sid: Option<ZarId>,
    cookie_cid: Option<ZarId>,
    cookie_vid: Option<ZarId>,
    now_unix_ms: u64,
    orig_referrer: &str,
    request_reset_param_value: Option<&str>,
) -> ZarIds {
    let body_field = |key: &str| -> Option<ZarId> {
        zar_body?.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    };

    let mut vid = cookie_vid
        .or_else(|| body_field("vid"))
        .unwrap_or_else(|| ZarId::fresh(create_vid(now_unix_ms), now_unix_ms, orig_referrer.to_string()));

    let mut sid = body_field("sid").unwrap_or_else(|| ZarId::fresh(create_sid(), now_unix_ms, orig_referrer.to_string()));
    if let Some(cookie) = cookie_sid {
        if cookie.id != sid.id {
            sid.id = cookie.id;
            sid.cookie_mismatch = Some(true);
        }
    }

    let mut cid = body_field("cid").unwrap_or_else(|| ZarId::fresh(create_cid(), now_unix_ms, orig_referrer.to_string()));
    if let Some(cookie) = cookie_cid {
        if cookie.id != cid.id {
            cid.id = cookie.id;
            cid.cookie_mismatch = Some(true);
        }
    }

    if !vid.is_new {
        vid.visits += 1;
    }
    vid.is_new = false;

    let mut session_reset = false;
    if let Some(reset_value) = request_reset_param_value {
        if sid.reset_param_value.as_deref() != Some(reset_value) {
            sid = ZarId::fresh(create_sid(), now_unix_ms, orig_referrer.to_string());
            sid.reset_param_value = Some(reset_value.to_string());
            sid.session_reset = Some(true);
            session_reset = true;
        }
    }

    ZarIds {
        vid,
        sid,
        cid,
        session_reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn vid_has_dotted_shape() {
        let vid = create_vid(1_700_000_000_000);
        assert!(vid.contains('.'));
    }

    #[test]
    fn cookie_sid_overrides_body_and_flags_mismatch() {
        let mut body = Map::new();
        body.insert(
            "sid".to_string(),
            serde_json::to_value(ZarId::fresh("body-sid".into(), 1, String::new())).unwrap(),
        );
        let cookie_sid = ZarId::fresh("cookie-sid".into(), 1, String::new());
        let ids = reconcile(Some(&body), Some(cookie_sid), None, None, 2, "", None);
        assert_eq!(ids.sid.id, "cookie-sid");
        assert_eq!(ids.sid.cookie_mismatch, Some(true));
    }

    #[test]
    fn reset_param_rotates_session() {
        let mut existing_sid = ZarId::fresh("old-sid".into(), 1, String::new());
        existing_sid.reset_param_value = Some("v1".to_string());
        let ids = reconcile(None, Some(existing_sid), None, None, 2, "", Some("v2"));
        assert!(ids.session_reset);
        assert_ne!(ids.sid.id, "old-sid");
    }

    #[test]
    fn vid_increments_visits_after_first_call() {
        let mut vid = ZarId::fresh("v1".into(), 1, String::new());
        vid.is_new = false;
        let ids = reconcile(None, None, None, Some(vid), 2, "", None);
        assert_eq!(ids.vid.visits, 2);
        assert!(!ids.vid.is_new);
    }
}
