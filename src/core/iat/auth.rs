//! Request signing for the IAT WebSocket handshake.
//!
//! The server authenticates the upgrade request from three query parameters:
//! `authorization`, `date` and `host`. The authorization value is a base64
//! encoded header that carries an HMAC-SHA256 signature over
//!
//! ```text
//! host: <host>
//! date: <RFC 1123 date>
//! GET <path> HTTP/1.1
//! ```
//!
//! keyed with the API secret. The server rejects dates too far from its own
//! clock, so a signed URL is only usable for a few minutes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;
use time::macros::format_description;
use url::form_urlencoded;

use super::config::IatEndpoint;
use crate::errors::{IatError, IatResult};

type HmacSha256 = Hmac<Sha256>;

/// Algorithm name embedded in the authorization header.
pub const SIGNATURE_ALGORITHM: &str = "hmac-sha256";

/// Names of the signed lines, in signing order.
pub const SIGNED_HEADERS: &str = "host date request-line";

/// Format a UTC timestamp as an RFC 1123 HTTP date, e.g. `Mon, 19 Oct 2026 08:00:00 GMT`.
pub fn rfc1123_date(at: OffsetDateTime) -> IatResult<String> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    at.to_offset(time::UtcOffset::UTC)
        .format(&format)
        .map_err(|e| IatError::Configuration(format!("Failed to format request date: {e}")))
}

/// Build the canonical string the signature is computed over.
pub fn signature_origin(host: &str, date: &str, path: &str) -> String {
    format!("host: {host}\ndate: {date}\nGET {path} HTTP/1.1")
}

/// HMAC-SHA256 of `origin` keyed with `api_secret`, base64 encoded.
pub fn sign(api_secret: &str, origin: &str) -> IatResult<String> {
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .map_err(|e| IatError::Configuration(format!("HMAC error: {e}")))?;
    mac.update(origin.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Base64 encoded authorization header value for `api_key` and `signature`.
pub fn authorization(api_key: &str, signature: &str) -> String {
    let header = format!(
        "api_key=\"{api_key}\", algorithm=\"{SIGNATURE_ALGORITHM}\", headers=\"{SIGNED_HEADERS}\", signature=\"{signature}\""
    );
    BASE64.encode(header.as_bytes())
}

/// Build the signed connection URL for `endpoint` at `date`.
///
/// Deterministic for a given key, secret and date.
pub fn build_signed_url(
    endpoint: &IatEndpoint,
    api_key: &str,
    api_secret: &str,
    date: &str,
) -> IatResult<String> {
    let host = endpoint.host();
    let origin = signature_origin(&host, date, endpoint.path());
    let signature = sign(api_secret, &origin)?;
    let authorization = authorization(api_key, &signature);

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("authorization", &authorization)
        .append_pair("date", date)
        .append_pair("host", &host)
        .finish();

    Ok(format!("{}?{}", endpoint.base_url(), query))
}

/// Sign for the current wall-clock time.
pub fn build_signed_url_now(
    endpoint: &IatEndpoint,
    api_key: &str,
    api_secret: &str,
) -> IatResult<String> {
    let date = rfc1123_date(OffsetDateTime::now_utc())?;
    build_signed_url(endpoint, api_key, api_secret, &date)
}

/// Strip the query string so a signed URL can be logged.
pub(crate) fn redact_query(url: &str) -> &str {
    url.split_once('?').map(|(base, _)| base).unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::iat::config::{IAT_HOST, IAT_PATH};
    use time::macros::datetime;

    const DATE: &str = "Mon, 19 Oct 2026 08:00:00 GMT";

    fn query_param(url: &str, name: &str) -> Option<String> {
        let query = url.split_once('?')?.1;
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_rfc1123_date() {
        let date = rfc1123_date(datetime!(2026-10-19 08:00:00 UTC)).unwrap();
        assert_eq!(date, DATE);

        let date = rfc1123_date(datetime!(2026-01-05 23:09:07 UTC)).unwrap();
        assert_eq!(date, "Mon, 05 Jan 2026 23:09:07 GMT");
    }

    #[test]
    fn test_rfc1123_date_converts_to_utc() {
        let date = rfc1123_date(datetime!(2026-10-19 16:00:00 +08:00)).unwrap();
        assert_eq!(date, DATE);
    }

    #[test]
    fn test_signature_origin_layout() {
        let origin = signature_origin(IAT_HOST, DATE, IAT_PATH);
        assert_eq!(
            origin,
            "host: ws-api.xfyun.cn\ndate: Mon, 19 Oct 2026 08:00:00 GMT\nGET /v2/iat HTTP/1.1"
        );
        assert!(!origin.ends_with('\n'));
    }

    #[test]
    fn test_known_signature() {
        let origin = signature_origin(IAT_HOST, DATE, IAT_PATH);
        assert_eq!(
            sign("S", &origin).unwrap(),
            "5eEdvr5eezNqJBsTE9QFNm4DlPQpFzAHYM6Cz8xCIH4="
        );
    }

    #[test]
    fn test_known_signed_url() {
        let url = build_signed_url(&IatEndpoint::default(), "K", "S", DATE).unwrap();
        assert_eq!(
            url,
            "wss://ws-api.xfyun.cn/v2/iat?authorization=YXBpX2tleT0iSyIsIGFsZ29yaXRobT0iaG1hYy1zaGEyNTYiLCBoZWFkZXJzPSJob3N0IGRhdGUgcmVxdWVzdC1saW5lIiwgc2lnbmF0dXJlPSI1ZUVkdnI1ZWV6TnFKQnNURTlRRk5tNERsUFFwRnpBSFlNNkN6OHhDSUg0PSI%3D&date=Mon%2C+19+Oct+2026+08%3A00%3A00+GMT&host=ws-api.xfyun.cn"
        );
    }

    #[test]
    fn test_signed_url_is_deterministic() {
        let endpoint = IatEndpoint::default();
        let first = build_signed_url(&endpoint, "K", "S", DATE).unwrap();
        let second = build_signed_url(&endpoint, "K", "S", DATE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_secret_and_date_change_authorization() {
        let endpoint = IatEndpoint::default();
        let base = build_signed_url(&endpoint, "K", "S", DATE).unwrap();
        let other_secret = build_signed_url(&endpoint, "K", "S2", DATE).unwrap();
        let other_date =
            build_signed_url(&endpoint, "K", "S", "Mon, 19 Oct 2026 08:00:01 GMT").unwrap();

        let auth = query_param(&base, "authorization").unwrap();
        assert_ne!(auth, query_param(&other_secret, "authorization").unwrap());
        assert_ne!(auth, query_param(&other_date, "authorization").unwrap());
    }

    #[test]
    fn test_authorization_decodes_to_header() {
        let url = build_signed_url(&IatEndpoint::default(), "K", "S", DATE).unwrap();
        let auth = query_param(&url, "authorization").unwrap();
        let decoded = String::from_utf8(BASE64.decode(auth).unwrap()).unwrap();

        assert!(decoded.starts_with("api_key=\"K\", algorithm=\"hmac-sha256\""));
        assert!(decoded.contains("headers=\"host date request-line\""));
        assert!(decoded.contains("signature=\"5eEdvr5eezNqJBsTE9QFNm4DlPQpFzAHYM6Cz8xCIH4=\""));
    }

    #[test]
    fn test_host_and_path_are_vendor_endpoint() {
        let url = build_signed_url(&IatEndpoint::default(), "K", "S", DATE).unwrap();
        assert!(url.starts_with("wss://ws-api.xfyun.cn/v2/iat?"));
        assert_eq!(query_param(&url, "host").as_deref(), Some(IAT_HOST));
        assert_eq!(query_param(&url, "date").as_deref(), Some(DATE));
    }

    #[test]
    fn test_custom_endpoint_signs_its_own_host() {
        let endpoint = IatEndpoint::parse("ws://127.0.0.1:9001/v2/iat").unwrap();
        let url = build_signed_url(&endpoint, "K", "S", DATE).unwrap();
        assert!(url.starts_with("ws://127.0.0.1:9001/v2/iat?"));
        assert_eq!(query_param(&url, "host").as_deref(), Some("127.0.0.1:9001"));
    }

    #[test]
    fn test_redact_query() {
        assert_eq!(
            redact_query("wss://ws-api.xfyun.cn/v2/iat?authorization=abc"),
            "wss://ws-api.xfyun.cn/v2/iat"
        );
        assert_eq!(redact_query("wss://host/path"), "wss://host/path");
    }
}
