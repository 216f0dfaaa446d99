//! Reading request signals out of HTTP headers.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use base64::Engine;
use regex::Regex;
use secrecy::SecretString;
use std::collections::HashMap;

pub const X_AUTHORIZATION: &str = "x-authorization";
pub const REDIRECT_HTTP_AUTHORIZATION: &str = "redirect-http-authorization";

/// Copy `X-Authorization` into `Authorization` when the latter is missing.
/// Some FastCGI setups only forward the renamed header.
pub fn normalize_authorization(headers: &mut HeaderMap) {
    if headers.contains_key(header::AUTHORIZATION) {
        return;
    }
    if let Some(value) = headers.get(X_AUTHORIZATION).cloned() {
        headers.insert(header::AUTHORIZATION, value);
    }
}

/// Basic credentials from `Authorization` or `Redirect-Http-Authorization`,
/// with markup stripped from both parts.
#[must_use]
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, SecretString)> {
    let re = Regex::new(r"(?i)Basic\s+(.*)$").ok()?;
    let encoded = [header::AUTHORIZATION.as_str(), REDIRECT_HTTP_AUTHORIZATION]
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok())
        .find_map(|value| re.captures(value)?.get(1).map(|m| m.as_str().trim().to_string()))?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, password) = decoded.split_once(':').unwrap_or((decoded.as_str(), ""));

    Some((strip_tags(name), SecretString::from(strip_tags(password))))
}

fn strip_tags(value: &str) -> String {
    Regex::new(r"<[^>]*>").map_or_else(
        |_| value.to_string(),
        |re| re.replace_all(value, "").into_owned(),
    )
}

/// Identity asserted by the fronting web server. Falls back to the basic
/// auth user name.
#[must_use]
pub fn server_user(headers: &HeaderMap, header_name: &HeaderName) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .or_else(|| basic_credentials(headers).map(|(name, _)| name))
        .filter(|value| !value.is_empty())
}

/// `Cache-Control: max-age=0` marks a page reload.
#[must_use]
pub fn is_reload(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|directive| directive.trim().eq_ignore_ascii_case("max-age=0"))
}

/// `X-Requested-With: XMLHttpRequest`, or an `isAjax` request parameter.
#[must_use]
pub fn is_ajax(headers: &HeaderMap, params: &HashMap<String, String>) -> bool {
    let header = headers
        .get("x-requested-with")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("xmlhttprequest"));
    header
        || params
            .get("isAjax")
            .is_some_and(|value| matches!(value.as_str(), "1" | "true"))
}

/// Whether the original request used TLS, honoring `X-Forwarded-Proto`.
#[must_use]
pub fn is_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("https"))
}

#[must_use]
pub fn host(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|value: &HeaderValue| value.to_str().ok())
        .map(ToString::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn basic(user_pass: &str) -> HeaderValue {
        let encoded = base64::engine::general_purpose::STANDARD.encode(user_pass);
        HeaderValue::from_str(&format!("Basic {encoded}")).unwrap()
    }

    #[test]
    fn x_authorization_is_copied_when_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(X_AUTHORIZATION, basic("alice:secret"));
        normalize_authorization(&mut headers);
        assert!(headers.contains_key(header::AUTHORIZATION));

        let (name, password) = basic_credentials(&headers).unwrap();
        assert_eq!(name, "alice");
        assert_eq!(password.expose_secret(), "secret");
    }

    #[test]
    fn existing_authorization_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, basic("alice:one"));
        headers.insert(X_AUTHORIZATION, basic("bob:two"));
        normalize_authorization(&mut headers);
        assert_eq!(basic_credentials(&headers).unwrap().0, "alice");
    }

    #[test]
    fn redirect_header_and_tag_stripping() {
        let mut headers = HeaderMap::new();
        headers.insert(REDIRECT_HTTP_AUTHORIZATION, basic("<b>carol</b>:pa:ss"));
        let (name, password) = basic_credentials(&headers).unwrap();
        assert_eq!(name, "carol");
        assert_eq!(password.expose_secret(), "pa:ss");
    }

    #[test]
    fn non_basic_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(basic_credentials(&headers).is_none());
    }

    #[test]
    fn server_user_prefers_configured_header() {
        let name = HeaderName::from_static("x-remote-user");
        let mut headers = HeaderMap::new();
        assert_eq!(server_user(&headers, &name), None);

        headers.insert(header::AUTHORIZATION, basic("basic-user:pw"));
        assert_eq!(server_user(&headers, &name).as_deref(), Some("basic-user"));

        headers.insert(name.clone(), HeaderValue::from_static("proxy-user"));
        assert_eq!(server_user(&headers, &name).as_deref(), Some("proxy-user"));
    }

    #[test]
    fn reload_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_reload(&headers));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache, max-age=0"));
        assert!(is_reload(&headers));
    }

    #[test]
    fn ajax_detection() {
        let mut headers = HeaderMap::new();
        let mut params = HashMap::new();
        assert!(!is_ajax(&headers, &params));
        params.insert("isAjax".to_string(), "1".to_string());
        assert!(is_ajax(&headers, &params));
        params.clear();
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        assert!(is_ajax(&headers, &params));
    }
}
