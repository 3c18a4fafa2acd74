//! Session cookie parsing and formatting.

use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use tracing::warn;

/// Browsers drop cookies larger than this.
const MAX_COOKIE_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub max_age_seconds: u64,
}

/// Value of the cookie `name`, if the request carries it.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

/// `Set-Cookie` value storing `value` under the configured name.
pub fn session_cookie(settings: &CookieSettings, value: &str) -> Option<HeaderValue> {
    let cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        settings.name, value, settings.max_age_seconds
    );
    if cookie.len() > MAX_COOKIE_BYTES {
        warn!(
            bytes = cookie.len(),
            "Session cookie exceeds {} bytes and may be dropped by the browser", MAX_COOKIE_BYTES
        );
    }

    match HeaderValue::from_str(&cookie) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Cannot encode session cookie: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CookieSettings {
        CookieSettings {
            name: "jaltol_session".to_string(),
            max_age_seconds: 60,
        }
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; jaltol_session=v1.abc.def; other=1"),
        );
        assert_eq!(
            read_cookie(&headers, "jaltol_session").as_deref(),
            Some("v1.abc.def")
        );
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_cookie_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("jaltol_session=v1.x.y"));
        assert_eq!(
            read_cookie(&headers, "jaltol_session").as_deref(),
            Some("v1.x.y")
        );
    }

    #[test]
    fn test_session_cookie_attributes() {
        let value = session_cookie(&settings(), "v1.abc.def").unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "jaltol_session=v1.abc.def; Path=/; Max-Age=60; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn test_session_cookie_rejects_control_characters() {
        assert!(session_cookie(&settings(), "bad\nvalue").is_none());
    }
}
