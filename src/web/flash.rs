//! One-shot notices carried across a redirect in a short-lived cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Serialize;
use time::Duration;

const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    fn encode(&self) -> String {
        let kind = match self.kind {
            FlashKind::Success => "s",
            FlashKind::Error => "e",
        };
        URL_SAFE_NO_PAD.encode(format!("{}:{}", kind, self.message))
    }

    fn decode(raw: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        let (kind, message) = text.split_once(':')?;
        let kind = match kind {
            "s" => FlashKind::Success,
            "e" => FlashKind::Error,
            _ => return None,
        };
        Some(Self {
            kind,
            message: message.to_string(),
        })
    }
}

/// Queues `flash` for the next page render.
pub fn set(jar: CookieJar, flash: Flash) -> CookieJar {
    let cookie = Cookie::build((FLASH_COOKIE, flash.encode()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(1))
        .build();
    jar.add(cookie)
}

/// Reads and clears the pending notice, if any.
pub fn take(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let flash = jar.get(FLASH_COOKIE).and_then(|c| Flash::decode(c.value()));
    if jar.get(FLASH_COOKIE).is_none() {
        return (jar, None);
    }
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/").build());
    (jar, flash)
}
