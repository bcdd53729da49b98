//! Request identity and locale, as set by the authenticating gateway.

use crate::prelude::*;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use super::AppContext;
use super::error::ApiError;
use crate::base::{Actor, Role};
use crate::messages::Locale;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor> {
    let id = header_str(headers, ACTOR_ID_HEADER)
        .and_then(|v| v.parse::<Uuid>().ok())
        .ok_or(Error::Unauthorized)?;
    let role = header_str(headers, ACTOR_ROLE_HEADER)
        .and_then(|v| v.parse::<Role>().ok())
        .ok_or(Error::Unauthorized)?;
    Ok(Actor::new(id, role))
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(actor_from_headers(&parts.headers)?)
    }
}

/// Locale for user-facing messages: `Accept-Language` if it names a supported
/// language, the configured default otherwise.
pub fn request_locale(headers: &HeaderMap, default: Locale) -> Locale {
    header_str(headers, axum::http::header::ACCEPT_LANGUAGE.as_str())
        .and_then(Locale::from_accept_language)
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy)]
pub struct RequestLocale(pub Locale);

impl FromRequestParts<AppContext> for RequestLocale {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(RequestLocale(request_locale(
            &parts.headers,
            state.settings.locale,
        )))
    }
}
