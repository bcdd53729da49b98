use crate::prelude::*;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt::{Debug, Display};

use crate::messages::{Locale, error_message};

#[derive(Debug)]
pub struct ApiError {
    pub err: anyhow::Error,
    pub kind: ErrorKind,
}

impl ApiError {
    pub fn new(message: &str, kind: ErrorKind) -> Self {
        Self {
            err: anyhow!("{}", message),
            kind,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        Display::fmt(&self.err, f)
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.err.source()
    }
}

/// JSON body of every error response. Also attached to the response's
/// extensions so later layers can re-render the message in another locale.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip)]
    pub kind: ErrorKind,
    #[serde(skip)]
    pub locale: Locale,
}

impl ErrorBody {
    pub fn localized(mut self, locale: Locale) -> Self {
        self.message = error_message(self.kind, locale);
        self.locale = locale;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            error!("{} {}: {:?}", status_code.as_u16(), self.kind.code(), self.err);
        } else {
            debug!("{} {}: {:#}", status_code.as_u16(), self.kind.code(), self.err);
        }
        let locale = Locale::default();
        let body = ErrorBody {
            success: false,
            error: self.kind.code(),
            message: error_message(self.kind, locale),
            // Internal failures are logged, not echoed back.
            detail: (self.kind != ErrorKind::Internal).then(|| format!("{:#}", self.err)),
            kind: self.kind,
            locale,
        };
        let mut response = (status_code, Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> ApiError {
        let kind = err.kind();
        match err {
            Error::Internal(inner) => ApiError { err: inner, kind },
            other => ApiError {
                err: other.into(),
                kind,
            },
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> ApiError {
        let err = match err.downcast::<ApiError>() {
            Ok(api_error) => return api_error,
            Err(err) => err,
        };
        match err.downcast::<Error>() {
            Ok(domain) => domain.into(),
            Err(err) => ApiError {
                err,
                kind: ErrorKind::Internal,
            },
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> ApiError {
        ApiError {
            err: anyhow!("malformed multipart body: {}", err.body_text()),
            kind: ErrorKind::Validation,
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(err: axum::extract::rejection::JsonRejection) -> ApiError {
        ApiError {
            err: anyhow!("malformed JSON body: {}", err.body_text()),
            kind: ErrorKind::Validation,
        }
    }
}

#[macro_export]
macro_rules! api_bail {
    ( $fmt:literal $(, $($arg:tt)*)?) => {
        return Err($crate::service::error::ApiError::new(&format!($fmt $(, $($arg)*)?), $crate::error::ErrorKind::Validation).into())
    };
}
