use crate::prelude::*;

use axum::{
    Json,
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
};

use super::AppContext;
use super::actor::RequestLocale;
use super::error::ApiError;
use crate::backup::import::RestoreReport;
use crate::base::{Actor, Role};
use crate::messages::{Notice, notice};

const BACKUP_FIELD: &str = "backup";

type ApiResult<T> = std::result::Result<T, ApiError>;

pub async fn export_snapshot(
    State(ctx): State<AppContext>,
    actor: Actor,
) -> ApiResult<impl IntoResponse> {
    actor.require(&[Role::Admin])?;
    let snapshot = ctx.backup.export().await?;
    let body = serde_json::to_vec_pretty(&snapshot).map_err(Error::from)?;
    let disposition = format!("attachment; filename=\"{}\"", snapshot.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

#[derive(Serialize)]
pub struct RestoreResponse {
    success: bool,
    message: &'static str,
    results: RestoreReport,
}

fn is_json_upload(file_name: Option<&str>, content_type: Option<&str>) -> bool {
    let by_type = content_type.is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.starts_with("application/json") || ct.starts_with("text/json")
    });
    let by_name = file_name.is_some_and(|n| n.to_ascii_lowercase().ends_with(".json"));
    by_type || by_name
}

pub async fn restore_snapshot(
    State(ctx): State<AppContext>,
    actor: Actor,
    RequestLocale(locale): RequestLocale,
    mut multipart: Multipart,
) -> ApiResult<Json<RestoreResponse>> {
    actor.require(&[Role::Admin])?;
    let max_size = ctx.settings.uploads.max_backup_size_bytes;

    let mut payload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(BACKUP_FIELD) {
            continue;
        }
        if !is_json_upload(field.file_name(), field.content_type()) {
            api_bail!("the backup file must be JSON");
        }
        let bytes = field.bytes().await?;
        if bytes.len() > max_size {
            api_bail!("the backup file exceeds {max_size} bytes");
        }
        payload = Some(bytes);
        break;
    }
    let Some(payload) = payload else {
        api_bail!("no `{BACKUP_FIELD}` file in the request");
    };

    let results = ctx.backup.restore(&payload, &actor).await?;
    let message = if results.is_complete() {
        notice(Notice::RestoreCompleted, locale)
    } else {
        notice(Notice::RestorePartial, locale)
    };
    Ok(Json(RestoreResponse {
        success: true,
        message,
        results,
    }))
}
