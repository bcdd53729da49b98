//! HTTP surface.

use crate::prelude::*;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};

use crate::backup::BackupService;
use crate::blob::BlobClient;
use crate::cases::CaseService;
use crate::cases::attachments::AttachmentSynchronizer;
use crate::cases::store::CaseStore;
use crate::persistence::RecordStore;
use crate::settings::Settings;

pub mod actor;
pub mod backup;
pub mod cases;
pub mod error;
pub mod forms;

use error::ErrorBody;

/// Everything a request handler needs. Built once at start-up.
#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub records: Arc<dyn RecordStore>,
    pub blobs: BlobClient,
    pub cases: CaseService,
    pub backup: BackupService,
}

impl AppContext {
    pub fn new(settings: Settings, records: Arc<dyn RecordStore>, blobs: BlobClient) -> Self {
        let cases = CaseService::new(
            CaseStore::new(records.clone()),
            AttachmentSynchronizer::new(blobs.clone(), settings.uploads.clone()),
        );
        let backup = BackupService::new(records.clone());
        Self {
            settings: Arc::new(settings),
            records,
            blobs,
            cases,
            backup,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    record_store: &'static str,
    blob_store: &'static str,
}

fn check_status<E: std::fmt::Display>(
    what: &str,
    result: std::result::Result<(), E>,
) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(err) => {
            warn!("Health check: {what} unavailable: {err:#}");
            "unavailable"
        }
    }
}

async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    let (records, blobs) = tokio::join!(ctx.records.ping(), ctx.blobs.ping());
    let record_store = check_status("record store", records);
    let blob_store = check_status("blob store", blobs);
    let healthy = record_store == "ok" && blob_store == "ok";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" },
            record_store,
            blob_store,
        }),
    )
}

/// Re-renders error messages in the caller's locale.
async fn localize_errors(State(ctx): State<AppContext>, request: Request, next: Next) -> Response {
    let locale = actor::request_locale(request.headers(), ctx.settings.locale);
    let response = next.run(request).await;
    match response.extensions().get::<ErrorBody>() {
        Some(body) if body.locale != locale => {
            let body = body.clone().localized(locale);
            let status = response.status();
            let mut localized = (status, Json(body.clone())).into_response();
            localized.extensions_mut().insert(body);
            localized
        }
        _ => response,
    }
}

pub fn router(ctx: AppContext) -> Router {
    let limits = &ctx.settings.uploads;

    let case_routes = Router::new()
        .route("/cases", post(cases::create_case).get(cases::list_cases))
        .route("/cases/pending", get(cases::pending_cases))
        .route("/cases/upcoming", get(cases::upcoming_cases))
        .route("/cases/stats", get(cases::case_stats))
        .route(
            "/cases/{id}",
            get(cases::get_case)
                .put(cases::update_case)
                .delete(cases::delete_case),
        )
        .route("/cases/{id}/approval", patch(cases::review_case))
        .layer(DefaultBodyLimit::max(limits.max_case_body_bytes()));

    let backup_routes = Router::new()
        .route("/backup/full", get(backup::export_snapshot))
        .route("/backup/restore", post(backup::restore_snapshot))
        .layer(DefaultBodyLimit::max(
            limits.max_backup_size_bytes.saturating_add(64 * 1024),
        ));

    Router::new()
        .route("/health", get(health))
        .merge(case_routes)
        .merge(backup_routes)
        .layer(middleware::from_fn_with_state(ctx.clone(), localize_errors))
        .with_state(ctx)
}
