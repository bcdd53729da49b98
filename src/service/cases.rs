use crate::prelude::*;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use super::AppContext;
use super::actor::RequestLocale;
use super::error::ApiError;
use super::forms::CaseForm;
use crate::base::{Actor, ApprovalStatus, Case, CaseFilter, Role, StatusScope};
use crate::cases::approval::{ApprovalAction, ApprovalOutcome};
use crate::cases::stats::{CaseStats, Period};
use crate::cases::store::{CasePage, ListParams, StatusCounts};
use crate::messages::{Notice, notice};

const EDITORS: &[Role] = &[Role::Admin, Role::Subadmin];
const ADMINS: &[Role] = &[Role::Admin];

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_case_id(raw: &str) -> Result<Uuid> {
    raw.trim().parse().map_err(|_| Error::NotFound {
        entity: "case",
        id: raw.to_string(),
    })
}

#[derive(Serialize)]
pub struct CaseResponse {
    success: bool,
    message: &'static str,
    case: Case,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseChangeResponse {
    success: bool,
    message: &'static str,
    case: Case,
    /// Removed attachments whose blobs could not be deleted.
    cleanup_errors: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseListResponse {
    success: bool,
    message: &'static str,
    cases: Vec<Case>,
    total: u64,
    page: u64,
    limit: u64,
    total_pages: u64,
    stats: StatusCounts,
}

#[derive(Serialize)]
pub struct CasesResponse {
    success: bool,
    count: usize,
    cases: Vec<Case>,
}

pub async fn create_case(
    State(ctx): State<AppContext>,
    actor: Actor,
    RequestLocale(locale): RequestLocale,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    actor.require(EDITORS)?;
    let form = CaseForm::read(multipart, &ctx.settings.uploads).await?;
    let draft = form.draft()?;
    let case = ctx.cases.create(draft, form.files, &actor).await?;
    let message = match case.approval_status {
        ApprovalStatus::Approved => notice(Notice::CaseCreated, locale),
        ApprovalStatus::Pending => notice(Notice::CaseSubmittedForApproval, locale),
    };
    Ok((
        StatusCode::CREATED,
        Json(CaseResponse {
            success: true,
            message,
            case,
        }),
    ))
}

/// Query string of `GET /cases`. Everything arrives as text; blanks are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    case_number: Option<String>,
    client_name: Option<String>,
    opponent_name: Option<String>,
    case_type: Option<String>,
    jurisdiction: Option<String>,
    year: Option<String>,
    session_date: Option<String>,
    postponed_to: Option<String>,
    status: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_opt<T: std::str::FromStr>(name: &str, value: &Option<String>) -> Result<Option<T>> {
    non_blank(value)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| Error::validation(format!("`{name}`: `{v}` is not valid")))
        })
        .transpose()
}

impl ListQuery {
    fn into_params(self) -> Result<ListParams> {
        let scope = match non_blank(&self.status) {
            None | Some("approved") => StatusScope::Approved,
            Some("pending") => StatusScope::Pending,
            Some("all") => StatusScope::All,
            Some(other) => validation_bail!("unknown status `{other}`"),
        };
        let filter = CaseFilter {
            case_number: non_blank(&self.case_number).map(str::to_string),
            client_name: non_blank(&self.client_name).map(str::to_string),
            opponent_name: non_blank(&self.opponent_name).map(str::to_string),
            case_type: non_blank(&self.case_type).map(str::to_string),
            jurisdiction: non_blank(&self.jurisdiction).map(str::to_string),
            year: parse_opt("year", &self.year)?,
            session_date: parse_opt("sessionDate", &self.session_date)?,
            postponed_to: parse_opt("postponedTo", &self.postponed_to)?,
        };
        Ok(ListParams {
            filter,
            scope,
            page: parse_opt("page", &self.page)?,
            limit: parse_opt("limit", &self.limit)?,
        })
    }
}

pub async fn list_cases(
    State(ctx): State<AppContext>,
    _actor: Actor,
    RequestLocale(locale): RequestLocale,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<CaseListResponse>> {
    let params = query.into_params()?;
    let CasePage {
        items,
        total,
        page,
        limit,
        total_pages,
        stats,
    } = ctx.cases.list(&params).await?;
    Ok(Json(CaseListResponse {
        success: true,
        message: notice(Notice::CasesListed, locale),
        cases: items,
        total,
        page,
        limit,
        total_pages,
        stats,
    }))
}

pub async fn pending_cases(
    State(ctx): State<AppContext>,
    actor: Actor,
) -> ApiResult<Json<CasesResponse>> {
    actor.require(ADMINS)?;
    let cases = ctx.cases.pending().await?;
    Ok(Json(CasesResponse {
        success: true,
        count: cases.len(),
        cases,
    }))
}

#[derive(Serialize)]
pub struct CaseStatsResponse {
    success: bool,
    stats: CaseStats,
    period: Period,
}

pub async fn case_stats(
    State(ctx): State<AppContext>,
    actor: Actor,
) -> ApiResult<Json<CaseStatsResponse>> {
    actor.require(EDITORS)?;
    let stats = ctx.cases.stats().await?;
    Ok(Json(CaseStatsResponse {
        success: true,
        period: stats.period,
        stats,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpcomingQuery {
    date: Option<String>,
}

pub async fn upcoming_cases(
    State(ctx): State<AppContext>,
    _actor: Actor,
    Query(query): Query<UpcomingQuery>,
) -> ApiResult<Json<CasesResponse>> {
    let day: Option<NaiveDate> = parse_opt("date", &query.date)?;
    let cases = ctx.cases.upcoming(day).await?;
    Ok(Json(CasesResponse {
        success: true,
        count: cases.len(),
        cases,
    }))
}

pub async fn get_case(
    State(ctx): State<AppContext>,
    _actor: Actor,
    RequestLocale(locale): RequestLocale,
    Path(id): Path<String>,
) -> ApiResult<Json<CaseResponse>> {
    let case = ctx.cases.get(parse_case_id(&id)?).await?;
    Ok(Json(CaseResponse {
        success: true,
        message: notice(Notice::CaseFetched, locale),
        case,
    }))
}

pub async fn update_case(
    State(ctx): State<AppContext>,
    actor: Actor,
    RequestLocale(locale): RequestLocale,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<CaseChangeResponse>> {
    actor.require(EDITORS)?;
    let id = parse_case_id(&id)?;
    let form = CaseForm::read(multipart, &ctx.settings.uploads).await?;
    let patch = form.patch()?;
    let deleted = form.deleted().to_vec();
    let outcome = ctx.cases.update(id, &patch, &deleted, form.files).await?;
    Ok(Json(CaseChangeResponse {
        success: true,
        message: notice(Notice::CaseUpdated, locale),
        cleanup_errors: outcome.cleanup.error_count(),
        case: outcome.case,
    }))
}

pub async fn delete_case(
    State(ctx): State<AppContext>,
    actor: Actor,
    RequestLocale(locale): RequestLocale,
    Path(id): Path<String>,
) -> ApiResult<Json<CaseChangeResponse>> {
    actor.require(ADMINS)?;
    let (case, cleanup) = ctx.cases.delete(parse_case_id(&id)?).await?;
    Ok(Json(CaseChangeResponse {
        success: true,
        message: notice(Notice::CaseDeleted, locale),
        case,
        cleanup_errors: cleanup.error_count(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    action: ApprovalAction,
}

pub async fn review_case(
    State(ctx): State<AppContext>,
    actor: Actor,
    RequestLocale(locale): RequestLocale,
    Path(id): Path<String>,
    payload: std::result::Result<Json<ReviewRequest>, JsonRejection>,
) -> ApiResult<Json<CaseChangeResponse>> {
    actor.require(ADMINS)?;
    let id = parse_case_id(&id)?;
    let Json(request) = payload?;
    let response = match ctx.cases.review(id, request.action).await? {
        ApprovalOutcome::Approved(case) => CaseChangeResponse {
            success: true,
            message: notice(Notice::CaseApproved, locale),
            case,
            cleanup_errors: 0,
        },
        ApprovalOutcome::Removed { case, cleanup } => CaseChangeResponse {
            success: true,
            message: notice(Notice::CaseRejected, locale),
            case,
            cleanup_errors: cleanup.error_count(),
        },
    };
    Ok(Json(response))
}
