//! Portal API routes for the request lifecycle.
//!
//! - `GET  /api/requests`                       — role-scoped listing with filters and pagination
//! - `POST /api/requests`                       — submit a new expense request
//! - `POST /api/requests/{id}/transition`       — apply a lifecycle event
//! - `POST /api/requests/{id}/receipts/{kind}`  — attach a transfer/nota receipt
//! - `GET  /api/requests/export`                — CSV export of the visible filtered set
//!
//! Caller identity arrives from the external auth gateway as an
//! `x-user-id` header (plus `x-gateway-secret` when configured) and is
//! resolved against the user store; the portal owns no credentials.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tracing::{info, warn};
use uuid::Uuid;

use siteops_core::config::AppConfig;
use siteops_core::domain::request::{
    Division, ExpenseRequest, ReceiptKind, RequestId, RequestStatus,
};
use siteops_core::domain::site::SiteId;
use siteops_core::domain::user::User;
use siteops_core::errors::{ApplicationError, DomainError, InterfaceError};
use siteops_core::lifecycle::{plan_transition, receipt_gate, submit, RequestEvent, SubmitInput};
use siteops_core::reporting::{
    apply_filter, division_buckets, page_info, page_slice, total_amount, DivisionBucket, PageInfo,
    ReportFilter,
};
use siteops_core::visibility::visible_for;
use siteops_core::{export::export_csv, UserId};
use siteops_db::repositories::{
    RequestFilter, RequestRepository, SiteRepository, SqlRequestRepository, SqlSiteRepository,
    SqlUserRepository, UserRepository,
};
use siteops_db::DbPool;

#[derive(Clone)]
pub struct PortalState {
    db_pool: DbPool,
    config: Arc<AppConfig>,
}

impl PortalState {
    pub fn new(db_pool: DbPool, config: Arc<AppConfig>) -> Self {
        Self { db_pool, config }
    }

    fn requests(&self) -> SqlRequestRepository {
        SqlRequestRepository::new(self.db_pool.clone())
    }

    fn sites(&self) -> SqlSiteRepository {
        SqlSiteRepository::new(self.db_pool.clone())
    }

    fn users(&self) -> SqlUserRepository {
        SqlUserRepository::new(self.db_pool.clone())
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<String>,
    pub division: Option<String>,
    pub site_id: Option<String>,
    pub activity_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub pic: Option<String>,
    pub search: Option<String>,
    pub page: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub requests: Vec<ExpenseRequest>,
    pub page: PageInfo,
    pub page_label: String,
    pub buckets: Vec<DivisionBucket>,
    pub total_amount: i64,
    pub total_amount_display: String,
    pub refreshed_at: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub activity_id: String,
    pub request_type: String,
    pub detail_plan: String,
    pub division: String,
    pub date: Option<DateTime<Utc>>,
    pub nominal: String,
    pub bank: String,
    pub bank_account_number: String,
    pub rpm: Option<String>,
    pub rpm_id: Option<String>,
    pub site_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub event: String,
    /// Optional optimistic-concurrency guard: the status the caller
    /// last observed. A mismatch means someone else acted first.
    pub expected_status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct FieldErrorView {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldErrorView>,
}

type ApiFailure = (StatusCode, Json<ApiError>);

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(db_pool: DbPool, config: Arc<AppConfig>) -> Router {
    let receipts_dir = config.receipts.dir.clone();

    Router::new()
        .route("/api/requests", get(list_requests).post(submit_request))
        .route("/api/requests/export", get(export_requests))
        .route("/api/requests/{id}/transition", post(transition_request))
        .route("/api/requests/{id}/receipts/{kind}", post(upload_receipt))
        .nest_service("/receipts", ServeDir::new(receipts_dir))
        .with_state(PortalState::new(db_pool, config))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn interface_status(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(error: ApplicationError, correlation_id: &str) -> ApiFailure {
    let field_errors = match &error {
        ApplicationError::Domain(DomainError::Validation { field_errors }) => field_errors
            .iter()
            .map(|fe| FieldErrorView { field: fe.field.to_string(), message: fe.message.clone() })
            .collect(),
        _ => Vec::new(),
    };

    let interface = error.into_interface(correlation_id);
    let status = interface_status(&interface);
    let payload = ApiError {
        error: interface.user_message().to_string(),
        detail: interface.to_string(),
        correlation_id: correlation_id.to_string(),
        field_errors,
    };

    if status.is_server_error() {
        warn!(
            event_name = "portal.request_failed",
            correlation_id = correlation_id,
            status = status.as_u16(),
            detail = %payload.detail,
            "portal request failed"
        );
    }

    (status, Json(payload))
}

fn persistence_failure(
    error: siteops_db::repositories::RepositoryError,
    correlation_id: &str,
) -> ApiFailure {
    failure(ApplicationError::Persistence(error.to_string()), correlation_id)
}

fn plain_failure(status: StatusCode, detail: &str, correlation_id: &str) -> ApiFailure {
    (
        status,
        Json(ApiError {
            error: detail.to_string(),
            detail: detail.to_string(),
            correlation_id: correlation_id.to_string(),
            field_errors: Vec::new(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

async fn authenticate(
    state: &PortalState,
    headers: &HeaderMap,
    correlation_id: &str,
) -> Result<User, ApiFailure> {
    if let Some(secret) = &state.config.auth.gateway_secret {
        let presented = headers.get("x-gateway-secret").and_then(|value| value.to_str().ok());
        if presented != Some(secret.expose_secret()) {
            return Err(plain_failure(
                StatusCode::FORBIDDEN,
                "missing or invalid gateway secret",
                correlation_id,
            ));
        }
    }

    let Some(user_id) = headers.get("x-user-id").and_then(|value| value.to_str().ok()) else {
        return Err(plain_failure(
            StatusCode::UNAUTHORIZED,
            "missing x-user-id identity header",
            correlation_id,
        ));
    };

    match state.users().find_by_id(&UserId(user_id.to_string())).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(plain_failure(
            StatusCode::UNAUTHORIZED,
            "unknown portal user",
            correlation_id,
        )),
        Err(error) => Err(persistence_failure(error, correlation_id)),
    }
}

// ---------------------------------------------------------------------------
// Filter scope
// ---------------------------------------------------------------------------

fn parse_query_date(
    field: &str,
    raw: &Option<String>,
    correlation_id: &str,
) -> Result<Option<DateTime<Utc>>, ApiFailure> {
    match raw {
        None => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| {
                plain_failure(
                    StatusCode::BAD_REQUEST,
                    &format!("{field} must be an RFC 3339 timestamp"),
                    correlation_id,
                )
            }),
    }
}

fn build_scope(
    query: &ListQuery,
    correlation_id: &str,
) -> Result<(RequestFilter, ReportFilter, usize), ApiFailure> {
    let status = match &query.status {
        None => None,
        Some(raw) => Some(RequestStatus::parse(raw).ok_or_else(|| {
            plain_failure(
                StatusCode::BAD_REQUEST,
                &format!("unknown status `{raw}`"),
                correlation_id,
            )
        })?),
    };

    let date_from = parse_query_date("date_from", &query.date_from, correlation_id)?;
    let date_to = parse_query_date("date_to", &query.date_to, correlation_id)?;

    let store_filter = RequestFilter {
        status,
        division: query.division.as_deref().map(Division::parse),
        rpm: None,
        site_id: query.site_id.clone().map(SiteId),
        activity_id: query.activity_id.clone(),
        date_from,
        date_to,
    };

    let report_filter = ReportFilter {
        date_from,
        date_to,
        activity_id: query.activity_id.clone(),
        site_id: query.site_id.clone(),
        region: query.region.clone(),
        city: query.city.clone(),
        pic: query.pic.clone(),
        search: query.search.clone(),
    };

    Ok((store_filter, report_filter, query.page.unwrap_or(1)))
}

async fn visible_scope(
    state: &PortalState,
    user: &User,
    store_filter: &RequestFilter,
    report_filter: &ReportFilter,
    correlation_id: &str,
) -> Result<(Vec<ExpenseRequest>, HashMap<String, siteops_core::SiteAssignment>), ApiFailure> {
    let requests = state
        .requests()
        .list(store_filter)
        .await
        .map_err(|error| persistence_failure(error, correlation_id))?;

    let sites = state
        .sites()
        .list()
        .await
        .map_err(|error| persistence_failure(error, correlation_id))?
        .into_iter()
        .map(|site| (site.site_id.0.clone(), site))
        .collect::<HashMap<_, _>>();

    let scoped: Vec<ExpenseRequest> = {
        let visible = visible_for(&requests, user);
        apply_filter(&visible, report_filter, &sites).into_iter().cloned().collect()
    };

    Ok((scoped, sites))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn list_requests(
    State(state): State<PortalState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<(StatusCode, Json<ListResponse>), ApiFailure> {
    let correlation_id = Uuid::new_v4().to_string();
    let user = authenticate(&state, &headers, &correlation_id).await?;
    let (store_filter, report_filter, page) = build_scope(&query, &correlation_id)?;

    let (scoped, _sites) =
        visible_scope(&state, &user, &store_filter, &report_filter, &correlation_id).await?;
    let refs: Vec<&ExpenseRequest> = scoped.iter().collect();

    let buckets = division_buckets(&refs);
    let total = total_amount(&refs);
    let page = page_info(refs.len(), page);
    let window: Vec<ExpenseRequest> =
        page_slice(&refs, &page).iter().map(|request| (*request).clone()).collect();

    Ok((
        StatusCode::OK,
        Json(ListResponse {
            requests: window,
            page,
            page_label: page.label(),
            buckets,
            total_amount: total.0,
            total_amount_display: total.format_idr(),
            refreshed_at: Utc::now().to_rfc3339(),
        }),
    ))
}

pub async fn submit_request(
    State(state): State<PortalState>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<ExpenseRequest>), ApiFailure> {
    let correlation_id = Uuid::new_v4().to_string();
    let user = authenticate(&state, &headers, &correlation_id).await?;
    let now = Utc::now();

    let input = SubmitInput {
        activity_id: body.activity_id,
        request_type: body.request_type,
        detail_plan: body.detail_plan,
        division: Division::parse(&body.division),
        date: body.date.unwrap_or(now),
        nominal: body.nominal,
        bank: body.bank,
        bank_account_number: body.bank_account_number,
        rpm: body.rpm,
        rpm_id: body.rpm_id.map(UserId),
        site_ref: body.site_id.map(SiteId),
    };

    let request = submit(input, &user, now)
        .map_err(|error| failure(ApplicationError::Domain(error), &correlation_id))?;

    state
        .requests()
        .save(request.clone())
        .await
        .map_err(|error| persistence_failure(error, &correlation_id))?;

    info!(
        event_name = "portal.request_submitted",
        correlation_id = %correlation_id,
        request_id = %request.id.0,
        status = request.status.as_str(),
        "expense request submitted"
    );

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn transition_request(
    State(state): State<PortalState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Result<(StatusCode, Json<ExpenseRequest>), ApiFailure> {
    let correlation_id = Uuid::new_v4().to_string();
    let user = authenticate(&state, &headers, &correlation_id).await?;
    let repo = state.requests();
    let request_id = RequestId(id);

    let request = repo
        .find_by_id(&request_id)
        .await
        .map_err(|error| persistence_failure(error, &correlation_id))?
        .ok_or_else(|| {
            failure(
                ApplicationError::NotFound { kind: "request", id: request_id.0.clone() },
                &correlation_id,
            )
        })?;

    let event = RequestEvent::parse(&body.event).ok_or_else(|| {
        plain_failure(
            StatusCode::BAD_REQUEST,
            &format!("unknown lifecycle event `{}`", body.event),
            &correlation_id,
        )
    })?;

    if let Some(expected) = &body.expected_status {
        let expected = RequestStatus::parse(expected).ok_or_else(|| {
            plain_failure(
                StatusCode::BAD_REQUEST,
                &format!("unknown status `{expected}`"),
                &correlation_id,
            )
        })?;
        if expected != request.status {
            return Err(failure(
                ApplicationError::Domain(DomainError::InvalidTransition {
                    from: request.status,
                    event,
                }),
                &correlation_id,
            ));
        }
    }

    let plan = plan_transition(&request, &event, &user)
        .map_err(|error| failure(ApplicationError::Domain(error), &correlation_id))?;

    let applied = repo
        .apply_transition(&request_id, &plan, Utc::now())
        .await
        .map_err(|error| persistence_failure(error, &correlation_id))?;
    if !applied {
        // A concurrent actor won the race; surface it as already processed.
        return Err(failure(
            ApplicationError::Domain(DomainError::InvalidTransition { from: plan.from, event }),
            &correlation_id,
        ));
    }

    let updated = repo
        .find_by_id(&request_id)
        .await
        .map_err(|error| persistence_failure(error, &correlation_id))?
        .ok_or_else(|| {
            failure(
                ApplicationError::NotFound { kind: "request", id: request_id.0.clone() },
                &correlation_id,
            )
        })?;

    info!(
        event_name = "portal.request_transitioned",
        correlation_id = %correlation_id,
        request_id = %request_id.0,
        from = plan.from.as_str(),
        to = plan.to.as_str(),
        event = event.as_str(),
        actor = %user.name,
        "expense request transitioned"
    );

    Ok((StatusCode::OK, Json(updated)))
}

pub async fn upload_receipt(
    State(state): State<PortalState>,
    headers: HeaderMap,
    Path((id, kind)): Path<(String, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<ReceiptResponse>), ApiFailure> {
    let correlation_id = Uuid::new_v4().to_string();
    let _user = authenticate(&state, &headers, &correlation_id).await?;
    let repo = state.requests();
    let request_id = RequestId(id);

    let kind = ReceiptKind::parse(&kind).ok_or_else(|| {
        plain_failure(
            StatusCode::BAD_REQUEST,
            &format!("unknown receipt kind `{kind}`"),
            &correlation_id,
        )
    })?;

    let request = repo
        .find_by_id(&request_id)
        .await
        .map_err(|error| persistence_failure(error, &correlation_id))?
        .ok_or_else(|| {
            failure(
                ApplicationError::NotFound { kind: "request", id: request_id.0.clone() },
                &correlation_id,
            )
        })?;

    receipt_gate(&request, &kind)
        .map_err(|error| failure(ApplicationError::Domain(error), &correlation_id))?;

    if body.is_empty() {
        return Err(plain_failure(
            StatusCode::BAD_REQUEST,
            "receipt body must not be empty",
            &correlation_id,
        ));
    }
    if body.len() as u64 > state.config.receipts.max_bytes {
        return Err(plain_failure(
            StatusCode::PAYLOAD_TOO_LARGE,
            &format!("receipt exceeds the {} byte limit", state.config.receipts.max_bytes),
            &correlation_id,
        ));
    }

    // The file must be fully persisted before the URL becomes visible.
    let file_name = format!("{}-{}-{}.bin", request_id.0, kind.as_str(), Uuid::new_v4());
    let path = state.config.receipts.dir.join(&file_name);
    tokio::fs::create_dir_all(&state.config.receipts.dir)
        .await
        .map_err(|error| {
            failure(ApplicationError::Integration(error.to_string()), &correlation_id)
        })?;
    tokio::fs::write(&path, &body).await.map_err(|error| {
        failure(ApplicationError::Integration(error.to_string()), &correlation_id)
    })?;

    let url =
        format!("{}/{}", state.config.receipts.base_url.trim_end_matches('/'), file_name);
    let updated = repo
        .set_receipt_url(&request_id, &kind, &url, Utc::now())
        .await
        .map_err(|error| persistence_failure(error, &correlation_id))?;
    if !updated {
        return Err(failure(
            ApplicationError::NotFound { kind: "request", id: request_id.0.clone() },
            &correlation_id,
        ));
    }

    info!(
        event_name = "portal.receipt_attached",
        correlation_id = %correlation_id,
        request_id = %request_id.0,
        kind = kind.as_str(),
        "receipt attached"
    );

    Ok((StatusCode::OK, Json(ReceiptResponse { url })))
}

pub async fn export_requests(
    State(state): State<PortalState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiFailure> {
    let correlation_id = Uuid::new_v4().to_string();
    let user = authenticate(&state, &headers, &correlation_id).await?;
    let (store_filter, report_filter, _page) = build_scope(&query, &correlation_id)?;

    let (scoped, sites) =
        visible_scope(&state, &user, &store_filter, &report_filter, &correlation_id).await?;
    let refs: Vec<&ExpenseRequest> = scoped.iter().collect();

    let bytes = export_csv(&refs, &sites).map_err(|error| {
        failure(ApplicationError::Integration(error.to_string()), &correlation_id)
    })?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"expense-requests.csv\""),
        ],
        bytes,
    ))
}
