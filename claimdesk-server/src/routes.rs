//! HTTP handlers for ClaimDesk server.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use actix_web::{HttpRequest, HttpResponse, Responder, delete, get, post, web};
use chrono::{NaiveDate, Utc};
use claimdesk_core::{
    AuditRecord, AuditSummary, Carrier, Case, CaseId, CaseStatus, CarrierStats, ClaimDeskError,
    ClaimType, ClipboardEntry, ClipboardManager, DisputeLetterContext, InMemoryClipboardStore,
    Priority, SearchQuery, Severity, ShipmentAuditData, SortOrder, StdFileSystem, TtlCache,
    WorkflowAction, WorkflowEvent, WorkflowOutcome, WorkflowRegistry, WorkflowTrigger,
    filter_records_by_severity, get_carrier_stats, render_dispute_letter, render_letter_from_dir,
    search, summarize_records, try_audit_records,
};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use log::{error, info};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::crypto::hash_api_key;
use crate::db::DbPool;
use crate::models::{ApiKey, AuditBatch, CaseRow, NewCase, NotificationRow, ShipmentAudit};
use crate::openapi::ApiDoc;
use crate::schema::{api_keys, audit_batches, cases, notifications, shipment_audits};
use crate::workflows::{NotificationService, run_audit_workflows, run_case_workflows};

/// Cached batch summaries keyed by batch id.
pub type SummaryCache = TtlCache<String, AuditSummary>;

#[derive(Clone)]
/// Shared application state for handlers.
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Runtime settings.
    pub config: ServerConfig,
    /// Workflow triggers.
    pub registry: Arc<RwLock<WorkflowRegistry>>,
    /// Notification delivery.
    pub notifications: NotificationService,
    /// Batch summary cache.
    pub summary_cache: SummaryCache,
    /// Per-key clipboard history.
    pub clipboard: Arc<ClipboardManager<InMemoryClipboardStore>>,
}

impl AppState {
    /// Build state with default triggers and an empty cache and clipboard.
    pub fn new(pool: DbPool, config: ServerConfig, notifications: NotificationService) -> Self {
        let summary_cache = TtlCache::new(config.cache_ttl);
        let clipboard = Arc::new(ClipboardManager::new(
            InMemoryClipboardStore::new(),
            config.clipboard_capacity,
        ));
        Self {
            pool,
            config,
            registry: Arc::new(RwLock::new(WorkflowRegistry::with_defaults())),
            notifications,
            summary_cache,
            clipboard,
        }
    }
}

/// Runtime settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Sender name in dispute letters.
    pub company_name: String,
    /// Directory with dispute letter overrides.
    pub letter_template_dir: Option<PathBuf>,
    /// TTL of cached batch summaries.
    pub cache_ttl: Duration,
    /// Clipboard entries kept per key.
    pub clipboard_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            company_name: claimdesk_core::letter::DEFAULT_COMPANY_NAME.to_string(),
            letter_template_dir: None,
            cache_ttl: Duration::from_secs(300),
            clipboard_capacity: claimdesk_core::clipboard::DEFAULT_CLIPBOARD_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Build settings from `CLAIMDESK_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let cache_ttl = match std::env::var("CLAIMDESK_CACHE_TTL_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .map_err(|_| format!("CLAIMDESK_CACHE_TTL_SECS must be seconds, got {raw}"))?,
            ),
            Err(_) => defaults.cache_ttl,
        };
        let clipboard_capacity = match std::env::var("CLAIMDESK_CLIPBOARD_CAPACITY") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                format!("CLAIMDESK_CLIPBOARD_CAPACITY must be a positive number, got {raw}")
            })?,
            Err(_) => defaults.clipboard_capacity,
        };
        Ok(Self {
            company_name: std::env::var("CLAIMDESK_COMPANY_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(defaults.company_name),
            letter_template_dir: std::env::var("CLAIMDESK_LETTER_TEMPLATE_DIR")
                .ok()
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            cache_ttl,
            clipboard_capacity,
        })
    }
}

#[derive(Debug, Clone)]
struct AuthContext {
    key_id: String,
}

/// Error payload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub message: String,
}

/// Batch of shipments to audit.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditBatchRequest {
    /// Shipments in submission order.
    pub shipments: Vec<ShipmentAuditData>,
}

/// Result of auditing a batch.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditBatchResponse {
    /// Stored batch identifier.
    pub batch_id: String,
    /// One record per shipment, in submission order.
    pub records: Vec<AuditRecord>,
    /// Batch totals.
    pub summary: AuditSummary,
    /// Cases opened by workflows.
    pub created_case_ids: Vec<CaseId>,
    /// Fired workflow triggers.
    pub workflow_outcomes: Vec<WorkflowOutcome>,
}

/// Severity filter for stored results.
#[derive(Debug, Deserialize)]
pub struct AuditResultsQuery {
    /// Lowest severity to include (LOW, MEDIUM, HIGH, CRITICAL).
    pub min_severity: Option<String>,
}

/// Case search parameters.
#[derive(Debug, Default, Deserialize)]
pub struct CaseSearchParams {
    /// Free text matched against carrier, tracking number and description.
    pub q: Option<String>,
    /// Accept near matches.
    pub fuzzy: Option<bool>,
    /// Exact status filter.
    pub status: Option<String>,
    /// Exact carrier filter.
    pub carrier: Option<String>,
    /// Exact priority filter.
    pub priority: Option<String>,
    /// Exact claim type filter.
    pub claim_type: Option<String>,
    /// Field to sort by.
    pub sort_by: Option<String>,
    /// `asc` or `desc`.
    pub order: Option<SortOrder>,
    /// 1-based page number.
    pub page: Option<usize>,
    /// Items per page.
    pub page_size: Option<usize>,
}

impl CaseSearchParams {
    fn to_query(&self) -> SearchQuery {
        let mut filters = BTreeMap::new();
        let exact = [
            ("status", &self.status),
            ("carrier", &self.carrier),
            ("priority", &self.priority),
            ("claimType", &self.claim_type),
        ];
        for (field, value) in exact {
            if let Some(value) = value.as_ref().filter(|value| !value.trim().is_empty()) {
                filters.insert(field.to_string(), value.trim().to_string());
            }
        }
        SearchQuery {
            text: self.q.clone(),
            fuzzy: self.fuzzy.unwrap_or(false),
            filters,
            sort_by: self.sort_by.clone(),
            order: self.order.unwrap_or_default(),
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// One page of cases.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CasePage {
    /// Cases on this page.
    pub items: Vec<Case>,
    /// Matching cases across all pages.
    pub total: usize,
    /// 1-based page number.
    pub page: usize,
    /// Items per page.
    pub page_size: usize,
    /// Number of pages.
    pub total_pages: usize,
}

/// Manually opened case.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCaseRequest {
    /// Carrier the claim is filed against.
    pub carrier: Carrier,
    /// Tracking number of the shipment.
    pub tracking_number: String,
    /// Kind of claim.
    pub claim_type: ClaimType,
    /// Handling priority, `NORMAL` when omitted.
    pub priority: Option<Priority>,
    /// Amount claimed in dollars.
    pub amount_claimed: f64,
    /// Description of the dispute.
    pub description: String,
    /// Ship date, if known.
    #[schema(value_type = Option<String>, format = Date)]
    pub ship_date: Option<NaiveDate>,
}

/// New status for a case.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CaseStatusRequest {
    /// Target status.
    pub status: CaseStatus,
}

/// Updated case and the triggers it fired.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaseStatusResponse {
    /// Case after the update.
    pub case: Case,
    /// Fired workflow triggers.
    pub workflow_outcomes: Vec<WorkflowOutcome>,
}

/// Registered workflow trigger.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTriggerView {
    /// Trigger identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Event listened to.
    pub event: WorkflowEvent,
    /// Condition description.
    pub condition: String,
    /// Action label.
    pub action: String,
    /// Notification channel for notify actions.
    pub channel: Option<String>,
    /// Whether the trigger fires.
    pub enabled: bool,
}

impl From<&WorkflowTrigger> for WorkflowTriggerView {
    fn from(trigger: &WorkflowTrigger) -> Self {
        let channel = match &trigger.action {
            WorkflowAction::Notify { channel } => Some(channel.clone()),
            _ => None,
        };
        Self {
            id: trigger.id.clone(),
            name: trigger.name.clone(),
            event: trigger.event,
            condition: trigger.condition.describe(),
            action: trigger.action.as_str().to_string(),
            channel,
            enabled: trigger.enabled,
        }
    }
}

/// Enable or disable a trigger.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkflowEnabledRequest {
    /// Desired state.
    pub enabled: bool,
}

/// Notification listing limit.
#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    /// Maximum notifications to return (default 50, at most 200).
    pub limit: Option<i64>,
}

/// Stored notification.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    /// Notification identifier.
    pub id: String,
    /// Destination channel.
    pub channel: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub message: String,
    /// Related case.
    pub case_id: Option<CaseId>,
    /// Related tracking number.
    pub tracking_number: Option<String>,
    /// Whether the webhook accepted it.
    pub delivered: bool,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl From<NotificationRow> for NotificationView {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            channel: row.channel,
            subject: row.subject,
            message: row.message,
            case_id: row.case_id,
            tracking_number: row.tracking_number,
            delivered: row.delivered,
            created_at: row.created_at.and_utc().to_rfc3339(),
        }
    }
}

/// Text copied into the clipboard.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClipboardCopyRequest {
    /// Copied text.
    pub content: String,
}

/// Clipboard history for the calling key.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClipboardHistoryResponse {
    /// Entries, newest first.
    pub entries: Vec<ClipboardEntry>,
    /// Maximum entries kept.
    pub capacity: usize,
}

/// Result of clearing the clipboard.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClipboardClearResponse {
    /// Entries removed.
    pub removed: usize,
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        Self::Internal(message)
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Internal(format!("database error: {err}"))
    }
}

impl From<diesel::r2d2::PoolError> for ApiError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Internal(format!("database pool error: {err}"))
    }
}

impl From<ClaimDeskError> for ApiError {
    fn from(err: ClaimDeskError) -> Self {
        match err {
            ClaimDeskError::InvalidShipment(_) => Self::BadRequest(err.to_string()),
            ClaimDeskError::NotFound(_) => Self::NotFound(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    fn into_response(self) -> HttpResponse {
        match self {
            Self::BadRequest(message) => HttpResponse::BadRequest().json(ErrorResponse { message }),
            Self::NotFound(message) => HttpResponse::NotFound().json(ErrorResponse { message }),
            Self::Internal(message) => {
                error!("request failed: {message}");
                HttpResponse::InternalServerError().json(ErrorResponse { message })
            }
        }
    }
}

fn respond<T: Serialize>(
    result: Result<Result<T, ApiError>, actix_web::error::BlockingError>,
) -> HttpResponse {
    match result {
        Ok(Ok(body)) => HttpResponse::Ok().json(body),
        Ok(Err(err)) => err.into_response(),
        Err(err) => ApiError::Internal(format!("blocking task failed: {err}")).into_response(),
    }
}

fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorResponse {
        message: message.to_string(),
    })
}

fn extract_bearer_token(req: &HttpRequest) -> Result<String, HttpResponse> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| unauthorized("missing authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| unauthorized("missing bearer token"))?;
    Ok(token.to_string())
}

async fn require_auth(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<AuthContext, HttpResponse> {
    let token = extract_bearer_token(req)?;
    let key_hash = hash_api_key(&token);
    let pool = state.pool.clone();
    let result = web::block(move || {
        let mut conn = pool.get().map_err(|err| err.to_string())?;
        let key = api_keys::table
            .filter(api_keys::key_hash.eq(&key_hash))
            .select(ApiKey::as_select())
            .first::<ApiKey>(&mut conn)
            .optional()
            .map_err(|err| err.to_string())?
            .ok_or_else(|| "api key not found".to_string())?;
        diesel::update(api_keys::table.find(&key.id))
            .set(api_keys::last_used_at.eq(Some(Utc::now().naive_utc())))
            .execute(&mut conn)
            .map_err(|err| err.to_string())?;
        Ok::<AuthContext, String>(AuthContext { key_id: key.id })
    })
    .await;

    match result {
        Ok(Ok(context)) => Ok(context),
        _ => Err(unauthorized("invalid api key")),
    }
}

fn load_batch_records(
    conn: &mut PgConnection,
    key_id: &str,
    batch_id: &str,
) -> Result<Vec<AuditRecord>, ApiError> {
    audit_batches::table
        .filter(audit_batches::id.eq(batch_id))
        .filter(audit_batches::api_key_id.eq(key_id))
        .select(AuditBatch::as_select())
        .first::<AuditBatch>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("audit batch {batch_id} not found")))?;
    let rows: Vec<ShipmentAudit> = shipment_audits::table
        .filter(shipment_audits::batch_id.eq(batch_id))
        .order(shipment_audits::position.asc())
        .select(ShipmentAudit::as_select())
        .load(conn)?;
    rows.iter()
        .map(|row| row.to_record().map_err(ApiError::Internal))
        .collect()
}

fn load_case(conn: &mut PgConnection, case_id: CaseId) -> Result<Case, ApiError> {
    let row = cases::table
        .find(case_id)
        .select(CaseRow::as_select())
        .first::<CaseRow>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("case {case_id} not found")))?;
    row.to_case().map_err(ApiError::Internal)
}

fn persist_batch(
    conn: &mut PgConnection,
    key_id: &str,
    shipments: &[ShipmentAuditData],
    records: &[AuditRecord],
) -> Result<String, ApiError> {
    let batch_id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();
    let batch = AuditBatch {
        id: batch_id.clone(),
        api_key_id: key_id.to_string(),
        shipment_count: shipments.len() as i32,
        created_at: now,
    };
    let rows: Vec<ShipmentAudit> = shipments
        .iter()
        .zip(records)
        .enumerate()
        .map(|(position, (shipment, record))| ShipmentAudit {
            id: Uuid::new_v4().to_string(),
            batch_id: batch_id.clone(),
            position: position as i32,
            tracking_number: shipment.tracking_number.clone(),
            carrier: shipment.carrier.clone(),
            quoted_rate: shipment.quoted_rate,
            actual_rate: shipment.actual_rate,
            ship_date: shipment.ship_date,
            discrepancy_type: record.result.discrepancy_type.as_str().to_string(),
            difference: record.result.difference,
            difference_percent: record.result.difference_percent,
            reason: record.result.reason.clone(),
            severity: record.result.severity.as_str().to_string(),
            auto_create_case: record.result.auto_create_case,
            case_id: None,
            created_at: now,
        })
        .collect();
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(audit_batches::table)
            .values(&batch)
            .execute(conn)?;
        diesel::insert_into(shipment_audits::table)
            .values(&rows)
            .execute(conn)?;
        Ok(())
    })?;
    Ok(batch_id)
}


fn snapshot_registry(registry: &RwLock<WorkflowRegistry>) -> Result<WorkflowRegistry, ApiError> {
    registry
        .read()
        .map(|registry| registry.clone())
        .map_err(|_| ApiError::Internal("workflow registry lock poisoned".to_string()))
}

#[utoipa::path(
    post,
    path = "/audits",
    request_body = AuditBatchRequest,
    responses(
        (status = 200, description = "Audited batch", body = AuditBatchResponse),
        (status = 400, description = "Invalid shipment", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "audits"
)]
#[post("/api/audits")]
/// Audit a batch of shipments, store the results and run workflows.
pub async fn audit_batch(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<AuditBatchRequest>,
) -> impl Responder {
    let context = match require_auth(&state, &req).await {
        Ok(context) => context,
        Err(response) => return response,
    };
    let shipments = payload.into_inner().shipments;
    if shipments.is_empty() {
        return ApiError::BadRequest("at least one shipment is required".to_string())
            .into_response();
    }
    let records = match try_audit_records(&shipments) {
        Ok(records) => records,
        Err(err) => return ApiError::from(err).into_response(),
    };

    let pool = state.pool.clone();
    let registry = state.registry.clone();
    let notifications = state.notifications.clone();
    let cache = state.summary_cache.clone();
    let result = web::block(move || {
        let batch_id = {
            let mut conn = pool.get()?;
            persist_batch(&mut conn, &context.key_id, &shipments, &records)?
        };
        let summary = summarize_records(&records);
        cache.insert(batch_id.clone(), summary.clone());

        let registry = snapshot_registry(&registry)?;
        let ship_dates = shipments.iter().map(|shipment| shipment.ship_date).collect();
        let run = run_audit_workflows(&pool, &registry, &notifications, &records, ship_dates);

        let mut conn = pool.get()?;
        for created in &run.created_cases {
            let position = i32::try_from(created.index)
                .map_err(|_| ApiError::Internal("batch position out of range".to_string()))?;
            diesel::update(
                shipment_audits::table
                    .filter(shipment_audits::batch_id.eq(&batch_id))
                    .filter(shipment_audits::position.eq(position)),
            )
            .set(shipment_audits::case_id.eq(Some(created.case.id)))
            .execute(&mut conn)?;
        }
        info!(
            "audited batch {batch_id}: {} shipments, {} cases opened",
            records.len(),
            run.created_cases.len()
        );

        Ok::<_, ApiError>(AuditBatchResponse {
            batch_id,
            records,
            summary,
            created_case_ids: run
                .created_cases
                .iter()
                .map(|created| created.case.id)
                .collect(),
            workflow_outcomes: run.outcomes,
        })
    })
    .await;
    respond(result)
}

#[utoipa::path(
    get,
    path = "/audits/{batch_id}/summary",
    params(
        ("batch_id" = String, Path, description = "Audit batch identifier")
    ),
    responses(
        (status = 200, description = "Batch summary", body = AuditSummary),
        (status = 404, description = "Unknown batch", body = ErrorResponse)
    ),
    tag = "audits"
)]
#[get("/api/audits/{batch_id}/summary")]
/// Summary of a stored batch.
pub async fn audit_summary(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let context = match require_auth(&state, &req).await {
        Ok(context) => context,
        Err(response) => return response,
    };
    let batch_id = path.into_inner();
    let pool = state.pool.clone();
    let cache = state.summary_cache.clone();
    let result = web::block(move || {
        let mut conn = pool.get()?;
        if let Some(summary) = cache.get(&batch_id) {
            // Ownership still has to be checked for cached entries.
            audit_batches::table
                .filter(audit_batches::id.eq(&batch_id))
                .filter(audit_batches::api_key_id.eq(&context.key_id))
                .select(AuditBatch::as_select())
                .first::<AuditBatch>(&mut conn)
                .optional()?
                .ok_or_else(|| ApiError::NotFound(format!("audit batch {batch_id} not found")))?;
            return Ok(summary);
        }
        let records = load_batch_records(&mut conn, &context.key_id, &batch_id)?;
        let summary = summarize_records(&records);
        cache.insert(batch_id.clone(), summary.clone());
        Ok::<_, ApiError>(summary)
    })
    .await;
    respond(result)
}

#[utoipa::path(
    get,
    path = "/audits/{batch_id}/carriers",
    params(
        ("batch_id" = String, Path, description = "Audit batch identifier")
    ),
    responses(
        (status = 200, description = "Per-carrier statistics", body = Vec<CarrierStats>),
        (status = 404, description = "Unknown batch", body = ErrorResponse)
    ),
    tag = "audits"
)]
#[get("/api/audits/{batch_id}/carriers")]
/// Per-carrier overcharge statistics for a stored batch.
pub async fn audit_carriers(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let context = match require_auth(&state, &req).await {
        Ok(context) => context,
        Err(response) => return response,
    };
    let batch_id = path.into_inner();
    let pool = state.pool.clone();
    let result = web::block(move || {
        let mut conn = pool.get()?;
        let records = load_batch_records(&mut conn, &context.key_id, &batch_id)?;
        Ok::<Vec<CarrierStats>, ApiError>(get_carrier_stats(&records))
    })
    .await;
    respond(result)
}

#[utoipa::path(
    get,
    path = "/audits/{batch_id}/results",
    params(
        ("batch_id" = String, Path, description = "Audit batch identifier"),
        ("min_severity" = Option<String>, Query, description = "LOW, MEDIUM, HIGH or CRITICAL")
    ),
    responses(
        (status = 200, description = "Stored audit records", body = Vec<AuditRecord>),
        (status = 400, description = "Unknown severity", body = ErrorResponse),
        (status = 404, description = "Unknown batch", body = ErrorResponse)
    ),
    tag = "audits"
)]
#[get("/api/audits/{batch_id}/results")]
/// Stored records of a batch, optionally filtered by minimum severity.
pub async fn audit_results(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<AuditResultsQuery>,
) -> impl Responder {
    let context = match require_auth(&state, &req).await {
        Ok(context) => context,
        Err(response) => return response,
    };
    let min_severity = match query.min_severity.as_deref() {
        Some(raw) => match Severity::parse(raw) {
            Some(severity) => Some(severity),
            None => {
                return ApiError::BadRequest(format!("unknown severity: {raw}")).into_response();
            }
        },
        None => None,
    };
    let batch_id = path.into_inner();
    let pool = state.pool.clone();
    let result = web::block(move || {
        let mut conn = pool.get()?;
        let records = load_batch_records(&mut conn, &context.key_id, &batch_id)?;
        Ok::<Vec<AuditRecord>, ApiError>(match min_severity {
            Some(severity) => filter_records_by_severity(&records, severity),
            None => records,
        })
    })
    .await;
    respond(result)
}

#[utoipa::path(
    get,
    path = "/cases",
    params(
        ("q" = Option<String>, Query, description = "Free text"),
        ("fuzzy" = Option<bool>, Query, description = "Accept near matches"),
        ("status" = Option<String>, Query, description = "Status filter"),
        ("carrier" = Option<String>, Query, description = "Carrier filter"),
        ("priority" = Option<String>, Query, description = "Priority filter"),
        ("claim_type" = Option<String>, Query, description = "Claim type filter"),
        ("sort_by" = Option<String>, Query, description = "Sort field"),
        ("order" = Option<String>, Query, description = "asc or desc"),
        ("page" = Option<usize>, Query, description = "1-based page"),
        ("page_size" = Option<usize>, Query, description = "Items per page")
    ),
    responses(
        (status = 200, description = "Matching cases", body = CasePage),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "cases"
)]
#[get("/api/cases")]
/// Search, filter, sort and paginate cases.
pub async fn search_cases(
    state: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<CaseSearchParams>,
) -> impl Responder {
    if let Err(response) = require_auth(&state, &req).await {
        return response;
    }
    let query = params.to_query();
    let pool = state.pool.clone();
    let result = web::block(move || {
        let mut conn = pool.get()?;
        let rows: Vec<CaseRow> = cases::table
            .order(cases::id.asc())
            .select(CaseRow::as_select())
            .load(&mut conn)?;
        let all = rows
            .iter()
            .map(|row| row.to_case().map_err(ApiError::Internal))
            .collect::<Result<Vec<Case>, ApiError>>()?;
        let page = search(&all, &query);
        Ok::<_, ApiError>(CasePage {
            items: page.items,
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
        })
    })
    .await;
    respond(result)
}

#[utoipa::path(
    post,
    path = "/cases",
    request_body = CreateCaseRequest,
    responses(
        (status = 200, description = "Created case", body = Case),
        (status = 400, description = "Invalid case", body = ErrorResponse)
    ),
    tag = "cases"
)]
#[post("/api/cases")]
/// Open a case manually.
pub async fn create_case(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<CreateCaseRequest>,
) -> impl Responder {
    if let Err(response) = require_auth(&state, &req).await {
        return response;
    }
    let payload = payload.into_inner();
    if payload.tracking_number.trim().is_empty() {
        return ApiError::BadRequest("tracking number is required".to_string()).into_response();
    }
    if !payload.amount_claimed.is_finite() || payload.amount_claimed < 0.0 {
        return ApiError::BadRequest("amount claimed must be a non-negative amount".to_string())
            .into_response();
    }
    let pool = state.pool.clone();
    let registry = state.registry.clone();
    let notifications = state.notifications.clone();
    let result = web::block(move || {
        let now = Utc::now().naive_utc();
        let new_case = NewCase {
            carrier: payload.carrier.as_str().to_string(),
            tracking_number: payload.tracking_number.trim().to_string(),
            claim_type: payload.claim_type.as_str().to_string(),
            status: CaseStatus::Open.as_str().to_string(),
            priority: payload
                .priority
                .unwrap_or(Priority::Normal)
                .as_str()
                .to_string(),
            amount_claimed: payload.amount_claimed,
            description: payload.description,
            ship_date: payload.ship_date,
            created_at: now,
            updated_at: now,
        };
        let case = {
            let mut conn = pool.get()?;
            let row: CaseRow = diesel::insert_into(cases::table)
                .values(&new_case)
                .returning(CaseRow::as_returning())
                .get_result(&mut conn)?;
            row.to_case().map_err(ApiError::Internal)?
        };
        let registry = snapshot_registry(&registry)?;
        run_case_workflows(
            &pool,
            &registry,
            &notifications,
            WorkflowEvent::CaseCreated,
            &case,
        );
        Ok::<Case, ApiError>(case)
    })
    .await;
    respond(result)
}

#[utoipa::path(
    post,
    path = "/cases/{id}/status",
    params(
        ("id" = i64, Path, description = "Case identifier")
    ),
    request_body = CaseStatusRequest,
    responses(
        (status = 200, description = "Updated case", body = CaseStatusResponse),
        (status = 400, description = "Transition not allowed", body = ErrorResponse),
        (status = 404, description = "Unknown case", body = ErrorResponse)
    ),
    tag = "cases"
)]
#[post("/api/cases/{id}/status")]
/// Change the status of a case and fire status triggers.
pub async fn update_case_status(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<CaseId>,
    payload: web::Json<CaseStatusRequest>,
) -> impl Responder {
    if let Err(response) = require_auth(&state, &req).await {
        return response;
    }
    let case_id = path.into_inner();
    let status = payload.status;
    let pool = state.pool.clone();
    let registry = state.registry.clone();
    let notifications = state.notifications.clone();
    let result = web::block(move || {
        let case = {
            let mut conn = pool.get()?;
            let mut case = load_case(&mut conn, case_id)?;
            if case.status.is_terminal() && status != CaseStatus::Closed {
                return Err(ApiError::BadRequest(format!(
                    "case {case_id} is already {}",
                    case.status.as_str()
                )));
            }
            diesel::update(cases::table.find(case_id))
                .set((
                    cases::status.eq(status.as_str()),
                    cases::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(&mut conn)?;
            case.status = status;
            case
        };
        let registry = snapshot_registry(&registry)?;
        let workflow_outcomes = run_case_workflows(
            &pool,
            &registry,
            &notifications,
            WorkflowEvent::CaseStatusChanged,
            &case,
        );
        Ok::<_, ApiError>(CaseStatusResponse {
            case,
            workflow_outcomes,
        })
    })
    .await;
    respond(result)
}

#[utoipa::path(
    get,
    path = "/cases/{id}/letter",
    params(
        ("id" = i64, Path, description = "Case identifier")
    ),
    responses(
        (status = 200, description = "Dispute letter", body = String, content_type = "text/markdown"),
        (status = 404, description = "Unknown case", body = ErrorResponse)
    ),
    tag = "cases"
)]
#[get("/api/cases/{id}/letter")]
/// Render the dispute letter for a case.
pub async fn case_letter(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<CaseId>,
) -> impl Responder {
    if let Err(response) = require_auth(&state, &req).await {
        return response;
    }
    let case_id = path.into_inner();
    let pool = state.pool.clone();
    let config = state.config.clone();
    let result = web::block(move || {
        let mut conn = pool.get()?;
        let case = load_case(&mut conn, case_id)?;
        let context = DisputeLetterContext::from_case(&case, config.company_name.clone());
        let letter = match &config.letter_template_dir {
            Some(dir) => render_letter_from_dir(&StdFileSystem::new(), dir, &context)?,
            None => render_dispute_letter(&context),
        };
        Ok::<String, ApiError>(letter)
    })
    .await;

    match result {
        Ok(Ok(letter)) => HttpResponse::Ok()
            .content_type("text/markdown; charset=utf-8")
            .insert_header((
                "Content-Disposition",
                format!("attachment; filename=\"case-{case_id}-letter.md\""),
            ))
            .body(letter),
        Ok(Err(err)) => err.into_response(),
        Err(err) => ApiError::Internal(format!("letter task failed: {err}")).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/workflows",
    responses(
        (status = 200, description = "Registered triggers", body = Vec<WorkflowTriggerView>)
    ),
    tag = "workflows"
)]
#[get("/api/workflows")]
/// List workflow triggers.
pub async fn list_workflows(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(response) = require_auth(&state, &req).await {
        return response;
    }
    match snapshot_registry(&state.registry) {
        Ok(registry) => HttpResponse::Ok().json(
            registry
                .triggers()
                .iter()
                .map(WorkflowTriggerView::from)
                .collect::<Vec<_>>(),
        ),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/workflows/{id}/enabled",
    params(
        ("id" = String, Path, description = "Trigger identifier")
    ),
    request_body = WorkflowEnabledRequest,
    responses(
        (status = 200, description = "Updated trigger", body = WorkflowTriggerView),
        (status = 404, description = "Unknown trigger", body = ErrorResponse)
    ),
    tag = "workflows"
)]
#[post("/api/workflows/{id}/enabled")]
/// Enable or disable a workflow trigger.
pub async fn set_workflow_enabled(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    payload: web::Json<WorkflowEnabledRequest>,
) -> impl Responder {
    if let Err(response) = require_auth(&state, &req).await {
        return response;
    }
    let trigger_id = path.into_inner();
    let Ok(mut registry) = state.registry.write() else {
        return ApiError::Internal("workflow registry lock poisoned".to_string()).into_response();
    };
    if let Err(err) = registry.set_enabled(&trigger_id, payload.enabled) {
        return ApiError::from(err).into_response();
    }
    info!(
        "workflow trigger {trigger_id} {}",
        if payload.enabled { "enabled" } else { "disabled" }
    );
    match registry.get(&trigger_id) {
        Some(trigger) => HttpResponse::Ok().json(WorkflowTriggerView::from(trigger)),
        None => ApiError::NotFound(format!("workflow trigger {trigger_id}")).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/notifications",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum notifications (default 50, at most 200)")
    ),
    responses(
        (status = 200, description = "Latest notifications", body = Vec<NotificationView>)
    ),
    tag = "workflows"
)]
#[get("/api/notifications")]
/// Latest stored notifications, newest first.
pub async fn list_notifications(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<NotificationsQuery>,
) -> impl Responder {
    if let Err(response) = require_auth(&state, &req).await {
        return response;
    }
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let pool = state.pool.clone();
    let result = web::block(move || {
        let mut conn = pool.get()?;
        let rows: Vec<NotificationRow> = notifications::table
            .order(notifications::created_at.desc())
            .limit(limit)
            .select(NotificationRow::as_select())
            .load(&mut conn)?;
        Ok::<Vec<NotificationView>, ApiError>(rows.into_iter().map(NotificationView::from).collect())
    })
    .await;
    respond(result)
}

#[utoipa::path(
    post,
    path = "/clipboard",
    request_body = ClipboardCopyRequest,
    responses(
        (status = 200, description = "Stored entry", body = ClipboardEntry),
        (status = 400, description = "Empty content", body = ErrorResponse)
    ),
    tag = "clipboard"
)]
#[post("/api/clipboard")]
/// Record copied text for the calling key.
pub async fn clipboard_copy(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<ClipboardCopyRequest>,
) -> impl Responder {
    let context = match require_auth(&state, &req).await {
        Ok(context) => context,
        Err(response) => return response,
    };
    match state.clipboard.copy(&context.key_id, &payload.content) {
        Ok(entry) => HttpResponse::Ok().json(entry),
        Err(err) => ApiError::BadRequest(err.to_string()).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/clipboard",
    responses(
        (status = 200, description = "Clipboard history", body = ClipboardHistoryResponse)
    ),
    tag = "clipboard"
)]
#[get("/api/clipboard")]
/// Clipboard history for the calling key.
pub async fn clipboard_history(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let context = match require_auth(&state, &req).await {
        Ok(context) => context,
        Err(response) => return response,
    };
    match state.clipboard.history(&context.key_id) {
        Ok(entries) => HttpResponse::Ok().json(ClipboardHistoryResponse {
            entries,
            capacity: state.clipboard.capacity(),
        }),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/clipboard",
    responses(
        (status = 200, description = "Clipboard cleared", body = ClipboardClearResponse)
    ),
    tag = "clipboard"
)]
#[delete("/api/clipboard")]
/// Clear the clipboard of the calling key.
pub async fn clipboard_clear(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let context = match require_auth(&state, &req).await {
        Ok(context) => context,
        Err(response) => return response,
    };
    match state.clipboard.clear(&context.key_id) {
        Ok(removed) => HttpResponse::Ok().json(ClipboardClearResponse { removed }),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/openapi.json",
    responses(
        (status = 200, description = "OpenAPI document", body = serde_json::Value)
    ),
    tag = "system"
)]
#[get("/api/openapi.json")]
/// Serve the OpenAPI document.
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

/// Register every handler on an actix service config.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(audit_batch)
        .service(audit_summary)
        .service(audit_carriers)
        .service(audit_results)
        .service(search_cases)
        .service(create_case)
        .service(update_case_status)
        .service(case_letter)
        .service(list_workflows)
        .service(set_workflow_enabled)
        .service(list_notifications)
        .service(clipboard_copy)
        .service(clipboard_history)
        .service(clipboard_clear)
        .service(openapi_json);
}
