//! Database and webhook sinks for the claim workflow engine.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use claimdesk_core::{
    AuditRecord, Carrier, Case, CaseId, CaseSink, CaseStatus, ClaimDeskError, ClaimType,
    Notification, NotificationSink, OutcomeStatus, Priority, WorkflowEngine, WorkflowEvent,
    WorkflowOutcome, WorkflowRegistry, WorkflowRun,
};
use diesel::prelude::*;
use log::{info, warn};
use reqwest::blocking::Client;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::{CaseRow, NewCase, NotificationRow};
use crate::schema::{cases, notifications};

/// Delivers notifications outside the database.
pub trait WebhookClient {
    /// Deliver one notification.
    fn deliver(&self, notification: &Notification) -> Result<(), String>;
}

/// Webhook client that accepts everything without sending.
#[derive(Debug, Clone, Default)]
pub struct NoopWebhookClient;

impl WebhookClient for NoopWebhookClient {
    fn deliver(&self, _notification: &Notification) -> Result<(), String> {
        Ok(())
    }
}

/// Posts notifications as JSON to a webhook URL.
#[derive(Debug, Clone)]
pub struct HttpWebhookClient {
    url: String,
    client: Client,
}

impl HttpWebhookClient {
    /// Build a client for the given webhook URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
        }
    }
}

impl WebhookClient for HttpWebhookClient {
    fn deliver(&self, notification: &Notification) -> Result<(), String> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .map_err(|err| format!("webhook request failed: {err}"))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(format!("webhook rejected notification ({status}): {body}"));
        }
        Ok(())
    }
}

/// Shared notification delivery configuration.
#[derive(Clone)]
pub struct NotificationService {
    webhook: Arc<dyn WebhookClient + Send + Sync>,
    delivers: bool,
}

impl NotificationService {
    /// Store notifications without delivering them anywhere.
    pub fn mock() -> Self {
        Self {
            webhook: Arc::new(NoopWebhookClient),
            delivers: false,
        }
    }

    /// Deliver through an explicit webhook client.
    pub fn with_webhook(webhook: Arc<dyn WebhookClient + Send + Sync>) -> Self {
        Self {
            webhook,
            delivers: true,
        }
    }

    /// Use `CLAIMDESK_WEBHOOK_URL` when set.
    #[cfg_attr(test, allow(dead_code))]
    pub fn from_env() -> Self {
        match std::env::var("CLAIMDESK_WEBHOOK_URL") {
            Ok(url) if !url.trim().is_empty() => {
                Self::with_webhook(Arc::new(HttpWebhookClient::new(url.trim())))
            }
            _ => Self::mock(),
        }
    }
}

/// Stores notifications and forwards them to the webhook.
pub struct DbNotificationSink<'a> {
    pool: &'a DbPool,
    service: &'a NotificationService,
}

impl<'a> DbNotificationSink<'a> {
    /// Build a sink over a pool.
    pub fn new(pool: &'a DbPool, service: &'a NotificationService) -> Self {
        Self { pool, service }
    }
}

impl NotificationSink for DbNotificationSink<'_> {
    fn notify(&self, notification: &Notification) -> claimdesk_core::Result<()> {
        let delivered = if self.service.delivers {
            match self.service.webhook.deliver(notification) {
                Ok(()) => true,
                Err(err) => {
                    warn!("notification to {} not delivered: {err}", notification.channel);
                    false
                }
            }
        } else {
            false
        };
        let row = NotificationRow {
            id: Uuid::new_v4().to_string(),
            channel: notification.channel.clone(),
            subject: notification.subject.clone(),
            message: notification.message.clone(),
            case_id: notification.case_id,
            tracking_number: notification.tracking_number.clone(),
            delivered,
            created_at: Utc::now().naive_utc(),
        };
        let mut conn = self.pool.get().map_err(store_error)?;
        diesel::insert_into(notifications::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(store_error)?;
        Ok(())
    }
}

/// Opens and updates cases in PostgreSQL.
pub struct DieselCaseSink<'a> {
    pool: &'a DbPool,
    ship_dates: Vec<NaiveDate>,
}

impl<'a> DieselCaseSink<'a> {
    /// Build a sink over a pool. `ship_dates` holds the batch's ship dates in record order.
    pub fn new(pool: &'a DbPool, ship_dates: Vec<NaiveDate>) -> Self {
        Self { pool, ship_dates }
    }
}

impl CaseSink for DieselCaseSink<'_> {
    fn auto_create_case_from_audit(
        &self,
        index: usize,
        record: &AuditRecord,
        priority: Priority,
    ) -> claimdesk_core::Result<Case> {
        let now = Utc::now().naive_utc();
        let new_case = NewCase {
            carrier: Carrier::parse(&record.carrier).as_str().to_string(),
            tracking_number: record.tracking_number.clone(),
            claim_type: ClaimType::Overcharge.as_str().to_string(),
            status: CaseStatus::Open.as_str().to_string(),
            priority: priority.as_str().to_string(),
            amount_claimed: record.result.difference,
            description: record.result.reason.clone(),
            ship_date: self.ship_dates.get(index).copied(),
            created_at: now,
            updated_at: now,
        };
        let mut conn = self.pool.get().map_err(store_error)?;
        let row: CaseRow = diesel::insert_into(cases::table)
            .values(&new_case)
            .returning(CaseRow::as_returning())
            .get_result(&mut conn)
            .map_err(store_error)?;
        info!(
            "opened case #{} for {} {}",
            row.id, record.carrier, record.tracking_number
        );
        row.to_case().map_err(ClaimDeskError::Other)
    }

    fn update_priority(&self, case_id: CaseId, priority: Priority) -> claimdesk_core::Result<()> {
        let mut conn = self.pool.get().map_err(store_error)?;
        let updated = diesel::update(cases::table.find(case_id))
            .set((
                cases::priority.eq(priority.as_str()),
                cases::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .map_err(store_error)?;
        if updated == 0 {
            return Err(ClaimDeskError::NotFound(format!("case {case_id}")));
        }
        Ok(())
    }
}

fn store_error(err: impl std::fmt::Display) -> ClaimDeskError {
    ClaimDeskError::Other(format!("database error: {err}"))
}

/// Fire audit triggers for a batch against the database sinks.
pub fn run_audit_workflows(
    pool: &DbPool,
    registry: &WorkflowRegistry,
    service: &NotificationService,
    records: &[AuditRecord],
    ship_dates: Vec<NaiveDate>,
) -> WorkflowRun {
    let cases = DieselCaseSink::new(pool, ship_dates);
    let notifier = DbNotificationSink::new(pool, service);
    let run = WorkflowEngine::new(registry, &cases, &notifier).run_audit(records);
    log_failures(&run.outcomes);
    run
}

/// Fire case triggers for one case against the database sinks.
pub fn run_case_workflows(
    pool: &DbPool,
    registry: &WorkflowRegistry,
    service: &NotificationService,
    event: WorkflowEvent,
    case: &Case,
) -> Vec<WorkflowOutcome> {
    let cases = DieselCaseSink::new(pool, Vec::new());
    let notifier = DbNotificationSink::new(pool, service);
    let outcomes = WorkflowEngine::new(registry, &cases, &notifier).run_case_event(event, case);
    log_failures(&outcomes);
    outcomes
}

fn log_failures(outcomes: &[WorkflowOutcome]) {
    for outcome in outcomes {
        if outcome.status == OutcomeStatus::Failed {
            warn!(
                "workflow trigger {} failed: {}",
                outcome.trigger_id,
                outcome.detail.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TestDatabase;
    use claimdesk_core::{ShipmentAuditData, audit_records};
    use httpmock::Method::POST;
    use httpmock::MockServer;

    fn notification() -> Notification {
        Notification {
            channel: "claims-team".to_string(),
            subject: "Case #7 opened".to_string(),
            message: "UPS billing overcharge".to_string(),
            case_id: Some(7),
            tracking_number: Some("1Z999AA10123456784".to_string()),
        }
    }

    fn overcharged_shipment() -> ShipmentAuditData {
        ShipmentAuditData {
            tracking_number: "1Z999AA10123456784".to_string(),
            carrier: "UPS".to_string(),
            service_type: "Ground".to_string(),
            quoted_rate: 100.0,
            actual_rate: 160.0,
            weight: 10.0,
            declared_weight: None,
            dimensions: None,
            declared_dimensions: None,
            zone: None,
            ship_date: NaiveDate::from_ymd_opt(2024, 3, 14).expect("date"),
        }
    }

    #[test]
    fn http_webhook_posts_json() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST)
                .path("/hooks/claims")
                .header("content-type", "application/json")
                .json_body_partial(r#"{"channel":"claims-team","caseId":7}"#);
            then.status(204);
        });

        let client = HttpWebhookClient::new(server.url("/hooks/claims"));
        client.deliver(&notification()).expect("deliver");

        hook.assert();
    }

    #[test]
    fn http_webhook_reports_rejections() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/hooks/claims");
            then.status(500).body("boom");
        });

        let client = HttpWebhookClient::new(server.url("/hooks/claims"));
        let err = client.deliver(&notification()).unwrap_err();

        assert!(err.contains("500"));
        assert!(err.contains("boom"));
    }

    #[test]
    fn from_env_without_url_does_not_deliver() {
        let previous = std::env::var("CLAIMDESK_WEBHOOK_URL").ok();
        unsafe {
            std::env::remove_var("CLAIMDESK_WEBHOOK_URL");
        }
        assert!(!NotificationService::from_env().delivers);
        if let Some(value) = previous {
            unsafe {
                std::env::set_var("CLAIMDESK_WEBHOOK_URL", value);
            }
        }
    }

    #[test]
    fn audit_workflows_open_cases_and_store_notifications() {
        let mut test_db = TestDatabase::new();
        let pool = test_db.pool();
        let registry = WorkflowRegistry::with_defaults();
        let service = NotificationService::mock();
        let shipment = overcharged_shipment();
        let records = audit_records(std::slice::from_ref(&shipment));
        let ship_dates = vec![shipment.ship_date];

        let run = run_audit_workflows(&pool, &registry, &service, &records, ship_dates);

        assert_eq!(run.created_cases.len(), 1);
        let case = &run.created_cases[0].case;
        assert_eq!(case.priority, Priority::Urgent);
        assert_eq!(case.ship_date, Some(shipment.ship_date));

        let mut conn = pool.get().expect("conn");
        let stored: Vec<NotificationRow> = notifications::table
            .select(NotificationRow::as_select())
            .load(&mut conn)
            .expect("notifications");
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|row| !row.delivered));
    }

    #[test]
    fn repeated_tracking_numbers_keep_their_own_ship_dates() {
        let mut test_db = TestDatabase::new();
        let pool = test_db.pool();
        let registry = WorkflowRegistry::with_defaults();
        let service = NotificationService::mock();
        let first = overcharged_shipment();
        let mut second = overcharged_shipment();
        second.ship_date = NaiveDate::from_ymd_opt(2024, 4, 2).expect("date");
        let shipments = vec![first.clone(), second.clone()];
        let records = audit_records(&shipments);
        let ship_dates = shipments.iter().map(|shipment| shipment.ship_date).collect();

        let run = run_audit_workflows(&pool, &registry, &service, &records, ship_dates);

        let dates: Vec<(usize, Option<NaiveDate>)> = run
            .created_cases
            .iter()
            .map(|created| (created.index, created.case.ship_date))
            .collect();
        assert_eq!(
            dates,
            vec![(0, Some(first.ship_date)), (1, Some(second.ship_date))]
        );
        assert_ne!(run.created_cases[0].case.id, run.created_cases[1].case.id);
    }

    #[test]
    fn update_priority_reports_missing_case() {
        let mut test_db = TestDatabase::new();
        let pool = test_db.pool();
        let sink = DieselCaseSink::new(&pool, Vec::new());

        let err = sink.update_priority(404, Priority::High).unwrap_err();

        assert!(matches!(err, ClaimDeskError::NotFound(_)));
    }
}
