//! Database models for ClaimDesk server.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use claimdesk_core::{
    AuditRecord, AuditResult, Carrier, Case, CaseStatus, ClaimType, DiscrepancyType, Priority,
    Severity,
};
use diesel::prelude::*;

use crate::schema::{api_keys, audit_batches, cases, notifications, shipment_audits};

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = api_keys)]
/// Hashed API key allowed to call the server.
pub struct ApiKey {
    /// Key identifier.
    pub id: String,
    /// Operator-facing label.
    pub label: String,
    /// Base64 SHA-256 digest of the raw key.
    pub key_hash: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
    /// Last successful authentication.
    pub last_used_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = api_keys)]
/// Insertable API key.
pub struct NewApiKey {
    /// Key identifier.
    pub id: String,
    /// Operator-facing label.
    pub label: String,
    /// Base64 SHA-256 digest of the raw key.
    pub key_hash: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Associations, Selectable)]
#[diesel(table_name = audit_batches)]
#[diesel(belongs_to(ApiKey, foreign_key = api_key_id))]
/// One submitted batch of shipments.
pub struct AuditBatch {
    /// Batch identifier.
    pub id: String,
    /// Key that submitted the batch.
    pub api_key_id: String,
    /// Number of shipments in the batch.
    pub shipment_count: i32,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Associations, Selectable)]
#[diesel(table_name = shipment_audits)]
#[diesel(belongs_to(AuditBatch, foreign_key = batch_id))]
/// Stored audit result for one shipment.
pub struct ShipmentAudit {
    /// Row identifier.
    pub id: String,
    /// Parent batch.
    pub batch_id: String,
    /// Position within the submitted batch.
    pub position: i32,
    /// Tracking number.
    pub tracking_number: String,
    /// Carrier label as submitted.
    pub carrier: String,
    /// Quoted rate.
    pub quoted_rate: f64,
    /// Billed rate.
    pub actual_rate: f64,
    /// Ship date.
    pub ship_date: NaiveDate,
    /// `OVERCHARGE`, `UNDERCHARGE` or `NONE`.
    pub discrepancy_type: String,
    /// Billed minus quoted.
    pub difference: f64,
    /// Difference as a percentage of the quote.
    pub difference_percent: f64,
    /// Classification reason.
    pub reason: String,
    /// Severity label.
    pub severity: String,
    /// Whether the audit asked for a case.
    pub auto_create_case: bool,
    /// Case opened for this shipment, if any.
    pub case_id: Option<i64>,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

impl ShipmentAudit {
    /// Rebuild the audit record stored in this row.
    pub fn to_record(&self) -> Result<AuditRecord, String> {
        let discrepancy_type = match self.discrepancy_type.as_str() {
            "OVERCHARGE" => DiscrepancyType::Overcharge,
            "UNDERCHARGE" => DiscrepancyType::Undercharge,
            "NONE" => DiscrepancyType::None,
            other => return Err(format!("unknown discrepancy type: {other}")),
        };
        let severity = Severity::parse(&self.severity)
            .ok_or_else(|| format!("unknown severity: {}", self.severity))?;
        Ok(AuditRecord {
            tracking_number: self.tracking_number.clone(),
            carrier: self.carrier.clone(),
            result: AuditResult {
                discrepancy_type,
                difference: self.difference,
                difference_percent: self.difference_percent,
                reason: self.reason.clone(),
                severity,
                auto_create_case: self.auto_create_case,
            },
        })
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = cases)]
/// Dispute case row.
pub struct CaseRow {
    /// Case identifier.
    pub id: i64,
    /// Carrier label.
    pub carrier: String,
    /// Tracking number.
    pub tracking_number: String,
    /// Claim type label.
    pub claim_type: String,
    /// Status label.
    pub status: String,
    /// Priority label.
    pub priority: String,
    /// Amount claimed in dollars.
    pub amount_claimed: f64,
    /// Description of the dispute.
    pub description: String,
    /// Ship date, if known.
    pub ship_date: Option<NaiveDate>,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
    /// Last update timestamp.
    pub updated_at: NaiveDateTime,
}

impl CaseRow {
    /// Convert into the core case type.
    pub fn to_case(&self) -> Result<Case, String> {
        Ok(Case {
            id: self.id,
            carrier: Carrier::parse(&self.carrier),
            tracking_number: self.tracking_number.clone(),
            claim_type: ClaimType::from_str(&self.claim_type).map_err(|err| err.to_string())?,
            status: CaseStatus::from_str(&self.status).map_err(|err| err.to_string())?,
            priority: Priority::from_str(&self.priority).map_err(|err| err.to_string())?,
            amount_claimed: self.amount_claimed,
            description: self.description.clone(),
            ship_date: self.ship_date,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = cases)]
/// Insertable case; the id is assigned by the database.
pub struct NewCase {
    /// Carrier label.
    pub carrier: String,
    /// Tracking number.
    pub tracking_number: String,
    /// Claim type label.
    pub claim_type: String,
    /// Status label.
    pub status: String,
    /// Priority label.
    pub priority: String,
    /// Amount claimed in dollars.
    pub amount_claimed: f64,
    /// Description of the dispute.
    pub description: String,
    /// Ship date, if known.
    pub ship_date: Option<NaiveDate>,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
    /// Last update timestamp.
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Selectable)]
#[diesel(table_name = notifications)]
/// Stored workflow notification.
pub struct NotificationRow {
    /// Notification identifier.
    pub id: String,
    /// Destination channel.
    pub channel: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub message: String,
    /// Related case.
    pub case_id: Option<i64>,
    /// Related tracking number.
    pub tracking_number: Option<String>,
    /// Whether the webhook accepted the notification.
    pub delivered: bool,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}
