//! Shipment rate audit: classifies billed rates against quoted rates.
//!
//! [`audit_shipment`] is pure and total. It applies a fixed, priority-ordered
//! rule list and never fails; degenerate quotes (zero, negative, non-finite)
//! flow through IEEE-754 arithmetic unchanged. Callers that need guarded input
//! use [`try_audit_shipment`], which runs [`validate_shipment`] first.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ClaimDeskError, Result};

/// Percentage band treated as "matches the quote".
pub const TOLERANCE_PERCENT: f64 = 1.0;

/// Reason attached to shipments billed within tolerance.
pub const WITHIN_TOLERANCE_REASON: &str = "Rate matches quote within tolerance";

/// Shipment and invoice data needed to audit a single shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentAuditData {
    /// Carrier-assigned tracking number.
    pub tracking_number: String,
    /// Carrier label (FEDEX, UPS, USPS, DHL, OTHER in practice).
    pub carrier: String,
    /// Carrier service level.
    pub service_type: String,
    /// Rate quoted at label creation, in dollars.
    pub quoted_rate: f64,
    /// Rate billed on the invoice, in dollars.
    pub actual_rate: f64,
    /// Billed weight in pounds.
    pub weight: f64,
    /// Weight declared by the shipper in pounds; zero means undeclared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_weight: Option<f64>,
    /// Billed dimensions as free text ("LxWxH").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    /// Dimensions declared by the shipper as free text ("LxWxH").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_dimensions: Option<String>,
    /// Shipping zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Date the shipment was tendered.
    #[schema(value_type = String, format = Date)]
    pub ship_date: NaiveDate,
}

/// Direction of a billing discrepancy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyType {
    /// Billed above the quote.
    Overcharge,
    /// Billed below the quote.
    Undercharge,
    /// Billed within tolerance of the quote.
    None,
}

impl DiscrepancyType {
    /// Stable uppercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overcharge => "OVERCHARGE",
            Self::Undercharge => "UNDERCHARGE",
            Self::None => "NONE",
        }
    }
}

/// Audit severity, totally ordered from `Low` to `Critical`.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// No action needed.
    Low,
    /// Review when convenient.
    Medium,
    /// Review soon.
    High,
    /// Escalate immediately.
    Critical,
}

impl Severity {
    /// Numeric rank used for threshold comparisons.
    pub fn order(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Stable uppercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parse a severity label, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Classification of a single shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    /// Direction of the discrepancy.
    pub discrepancy_type: DiscrepancyType,
    /// `actual_rate - quoted_rate`.
    pub difference: f64,
    /// `difference / quoted_rate * 100`.
    pub difference_percent: f64,
    /// Explanation from the first matching rule.
    pub reason: String,
    /// Severity used for filtering and escalation.
    pub severity: Severity,
    /// Whether a dispute case should be opened automatically.
    pub auto_create_case: bool,
}

/// An audit result paired with the shipment identity it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Tracking number of the audited shipment.
    pub tracking_number: String,
    /// Carrier label of the audited shipment.
    pub carrier: String,
    /// Classification outcome.
    pub result: AuditResult,
}

/// Classify one shipment. First matching rule wins.
pub fn audit_shipment(shipment: &ShipmentAuditData) -> AuditResult {
    let difference = shipment.actual_rate - shipment.quoted_rate;
    let difference_percent = (difference / shipment.quoted_rate) * 100.0;

    if difference_percent.abs() < TOLERANCE_PERCENT {
        return AuditResult {
            discrepancy_type: DiscrepancyType::None,
            difference,
            difference_percent,
            reason: WITHIN_TOLERANCE_REASON.to_string(),
            severity: Severity::Low,
            auto_create_case: false,
        };
    }

    if difference > 0.0 {
        let (reason, severity, auto_create_case) =
            classify_overcharge(shipment, difference, difference_percent);
        return AuditResult {
            discrepancy_type: DiscrepancyType::Overcharge,
            difference,
            difference_percent,
            reason,
            severity,
            auto_create_case,
        };
    }

    let shortfall = difference.abs();
    AuditResult {
        discrepancy_type: DiscrepancyType::Undercharge,
        difference,
        difference_percent,
        reason: format!("Billed ${shortfall:.2} below the quoted rate"),
        severity: if shortfall > 20.0 {
            Severity::High
        } else {
            Severity::Medium
        },
        // Undercharges never open a case against the carrier.
        auto_create_case: false,
    }
}

fn classify_overcharge(
    shipment: &ShipmentAuditData,
    difference: f64,
    difference_percent: f64,
) -> (String, Severity, bool) {
    // A declared weight of zero means "not declared".
    if let Some(declared) = shipment.declared_weight.filter(|declared| *declared > 0.0) {
        if shipment.weight > declared {
            let severity = if difference > 10.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            return (
                format!(
                    "Weight discrepancy: billed at {} lbs, declared {} lbs",
                    shipment.weight, declared
                ),
                severity,
                difference > 5.0,
            );
        }
    }

    if let Some(declared) = shipment
        .declared_dimensions
        .as_deref()
        .filter(|declared| !declared.trim().is_empty())
    {
        if shipment.dimensions.as_deref() != Some(declared) {
            let billed = shipment.dimensions.as_deref().unwrap_or("unknown");
            let severity = if difference > 15.0 {
                Severity::Critical
            } else {
                Severity::High
            };
            return (
                format!(
                    "Dimensional weight adjustment: billed dimensions {billed}, declared {declared}"
                ),
                severity,
                difference > 10.0,
            );
        }
    }

    if difference_percent > 50.0 {
        return (
            format!("Significant rate increase of {difference_percent:.1}% over quote"),
            Severity::Critical,
            true,
        );
    }

    if difference_percent > 20.0 {
        return (
            format!("Rate increase of {difference_percent:.1}% over quote"),
            Severity::High,
            difference > 20.0,
        );
    }

    (
        format!("Minor rate adjustment of ${difference:.2}"),
        Severity::Medium,
        difference > 15.0,
    )
}

/// Audit shipments in order.
pub fn batch_audit_shipments(shipments: &[ShipmentAuditData]) -> Vec<AuditResult> {
    shipments.iter().map(audit_shipment).collect()
}

/// Audit shipments in order, keeping each shipment's tracking number and carrier.
pub fn audit_records(shipments: &[ShipmentAuditData]) -> Vec<AuditRecord> {
    shipments
        .iter()
        .map(|shipment| AuditRecord {
            tracking_number: shipment.tracking_number.clone(),
            carrier: shipment.carrier.clone(),
            result: audit_shipment(shipment),
        })
        .collect()
}

/// Reject shipments whose numbers would make the audit meaningless.
pub fn validate_shipment(shipment: &ShipmentAuditData) -> Result<()> {
    if shipment.tracking_number.trim().is_empty() {
        return Err(ClaimDeskError::InvalidShipment(
            "tracking number is required".to_string(),
        ));
    }
    if !shipment.quoted_rate.is_finite() || shipment.quoted_rate <= 0.0 {
        return Err(ClaimDeskError::InvalidShipment(format!(
            "{}: quoted rate must be a positive amount, got {}",
            shipment.tracking_number, shipment.quoted_rate
        )));
    }
    if !shipment.actual_rate.is_finite() {
        return Err(ClaimDeskError::InvalidShipment(format!(
            "{}: actual rate must be a finite amount",
            shipment.tracking_number
        )));
    }
    if !shipment.weight.is_finite() || shipment.weight < 0.0 {
        return Err(ClaimDeskError::InvalidShipment(format!(
            "{}: weight must be a non-negative number",
            shipment.tracking_number
        )));
    }
    if let Some(declared) = shipment.declared_weight {
        if !declared.is_finite() || declared < 0.0 {
            return Err(ClaimDeskError::InvalidShipment(format!(
                "{}: declared weight must be a non-negative number",
                shipment.tracking_number
            )));
        }
    }
    Ok(())
}

/// Validate, then audit one shipment.
pub fn try_audit_shipment(shipment: &ShipmentAuditData) -> Result<AuditResult> {
    validate_shipment(shipment)?;
    Ok(audit_shipment(shipment))
}

/// Validate every shipment, then audit them in order.
///
/// Fails on the first invalid shipment, naming its position in the batch.
pub fn try_audit_records(shipments: &[ShipmentAuditData]) -> Result<Vec<AuditRecord>> {
    for (index, shipment) in shipments.iter().enumerate() {
        validate_shipment(shipment).map_err(|err| match err {
            ClaimDeskError::InvalidShipment(message) => {
                ClaimDeskError::InvalidShipment(format!("shipment {index}: {message}"))
            }
            other => other,
        })?;
    }
    Ok(audit_records(shipments))
}

/// Keep results at or above `min_severity`, preserving order.
pub fn filter_by_severity(results: &[AuditResult], min_severity: Severity) -> Vec<AuditResult> {
    results
        .iter()
        .filter(|result| result.severity.order() >= min_severity.order())
        .cloned()
        .collect()
}

/// Record variant of [`filter_by_severity`].
pub fn filter_records_by_severity(
    records: &[AuditRecord],
    min_severity: Severity,
) -> Vec<AuditRecord> {
    records
        .iter()
        .filter(|record| record.result.severity.order() >= min_severity.order())
        .cloned()
        .collect()
}
