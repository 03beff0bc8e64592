//! Domain entities for ClaimDesk.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::audit::Severity;
use crate::error::ClaimDeskError;

/// Database identifier for a dispute case.
pub type CaseId = i64;

/// Shipping carriers ClaimDesk files disputes against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Carrier {
    /// FedEx.
    Fedex,
    /// UPS.
    Ups,
    /// United States Postal Service.
    Usps,
    /// DHL.
    Dhl,
    /// Any other carrier.
    Other,
}

impl Carrier {
    /// Parse a free-form carrier label, falling back to [`Carrier::Other`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "fedex" | "fed ex" | "federal express" => Self::Fedex,
            "ups" | "united parcel service" => Self::Ups,
            "usps" | "us postal service" | "united states postal service" => Self::Usps,
            "dhl" | "dhl express" => Self::Dhl,
            _ => Self::Other,
        }
    }

    /// Stable uppercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fedex => "FEDEX",
            Self::Ups => "UPS",
            Self::Usps => "USPS",
            Self::Dhl => "DHL",
            Self::Other => "OTHER",
        }
    }

    /// Name used when addressing the carrier in correspondence.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fedex => "FedEx",
            Self::Ups => "UPS",
            Self::Usps => "USPS",
            Self::Dhl => "DHL",
            Self::Other => "Carrier",
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of claim filed against a carrier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimType {
    /// Billed above the quoted rate.
    Overcharge,
    /// Package arrived damaged.
    Damage,
    /// Package never arrived.
    Loss,
    /// Delivery missed the guaranteed window.
    LateDelivery,
    /// Post-delivery invoice adjustment.
    BillingAdjustment,
}

impl ClaimType {
    /// Stable uppercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overcharge => "OVERCHARGE",
            Self::Damage => "DAMAGE",
            Self::Loss => "LOSS",
            Self::LateDelivery => "LATE_DELIVERY",
            Self::BillingAdjustment => "BILLING_ADJUSTMENT",
        }
    }

    /// Human-readable label for letters and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Overcharge => "billing overcharge",
            Self::Damage => "damaged shipment",
            Self::Loss => "lost shipment",
            Self::LateDelivery => "service guarantee failure",
            Self::BillingAdjustment => "billing adjustment",
        }
    }
}

impl FromStr for ClaimType {
    type Err = ClaimDeskError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "OVERCHARGE" => Ok(Self::Overcharge),
            "DAMAGE" => Ok(Self::Damage),
            "LOSS" => Ok(Self::Loss),
            "LATE_DELIVERY" => Ok(Self::LateDelivery),
            "BILLING_ADJUSTMENT" => Ok(Self::BillingAdjustment),
            other => Err(ClaimDeskError::Other(format!("unknown claim type: {other}"))),
        }
    }
}

/// Lifecycle of a dispute case.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    /// Created, not yet filed with the carrier.
    Open,
    /// Submitted to the carrier.
    Filed,
    /// Carrier is reviewing the claim.
    UnderReview,
    /// Carrier approved the claim.
    Approved,
    /// Carrier denied the claim.
    Denied,
    /// Closed without further action.
    Closed,
}

impl CaseStatus {
    /// Stable uppercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Filed => "FILED",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Approved => "APPROVED",
            Self::Denied => "DENIED",
            Self::Closed => "CLOSED",
        }
    }

    /// Whether no further transitions are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Denied | Self::Closed)
    }
}

impl FromStr for CaseStatus {
    type Err = ClaimDeskError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "FILED" => Ok(Self::Filed),
            "UNDER_REVIEW" => Ok(Self::UnderReview),
            "APPROVED" => Ok(Self::Approved),
            "DENIED" => Ok(Self::Denied),
            "CLOSED" => Ok(Self::Closed),
            other => Err(ClaimDeskError::Other(format!("unknown case status: {other}"))),
        }
    }
}

/// Case handling priority.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Handle when convenient.
    Low,
    /// Default priority.
    Normal,
    /// Handle soon.
    High,
    /// Handle immediately.
    Urgent,
}

impl Priority {
    /// Map an audit severity onto a case priority.
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Low => Self::Low,
            Severity::Medium => Self::Normal,
            Severity::High => Self::High,
            Severity::Critical => Self::Urgent,
        }
    }

    /// One step higher, saturating at [`Priority::Urgent`].
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Normal,
            Self::Normal => Self::High,
            Self::High | Self::Urgent => Self::Urgent,
        }
    }

    /// Stable uppercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }
}

impl FromStr for Priority {
    type Err = ClaimDeskError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            "URGENT" => Ok(Self::Urgent),
            other => Err(ClaimDeskError::Other(format!("unknown priority: {other}"))),
        }
    }
}

/// A dispute case filed (or to be filed) against a carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    /// Case identifier.
    pub id: CaseId,
    /// Carrier the claim is filed against.
    pub carrier: Carrier,
    /// Tracking number of the disputed shipment.
    pub tracking_number: String,
    /// Kind of claim.
    pub claim_type: ClaimType,
    /// Current status.
    pub status: CaseStatus,
    /// Handling priority.
    pub priority: Priority,
    /// Amount claimed in dollars.
    pub amount_claimed: f64,
    /// Free-text description of the dispute.
    pub description: String,
    /// Ship date of the disputed shipment, if known.
    #[schema(value_type = Option<String>, format = Date)]
    pub ship_date: Option<NaiveDate>,
    /// Creation timestamp.
    #[schema(value_type = String, format = DateTime)]
    pub created_at: NaiveDateTime,
}

/// A vendor or carrier account the business works with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    /// Vendor identifier.
    pub id: i64,
    /// Vendor name.
    pub name: String,
    /// Carrier this vendor represents, if any.
    pub carrier: Option<Carrier>,
    /// Account number with the vendor.
    pub account_number: Option<String>,
    /// Contact e-mail.
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
}

/// Sales pipeline stage of a lead.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    /// Not yet contacted.
    New,
    /// First contact made.
    Contacted,
    /// Confirmed fit.
    Qualified,
    /// Became a customer.
    Converted,
    /// Dropped out.
    Lost,
}

impl LeadStatus {
    /// Stable uppercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Contacted => "CONTACTED",
            Self::Qualified => "QUALIFIED",
            Self::Converted => "CONVERTED",
            Self::Lost => "LOST",
        }
    }
}

/// A sales lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    /// Lead identifier.
    pub id: i64,
    /// Contact name.
    pub name: String,
    /// Company name.
    pub company: Option<String>,
    /// Contact e-mail.
    pub email: Option<String>,
    /// Pipeline stage.
    pub status: LeadStatus,
    /// Estimated deal value in dollars.
    pub estimated_value: f64,
}

/// Any CRM record, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrmEntity {
    /// A dispute case.
    Case(Case),
    /// A vendor.
    Vendor(Vendor),
    /// A sales lead.
    Lead(Lead),
}

impl CrmEntity {
    /// Tag used in serialized records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Case(_) => "case",
            Self::Vendor(_) => "vendor",
            Self::Lead(_) => "lead",
        }
    }

    /// Identifier of the wrapped record.
    pub fn id(&self) -> i64 {
        match self {
            Self::Case(case) => case.id,
            Self::Vendor(vendor) => vendor.id,
            Self::Lead(lead) => lead.id,
        }
    }

    /// Display name of the wrapped record.
    pub fn title(&self) -> String {
        match self {
            Self::Case(case) => format!("{} {}", case.carrier.as_str(), case.tracking_number),
            Self::Vendor(vendor) => vendor.name.clone(),
            Self::Lead(lead) => match &lead.company {
                Some(company) => format!("{} ({company})", lead.name),
                None => lead.name.clone(),
            },
        }
    }
}
