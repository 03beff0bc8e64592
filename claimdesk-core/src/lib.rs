#![deny(missing_docs)]
//! ClaimDesk core library.
//!
//! This crate contains the freight audit engine and the CRM building blocks
//! (search, caching, clipboard history, workflow triggers, dispute letters)
//! shared by the ClaimDesk server and CLI.

pub mod audit;
pub mod cache;
pub mod clipboard;
pub mod domain;
pub mod error;
pub mod fs;
pub mod letter;
pub mod report;
pub mod search;
pub mod summary;
pub mod workflow;

pub use audit::{
    AuditRecord, AuditResult, DiscrepancyType, Severity, ShipmentAuditData, audit_records,
    audit_shipment, batch_audit_shipments, filter_by_severity, filter_records_by_severity,
    try_audit_records, try_audit_shipment, validate_shipment,
};
pub use cache::{DEFAULT_MAX_ENTRIES, TtlCache};
pub use clipboard::{
    ClipboardEntry, ClipboardManager, ClipboardStore, ContentKind, InMemoryClipboardStore,
    detect_content_kind, detect_tracking_carrier,
};
pub use domain::{
    Carrier, Case, CaseId, CaseStatus, ClaimType, CrmEntity, Lead, LeadStatus, Priority, Vendor,
};
pub use error::{ClaimDeskError, Result};
pub use fs::{FileSystem, StdFileSystem};
pub use letter::{
    DisputeLetterContext, find_letter_template, render_dispute_letter, render_letter_from_dir,
};
pub use report::{format_currency, render_audit_markdown, render_audit_text, render_json};
pub use search::{Page, SearchQuery, Searchable, SortOrder, fuzzy_match, levenshtein, search};
pub use summary::{
    AuditSummary, CarrierStats, get_audit_summary, get_carrier_stats, summarize_records,
};
pub use workflow::{
    CaseSink, CreatedCase, Notification, NotificationSink, OutcomeStatus, TriggerCondition,
    WorkflowAction, WorkflowEngine, WorkflowEvent, WorkflowOutcome, WorkflowRegistry, WorkflowRun,
    WorkflowTrigger,
};
