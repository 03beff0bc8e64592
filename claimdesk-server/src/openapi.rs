//! OpenAPI specification for ClaimDesk server.

use utoipa::OpenApi;

use claimdesk_core::{
    AuditRecord, AuditResult, AuditSummary, Carrier, CarrierStats, Case, CaseStatus, ClaimType,
    ClipboardEntry, ContentKind, DiscrepancyType, OutcomeStatus, Priority, Severity,
    ShipmentAuditData, SortOrder, WorkflowEvent, WorkflowOutcome,
};

use crate::routes::{
    AuditBatchRequest, AuditBatchResponse, CasePage, CaseStatusRequest, CaseStatusResponse,
    ClipboardClearResponse, ClipboardCopyRequest, ClipboardHistoryResponse, CreateCaseRequest,
    ErrorResponse, NotificationView, WorkflowEnabledRequest, WorkflowTriggerView,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::audit_batch,
        crate::routes::audit_summary,
        crate::routes::audit_carriers,
        crate::routes::audit_results,
        crate::routes::search_cases,
        crate::routes::create_case,
        crate::routes::update_case_status,
        crate::routes::case_letter,
        crate::routes::list_workflows,
        crate::routes::set_workflow_enabled,
        crate::routes::list_notifications,
        crate::routes::clipboard_copy,
        crate::routes::clipboard_history,
        crate::routes::clipboard_clear,
        crate::routes::openapi_json
    ),
    components(
        schemas(
            ShipmentAuditData,
            AuditResult,
            AuditRecord,
            AuditSummary,
            CarrierStats,
            DiscrepancyType,
            Severity,
            Carrier,
            Case,
            CaseStatus,
            ClaimType,
            Priority,
            SortOrder,
            ClipboardEntry,
            ContentKind,
            WorkflowEvent,
            WorkflowOutcome,
            OutcomeStatus,
            AuditBatchRequest,
            AuditBatchResponse,
            CasePage,
            CreateCaseRequest,
            CaseStatusRequest,
            CaseStatusResponse,
            WorkflowTriggerView,
            WorkflowEnabledRequest,
            NotificationView,
            ClipboardCopyRequest,
            ClipboardHistoryResponse,
            ClipboardClearResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "audits", description = "Freight bill audits"),
        (name = "cases", description = "Dispute cases"),
        (name = "workflows", description = "Workflow triggers and notifications"),
        (name = "clipboard", description = "Clipboard history"),
        (name = "system", description = "System endpoints")
    )
)]
/// OpenAPI specification for the ClaimDesk server.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::ApiDoc;
    use utoipa::OpenApi;

    #[test]
    fn openapi_includes_expected_paths() {
        let doc = ApiDoc::openapi();
        let paths = doc.paths.paths;

        assert!(paths.contains_key("/audits"));
        assert!(paths.contains_key("/audits/{batch_id}/summary"));
        assert!(paths.contains_key("/audits/{batch_id}/carriers"));
        assert!(paths.contains_key("/audits/{batch_id}/results"));
        assert!(paths.contains_key("/cases"));
        assert!(paths.contains_key("/cases/{id}/status"));
        assert!(paths.contains_key("/cases/{id}/letter"));
        assert!(paths.contains_key("/workflows"));
        assert!(paths.contains_key("/workflows/{id}/enabled"));
        assert!(paths.contains_key("/notifications"));
        assert!(paths.contains_key("/clipboard"));
        assert!(paths.contains_key("/openapi.json"));
    }

    #[test]
    fn clipboard_path_lists_all_methods() {
        let doc = ApiDoc::openapi();
        let clipboard = doc.paths.paths.get("/clipboard").expect("clipboard path");

        assert_eq!(clipboard.operations.len(), 3);
    }
}
