//! Workflow triggers fired by audits and case changes.
//!
//! A [`WorkflowRegistry`] is an ordinary value: callers build it (usually via
//! [`WorkflowRegistry::with_defaults`]), own it, and hand it to a
//! [`WorkflowEngine`] together with the sinks that perform side effects.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::audit::{AuditRecord, DiscrepancyType, Severity};
use crate::domain::{Case, CaseId, Priority};
use crate::error::{ClaimDeskError, Result};

/// Channel used by the default notification triggers.
pub const DEFAULT_NOTIFY_CHANNEL: &str = "claims-team";

/// Events that can fire triggers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A shipment audit finished.
    AuditCompleted,
    /// A case was created.
    CaseCreated,
    /// A case changed status.
    CaseStatusChanged,
}

impl WorkflowEvent {
    /// Stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuditCompleted => "audit_completed",
            Self::CaseCreated => "case_created",
            Self::CaseStatusChanged => "case_status_changed",
        }
    }
}

/// When a trigger applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TriggerCondition {
    /// Every time the event fires.
    Always,
    /// The audit flagged the shipment for automatic case creation.
    AutoCreateFlag,
    /// Audit severity, or case priority, at least this high.
    MinSeverity(Severity),
    /// Overcharge (or claimed amount) of at least this many dollars.
    MinOvercharge(f64),
}

impl TriggerCondition {
    fn matches_audit(&self, record: &AuditRecord) -> bool {
        match self {
            Self::Always => true,
            Self::AutoCreateFlag => record.result.auto_create_case,
            Self::MinSeverity(min) => record.result.severity >= *min,
            Self::MinOvercharge(min) => {
                record.result.discrepancy_type == DiscrepancyType::Overcharge
                    && record.result.difference >= *min
            }
        }
    }

    fn matches_case(&self, case: &Case) -> bool {
        match self {
            Self::Always => true,
            Self::AutoCreateFlag => false,
            Self::MinSeverity(min) => case.priority >= Priority::from_severity(*min),
            Self::MinOvercharge(min) => case.amount_claimed >= *min,
        }
    }

    /// Human-readable description.
    pub fn describe(&self) -> String {
        match self {
            Self::Always => "always".to_string(),
            Self::AutoCreateFlag => "audit flagged for case creation".to_string(),
            Self::MinSeverity(min) => format!("severity at least {}", min.as_str()),
            Self::MinOvercharge(min) => format!("overcharge at least ${min:.2}"),
        }
    }
}

/// What a trigger does when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowAction {
    /// Open a dispute case for the audited shipment.
    CreateCase,
    /// Send a notification to a channel.
    Notify {
        /// Destination channel.
        channel: String,
    },
    /// Raise the case priority by one step.
    EscalatePriority,
}

impl WorkflowAction {
    /// Stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCase => "create_case",
            Self::Notify { .. } => "notify",
            Self::EscalatePriority => "escalate_priority",
        }
    }
}

/// A registered trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTrigger {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Event the trigger listens to.
    pub event: WorkflowEvent,
    /// Condition that must hold.
    pub condition: TriggerCondition,
    /// Action performed.
    pub action: WorkflowAction,
    /// Disabled triggers never fire.
    pub enabled: bool,
}

impl WorkflowTrigger {
    /// Build an enabled trigger.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        event: WorkflowEvent,
        condition: TriggerCondition,
        action: WorkflowAction,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            event,
            condition,
            action,
            enabled: true,
        }
    }
}

/// Ordered set of triggers. Triggers fire in registration order.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    triggers: Vec<WorkflowTrigger>,
}

impl WorkflowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the default triggers installed.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.initialize_default_workflows();
        registry
    }

    /// Install the default triggers that are not registered yet.
    pub fn initialize_default_workflows(&mut self) {
        for trigger in default_triggers() {
            if self.get(&trigger.id).is_none() {
                self.triggers.push(trigger);
            }
        }
    }

    /// Add a trigger. Identifiers must be unique.
    pub fn register(&mut self, trigger: WorkflowTrigger) -> Result<()> {
        if self.get(&trigger.id).is_some() {
            return Err(ClaimDeskError::Other(format!(
                "workflow trigger already registered: {}",
                trigger.id
            )));
        }
        self.triggers.push(trigger);
        Ok(())
    }

    /// Remove a trigger, returning it if present.
    pub fn unregister(&mut self, id: &str) -> Option<WorkflowTrigger> {
        let index = self.triggers.iter().position(|trigger| trigger.id == id)?;
        Some(self.triggers.remove(index))
    }

    /// Enable or disable a trigger.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        let trigger = self
            .triggers
            .iter_mut()
            .find(|trigger| trigger.id == id)
            .ok_or_else(|| ClaimDeskError::NotFound(format!("workflow trigger {id}")))?;
        trigger.enabled = enabled;
        Ok(())
    }

    /// Look up a trigger by id.
    pub fn get(&self, id: &str) -> Option<&WorkflowTrigger> {
        self.triggers.iter().find(|trigger| trigger.id == id)
    }

    /// All triggers in registration order.
    pub fn triggers(&self) -> &[WorkflowTrigger] {
        &self.triggers
    }

    /// Enabled triggers for an event, in registration order.
    pub fn triggers_for(&self, event: WorkflowEvent) -> Vec<&WorkflowTrigger> {
        self.triggers
            .iter()
            .filter(|trigger| trigger.enabled && trigger.event == event)
            .collect()
    }
}

fn default_triggers() -> Vec<WorkflowTrigger> {
    vec![
        WorkflowTrigger::new(
            "auto-create-case",
            "Open a case for flagged overcharges",
            WorkflowEvent::AuditCompleted,
            TriggerCondition::AutoCreateFlag,
            WorkflowAction::CreateCase,
        ),
        WorkflowTrigger::new(
            "notify-critical-audit",
            "Alert the claims team about critical discrepancies",
            WorkflowEvent::AuditCompleted,
            TriggerCondition::MinSeverity(Severity::Critical),
            WorkflowAction::Notify {
                channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
            },
        ),
        WorkflowTrigger::new(
            "notify-case-created",
            "Announce new cases",
            WorkflowEvent::CaseCreated,
            TriggerCondition::Always,
            WorkflowAction::Notify {
                channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
            },
        ),
        WorkflowTrigger::new(
            "notify-case-status",
            "Announce case status changes",
            WorkflowEvent::CaseStatusChanged,
            TriggerCondition::Always,
            WorkflowAction::Notify {
                channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
            },
        ),
    ]
}

/// A message emitted by a notify action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Destination channel.
    pub channel: String,
    /// Short subject line.
    pub subject: String,
    /// Message body.
    pub message: String,
    /// Related case, if any.
    pub case_id: Option<CaseId>,
    /// Related tracking number, if any.
    pub tracking_number: Option<String>,
}

/// Creates and updates cases on behalf of workflows.
#[cfg_attr(test, mockall::automock)]
pub trait CaseSink {
    /// Open a case for an audited shipment; `index` is the record's position in its batch.
    fn auto_create_case_from_audit(
        &self,
        index: usize,
        record: &AuditRecord,
        priority: Priority,
    ) -> Result<Case>;
    /// Change the priority of an existing case.
    fn update_priority(&self, case_id: CaseId, priority: Priority) -> Result<()>;
}

/// Delivers workflow notifications.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink {
    /// Deliver one notification.
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Outcome status of a fired trigger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The action completed.
    Success,
    /// The action failed; see the detail.
    Failed,
    /// The action did not apply.
    Skipped,
}

/// Result of one fired trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutcome {
    /// Trigger that fired.
    pub trigger_id: String,
    /// Action label.
    pub action: String,
    /// Outcome status.
    pub status: OutcomeStatus,
    /// Tracking number of the shipment involved.
    pub tracking_number: Option<String>,
    /// Case involved.
    pub case_id: Option<CaseId>,
    /// Extra information or the failure message.
    pub detail: Option<String>,
}

/// A case opened for one record of an audited batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedCase {
    /// Position of the record in the batch.
    pub index: usize,
    /// The stored case.
    pub case: Case,
}

/// Outcomes of running audit workflows over a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowRun {
    /// One entry per fired trigger, in firing order.
    pub outcomes: Vec<WorkflowOutcome>,
    /// Cases opened during the run, in record order.
    pub created_cases: Vec<CreatedCase>,
}

/// Fires registry triggers against sinks.
pub struct WorkflowEngine<'a> {
    registry: &'a WorkflowRegistry,
    cases: &'a dyn CaseSink,
    notifier: &'a dyn NotificationSink,
}

impl<'a> WorkflowEngine<'a> {
    /// Build an engine over a registry and its sinks.
    pub fn new(
        registry: &'a WorkflowRegistry,
        cases: &'a dyn CaseSink,
        notifier: &'a dyn NotificationSink,
    ) -> Self {
        Self {
            registry,
            cases,
            notifier,
        }
    }

    /// Fire `AuditCompleted` triggers for every record.
    ///
    /// Sink failures are reported as failed outcomes; the batch continues.
    pub fn run_audit(&self, records: &[AuditRecord]) -> WorkflowRun {
        let mut run = WorkflowRun::default();
        let triggers = self.registry.triggers_for(WorkflowEvent::AuditCompleted);

        for (index, record) in records.iter().enumerate() {
            let fired: Vec<&WorkflowTrigger> = triggers
                .iter()
                .copied()
                .filter(|trigger| trigger.condition.matches_audit(record))
                .collect();
            let escalations = fired
                .iter()
                .filter(|trigger| trigger.action == WorkflowAction::EscalatePriority)
                .count();
            let mut priority = Priority::from_severity(record.result.severity);
            for _ in 0..escalations {
                priority = priority.escalate();
            }

            let mut case_attempted = false;
            for trigger in fired {
                let outcome = match &trigger.action {
                    WorkflowAction::CreateCase if case_attempted => audit_outcome(
                        trigger,
                        record,
                        OutcomeStatus::Skipped,
                        None,
                        Some("case already requested for this shipment".to_string()),
                    ),
                    WorkflowAction::CreateCase => {
                        case_attempted = true;
                        match self.cases.auto_create_case_from_audit(index, record, priority) {
                            Ok(case) => {
                                let outcome = audit_outcome(
                                    trigger,
                                    record,
                                    OutcomeStatus::Success,
                                    Some(case.id),
                                    Some(format!("opened case with {} priority", priority.as_str())),
                                );
                                run.outcomes.push(outcome);
                                run.outcomes
                                    .extend(self.run_case_event(WorkflowEvent::CaseCreated, &case));
                                run.created_cases.push(CreatedCase { index, case });
                                continue;
                            }
                            Err(err) => audit_outcome(
                                trigger,
                                record,
                                OutcomeStatus::Failed,
                                None,
                                Some(err.to_string()),
                            ),
                        }
                    }
                    WorkflowAction::Notify { channel } => {
                        let notification = Notification {
                            channel: channel.clone(),
                            subject: format!(
                                "{} {} on {} {}",
                                record.result.severity.as_str(),
                                record.result.discrepancy_type.as_str(),
                                record.carrier,
                                record.tracking_number
                            ),
                            message: record.result.reason.clone(),
                            case_id: None,
                            tracking_number: Some(record.tracking_number.clone()),
                        };
                        match self.notifier.notify(&notification) {
                            Ok(()) => audit_outcome(
                                trigger,
                                record,
                                OutcomeStatus::Success,
                                None,
                                Some(format!("notified {channel}")),
                            ),
                            Err(err) => audit_outcome(
                                trigger,
                                record,
                                OutcomeStatus::Failed,
                                None,
                                Some(err.to_string()),
                            ),
                        }
                    }
                    WorkflowAction::EscalatePriority => audit_outcome(
                        trigger,
                        record,
                        OutcomeStatus::Success,
                        None,
                        Some(format!("case priority set to {}", priority.as_str())),
                    ),
                };
                run.outcomes.push(outcome);
            }
        }

        run
    }

    /// Fire case triggers (`CaseCreated` or `CaseStatusChanged`) for one case.
    pub fn run_case_event(&self, event: WorkflowEvent, case: &Case) -> Vec<WorkflowOutcome> {
        let mut outcomes = Vec::new();
        for trigger in self.registry.triggers_for(event) {
            if !trigger.condition.matches_case(case) {
                continue;
            }
            let (status, detail) = match &trigger.action {
                WorkflowAction::Notify { channel } => {
                    let notification = Notification {
                        channel: channel.clone(),
                        subject: format!(
                            "Case #{} {}",
                            case.id,
                            match event {
                                WorkflowEvent::CaseStatusChanged => "status changed",
                                _ => "opened",
                            }
                        ),
                        message: format!(
                            "{} {} claim for {} is {} (${:.2})",
                            case.carrier.display_name(),
                            case.claim_type.label(),
                            case.tracking_number,
                            case.status.as_str(),
                            case.amount_claimed
                        ),
                        case_id: Some(case.id),
                        tracking_number: Some(case.tracking_number.clone()),
                    };
                    match self.notifier.notify(&notification) {
                        Ok(()) => (OutcomeStatus::Success, format!("notified {channel}")),
                        Err(err) => (OutcomeStatus::Failed, err.to_string()),
                    }
                }
                WorkflowAction::EscalatePriority => {
                    let raised = case.priority.escalate();
                    match self.cases.update_priority(case.id, raised) {
                        Ok(()) => (
                            OutcomeStatus::Success,
                            format!("priority raised to {}", raised.as_str()),
                        ),
                        Err(err) => (OutcomeStatus::Failed, err.to_string()),
                    }
                }
                WorkflowAction::CreateCase => (
                    OutcomeStatus::Skipped,
                    "case events cannot create cases".to_string(),
                ),
            };
            outcomes.push(WorkflowOutcome {
                trigger_id: trigger.id.clone(),
                action: trigger.action.as_str().to_string(),
                status,
                tracking_number: Some(case.tracking_number.clone()),
                case_id: Some(case.id),
                detail: Some(detail),
            });
        }
        outcomes
    }
}

fn audit_outcome(
    trigger: &WorkflowTrigger,
    record: &AuditRecord,
    status: OutcomeStatus,
    case_id: Option<CaseId>,
    detail: Option<String>,
) -> WorkflowOutcome {
    WorkflowOutcome {
        trigger_id: trigger.id.clone(),
        action: trigger.action.as_str().to_string(),
        status,
        tracking_number: Some(record.tracking_number.clone()),
        case_id,
        detail,
    }
}
