//! Dispute letter rendering with `{{PLACEHOLDER}}` interpolation.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::audit::AuditRecord;
use crate::domain::{Carrier, Case, ClaimType};
use crate::error::Result;
use crate::fs::FileSystem;

/// Placeholder for the sending company.
pub const COMPANY_NAME: &str = "{{COMPANY_NAME}}";
/// Placeholder for the carrier display name.
pub const CARRIER: &str = "{{CARRIER}}";
/// Placeholder for the tracking number.
pub const TRACKING_NUMBER: &str = "{{TRACKING_NUMBER}}";
/// Placeholder for the claim type label.
pub const CLAIM_TYPE: &str = "{{CLAIM_TYPE}}";
/// Placeholder for the ship date.
pub const SHIP_DATE: &str = "{{SHIP_DATE}}";
/// Placeholder for the claimed amount.
pub const AMOUNT: &str = "{{AMOUNT}}";
/// Placeholder for the dispute reason.
pub const REASON: &str = "{{REASON}}";
/// Placeholder for the case reference line.
pub const CASE_REFERENCE: &str = "{{CASE_REFERENCE}}";

/// Sender name used when none is configured.
pub const DEFAULT_COMPANY_NAME: &str = "ClaimDesk Shipping";

const DEFAULT_TEMPLATE: &str = "\
# Claim for {{CLAIM_TYPE}}: {{TRACKING_NUMBER}}

To: {{CARRIER}} Claims Department
From: {{COMPANY_NAME}}
{{CASE_REFERENCE}}

We are writing to dispute the charges billed for shipment {{TRACKING_NUMBER}}, shipped on {{SHIP_DATE}}.

{{REASON}}

We request a refund of {{AMOUNT}}. Please confirm receipt of this claim and let us know if any further documentation is required.

Sincerely,
{{COMPANY_NAME}}
";

/// Values interpolated into a dispute letter.
#[derive(Debug, Clone, PartialEq)]
pub struct DisputeLetterContext {
    /// Sending company.
    pub company_name: String,
    /// Carrier disputed.
    pub carrier: Carrier,
    /// Tracking number of the shipment.
    pub tracking_number: String,
    /// Kind of claim.
    pub claim_type: ClaimType,
    /// Ship date, if known.
    pub ship_date: Option<NaiveDate>,
    /// Amount requested in dollars.
    pub amount_claimed: f64,
    /// Why the charge is disputed.
    pub reason: String,
    /// Existing case number, if any.
    pub case_reference: Option<i64>,
}

impl DisputeLetterContext {
    /// Build a context for an existing case.
    pub fn from_case(case: &Case, company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            carrier: case.carrier,
            tracking_number: case.tracking_number.clone(),
            claim_type: case.claim_type,
            ship_date: case.ship_date,
            amount_claimed: case.amount_claimed,
            reason: case.description.clone(),
            case_reference: Some(case.id),
        }
    }

    /// Build an overcharge context straight from an audit record.
    pub fn from_audit(record: &AuditRecord, company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            carrier: Carrier::parse(&record.carrier),
            tracking_number: record.tracking_number.clone(),
            claim_type: ClaimType::Overcharge,
            ship_date: None,
            amount_claimed: record.result.difference.max(0.0),
            reason: record.result.reason.clone(),
            case_reference: None,
        }
    }
}

/// Render the built-in dispute letter.
pub fn render_dispute_letter(context: &DisputeLetterContext) -> String {
    apply_context(DEFAULT_TEMPLATE, context)
}

/// Render a letter from a template directory, falling back to the built-in
/// template when the directory has no matching file.
pub fn render_letter_from_dir<F: FileSystem>(
    fs: &F,
    template_dir: &Path,
    context: &DisputeLetterContext,
) -> Result<String> {
    match find_letter_template(fs, template_dir, context.claim_type)? {
        Some(path) => {
            let template = fs.read_to_string(&path)?;
            Ok(apply_context(&template, context))
        }
        None => Ok(render_dispute_letter(context)),
    }
}

/// Locate `<claim_type>.md`, then `default.md`, directly inside `template_dir`.
pub fn find_letter_template<F: FileSystem>(
    fs: &F,
    template_dir: &Path,
    claim_type: ClaimType,
) -> Result<Option<PathBuf>> {
    let files = fs.list_files(template_dir)?;
    let specific = template_dir.join(format!("{}.md", claim_type.as_str().to_lowercase()));
    let fallback = template_dir.join("default.md");
    Ok([specific, fallback]
        .into_iter()
        .find(|candidate| files.contains(candidate)))
}

fn apply_context(template: &str, context: &DisputeLetterContext) -> String {
    let ship_date = context
        .ship_date
        .map(|date| date.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| "an unrecorded date".to_string());
    let case_reference = context
        .case_reference
        .map(|id| format!("Reference: Case #{id}"))
        .unwrap_or_default();

    template
        .replace(COMPANY_NAME, &context.company_name)
        .replace(CARRIER, context.carrier.display_name())
        .replace(TRACKING_NUMBER, &context.tracking_number)
        .replace(CLAIM_TYPE, context.claim_type.label())
        .replace(SHIP_DATE, &ship_date)
        .replace(AMOUNT, &format!("${:.2}", context.amount_claimed))
        .replace(REASON, &context.reason)
        .replace(CASE_REFERENCE, &case_reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::audit_records;
    use crate::audit::tests::shipment;
    use crate::domain::{CaseStatus, Priority};
    use crate::fs::MockFileSystem;

    fn sample_case() -> Case {
        Case {
            id: 42,
            carrier: Carrier::Fedex,
            tracking_number: "794644790138".to_string(),
            claim_type: ClaimType::Damage,
            status: CaseStatus::Open,
            priority: Priority::High,
            amount_claimed: 189.5,
            description: "Package arrived crushed".to_string(),
            ship_date: NaiveDate::from_ymd_opt(2024, 3, 4),
            created_at: NaiveDate::from_ymd_opt(2024, 3, 9)
                .expect("date")
                .and_hms_opt(12, 0, 0)
                .expect("time"),
        }
    }

    #[test]
    fn renders_builtin_letter_for_case() {
        let context = DisputeLetterContext::from_case(&sample_case(), "Acme Outfitters");
        let letter = render_dispute_letter(&context);

        assert!(letter.starts_with("# Claim for damaged shipment: 794644790138"));
        assert!(letter.contains("To: FedEx Claims Department"));
        assert!(letter.contains("Reference: Case #42"));
        assert!(letter.contains("shipped on March 4, 2024"));
        assert!(letter.contains("Package arrived crushed"));
        assert!(letter.contains("refund of $189.50"));
        assert!(!letter.contains("{{"));
    }

    #[test]
    fn audit_context_uses_overcharge_amount() {
        let record = audit_records(&[shipment(100.0, 160.0)]).remove(0);
        let context = DisputeLetterContext::from_audit(&record, DEFAULT_COMPANY_NAME);
        let letter = render_dispute_letter(&context);

        assert_eq!(context.carrier, Carrier::Ups);
        assert!(letter.contains("refund of $60.00"));
        assert!(letter.contains("an unrecorded date"));
        assert!(!letter.contains("Reference:"));
    }

    #[test]
    fn prefers_claim_specific_template() {
        let dir = PathBuf::from("/templates");
        let mut fs = MockFileSystem::new();
        fs.expect_list_files()
            .withf(|path| path == Path::new("/templates"))
            .returning(|dir| Ok(vec![dir.join("default.md"), dir.join("damage.md")]));
        fs.expect_read_to_string()
            .withf(|path| path == Path::new("/templates/damage.md"))
            .returning(|_| Ok("{{CARRIER}} owes {{AMOUNT}} for {{TRACKING_NUMBER}}".to_string()));

        let context = DisputeLetterContext::from_case(&sample_case(), "Acme");
        let letter = render_letter_from_dir(&fs, &dir, &context).expect("render");

        assert_eq!(letter, "FedEx owes $189.50 for 794644790138");
    }

    #[test]
    fn falls_back_to_default_then_builtin() {
        let dir = PathBuf::from("/templates");
        let mut fs = MockFileSystem::new();
        fs.expect_list_files()
            .returning(|dir| Ok(vec![dir.join("default.md")]));
        let found = find_letter_template(&fs, &dir, ClaimType::Loss).expect("lookup");
        assert_eq!(found, Some(PathBuf::from("/templates/default.md")));

        let mut empty = MockFileSystem::new();
        empty.expect_list_files().returning(|_| Ok(Vec::new()));
        empty.expect_read_to_string().never();
        let context = DisputeLetterContext::from_case(&sample_case(), "Acme");
        let letter = render_letter_from_dir(&empty, &dir, &context).expect("render");
        assert_eq!(letter, render_dispute_letter(&context));
    }
}
