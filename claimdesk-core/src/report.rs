//! Report formatting for audit batches.

use std::fmt::Write;

use serde::Serialize;

use crate::audit::{AuditRecord, DiscrepancyType};
use crate::summary::{AuditSummary, CarrierStats};

/// Render an audit batch as Markdown.
pub fn render_audit_markdown(
    records: &[AuditRecord],
    summary: &AuditSummary,
    carriers: &[CarrierStats],
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# ClaimDesk Audit Report\n");
    append_summary(&mut output, summary);
    append_carriers(&mut output, carriers);
    append_discrepancies(&mut output, records);
    output
}

/// Render an audit batch as plain text, one line per shipment.
pub fn render_audit_text(
    records: &[AuditRecord],
    summary: &AuditSummary,
    carriers: &[CarrierStats],
) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Audited {} shipments: {} overcharged ({}), {} undercharged ({}), net {}",
        summary.total_shipments,
        summary.overcharge_count,
        format_currency(summary.total_overcharged),
        summary.undercharge_count,
        format_currency(summary.total_undercharged),
        format_currency(summary.net_discrepancy)
    );
    let _ = writeln!(
        output,
        "Cases to open: {} (critical {}, high {}, medium {})",
        summary.auto_create_count, summary.critical_issues, summary.high_issues, summary.medium_issues
    );
    for stats in carriers {
        let _ = writeln!(
            output,
            "{}: {}/{} overcharged ({:.1}%), avg {}",
            stats.carrier,
            stats.overcharges,
            stats.total_shipments,
            stats.overcharge_rate,
            format_currency(stats.average_overcharge)
        );
    }
    for record in records {
        let result = &record.result;
        let _ = writeln!(
            output,
            "{:<8} {:<10} {} {} {:>10} {}",
            result.severity.as_str(),
            result.discrepancy_type.as_str(),
            record.carrier,
            record.tracking_number,
            format_currency(result.difference),
            result.reason
        );
    }
    output
}

/// Render any serializable payload as pretty JSON.
pub fn render_json<T: Serialize + ?Sized>(payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(payload)
}

/// Format a dollar amount with two decimals, sign first.
pub fn format_currency(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${amount:.2}")
    }
}

fn append_summary(output: &mut String, summary: &AuditSummary) {
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Shipments audited: {}", summary.total_shipments);
    let _ = writeln!(
        output,
        "- Overcharges: {} ({})",
        summary.overcharge_count,
        format_currency(summary.total_overcharged)
    );
    let _ = writeln!(
        output,
        "- Undercharges: {} ({})",
        summary.undercharge_count,
        format_currency(summary.total_undercharged)
    );
    let _ = writeln!(output, "- Within tolerance: {}", summary.no_discrepancy_count);
    let _ = writeln!(
        output,
        "- Net discrepancy: {}",
        format_currency(summary.net_discrepancy)
    );
    let _ = writeln!(
        output,
        "- Average overcharge: {}",
        format_currency(summary.average_overcharge)
    );
    let _ = writeln!(
        output,
        "- Issues: {} critical, {} high, {} medium",
        summary.critical_issues, summary.high_issues, summary.medium_issues
    );
    let _ = writeln!(output, "- Cases to open: {}\n", summary.auto_create_count);
}

fn append_carriers(output: &mut String, carriers: &[CarrierStats]) {
    if carriers.is_empty() {
        let _ = writeln!(output, "## Carriers\nNo shipments audited.\n");
        return;
    }
    let _ = writeln!(output, "## Carriers");
    let _ = writeln!(
        output,
        "| Carrier | Shipments | Overcharges | Rate | Total | Average |"
    );
    let _ = writeln!(output, "| --- | ---: | ---: | ---: | ---: | ---: |");
    for stats in carriers {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.1}% | {} | {} |",
            stats.carrier,
            stats.total_shipments,
            stats.overcharges,
            stats.overcharge_rate,
            format_currency(stats.total_overcharged),
            format_currency(stats.average_overcharge)
        );
    }
    let _ = writeln!(output);
}

fn append_discrepancies(output: &mut String, records: &[AuditRecord]) {
    let flagged: Vec<&AuditRecord> = records
        .iter()
        .filter(|record| record.result.discrepancy_type != DiscrepancyType::None)
        .collect();
    if flagged.is_empty() {
        let _ = writeln!(output, "## Discrepancies\nNo discrepancies found.\n");
        return;
    }
    let _ = writeln!(output, "## Discrepancies");
    for record in flagged {
        let result = &record.result;
        let marker = if result.auto_create_case {
            " (case)"
        } else {
            ""
        };
        let _ = writeln!(
            output,
            "- [{}] {} `{}` {} {}: {}{marker}",
            result.severity.as_str(),
            record.carrier,
            record.tracking_number,
            result.discrepancy_type.as_str(),
            format_currency(result.difference),
            result.reason
        );
    }
    let _ = writeln!(output);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::audit_records;
    use crate::audit::tests::shipment;
    use crate::summary::{get_carrier_stats, summarize_records};

    fn sample_records() -> Vec<AuditRecord> {
        let mut fedex = shipment(50.0, 40.0);
        fedex.carrier = "FEDEX".to_string();
        fedex.tracking_number = "794644790138".to_string();
        audit_records(&[shipment(100.0, 160.0), fedex, shipment(10.0, 10.0)])
    }

    #[test]
    fn renders_audit_markdown() {
        let records = sample_records();
        let output = render_audit_markdown(
            &records,
            &summarize_records(&records),
            &get_carrier_stats(&records),
        );
        assert!(output.contains("ClaimDesk Audit Report"));
        assert!(output.contains("- Shipments audited: 3"));
        assert!(output.contains("- Net discrepancy: $50.00"));
        assert!(output.contains("| UPS | 2 | 1 | 50.0% | $60.00 | $60.00 |"));
        assert!(output.contains("- [CRITICAL] UPS `1Z999AA10123456784` OVERCHARGE $60.00"));
        assert!(output.contains("(case)"));
        assert!(output.contains("UNDERCHARGE -$10.00"));
    }

    #[test]
    fn renders_empty_markdown() {
        let output = render_audit_markdown(&[], &AuditSummary::default(), &[]);
        assert!(output.contains("No shipments audited."));
        assert!(output.contains("No discrepancies found."));
    }

    #[test]
    fn renders_audit_text() {
        let records = sample_records();
        let output = render_audit_text(
            &records,
            &summarize_records(&records),
            &get_carrier_stats(&records),
        );
        let first = output.lines().next().expect("headline");
        assert_eq!(
            first,
            "Audited 3 shipments: 1 overcharged ($60.00), 1 undercharged ($10.00), net $50.00"
        );
        assert!(output.contains("FEDEX: 0/1 overcharged (0.0%), avg $0.00"));
        assert_eq!(output.lines().count(), 2 + 2 + 3);
    }

    #[test]
    fn renders_json_payload() {
        let records = sample_records();
        let json = render_json(&records).expect("json");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert!(parsed.is_array());
        assert_eq!(parsed[0]["result"]["discrepancyType"], "OVERCHARGE");
        assert_eq!(parsed[1]["trackingNumber"], "794644790138");
    }

    #[test]
    fn formats_currency_with_sign() {
        assert_eq!(format_currency(12.346), "$12.35");
        assert_eq!(format_currency(-10.0), "-$10.00");
        assert_eq!(format_currency(0.0), "$0.00");
    }
}
