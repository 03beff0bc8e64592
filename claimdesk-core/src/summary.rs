//! Aggregate statistics over audit results.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::audit::{AuditRecord, AuditResult, DiscrepancyType, Severity};

/// Totals across a batch of audit results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    /// Number of results summarized.
    pub total_shipments: usize,
    /// Results classified as overcharges.
    pub overcharge_count: usize,
    /// Results classified as undercharges.
    pub undercharge_count: usize,
    /// Results within tolerance.
    pub no_discrepancy_count: usize,
    /// Sum of overcharge differences.
    pub total_overcharged: f64,
    /// Sum of absolute undercharge differences.
    pub total_undercharged: f64,
    /// `total_overcharged - total_undercharged`.
    pub net_discrepancy: f64,
    /// Results with `CRITICAL` severity.
    pub critical_issues: usize,
    /// Results with `HIGH` severity.
    pub high_issues: usize,
    /// Results with `MEDIUM` severity.
    pub medium_issues: usize,
    /// Results flagged for automatic case creation.
    pub auto_create_count: usize,
    /// Mean overcharge, 0 when nothing was overcharged.
    pub average_overcharge: f64,
}

/// Per-carrier overcharge statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CarrierStats {
    /// Carrier label as it appeared in the input.
    pub carrier: String,
    /// Shipments audited for this carrier.
    pub total_shipments: usize,
    /// Overcharged shipments.
    pub overcharges: usize,
    /// Overcharged shipments as a percentage of all shipments.
    pub overcharge_rate: f64,
    /// Sum of overcharge differences.
    pub total_overcharged: f64,
    /// Mean overcharge, 0 when nothing was overcharged.
    pub average_overcharge: f64,
}

/// Summarize a batch of audit results.
pub fn get_audit_summary(results: &[AuditResult]) -> AuditSummary {
    let mut summary = AuditSummary {
        total_shipments: results.len(),
        ..AuditSummary::default()
    };

    for result in results {
        match result.discrepancy_type {
            DiscrepancyType::Overcharge => {
                summary.overcharge_count += 1;
                summary.total_overcharged += result.difference;
            }
            DiscrepancyType::Undercharge => {
                summary.undercharge_count += 1;
                summary.total_undercharged += result.difference.abs();
            }
            DiscrepancyType::None => summary.no_discrepancy_count += 1,
        }

        // LOW is deliberately not bucketed.
        match result.severity {
            Severity::Critical => summary.critical_issues += 1,
            Severity::High => summary.high_issues += 1,
            Severity::Medium => summary.medium_issues += 1,
            Severity::Low => {}
        }

        if result.auto_create_case {
            summary.auto_create_count += 1;
        }
    }

    summary.net_discrepancy = summary.total_overcharged - summary.total_undercharged;
    summary.average_overcharge = average(summary.total_overcharged, summary.overcharge_count);
    summary
}

/// Summarize audit records by delegating to [`get_audit_summary`].
pub fn summarize_records(records: &[AuditRecord]) -> AuditSummary {
    let results: Vec<AuditResult> = records.iter().map(|record| record.result.clone()).collect();
    get_audit_summary(&results)
}

/// Per-carrier statistics, in order of each carrier's first appearance.
pub fn get_carrier_stats(records: &[AuditRecord]) -> Vec<CarrierStats> {
    let mut stats: Vec<CarrierStats> = Vec::new();

    for record in records {
        let index = match stats.iter().position(|entry| entry.carrier == record.carrier) {
            Some(index) => index,
            None => {
                stats.push(CarrierStats {
                    carrier: record.carrier.clone(),
                    total_shipments: 0,
                    overcharges: 0,
                    overcharge_rate: 0.0,
                    total_overcharged: 0.0,
                    average_overcharge: 0.0,
                });
                stats.len() - 1
            }
        };
        let entry = &mut stats[index];
        entry.total_shipments += 1;
        if record.result.discrepancy_type == DiscrepancyType::Overcharge {
            entry.overcharges += 1;
            entry.total_overcharged += record.result.difference;
        }
    }

    for entry in &mut stats {
        entry.overcharge_rate = (entry.overcharges as f64 / entry.total_shipments as f64) * 100.0;
        entry.average_overcharge = average(entry.total_overcharged, entry.overcharges);
    }

    stats
}

fn average(total: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::tests::shipment;
    use crate::audit::{audit_records, batch_audit_shipments};

    #[test]
    fn summary_counts_every_bucket() {
        let results = batch_audit_shipments(&[
            shipment(100.0, 160.0),
            shipment(100.0, 130.0),
            shipment(100.0, 115.0),
            shipment(50.0, 40.0),
            shipment(10.0, 10.0),
        ]);

        let summary = get_audit_summary(&results);

        assert_eq!(summary.total_shipments, 5);
        assert_eq!(summary.overcharge_count, 3);
        assert_eq!(summary.undercharge_count, 1);
        assert_eq!(summary.no_discrepancy_count, 1);
        assert!((summary.total_overcharged - 105.0).abs() < 1e-9);
        assert!((summary.total_undercharged - 10.0).abs() < 1e-9);
        assert!((summary.net_discrepancy - 95.0).abs() < 1e-9);
        assert_eq!(summary.critical_issues, 1);
        assert_eq!(summary.high_issues, 1);
        assert_eq!(summary.medium_issues, 2);
        assert_eq!(summary.auto_create_count, 2);
        assert!((summary.average_overcharge - 35.0).abs() < 1e-9);
    }

    #[test]
    fn low_severity_is_not_bucketed() {
        let results = batch_audit_shipments(&[shipment(10.0, 10.0), shipment(20.0, 20.1)]);

        let summary = get_audit_summary(&results);

        assert_eq!(summary.total_shipments, 2);
        assert_eq!(
            summary.critical_issues + summary.high_issues + summary.medium_issues,
            0
        );
    }

    #[test]
    fn empty_summary_has_zero_average() {
        let summary = get_audit_summary(&[]);

        assert_eq!(summary.total_shipments, 0);
        assert_eq!(summary.average_overcharge, 0.0);
        assert!(!summary.average_overcharge.is_nan());
        assert_eq!(summary.net_discrepancy, 0.0);
    }

    #[test]
    fn net_discrepancy_matches_totals() {
        let results = batch_audit_shipments(&[
            shipment(12.5, 19.75),
            shipment(33.0, 21.4),
            shipment(8.0, 8.9),
            shipment(61.0, 44.0),
        ]);

        let summary = get_audit_summary(&results);

        assert!(
            (summary.total_overcharged - summary.total_undercharged - summary.net_discrepancy)
                .abs()
                < 1e-9
        );
    }

    #[test]
    fn carrier_stats_follow_first_appearance() {
        let mut ups = shipment(100.0, 160.0);
        ups.carrier = "UPS".to_string();
        let mut fedex = shipment(50.0, 40.0);
        fedex.carrier = "FEDEX".to_string();
        let mut ups_again = shipment(10.0, 10.0);
        ups_again.carrier = "UPS".to_string();
        let mut fedex_over = shipment(20.0, 30.0);
        fedex_over.carrier = "FEDEX".to_string();

        let stats = get_carrier_stats(&audit_records(&[ups, fedex, ups_again, fedex_over]));

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].carrier, "UPS");
        assert_eq!(stats[0].total_shipments, 2);
        assert_eq!(stats[0].overcharges, 1);
        assert!((stats[0].overcharge_rate - 50.0).abs() < 1e-9);
        assert!((stats[0].average_overcharge - 60.0).abs() < 1e-9);
        assert_eq!(stats[1].carrier, "FEDEX");
        assert!((stats[1].total_overcharged - 10.0).abs() < 1e-9);
    }

    #[test]
    fn carrier_without_overcharges_has_zero_average() {
        let mut usps = shipment(50.0, 40.0);
        usps.carrier = "USPS".to_string();

        let stats = get_carrier_stats(&audit_records(&[usps]));

        assert_eq!(stats[0].overcharges, 0);
        assert_eq!(stats[0].overcharge_rate, 0.0);
        assert_eq!(stats[0].average_overcharge, 0.0);
        assert!(get_carrier_stats(&[]).is_empty());
    }

    #[test]
    fn summarize_records_matches_results() {
        let shipments = vec![shipment(100.0, 160.0), shipment(50.0, 40.0)];
        let from_records = summarize_records(&audit_records(&shipments));
        let from_results = get_audit_summary(&batch_audit_shipments(&shipments));
        assert_eq!(from_records, from_results);
    }
}
