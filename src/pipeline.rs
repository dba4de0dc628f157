use thiserror::Error;
use tracing::{debug, info};

use crate::cohort::build_cohorts;
use crate::conversion::evaluate_conversion;
use crate::linker::{exclusion_reason, link_staff};
use crate::metrics::compute_cohort_metrics;
use crate::models::{
    AttendanceRow, ClientDetail, CohortMetrics, IntakeAudit, IntakeRow, PipelineResult, SaleRow,
    UNKNOWN_STAFF,
};
use crate::normalize::{normalize_attendance, normalize_intake, normalize_sales};
use crate::retention::evaluate_retention;
use crate::rollup::build_rollups;

/// Structural pipeline failures. Field-level data-quality issues never
/// surface here; they degrade to defaults inside the normalizer and are
/// recorded as reason strings on audit records.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV decode failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON encode failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Runs the full reconciliation pipeline over the three uploaded datasets.
///
/// The stages run strictly in sequence; `on_progress` is invoked at
/// monotonically increasing checkpoints with a short stage description so
/// an interactive caller can refresh an indicator. The callback cannot fail
/// and is never relied on by the pipeline. An empty sales dataset is valid
/// and yields zero conversions and revenue.
pub fn run<F>(
    intake_rows: &[IntakeRow],
    attendance_rows: &[AttendanceRow],
    sale_rows: &[SaleRow],
    mut on_progress: F,
) -> Result<PipelineResult, PipelineError>
where
    F: FnMut(u8, &str),
{
    on_progress(5, "Normalizing records");
    let mut intake = normalize_intake(intake_rows);
    let attendance = normalize_attendance(attendance_rows);
    let sales = normalize_sales(sale_rows);
    debug!(
        intake = intake.len(),
        attendance = attendance.len(),
        sales = sales.len(),
        "normalized input datasets"
    );

    on_progress(20, "Linking staff identities");
    link_staff(&mut intake, &attendance);

    let mut included_records = Vec::new();
    let mut excluded_records = Vec::new();
    let mut included = Vec::new();
    for record in intake {
        match exclusion_reason(&record) {
            Some(reason) => {
                excluded_records.push(IntakeAudit { record, reason });
            }
            None => {
                let reason = if record.staff == UNKNOWN_STAFF {
                    "No attendance match; staff unknown".to_string()
                } else {
                    format!("Matched to staff {} via attendance", record.staff)
                };
                included_records.push(IntakeAudit {
                    record: record.clone(),
                    reason,
                });
                included.push(record);
            }
        }
    }
    info!(
        included = included.len(),
        excluded = excluded_records.len(),
        "identity linkage and exclusion complete"
    );

    on_progress(40, "Building cohorts");
    let cohorts = build_cohorts(&included, &attendance);
    debug!(cohorts = cohorts.len(), "built cohorts");

    on_progress(60, "Evaluating retention and conversion");
    let mut staff_cohorts: Vec<CohortMetrics> = Vec::new();
    for cohort in &cohorts {
        let retention = evaluate_retention(cohort, &attendance);
        let conversion = evaluate_conversion(cohort, &sales);
        staff_cohorts.push(compute_cohort_metrics(
            cohort,
            &attendance,
            &retention,
            &conversion,
            &excluded_records,
        ));
    }

    on_progress(80, "Aggregating location rollups");
    let rollups = build_rollups(&staff_cohorts);

    on_progress(100, "Assembling results");
    Ok(assemble(staff_cohorts, rollups, included_records, excluded_records))
}

/// Orders cohorts deterministically (most recent period first, then
/// location, then staff), appends the rollups, and flattens the audit and
/// detail lists for downstream inspection.
fn assemble(
    mut staff_cohorts: Vec<CohortMetrics>,
    mut rollups: Vec<CohortMetrics>,
    included_records: Vec<IntakeAudit>,
    excluded_records: Vec<IntakeAudit>,
) -> PipelineResult {
    let sort_key = |c: &CohortMetrics| {
        (
            std::cmp::Reverse(c.period_start),
            c.location.clone(),
            c.staff.clone(),
        )
    };
    staff_cohorts.sort_by_key(sort_key);
    rollups.sort_by_key(sort_key);

    let staff_members: Vec<String> = staff_cohorts
        .iter()
        .map(|c| c.staff.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    let locations: Vec<String> = staff_cohorts
        .iter()
        .map(|c| c.location.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut period_keys: Vec<(chrono::NaiveDate, String)> = staff_cohorts
        .iter()
        .map(|c| (c.period_start, c.period.clone()))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    period_keys.sort_by_key(|(start, _)| std::cmp::Reverse(*start));
    let periods: Vec<String> = period_keys.into_iter().map(|(_, label)| label).collect();

    let new_client_records: Vec<ClientDetail> = staff_cohorts
        .iter()
        .flat_map(|c| c.new_client_details.iter().cloned())
        .collect();
    let converted_client_records: Vec<ClientDetail> = staff_cohorts
        .iter()
        .flat_map(|c| c.converted_client_details.iter().cloned())
        .collect();
    let retained_client_records: Vec<ClientDetail> = staff_cohorts
        .iter()
        .flat_map(|c| c.retained_client_details.iter().cloned())
        .collect();

    let mut cohorts = staff_cohorts;
    cohorts.extend(rollups);

    PipelineResult {
        cohorts,
        staff_members,
        locations,
        periods,
        included_records,
        excluded_records,
        new_client_records,
        converted_client_records,
        retained_client_records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ALL_STAFF, ConversionStatus};

    fn intake_row(email: &str, class: &str, date: &str) -> IntakeRow {
        IntakeRow {
            first_name: "Ada".to_string(),
            last_name: "Ng".to_string(),
            email: email.to_string(),
            membership: "Intro Offer".to_string(),
            first_visit_date: date.to_string(),
            first_visit_class: class.to_string(),
            first_visit_location: "Studio A".to_string(),
            ..Default::default()
        }
    }

    fn attendance_row(email: &str, class: &str, date: &str, staff: &str) -> AttendanceRow {
        AttendanceRow {
            class_name: class.to_string(),
            class_date: date.to_string(),
            location: "Studio A".to_string(),
            staff: staff.to_string(),
            email: email.to_string(),
            cancelled: "FALSE".to_string(),
            late_cancelled: "FALSE".to_string(),
            no_show: "FALSE".to_string(),
            ..Default::default()
        }
    }

    fn sale_row(email: &str, item: &str, date: &str, value: &str) -> SaleRow {
        SaleRow {
            category: "Membership".to_string(),
            item: item.to_string(),
            date: date.to_string(),
            value: value.to_string(),
            refunded: "FALSE".to_string(),
            email: email.to_string(),
            ..Default::default()
        }
    }

    fn baseline() -> (Vec<IntakeRow>, Vec<AttendanceRow>, Vec<SaleRow>) {
        let intake = vec![
            intake_row("a@x.com", "Trial", "2024-01-05"),
            intake_row("b@x.com", "2 For 1 Intro", "2024-01-06"),
        ];
        let attendance = vec![
            // First visits, matched by the identity linker.
            attendance_row("a@x.com", "Trial", "2024-01-05", "T1"),
            attendance_row("b@x.com", "2 For 1 Intro", "2024-01-06", "T1"),
            // Return visits.
            attendance_row("a@x.com", "Flow", "2024-01-12", "T1"),
            attendance_row("b@x.com", "Flow", "2024-01-13", "T1"),
        ];
        let sales = vec![sale_row("a@x.com", "10-Class Pack", "2024-01-20", "$1,200.00")];
        (intake, attendance, sales)
    }

    #[test]
    fn end_to_end_scenario_retains_and_converts() {
        let (intake, attendance, sales) = baseline();
        let result = run(&intake, &attendance, &sales, |_, _| {}).unwrap();

        let cohort = result
            .cohorts
            .iter()
            .find(|c| c.staff == "T1")
            .expect("cohort for T1");
        assert_eq!(cohort.new_clients, 2);
        // a@x.com has one clean return (threshold 1); b@x.com is on the
        // "2 for 1" rule and one return does not meet its threshold of 2.
        assert_eq!(cohort.retained, 1);
        assert_eq!(cohort.converted, 1);
        assert_eq!(cohort.total_revenue, 1200.0);
        assert_eq!(cohort.conversion_rate, 50.0);

        let detail = result
            .converted_client_records
            .iter()
            .find(|d| d.email == "a@x.com")
            .expect("converted detail for a@x.com");
        assert_eq!(detail.status, ConversionStatus::Converted);
        assert_eq!(detail.first_purchase_value, Some(1200.0));

        let rollup = result
            .cohorts
            .iter()
            .find(|c| c.staff == ALL_STAFF)
            .expect("studio rollup");
        assert_eq!(rollup.new_clients, 2);
        assert_eq!(rollup.location, "Studio A");
    }

    #[test]
    fn two_returns_meet_the_two_for_one_threshold() {
        let (intake, mut attendance, sales) = baseline();
        attendance.push(attendance_row("b@x.com", "Sculpt", "2024-01-19", "T1"));
        let result = run(&intake, &attendance, &sales, |_, _| {}).unwrap();
        let cohort = result.cohorts.iter().find(|c| c.staff == "T1").unwrap();
        assert_eq!(cohort.retained, 2);
    }

    #[test]
    fn empty_sales_dataset_is_valid_and_converts_nobody() {
        let (intake, attendance, _) = baseline();
        let result = run(&intake, &attendance, &[], |_, _| {}).unwrap();
        for cohort in &result.cohorts {
            assert_eq!(cohort.converted, 0);
            assert_eq!(cohort.total_revenue, 0.0);
            assert!(cohort.weekly_revenue.is_empty());
        }
        assert!(result.converted_client_records.is_empty());
    }

    #[test]
    fn excluded_records_appear_only_in_the_audit_list() {
        let (mut intake, attendance, sales) = baseline();
        let mut staff_visit = intake_row("staff@x.com", "Trial", "2024-01-07");
        staff_visit.membership = "Staff Pass".to_string();
        intake.push(staff_visit);
        let result = run(&intake, &attendance, &sales, |_, _| {}).unwrap();

        assert_eq!(result.excluded_records.len(), 1);
        assert_eq!(result.excluded_records[0].record.email, "staff@x.com");
        for cohort in &result.cohorts {
            assert!(cohort
                .new_client_details
                .iter()
                .all(|d| d.email != "staff@x.com"));
        }
    }

    #[test]
    fn unlinked_records_are_audited_but_join_no_cohort() {
        let (mut intake, attendance, sales) = baseline();
        intake.push(intake_row("ghost@x.com", "Trial", "2024-01-08"));
        let result = run(&intake, &attendance, &sales, |_, _| {}).unwrap();

        let audit = result
            .included_records
            .iter()
            .find(|a| a.record.email == "ghost@x.com")
            .expect("audit entry for unlinked record");
        assert_eq!(audit.record.staff, UNKNOWN_STAFF);
        assert!(audit.reason.contains("No attendance match"));
        for cohort in &result.cohorts {
            assert!(cohort.new_client_details.iter().all(|d| d.email != "ghost@x.com"));
        }
    }

    #[test]
    fn rollup_new_client_counts_equal_the_staff_cohort_sum() {
        let (mut intake, mut attendance, sales) = baseline();
        intake.push(intake_row("c@x.com", "Trial", "2024-01-09"));
        attendance.push(attendance_row("c@x.com", "Trial", "2024-01-09", "T2"));
        let result = run(&intake, &attendance, &sales, |_, _| {}).unwrap();

        let staff_sum: u32 = result
            .cohorts
            .iter()
            .filter(|c| c.staff != ALL_STAFF)
            .map(|c| c.new_clients)
            .sum();
        let rollup = result
            .cohorts
            .iter()
            .find(|c| c.staff == ALL_STAFF)
            .unwrap();
        assert_eq!(rollup.new_clients, staff_sum);
        assert_eq!(rollup.new_clients, 3);
    }

    #[test]
    fn progress_checkpoints_increase_monotonically() {
        let (intake, attendance, sales) = baseline();
        let mut checkpoints = Vec::new();
        run(&intake, &attendance, &sales, |pct, stage| {
            checkpoints.push((pct, stage.to_string()));
        })
        .unwrap();
        assert_eq!(checkpoints.first().map(|(p, _)| *p), Some(5));
        assert_eq!(checkpoints.last().map(|(p, _)| *p), Some(100));
        assert!(checkpoints.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(checkpoints.iter().all(|(_, stage)| !stage.is_empty()));
    }

    #[test]
    fn reruns_on_identical_input_are_identical() {
        let (intake, attendance, sales) = baseline();
        let first = run(&intake, &attendance, &sales, |_, _| {}).unwrap();
        let second = run(&intake, &attendance, &sales, |_, _| {}).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn periods_are_sorted_most_recent_first() {
        let (mut intake, mut attendance, sales) = baseline();
        intake.push(intake_row("c@x.com", "Trial", "2024-02-03"));
        attendance.push(attendance_row("c@x.com", "Trial", "2024-02-03", "T1"));
        let result = run(&intake, &attendance, &sales, |_, _| {}).unwrap();
        assert_eq!(result.periods, vec!["February 2024", "January 2024"]);
    }
}
