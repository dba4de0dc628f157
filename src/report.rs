use std::fmt::Write;

use crate::models::{ALL_STAFF, PipelineResult};

/// Renders the pipeline result as a markdown summary: per-location rollups
/// first, then the per-staff cohorts and the most recent conversions.
pub fn build_report(result: &PipelineResult) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Studio Cohort Report");
    let _ = writeln!(
        output,
        "{} staff across {} location(s), {} period(s)",
        result.staff_members.len(),
        result.locations.len(),
        result.periods.len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Location Rollups");
    let rollups: Vec<_> = result
        .cohorts
        .iter()
        .filter(|c| c.staff == ALL_STAFF)
        .collect();
    if rollups.is_empty() {
        let _ = writeln!(output, "No qualifying cohorts for this upload.");
    } else {
        for rollup in rollups {
            let _ = writeln!(
                output,
                "- {} ({}): {} new, retention {:.1}%, conversion {:.1}%, revenue {:.2}",
                rollup.location,
                rollup.period,
                rollup.new_clients,
                rollup.retention_rate,
                rollup.conversion_rate,
                rollup.total_revenue
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Staff Cohorts");
    let staff_cohorts: Vec<_> = result
        .cohorts
        .iter()
        .filter(|c| c.staff != ALL_STAFF)
        .collect();
    if staff_cohorts.is_empty() {
        let _ = writeln!(output, "No qualifying cohorts for this upload.");
    } else {
        for cohort in staff_cohorts {
            let _ = writeln!(
                output,
                "- {} at {} ({}): {} new, {} retained, {} converted, revenue {:.2}",
                cohort.staff,
                cohort.location,
                cohort.period,
                cohort.new_clients,
                cohort.retained,
                cohort.converted,
                cohort.total_revenue
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Conversions");
    if result.converted_client_records.is_empty() {
        let _ = writeln!(output, "No conversions in this upload.");
    } else {
        let mut conversions = result.converted_client_records.clone();
        conversions.sort_by(|a, b| b.first_purchase_date.cmp(&a.first_purchase_date));
        for detail in conversions.iter().take(10) {
            let _ = writeln!(output, "- {} ({}): {}", detail.name, detail.email, detail.reason);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Excluded records: {} | Unmatched identities: {}",
        result.excluded_records.len(),
        result
            .included_records
            .iter()
            .filter(|a| a.reason.contains("No attendance match"))
            .count()
    );

    output
}
