use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::models::{AttendanceRecord, IntakeRecord, UNKNOWN_STAFF};
use crate::normalize::{period_key_of, period_start_of};

/// Qualifying new clients sharing one (staff, location, period) key.
#[derive(Debug, Clone)]
pub struct Cohort {
    pub staff: String,
    pub location: String,
    pub period: String,
    pub period_start: NaiveDate,
    pub members: Vec<IntakeRecord>,
}

/// Partitions enriched, non-excluded intake records into cohorts. Staff
/// members are enumerated from attendance only (never the `Unknown`
/// sentinel), locations from the intake records, and periods from
/// first-visit months. Triples with no members are skipped, so an empty
/// cohort is never emitted.
pub fn build_cohorts(intake: &[IntakeRecord], attendance: &[AttendanceRecord]) -> Vec<Cohort> {
    let staff_members: BTreeSet<&str> = attendance
        .iter()
        .map(|a| a.staff.as_str())
        .filter(|s| !s.is_empty() && *s != UNKNOWN_STAFF)
        .collect();

    let locations: BTreeSet<&str> = intake
        .iter()
        .map(|r| r.first_visit_location.as_str())
        .filter(|l| !l.is_empty())
        .collect();

    let periods: BTreeSet<NaiveDate> = intake
        .iter()
        .filter_map(|r| r.first_visit_date)
        .map(period_start_of)
        .collect();

    let mut cohorts = Vec::new();
    for staff in &staff_members {
        for location in &locations {
            for period_start in &periods {
                let members: Vec<IntakeRecord> = intake
                    .iter()
                    .filter(|r| {
                        r.staff == *staff
                            && r.first_visit_location == *location
                            && r.first_visit_date.map(period_start_of) == Some(*period_start)
                    })
                    .cloned()
                    .collect();
                if members.is_empty() {
                    continue;
                }
                cohorts.push(Cohort {
                    staff: (*staff).to_string(),
                    location: (*location).to_string(),
                    period: period_key_of(*period_start),
                    period_start: *period_start,
                    members,
                });
            }
        }
    }
    cohorts
}
