use chrono::NaiveDate;

use crate::cohort::Cohort;
use crate::models::AttendanceRecord;
use crate::normalize::{is_strictly_after, matches_any_keyword};

/// Channel marker that raises the retention threshold to two return visits.
pub const TWO_FOR_ONE_MARKER: &str = "2 for 1";

#[derive(Debug, Clone)]
pub struct RetentionOutcome {
    pub email: String,
    pub return_visits: u32,
    pub threshold: u32,
    pub retained: bool,
    /// Earliest qualifying return visit, reported as the post-trial
    /// first-visit date on client detail records.
    pub first_return_visit: Option<NaiveDate>,
    pub reason: String,
}

/// Evaluates retention for every cohort member. A return visit qualifies
/// when the attendance row matches the cohort's staff and location, the
/// member's email, falls strictly after the member's first visit, and none
/// of the cancelled/late-cancelled/no-show flags are set. Members whose
/// first-visit class carries the "2 for 1" marker need two qualifying
/// returns; everyone else needs one.
pub fn evaluate_retention(cohort: &Cohort, attendance: &[AttendanceRecord]) -> Vec<RetentionOutcome> {
    cohort
        .members
        .iter()
        .map(|member| {
            let mut return_visits = 0u32;
            let mut first_return_visit: Option<NaiveDate> = None;
            for row in attendance {
                let qualifies = row.staff == cohort.staff
                    && row.location.eq_ignore_ascii_case(&cohort.location)
                    && row.email == member.email
                    && !row.cancelled
                    && !row.late_cancelled
                    && !row.no_show
                    && match (row.class_date, member.first_visit_date) {
                        (Some(class), Some(first)) => is_strictly_after(class, first),
                        _ => false,
                    };
                if qualifies {
                    return_visits += 1;
                    first_return_visit = match (first_return_visit, row.class_date) {
                        (Some(existing), Some(date)) => Some(existing.min(date)),
                        (None, date) => date,
                        (existing, None) => existing,
                    };
                }
            }

            let threshold = if matches_any_keyword(&member.first_visit_class, TWO_FOR_ONE_MARKER) {
                2
            } else {
                1
            };
            let retained = return_visits >= threshold;
            let reason = if retained {
                format!(
                    "{return_visits} qualifying return visit(s); threshold of {threshold} met"
                )
            } else {
                format!(
                    "{return_visits} qualifying return visit(s); threshold of {threshold} not met"
                )
            };

            RetentionOutcome {
                email: member.email.clone(),
                return_visits,
                threshold,
                retained,
                first_return_visit,
                reason,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntakeRecord;

    fn cohort_with(class: &str) -> Cohort {
        Cohort {
            staff: "T1".to_string(),
            location: "Studio A".to_string(),
            period: "January 2024".to_string(),
            period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            members: vec![IntakeRecord {
                first_name: "Ada".to_string(),
                last_name: "Ng".to_string(),
                email: "a@x.com".to_string(),
                phone: String::new(),
                payment_method: String::new(),
                membership: "Intro Offer".to_string(),
                first_visit_date: NaiveDate::from_ymd_opt(2024, 1, 5),
                first_visit_class: class.to_string(),
                first_visit_location: "Studio A".to_string(),
                visit_type: String::new(),
                home_location: String::new(),
                staff: "T1".to_string(),
            }],
        }
    }

    fn visit(day: u32) -> AttendanceRecord {
        AttendanceRecord {
            sale_date: None,
            class_name: "Flow".to_string(),
            class_date: NaiveDate::from_ymd_opt(2024, 1, day),
            location: "Studio A".to_string(),
            staff: "T1".to_string(),
            email: "a@x.com".to_string(),
            payment_method: String::new(),
            membership: String::new(),
            value: 0.0,
            tax: 0.0,
            cancelled: false,
            late_cancelled: false,
            no_show: false,
            seller: String::new(),
            refunded: false,
            home_location: String::new(),
        }
    }

    #[test]
    fn one_clean_return_visit_retains_a_standard_client() {
        let cohort = cohort_with("Trial");
        let outcomes = evaluate_retention(&cohort, &[visit(12)]);
        assert!(outcomes[0].retained);
        assert_eq!(outcomes[0].return_visits, 1);
        assert_eq!(outcomes[0].threshold, 1);
        assert_eq!(
            outcomes[0].first_return_visit,
            NaiveDate::from_ymd_opt(2024, 1, 12)
        );
    }

    #[test]
    fn two_for_one_clients_need_two_returns() {
        let cohort = cohort_with("2 For 1 Intro");
        let outcomes = evaluate_retention(&cohort, &[visit(12)]);
        assert!(!outcomes[0].retained);
        assert_eq!(outcomes[0].threshold, 2);
        assert!(outcomes[0].reason.contains("not met"));

        let outcomes = evaluate_retention(&cohort, &[visit(12), visit(19)]);
        assert!(outcomes[0].retained);
    }

    #[test]
    fn flagged_visits_and_the_first_visit_itself_never_count() {
        let cohort = cohort_with("Trial");
        let mut cancelled = visit(12);
        cancelled.cancelled = true;
        let mut no_show = visit(14);
        no_show.no_show = true;
        // Same-day visit is not strictly after the first visit.
        let same_day = visit(5);
        let outcomes = evaluate_retention(&cohort, &[cancelled, no_show, same_day]);
        assert!(!outcomes[0].retained);
        assert_eq!(outcomes[0].return_visits, 0);
    }

    #[test]
    fn visits_with_other_staff_or_location_do_not_count() {
        let cohort = cohort_with("Trial");
        let mut elsewhere = visit(12);
        elsewhere.location = "Studio B".to_string();
        let mut other_staff = visit(14);
        other_staff.staff = "T2".to_string();
        let outcomes = evaluate_retention(&cohort, &[elsewhere, other_staff]);
        assert_eq!(outcomes[0].return_visits, 0);
    }
}
