use crate::models::{AttendanceRecord, IntakeRecord, UNKNOWN_STAFF};
use crate::normalize::matches_any_keyword;

/// Membership or first-visit class labels carrying any of these mark an
/// internal/non-paying visit and exclude the record from every cohort.
pub const INTERNAL_KEYWORDS: &str = "staff|employee|team member|friends|family|comp";

/// Assigns each intake record the staff member who conducted the matching
/// attendance event. The composite key is (email, class label, class date,
/// location); the first match in attendance order wins. Unmatched records
/// keep the `UNKNOWN_STAFF` sentinel.
///
/// Linear scan per intake record; the pipeline runs once per upload, so the
/// O(intake x attendance) cost is acceptable.
pub fn link_staff(intake: &mut [IntakeRecord], attendance: &[AttendanceRecord]) {
    for record in intake.iter_mut() {
        let matched = attendance.iter().find(|a| {
            record.first_visit_date.is_some()
                && a.class_date == record.first_visit_date
                && a.email == record.email
                && a.class_name.eq_ignore_ascii_case(&record.first_visit_class)
                && a.location.eq_ignore_ascii_case(&record.first_visit_location)
        });
        record.staff = match matched {
            Some(a) => a.staff.clone(),
            None => UNKNOWN_STAFF.to_string(),
        };
    }
}

/// Returns the exclusion reason if the record matches a non-customer
/// pattern, naming the field that triggered it. Evaluated once per record;
/// the outcome is permanent for the run.
pub fn exclusion_reason(record: &IntakeRecord) -> Option<String> {
    if matches_any_keyword(&record.membership, INTERNAL_KEYWORDS) {
        return Some(format!(
            "Membership label \"{}\" matches an internal visit type",
            record.membership
        ));
    }
    if matches_any_keyword(&record.first_visit_class, INTERNAL_KEYWORDS) {
        return Some(format!(
            "First-visit class \"{}\" matches an internal visit type",
            record.first_visit_class
        ));
    }
    None
}
