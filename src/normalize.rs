use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use crate::models::{
    AttendanceRecord, AttendanceRow, IntakeRecord, IntakeRow, SaleRecord, SaleRow, UNKNOWN_STAFF,
};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%d %b %Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M",
];

/// Lenient date parsing. Returns `None` on anything unparseable; callers
/// treat that as a data-quality note, never an error.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Coerces a currency-like string ("$1,250.00", "AED 900") to a number by
/// stripping everything except digits, the decimal point, and a leading
/// minus. Defaults to 0 on failure.
pub fn parse_currency(raw: &str) -> f64 {
    let filtered: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    filtered.parse().unwrap_or(0.0)
}

/// Boolean-like flag coercion ("TRUE", "Yes", "1", "x").
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "x"
    )
}

/// Collapses runs of whitespace and trims the ends.
pub fn clean_label(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-insensitive substring match against a pipe-delimited alternative
/// list, e.g. `matches_any_keyword("Friends & Family", "staff|family")`.
pub fn matches_any_keyword(text: &str, alternatives: &str) -> bool {
    let haystack = text.to_lowercase();
    alternatives.split('|').any(|alt| {
        let needle = alt.trim().to_lowercase();
        !needle.is_empty() && haystack.contains(&needle)
    })
}

pub fn is_strictly_after(a: NaiveDate, b: NaiveDate) -> bool {
    a > b
}

/// Month-granularity period label, e.g. "January 2024".
pub fn period_key_of(date: NaiveDate) -> String {
    date.format("%B %Y").to_string()
}

/// First day of the month containing `date`.
pub fn period_start_of(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// Sunday-aligned start of the week containing `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

fn clean_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn normalize_intake(rows: &[IntakeRow]) -> Vec<IntakeRecord> {
    rows.iter()
        .map(|row| IntakeRecord {
            first_name: clean_label(&row.first_name),
            last_name: clean_label(&row.last_name),
            email: clean_email(&row.email),
            phone: row.phone.trim().to_string(),
            payment_method: clean_label(&row.payment_method),
            membership: clean_label(&row.membership),
            first_visit_date: parse_date(&row.first_visit_date),
            first_visit_class: clean_label(&row.first_visit_class),
            first_visit_location: clean_label(&row.first_visit_location),
            visit_type: clean_label(&row.visit_type),
            home_location: clean_label(&row.home_location),
            staff: UNKNOWN_STAFF.to_string(),
        })
        .collect()
}

pub fn normalize_attendance(rows: &[AttendanceRow]) -> Vec<AttendanceRecord> {
    rows.iter()
        .map(|row| AttendanceRecord {
            sale_date: parse_date(&row.sale_date),
            class_name: clean_label(&row.class_name),
            class_date: parse_date(&row.class_date),
            location: clean_label(&row.location),
            staff: clean_label(&row.staff),
            email: clean_email(&row.email),
            payment_method: clean_label(&row.payment_method),
            membership: clean_label(&row.membership),
            value: parse_currency(&row.value),
            tax: parse_currency(&row.tax),
            cancelled: parse_flag(&row.cancelled),
            late_cancelled: parse_flag(&row.late_cancelled),
            no_show: parse_flag(&row.no_show),
            seller: clean_label(&row.seller),
            refunded: parse_flag(&row.refunded),
            home_location: clean_label(&row.home_location),
        })
        .collect()
}

pub fn normalize_sales(rows: &[SaleRow]) -> Vec<SaleRecord> {
    rows.iter()
        .map(|row| SaleRecord {
            category: clean_label(&row.category),
            item: clean_label(&row.item),
            date: parse_date(&row.date),
            value: parse_currency(&row.value),
            tax: parse_currency(&row.tax),
            refunded: parse_flag(&row.refunded),
            payment_method: clean_label(&row.payment_method),
            seller: clean_label(&row.seller),
            payer_email: clean_email(&row.payer_email),
            payer_name: clean_label(&row.payer_name),
            email: clean_email(&row.email),
            name: clean_label(&row.name),
            location: clean_label(&row.location),
            note: row.note.trim().to_string(),
        })
        .collect()
}
