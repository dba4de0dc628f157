use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sentinel assigned when identity linkage finds no attendance match.
pub const UNKNOWN_STAFF: &str = "Unknown";

/// Sentinel staff value on per-location rollups.
pub const ALL_STAFF: &str = "All Staff";

// Raw CSV rows as uploaded. Dates, amounts, and flags arrive as strings and
// are coerced by the normalizer; no row is ever rejected.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntakeRow {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub membership: String,
    #[serde(default)]
    pub first_visit_date: String,
    #[serde(default)]
    pub first_visit_class: String,
    #[serde(default)]
    pub first_visit_location: String,
    #[serde(default)]
    pub visit_type: String,
    #[serde(default)]
    pub home_location: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceRow {
    #[serde(default)]
    pub sale_date: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub class_date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub staff: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub membership: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub tax: String,
    #[serde(default)]
    pub cancelled: String,
    #[serde(default)]
    pub late_cancelled: String,
    #[serde(default)]
    pub no_show: String,
    #[serde(default)]
    pub seller: String,
    #[serde(default)]
    pub refunded: String,
    #[serde(default)]
    pub home_location: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleRow {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub tax: String,
    #[serde(default)]
    pub refunded: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub seller: String,
    #[serde(default)]
    pub payer_email: String,
    #[serde(default)]
    pub payer_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub note: String,
}

// Canonical records produced by the normalizer.

#[derive(Debug, Clone, Serialize)]
pub struct IntakeRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub payment_method: String,
    pub membership: String,
    pub first_visit_date: Option<NaiveDate>,
    pub first_visit_class: String,
    pub first_visit_location: String,
    pub visit_type: String,
    pub home_location: String,
    /// Populated by the identity linker; `UNKNOWN_STAFF` when unmatched.
    pub staff: String,
}

impl IntakeRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub sale_date: Option<NaiveDate>,
    pub class_name: String,
    pub class_date: Option<NaiveDate>,
    pub location: String,
    pub staff: String,
    pub email: String,
    pub payment_method: String,
    pub membership: String,
    pub value: f64,
    pub tax: f64,
    pub cancelled: bool,
    pub late_cancelled: bool,
    pub no_show: bool,
    pub seller: String,
    pub refunded: bool,
    pub home_location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleRecord {
    pub category: String,
    pub item: String,
    pub date: Option<NaiveDate>,
    pub value: f64,
    pub tax: f64,
    pub refunded: bool,
    pub payment_method: String,
    pub seller: String,
    pub payer_email: String,
    pub payer_name: String,
    pub email: String,
    pub name: String,
    pub location: String,
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Converted,
    NotConverted,
}

/// Per-client audit record attached to each cohort detail list.
#[derive(Debug, Clone, Serialize)]
pub struct ClientDetail {
    pub email: String,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub value: Option<f64>,
    pub visit_count: Option<u32>,
    pub membership: String,
    pub status: ConversionStatus,
    pub reason: String,
    pub first_purchase_date: Option<NaiveDate>,
    pub first_purchase_item: Option<String>,
    pub first_purchase_value: Option<f64>,
    pub post_trial_first_visit: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyRevenue {
    /// Sunday-aligned start of the week.
    pub week_start: NaiveDate,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelCount {
    pub channel: String,
    pub count: u32,
}

/// Metrics for one (staff, location, period) cohort. Per-location rollups
/// reuse this shape with `staff` set to `ALL_STAFF`.
#[derive(Debug, Clone, Serialize)]
pub struct CohortMetrics {
    pub staff: String,
    pub location: String,
    /// Human-readable month bucket, e.g. "January 2024".
    pub period: String,
    /// First day of the period month, kept for chronological sorting.
    pub period_start: NaiveDate,

    pub new_clients: u32,
    pub trials: u32,
    pub referrals: u32,
    pub hosted: u32,
    pub influencer_signups: u32,
    pub others: u32,
    pub retained: u32,
    pub converted: u32,
    pub trial_conversions: u32,
    pub referral_conversions: u32,
    pub influencer_conversions: u32,

    pub retention_rate: f64,
    pub conversion_rate: f64,
    pub no_show_rate: f64,
    pub late_cancellation_rate: f64,
    pub first_time_buyer_rate: f64,
    pub influencer_conversion_rate: f64,
    pub referral_conversion_rate: f64,
    pub trial_conversion_rate: f64,

    pub total_revenue: f64,
    pub avg_revenue_per_client: f64,

    pub total_visits: u32,
    pub cancellations: u32,
    pub late_cancellations: u32,
    pub no_shows: u32,
    pub distinct_classes: u32,
    pub distinct_attendees: u32,

    pub new_client_details: Vec<ClientDetail>,
    pub retained_client_details: Vec<ClientDetail>,
    pub converted_client_details: Vec<ClientDetail>,
    pub excluded_client_details: Option<Vec<ClientDetail>>,
    pub weekly_revenue: Vec<WeeklyRevenue>,
    pub channel_distribution: Vec<ChannelCount>,
}

/// An intake record together with its linkage or exclusion reason.
#[derive(Debug, Clone, Serialize)]
pub struct IntakeAudit {
    pub record: IntakeRecord,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Per-staff cohorts followed by per-location rollups.
    pub cohorts: Vec<CohortMetrics>,
    pub staff_members: Vec<String>,
    pub locations: Vec<String>,
    /// Period labels, most recent first.
    pub periods: Vec<String>,
    pub included_records: Vec<IntakeAudit>,
    pub excluded_records: Vec<IntakeAudit>,
    pub new_client_records: Vec<ClientDetail>,
    pub converted_client_records: Vec<ClientDetail>,
    pub retained_client_records: Vec<ClientDetail>,
}
