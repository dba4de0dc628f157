use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::cohort::Cohort;
use crate::conversion::{CohortConversion, ConversionOutcome};
use crate::models::{
    AttendanceRecord, ChannelCount, ClientDetail, CohortMetrics, ConversionStatus, IntakeAudit,
    IntakeRecord, WeeklyRevenue,
};
use crate::normalize::{matches_any_keyword, period_start_of, week_start_of};
use crate::retention::RetentionOutcome;

pub const TRIAL_KEYWORDS: &str = "trial|intro";
pub const REFERRAL_KEYWORDS: &str = "referral|refer a friend";
pub const HOSTED_KEYWORDS: &str = "hosted|host event|private event";
pub const INFLUENCER_KEYWORDS: &str = "influencer|sign up|signup";

/// Acquisition channel, mutually exclusive, assigned in this priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Trial,
    Referral,
    Hosted,
    Influencer,
    Other,
}

impl Channel {
    pub fn label(self) -> &'static str {
        match self {
            Channel::Trial => "Trial",
            Channel::Referral => "Referral",
            Channel::Hosted => "Hosted Event",
            Channel::Influencer => "Influencer Sign-up",
            Channel::Other => "Other",
        }
    }
}

/// Classifies a cohort member by first-visit class label, then membership
/// label, against the channel patterns in fixed priority order.
pub fn classify_channel(member: &IntakeRecord) -> Channel {
    let hit = |keywords: &str| {
        matches_any_keyword(&member.first_visit_class, keywords)
            || matches_any_keyword(&member.membership, keywords)
    };
    if hit(TRIAL_KEYWORDS) {
        Channel::Trial
    } else if hit(REFERRAL_KEYWORDS) {
        Channel::Referral
    } else if hit(HOSTED_KEYWORDS) {
        Channel::Hosted
    } else if hit(INFLUENCER_KEYWORDS) {
        Channel::Influencer
    } else {
        Channel::Other
    }
}

/// Percentage with a guarded denominator: anything over zero is zero.
pub fn pct(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        f64::from(numerator) / f64::from(denominator) * 100.0
    }
}

/// Buckets qualifying sales by the Sunday-aligned start of their week.
pub fn weekly_revenue_series(qualifying_sales: &[(chrono::NaiveDate, f64)]) -> Vec<WeeklyRevenue> {
    let mut buckets: BTreeMap<chrono::NaiveDate, f64> = BTreeMap::new();
    for (date, value) in qualifying_sales {
        *buckets.entry(week_start_of(*date)).or_insert(0.0) += value;
    }
    buckets
        .into_iter()
        .map(|(week_start, revenue)| WeeklyRevenue {
            week_start,
            revenue,
        })
        .collect()
}

/// Derives the full metrics block for one cohort from its retention and
/// conversion evaluations plus the raw attendance rows.
pub fn compute_cohort_metrics(
    cohort: &Cohort,
    attendance: &[AttendanceRecord],
    retention: &[RetentionOutcome],
    conversion: &CohortConversion,
    excluded: &[IntakeAudit],
) -> CohortMetrics {
    let new_clients = cohort.members.len() as u32;

    let retention_by_email: HashMap<&str, &RetentionOutcome> = retention
        .iter()
        .map(|o| (o.email.as_str(), o))
        .collect();
    let conversion_by_email: HashMap<&str, &ConversionOutcome> = conversion
        .outcomes
        .iter()
        .map(|o| (o.email.as_str(), o))
        .collect();

    let mut trials = 0u32;
    let mut referrals = 0u32;
    let mut hosted = 0u32;
    let mut influencer_signups = 0u32;
    let mut others = 0u32;
    let mut trial_conversions = 0u32;
    let mut referral_conversions = 0u32;
    let mut influencer_conversions = 0u32;

    let mut new_client_details = Vec::new();
    let mut retained_client_details = Vec::new();
    let mut converted_client_details = Vec::new();

    for member in &cohort.members {
        let channel = classify_channel(member);
        match channel {
            Channel::Trial => trials += 1,
            Channel::Referral => referrals += 1,
            Channel::Hosted => hosted += 1,
            Channel::Influencer => influencer_signups += 1,
            Channel::Other => others += 1,
        }

        let (Some(ret), Some(conv)) = (
            retention_by_email.get(member.email.as_str()).copied(),
            conversion_by_email.get(member.email.as_str()).copied(),
        ) else {
            continue;
        };

        if conv.converted {
            match channel {
                Channel::Trial => trial_conversions += 1,
                Channel::Referral => referral_conversions += 1,
                Channel::Influencer => influencer_conversions += 1,
                _ => {}
            }
        }

        new_client_details.push(client_detail(member, ret, conv, &conv.reason));
        if ret.retained {
            retained_client_details.push(client_detail(member, ret, conv, &ret.reason));
        }
        if conv.converted {
            converted_client_details.push(client_detail(member, ret, conv, &conv.reason));
        }
    }

    let retained = retention.iter().filter(|o| o.retained).count() as u32;
    // Distinct converted emails, so a duplicated intake row cannot double
    // count a client.
    let converted = conversion
        .outcomes
        .iter()
        .filter(|o| o.converted)
        .map(|o| o.email.as_str())
        .collect::<BTreeSet<_>>()
        .len() as u32;

    // Attendance activity for the cohort's staff and location within the
    // period month; the denominators for no-show and late-cancel rates.
    let mut total_visits = 0u32;
    let mut cancellations = 0u32;
    let mut late_cancellations = 0u32;
    let mut no_shows = 0u32;
    let mut classes: BTreeSet<&str> = BTreeSet::new();
    let mut attendees: BTreeSet<&str> = BTreeSet::new();
    for row in attendance {
        let in_period = row
            .class_date
            .map(period_start_of)
            .is_some_and(|p| p == cohort.period_start);
        if row.staff != cohort.staff
            || !row.location.eq_ignore_ascii_case(&cohort.location)
            || !in_period
        {
            continue;
        }
        total_visits += 1;
        if row.cancelled {
            cancellations += 1;
        }
        if row.late_cancelled {
            late_cancellations += 1;
        }
        if row.no_show {
            no_shows += 1;
        }
        classes.insert(row.class_name.as_str());
        attendees.insert(row.email.as_str());
    }

    let excluded_client_details: Vec<ClientDetail> = excluded
        .iter()
        .filter(|audit| {
            audit.record.staff == cohort.staff
                && audit.record.first_visit_location == cohort.location
                && audit.record.first_visit_date.map(period_start_of) == Some(cohort.period_start)
        })
        .map(|audit| ClientDetail {
            email: audit.record.email.clone(),
            name: audit.record.full_name(),
            date: audit.record.first_visit_date,
            value: None,
            visit_count: None,
            membership: audit.record.membership.clone(),
            status: ConversionStatus::NotConverted,
            reason: audit.reason.clone(),
            first_purchase_date: None,
            first_purchase_item: None,
            first_purchase_value: None,
            post_trial_first_visit: None,
        })
        .collect();

    CohortMetrics {
        staff: cohort.staff.clone(),
        location: cohort.location.clone(),
        period: cohort.period.clone(),
        period_start: cohort.period_start,

        new_clients,
        trials,
        referrals,
        hosted,
        influencer_signups,
        others,
        retained,
        converted,
        trial_conversions,
        referral_conversions,
        influencer_conversions,

        retention_rate: pct(retained, new_clients),
        conversion_rate: pct(converted, new_clients),
        no_show_rate: pct(no_shows, total_visits),
        late_cancellation_rate: pct(late_cancellations, total_visits),
        first_time_buyer_rate: pct(converted, new_clients),
        influencer_conversion_rate: pct(influencer_conversions, influencer_signups),
        referral_conversion_rate: pct(referral_conversions, referrals),
        trial_conversion_rate: pct(trial_conversions, trials),

        total_revenue: conversion.total_revenue,
        avg_revenue_per_client: if converted == 0 {
            0.0
        } else {
            conversion.total_revenue / f64::from(converted)
        },

        total_visits,
        cancellations,
        late_cancellations,
        no_shows,
        distinct_classes: classes.len() as u32,
        distinct_attendees: attendees.len() as u32,

        new_client_details,
        retained_client_details,
        converted_client_details,
        excluded_client_details: if excluded_client_details.is_empty() {
            None
        } else {
            Some(excluded_client_details)
        },
        weekly_revenue: weekly_revenue_series(&conversion.qualifying_sales),
        channel_distribution: vec![
            ChannelCount {
                channel: Channel::Trial.label().to_string(),
                count: trials,
            },
            ChannelCount {
                channel: Channel::Referral.label().to_string(),
                count: referrals,
            },
            ChannelCount {
                channel: Channel::Hosted.label().to_string(),
                count: hosted,
            },
            ChannelCount {
                channel: Channel::Influencer.label().to_string(),
                count: influencer_signups,
            },
            ChannelCount {
                channel: Channel::Other.label().to_string(),
                count: others,
            },
        ],
    }
}

fn client_detail(
    member: &IntakeRecord,
    retention: &RetentionOutcome,
    conversion: &ConversionOutcome,
    reason: &str,
) -> ClientDetail {
    ClientDetail {
        email: member.email.clone(),
        name: member.full_name(),
        date: member.first_visit_date,
        value: conversion.first_purchase_value,
        visit_count: Some(retention.return_visits),
        membership: member.membership.clone(),
        status: if conversion.converted {
            ConversionStatus::Converted
        } else {
            ConversionStatus::NotConverted
        },
        reason: reason.to_string(),
        first_purchase_date: conversion.first_purchase_date,
        first_purchase_item: conversion.first_purchase_item.clone(),
        first_purchase_value: conversion.first_purchase_value,
        post_trial_first_visit: retention.first_return_visit,
    }
}
