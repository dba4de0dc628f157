use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::metrics::pct;
use crate::models::{ChannelCount, CohortMetrics, WeeklyRevenue, ALL_STAFF};

/// Sums per-staff cohorts into one rollup per (location, period). Counts,
/// revenue, and detail lists are summed/concatenated; every rate is then
/// recomputed from the summed counts. Copying or averaging per-cohort rates
/// would break the invariant that rollup figures match their members.
pub fn build_rollups(cohorts: &[CohortMetrics]) -> Vec<CohortMetrics> {
    let mut groups: BTreeMap<(String, NaiveDate), CohortMetrics> = BTreeMap::new();

    for cohort in cohorts {
        let key = (cohort.location.clone(), cohort.period_start);
        match groups.get_mut(&key) {
            None => {
                let mut rollup = cohort.clone();
                rollup.staff = ALL_STAFF.to_string();
                groups.insert(key, rollup);
            }
            Some(rollup) => {
                rollup.new_clients += cohort.new_clients;
                rollup.trials += cohort.trials;
                rollup.referrals += cohort.referrals;
                rollup.hosted += cohort.hosted;
                rollup.influencer_signups += cohort.influencer_signups;
                rollup.others += cohort.others;
                rollup.retained += cohort.retained;
                rollup.converted += cohort.converted;
                rollup.trial_conversions += cohort.trial_conversions;
                rollup.referral_conversions += cohort.referral_conversions;
                rollup.influencer_conversions += cohort.influencer_conversions;

                rollup.total_revenue += cohort.total_revenue;

                rollup.total_visits += cohort.total_visits;
                rollup.cancellations += cohort.cancellations;
                rollup.late_cancellations += cohort.late_cancellations;
                rollup.no_shows += cohort.no_shows;
                rollup.distinct_classes += cohort.distinct_classes;
                rollup.distinct_attendees += cohort.distinct_attendees;

                rollup
                    .new_client_details
                    .extend(cohort.new_client_details.iter().cloned());
                rollup
                    .retained_client_details
                    .extend(cohort.retained_client_details.iter().cloned());
                rollup
                    .converted_client_details
                    .extend(cohort.converted_client_details.iter().cloned());
                if let Some(excluded) = &cohort.excluded_client_details {
                    rollup
                        .excluded_client_details
                        .get_or_insert_with(Vec::new)
                        .extend(excluded.iter().cloned());
                }

                rollup.weekly_revenue =
                    merge_weekly(&rollup.weekly_revenue, &cohort.weekly_revenue);
                rollup.channel_distribution =
                    merge_channels(&rollup.channel_distribution, &cohort.channel_distribution);
            }
        }
    }

    groups
        .into_values()
        .map(|mut rollup| {
            rollup.retention_rate = pct(rollup.retained, rollup.new_clients);
            rollup.conversion_rate = pct(rollup.converted, rollup.new_clients);
            rollup.no_show_rate = pct(rollup.no_shows, rollup.total_visits);
            rollup.late_cancellation_rate =
                pct(rollup.late_cancellations, rollup.total_visits);
            rollup.first_time_buyer_rate = pct(rollup.converted, rollup.new_clients);
            rollup.influencer_conversion_rate =
                pct(rollup.influencer_conversions, rollup.influencer_signups);
            rollup.referral_conversion_rate =
                pct(rollup.referral_conversions, rollup.referrals);
            rollup.trial_conversion_rate = pct(rollup.trial_conversions, rollup.trials);
            rollup.avg_revenue_per_client = if rollup.converted == 0 {
                0.0
            } else {
                rollup.total_revenue / f64::from(rollup.converted)
            };
            rollup
        })
        .collect()
}

fn merge_weekly(a: &[WeeklyRevenue], b: &[WeeklyRevenue]) -> Vec<WeeklyRevenue> {
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for entry in a.iter().chain(b) {
        *buckets.entry(entry.week_start).or_insert(0.0) += entry.revenue;
    }
    buckets
        .into_iter()
        .map(|(week_start, revenue)| WeeklyRevenue {
            week_start,
            revenue,
        })
        .collect()
}

fn merge_channels(a: &[ChannelCount], b: &[ChannelCount]) -> Vec<ChannelCount> {
    let mut merged: Vec<ChannelCount> = a.to_vec();
    for entry in b {
        match merged.iter_mut().find(|m| m.channel == entry.channel) {
            Some(existing) => existing.count += entry.count,
            None => merged.push(entry.clone()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cohort(staff: &str, new_clients: u32, retained: u32, revenue: f64) -> CohortMetrics {
        CohortMetrics {
            staff: staff.to_string(),
            location: "Studio A".to_string(),
            period: "January 2024".to_string(),
            period_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            new_clients,
            trials: new_clients,
            referrals: 0,
            hosted: 0,
            influencer_signups: 0,
            others: 0,
            retained,
            converted: retained,
            trial_conversions: retained,
            referral_conversions: 0,
            influencer_conversions: 0,
            retention_rate: pct(retained, new_clients),
            conversion_rate: pct(retained, new_clients),
            no_show_rate: 0.0,
            late_cancellation_rate: 0.0,
            first_time_buyer_rate: pct(retained, new_clients),
            influencer_conversion_rate: 0.0,
            referral_conversion_rate: 0.0,
            trial_conversion_rate: pct(retained, new_clients),
            total_revenue: revenue,
            avg_revenue_per_client: 0.0,
            total_visits: 10,
            cancellations: 1,
            late_cancellations: 1,
            no_shows: 2,
            distinct_classes: 3,
            distinct_attendees: 4,
            new_client_details: Vec::new(),
            retained_client_details: Vec::new(),
            converted_client_details: Vec::new(),
            excluded_client_details: None,
            weekly_revenue: vec![WeeklyRevenue {
                week_start: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
                revenue,
            }],
            channel_distribution: vec![ChannelCount {
                channel: "Trial".to_string(),
                count: new_clients,
            }],
        }
    }

    #[test]
    fn rollup_counts_are_sums_of_member_cohorts() {
        let cohorts = vec![cohort("T1", 4, 2, 2400.0), cohort("T2", 6, 3, 3600.0)];
        let rollups = build_rollups(&cohorts);
        assert_eq!(rollups.len(), 1);
        let rollup = &rollups[0];
        assert_eq!(rollup.staff, ALL_STAFF);
        assert_eq!(rollup.new_clients, 10);
        assert_eq!(rollup.retained, 5);
        assert_eq!(rollup.total_revenue, 6000.0);
        assert_eq!(rollup.total_visits, 20);
    }

    #[test]
    fn rates_are_recomputed_from_summed_counts_not_averaged() {
        let cohorts = vec![cohort("T1", 2, 2, 0.0), cohort("T2", 8, 2, 0.0)];
        let rollups = build_rollups(&cohorts);
        // Averaging 100% and 25% would give 62.5; the pooled 4/10 is 40.
        assert_eq!(rollups[0].retention_rate, 40.0);
    }

    #[test]
    fn weekly_series_merges_by_week() {
        let mut a = cohort("T1", 1, 1, 100.0);
        let mut b = cohort("T2", 1, 1, 200.0);
        a.weekly_revenue = vec![WeeklyRevenue {
            week_start: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
            revenue: 100.0,
        }];
        b.weekly_revenue = vec![
            WeeklyRevenue {
                week_start: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
                revenue: 200.0,
            },
            WeeklyRevenue {
                week_start: NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
                revenue: 50.0,
            },
        ];
        let rollups = build_rollups(&[a, b]);
        assert_eq!(rollups[0].weekly_revenue.len(), 2);
        assert_eq!(rollups[0].weekly_revenue[0].revenue, 300.0);
        assert_eq!(rollups[0].weekly_revenue[1].revenue, 50.0);
    }

    #[test]
    fn locations_and_periods_roll_up_separately() {
        let mut other_location = cohort("T1", 3, 1, 0.0);
        other_location.location = "Studio B".to_string();
        let mut other_period = cohort("T1", 5, 1, 0.0);
        other_period.period = "February 2024".to_string();
        other_period.period_start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let rollups = build_rollups(&[cohort("T1", 2, 1, 0.0), other_location, other_period]);
        assert_eq!(rollups.len(), 3);
    }
}
