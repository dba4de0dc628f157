use std::collections::HashMap;

use chrono::NaiveDate;

use crate::cohort::Cohort;
use crate::models::{IntakeRecord, SaleRecord};
use crate::normalize::matches_any_keyword;

/// Sale categories that never count toward conversion.
pub const EXCLUDED_CATEGORIES: &str = "money credit|retail|product";

/// Promotional items that never count toward conversion.
pub const PROMO_ITEM_MARKER: &str = "2 for 1";

/// Minimum sale value for a qualifying purchase, in currency units.
pub const MIN_CONVERSION_VALUE: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub email: String,
    pub converted: bool,
    /// For converted members: how they converted. Otherwise the most recent
    /// disqualifying condition observed, diagnostic only.
    pub reason: String,
    pub first_purchase_date: Option<NaiveDate>,
    pub first_purchase_item: Option<String>,
    pub first_purchase_value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CohortConversion {
    /// One outcome per cohort member, in member order.
    pub outcomes: Vec<ConversionOutcome>,
    /// Sum over all qualifying sales found during the scan, including
    /// repeat qualifying purchases by already-converted members. This is
    /// deliberately wider than the sum of first-purchase attributions.
    pub total_revenue: f64,
    /// (date, value) of every qualifying sale, for the weekly series.
    pub qualifying_sales: Vec<(NaiveDate, f64)>,
}

/// Scans sales in dataset order and evaluates the five-condition
/// qualification per cohort member. The scan is stable and input-order
/// preserving by design: the first qualifying sale fixes a member's
/// attribution, and later qualifying sales only add to cohort revenue.
pub fn evaluate_conversion(cohort: &Cohort, sales: &[SaleRecord]) -> CohortConversion {
    let mut outcomes: Vec<ConversionOutcome> = cohort
        .members
        .iter()
        .map(|member| ConversionOutcome {
            email: member.email.clone(),
            converted: false,
            reason: "No qualifying purchase found".to_string(),
            first_purchase_date: None,
            first_purchase_item: None,
            first_purchase_value: None,
        })
        .collect();

    let index: HashMap<&str, usize> = cohort
        .members
        .iter()
        .enumerate()
        .map(|(i, member)| (member.email.as_str(), i))
        .collect();

    let mut total_revenue = 0.0;
    let mut qualifying_sales = Vec::new();

    for sale in sales {
        let member_idx = [sale.email.as_str(), sale.payer_email.as_str()]
            .into_iter()
            .filter(|e| !e.is_empty())
            .find_map(|e| index.get(e).copied());
        let Some(idx) = member_idx else {
            continue;
        };

        match disqualification(sale, &cohort.members[idx]) {
            None => {
                total_revenue += sale.value;
                if let Some(date) = sale.date {
                    qualifying_sales.push((date, sale.value));
                }
                let outcome = &mut outcomes[idx];
                if !outcome.converted {
                    outcome.converted = true;
                    outcome.first_purchase_date = sale.date;
                    outcome.first_purchase_item = Some(sale.item.clone());
                    outcome.first_purchase_value = Some(sale.value);
                    outcome.reason = match sale.date {
                        Some(date) => format!(
                            "Converted on {date} with \"{}\" ({:.2})",
                            sale.item, sale.value
                        ),
                        None => format!("Converted with \"{}\" ({:.2})", sale.item, sale.value),
                    };
                }
            }
            Some(reason) => {
                let outcome = &mut outcomes[idx];
                if !outcome.converted {
                    outcome.reason = reason;
                }
            }
        }
    }

    CohortConversion {
        outcomes,
        total_revenue,
        qualifying_sales,
    }
}

/// Returns the first failing condition, or `None` when the sale qualifies.
fn disqualification(sale: &SaleRecord, member: &IntakeRecord) -> Option<String> {
    let Some(first_visit) = member.first_visit_date else {
        return Some("First-visit date unknown; purchase timing cannot be established".to_string());
    };
    match sale.date {
        None => return Some("Sale date unparseable".to_string()),
        Some(date) if date < first_visit => {
            return Some(format!(
                "Purchase on {date} predates the first visit on {first_visit}"
            ));
        }
        Some(_) => {}
    }
    if matches_any_keyword(&sale.category, EXCLUDED_CATEGORIES) {
        return Some(format!("Excluded category \"{}\"", sale.category));
    }
    if matches_any_keyword(&sale.item, PROMO_ITEM_MARKER) {
        return Some(format!("Promotional item \"{}\"", sale.item));
    }
    if sale.value < MIN_CONVERSION_VALUE {
        return Some(format!(
            "Value {:.2} is below the {MIN_CONVERSION_VALUE:.0} minimum",
            sale.value
        ));
    }
    if sale.refunded {
        return Some("Purchase was refunded".to_string());
    }
    None
}
