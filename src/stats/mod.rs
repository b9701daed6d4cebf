//! Scoring & aggregation over activity spans. Everything in this module is a
//! pure function of the supplied records and category map, so reports are
//! deterministic given identical inputs.

pub mod window;

use std::collections::HashMap;

use chrono::Duration;

use crate::storage::entities::{
    ActivityLog, AppCategory, AppUsageStat, Category, CategoryWeights,
};

/// Durations summed per category over one record set. `total` is the
/// unconditional sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CategoryTotals {
    pub productive: Duration,
    pub neutral: Duration,
    pub distracting: Duration,
    pub total: Duration,
}

/// Everything the presentation layer needs for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusSummary {
    /// Duration-weighted productivity score, 0-100.
    pub focus_score: f64,
    pub usage: Vec<AppUsageStat>,
    pub totals: CategoryTotals,
}

impl FocusSummary {
    pub fn empty() -> Self {
        Self {
            focus_score: 0.0,
            usage: vec![],
            totals: CategoryTotals::default(),
        }
    }
}

fn category_map(categories: &[AppCategory]) -> HashMap<&str, Category> {
    categories
        .iter()
        .map(|v| (&*v.app_id, v.category))
        .collect()
}

/// Idle/lock-screen spans never count towards any aggregate.
fn active_logs(logs: &[ActivityLog]) -> impl Iterator<Item = &ActivityLog> {
    logs.iter().filter(|v| !v.is_idle())
}

/// Groups spans by application, summing durations. Keeps the most recently
/// seen display name per application (inputs arrive newest first from the
/// store). Sorted descending by total; ties keep discovery order.
pub fn usage_stats(logs: &[ActivityLog]) -> Vec<AppUsageStat> {
    let mut order = Vec::<AppUsageStat>::new();
    let mut index = HashMap::<&str, usize>::new();

    for log in active_logs(logs) {
        match index.get(&*log.app_id) {
            Some(&i) => order[i].total += log.duration,
            None => {
                index.insert(&log.app_id, order.len());
                order.push(AppUsageStat {
                    app_id: log.app_id.clone(),
                    app_name: log.app_name.clone(),
                    total: log.duration,
                });
            }
        }
    }

    order.sort_by(|a, b| b.total.cmp(&a.total));
    order
}

/// Weighted mean of category weights over the record set, scaled to 0-100.
/// An empty or zero-duration set scores 0. Unmapped applications weigh as
/// neutral.
pub fn focus_score(
    logs: &[ActivityLog],
    categories: &[AppCategory],
    weights: &CategoryWeights,
) -> f64 {
    let map = category_map(categories);

    let mut weighted = 0.0;
    let mut total = 0i64;
    for log in active_logs(logs) {
        let seconds = log.duration.num_seconds();
        let category = map.get(&*log.app_id).copied().unwrap_or(Category::Neutral);
        weighted += seconds as f64 * category.weight(weights);
        total += seconds;
    }

    if total == 0 {
        return 0.0;
    }
    100.0 * weighted / total as f64
}

/// Filtered per-category reductions over the record set.
pub fn category_totals(logs: &[ActivityLog], categories: &[AppCategory]) -> CategoryTotals {
    let map = category_map(categories);

    let mut totals = CategoryTotals::default();
    for log in active_logs(logs) {
        totals.total += log.duration;
        match map.get(&*log.app_id).copied().unwrap_or(Category::Neutral) {
            Category::Productive => totals.productive += log.duration,
            Category::Neutral => totals.neutral += log.duration,
            Category::Distracting => totals.distracting += log.duration,
        }
    }
    totals
}

pub fn summarize(
    logs: &[ActivityLog],
    categories: &[AppCategory],
    weights: &CategoryWeights,
) -> FocusSummary {
    FocusSummary {
        focus_score: focus_score(logs, categories, weights),
        usage: usage_stats(logs),
        totals: category_totals(logs, categories),
    }
}
