//! Floor-plan statistics and the chart-friendly views built from them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatsStatus {
    Ready,
    #[serde(alias = "NOT READY")]
    NotReady,
}

/// Body of the statistics result endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub status: StatsStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
}

/// Element counts and areas detected in a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    pub door_count: f64,
    pub window_count: f64,
    pub toilet_count: f64,
    pub bathtub_count: f64,
    pub sink_count: f64,
    pub shower_count: f64,
    pub wall_space: f64,
    pub railing_space: f64,
    pub door_space: f64,
    pub window_space: f64,
    pub toilet_space: f64,
    pub bathtub_space: f64,
    pub sink_space: f64,
    pub shower_space: f64,
}

impl Statistics {
    /// Fields in declaration order, keyed by their wire name.
    pub fn entries(&self) -> [(&'static str, f64); 14] {
        [
            ("door_count", self.door_count),
            ("window_count", self.window_count),
            ("toilet_count", self.toilet_count),
            ("bathtub_count", self.bathtub_count),
            ("sink_count", self.sink_count),
            ("shower_count", self.shower_count),
            ("wall_space", self.wall_space),
            ("railing_space", self.railing_space),
            ("door_space", self.door_space),
            ("window_space", self.window_space),
            ("toilet_space", self.toilet_space),
            ("bathtub_space", self.bathtub_space),
            ("sink_space", self.sink_space),
            ("shower_space", self.shower_space),
        ]
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Positive entries whose key ends with `suffix`, labelled by the capitalized prefix.
fn filter_by_suffix(stats: &Statistics, suffix: &str) -> IndexMap<String, f64> {
    stats
        .entries()
        .into_iter()
        .filter(|(_, value)| *value > 0.0)
        .filter_map(|(key, value)| key.strip_suffix(suffix).map(|p| (capitalize(p), value)))
        .collect()
}

/// Non-zero element counts, e.g. `{"Door": 4, "Window": 7}`.
pub fn count_stats(stats: &Statistics) -> IndexMap<String, f64> {
    filter_by_suffix(stats, "_count")
}

/// Non-zero areas as stacked intervals `[0, a], [a, a + b], ...` followed by
/// a `Subtotal` interval spanning their sum.
pub fn area_stats(stats: &Statistics) -> IndexMap<String, (f64, f64)> {
    let spaces: Vec<(String, f64)> = filter_by_suffix(stats, "_space")
        .into_iter()
        .map(|(label, value)| (label, round2(value)))
        .collect();

    let mut intervals = IndexMap::with_capacity(spaces.len() + 1);
    let mut previous = 0.0;
    for (label, value) in &spaces {
        let next = previous + value;
        intervals.insert(label.clone(), (previous, next));
        previous = next;
    }

    let subtotal = round2(spaces.iter().map(|(_, v)| v).sum());
    intervals.insert("Subtotal".to_string(), (0.0, subtotal));
    intervals
}
