use std::collections::HashSet;

use crate::model::WeatherRecord;

/// Merge freshly fetched records over previously persisted ones.
///
/// The inputs are concatenated (`persisted` first) and only the last
/// occurrence of each `(city, date)` key survives, so fresh data always wins.
/// Surviving records keep their relative order.
pub fn merge(persisted: Vec<WeatherRecord>, fresh: Vec<WeatherRecord>) -> Vec<WeatherRecord> {
    let combined: Vec<WeatherRecord> = persisted.into_iter().chain(fresh).collect();
    let mut seen = HashSet::with_capacity(combined.len());

    let mut kept: Vec<WeatherRecord> = combined
        .into_iter()
        .rev()
        .filter(|r| seen.insert((r.city.clone(), r.date)))
        .collect();
    kept.reverse();
    kept
}

/// Stable sort by `(city, date)` ascending.
pub fn sort_by_key(records: &mut [WeatherRecord]) {
    records.sort_by(|a, b| a.key().cmp(&b.key()));
}
