use std::{cmp::Ordering, time::SystemTime};

use serde::{Deserialize, Serialize};

/// One past diagnostic run as listed by the history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: i64,
    pub command: String,
    pub target: String,
    #[serde(default)]
    pub hops_count: u32,
    pub timestamp: String,
}

impl HistoryItem {
    /// Parsed timestamp; `None` when the store sent something that isn't ISO-8601.
    pub fn parsed_timestamp(&self) -> Option<SystemTime> {
        parse_timestamp(&self.timestamp)
    }
}

/// The backend writes naive local timestamps (`2024-05-01T12:30:45.123456`), which the weak
/// RFC 3339 parser accepts with either separator.
pub fn parse_timestamp(raw: &str) -> Option<SystemTime> {
    humantime::parse_rfc3339_weak(raw.trim()).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HistoryFilter {
    #[default]
    All,
    /// Keep items whose command contains this token, ignoring case.
    Command(String),
}

impl HistoryFilter {
    pub fn token(token: &str) -> Self {
        let token = token.trim();
        if token.is_empty() || token.eq_ignore_ascii_case("all") {
            HistoryFilter::All
        } else {
            HistoryFilter::Command(token.to_lowercase())
        }
    }

    pub fn matches(&self, item: &HistoryItem) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Command(token) => item.command.to_lowercase().contains(&token.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySort {
    #[default]
    Newest,
    Oldest,
    Target,
}

impl HistorySort {
    pub const ALL: [HistorySort; 3] = [HistorySort::Newest, HistorySort::Oldest, HistorySort::Target];

    pub fn label(&self) -> &'static str {
        match self {
            HistorySort::Newest => "Newest first",
            HistorySort::Oldest => "Oldest first",
            HistorySort::Target => "By target",
        }
    }

    fn compare(&self, a: &HistoryItem, b: &HistoryItem) -> Ordering {
        match self {
            HistorySort::Newest => b.parsed_timestamp().cmp(&a.parsed_timestamp()),
            HistorySort::Oldest => a.parsed_timestamp().cmp(&b.parsed_timestamp()),
            HistorySort::Target => a.target.cmp(&b.target),
        }
    }
}

/// Filters `items` and sorts the survivors. The sort is stable, equal keys keep their input
/// order. Unparseable timestamps order before every valid one.
pub fn filter_and_sort(items: &[HistoryItem], filter: &HistoryFilter, sort: HistorySort) -> Vec<HistoryItem> {
    let mut out: Vec<HistoryItem> = items.iter().filter(|item| filter.matches(item)).cloned().collect();
    out.sort_by(|a, b| sort.compare(a, b));
    out
}

/// Free-text search over command and target, ignoring case.
pub fn search<'a>(items: &'a [HistoryItem], query: &str) -> Vec<&'a HistoryItem> {
    let query = query.trim().to_lowercase();
    items
        .iter()
        .filter(|item| {
            query.is_empty()
                || item.command.to_lowercase().contains(&query)
                || item.target.to_lowercase().contains(&query)
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryEnvelope {
    #[serde(default)]
    pub history: Vec<HistoryItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Vec<HistoryItem> {
        let json = include_str!("../../test_data/history.json");
        let envelope: HistoryEnvelope = serde_json::from_str(json).expect("Failed to deserialize history");
        envelope.history
    }

    fn item(id: i64, target: &str, timestamp: &str) -> HistoryItem {
        HistoryItem {
            id,
            command: format!("traceroute {target}"),
            target: target.to_string(),
            hops_count: 0,
            timestamp: timestamp.to_string(),
        }
    }

    fn ids(items: &[HistoryItem]) -> Vec<i64> {
        items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn test_empty_history() {
        assert!(filter_and_sort(&[], &HistoryFilter::All, HistorySort::Newest).is_empty());
    }

    #[test]
    fn test_sort_by_target() {
        let items = vec![item(1, "b", "2024-01-01T00:00:00"), item(2, "a", "2024-01-01T00:00:00")];
        let sorted = filter_and_sort(&items, &HistoryFilter::All, HistorySort::Target);
        let targets: Vec<_> = sorted.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["a", "b"]);
    }

    #[test]
    fn test_sort_by_timestamp() {
        let items = fixture();
        assert_eq!(ids(&filter_and_sort(&items, &HistoryFilter::All, HistorySort::Newest)), vec![4, 3, 2, 1]);
        assert_eq!(ids(&filter_and_sort(&items, &HistoryFilter::All, HistorySort::Oldest)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let items = vec![
            item(1, "same", "2024-01-01T00:00:00"),
            item(2, "same", "2024-01-01T00:00:00"),
            item(3, "same", "2024-01-01T00:00:00"),
        ];
        for sort in HistorySort::ALL {
            assert_eq!(ids(&filter_and_sort(&items, &HistoryFilter::All, sort)), vec![1, 2, 3]);
        }
    }

    #[test]
    fn test_unparseable_timestamps_sort_oldest() {
        let items = vec![item(1, "x", "yesterday"), item(2, "y", "2024-01-01T00:00:00")];
        assert_eq!(ids(&filter_and_sort(&items, &HistoryFilter::All, HistorySort::Oldest)), vec![1, 2]);
        assert_eq!(ids(&filter_and_sort(&items, &HistoryFilter::All, HistorySort::Newest)), vec![2, 1]);
    }

    #[test]
    fn test_filter_by_command_token() {
        let items = fixture();
        let filtered = filter_and_sort(&items, &HistoryFilter::token("TRACERT"), HistorySort::Newest);
        assert_eq!(ids(&filtered), vec![4]);
        let all = filter_and_sort(&items, &HistoryFilter::token("all"), HistorySort::Target);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_search_matches_command_or_target() {
        let items = fixture();
        let found: Vec<i64> = search(&items, "-n").iter().map(|i| i.id).collect();
        assert_eq!(found, vec![3]);
        let found: Vec<i64> = search(&items, "EXAMPLE").iter().map(|i| i.id).collect();
        assert_eq!(found, vec![1, 2]);
    }
}
