//! Date-grouped, paginated history index
//!
//! Sessions arrive sorted by `last_updated` descending. They are bucketed by
//! the UTC calendar date of `last_updated` (labelled like `"3rd March 2024"`)
//! and the buckets, not the sessions, are paginated.

use chrono::{DateTime, Datelike, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pagination::{total_pages, validate_page};
use crate::storage::ChatSession;

const TITLE_MAX_CHARS: usize = 50;
const DEFAULT_TITLE: &str = "Chat";

/// One session entry in the history index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryItem {
    /// Session identifier
    pub session_id: String,
    /// Last time a message was appended
    pub last_updated: DateTime<Utc>,
    /// Short title derived from the first message
    pub title: String,
}

/// Sessions sharing one calendar date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryGroup {
    /// Bucket label, e.g. `"21st May 2024"`
    pub date: String,
    /// Sessions in input order
    pub items: Vec<SessionHistoryItem>,
}

/// Ordered buckets, serialized as a JSON object whose key order is bucket order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryIndex {
    /// Buckets in first-seen order
    pub groups: Vec<HistoryGroup>,
}

impl HistoryIndex {
    /// Whether the index has no buckets
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl Serialize for HistoryIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for group in &self.groups {
            map.serialize_entry(&group.date, &group.items)?;
        }
        map.end()
    }
}

/// One page of the grouped history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    /// Buckets on this page
    pub data: HistoryIndex,
    /// The page that was requested
    pub current_page: usize,
    /// Number of bucket pages
    pub total_pages: usize,
    /// Number of buckets across all pages
    pub total_items: usize,
}

/// Day of month with its English ordinal suffix
///
/// # Examples
///
/// ```
/// use streamforge::history::ordinal_day;
///
/// assert_eq!(ordinal_day(1), "1st");
/// assert_eq!(ordinal_day(12), "12th");
/// assert_eq!(ordinal_day(23), "23rd");
/// ```
pub fn ordinal_day(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", day, suffix)
}

/// Bucket label for a timestamp, in UTC
pub fn date_label(at: &DateTime<Utc>) -> String {
    format!("{} {}", ordinal_day(at.day()), at.format("%B %Y"))
}

/// Title of a session: its first message, truncated, or `"Chat"`
pub fn session_title(session: &ChatSession) -> String {
    let Some(first) = session.messages.first() else {
        return DEFAULT_TITLE.to_string();
    };
    if first.content.trim().is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if first.content.chars().count() > TITLE_MAX_CHARS {
        let head: String = first.content.chars().take(TITLE_MAX_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        first.content.clone()
    }
}

/// Group every session by date, then return the requested page of buckets
///
/// # Errors
///
/// Returns `StreamforgeError::InvalidPage` when `page` falls outside
/// `1..=max(1, total_pages)`.
pub fn build_index(sessions: &[ChatSession], page: i64, page_size: usize) -> Result<HistoryPage> {
    let mut groups: Vec<HistoryGroup> = Vec::new();
    for session in sessions {
        let label = date_label(&session.last_updated);
        let item = SessionHistoryItem {
            session_id: session.id.clone(),
            last_updated: session.last_updated,
            title: session_title(session),
        };
        match groups.iter_mut().find(|g| g.date == label) {
            Some(group) => group.items.push(item),
            None => groups.push(HistoryGroup {
                date: label,
                items: vec![item],
            }),
        }
    }

    let total_items = groups.len();
    let total_pages = total_pages(total_items, page_size);
    let current_page = validate_page(page, total_pages)?;

    let groups = groups
        .into_iter()
        .skip((current_page - 1) * page_size)
        .take(page_size)
        .collect();

    Ok(HistoryPage {
        data: HistoryIndex { groups },
        current_page,
        total_pages,
        total_items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamforgeError;
    use crate::storage::Message;
    use chrono::TimeZone;

    fn session(id: &str, at: DateTime<Utc>, first: Option<&str>) -> ChatSession {
        let mut s = ChatSession::new(id, None);
        if let Some(text) = first {
            s.messages.push(Message::user(text));
        }
        s.created_at = at;
        s.last_updated = at;
        s
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_ordinal_day_suffixes() {
        let cases = [
            (1, "1st"),
            (2, "2nd"),
            (3, "3rd"),
            (4, "4th"),
            (11, "11th"),
            (12, "12th"),
            (13, "13th"),
            (21, "21st"),
            (22, "22nd"),
            (23, "23rd"),
            (30, "30th"),
            (31, "31st"),
        ];
        for (day, expected) in cases {
            assert_eq!(ordinal_day(day), expected);
        }
    }

    #[test]
    fn test_date_label_uses_full_month_name() {
        assert_eq!(date_label(&at(21, 8)), "21st May 2024");
    }

    #[test]
    fn test_title_truncates_long_first_message() {
        let long = "x".repeat(60);
        let title = session_title(&session("s", at(1, 0), Some(&long)));
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
        assert_eq!(&title[..47], &long[..47]);
    }

    #[test]
    fn test_title_keeps_exactly_fifty_chars() {
        let exact = "y".repeat(50);
        assert_eq!(session_title(&session("s", at(1, 0), Some(&exact))), exact);
    }

    #[test]
    fn test_title_counts_characters_not_bytes() {
        let accented = "é".repeat(55);
        let title = session_title(&session("s", at(1, 0), Some(&accented)));
        assert_eq!(title, format!("{}...", "é".repeat(47)));
    }

    #[test]
    fn test_title_defaults_to_chat() {
        assert_eq!(session_title(&session("s", at(1, 0), None)), "Chat");
        assert_eq!(session_title(&session("s", at(1, 0), Some("   "))), "Chat");
    }

    #[test]
    fn test_groups_preserve_input_order() {
        let sessions = vec![
            session("a", at(3, 12), Some("third day late")),
            session("b", at(3, 9), Some("third day early")),
            session("c", at(2, 10), Some("second day")),
            session("d", at(1, 10), Some("first day")),
        ];

        let page = build_index(&sessions, 1, 2).unwrap();
        assert_eq!(page.total_items, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.current_page, 1);

        let labels: Vec<&str> = page.data.groups.iter().map(|g| g.date.as_str()).collect();
        assert_eq!(labels, vec!["3rd May 2024", "2nd May 2024"]);
        let first_ids: Vec<&str> = page.data.groups[0]
            .items
            .iter()
            .map(|i| i.session_id.as_str())
            .collect();
        assert_eq!(first_ids, vec!["a", "b"]);

        let second = build_index(&sessions, 2, 2).unwrap();
        assert_eq!(second.data.groups.len(), 1);
        assert_eq!(second.data.groups[0].date, "1st May 2024");
    }

    #[test]
    fn test_out_of_range_page_is_rejected() {
        let sessions = vec![session("a", at(3, 12), None)];
        for page in [0, -1, 2] {
            let err = build_index(&sessions, page, 2).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<StreamforgeError>(),
                Some(StreamforgeError::InvalidPage { .. })
            ));
        }
    }

    #[test]
    fn test_empty_history_has_one_empty_page() {
        let page = build_index(&[], 1, 20).unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.total_items, 0);
    }

    #[test]
    fn test_serialized_keys_follow_bucket_order() {
        let sessions = vec![
            session("a", at(9, 12), Some("later")),
            session("b", at(1, 12), Some("earlier")),
        ];
        let json = serde_json::to_string(&build_index(&sessions, 1, 20).unwrap()).unwrap();

        let later = json.find("9th May 2024").unwrap();
        let earlier = json.find("1st May 2024").unwrap();
        assert!(later < earlier);
        assert!(json.contains(r#""sessionId":"a""#));
        assert!(json.contains(r#""currentPage":1"#));
        assert!(json.contains(r#""totalItems":2"#));
    }
}
