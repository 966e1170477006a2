use chrono::{DateTime, Utc};

use crate::db::WatchHistoryEntry;

/// Flattens a history page into CSV bytes. Column order is part of the
/// contract: video_id, title, watched_at, exported_at. An empty history
/// yields a header-only table.
pub fn history_to_csv(entries: &[WatchHistoryEntry], exported_at: DateTime<Utc>) -> Vec<u8> {
    let mut out = String::from("video_id,title,watched_at,exported_at\n");
    let stamp = exported_at.to_rfc3339();

    for entry in entries {
        let watched = entry
            .watchedat
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        out.push_str(&field(&entry.videoid));
        out.push(',');
        out.push_str(&field(&entry.title));
        out.push(',');
        out.push_str(&field(&watched));
        out.push(',');
        out.push_str(&field(&stamp));
        out.push('\n');
    }

    out.into_bytes()
}

fn field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(videoid: &str, title: &str) -> WatchHistoryEntry {
        WatchHistoryEntry {
            id: "h1".to_string(),
            userid: "u1".to_string(),
            videoid: videoid.to_string(),
            title: title.to_string(),
            watchedat: Some(Utc::now()),
        }
    }

    #[test]
    fn empty_history_exports_header_only() {
        let csv = history_to_csv(&[], Utc::now());
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "video_id,title,watched_at,exported_at\n"
        );
    }

    #[test]
    fn rows_follow_the_column_order() {
        let csv = history_to_csv(&[entry("v42", "Tom and Jerry")], Utc::now());
        let text = String::from_utf8(csv).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "video_id,title,watched_at,exported_at");
        let row = lines.next().unwrap();
        assert!(row.starts_with("v42,Tom and Jerry,"));
        assert_eq!(row.split(',').count(), 4);
    }

    #[test]
    fn titles_with_commas_and_quotes_are_escaped() {
        let csv = history_to_csv(&[entry("v1", "Duck, You Sucker \"remastered\"")], Utc::now());
        let text = String::from_utf8(csv).unwrap();
        assert!(text.contains("\"Duck, You Sucker \"\"remastered\"\"\""));
    }
}
