use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use glob::glob;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

use super::models::{Event, EventKind, UserEvents};

// Column order of a raw log record:
// ai5, debug, random, sdkv, event, ts, params, timestamp, game_id
const COLUMN_COUNT: usize = 9;
const COL_AI5: usize = 0;
const COL_SDKV: usize = 3;
const COL_EVENT: usize = 4;
const COL_TIMESTAMP: usize = 7;

/// Events parsed from a log source, plus skip accounting for observability
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub events: Vec<Event>,
    /// Records dropped for malformed timestamps, missing fields, or an
    /// event name with no start/stop marker
    pub skipped: usize,
}

/// Load all events from a log file, or from every *.log file under a
/// directory. Malformed records are skipped and counted, never fatal.
pub fn load_events(path: &Path) -> Result<LoadOutcome> {
    let mut outcome = LoadOutcome::default();

    if path.is_dir() {
        let pattern = path.join("*.log");
        let pattern_str = pattern.to_string_lossy();

        for file in glob(&pattern_str).context("Failed to glob pattern")?.flatten() {
            parse_log_file(&file, &mut outcome)?;
        }
    } else {
        parse_log_file(path, &mut outcome)?;
    }

    // Deterministic (user, timestamp) order regardless of file order
    outcome
        .events
        .sort_by(|a, b| (&a.user_id, a.timestamp).cmp(&(&b.user_id, b.timestamp)));

    Ok(outcome)
}

/// Parse a single log file, appending events and skip counts
fn parse_log_file(path: &Path, outcome: &mut LoadOutcome) -> Result<()> {
    let file = File::open(path).context(format!("Failed to open log file: {:?}", path))?;
    let reader = BufReader::new(file);
    let events_before = outcome.events.len();
    let skipped_before = outcome.skipped;

    for (line_no, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_record(&line) {
            Some(event) => outcome.events.push(event),
            None => {
                outcome.skipped += 1;
                warn!("skipping malformed record at {:?}:{}", path, line_no + 1);
            }
        }
    }

    debug!(
        "loaded {} events from {:?} ({} skipped)",
        outcome.events.len() - events_before,
        path,
        outcome.skipped - skipped_before
    );

    Ok(())
}

/// Parse a single comma-delimited record into an Event.
/// Returns None (record skipped) on malformed input.
pub fn parse_record(line: &str) -> Option<Event> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != COLUMN_COUNT {
        return None;
    }

    let user_id = unwrap_value(fields[COL_AI5]);
    if user_id.is_empty() {
        return None;
    }

    let sdk_version = unwrap_value(fields[COL_SDKV]);
    let kind = EventKind::from_event_name(&unwrap_value(fields[COL_EVENT]))?;
    let timestamp = extract_timestamp(fields[COL_TIMESTAMP])?;

    Some(Event {
        user_id,
        sdk_version,
        kind,
        timestamp,
    })
}

/// Strip brace/quote wrapping from a raw value and keep the text after the
/// last colon, e.g. `"event":"ggstart"` -> `ggstart`
fn unwrap_value(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|&c| !matches!(c, '{' | '}' | '"'))
        .collect();

    cleaned
        .rsplit(':')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Extract the instant from the compound timestamp column. The instant is
/// nested behind a colon-delimited prefix, e.g.
/// `"timestamp":{"$date":"2017-03-09T23:23:19.575Z"}`, so everything up to
/// the second colon is wrapping and the remainder is the timestamp itself.
fn extract_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let tail = raw.splitn(3, ':').last()?;
    let cleaned: String = tail
        .chars()
        .filter(|&c| !matches!(c, '{' | '}' | '"'))
        .collect();

    parse_timestamp(cleaned.trim())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    // Naive fallbacks, treated as UTC
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    None
}

/// Group events by user and sort each group ascending by timestamp.
/// The sort is stable, so simultaneous timestamps keep relative input order
/// as a convenience, not a guarantee.
pub fn group_and_sort(events: Vec<Event>) -> BTreeMap<String, UserEvents> {
    let mut grouped: BTreeMap<String, UserEvents> = BTreeMap::new();

    for event in events {
        let entry = grouped
            .entry(event.user_id.clone())
            .or_insert_with(|| UserEvents {
                user_id: event.user_id.clone(),
                ..Default::default()
            });
        entry.events.push(event);
    }

    for user in grouped.values_mut() {
        user.events.sort_by_key(|e| e.timestamp);
        if let Some(first) = user.events.first() {
            user.sdk_version = first.sdk_version.clone();
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(user: &str, sdk: &str, event: &str, instant: &str) -> String {
        format!(
            "{{\"ai5\":\"{user}\",\"debug\":\"d\",\"random\":\"r\",\"sdkv\":\"{sdk}\",\
             \"event\":\"{event}\",\"ts\":\"1489101799\",\"params\":\"p\",\
             \"timestamp\":{{\"$date\":\"{instant}\"}},\"game_id\":\"g1\"}}"
        )
    }

    #[test]
    fn test_unwrap_value() {
        assert_eq!(unwrap_value("\"event\":\"ggstart\""), "ggstart");
        assert_eq!(unwrap_value("{\"ai5\":\"abc-123\""), "abc-123");
        assert_eq!(unwrap_value("\"sdkv\":\"7.6\""), "7.6");
    }

    #[test]
    fn test_extract_timestamp_nested() {
        let ts = extract_timestamp("\"timestamp\":{\"$date\":\"2017-03-09T23:23:19.575Z\"}")
            .expect("timestamp should parse");
        assert_eq!(ts.to_rfc3339(), "2017-03-09T23:23:19.575+00:00");
    }

    #[test]
    fn test_parse_timestamp_naive_fallback() {
        assert!(parse_timestamp("2017-03-09 23:23:19").is_some());
        assert!(parse_timestamp("not a timestamp").is_none());
    }

    #[test]
    fn test_parse_record() {
        let line = record("u1", "7.6", "ggstart_landscape", "2017-03-09T23:23:19.575Z");
        let event = parse_record(&line).expect("record should parse");
        assert_eq!(event.user_id, "u1");
        assert_eq!(event.sdk_version, "7.6");
        assert_eq!(event.kind, EventKind::Start);
    }

    #[test]
    fn test_parse_record_rejects_malformed() {
        // Wrong column count
        assert!(parse_record("a,b,c").is_none());
        // Unparseable timestamp
        let line = record("u1", "7.6", "ggstop", "yesterday-ish");
        assert!(parse_record(&line).is_none());
        // Event name with no start/stop marker
        let line = record("u1", "7.6", "ggadshown", "2017-03-09T23:23:19.575Z");
        assert!(parse_record(&line).is_none());
    }

    #[test]
    fn test_load_events_counts_skips() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", record("u1", "7.6", "ggstart", "2017-03-09T23:23:19Z")).unwrap();
        writeln!(file, "garbage line").unwrap();
        writeln!(file, "{}", record("u1", "7.6", "ggstop", "2017-03-09T23:25:19Z")).unwrap();

        let outcome = load_events(file.path()).unwrap();
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_group_and_sort_orders_timestamps() {
        let lines = [
            record("u2", "8.0", "ggstop", "2017-03-09T10:00:30Z"),
            record("u1", "7.6", "ggstop", "2017-03-09T10:05:00Z"),
            record("u1", "7.6", "ggstart", "2017-03-09T10:00:00Z"),
            record("u2", "8.0", "ggstart", "2017-03-09T10:00:00Z"),
        ];
        let events: Vec<Event> = lines.iter().map(|l| parse_record(l).unwrap()).collect();

        let grouped = group_and_sort(events);
        assert_eq!(grouped.len(), 2);

        let u1 = &grouped["u1"];
        assert_eq!(u1.sdk_version, "7.6");
        assert_eq!(u1.events.len(), 2);
        assert!(u1.events[0].timestamp <= u1.events[1].timestamp);
        assert_eq!(u1.events[0].kind, EventKind::Start);
    }
}
