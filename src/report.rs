use std::collections::BTreeMap;
use std::fmt::Write;

use crate::config::AnalysisConfig;
use crate::sessions::models::UserSessionSummary;

/// Per-user reporting row derived from the reconstructed sessions
#[derive(Debug, Clone, PartialEq)]
pub struct UserReportRow {
    pub user_id: String,
    pub sdk_version: String,
    pub session_count: usize,
    pub valid_sessions: usize,
    /// Mean duration of valid sessions, 0.0 when the user has none
    pub average_valid_secs: f64,
}

/// Per-SDK-version aggregate over the per-user average valid durations
#[derive(Debug, Clone, PartialEq)]
pub struct SdkAggregate {
    pub sdk_version: String,
    /// Every user observed on this version
    pub user_count: usize,
    /// Users with at least one valid session
    pub users_with_valid: usize,
    pub total_valid_secs: f64,
    /// Mean over users that have a valid session, 0.0 when none do
    pub mean_valid_secs: f64,
}

/// Five-number summary over a series of values
#[derive(Debug, Clone, PartialEq)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

pub fn user_rows(summaries: &[UserSessionSummary], config: &AnalysisConfig) -> Vec<UserReportRow> {
    summaries
        .iter()
        .map(|summary| UserReportRow {
            user_id: summary.user_id.clone(),
            sdk_version: summary.sdk_version.clone(),
            session_count: summary.session_count(),
            valid_sessions: summary.valid_session_count(config.validity_threshold_secs),
            average_valid_secs: summary.average_valid_secs(config.validity_threshold_secs),
        })
        .collect()
}

pub fn sdk_aggregates(rows: &[UserReportRow]) -> Vec<SdkAggregate> {
    let mut grouped: BTreeMap<&str, Vec<&UserReportRow>> = BTreeMap::new();
    for row in rows {
        grouped.entry(&row.sdk_version).or_default().push(row);
    }

    grouped
        .into_iter()
        .map(|(sdk_version, rows)| {
            let users_with_valid = rows.iter().filter(|r| r.valid_sessions > 0).count();
            let total_valid_secs: f64 = rows.iter().map(|r| r.average_valid_secs).sum();
            let mean_valid_secs = if users_with_valid > 0 {
                total_valid_secs / users_with_valid as f64
            } else {
                0.0
            };

            SdkAggregate {
                sdk_version: sdk_version.to_string(),
                user_count: rows.len(),
                users_with_valid,
                total_valid_secs,
                mean_valid_secs,
            }
        })
        .collect()
}

/// Summary statistics over a series, or None for an empty one
pub fn describe(values: &[f64]) -> Option<Describe> {
    if values.is_empty() {
        return None;
    }

    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = if count > 1 {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    Some(Describe {
        count,
        mean,
        std,
        min,
        max,
    })
}

pub fn render_user_table(rows: &[UserReportRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<40} {:>6} {:>10} {:>8} {:>12}",
        "user", "sdkv", "sessions", "valid", "avg_valid_s"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<40} {:>6} {:>10} {:>8} {:>12.1}",
            row.user_id, row.sdk_version, row.session_count, row.valid_sessions,
            row.average_valid_secs
        );
    }
    out
}

pub fn render_sdk_table(aggregates: &[SdkAggregate]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8} {:>8} {:>12} {:>14} {:>14}",
        "sdkv", "users", "with_valid", "total_valid_s", "mean_valid_s"
    );
    for agg in aggregates {
        let _ = writeln!(
            out,
            "{:<8} {:>8} {:>12} {:>14.1} {:>14.1}",
            agg.sdk_version, agg.user_count, agg.users_with_valid, agg.total_valid_secs,
            agg.mean_valid_secs
        );
    }
    out
}

pub fn render_describe(label: &str, summary: &Describe) -> String {
    format!(
        "{label}: count {} mean {:.1} std {:.1} min {:.1} max {:.1}\n",
        summary.count, summary.mean, summary.std, summary.min, summary.max
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::{group_and_sort, parse_record, reconstruct_all};

    fn record(user: &str, sdk: &str, event: &str, instant: &str) -> String {
        format!(
            "{{\"ai5\":\"{user}\",\"debug\":\"d\",\"random\":\"r\",\"sdkv\":\"{sdk}\",\
             \"event\":\"{event}\",\"ts\":\"1489101799\",\"params\":\"p\",\
             \"timestamp\":{{\"$date\":\"{instant}\"}},\"game_id\":\"g1\"}}"
        )
    }

    #[test]
    fn test_describe() {
        let summary = describe(&[61.0, 70.0, 100.0]).unwrap();
        assert_eq!(summary.count, 3);
        assert!((summary.mean - 77.0).abs() < 1e-9);
        assert_eq!(summary.min, 61.0);
        assert_eq!(summary.max, 100.0);
        assert!(describe(&[]).is_none());
    }

    #[test]
    fn test_pipeline_end_to_end() {
        // u1 plays for 70s (valid), u2 starts and stops within half a
        // second (absorbed); both on sdk 7.6
        let lines = [
            record("u1", "7.6", "ggstart", "2017-03-09T10:00:00Z"),
            record("u1", "7.6", "ggstop", "2017-03-09T10:01:10Z"),
            record("u2", "7.6", "ggstart", "2017-03-09T10:00:00Z"),
            record("u2", "7.6", "ggstop", "2017-03-09T10:00:00.500Z"),
        ];
        let events = lines.iter().map(|l| parse_record(l).unwrap()).collect();

        let config = AnalysisConfig::default();
        let grouped = group_and_sort(events);
        let summaries = reconstruct_all(&grouped, &config);
        let rows = user_rows(&summaries, &config);

        assert_eq!(rows.len(), 2);
        let u1 = rows.iter().find(|r| r.user_id == "u1").unwrap();
        assert_eq!(u1.session_count, 1);
        assert_eq!(u1.valid_sessions, 1);
        assert!((u1.average_valid_secs - 70.0).abs() < 1e-9);

        let u2 = rows.iter().find(|r| r.user_id == "u2").unwrap();
        assert_eq!(u2.session_count, 0);
        assert_eq!(u2.valid_sessions, 0);
        assert_eq!(u2.average_valid_secs, 0.0);

        let aggregates = sdk_aggregates(&rows);
        assert_eq!(aggregates.len(), 1);
        let sdk = &aggregates[0];
        assert_eq!(sdk.sdk_version, "7.6");
        assert_eq!(sdk.user_count, 2);
        assert_eq!(sdk.users_with_valid, 1);
        assert!((sdk.mean_valid_secs - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_sdk_aggregates_without_valid_users() {
        let rows = vec![UserReportRow {
            user_id: "u3".to_string(),
            sdk_version: "7.5".to_string(),
            session_count: 2,
            valid_sessions: 0,
            average_valid_secs: 0.0,
        }];
        let aggregates = sdk_aggregates(&rows);
        assert_eq!(aggregates[0].users_with_valid, 0);
        assert_eq!(aggregates[0].mean_valid_secs, 0.0);
    }
}
