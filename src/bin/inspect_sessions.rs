use std::path::Path;

use playlog::config::AnalysisConfig;
use playlog::sessions::{group_and_sort, load_events, reconstruct_all};

fn main() {
    println!("Inspecting play sessions...\n");

    let path = std::env::args().nth(1).unwrap_or_else(|| "ggevent.log".to_string());
    let config = AnalysisConfig::default();

    match load_events(Path::new(&path)) {
        Ok(outcome) => {
            println!(
                "Loaded {} events ({} records skipped)\n",
                outcome.events.len(),
                outcome.skipped
            );

            let grouped = group_and_sort(outcome.events);
            let summaries = reconstruct_all(&grouped, &config);
            println!("Found sessions for {} users\n", summaries.len());

            for summary in &summaries {
                let durations: Vec<i64> =
                    summary.sessions.iter().map(|s| s.duration_secs).collect();
                println!("{} (sdk {})", summary.user_id, summary.sdk_version);
                println!("    sessions: {:?}", durations);
                println!(
                    "    valid: {} avg: {:.1}s",
                    summary.valid_session_count(config.validity_threshold_secs),
                    summary.average_valid_secs(config.validity_threshold_secs)
                );
                println!();
            }
        }
        Err(e) => {
            println!("Failed to load {}: {}", path, e);
        }
    }
}
