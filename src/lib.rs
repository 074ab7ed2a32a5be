pub mod error;
pub mod flow;
pub mod stats;
pub mod types;

pub use error::{FlowError, SetupError, UnknownPlayerError};
pub use flow::{compute_flow, MatchFlow, PointOutcome, FINAL_STATE_KEY};
pub use stats::{compute_rpr, compute_stats, compute_stats_with_weights, MatchStats};
pub use types::*;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use wasm_bindgen::prelude::*;

/// Initialize panic hook and console logging
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(target_arch = "wasm32")]
    console::install();
}

/// Forwards `log` records to the browser console
#[cfg(target_arch = "wasm32")]
mod console {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use wasm_bindgen::JsValue;

    struct ConsoleLogger;

    impl Log for ConsoleLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            let line = JsValue::from(format!("[{}] {}", record.target(), record.args()));
            match record.level() {
                Level::Error => web_sys::console::error_1(&line),
                Level::Warn => web_sys::console::warn_1(&line),
                _ => web_sys::console::log_1(&line),
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: ConsoleLogger = ConsoleLogger;

    pub fn install() {
        let level = if cfg!(feature = "debug") {
            LevelFilter::Trace
        } else {
            LevelFilter::Info
        };
        // A second start call finds the logger already set
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level);
        }
    }
}

fn js_error(context: &str, err: impl Display) -> JsValue {
    js_sys::Error::new(&format!("{}: {}", context, err)).into()
}

fn parse<T: DeserializeOwned>(json: &str, what: &str) -> Result<T, JsValue> {
    serde_json::from_str(json).map_err(|e| js_error(&format!("{} parse error", what), e))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(|e| js_error("Serialization error", e))
}

/// Flow and stats computed together
#[derive(Serialize)]
struct MatchAnalysis<'a> {
    flow: &'a MatchFlow,
    stats: &'a MatchStats,
}

/// Replay the clips and return the per-clip state map as JSON
#[wasm_bindgen]
pub fn compute_match_flow(setup_json: &str, clips_json: &str) -> Result<String, JsValue> {
    let setup: MatchSetup = parse(setup_json, "Setup")?;
    let clips: Vec<ClipOutcome> = parse(clips_json, "Clips")?;
    let flow = compute_flow(&setup, &clips).map_err(|e| js_error("Match flow error", e))?;
    to_json(&flow)
}

/// Aggregate stats from a previously computed flow
#[wasm_bindgen]
pub fn compute_match_stats(
    setup_json: &str,
    clips_json: &str,
    flow_json: &str,
) -> Result<String, JsValue> {
    let setup: MatchSetup = parse(setup_json, "Setup")?;
    let clips: Vec<ClipOutcome> = parse(clips_json, "Clips")?;
    let flow: MatchFlow = parse(flow_json, "Flow")?;
    to_json(&compute_stats(&setup, &clips, &flow))
}

/// Aggregate stats with custom rating weights
#[wasm_bindgen]
pub fn compute_match_stats_with_weights(
    setup_json: &str,
    clips_json: &str,
    flow_json: &str,
    weights_json: &str,
) -> Result<String, JsValue> {
    let setup: MatchSetup = parse(setup_json, "Setup")?;
    let clips: Vec<ClipOutcome> = parse(clips_json, "Clips")?;
    let flow: MatchFlow = parse(flow_json, "Flow")?;
    let weights: RprWeights = parse(weights_json, "Weights")?;
    to_json(&compute_stats_with_weights(&setup, &clips, &flow, &weights))
}

/// Compute flow then stats in one call, returned as `{ flow, stats }`
#[wasm_bindgen]
pub fn analyze_match(setup_json: &str, clips_json: &str) -> Result<String, JsValue> {
    let setup: MatchSetup = parse(setup_json, "Setup")?;
    let clips: Vec<ClipOutcome> = parse(clips_json, "Clips")?;
    let flow = compute_flow(&setup, &clips).map_err(|e| js_error("Match flow error", e))?;
    let stats = compute_stats(&setup, &clips, &flow);
    to_json(&MatchAnalysis {
        flow: &flow,
        stats: &stats,
    })
}

/// Check a setup before saving it
#[wasm_bindgen]
pub fn validate_setup(setup_json: &str) -> Result<(), JsValue> {
    let setup: MatchSetup = parse(setup_json, "Setup")?;
    setup.validate().map_err(|e| js_error("Invalid setup", e))
}

/// Get default rating weights as JSON
#[wasm_bindgen]
pub fn get_default_rpr_weights() -> String {
    serde_json::to_string(&RprWeights::default()).unwrap_or_default()
}

/// Score to display while a clip plays
#[wasm_bindgen]
pub fn get_clip_score(flow_json: &str, clip_id: &str) -> Result<String, JsValue> {
    let flow: MatchFlow = parse(flow_json, "Flow")?;
    let (team1, team2) = flow.score_before(clip_id);
    Ok(serde_json::json!({
        "team1Score": team1,
        "team2Score": team2,
    })
    .to_string())
}

/// Players ordered by rating for the stat screen
#[wasm_bindgen]
pub fn get_leaderboard(stats_json: &str) -> Result<String, JsValue> {
    let stats: MatchStats = parse(stats_json, "Stats")?;
    let rows: Vec<_> = stats
        .leaderboard()
        .into_iter()
        .map(|(id, player)| {
            serde_json::json!({
                "playerId": id,
                "rpr": player.rpr,
            })
        })
        .collect();
    to_json(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::setup;

    fn setup_json() -> String {
        serde_json::to_string(&setup(ServingStyle::Traditional, "A", "C")).unwrap()
    }

    const CLIPS: &str = r#"[
        {"id": 1, "statType": "ace", "start": 0.0, "end": 4.2},
        {"id": 2, "statType": "double_fault", "status": "done"},
        {"id": 3, "statType": "sideout", "status": "trash"},
        {"id": "4", "statType": "def_hold", "involvedPlayers": ["A", "B"], "keep": true}
    ]"#;

    #[test]
    fn test_flow_through_json() {
        let json = compute_match_flow(&setup_json(), CLIPS).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["2"]["team1Score"], 1);
        assert!(value.get("3").is_none());
        assert_eq!(value["4"]["servingTeamId"], "team2");
        assert_eq!(value[FINAL_STATE_KEY]["team1Score"], 2);
        assert_eq!(value[FINAL_STATE_KEY]["team2Score"], 1);
    }

    #[test]
    fn test_stats_accept_flow_json_back() {
        let flow = compute_match_flow(&setup_json(), CLIPS).unwrap();
        let from_parts = compute_match_stats(&setup_json(), CLIPS, &flow).unwrap();

        let combined: serde_json::Value =
            serde_json::from_str(&analyze_match(&setup_json(), CLIPS).unwrap()).unwrap();
        let from_parts: serde_json::Value = serde_json::from_str(&from_parts).unwrap();
        assert_eq!(combined["stats"], from_parts);
        assert_eq!(from_parts["team1"]["score"], 2);
        assert_eq!(from_parts["players"]["B"]["defTouchesReturned"], 1);
    }

    #[test]
    fn test_json_helpers() {
        let flow = compute_match_flow(&setup_json(), CLIPS).unwrap();
        let score: serde_json::Value =
            serde_json::from_str(&get_clip_score(&flow, "4").unwrap()).unwrap();
        assert_eq!(score["team1Score"], 1);
        assert_eq!(score["team2Score"], 1);

        let weights: RprWeights = serde_json::from_str(&get_default_rpr_weights()).unwrap();
        assert_eq!(weights, RprWeights::default());

        let stats = compute_match_stats(&setup_json(), CLIPS, &flow).unwrap();
        let board: Vec<serde_json::Value> =
            serde_json::from_str(&get_leaderboard(&stats).unwrap()).unwrap();
        assert_eq!(board.len(), 4);
        let totals: Vec<f64> = board.iter().map(|r| r["rpr"]["total"].as_f64().unwrap()).collect();
        assert!(totals.windows(2).all(|w| w[0] >= w[1]));

        assert!(validate_setup(&setup_json()).is_ok());
    }
}
