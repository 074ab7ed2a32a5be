use crate::flow::{MatchFlow, PointOutcome};
use crate::types::*;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Team totals plus per-player counters for one match
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub team1: TeamStats,
    pub team2: TeamStats,
    /// Keyed by player id, ordered for stable output
    pub players: BTreeMap<String, PlayerStats>,
}

impl MatchStats {
    fn for_setup(setup: &MatchSetup) -> Self {
        Self {
            team1: TeamStats::default(),
            team2: TeamStats::default(),
            players: setup
                .players()
                .map(|p| (p.id.clone(), PlayerStats::default()))
                .collect(),
        }
    }

    pub fn team(&self, side: TeamSide) -> &TeamStats {
        match side {
            TeamSide::Team1 => &self.team1,
            TeamSide::Team2 => &self.team2,
        }
    }

    fn team_mut(&mut self, side: TeamSide) -> &mut TeamStats {
        match side {
            TeamSide::Team1 => &mut self.team1,
            TeamSide::Team2 => &mut self.team2,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerStats> {
        self.players.get(player_id)
    }

    /// Players by RPR total, best first; ties fall back to player id
    pub fn leaderboard(&self) -> Vec<(&str, &PlayerStats)> {
        let mut rows: Vec<(&str, &PlayerStats)> = self
            .players
            .iter()
            .map(|(id, stats)| (id.as_str(), stats))
            .collect();
        rows.sort_by(|a, b| b.1.rpr.total.total_cmp(&a.1.rpr.total).then_with(|| a.0.cmp(b.0)));
        rows
    }

    fn bump(&mut self, player_id: &str, apply: impl FnOnce(&mut PlayerStats)) {
        match self.players.get_mut(player_id) {
            Some(stats) => apply(stats),
            None => warn!("ignoring stat for unconfigured player {}", player_id),
        }
    }
}

/// Round half away from zero to two decimals
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Derive the rating components from a player's raw counters
pub fn compute_rpr(stats: &PlayerStats, weights: &RprWeights) -> Rpr {
    let serving = if stats.total_serves > 0 {
        weights.ace_weight * stats.aces as f64
            + weights.serve_in_weight * (stats.serves_on as f64 / stats.total_serves as f64)
    } else {
        0.0
    };

    let efficiency = (weights.efficiency_base
        - weights.error_penalty * stats.errors as f64
        - weights.aced_penalty * stats.aced_count as f64)
        .max(0.0);

    let hitting = if stats.total_hits > 0 {
        weights.hitting_weight * (stats.successful_hits as f64 / stats.total_hits as f64)
    } else {
        0.0
    };

    let defense = weights.defense_return_factor * hitting * stats.def_touches_returned as f64
        + stats.def_touches_not_returned as f64;

    let total = weights.total_scale * (serving + efficiency + hitting + defense);

    Rpr {
        serving: round2(serving),
        hitting: round2(hitting),
        defense: round2(defense),
        efficiency: round2(efficiency),
        total: round2(total),
    }
}

/// Aggregate stats with the default rating weights
pub fn compute_stats(setup: &MatchSetup, clips: &[ClipOutcome], flow: &MatchFlow) -> MatchStats {
    compute_stats_with_weights(setup, clips, flow, &RprWeights::default())
}

/// Aggregate per-player counters and ratings over the kept clips.
///
/// Clips missing from `flow` are skipped rather than failing the whole call.
pub fn compute_stats_with_weights(
    setup: &MatchSetup,
    clips: &[ClipOutcome],
    flow: &MatchFlow,
    weights: &RprWeights,
) -> MatchStats {
    let mut stats = MatchStats::for_setup(setup);
    let mut counted = 0usize;

    for clip in clips.iter().filter(|c| c.is_kept()) {
        let Some(state) = flow.get(&clip.id) else {
            debug!("no flow entry for clip {}, skipping", clip.id);
            continue;
        };
        apply_clip(setup, &mut stats, clip, state);
        record_team_point(setup, &mut stats, clip, state);
        counted += 1;
    }

    if let Some(terminal) = flow.terminal() {
        stats.team1.score = terminal.team1_score;
        stats.team2.score = terminal.team2_score;
    }

    for player in stats.players.values_mut() {
        player.rpr = compute_rpr(player, weights);
    }

    debug!("aggregated {} clips into stats for {} players", counted, stats.players.len());
    stats
}

/// Apply the fixed outcome table for one clip, using the server and
/// receiver recorded before the point
fn apply_clip(setup: &MatchSetup, stats: &mut MatchStats, clip: &ClipOutcome, state: &RoundnetState) {
    let server = state.server_player_id.as_str();
    let receiver = state.receiver_player_id.as_str();

    match clip.stat_type {
        StatType::Ace => {
            stats.bump(server, |p| {
                p.aces += 1;
                p.breaks += 1;
                p.total_serves += 1;
                p.serves_on += 1;
            });
            stats.bump(receiver, |p| {
                p.aced_count += 1;
                p.broken += 1;
                p.receives += 1;
            });
        }
        StatType::DoubleFault => {
            stats.bump(server, |p| {
                p.double_faults += 1;
                p.total_serves += 1;
            });
            stats.bump(receiver, |p| {
                p.holds += 1;
                p.receives += 1;
            });
        }
        StatType::ServiceBreak => {
            stats.bump(server, |p| {
                p.breaks += 1;
                p.total_serves += 1;
                p.serves_on += 1;
            });
            stats.bump(receiver, |p| {
                p.broken += 1;
                p.receives += 1;
                p.total_hits += 1;
            });
        }
        StatType::Sideout => {
            stats.bump(server, serve_landed);
            stats.bump(receiver, |p| {
                p.holds += 1;
                p.receives += 1;
                p.total_hits += 1;
                p.successful_hits += 1;
            });
        }
        StatType::DefBreak => {
            stats.bump(server, serve_landed);
            stats.bump(receiver, |p| {
                p.broken += 1;
                p.receives += 1;
                p.total_hits += 1;
            });
            credit_touches(stats, &clip.involved_players, true);
        }
        StatType::DefHold => {
            stats.bump(server, serve_landed);
            stats.bump(receiver, |p| {
                p.holds += 1;
                p.receives += 1;
                p.total_hits += 1;
                p.successful_hits += 1;
            });
            credit_touches(stats, &clip.involved_players, false);
        }
        StatType::Error => {
            stats.bump(server, serve_landed);
            stats.bump(receiver, |p| {
                p.receives += 1;
                p.total_hits += 1;
            });
            if let Some(erring) = clip.involved_players.first() {
                stats.bump(erring, |p| p.errors += 1);
                match setup.team_of(erring) {
                    Ok(side) if setup.team(side).id != state.serving_team_id => {
                        stats.bump(server, |p| p.breaks += 1);
                        stats.bump(receiver, |p| p.broken += 1);
                    }
                    Ok(_) => {
                        stats.bump(receiver, |p| {
                            p.holds += 1;
                            p.successful_hits += 1;
                        });
                    }
                    Err(e) => warn!("clip {}: {}", clip.id, e),
                }
            }
        }
        StatType::None => {}
    }
}

fn serve_landed(p: &mut PlayerStats) {
    p.total_serves += 1;
    p.serves_on += 1;
}

/// Last toucher returned the ball; everyone before them did not
fn credit_touches(stats: &mut MatchStats, involved: &[String], is_break: bool) {
    let Some((last, earlier)) = involved.split_last() else {
        return;
    };
    stats.bump(last, |p| {
        p.def_touches_returned += 1;
        if is_break {
            p.breaks += 1;
        }
    });
    for player in earlier {
        stats.bump(player, |p| p.def_touches_not_returned += 1);
    }
}

/// Serving-team wins count as team breaks, receiving-team wins as holds
fn record_team_point(setup: &MatchSetup, stats: &mut MatchStats, clip: &ClipOutcome, state: &RoundnetState) {
    let Some(serving) = setup.side_of_team_id(&state.serving_team_id) else {
        warn!("clip {}: unknown serving team {}", clip.id, state.serving_team_id);
        return;
    };
    let outcome = match PointOutcome::classify(setup, clip.stat_type, &clip.involved_players, serving) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("clip {}: {}", clip.id, e);
            return;
        }
    };
    if let Some(winner) = outcome.winner {
        let team = stats.team_mut(winner);
        if winner == serving {
            team.breaks += 1;
        } else {
            team.holds += 1;
        }
    }
}
