use crate::error::{FlowError, UnknownPlayerError};
use crate::types::*;
use log::{debug, trace};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Key of the end-of-match entry in the serialized flow map
pub const FINAL_STATE_KEY: &str = "__final__";

/// Who won a tagged point and whether serve changed hands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointOutcome {
    pub winner: Option<TeamSide>,
    pub possession_change: bool,
}

impl PointOutcome {
    /// Classify a clip's tag relative to the team that served it.
    ///
    /// Errors are credited to the team opposite `involved[0]`; an error with
    /// nobody involved scores nothing.
    pub fn classify(
        setup: &MatchSetup,
        stat_type: StatType,
        involved: &[String],
        serving: TeamSide,
    ) -> Result<Self, UnknownPlayerError> {
        let receiving = serving.other();
        let outcome = match stat_type {
            StatType::Ace | StatType::ServiceBreak | StatType::DefBreak => PointOutcome {
                winner: Some(serving),
                possession_change: false,
            },
            StatType::DoubleFault | StatType::Sideout | StatType::DefHold => PointOutcome {
                winner: Some(receiving),
                possession_change: true,
            },
            StatType::Error => match involved.first() {
                Some(erring) => {
                    let erring_team = setup.team_of(erring)?;
                    PointOutcome {
                        winner: Some(erring_team.other()),
                        possession_change: erring_team == serving,
                    }
                }
                None => PointOutcome::no_point(),
            },
            StatType::None => PointOutcome::no_point(),
        };
        Ok(outcome)
    }

    fn no_point() -> Self {
        PointOutcome {
            winner: None,
            possession_change: false,
        }
    }
}

/// Replayed game states, in clip order, plus the end-of-match state.
///
/// Stored as an arena with a side index from clip id to position. A clip id
/// that appears twice resolves to its later state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchFlow {
    states: Vec<RoundnetState>,
    index: HashMap<String, usize>,
    terminal: Option<RoundnetState>,
}

impl MatchFlow {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            states: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            terminal: None,
        }
    }

    fn record(&mut self, state: RoundnetState) {
        self.index.insert(state.clip_id.clone(), self.states.len());
        self.states.push(state);
    }

    /// State immediately before `clip_id` was played
    pub fn get(&self, clip_id: &str) -> Option<&RoundnetState> {
        self.index.get(clip_id).map(|&pos| &self.states[pos])
    }

    pub fn contains(&self, clip_id: &str) -> bool {
        self.index.contains_key(clip_id)
    }

    /// State after the last kept clip
    pub fn terminal(&self) -> Option<&RoundnetState> {
        self.terminal.as_ref()
    }

    /// Recorded pre-point states in replay order
    pub fn iter(&self) -> impl Iterator<Item = &RoundnetState> {
        self.states.iter()
    }

    /// Number of distinct clip entries, not counting the terminal state
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// (team1, team2) score shown while `clip_id` plays; 0-0 when unknown
    pub fn score_before(&self, clip_id: &str) -> (u32, u32) {
        self.get(clip_id)
            .map(|s| (s.team1_score, s.team2_score))
            .unwrap_or((0, 0))
    }

    fn is_current(&self, pos: usize, state: &RoundnetState) -> bool {
        self.index.get(&state.clip_id) == Some(&pos)
    }
}

impl Serialize for MatchFlow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.index.len() + usize::from(self.terminal.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (pos, state) in self.states.iter().enumerate() {
            if self.is_current(pos, state) {
                map.serialize_entry(&state.clip_id, state)?;
            }
        }
        if let Some(terminal) = &self.terminal {
            map.serialize_entry(FINAL_STATE_KEY, terminal)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MatchFlow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FlowVisitor;

        impl<'de> Visitor<'de> for FlowVisitor {
            type Value = MatchFlow;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map from clip id to game state")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<MatchFlow, A::Error> {
                let mut flow = MatchFlow::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, mut state)) = access.next_entry::<String, RoundnetState>()? {
                    if key == FINAL_STATE_KEY {
                        flow.terminal = Some(state);
                    } else {
                        // The map key wins over the embedded clipId
                        state.clip_id = key;
                        flow.record(state);
                    }
                }
                Ok(flow)
            }
        }

        deserializer.deserialize_map(FlowVisitor)
    }
}

/// Player on `known`'s team standing at `wanted`, given `known` stands at `known_pos`
fn player_at(
    setup: &MatchSetup,
    known: &str,
    known_pos: CourtPosition,
    wanted: CourtPosition,
) -> Result<String, UnknownPlayerError> {
    if known_pos == wanted {
        Ok(known.to_string())
    } else {
        setup.partner_of(known).map(str::to_string)
    }
}

/// Serve follows the point winner; positions track who stands where.
///
/// The receiver is always recorded on the side mirroring the server.
pub(crate) struct TraditionalRules;

impl TraditionalRules {
    fn seed(&self, setup: &MatchSetup) -> Result<RoundnetState, UnknownPlayerError> {
        let serving = setup.team_of(&setup.first_server_id)?;
        setup.team_of(&setup.first_receiver_id)?;
        Ok(RoundnetState {
            clip_id: String::new(),
            team1_score: 0,
            team2_score: 0,
            serving_team_id: setup.team(serving).id.clone(),
            server_player_id: setup.first_server_id.clone(),
            receiver_player_id: setup.first_receiver_id.clone(),
            server_position: CourtPosition::Right,
            receiver_position: CourtPosition::Right,
            current_serve_count: 0,
            rotation_index: 0,
        })
    }

    /// `scored` already carries the post-point score but the pre-point roles
    pub(crate) fn advance(
        &self,
        setup: &MatchSetup,
        scored: &RoundnetState,
        serving: TeamSide,
        outcome: PointOutcome,
    ) -> Result<RoundnetState, UnknownPlayerError> {
        if outcome.possession_change {
            let new_serving = serving.other();
            let server_position = CourtPosition::for_score(scored.score(new_serving));
            let server = player_at(
                setup,
                &scored.receiver_player_id,
                scored.receiver_position,
                server_position,
            )?;
            let receiver_position = server_position.flipped();
            let receiver = player_at(
                setup,
                &scored.server_player_id,
                scored.server_position,
                receiver_position,
            )?;
            Ok(RoundnetState {
                serving_team_id: setup.team(new_serving).id.clone(),
                server_player_id: server,
                receiver_player_id: receiver,
                server_position,
                receiver_position,
                current_serve_count: 0,
                ..scored.clone()
            })
        } else if outcome.winner == Some(serving) {
            let server_position = scored.server_position.flipped();
            // The receiver standing where the server moves to hands over to their partner
            let receiver = if scored.receiver_position == server_position {
                setup.partner_of(&scored.receiver_player_id)?.to_string()
            } else {
                scored.receiver_player_id.clone()
            };
            Ok(RoundnetState {
                receiver_player_id: receiver,
                server_position,
                receiver_position: server_position.flipped(),
                current_serve_count: scored.current_serve_count + 1,
                ..scored.clone()
            })
        } else {
            Ok(scored.clone())
        }
    }
}

const A: usize = 0;
const B: usize = 1;
const C: usize = 2;
const D: usize = 3;

/// Regular equal-serving cycle as (server, receiver) label pairs
const BASE_CYCLE: [(usize, usize); 8] = [(A, D), (C, B), (C, A), (B, D), (B, C), (D, A), (D, B), (A, C)];

/// Cycle used once both teams sit at or past the target within one point
const OVERTIME_CYCLE: [(usize, usize); 4] = [(A, D), (D, A), (B, C), (C, B)];

/// Every player serves to every opponent in a fixed order, whoever wins.
///
/// Labels come from the seed: A is the first server, D the first receiver,
/// B and C their partners.
pub(crate) struct EqualRotation {
    labels: [String; 4],
}

impl EqualRotation {
    pub(crate) fn new(setup: &MatchSetup) -> Result<Self, UnknownPlayerError> {
        let a = setup.first_server_id.clone();
        let d = setup.first_receiver_id.clone();
        let b = setup.partner_of(&a)?.to_string();
        let c = setup.partner_of(&d)?.to_string();
        Ok(Self { labels: [a, b, c, d] })
    }

    fn cycle(overtime: bool) -> &'static [(usize, usize)] {
        if overtime {
            &OVERTIME_CYCLE
        } else {
            &BASE_CYCLE
        }
    }

    /// (server, receiver) ids at `index` of the chosen cycle
    pub(crate) fn pair(&self, overtime: bool, index: usize) -> (&str, &str) {
        let (server, receiver) = Self::cycle(overtime)[index];
        (self.labels[server].as_str(), self.labels[receiver].as_str())
    }

    fn seed(&self, setup: &MatchSetup) -> Result<RoundnetState, UnknownPlayerError> {
        let (server, receiver) = self.pair(false, 0);
        let serving = setup.team_of(server)?;
        Ok(RoundnetState {
            clip_id: String::new(),
            team1_score: 0,
            team2_score: 0,
            serving_team_id: setup.team(serving).id.clone(),
            server_player_id: server.to_string(),
            receiver_player_id: receiver.to_string(),
            server_position: CourtPosition::Right,
            receiver_position: CourtPosition::Left,
            current_serve_count: 0,
            rotation_index: 0,
        })
    }

    /// Untagged clips keep the rotation where it is
    pub(crate) fn advance(
        &self,
        setup: &MatchSetup,
        scored: &RoundnetState,
        stat_type: StatType,
    ) -> Result<RoundnetState, UnknownPlayerError> {
        if stat_type == StatType::None {
            return Ok(scored.clone());
        }

        let overtime = scored.is_overtime(setup.target_score);
        let rotation_index = (scored.rotation_index + 1) % Self::cycle(overtime).len();
        let (server, receiver) = self.pair(overtime, rotation_index);
        let serving = setup.team_of(server)?;
        let current_serve_count = if server == scored.server_player_id {
            scored.current_serve_count + 1
        } else {
            0
        };

        Ok(RoundnetState {
            serving_team_id: setup.team(serving).id.clone(),
            server_player_id: server.to_string(),
            receiver_player_id: receiver.to_string(),
            server_position: CourtPosition::Right,
            receiver_position: CourtPosition::Left,
            current_serve_count,
            rotation_index,
            ..scored.clone()
        })
    }
}

/// Transition rules picked once per computation from the serving style
pub(crate) enum ServingRules {
    Traditional(TraditionalRules),
    Equal(EqualRotation),
}

impl ServingRules {
    pub(crate) fn for_setup(setup: &MatchSetup) -> Result<Self, UnknownPlayerError> {
        Ok(match setup.serving_style {
            ServingStyle::Traditional => ServingRules::Traditional(TraditionalRules),
            ServingStyle::Equal => ServingRules::Equal(EqualRotation::new(setup)?),
        })
    }

    fn seed(&self, setup: &MatchSetup) -> Result<RoundnetState, UnknownPlayerError> {
        match self {
            ServingRules::Traditional(rules) => rules.seed(setup),
            ServingRules::Equal(rotation) => rotation.seed(setup),
        }
    }

    fn advance(
        &self,
        setup: &MatchSetup,
        scored: &RoundnetState,
        serving: TeamSide,
        stat_type: StatType,
        outcome: PointOutcome,
    ) -> Result<RoundnetState, UnknownPlayerError> {
        match self {
            ServingRules::Traditional(rules) => rules.advance(setup, scored, serving, outcome),
            ServingRules::Equal(rotation) => rotation.advance(setup, scored, stat_type),
        }
    }
}

/// Replay the kept clips and return the state before each one.
///
/// All-or-nothing: an unknown player id anywhere, or a kept clip named like
/// the terminal entry, aborts the whole replay.
pub fn compute_flow(
    setup: &MatchSetup,
    clips: &[ClipOutcome],
) -> Result<MatchFlow, FlowError> {
    let kept: Vec<&ClipOutcome> = clips.iter().filter(|c| c.is_kept()).collect();
    if let Some(clip) = kept.iter().find(|c| c.id == FINAL_STATE_KEY) {
        return Err(FlowError::ReservedClipId(clip.id.clone()));
    }
    if kept.is_empty() {
        return Ok(MatchFlow::default());
    }

    let rules = ServingRules::for_setup(setup)?;
    let mut current = rules.seed(setup)?;
    let mut flow = MatchFlow::with_capacity(kept.len());

    for clip in kept {
        flow.record(RoundnetState {
            clip_id: clip.id.clone(),
            ..current.clone()
        });

        let serving = setup.team_of(&current.server_player_id)?;
        let outcome =
            PointOutcome::classify(setup, clip.stat_type, &clip.involved_players, serving)?;
        let scored = match outcome.winner {
            Some(side) => current.with_point(side),
            None => current.clone(),
        };
        current = rules.advance(setup, &scored, serving, clip.stat_type, outcome)?;

        trace!(
            "clip {}: {:?} -> {}-{}, {} serving to {}",
            clip.id,
            clip.stat_type,
            current.team1_score,
            current.team2_score,
            current.server_player_id,
            current.receiver_player_id
        );
    }

    debug!(
        "replayed {} clips, final score {}-{}",
        flow.len(),
        current.team1_score,
        current.team2_score
    );

    flow.terminal = Some(RoundnetState {
        clip_id: FINAL_STATE_KEY.to_string(),
        ..current
    });
    Ok(flow)
}
