use crate::error::{SetupError, UnknownPlayerError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// A player on one of the two teams
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub team_id: String,
}

impl Player {
    pub fn new(id: &str, name: &str, team_id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            team_id: team_id.to_string(),
        }
    }
}

/// A team of exactly two players
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    pub color: String,
    pub players: Vec<Player>,
}

impl Team {
    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }
}

/// Which of the two configured teams
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TeamSide {
    Team1,
    Team2,
}

impl TeamSide {
    pub fn other(self) -> TeamSide {
        match self {
            TeamSide::Team1 => TeamSide::Team2,
            TeamSide::Team2 => TeamSide::Team1,
        }
    }
}

/// Court side a player stands on, from their own team's perspective
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourtPosition {
    Left,
    Right,
}

impl CourtPosition {
    pub fn flipped(self) -> CourtPosition {
        match self {
            CourtPosition::Left => CourtPosition::Right,
            CourtPosition::Right => CourtPosition::Left,
        }
    }

    /// Even scores serve from the right, odd scores from the left
    pub fn for_score(score: u32) -> CourtPosition {
        if score % 2 == 0 {
            CourtPosition::Right
        } else {
            CourtPosition::Left
        }
    }
}

/// Serving regime for the match
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServingStyle {
    /// Serve stays with the team that wins the point
    Traditional,
    /// Every player serves to every opponent in a fixed cycle
    Equal,
}

/// Match configuration produced by the setup wizard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSetup {
    pub team1: Team,
    pub team2: Team,
    pub serving_style: ServingStyle,
    pub target_score: u32,
    pub first_server_id: String,
    pub first_receiver_id: String,
}

impl MatchSetup {
    pub fn team(&self, side: TeamSide) -> &Team {
        match side {
            TeamSide::Team1 => &self.team1,
            TeamSide::Team2 => &self.team2,
        }
    }

    /// Resolve which team a player belongs to
    pub fn team_of(&self, player_id: &str) -> Result<TeamSide, UnknownPlayerError> {
        if self.team1.has_player(player_id) {
            Ok(TeamSide::Team1)
        } else if self.team2.has_player(player_id) {
            Ok(TeamSide::Team2)
        } else {
            Err(UnknownPlayerError::new(player_id))
        }
    }

    /// Resolve a player's teammate
    pub fn partner_of(&self, player_id: &str) -> Result<&str, UnknownPlayerError> {
        let team = self.team(self.team_of(player_id)?);
        team.players
            .iter()
            .find(|p| p.id != player_id)
            .map(|p| p.id.as_str())
            .ok_or_else(|| UnknownPlayerError::new(player_id))
    }

    /// Map a team id back to its side, if it is one of the two configured teams
    pub fn side_of_team_id(&self, team_id: &str) -> Option<TeamSide> {
        if self.team1.id == team_id {
            Some(TeamSide::Team1)
        } else if self.team2.id == team_id {
            Some(TeamSide::Team2)
        } else {
            None
        }
    }

    /// All configured players, team1 first
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.team1.players.iter().chain(self.team2.players.iter())
    }

    /// Check the team/player invariants the engines rely on.
    ///
    /// The engines never call this themselves; it exists for callers that
    /// want to reject a bad setup before running a computation.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.team1.id == self.team2.id {
            return Err(SetupError::DuplicateTeamId(self.team1.id.clone()));
        }
        if self.target_score == 0 {
            return Err(SetupError::ZeroTargetScore);
        }

        let mut seen = HashSet::new();
        for team in [&self.team1, &self.team2] {
            if team.players.len() != 2 {
                return Err(SetupError::TeamSize {
                    team_id: team.id.clone(),
                    count: team.players.len(),
                });
            }
            for player in &team.players {
                if !seen.insert(player.id.as_str()) {
                    return Err(SetupError::DuplicatePlayer(player.id.clone()));
                }
                if player.team_id != team.id {
                    return Err(SetupError::TeamMismatch {
                        player_id: player.id.clone(),
                        team_id: team.id.clone(),
                    });
                }
            }
        }

        let server_team = self
            .team_of(&self.first_server_id)
            .map_err(|_| SetupError::UnknownFirstServer(self.first_server_id.clone()))?;
        let receiver_team = self
            .team_of(&self.first_receiver_id)
            .map_err(|_| SetupError::UnknownFirstReceiver(self.first_receiver_id.clone()))?;
        if server_team == receiver_team {
            return Err(SetupError::SameTeamServeReceive);
        }

        Ok(())
    }
}

/// Outcome tag the user assigns to a clip
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatType {
    Ace,
    DoubleFault,
    ServiceBreak,
    Sideout,
    DefBreak,
    DefHold,
    Error,
    #[default]
    None,
}

/// Review status of a clip in the editor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipStatus {
    Pending,
    Done,
    Trash,
}

/// A tagged rally clip. Only the fields the engines read are kept; the
/// editor's timing and confidence fields are ignored on deserialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipOutcome {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub stat_type: StatType,
    /// Touch order for the rally, last toucher last
    #[serde(default)]
    pub involved_players: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ClipStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<bool>,
}

impl ClipOutcome {
    pub fn new(id: &str, stat_type: StatType) -> Self {
        Self {
            id: id.to_string(),
            stat_type,
            involved_players: Vec::new(),
            status: None,
            keep: None,
        }
    }

    pub fn with_players(mut self, players: &[&str]) -> Self {
        self.involved_players = players.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Trashed clips are dropped; `keep` only decides when no status is set
    pub fn is_kept(&self) -> bool {
        match self.status {
            Some(ClipStatus::Trash) => false,
            Some(_) => true,
            None => self.keep != Some(false),
        }
    }
}

/// Project files written by older builds store clip ids as numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
    })
}

/// Game state immediately before a clip's outcome is applied
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundnetState {
    pub clip_id: String,
    pub team1_score: u32,
    pub team2_score: u32,
    pub serving_team_id: String,
    pub server_player_id: String,
    pub receiver_player_id: String,
    pub server_position: CourtPosition,
    pub receiver_position: CourtPosition,
    /// Points already served by the current server in this turn
    pub current_serve_count: u32,
    /// Index into the active equal-serving cycle (always 0 for traditional)
    pub rotation_index: usize,
}

impl RoundnetState {
    pub fn score(&self, side: TeamSide) -> u32 {
        match side {
            TeamSide::Team1 => self.team1_score,
            TeamSide::Team2 => self.team2_score,
        }
    }

    /// Copy of this state with one point added for `side`
    pub fn with_point(&self, side: TeamSide) -> RoundnetState {
        let mut next = self.clone();
        match side {
            TeamSide::Team1 => next.team1_score += 1,
            TeamSide::Team2 => next.team2_score += 1,
        }
        next
    }

    /// Both teams at or past the target and within one point of each other
    pub fn is_overtime(&self, target_score: u32) -> bool {
        self.team1_score >= target_score
            && self.team2_score >= target_score
            && self.team1_score.abs_diff(self.team2_score) < 2
    }
}

/// Coefficients of the RPR rating formula
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RprWeights {
    /// Serving points per ace
    pub ace_weight: f64,
    /// Serving points for a perfect serve-in ratio
    pub serve_in_weight: f64,
    /// Efficiency starting value before penalties
    pub efficiency_base: f64,
    /// Efficiency penalty per error
    pub error_penalty: f64,
    /// Efficiency penalty per time aced
    pub aced_penalty: f64,
    /// Hitting points for a perfect hit ratio
    pub hitting_weight: f64,
    /// Share of hitting score credited per returned defensive touch
    pub defense_return_factor: f64,
    /// Multiplier applied to the component sum
    pub total_scale: f64,
}

impl Default for RprWeights {
    fn default() -> Self {
        Self {
            ace_weight: 5.5,
            serve_in_weight: 15.0,
            efficiency_base: 20.0,
            error_penalty: 5.0,
            aced_penalty: 2.0,
            hitting_weight: 20.0,
            defense_return_factor: 0.4,
            total_scale: 1.57,
        }
    }
}

/// Derived rating components, each rounded to two decimals
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rpr {
    pub serving: f64,
    pub hitting: f64,
    pub defense: f64,
    pub efficiency: f64,
    pub total: f64,
}

/// Raw per-player counters plus the derived rating
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub aces: u32,
    pub double_faults: u32,
    pub errors: u32,
    pub aced_count: u32,
    pub total_serves: u32,
    pub serves_on: u32,
    pub breaks: u32,
    pub total_hits: u32,
    pub successful_hits: u32,
    pub def_touches_returned: u32,
    pub def_touches_not_returned: u32,
    pub holds: u32,
    pub receives: u32,
    pub serve_wins: u32,
    pub broken: u32,
    pub rpr: Rpr,
}

/// Team-level totals
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub score: u32,
    pub breaks: u32,
    pub holds: u32,
}
