use thiserror::Error;

/// A player id that is not one of the four configured players.
///
/// Raised by the setup lookups and aborts a whole flow computation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown player id `{player_id}`")]
pub struct UnknownPlayerError {
    pub player_id: String,
}

impl UnknownPlayerError {
    pub fn new(player_id: &str) -> Self {
        Self {
            player_id: player_id.to_string(),
        }
    }
}

/// Reasons a flow computation is aborted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error(transparent)]
    UnknownPlayer(#[from] UnknownPlayerError),

    #[error("clip id `{0}` is reserved for the end-of-match entry")]
    ReservedClipId(String),
}

/// Invariant violations found by `MatchSetup::validate`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("team `{team_id}` has {count} players, expected 2")]
    TeamSize { team_id: String, count: usize },

    #[error("player id `{0}` is used more than once")]
    DuplicatePlayer(String),

    #[error("player `{player_id}` is listed on team `{team_id}` but has a different teamId")]
    TeamMismatch { player_id: String, team_id: String },

    #[error("both teams use the id `{0}`")]
    DuplicateTeamId(String),

    #[error("first server `{0}` is not a configured player")]
    UnknownFirstServer(String),

    #[error("first receiver `{0}` is not a configured player")]
    UnknownFirstReceiver(String),

    #[error("first server and first receiver are on the same team")]
    SameTeamServeReceive,

    #[error("target score must be at least 1")]
    ZeroTargetScore,
}
