//! Shared tournament data model.
//!
//! Every type in here is a plain value: the engine consumes read-only
//! snapshots of these and produces freshly constructed ones. Nothing in
//! this module performs I/O or holds hidden state.

pub mod entities;

pub use entities::{
    BracketNode, BracketSide, End, GameFormat, Match, MatchId, MatchScore, MatchStatus, Player,
    PlayerId, Standings, Team, TeamId, TeamRanking, TeamStats, Tournament, TournamentFormat,
    TournamentId,
};
