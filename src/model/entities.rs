//! Core entities shared by every tournament format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tournament ID type
pub type TournamentId = Uuid;
/// Team ID type
pub type TeamId = Uuid;
/// Player ID type
pub type PlayerId = Uuid;
/// Match ID type
pub type MatchId = Uuid;

/// Tournament format
///
/// `DoubleElimination` is declared for callers that store it, but no
/// handler is registered for it; dispatching on it fails with a
/// descriptive error instead of silently doing nothing.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TournamentFormat {
    SingleElimination,
    DoubleElimination,
    RoundRobin,
    Swiss,
    Barrage,
}

impl fmt::Display for TournamentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::SingleElimination => "single-elimination",
            Self::DoubleElimination => "double-elimination",
            Self::RoundRobin => "round-robin",
            Self::Swiss => "swiss",
            Self::Barrage => "barrage",
        };
        write!(f, "{repr}")
    }
}

/// Game format, which fixes how many players a team fields.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameFormat {
    Singles,
    Doubles,
    Triples,
}

impl GameFormat {
    /// Required player count per team for this game format.
    pub fn players_per_team(&self) -> usize {
        match self {
            Self::Singles => 1,
            Self::Doubles => 2,
            Self::Triples => 3,
        }
    }
}

impl fmt::Display for GameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Singles => "singles",
            Self::Doubles => "doubles",
            Self::Triples => "triples",
        };
        write!(f, "{repr}")
    }
}

/// Tournament configuration snapshot.
///
/// Immutable for the duration of bracket computation; progression and
/// standings are functions of (tournament, teams, match history) only.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub format: TournamentFormat,
    pub game_format: GameFormat,
    /// Points needed to win a match.
    pub max_points: u32,
    /// Short-form matches play to fewer points and finish faster.
    pub short_form: bool,
    pub max_players: usize,
}

impl Tournament {
    /// Create a tournament with default match settings (13 points, long form).
    pub fn new(name: impl Into<String>, format: TournamentFormat, game_format: GameFormat) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            format,
            game_format,
            max_points: 13,
            short_form: false,
            max_players: 64,
        }
    }

    /// Override the points needed to win a match.
    pub fn with_max_points(mut self, max_points: u32) -> Self {
        self.max_points = max_points;
        self
    }

    /// Mark this tournament as short form.
    pub fn short_form(mut self) -> Self {
        self.short_form = true;
        self
    }

    /// Override the registration cap.
    pub fn with_max_players(mut self, max_players: usize) -> Self {
        self.max_players = max_players;
        self
    }
}

/// A registered player.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Rating from an external ranking system, if the player has one.
    pub rating: Option<u32>,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            rating: None,
        }
    }

    pub fn rated(name: impl Into<String>, rating: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            rating: Some(rating),
        }
    }
}

/// Aggregate team statistics carried over from prior events. Advisory
/// only; standings are always recomputed from the current match history.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TeamStats {
    pub wins: u32,
    pub losses: u32,
    pub points_scored: u32,
    pub points_conceded: u32,
}

/// A competing team.
///
/// A bye team (`is_bye`) is a synthetic placeholder for "no opponent".
/// It never appears in standings and is never returned by team
/// extraction helpers.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub players: Vec<Player>,
    /// Home club, used by club-avoidance seeding.
    pub club: Option<String>,
    pub stats: Option<TeamStats>,
    #[serde(default)]
    pub is_bye: bool,
}

impl Team {
    pub fn new(name: impl Into<String>, players: Vec<Player>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            players,
            club: None,
            stats: None,
            is_bye: false,
        }
    }

    /// Attach a home club.
    pub fn with_club(mut self, club: impl Into<String>) -> Self {
        self.club = Some(club.into());
        self
    }

    /// Synthetic bye placeholder. Not a participant: no players, no club,
    /// excluded from standings.
    pub fn bye(position: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("Bye {position}"),
            players: Vec::new(),
            club: None,
            stats: None,
            is_bye: true,
        }
    }

    /// Mean rating across rated players, `None` when nobody is rated.
    pub fn average_rating(&self) -> Option<f64> {
        let ratings: Vec<u32> = self.players.iter().filter_map(|p| p.rating).collect();
        if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<u32>() as f64 / ratings.len() as f64)
        }
    }
}

/// Match lifecycle status
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

/// Winner/loser bracket tag for formats that need both sides.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BracketSide {
    #[default]
    Winner,
    Loser,
}

/// Running point totals for a match.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MatchScore {
    pub team1_points: u32,
    pub team2_points: u32,
    pub is_complete: bool,
}

/// One scoring sub-unit within a match. Opaque to the engine beyond
/// counting; the scoring collaborator owns its meaning.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct End {
    pub winner: Option<TeamId>,
    pub points: u32,
}

/// A scheduled or played match.
///
/// Later-round slots in knockout brackets start out empty (`None`) and
/// are filled as feeder matches resolve. The (round, position) pair is
/// the arena key progression uses to locate a match.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    /// 1-based round number, non-decreasing in generation order.
    pub round: u32,
    /// 1-based slot within the round.
    pub position: u32,
    /// Display label, format specific ("Semifinal", "Group A", ...).
    pub round_name: String,
    pub bracket: BracketSide,
    pub team1: Option<Team>,
    pub team2: Option<Team>,
    pub score: MatchScore,
    pub status: MatchStatus,
    pub winner: Option<TeamId>,
    pub ends: Vec<End>,
}

impl Match {
    /// Completed or cancelled; nothing further can happen to it.
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, MatchStatus::Completed | MatchStatus::Cancelled)
    }

    /// A completed match with level scores and no winner.
    pub fn is_draw(&self) -> bool {
        self.status == MatchStatus::Completed
            && self.winner.is_none()
            && self.score.team1_points == self.score.team2_points
    }

    /// True when a bye placeholder occupies one of the slots.
    pub fn is_bye(&self) -> bool {
        self.slot_teams().any(|t| t.is_bye)
    }

    fn slot_teams(&self) -> impl Iterator<Item = &Team> {
        self.team1.iter().chain(self.team2.iter())
    }

    /// Filled, non-bye team slots.
    pub fn real_teams(&self) -> impl Iterator<Item = &Team> {
        self.slot_teams().filter(|t| !t.is_bye)
    }

    pub fn involves(&self, team_id: TeamId) -> bool {
        self.slot_teams().any(|t| t.id == team_id)
    }

    /// The other team in the match, if both slots are filled.
    pub fn opponent_of(&self, team_id: TeamId) -> Option<&Team> {
        match (&self.team1, &self.team2) {
            (Some(a), Some(b)) if a.id == team_id => Some(b),
            (Some(a), Some(b)) if b.id == team_id => Some(a),
            _ => None,
        }
    }

    /// Points the given team scored in this match.
    pub fn points_for(&self, team_id: TeamId) -> Option<u32> {
        if self.team1.as_ref().is_some_and(|t| t.id == team_id) {
            Some(self.score.team1_points)
        } else if self.team2.as_ref().is_some_and(|t| t.id == team_id) {
            Some(self.score.team2_points)
        } else {
            None
        }
    }

    /// Points scored against the given team in this match.
    pub fn points_against(&self, team_id: TeamId) -> Option<u32> {
        if self.team1.as_ref().is_some_and(|t| t.id == team_id) {
            Some(self.score.team2_points)
        } else if self.team2.as_ref().is_some_and(|t| t.id == team_id) {
            Some(self.score.team1_points)
        } else {
            None
        }
    }

    /// The losing team's id, when the match has a winner and both slots.
    pub fn loser_id(&self) -> Option<TeamId> {
        let winner = self.winner?;
        self.opponent_of(winner).map(|t| t.id)
    }
}

/// One slot in the visual bracket, distinct from the match data it may
/// reference. Regenerated wholesale whenever matches change, never
/// mutated in place.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BracketNode {
    pub round: u32,
    pub position: u32,
    pub bracket: BracketSide,
    pub match_id: Option<MatchId>,
    /// Matches feeding into this slot (the two children in a knockout).
    pub source_match_ids: Vec<MatchId>,
    /// Position in the following round this slot's winner feeds.
    pub feeds_position: Option<u32>,
}

/// One team's row in the standings.
///
/// `tie_breaker` is a single format-specific scalar kept for display and
/// debugging; actual tie-breaking runs a full comparator chain.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TeamRanking {
    /// 1-based, assigned after the sort.
    pub rank: u32,
    pub team: Team,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    /// Format-specific ranking points (3/1/0 in round robin, 2/1/0 in swiss).
    pub points: u32,
    pub points_scored: u32,
    pub points_conceded: u32,
    pub point_differential: i64,
    pub tie_breaker: f64,
}

/// Full standings snapshot: a total ordering of every team that has
/// appeared in any match, plus bookkeeping about the match list it was
/// computed from.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Standings {
    pub rankings: Vec<TeamRanking>,
    /// Names of the tie-break methods, in the order they apply.
    pub tie_break_methods: Vec<String>,
    pub total_matches: usize,
    pub completed_matches: usize,
    pub pending_matches: usize,
    pub updated_at: DateTime<Utc>,
}

impl Standings {
    /// Position of a team in the rankings, if present.
    pub fn rank_of(&self, team_id: TeamId) -> Option<u32> {
        self.rankings
            .iter()
            .find(|r| r.team.id == team_id)
            .map(|r| r.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn singles_team(name: &str, rating: Option<u32>) -> Team {
        let player = match rating {
            Some(r) => Player::rated(name, r),
            None => Player::new(name),
        };
        Team::new(name, vec![player])
    }

    #[test]
    fn test_players_per_team() {
        assert_eq!(GameFormat::Singles.players_per_team(), 1);
        assert_eq!(GameFormat::Doubles.players_per_team(), 2);
        assert_eq!(GameFormat::Triples.players_per_team(), 3);
    }

    #[test]
    fn test_average_rating_ignores_unrated_players() {
        let mut team = Team::new(
            "Mixed",
            vec![Player::rated("a", 1200), Player::new("b"), Player::rated("c", 1000)],
        );
        assert_eq!(team.average_rating(), Some(1100.0));

        team.players = vec![Player::new("d")];
        assert_eq!(team.average_rating(), None);
    }

    #[test]
    fn test_bye_team_is_not_a_participant() {
        let bye = Team::bye(3);
        assert!(bye.is_bye);
        assert!(bye.players.is_empty());
        assert_eq!(bye.average_rating(), None);
    }

    #[test]
    fn test_match_point_helpers() {
        let a = singles_team("a", None);
        let b = singles_team("b", None);
        let m = Match {
            id: Uuid::new_v4(),
            tournament_id: Uuid::new_v4(),
            round: 1,
            position: 1,
            round_name: "Round 1".to_string(),
            bracket: BracketSide::Winner,
            team1: Some(a.clone()),
            team2: Some(b.clone()),
            score: MatchScore {
                team1_points: 13,
                team2_points: 7,
                is_complete: true,
            },
            status: MatchStatus::Completed,
            winner: Some(a.id),
            ends: Vec::new(),
        };

        assert_eq!(m.points_for(a.id), Some(13));
        assert_eq!(m.points_against(a.id), Some(7));
        assert_eq!(m.points_for(b.id), Some(7));
        assert_eq!(m.opponent_of(a.id).unwrap().id, b.id);
        assert_eq!(m.loser_id(), Some(b.id));
        assert!(!m.is_draw());
        assert!(m.is_resolved());
    }

    #[test]
    fn test_draw_detection() {
        let a = singles_team("a", None);
        let b = singles_team("b", None);
        let m = Match {
            id: Uuid::new_v4(),
            tournament_id: Uuid::new_v4(),
            round: 1,
            position: 1,
            round_name: "Round 1".to_string(),
            bracket: BracketSide::Winner,
            team1: Some(a),
            team2: Some(b),
            score: MatchScore {
                team1_points: 10,
                team2_points: 10,
                is_complete: true,
            },
            status: MatchStatus::Completed,
            winner: None,
            ends: Vec::new(),
        };
        assert!(m.is_draw());
    }

    #[test]
    fn test_tournament_builders() {
        let t = Tournament::new("Spring Open", TournamentFormat::Swiss, GameFormat::Doubles)
            .with_max_points(11)
            .short_form()
            .with_max_players(32);
        assert_eq!(t.max_points, 11);
        assert!(t.short_form);
        assert_eq!(t.max_players, 32);
    }

    #[test]
    fn test_format_serde_round_trip() {
        let json = serde_json::to_string(&TournamentFormat::SingleElimination).unwrap();
        assert_eq!(json, "\"single-elimination\"");
        let back: TournamentFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TournamentFormat::SingleElimination);
    }
}
