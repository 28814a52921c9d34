//! The format-handler contract and its four implementations.
//!
//! Every tournament format implements [`FormatHandler`]: build the initial
//! bracket, advance on a completed match, compute standings, test
//! completion. The concrete handlers live in their own modules and are
//! dispatched through the [`Handler`] enum with `enum_dispatch`, so a
//! caller can switch formats without touching progression logic.

pub mod barrage;
pub mod round_robin;
pub mod single_elimination;
pub mod swiss;

pub use barrage::BarrageHandler;
pub use round_robin::RoundRobinHandler;
pub use single_elimination::SingleEliminationHandler;
pub use swiss::SwissSystemHandler;

use chrono::{DateTime, Utc};
use enum_dispatch::enum_dispatch;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{
    BracketNode, BracketSide, Match, MatchId, MatchScore, MatchStatus, Standings, Team, TeamId,
    TeamRanking, Tournament, TournamentFormat,
};
use crate::seeding::SeedingOptions;

/// Errors raised by bracket generation and progression.
#[derive(Debug, Error)]
pub enum BracketError {
    #[error("unsupported tournament format: {0}")]
    UnsupportedFormat(TournamentFormat),

    #[error("invalid tournament configuration: {}", .violations.join("; "))]
    InvalidConfiguration { violations: Vec<String> },

    #[error("match {0} has not been completed")]
    MatchNotCompleted(MatchId),

    #[error("completed match {0} has no winner")]
    MissingWinner(MatchId),

    #[error("team {0} does not belong to this bracket")]
    UnknownTeam(TeamId),

    #[error("no bracket slot at round {round}, position {position}")]
    MissingSlot { round: u32, position: u32 },

    #[error("both slots at round {round}, position {position} are already taken")]
    SlotsOccupied { round: u32, position: u32 },
}

pub type BracketResult<T> = Result<T, BracketError>;

/// Per-format team-count and shape constraints, checked before any match
/// is constructed.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FormatConstraints {
    pub min_teams: usize,
    pub max_teams: usize,
    pub allows_odd_team_count: bool,
    pub supports_byes: bool,
    pub max_rounds: u32,
}

impl FormatConstraints {
    /// Collect every team-count violation, not just the first.
    pub fn validate_team_count(&self, team_count: usize) -> Vec<String> {
        let mut violations = Vec::new();
        if team_count < self.min_teams {
            violations.push(format!(
                "team count {team_count} is below the format minimum of {}",
                self.min_teams
            ));
        }
        if team_count > self.max_teams {
            violations.push(format!(
                "team count {team_count} exceeds the format maximum of {}",
                self.max_teams
            ));
        }
        if team_count % 2 == 1 && !self.allows_odd_team_count {
            violations.push(format!("this format does not support an odd team count ({team_count})"));
        }
        violations
    }
}

/// Options for bracket generation, merged over defaults by the generator.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub seeding: SeedingOptions,
    /// Permit synthetic bye opponents for uneven fields.
    pub allow_byes: bool,
    /// Byes reward the top seeds; otherwise they land on the bottom seeds.
    pub byes_at_top: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            seeding: SeedingOptions::default(),
            allow_byes: true,
            byes_at_top: true,
        }
    }
}

/// Shape summary of a generated bracket.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BracketMetadata {
    pub format: TournamentFormat,
    pub team_count: usize,
    pub round_count: u32,
    pub match_count: usize,
    pub bye_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// Everything `generate_bracket` hands back: the initial match set, the
/// visualization nodes, and the seeding that produced them.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GeneratedBracket {
    pub matches: Vec<Match>,
    pub bracket_structure: Vec<BracketNode>,
    pub metadata: BracketMetadata,
    pub seeded_teams: Vec<Team>,
    /// Synthetic placeholders created for uneven fields; advisory.
    pub bye_teams: Vec<Team>,
}

/// Delta produced by one progression step.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProgressionUpdate {
    /// Existing matches whose slots changed.
    pub affected_matches: Vec<Match>,
    /// Matches that did not exist before this step.
    pub new_matches: Vec<Match>,
    pub updated_bracket_structure: Vec<BracketNode>,
    pub is_complete: bool,
    pub final_rankings: Option<Vec<TeamRanking>>,
}

impl ProgressionUpdate {
    /// A step that changed nothing (already applied, or still waiting on
    /// other matches).
    pub(crate) fn noop(structure: Vec<BracketNode>) -> Self {
        Self {
            affected_matches: Vec::new(),
            new_matches: Vec::new(),
            updated_bracket_structure: structure,
            is_complete: false,
            final_rankings: None,
        }
    }
}

/// The polymorphic contract every tournament format implements.
#[enum_dispatch]
pub trait FormatHandler {
    /// Declared team-count and shape constraints for this format.
    fn constraints(&self) -> FormatConstraints;

    /// Build the initial bracket from a seeded field. Must reject inputs
    /// violating [`FormatConstraints`] before constructing any match.
    fn generate_bracket(
        &self,
        tournament: &Tournament,
        seeded_teams: &[Team],
        options: &GenerateOptions,
        rng: &mut dyn RngCore,
    ) -> BracketResult<GeneratedBracket>;

    /// Advance the bracket after `completed` transitioned to completed.
    /// Idempotent over `all_matches`: a history that already reflects the
    /// completion produces no new matches.
    fn update_progression(
        &self,
        completed: &Match,
        tournament: &Tournament,
        all_matches: &[Match],
        rng: &mut dyn RngCore,
    ) -> BracketResult<ProgressionUpdate>;

    /// Standings as a pure function of match history. Includes every
    /// non-bye team that appears in any match; teams with no resolved
    /// matches rank last.
    fn calculate_standings(&self, tournament: &Tournament, matches: &[Match]) -> Standings;

    /// Whether the tournament is over.
    fn is_complete(&self, tournament: &Tournament, matches: &[Match]) -> bool;
}

/// Concrete format handlers behind one dispatchable type.
#[enum_dispatch(FormatHandler)]
#[derive(Clone, Debug)]
pub enum Handler {
    SingleElimination(SingleEliminationHandler),
    RoundRobin(RoundRobinHandler),
    Swiss(SwissSystemHandler),
    Barrage(BarrageHandler),
}

// ---------------------------------------------------------------------------
// Shared construction helpers

/// A fresh scheduled match. Later-round knockout slots pass `None` teams.
pub(crate) fn new_match(
    tournament: &Tournament,
    round: u32,
    position: u32,
    round_name: impl Into<String>,
    team1: Option<Team>,
    team2: Option<Team>,
) -> Match {
    Match {
        id: Uuid::new_v4(),
        tournament_id: tournament.id,
        round,
        position,
        round_name: round_name.into(),
        bracket: BracketSide::Winner,
        team1,
        team2,
        score: MatchScore::default(),
        status: MatchStatus::Scheduled,
        winner: None,
        ends: Vec::new(),
    }
}

/// A bye: created already completed, the real team awarded the
/// tournament's max points against the placeholder.
pub(crate) fn bye_match(
    tournament: &Tournament,
    round: u32,
    position: u32,
    round_name: impl Into<String>,
    team: Team,
    bye: Team,
) -> Match {
    let winner = team.id;
    Match {
        id: Uuid::new_v4(),
        tournament_id: tournament.id,
        round,
        position,
        round_name: round_name.into(),
        bracket: BracketSide::Winner,
        team1: Some(team),
        team2: Some(bye),
        score: MatchScore {
            team1_points: tournament.max_points,
            team2_points: 0,
            is_complete: true,
        },
        status: MatchStatus::Completed,
        winner: Some(winner),
        ends: Vec::new(),
    }
}

/// Display label for a knockout round counted from the final backwards.
pub(crate) fn knockout_round_name(round: u32, total_rounds: u32) -> String {
    match total_rounds.saturating_sub(round) {
        0 => "Final".to_string(),
        1 => "Semifinal".to_string(),
        2 => "Quarterfinal".to_string(),
        n => format!("Round of {}", 1u32 << (n + 1)),
    }
}

/// Visualization nodes for formats whose rounds do not feed each other
/// positionally (swiss, barrage): one node per match, no links.
pub(crate) fn flat_nodes(matches: &[Match]) -> Vec<BracketNode> {
    let mut nodes: Vec<BracketNode> = matches
        .iter()
        .map(|m| BracketNode {
            round: m.round,
            position: m.position,
            bracket: m.bracket,
            match_id: Some(m.id),
            source_match_ids: Vec::new(),
            feeds_position: None,
        })
        .collect();
    nodes.sort_by_key(|n| (n.bracket == BracketSide::Loser, n.round, n.position));
    nodes
}

/// Rebuild the visualization nodes for a knockout-shaped match list.
///
/// Child/parent links are only emitted between rounds with a strict
/// halving relationship, which is what distinguishes a knockout feed from
/// unrelated stages sharing round numbers.
pub(crate) fn bracket_nodes(matches: &[Match]) -> Vec<BracketNode> {
    let halves = |round: u32, bracket: BracketSide| -> bool {
        let prev = matches
            .iter()
            .filter(|m| m.bracket == bracket && m.round + 1 == round)
            .count();
        let cur = matches
            .iter()
            .filter(|m| m.bracket == bracket && m.round == round)
            .count();
        prev > 0 && prev == cur * 2
    };

    let mut nodes: Vec<BracketNode> = matches
        .iter()
        .map(|m| {
            let source_match_ids = if halves(m.round, m.bracket) {
                matches
                    .iter()
                    .filter(|c| {
                        c.bracket == m.bracket
                            && c.round + 1 == m.round
                            && (c.position + 1) / 2 == m.position
                    })
                    .map(|c| c.id)
                    .collect()
            } else {
                Vec::new()
            };
            let feeds_position = (halves(m.round + 1, m.bracket)
                && matches.iter().any(|p| {
                    p.bracket == m.bracket
                        && p.round == m.round + 1
                        && p.position == (m.position + 1) / 2
                }))
            .then_some((m.position + 1) / 2);
            BracketNode {
                round: m.round,
                position: m.position,
                bracket: m.bracket,
                match_id: Some(m.id),
                source_match_ids,
                feeds_position,
            }
        })
        .collect();
    nodes.sort_by_key(|n| (n.bracket == BracketSide::Loser, n.round, n.position));
    nodes
}

// ---------------------------------------------------------------------------
// Shared progression / standings helpers

/// Check that a match handed to `update_progression` really is completed
/// and carries a usable result. Returns the winner, or `None` for a draw
/// in formats that tolerate them.
pub(crate) fn ensure_progressable(completed: &Match, allow_draw: bool) -> BracketResult<Option<TeamId>> {
    if completed.status != MatchStatus::Completed {
        return Err(BracketError::MatchNotCompleted(completed.id));
    }
    match completed.winner {
        Some(winner) if completed.involves(winner) => Ok(Some(winner)),
        Some(winner) => Err(BracketError::UnknownTeam(winner)),
        None if allow_draw && completed.is_draw() => Ok(None),
        None => Err(BracketError::MissingWinner(completed.id)),
    }
}

/// How one resolved match went for one team.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum MatchOutcome {
    Win,
    Loss,
    Draw,
}

/// Accumulated record of one team over a match history.
#[derive(Clone, Debug)]
pub(crate) struct TeamRecord {
    pub team: Team,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub points_scored: u32,
    pub points_conceded: u32,
    /// Highest round the team has been placed into.
    pub furthest_round: u32,
    /// Completed matches counted into this record.
    pub played: u32,
    pub had_bye: bool,
    /// Real opponents faced in completed matches, with the outcome.
    pub opponents: Vec<(TeamId, MatchOutcome)>,
}

impl TeamRecord {
    fn new(team: Team) -> Self {
        Self {
            team,
            wins: 0,
            losses: 0,
            draws: 0,
            points_scored: 0,
            points_conceded: 0,
            furthest_round: 0,
            played: 0,
            had_bye: false,
            opponents: Vec::new(),
        }
    }

    pub fn point_differential(&self) -> i64 {
        self.points_scored as i64 - self.points_conceded as i64
    }
}

/// Tally a record for every non-bye team appearing in any match.
///
/// Keyed and ordered by team id, so the result is independent of the
/// order of the input match list.
pub(crate) fn tally_records(matches: &[Match]) -> BTreeMap<TeamId, TeamRecord> {
    let mut records: BTreeMap<TeamId, TeamRecord> = BTreeMap::new();

    for m in matches {
        for team in m.real_teams() {
            let record = records
                .entry(team.id)
                .or_insert_with(|| TeamRecord::new(team.clone()));
            record.furthest_round = record.furthest_round.max(m.round);
        }
    }

    let mut completed: Vec<&Match> = matches
        .iter()
        .filter(|m| m.status == MatchStatus::Completed)
        .collect();
    // Order-independence: fold completed matches in a canonical order.
    completed.sort_by_key(|m| (m.round, m.position, m.id));

    for m in completed {
        for team in m.real_teams() {
            let team_id = team.id;
            let scored = m.points_for(team_id).unwrap_or(0);
            let conceded = m.points_against(team_id).unwrap_or(0);
            let opponent = m.opponent_of(team_id);
            let outcome = if m.is_draw() {
                MatchOutcome::Draw
            } else if m.winner == Some(team_id) {
                MatchOutcome::Win
            } else {
                MatchOutcome::Loss
            };

            // Inserted by the first pass over the same match list.
            let Some(record) = records.get_mut(&team_id) else {
                continue;
            };
            record.played += 1;
            record.points_scored += scored;
            record.points_conceded += conceded;
            match outcome {
                MatchOutcome::Win => record.wins += 1,
                MatchOutcome::Loss => record.losses += 1,
                MatchOutcome::Draw => record.draws += 1,
            }
            match opponent {
                Some(opp) if opp.is_bye => record.had_bye = true,
                Some(opp) => record.opponents.push((opp.id, outcome)),
                None => {}
            }
        }
    }

    records
}

/// Assign 1-based ranks after the sort and wrap everything up in a
/// standings snapshot.
pub(crate) fn finalize_standings(
    mut rankings: Vec<TeamRanking>,
    tie_break_methods: &[&str],
    matches: &[Match],
) -> Standings {
    for (idx, ranking) in rankings.iter_mut().enumerate() {
        ranking.rank = idx as u32 + 1;
    }
    Standings {
        rankings,
        tie_break_methods: tie_break_methods.iter().map(|s| s.to_string()).collect(),
        total_matches: matches.len(),
        completed_matches: matches
            .iter()
            .filter(|m| m.status == MatchStatus::Completed)
            .count(),
        pending_matches: matches.iter().filter(|m| !m.is_resolved()).count(),
        updated_at: Utc::now(),
    }
}

/// Final comparator link: a deterministic, arbitrary total order so two
/// otherwise-identical records always sort the same way.
pub(crate) fn stable_team_order(a: &Team, b: &Team) -> std::cmp::Ordering {
    a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
}
