//! Round robin: everyone plays everyone.
//!
//! Small fields get every pairing up front, all tagged round 1 so the
//! whole schedule is playable immediately. Larger fields are split into
//! groups of about six; once every group match resolves, the top two of
//! each group seed a knockout playoff.

use rand::RngCore;
use std::collections::BTreeMap;

use super::{
    BracketError, BracketMetadata, BracketResult, FormatConstraints, FormatHandler,
    GenerateOptions, GeneratedBracket, MatchOutcome, ProgressionUpdate, bracket_nodes, bye_match,
    ensure_progressable, finalize_standings, knockout_round_name, new_match, stable_team_order,
    tally_records,
};
use crate::model::{Match, Standings, Team, TeamId, TeamRanking, Tournament};

/// Match points: win 3, draw 1, loss 0. Draws are rare under
/// play-to-max-points scoring but still legal input.
const POINTS_PER_WIN: u32 = 3;
const POINTS_PER_DRAW: u32 = 1;

/// Fields larger than this split into groups.
const MAX_DIRECT_FIELD: usize = 12;
const TARGET_GROUP_SIZE: usize = 6;
const MAX_QUALIFIERS: usize = 8;

#[derive(Clone, Copy, Debug, Default)]
pub struct RoundRobinHandler;

type HeadToHead = BTreeMap<TeamId, Vec<(TeamId, MatchOutcome)>>;

impl RoundRobinHandler {
    fn is_grouped(matches: &[Match]) -> bool {
        matches.iter().any(|m| m.round_name.starts_with("Group "))
    }

    fn group_names(matches: &[Match]) -> Vec<String> {
        let mut names: Vec<String> = matches
            .iter()
            .filter(|m| m.round_name.starts_with("Group "))
            .map(|m| m.round_name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn ranking_points(wins: u32, draws: u32) -> u32 {
        wins * POINTS_PER_WIN + draws * POINTS_PER_DRAW
    }

    /// Net head-to-head result of `a` against `b` over completed matches.
    fn direct_result(h2h: &HeadToHead, a: TeamId, b: TeamId) -> i32 {
        h2h.get(&a)
            .map(|opponents| {
                opponents
                    .iter()
                    .filter(|(opp, _)| *opp == b)
                    .map(|(_, outcome)| match outcome {
                        MatchOutcome::Win => 1,
                        MatchOutcome::Loss => -1,
                        MatchOutcome::Draw => 0,
                    })
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Sorted rankings over the given matches: points, point differential,
    /// head-to-head, points scored, points conceded (fewer first).
    fn build_rankings(&self, matches: &[Match]) -> Vec<TeamRanking> {
        let records = tally_records(matches);
        let h2h: HeadToHead = records
            .iter()
            .map(|(id, r)| (*id, r.opponents.clone()))
            .collect();

        let mut rankings: Vec<TeamRanking> = records
            .into_values()
            .map(|r| TeamRanking {
                rank: 0,
                wins: r.wins,
                losses: r.losses,
                draws: r.draws,
                points: Self::ranking_points(r.wins, r.draws),
                points_scored: r.points_scored,
                points_conceded: r.points_conceded,
                point_differential: r.point_differential(),
                tie_breaker: r.point_differential() as f64,
                team: r.team,
            })
            .collect();
        rankings.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.point_differential.cmp(&a.point_differential))
                .then_with(|| {
                    Self::direct_result(&h2h, b.team.id, a.team.id)
                        .cmp(&Self::direct_result(&h2h, a.team.id, b.team.id))
                })
                .then_with(|| b.points_scored.cmp(&a.points_scored))
                .then_with(|| a.points_conceded.cmp(&b.points_conceded))
                .then_with(|| stable_team_order(&a.team, &b.team))
        });
        rankings
    }

    /// All pairings within one set of teams, appended from `position`.
    fn pairings(
        tournament: &Tournament,
        teams: &[Team],
        round_name: &str,
        position: &mut u32,
    ) -> Vec<Match> {
        let mut matches = Vec::with_capacity(teams.len() * (teams.len().saturating_sub(1)) / 2);
        for i in 0..teams.len() {
            for j in i + 1..teams.len() {
                matches.push(new_match(
                    tournament,
                    1,
                    *position,
                    round_name,
                    Some(teams[i].clone()),
                    Some(teams[j].clone()),
                ));
                *position += 1;
            }
        }
        matches
    }

    /// Serpentine split of the seeded field into `group_count` groups, so
    /// each group carries comparable seed strength.
    fn split_into_groups(seeded: &[Team], group_count: usize) -> Vec<Vec<Team>> {
        let mut groups: Vec<Vec<Team>> = vec![Vec::new(); group_count];
        for (idx, team) in seeded.iter().enumerate() {
            let lap = idx / group_count;
            let offset = idx % group_count;
            let g = if lap % 2 == 0 { offset } else { group_count - 1 - offset };
            groups[g].push(team.clone());
        }
        groups
    }

    fn playoff_round_count(group_count: usize) -> u32 {
        let qualifiers = (group_count * 2).min(MAX_QUALIFIERS);
        qualifiers.next_power_of_two().ilog2()
    }

    /// Build the knockout playoff once every group match is resolved.
    /// Group winners are seeded ahead of runners-up.
    fn seed_playoff(&self, tournament: &Tournament, all_matches: &[Match]) -> Vec<Match> {
        let group_names = Self::group_names(all_matches);
        let mut winners = Vec::new();
        let mut runners_up = Vec::new();
        for name in &group_names {
            let group_matches: Vec<Match> = all_matches
                .iter()
                .filter(|m| &m.round_name == name)
                .cloned()
                .collect();
            let table = self.build_rankings(&group_matches);
            if let Some(first) = table.first() {
                winners.push(first.team.clone());
            }
            if let Some(second) = table.get(1) {
                runners_up.push(second.team.clone());
            }
        }

        let mut qualifiers = winners;
        qualifiers.extend(runners_up);
        qualifiers.truncate(MAX_QUALIFIERS);

        let bracket_size = qualifiers.len().next_power_of_two();
        let playoff_rounds = bracket_size.ilog2();
        let bye_teams: Vec<Team> = (1..=bracket_size - qualifiers.len()).map(Team::bye).collect();
        let mut slots = qualifiers;
        slots.extend(bye_teams);

        let first_round = 2u32;
        let first_name = knockout_round_name(1, playoff_rounds);
        let mut playoff: Vec<Match> = (0..bracket_size / 2)
            .map(|k| {
                let position = k as u32 + 1;
                let team1 = slots[k].clone();
                let team2 = slots[bracket_size - 1 - k].clone();
                if team2.is_bye {
                    bye_match(tournament, first_round, position, first_name.clone(), team1, team2)
                } else {
                    new_match(
                        tournament,
                        first_round,
                        position,
                        first_name.clone(),
                        Some(team1),
                        Some(team2),
                    )
                }
            })
            .collect();

        for relative in 2..=playoff_rounds {
            let name = knockout_round_name(relative, playoff_rounds);
            for position in 1..=(bracket_size as u32 >> relative) {
                playoff.push(new_match(tournament, first_round + relative - 1, position, name.clone(), None, None));
            }
        }

        // Bye winners go straight into the next playoff round.
        let byes: Vec<(u32, Team)> = playoff
            .iter()
            .filter(|m| m.round == first_round && m.is_bye())
            .filter_map(|m| m.team1.clone().map(|t| (m.position, t)))
            .collect();
        for (position, team) in byes {
            let next_position = (position + 1) / 2;
            if let Some(next) = playoff
                .iter_mut()
                .find(|m| m.round == first_round + 1 && m.position == next_position)
            {
                if !next.involves(team.id) {
                    if position % 2 == 1 {
                        next.team1 = Some(team);
                    } else {
                        next.team2 = Some(team);
                    }
                }
            }
        }

        log::info!(
            "group stage finished; seeded a {}-team playoff over {playoff_rounds} rounds",
            slots_real_count(&playoff)
        );
        playoff
    }

    fn knockout_advance(
        &self,
        completed: &Match,
        winner_id: TeamId,
        all_matches: &[Match],
    ) -> BracketResult<ProgressionUpdate> {
        let winner_team = completed
            .real_teams()
            .find(|t| t.id == winner_id)
            .cloned()
            .ok_or(BracketError::UnknownTeam(winner_id))?;
        let next_round = completed.round + 1;
        let next_position = (completed.position + 1) / 2;
        let mut updated: Vec<Match> = all_matches.to_vec();
        let next = updated
            .iter_mut()
            .find(|m| m.round == next_round && m.position == next_position)
            .ok_or(BracketError::MissingSlot {
                round: next_round,
                position: next_position,
            })?;
        if next.involves(winner_id) {
            return Ok(ProgressionUpdate::noop(bracket_nodes(all_matches)));
        }
        if completed.position % 2 == 1 && next.team1.is_none() {
            next.team1 = Some(winner_team);
        } else if next.team2.is_none() {
            next.team2 = Some(winner_team);
        } else if next.team1.is_none() {
            next.team1 = Some(winner_team);
        } else {
            return Err(BracketError::SlotsOccupied {
                round: next_round,
                position: next_position,
            });
        }
        let affected = next.clone();
        Ok(ProgressionUpdate {
            affected_matches: vec![affected],
            new_matches: Vec::new(),
            updated_bracket_structure: bracket_nodes(&updated),
            is_complete: false,
            final_rankings: None,
        })
    }
}

fn slots_real_count(playoff: &[Match]) -> usize {
    playoff
        .iter()
        .flat_map(|m| m.real_teams())
        .map(|t| t.id)
        .collect::<std::collections::BTreeSet<_>>()
        .len()
}

impl FormatHandler for RoundRobinHandler {
    fn constraints(&self) -> FormatConstraints {
        FormatConstraints {
            min_teams: 3,
            max_teams: 24,
            allows_odd_team_count: true,
            supports_byes: true,
            max_rounds: 4,
        }
    }

    fn generate_bracket(
        &self,
        tournament: &Tournament,
        seeded_teams: &[Team],
        _options: &GenerateOptions,
        _rng: &mut dyn RngCore,
    ) -> BracketResult<GeneratedBracket> {
        let team_count = seeded_teams.len();
        let violations = self.constraints().validate_team_count(team_count);
        if !violations.is_empty() {
            return Err(BracketError::InvalidConfiguration { violations });
        }

        let mut position = 1u32;
        let (matches, round_count) = if team_count <= MAX_DIRECT_FIELD {
            let matches = Self::pairings(tournament, seeded_teams, "Round Robin", &mut position);
            (matches, 1)
        } else {
            let group_count = team_count.div_ceil(TARGET_GROUP_SIZE);
            let groups = Self::split_into_groups(seeded_teams, group_count);
            let mut matches = Vec::new();
            for (g, group) in groups.iter().enumerate() {
                let name = format!("Group {}", (b'A' + g as u8) as char);
                matches.extend(Self::pairings(tournament, group, &name, &mut position));
            }
            (matches, 1 + Self::playoff_round_count(group_count))
        };

        log::info!(
            "generated round-robin schedule: {} matches for {team_count} teams",
            matches.len()
        );

        let bracket_structure = bracket_nodes(&matches);
        Ok(GeneratedBracket {
            metadata: BracketMetadata {
                format: tournament.format,
                team_count,
                round_count,
                match_count: matches.len(),
                bye_count: 0,
                generated_at: chrono::Utc::now(),
            },
            matches,
            bracket_structure,
            seeded_teams: seeded_teams.to_vec(),
            bye_teams: Vec::new(),
        })
    }

    fn update_progression(
        &self,
        completed: &Match,
        tournament: &Tournament,
        all_matches: &[Match],
        _rng: &mut dyn RngCore,
    ) -> BracketResult<ProgressionUpdate> {
        let winner = ensure_progressable(completed, true)?;

        if Self::is_grouped(all_matches) {
            let group_stage_done = all_matches
                .iter()
                .filter(|m| m.round == 1)
                .all(Match::is_resolved);
            let playoff_exists = all_matches.iter().any(|m| m.round > 1);

            if completed.round > 1 {
                // Knockout playoff progression.
                let Some(winner_id) = winner else {
                    return Err(BracketError::MissingWinner(completed.id));
                };
                let last_round = all_matches.iter().map(|m| m.round).max().unwrap_or(0);
                if completed.round == last_round {
                    return Ok(ProgressionUpdate {
                        affected_matches: Vec::new(),
                        new_matches: Vec::new(),
                        updated_bracket_structure: bracket_nodes(all_matches),
                        is_complete: true,
                        final_rankings: Some(self.build_rankings(all_matches)),
                    });
                }
                return self.knockout_advance(completed, winner_id, all_matches);
            }

            if group_stage_done && !playoff_exists {
                let playoff = self.seed_playoff(tournament, all_matches);
                let mut combined = all_matches.to_vec();
                combined.extend(playoff.iter().cloned());
                return Ok(ProgressionUpdate {
                    affected_matches: Vec::new(),
                    updated_bracket_structure: bracket_nodes(&combined),
                    new_matches: playoff,
                    is_complete: false,
                    final_rankings: None,
                });
            }
            return Ok(ProgressionUpdate::noop(bracket_nodes(all_matches)));
        }

        // Direct field: the schedule never grows; the tournament ends when
        // everything is resolved.
        if !all_matches.is_empty() && all_matches.iter().all(Match::is_resolved) {
            return Ok(ProgressionUpdate {
                affected_matches: Vec::new(),
                new_matches: Vec::new(),
                updated_bracket_structure: bracket_nodes(all_matches),
                is_complete: true,
                final_rankings: Some(self.build_rankings(all_matches)),
            });
        }
        Ok(ProgressionUpdate::noop(bracket_nodes(all_matches)))
    }

    fn calculate_standings(&self, _tournament: &Tournament, matches: &[Match]) -> Standings {
        let rankings = self.build_rankings(matches);
        finalize_standings(
            rankings,
            &[
                "points",
                "point-differential",
                "head-to-head",
                "points-scored",
                "points-conceded",
            ],
            matches,
        )
    }

    fn is_complete(&self, _tournament: &Tournament, matches: &[Match]) -> bool {
        if matches.is_empty() || !matches.iter().all(Match::is_resolved) {
            return false;
        }
        // A grouped schedule is only over once the playoff has been seeded
        // (and, by the check above, fully resolved).
        !Self::is_grouped(matches) || matches.iter().any(|m| m.round > 1)
    }
}
