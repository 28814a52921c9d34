//! Swiss system: a fixed number of rounds, each pairing teams on the
//! closest current score that have not met before.
//!
//! Rounds after the first only exist once the previous round is fully
//! resolved, so progression is the only place new matches appear. The
//! pairing search is greedy nearest-score with backtracking: first-fit on
//! the cheapest legal opponent, unwinding when a choice would leave an
//! unpairable tail, and only falling back to a rematch when no legal
//! pairing exists at all.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::collections::{BTreeMap, BTreeSet};

use super::{
    BracketError, BracketMetadata, BracketResult, FormatConstraints, FormatHandler,
    GenerateOptions, GeneratedBracket, MatchOutcome, ProgressionUpdate, bye_match,
    ensure_progressable, finalize_standings, flat_nodes, new_match, stable_team_order,
    tally_records,
};
use crate::model::{Match, Standings, Team, TeamId, TeamRanking, Tournament};

/// Match points: win 2, draw 1, loss 0. Byes count as wins.
const POINTS_PER_WIN: u32 = 2;
const POINTS_PER_DRAW: u32 = 1;

/// Score-difference weight in the pairing cost; dominates the jitter and
/// side-balance terms so nearest-score always wins.
const SCORE_GAP_WEIGHT: f64 = 1000.0;
const SIDE_BALANCE_BONUS: f64 = 0.5;

#[derive(Clone, Copy, Debug, Default)]
pub struct SwissSystemHandler;

/// Per-team pairing state for one round.
#[derive(Clone, Debug)]
struct Entry {
    team: Team,
    points: u32,
    buchholz: f64,
    sonneborn_berger: f64,
    wins: u32,
    losses: u32,
    draws: u32,
    points_scored: u32,
    points_conceded: u32,
    point_differential: i64,
    had_bye: bool,
    played: BTreeSet<TeamId>,
    as_team1: u32,
    as_team2: u32,
}

impl SwissSystemHandler {
    /// Scheduled round count for a field of the given size.
    pub fn round_count_for(team_count: usize) -> u32 {
        let ceil_log2 = team_count.next_power_of_two().ilog2();
        match team_count {
            0..=1 => 0,
            2..=8 => (team_count as u32 - 1).min(5),
            9..=16 => ceil_log2.max(5),
            17..=32 => ceil_log2.max(6),
            _ => ceil_log2.min(7),
        }
    }

    /// Tie-break entries for every team in the match history, sorted into
    /// pairing order: points, Buchholz, Sonneborn-Berger, all descending.
    fn build_entries(matches: &[Match]) -> Vec<Entry> {
        let records = tally_records(matches);
        let points: BTreeMap<TeamId, u32> = records
            .iter()
            .map(|(id, r)| (*id, r.wins * POINTS_PER_WIN + r.draws * POINTS_PER_DRAW))
            .collect();

        let mut entries: Vec<Entry> = records
            .into_values()
            .map(|r| {
                let buchholz: f64 = r
                    .opponents
                    .iter()
                    .map(|(opp, _)| points.get(opp).copied().unwrap_or(0) as f64)
                    .sum();
                let sonneborn_berger: f64 = r
                    .opponents
                    .iter()
                    .map(|(opp, outcome)| {
                        let opp_points = points.get(opp).copied().unwrap_or(0) as f64;
                        match outcome {
                            MatchOutcome::Win => opp_points,
                            MatchOutcome::Draw => opp_points / 2.0,
                            MatchOutcome::Loss => 0.0,
                        }
                    })
                    .sum();
                Entry {
                    points: points[&r.team.id],
                    buchholz,
                    sonneborn_berger,
                    wins: r.wins,
                    losses: r.losses,
                    draws: r.draws,
                    points_scored: r.points_scored,
                    points_conceded: r.points_conceded,
                    point_differential: r.point_differential(),
                    had_bye: r.had_bye,
                    played: r.opponents.iter().map(|(opp, _)| *opp).collect(),
                    as_team1: 0,
                    as_team2: 0,
                    team: r.team,
                }
            })
            .collect();

        for m in matches {
            if let Some(t1) = &m.team1 {
                if let Some(e) = entries.iter_mut().find(|e| e.team.id == t1.id) {
                    e.as_team1 += 1;
                }
            }
            if let Some(t2) = &m.team2 {
                if let Some(e) = entries.iter_mut().find(|e| e.team.id == t2.id) {
                    e.as_team2 += 1;
                }
            }
        }

        entries.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.buchholz.total_cmp(&a.buchholz))
                .then_with(|| b.sonneborn_berger.total_cmp(&a.sonneborn_berger))
                .then_with(|| stable_team_order(&a.team, &b.team))
        });
        entries
    }

    /// Cost of pairing `a` against `b`: score gap first, then a small
    /// random jitter, minus a bonus when their side counts complement.
    fn pairing_cost(a: &Entry, b: &Entry, rng: &mut dyn RngCore) -> f64 {
        let gap = (a.points as f64 - b.points as f64).abs() * SCORE_GAP_WEIGHT;
        let jitter: f64 = rng.random_range(0.0..1.0);
        let balance = if (a.as_team1 > a.as_team2 && b.as_team1 < b.as_team2)
            || (a.as_team1 < a.as_team2 && b.as_team1 > b.as_team2)
        {
            SIDE_BALANCE_BONUS
        } else {
            0.0
        };
        gap + jitter - balance
    }

    /// Pair an even pool, never repeating a previous pairing if any
    /// rematch-free pairing exists. Returns index pairs into `entries`.
    fn pair_entries(entries: &[Entry], rng: &mut dyn RngCore) -> Vec<(usize, usize)> {
        fn search(
            entries: &[Entry],
            remaining: &mut Vec<usize>,
            pairs: &mut Vec<(usize, usize)>,
            costs: &dyn Fn(usize, usize) -> f64,
            allow_rematch: bool,
        ) -> bool {
            if remaining.is_empty() {
                return true;
            }
            let first = remaining.remove(0);
            let mut candidates: Vec<usize> = (0..remaining.len())
                .filter(|&i| {
                    allow_rematch || !entries[first].played.contains(&entries[remaining[i]].team.id)
                })
                .collect();
            candidates.sort_by(|&i, &j| {
                costs(first, remaining[i]).total_cmp(&costs(first, remaining[j]))
            });
            for slot in candidates {
                let opponent = remaining.remove(slot);
                pairs.push((first, opponent));
                if search(entries, remaining, pairs, costs, allow_rematch) {
                    return true;
                }
                pairs.pop();
                remaining.insert(slot, opponent);
            }
            remaining.insert(0, first);
            false
        }

        // Costs are drawn once per candidate pair so backtracking does not
        // re-roll the jitter.
        let mut cost_table: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for i in 0..entries.len() {
            for j in i + 1..entries.len() {
                cost_table.insert((i, j), Self::pairing_cost(&entries[i], &entries[j], rng));
            }
        }
        let costs = |a: usize, b: usize| -> f64 {
            let key = if a < b { (a, b) } else { (b, a) };
            cost_table[&key]
        };

        let mut remaining: Vec<usize> = (0..entries.len()).collect();
        let mut pairs = Vec::with_capacity(entries.len() / 2);
        if !search(entries, &mut remaining, &mut pairs, &costs, false) {
            log::warn!("no rematch-free pairing exists for this round; allowing rematches");
            pairs.clear();
            let mut remaining: Vec<usize> = (0..entries.len()).collect();
            search(entries, &mut remaining, &mut pairs, &costs, true);
        }
        pairs
    }

    /// Build the matches of one round from an ordered pool.
    fn build_round(
        &self,
        tournament: &Tournament,
        mut entries: Vec<Entry>,
        round: u32,
        rng: &mut dyn RngCore,
    ) -> Vec<Match> {
        let round_name = format!("Round {round}");
        let mut matches = Vec::new();

        // An odd field sends the lowest-ranked team without a previous bye
        // to an automatic max-points win.
        let bye_entry = if entries.len() % 2 == 1 {
            let idx = entries
                .iter()
                .rposition(|e| !e.had_bye)
                .unwrap_or(entries.len() - 1);
            let entry = entries.remove(idx);
            if entry.had_bye {
                log::warn!(
                    "every team has already had a bye; '{}' receives a second one",
                    entry.team.name
                );
            }
            Some(entry)
        } else {
            None
        };

        let pairs = Self::pair_entries(&entries, rng);
        for (position, (i, j)) in pairs.iter().enumerate() {
            let (a, b) = (&entries[*i], &entries[*j]);
            // The team that has sat on side 1 less often takes side 1.
            let (team1, team2) = if a.as_team1 > b.as_team1 {
                (b.team.clone(), a.team.clone())
            } else {
                (a.team.clone(), b.team.clone())
            };
            matches.push(new_match(
                tournament,
                round,
                position as u32 + 1,
                round_name.clone(),
                Some(team1),
                Some(team2),
            ));
        }

        if let Some(entry) = bye_entry {
            let position = matches.len() as u32 + 1;
            matches.push(bye_match(
                tournament,
                round,
                position,
                round_name,
                entry.team,
                Team::bye(round as usize),
            ));
        }

        matches
    }

    fn field_size(matches: &[Match]) -> usize {
        matches
            .iter()
            .flat_map(|m| m.real_teams())
            .map(|t| t.id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn build_rankings(&self, matches: &[Match]) -> Vec<TeamRanking> {
        let mut entries = Self::build_entries(matches);
        entries.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.buchholz.total_cmp(&a.buchholz))
                .then_with(|| b.sonneborn_berger.total_cmp(&a.sonneborn_berger))
                .then_with(|| b.point_differential.cmp(&a.point_differential))
                .then_with(|| b.wins.cmp(&a.wins))
                .then_with(|| stable_team_order(&a.team, &b.team))
        });
        entries
            .into_iter()
            .map(|e| TeamRanking {
                rank: 0,
                wins: e.wins,
                losses: e.losses,
                draws: e.draws,
                points: e.points,
                points_scored: e.points_scored,
                points_conceded: e.points_conceded,
                point_differential: e.point_differential,
                tie_breaker: e.buchholz,
                team: e.team,
            })
            .collect()
    }
}

impl FormatHandler for SwissSystemHandler {
    fn constraints(&self) -> FormatConstraints {
        FormatConstraints {
            min_teams: 4,
            max_teams: 64,
            allows_odd_team_count: true,
            supports_byes: true,
            max_rounds: 7,
        }
    }

    fn generate_bracket(
        &self,
        tournament: &Tournament,
        seeded_teams: &[Team],
        options: &GenerateOptions,
        rng: &mut dyn RngCore,
    ) -> BracketResult<GeneratedBracket> {
        let team_count = seeded_teams.len();
        let mut violations = self.constraints().validate_team_count(team_count);
        let needs_bye = team_count % 2 == 1;
        if needs_bye && !options.allow_byes {
            violations.push(format!(
                "an odd field of {team_count} needs a bye rotation but byes are disabled"
            ));
        }
        if !violations.is_empty() {
            return Err(BracketError::InvalidConfiguration { violations });
        }

        // Round 1 runs off the seed order; with a completely unrated field
        // there is nothing to rank, so the order is drawn at random.
        let mut field: Vec<Team> = seeded_teams.to_vec();
        if field.iter().all(|t| t.average_rating().is_none()) {
            field.shuffle(rng);
        }

        let total_rounds = Self::round_count_for(team_count);
        let round_name = "Round 1".to_string();
        let mut matches = Vec::new();
        let mut position = 1u32;
        let paired = if needs_bye { team_count - 1 } else { team_count };
        for k in (0..paired).step_by(2) {
            matches.push(new_match(
                tournament,
                1,
                position,
                round_name.clone(),
                Some(field[k].clone()),
                Some(field[k + 1].clone()),
            ));
            position += 1;
        }
        let bye_teams = if needs_bye {
            let bye = Team::bye(1);
            matches.push(bye_match(
                tournament,
                1,
                position,
                round_name,
                field[team_count - 1].clone(),
                bye.clone(),
            ));
            vec![bye]
        } else {
            Vec::new()
        };

        log::info!(
            "generated swiss round 1: {} matches, {total_rounds} rounds scheduled for {team_count} teams",
            matches.len()
        );

        let bracket_structure = flat_nodes(&matches);
        Ok(GeneratedBracket {
            metadata: BracketMetadata {
                format: tournament.format,
                team_count,
                round_count: total_rounds,
                match_count: matches.len(),
                bye_count: bye_teams.len(),
                generated_at: chrono::Utc::now(),
            },
            matches,
            bracket_structure,
            seeded_teams: seeded_teams.to_vec(),
            bye_teams,
        })
    }

    fn update_progression(
        &self,
        completed: &Match,
        tournament: &Tournament,
        all_matches: &[Match],
        rng: &mut dyn RngCore,
    ) -> BracketResult<ProgressionUpdate> {
        ensure_progressable(completed, true)?;

        let current_round = all_matches.iter().map(|m| m.round).max().unwrap_or(0);
        let round_open = all_matches
            .iter()
            .filter(|m| m.round == current_round)
            .any(|m| !m.is_resolved());
        if round_open {
            return Ok(ProgressionUpdate::noop(flat_nodes(all_matches)));
        }

        let total_rounds = Self::round_count_for(Self::field_size(all_matches));
        if current_round >= total_rounds {
            log::info!("swiss round {current_round} was the last; tournament is over");
            return Ok(ProgressionUpdate {
                affected_matches: Vec::new(),
                new_matches: Vec::new(),
                updated_bracket_structure: flat_nodes(all_matches),
                is_complete: true,
                final_rankings: Some(self.build_rankings(all_matches)),
            });
        }

        let entries = Self::build_entries(all_matches);
        let new_matches = self.build_round(tournament, entries, current_round + 1, rng);
        log::debug!(
            "paired swiss round {}: {} matches",
            current_round + 1,
            new_matches.len()
        );
        let mut combined = all_matches.to_vec();
        combined.extend(new_matches.iter().cloned());
        Ok(ProgressionUpdate {
            affected_matches: Vec::new(),
            updated_bracket_structure: flat_nodes(&combined),
            new_matches,
            is_complete: false,
            final_rankings: None,
        })
    }

    fn calculate_standings(&self, _tournament: &Tournament, matches: &[Match]) -> Standings {
        let rankings = self.build_rankings(matches);
        finalize_standings(
            rankings,
            &[
                "points",
                "buchholz",
                "sonneborn-berger",
                "point-differential",
                "wins",
            ],
            matches,
        )
    }

    fn is_complete(&self, _tournament: &Tournament, matches: &[Match]) -> bool {
        if matches.is_empty() {
            return false;
        }
        let current_round = matches.iter().map(|m| m.round).max().unwrap_or(0);
        current_round >= Self::round_count_for(Self::field_size(matches))
            && matches
                .iter()
                .filter(|m| m.round == current_round)
                .all(Match::is_resolved)
    }
}
