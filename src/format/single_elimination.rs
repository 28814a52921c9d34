//! Single-elimination knockout bracket.
//!
//! The bracket is sized to the next power of two, every round's matches
//! are created up front with empty slots, and winners advance into the
//! slot at `(round + 1, ceil(position / 2))`. Uneven fields receive byes
//! in round 1, auto-completed at generation time.

use rand::RngCore;

use super::{
    BracketError, BracketMetadata, BracketResult, FormatConstraints, FormatHandler,
    GenerateOptions, GeneratedBracket, ProgressionUpdate, bracket_nodes, bye_match,
    ensure_progressable, finalize_standings, knockout_round_name, new_match, stable_team_order,
    tally_records,
};
use crate::model::{Match, MatchStatus, Standings, Team, TeamRanking, Tournament};

#[derive(Clone, Copy, Debug, Default)]
pub struct SingleEliminationHandler;

/// Where a winner ended up when placed into the next round's slot.
enum Placement {
    AlreadyThere,
    Placed,
    Full,
}

impl SingleEliminationHandler {
    /// Put `team` into the feeder-side slot of `next`, falling back to
    /// whichever slot is still empty.
    fn place_winner(next: &mut Match, team: Team, from_position: u32) -> Placement {
        if next.involves(team.id) {
            return Placement::AlreadyThere;
        }
        // Odd feeder positions fill the top slot so the drawn order is
        // preserved in the visual bracket.
        let prefer_team1 = from_position % 2 == 1;
        let (preferred, other) = if prefer_team1 {
            (&mut next.team1, &mut next.team2)
        } else {
            (&mut next.team2, &mut next.team1)
        };
        if preferred.is_none() {
            *preferred = Some(team);
            Placement::Placed
        } else if other.is_none() {
            *other = Some(team);
            Placement::Placed
        } else {
            Placement::Full
        }
    }

    fn total_rounds(matches: &[Match]) -> u32 {
        matches.iter().map(|m| m.round).max().unwrap_or(0)
    }

    fn build_rankings(&self, matches: &[Match]) -> Vec<TeamRanking> {
        let records = tally_records(matches);
        let mut rankings: Vec<TeamRanking> = records
            .into_values()
            .map(|r| TeamRanking {
                rank: 0,
                wins: r.wins,
                losses: r.losses,
                draws: r.draws,
                points: r.wins,
                points_scored: r.points_scored,
                points_conceded: r.points_conceded,
                point_differential: r.point_differential(),
                tie_breaker: r.furthest_round as f64,
                team: r.team,
            })
            .collect();
        rankings.sort_by(|a, b| {
            (b.tie_breaker)
                .total_cmp(&a.tie_breaker)
                .then_with(|| b.wins.cmp(&a.wins))
                .then_with(|| b.point_differential.cmp(&a.point_differential))
                .then_with(|| stable_team_order(&a.team, &b.team))
        });
        rankings
    }
}

impl FormatHandler for SingleEliminationHandler {
    fn constraints(&self) -> FormatConstraints {
        FormatConstraints {
            min_teams: 2,
            max_teams: 128,
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
        _rng: &mut dyn RngCore,
    ) -> BracketResult<GeneratedBracket> {
        let team_count = seeded_teams.len();
        let mut violations = self.constraints().validate_team_count(team_count);

        let bracket_size = team_count.next_power_of_two();
        let byes_needed = bracket_size.saturating_sub(team_count);
        if byes_needed > 0 && !options.allow_byes {
            violations.push(format!(
                "a field of {team_count} requires {byes_needed} byes but byes are disabled"
            ));
        }
        if !violations.is_empty() {
            return Err(BracketError::InvalidConfiguration { violations });
        }

        let total_rounds = bracket_size.ilog2();
        let bye_teams: Vec<Team> = (1..=byes_needed).map(Team::bye).collect();

        // Pairs follow the 1-vs-N shape: lowest and highest remaining seed
        // at each step. Byes land on the top seeds unless asked otherwise.
        let pairs: Vec<(Team, Team)> = if options.byes_at_top {
            let mut slots: Vec<Team> = seeded_teams.to_vec();
            slots.extend(bye_teams.iter().cloned());
            (0..bracket_size / 2)
                .map(|k| (slots[k].clone(), slots[bracket_size - 1 - k].clone()))
                .collect()
        } else {
            let paired = team_count - byes_needed;
            let mut pairs: Vec<(Team, Team)> = (0..paired / 2)
                .map(|k| (seeded_teams[k].clone(), seeded_teams[paired - 1 - k].clone()))
                .collect();
            pairs.extend(
                seeded_teams[paired..]
                    .iter()
                    .zip(bye_teams.iter())
                    .map(|(team, bye)| (team.clone(), bye.clone())),
            );
            pairs
        };

        let round_1_name = knockout_round_name(1, total_rounds);
        let mut matches: Vec<Match> = pairs
            .into_iter()
            .enumerate()
            .map(|(k, (team1, team2))| {
                let position = k as u32 + 1;
                if team2.is_bye {
                    bye_match(tournament, 1, position, round_1_name.clone(), team1, team2)
                } else {
                    new_match(tournament, 1, position, round_1_name.clone(), Some(team1), Some(team2))
                }
            })
            .collect();

        for round in 2..=total_rounds {
            let name = knockout_round_name(round, total_rounds);
            for position in 1..=(bracket_size as u32 >> round) {
                matches.push(new_match(tournament, round, position, name.clone(), None, None));
            }
        }

        // Byes resolve at generation time, so their winners already sit in
        // the round-2 slots when the bracket is handed back.
        if total_rounds > 1 {
            let byes: Vec<(u32, Team)> = matches
                .iter()
                .filter(|m| m.round == 1 && m.is_bye())
                .filter_map(|m| m.team1.clone().map(|t| (m.position, t)))
                .collect();
            for (position, team) in byes {
                let next_position = (position + 1) / 2;
                if let Some(next) = matches
                    .iter_mut()
                    .find(|m| m.round == 2 && m.position == next_position)
                {
                    Self::place_winner(next, team, position);
                }
            }
        }

        if byes_needed > 0 {
            log::warn!(
                "field of {team_count} does not fill a bracket of {bracket_size}; awarded {byes_needed} byes"
            );
        }
        log::info!(
            "generated single-elimination bracket: {} matches over {total_rounds} rounds",
            matches.len()
        );

        let bracket_structure = bracket_nodes(&matches);
        Ok(GeneratedBracket {
            metadata: BracketMetadata {
                format: tournament.format,
                team_count,
                round_count: total_rounds,
                match_count: matches.len(),
                bye_count: byes_needed,
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
        _rng: &mut dyn RngCore,
    ) -> BracketResult<ProgressionUpdate> {
        let Some(winner_id) = ensure_progressable(completed, false)? else {
            return Err(BracketError::MissingWinner(completed.id));
        };
        let total_rounds = Self::total_rounds(all_matches).max(completed.round);

        if completed.round == total_rounds {
            log::info!("final completed; tournament {} is over", tournament.id);
            let rankings = self.build_rankings(all_matches);
            return Ok(ProgressionUpdate {
                affected_matches: Vec::new(),
                new_matches: Vec::new(),
                updated_bracket_structure: bracket_nodes(all_matches),
                is_complete: true,
                final_rankings: Some(rankings),
            });
        }

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

        match Self::place_winner(next, winner_team, completed.position) {
            Placement::AlreadyThere => Ok(ProgressionUpdate::noop(bracket_nodes(all_matches))),
            Placement::Full => Err(BracketError::SlotsOccupied {
                round: next_round,
                position: next_position,
            }),
            Placement::Placed => {
                let affected = next.clone();
                log::debug!(
                    "advanced winner of round {} position {} into round {next_round} position {next_position}",
                    completed.round,
                    completed.position
                );
                Ok(ProgressionUpdate {
                    affected_matches: vec![affected],
                    new_matches: Vec::new(),
                    updated_bracket_structure: bracket_nodes(&updated),
                    is_complete: false,
                    final_rankings: None,
                })
            }
        }
    }

    fn calculate_standings(&self, _tournament: &Tournament, matches: &[Match]) -> Standings {
        let rankings = self.build_rankings(matches);
        finalize_standings(
            rankings,
            &["furthest-round", "wins", "point-differential"],
            matches,
        )
    }

    fn is_complete(&self, _tournament: &Tournament, matches: &[Match]) -> bool {
        let total_rounds = Self::total_rounds(matches);
        total_rounds > 0
            && matches
                .iter()
                .any(|m| m.round == total_rounds && m.status == MatchStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GameFormat, MatchScore, Player, TournamentFormat};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tournament() -> Tournament {
        Tournament::new("knockout", TournamentFormat::SingleElimination, GameFormat::Singles)
    }

    fn teams(n: usize) -> Vec<Team> {
        (0..n)
            .map(|i| Team::new(format!("t{i}"), vec![Player::rated(format!("p{i}"), 1500 - i as u32 * 10)]))
            .collect()
    }

    fn complete(m: &mut Match, winner_first_slot: bool, max_points: u32) {
        let winner = if winner_first_slot {
            m.team1.as_ref().unwrap().id
        } else {
            m.team2.as_ref().unwrap().id
        };
        m.score = if winner_first_slot {
            MatchScore { team1_points: max_points, team2_points: 7, is_complete: true }
        } else {
            MatchScore { team1_points: 7, team2_points: max_points, is_complete: true }
        };
        m.status = MatchStatus::Completed;
        m.winner = Some(winner);
    }

    #[test]
    fn test_eight_team_bracket_shape() {
        let handler = SingleEliminationHandler;
        let t = tournament();
        let field = teams(8);
        let bracket = handler
            .generate_bracket(&t, &field, &GenerateOptions::default(), &mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(bracket.metadata.round_count, 3);
        assert_eq!(bracket.matches.len(), 7, "bracket_size - 1 matches in total");
        assert!(bracket.bye_teams.is_empty());

        // 1-vs-N pairing in round 1.
        let first = &bracket.matches[0];
        assert_eq!(first.team1.as_ref().unwrap().name, "t0");
        assert_eq!(first.team2.as_ref().unwrap().name, "t7");
        assert_eq!(first.round_name, "Quarterfinal");

        let final_match = bracket.matches.iter().find(|m| m.round == 3).unwrap();
        assert_eq!(final_match.round_name, "Final");
        assert!(final_match.team1.is_none() && final_match.team2.is_none());
    }

    #[test]
    fn test_uneven_field_gets_byes_against_top_seeds() {
        let handler = SingleEliminationHandler;
        let t = tournament();
        let bracket = handler
            .generate_bracket(&t, &teams(5), &GenerateOptions::default(), &mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(bracket.metadata.bye_count, 3);
        assert_eq!(bracket.bye_teams.len(), 3);
        let byes: Vec<&Match> = bracket.matches.iter().filter(|m| m.is_bye()).collect();
        assert_eq!(byes.len(), 3);
        for m in &byes {
            assert_eq!(m.status, MatchStatus::Completed);
            assert_eq!(m.winner, Some(m.team1.as_ref().unwrap().id));
            assert_eq!(m.score.team1_points, t.max_points);
        }
        // Top seed's bye winner is already waiting in round 2.
        let r2_first = bracket
            .matches
            .iter()
            .find(|m| m.round == 2 && m.position == 1)
            .unwrap();
        assert_eq!(r2_first.team1.as_ref().unwrap().name, "t0");
    }

    #[test]
    fn test_byes_at_bottom_when_requested() {
        let handler = SingleEliminationHandler;
        let t = tournament();
        let options = GenerateOptions {
            byes_at_top: false,
            ..GenerateOptions::default()
        };
        let bracket = handler
            .generate_bracket(&t, &teams(6), &options, &mut StdRng::seed_from_u64(1))
            .unwrap();
        let byed: Vec<&str> = bracket
            .matches
            .iter()
            .filter(|m| m.is_bye())
            .map(|m| m.team1.as_ref().unwrap().name.as_str())
            .collect();
        assert_eq!(byed, vec!["t4", "t5"]);
    }

    #[test]
    fn test_byes_disabled_is_a_configuration_error() {
        let handler = SingleEliminationHandler;
        let t = tournament();
        let options = GenerateOptions {
            allow_byes: false,
            ..GenerateOptions::default()
        };
        let err = handler
            .generate_bracket(&t, &teams(5), &options, &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert!(matches!(err, BracketError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_below_minimum_field_is_rejected() {
        let handler = SingleEliminationHandler;
        let t = tournament();
        let err = handler
            .generate_bracket(&t, &teams(1), &GenerateOptions::default(), &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        let BracketError::InvalidConfiguration { violations } = err else {
            panic!("expected a configuration error");
        };
        assert!(violations[0].contains("below the format minimum"));
    }

    #[test]
    fn test_progression_through_a_four_team_bracket() {
        let handler = SingleEliminationHandler;
        let t = tournament();
        let mut rng = StdRng::seed_from_u64(1);
        let bracket = handler
            .generate_bracket(&t, &teams(4), &GenerateOptions::default(), &mut rng)
            .unwrap();
        let mut matches = bracket.matches;

        // Semifinal 1: t0 beats t3.
        complete(&mut matches[0], true, t.max_points);
        let sf1 = matches[0].clone();
        let update = handler.update_progression(&sf1, &t, &matches, &mut rng).unwrap();
        assert!(!update.is_complete);
        assert_eq!(update.affected_matches.len(), 1);
        let final_after = &update.affected_matches[0];
        assert_eq!(final_after.round, 2);
        assert_eq!(final_after.team1.as_ref().unwrap().name, "t0");
        matches = apply(matches, &update);

        // Re-running the same completion against the updated history is a no-op.
        let again = handler.update_progression(&sf1, &t, &matches, &mut rng).unwrap();
        assert!(again.affected_matches.is_empty());
        assert!(again.new_matches.is_empty());

        // Semifinal 2: t2 beats t1.
        complete(&mut matches[1], false, t.max_points);
        let sf2 = matches[1].clone();
        let update = handler.update_progression(&sf2, &t, &matches, &mut rng).unwrap();
        matches = apply(matches, &update);

        let final_idx = matches.iter().position(|m| m.round == 2).unwrap();
        assert_eq!(matches[final_idx].team2.as_ref().unwrap().name, "t2");

        // Final: t0 wins the tournament.
        complete(&mut matches[final_idx], true, t.max_points);
        let final_match = matches[final_idx].clone();
        let update = handler
            .update_progression(&final_match, &t, &matches, &mut rng)
            .unwrap();
        assert!(update.is_complete);
        let rankings = update.final_rankings.unwrap();
        assert_eq!(rankings[0].team.name, "t0");
        assert_eq!(rankings[0].losses, 0, "champion finishes undefeated");
        assert!(handler.is_complete(&t, &matches));
    }

    #[test]
    fn test_standings_order_furthest_round_first() {
        let handler = SingleEliminationHandler;
        let t = tournament();
        let mut rng = StdRng::seed_from_u64(1);
        let bracket = handler
            .generate_bracket(&t, &teams(4), &GenerateOptions::default(), &mut rng)
            .unwrap();
        let mut matches = bracket.matches;
        complete(&mut matches[0], true, t.max_points);
        let sf1 = matches[0].clone();
        let update = handler.update_progression(&sf1, &t, &matches, &mut rng).unwrap();
        matches = apply(matches, &update);

        let standings = handler.calculate_standings(&t, &matches);
        assert_eq!(standings.rankings.len(), 4);
        assert_eq!(standings.rankings[0].team.name, "t0", "semifinal winner leads");
        assert_eq!(standings.rankings[0].rank, 1);
        assert_eq!(standings.total_matches, 3);
        assert_eq!(standings.completed_matches, 1);
    }

    fn apply(mut matches: Vec<Match>, update: &ProgressionUpdate) -> Vec<Match> {
        for affected in &update.affected_matches {
            if let Some(slot) = matches.iter_mut().find(|m| m.id == affected.id) {
                *slot = affected.clone();
            }
        }
        matches.extend(update.new_matches.iter().cloned());
        matches
    }
}
