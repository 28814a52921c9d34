//! Property-based tests for standings determinism and seeding using proptest
//!
//! The engine promises that standings are a pure, order-independent
//! function of match history and that seeding only permutes the field.
//! These properties are exercised across randomly generated fields and
//! result patterns.

use bracket_engine::{
    BracketGenerator, GameFormat, Match, MatchScore, MatchStatus, Player, SeedingMethod,
    SeedingOptions, Team, TeamId, TeamRanking, Tournament, TournamentFormat, seed_teams,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;

// Strategy for a field of singles teams with optional ratings
fn field_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<Team>> {
    prop::collection::vec(prop::option::of(600u32..2000), min..=max).prop_map(|ratings| {
        ratings
            .into_iter()
            .enumerate()
            .map(|(i, rating)| {
                let player = match rating {
                    Some(r) => Player::rated(format!("p{i}"), r),
                    None => Player::new(format!("p{i}")),
                };
                Team::new(format!("Team {i:02}"), vec![player])
            })
            .collect()
    })
}

// Resolve match `i` according to one result bit: true = slot 1 wins
fn resolve(m: &mut Match, first_wins: bool, max_points: u32) {
    let (winner, score) = if first_wins {
        (
            m.team1.as_ref().unwrap().id,
            MatchScore { team1_points: max_points, team2_points: 9, is_complete: true },
        )
    } else {
        (
            m.team2.as_ref().unwrap().id,
            MatchScore { team1_points: 9, team2_points: max_points, is_complete: true },
        )
    };
    m.score = score;
    m.status = MatchStatus::Completed;
    m.winner = Some(winner);
}

fn ranking_key(rankings: &[TeamRanking]) -> Vec<(u32, TeamId, u32, u32, i64)> {
    rankings
        .iter()
        .map(|r| (r.rank, r.team.id, r.wins, r.points, r.point_differential))
        .collect()
}

proptest! {
    #[test]
    fn seeding_is_always_a_permutation(
        teams in field_strategy(2, 16),
        method_idx in 0usize..3,
        avoid_same_club in any::<bool>(),
        distribute_skill in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let method = [SeedingMethod::Random, SeedingMethod::Ranked, SeedingMethod::Manual][method_idx];
        let options = SeedingOptions { method, avoid_same_club, distribute_skill };
        let seeded = seed_teams(&teams, &options, &mut StdRng::seed_from_u64(seed));

        prop_assert_eq!(seeded.len(), teams.len());
        let before: BTreeSet<TeamId> = teams.iter().map(|t| t.id).collect();
        let after: BTreeSet<TeamId> = seeded.iter().map(|t| t.id).collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn round_robin_standings_are_order_independent(
        teams in field_strategy(3, 10),
        results in prop::collection::vec(any::<bool>(), 64),
        shuffle_seed in any::<u64>(),
    ) {
        let tournament = Tournament::new("prop", TournamentFormat::RoundRobin, GameFormat::Singles);
        let generator = BracketGenerator::new();
        let bracket = generator
            .generate_bracket(&tournament, &teams, None, &mut StdRng::seed_from_u64(1))
            .unwrap();

        let mut matches = bracket.matches;
        for (i, m) in matches.iter_mut().enumerate() {
            resolve(m, results[i % results.len()], tournament.max_points);
        }

        let baseline = generator.calculate_standings(&tournament, &matches).unwrap();
        let mut shuffled = matches.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(shuffle_seed));
        let reordered = generator.calculate_standings(&tournament, &shuffled).unwrap();

        prop_assert_eq!(ranking_key(&baseline.rankings), ranking_key(&reordered.rankings));
    }

    #[test]
    fn knockout_standings_are_order_independent_and_total(
        teams in field_strategy(2, 16),
        results in prop::collection::vec(any::<bool>(), 16),
        shuffle_seed in any::<u64>(),
    ) {
        let tournament = Tournament::new("prop", TournamentFormat::SingleElimination, GameFormat::Singles);
        let generator = BracketGenerator::new();
        let bracket = generator
            .generate_bracket(&tournament, &teams, None, &mut StdRng::seed_from_u64(1))
            .unwrap();

        // Resolve only round 1; later rounds stay empty or half-filled.
        let mut matches = bracket.matches;
        let mut bit = 0usize;
        for m in matches.iter_mut() {
            if m.round == 1 && !m.is_resolved() {
                resolve(m, results[bit % results.len()], tournament.max_points);
                bit += 1;
            }
        }

        let baseline = generator.calculate_standings(&tournament, &matches).unwrap();

        // Totality: exactly the registered field is ranked, never a bye.
        let ranked: BTreeSet<TeamId> = baseline.rankings.iter().map(|r| r.team.id).collect();
        let registered: BTreeSet<TeamId> = teams.iter().map(|t| t.id).collect();
        prop_assert_eq!(ranked, registered);
        prop_assert!(baseline.rankings.iter().all(|r| !r.team.is_bye));

        let mut shuffled = matches.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(shuffle_seed));
        let reordered = generator.calculate_standings(&tournament, &shuffled).unwrap();
        prop_assert_eq!(ranking_key(&baseline.rankings), ranking_key(&reordered.rankings));
    }

    #[test]
    fn knockout_bye_matches_are_pre_completed(teams in field_strategy(2, 16)) {
        let tournament = Tournament::new("prop", TournamentFormat::SingleElimination, GameFormat::Singles);
        let generator = BracketGenerator::new();
        let bracket = generator
            .generate_bracket(&tournament, &teams, None, &mut StdRng::seed_from_u64(1))
            .unwrap();

        let bracket_size = teams.len().next_power_of_two();
        prop_assert_eq!(bracket.bye_teams.len(), bracket_size - teams.len());
        for m in bracket.matches.iter().filter(|m| m.is_bye()) {
            prop_assert_eq!(m.status, MatchStatus::Completed);
            prop_assert_eq!(m.winner, Some(m.team1.as_ref().unwrap().id));
            prop_assert_eq!(m.score.team1_points, tournament.max_points);
            prop_assert_eq!(m.score.team2_points, 0);
        }
    }

    #[test]
    fn swiss_standings_rank_unplayed_teams_last(
        teams in field_strategy(4, 12),
        results in prop::collection::vec(any::<bool>(), 8),
    ) {
        let tournament = Tournament::new("prop", TournamentFormat::Swiss, GameFormat::Singles);
        let generator = BracketGenerator::new();
        let bracket = generator
            .generate_bracket(&tournament, &teams, None, &mut StdRng::seed_from_u64(1))
            .unwrap();

        // Resolve every pairing except the first; its two teams have no
        // completed match and must trail everyone with a result.
        let mut matches = bracket.matches;
        let idle: Vec<TeamId> = matches[0].real_teams().map(|t| t.id).collect();
        for (i, m) in matches.iter_mut().enumerate().skip(1) {
            if !m.is_resolved() {
                resolve(m, results[i % results.len()], tournament.max_points);
            }
        }

        let standings = generator.calculate_standings(&tournament, &matches).unwrap();
        let worst_scoring_rank = standings
            .rankings
            .iter()
            .filter(|r| r.wins + r.losses + r.draws > 0 && r.points > 0)
            .map(|r| r.rank)
            .max()
            .unwrap_or(0);
        for id in idle {
            let rank = standings.rank_of(id).unwrap();
            prop_assert!(
                rank > worst_scoring_rank,
                "team with no result ranked {rank} above a scoring team ({worst_scoring_rank})"
            );
        }
    }
}
