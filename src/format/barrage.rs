//! Barrage qualification ladder.
//!
//! No fixed bracket shape: two wins qualify a team, two losses eliminate
//! it, and everything in between keeps playing. Pairing is eager: after
//! any completion, free active teams with identical records are paired
//! off at once; leftovers wait for the wave to drain before being paired
//! across records, and a final stranded team gets a bye.

use rand::RngCore;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

use super::{
    BracketError, BracketMetadata, BracketResult, FormatConstraints, FormatHandler,
    GenerateOptions, GeneratedBracket, ProgressionUpdate, TeamRecord, bye_match,
    ensure_progressable, finalize_standings, flat_nodes, new_match, stable_team_order,
    tally_records,
};
use crate::model::{Match, Standings, Team, TeamId, TeamRanking, Tournament};

const WINS_TO_QUALIFY: u32 = 2;
const LOSSES_TO_ELIMINATE: u32 = 2;

/// Where a team currently stands on the ladder.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LadderStatus {
    Qualified,
    Active,
    Eliminated,
}

impl LadderStatus {
    fn of(record: &TeamRecord) -> Self {
        if record.wins >= WINS_TO_QUALIFY {
            Self::Qualified
        } else if record.losses >= LOSSES_TO_ELIMINATE {
            Self::Eliminated
        } else {
            Self::Active
        }
    }

    /// Block order in the final ranking.
    fn block(self) -> u8 {
        match self {
            Self::Qualified => 0,
            Self::Active => 1,
            Self::Eliminated => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BarrageHandler;

impl BarrageHandler {
    fn build_rankings(&self, matches: &[Match]) -> Vec<TeamRanking> {
        let records = tally_records(matches);
        let mut rows: Vec<(LadderStatus, TeamRecord)> = records
            .into_values()
            .map(|r| (LadderStatus::of(&r), r))
            .collect();
        rows.sort_by(|(sa, a), (sb, b)| {
            sa.block()
                .cmp(&sb.block())
                .then_with(|| b.wins.cmp(&a.wins))
                .then_with(|| a.losses.cmp(&b.losses))
                .then_with(|| b.point_differential().cmp(&a.point_differential()))
                .then_with(|| stable_team_order(&a.team, &b.team))
        });
        rows.into_iter()
            .map(|(_, r)| TeamRanking {
                rank: 0,
                wins: r.wins,
                losses: r.losses,
                draws: r.draws,
                points: r.wins,
                points_scored: r.points_scored,
                points_conceded: r.points_conceded,
                point_differential: r.point_differential(),
                tie_breaker: r.wins as f64,
                team: r.team,
            })
            .collect()
    }
}

impl FormatHandler for BarrageHandler {
    fn constraints(&self) -> FormatConstraints {
        FormatConstraints {
            min_teams: 4,
            max_teams: 64,
            allows_odd_team_count: true,
            supports_byes: true,
            max_rounds: 6,
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
        if team_count % 2 == 1 && !options.allow_byes {
            violations.push(format!(
                "an odd field of {team_count} needs a bye but byes are disabled"
            ));
        }
        if !violations.is_empty() {
            return Err(BracketError::InvalidConfiguration { violations });
        }

        let mut field: Vec<Team> = seeded_teams.to_vec();
        field.shuffle(rng);

        let round_name = "Barrage Round 1".to_string();
        let mut matches = Vec::new();
        let mut position = 1u32;
        let paired = team_count - team_count % 2;
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
        let bye_teams = if team_count % 2 == 1 {
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
            "generated barrage round 1: {} matches for {team_count} teams",
            matches.len()
        );

        let bracket_structure = flat_nodes(&matches);
        Ok(GeneratedBracket {
            metadata: BracketMetadata {
                format: tournament.format,
                team_count,
                round_count: 1,
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
        ensure_progressable(completed, false)?;

        let records = tally_records(all_matches);
        let busy: Vec<TeamId> = all_matches
            .iter()
            .filter(|m| !m.is_resolved())
            .flat_map(|m| m.real_teams())
            .map(|t| t.id)
            .collect();

        let active_total = records
            .values()
            .filter(|r| LadderStatus::of(r) == LadderStatus::Active)
            .count();
        if active_total == 0 {
            log::info!("barrage ladder drained; tournament {} is over", tournament.id);
            return Ok(ProgressionUpdate {
                affected_matches: Vec::new(),
                new_matches: Vec::new(),
                updated_bracket_structure: flat_nodes(all_matches),
                is_complete: true,
                final_rankings: Some(self.build_rankings(all_matches)),
            });
        }

        // Free active teams, grouped by identical win-loss record.
        let mut groups: BTreeMap<(u32, u32), Vec<Team>> = BTreeMap::new();
        for record in records.values() {
            if LadderStatus::of(record) == LadderStatus::Active && !busy.contains(&record.team.id) {
                groups
                    .entry((record.wins, record.losses))
                    .or_default()
                    .push(record.team.clone());
            }
        }

        let wave_has_open_matches = !busy.is_empty();
        let round = all_matches.iter().map(|m| m.round).max().unwrap_or(0) + 1;
        let round_name = format!("Barrage Round {round}");
        let mut position = 1u32;
        let mut new_matches = Vec::new();
        let mut leftovers: Vec<Team> = Vec::new();

        for (_, mut group) in groups {
            group.shuffle(rng);
            while group.len() >= 2 {
                let (Some(a), Some(b)) = (group.pop(), group.pop()) else {
                    break;
                };
                new_matches.push(new_match(
                    tournament,
                    round,
                    position,
                    round_name.clone(),
                    Some(a),
                    Some(b),
                ));
                position += 1;
            }
            leftovers.extend(group);
        }

        // Odd groups pair across records, but only once the wave has
        // drained; mid-wave singles are held over so they meet fresh
        // opponents instead of an instant rematch.
        if wave_has_open_matches {
            if !leftovers.is_empty() {
                log::debug!(
                    "holding {} unpaired team(s) over until in-flight matches resolve",
                    leftovers.len()
                );
            }
        } else {
            while leftovers.len() >= 2 {
                let (Some(a), Some(b)) = (leftovers.pop(), leftovers.pop()) else {
                    break;
                };
                new_matches.push(new_match(
                    tournament,
                    round,
                    position,
                    round_name.clone(),
                    Some(a),
                    Some(b),
                ));
                position += 1;
            }
            if let Some(stranded) = leftovers.pop() {
                log::warn!(
                    "no opponent left for '{}'; awarding a bye",
                    stranded.name
                );
                new_matches.push(bye_match(
                    tournament,
                    round,
                    position,
                    round_name.clone(),
                    stranded,
                    Team::bye(round as usize),
                ));
            }
        }

        if new_matches.is_empty() {
            return Ok(ProgressionUpdate::noop(flat_nodes(all_matches)));
        }

        log::debug!("barrage wave {round}: {} new matches", new_matches.len());
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
            &["status", "wins", "losses", "point-differential"],
            matches,
        )
    }

    fn is_complete(&self, _tournament: &Tournament, matches: &[Match]) -> bool {
        if matches.is_empty() {
            return false;
        }
        tally_records(matches)
            .values()
            .all(|r| LadderStatus::of(r) != LadderStatus::Active)
    }
}
