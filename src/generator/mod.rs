//! Bracket generator: the single dispatch point in front of the format
//! handlers.
//!
//! Validates tournament configuration and the registered field before any
//! match is constructed, seeds the teams, and delegates to the handler
//! registered for the tournament's format. Progression, standings and
//! completion checks are pure delegations.

use rand::RngCore;
use std::collections::{BTreeSet, HashMap};

use crate::format::{
    BarrageHandler, BracketError, BracketResult, FormatHandler, GenerateOptions, GeneratedBracket,
    Handler, ProgressionUpdate, RoundRobinHandler, SingleEliminationHandler, SwissSystemHandler,
};
use crate::model::{Match, Standings, Team, Tournament, TournamentFormat};
use crate::seeding::seed_teams;

/// Format dispatch and input validation in front of the handlers.
pub struct BracketGenerator {
    handlers: HashMap<TournamentFormat, Handler>,
}

impl BracketGenerator {
    /// Create a generator with every implemented format registered.
    ///
    /// `DoubleElimination` is deliberately absent: it is a declared
    /// format with no handler, and dispatching on it must fail loudly.
    pub fn new() -> Self {
        let mut handlers = HashMap::new();
        handlers.insert(
            TournamentFormat::SingleElimination,
            Handler::SingleElimination(SingleEliminationHandler),
        );
        handlers.insert(TournamentFormat::RoundRobin, Handler::RoundRobin(RoundRobinHandler));
        handlers.insert(TournamentFormat::Swiss, Handler::Swiss(SwissSystemHandler));
        handlers.insert(TournamentFormat::Barrage, Handler::Barrage(BarrageHandler));
        Self { handlers }
    }

    /// The handler registered for a format.
    pub fn handler_for(&self, format: TournamentFormat) -> BracketResult<&Handler> {
        self.handlers
            .get(&format)
            .ok_or(BracketError::UnsupportedFormat(format))
    }

    /// Validate, seed and generate the initial bracket.
    ///
    /// Caller options are merged over the defaults (ranked seeding with
    /// club avoidance, byes allowed and placed at the top). Every
    /// violation found is reported together; nothing is constructed on
    /// failure.
    pub fn generate_bracket(
        &self,
        tournament: &Tournament,
        teams: &[Team],
        options: Option<GenerateOptions>,
        rng: &mut dyn RngCore,
    ) -> BracketResult<GeneratedBracket> {
        let handler = self.handler_for(tournament.format)?;
        let options = options.unwrap_or_default();

        let mut violations = handler.constraints().validate_team_count(teams.len());
        if teams.len() > tournament.max_players {
            violations.push(format!(
                "{} teams registered but the tournament is capped at {}",
                teams.len(),
                tournament.max_players
            ));
        }

        let expected_players = tournament.game_format.players_per_team();
        let mut seen_ids = BTreeSet::new();
        for team in teams {
            if team.is_bye {
                violations.push(format!(
                    "'{}' is a bye placeholder and cannot be registered",
                    team.name
                ));
            }
            if team.players.len() != expected_players {
                violations.push(format!(
                    "team '{}' fields {} player(s) but {} requires exactly {expected_players}",
                    team.name,
                    team.players.len(),
                    tournament.game_format
                ));
            }
            if !seen_ids.insert(team.id) {
                violations.push(format!("team '{}' is registered twice", team.name));
            }
        }

        if !violations.is_empty() {
            return Err(BracketError::InvalidConfiguration { violations });
        }

        let seeded = seed_teams(teams, &options.seeding, rng);
        log::info!(
            "generating {} bracket '{}' for {} teams",
            tournament.format,
            tournament.name,
            teams.len()
        );
        handler.generate_bracket(tournament, &seeded, &options, rng)
    }

    /// Advance the bracket for one newly completed match.
    pub fn update_bracket_progression(
        &self,
        completed: &Match,
        tournament: &Tournament,
        all_matches: &[Match],
        rng: &mut dyn RngCore,
    ) -> BracketResult<ProgressionUpdate> {
        self.handler_for(tournament.format)?
            .update_progression(completed, tournament, all_matches, rng)
    }

    /// Current standings for the tournament's format.
    pub fn calculate_standings(
        &self,
        tournament: &Tournament,
        matches: &[Match],
    ) -> BracketResult<Standings> {
        Ok(self
            .handler_for(tournament.format)?
            .calculate_standings(tournament, matches))
    }

    /// Whether the tournament is over.
    pub fn is_complete(&self, tournament: &Tournament, matches: &[Match]) -> BracketResult<bool> {
        Ok(self
            .handler_for(tournament.format)?
            .is_complete(tournament, matches))
    }

    /// Advisory format recommendation: small fields play a full round
    /// robin, tight schedules get a knockout, generous ones a barrage or
    /// swiss. Deterministic for the same inputs.
    pub fn recommend_format(
        team_count: usize,
        time_limit_minutes: Option<u64>,
    ) -> TournamentFormat {
        if team_count <= 5 {
            return TournamentFormat::RoundRobin;
        }
        match time_limit_minutes {
            Some(limit) if limit < 120 => TournamentFormat::SingleElimination,
            Some(limit) if limit < 240 => TournamentFormat::Barrage,
            _ => TournamentFormat::Swiss,
        }
    }

    /// Advisory duration estimate in minutes, monotonic in team count.
    pub fn estimate_duration(&self, tournament: &Tournament, team_count: usize) -> u64 {
        let rounds = match tournament.format {
            TournamentFormat::SingleElimination | TournamentFormat::DoubleElimination => {
                team_count.next_power_of_two().ilog2() as u64
            }
            // Grouped fields play ~5 group rounds plus a playoff, which
            // is also where the direct-field round count levels off.
            TournamentFormat::RoundRobin => (team_count.saturating_sub(1) as u64).min(8),
            TournamentFormat::Swiss => SwissSystemHandler::round_count_for(team_count) as u64,
            TournamentFormat::Barrage => 3 + (team_count / 16) as u64,
        };
        let minutes_per_round = if tournament.short_form { 25 } else { 45 };
        rounds * minutes_per_round + 15
    }
}

impl Default for BracketGenerator {
    fn default() -> Self {
        Self::new()
    }
}
