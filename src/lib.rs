//! # Bracket Engine
//!
//! A tournament scheduling and progression engine: given a set of teams
//! and a tournament format, it produces a match schedule, advances that
//! schedule as results arrive, computes standings after every update, and
//! decides when the tournament is over.
//!
//! The engine is pure computation. It performs no I/O and holds no hidden
//! state: everything is a function of (tournament config, team list,
//! match history), and recomputing from the same history always yields
//! the same result. Persistence, real-time fan-out, scoring and court
//! assignment are the caller's business.
//!
//! ## Architecture
//!
//! Four formats implement one [`format::FormatHandler`] contract,
//! dispatched through an enum with `enum_dispatch`:
//!
//! - **Single elimination**: power-of-two knockout with seeded byes
//! - **Round robin**: every pairing up front; large fields split into
//!   groups feeding a knockout playoff
//! - **Swiss**: fixed round count, nearest-score pairing, Buchholz and
//!   Sonneborn-Berger tie-breaks
//! - **Barrage**: qualification ladder, two wins in and two losses out
//!
//! The [`BracketGenerator`] validates input, seeds the field and picks
//! the handler; the [`seeding`] module orders teams by rating, at random,
//! or as supplied.
//!
//! ## Example
//!
//! ```
//! use bracket_engine::{
//!     BracketGenerator, GameFormat, Player, Team, Tournament, TournamentFormat,
//! };
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let teams: Vec<Team> = (0..8)
//!     .map(|i| Team::new(format!("Team {i}"), vec![Player::new(format!("p{i}"))]))
//!     .collect();
//! let tournament = Tournament::new(
//!     "Club Open",
//!     TournamentFormat::SingleElimination,
//!     GameFormat::Singles,
//! );
//!
//! let generator = BracketGenerator::new();
//! let mut rng = StdRng::seed_from_u64(7);
//! let bracket = generator
//!     .generate_bracket(&tournament, &teams, None, &mut rng)
//!     .unwrap();
//! assert_eq!(bracket.matches.len(), 7);
//! ```
//!
//! ## Caller obligations
//!
//! `update_bracket_progression` must see a match history reflecting at
//! most one newly completed match at a time, and two calls for the same
//! tournament must not race on stale snapshots. The engine is idempotent
//! as a safety net, but per-tournament serialization belongs to the
//! persistence layer.

/// Tournament, team, match and standings data model.
pub mod model;
pub use model::{
    BracketNode, BracketSide, End, GameFormat, Match, MatchId, MatchScore, MatchStatus, Player,
    PlayerId, Standings, Team, TeamId, TeamRanking, TeamStats, Tournament, TournamentFormat,
    TournamentId,
};

/// Team ordering ahead of first-round pairing.
pub mod seeding;
pub use seeding::{SeedingMethod, SeedingOptions, seed_teams};

/// The format-handler contract and its four implementations.
pub mod format;
pub use format::{
    BarrageHandler, BracketError, BracketMetadata, BracketResult, FormatConstraints,
    FormatHandler, GenerateOptions, GeneratedBracket, Handler, ProgressionUpdate,
    RoundRobinHandler, SingleEliminationHandler, SwissSystemHandler,
};

/// Validation, seeding and format dispatch.
pub mod generator;
pub use generator::BracketGenerator;
