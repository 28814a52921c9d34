//! Team seeding ahead of first-round pairing.
//!
//! Seeding only reorders the field: the output is always a permutation of
//! the input, never adding, dropping, or mutating a team. Randomness goes
//! through an injected rng so callers can make seeding reproducible.

use rand::RngCore;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::model::Team;

/// Seeding policy
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedingMethod {
    /// Shuffle the field.
    Random,
    /// Order by average player rating, best first. Unrated teams sort last.
    #[default]
    Ranked,
    /// Preserve the caller-supplied order.
    Manual,
}

/// Seeding options
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SeedingOptions {
    pub method: SeedingMethod,
    /// Keep teams from the same club out of each other's round-1 pair.
    pub avoid_same_club: bool,
    /// Fold the ranked order so strength alternates across the bracket.
    pub distribute_skill: bool,
}

impl Default for SeedingOptions {
    fn default() -> Self {
        Self {
            method: SeedingMethod::Ranked,
            avoid_same_club: true,
            distribute_skill: false,
        }
    }
}

/// Order a field of teams according to the seeding options.
///
/// # Arguments
///
/// * `teams` - The registered field, in caller order
/// * `options` - Seeding method and auxiliary flags
/// * `rng` - Entropy source for random seeding; tests pass a seeded rng
///
/// # Returns
///
/// A permutation of `teams` in seed order (seed 1 first).
pub fn seed_teams(teams: &[Team], options: &SeedingOptions, rng: &mut dyn RngCore) -> Vec<Team> {
    let mut seeded: Vec<Team> = teams.to_vec();

    match options.method {
        SeedingMethod::Manual => {}
        SeedingMethod::Random => seeded.shuffle(rng),
        SeedingMethod::Ranked => {
            seeded.sort_by(|a, b| {
                let ra = a.average_rating().unwrap_or(f64::NEG_INFINITY);
                let rb = b.average_rating().unwrap_or(f64::NEG_INFINITY);
                rb.total_cmp(&ra)
            });
            if options.distribute_skill {
                seeded = fold_for_distribution(seeded);
            }
        }
    }

    if options.avoid_same_club {
        separate_clubs(&mut seeded);
    }

    seeded
}

/// Serpentine fold: strongest, weakest, second strongest, second weakest...
/// so adjacent bracket regions carry comparable total strength.
fn fold_for_distribution(sorted: Vec<Team>) -> Vec<Team> {
    let mut folded = Vec::with_capacity(sorted.len());
    let mut front = 0usize;
    let mut back = sorted.len();
    while front < back {
        folded.push(sorted[front].clone());
        front += 1;
        if front < back {
            back -= 1;
            folded.push(sorted[back].clone());
        }
    }
    folded
}

/// Best-effort pass over the round-1 pair slots (0,1), (2,3), ... swapping
/// the second member of a same-club pair with the nearest later team from
/// a different club. A field drawn from a single club is left as-is.
fn separate_clubs(seeded: &mut [Team]) {
    let mut i = 0;
    while i + 1 < seeded.len() {
        if same_club(&seeded[i], &seeded[i + 1]) {
            if let Some(j) = (i + 2..seeded.len()).find(|&j| !same_club(&seeded[i], &seeded[j])) {
                seeded.swap(i + 1, j);
            } else {
                log::debug!(
                    "no club-separating swap available for seed {}; leaving pair as drawn",
                    i + 1
                );
            }
        }
        i += 2;
    }
}

fn same_club(a: &Team, b: &Team) -> bool {
    match (&a.club, &b.club) {
        (Some(ca), Some(cb)) => ca == cb,
        _ => false,
    }
}
