//! Seeded planning of a whole run.
//!
//! A run visits every base lens (sandbox, arcade, stealth) once in a
//! shuffled order and ends with a boss lens. Each base lens draws its
//! mutators from the pool of mutators matching its genre. The same seed
//! always yields the same plan.

use prism_lens::lenses::{Genre, LensCatalog};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// Shortest allowed lens target duration (2 minutes).
pub const MIN_LENS_DURATION_MS: u64 = 2 * 60 * 1000;

/// Longest allowed lens target duration (5 minutes).
pub const MAX_LENS_DURATION_MS: u64 = 5 * 60 * 1000;

/// Mutator always attached to the boss lens.
pub const BOSS_MUTATOR: &str = "mutator/boss-rage-timer";

/// Draws above this value select a mutator.
const MUTATOR_THRESHOLD: f64 = 0.45;

/// Genres planned into the lens sequence.
const BASE_GENRES: [Genre; 3] = [Genre::Sandbox, Genre::Arcade, Genre::Stealth];

/// Errors raised while planning a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// The target duration is outside the allowed window.
    #[error(
        "lensTargetDurationMs must be between {} and {}, got {duration_ms}",
        MIN_LENS_DURATION_MS,
        MAX_LENS_DURATION_MS
    )]
    DurationOutOfRange {
        /// The rejected duration.
        duration_ms: u64,
    },

    /// The catalog holds no sandbox, arcade or stealth lens.
    #[error("catalog has no base lenses")]
    NoBaseLenses,

    /// The catalog holds no boss lens.
    #[error("catalog has no boss lens")]
    NoBossLens,
}

/// A modifier that may be attached to planned lenses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutatorDefinition {
    /// Mutator id.
    pub id: &'static str,
    /// Only lenses of this genre may draw it. `None` applies to all.
    pub applies_to: Option<Genre>,
}

impl MutatorDefinition {
    /// Whether a lens of `genre` may draw this mutator.
    pub fn applies_to(&self, genre: Genre) -> bool {
        self.applies_to.is_none_or(|g| g == genre)
    }
}

/// The mutator pool drawn from for base lenses.
pub fn standard_mutators() -> Vec<MutatorDefinition> {
    vec![
        MutatorDefinition {
            id: "mutator/double-enemies",
            applies_to: Some(Genre::Arcade),
        },
        MutatorDefinition {
            id: "mutator/volatile-world",
            applies_to: None,
        },
        MutatorDefinition {
            id: "mutator/shadow-ops",
            applies_to: Some(Genre::Stealth),
        },
    ]
}

/// One lens slot in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedLens {
    /// Lens to run.
    pub lens_id: String,
    /// Its genre.
    pub genre: Genre,
    /// Mutators attached, in pool order.
    pub mutators: Vec<String>,
    /// How long the lens should last.
    pub target_duration_ms: u64,
}

/// A complete run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPlan {
    /// `run-{seed}`.
    pub run_id: String,
    /// Seed the plan was drawn from.
    pub seed: u64,
    /// Base lenses in play order.
    pub lens_sequence: Vec<PlannedLens>,
    /// Closing boss lens.
    pub boss_lens: PlannedLens,
}

impl RunPlan {
    /// Every planned lens in play order, boss last.
    pub fn lenses(&self) -> impl Iterator<Item = &PlannedLens> {
        self.lens_sequence
            .iter()
            .chain(core::iter::once(&self.boss_lens))
    }
}

/// Stages a run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunPhase {
    /// Players gather.
    Lobby,
    /// Base lenses play out.
    LensSequence,
    /// The boss lens plays out.
    BossLens,
    /// The run is over.
    RunEnd,
}

impl core::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Lobby => "lobby/nexus",
            Self::LensSequence => "lens-sequence",
            Self::BossLens => "boss-lens",
            Self::RunEnd => "run-end",
        })
    }
}

/// Reject durations outside two to five minutes.
pub const fn check_lens_duration(duration_ms: u64) -> Result<u64, PlanError> {
    if duration_ms < MIN_LENS_DURATION_MS || duration_ms > MAX_LENS_DURATION_MS {
        return Err(PlanError::DurationOutOfRange { duration_ms });
    }
    Ok(duration_ms)
}

/// Plan a run from `seed` over the lenses in `catalog`.
pub fn build_run_plan(
    seed: u64,
    lens_target_duration_ms: u64,
    catalog: &LensCatalog,
) -> Result<RunPlan, PlanError> {
    let target_duration_ms = check_lens_duration(lens_target_duration_ms)?;

    let mut base: Vec<_> = catalog
        .iter()
        .filter(|entry| BASE_GENRES.contains(&entry.genre))
        .collect();
    if base.is_empty() {
        return Err(PlanError::NoBaseLenses);
    }
    let boss = catalog
        .by_genre(Genre::Boss)
        .next()
        .ok_or(PlanError::NoBossLens)?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    base.shuffle(&mut rng);

    let pool = standard_mutators();
    let lens_sequence = base
        .into_iter()
        .map(|entry| PlannedLens {
            lens_id: entry.manifest.lens_id.clone(),
            genre: entry.genre,
            mutators: pool
                .iter()
                .filter(|m| m.applies_to(entry.genre))
                .filter(|_| rng.random::<f64>() > MUTATOR_THRESHOLD)
                .map(|m| m.id.to_owned())
                .collect(),
            target_duration_ms,
        })
        .collect();

    Ok(RunPlan {
        run_id: format!("run-{seed}"),
        seed,
        lens_sequence,
        boss_lens: PlannedLens {
            lens_id: boss.manifest.lens_id.clone(),
            genre: boss.genre,
            mutators: vec![BOSS_MUTATOR.to_owned()],
            target_duration_ms,
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn same_seed_same_plan() {
        let catalog = LensCatalog::standard();
        let a = build_run_plan(7, MIN_LENS_DURATION_MS, &catalog).unwrap();
        let b = build_run_plan(7, MIN_LENS_DURATION_MS, &catalog).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.run_id, "run-7");
    }

    #[test]
    fn plan_visits_each_base_lens_once_then_the_boss() {
        let plan = build_run_plan(42, 180_000, &LensCatalog::standard()).unwrap();
        let ids: BTreeSet<_> = plan.lens_sequence.iter().map(|l| l.lens_id.as_str()).collect();
        assert_eq!(
            ids,
            BTreeSet::from([
                "lens/arcade-skirmish",
                "lens/echo",
                "lens/stealth-infiltration"
            ])
        );
        assert_eq!(plan.boss_lens.lens_id, "boss/overseer-prototype");
        assert_eq!(plan.boss_lens.mutators, [BOSS_MUTATOR]);
        assert_eq!(plan.lenses().count(), 4);
        assert!(plan.lenses().all(|l| l.target_duration_ms == 180_000));
    }

    #[test]
    fn mutators_respect_genre() {
        let catalog = LensCatalog::standard();
        for seed in 0..32 {
            let plan = build_run_plan(seed, MIN_LENS_DURATION_MS, &catalog).unwrap();
            for lens in &plan.lens_sequence {
                for id in &lens.mutators {
                    let def = standard_mutators().into_iter().find(|m| m.id == id.as_str()).unwrap();
                    assert!(def.applies_to(lens.genre), "{id} on {}", lens.genre);
                }
            }
        }
    }

    #[test]
    fn duration_window_is_enforced() {
        let catalog = LensCatalog::standard();
        assert_eq!(
            build_run_plan(1, MIN_LENS_DURATION_MS - 1, &catalog),
            Err(PlanError::DurationOutOfRange {
                duration_ms: MIN_LENS_DURATION_MS - 1
            })
        );
        assert!(build_run_plan(1, MAX_LENS_DURATION_MS + 1, &catalog).is_err());
        assert!(build_run_plan(1, MAX_LENS_DURATION_MS, &catalog).is_ok());
    }

    #[test]
    fn catalog_without_boss_is_rejected() {
        let mut catalog = LensCatalog::default();
        let echo = LensCatalog::standard().get("lens/echo").cloned().unwrap();
        catalog.register(echo);
        assert_eq!(
            build_run_plan(1, MIN_LENS_DURATION_MS, &catalog),
            Err(PlanError::NoBossLens)
        );
        assert_eq!(
            build_run_plan(1, MIN_LENS_DURATION_MS, &LensCatalog::default()),
            Err(PlanError::NoBaseLenses)
        );
    }

    #[test]
    fn phases_render_their_wire_names() {
        assert_eq!(RunPhase::Lobby.to_string(), "lobby/nexus");
        assert_eq!(RunPhase::RunEnd.to_string(), "run-end");
    }
}
