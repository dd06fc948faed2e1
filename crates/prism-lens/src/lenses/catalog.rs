use std::collections::{BTreeMap, BTreeSet};

use prism_types::{PLUGIN_API_VERSION, PluginManifest, ResourceBudgets};
use serde::{Deserialize, Serialize};

use super::{EchoLens, JitterLens};
use crate::plugin::LensPlugin;

/// Gameplay genre of a lens. Run planning filters mutators by genre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Genre {
    /// Free-form sandbox.
    Sandbox,
    /// Arcade combat.
    Arcade,
    /// Stealth infiltration.
    Stealth,
    /// Boss encounter closing a run.
    Boss,
    /// Host tooling, never planned into a run.
    Utility,
}

impl core::fmt::Display for Genre {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Sandbox => "sandbox",
            Self::Arcade => "arcade",
            Self::Stealth => "stealth",
            Self::Boss => "boss",
            Self::Utility => "utility",
        })
    }
}

/// Which implementation backs a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LensKind {
    /// [`EchoLens`].
    Echo,
    /// [`JitterLens`].
    Jitter,
}

/// One lens known to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// The lens's manifest.
    pub manifest: PluginManifest,
    /// Its genre.
    pub genre: Genre,
    /// Its implementation.
    pub kind: LensKind,
}

/// The manifest shared by the built-in lenses.
pub fn standard_manifest(lens_id: &str) -> PluginManifest {
    PluginManifest {
        api_version: PLUGIN_API_VERSION.to_owned(),
        lens_id: lens_id.to_owned(),
        capabilities: ["decode", "update", "encode", "render"]
            .into_iter()
            .map(str::to_owned)
            .collect::<BTreeSet<_>>(),
        resource_budgets: ResourceBudgets {
            max_update_ms: 8,
            max_decode_ms: 8,
            max_encode_ms: 8,
            max_heap_mb: 64,
        },
    }
}

/// Lenses the host can instantiate, keyed by lens id.
#[derive(Debug, Clone, Default)]
pub struct LensCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl LensCatalog {
    /// The built-in lens set.
    pub fn standard() -> Self {
        let mut catalog = Self::default();
        for (lens_id, genre, kind) in [
            ("lens/echo", Genre::Sandbox, LensKind::Echo),
            ("lens/arcade-skirmish", Genre::Arcade, LensKind::Echo),
            ("lens/stealth-infiltration", Genre::Stealth, LensKind::Echo),
            ("boss/overseer-prototype", Genre::Boss, LensKind::Echo),
            ("lens/jitter", Genre::Utility, LensKind::Jitter),
        ] {
            catalog.register(CatalogEntry {
                manifest: standard_manifest(lens_id),
                genre,
                kind,
            });
        }
        catalog
    }

    /// Add or replace an entry.
    pub fn register(&mut self, entry: CatalogEntry) {
        self.entries.insert(entry.manifest.lens_id.clone(), entry);
    }

    /// Look up an entry.
    pub fn get(&self, lens_id: &str) -> Option<&CatalogEntry> {
        self.entries.get(lens_id)
    }

    /// Instantiate a fresh plugin for `lens_id`.
    pub fn instantiate(&self, lens_id: &str) -> Option<Box<dyn LensPlugin>> {
        self.get(lens_id).map(|entry| -> Box<dyn LensPlugin> {
            match entry.kind {
                LensKind::Echo => Box::new(EchoLens::new(entry.manifest.clone())),
                LensKind::Jitter => Box::new(JitterLens::new(entry.manifest.clone())),
            }
        })
    }

    /// Entries of the given genre, in lens id order.
    pub fn by_genre(&self, genre: Genre) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values().filter(move |e| e.genre == genre)
    }

    /// Every entry, in lens id order.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }
}
