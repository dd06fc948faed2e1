//! Plugin manifests and host-side compatibility requirements.
//!
//! Every lens ships a [`PluginManifest`] declaring the API version it was
//! built against, its capabilities, and its resource budgets. The host
//! describes what it accepts with [`CompatibilityRequirements`]. The checker
//! in `prism-lens` compares the two before any lifecycle method runs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Plugin API version implemented by this host.
pub const PLUGIN_API_VERSION: &str = "1.0.0";

/// Per-phase time budgets and heap ceiling declared by a lens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ResourceBudgets {
    /// Milliseconds allowed for one `update` call.
    pub max_update_ms: u64,
    /// Milliseconds allowed for one `decode` call.
    pub max_decode_ms: u64,
    /// Milliseconds allowed for one `encode` call.
    pub max_encode_ms: u64,
    /// Heap ceiling in megabytes.
    pub max_heap_mb: u64,
}

impl ResourceBudgets {
    /// The value of one budget field.
    pub const fn get(&self, field: BudgetField) -> u64 {
        match field {
            BudgetField::MaxUpdateMs => self.max_update_ms,
            BudgetField::MaxDecodeMs => self.max_decode_ms,
            BudgetField::MaxEncodeMs => self.max_encode_ms,
            BudgetField::MaxHeapMb => self.max_heap_mb,
        }
    }
}

/// Names one of the four [`ResourceBudgets`] fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BudgetField {
    /// `maxUpdateMs`.
    MaxUpdateMs,
    /// `maxDecodeMs`.
    MaxDecodeMs,
    /// `maxEncodeMs`.
    MaxEncodeMs,
    /// `maxHeapMb`.
    MaxHeapMb,
}

impl BudgetField {
    /// All fields in diagnostic order.
    pub const ALL: [Self; 4] = [
        Self::MaxUpdateMs,
        Self::MaxDecodeMs,
        Self::MaxEncodeMs,
        Self::MaxHeapMb,
    ];

    /// The wire name of the field.
    pub const fn name(self) -> &'static str {
        match self {
            Self::MaxUpdateMs => "maxUpdateMs",
            Self::MaxDecodeMs => "maxDecodeMs",
            Self::MaxEncodeMs => "maxEncodeMs",
            Self::MaxHeapMb => "maxHeapMb",
        }
    }
}

impl core::fmt::Display for BudgetField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// The contract a lens declares about itself. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct PluginManifest {
    /// Plugin API version the lens was built against.
    pub api_version: String,
    /// Stable lens identifier, e.g. `lens/echo`.
    pub lens_id: String,
    /// Capabilities the lens provides.
    pub capabilities: BTreeSet<String>,
    /// Declared resource budgets.
    pub resource_budgets: ResourceBudgets,
}

/// Optional lower or upper bounds on each budget field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetBounds {
    /// Bound on `maxUpdateMs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_update_ms: Option<u64>,
    /// Bound on `maxDecodeMs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_decode_ms: Option<u64>,
    /// Bound on `maxEncodeMs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_encode_ms: Option<u64>,
    /// Bound on `maxHeapMb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_heap_mb: Option<u64>,
}

impl BudgetBounds {
    /// The bound for one field, if set.
    pub const fn get(&self, field: BudgetField) -> Option<u64> {
        match field {
            BudgetField::MaxUpdateMs => self.max_update_ms,
            BudgetField::MaxDecodeMs => self.max_decode_ms,
            BudgetField::MaxEncodeMs => self.max_encode_ms,
            BudgetField::MaxHeapMb => self.max_heap_mb,
        }
    }
}

/// What the host accepts from a lens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityRequirements {
    /// Exact API version required (no range matching).
    pub api_version: String,
    /// When set, the manifest must carry exactly this lens id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens_id: Option<String>,
    /// Capabilities the manifest must declare.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// Lower bounds on declared budgets.
    #[serde(default)]
    pub min_resource_budgets: BudgetBounds,
    /// Upper bounds on declared budgets.
    #[serde(default)]
    pub max_resource_budgets: BudgetBounds,
}

impl CompatibilityRequirements {
    /// Requirements that only pin the API version.
    pub fn for_api_version(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            lens_id: None,
            required_capabilities: Vec::new(),
            min_resource_budgets: BudgetBounds::default(),
            max_resource_budgets: BudgetBounds::default(),
        }
    }
}

impl Default for CompatibilityRequirements {
    fn default() -> Self {
        Self::for_api_version(PLUGIN_API_VERSION)
    }
}

/// Outcome of a compatibility check. Lists every violation found.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Whether no violations were found.
    pub ok: bool,
    /// Human-readable violation messages, in check order.
    pub errors: Vec<String>,
}

impl CompatibilityReport {
    /// Build a report from a list of violations.
    pub const fn from_errors(errors: Vec<String>) -> Self {
        Self {
            ok: errors.is_empty(),
            errors,
        }
    }
}
