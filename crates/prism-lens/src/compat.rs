//! Manifest compatibility checker.
//!
//! [`check`] compares a [`PluginManifest`] against the host's
//! [`CompatibilityRequirements`] and collects every violation instead of
//! stopping at the first, so an operator sees the full diagnostic in one go.

use prism_types::{BudgetField, CompatibilityReport, CompatibilityRequirements, PluginManifest};

use crate::runtime::LensError;

/// Check a manifest against host requirements.
///
/// Checks, in order: exact `api_version` equality, the optional `lens_id`
/// pin, every required capability, then the min and max bound of each
/// resource budget field.
pub fn check(
    manifest: &PluginManifest,
    requirements: &CompatibilityRequirements,
) -> CompatibilityReport {
    let mut errors = Vec::new();

    if manifest.api_version != requirements.api_version {
        errors.push(format!(
            "apiVersion mismatch: expected {}, got {}",
            requirements.api_version, manifest.api_version
        ));
    }

    if let Some(lens_id) = &requirements.lens_id
        && &manifest.lens_id != lens_id
    {
        errors.push(format!(
            "lensId mismatch: expected {lens_id}, got {}",
            manifest.lens_id
        ));
    }

    for capability in &requirements.required_capabilities {
        if !manifest.capabilities.contains(capability) {
            errors.push(format!("missing required capability: {capability}"));
        }
    }

    for field in BudgetField::ALL {
        let value = manifest.resource_budgets.get(field);
        if let Some(min) = requirements.min_resource_budgets.get(field)
            && value < min
        {
            errors.push(format!(
                "resourceBudgets.{field} ({value}) is below minimum ({min})"
            ));
        }
        if let Some(max) = requirements.max_resource_budgets.get(field)
            && value > max
        {
            errors.push(format!(
                "resourceBudgets.{field} ({value}) exceeds maximum ({max})"
            ));
        }
    }

    CompatibilityReport::from_errors(errors)
}

/// Like [`check`], but fails with [`LensError::Incompatible`] listing every
/// violation.
pub fn assert_compatible(
    manifest: &PluginManifest,
    requirements: &CompatibilityRequirements,
) -> Result<(), LensError> {
    let report = check(manifest, requirements);
    if report.ok {
        Ok(())
    } else {
        Err(LensError::Incompatible {
            lens_id: manifest.lens_id.clone(),
            errors: report.errors,
        })
    }
}
