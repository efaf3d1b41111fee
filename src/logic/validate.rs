use std::collections::BTreeMap;

use crate::error::{ConfigErrors, GalaxyError, Result};
use crate::model::{
    GalaxyBlueprint, GenerationConfig, Range, RegionDistribution, RegionOverride,
};

/// A configuration that passed validation, with its distribution resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub name: String,
    pub num_sectors: u32,
    pub distribution: RegionDistribution,
    pub blueprint: GalaxyBlueprint,
}

pub struct ConfigValidator;

impl ConfigValidator {
    /// Check a full generation request. Every field violation is reported at once;
    /// a config whose only problem is a too-small sector count fails with `Capacity`.
    pub fn validate(
        name: &str,
        num_sectors: u32,
        config: &GenerationConfig,
        region_overrides: &BTreeMap<String, RegionOverride>,
        max_sectors: u32,
    ) -> Result<ValidatedConfig> {
        let mut errors = ConfigErrors::new();

        if name.trim().is_empty() {
            errors.push("name", "must not be empty");
        }
        if num_sectors > max_sectors {
            errors.push(
                "num_sectors",
                format!("{} exceeds the maximum of {}", num_sectors, max_sectors),
            );
        }

        if let Some(faction) = config.faction_territory_size {
            if faction > 100 {
                errors.push("faction_territory_size", "must be within [0, 100]");
            } else if config.region_distribution.is_none() && faction > 64 {
                errors.push(
                    "faction_territory_size",
                    "leaves no room for frontier space (maximum 64)",
                );
            }
        }

        let distribution = config.effective_distribution();
        Self::check_distribution(&distribution, &mut errors);
        Self::check_settings(config, &mut errors);

        for (region_name, region_override) in region_overrides {
            if distribution.get(region_name).is_none() {
                errors.push(
                    format!("region_overrides.{}", region_name),
                    "does not name a declared region",
                );
            }
            Self::check_override(region_name, region_override, &mut errors);
        }

        let minimum = distribution.len() as u32;
        if num_sectors < minimum.max(1) {
            if errors.is_empty() {
                return Err(GalaxyError::Capacity {
                    requested: num_sectors,
                    minimum: minimum.max(1),
                });
            }
            errors.push(
                "num_sectors",
                format!("at least {} sectors are required", minimum.max(1)),
            );
        }

        errors.into_result()?;

        let mut resolved = config.clone();
        resolved.region_distribution = Some(distribution.clone());
        Ok(ValidatedConfig {
            name: name.trim().to_string(),
            num_sectors,
            distribution,
            blueprint: GalaxyBlueprint {
                config: resolved,
                region_overrides: region_overrides.clone(),
            },
        })
    }

    /// Check only the sampling settings, used when a config accompanies an expansion.
    pub fn validate_settings(config: &GenerationConfig) -> Result<()> {
        let mut errors = ConfigErrors::new();
        Self::check_settings(config, &mut errors);
        errors.into_result()
    }

    fn check_distribution(distribution: &RegionDistribution, errors: &mut ConfigErrors) {
        if distribution.is_empty() {
            errors.push("region_distribution", "must declare at least one region");
            return;
        }
        for (name, _) in distribution.iter() {
            if name.trim().is_empty() {
                errors.push("region_distribution", "region names must not be empty");
            }
        }
        let total = distribution.total();
        if total != 100 {
            errors.push(
                "region_distribution",
                format!("ratios sum to {}, expected 100", total),
            );
        }
    }

    fn check_settings(config: &GenerationConfig, errors: &mut ConfigErrors) {
        check_unit("port_density", config.port_density, errors);
        check_unit("planet_density", config.planet_density, errors);
        check_unit(
            "warp_tunnel_probability",
            config.warp_tunnel_probability,
            errors,
        );
        if let Some(range) = &config.stability_range {
            check_unit_range("stability_range", range, errors);
        }
    }

    fn check_override(region_name: &str, region_override: &RegionOverride, errors: &mut ConfigErrors) {
        let field = |suffix: &str| format!("region_overrides.{}.{}", region_name, suffix);

        if let Some(hazard) = &region_override.hazard {
            if !hazard.is_ordered() || hazard.max > 10 {
                errors.push(field("hazard"), "must be an ordered range within [0, 10]");
            }
        }
        if let Some(richness) = &region_override.richness {
            if !richness.is_ordered() {
                errors.push(field("richness"), "min must not exceed max");
            }
        }
        if let Some(stability) = &region_override.stability {
            check_unit_range(&field("stability"), stability, errors);
        }
        if let Some(density) = region_override.port_density {
            check_unit(&field("port_density"), density, errors);
        }
        if let Some(density) = region_override.planet_density {
            check_unit(&field("planet_density"), density, errors);
        }
    }
}

fn check_unit(field: &str, value: f64, errors: &mut ConfigErrors) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(field, format!("{} is outside [0, 1]", value));
    }
}

fn check_unit_range(field: &str, range: &Range<f64>, errors: &mut ConfigErrors) {
    let within = (0.0..=1.0).contains(&range.min) && (0.0..=1.0).contains(&range.max);
    if !within || !range.is_ordered() {
        errors.push(field, "must be an ordered range within [0, 1]");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceRichness;

    fn core_border_frontier() -> GenerationConfig {
        GenerationConfig::default().with_distribution(
            RegionDistribution::new()
                .with("core", 50)
                .with("border", 30)
                .with("frontier", 20),
        )
    }

    #[test]
    fn test_valid_config_resolves_distribution() {
        let validated =
            ConfigValidator::validate("Test", 20, &core_border_frontier(), &BTreeMap::new(), 10_000)
                .unwrap();
        assert_eq!(validated.distribution.len(), 3);
        assert_eq!(
            validated.blueprint.config.region_distribution,
            Some(validated.distribution.clone())
        );
    }

    #[test]
    fn test_reports_every_violation() {
        let mut config = GenerationConfig::default().with_distribution(
            RegionDistribution::new().with("core", 60).with("border", 30),
        );
        config.port_density = 1.5;
        config.warp_tunnel_probability = -0.1;

        let err = ConfigValidator::validate("Test", 20, &config, &BTreeMap::new(), 10_000)
            .unwrap_err();
        match err {
            GalaxyError::Config(errors) => {
                assert!(errors.has_field("region_distribution"));
                assert!(errors.has_field("port_density"));
                assert!(errors.has_field("warp_tunnel_probability"));
                assert_eq!(errors.violations.len(), 3);
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_too_few_sectors_is_capacity_error() {
        let err = ConfigValidator::validate("Test", 2, &core_border_frontier(), &BTreeMap::new(), 10_000)
            .unwrap_err();
        assert!(matches!(
            err,
            GalaxyError::Capacity {
                requested: 2,
                minimum: 3
            }
        ));
    }

    #[test]
    fn test_override_must_name_declared_region() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "nexus".to_string(),
            RegionOverride {
                richness: Some(Range::new(ResourceRichness::Rich, ResourceRichness::Poor)),
                ..RegionOverride::default()
            },
        );

        let err = ConfigValidator::validate("Test", 20, &core_border_frontier(), &overrides, 10_000)
            .unwrap_err();
        match err {
            GalaxyError::Config(errors) => {
                assert!(errors.has_field("region_overrides.nexus"));
                assert!(errors.has_field("region_overrides.nexus.richness"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_faction_territory_size_bounds() {
        let config = GenerationConfig {
            faction_territory_size: Some(70),
            ..GenerationConfig::default()
        };
        let err = ConfigValidator::validate("Test", 20, &config, &BTreeMap::new(), 10_000)
            .unwrap_err();
        assert!(matches!(err, GalaxyError::Config(ref e) if e.has_field("faction_territory_size")));
    }
}
