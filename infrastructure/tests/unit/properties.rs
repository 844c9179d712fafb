//! Property tests for name generation and size parsing.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use che_infra::domain::{dns_label, parse_memory_size, validate_volume_name, volume_name};
use proptest::prelude::*;

fn arb_unit() -> impl Strategy<Value = (&'static str, u64)> {
    prop_oneof![
        Just(("", 1)),
        Just(("k", 1024)),
        Just(("MB", 1024 * 1024)),
        Just(("g", 1024 * 1024 * 1024)),
        Just(("GiB", 1024 * 1024 * 1024)),
    ]
}

proptest! {
    /// generated volume names keep the workspace and the logical name apart
    #[test]
    fn prop_volume_names_are_namespaced(
        workspace in "workspace[a-z0-9]{8,16}",
        name in "[a-z0-9]([a-z0-9-]{0,20}[a-z0-9])?",
    ) {
        let generated = volume_name(&workspace, &name).unwrap();
        prop_assert_eq!(generated, format!("{workspace}_{name}"));
    }

    /// valid names are never rejected
    #[test]
    fn prop_valid_volume_names_pass(name in "[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?") {
        prop_assert!(validate_volume_name(&name).is_ok());
    }

    /// upper case, underscores and slashes are always rejected
    #[test]
    fn prop_invalid_volume_names_fail(
        prefix in "[a-z0-9]{0,5}",
        bad in "[A-Z_/.]",
        suffix in "[a-z0-9]{0,5}",
    ) {
        let name = format!("{prefix}{bad}{suffix}");
        prop_assert!(validate_volume_name(&name).is_err());
    }

    /// integer sizes scale by their binary unit
    #[test]
    fn prop_memory_sizes_scale_by_unit(value in 0u64..1_000_000, (unit, factor) in arb_unit()) {
        let literal = format!("{value}{unit}");
        prop_assert_eq!(parse_memory_size(&literal).unwrap(), value * factor);
    }

    /// garbage never parses
    #[test]
    fn prop_unknown_units_are_rejected(value in 1u64..1000, unit in "[xyzq]{1,3}") {
        let literal = format!("{value}{unit}");
        prop_assert!(parse_memory_size(&literal).is_err());
    }

    /// object names are always valid DNS labels
    #[test]
    fn prop_dns_labels_are_valid(raw in ".{0,100}") {
        let label = dns_label(&raw);
        prop_assert!(!label.is_empty());
        prop_assert!(label.len() <= 63);
        prop_assert!(label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        prop_assert!(!label.starts_with('-') && !label.ends_with('-'));
    }
}
