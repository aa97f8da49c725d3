//! Tests for property merging.

use super::*;
use crate::message::PropertyValue;

fn props(pairs: &[(&str, &str)]) -> Properties {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), PropertyValue::from(*value)))
        .collect()
}

#[test]
fn test_message_value_wins_on_collision() {
    let common = props(&[("env", "prod")]);
    let per_message = props(&[("env", "test")]);

    let merged = merge_properties(&per_message, Some(&common));

    assert_eq!(merged.get("env"), Some(&PropertyValue::from("test")));
}

#[test]
fn test_common_value_applies_without_override() {
    let common = props(&[("env", "prod")]);
    let per_message = Properties::new();

    let merged = merge_properties(&per_message, Some(&common));

    assert_eq!(merged, common);
}

#[test]
fn test_union_of_disjoint_keys() {
    let common = props(&[("env", "prod"), ("region", "eu")]);
    let per_message = props(&[("tenant", "acme")]);

    let merged = merge_properties(&per_message, Some(&common));

    assert_eq!(merged.len(), 3);
    assert_eq!(merged.get("region"), Some(&PropertyValue::from("eu")));
    assert_eq!(merged.get("tenant"), Some(&PropertyValue::from("acme")));
}

#[test]
fn test_inputs_are_not_modified() {
    let common = props(&[("env", "prod")]);
    let per_message = props(&[("env", "test"), ("tenant", "acme")]);
    let common_before = common.clone();
    let per_message_before = per_message.clone();

    let _merged = merge_properties(&per_message, Some(&common));

    assert_eq!(common, common_before);
    assert_eq!(per_message, per_message_before);
}

#[test]
fn test_absent_common_properties() {
    let per_message = props(&[("tenant", "acme")]);

    let merged = merge_properties(&per_message, None);

    assert_eq!(merged, per_message);
}

#[test]
fn test_merge_is_deterministic() {
    let common = props(&[("a", "1"), ("b", "2"), ("c", "3")]);
    let per_message = props(&[("b", "x"), ("d", "4")]);

    let first = merge_properties(&per_message, Some(&common));
    let second = merge_properties(&per_message, Some(&common));

    assert_eq!(first, second);
}
