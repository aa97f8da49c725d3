//! Property merging for batch publishing.

use crate::message::Properties;

/// Combine per-message properties with batch-wide common properties.
///
/// The result holds every common property plus every per-message property;
/// on a key collision the per-message value wins. Neither input is modified.
pub fn merge_properties(per_message: &Properties, common: Option<&Properties>) -> Properties {
    let mut merged = common.cloned().unwrap_or_default();
    merged.extend(
        per_message
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    merged
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
