//! Input selector code and label mapping
//!
//! Receivers identify inputs by a two-character `SLI` code. The registry
//! starts from a built-in table and narrows or relabels it per device.

use std::collections::{BTreeMap, BTreeSet};

use crate::descriptor::DeviceDescriptor;

/// Built-in labels for the common selector codes
pub const DEFAULT_INPUT_LABELS: &[(&str, &str)] = &[
    ("00", "Video 1"),
    ("01", "Video 2"),
    ("02", "GAME"),
    ("03", "AUX"),
    ("04", "Video 5"),
    ("05", "Video 6"),
    ("06", "Video 7"),
    ("10", "BD/DVD"),
    ("12", "TV"),
    ("20", "TV"),
    ("21", "TV/CD"),
    ("22", "Cable/Sat"),
    ("23", "HDMI 1"),
    ("24", "HDMI 2"),
    ("25", "HDMI 3"),
    ("26", "HDMI 4"),
    ("2E", "BT Audio"),
    ("30", "CD"),
    ("31", "FM"),
    ("32", "AM"),
    ("40", "USB"),
    ("41", "Network"),
    ("44", "Bluetooth"),
    ("80", "USB Front"),
    ("81", "USB Rear"),
];

/// Label used for codes that have no better name
pub fn generated_label(code: &str) -> String {
    format!("SLI {}", code)
}

/// One selectable input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputChoice {
    pub code: String,
    pub label: String,
}

/// Merged code to label mapping for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLabelRegistry {
    labels: BTreeMap<String, String>,
}

impl Default for InputLabelRegistry {
    fn default() -> Self {
        Self {
            labels: DEFAULT_INPUT_LABELS
                .iter()
                .map(|(code, label)| (code.to_string(), label.to_string()))
                .collect(),
        }
    }
}

impl InputLabelRegistry {
    /// Build the registry for a device from its active codes and overrides
    pub fn from_descriptor(descriptor: &DeviceDescriptor) -> Self {
        Self::build(descriptor.active_codes(), descriptor.label_overrides())
    }

    /// Build from an optional active set and a set of label overrides
    ///
    /// An empty active set is treated as undeclared.
    pub fn build(
        active: Option<BTreeSet<String>>,
        overrides: BTreeMap<String, String>,
    ) -> Self {
        let defaults = Self::default();
        let active = active.filter(|codes| !codes.is_empty());

        let mut labels = match &active {
            Some(codes) => codes
                .iter()
                .map(|code| {
                    let label = defaults
                        .labels
                        .get(code)
                        .cloned()
                        .unwrap_or_else(|| generated_label(code));
                    (code.clone(), label)
                })
                .collect(),
            None => defaults.labels,
        };

        for (code, label) in overrides {
            if let Some(codes) = &active {
                if !codes.contains(&code) {
                    continue;
                }
            }
            let label = if label.trim().is_empty() {
                generated_label(&code)
            } else {
                label
            };
            labels.insert(code, label);
        }

        Self { labels }
    }

    pub fn label(&self, code: &str) -> Option<&str> {
        self.labels.get(code).map(String::as_str)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.labels.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Choices ordered by code, skipping blank labels
    pub fn choices(&self) -> Vec<InputChoice> {
        self.labels
            .iter()
            .filter(|(_, label)| !label.trim().is_empty())
            .map(|(code, label)| InputChoice {
                code: code.clone(),
                label: label.clone(),
            })
            .collect()
    }

    /// Code whose label matches `label`, ignoring ASCII case
    pub fn resolve_label(&self, label: &str) -> Option<&str> {
        let wanted = label.trim();
        self.labels
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(wanted))
            .map(|(code, _)| code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn active(codes: &[&str]) -> Option<BTreeSet<String>> {
        Some(codes.iter().map(|c| c.to_string()).collect())
    }

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(c, l)| (c.to_string(), l.to_string()))
            .collect()
    }

    #[test]
    fn test_default_table() {
        let registry = InputLabelRegistry::default();
        assert_eq!(registry.len(), DEFAULT_INPUT_LABELS.len());
        assert_eq!(registry.label("23"), Some("HDMI 1"));
        assert_eq!(registry.label("2E"), Some("BT Audio"));
    }

    #[test]
    fn test_choices_are_sorted_by_code() {
        let registry = InputLabelRegistry::default();
        let codes: Vec<_> = registry.choices().into_iter().map(|c| c.code).collect();
        let mut sorted = codes.clone();
        sorted.sort();
        assert_eq!(codes, sorted);
        assert_eq!(codes.first().map(String::as_str), Some("00"));
    }

    #[test]
    fn test_active_set_narrows_and_generates_labels() {
        let registry = InputLabelRegistry::build(active(&["23", "41", "55"]), BTreeMap::new());

        let choices = registry.choices();
        assert_eq!(choices.len(), 3);
        assert_eq!(registry.label("23"), Some("HDMI 1"));
        assert_eq!(registry.label("55"), Some("SLI 55"));
        assert!(!registry.contains("10"));
    }

    #[test]
    fn test_empty_active_set_keeps_defaults() {
        let registry = InputLabelRegistry::build(active(&[]), BTreeMap::new());
        assert_eq!(registry, InputLabelRegistry::default());
    }

    #[test]
    fn test_overrides_respect_active_set() {
        let registry = InputLabelRegistry::build(
            active(&["23", "24"]),
            overrides(&[("23", "Apple TV"), ("10", "Blu-ray"), ("24", "  ")]),
        );

        assert_eq!(registry.label("23"), Some("Apple TV"));
        assert_eq!(registry.label("24"), Some("SLI 24"));
        assert!(!registry.contains("10"));
    }

    #[test]
    fn test_overrides_without_active_set_extend_defaults() {
        let registry =
            InputLabelRegistry::build(None, overrides(&[("10", "Blu-ray"), ("99", "Phono")]));

        assert_eq!(registry.label("10"), Some("Blu-ray"));
        assert_eq!(registry.label("99"), Some("Phono"));
        assert_eq!(registry.len(), DEFAULT_INPUT_LABELS.len() + 1);
    }

    #[rstest]
    #[case("HDMI 1", Some("23"))]
    #[case("hdmi 1", Some("23"))]
    #[case(" Bluetooth ", Some("44"))]
    #[case("HDMI", None)]
    fn test_resolve_label(#[case] label: &str, #[case] expected: Option<&str>) {
        let registry = InputLabelRegistry::default();
        assert_eq!(registry.resolve_label(label), expected);
    }

    #[test]
    fn test_from_descriptor() {
        let descriptor = DeviceDescriptor::new("10.0.0.5")
            .with_meta("activeSliCodes", json!([23, "2E"]))
            .with_meta("inputLabel_23", "Console");

        let registry = InputLabelRegistry::from_descriptor(&descriptor);
        let choices = registry.choices();
        assert_eq!(
            choices,
            vec![
                InputChoice {
                    code: "23".to_string(),
                    label: "Console".to_string()
                },
                InputChoice {
                    code: "2E".to_string(),
                    label: "BT Audio".to_string()
                },
            ]
        );
    }
}
