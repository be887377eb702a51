//! Status label vocabulary for convergence decisions.

use std::collections::BTreeSet;
use std::fmt;

/// Label produced when a snapshot carries no meaningful status.
pub const UNKNOWN: &str = "unknown";

/// Ordered set of status labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet(BTreeSet<String>);

impl LabelSet {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    /// The empty set; as a target it means "wait for absence".
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Labels present in both sets, in order.
    pub fn overlap(&self, other: &LabelSet) -> Vec<String> {
        self.0.intersection(&other.0).cloned().collect()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.iter().collect::<Vec<_>>().join(", "))
    }
}

/// Where an observed label falls relative to a wait's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Target,
    Pending,
    Unexpected,
}

/// Classify `label` against disjoint `pending` and `target` sets.
pub fn classify(label: &str, pending: &LabelSet, target: &LabelSet) -> Classification {
    if target.contains(label) {
        Classification::Target
    } else if pending.contains(label) {
        Classification::Pending
    } else {
        Classification::Unexpected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creating() -> LabelSet {
        LabelSet::new(["creating", "modifying"])
    }

    fn available() -> LabelSet {
        LabelSet::new(["available"])
    }

    #[test]
    fn classify_target_label() {
        assert_eq!(
            classify("available", &creating(), &available()),
            Classification::Target
        );
    }

    #[test]
    fn classify_pending_label() {
        assert_eq!(
            classify("modifying", &creating(), &available()),
            Classification::Pending
        );
    }

    #[test]
    fn classify_label_outside_vocabulary_is_unexpected() {
        assert_eq!(
            classify("failed", &creating(), &available()),
            Classification::Unexpected
        );
        assert_eq!(
            classify(UNKNOWN, &creating(), &available()),
            Classification::Unexpected
        );
    }

    #[test]
    fn labels_are_case_sensitive() {
        assert_eq!(
            classify("Available", &creating(), &available()),
            Classification::Unexpected
        );
    }

    #[test]
    fn overlap_lists_shared_labels() {
        let pending = LabelSet::new(["creating", "available"]);
        assert_eq!(pending.overlap(&available()), vec!["available".to_string()]);
        assert!(creating().overlap(&available()).is_empty());
    }

    #[test]
    fn display_is_sorted() {
        assert_eq!(creating().to_string(), "[creating, modifying]");
        assert_eq!(LabelSet::empty().to_string(), "[]");
    }
}
