// 🎛️ Filter State - excluded accounts and manual column choices
//
// Mutations only record intent. The session re-runs aggregation against
// the original rows after every change, so nothing here is cumulative.

use crate::fields::{FieldBinding, FieldKind};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterState {
    excluded: Vec<String>,
    overrides: FieldBinding,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Excluded accounts in the order they were excluded.
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    pub fn is_excluded(&self, account: &str) -> bool {
        self.excluded.iter().any(|a| a == account)
    }

    /// Returns true if the account was not already excluded.
    pub fn exclude(&mut self, account: &str) -> bool {
        if self.is_excluded(account) {
            return false;
        }
        self.excluded.push(account.to_string());
        true
    }

    /// Returns true if the account was excluded.
    pub fn restore(&mut self, account: &str) -> bool {
        let before = self.excluded.len();
        self.excluded.retain(|a| a != account);
        self.excluded.len() != before
    }

    pub fn overrides(&self) -> &FieldBinding {
        &self.overrides
    }

    pub fn field_override(&self, kind: FieldKind) -> Option<&str> {
        self.overrides.get(kind)
    }

    /// Pin a field to a column; `None` goes back to auto-detection.
    /// Returns true if the override changed.
    pub fn set_field_override(&mut self, kind: FieldKind, name: Option<String>) -> bool {
        let name = name.filter(|n| !n.is_empty());
        if self.overrides.get(kind) == name.as_deref() {
            return false;
        }
        self.overrides.set(kind, name);
        true
    }

    /// Effective binding: overrides win over inferred columns.
    pub fn resolve(&self, inferred: &FieldBinding) -> FieldBinding {
        let mut binding = FieldBinding::default();
        for kind in FieldKind::ALL {
            let name = self
                .overrides
                .get(kind)
                .or_else(|| inferred.get(kind))
                .map(str::to_string);
            binding.set(kind, name);
        }
        binding
    }

    pub fn clear(&mut self) {
        self.excluded.clear();
        self.overrides = FieldBinding::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude_is_idempotent() {
        let mut filters = FilterState::new();
        assert!(filters.exclude("Rent"));
        assert!(!filters.exclude("Rent"));
        assert_eq!(filters.excluded(), &["Rent".to_string()]);
    }

    #[test]
    fn test_restore_is_idempotent() {
        let mut filters = FilterState::new();
        assert!(!filters.restore("Rent"));
        filters.exclude("Rent");
        filters.exclude("Meals");
        assert!(filters.restore("Rent"));
        assert!(!filters.restore("Rent"));
        assert_eq!(filters.excluded(), &["Meals".to_string()]);
    }

    #[test]
    fn test_override_wins_over_inferred() {
        let inferred = FieldBinding {
            date: Some("Date".to_string()),
            amount: Some("Amount".to_string()),
            account: Some("Split".to_string()),
        };
        let mut filters = FilterState::new();
        assert!(filters.set_field_override(FieldKind::Amount, Some("Balance".to_string())));
        assert!(!filters.set_field_override(FieldKind::Amount, Some("Balance".to_string())));

        let binding = filters.resolve(&inferred);
        assert_eq!(binding.amount.as_deref(), Some("Balance"));
        assert_eq!(binding.date.as_deref(), Some("Date"));

        assert!(filters.set_field_override(FieldKind::Amount, None));
        assert_eq!(filters.resolve(&inferred), inferred);
    }

    #[test]
    fn test_empty_override_means_auto_detect() {
        let mut filters = FilterState::new();
        assert!(!filters.set_field_override(FieldKind::Date, Some(String::new())));
        assert_eq!(filters.field_override(FieldKind::Date), None);
    }

    #[test]
    fn test_clear() {
        let mut filters = FilterState::new();
        filters.exclude("A");
        filters.set_field_override(FieldKind::Date, Some("When".to_string()));
        filters.clear();
        assert_eq!(filters, FilterState::default());
    }
}
