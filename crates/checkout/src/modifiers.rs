//! Conditional modifier resolution.
//!
//! Pure functions over a product's modifier sets and the in-progress item's
//! current selection. A set with no trigger is always eligible; a triggered
//! set is eligible iff the referenced option is currently selected. The
//! input is small, so eligibility is re-evaluated on every selection change
//! with no caching.
//!
//! Eligibility is non-recursive: a trigger option's own set is not
//! consulted, so a multi-hop trigger cycle (A triggers on B's option, B on
//! A's) cannot hang the resolver - both sets simply stay hidden until one
//! of the options is somehow selected.

use std::collections::HashSet;

use thiserror::Error;

use tableside_core::{ModifierOptionId, ModifierSetId};

use crate::types::{ModifierOption, ModifierSet, SelectionType};

/// Whether a single set is currently eligible for display.
#[must_use]
pub fn is_eligible(set: &ModifierSet, selected: &HashSet<ModifierOptionId>) -> bool {
    set.triggered_by_option
        .is_none_or(|trigger| selected.contains(&trigger))
}

/// The subset of a product's modifier sets eligible to render, in the
/// original order.
#[must_use]
pub fn eligible_sets<'a>(
    sets: &'a [ModifierSet],
    selected: &HashSet<ModifierOptionId>,
) -> Vec<&'a ModifierSet> {
    sets.iter().filter(|set| is_eligible(set, selected)).collect()
}

/// Options that may serve as the trigger for the set being edited.
///
/// Excludes the edited set's own options, making direct self-reference
/// impossible at authoring time. Multi-hop cycles are not validated.
#[must_use]
pub fn trigger_candidates(
    all_sets: &[ModifierSet],
    editing: ModifierSetId,
) -> Vec<&ModifierOption> {
    all_sets
        .iter()
        .filter(|set| set.id != editing)
        .flat_map(|set| set.options.iter())
        .collect()
}

/// Effective (min, max) selection bounds for a set.
///
/// Single-select sets are always capped at 1; `None` means unlimited.
#[must_use]
pub const fn selection_bounds(set: &ModifierSet) -> (u32, Option<u32>) {
    match set.selection_type {
        SelectionType::Single => (set.min_selections, Some(1)),
        SelectionType::Multiple => (set.min_selections, set.max_selections),
    }
}

/// A selection that violates a set's bounds or membership.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("{set_name} requires at least {min} selection(s)")]
    TooFew { set_name: String, min: u32 },

    #[error("{set_name} allows at most {max} selection(s)")]
    TooMany { set_name: String, max: u32 },

    #[error("option {option_id} does not belong to {set_name}")]
    UnknownOption {
        set_name: String,
        option_id: ModifierOptionId,
    },
}

/// Check a selection against a set's bounds and membership.
///
/// # Errors
///
/// Returns the first violation found: an option outside the set, fewer than
/// `min_selections`, or more than the effective maximum.
pub fn validate_selection(
    set: &ModifierSet,
    chosen: &[ModifierOptionId],
) -> Result<(), SelectionError> {
    for option_id in chosen {
        if !set.options.iter().any(|option| option.id == *option_id) {
            return Err(SelectionError::UnknownOption {
                set_name: set.name.clone(),
                option_id: *option_id,
            });
        }
    }

    let (min, max) = selection_bounds(set);
    let count = u32::try_from(chosen.len()).unwrap_or(u32::MAX);
    if count < min {
        return Err(SelectionError::TooFew {
            set_name: set.name.clone(),
            min,
        });
    }
    if let Some(max) = max
        && count > max
    {
        return Err(SelectionError::TooMany {
            set_name: set.name.clone(),
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn option(id: i64, name: &str) -> ModifierOption {
        ModifierOption {
            id: ModifierOptionId::new(id),
            name: name.to_string(),
            price_delta: Decimal::ZERO,
            product_specific: false,
            display_order: 0,
        }
    }

    fn set(id: i64, name: &str, options: Vec<ModifierOption>) -> ModifierSet {
        ModifierSet {
            id: ModifierSetId::new(id),
            name: name.to_string(),
            selection_type: SelectionType::Multiple,
            min_selections: 0,
            max_selections: None,
            options,
            triggered_by_option: None,
        }
    }

    /// Set X holds option A; set Y is triggered by A.
    fn trigger_fixture() -> Vec<ModifierSet> {
        let set_x = set(1, "Protein", vec![option(10, "Tofu"), option(11, "Chicken")]);
        let mut set_y = set(2, "Tofu Preparation", vec![option(20, "Fried")]);
        set_y.triggered_by_option = Some(ModifierOptionId::new(10));
        vec![set_x, set_y]
    }

    #[test]
    fn test_untriggered_set_always_eligible() {
        let sets = trigger_fixture();
        let eligible = eligible_sets(&sets, &HashSet::new());
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible.first().map(|s| s.name.as_str()), Some("Protein"));
    }

    #[test]
    fn test_selecting_trigger_makes_set_eligible() {
        let sets = trigger_fixture();
        let selected: HashSet<_> = [ModifierOptionId::new(10)].into();
        let eligible = eligible_sets(&sets, &selected);
        assert_eq!(eligible.len(), 2);
    }

    #[test]
    fn test_deselecting_trigger_removes_eligibility() {
        let sets = trigger_fixture();
        let selected: HashSet<_> = [ModifierOptionId::new(10)].into();
        assert_eq!(eligible_sets(&sets, &selected).len(), 2);

        // Swap the selection to a non-trigger option.
        let selected: HashSet<_> = [ModifierOptionId::new(11)].into();
        let eligible = eligible_sets(&sets, &selected);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible.first().map(|s| s.name.as_str()), Some("Protein"));
    }

    #[test]
    fn test_trigger_candidates_exclude_own_set() {
        let sets = trigger_fixture();
        let candidates = trigger_candidates(&sets, ModifierSetId::new(2));
        let names: Vec<_> = candidates.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Tofu", "Chicken"]);
    }

    #[test]
    fn test_single_select_caps_max_at_one() {
        let mut s = set(3, "Size", vec![option(30, "Small"), option(31, "Large")]);
        s.selection_type = SelectionType::Single;
        s.max_selections = Some(5); // ignored for single-select
        assert_eq!(selection_bounds(&s), (0, Some(1)));
    }

    #[test]
    fn test_validate_selection_bounds() {
        let mut s = set(4, "Toppings", vec![option(40, "Basil"), option(41, "Mint")]);
        s.min_selections = 1;
        s.max_selections = Some(1);

        assert_eq!(
            validate_selection(&s, &[]),
            Err(SelectionError::TooFew {
                set_name: "Toppings".to_string(),
                min: 1,
            })
        );
        assert!(validate_selection(&s, &[ModifierOptionId::new(40)]).is_ok());
        assert_eq!(
            validate_selection(
                &s,
                &[ModifierOptionId::new(40), ModifierOptionId::new(41)]
            ),
            Err(SelectionError::TooMany {
                set_name: "Toppings".to_string(),
                max: 1,
            })
        );
    }

    #[test]
    fn test_validate_selection_rejects_foreign_option() {
        let s = set(5, "Spice", vec![option(50, "Mild")]);
        assert_eq!(
            validate_selection(&s, &[ModifierOptionId::new(99)]),
            Err(SelectionError::UnknownOption {
                set_name: "Spice".to_string(),
                option_id: ModifierOptionId::new(99),
            })
        );
    }
}
