//! Dirty and modified attribute detection.
//!
//! Pure comparisons of two state snapshots, attribute by attribute. An
//! unfetched current slot carries no information and is never dirty; an
//! unfetched previous slot has no baseline, so any loaded current value is
//! dirty.

use crate::{model::attribute::AttributeModel, value::Slot};

/// Indexes of attributes whose current value differs from the previous one,
/// or `None` if nothing changed.
///
/// `include_columns` is aligned with `attributes`: one column mask per attribute.
#[must_use]
pub fn find_dirty(
    attributes: &[AttributeModel],
    current: &[Slot],
    previous: &[Slot],
    include_columns: &[Vec<bool>],
) -> Option<Vec<usize>> {
    collect_changed(attributes, current, previous, include_columns, |_| true)
}

/// Like [`find_dirty`], restricted to attributes flagged in `participates`.
#[must_use]
pub fn find_modified(
    attributes: &[AttributeModel],
    current: &[Slot],
    previous: &[Slot],
    include_columns: &[Vec<bool>],
    participates: &[bool],
) -> Option<Vec<usize>> {
    collect_changed(attributes, current, previous, include_columns, |index| {
        participates.get(index).copied().unwrap_or(false)
    })
}

/// Single-attribute rule shared by both scans.
#[must_use]
pub fn is_changed(
    attribute: &AttributeModel,
    current: &Slot,
    previous: &Slot,
    include_columns: &[bool],
) -> bool {
    match (current, previous) {
        (Slot::Unfetched, _) => false,
        (Slot::Loaded(_), Slot::Unfetched) => true,
        (Slot::Loaded(new), Slot::Loaded(old)) => {
            attribute.kind.is_dirty(old, new, include_columns)
        }
    }
}

fn collect_changed(
    attributes: &[AttributeModel],
    current: &[Slot],
    previous: &[Slot],
    include_columns: &[Vec<bool>],
    participates: impl Fn(usize) -> bool,
) -> Option<Vec<usize>> {
    debug_assert_eq!(current.len(), attributes.len(), "current state arity");
    debug_assert_eq!(previous.len(), attributes.len(), "previous state arity");

    let changed: Vec<usize> = attributes
        .iter()
        .zip(current.iter().zip(previous))
        .enumerate()
        .filter(|(index, (attribute, (current, previous)))| {
            participates(*index)
                && include_columns.get(*index).is_some_and(|mask| {
                    is_changed(attribute, current, previous, mask)
                })
        })
        .map(|(index, _)| index)
        .collect();

    (!changed.is_empty()).then_some(changed)
}
