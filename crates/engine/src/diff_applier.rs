//! C4: transforms an Annotation by a single-revision diff.
//!
//! Pure functions, no I/O beyond TUID allocation. Grounded directly on
//! `_apply_diff` in the original service: merge filter first, then file
//! selection (with rename/tombstone handling), then per-change splice with
//! the `+1` line bias folded into plain `Vec` index math (inserting at
//! index `change.line` lands the new entry at 1-based position
//! `change.line + 1`, which already shifts every later entry up by one).

use tuid_concurrency::TuidAllocator;
use tuid_core::error::{Error, Result};
use tuid_core::traits::CounterPersistence;
use tuid_core::types::{Annotation, ChangeAction, Diff, FileKey, Tuid};

/// Apply `diff` to `annotation` moving forward in time (spec §4.4).
///
/// Returns the transformed annotation and the (possibly renamed) filename
/// subsequent steps should use.
pub fn apply_forward<P: CounterPersistence>(
    annotation: &Annotation,
    diff: &Diff,
    file: &FileKey,
    allocator: &TuidAllocator<P>,
) -> Result<(Annotation, FileKey)> {
    if diff.merge {
        return Ok((annotation.clone(), file.clone()));
    }
    if file.is_dev_null() {
        return Ok((Annotation::tombstone(), file.clone()));
    }

    let entry = match diff.entry_for(file) {
        Some(entry) => entry,
        None => return Ok((annotation.clone(), file.clone())),
    };

    if entry.new_name.is_dev_null() {
        return Ok((Annotation::tombstone(), file.clone()));
    }

    let current_file = if entry.old_name != entry.new_name {
        entry.new_name.clone()
    } else {
        file.clone()
    };

    let mut lines: Vec<Tuid> = annotation.as_slice().to_vec();
    for change in &entry.changes {
        let index = change.line as usize;
        match change.action {
            ChangeAction::Add => {
                if index > lines.len() {
                    return Err(Error::DiffInconsistency {
                        reason: format!("add at out-of-range line {}", change.line + 1),
                    });
                }
                let tuid = allocator.next_tuid()?;
                lines.insert(index, tuid);
            }
            ChangeAction::Remove => {
                if index >= lines.len() {
                    return Err(Error::DiffInconsistency {
                        reason: format!("remove at out-of-range line {}", change.line + 1),
                    });
                }
                lines.remove(index);
            }
        }
    }

    Ok((Annotation::from_tuids(lines), current_file))
}

/// Apply `diff` moving backward in time (spec §4.4's `apply_backwards`
/// variant): invert every change's action and process changes in reverse
/// order.
///
/// A net removal going forward (line present in the parent, absent in the
/// child) is reintroduced here by allocating a **new** TUID rather than
/// recovering the line's original identity — the diff record carries only
/// `{action, line}`, not the removed line's historical TUID, so true
/// identity recovery is only possible when an intermediate Annotation was
/// already cached for this point (the common path, since the Frontier
/// Mover records one at every step it walks forward). Callers that need
/// guaranteed identity for a cold backward walk should prefer re-annotating
/// via the Annotation Acquirer over this fallback.
pub fn apply_backward<P: CounterPersistence>(
    annotation: &Annotation,
    diff: &Diff,
    file: &FileKey,
    allocator: &TuidAllocator<P>,
) -> Result<(Annotation, FileKey)> {
    if diff.merge {
        return Ok((annotation.clone(), file.clone()));
    }

    let entry = match diff.entry_for(file) {
        Some(entry) => entry,
        None => return Ok((annotation.clone(), file.clone())),
    };

    // Going backward the diff's new-name is the name we were called with;
    // the result reverts to old-name.
    let previous_file = if entry.old_name != entry.new_name {
        entry.old_name.clone()
    } else {
        file.clone()
    };

    if file.is_dev_null() {
        // We're undoing a tombstone: the file existed before this diff.
        return Ok((Annotation::tombstone(), previous_file));
    }

    let mut lines: Vec<Tuid> = annotation.as_slice().to_vec();
    for change in entry.changes.iter().rev() {
        let index = change.line as usize;
        match change.action {
            // Forward add -> backward remove.
            ChangeAction::Add => {
                if index >= lines.len() {
                    return Err(Error::DiffInconsistency {
                        reason: format!("backward remove at out-of-range line {}", change.line + 1),
                    });
                }
                lines.remove(index);
            }
            // Forward remove -> backward reinsert (best-effort identity).
            ChangeAction::Remove => {
                if index > lines.len() {
                    return Err(Error::DiffInconsistency {
                        reason: format!("backward insert at out-of-range line {}", change.line + 1),
                    });
                }
                let tuid = allocator.next_tuid()?;
                tracing::warn!(
                    file = %previous_file,
                    line = change.line + 1,
                    "backward walk reintroduced a removed line with a freshly allocated TUID"
                );
                lines.insert(index, tuid);
            }
        }
    }

    Ok((Annotation::from_tuids(lines), previous_file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tuid_core::error::Result as CoreResult;
    use tuid_core::traits::CounterPersistence;
    use tuid_core::types::{ChangeOp, FileDiffEntry};

    struct CountingPersistence;

    impl CounterPersistence for CountingPersistence {
        fn load(&self) -> CoreResult<u64> {
            Ok(0)
        }
        fn persist(&self, _high_water_mark: u64) -> CoreResult<()> {
            Ok(())
        }
    }

    fn allocator() -> TuidAllocator<CountingPersistence> {
        TuidAllocator::new(CountingPersistence).unwrap()
    }

    fn seed(values: &[u64]) -> Annotation {
        Annotation::from_tuids(values.iter().map(|v| Tuid::new(*v)).collect())
    }

    #[test]
    fn merge_diff_is_noop() {
        let alloc = allocator();
        let ann = seed(&[1, 2, 3]);
        let diff = Diff {
            merge: true,
            files: vec![],
        };
        let (result, name) = apply_forward(&ann, &diff, &FileKey::new("a.txt"), &alloc).unwrap();
        assert_eq!(result, ann);
        assert_eq!(name.as_str(), "a.txt");
    }

    #[test]
    fn forward_insert_shifts_and_allocates() {
        let alloc = allocator();
        let ann = seed(&[1, 2, 3]);
        let diff = Diff {
            merge: false,
            files: vec![FileDiffEntry {
                old_name: FileKey::new("a.txt"),
                new_name: FileKey::new("a.txt"),
                changes: vec![ChangeOp {
                    action: ChangeAction::Add,
                    line: 1,
                }],
            }],
        };
        let (result, _) = apply_forward(&ann, &diff, &FileKey::new("a.txt"), &alloc).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.as_slice()[0].value(), 1);
        assert_eq!(result.as_slice()[2].value(), 2);
        assert_eq!(result.as_slice()[3].value(), 3);
    }

    #[test]
    fn forward_remove_shifts_down() {
        let alloc = allocator();
        let ann = seed(&[1, 4, 2, 3]);
        let diff = Diff {
            merge: false,
            files: vec![FileDiffEntry {
                old_name: FileKey::new("a.txt"),
                new_name: FileKey::new("a.txt"),
                changes: vec![ChangeOp {
                    action: ChangeAction::Remove,
                    line: 2,
                }],
            }],
        };
        let (result, _) = apply_forward(&ann, &diff, &FileKey::new("a.txt"), &alloc).unwrap();
        assert_eq!(
            result.as_slice().iter().map(|t| t.value()).collect::<Vec<_>>(),
            vec![1, 4, 3]
        );
    }

    #[test]
    fn rename_tracks_new_name() {
        let alloc = allocator();
        let ann = seed(&[1, 4, 3]);
        let diff = Diff {
            merge: false,
            files: vec![FileDiffEntry {
                old_name: FileKey::new("a.txt"),
                new_name: FileKey::new("b.txt"),
                changes: vec![],
            }],
        };
        let (result, name) = apply_forward(&ann, &diff, &FileKey::new("a.txt"), &alloc).unwrap();
        assert_eq!(name.as_str(), "b.txt");
        assert_eq!(result, ann);
    }

    #[test]
    fn rename_from_dev_null_tombstones_old_name_query() {
        let alloc = allocator();
        let ann = seed(&[]);
        let diff = Diff {
            merge: false,
            files: vec![FileDiffEntry {
                old_name: FileKey::new("a.txt"),
                new_name: FileKey::new("dev/null"),
                changes: vec![],
            }],
        };
        let (result, _) = apply_forward(&ann, &diff, &FileKey::new("a.txt"), &alloc).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn unrelated_diff_is_passthrough() {
        let alloc = allocator();
        let ann = seed(&[1, 2]);
        let diff = Diff {
            merge: false,
            files: vec![FileDiffEntry {
                old_name: FileKey::new("other.txt"),
                new_name: FileKey::new("other.txt"),
                changes: vec![ChangeOp {
                    action: ChangeAction::Add,
                    line: 0,
                }],
            }],
        };
        let (result, name) = apply_forward(&ann, &diff, &FileKey::new("a.txt"), &alloc).unwrap();
        assert_eq!(result, ann);
        assert_eq!(name.as_str(), "a.txt");
    }

    #[test]
    fn backward_undoes_an_insert() {
        let alloc = allocator();
        let child = seed(&[1, 4, 2, 3]);
        let diff = Diff {
            merge: false,
            files: vec![FileDiffEntry {
                old_name: FileKey::new("a.txt"),
                new_name: FileKey::new("a.txt"),
                changes: vec![ChangeOp {
                    action: ChangeAction::Add,
                    line: 1,
                }],
            }],
        };
        let (result, _) = apply_backward(&child, &diff, &FileKey::new("a.txt"), &alloc).unwrap();
        assert_eq!(
            result.as_slice().iter().map(|t| t.value()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    proptest::proptest! {
        /// P8: a merge diff is a no-op on any annotation, regardless of what
        /// its (semantically ignored) per-file change records say.
        #[test]
        fn merge_diff_is_always_neutral(
            values in proptest::collection::vec(1u64..1000, 0..20),
            line in 0u32..20,
        ) {
            let alloc = allocator();
            let ann = seed(&values);
            let diff = Diff {
                merge: true,
                files: vec![FileDiffEntry {
                    old_name: FileKey::new("a.txt"),
                    new_name: FileKey::new("dev/null"),
                    changes: vec![ChangeOp {
                        action: ChangeAction::Remove,
                        line,
                    }],
                }],
            };
            let (result, name) = apply_forward(&ann, &diff, &FileKey::new("a.txt"), &alloc).unwrap();
            prop_assert_eq!(&result, &ann);
            prop_assert_eq!(name.as_str(), "a.txt");
        }

        /// P1: a line untouched by a single add/remove elsewhere in the file
        /// keeps its TUID (its position shifts, but `apply_forward` then
        /// `apply_backward` round-trips the value back to its original
        /// index).
        #[test]
        fn untouched_line_keeps_its_identity_through_forward_and_backward(
            values in proptest::collection::vec(1u64..1000, 1..20),
            insert_at in 0usize..20,
        ) {
            let alloc = allocator();
            let ann = seed(&values);
            let insert_at = insert_at.min(ann.len());
            let diff = Diff {
                merge: false,
                files: vec![FileDiffEntry {
                    old_name: FileKey::new("a.txt"),
                    new_name: FileKey::new("a.txt"),
                    changes: vec![ChangeOp {
                        action: ChangeAction::Add,
                        line: insert_at as u32,
                    }],
                }],
            };
            let (forward, _) = apply_forward(&ann, &diff, &FileKey::new("a.txt"), &alloc).unwrap();
            let (back, _) = apply_backward(&forward, &diff, &FileKey::new("a.txt"), &alloc).unwrap();
            prop_assert_eq!(back, ann);
        }
    }
}
