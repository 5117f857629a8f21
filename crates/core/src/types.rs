//! Core domain types: identities and the diff/changelog wire shapes.
//!
//! Mirrors `spec.md` §3 (Data Model) directly; naming follows the spec's
//! glossary rather than the upstream Mercurial/Python naming it was
//! distilled from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A Temporally Unique IDentifier: a process-allocated integer naming one
/// logical source line (spec §3, Entities — TUID).
///
/// `0` is reserved as [`Tuid::MISSING`] ("no identity", used for pad
/// positions at the wire boundary — never present inside a valid
/// [`Annotation`]). Real TUIDs are allocated starting at 1 and are never
/// reused (I2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tuid(u64);

impl Tuid {
    /// Sentinel denoting "no identity" for pad positions.
    pub const MISSING: Tuid = Tuid(0);

    /// Wrap a raw allocated value. Callers should only construct a non-zero
    /// `Tuid` via [`tuid_durability::counter`] allocation; this constructor
    /// exists for deserialization and tests.
    pub const fn new(value: u64) -> Self {
        Tuid(value)
    }

    /// The raw integer value.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// True iff this is the [`Tuid::MISSING`] sentinel.
    pub const fn is_missing(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Tuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 12-character revision prefix (spec §3: "Key is the 12-character
/// revision prefix and the file path").
///
/// Longer hashes are truncated on construction, matching the original's
/// `revision[:12]` convention; shorter identifiers (e.g. `tip`) are kept
/// as-is since the upstream accepts them unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    /// Maximum stored length, matching the upstream's 12-character prefix
    /// convention.
    pub const PREFIX_LEN: usize = 12;

    /// Build a `RevisionId`, truncating to [`Self::PREFIX_LEN`] characters.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref();
        let truncated = match raw.char_indices().nth(Self::PREFIX_LEN) {
            Some((idx, _)) => &raw[..idx],
            None => raw,
        };
        RevisionId(truncated.to_string())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RevisionId {
    fn from(value: &str) -> Self {
        RevisionId::new(value)
    }
}

impl From<String> for RevisionId {
    fn from(value: String) -> Self {
        RevisionId::new(value)
    }
}

/// A repository-relative file path with the leading `/` stripped (spec §3:
/// "leading `/` stripped").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileKey(String);

impl FileKey {
    /// The literal path upstream uses to mean "this file does not exist
    /// here" (spec §4.4 / §4.6, and the `dev/null` tombstone signal from
    /// spec §9 Open Question (b)).
    pub const DEV_NULL: &'static str = "dev/null";

    /// Build a `FileKey`, stripping a single leading `/`.
    pub fn new(raw: impl AsRef<str>) -> Self {
        FileKey(raw.as_ref().trim_start_matches('/').to_string())
    }

    /// Borrow the underlying path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True iff this key is the `dev/null` tombstone signal.
    pub fn is_dev_null(&self) -> bool {
        self.0 == Self::DEV_NULL
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FileKey {
    fn from(value: &str) -> Self {
        FileKey::new(value)
    }
}

impl From<String> for FileKey {
    fn from(value: String) -> Self {
        FileKey::new(value)
    }
}

/// Store key for an Annotation: `(revision, file)` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnnotationKey {
    /// Revision the annotation was computed at.
    pub revision: RevisionId,
    /// File the annotation covers.
    pub file: FileKey,
}

impl AnnotationKey {
    /// Build a new key.
    pub fn new(revision: RevisionId, file: FileKey) -> Self {
        AnnotationKey { revision, file }
    }
}

/// An ordered per-line TUID list for a specific `(revision, file)` (spec
/// §3: "Annotation").
///
/// Invariant I1: `len()` equals the line count of the file at that
/// revision (zero for a tombstoned file). An empty annotation is the
/// [`Annotation::TOMBSTONE`] encoding (spec §3, I5) — there is no separate
/// "not found" value at this type; the caller distinguishes "not found"
/// from "tombstone" via the store's `get` result (spec §4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotation(Vec<Tuid>);

impl Annotation {
    /// The empty annotation, used to encode a Tombstone.
    pub fn tombstone() -> Self {
        Annotation(Vec::new())
    }

    /// Build an annotation from an ordered TUID list (one per 1-based line).
    pub fn from_tuids(tuids: Vec<Tuid>) -> Self {
        Annotation(tuids)
    }

    /// Number of lines (spec I1).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True iff this annotation is the Tombstone encoding (spec I5).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the ordered TUID list.
    pub fn as_slice(&self) -> &[Tuid] {
        &self.0
    }

    /// Consume into the ordered TUID list.
    pub fn into_vec(self) -> Vec<Tuid> {
        self.0
    }
}

impl From<Vec<Tuid>> for Annotation {
    fn from(tuids: Vec<Tuid>) -> Self {
        Annotation(tuids)
    }
}

/// Whether an upstream diff change adds or removes a line (spec §3: "change
/// operations `{action ∈ {+,-}, line}`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeAction {
    /// A line was added.
    Add,
    /// A line was removed.
    Remove,
}

/// A single upstream change operation.
///
/// `line` is the upstream's 0-based-anchored line number (spec §4.4's "+1
/// bias" note: add +1 to get the 1-based annotation position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOp {
    /// Add or remove.
    pub action: ChangeAction,
    /// 0-based-anchored line number as delivered by the diff oracle.
    pub line: u32,
}

/// Per-file diff entry within a revision's [`Diff`] (spec §3: "Diff").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiffEntry {
    /// Path before the change (may equal `new_name` when not renamed).
    pub old_name: FileKey,
    /// Path after the change.
    pub new_name: FileKey,
    /// Ordered change operations, in the order the upstream delivers them.
    pub changes: Vec<ChangeOp>,
}

/// All per-file change records for one revision, plus the merge flag (spec
/// §3: "Diff").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    /// True when this revision is a merge of two parents (spec glossary:
    /// "Merge diff" — semantically a no-op for TUID allocation).
    pub merge: bool,
    /// Per-file change records.
    pub files: Vec<FileDiffEntry>,
}

impl Diff {
    /// Find the single diff entry whose old-name or new-name equals `file`
    /// (spec §4.4 step 2, "File selection").
    pub fn entry_for(&self, file: &FileKey) -> Option<&FileDiffEntry> {
        self.files
            .iter()
            .find(|entry| &entry.old_name == file || &entry.new_name == file)
    }
}

/// Whether a revision is on the permanent branch or an ephemeral "try" push
/// (spec glossary: "Draft / Public phase").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevisionPhase {
    /// Permanent, on the default branch.
    Public,
    /// Ephemeral, history may be rewritten.
    Draft,
}

/// One step in a [`ChangelogRange`]: an ordinal position plus the revision
/// at that position (spec §3: "ChangelogRange").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogStep {
    /// Position in changelog order (oldest-first across the whole range).
    pub ordinal: u64,
    /// The revision at this step.
    pub revision: RevisionId,
}

/// An ordered list of `(ordinal, revision)` pairs connecting two revisions
/// in history, as returned by the Changelog Oracle (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogRange(pub Vec<ChangelogStep>);

impl ChangelogRange {
    /// Build a range from ordinal/revision pairs.
    pub fn new(steps: Vec<ChangelogStep>) -> Self {
        ChangelogRange(steps)
    }

    /// Oldest-first revisions only, discarding ordinals.
    pub fn revisions(&self) -> impl Iterator<Item = &RevisionId> {
        self.0.iter().map(|step| &step.revision)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True iff no steps.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reverse the range in place (spec §4.6 step 1: backward moves reverse
    /// the list and drop the target element).
    pub fn reversed(mut self) -> Self {
        self.0.reverse();
        self
    }
}
