//! Blocking HTTP client for the upstream Mercurial web endpoints (spec §6).

use crate::retry::RetryPolicy;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::io::Read as _;
use tuid_core::error::{Error, Result};
use tuid_core::traits::{ChangelogOracle, DiffOracle, FileListOracle, RawFileOracle};
use tuid_core::types::{
    ChangeAction, ChangeOp, ChangelogRange, ChangelogStep, Diff, FileDiffEntry, FileKey,
    RevisionId, RevisionPhase,
};
use url::Url;

/// Blocking client wired to one Mercurial web front end.
pub struct HgUpstreamClient {
    http: Client,
    base_url: Url,
    branch: String,
    retry: RetryPolicy,
}

impl HgUpstreamClient {
    /// Build a client targeting `base_url` (e.g.
    /// `https://hg.mozilla.org/mozilla-central`) and `branch`.
    pub fn new(base_url: Url, branch: impl Into<String>) -> Self {
        HgUpstreamClient {
            http: Client::new(),
            base_url,
            branch: branch.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the default retry policy (mostly for tests).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url.as_str().trim_end_matches('/'), self.branch, path)
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        self.retry.run(|| {
            let url = self.endpoint(path);
            let response = self
                .http
                .get(&url)
                .send()
                .map_err(|e| Error::upstream_transient(path.to_string(), e))?;
            classify_status(path, response.status())?;
            response
                .json::<T>()
                .map_err(|e| Error::upstream_transient(path.to_string(), e))
        })
    }

    /// Number of newline-delimited lines `file` has at `revision`, plus the
    /// file's raw bytes (spec §6: "line count is the response's
    /// newline-terminated line count").
    fn fetch_raw_file(&self, revision: &RevisionId, file: &FileKey) -> Result<usize> {
        self.retry.run(|| {
            let path = format!("raw-file/{revision}/{file}");
            let url = self.endpoint(&path);
            let mut response = self
                .http
                .get(&url)
                .send()
                .map_err(|e| Error::upstream_transient(path.clone(), e))?;
            classify_status(&path, response.status())?;
            let mut body = Vec::new();
            response
                .read_to_end(&mut body)
                .map_err(|e| Error::upstream_transient(path.clone(), e))?;
            Ok(count_lines(&body))
        })
    }
}

fn classify_status(path: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::NOT_FOUND {
        return Err(Error::UpstreamNotFound {
            what: path.to_string(),
        });
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::upstream_transient(
            path.to_string(),
            std::io::Error::new(std::io::ErrorKind::Other, status.to_string()),
        ));
    }
    Err(Error::UpstreamNotFound {
        what: format!("{path} ({status})"),
    })
}

fn count_lines(body: &[u8]) -> usize {
    if body.is_empty() {
        return 0;
    }
    let newlines = body.iter().filter(|&&b| b == b'\n').count();
    if body.last() == Some(&b'\n') {
        newlines
    } else {
        newlines + 1
    }
}

#[derive(Debug, Deserialize)]
struct JsonLogResponse {
    changesets: Vec<JsonLogEntry>,
}

#[derive(Debug, Deserialize)]
struct JsonLogEntry {
    node: String,
    rev: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRevResponse {
    phase: String,
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JsonPushesResponse {
    #[serde(flatten)]
    pushes: std::collections::BTreeMap<String, JsonPushEntry>,
}

#[derive(Debug, Deserialize)]
struct JsonPushEntry {
    changesets: Vec<JsonPushChangeset>,
}

#[derive(Debug, Deserialize)]
struct JsonPushChangeset {
    node: String,
}

impl ChangelogOracle for HgUpstreamClient {
    fn range(&self, from: &RevisionId, to: &RevisionId) -> Result<ChangelogRange> {
        let path = format!("json-log/{from}::{to}");
        let response: JsonLogResponse = self.get_json(&path)?;
        if response.changesets.is_empty() {
            return Err(Error::ChangelogFailure {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let steps = response
            .changesets
            .into_iter()
            .map(|entry| ChangelogStep {
                ordinal: entry.rev,
                revision: RevisionId::new(entry.node),
            })
            .collect();
        Ok(ChangelogRange::new(steps))
    }

    fn tip(&self, _branch: &str) -> Result<RevisionId> {
        let response: JsonLogResponse = self.get_json("json-log/tip")?;
        response
            .changesets
            .first()
            .map(|entry| RevisionId::new(entry.node.clone()))
            .ok_or_else(|| Error::UpstreamNotFound {
                what: "tip".to_string(),
            })
    }

    fn phase(&self, revision: &RevisionId) -> Result<RevisionPhase> {
        let path = format!("json-rev/{revision}");
        let response: JsonRevResponse = self.get_json(&path)?;
        match response.phase.as_str() {
            "public" => Ok(RevisionPhase::Public),
            _ => Ok(RevisionPhase::Draft),
        }
    }

    fn exists_on_branch(&self, _branch: &str, revision: &RevisionId) -> Result<bool> {
        let path = format!("json-log/{revision}");
        match self.get_json::<JsonLogResponse>(&path) {
            Ok(response) => Ok(!response.changesets.is_empty()),
            Err(Error::UpstreamNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn parents(&self, revision: &RevisionId) -> Result<Vec<RevisionId>> {
        let path = format!("json-rev/{revision}");
        let response: JsonRevResponse = self.get_json(&path)?;
        Ok(response.parents.into_iter().map(RevisionId::new).collect())
    }

    fn pushes(&self, changeset: &RevisionId) -> Result<Vec<RevisionId>> {
        let path = format!("json-pushes?full=1&changeset={changeset}");
        let response: JsonPushesResponse = self.get_json(&path)?;
        if response.pushes.len() != 1 {
            return Err(Error::ChangelogFailure {
                from: changeset.to_string(),
                to: changeset.to_string(),
            });
        }
        let push = response.pushes.into_values().next().expect("checked len == 1");
        Ok(push
            .changesets
            .into_iter()
            .map(|cs| RevisionId::new(cs.node))
            .collect())
    }
}

/// Per-file-diff wire shape for the revision/diff oracle (spec §6: "per-file-
/// diff has `{old: {name}, new: {name}, changes: [{action, line}]}`").
#[derive(Debug, Deserialize)]
struct WireDiffResponse {
    moves: Vec<WireFileDiff>,
    description: String,
}

#[derive(Debug, Deserialize)]
struct WireFileDiff {
    old: WireName,
    new: WireName,
    changes: Vec<WireChange>,
}

#[derive(Debug, Deserialize)]
struct WireName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireChange {
    action: String,
    line: u32,
}

impl DiffOracle for HgUpstreamClient {
    fn diff(&self, revision: &RevisionId) -> Result<Diff> {
        let path = format!("json-diff/{revision}");
        let response: WireDiffResponse = self.get_json(&path)?;
        let merge = is_merge_description(&response.description);
        let files = response
            .moves
            .into_iter()
            .map(|mv| FileDiffEntry {
                old_name: FileKey::new(mv.old.name),
                new_name: FileKey::new(mv.new.name),
                changes: mv
                    .changes
                    .into_iter()
                    .map(|c| ChangeOp {
                        action: if c.action == "+" {
                            ChangeAction::Add
                        } else {
                            ChangeAction::Remove
                        },
                        line: c.line,
                    })
                    .collect(),
            })
            .collect();
        Ok(Diff { merge, files })
    }
}

fn is_merge_description(description: &str) -> bool {
    description.starts_with("merge ") || description.starts_with("Merge ")
}

impl RawFileOracle for HgUpstreamClient {
    fn line_count(&self, revision: &RevisionId, file: &FileKey) -> Result<usize> {
        self.fetch_raw_file(revision, file)
    }
}

/// `json-info/{rev}` response shape (spec §6: `{rev: {files: [...]}}`) — the
/// key is the revision itself, so this mirrors `JsonPushesResponse`'s
/// flattened-map approach.
#[derive(Debug, Deserialize)]
struct JsonInfoResponse {
    #[serde(flatten)]
    revisions: std::collections::BTreeMap<String, JsonInfoEntry>,
}

#[derive(Debug, Deserialize)]
struct JsonInfoEntry {
    files: Vec<String>,
}

impl FileListOracle for HgUpstreamClient {
    fn files_at(&self, revision: &RevisionId) -> Result<Vec<FileKey>> {
        let path = format!("json-info/{revision}");
        let response: JsonInfoResponse = self.get_json(&path)?;
        let entry = response
            .revisions
            .into_values()
            .next()
            .ok_or_else(|| Error::UpstreamNotFound { what: path.clone() })?;
        Ok(entry.files.into_iter().map(FileKey::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_lines_counts_terminated_lines() {
        assert_eq!(count_lines(b"a\nb\nc\n"), 3);
        assert_eq!(count_lines(b"a\nb\nc"), 3);
        assert_eq!(count_lines(b""), 0);
    }

    #[test]
    fn merge_description_detected_case_insensitively_for_leading_word() {
        assert!(is_merge_description("merge mozilla-central to autoland"));
        assert!(is_merge_description("Merge inbound to central"));
        assert!(!is_merge_description("fix a bug"));
    }
}
