/*! File-based batch checkpointing.

A batch is complete exactly when its shard files exist under their final
names. There is no separate metadata store: writers commit through a
temporary name and an atomic rename, so a file observed under the final
name is always complete. Restarting a crashed run therefore only requires
re-querying [CheckpointStore::is_complete] for every batch and
re-dispatching the ones that answer `false`.
!*/
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::Error;

/// One output feed of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Tokenized,
    Parsed,
    Aligned,
    Srl,
}

impl ArtifactKind {
    /// Folder under `data/<pipeline>/`, also used in artifact file names.
    pub fn folder(&self) -> &'static str {
        match self {
            ArtifactKind::Tokenized => "tokenized",
            ArtifactKind::Parsed => "parsed",
            ArtifactKind::Aligned => "aligned",
            ArtifactKind::Srl => "srl",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Tokenized => "txt",
            ArtifactKind::Parsed => "conllu",
            ArtifactKind::Aligned => "align",
            ArtifactKind::Srl => "conllup",
        }
    }

    /// Line-oriented artifacts hold one sentence per line and need a
    /// newline separator between merged shards; block-oriented ones carry
    /// their own blank-line separators.
    pub fn is_line_oriented(&self) -> bool {
        matches!(self, ArtifactKind::Tokenized | ArtifactKind::Aligned)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.folder())
    }
}

/// A checkpointed pipeline stage and the artifact kinds it emits per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Align,
}

impl Stage {
    pub fn artifact_kinds(&self) -> &'static [ArtifactKind] {
        match self {
            Stage::Parse => &[ArtifactKind::Tokenized, ArtifactKind::Parsed],
            Stage::Align => &[ArtifactKind::Aligned],
        }
    }
}

/// Batch outputs that can be rendered into per-kind shard payloads.
pub trait Shardable {
    fn artifacts(&self) -> Vec<(ArtifactKind, String)>;
}

/// Write `contents` to `path` through a `.part` sibling and an atomic
/// rename. A reader can never observe a partially written file under the
/// final name.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), Error> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Custom(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(parent)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Shard naming and completion queries for one `(pipeline, stream, stage)`.
///
/// `label` is the stream label: a language code for per-language stages,
/// a `src-tgt` pair label for the alignment stage.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
    pipeline: String,
    label: String,
    stage: Stage,
}

impl CheckpointStore {
    pub fn new(data_dir: &Path, pipeline: &str, label: &str, stage: Stage) -> Self {
        Self {
            root: data_dir.join(pipeline),
            pipeline: pipeline.to_string(),
            label: label.to_string(),
            stage,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn file_name(&self, kind: ArtifactKind, index: Option<usize>) -> String {
        match index {
            Some(i) => format!(
                "{}.{}.{}.{:04}.{}",
                self.pipeline,
                self.label,
                kind.folder(),
                i,
                kind.extension()
            ),
            None => format!(
                "{}.{}.{}.{}",
                self.pipeline,
                self.label,
                kind.folder(),
                kind.extension()
            ),
        }
    }

    /// Shard file for one batch, zero-padded so lexicographic order matches
    /// numeric batch order.
    pub fn shard_path(&self, kind: ArtifactKind, index: usize) -> PathBuf {
        self.root
            .join(kind.folder())
            .join("tmp")
            .join(self.file_name(kind, Some(index)))
    }

    /// Canonical merged artifact for one kind.
    pub fn canonical_path(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.folder()).join(self.file_name(kind, None))
    }

    /// Fresh-generation path written by reconciliation: the canonical file
    /// name prefixed with `_`, in the same folder.
    pub fn reconciled_path(&self, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(kind.folder())
            .join(format!("_{}", self.file_name(kind, None)))
    }

    /// A batch is complete when every artifact kind of the stage has a
    /// valid shard file under its final name.
    pub fn is_complete(&self, index: usize) -> bool {
        self.stage
            .artifact_kinds()
            .iter()
            .all(|kind| Self::valid_marker(&self.shard_path(*kind, index)))
    }

    /// An unreadable or empty file under a completed name is treated as
    /// "not complete", triggering recompute rather than a silent skip.
    fn valid_marker(path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {
                if meta.len() == 0 {
                    warn!(
                        "checkpoint marker {} is empty, treating batch as incomplete",
                        path.display()
                    );
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Commit one batch's shard files. Each artifact is written atomically;
    /// [Self::is_complete] only answers `true` once all of them landed.
    pub fn commit(&self, index: usize, artifacts: &[(ArtifactKind, String)]) -> Result<(), Error> {
        for (kind, payload) in artifacts {
            write_atomic(&self.shard_path(*kind, index), payload)?;
        }
        Ok(())
    }

    /// All committed shards of one kind, sorted by batch index.
    pub fn shards(&self, kind: ArtifactKind) -> Result<Vec<(usize, PathBuf)>, Error> {
        let pattern = self.root.join(kind.folder()).join("tmp").join(format!(
            "{}.{}.{}.*.{}",
            self.pipeline,
            self.label,
            kind.folder(),
            kind.extension()
        ));
        let pattern = pattern
            .to_str()
            .ok_or_else(|| Error::Custom(format!("non-utf8 shard pattern: {:?}", pattern)))?
            .to_string();

        let mut shards = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let index = name
                .rsplit('.')
                .nth(1)
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| {
                    Error::Shard(format!("unexpected shard file name: {}", path.display()))
                })?;
            shards.push((index, path));
        }
        shards.sort_by_key(|(index, _)| *index);
        Ok(shards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &Path) -> CheckpointStore {
        CheckpointStore::new(dir, "en-de-200k", "de", Stage::Parse)
    }

    #[test]
    fn commit_then_complete() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        assert!(!store.is_complete(1));
        store
            .commit(
                1,
                &[
                    (ArtifactKind::Tokenized, "a b c".to_string()),
                    (ArtifactKind::Parsed, "# sent_id = 1\n\n".to_string()),
                ],
            )
            .unwrap();
        assert!(store.is_complete(1));
        assert!(!store.is_complete(2));
    }

    #[test]
    fn partial_write_is_not_complete() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        // only one of the two stage artifacts landed
        write_atomic(
            &store.shard_path(ArtifactKind::Tokenized, 3),
            "a b c",
        )
        .unwrap();
        assert!(!store.is_complete(3));

        // a leftover temp file must never count as a marker
        let part = store.shard_path(ArtifactKind::Parsed, 4);
        fs::create_dir_all(part.parent().unwrap()).unwrap();
        let mut tmp = part.as_os_str().to_owned();
        tmp.push(".part");
        fs::write(PathBuf::from(tmp), "half a block").unwrap();
        assert!(!store.is_complete(4));
    }

    #[test]
    fn empty_marker_triggers_recompute() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "p", "en-de", Stage::Align);

        let path = store.shard_path(ArtifactKind::Aligned, 1);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
        assert!(!store.is_complete(1));
    }

    #[test]
    fn shards_sorted_by_index() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "p", "en-de", Stage::Align);

        for index in [3usize, 1, 2] {
            store
                .commit(index, &[(ArtifactKind::Aligned, format!("0-{}", index))])
                .unwrap();
        }
        let shards = store.shards(ArtifactKind::Aligned).unwrap();
        let indices: Vec<usize> = shards.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn commit_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "p", "en-de", Stage::Align);

        store
            .commit(2, &[(ArtifactKind::Aligned, "1-1 2-2".to_string())])
            .unwrap();
        store
            .commit(2, &[(ArtifactKind::Aligned, "1-1 2-2".to_string())])
            .unwrap();

        let shards = store.shards(ArtifactKind::Aligned).unwrap();
        assert_eq!(shards.len(), 1);
        let contents = fs::read_to_string(&shards[0].1).unwrap();
        assert_eq!(contents, "1-1 2-2");
    }
}
