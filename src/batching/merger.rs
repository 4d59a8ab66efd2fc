//! Canonical artifact assembly from per-batch shards.
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use log::info;

use crate::batching::checkpoint::{ArtifactKind, CheckpointStore};
use crate::error::Error;

/// Concatenate the committed shards of one artifact kind, strictly in
/// ascending batch-index order, into the canonical artifact file.
///
/// Shard indices must cover `1..=n` with no gap; when `expected_batches`
/// is known it is enforced too. Any hole would silently shift every later
/// sentence position, so a missing or unreadable shard is a hard error,
/// never a partial merge.
///
/// Line-oriented kinds get a single newline between (not after) shard
/// payloads; block-oriented kinds carry their own blank-line separators.
pub fn merge_shards(
    store: &CheckpointStore,
    kind: ArtifactKind,
    expected_batches: Option<usize>,
) -> Result<PathBuf, Error> {
    let shards = store.shards(kind)?;

    if let Some(expected) = expected_batches {
        if shards.len() != expected {
            return Err(Error::Shard(format!(
                "[{}] expected {} {} shards, found {}",
                store.label(),
                expected,
                kind,
                shards.len()
            )));
        }
    }
    for (pos, (index, path)) in shards.iter().enumerate() {
        if *index != pos + 1 {
            return Err(Error::Shard(format!(
                "gap in shard sequence: expected batch {}, found {} ({})",
                pos + 1,
                index,
                path.display()
            )));
        }
    }

    let canonical = store.canonical_path(kind);
    let parent = canonical
        .parent()
        .ok_or_else(|| Error::Custom(format!("no parent directory for {}", canonical.display())))?;
    fs::create_dir_all(parent)?;

    let mut tmp = canonical.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        for (i, (_, path)) in shards.iter().enumerate() {
            let contents = fs::read_to_string(path).map_err(|e| {
                Error::Shard(format!("unreadable shard {}: {}", path.display(), e))
            })?;
            if kind.is_line_oriented() && i > 0 {
                out.write_all(b"\n")?;
            }
            out.write_all(contents.as_bytes())?;
        }
        out.flush()?;
    }
    fs::rename(&tmp, &canonical)?;

    info!(
        "[{}] merged {} {} shards into {}",
        store.label(),
        shards.len(),
        kind,
        canonical.display()
    );
    Ok(canonical)
}
