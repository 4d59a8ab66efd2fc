//! End-to-end reconciliation over a full artifact layout.
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use weft::batching::checkpoint::{ArtifactKind, CheckpointStore, Stage};
use weft::config::Config;
use weft::pipelines::{Pipeline, ReconcileStage};

fn config(extra_params: &str) -> Config {
    serde_json::from_str(&format!(
        r#"{{
            "pipelines": {{ "demo": {{ "source": "en-de" }} }},
            "sources": {{ "en-de": {{ "src_lang": "en", "tgt_lang": "de" }} }},
            "params": {{ {} }}
        }}"#,
        extra_params
    ))
    .unwrap()
}

fn block(id: Option<usize>, form: &str) -> String {
    let mut out = String::new();
    if let Some(id) = id {
        out.push_str(&format!("# sent_id = {}\n", id));
    }
    out.push_str(&format!("1\t{}\t_\t_\t_\t_\t0\troot\t_\t_\n\n", form));
    out
}

/// The worked example: source ["A.", "B.", "C."], target ["X.", "Y.", "Z."],
/// the target side splits position 2 into two trees.
fn write_artifacts(data: &Path) {
    let en = CheckpointStore::new(data, "demo", "en", Stage::Parse);
    let de = CheckpointStore::new(data, "demo", "de", Stage::Parse);
    let aligned = CheckpointStore::new(data, "demo", "en-de", Stage::Align);

    let write = |path: std::path::PathBuf, contents: &str| {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    };

    write(en.canonical_path(ArtifactKind::Tokenized), "A.\nB.\nC.");
    write(de.canonical_path(ArtifactKind::Tokenized), "X.\nY.\nZ.");

    let en_parsed = [
        block(Some(1), "A."),
        block(Some(2), "B."),
        block(Some(3), "C."),
    ]
    .concat();
    write(en.canonical_path(ArtifactKind::Parsed), &en_parsed);

    let de_parsed = [
        block(Some(1), "X."),
        block(Some(2), "Y"),
        block(None, "."),
        block(Some(3), "Z."),
    ]
    .concat();
    write(de.canonical_path(ArtifactKind::Parsed), &de_parsed);

    write(aligned.canonical_path(ArtifactKind::Aligned), "0-0\n0-0\n0-0");

    let srl = [
        block(Some(1), "A."),
        block(Some(2), "B."),
        block(Some(3), "C."),
    ]
    .concat();
    write(en.canonical_path(ArtifactKind::Srl), &srl);
}

#[test_log::test]
fn split_position_is_dropped_from_every_stream() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());

    let config = config(r#""drop_policy": "not_exactly_one", "combine_policy": "union""#);
    let stage = ReconcileStage::new(dir.path(), "demo", &config).unwrap();
    let report = stage.run().unwrap();

    assert_eq!(report.dropped, BTreeSet::from([2]));
    assert_eq!(report.stream_length, 3);
    assert_eq!(report.kept, 2);

    let en = CheckpointStore::new(dir.path(), "demo", "en", Stage::Parse);
    let de = CheckpointStore::new(dir.path(), "demo", "de", Stage::Parse);
    let aligned = CheckpointStore::new(dir.path(), "demo", "en-de", Stage::Align);

    assert_eq!(
        fs::read_to_string(en.reconciled_path(ArtifactKind::Tokenized)).unwrap(),
        "A.\nC."
    );
    assert_eq!(
        fs::read_to_string(de.reconciled_path(ArtifactKind::Tokenized)).unwrap(),
        "X.\nZ."
    );
    assert_eq!(
        fs::read_to_string(aligned.reconciled_path(ArtifactKind::Aligned)).unwrap(),
        "0-0\n0-0"
    );

    // survivors renumbered 1, 2 in both parsed streams
    let en_parsed = fs::read_to_string(en.reconciled_path(ArtifactKind::Parsed)).unwrap();
    assert_eq!(en_parsed, [block(Some(1), "A."), block(Some(2), "C.")].concat());
    let de_parsed = fs::read_to_string(de.reconciled_path(ArtifactKind::Parsed)).unwrap();
    assert_eq!(de_parsed, [block(Some(1), "X."), block(Some(2), "Z.")].concat());

    // the positional SRL stream lost its second block and got renumbered
    let srl = fs::read_to_string(en.reconciled_path(ArtifactKind::Srl)).unwrap();
    assert_eq!(srl, [block(Some(1), "A."), block(Some(2), "C.")].concat());

    // originals are never mutated in place
    assert_eq!(
        fs::read_to_string(en.canonical_path(ArtifactKind::Tokenized)).unwrap(),
        "A.\nB.\nC."
    );
}

#[test]
fn intersection_policy_keeps_one_sided_problems() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());

    // the split only happened on the target side, so the intersection is empty
    let config = config(r#""drop_policy": "not_exactly_one", "combine_policy": "intersection""#);
    let stage = ReconcileStage::new(dir.path(), "demo", &config).unwrap();
    let report = stage.run().unwrap();

    assert!(report.dropped.is_empty());
    assert_eq!(report.kept, 3);

    let en = CheckpointStore::new(dir.path(), "demo", "en", Stage::Parse);
    assert_eq!(
        fs::read_to_string(en.reconciled_path(ArtifactKind::Tokenized)).unwrap(),
        "A.\nB.\nC."
    );
}

#[test]
fn split_only_policy_ignores_missing_positions() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());

    // make position 3 absent from the source parsed stream
    let en = CheckpointStore::new(dir.path(), "demo", "en", Stage::Parse);
    let en_parsed = [block(Some(1), "A."), block(Some(2), "B.")].concat();
    fs::write(en.canonical_path(ArtifactKind::Parsed), en_parsed).unwrap();

    let config = config(r#""drop_policy": "split_only", "combine_policy": "union""#);
    let stage = ReconcileStage::new(dir.path(), "demo", &config).unwrap();
    let report = stage.run().unwrap();

    // only the target-side split counts; the missing tree does not
    assert_eq!(report.dropped, BTreeSet::from([2]));
}
