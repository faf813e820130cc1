use std::collections::HashMap;
use std::fs;
use std::path::Path;

use splitsail::cli::{execute, run};
use splitsail::input::read_entities;
use splitsail::{Side, SideData, SplitInputs, SplitRequest, Technique};

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

fn rows(path: &Path) -> Vec<Vec<String>> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

#[test]
fn double_run_writes_consistent_tsv_files() {
    let dir = tempfile::tempdir().unwrap();
    let e = write(dir.path(), "e.tsv", "id\n# ligands\ne0\ne1\ne2\ne3\n");
    let f = write(dir.path(), "f.tsv", "f0\nf1\nf2\nf3\n");
    let inter = write(
        dir.path(),
        "inter.tsv",
        "id_e\tid_f\ne0\tf0\ne0\tf1\ne1\tf1\ne2\tf2\ne3\tf3\ne3\tf0\n",
    );
    let out = dir.path().join("out");
    let logs = dir.path().join("logs");
    run([
        "splitsail",
        "-o",
        out.to_str().unwrap(),
        "-t",
        "I2",
        "R",
        "--splits",
        "0.5",
        "0.5",
        "--names",
        "train",
        "test",
        "--epsilon",
        "0.2",
        "--e-data",
        e.as_str(),
        "--f-data",
        f.as_str(),
        "--inter",
        inter.as_str(),
        "--max-sec",
        "5",
        "--threads",
        "1",
        "--logdir",
        logs.to_str().unwrap(),
    ]);

    let technique_dir = out.join("I2");
    let header = fs::read_to_string(technique_dir.join("inter.tsv")).unwrap();
    assert!(header.starts_with("id_e\tid_f\tsplit\n"));
    let e_split: HashMap<String, String> = rows(&technique_dir.join("e_splits.tsv"))
        .into_iter()
        .map(|row| (row[0].clone(), row[1].clone()))
        .collect();
    let f_split: HashMap<String, String> = rows(&technique_dir.join("f_splits.tsv"))
        .into_iter()
        .map(|row| (row[0].clone(), row[1].clone()))
        .collect();
    assert_eq!(e_split.len(), 4);
    assert_eq!(f_split.len(), 4);

    let pairs = rows(&technique_dir.join("inter.tsv"));
    assert_eq!(pairs.len(), 6);
    for row in &pairs {
        let (left, right, label) = (&e_split[&row[0]], &f_split[&row[1]], &row[2]);
        if label == "not selected" {
            assert_ne!(left, right);
        } else {
            assert_eq!(left, label);
            assert_eq!(right, label);
        }
    }

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(technique_dir.join("report.json")).unwrap())
            .unwrap();
    assert_eq!(report["solved"], true);
    assert_eq!(report["request"]["epsilon"], 0.2);
    assert!(report["interactions"].is_object());
    assert!(logs.join("e_I2_bnb.log").exists());

    let random = rows(&out.join("R").join("inter.tsv"));
    assert_eq!(random.len(), 6);
    assert!(random.iter().all(|row| row[2] == "train" || row[2] == "test"));
}

#[test]
fn failing_technique_leaves_others_intact() {
    let dir = tempfile::tempdir().unwrap();
    let e = write(dir.path(), "e.tsv", "a\t1\nb\t1\nc\t1\nd\t1\n");
    let inputs = SplitInputs {
        e: Some(SideData::new(read_entities(Path::new(&e)).unwrap())),
        ..SplitInputs::default()
    };
    let mut request = SplitRequest::default();
    request.splits = splitsail::SplitSpec::unnamed(vec![0.5, 0.5]).unwrap();
    request.epsilon = 0.1;
    let out = dir.path().join("out");

    let results = execute(
        &out,
        &[Technique::IdentitySingle(Side::F), Technique::IdentitySingle(Side::E)],
        &request,
        &inputs,
    );
    assert_eq!(results.len(), 2);
    let (failed, err) = (&results[0].0, results[0].1.as_ref().unwrap_err());
    assert_eq!(*failed, Technique::IdentitySingle(Side::F));
    assert_eq!(err.kind(), splitsail::ErrorKind::MissingInput);
    let written = results[1].1.as_ref().unwrap();
    assert_eq!(rows(&written.join("e_splits.tsv")).len(), 4);
    assert!(!out.join("I1f").exists());
}

#[test]
fn missing_entity_file_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    run([
        "splitsail",
        "-o",
        out.to_str().unwrap(),
        "-t",
        "I1e",
        "--e-data",
        dir.path().join("absent.tsv").to_str().unwrap(),
    ]);
    assert!(!out.exists());
}
