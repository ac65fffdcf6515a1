use flate2::write::GzEncoder;
use flate2::Compression;
use spliceprep::options::Normalization;
use spliceprep::{filter_events, EventTable};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const EVENTS: &str = "seqname\tgene_id\tevent_id\talternative_transcripts\ttotal_transcripts
chr1\tG1\tG1;A3:chr1:100-200:150-200:+\tT1,T2\tT1,T2,T3
chr1\tG2\tG2;SE:chr1:300-400:500-600:+\tT4\tT4,T5
chr2\tG3\tG3;SE:chr2:10-20:30-40:-\tT6\tT6,T4
chr2\tG4\tG4;RI:chr2:50-60:70-80:-\tT7\tT7
";

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, content).unwrap();
    p
}

fn write_gz(dir: &Path, name: &str, content: &str) -> PathBuf {
    let p = dir.join(name);
    let mut enc = GzEncoder::new(fs::File::create(&p).unwrap(), Compression::default());
    enc.write_all(content.as_bytes()).unwrap();
    enc.finish().unwrap();
    p
}

// header without the index column, as written by the quantifiers
fn tpm(ids: &[&str]) -> String {
    let mut s = String::from("sample_0h\tsample_16h\n");
    for id in ids {
        s.push_str(&format!("{}\t1.0\t2.0\n", id));
    }
    s
}

#[test]
fn filters_events_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let events = write(dir.path(), "events.ioe", EVENTS);
    let a = write(dir.path(), "A_all.tpm", &tpm(&["T1", "T2", "T3", "T4", "T5", "T6"]));
    let b = write_gz(dir.path(), "B_all.tpm.gz", &tpm(&["T4", "T5", "T6", "T1", "T2"]));
    let c = write(dir.path(), "C_all.tpm", &tpm(&["T6", "T5", "T4", "T3", "T2", "T1", "T7"]));
    let out = dir.path().join("out").join("filtered.ioe");

    let summary = filter_events(
        &events,
        &[("A", a), ("B", b), ("C", c)],
        &out,
        Normalization::Exact,
    )
    .unwrap();

    assert_eq!(summary.n_before, 4);
    assert_eq!(summary.n_after, 2);
    assert_eq!(summary.n_common, 5);
    assert_eq!(summary.n_referenced, 7);
    assert_eq!(summary.n_referenced_missing, 2);
    assert_eq!(
        summary.replicate_universes,
        vec![
            ("A".to_string(), 6),
            ("B".to_string(), 5),
            ("C".to_string(), 7)
        ]
    );
    assert_eq!(summary.types_before.get("SE"), 2);
    assert_eq!(summary.types_after.get("SE"), 2);
    assert_eq!(summary.types_after.get("A3"), 0);

    let written = fs::read_to_string(&out).unwrap();
    let mut expected = EVENTS.lines().collect::<Vec<_>>();
    expected.remove(4);
    expected.remove(1);
    assert_eq!(written.lines().collect::<Vec<_>>(), expected);

    // filtering the output again changes nothing
    let again = dir.path().join("again.ioe");
    let a = write(dir.path(), "A2.tpm", &tpm(&["T1", "T2", "T3", "T4", "T5", "T6"]));
    let b = write(dir.path(), "B2.tpm", &tpm(&["T4", "T5", "T6", "T1", "T2"]));
    let summary = filter_events(&out, &[("A", a), ("B", b)], &again, Normalization::Exact).unwrap();
    assert_eq!(summary.n_after, 2);
    assert_eq!(fs::read_to_string(&again).unwrap(), written);
}

#[test]
fn worked_example_yields_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let events = write(
        dir.path(),
        "events.ioe",
        "event_id\talternative_transcripts\ttotal_transcripts\nG1;A3:chr1\tT1,T2\tT1,T2,T3\n",
    );
    let a = write(dir.path(), "A.tpm", &tpm(&["T1", "T2", "T3"]));
    let b = write(dir.path(), "B.tpm", &tpm(&["T1", "T2"]));
    let c = write(dir.path(), "C.tpm", &tpm(&["T1", "T2", "T3"]));
    let out = dir.path().join("filtered.ioe");

    let summary =
        filter_events(&events, &[("A", a), ("B", b), ("C", c)], &out, Normalization::Exact).unwrap();
    assert_eq!(summary.n_after, 0);
    assert!(summary.to_string().contains("WARNING: no event passed the filter."));
    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "event_id\talternative_transcripts\ttotal_transcripts\n"
    );
    assert!(EventTable::from_ioe(&out).unwrap().is_empty());
}

#[test]
fn whitespace_needs_normalization() {
    let dir = tempfile::tempdir().unwrap();
    let events = write(
        dir.path(),
        "events.ioe",
        "event_id\talternative_transcripts\ttotal_transcripts\nG1;SE:chr1\tT1\tT1, T2\n",
    );
    let a = write(dir.path(), "A.tpm", &tpm(&["T1", "T2"]));
    let out = dir.path().join("filtered.ioe");

    let exact = filter_events(&events, &[("A", a.clone())], &out, Normalization::Exact).unwrap();
    assert_eq!(exact.n_after, 0);
    let trimmed = filter_events(&events, &[("A", a)], &out, Normalization::Trim).unwrap();
    assert_eq!(trimmed.n_after, 1);
    // the row is written as it was read
    assert!(fs::read_to_string(&out).unwrap().contains("\tT1, T2\n"));
}

#[test]
fn fatal_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "A.tpm", &tpm(&["T1"]));
    let out = dir.path().join("filtered.ioe");

    let missing = dir.path().join("missing.ioe");
    assert!(filter_events(&missing, &[("A", a.clone())], &out, Normalization::Exact).is_err());

    let no_total = write(
        dir.path(),
        "bad.ioe",
        "event_id\talternative_transcripts\nG1;SE:chr1\tT1\n",
    );
    let err = filter_events(&no_total, &[("A", a.clone())], &out, Normalization::Exact).unwrap_err();
    assert!(format!("{:#}", err).contains("total_transcripts"));

    let ragged = write(dir.path(), "ragged.tpm", "s0\nT1\t1\nT2\t1\t2\n");
    let events = write(dir.path(), "events.ioe", EVENTS);
    let err = filter_events(&events, &[("A", ragged)], &out, Normalization::Exact).unwrap_err();
    assert!(format!("{:#}", err).contains("ragged.tpm:3"));

    let none: [(&str, PathBuf); 0] = [];
    assert!(filter_events(&events, &none, &out, Normalization::Exact).is_err());
}

#[test]
fn disjoint_replicates_give_an_empty_common_set() {
    let dir = tempfile::tempdir().unwrap();
    let events = write(dir.path(), "events.ioe", EVENTS);
    let a = write(dir.path(), "A.tpm", &tpm(&["T1", "T2"]));
    let b = write(dir.path(), "B.tpm", &tpm(&["T3", "T4"]));
    let c = write(dir.path(), "C.tpm", &tpm(&["T5", "T6"]));
    let out = dir.path().join("filtered.ioe");

    let summary =
        filter_events(&events, &[("A", a), ("B", b), ("C", c)], &out, Normalization::Exact).unwrap();
    assert_eq!(summary.n_common, 0);
    assert_eq!(summary.n_after, 0);
    assert_eq!(summary.n_referenced_missing, 7);
    assert!(summary
        .to_string()
        .contains("WARNING: no transcript is present in all replicates"));
    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "seqname\tgene_id\tevent_id\talternative_transcripts\ttotal_transcripts\n"
    );
}

#[test]
fn empty_matrix_keys_do_not_validate_empty_entries() {
    let dir = tempfile::tempdir().unwrap();
    let events = write(
        dir.path(),
        "events.ioe",
        "event_id\talternative_transcripts\ttotal_transcripts\nG1;SE:chr1\t\tT1\nG2;SE:chr1\tT1,\tT1\nG3;SE:chr1\tT1\tT1\n",
    );
    let tpms = ["A", "B", "C"]
        .iter()
        .map(|l| (*l, write(dir.path(), &format!("{}.tpm", l), "s0\nT1\t1\n\t0\n")))
        .collect::<Vec<_>>();
    let out = dir.path().join("filtered.ioe");

    let summary = filter_events(&events, tpms.as_slice(), &out, Normalization::Exact).unwrap();
    assert_eq!(summary.n_common, 1);
    assert_eq!(summary.n_after, 1);
    assert!(fs::read_to_string(&out).unwrap().ends_with("\nG3;SE:chr1\tT1\tT1\n"));
}
