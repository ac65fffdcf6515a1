use crate::matrix::ReplicateMatrix;
use crate::options::Normalization;
use crate::reader::{read_ioe, records_from_df, EventRecord};
use crate::spliceprep_utils::{MatrixKind, UNPARSEABLE_EVENT_TYPE};
use crate::universe::{common_universe, TranscriptUniverse};
use anyhow::Context;
use polars::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Returns `true` if every transcript listed by `event`, in either its alternative or its
/// total transcript list, belongs to `universe`.
///
/// Membership uses the normalization policy of `universe`; with [Normalization::Exact]
/// identifiers are compared as-is, so blanks around a list entry make it a different
/// transcript. An empty list entry, as left by an empty field or a trailing `,`, is never
/// a transcript, so such an event is invalid.
///
/// ```rust
/// use spliceprep::{is_valid, TranscriptUniverse};
/// use spliceprep::options::Normalization;
/// use spliceprep::reader::EventRecord;
/// let common = TranscriptUniverse::new(["T1", "T2"], Normalization::Exact);
/// assert!(is_valid(&EventRecord::new("G1;SE:chr1", "T1", "T1,T2"), &common));
/// assert!(!is_valid(&EventRecord::new("G1;A3:chr1", "T1,T2", "T1,T2,T3"), &common));
/// ```
pub fn is_valid(event: &EventRecord, universe: &TranscriptUniverse) -> bool {
    let norm = universe.normalization();
    event
        .transcripts()
        .all(|t| !norm.apply(t).is_empty() && universe.contains(t))
}

/// Event counts per coarse event type, ordered by decreasing count. Ties are ordered by
/// label so the listing is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventTypeCounts {
    counts: Vec<(String, usize)>,
}

impl EventTypeCounts {
    pub fn from_labels<'a, I: IntoIterator<Item = &'a str>>(labels: I) -> EventTypeCounts {
        let mut hm: HashMap<&str, usize> = HashMap::new();
        for l in labels {
            *hm.entry(l).or_insert(0) += 1;
        }
        let mut counts = hm
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<Vec<_>>();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        EventTypeCounts { counts }
    }

    /// The count of `label`, zero if absent.
    pub fn get(&self, label: &str) -> usize {
        self.counts
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    /// The number of events whose `event_id` carried no event type.
    pub fn unparseable(&self) -> usize {
        self.get(UNPARSEABLE_EVENT_TYPE)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, c)| c).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, usize)> {
        self.counts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl fmt::Display for EventTypeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.counts.is_empty() {
            return writeln!(f, "(no events)");
        }
        let w = self.counts.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
        for (label, count) in &self.counts {
            writeln!(f, "{:<w$}  {}", label, count, w = w)?;
        }
        Ok(())
    }
}

/// What the consistency filter did, ready to be printed.
///
/// ### Fields
///
/// * `replicate_universes`: The number of transcripts quantified by each replicate, by label.
///   Empty when the filter was applied to an already built universe.
/// * `n_common`: The size of the common transcript universe.
/// * `n_referenced`: The number of distinct transcripts referenced by the input events.
/// * `n_referenced_missing`: How many of those are not in the common universe.
/// * `n_before` / `n_after`: The number of events before and after filtering.
/// * `types_before` / `types_after`: Event type counts before and after filtering.
/// * `output`: Where the filtered events were written, if they were.
#[derive(Clone, Debug, Default)]
pub struct FilterSummary {
    pub replicate_universes: Vec<(String, usize)>,
    pub n_common: usize,
    pub n_referenced: usize,
    pub n_referenced_missing: usize,
    pub n_before: usize,
    pub n_after: usize,
    pub types_before: EventTypeCounts,
    pub types_after: EventTypeCounts,
    pub output: Option<PathBuf>,
}

impl fmt::Display for FilterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total events in input: {}", self.n_before)?;
        writeln!(
            f,
            "Total transcripts referenced by events: {}",
            self.n_referenced
        )?;
        for (label, n) in &self.replicate_universes {
            writeln!(f, "{}: transcripts in TPM matrix: {}", label, n)?;
        }
        writeln!(f, "Transcripts present in all replicates: {}", self.n_common)?;
        writeln!(
            f,
            "Referenced transcripts missing from the common set: {}",
            self.n_referenced_missing
        )?;
        if let Some(p) = &self.output {
            writeln!(f, "Saved filtered events: {}", p.display())?;
        }
        writeln!(f, "Events after filtering: {}", self.n_after)?;
        if self.n_common == 0 {
            writeln!(
                f,
                "WARNING: no transcript is present in all replicates; the filtered event set is necessarily empty."
            )?;
        } else if self.n_after == 0 && self.n_before > 0 {
            writeln!(f, "WARNING: no event passed the filter.")?;
        }
        writeln!(f)?;
        writeln!(f, "Event types (original):")?;
        write!(f, "{}", self.types_before)?;
        writeln!(f)?;
        writeln!(f, "Event types (filtered):")?;
        write!(f, "{}", self.types_after)
    }
}

/// A splicing event annotation table (events.ioe).
///
/// The table keeps every column of the source file in a [DataFrame], next to the typed
/// [EventRecord] of each row. The records are built, and the required columns checked, once
/// when the table is created.
#[derive(Clone, Debug)]
pub struct EventTable {
    df: DataFrame,
    records: Vec<EventRecord>,
}

impl EventTable {
    /// Creates an [EventTable] from a [DataFrame] holding at least the `event_id`,
    /// `alternative_transcripts` and `total_transcripts` columns.
    pub fn new(df: DataFrame) -> anyhow::Result<EventTable> {
        let records = records_from_df(&df)?;
        Ok(EventTable { df, records })
    }

    /// Reads an events.ioe file, see [crate::reader::read_ioe].
    pub fn from_ioe<T: AsRef<Path>>(file_path: T) -> anyhow::Result<EventTable> {
        let df = read_ioe(file_path.as_ref())?;
        EventTable::new(df)
            .with_context(|| format!("Could not load events from {}", file_path.as_ref().display()))
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn height(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The distinct transcripts referenced by the events.
    pub fn referenced_transcripts(&self, normalization: Normalization) -> TranscriptUniverse {
        TranscriptUniverse::from_events(&self.records, normalization)
    }

    /// Counts the events per coarse event type.
    pub fn type_counts(&self) -> EventTypeCounts {
        EventTypeCounts::from_labels(self.records.iter().map(|r| r.event_type()))
    }

    /// Evaluates [is_valid] for every event, in row order.
    pub fn validity_mask(&self, universe: &TranscriptUniverse) -> Vec<bool> {
        self.records.iter().map(|r| is_valid(r, universe)).collect()
    }

    /// Keeps the events whose transcripts all belong to `universe`.
    ///
    /// The kept rows retain all of their original columns and their original relative order;
    /// no column is added or removed. Filtering an already filtered table against the same
    /// universe returns it unchanged.
    ///
    /// ### Returns
    ///
    /// Returns the filtered table along with a [FilterSummary]. The summary's
    /// `replicate_universes` is left empty and `output` is `None`.
    ///
    /// ### Example
    ///
    /// ```rust,no_run
    /// use spliceprep::{EventTable, TranscriptUniverse};
    /// use spliceprep::options::Normalization;
    /// let events = EventTable::from_ioe("events.ioe")?;
    /// let common = TranscriptUniverse::new(["T1", "T2"], Normalization::Exact);
    /// let (valid, summary) = events.filter_valid(&common)?;
    /// println!("{}", summary);
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn filter_valid(
        &self,
        universe: &TranscriptUniverse,
    ) -> anyhow::Result<(EventTable, FilterSummary)> {
        let mask = self.validity_mask(universe);
        let df = self
            .df
            .filter(&BooleanChunked::from_slice("valid", &mask))?;
        let records = self
            .records
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(r, _)| r.clone())
            .collect::<Vec<_>>();
        let valid = EventTable { df, records };

        let referenced = self.referenced_transcripts(universe.normalization());
        let summary = FilterSummary {
            replicate_universes: Vec::new(),
            n_common: universe.len(),
            n_referenced: referenced.len(),
            n_referenced_missing: referenced.difference(universe).count(),
            n_before: self.height(),
            n_after: valid.height(),
            types_before: self.type_counts(),
            types_after: valid.type_counts(),
            output: None,
        };
        info!(
            "{} of {} events reference only transcripts present in all replicates.",
            summary.n_after, summary.n_before
        );
        if summary.n_after == 0 && summary.n_before > 0 {
            warn!("No event passed the consistency filter; the filtered event set is empty.")
        }
        Ok((valid, summary))
    }

    /// Writes the table as a tab-separated file with a header line. The parent directory is
    /// created if it does not exist.
    pub fn write_ioe<T: AsRef<Path>>(&self, file_path: T) -> anyhow::Result<()> {
        let file_path = file_path.as_ref();
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Could not create the output directory {}", parent.display())
                })?;
            }
        }

        let mut out_df = self.df.clone();
        let file = fs::File::create(file_path)
            .with_context(|| format!("Could not create {}", file_path.display()))?;
        let mut file = BufWriter::with_capacity(4194304, file);
        // fields were split on raw tabs, so they are written back without quoting
        CsvWriter::new(&mut file)
            .has_header(true)
            .with_separator(b'\t')
            .with_quote_style(QuoteStyle::Never)
            .finish(&mut out_df)?;
        Ok(())
    }
}

/// Runs the consistency filter end to end: loads the events and one expression matrix per
/// replicate, intersects the replicates' transcript universes, keeps the events whose
/// transcripts are all in the common universe, and writes them to `out_path`.
///
/// ### Arguments
///
/// * `events_ioe`: The combined events.ioe file.
/// * `tpm_files`: One `(label, path)` pair per replicate expression matrix; at least one.
/// * `out_path`: Where the filtered events are written.
/// * `normalization`: How transcript identifiers are compared.
///
/// ### Returns
///
/// The [FilterSummary] of the run. Missing or malformed inputs are errors; an empty common
/// universe or an empty result is not, but is logged as a warning and flagged in the summary.
pub fn filter_events<P: AsRef<Path>, Q: AsRef<Path>, L: ToString, R: AsRef<Path>>(
    events_ioe: P,
    tpm_files: &[(L, Q)],
    out_path: R,
    normalization: Normalization,
) -> anyhow::Result<FilterSummary> {
    let events = EventTable::from_ioe(events_ioe.as_ref())?;
    info!(
        "Total transcripts referenced by events: {}",
        events.referenced_transcripts(normalization).len()
    );

    let mut universes = Vec::with_capacity(tpm_files.len());
    let mut sizes = Vec::with_capacity(tpm_files.len());
    for (label, path) in tpm_files {
        let matrix = ReplicateMatrix::from_path(path.as_ref(), MatrixKind::Tpm, label.to_string())?;
        let universe = TranscriptUniverse::from_matrix(&matrix, normalization)?;
        info!(
            "{}: transcripts in TPM matrix: {}",
            matrix.label,
            universe.len()
        );
        sizes.push((matrix.label.clone(), universe.len()));
        universes.push(universe);
    }
    let common = common_universe(&universes)?;

    let (valid, mut summary) = events.filter_valid(&common)?;
    valid.write_ioe(out_path.as_ref())?;
    info!("Saved filtered events: {}", out_path.as_ref().display());

    summary.replicate_universes = sizes;
    summary.output = Some(out_path.as_ref().to_path_buf());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_events() -> EventTable {
        let df = df!(
            "seqname" => ["chr1", "chr1", "chr2", "chr3", "chr4"],
            "gene_id" => ["G1", "G2", "G3", "G4", "G5"],
            "event_id" => ["G1;A3:chr1:1-2", "G2;SE:chr1:3-4", "G3;SE:chr2:5-6", "G4;RI:chr3:7-8", "G5"],
            "alternative_transcripts" => ["T1,T2", "T1", "T4", "T2", "T1"],
            "total_transcripts" => ["T1,T2,T3", "T1,T2", "T4,T5", "T2,T1", "T1"],
        )
        .unwrap();
        EventTable::new(df).unwrap()
    }

    fn uni(ids: &[&str]) -> TranscriptUniverse {
        TranscriptUniverse::new(ids, Normalization::Exact)
    }

    fn ids(t: &EventTable) -> Vec<String> {
        t.records().iter().map(|r| r.event_id.clone()).collect()
    }

    #[test]
    fn test_worked_example() {
        let df = df!(
            "event_id" => ["G1;A3:chr1"],
            "alternative_transcripts" => ["T1,T2"],
            "total_transcripts" => ["T1,T2,T3"],
        )
        .unwrap();
        let events = EventTable::new(df).unwrap();
        let common = common_universe(&[
            uni(&["T1", "T2", "T3"]),
            uni(&["T1", "T2"]),
            uni(&["T1", "T2", "T3"]),
        ])
        .unwrap();
        let (valid, summary) = events.filter_valid(&common).unwrap();
        assert!(valid.is_empty());
        assert_eq!(valid.df().height(), 0);
        assert_eq!(summary.n_before, 1);
        assert_eq!(summary.n_after, 0);
        assert_eq!(summary.n_referenced_missing, 1);
    }

    #[test]
    fn test_filter_keeps_columns_and_order() {
        let events = toy_events();
        let (valid, summary) = events.filter_valid(&uni(&["T1", "T2", "T4"])).unwrap();
        assert_eq!(ids(&valid), vec!["G2;SE:chr1:3-4", "G4;RI:chr3:7-8", "G5"]);
        assert_eq!(valid.df().get_column_names(), events.df().get_column_names());
        assert_eq!(
            valid
                .df()
                .column("gene_id")
                .unwrap()
                .utf8()
                .unwrap()
                .into_iter()
                .collect::<Vec<_>>(),
            vec![Some("G2"), Some("G4"), Some("G5")]
        );
        assert_eq!(summary.n_before, 5);
        assert_eq!(summary.n_after, 3);
        assert_eq!(summary.n_referenced, 5);
        assert_eq!(summary.n_referenced_missing, 2);
        assert_eq!(summary.types_before.get("SE"), 2);
        assert_eq!(summary.types_after.get("SE"), 1);
        assert_eq!(summary.types_after.unparseable(), 1);
    }

    #[test]
    fn test_removing_a_transcript() {
        let events = toy_events();
        let full = uni(&["T1", "T2", "T3", "T4", "T5"]);
        let before = events.validity_mask(&full);
        assert!(before.iter().all(|v| *v));

        // dropping T3 only invalidates the event that lists it
        let without_t3 = uni(&["T1", "T2", "T4", "T5"]);
        let after = events.validity_mask(&without_t3);
        assert_eq!(after, vec![false, true, true, true, true]);
    }

    #[test]
    fn test_idempotent() {
        let events = toy_events();
        let common = uni(&["T1", "T2", "T4"]);
        let (once, _) = events.filter_valid(&common).unwrap();
        let (twice, _) = once.filter_valid(&common).unwrap();
        assert_eq!(ids(&once), ids(&twice));
        assert!(once.df().frame_equal(twice.df()));
    }

    #[test]
    fn test_normalization_matters() {
        let df = df!(
            "event_id" => ["G1;SE:chr1"],
            "alternative_transcripts" => ["T1"],
            "total_transcripts" => ["T1, T2"],
        )
        .unwrap();
        let events = EventTable::new(df).unwrap();
        let (exact, _) = events.filter_valid(&uni(&["T1", "T2"])).unwrap();
        assert!(exact.is_empty());
        let trimmed = TranscriptUniverse::new(["T1", "T2"], Normalization::Trim);
        let (trim, _) = events.filter_valid(&trimmed).unwrap();
        assert_eq!(trim.height(), 1);
    }

    #[test]
    fn test_empty_entries_are_invalid() {
        let df = df!(
            "" => ["T1", ""],
            "s0" => ["1", "0"],
        )
        .unwrap();
        let m = ReplicateMatrix::new(df, MatrixKind::Tpm, "A").unwrap();
        let common = TranscriptUniverse::from_matrix(&m, Normalization::Exact).unwrap();

        let df = df!(
            "event_id" => ["G1;SE:chr1", "G2;SE:chr1", "G3;SE:chr1"],
            "alternative_transcripts" => ["", "T1,", "T1"],
            "total_transcripts" => ["T1", "T1", "T1"],
        )
        .unwrap();
        let events = EventTable::new(df).unwrap();
        assert_eq!(events.validity_mask(&common), vec![false, false, true]);

        let trimmed = TranscriptUniverse::new(["T1", " "], Normalization::Trim);
        assert!(!is_valid(&EventRecord::new("G1;SE:chr1", "T1, ", "T1"), &trimmed));
    }

    #[test]
    fn test_write_ioe_keeps_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let input = "event_id\tnote\talternative_transcripts\ttotal_transcripts\n\
                     G1;SE:chr1\t\tT1\tT1\n\
                     G2;RI:chr1\t\"q\"\tT1\tT1,T2\n";
        let src = dir.path().join("events.ioe");
        std::fs::write(&src, input).unwrap();
        let common = TranscriptUniverse::new(["T1", "T2"], Normalization::Exact);

        let once = dir.path().join("once.ioe");
        let (valid, _) = EventTable::from_ioe(&src).unwrap().filter_valid(&common).unwrap();
        valid.write_ioe(&once).unwrap();
        assert_eq!(std::fs::read_to_string(&once).unwrap(), input);

        let twice = dir.path().join("twice.ioe");
        let (valid, _) = EventTable::from_ioe(&once).unwrap().filter_valid(&common).unwrap();
        valid.write_ioe(&twice).unwrap();
        assert_eq!(std::fs::read_to_string(&twice).unwrap(), input);
    }

    #[test]
    fn test_type_counts() {
        let counts = EventTypeCounts::from_labels(["SE", "RI", "SE", "A3", "RI", "SE"]);
        let listed = counts
            .iter()
            .map(|(l, c)| (l.as_str(), *c))
            .collect::<Vec<_>>();
        assert_eq!(listed, vec![("SE", 3), ("RI", 2), ("A3", 1)]);
        assert_eq!(counts.total(), 6);
        assert_eq!(counts.get("MX"), 0);

        let tied = EventTypeCounts::from_labels(["SE", "A5", "RI"]);
        let labels = tied.iter().map(|(l, _)| l.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["A5", "RI", "SE"]);
        assert!(tied.to_string().starts_with("A5  1\n"));
    }

    #[test]
    fn test_write_ioe() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out.ioe");
        let events = toy_events();
        let (valid, _) = events.filter_valid(&uni(&["T1", "T2"])).unwrap();
        valid.write_ioe(&out).unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        let lines = written.lines().collect::<Vec<_>>();
        assert_eq!(
            lines[0],
            "seqname\tgene_id\tevent_id\talternative_transcripts\ttotal_transcripts"
        );
        assert_eq!(lines[1], "chr1\tG2\tG2;SE:chr1:3-4\tT1\tT1,T2");
        assert_eq!(lines[2], "chr3\tG4\tG4;RI:chr3:7-8\tT2\tT2,T1");
        assert_eq!(lines.len(), 4);
    }
}
