use crate::reader::tsv::{HeaderMode, TsvTable};
use crate::spliceprep_utils::{event_type, EVENT_REQUIRED_COLUMNS, TRANSCRIPT_LIST_SEPARATOR};
use anyhow::{bail, Context};
use polars::prelude::{DataFrame, DataType};
use std::path::Path;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
/// One splicing event of an events.ioe table, reduced to the fields the consistency
/// filter needs.
///
/// # Fields
///
/// * `event_id`: The event identifier, structured as `gene;EVENT_TYPE:coordinates`.
/// * `alternative_transcripts`: The transcripts supporting the alternative (included) form.
/// * `total_transcripts`: All transcripts spanning the event locus.
///
/// The transcript lists are split on `,` without any trimming.
pub struct EventRecord {
    pub event_id: String,
    pub alternative_transcripts: Vec<String>,
    pub total_transcripts: Vec<String>,
}

impl EventRecord {
    /// Creates a record from the raw events.ioe fields.
    ///
    /// ```rust
    /// use spliceprep::reader::EventRecord;
    /// let rec = EventRecord::new("G1;A3:chr1", "T1,T2", "T1,T2,T3");
    /// assert_eq!(rec.total_transcripts, vec!["T1", "T2", "T3"]);
    /// assert_eq!(rec.event_type(), "A3");
    /// ```
    pub fn new(event_id: &str, alternative_transcripts: &str, total_transcripts: &str) -> EventRecord {
        EventRecord {
            event_id: event_id.to_string(),
            alternative_transcripts: split_transcripts(alternative_transcripts),
            total_transcripts: split_transcripts(total_transcripts),
        }
    }

    /// The coarse event type label, see [crate::spliceprep_utils::event_type].
    pub fn event_type(&self) -> &str {
        event_type(&self.event_id)
    }

    /// Iterates over the transcripts of both lists. Transcripts listed in both appear twice.
    pub fn transcripts(&self) -> impl Iterator<Item = &str> {
        self.alternative_transcripts
            .iter()
            .chain(self.total_transcripts.iter())
            .map(|t| t.as_str())
    }

    /// Returns `true` if either transcript list was an empty field.
    pub fn has_empty_list(&self) -> bool {
        is_empty_list(&self.alternative_transcripts) || is_empty_list(&self.total_transcripts)
    }
}

fn split_transcripts(s: &str) -> Vec<String> {
    s.split(TRANSCRIPT_LIST_SEPARATOR)
        .map(|t| t.to_string())
        .collect()
}

fn is_empty_list(v: &[String]) -> bool {
    v.len() == 1 && v[0].is_empty()
}

/// Reads an events.ioe file (plain or gzip compressed) into a [DataFrame] with one `Utf8`
/// column per file column, in file order.
///
/// Fails if the file cannot be read, is malformed, or lacks one of the required columns
/// `event_id`, `alternative_transcripts` and `total_transcripts`.
pub fn read_ioe<T: AsRef<Path>>(file_path: T) -> anyhow::Result<DataFrame> {
    let table = TsvTable::from_path(file_path.as_ref(), HeaderMode::Full)?;
    let df = table.into_dataframe()?;
    check_event_columns(&df).with_context(|| {
        format!("{} is not a valid events table", file_path.as_ref().display())
    })?;
    info!(
        "Finished parsing {}. Found {} events.",
        file_path.as_ref().display(),
        df.height()
    );
    Ok(df)
}

/// Checks that the required events.ioe columns are present in `df`.
pub fn check_event_columns(df: &DataFrame) -> anyhow::Result<()> {
    let names = df.get_column_names();
    let missing = EVENT_REQUIRED_COLUMNS
        .iter()
        .filter(|c| !names.contains(*c))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!(
            "The events table lacks the required column(s) {:?}; found {:?}.",
            missing,
            names
        )
    }
    Ok(())
}

/// Builds the typed [EventRecord]s of an events table, one per row and in row order.
///
/// The required columns are checked first. Missing values are read as empty fields. Events
/// with an empty transcript list are kept, and a warning reports how many there are, since
/// they can never be valid.
pub fn records_from_df(df: &DataFrame) -> anyhow::Result<Vec<EventRecord>> {
    check_event_columns(df)?;

    let mut cols = Vec::with_capacity(EVENT_REQUIRED_COLUMNS.len());
    for name in EVENT_REQUIRED_COLUMNS {
        cols.push(df.column(name)?.cast(&DataType::Utf8)?);
    }
    let ids = cols[0].utf8()?;
    let alts = cols[1].utf8()?;
    let totals = cols[2].utf8()?;

    let records = ids
        .into_iter()
        .zip(alts.into_iter())
        .zip(totals.into_iter())
        .map(|((id, alt), total)| {
            EventRecord::new(id.unwrap_or(""), alt.unwrap_or(""), total.unwrap_or(""))
        })
        .collect::<Vec<_>>();

    let n_empty = records.iter().filter(|r| r.has_empty_list()).count();
    if n_empty > 0 {
        warn!(
            "Found {} event(s) with an empty transcript list. They will never pass the consistency filter.",
            n_empty
        )
    }
    Ok(records)
}
