use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::trace;

/// The columns every events.ioe table must carry.
pub const EVENT_REQUIRED_COLUMNS: [&str; 3] =
    ["event_id", "alternative_transcripts", "total_transcripts"];

/// The default file name of the filtered events table.
pub const DEFAULT_FILTERED_EVENTS_NAME: &str = "filtered_events_all_replicates.ioe";

/// The replicate prefixes the downstream tools expect.
pub const CANONICAL_REPLICATES: [&str; 3] = ["A", "B", "C"];

/// The default timepoint labels used by the replicate merger.
pub const DEFAULT_TIMEPOINTS: &str = "0h,16h,20h,24h";

/// The label given to events whose `event_id` does not carry an event type.
pub const UNPARSEABLE_EVENT_TYPE: &str = "NA";

/// The separator used by the transcript list fields of events.ioe.
pub const TRANSCRIPT_LIST_SEPARATOR: char = ',';

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Represents the kinds of replicate-grouped wide matrices handled by spliceprep.
///
/// Both kinds share the same layout: the first column is the row key and every
/// following column holds one value per timepoint. They differ in what the row key
/// identifies and in how the per-timepoint outputs are named.
///
/// # Variants
///
/// * `Tpm` - transcript abundances in Transcripts Per Million, keyed by transcript identifier.
/// * `Psi` - percent spliced-in values, keyed by splicing event identifier.
pub enum MatrixKind {
    Tpm,
    Psi,
}

impl MatrixKind {
    /// The name given to the row key column in every table written for this kind.
    ///
    /// ```rust
    /// use spliceprep::MatrixKind;
    /// assert_eq!(MatrixKind::Tpm.key_name(), "transcript_id");
    /// assert_eq!(MatrixKind::Psi.key_name(), "event_id");
    /// ```
    pub fn key_name(&self) -> &'static str {
        match self {
            MatrixKind::Tpm => "transcript_id",
            MatrixKind::Psi => "event_id",
        }
    }

    /// The file extension (without the dot) used for files of this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            MatrixKind::Tpm => "tpm",
            MatrixKind::Psi => "psi",
        }
    }
}

impl std::str::FromStr for MatrixKind {
    type Err = anyhow::Error;

    /// Converts from a [&str] to the corresponding [MatrixKind].
    /// The result is an error variant if `s` names no known kind.
    fn from_str(s: &str) -> anyhow::Result<MatrixKind> {
        let kind = match s.to_lowercase().as_str() {
            "tpm" => MatrixKind::Tpm,
            "psi" => MatrixKind::Psi,
            _ => anyhow::bail!("Cannot parse the matrix kind {:?}; expected tpm or psi.", s),
        };
        Ok(kind)
    }
}

impl std::fmt::Display for MatrixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatrixKind::Tpm => write!(f, "TPM"),
            MatrixKind::Psi => write!(f, "PSI"),
        }
    }
}

/// Returns `true` if the buffered stream starts with the gzip magic bytes. Nothing is
/// consumed, so `reader` must not have been read from yet.
pub fn is_gzipped<T: BufRead>(reader: &mut T) -> std::io::Result<bool> {
    const GZIP_MAGIC_NUMBER: [u8; 2] = [0x1f, 0x8b];

    Ok(reader.fill_buf()?.starts_with(&GZIP_MAGIC_NUMBER))
}

/// Opens the file at `p` for buffered line reading. Gzip compressed input is
/// detected from its magic bytes and decompressed transparently.
///
/// It returns [Ok]`(Box<dyn BufRead>)` on success and an [anyhow::Error] naming the
/// file on failure.
pub fn open_buffered<T: AsRef<Path>>(p: T) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(p.as_ref()).map_err(|e| {
        anyhow::anyhow!("Could not open the input file {:?}: {}", p.as_ref(), e)
    })?;
    let mut inner_rdr = BufReader::new(file);
    if is_gzipped(&mut inner_rdr)? {
        trace!("auto-detected gzipped file {:?} - reading via decompression", p.as_ref());
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(inner_rdr))))
    } else {
        Ok(Box::new(inner_rdr))
    }
}

/// Extracts the coarse event type label from an events.ioe `event_id`.
///
/// Event identifiers look like `gene;EVENT_TYPE:seqname:coordinates:strand`. The label is
/// the segment after the first `;`, cut at its first `:`. Identifiers without a `;`, or
/// whose label would be empty, fall in the [UNPARSEABLE_EVENT_TYPE] category.
///
/// ```rust
/// use spliceprep::spliceprep_utils::event_type;
/// assert_eq!(event_type("ENSG01;SE:chr1:100-200:300-400:+"), "SE");
/// assert_eq!(event_type("no_separator"), "NA");
/// ```
pub fn event_type(event_id: &str) -> &str {
    let label = event_id
        .split(';')
        .nth(1)
        .and_then(|seg| seg.split(':').next());
    match label {
        Some(l) if !l.is_empty() => l,
        _ => UNPARSEABLE_EVENT_TYPE,
    }
}

/// Splits a comma-separated command line list, trimming each entry and
/// dropping the empty ones.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read, Write};

    #[test]
    fn test_event_type() {
        assert_eq!(event_type("G1;A3:chr1:10-20:5-20:+"), "A3");
        assert_eq!(event_type("G1;RI"), "RI");
        assert_eq!(event_type("G1;SE:chr1;extra"), "SE");
        assert_eq!(event_type("G1"), UNPARSEABLE_EVENT_TYPE);
        assert_eq!(event_type("G1;:chr1"), UNPARSEABLE_EVENT_TYPE);
        assert_eq!(event_type(""), UNPARSEABLE_EVENT_TYPE);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("0h, 16h,,20h "), vec!["0h", "16h", "20h"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_matrix_kind() {
        let kind: MatrixKind = "PSI".parse().unwrap();
        assert_eq!(kind, MatrixKind::Psi);
        assert_eq!(kind.extension(), "psi");
        assert!("bed".parse::<MatrixKind>().is_err());
    }

    #[test]
    fn test_is_gzipped() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"t1\t1.0\n").unwrap();
        let gz = enc.finish().unwrap();

        let mut rdr = BufReader::new(Cursor::new(gz.clone()));
        assert!(is_gzipped(&mut rdr).unwrap());
        let mut plain = BufReader::new(Cursor::new(b"t1\t1.0\n".to_vec()));
        assert!(!is_gzipped(&mut plain).unwrap());

        let mut out = String::new();
        MultiGzDecoder::new(BufReader::new(Cursor::new(gz)))
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "t1\t1.0\n");
    }
}
