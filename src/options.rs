use crate::spliceprep_utils::{split_list, CANONICAL_REPLICATES, DEFAULT_TIMEPOINTS};
use anyhow::bail;
use nutype::nutype;
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::warn;

#[nutype(sanitize(trim), derive(Debug, Clone, PartialEq, Eq, Hash, Display))]
/// A timepoint label such as `0h` or `16h`. Surrounding whitespace is removed on construction.
pub struct TimepointLabel(String);

#[nutype(sanitize(trim), derive(Debug, Clone, PartialEq, Eq, Hash, Display))]
/// A replicate prefix such as `A`, used to name the per-replicate output columns.
pub struct ReplicatePrefix(String);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
/// Controls how transcript identifiers are compared when an event's transcripts are
/// looked up in the common transcript universe.
///
/// The same policy is applied to the identifiers taken from the expression matrices and to
/// the identifiers listed by the events, so that both sides of the membership test agree.
/// It never changes the event rows written to the output.
///
/// # Variants
///
/// * `Exact` - identifiers are compared as-is. Leading or trailing blanks in the source data
///   take part in the comparison.
/// * `Trim` - surrounding whitespace is removed before comparing.
/// * `TrimLowercase` - surrounding whitespace is removed and ASCII letters are lowercased.
pub enum Normalization {
    #[default]
    Exact,
    Trim,
    TrimLowercase,
}

impl Normalization {
    /// Applies the normalization policy to a single transcript identifier.
    ///
    /// ```rust
    /// use spliceprep::options::Normalization;
    /// assert_eq!(Normalization::Exact.apply(" T1"), " T1");
    /// assert_eq!(Normalization::Trim.apply(" T1 "), "T1");
    /// assert_eq!(Normalization::TrimLowercase.apply(" ENST01 "), "enst01");
    /// ```
    pub fn apply<'a>(&self, id: &'a str) -> Cow<'a, str> {
        match self {
            Normalization::Exact => Cow::Borrowed(id),
            Normalization::Trim => Cow::Borrowed(id.trim()),
            Normalization::TrimLowercase => {
                let t = id.trim();
                if t.bytes().any(|b| b.is_ascii_uppercase()) {
                    Cow::Owned(t.to_ascii_lowercase())
                } else {
                    Cow::Borrowed(t)
                }
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
/// Controls how the rows of the replicate tables are matched up when they are merged
/// into per-timepoint tables.
///
/// # Variants
///
/// * `Strict` - the tables must already be aligned: same number of rows and the same key
///   in every row position. Any mismatch is an error.
/// * `ByKey` - rows of the non-canonical replicates are looked up by key and reordered to
///   follow the canonical (first) replicate. Every canonical key must be present exactly once
///   in each replicate.
pub enum RowAlignment {
    #[default]
    Strict,
    ByKey,
}

#[derive(Clone, Debug)]
/// Configuration of a replicate merging run.
///
/// # Fields
///
/// * `timepoints`: The ordered timepoint labels. The label at position *i* names the *i*-th
///   value column of every replicate table.
/// * `replicates`: The ordered replicate prefixes, one per replicate table.
/// * `alignment`: How replicate rows are matched up, see [RowAlignment].
///
/// # Default
///
/// * `timepoints`: `0h,16h,20h,24h`
/// * `replicates`: `A,B,C`
/// * `alignment`: [RowAlignment::Strict]
pub struct ReshapeOptions {
    pub timepoints: Vec<TimepointLabel>,
    pub replicates: Vec<ReplicatePrefix>,
    pub alignment: RowAlignment,
}

impl Default for ReshapeOptions {
    fn default() -> ReshapeOptions {
        ReshapeOptions {
            timepoints: split_list(DEFAULT_TIMEPOINTS)
                .into_iter()
                .map(TimepointLabel::new)
                .collect(),
            replicates: CANONICAL_REPLICATES
                .iter()
                .map(|r| ReplicatePrefix::new(r.to_string()))
                .collect(),
            alignment: RowAlignment::default(),
        }
    }
}

impl ReshapeOptions {
    /// Builds reshaping options from explicit label lists.
    ///
    /// ### Arguments
    ///
    /// * `timepoints`: The ordered timepoint labels.
    /// * `replicates`: The ordered replicate prefixes.
    /// * `alignment`: The row alignment policy.
    ///
    /// ### Returns
    ///
    /// Returns an error if either list is empty, contains an empty label, or repeats a label.
    /// Repeated timepoints would write the same output file twice and repeated prefixes would
    /// produce duplicated column names.
    ///
    /// A note is logged when the replicate prefixes differ from the canonical `A,B,C`, since the
    /// downstream tools expect exactly those three groups.
    pub fn new<T: AsRef<str>>(
        timepoints: &[T],
        replicates: &[T],
        alignment: RowAlignment,
    ) -> anyhow::Result<ReshapeOptions> {
        let timepoints = timepoints
            .iter()
            .map(|t| TimepointLabel::new(t.as_ref().to_string()))
            .collect::<Vec<_>>();
        let replicates = replicates
            .iter()
            .map(|r| ReplicatePrefix::new(r.as_ref().to_string()))
            .collect::<Vec<_>>();

        check_labels("timepoint", &timepoints)?;
        check_labels("replicate prefix", &replicates)?;

        let opts = ReshapeOptions {
            timepoints,
            replicates,
            alignment,
        };
        if !opts.has_canonical_replicates() {
            warn!(
                "Note: downstream column naming expects three replicate groups {:?}, got {:?}.",
                CANONICAL_REPLICATES,
                opts.replicate_names()
            );
        }
        Ok(opts)
    }

    /// Builds reshaping options from the comma-separated lists accepted on the command line.
    /// Entries are trimmed and empty entries are dropped.
    pub fn from_lists(
        timepoints: &str,
        replicates: &str,
        alignment: RowAlignment,
    ) -> anyhow::Result<ReshapeOptions> {
        ReshapeOptions::new(&split_list(timepoints), &split_list(replicates), alignment)
    }

    /// Returns `true` if the replicate prefixes are exactly `A,B,C` in that order.
    pub fn has_canonical_replicates(&self) -> bool {
        self.replicate_names() == CANONICAL_REPLICATES
    }

    pub fn timepoint_names(&self) -> Vec<String> {
        self.timepoints.iter().map(|t| t.to_string()).collect()
    }

    pub fn replicate_names(&self) -> Vec<String> {
        self.replicates.iter().map(|r| r.to_string()).collect()
    }
}

// rejects empty lists, empty labels and duplicates
fn check_labels<L: std::fmt::Display>(what: &str, labels: &[L]) -> anyhow::Result<()> {
    if labels.is_empty() {
        bail!("The {} list is empty. Cannot proceed.", what)
    }
    let mut seen = HashSet::with_capacity(labels.len());
    for l in labels {
        let name = l.to_string();
        if name.is_empty() {
            bail!("Found an empty {} label. Cannot proceed.", what)
        }
        if !seen.insert(name.clone()) {
            bail!("The {} {:?} is given more than once. Cannot proceed.", what, name)
        }
    }
    Ok(())
}

#[derive(Clone, Debug)]
/// Configuration of a TPM format validation run.
///
/// # Fields
///
/// * `pattern`: A shell-style glob matched against the file names in the input directory.
///   `*` matches any run of characters, `?` a single character and `[...]` a character class.
pub struct ValidateOptions {
    pub pattern: String,
}

impl Default for ValidateOptions {
    fn default() -> ValidateOptions {
        ValidateOptions {
            pattern: String::from("*.tpm"),
        }
    }
}

impl ValidateOptions {
    pub fn new<T: ToString>(pattern: T) -> ValidateOptions {
        ValidateOptions {
            pattern: pattern.to_string(),
        }
    }
}
