use crate::matrix::ReplicateMatrix;
use crate::options::Normalization;
use crate::reader::EventRecord;
use anyhow::bail;
use std::collections::HashSet;
use tracing::{info, warn};

/// A set of transcript identifiers.
///
/// A universe is built either from the row keys of one replicate's expression matrix (the
/// transcripts that replicate quantifies), or from the transcript lists of a set of events (the
/// transcripts the events reference). Identifiers are stored after applying a [Normalization]
/// policy, and every lookup applies the same policy to the queried identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranscriptUniverse {
    ids: HashSet<String>,
    normalization: Normalization,
}

impl TranscriptUniverse {
    /// Creates a universe from any collection of identifiers. Duplicates collapse and
    /// identifiers that are empty after normalization are dropped.
    pub fn new<I, T>(ids: I, normalization: Normalization) -> TranscriptUniverse
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        TranscriptUniverse {
            ids: ids
                .into_iter()
                .map(|t| normalization.apply(t.as_ref()).into_owned())
                .filter(|t| !t.is_empty())
                .collect(),
            normalization,
        }
    }

    /// Collects the row keys of an expression matrix.
    ///
    /// ### Example
    ///
    /// ```rust,no_run
    /// use spliceprep::{MatrixKind, ReplicateMatrix, TranscriptUniverse};
    /// use spliceprep::options::Normalization;
    /// let tpm_a = ReplicateMatrix::from_path("A_all.tpm", MatrixKind::Tpm, "A")?;
    /// let universe = TranscriptUniverse::from_matrix(&tpm_a, Normalization::Exact)?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_matrix(
        matrix: &ReplicateMatrix,
        normalization: Normalization,
    ) -> anyhow::Result<TranscriptUniverse> {
        let keys = matrix.key_values()?;
        let n_empty = keys
            .iter()
            .filter(|k| normalization.apply(k).is_empty())
            .count();
        if n_empty > 0 {
            warn!(
                "Ignoring {} row(s) with an empty {} in the {} matrix of replicate {}.",
                n_empty,
                matrix.kind.key_name(),
                matrix.kind,
                matrix.label
            )
        }
        Ok(TranscriptUniverse::new(keys, normalization))
    }

    /// Collects every transcript referenced by the alternative or total transcript lists
    /// of `events`.
    pub fn from_events(events: &[EventRecord], normalization: Normalization) -> TranscriptUniverse {
        TranscriptUniverse::new(events.iter().flat_map(|e| e.transcripts()), normalization)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Returns `true` if `id`, after normalization, belongs to the universe. An empty
    /// identifier never does.
    pub fn contains(&self, id: &str) -> bool {
        let key = self.normalization.apply(id);
        self.ids.contains(&*key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(|s| s.as_str())
    }

    /// The identifiers of `self` that are not in `other`.
    pub fn difference<'a>(&'a self, other: &'a TranscriptUniverse) -> impl Iterator<Item = &'a str> {
        self.ids
            .iter()
            .filter(move |t| !other.contains(t))
            .map(|s| s.as_str())
    }

    /// The identifiers in both `self` and `other`, with the normalization of `self`.
    pub fn intersection(&self, other: &TranscriptUniverse) -> TranscriptUniverse {
        TranscriptUniverse {
            ids: self
                .ids
                .iter()
                .filter(|t| other.contains(t))
                .cloned()
                .collect(),
            normalization: self.normalization,
        }
    }
}

/// Intersects the per-replicate universes into the common universe: the transcripts
/// quantified by every replicate.
///
/// The result does not depend on the order of `universes`. Any number of universes
/// (at least one) is accepted; a single universe is returned unchanged.
///
/// ### Returns
///
/// * [Ok]`(TranscriptUniverse)`: The intersection. An empty intersection is logged as a
///   warning, since no event can then pass the consistency filter.
/// * [Err]`(...)`: If `universes` is empty, or the universes were built with different
///   normalization policies.
///
/// ### Example
///
/// ```rust
/// use spliceprep::{common_universe, TranscriptUniverse};
/// use spliceprep::options::Normalization;
/// let a = TranscriptUniverse::new(["T1", "T2", "T3"], Normalization::Exact);
/// let b = TranscriptUniverse::new(["T1", "T2"], Normalization::Exact);
/// let common = common_universe(&[a, b])?;
/// assert_eq!(common.len(), 2);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn common_universe(universes: &[TranscriptUniverse]) -> anyhow::Result<TranscriptUniverse> {
    let Some((first, rest)) = universes.split_first() else {
        bail!("At least one transcript universe is needed to build the common universe.")
    };
    if rest
        .iter()
        .any(|u| u.normalization() != first.normalization())
    {
        bail!("The transcript universes were built with different normalization policies.")
    }

    // start from the smallest set to keep the scan short
    let smallest = universes
        .iter()
        .min_by_key(|u| u.len())
        .unwrap_or(first);
    let mut common = smallest.clone();
    for u in universes {
        if common.is_empty() {
            break;
        }
        common = common.intersection(u);
    }

    info!(
        "Transcripts present in all {} replicate(s): {}",
        universes.len(),
        common.len()
    );
    if common.is_empty() {
        warn!("The common transcript universe is empty: no transcript is quantified in every replicate. No event can pass the filter.")
    }
    Ok(common)
}
