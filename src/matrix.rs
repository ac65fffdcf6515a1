use crate::reader::{HeaderMode, TsvTable};
use crate::spliceprep_utils::MatrixKind;
use anyhow::{bail, Context};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Represents one replicate's wide matrix: an expression (TPM) matrix keyed by transcript, or a
/// PSI matrix keyed by splicing event.
///
/// The underlying [DataFrame] holds the row key in its first column, named after the
/// [MatrixKind] (`transcript_id` or `event_id`), followed by one value column per sample or
/// timepoint in file order. Every column is stored as `Utf8` so that values are carried through
/// without any numeric reformatting.
///
/// ### Fields
///
/// * `df`: The key column followed by the value columns.
/// * `kind`: Whether this is a TPM or PSI matrix.
/// * `label`: A short name for the replicate (e.g. `A`), used in logs and errors.
#[derive(Clone, Debug)]
pub struct ReplicateMatrix {
    pub df: DataFrame,
    pub kind: MatrixKind,
    pub label: String,
}

impl ReplicateMatrix {
    /// Creates a [ReplicateMatrix] from a [DataFrame] whose first column holds the row keys.
    ///
    /// All columns are cast to `Utf8` and the first column is renamed to the key name of `kind`.
    ///
    /// ### Returns
    ///
    /// * [Ok]`(ReplicateMatrix)` on success.
    /// * [Err]`(...)` if the frame has no columns, a column cannot be represented as text, or a
    ///   value column already carries the key name.
    pub fn new<T: ToString>(
        df: DataFrame,
        kind: MatrixKind,
        label: T,
    ) -> anyhow::Result<ReplicateMatrix> {
        let label = label.to_string();
        if df.width() == 0 {
            bail!("The {} matrix of replicate {} has no columns.", kind, label)
        }

        let mut cols: Vec<Series> = Vec::with_capacity(df.width());
        for (i, s) in df.get_columns().iter().enumerate() {
            let mut s = s
                .cast(&DataType::Utf8)
                .with_context(|| format!("Could not read column {} as text", s.name()))?;
            if i == 0 {
                s.rename(kind.key_name());
            }
            cols.push(s);
        }
        let df = DataFrame::new(cols).with_context(|| {
            format!(
                "The {} matrix of replicate {} has a value column named {:?}",
                kind,
                label,
                kind.key_name()
            )
        })?;

        let rm = ReplicateMatrix { df, kind, label };
        let n_dup = rm.n_duplicate_keys()?;
        if n_dup > 0 {
            warn!(
                "The {} matrix of replicate {} contains {} duplicated {} value(s).",
                rm.kind,
                rm.label,
                n_dup,
                rm.kind.key_name()
            )
        }
        Ok(rm)
    }

    /// Reads a replicate matrix from a tab-separated file (plain or gzip compressed).
    ///
    /// The first column is the row key. The header line may name the key column or leave
    /// it out; in both cases the key column is renamed to the key name of `kind`.
    ///
    /// ### Example
    ///
    /// ```rust,no_run
    /// use spliceprep::{MatrixKind, ReplicateMatrix};
    /// let tpm_a = ReplicateMatrix::from_path("A_all.tpm", MatrixKind::Tpm, "A")?;
    /// println!("{} transcripts, {} samples", tpm_a.height(), tpm_a.n_values());
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_path<P: AsRef<Path>, T: ToString>(
        file_path: P,
        kind: MatrixKind,
        label: T,
    ) -> anyhow::Result<ReplicateMatrix> {
        let file_path = file_path.as_ref();
        let table = TsvTable::from_path(file_path, HeaderMode::RowIndexed)?;
        let df = table.into_dataframe()?;
        let rm = ReplicateMatrix::new(df, kind, label)
            .with_context(|| format!("Could not load {}", file_path.display()))?;
        info!(
            "{}: {} matrix with {} rows and {} value column(s) from {}",
            rm.label,
            rm.kind,
            rm.height(),
            rm.n_values(),
            file_path.display()
        );
        Ok(rm)
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    /// The number of rows.
    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// The number of value columns, i.e. all columns but the key column.
    pub fn n_values(&self) -> usize {
        self.df.width().saturating_sub(1)
    }

    /// The key column.
    pub fn keys(&self) -> anyhow::Result<&Series> {
        self.df
            .select_at_idx(0)
            .with_context(|| format!("The matrix of replicate {} has no key column", self.label))
    }

    /// The row keys, in row order. Missing keys are returned as empty strings.
    pub fn key_values(&self) -> anyhow::Result<Vec<&str>> {
        Ok(self
            .keys()?
            .utf8()?
            .into_iter()
            .map(|k| k.unwrap_or(""))
            .collect())
    }

    /// The names of the value columns, in file order.
    pub fn value_names(&self) -> Vec<&str> {
        self.df.get_column_names().into_iter().skip(1).collect()
    }

    /// Returns the `i`-th (0-based) value column.
    pub fn value_column(&self, i: usize) -> anyhow::Result<&Series> {
        self.df.select_at_idx(i + 1).with_context(|| {
            format!(
                "The {} matrix of replicate {} has {} value column(s); column {} was requested",
                self.kind,
                self.label,
                self.n_values(),
                i + 1
            )
        })
    }

    /// Counts the rows whose key already appeared on an earlier row.
    pub fn n_duplicate_keys(&self) -> anyhow::Result<usize> {
        let keys = self.key_values()?;
        let mut seen = std::collections::HashSet::with_capacity(keys.len());
        Ok(keys.into_iter().filter(|k| !seen.insert(*k)).count())
    }

    /// Maps every key to its row position. Fails if a key appears more than once.
    pub fn key_positions(&self) -> anyhow::Result<HashMap<&str, usize>> {
        let keys = self.key_values()?;
        let mut pos = HashMap::with_capacity(keys.len());
        for (i, k) in keys.into_iter().enumerate() {
            if pos.insert(k, i).is_some() {
                bail!(
                    "The {} matrix of replicate {} contains the key {:?} more than once; rows cannot be matched by key.",
                    self.kind,
                    self.label,
                    k
                )
            }
        }
        Ok(pos)
    }

    /// Builds a new matrix holding the rows at the given positions, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> anyhow::Result<ReplicateMatrix> {
        let mut cols = Vec::with_capacity(self.df.width());
        for s in self.df.get_columns() {
            let ca = s.utf8()?;
            let values = rows
                .iter()
                .map(|&r| {
                    if r < ca.len() {
                        Ok(ca.get(r))
                    } else {
                        bail!("Row {} is out of bounds for replicate {}", r, self.label)
                    }
                })
                .collect::<anyhow::Result<Vec<Option<&str>>>>()?;
            cols.push(Series::new(s.name(), values));
        }
        Ok(ReplicateMatrix {
            df: DataFrame::new(cols)?,
            kind: self.kind,
            label: self.label.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn toy() -> ReplicateMatrix {
        let df = df!(
            "" => ["T1", "T2", "T3"],
            "s0" => ["1.0", "2.0", "3.0"],
            "s1" => ["4", "5", "6"],
        )
        .unwrap();
        ReplicateMatrix::new(df, MatrixKind::Tpm, "A").unwrap()
    }

    #[test]
    fn test_new() {
        let m = toy();
        assert_eq!(m.df().get_column_names(), vec!["transcript_id", "s0", "s1"]);
        assert_eq!(m.n_values(), 2);
        assert_eq!(m.height(), 3);
        assert_eq!(m.key_values().unwrap(), vec!["T1", "T2", "T3"]);
        assert_eq!(m.value_names(), vec!["s0", "s1"]);
        assert_eq!(
            m.value_column(1).unwrap().utf8().unwrap().get(2),
            Some("6")
        );
        assert!(m.value_column(2).is_err());
    }

    #[test]
    fn test_numeric_input_is_cast() {
        let df = df!(
            "id" => ["E1", "E2"],
            "t0" => [0.5f64, 1.0],
        )
        .unwrap();
        let m = ReplicateMatrix::new(df, MatrixKind::Psi, "B").unwrap();
        assert_eq!(m.df().get_column_names(), vec!["event_id", "t0"]);
        assert_eq!(m.value_column(0).unwrap().dtype(), &DataType::Utf8);
    }

    #[test]
    fn test_key_name_clash() {
        let df = df!(
            "id" => ["T1"],
            "transcript_id" => ["1"],
        )
        .unwrap();
        assert!(ReplicateMatrix::new(df, MatrixKind::Tpm, "A").is_err());
        assert!(ReplicateMatrix::new(DataFrame::default(), MatrixKind::Tpm, "A").is_err());
    }

    #[test]
    fn test_duplicates_and_positions() {
        let df = df!(
            "id" => ["T1", "T2", "T1"],
            "s0" => ["1", "2", "3"],
        )
        .unwrap();
        let m = ReplicateMatrix::new(df, MatrixKind::Tpm, "A").unwrap();
        assert_eq!(m.n_duplicate_keys().unwrap(), 1);
        assert!(m.key_positions().is_err());

        let m = toy();
        let pos = m.key_positions().unwrap();
        assert_eq!(pos["T3"], 2);
    }

    #[test]
    fn test_select_rows() {
        let m = toy();
        let s = m.select_rows(&[2, 0]).unwrap();
        assert_eq!(s.key_values().unwrap(), vec!["T3", "T1"]);
        assert_eq!(
            s.value_column(0).unwrap().utf8().unwrap().get(0),
            Some("3.0")
        );
        assert!(m.select_rows(&[3]).is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A_all.tpm");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "sample_0h\tsample_16h\nT1\t0.1\t0.2\nT2\t1\t2\n").unwrap();
        drop(f);

        let m = ReplicateMatrix::from_path(&path, MatrixKind::Tpm, "A").unwrap();
        assert_eq!(
            m.df().get_column_names(),
            vec!["transcript_id", "sample_0h", "sample_16h"]
        );
        assert_eq!(m.key_values().unwrap(), vec!["T1", "T2"]);

        assert!(ReplicateMatrix::from_path(dir.path().join("missing.tpm"), MatrixKind::Tpm, "A").is_err());
    }
}
