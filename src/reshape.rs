use crate::matrix::ReplicateMatrix;
use crate::options::{ReshapeOptions, RowAlignment};
use crate::spliceprep_utils::MatrixKind;
use anyhow::{bail, Context};
use polars::prelude::*;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One per-timepoint table: the key column followed by one value column per replicate,
/// named `{prefix}_{timepoint}`.
#[derive(Clone, Debug)]
pub struct TimepointTable {
    pub timepoint: String,
    pub kind: MatrixKind,
    pub df: DataFrame,
}

impl TimepointTable {
    /// The output file name, e.g. `time_16h.psi`.
    pub fn file_name(&self) -> String {
        format!("time_{}.{}", self.timepoint, self.kind.extension())
    }

    /// Writes the table into `dir` as a tab-separated file with a header line and returns
    /// the path written. `dir` is created if it does not exist.
    pub fn write<T: AsRef<Path>>(&self, dir: T) -> anyhow::Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create the output directory {}", dir.display()))?;
        let path = dir.join(self.file_name());

        let mut out_df = self.df.clone();
        let file = fs::File::create(&path)
            .with_context(|| format!("Could not create {}", path.display()))?;
        let mut file = BufWriter::with_capacity(4194304, file);
        CsvWriter::new(&mut file)
            .has_header(true)
            .with_separator(b'\t')
            .with_quote_style(QuoteStyle::Never)
            .finish(&mut out_df)?;
        Ok(path)
    }
}

/// Makes the replicate tables of one kind row-aligned with the first (canonical) one.
///
/// With [RowAlignment::Strict] the tables are returned unchanged once it is checked that they
/// all have the canonical row count and key sequence. With [RowAlignment::ByKey] the rows of
/// every other table are looked up by key and put in canonical order; keys absent from the
/// canonical table are dropped with a warning.
///
/// ### Returns
///
/// * [Ok]`(Vec<ReplicateMatrix>)`: The aligned tables, in input order.
/// * [Err]`(...)`: If `tables` is empty, the tables are of different kinds, or the tables
///   cannot be aligned under the chosen policy. The error names the replicate and, for strict
///   alignment, the first differing row.
pub fn align_replicates(
    tables: &[ReplicateMatrix],
    alignment: RowAlignment,
) -> anyhow::Result<Vec<ReplicateMatrix>> {
    let Some((canonical, rest)) = tables.split_first() else {
        bail!("No replicate table was given.")
    };
    if let Some(other) = rest.iter().find(|t| t.kind != canonical.kind) {
        bail!(
            "Replicate {} holds a {} matrix but replicate {} holds a {} matrix.",
            canonical.label,
            canonical.kind,
            other.label,
            other.kind
        )
    }
    let canonical_keys = canonical.key_values()?;
    // the canonical table must be unambiguous before other tables are matched to it
    if alignment == RowAlignment::ByKey {
        canonical.key_positions()?;
    }

    let mut aligned = Vec::with_capacity(tables.len());
    aligned.push(canonical.clone());
    for t in rest {
        match alignment {
            RowAlignment::Strict => {
                if t.height() != canonical.height() {
                    bail!(
                        "The {} matrices are not row-aligned: replicate {} has {} rows, replicate {} has {}.",
                        t.kind,
                        canonical.label,
                        canonical.height(),
                        t.label,
                        t.height()
                    )
                }
                let keys = t.key_values()?;
                if let Some((row, (a, b))) = canonical_keys
                    .iter()
                    .zip(keys.iter())
                    .enumerate()
                    .find(|(_, (a, b))| a != b)
                {
                    bail!(
                        "The {} matrices are not row-aligned: row {} is {:?} in replicate {} but {:?} in replicate {}.",
                        t.kind,
                        row + 1,
                        a,
                        canonical.label,
                        b,
                        t.label
                    )
                }
                aligned.push(t.clone());
            }
            RowAlignment::ByKey => {
                let positions = t.key_positions()?;
                let mut rows = Vec::with_capacity(canonical_keys.len());
                for k in &canonical_keys {
                    match positions.get(k) {
                        Some(&r) => rows.push(r),
                        None => bail!(
                            "Replicate {} lacks the key {:?} present in replicate {}.",
                            t.label,
                            k,
                            canonical.label
                        ),
                    }
                }
                let n_extra = t.height() - rows.len();
                if n_extra > 0 {
                    warn!(
                        "Dropping {} row(s) of replicate {} whose key is absent from replicate {}.",
                        n_extra, t.label, canonical.label
                    )
                }
                aligned.push(t.select_rows(&rows)?);
            }
        }
    }
    Ok(aligned)
}

// every table needs one value column per timepoint
fn check_columns(tables: &[ReplicateMatrix], n_timepoints: usize) -> anyhow::Result<()> {
    for t in tables {
        if t.n_values() < n_timepoints {
            bail!(
                "The {} matrix of replicate {} has {} value column(s) but {} timepoints were requested.",
                t.kind,
                t.label,
                t.n_values(),
                n_timepoints
            )
        }
    }
    Ok(())
}

/// Re-projects replicate-grouped tables into one table per timepoint.
///
/// For the timepoint at position *i*, the output holds the key column of the first replicate
/// followed, in replicate order, by the *i*-th value column of every replicate renamed
/// `{prefix}_{timepoint}`. Values are copied without any transformation. Value columns beyond
/// the number of timepoints are ignored.
///
/// ### Arguments
///
/// * `tables`: One matrix per replicate, all of the same [MatrixKind].
/// * `opts`: The timepoints, replicate prefixes (one per table) and alignment policy.
///
/// ### Example
///
/// ```rust
/// use polars::prelude::*;
/// use spliceprep::{reshape_one, MatrixKind, ReplicateMatrix};
/// use spliceprep::options::{ReshapeOptions, RowAlignment};
/// let a = df!("" => ["E1"], "x" => ["0.1"], "y" => ["0.2"])?;
/// let b = df!("" => ["E1"], "x" => ["0.3"], "y" => ["0.4"])?;
/// let tables = vec![
///     ReplicateMatrix::new(a, MatrixKind::Psi, "A")?,
///     ReplicateMatrix::new(b, MatrixKind::Psi, "B")?,
/// ];
/// let opts = ReshapeOptions::new(&["0h", "4h"], &["A", "B"], RowAlignment::Strict)?;
/// let out = reshape_one(&tables, &opts)?;
/// assert_eq!(out[1].file_name(), "time_4h.psi");
/// assert_eq!(out[1].df.get_column_names(), vec!["event_id", "A_4h", "B_4h"]);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn reshape_one(
    tables: &[ReplicateMatrix],
    opts: &ReshapeOptions,
) -> anyhow::Result<Vec<TimepointTable>> {
    if tables.len() != opts.replicates.len() {
        bail!(
            "Got {} replicate table(s) but {} replicate prefix(es) {:?}.",
            tables.len(),
            opts.replicates.len(),
            opts.replicate_names()
        )
    }
    check_columns(tables, opts.timepoints.len())?;
    let tables = align_replicates(tables, opts.alignment)?;
    let canonical = &tables[0];
    let kind = canonical.kind;

    let mut out = Vec::with_capacity(opts.timepoints.len());
    for (i, tp) in opts.timepoints.iter().enumerate() {
        let mut cols = Vec::with_capacity(tables.len() + 1);
        let mut key = canonical.keys()?.clone();
        key.rename(kind.key_name());
        cols.push(key);
        for (t, prefix) in tables.iter().zip(&opts.replicates) {
            let mut s = t.value_column(i)?.clone();
            s.rename(&format!("{}_{}", prefix, tp));
            cols.push(s);
        }
        let df = DataFrame::new(cols)
            .with_context(|| format!("Could not build the {} table of timepoint {}", kind, tp))?;
        out.push(TimepointTable {
            timepoint: tp.to_string(),
            kind,
            df,
        });
    }
    Ok(out)
}

/// Reshapes the PSI and TPM replicate tables and writes one file per timepoint and kind.
///
/// ### Arguments
///
/// * `psi`: One PSI matrix per replicate, in replicate order.
/// * `tpm`: One TPM matrix per replicate, in replicate order.
/// * `opts`: See [ReshapeOptions].
/// * `out_psi_dir` / `out_tpm_dir`: Where the `time_{timepoint}.psi` and
///   `time_{timepoint}.tpm` files are written; created if missing.
///
/// ### Returns
///
/// The paths written, PSI files first, each series in timepoint order. Both series are built
/// before anything is written, so a failing input leaves no partial output behind.
pub fn merge_replicates<P: AsRef<Path>, Q: AsRef<Path>>(
    psi: &[ReplicateMatrix],
    tpm: &[ReplicateMatrix],
    opts: &ReshapeOptions,
    out_psi_dir: P,
    out_tpm_dir: Q,
) -> anyhow::Result<Vec<PathBuf>> {
    let psi_tables = reshape_one(psi, opts).context("Could not reshape the PSI tables")?;
    let tpm_tables = reshape_one(tpm, opts).context("Could not reshape the TPM tables")?;

    let mut written = Vec::with_capacity(psi_tables.len() + tpm_tables.len());
    for t in &psi_tables {
        written.push(t.write(out_psi_dir.as_ref())?);
    }
    for t in &tpm_tables {
        written.push(t.write(out_tpm_dir.as_ref())?);
    }
    info!(
        "Wrote {} PSI and {} TPM timepoint tables.",
        psi_tables.len(),
        tpm_tables.len()
    );
    Ok(written)
}
