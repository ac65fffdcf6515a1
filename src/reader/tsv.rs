use crate::spliceprep_utils::open_buffered;
use anyhow::{bail, Context};
use polars::prelude::{DataFrame, NamedFrom, Series};
use std::io::BufRead;
use std::path::Path;
use tracing::debug;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Describes how the first line of a tab-separated table relates to its data rows.
///
/// # Variants
///
/// * `Full` - the first line names every column, including the first one.
/// * `RowIndexed` - the first column holds row keys. The first line may either name every
///   column, or name only the value columns and leave the key column out, which is the layout
///   written by the common transcript quantification and PSI tools.
/// * `None` - there is no header line; columns are named `column_1`, `column_2`, ...
pub enum HeaderMode {
    Full,
    RowIndexed,
    None,
}

#[derive(Clone, Debug)]
/// A tab-separated table held column-wise as raw strings.
///
/// The values are kept exactly as they appear in the file so that they can be written
/// back unchanged. A `TsvTable` is usually turned into a polars [DataFrame] with
/// [TsvTable::into_dataframe].
///
/// # Fields
///
/// * `header`: The column names, one per column.
/// * `columns`: The column values; every inner vector has the same length.
/// * `source`: A description of where the table was read from, used in error messages.
pub struct TsvTable {
    pub header: Vec<String>,
    pub columns: Vec<Vec<String>>,
    pub source: String,
}

impl TsvTable {
    /// Reads a tab-separated table from a plain or gzip compressed file.
    ///
    /// ### Arguments
    ///
    /// * `file_path`: The path of the table.
    /// * `mode`: How the first line of the file should be interpreted, see [HeaderMode].
    ///
    /// ### Returns
    ///
    /// Returns an [`anyhow::Result<TsvTable>`]:
    /// * [Ok]`(TsvTable)` if the file could be read and every data row has the table width.
    /// * [Err]`(...)` if the file cannot be opened or read, if it holds no header line while
    ///   one is expected, or if a row has an unexpected number of fields. The error names the
    ///   file and the 1-based line number.
    ///
    /// ### Example
    ///
    /// ```rust,no_run
    /// use spliceprep::reader::{HeaderMode, TsvTable};
    /// let table = TsvTable::from_path("A_all.tpm", HeaderMode::RowIndexed)?;
    /// println!("{} rows", table.height());
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_path<T: AsRef<Path>>(file_path: T, mode: HeaderMode) -> anyhow::Result<TsvTable> {
        let source = file_path.as_ref().display().to_string();
        let rdr = open_buffered(file_path.as_ref())?;
        TsvTable::from_reader(rdr, mode, &source)
    }

    /// Reads a tab-separated table from any buffered reader. `source` is used in error messages.
    pub fn from_reader<R: BufRead>(
        rdr: R,
        mode: HeaderMode,
        source: &str,
    ) -> anyhow::Result<TsvTable> {
        let mut header: Option<Vec<String>> = None;
        let mut columns: Vec<Vec<String>> = Vec::new();
        let mut n_blank = 0usize;

        for (idx, l) in rdr.lines().enumerate() {
            let line_no = idx + 1;
            let line = l.with_context(|| format!("Failed reading line {} of {}", line_no, source))?;
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.trim().is_empty() {
                n_blank += 1;
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();

            if header.is_none() && mode != HeaderMode::None {
                header = Some(fields.iter().map(|f| f.to_string()).collect());
                continue;
            }

            if columns.is_empty() {
                // the first data row fixes the table width
                let width = fields.len();
                let names = match (&header, mode) {
                    (None, _) => (1..=width).map(|i| format!("column_{}", i)).collect(),
                    (Some(h), HeaderMode::RowIndexed) if h.len() + 1 == width => {
                        let mut names = Vec::with_capacity(width);
                        names.push(String::new());
                        names.extend(h.iter().cloned());
                        names
                    }
                    (Some(h), _) if h.len() == width => h.clone(),
                    (Some(h), _) => bail!(
                        "{}:{} has {} fields but the header names {} columns.",
                        source,
                        line_no,
                        width,
                        h.len()
                    ),
                };
                header = Some(names);
                columns = vec![Vec::new(); width];
            }

            if fields.len() != columns.len() {
                bail!(
                    "{}:{} has {} fields, expected {}.",
                    source,
                    line_no,
                    fields.len(),
                    columns.len()
                )
            }
            for (col, f) in columns.iter_mut().zip(fields) {
                col.push(f.to_string());
            }
        }

        let header = match header {
            Some(h) => h,
            None if mode == HeaderMode::None => Vec::new(),
            None => bail!("{} is empty; expected a header line.", source),
        };
        // a header without data rows still defines the columns
        if columns.is_empty() {
            columns = vec![Vec::new(); header.len()];
        }

        debug!(
            "Read {} rows and {} columns from {} ({} blank lines skipped).",
            columns.first().map(|c| c.len()).unwrap_or(0),
            header.len(),
            source,
            n_blank
        );

        Ok(TsvTable {
            header,
            columns,
            source: source.to_string(),
        })
    }

    /// The number of data rows.
    pub fn height(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    /// The number of columns.
    pub fn width(&self) -> usize {
        self.header.len()
    }

    /// Converts the table into a polars [DataFrame] with one `Utf8` column per table column.
    ///
    /// Fails if two columns share a name, as a [DataFrame] requires unique column names.
    pub fn into_dataframe(self) -> anyhow::Result<DataFrame> {
        let source = self.source;
        let series = self
            .header
            .iter()
            .zip(self.columns)
            .map(|(name, values)| Series::new(name.as_str(), values))
            .collect::<Vec<Series>>();
        DataFrame::new(series)
            .with_context(|| format!("Could not build a table from {}", source))
    }
}
