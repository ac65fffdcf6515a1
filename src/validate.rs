use crate::options::ValidateOptions;
use crate::reader::{HeaderMode, TsvTable};
use anyhow::{bail, Context};
use glob::{MatchOptions, Pattern};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The number of columns of a raw TPM file: transcript identifier and value.
pub const TPM_FILE_COLUMNS: usize = 2;

/// Compiles the shell-style file name pattern of a validation run.
///
/// `*` matches any run of characters, `?` exactly one character, and `[...]` a character class
/// (`[!...]` negates it).
///
/// ```rust
/// use spliceprep::validate::{file_pattern, matches_file_name};
/// let pat = file_pattern("*.tpm")?;
/// assert!(matches_file_name(&pat, "A_0h.tpm"));
/// assert!(!matches_file_name(&pat, "A_0h.tpm.gz"));
/// assert!(!matches_file_name(&pat, ".hidden.tpm"));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn file_pattern(pattern: &str) -> anyhow::Result<Pattern> {
    Pattern::new(pattern).with_context(|| format!("Invalid file pattern {:?}", pattern))
}

/// Matches a file name against `pattern`. Names starting with `.` only match a pattern that
/// starts with a literal `.`.
pub fn matches_file_name(pattern: &Pattern, name: &str) -> bool {
    let opts = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    pattern.matches_with(name, opts)
}

/// The outcome of validating one TPM file.
///
/// # Variants
///
/// * `Pass` - two columns and every value numeric.
/// * `WrongColumnCount` - the file does not have exactly two columns.
/// * `NonNumeric` - the 1-based data rows and raw text of every value that is not a number.
///   `NaN` and empty values are non-numeric.
/// * `Unreadable` - the file could not be read or parsed as a table.
#[derive(Clone, Debug, PartialEq)]
pub enum FileStatus {
    Pass,
    WrongColumnCount(usize),
    NonNumeric(Vec<(usize, String)>),
    Unreadable(String),
}

/// The validation report of one TPM file.
#[derive(Clone, Debug, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
    pub n_rows: usize,
    /// The smallest and largest numeric value, if any.
    pub range: Option<(f64, f64)>,
    pub n_negative: usize,
}

impl FileReport {
    pub fn passed(&self) -> bool {
        self.status == FileStatus::Pass
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analyzing {} ...", self.file_name())?;
        match &self.status {
            FileStatus::Pass => writeln!(
                f,
                "OK: all expression values are numeric in {}.",
                self.path.display()
            )?,
            FileStatus::WrongColumnCount(n) => {
                return writeln!(
                    f,
                    "WARNING: {} has {} columns (expected {}).",
                    self.path.display(),
                    n,
                    TPM_FILE_COLUMNS
                )
            }
            FileStatus::NonNumeric(rows) => {
                writeln!(f, "Non-numeric values found in {}:", self.path.display())?;
                for (row, value) in rows {
                    writeln!(f, "  row {}: {:?}", row, value)?;
                }
            }
            FileStatus::Unreadable(e) => {
                return writeln!(f, "Error processing {}: {}", self.path.display(), e)
            }
        }
        writeln!(f, "Rows: {}", self.n_rows)?;
        if let Some((min, max)) = self.range {
            writeln!(f, "Expression range: {} - {}", min, max)?;
        }
        if self.n_negative > 0 {
            writeln!(f, "WARNING: {} negative value(s).", self.n_negative)?;
        }
        Ok(())
    }
}

/// Checks one raw TPM file: no header, two tab-separated columns, numeric values.
///
/// Never fails; any problem, including an unreadable file, is described by the returned
/// report.
pub fn check_file<T: AsRef<Path>>(file_path: T) -> FileReport {
    let path = file_path.as_ref().to_path_buf();
    let mut report = FileReport {
        path,
        status: FileStatus::Pass,
        n_rows: 0,
        range: None,
        n_negative: 0,
    };

    let table = match TsvTable::from_path(&report.path, HeaderMode::None) {
        Ok(t) => t,
        Err(e) => {
            report.status = FileStatus::Unreadable(format!("{:#}", e));
            return report;
        }
    };
    report.n_rows = table.height();
    if table.width() != TPM_FILE_COLUMNS {
        report.status = FileStatus::WrongColumnCount(table.width());
        return report;
    }

    let mut bad = Vec::new();
    for (i, raw) in table.columns[1].iter().enumerate() {
        match raw.trim().parse::<f64>() {
            Ok(v) if !v.is_nan() => {
                report.range = Some(match report.range {
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                    None => (v, v),
                });
                if v < 0.0 {
                    report.n_negative += 1;
                }
            }
            _ => bad.push((i + 1, raw.clone())),
        }
    }
    if !bad.is_empty() {
        report.status = FileStatus::NonNumeric(bad);
    }
    debug!("Checked {}: {:?}", report.path.display(), report.status);
    report
}

/// Validates every file of `dir` whose name matches the pattern of `opts`, in sorted order.
///
/// Files are checked independently: a malformed or unreadable file only affects its own report.
/// Subdirectories are not searched.
///
/// ### Returns
///
/// * [Ok]`(Vec<FileReport>)`: One report per matched file.
/// * [Err]`(...)`: If the pattern is invalid, `dir` cannot be listed, or no file matches.
pub fn validate_dir<T: AsRef<Path>>(
    dir: T,
    opts: &ValidateOptions,
) -> anyhow::Result<Vec<FileReport>> {
    let dir = dir.as_ref();
    let pattern = file_pattern(&opts.pattern)?;

    let mut files = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Could not list the directory {}", dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if matches_file_name(&pattern, &entry.file_name().to_string_lossy()) {
            files.push(entry.path());
        }
    }
    if files.is_empty() {
        bail!(
            "No files found in {} matching pattern: {}",
            dir.display(),
            opts.pattern
        )
    }
    files.sort();
    info!("Validating {} file(s) in {}", files.len(), dir.display());

    let reports = files.iter().map(check_file).collect::<Vec<_>>();
    let n_failed = reports.iter().filter(|r| !r.passed()).count();
    if n_failed > 0 {
        warn!("{} of {} file(s) failed validation.", n_failed, reports.len())
    }
    Ok(reports)
}
