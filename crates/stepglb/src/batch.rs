//! Directory batch conversion.
//!
//! Every STEP file in a directory is converted independently; a failure is
//! recorded for that file and the batch moves on.

use std::fs;
use std::path::{Path, PathBuf};

use stepglb_kernel::CadKernel;

use crate::config::ConvertConfig;
use crate::error::ConvertError;
use crate::pipeline::{convert_file, ConversionSummary};

/// File extensions picked up by [`discover_step_files`], compared
/// case-insensitively.
pub const STEP_EXTENSIONS: [&str; 2] = ["stp", "step"];

/// Result of converting one file.
#[derive(Debug)]
pub struct FileOutcome {
    /// STEP input.
    pub input: PathBuf,
    /// GLB output (written only on success).
    pub output: PathBuf,
    /// Conversion result.
    pub result: Result<ConversionSummary, ConvertError>,
}

/// Per-file results of a batch, in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per discovered file.
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    /// Number of files converted.
    pub fn converted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of files that failed.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.converted()
    }

    /// Whether no STEP file was found.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Progress notifications emitted by [`run_batch_with`].
#[derive(Debug)]
pub enum BatchEvent<'a> {
    /// A file is about to be converted.
    Started {
        /// STEP input.
        input: &'a Path,
        /// GLB output.
        output: &'a Path,
    },
    /// A file is done, successfully or not.
    Finished(&'a FileOutcome),
}

/// Whether `path` has a STEP extension.
pub fn is_step_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| STEP_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
}

/// Regular files in `dir` with a STEP extension, sorted by path.
pub fn discover_step_files(dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_step_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// `input` with its extension replaced by `.glb`.
pub fn output_path_for(input: &Path) -> PathBuf {
    input.with_extension("glb")
}

/// Convert every STEP file in `dir`.
pub fn run_batch<K: CadKernel>(
    kernel: &K,
    dir: &Path,
    config: &ConvertConfig,
) -> Result<BatchReport, ConvertError> {
    run_batch_with(kernel, dir, config, |_| {})
}

/// Convert every STEP file in `dir`, reporting progress to `progress`.
///
/// Only a failure to list `dir` is returned as an error.
pub fn run_batch_with<K: CadKernel>(
    kernel: &K,
    dir: &Path,
    config: &ConvertConfig,
    mut progress: impl FnMut(BatchEvent<'_>),
) -> Result<BatchReport, ConvertError> {
    let files = discover_step_files(dir)?;
    tracing::debug!(files = files.len(), "scanning {}", dir.display());

    let mut report = BatchReport::default();
    for input in files {
        let output = output_path_for(&input);
        progress(BatchEvent::Started {
            input: &input,
            output: &output,
        });

        let result = convert_file(kernel, &input, &output, config);
        if let Err(err) = &result {
            tracing::warn!("{}: {err}", input.display());
        }
        report.outcomes.push(FileOutcome {
            input,
            output,
            result,
        });
        if let Some(outcome) = report.outcomes.last() {
            progress(BatchEvent::Finished(outcome));
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_extensions() {
        assert!(is_step_file(Path::new("a.stp")));
        assert!(is_step_file(Path::new("dir/A.STEP")));
        assert!(is_step_file(Path::new("b.Step")));
        assert!(!is_step_file(Path::new("c.stl")));
        assert!(!is_step_file(Path::new("step")));
        assert!(!is_step_file(Path::new("d.step.glb")));
    }

    #[test]
    fn test_output_path() {
        assert_eq!(output_path_for(Path::new("/x/part.STEP")), PathBuf::from("/x/part.glb"));
        assert_eq!(output_path_for(Path::new("a.b.stp")), PathBuf::from("a.b.glb"));
    }

    #[test]
    fn test_discover_sorted_files_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.step", "a.STP", "notes.txt", "c.glb"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("sub.step")).unwrap();

        let files = discover_step_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.STP", "b.step"]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = discover_step_files(&dir.path().join("nope"));
        assert!(matches!(result, Err(ConvertError::Io(_))));
    }
}
