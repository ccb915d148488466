//! Directory prediction: every `.wav` in a folder, one report.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::emotion::{PredictionResult, Predictor};

/// Outcome for one file of a batch
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Ok(PredictionResult),
    Error { file: PathBuf, error: String },
}

impl FileOutcome {
    pub fn file(&self) -> &Path {
        match self {
            FileOutcome::Ok(result) => &result.file,
            FileOutcome::Error { file, .. } => file,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, FileOutcome::Ok(_))
    }
}

/// Count and share of one predicted label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelCount {
    pub count: usize,
    pub percent: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub directory: PathBuf,
    pub outcomes: Vec<FileOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    /// Predicted label -> count over successful files
    pub histogram: BTreeMap<String, LabelCount>,
}

impl BatchReport {
    pub fn from_outcomes(directory: PathBuf, outcomes: Vec<FileOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        let failed = outcomes.len() - succeeded;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for outcome in &outcomes {
            if let FileOutcome::Ok(result) = outcome {
                *counts.entry(result.pred_label.clone()).or_default() += 1;
            }
        }
        let histogram = counts
            .into_iter()
            .map(|(label, count)| {
                let percent = 100.0 * count as f32 / succeeded.max(1) as f32;
                (label, LabelCount { count, percent })
            })
            .collect();

        Self {
            directory,
            outcomes,
            succeeded,
            failed,
            histogram,
        }
    }

    pub fn results(&self) -> impl Iterator<Item = &PredictionResult> {
        self.outcomes.iter().filter_map(|o| match o {
            FileOutcome::Ok(result) => Some(result),
            FileOutcome::Error { .. } => None,
        })
    }

    /// Whether the batch counts as a success for the exit status
    pub fn is_success(&self, strict: bool) -> bool {
        self.succeeded > 0 && !(strict && self.failed > 0)
    }
}

/// `.wav` files directly inside `dir` (case-insensitive), sorted by name
pub fn collect_wav_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_wav(path))
        .collect();
    files.sort();
    Ok(files)
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

/// Predict every file; failures are recorded and the batch moves on
pub fn predict_files(predictor: &Predictor, directory: PathBuf, files: &[PathBuf]) -> BatchReport {
    let outcomes = files
        .iter()
        .map(|file| match predictor.predict(file) {
            Ok(result) => {
                info!(
                    "{:?}: {} ({:.1}%)",
                    file.file_name().unwrap_or(file.as_os_str()),
                    result.pred_label,
                    result.confidence * 100.0
                );
                FileOutcome::Ok(result)
            }
            Err(e) => {
                warn!("Skipping {:?}: {}", file, e);
                FileOutcome::Error {
                    file: file.clone(),
                    error: e.to_string(),
                }
            }
        })
        .collect();

    BatchReport::from_outcomes(directory, outcomes)
}

/// Predict every `.wav` file in `dir`
pub fn predict_directory(predictor: &Predictor, dir: &Path) -> std::io::Result<BatchReport> {
    let files = collect_wav_files(dir)?;
    info!("Found {} WAV files in {:?}", files.len(), dir);
    Ok(predict_files(predictor, dir.to_path_buf(), &files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ok(file: &str, label_index: usize) -> FileOutcome {
        let mut probs = vec![0.0; 8];
        probs[label_index] = 1.0;
        FileOutcome::Ok(PredictionResult::from_probs(PathBuf::from(file), probs).unwrap())
    }

    fn failed(file: &str) -> FileOutcome {
        FileOutcome::Error {
            file: PathBuf::from(file),
            error: "decode".to_string(),
        }
    }

    #[test]
    fn test_collect_is_sorted_case_insensitive_and_flat() {
        let dir = tempdir().unwrap();
        for name in ["b.wav", "A.WAV", "c.mp3", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.wav")).unwrap();
        std::fs::write(dir.path().join("nested.wav").join("d.wav"), b"").unwrap();

        let files = collect_wav_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A.WAV", "b.wav"]);
    }

    #[test]
    fn test_histogram_and_counts() {
        let report = BatchReport::from_outcomes(
            PathBuf::from("d"),
            vec![ok("1.wav", 2), ok("2.wav", 2), ok("3.wav", 3), failed("4.wav")],
        );
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.histogram["happy"].count, 2);
        assert!((report.histogram["sad"].percent - 33.333).abs() < 0.01);
        assert_eq!(report.results().count(), 3);
    }

    #[test]
    fn test_exit_policy() {
        let mixed = BatchReport::from_outcomes(PathBuf::new(), vec![ok("a", 0), failed("b")]);
        assert!(mixed.is_success(false));
        assert!(!mixed.is_success(true));

        let none = BatchReport::from_outcomes(PathBuf::new(), vec![failed("a")]);
        assert!(!none.is_success(false));

        let empty = BatchReport::from_outcomes(PathBuf::new(), vec![]);
        assert!(!empty.is_success(false));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(failed("x.wav")).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["file"], "x.wav");

        let json = serde_json::to_value(ok("y.wav", 1)).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["pred_label"], "calm");
    }
}
