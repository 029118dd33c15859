//! Training and Analysis Integration Tests
//!
//! Trains on a synthetic three-class dataset, saves the artifact pair, and
//! analyses sample files against it.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use enose_lab::acquisition::{StatusLevel, StatusSink};
use enose_lab::classifier::{AnalysisRequest, DecisionPolicy};
use enose_lab::training::{train, TrainingError, TrainingOptions};
use enose_lab::{analyze_file, AnalysisError, VerdictKind};

const CENTRES: [(&str, [f64; 4]); 3] = [
    ("Etanol", [0.20, 0.70, 0.40, 0.90]),
    ("Isopropanol", [0.80, 0.30, 0.60, 0.20]),
    ("Metanol", [0.50, 0.50, 0.90, 0.50]),
];

fn jitter(i: usize, channel: usize) -> f64 {
    ((i * 7 + channel * 3) as f64 * 0.37).sin() * 0.02
}

fn write_dataset(path: &Path) {
    let mut text = String::from("MQ3,MQ5,MQ6,MQ8,Tipo_álcool\n");
    for (label, centre) in CENTRES {
        for i in 0..10 {
            let row: Vec<String> = centre
                .iter()
                .enumerate()
                .map(|(c, v)| format!("{:.4}", v + jitter(i, c)))
                .collect();
            writeln!(text, "{},{label}", row.join(",")).unwrap();
        }
    }
    std::fs::write(path, text).unwrap();
}

struct Lab {
    _dir: tempfile::TempDir,
    root: PathBuf,
    options: TrainingOptions,
}

impl Lab {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let dataset_path = root.join("dataset.csv");
        write_dataset(&dataset_path);
        let options = TrainingOptions {
            dataset_path,
            model_path: root.join("models/modelo.json"),
            scaler_path: root.join("models/scaler.json"),
            label_columns: vec!["Tipo_álcool".to_string(), "alcool".to_string()],
            test_fraction: 0.2,
            seed: 42,
            var_smoothing: 1e-9,
        };
        Self {
            _dir: dir,
            root,
            options,
        }
    }

    fn sample(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn request(&self, sample: PathBuf) -> AnalysisRequest {
        AnalysisRequest {
            sample_path: sample,
            model_path: self.options.model_path.clone(),
            scaler_path: self.options.scaler_path.clone(),
            dataset_path: Some(self.options.dataset_path.clone()),
            label_columns: self.options.label_columns.clone(),
            policy: DecisionPolicy::default(),
        }
    }
}

// ============================================================================
// Training
// ============================================================================

#[test]
fn training_separates_classes_and_saves_artifacts() {
    let lab = Lab::new();
    let report = train(&lab.options).unwrap();

    assert_eq!(report.label_column, "Tipo_álcool");
    assert_eq!(report.classes, vec!["Etanol", "Isopropanol", "Metanol"]);
    assert_eq!(report.train_rows + report.test_rows, 30);
    assert_eq!(report.test_rows, 6);
    assert!((report.evaluation.accuracy - 1.0).abs() < 1e-12);
    assert!(lab.options.model_path.exists());
    assert!(lab.options.scaler_path.exists());
}

#[test]
fn training_is_reproducible_for_a_seed() {
    let lab = Lab::new();
    train(&lab.options).unwrap();
    let first = std::fs::read_to_string(&lab.options.scaler_path).unwrap();
    train(&lab.options).unwrap();
    let second = std::fs::read_to_string(&lab.options.scaler_path).unwrap();

    // Only the creation timestamp may differ
    let strip = |s: &str| {
        s.lines()
            .filter(|l| !l.contains("created_at"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    assert_eq!(strip(&first), strip(&second));
}

#[test]
fn training_without_label_column_fails() {
    let lab = Lab::new();
    let mut options = lab.options.clone();
    options.label_columns = vec!["substance".to_string()];
    let err = train(&options).unwrap_err();
    assert!(matches!(err, TrainingError::Dataset(_)), "{err:?}");
    assert!(!options.model_path.exists());
}

// ============================================================================
// Analysis
// ============================================================================

#[test]
fn analysis_recognises_a_trained_class() {
    let lab = Lab::new();
    train(&lab.options).unwrap();
    let sample = lab.sample(
        "desconhecida.csv",
        "MQ3,MQ5,MQ6,MQ8\n0.201,0.702,0.399,0.895\n0.195,0.69,0.41,0.905\n",
    );

    let (status, mut events) = StatusSink::channel();
    let report = analyze_file(&lab.request(sample), &status).unwrap();

    assert_eq!(report.verdict.kind, VerdictKind::Known);
    assert_eq!(report.verdict.displayed_label, "Etanol");
    assert!(report.verdict.confidence_percent > 99.0);
    assert!(!report.positional_columns);
    assert_eq!(report.rows, 2);
    assert_eq!(report.model_kind, "gaussian_nb");

    let profiles = report.profiles.unwrap();
    assert_eq!(profiles.channels, vec!["MQ3", "MQ5", "MQ6", "MQ8"]);
    assert_eq!(profiles.classes.len(), 3);

    let events = events.drain();
    assert!(events.iter().all(|e| e.level != StatusLevel::Error));
    assert!(events.iter().any(|e| e.message.starts_with("Result: Etanol")));
}

#[test]
fn reordered_columns_with_extras_are_matched_by_name() {
    let lab = Lab::new();
    train(&lab.options).unwrap();
    let sample = lab.sample(
        "reordered.csv",
        "time,MQ8,MQ6,MQ5,MQ3\n0,0.20,0.60,0.30,0.80\n1,0.21,0.61,0.29,0.79\n",
    );

    let report = analyze_file(&lab.request(sample), &StatusSink::disabled()).unwrap();
    assert_eq!(report.verdict.displayed_label, "Isopropanol");
    assert!(!report.positional_columns);
}

#[test]
fn unnamed_columns_are_read_positionally_with_warning() {
    let lab = Lab::new();
    train(&lab.options).unwrap();
    let sample = lab.sample("positional.csv", "a,b,c,d\n0.50,0.50,0.90,0.50\n");

    let (status, mut events) = StatusSink::channel();
    let report = analyze_file(&lab.request(sample), &status).unwrap();

    assert!(report.positional_columns);
    assert_eq!(report.verdict.displayed_label, "Metanol");
    assert!(events
        .drain()
        .iter()
        .any(|e| e.level == StatusLevel::Warning && e.message.contains("positionally")));
}

#[test]
fn missing_dataset_only_drops_class_profiles() {
    let lab = Lab::new();
    train(&lab.options).unwrap();
    let sample = lab.sample("s.csv", "MQ3,MQ5,MQ6,MQ8\n0.2,0.7,0.4,0.9\n");
    let mut request = lab.request(sample);
    request.dataset_path = Some(lab.root.join("gone.csv"));

    let (status, mut events) = StatusSink::channel();
    let report = analyze_file(&request, &status).unwrap();

    assert_eq!(report.verdict.displayed_label, "Etanol");
    assert!(report.profiles.unwrap().classes.is_empty());
    assert!(events
        .drain()
        .iter()
        .any(|e| e.level == StatusLevel::Warning && e.message.contains("Class profiles")));
}

#[test]
fn missing_model_is_reported() {
    let lab = Lab::new();
    let sample = lab.sample("s.csv", "MQ3,MQ5,MQ6,MQ8\n0.2,0.7,0.4,0.9\n");

    let (status, mut events) = StatusSink::channel();
    let err = analyze_file(&lab.request(sample), &status).unwrap_err();

    match err {
        AnalysisError::ArtifactNotFound(path) => assert_eq!(path, lab.options.model_path),
        other => panic!("expected ArtifactNotFound, got {other:?}"),
    }
    assert!(events.drain().iter().any(|e| e.level == StatusLevel::Error));
}

#[test]
fn corrupt_model_is_unreadable() {
    let lab = Lab::new();
    train(&lab.options).unwrap();
    std::fs::write(&lab.options.model_path, "not json").unwrap();
    let sample = lab.sample("s.csv", "MQ3,MQ5,MQ6,MQ8\n0.2,0.7,0.4,0.9\n");

    let err = analyze_file(&lab.request(sample), &StatusSink::disabled()).unwrap_err();
    assert!(matches!(err, AnalysisError::ArtifactUnreadable { .. }), "{err:?}");
}

#[test]
fn three_column_sample_is_a_schema_mismatch() {
    let lab = Lab::new();
    train(&lab.options).unwrap();
    let sample = lab.sample("narrow.csv", "MQ3,MQ5,MQ6\n0.2,0.7,0.4\n");

    let err = analyze_file(&lab.request(sample), &StatusSink::disabled()).unwrap_err();
    match err {
        AnalysisError::SchemaMismatch { found, .. } => assert_eq!(found, vec!["MQ3", "MQ5", "MQ6"]),
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

#[test]
fn header_only_sample_has_no_rows() {
    let lab = Lab::new();
    train(&lab.options).unwrap();
    let sample = lab.sample("empty.csv", "MQ3,MQ5,MQ6,MQ8\n");

    let err = analyze_file(&lab.request(sample), &StatusSink::disabled()).unwrap_err();
    assert!(matches!(err, AnalysisError::NoSamples(_)), "{err:?}");
}
