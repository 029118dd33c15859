//! Classification decision engine
//!
//! Turns the feature rows of an unknown sample into a labelled verdict:
//! scale with the fitted [`MinMaxScaler`], average per-row probabilities of
//! a [`TrainedModel`], then apply the confidence / margin policy.

mod analysis;
mod artifacts;
mod decision;
mod error;
mod model;
mod profile;
mod scaler;

pub use analysis::{analyze_file, AnalysisReport, AnalysisRequest};
pub use artifacts::{save_json_atomic, ModelArtifact, ModelKind, ScalerArtifact, ARTIFACT_VERSION};
pub use decision::{average_probabilities, classify, decide, DecisionPolicy};
pub use error::AnalysisError;
pub use model::{FitError, GaussianNb, TrainedModel};
pub use profile::SensorProfiles;
pub use scaler::MinMaxScaler;
