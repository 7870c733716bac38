//! Native inference for the valuation, health and growth classifiers.
//!
//! Each model is exported as JSON (transformer, label encoder, estimator and
//! an optional background sample) and evaluated in-process. Models are
//! loaded once and shared read-only; see [`ModelHandle`] for reloads.

mod artifact;
mod boosted;
mod error;
mod estimator;
mod forest;
mod label;
mod registry;
mod svm;
mod transform;
mod tree;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use artifact::{Inference, ModelArtifact, ModelFamily, ModelManifest, FALLBACK_CONFIDENCE};
pub use boosted::GradientBoostedTrees;
pub use error::{MLError, MLResult};
pub use estimator::{Estimator, TreeTerm};
pub use forest::RandomForest;
pub use label::LabelDecoder;
pub use registry::{model_dir, ModelHandle, ModelRegistry, ModelStatus};
pub use svm::{Kernel, SupportVectorClassifier};
pub use transform::FeatureTransformer;
pub use tree::DecisionTree;
