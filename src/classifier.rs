//! Binary risk classifiers and model loading.
//!
//! The service only needs two things from a model: the probability of the
//! positive (adverse reaction) class and the hard 0/1 decision. Two
//! artifact formats are supported, picked by file extension:
//!
//! * `.onnx` – an exported classifier run through `tract-onnx`
//! * `.json` – logistic regression weights (`bias`, `weights`, `threshold`)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;

use crate::errors::{RiskError, RiskResult};
use crate::prediction::FeatureVector;

/// Output of one classifier call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub probability: f64,
    pub decision: u8,
}

impl Classification {
    /// Reject outputs no well-formed binary classifier can produce.
    pub fn checked(probability: f64, decision: u8) -> RiskResult<Self> {
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(RiskError::inference(format!(
                "probability {probability} outside [0, 1]"
            )));
        }
        if decision > 1 {
            return Err(RiskError::inference(format!(
                "class decision {decision} is not 0 or 1"
            )));
        }
        Ok(Self {
            probability,
            decision,
        })
    }
}

pub trait Classifier: Send + Sync {
    /// Short identifier shown in logs.
    fn name(&self) -> &str;

    /// Probability of the positive class.
    fn predict_proba(&self, features: &FeatureVector) -> RiskResult<f64>;

    /// Hard class decision, 0 or 1.
    fn predict(&self, features: &FeatureVector) -> RiskResult<u8>;

    /// Both outputs for one request.
    fn classify(&self, features: &FeatureVector) -> RiskResult<Classification> {
        let probability = self.predict_proba(features)?;
        let decision = self.predict(features)?;
        Classification::checked(probability, decision)
    }
}

/// Logistic regression weights as stored in a `.json` model file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearWeights {
    pub bias: f64,
    pub weights: Vec<f64>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

/// Linear model with logistic scoring.
pub struct LinearClassifier {
    weights: LinearWeights,
}

impl LinearClassifier {
    pub fn new(weights: LinearWeights) -> RiskResult<Self> {
        if weights.weights.len() != FeatureVector::LEN {
            return Err(RiskError::config(format!(
                "linear model expects {} weights, got {}",
                FeatureVector::LEN,
                weights.weights.len()
            )));
        }
        if !(0.0..=1.0).contains(&weights.threshold) {
            return Err(RiskError::config(format!(
                "linear model threshold {} outside [0, 1]",
                weights.threshold
            )));
        }
        Ok(Self { weights })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> RiskResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RiskError::io(format!("reading model {}", path.display()), e))?;
        let weights: LinearWeights = serde_json::from_str(&content)
            .map_err(|e| RiskError::model_load(path.display().to_string(), e.to_string()))?;
        Self::new(weights)
    }

    fn score(&self, features: &FeatureVector) -> f64 {
        let linear = self.weights.bias
            + features
                .to_array()
                .iter()
                .zip(self.weights.weights.iter())
                .map(|(f, w)| f * w)
                .sum::<f64>();
        1.0 / (1.0 + (-linear).exp())
    }
}

impl Classifier for LinearClassifier {
    fn name(&self) -> &str {
        "linear"
    }

    fn predict_proba(&self, features: &FeatureVector) -> RiskResult<f64> {
        Ok(self.score(features))
    }

    fn predict(&self, features: &FeatureVector) -> RiskResult<u8> {
        Ok(u8::from(self.score(features) >= self.weights.threshold))
    }
}

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Exported classifier run through tract.
///
/// The first `i64` output is read as the class decision and the first `f32`
/// output as probabilities (`[1, 2]` uses column 1, a single value is used
/// as is). Without a decision output the label is `p >= 0.5`.
pub struct OnnxClassifier {
    plan: OnnxPlan,
}

impl OnnxClassifier {
    pub fn load<P: AsRef<Path>>(path: P) -> TractResult<Self> {
        let plan = tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, FeatureVector::LEN)),
            )?
            .into_optimized()?
            .into_runnable()?;
        Ok(Self { plan })
    }

    fn run(&self, features: &FeatureVector) -> TractResult<Classification> {
        let input = Tensor::from_shape(&[1, FeatureVector::LEN], &features.to_f32_array())?;
        let outputs = self.plan.run(tvec!(input.into()))?;
        read_outputs(&outputs)
    }
}

/// Pick the decision and probability out of a classifier graph's outputs.
fn read_outputs(outputs: &[TValue]) -> TractResult<Classification> {
    let mut probability = None;
    let mut decision = None;
    for output in outputs {
        match output.datum_type() {
            DatumType::I64 if decision.is_none() => {
                decision = output.as_slice::<i64>()?.first().copied();
            }
            DatumType::F32 if probability.is_none() => {
                let values = output.as_slice::<f32>()?;
                probability = match values.len() {
                    1 => Some(f64::from(values[0])),
                    2 => Some(f64::from(values[1])),
                    n => anyhow::bail!("unexpected probability output with {n} values"),
                };
            }
            _ => {}
        }
    }

    let probability =
        probability.ok_or_else(|| anyhow::anyhow!("model produced no probability output"))?;
    let decision = match decision {
        Some(label @ 0..=1) => label as u8,
        Some(label) => anyhow::bail!("model produced class label {label}"),
        None => u8::from(probability >= 0.5),
    };
    Ok(Classification {
        probability,
        decision,
    })
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn predict_proba(&self, features: &FeatureVector) -> RiskResult<f64> {
        Ok(self.classify(features)?.probability)
    }

    fn predict(&self, features: &FeatureVector) -> RiskResult<u8> {
        Ok(self.classify(features)?.decision)
    }

    // One graph run yields both outputs.
    fn classify(&self, features: &FeatureVector) -> RiskResult<Classification> {
        let out = self
            .run(features)
            .map_err(|e| RiskError::inference(e.to_string()))?;
        Classification::checked(out.probability, out.decision)
    }
}

/// Which configured path supplied the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Primary,
    Fallback,
}

pub struct LoadedModel {
    pub classifier: Arc<dyn Classifier>,
    pub source: ModelSource,
    pub path: PathBuf,
}

/// Load one model file, choosing the backend from its extension.
pub fn load_classifier(path: &Path) -> RiskResult<Arc<dyn Classifier>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("onnx") => {
            let model = OnnxClassifier::load(path)
                .map_err(|e| RiskError::model_load(path.display().to_string(), e.to_string()))?;
            Ok(Arc::new(model))
        }
        Some("json") => Ok(Arc::new(LinearClassifier::from_file(path)?)),
        _ => Err(RiskError::model_load(
            path.display().to_string(),
            "unsupported model format (expected .onnx or .json)",
        )),
    }
}

/// Load the primary model if present, otherwise the fallback.
///
/// Returns `Ok(None)` when neither file exists. A file that exists but
/// fails to load is an error; the fallback is not tried in that case.
pub fn load_model(primary: &Path, fallback: &Path) -> RiskResult<Option<LoadedModel>> {
    let (path, source) = if primary.exists() {
        (primary, ModelSource::Primary)
    } else if fallback.exists() {
        (fallback, ModelSource::Fallback)
    } else {
        tracing::error!(
            "No model files found at {} or {}",
            primary.display(),
            fallback.display()
        );
        return Ok(None);
    };

    let classifier = load_classifier(path)?;
    tracing::info!(
        "{source:?} model loaded from {} ({})",
        path.display(),
        classifier.name()
    );
    Ok(Some(LoadedModel {
        classifier,
        source,
        path: path.to_path_buf(),
    }))
}
