//! Request validation, feature assembly and response shaping for `/predict`.
//!
//! A raw JSON object goes through [`ValidatedRequest::parse`] exactly once.
//! Everything downstream works on typed values.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::classifier::Classification;
use crate::errors::{RiskError, RiskResult};
use crate::medication_encoder::MedicationEncoder;

/// Fields every prediction request must carry, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 5] = ["gender", "age", "medication", "dose", "duration"];

pub const MIN_AGE: i64 = 0;
pub const MAX_AGE: i64 = 120;

pub const HIGH_RISK_THRESHOLD: f64 = 0.7;
pub const MODERATE_RISK_THRESHOLD: f64 = 0.3;

/// Return the first required field absent from `payload`.
pub fn check_required_fields(payload: &Map<String, Value>) -> RiskResult<()> {
    match REQUIRED_FIELDS
        .iter()
        .find(|field| !payload.contains_key(**field))
    {
        Some(field) => Err(RiskError::missing_field(*field)),
        None => Ok(()),
    }
}

/// Interpret a request body as a JSON object.
pub fn parse_object(body: &[u8]) -> RiskResult<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RiskError::invalid_format(
            "body",
            "must be a JSON object",
        )),
        Err(_) => Err(RiskError::invalid_format("body", "must be valid JSON")),
    }
}

/// Binary gender code used by the model: male is 0, anything else 1.
pub fn encode_gender(gender: &str) -> u8 {
    match gender.to_lowercase().as_str() {
        "male" | "m" => 0,
        _ => 1,
    }
}

fn parse_gender(value: &Value) -> RiskResult<(String, u8)> {
    let raw = value
        .as_str()
        .ok_or_else(|| RiskError::invalid_format("gender", "must be a string"))?;
    if raw.is_empty() {
        return Err(RiskError::invalid_format("gender", "must not be empty"));
    }
    Ok((raw.to_string(), encode_gender(raw)))
}

/// Accept integers, floats (truncated toward zero) and integer strings.
fn parse_integer(field: &str, value: &Value) -> RiskResult<i64> {
    let invalid = || RiskError::invalid_format(field, "must be an integer");
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(f.trunc() as i64),
                _ => Err(invalid()),
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn parse_medication(value: &Value) -> RiskResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RiskError::invalid_format("medication", "must be a string"))
}

/// The fixed-order numeric input of the classifier:
/// `[gender, age, medication, dose, duration]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureVector {
    pub gender_code: u8,
    pub age: i64,
    pub medication_code: i64,
    pub dose: i64,
    pub duration: i64,
}

impl FeatureVector {
    pub const LEN: usize = 5;

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [
            f64::from(self.gender_code),
            self.age as f64,
            self.medication_code as f64,
            self.dose as f64,
            self.duration as f64,
        ]
    }

    pub fn to_f32_array(&self) -> [f32; Self::LEN] {
        self.to_array().map(|v| v as f32)
    }
}

/// A request that passed every check, ready for the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub gender: String,
    pub age: i64,
    pub medication: String,
    pub dose: i64,
    pub duration: i64,
    pub features: FeatureVector,
}

impl ValidatedRequest {
    /// Validate a raw request object against the medication table.
    ///
    /// Checks run in a fixed order: presence, formats, ranges, then
    /// medication membership. The first failure is returned.
    pub fn parse(payload: &Map<String, Value>, encoder: &MedicationEncoder) -> RiskResult<Self> {
        check_required_fields(payload)?;

        let (gender, gender_code) = parse_gender(&payload["gender"])?;
        let age = parse_integer("age", &payload["age"])?;
        let medication = parse_medication(&payload["medication"])?;
        let dose = parse_integer("dose", &payload["dose"])?;
        let duration = parse_integer("duration", &payload["duration"])?;

        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            return Err(RiskError::out_of_range(
                "age",
                format!("Age must be between {MIN_AGE} and {MAX_AGE}"),
            ));
        }
        if dose <= 0 {
            return Err(RiskError::out_of_range("dose", "Dose must be positive"));
        }
        if duration <= 0 {
            return Err(RiskError::out_of_range("duration", "Duration must be positive"));
        }

        let medication_code = encoder.code(&medication).ok_or_else(|| {
            RiskError::unknown_medication(medication.clone(), encoder.names().to_vec())
        })?;

        Ok(Self {
            features: FeatureVector {
                gender_code,
                age,
                medication_code,
                dose,
                duration,
            },
            gender,
            age,
            medication,
            dose,
            duration,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLabel {
    #[serde(rename = "HIGH RISK")]
    HighRisk,
    #[serde(rename = "LOW RISK")]
    LowRisk,
}

impl RiskLabel {
    pub fn from_decision(decision: u8) -> Self {
        if decision == 1 {
            RiskLabel::HighRisk
        } else {
            RiskLabel::LowRisk
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::HighRisk => "HIGH RISK",
            RiskLabel::LowRisk => "LOW RISK",
        }
    }
}

/// Free-text guidance for a given positive-class probability.
pub fn recommendation(probability: f64, medication: &str) -> String {
    match probability {
        p if p >= HIGH_RISK_THRESHOLD => format!(
            "High risk detected. Consider alternative to {medication} or reduce dosage. Monitor closely."
        ),
        p if p >= MODERATE_RISK_THRESHOLD => {
            format!("Moderate risk. Monitor patient closely while on {medication}.")
        }
        _ => format!("Low risk. {medication} appears safe for this patient profile."),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub risk_probability: f64,
    pub risk_label: RiskLabel,
    pub risk_score: u8,
    pub confidence: f64,
    pub recommendation: String,
}

impl PredictionResult {
    pub fn new(classification: Classification, medication: &str) -> Self {
        let p = classification.probability;
        Self {
            risk_probability: p,
            risk_label: RiskLabel::from_decision(classification.decision),
            risk_score: classification.decision,
            confidence: p.max(1.0 - p),
            recommendation: recommendation(p, medication),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PatientInfo {
    pub gender: String,
    pub age: i64,
    pub medication: String,
    pub dose: i64,
    pub duration: i64,
}

#[derive(Debug, Serialize)]
pub struct PredictionSummary {
    pub risk_probability: f64,
    pub risk_label: RiskLabel,
    pub risk_score: u8,
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct Interpretation {
    pub message: String,
    pub recommendation: String,
}

/// Body of a successful `/predict` response.
#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub patient_info: PatientInfo,
    pub prediction: PredictionSummary,
    pub interpretation: Interpretation,
}

impl PredictionResponse {
    pub fn new(request: ValidatedRequest, result: PredictionResult) -> Self {
        let message = format!(
            "The patient has a {} of adverse drug reactions.",
            result.risk_label.as_str().to_lowercase()
        );
        Self {
            patient_info: PatientInfo {
                gender: request.gender,
                age: request.age,
                medication: request.medication,
                dose: request.dose,
                duration: request.duration,
            },
            prediction: PredictionSummary {
                risk_probability: round4(result.risk_probability),
                risk_label: result.risk_label,
                risk_score: result.risk_score,
                confidence: round4(result.confidence),
            },
            interpretation: Interpretation {
                message,
                recommendation: result.recommendation,
            },
        }
    }
}
