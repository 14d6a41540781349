use serde::{de::Error as _, Deserialize, Deserializer};

use crate::taxonomy::{Code, DEFAULT_CATEGORY_ID, DEFAULT_SPECIALTY_ID};

/// Confidence assumed when a direct match omits it.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;
/// Base code assumed when a placement omits it.
pub const DEFAULT_BASE_CODE: Code = 9100;

/// Oracle answer to a direct or file classification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodeProposal {
    #[serde(deserialize_with = "lenient_code")]
    pub code: Code,
    #[serde(default = "default_confidence", deserialize_with = "lenient_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Oracle answer placing an unknown specialization into the hierarchy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlacementProposal {
    #[serde(default = "default_category_id", deserialize_with = "lenient_id")]
    pub category_id: String,
    #[serde(default, deserialize_with = "lenient_name")]
    pub category_name: Option<String>,
    #[serde(default = "default_specialty_id", deserialize_with = "lenient_id")]
    pub specialty_id: String,
    #[serde(default, deserialize_with = "lenient_name")]
    pub specialty_name: Option<String>,
    #[serde(default = "default_base_code", deserialize_with = "lenient_code")]
    pub base_code: Code,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Oracle answer listing related diagnostic/support codes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessProposal {
    #[serde(default, deserialize_with = "lenient_codes")]
    pub codes: Vec<Code>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Why the oracle produced no usable proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleFailure {
    /// The model call itself failed (network, status, empty body).
    Transport(String),
    /// The model answered but no JSON object could be recovered.
    Unparseable { raw: String, reason: String },
}

impl std::fmt::Display for OracleFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "oracle call failed: {err}"),
            Self::Unparseable { reason, .. } => write!(f, "oracle reply unparseable: {reason}"),
        }
    }
}

/// Structured result of one oracle call.
#[derive(Debug, Clone, PartialEq)]
pub enum RawProposal {
    Code(CodeProposal),
    Placement(PlacementProposal),
    Access(AccessProposal),
    Failed(OracleFailure),
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

fn default_category_id() -> String {
    DEFAULT_CATEGORY_ID.to_string()
}

fn default_specialty_id() -> String {
    DEFAULT_SPECIALTY_ID.to_string()
}

fn default_base_code() -> Code {
    DEFAULT_BASE_CODE
}

/// Models routinely quote numbers or emit `1200.0`; accept all of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Loose {
    fn as_code(&self) -> Option<Code> {
        match self {
            Self::Int(n) => Code::try_from(*n).ok(),
            Self::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(Code::MAX) => {
                Some(*f as Code)
            }
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().trim_end_matches('%').parse().ok(),
        }
    }
}

fn lenient_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Code, D::Error> {
    let value = Loose::deserialize(deserializer)?;
    value
        .as_code()
        .ok_or_else(|| D::Error::custom("code must be a non-negative integer"))
}

fn lenient_codes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Code>, D::Error> {
    let values = Option::<Vec<Loose>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values.iter().filter_map(Loose::as_code).collect())
}

fn lenient_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<Loose>::deserialize(deserializer)?;
    let confidence = value
        .and_then(|v| v.as_f64())
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE);
    Ok(confidence.clamp(0.0, 1.0))
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Loose::deserialize(deserializer)?;
    let id = match value {
        Loose::Int(n) => n.to_string(),
        Loose::Float(f) if f.fract() == 0.0 => format!("{f:.0}"),
        Loose::Float(f) => f.to_string(),
        Loose::Text(s) => s.trim().to_string(),
    };
    if id.is_empty() {
        return Err(D::Error::custom("identifier must not be blank"));
    }
    Ok(id)
}

fn lenient_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}
