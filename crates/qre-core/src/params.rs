use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QreError, QreResult};

/// A scalar parameter value. Payloads are JSON objects mapping camelCase
/// names to one of these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Bool(bool),
    String(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// ISO-8601 timestamp, with or without trailing `Z`; naive timestamps
    /// are interpreted as UTC.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        let s = self.as_str()?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d"))
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// A mapping from camelCase parameter names to scalar values.
pub type ParamPayload = BTreeMap<String, ParamValue>;

/// Declared type of a schema entry, used to validate a payload before a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    Bool,
    Categorical,
    Timestamp,
}

/// Optimizer-facing metadata for one parameter: its searchable range (for
/// int/float) or option list (for categorical), and whether it should be
/// sampled at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizeSpec {
    #[serde(default)]
    pub enabled: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    /// Restrict a categorical parameter to a subset of its option list.
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

/// One entry of a strategy's published parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub default: ParamValue,
    /// Full option list for categorical parameters.
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub optimize: OptimizeSpec,
}

/// A strategy's full parameter schema: name -> spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamSchema {
    pub specs: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn optimizable(&self) -> impl Iterator<Item = &ParamSpec> {
        self.specs.iter().filter(|s| s.optimize.enabled)
    }

    pub fn default_payload(&self) -> ParamPayload {
        self.specs
            .iter()
            .map(|s| (s.name.clone(), s.default.clone()))
            .collect()
    }

    /// Validate a payload against this schema: every entry's type must
    /// match, and numeric entries with declared bounds must fall within
    /// them. Unknown keys are ignored (forward-compatible payloads);
    /// missing keys fall back to the schema default.
    pub fn validate(&self, payload: &ParamPayload) -> QreResult<ParamPayload> {
        let mut resolved = ParamPayload::new();
        for spec in &self.specs {
            let value = payload.get(&spec.name).cloned().unwrap_or_else(|| spec.default.clone());
            match spec.param_type {
                ParamType::Int | ParamType::Float => {
                    let n = value.as_f64().ok_or_else(|| {
                        QreError::InputValidation(format!(
                            "parameter '{}' must be numeric",
                            spec.name
                        ))
                    })?;
                    if let (Some(min), Some(max)) = (spec.optimize.min, spec.optimize.max) {
                        if n < min || n > max {
                            return Err(QreError::InputValidation(format!(
                                "parameter '{}' value {n} out of range [{min}, {max}]",
                                spec.name
                            )));
                        }
                    }
                }
                ParamType::Bool => {
                    value.as_bool().ok_or_else(|| {
                        QreError::InputValidation(format!("parameter '{}' must be boolean", spec.name))
                    })?;
                }
                ParamType::Categorical => {
                    let s = value.as_str().ok_or_else(|| {
                        QreError::InputValidation(format!(
                            "parameter '{}' must be a string option",
                            spec.name
                        ))
                    })?;
                    if let Some(options) = &spec.options {
                        if !options.iter().any(|o| o == s) {
                            return Err(QreError::InputValidation(format!(
                                "parameter '{}' value '{s}' not in {options:?}",
                                spec.name
                            )));
                        }
                    }
                }
                ParamType::Timestamp => {
                    value.as_timestamp().ok_or_else(|| {
                        QreError::InputValidation(format!(
                            "parameter '{}' must be an ISO-8601 timestamp",
                            spec.name
                        ))
                    })?;
                }
            }
            resolved.insert(spec.name.clone(), value);
        }
        Ok(resolved)
    }
}
