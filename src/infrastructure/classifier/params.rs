//! Random forest hyperparameters

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{DomainError, ParamMap};

/// Seed used whenever none is configured
pub const DEFAULT_RANDOM_STATE: u64 = 42;

/// Number of trees when none is configured
pub const DEFAULT_N_ESTIMATORS: usize = 100;

/// Depth limit of the fixed fallback parameters
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Keys accepted for compatibility but without effect
const IGNORED_KEYS: &[&str] = &["n_jobs", "verbose"];

/// Split quality measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Gini,
    Entropy,
}

/// Number of features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Count(usize),
    Fraction(f64),
}

impl MaxFeatures {
    /// Resolve against the number of available features (at least one)
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            Self::Sqrt => n.sqrt().floor() as usize,
            Self::Log2 => n.log2().floor() as usize,
            Self::All => n_features,
            Self::Count(k) => *k,
            Self::Fraction(f) => (f * n).floor() as usize,
        };

        k.clamp(1, n_features.max(1))
    }

    fn to_value(self) -> Value {
        match self {
            Self::Sqrt => Value::from("sqrt"),
            Self::Log2 => Value::from("log2"),
            Self::All => Value::Null,
            Self::Count(k) => Value::from(k),
            Self::Fraction(f) => Value::from(f),
        }
    }
}

/// Hyperparameters of a random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub criterion: Criterion,
    pub random_state: u64,
}

impl Default for ForestParams {
    /// Fixed fallback used when no parameters are configured at all
    fn default() -> Self {
        Self {
            max_depth: Some(DEFAULT_MAX_DEPTH),
            ..Self::base()
        }
    }
}

impl ForestParams {
    /// Values taken by keys missing from an explicit mapping
    fn base() -> Self {
        Self {
            n_estimators: DEFAULT_N_ESTIMATORS,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: DEFAULT_RANDOM_STATE,
        }
    }

    /// Parse a parameter mapping; unknown keys and bad values are config errors
    pub fn from_map(map: &ParamMap) -> Result<Self, DomainError> {
        let mut params = Self::base();

        for (key, value) in map {
            match key.as_str() {
                "n_estimators" => params.n_estimators = positive_int(key, value)?,
                "max_depth" => {
                    params.max_depth = match value {
                        Value::Null => None,
                        other => Some(positive_int(key, other)?),
                    }
                }
                "min_samples_split" => {
                    params.min_samples_split = positive_int(key, value)?;
                    if params.min_samples_split < 2 {
                        return Err(invalid(key, value, "an integer >= 2"));
                    }
                }
                "min_samples_leaf" => params.min_samples_leaf = positive_int(key, value)?,
                "max_features" => params.max_features = parse_max_features(key, value)?,
                "bootstrap" => {
                    params.bootstrap = value
                        .as_bool()
                        .ok_or_else(|| invalid(key, value, "a boolean"))?
                }
                "criterion" => {
                    params.criterion = match value.as_str() {
                        Some("gini") => Criterion::Gini,
                        Some("entropy") => Criterion::Entropy,
                        _ => return Err(invalid(key, value, "'gini' or 'entropy'")),
                    }
                }
                "random_state" => {
                    params.random_state = match value {
                        Value::Null => DEFAULT_RANDOM_STATE,
                        other => other
                            .as_u64()
                            .ok_or_else(|| invalid(key, other, "a non-negative integer"))?,
                    }
                }
                k if IGNORED_KEYS.contains(&k) => {}
                other => {
                    return Err(DomainError::config(format!(
                        "Unknown model parameter '{}'",
                        other
                    )))
                }
            }
        }

        Ok(params)
    }

    /// Effective parameters as a mapping
    pub fn to_map(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("n_estimators".into(), Value::from(self.n_estimators));
        map.insert(
            "max_depth".into(),
            self.max_depth.map(Value::from).unwrap_or(Value::Null),
        );
        map.insert("min_samples_split".into(), Value::from(self.min_samples_split));
        map.insert("min_samples_leaf".into(), Value::from(self.min_samples_leaf));
        map.insert("max_features".into(), self.max_features.to_value());
        map.insert("bootstrap".into(), Value::from(self.bootstrap));
        map.insert(
            "criterion".into(),
            Value::from(match self.criterion {
                Criterion::Gini => "gini",
                Criterion::Entropy => "entropy",
            }),
        );
        map.insert("random_state".into(), Value::from(self.random_state));
        map
    }
}

fn positive_int(key: &str, value: &Value) -> Result<usize, DomainError> {
    value
        .as_u64()
        .filter(|&v| v > 0)
        .map(|v| v as usize)
        .ok_or_else(|| invalid(key, value, "a positive integer"))
}

fn parse_max_features(key: &str, value: &Value) -> Result<MaxFeatures, DomainError> {
    match value {
        Value::Null => Ok(MaxFeatures::All),
        Value::String(s) if s == "sqrt" => Ok(MaxFeatures::Sqrt),
        Value::String(s) if s == "log2" => Ok(MaxFeatures::Log2),
        Value::Number(n) if n.is_u64() => Ok(MaxFeatures::Count(positive_int(key, value)?)),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f > 0.0 && f <= 1.0 => Ok(MaxFeatures::Fraction(f)),
            _ => Err(invalid(key, value, "a fraction in (0, 1]")),
        },
        _ => Err(invalid(key, value, "'sqrt', 'log2', null or a number")),
    }
}

fn invalid(key: &str, value: &Value, expected: &str) -> DomainError {
    DomainError::config(format!(
        "Invalid value {} for model parameter '{}': expected {}",
        value, key, expected
    ))
}
