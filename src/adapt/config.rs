use super::estimate::ErrorNormalization;
use super::reference::ReferenceRefinement;
use super::selector::{CandList, SelectionStrategy};
use crate::domain::{fields::ErrorNorm, mesh::MAX_POLYNOMIAL_ORDER};
#[cfg(feature = "json_export")]
use json::object;
use json::JsonValue;
use std::fs::read_to_string;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("threshold must lie in (0, 1], got {0}")]
    Threshold(f64),
    #[error("convergence exponent must be positive, got {0}")]
    ConvExp(f64),
    #[error("error target must be a non-negative percentage, got {0}")]
    ErrStop(f64),
    #[error("score tolerance must be non-negative, got {0}")]
    ScoreTolerance(f64),
    #[error("order floor {floor} exceeds ceiling {ceiling}")]
    OrderBounds { floor: u8, ceiling: u8 },
    #[error("order ceiling {0} exceeds the maximum polynomial order")]
    CeilingTooHigh(u8),
    #[error("{0}")]
    Format(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] json::Error),
}

/// Every tunable of the adaptivity loop
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdaptivityConfig {
    /// Strategy-dependent selection threshold
    pub threshold: f64,
    pub strategy: SelectionStrategy,
    pub cand_list: CandList,
    /// Exponent applied to the DoF increase when scoring candidates
    pub conv_exp: f64,
    /// Target error (percent)
    pub err_stop: f64,
    pub ndof_stop: usize,
    pub max_steps: usize,
    /// Maximum hanging-node level (`None`: arbitrary)
    pub mesh_regularity: Option<u8>,
    pub error_norm: ErrorNorm,
    pub normalization: ErrorNormalization,
    pub order_floor: u8,
    pub order_ceiling: u8,
    pub reference: ReferenceRefinement,
    /// Relative width within which candidate scores count as tied
    pub score_tolerance: f64,
    /// Stop on the exact error (when exact solutions are supplied) rather than the estimate
    pub stop_on_exact_error: bool,
}

impl Default for AdaptivityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            strategy: SelectionStrategy::RelativeToMax,
            cand_list: CandList::HpAniso,
            conv_exp: 0.5,
            err_stop: 1.0,
            ndof_stop: 60_000,
            max_steps: 100,
            mesh_regularity: None,
            error_norm: ErrorNorm::H1,
            normalization: ErrorNormalization::RelativeErrorToGlobalNorm,
            order_floor: 0,
            order_ceiling: 10,
            reference: ReferenceRefinement::Hp(1),
            score_tolerance: 1e-9,
            stop_on_exact_error: false,
        }
    }
}

impl AdaptivityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::Threshold(self.threshold));
        }
        if !(self.conv_exp > 0.0 && self.conv_exp.is_finite()) {
            return Err(ConfigError::ConvExp(self.conv_exp));
        }
        if !(self.err_stop >= 0.0) {
            return Err(ConfigError::ErrStop(self.err_stop));
        }
        if !(self.score_tolerance >= 0.0) {
            return Err(ConfigError::ScoreTolerance(self.score_tolerance));
        }
        if self.order_floor > self.order_ceiling {
            return Err(ConfigError::OrderBounds {
                floor: self.order_floor,
                ceiling: self.order_ceiling,
            });
        }
        if self.order_ceiling > MAX_POLYNOMIAL_ORDER {
            return Err(ConfigError::CeilingTooHigh(self.order_ceiling));
        }
        Ok(())
    }

    /// Parse a configuration from a JSON file; see [AdaptivityConfig::from_json]
    pub fn from_file(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        let contents = read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    /// Parse a configuration from JSON text. Absent keys keep their default values.
    ///
    /// ```json
    /// {
    ///     "threshold": 0.5,
    ///     "strategy": "Cumulative",
    ///     "cand_list": "HpAniso",
    ///     "conv_exp": 0.5,
    ///     "err_stop": 1e-3,
    ///     "ndof_stop": 1000,
    ///     "max_steps": 100,
    ///     "mesh_regularity": null,
    ///     "error_norm": "H1",
    ///     "normalization": "RelativeErrorToGlobalNorm",
    ///     "order_floor": 0,
    ///     "order_ceiling": 10,
    ///     "reference": { "kind": "Hp", "order_increase": 1 },
    ///     "score_tolerance": 1e-9,
    ///     "stop_on_exact_error": false
    /// }
    /// ```
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config_json = json::parse(text)?;
        if !config_json.is_object() {
            return Err(ConfigError::Format(
                "configuration must be a JSON object!".to_string(),
            ));
        }

        let mut config = Self::default();

        if let Some(threshold) = parse_f64(&config_json, "threshold")? {
            config.threshold = threshold;
        }
        if let Some(name) = parse_str(&config_json, "strategy")? {
            config.strategy = parse_named(name, "strategy", STRATEGY_NAMES)?;
        }
        if let Some(name) = parse_str(&config_json, "cand_list")? {
            config.cand_list = parse_named(name, "cand_list", CAND_LIST_NAMES)?;
        }
        if let Some(conv_exp) = parse_f64(&config_json, "conv_exp")? {
            config.conv_exp = conv_exp;
        }
        if let Some(err_stop) = parse_f64(&config_json, "err_stop")? {
            config.err_stop = err_stop;
        }
        if let Some(ndof_stop) = parse_usize(&config_json, "ndof_stop")? {
            config.ndof_stop = ndof_stop;
        }
        if let Some(max_steps) = parse_usize(&config_json, "max_steps")? {
            config.max_steps = max_steps;
        }
        // null and -1 both mean arbitrary irregularity
        let regularity = &config_json["mesh_regularity"];
        if !regularity.is_null() {
            config.mesh_regularity = match regularity.as_i64() {
                Some(level) if level < 0 => None,
                Some(level) if level <= u8::MAX as i64 => Some(level as u8),
                _ => {
                    return Err(ConfigError::Format(
                        "mesh_regularity must be null or an integer!".to_string(),
                    ))
                }
            };
        }
        if let Some(name) = parse_str(&config_json, "error_norm")? {
            config.error_norm = parse_named(name, "error_norm", NORM_NAMES)?;
        }
        if let Some(name) = parse_str(&config_json, "normalization")? {
            config.normalization = parse_named(name, "normalization", NORMALIZATION_NAMES)?;
        }
        if let Some(floor) = parse_u8(&config_json, "order_floor")? {
            config.order_floor = floor;
        }
        if let Some(ceiling) = parse_u8(&config_json, "order_ceiling")? {
            config.order_ceiling = ceiling;
        }
        if !config_json["reference"].is_null() {
            config.reference = parse_reference(&config_json["reference"])?;
        }
        if let Some(tol) = parse_f64(&config_json, "score_tolerance")? {
            config.score_tolerance = tol;
        }
        let stop_on_exact = &config_json["stop_on_exact_error"];
        if !stop_on_exact.is_null() {
            config.stop_on_exact_error = stop_on_exact.as_bool().ok_or_else(|| {
                ConfigError::Format("stop_on_exact_error must be a boolean!".to_string())
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        let (kind, order_increase) = match self.reference {
            ReferenceRefinement::H => ("H", 0),
            ReferenceRefinement::P(k) => ("P", k),
            ReferenceRefinement::Hp(k) => ("Hp", k),
        };

        object! {
            "threshold": self.threshold,
            "strategy": name_of(self.strategy, STRATEGY_NAMES),
            "cand_list": name_of(self.cand_list, CAND_LIST_NAMES),
            "conv_exp": self.conv_exp,
            "err_stop": self.err_stop,
            "ndof_stop": self.ndof_stop,
            "max_steps": self.max_steps,
            "mesh_regularity": match self.mesh_regularity {
                Some(level) => JsonValue::from(level),
                None => JsonValue::Null,
            },
            "error_norm": name_of(self.error_norm, NORM_NAMES),
            "normalization": name_of(self.normalization, NORMALIZATION_NAMES),
            "order_floor": self.order_floor,
            "order_ceiling": self.order_ceiling,
            "reference": object! { "kind": kind, "order_increase": order_increase },
            "score_tolerance": self.score_tolerance,
            "stop_on_exact_error": self.stop_on_exact_error,
        }
    }
}

const STRATEGY_NAMES: &[(&str, SelectionStrategy)] = &[
    ("SingleElement", SelectionStrategy::SingleElement),
    ("Cumulative", SelectionStrategy::Cumulative),
    ("RelativeToMax", SelectionStrategy::RelativeToMax),
];

const CAND_LIST_NAMES: &[(&str, CandList)] = &[
    ("PIso", CandList::PIso),
    ("PAniso", CandList::PAniso),
    ("HIso", CandList::HIso),
    ("HAniso", CandList::HAniso),
    ("HpIso", CandList::HpIso),
    ("HpAnisoH", CandList::HpAnisoH),
    ("HpAnisoP", CandList::HpAnisoP),
    ("HpAniso", CandList::HpAniso),
];

const NORM_NAMES: &[(&str, ErrorNorm)] = &[("L2", ErrorNorm::L2), ("H1", ErrorNorm::H1)];

const NORMALIZATION_NAMES: &[(&str, ErrorNormalization)] = &[
    ("Absolute", ErrorNormalization::Absolute),
    (
        "RelativeErrorToGlobalNorm",
        ErrorNormalization::RelativeErrorToGlobalNorm,
    ),
    (
        "RelativeErrorToComponentNorm",
        ErrorNormalization::RelativeErrorToComponentNorm,
    ),
];

fn parse_named<T: Copy>(name: &str, key: &str, table: &[(&str, T)]) -> Result<T, ConfigError> {
    table
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, value)| *value)
        .ok_or_else(|| {
            ConfigError::Format(format!(
                "unknown {} '{}' (expected one of: {})",
                key,
                name,
                table.iter().map(|(n, _)| *n).collect::<Vec<_>>().join(", ")
            ))
        })
}

#[cfg(feature = "json_export")]
fn name_of<T: Copy + PartialEq>(value: T, table: &[(&'static str, T)]) -> &'static str {
    table
        .iter()
        .find(|(_, v)| *v == value)
        .map(|(n, _)| *n)
        .unwrap_or("")
}

fn parse_f64(config_json: &JsonValue, key: &str) -> Result<Option<f64>, ConfigError> {
    let value = &config_json[key];
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_f64()
        .map(Some)
        .ok_or_else(|| ConfigError::Format(format!("{} must be a number!", key)))
}

fn parse_usize(config_json: &JsonValue, key: &str) -> Result<Option<usize>, ConfigError> {
    let value = &config_json[key];
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_usize()
        .map(Some)
        .ok_or_else(|| ConfigError::Format(format!("{} must be a non-negative integer!", key)))
}

fn parse_u8(config_json: &JsonValue, key: &str) -> Result<Option<u8>, ConfigError> {
    let value = &config_json[key];
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_u8()
        .map(Some)
        .ok_or_else(|| ConfigError::Format(format!("{} must be an integer in [0, 255]!", key)))
}

fn parse_str<'a>(config_json: &'a JsonValue, key: &str) -> Result<Option<&'a str>, ConfigError> {
    let value = &config_json[key];
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_str()
        .map(Some)
        .ok_or_else(|| ConfigError::Format(format!("{} must be a string!", key)))
}

fn parse_reference(reference_json: &JsonValue) -> Result<ReferenceRefinement, ConfigError> {
    let order_increase = parse_u8(reference_json, "order_increase")?.unwrap_or(1);
    match reference_json["kind"].as_str() {
        Some("H") => Ok(ReferenceRefinement::H),
        Some("P") => Ok(ReferenceRefinement::P(order_increase)),
        Some("Hp") => Ok(ReferenceRefinement::Hp(order_increase)),
        _ => Err(ConfigError::Format(
            "reference.kind must be one of: H, P, Hp".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AdaptivityConfig::default().validate().unwrap();
    }

    #[test]
    fn validation() {
        let bad_threshold = AdaptivityConfig {
            threshold: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad_threshold.validate(), Err(ConfigError::Threshold(_))));

        let bad_exp = AdaptivityConfig {
            conv_exp: -1.0,
            ..Default::default()
        };
        assert!(matches!(bad_exp.validate(), Err(ConfigError::ConvExp(_))));

        let bad_bounds = AdaptivityConfig {
            order_floor: 4,
            order_ceiling: 3,
            ..Default::default()
        };
        assert!(matches!(
            bad_bounds.validate(),
            Err(ConfigError::OrderBounds { floor: 4, ceiling: 3 })
        ));

        let bad_ceiling = AdaptivityConfig {
            order_ceiling: MAX_POLYNOMIAL_ORDER + 1,
            ..Default::default()
        };
        assert!(matches!(bad_ceiling.validate(), Err(ConfigError::CeilingTooHigh(_))));

        let nan_stop = AdaptivityConfig {
            err_stop: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(nan_stop.validate(), Err(ConfigError::ErrStop(_))));
    }

    #[test]
    fn parse_json() {
        let config = AdaptivityConfig::from_json(
            r#"{
                "threshold": 0.5,
                "strategy": "Cumulative",
                "cand_list": "HIso",
                "err_stop": 1e-3,
                "ndof_stop": 1000,
                "mesh_regularity": -1,
                "error_norm": "L2",
                "reference": { "kind": "P", "order_increase": 2 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.strategy, SelectionStrategy::Cumulative);
        assert_eq!(config.cand_list, CandList::HIso);
        assert_eq!(config.err_stop, 1e-3);
        assert_eq!(config.ndof_stop, 1000);
        assert_eq!(config.mesh_regularity, None);
        assert_eq!(config.error_norm, ErrorNorm::L2);
        assert_eq!(config.reference, ReferenceRefinement::P(2));
        assert_eq!(config.conv_exp, AdaptivityConfig::default().conv_exp);
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            AdaptivityConfig::from_json(r#"{ "cand_list": "HpIsotropic" }"#),
            Err(ConfigError::Format(_))
        ));
        assert!(matches!(
            AdaptivityConfig::from_json(r#"{ "threshold": "high" }"#),
            Err(ConfigError::Format(_))
        ));
        assert!(matches!(
            AdaptivityConfig::from_json(r#"{ "threshold": 2.0 }"#),
            Err(ConfigError::Threshold(_))
        ));
        assert!(matches!(
            AdaptivityConfig::from_json("[1, 2"),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            AdaptivityConfig::from_file("./test_input/missing_config.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn config_file() {
        let config = AdaptivityConfig::from_file("./test_input/layer_boundary_config.json").unwrap();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.ndof_stop, 1000);
        assert!(config.stop_on_exact_error);
    }

    #[cfg(feature = "json_export")]
    #[test]
    fn json_round_trip() {
        let config = AdaptivityConfig {
            mesh_regularity: Some(1),
            strategy: SelectionStrategy::SingleElement,
            reference: ReferenceRefinement::Hp(2),
            ..Default::default()
        };
        let text = config.to_json().dump();
        assert_eq!(AdaptivityConfig::from_json(&text).unwrap(), config);
    }
}
