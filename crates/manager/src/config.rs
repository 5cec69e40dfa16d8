//! Resource configuration
//!
//! The YAML/JSON loader is external; the manager consumes already-validated
//! structs. Each resource kind is a tagged enum so an unknown `type` fails
//! at deserialization, and construction re-validates the parts that only the
//! engine understands (expressions, operator names).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use weir_pipeline::conditions::{
    BloblangCondition, CheckField, CheckInterpolation, Count, Static, Text, TextOperator,
};
use weir_pipeline::{Bloblang, ForEach, Try};
use weir_protocol::{Cache, Condition, Processor, RateLimit};

use crate::builtin::{LocalRateLimit, MemoryCache};
use crate::BuildError;

/// Top-level resource configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub caches: HashMap<String, CacheConfig>,
    pub conditions: HashMap<String, ConditionConfig>,
    pub rate_limits: HashMap<String, RateLimitConfig>,
    pub processors: HashMap<String, ProcessorConfig>,
}

/// Cache driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheConfig {
    Memory,
}

/// Condition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionConfig {
    Text {
        operator: TextOperator,
        arg: String,
        #[serde(default)]
        part: i64,
    },
    Bloblang {
        value: String,
    },
    Count {
        arg: u64,
    },
    Static {
        value: bool,
    },
    CheckField {
        path: String,
        condition: Box<ConditionConfig>,
    },
    CheckInterpolation {
        value: String,
        condition: Box<ConditionConfig>,
    },
}

/// Rate limit driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateLimitConfig {
    Local { count: u64, interval_ms: u64 },
}

/// Processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessorConfig {
    Bloblang { value: String },
    ForEach { children: Vec<ProcessorConfig> },
    Try { children: Vec<ProcessorConfig> },
}

pub(crate) fn build_cache(
    _name: &str,
    config: CacheConfig,
) -> Result<Arc<dyn Cache>, BuildError> {
    match config {
        CacheConfig::Memory => Ok(Arc::new(MemoryCache::new())),
    }
}

pub(crate) fn build_condition(
    name: &str,
    config: ConditionConfig,
) -> Result<Arc<dyn Condition>, BuildError> {
    match config {
        ConditionConfig::Text { operator, arg, part } => {
            Ok(Arc::new(Text::new(operator, arg, part)))
        }
        ConditionConfig::Bloblang { value } => {
            let condition = BloblangCondition::new(&value).map_err(|e| BuildError::BadConfig {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Arc::new(condition))
        }
        ConditionConfig::Count { arg } => {
            if arg == 0 {
                return Err(BuildError::BadConfig {
                    name: name.to_string(),
                    reason: "count arg must be greater than zero".to_string(),
                });
            }
            Ok(Arc::new(Count::new(arg)))
        }
        ConditionConfig::Static { value } => Ok(Arc::new(Static(value))),
        ConditionConfig::CheckField { path, condition } => {
            let child = build_condition(name, *condition)?;
            Ok(Arc::new(CheckField::new(path, child)))
        }
        ConditionConfig::CheckInterpolation { value, condition } => {
            let child = build_condition(name, *condition)?;
            let checked =
                CheckInterpolation::new(&value, child).map_err(|e| BuildError::BadConfig {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(Arc::new(checked))
        }
    }
}

pub(crate) fn build_rate_limit(
    name: &str,
    config: RateLimitConfig,
) -> Result<Arc<dyn RateLimit>, BuildError> {
    match config {
        RateLimitConfig::Local { count, interval_ms } => {
            if count == 0 || interval_ms == 0 {
                return Err(BuildError::BadConfig {
                    name: name.to_string(),
                    reason: "local rate limit requires a non-zero count and interval".to_string(),
                });
            }
            Ok(Arc::new(LocalRateLimit::new(
                count,
                Duration::from_millis(interval_ms),
            )))
        }
    }
}

pub(crate) fn build_processor(
    name: &str,
    config: ProcessorConfig,
) -> Result<Arc<dyn Processor>, BuildError> {
    match config {
        ProcessorConfig::Bloblang { value } => {
            let processor = Bloblang::new(&value).map_err(|e| BuildError::BadConfig {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Arc::new(processor))
        }
        ProcessorConfig::ForEach { children } => {
            let children = build_children(name, children)?;
            Ok(Arc::new(ForEach::new(children)))
        }
        ProcessorConfig::Try { children } => {
            let children = build_children(name, children)?;
            Ok(Arc::new(Try::new(children)))
        }
    }
}

fn build_children(
    name: &str,
    configs: Vec<ProcessorConfig>,
) -> Result<Vec<Arc<dyn Processor>>, BuildError> {
    configs
        .into_iter()
        .map(|c| build_processor(name, c))
        .collect()
}
