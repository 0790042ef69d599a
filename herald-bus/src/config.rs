//! 分发器配置
//!
//! 纯数据结构，全部字段有默认值，可从 JSON 加载：
//! ```json
//! { "broadcast": { "strategy": "parallel", "max_degree_of_parallelism": 4 } }
//! ```
//!
use crate::error::ConfigError;
use herald_core::broadcast::{
    BroadcastingStrategy, FailurePolicy, ParallelBroadcast, SequentialBroadcast,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// 广播策略种类
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub strategy: StrategyKind,
    /// 仅对顺序策略生效
    pub failure_policy: FailurePolicy,
    /// 仅对并发策略生效；`None` 表示不限制
    pub max_degree_of_parallelism: Option<isize>,
}

impl BroadcastConfig {
    /// 根据配置创建默认广播策略
    pub fn strategy(&self) -> Arc<dyn BroadcastingStrategy> {
        match self.strategy {
            StrategyKind::Sequential => Arc::new(SequentialBroadcast::new(self.failure_policy)),
            StrategyKind::Parallel => match self.max_degree_of_parallelism {
                Some(max) => Arc::new(ParallelBroadcast::with_max_degree_of_parallelism(max)),
                None => Arc::new(ParallelBroadcast::new()),
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub broadcast: BroadcastConfig,
}

impl DispatcherConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast.strategy == StrategyKind::Sequential
            && self.broadcast.max_degree_of_parallelism.is_some()
        {
            return Err(ConfigError::Invalid(
                "max_degree_of_parallelism requires the parallel strategy".into(),
            ));
        }
        Ok(())
    }
}
