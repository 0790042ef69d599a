use thiserror::Error;

/// 配置加载错误
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: path={path}, reason={source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config invalid: {0}")]
    Invalid(String),
}
