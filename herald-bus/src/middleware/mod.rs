//! 内置中间件
mod logging;
mod retry;

pub use logging::{
    LogRecord, LoggingHook, LoggingMiddleware, PayloadLoggingStrategy, PayloadStrategyFactory,
};
pub use retry::RetryMiddleware;
