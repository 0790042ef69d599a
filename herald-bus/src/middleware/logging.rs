//! 日志中间件
//!
//! 在执行前、成功后、失败后各记录一条 `tracing` 事件，级别可分别配置；
//! 消息与响应以 JSON 形式附带，可分别设置策略，也可按消息名选择。每个事件
//! 还可以触发钩子。响应与错误原样向上返回。
//!
use async_trait::async_trait;
use herald_core::error::{DispatchError, DispatchResult};
use herald_core::message::Message;
use herald_core::pipeline::{Middleware, MiddlewareContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::Level;

// tracing 的事件级别必须是常量
macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {
        if $level == Level::ERROR {
            tracing::error!($($arg)+)
        } else if $level == Level::WARN {
            tracing::warn!($($arg)+)
        } else if $level == Level::INFO {
            tracing::info!($($arg)+)
        } else if $level == Level::DEBUG {
            tracing::debug!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    };
}

/// 负载的记录方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadLoggingStrategy {
    Omit,
    #[default]
    MinimalJson,
    IndentedJson,
}

impl PayloadLoggingStrategy {
    pub fn render<T: Serialize>(&self, value: &T) -> Option<String> {
        let rendered = match self {
            Self::Omit => return None,
            Self::MinimalJson => serde_json::to_string(value),
            Self::IndentedJson => serde_json::to_string_pretty(value),
        };
        Some(rendered.unwrap_or_else(|e| format!("<unserializable: {e}>")))
    }
}

/// 一条日志事件的内容，传给钩子
#[derive(Debug)]
pub struct LogRecord<'a> {
    pub message_name: &'static str,
    pub category: &'a str,
    pub transport: &'a str,
    pub trace_id: &'a str,
    pub operation_id: &'a str,
    /// 已按负载策略渲染；`Omit` 时为 `None`
    pub payload: Option<&'a str>,
    pub elapsed_ms: Option<u64>,
    pub error: Option<&'a DispatchError>,
}

pub type LoggingHook = Arc<dyn Fn(&LogRecord<'_>) + Send + Sync>;

/// 按消息名选择负载策略
pub type PayloadStrategyFactory =
    Arc<dyn Fn(&'static str) -> PayloadLoggingStrategy + Send + Sync>;

#[derive(Clone)]
pub struct LoggingMiddleware {
    pub pre_level: Level,
    pub post_level: Level,
    pub error_level: Level,
    /// 消息负载
    pub payload: PayloadLoggingStrategy,
    /// 响应负载，默认不记录
    pub response_payload: PayloadLoggingStrategy,
    /// 设置后覆盖 `payload`
    pub payload_factory: Option<PayloadStrategyFactory>,
    /// 日志分类，默认为消息名
    pub category: Option<String>,
    pub on_before: Option<LoggingHook>,
    pub on_after: Option<LoggingHook>,
    pub on_error: Option<LoggingHook>,
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self {
            pre_level: Level::DEBUG,
            post_level: Level::DEBUG,
            error_level: Level::WARN,
            payload: PayloadLoggingStrategy::default(),
            response_payload: PayloadLoggingStrategy::Omit,
            payload_factory: None,
            category: None,
            on_before: None,
            on_after: None,
            on_error: None,
        }
    }
}

impl fmt::Debug for LoggingMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingMiddleware")
            .field("pre_level", &self.pre_level)
            .field("post_level", &self.post_level)
            .field("error_level", &self.error_level)
            .field("payload", &self.payload)
            .field("response_payload", &self.response_payload)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_payload_factory(
        mut self,
        factory: impl Fn(&'static str) -> PayloadLoggingStrategy + Send + Sync + 'static,
    ) -> Self {
        self.payload_factory = Some(Arc::new(factory));
        self
    }

    pub fn on_before(mut self, hook: impl Fn(&LogRecord<'_>) + Send + Sync + 'static) -> Self {
        self.on_before = Some(Arc::new(hook));
        self
    }

    pub fn on_after(mut self, hook: impl Fn(&LogRecord<'_>) + Send + Sync + 'static) -> Self {
        self.on_after = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&LogRecord<'_>) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    fn payload_for(&self, message_name: &'static str) -> PayloadLoggingStrategy {
        match &self.payload_factory {
            Some(factory) => factory(message_name),
            None => self.payload,
        }
    }
}

#[async_trait]
impl<M> Middleware<M> for LoggingMiddleware
where
    M: Message + Serialize,
    M::Response: Serialize,
{
    async fn execute(&self, ctx: MiddlewareContext<M>) -> DispatchResult<M::Response> {
        let context = ctx.context.clone();
        let transport = ctx.transport.to_string();
        let category = self.category.as_deref().unwrap_or(M::NAME);
        let payload = self.payload_for(M::NAME).render(&ctx.message);

        let mut record = LogRecord {
            message_name: M::NAME,
            category,
            transport: &transport,
            trace_id: context.trace_id(),
            operation_id: context.operation_id(),
            payload: payload.as_deref(),
            elapsed_ms: None,
            error: None,
        };

        event_at!(
            self.pre_level,
            category,
            message_name = M::NAME,
            transport = %transport,
            trace_id = record.trace_id,
            operation_id = record.operation_id,
            payload = record.payload.unwrap_or_default(),
            "handling message"
        );
        if let Some(hook) = &self.on_before {
            hook(&record);
        }

        let started = Instant::now();
        let result = ctx.next.run(ctx.message, ctx.cancellation).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        record.elapsed_ms = Some(elapsed_ms);

        match &result {
            Ok(response) => {
                let response = self.response_payload.render(response);
                record.payload = response.as_deref();
                event_at!(
                    self.post_level,
                    category,
                    message_name = M::NAME,
                    transport = %transport,
                    trace_id = record.trace_id,
                    operation_id = record.operation_id,
                    elapsed_ms,
                    response = record.payload.unwrap_or_default(),
                    "message handled"
                );
                if let Some(hook) = &self.on_after {
                    hook(&record);
                }
            }
            Err(err) => {
                record.payload = None;
                record.error = Some(err);
                event_at!(
                    self.error_level,
                    category,
                    message_name = M::NAME,
                    transport = %transport,
                    trace_id = record.trace_id,
                    operation_id = record.operation_id,
                    elapsed_ms,
                    error = %err,
                    "message failed"
                );
                if let Some(hook) = &self.on_error {
                    hook(&record);
                }
            }
        }

        result
    }
}
