//! 标识生成
use uuid::Uuid;

/// 32 位小写十六进制 trace id
pub(crate) fn random_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 16 位小写十六进制 operation id
pub(crate) fn random_operation_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// 当前活动的外部链路 span 的 trace id（仅在创建上下文时读取）
#[cfg(feature = "otel")]
pub(crate) fn external_trace_id() -> Option<String> {
    use opentelemetry::trace::TraceContextExt;

    let cx = opentelemetry::Context::current();
    let span = cx.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| span_context.trace_id().to_string())
}

#[cfg(not(feature = "otel"))]
pub(crate) fn external_trace_id() -> Option<String> {
    None
}
