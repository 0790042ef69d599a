//! 消息定义宏
//!
//! - `#[command]`：命令，响应类型默认 `()`
//! - `#[query(response = T)]`：查询
//! - `#[signal]`：信号，无响应
//!
//! 均支持 `name = "..."` 覆写消息名（默认取类型名），并追加 `Debug`、`Clone` 派生。
//!
use proc_macro::TokenStream;

mod derive_utils;
mod message;

use message::Kind;

/// 命令宏
/// 用法：`#[command]`、`#[command(response = u64, name = "order.create")]`
#[proc_macro_attribute]
pub fn command(attr: TokenStream, item: TokenStream) -> TokenStream {
    message::expand(attr, item, Kind::Command)
}

/// 查询宏
#[proc_macro_attribute]
pub fn query(attr: TokenStream, item: TokenStream) -> TokenStream {
    message::expand(attr, item, Kind::Query)
}

/// 信号宏；不接受 `response`
#[proc_macro_attribute]
pub fn signal(attr: TokenStream, item: TokenStream) -> TokenStream {
    message::expand(attr, item, Kind::Signal)
}
