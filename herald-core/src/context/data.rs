use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// 上下文数据的可见范围
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataScope {
    /// 仅在当前进程内可见，传输层不会编码
    InProcess,
    /// 可随传输层跨进程传播
    #[default]
    AcrossTransports,
}

/// 一条上下文数据
#[derive(Clone, Debug, PartialEq)]
pub struct DataEntry {
    pub key: String,
    pub value: Value,
    pub scope: DataScope,
}

/// 线程安全的键值表
///
/// 克隆只复制句柄，底层存储共享；并发写入同一键时后写者生效。
#[derive(Clone, Debug, Default)]
pub struct ContextData {
    entries: Arc<DashMap<String, (Value, DataScope)>>,
}

impl ContextData {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入可跨传输传播的数据
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.set_scoped(key, value, DataScope::AcrossTransports);
    }

    pub fn set_scoped(&self, key: impl Into<String>, value: impl Into<Value>, scope: DataScope) {
        self.entries.insert(key.into(), (value.into(), scope));
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|e| e.value().0.clone())
    }

    /// 读取并反序列化为目标类型；类型不符时返回 `None`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn scope_of(&self, key: &str) -> Option<DataScope> {
        self.entries.get(key).map(|e| e.value().1)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, (value, _))| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// 全部条目，按键排序以保证枚举结果稳定
    pub fn entries(&self) -> Vec<DataEntry> {
        let mut all: Vec<DataEntry> = self
            .entries
            .iter()
            .map(|e| DataEntry {
                key: e.key().clone(),
                value: e.value().0.clone(),
                scope: e.value().1,
            })
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// 将另一张表的全部条目合并进来（同键覆盖）
    pub fn merge_from(&self, other: &ContextData) {
        if self.ptr_eq(other) {
            return;
        }
        for entry in other.entries() {
            self.set_scoped(entry.key, entry.value, entry.scope);
        }
    }

    /// 是否共享同一底层存储
    pub fn ptr_eq(&self, other: &ContextData) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}
