//! 远程资源标识
//!
//! 创建接口的返回值有三种形态：带 id 字段的对象、含 "id" 键的映射、或直接就是标识本身。
//! 统一归一为 ResourceId 后再保存。

use std::fmt::Display;

use serde_json::{Map, Value};

/// 归一化后的远程资源句柄（agent / thread）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 能从中取出资源标识的值
pub trait IntoResourceId {
    fn resource_id(&self) -> Option<ResourceId>;
}

fn scalar_id(value: &Value) -> Option<ResourceId> {
    match value {
        Value::String(s) => s.as_str().resource_id(),
        Value::Number(n) => Some(ResourceId::new(n.to_string())),
        _ => None,
    }
}

impl IntoResourceId for Map<String, Value> {
    fn resource_id(&self) -> Option<ResourceId> {
        self.get("id").and_then(scalar_id)
    }
}

impl IntoResourceId for str {
    fn resource_id(&self) -> Option<ResourceId> {
        let id = self.trim();
        if id.is_empty() {
            None
        } else {
            Some(ResourceId::new(id))
        }
    }
}

impl IntoResourceId for String {
    fn resource_id(&self) -> Option<ResourceId> {
        self.as_str().resource_id()
    }
}

impl IntoResourceId for Value {
    fn resource_id(&self) -> Option<ResourceId> {
        match self {
            Value::Object(map) => map.resource_id(),
            other => scalar_id(other),
        }
    }
}
