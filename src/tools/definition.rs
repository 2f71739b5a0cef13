//! 工具定义与参数校验
//!
//! ToolDefinition 是工具目录的规范形式（名称、描述、参数 schema），进程启动时定义，之后不可变。
//! 模型给出的参数先经 validate 校验为 ToolArgs，再交给具体集成，避免把畸形参数直接传下去。

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::core::ToolError;

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// JSON Schema 中的小写类型名
    pub fn json_name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// 单个参数的 schema
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub kind: ParamType,
    pub description: String,
    /// 仅对 String 有意义：允许的取值
    pub enum_values: Vec<String>,
    /// 仅对 Array 有意义：元素 schema
    pub items: Option<Box<ParamSpec>>,
}

impl ParamSpec {
    pub fn new(kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            enum_values: Vec::new(),
            items: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new(ParamType::String, description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(ParamType::Integer, description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(ParamType::Boolean, description)
    }

    pub fn object(description: impl Into<String>) -> Self {
        Self::new(ParamType::Object, description)
    }

    pub fn array(description: impl Into<String>, items: ParamSpec) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(ParamType::Array, description)
        }
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    /// OBJECT 参数也接受 JSON 文本形式（部分后端只能以字符串传递自由形状对象）
    fn normalize(&self, value: Value) -> Value {
        match (self.kind, value) {
            (ParamType::Object, Value::String(text)) => match serde_json::from_str(&text) {
                Ok(parsed @ Value::Object(_)) => parsed,
                _ => Value::String(text),
            },
            (_, value) => value,
        }
    }

    fn check(&self, path: &str, value: &Value) -> Result<(), String> {
        if !self.kind.matches(value) {
            return Err(format!("'{path}' must be of type {}", self.kind.json_name()));
        }
        if !self.enum_values.is_empty() {
            if let Some(s) = value.as_str() {
                if !self.enum_values.iter().any(|e| e == s) {
                    return Err(format!(
                        "'{path}' must be one of [{}], got '{s}'",
                        self.enum_values.join(", ")
                    ));
                }
            }
        }
        if let (Some(items), Some(array)) = (&self.items, value.as_array()) {
            for (i, item) in array.iter().enumerate() {
                items.check(&format!("{path}[{i}]"), item)?;
            }
        }
        Ok(())
    }
}

/// 参数集合：properties + required
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParametersSpec {
    pub properties: BTreeMap<String, ParamSpec>,
    /// 保持声明顺序
    pub required: Vec<String>,
}

/// 规范工具定义
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParametersSpec,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParametersSpec::default(),
        }
    }

    /// 必填参数
    pub fn required(mut self, name: &str, spec: ParamSpec) -> Self {
        self.parameters.properties.insert(name.to_string(), spec);
        self.parameters.required.push(name.to_string());
        self
    }

    /// 可选参数
    pub fn optional(mut self, name: &str, spec: ParamSpec) -> Self {
        self.parameters.properties.insert(name.to_string(), spec);
        self
    }

    /// 校验模型给出的参数：必须是对象、必填项非空、类型与枚举匹配；未声明的键被剔除
    pub fn validate(&self, args: Value) -> Result<ToolArgs, ToolError> {
        let invalid = |reason: String| ToolError::InvalidArguments {
            tool: self.name.clone(),
            reason,
        };

        let map = match args {
            Value::Object(map) => map,
            // 无参数工具常收到 null
            Value::Null => Map::new(),
            other => {
                return Err(invalid(format!(
                    "arguments must be a JSON object, got {}",
                    type_name(&other)
                )))
            }
        };

        for name in &self.parameters.required {
            match map.get(name) {
                None | Some(Value::Null) => {
                    return Err(invalid(format!("missing required field '{name}'")))
                }
                Some(_) => {}
            }
        }

        let mut clean = Map::new();
        for (key, value) in map {
            match self.parameters.properties.get(&key) {
                Some(spec) => {
                    if value.is_null() {
                        continue;
                    }
                    let value = spec.normalize(value);
                    spec.check(&key, &value).map_err(invalid)?;
                    clean.insert(key, value);
                }
                None => {
                    tracing::debug!(tool = %self.name, field = %key, "dropping undeclared argument");
                }
            }
        }

        Ok(ToolArgs {
            tool: self.name.clone(),
            values: clean,
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 已校验的工具参数
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArgs {
    tool: String,
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(|v| v.as_i64())
    }

    /// 反序列化为具体集成自己的参数结构
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ToolError> {
        serde_json::from_value(Value::Object(self.values.clone())).map_err(|e| {
            ToolError::InvalidArguments {
                tool: self.tool.clone(),
                reason: e.to_string(),
            }
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}
