//! 工具 schema 翻译
//!
//! 把规范 ToolDefinition 翻译为各后端原生的函数声明格式：
//! - Gemini：`functionDeclarations` 条目，OpenAPI 子集，类型名大写
//! - Anthropic：`tools` 条目，`input_schema` 为标准 JSON Schema
//!
//! 纯函数、确定性；描述（含可选参数的描述）、类型、枚举、数组元素与 required 都会保留。

use serde_json::{json, Map, Value};

use crate::tools::{ParamSpec, ParamType, ParametersSpec, ToolDefinition};

/// 翻译目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Anthropic,
}

/// 将工具定义翻译为目标后端的原生声明列表
pub fn to_provider_schema(kind: ProviderKind, defs: &[ToolDefinition]) -> Vec<Value> {
    defs.iter()
        .map(|def| match kind {
            ProviderKind::Gemini => gemini_declaration(def),
            ProviderKind::Anthropic => anthropic_tool(def),
        })
        .collect()
}

fn gemini_declaration(def: &ToolDefinition) -> Value {
    let mut decl = json!({
        "name": def.name,
        "description": def.description,
    });
    // Gemini 不接受空 properties 的 OBJECT，无参数工具省略 parameters
    if !def.parameters.properties.is_empty() {
        decl["parameters"] = object_schema(&def.parameters, ProviderKind::Gemini);
    }
    decl
}

fn anthropic_tool(def: &ToolDefinition) -> Value {
    json!({
        "name": def.name,
        "description": def.description,
        "input_schema": object_schema(&def.parameters, ProviderKind::Anthropic),
    })
}

fn object_schema(params: &ParametersSpec, kind: ProviderKind) -> Value {
    let properties: Map<String, Value> = params
        .properties
        .iter()
        .map(|(name, spec)| (name.clone(), param_schema(spec, kind)))
        .collect();
    let mut schema = json!({
        "type": type_name("object", kind),
        "properties": properties,
    });
    if !params.required.is_empty() {
        schema["required"] = json!(params.required);
    }
    schema
}

fn param_schema(spec: &ParamSpec, kind: ProviderKind) -> Value {
    // 自由形状的 OBJECT 参数在 Gemini 侧改为承载 JSON 文本的 STRING，validate 会解析回对象
    if kind == ProviderKind::Gemini && spec.kind == ParamType::Object {
        return json!({
            "type": "STRING",
            "description": format!("{} (JSON-encoded object)", spec.description),
        });
    }
    let mut schema = json!({
        "type": type_name(spec.kind.json_name(), kind),
        "description": spec.description,
    });
    if !spec.enum_values.is_empty() {
        schema["enum"] = json!(spec.enum_values);
        if kind == ProviderKind::Gemini {
            schema["format"] = json!("enum");
        }
    }
    if let Some(items) = &spec.items {
        schema["items"] = param_schema(items, kind);
    }
    schema
}

fn type_name(json_name: &str, kind: ProviderKind) -> String {
    match kind {
        ProviderKind::Gemini => json_name.to_uppercase(),
        ProviderKind::Anthropic => json_name.to_string(),
    }
}
