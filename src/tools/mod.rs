//! 工具层：规范定义与校验、注册表与分组、路由、schema 翻译、执行边界

pub mod backend;
pub mod catalog;
pub mod definition;
pub mod executor;
pub mod registry;
pub mod router;
pub mod schema;

pub use backend::{OfflineToolBackend, RemoteToolBackend, ToolBackend};
pub use definition::{ParamSpec, ParamType, ParametersSpec, ToolArgs, ToolDefinition};
pub use executor::{error_payload, ToolExecutor};
pub use registry::{ToolGroup, ToolRegistry};
pub use router::{RouteRule, ToolRouter};
pub use schema::{to_provider_schema, ProviderKind};
