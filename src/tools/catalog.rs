//! 内置工具目录
//!
//! 助手可调用的全部操作：日历、邮件、任务、云盘、笔记库（vault）、联系人、子智能体。
//! 这里只声明名称、描述与参数；具体集成在 ToolBackend 之后，由外部服务实现。

use crate::tools::router::RouteRule;
use crate::tools::{ParamSpec, ToolDefinition, ToolGroup, ToolRegistry};

/// 未命中任何路由规则时使用的分组（覆盖最常见的请求）
pub const DEFAULT_GROUPS: &[&str] = &["calendar", "tasks", "vault"];

fn definitions() -> Vec<ToolDefinition> {
    vec![
        // 日历
        ToolDefinition::new(
            "list_events",
            "List calendar events between two dates. Use for questions about the schedule, agenda or availability.",
        )
        .required("time_min", ParamSpec::string("Start of the range, ISO 8601 date or datetime"))
        .required("time_max", ParamSpec::string("End of the range, ISO 8601 date or datetime"))
        .optional("calendar_id", ParamSpec::string("Calendar id, defaults to the primary calendar"))
        .optional("query", ParamSpec::string("Free-text filter on event titles and descriptions")),
        ToolDefinition::new("create_event", "Create a calendar event.")
            .required("summary", ParamSpec::string("Event title"))
            .required("start", ParamSpec::string("Start, ISO 8601 datetime (or date for all-day events)"))
            .required("end", ParamSpec::string("End, ISO 8601 datetime (or date for all-day events)"))
            .optional("description", ParamSpec::string("Event notes"))
            .optional("location", ParamSpec::string("Physical location or meeting link"))
            .optional(
                "attendees",
                ParamSpec::array("Attendee email addresses", ParamSpec::string("Email address")),
            )
            .optional("calendar_id", ParamSpec::string("Calendar id, defaults to the primary calendar")),
        ToolDefinition::new("update_event", "Change fields of an existing calendar event.")
            .required("event_id", ParamSpec::string("Id returned by list_events"))
            .optional("summary", ParamSpec::string("New title"))
            .optional("start", ParamSpec::string("New start, ISO 8601"))
            .optional("end", ParamSpec::string("New end, ISO 8601"))
            .optional("description", ParamSpec::string("New notes"))
            .optional("location", ParamSpec::string("New location")),
        ToolDefinition::new("delete_event", "Delete a calendar event.")
            .required("event_id", ParamSpec::string("Id returned by list_events")),
        // 邮件
        ToolDefinition::new(
            "search_emails",
            "Search the mailbox using mail search syntax (from:, subject:, is:unread, newer_than:2d ...).",
        )
        .required("query", ParamSpec::string("Search query"))
        .optional("max_results", ParamSpec::integer("Maximum messages to return, default 10")),
        ToolDefinition::new("read_email", "Read the full body of one email.")
            .required("message_id", ParamSpec::string("Id returned by search_emails")),
        ToolDefinition::new("send_email", "Send an email on behalf of the user.")
            .required("to", ParamSpec::array("Recipient addresses", ParamSpec::string("Email address")))
            .required("subject", ParamSpec::string("Subject line"))
            .required("body", ParamSpec::string("Plain-text body"))
            .optional("cc", ParamSpec::array("CC addresses", ParamSpec::string("Email address")))
            .optional("reply_to_message_id", ParamSpec::string("Set to reply within an existing thread")),
        ToolDefinition::new("create_draft", "Save an email draft without sending it.")
            .required("to", ParamSpec::array("Recipient addresses", ParamSpec::string("Email address")))
            .required("subject", ParamSpec::string("Subject line"))
            .required("body", ParamSpec::string("Plain-text body")),
        // 任务
        ToolDefinition::new("list_tasks", "List tasks from the user's task lists.")
            .optional("list_id", ParamSpec::string("Task list id, defaults to the main list"))
            .optional("show_completed", ParamSpec::boolean("Include completed tasks")),
        ToolDefinition::new("create_task", "Create a task or reminder.")
            .required("title", ParamSpec::string("Task title"))
            .optional("notes", ParamSpec::string("Details"))
            .optional("due", ParamSpec::string("Due date, ISO 8601"))
            .optional("list_id", ParamSpec::string("Task list id, defaults to the main list")),
        ToolDefinition::new("complete_task", "Mark a task as done.")
            .required("task_id", ParamSpec::string("Id returned by list_tasks"))
            .optional("list_id", ParamSpec::string("Task list id, defaults to the main list")),
        // 云盘
        ToolDefinition::new("search_drive", "Search files in cloud storage by name or content.")
            .required("query", ParamSpec::string("Search text"))
            .optional("max_results", ParamSpec::integer("Maximum files to return, default 10")),
        ToolDefinition::new("read_drive_file", "Read the text content of a cloud storage file.")
            .required("file_id", ParamSpec::string("Id returned by search_drive")),
        // 笔记库
        ToolDefinition::new("search_notes", "Full-text search across the personal notes vault.")
            .required("query", ParamSpec::string("Search text")),
        ToolDefinition::new("read_note", "Read a note from the vault.")
            .required("path", ParamSpec::string("Note path relative to the vault root, e.g. 'Projects/ideas.md'")),
        ToolDefinition::new("write_note", "Create, overwrite or append to a note in the vault.")
            .required("path", ParamSpec::string("Note path relative to the vault root"))
            .required("content", ParamSpec::string("Markdown content"))
            .optional(
                "mode",
                ParamSpec::string("How to write the content").with_enum(&["overwrite", "append"]),
            ),
        ToolDefinition::new("list_notes", "List notes in a vault folder.")
            .optional("folder", ParamSpec::string("Folder relative to the vault root, defaults to the root")),
        // 联系人
        ToolDefinition::new("search_contacts", "Look up people in the user's contacts by name, email or phone.")
            .required("query", ParamSpec::string("Name, email or phone fragment")),
        // 子智能体
        ToolDefinition::new("list_agents", "List the background agents that can be triggered."),
        ToolDefinition::new("run_agent", "Trigger a background agent (e.g. daily briefing, inbox triage).")
            .required("agent", ParamSpec::string("Agent name from list_agents"))
            .optional("input", ParamSpec::object("Agent-specific input payload")),
    ]
}

fn groups() -> Vec<ToolGroup> {
    vec![
        ToolGroup::new(
            "calendar",
            &["list_events", "create_event", "update_event", "delete_event", "search_contacts"],
        ),
        ToolGroup::new(
            "email",
            &["search_emails", "read_email", "send_email", "create_draft", "search_contacts"],
        ),
        ToolGroup::new("tasks", &["list_tasks", "create_task", "complete_task"]),
        ToolGroup::new("drive", &["search_drive", "read_drive_file"]),
        ToolGroup::new("vault", &["search_notes", "read_note", "write_note", "list_notes"]),
        ToolGroup::new("contacts", &["search_contacts"]),
        ToolGroup::new("agents", &["list_agents", "run_agent"]),
    ]
}

/// 路由规则表：英文关键词与常见西语关键词，大小写不敏感
pub fn default_rules() -> Vec<RouteRule> {
    let table: &[(&str, &[&str])] = &[
        (
            r"\b(calendar|calendario|schedule|agenda|meeting|reuni[oó]n|event|evento|appointment|cita|busy|free|available|tomorrow|today|ma[ñn]ana|hoy)\b",
            &["calendar"],
        ),
        (
            r"\b(e-?mails?|correos?|mail|inbox|bandeja|send|enviar|reply|responder|draft|borrador|unread)\b",
            &["email"],
        ),
        (
            r"\b(tasks?|tareas?|to-?do|remind|reminder|recordatorio|recu[eé]rdame|pending|pendientes?)\b",
            &["tasks"],
        ),
        (
            r"\b(drive|files?|archivos?|documents?|documentos?|pdf|spreadsheet|docs?)\b",
            &["drive"],
        ),
        (
            r"\b(notes?|notas?|vault|journal|diario|obsidian|write down|apunta)\b",
            &["vault"],
        ),
        (
            r"\b(contacts?|contactos?|phone|tel[eé]fono|email address|who is|qui[eé]n es)\b",
            &["contacts"],
        ),
        (
            r"\b(agents?|agentes?|briefing|resumen diario|triage|automation|automatizaci[oó]n)\b",
            &["agents"],
        ),
        (r"\b(invite|invitar|invitation)\b", &["calendar", "email"]),
    ];

    table
        .iter()
        .filter_map(|(pattern, groups)| match RouteRule::new(pattern, groups) {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::error!(pattern = %pattern, "invalid route pattern: {}", e);
                None
            }
        })
        .collect()
}

/// 构建内置注册表：全部工具定义 + 分组
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for def in definitions() {
        registry.register(def);
    }
    for group in groups() {
        registry.add_group(group);
    }
    registry
}
