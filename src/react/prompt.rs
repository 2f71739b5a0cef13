//! 系统提示词：基础文本 + 当前本地日期时间（模型据此解析“明天”“下周一”等相对日期）

use chrono::{DateTime, Local, TimeZone};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a personal assistant with access to the user's calendar, \
email, tasks, drive, notes and contacts through tools. Use the tools to act instead of describing \
what you would do. Confirm before sending email or deleting anything. Answer concisely, in the \
language the user wrote in.";

#[derive(Debug, Clone)]
pub struct SystemPrompt {
    base: String,
}

impl SystemPrompt {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let base = if base.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            base.trim().to_string()
        };
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// 按当前本地时间渲染
    pub fn render(&self) -> String {
        self.render_at(&Local::now())
    }

    pub fn render_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!(
            "{}\n\nCurrent date and time: {}",
            self.base,
            now.format("%A %Y-%m-%d %H:%M (UTC%:z)")
        )
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_render_appends_date() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let rendered = SystemPrompt::new("Be helpful.").render_at(&now);
        assert!(rendered.starts_with("Be helpful."));
        assert!(rendered.ends_with("Friday 2025-03-14 09:30 (UTC+02:00)"));
    }

    #[test]
    fn test_blank_base_uses_default() {
        assert_eq!(SystemPrompt::new("  \n").base(), DEFAULT_SYSTEM_PROMPT);
    }
}
