//! Prompt construction for summaries and tutoring chat.

use crate::models::conversation::ChatMessage;

const SUMMARY_SYSTEM_PROMPT: &str =
    "你是一个专业的学习助手，擅长为各种学习资料生成清晰、结构化的摘要。";

const CHAT_SYSTEM_PROMPT: &str =
    "你是一个专业的学习助手，能够帮助学生理解学习资料、解答问题、提供学习建议。";

/// Closing line of every summary prompt; replies are expected in Chinese.
const ANSWER_IN_CHINESE: &str = "请用中文回答：";

/// Number of history messages forwarded with each chat turn.
pub const CHAT_CONTEXT_MESSAGES: usize = 10;

/// What kind of material is being summarised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Code,
    Video,
    Text,
}

impl SummaryKind {
    /// `code` and `video` are recognised; everything else is plain text.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "code" => Self::Code,
            "video" => Self::Video,
            _ => Self::Text,
        }
    }
}

/// System + user messages asking for a structured summary of `content`.
pub fn summary_messages(content: &str, kind: SummaryKind) -> Vec<ChatMessage> {
    let (instructions, label) = match kind {
        SummaryKind::Code => (
            "请为以下代码生成一个详细的摘要，包括：\n\
             1. 代码的主要功能\n\
             2. 使用的关键技术/库\n\
             3. 代码结构说明\n\
             4. 关键算法或逻辑\n\
             5. 可能的改进建议",
            "代码",
        ),
        SummaryKind::Video => (
            "请为以下视频字幕/文本内容生成摘要，包括：\n\
             1. 视频主题和主要内容\n\
             2. 关键知识点\n\
             3. 重要概念解释\n\
             4. 学习要点总结",
            "视频内容",
        ),
        SummaryKind::Text => (
            "请为以下学习资料生成一个详细的摘要，包括：\n\
             1. 主要内容概述\n\
             2. 核心知识点\n\
             3. 重要概念\n\
             4. 学习要点",
            "内容",
        ),
    };
    let prompt = format!(
        "{}\n\n{}：\n{}\n\n{}",
        instructions, label, content, ANSWER_IN_CHINESE
    );

    vec![
        ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ]
}

/// System prompt for a chat turn, optionally grounded in the material the
/// student is looking at.
pub fn chat_system_prompt(context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!(
            "{}\n\n当前学习资料的上下文信息：\n{}",
            CHAT_SYSTEM_PROMPT, context
        ),
        None => CHAT_SYSTEM_PROMPT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::conversation::Role;

    #[test]
    fn summary_kind_defaults_to_text() {
        assert_eq!(SummaryKind::parse("CODE"), SummaryKind::Code);
        assert_eq!(SummaryKind::parse("video"), SummaryKind::Video);
        assert_eq!(SummaryKind::parse("pdf"), SummaryKind::Text);
    }

    #[test]
    fn summary_prompt_embeds_content() {
        let messages = summary_messages("fn main() {}", SummaryKind::Code);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains("fn main() {}"));
        assert!(messages[1].content.contains("代码的主要功能"));
        assert!(messages[1].content.ends_with(ANSWER_IN_CHINESE));
        assert!(messages[0].content.starts_with("你是一个专业的学习助手"));
    }

    #[test]
    fn every_summary_kind_asks_for_chinese() {
        for kind in [SummaryKind::Code, SummaryKind::Video, SummaryKind::Text] {
            let messages = summary_messages("material", kind);
            assert!(messages[1].content.contains("\nmaterial\n"));
            assert!(messages[1].content.ends_with(ANSWER_IN_CHINESE));
        }
    }

    #[test]
    fn chat_prompt_appends_context_when_present() {
        assert_eq!(chat_system_prompt(None), CHAT_SYSTEM_PROMPT);
        assert_eq!(chat_system_prompt(Some("   ")), CHAT_SYSTEM_PROMPT);
        let prompt = chat_system_prompt(Some("chapter 3"));
        assert!(prompt.starts_with(CHAT_SYSTEM_PROMPT));
        assert!(prompt.contains("当前学习资料的上下文信息"));
        assert!(prompt.ends_with("chapter 3"));
    }
}
