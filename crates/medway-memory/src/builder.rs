//! History rendering and token estimation

use medway_core::constants::MEMORY_TOKEN_CHARS_PER_TOKEN;

use crate::message::Message;
use crate::session::WindowMessage;

const USER_PREFIX: &str = "用户: ";
const ASSISTANT_PREFIX: &str = "AI: ";
const SUMMARY_PREFIX: &str = "历史摘要: ";

/// Render rows as `用户: q` / `AI: a` lines
///
/// Checkpoint rows and blank sides are skipped; the result is trimmed.
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::with_capacity(messages.len() * 128);
    for message in messages.iter().filter(|m| !m.is_checkpoint()) {
        push_line(&mut out, USER_PREFIX, &message.query);
        push_line(&mut out, ASSISTANT_PREFIX, &message.answer);
    }
    out.trim().to_string()
}

/// Render `历史摘要: s` followed by the window
pub fn compose_summary_and_recent(summary: &str, window: &[WindowMessage]) -> String {
    let mut out = String::with_capacity(summary.len() + window.len() * 128);
    push_line(&mut out, SUMMARY_PREFIX, summary);
    for message in window {
        let prefix = if message.role.trim().eq_ignore_ascii_case("user") {
            USER_PREFIX
        } else {
            ASSISTANT_PREFIX
        };
        push_line(&mut out, prefix, &message.content);
    }
    out.trim().to_string()
}

/// Last `recent_turns` non-checkpoint rows as role/content pairs
pub fn recent_window(messages: &[Message], recent_turns: usize) -> Vec<WindowMessage> {
    let rows: Vec<&Message> = messages.iter().filter(|m| !m.is_checkpoint()).collect();
    let start = rows.len().saturating_sub(recent_turns);

    let mut window = Vec::with_capacity((rows.len() - start) * 2);
    for message in &rows[start..] {
        let query = message.query.trim();
        if !query.is_empty() {
            window.push(WindowMessage::user(query));
        }
        let answer = message.answer.trim();
        if !answer.is_empty() {
            window.push(WindowMessage::assistant(answer));
        }
    }
    window
}

/// Estimated token count: codepoints / 4, at least 1 for non-blank text
///
/// A heuristic; CJK text runs closer to one token per character, so this
/// under-counts Chinese dialogue.
pub fn estimate_tokens(text: &str) -> usize {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }
    (text.chars().count() / MEMORY_TOKEN_CHARS_PER_TOKEN).max(1)
}

fn push_line(out: &mut String, prefix: &str, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    out.push_str(prefix);
    out.push_str(text);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CHECKPOINT_QUERY;

    fn rows() -> Vec<Message> {
        vec![
            Message::new("1", "c", "头痛", " 多久了？ "),
            Message::new("2", "c", CHECKPOINT_QUERY, "历史摘要: 头痛"),
            Message::new("3", "c", "三天", ""),
        ]
    }

    #[test]
    fn test_render_transcript() {
        assert_eq!(render_transcript(&rows()), "用户: 头痛\nAI: 多久了？\n用户: 三天");
        assert_eq!(render_transcript(&[]), "");
    }

    #[test]
    fn test_compose_summary_and_recent() {
        let window = vec![
            WindowMessage::user("还在痛"),
            WindowMessage::assistant("建议就医"),
            WindowMessage::user("  "),
        ];
        assert_eq!(
            compose_summary_and_recent("头痛三天", &window),
            "历史摘要: 头痛三天\n用户: 还在痛\nAI: 建议就医"
        );
        assert_eq!(compose_summary_and_recent("", &[]), "");
    }

    #[test]
    fn test_recent_window_skips_checkpoints() {
        let window = recent_window(&rows(), 2);
        assert_eq!(
            window,
            vec![
                WindowMessage::user("头痛"),
                WindowMessage::assistant("多久了？"),
                WindowMessage::user("三天"),
            ]
        );
        assert_eq!(recent_window(&rows(), 1), vec![WindowMessage::user("三天")]);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("   "), 0);
        assert_eq!(estimate_tokens("ab"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("头痛三天了吗"), 1);
    }
}
