//! Terminal output: tables, transcripts and the live reply printer.

use std::io::Write;

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use console::style;
use parlance_client::{ClientError, StreamObserver};
use parlance_protocol::{
    Branch, CompletePayload, MemoryNotice, Message, MessageRole, RoutingDecision, SessionSummary,
    ToolInvocation, ToolResult,
};

pub fn sessions_table(sessions: &[SessionSummary]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["", "Session", "Title", "Messages", "Last activity"]);

    for session in sessions {
        let mut flags = String::new();
        if session.is_pinned {
            flags.push('📌');
        }
        if session.is_favorite {
            flags.push('★');
        }
        table.add_row(vec![
            Cell::new(flags),
            Cell::new(&session.id),
            Cell::new(session.display_title()),
            Cell::new(session.message_count),
            Cell::new(session.last_activity.as_deref().unwrap_or("-")),
        ]);
    }
    table
}

pub fn branches_table(branches: &[Branch]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["", "Branch", "Name", "Forked at", "Messages"]);

    for branch in branches {
        table.add_row(vec![
            Cell::new(if branch.is_active { "●" } else { "" }),
            Cell::new(&branch.id),
            Cell::new(branch.name.as_deref().unwrap_or("-")),
            Cell::new(&branch.parent_message_id),
            Cell::new(branch.message_count),
        ]);
    }
    table
}

pub fn transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let who = match message.role {
            MessageRole::User => style("you").cyan().bold(),
            MessageRole::Assistant => style("assistant").green().bold(),
        };
        let edited = if message.is_edited { " (edited)" } else { "" };
        out.push_str(&format!(
            "{} {}{}\n{}\n",
            who,
            style(&message.id).dim(),
            style(edited).dim(),
            message.content
        ));
        for result in message.tool_results() {
            out.push_str(&format!("  {}\n", tool_line(&result)));
        }
        out.push('\n');
    }
    out
}

fn tool_line(result: &ToolResult) -> String {
    match &result.error {
        Some(error) => format!("{} {} failed: {}", style("✗").red(), result.name, error),
        None => format!("{} {}", style("✓").green(), style(&result.name).dim()),
    }
}

/// Prints a streaming reply as it arrives. Side-channel notes go to stderr.
#[derive(Default)]
pub struct LivePrinter {
    pub verbose: bool,
    printed_any: bool,
    announced_tools: Vec<String>,
}

impl LivePrinter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Default::default()
        }
    }

    fn note(&self, text: String) {
        eprintln!("{}", style(text).dim());
    }
}

impl StreamObserver for LivePrinter {
    fn on_chunk(&mut self, delta: &str, _accumulated: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{delta}");
        let _ = stdout.flush();
        self.printed_any = true;
    }

    fn on_complete(&mut self, payload: &CompletePayload) {
        if !self.printed_any {
            if let Some(reply) = &payload.reply {
                print!("{reply}");
            }
        }
        println!();
        if self.verbose {
            if let Some(model) = &payload.model {
                self.note(format!("model: {model}"));
            }
            if let Some(total) = payload.usage.as_ref().and_then(|u| u.total_tokens) {
                self.note(format!("tokens: {total}"));
            }
        }
    }

    fn on_error(&mut self, error: &ClientError) {
        if self.printed_any {
            println!();
        }
        eprintln!("{} {}", style("error:").red().bold(), error.user_message());
    }

    fn on_session_created(&mut self, session_id: &str) {
        self.note(format!("session: {session_id}"));
    }

    fn on_memories(&mut self, memories: &[MemoryNotice]) {
        if self.verbose {
            for memory in memories {
                self.note(format!("remembered: {}", memory.content));
            }
        }
    }

    fn on_routing(&mut self, routing: &RoutingDecision) {
        if self.verbose {
            let reason = routing.reason.as_deref().unwrap_or("");
            self.note(format!("routed to {} {}", routing.model, reason));
        }
    }

    fn on_tool_call(&mut self, call: &ToolInvocation) {
        // Streamed calls repeat once per argument fragment.
        let key = call.id.clone().unwrap_or_else(|| call.name.clone());
        if self.announced_tools.contains(&key) {
            return;
        }
        self.announced_tools.push(key);
        self.note(format!("⚙ {}", call.name));
    }

    fn on_tool_result(&mut self, result: &ToolResult) {
        self.note(tool_line(result));
    }

    fn on_notice(&mut self, message: &str, model: Option<&str>) {
        if self.verbose {
            match model {
                Some(model) => self.note(format!("{message} ({model})")),
                None => self.note(message.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_protocol::SessionStatus;

    fn summary(id: &str, title: Option<&str>) -> SessionSummary {
        SessionSummary {
            id: id.to_string(),
            title: title.map(str::to_string),
            description: None,
            category: "general".to_string(),
            tags: vec![],
            status: SessionStatus::Active,
            is_pinned: true,
            is_favorite: false,
            message_count: 3,
            last_activity: None,
            created_at: None,
            active_branch_id: None,
            branches: vec![],
        }
    }

    #[test]
    fn sessions_table_falls_back_to_id() {
        let table = sessions_table(&[summary("s1", None), summary("s2", Some("Trip"))]);
        let rendered = table.to_string();
        assert!(rendered.contains("s1"));
        assert!(rendered.contains("Trip"));
        assert_eq!(table.row_iter().count(), 2);
    }

    #[test]
    fn transcript_includes_every_message() {
        let messages = vec![
            message("u1", MessageRole::User, "Hi", None),
            message(
                "m1",
                MessageRole::Assistant,
                "Hello!",
                Some(serde_json::json!({
                    "tool_results": [{"name": "get_weather", "result": "sunny"}]
                })),
            ),
        ];
        let text = console::strip_ansi_codes(&transcript(&messages)).to_string();
        assert!(text.contains("Hi"));
        assert!(text.contains("Hello!"));
        assert!(text.contains("get_weather"));
    }

    fn message(
        id: &str,
        role: MessageRole,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Message {
        Message {
            id: id.into(),
            role,
            content: content.into(),
            created_at: "2025-01-01T00:00:00".into(),
            attachments: vec![],
            reactions: None,
            parent_message_id: None,
            branch_id: None,
            is_edited: false,
            metadata,
        }
    }
}
