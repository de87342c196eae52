//! Plain-text rendering for terminal output.

use console::Style;

use crate::comm::SessionStatus;
use crate::dispatch::{DispatchReport, DispatchResult};
use crate::session::HealthStatus;
use crate::types::{Conversation, Provider};

const CONVERSATION_RULE: &str = "========================================";

fn header_style(provider: Provider) -> Style {
    match provider {
        Provider::Codex => Style::new().blue().bold(),
        Provider::Gemini => Style::new().green().bold(),
    }
}

/// One section per provider: `==== CODEX (1.2s) ====` followed by the reply.
pub fn dispatch_report(report: &DispatchReport) -> String {
    report
        .iter()
        .map(dispatch_section)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn dispatch_section(result: &DispatchResult) -> String {
    let header = format!(
        "==== {} ({:.1}s) ====",
        result.provider.as_str().to_uppercase(),
        result.elapsed_seconds
    );
    let body = match (&result.reply, &result.error) {
        (Some(reply), _) => reply.clone(),
        (None, Some(error)) => Style::new().red().apply_to(format!("Error: {error}")).to_string(),
        (None, None) if result.sent => "Sent".to_string(),
        (None, None) => String::new(),
    };
    format!("{}\n{body}", header_style(result.provider).apply_to(header))
}

/// Question/answer pairs separated by a rule.
pub fn conversations(items: &[Conversation]) -> String {
    items
        .iter()
        .map(|item| format!("Q: {}\nA: {}", item.question, item.answer))
        .collect::<Vec<_>>()
        .join(&format!("\n{CONVERSATION_RULE}\n"))
}

/// `✓ codex: Session healthy` style line.
pub fn health(provider: Provider, status: &HealthStatus) -> String {
    if status.healthy {
        format!("{} {}: {}", Style::new().green().apply_to("✓"), provider, status.status)
    } else {
        format!("{} {}: {}", Style::new().red().apply_to("✗"), provider, status.status)
    }
}

/// Key/value listing of a session.
pub fn session_status(status: &SessionStatus) -> String {
    let dash = || "-".to_string();
    let rows = [
        ("provider", status.provider.to_string()),
        ("session_id", status.session_id.clone().unwrap_or_else(dash)),
        (
            "runtime_dir",
            status
                .runtime_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(dash),
        ),
        ("terminal", status.terminal.clone().unwrap_or_else(dash)),
        ("pane_id", status.pane_id.clone().unwrap_or_else(dash)),
        ("channel", status.channel.clone()),
        (
            "log",
            status
                .log_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(dash),
        ),
        ("healthy", status.healthy.to_string()),
        ("status", status.status.clone()),
    ];

    rows.iter()
        .map(|(key, value)| format!("{:<12} {value}", format!("{key}:")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn result(provider: Provider, reply: Option<&str>, error: Option<&str>) -> DispatchResult {
        DispatchResult {
            provider,
            success: reply.is_some(),
            reply: reply.map(str::to_string),
            error: error.map(str::to_string),
            sent: false,
            elapsed_seconds: 1.24,
        }
    }

    #[test]
    fn test_dispatch_sections_in_provider_order() {
        console::set_colors_enabled(false);
        let mut results = BTreeMap::new();
        results.insert(Provider::Gemini, result(Provider::Gemini, None, Some("Timeout waiting for reply")));
        results.insert(Provider::Codex, result(Provider::Codex, Some("four"), None));
        let report = DispatchReport {
            results,
            elapsed_seconds: 1.3,
        };

        let text = dispatch_report(&report);
        assert_eq!(
            text,
            "==== CODEX (1.2s) ====\nfour\n\n==== GEMINI (1.2s) ====\nError: Timeout waiting for reply"
        );
    }

    #[test]
    fn test_conversations() {
        let items = vec![
            Conversation {
                question: "q1".into(),
                answer: "a1".into(),
            },
            Conversation {
                question: "q2".into(),
                answer: "a2".into(),
            },
        ];
        let text = conversations(&items);
        assert_eq!(text, format!("Q: q1\nA: a1\n{}\nQ: q2\nA: a2", "=".repeat(40)));
    }
}
