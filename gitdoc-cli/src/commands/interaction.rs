//! Terminal prompts for force pushes, warnings and command input

use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;

use async_trait::async_trait;
use gitdoc_core::{Headless, Interaction};

/// Interaction that asks on the controlling terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalInteraction;

#[async_trait]
impl Interaction for TerminalInteraction {
    async fn confirm_force_push(&self, remote: &str, branch: &str) -> bool {
        let question = format!(
            "Push to {remote}/{branch} was rejected because the remote has changes you don't have locally.\n\
             Force push and overwrite them? [y/N] "
        );
        let answer = tokio::task::spawn_blocking(move || prompt(&question, None))
            .await
            .ok()
            .flatten();
        answer.as_deref().is_some_and(is_yes)
    }

    async fn warn(&self, message: &str, detail: Option<&str>) {
        match detail {
            Some(detail) => eprintln!("warning: {message}\n  {detail}"),
            None => eprintln!("warning: {message}"),
        }
    }
}

/// Terminal interaction when stdin is a terminal, headless otherwise
pub fn for_stdin() -> Arc<dyn Interaction> {
    if std::io::stdin().is_terminal() {
        Arc::new(TerminalInteraction)
    } else {
        Arc::new(Headless)
    }
}

/// Ask for a line on stderr/stdin
///
/// Returns the trimmed answer, `default` for an empty answer, and `None`
/// when stdin is closed.
pub fn prompt(question: &str, default: Option<&str>) -> Option<String> {
    let mut stderr = std::io::stderr();
    match default {
        Some(default) => {
            let _ = write!(stderr, "{question}[{default}] ");
        }
        None => {
            let _ = write!(stderr, "{question}");
        }
    }
    let _ = stderr.flush();

    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(resolve_answer(&line, default)),
    }
}

fn resolve_answer(line: &str, default: Option<&str>) -> String {
    let answer = line.trim();
    match default {
        Some(default) if answer.is_empty() => default.to_string(),
        _ => answer.to_string(),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES\n"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_resolve_answer_uses_default_for_blank() {
        assert_eq!(resolve_answer("\n", Some("Draft")), "Draft");
        assert_eq!(resolve_answer("  Final  \n", Some("Draft")), "Final");
        assert_eq!(resolve_answer("\n", None), "");
    }
}
