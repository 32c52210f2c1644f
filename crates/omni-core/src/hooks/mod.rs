//! Hook execution framework.
//!
//! Hooks are short-lived handlers invoked around an editing session: at
//! session start, when the user submits a prompt, and before/after a tool
//! runs. Each handler is pure (no process I/O); a thin CLI binary reads an
//! event record from standard input, calls the matching handler through
//! [`execute_hook`], and turns the resulting [`HookOutcome`] into an exit
//! code and printed message.
//!
//! Every handler must fail open: [`execute_hook`] treats a deadline overrun
//! or a panic inside the handler the same way, returning an allowing
//! outcome rather than letting the caller block or crash.

pub mod intent;
pub mod quality;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// An event record read from standard input by the hook binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "hook_event_name", rename_all = "PascalCase")]
pub enum HookEvent {
    /// Fired once when an editing session begins.
    SessionStart(SessionStartEvent),
    /// Fired when the user submits a prompt, before the model sees it.
    UserPromptSubmit(UserPromptSubmitEvent),
    /// Fired before a write tool runs, with the proposed edit.
    PreToolUse(PreToolUseEvent),
    /// Fired after a write tool has run, with the content actually written.
    PostToolUse(PostToolUseEvent),
}

/// Parameters for [`HookEvent::SessionStart`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartEvent {
    /// Working directory the session started in.
    pub cwd: String,
}

/// Parameters for [`HookEvent::UserPromptSubmit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPromptSubmitEvent {
    /// The user's raw prompt text.
    pub prompt: String,
}

/// Parameters for [`HookEvent::PreToolUse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreToolUseEvent {
    /// Name of the tool about to run (e.g. `"Edit"`, `"Write"`).
    pub tool_name: String,
    /// Path of the file the tool would write, if any.
    pub file_path: Option<String>,
    /// The content that would be written.
    pub proposed_content: String,
}

/// Parameters for [`HookEvent::PostToolUse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostToolUseEvent {
    /// Name of the tool that ran.
    pub tool_name: String,
    /// Path of the file that was written, if any.
    pub file_path: Option<String>,
    /// The content that was actually written.
    pub written_content: String,
}

/// Result of running a hook: an exit-code convention (0 allow, 1 warn, 2
/// block), an optional message shown to the caller, and optional extra
/// context to inject (used by `SessionStart`/`UserPromptSubmit`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HookOutcome {
    /// 0 = allow, 1 = warn (non-blocking), 2 = block.
    pub exit_code: i32,
    /// Human-readable message, printed to the tool caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Extra context to prepend to the model's input, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
    /// Set by `PostToolUse` to request a single-file re-index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reindex_path: Option<String>,
}

impl HookOutcome {
    /// Allow silently: exit 0, no message. The fail-open default.
    pub fn allow() -> Self {
        Self::default()
    }

    /// Allow, but surface a non-blocking warning.
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Block the operation with an explanatory message.
    pub fn block(message: impl Into<String>) -> Self {
        Self {
            exit_code: 2,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Run `compute` on a blocking worker, enforcing `deadline`. Any overrun or
/// panic inside `compute` resolves to [`HookOutcome::allow`] — the fail-open
/// contract every hook must honour.
pub async fn execute_hook<F>(compute: F, deadline: Duration) -> HookOutcome
where
    F: FnOnce() -> HookOutcome + Send + 'static,
{
    match tokio::time::timeout(deadline, tokio::task::spawn_blocking(compute)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => {
            tracing::warn!(error = %join_error, "hook task panicked; failing open");
            HookOutcome::allow()
        }
        Err(_elapsed) => {
            tracing::warn!(?deadline, "hook exceeded its deadline; failing open");
            HookOutcome::allow()
        }
    }
}

/// `SessionStart`: emit session context (VCS summary, memory-first
/// reminder). Always allows; this event has no exit-code semantics beyond 0.
pub fn handle_session_start(event: &SessionStartEvent) -> HookOutcome {
    let vcs_summary = describe_vcs_state(&event.cwd);
    let context = format!(
        "{vcs_summary}\nBefore writing new code, search the existing index for related \
         functionality — prefer extending what's there over duplicating it."
    );
    HookOutcome {
        exit_code: 0,
        message: None,
        additional_context: Some(context),
        reindex_path: None,
    }
}

fn describe_vcs_state(cwd: &str) -> String {
    let git_dir = std::path::Path::new(cwd).join(".git");
    if git_dir.is_dir() {
        format!("Working in a git repository at {cwd}.")
    } else {
        format!("Working in {cwd} (no git repository detected).")
    }
}

/// `UserPromptSubmit`: detect planning intent and, when found, prepend
/// planning guidelines to the model's context.
pub fn handle_user_prompt_submit(event: &UserPromptSubmitEvent) -> HookOutcome {
    let confidence = intent::detect_planning_intent(&event.prompt);
    if confidence < intent::PLANNING_INTENT_THRESHOLD {
        return HookOutcome::allow();
    }

    let guidance = "Planning intent detected. Before proposing tasks: search the existing \
        codebase for related work, break the goal into independently verifiable tasks, and \
        note explicit acceptance criteria for each.";
    HookOutcome {
        exit_code: 0,
        message: None,
        additional_context: Some(guidance.to_string()),
        reindex_path: None,
    }
}

/// `PreToolUse`: run the fast quality-rule catalog against the proposed
/// edit. Exit 0 allows, 1 warns, 2 blocks on a critical/high finding.
pub fn handle_pre_tool_use(event: &PreToolUseEvent) -> HookOutcome {
    let findings = quality::scan(&event.proposed_content);
    quality::outcome_from_findings(&findings, true)
}

/// `PostToolUse`: run the same fast catalog against the written content,
/// but only ever warn (never block), and request a single-file re-index.
pub fn handle_post_tool_use(event: &PostToolUseEvent) -> HookOutcome {
    let findings = quality::scan(&event.written_content);
    let mut outcome = quality::outcome_from_findings(&findings, false);
    outcome.reindex_path = event.file_path.clone();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_hook_returns_result_within_deadline() {
        let outcome = execute_hook(|| HookOutcome::warn("slow but fine"), Duration::from_secs(1)).await;
        assert_eq!(outcome.exit_code, 1);
    }

    #[tokio::test]
    async fn test_execute_hook_fails_open_on_deadline_overrun() {
        let outcome = execute_hook(
            || {
                std::thread::sleep(Duration::from_millis(50));
                HookOutcome::block("should never surface")
            },
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn test_execute_hook_fails_open_on_panic() {
        let outcome = execute_hook(
            || panic!("simulated handler bug"),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn test_session_start_always_allows() {
        let event = SessionStartEvent { cwd: "/tmp".to_string() };
        let outcome = handle_session_start(&event);
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.additional_context.is_some());
    }

    #[test]
    fn test_pre_tool_use_blocks_on_critical_pattern() {
        let event = PreToolUseEvent {
            tool_name: "Edit".to_string(),
            file_path: Some("src/lib.rs".to_string()),
            proposed_content: "let password = \"hunter2\"; // hardcoded secret".to_string(),
        };
        let outcome = handle_pre_tool_use(&event);
        assert_eq!(outcome.exit_code, 2);
    }

    #[test]
    fn test_post_tool_use_never_blocks() {
        let event = PostToolUseEvent {
            tool_name: "Write".to_string(),
            file_path: Some("src/lib.rs".to_string()),
            written_content: "let password = \"hunter2\";".to_string(),
        };
        let outcome = handle_post_tool_use(&event);
        assert_ne!(outcome.exit_code, 2);
        assert_eq!(outcome.reindex_path.as_deref(), Some("src/lib.rs"));
    }
}
