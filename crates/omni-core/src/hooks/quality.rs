//! Fast lexical quality-rule catalog run by `PreToolUse`/`PostToolUse`.
//!
//! Distinct from the plan-mode guardrail catalog in [`crate::guardrail`]:
//! these rules scan raw proposed file content rather than plan tasks, and
//! are cheap enough to run synchronously inside a 300ms hook budget.

use crate::types::Severity;

/// A single quality finding against proposed or written content.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityFinding {
    /// Rule that produced the finding.
    pub rule_id: &'static str,
    /// Severity of the finding.
    pub severity: Severity,
    /// Human-readable explanation.
    pub message: String,
}

struct Pattern {
    rule_id: &'static str,
    severity: Severity,
    markers: &'static [&'static str],
    message: &'static str,
}

const PATTERNS: &[Pattern] = &[
    Pattern {
        rule_id: "hardcoded-secret",
        severity: Severity::Critical,
        markers: &["password = \"", "api_key = \"", "secret = \"", "aws_secret_access_key"],
        message: "content looks like it hardcodes a secret",
    },
    Pattern {
        rule_id: "debug-leftover",
        severity: Severity::Low,
        markers: &["console.log(", "dbg!(", "println!(\"debug", "debugger;"],
        message: "debug statement left in the proposed content",
    },
    Pattern {
        rule_id: "todo-marker",
        severity: Severity::Low,
        markers: &["todo!(", "unimplemented!("],
        message: "unfinished implementation marker present",
    },
];

/// Scan `content` against the fast catalog, returning every match.
pub fn scan(content: &str) -> Vec<QualityFinding> {
    let lower = content.to_lowercase();
    PATTERNS
        .iter()
        .filter(|pattern| pattern.markers.iter().any(|m| lower.contains(m)))
        .map(|pattern| QualityFinding {
            rule_id: pattern.rule_id,
            severity: pattern.severity,
            message: pattern.message.to_string(),
        })
        .collect()
}

/// Turn a set of findings into a [`crate::hooks::HookOutcome`]. When
/// `may_block` is true, a Critical or High finding blocks (exit 2);
/// otherwise the worst finding only ever warns (exit 1).
pub fn outcome_from_findings(
    findings: &[QualityFinding],
    may_block: bool,
) -> crate::hooks::HookOutcome {
    let Some(worst) = findings.iter().max_by_key(|f| f.severity) else {
        return crate::hooks::HookOutcome::allow();
    };

    let summary = findings
        .iter()
        .map(|f| format!("[{}] {}", f.rule_id, f.message))
        .collect::<Vec<_>>()
        .join("; ");

    if may_block && worst.severity >= Severity::High {
        crate::hooks::HookOutcome::block(summary)
    } else {
        crate::hooks::HookOutcome::warn(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_detects_hardcoded_secret() {
        let findings = scan("let password = \"hunter2\";");
        assert!(findings.iter().any(|f| f.rule_id == "hardcoded-secret"));
    }

    #[test]
    fn test_scan_detects_debug_leftover() {
        let findings = scan("console.log('here')");
        assert!(findings.iter().any(|f| f.rule_id == "debug-leftover"));
    }

    #[test]
    fn test_scan_clean_content_has_no_findings() {
        let findings = scan("fn add(a: i32, b: i32) -> i32 { a + b }");
        assert!(findings.is_empty());
    }

    #[test]
    fn test_outcome_blocks_on_critical_when_may_block() {
        let findings = scan("let api_key = \"sk-abc\";");
        let outcome = outcome_from_findings(&findings, true);
        assert_eq!(outcome.exit_code, 2);
    }

    #[test]
    fn test_outcome_only_warns_when_may_not_block() {
        let findings = scan("let api_key = \"sk-abc\";");
        let outcome = outcome_from_findings(&findings, false);
        assert_eq!(outcome.exit_code, 1);
    }
}
