//! Built-in guardrail rule catalog.

use serde_json::json;

use crate::types::{PlanRevision, PlanValidationFinding, RevisionType, RuleCategory, Severity, Task};

use super::{Rule, ValidationContext};

/// The five built-in rules, in catalog order.
pub fn default_catalog() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(TestCoverageRule),
        Box::new(DocumentationCoverageRule),
        Box::new(DuplicateDetectionRule),
        Box::new(ArchitecturalConsistencyRule),
        Box::new(PerformancePatternRule),
    ]
}

/// Words that mark a task as trivial enough to be exempt from
/// test/documentation coverage requirements.
const TRIVIAL_MARKERS: &[&str] = &["typo", "rename", "doc-only", "docs-only", "comment"];

fn is_trivial(task: &Task) -> bool {
    let haystack = format!("{} {}", task.title, task.description).to_lowercase();
    TRIVIAL_MARKERS.iter().any(|m| haystack.contains(m)) || task.tags.iter().any(|t| t == "trivial")
}

fn is_feature_like(task: &Task) -> bool {
    if is_trivial(task) {
        return false;
    }
    let haystack = format!("{} {}", task.title, task.description).to_lowercase();
    const FEATURE_MARKERS: &[&str] = &["implement", "add", "feature", "build", "support"];
    task.tags.iter().any(|t| t == "feature") || FEATURE_MARKERS.iter().any(|m| haystack.contains(m))
}

fn has_linked_task_matching(ctx: &ValidationContext<'_>, task: &Task, markers: &[&str]) -> bool {
    ctx.plan.tasks.iter().any(|other| {
        if other.id == task.id {
            return false;
        }
        let is_linked = other.dependencies.iter().any(|d| d == &task.id)
            || task.dependencies.iter().any(|d| d == &other.id);
        if !is_linked {
            return false;
        }
        let haystack = format!("{} {}", other.title, other.description).to_lowercase();
        markers.iter().any(|m| haystack.contains(m))
    })
}

/// Feature-like tasks without a linked test task.
struct TestCoverageRule;

impl Rule for TestCoverageRule {
    fn rule_id(&self) -> &str {
        "test-coverage"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Coverage
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn is_fast(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> crate::error::OmniResult<Vec<PlanValidationFinding>> {
        let mut findings = Vec::new();
        for task in &ctx.plan.tasks {
            if !is_feature_like(task) {
                continue;
            }
            if has_linked_task_matching(ctx, task, &["test", "spec"]) {
                continue;
            }
            let finding = PlanValidationFinding {
                rule_id: self.rule_id().to_string(),
                severity: self.severity(),
                summary: format!("task {} adds feature behaviour with no linked test task", task.id),
                affected_tasks: vec![task.id.clone()],
                suggestion: "add a test task that depends on, or is depended on by, this task".to_string(),
                confidence: 0.85,
                suggested_revision: self.suggest_revision_for(task),
            };
            findings.push(finding);
        }
        Ok(findings)
    }

    fn suggest_revision(
        &self,
        finding: &PlanValidationFinding,
        _ctx: &ValidationContext<'_>,
    ) -> Option<PlanRevision> {
        finding.suggested_revision.clone()
    }
}

impl TestCoverageRule {
    fn suggest_revision_for(&self, task: &Task) -> Option<PlanRevision> {
        let new_task = Task {
            id: format!("{}-TEST", task.id),
            title: format!("Add tests for: {}", task.title),
            description: format!("Cover the acceptance criteria of {} with automated tests.", task.id),
            scope: task.scope.clone(),
            priority: task.priority,
            effort: (task.effort * 0.5).max(1.0),
            impact: task.impact,
            acceptance_criteria: vec!["new behaviour is covered by a passing test".to_string()],
            dependencies: vec![task.id.clone()],
            tags: vec!["testing".to_string()],
        };
        Some(PlanRevision {
            revision_type: RevisionType::AddTask,
            rationale: format!("{} has no linked test task", task.id),
            target_task_id: None,
            new_task: Some(new_task),
            modifications: None,
            dependency_additions: None,
        })
    }
}

/// Tasks touching user-facing surface area without a linked doc task.
struct DocumentationCoverageRule;

const USER_FACING_MARKERS: &[&str] = &["api", "cli", "endpoint", "ui", "public", "command", "tool"];

impl Rule for DocumentationCoverageRule {
    fn rule_id(&self) -> &str {
        "documentation-coverage"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Coverage
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn is_fast(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> crate::error::OmniResult<Vec<PlanValidationFinding>> {
        let mut findings = Vec::new();
        for task in &ctx.plan.tasks {
            if is_trivial(task) {
                continue;
            }
            let haystack = format!("{} {}", task.title, task.description).to_lowercase();
            let touches_surface = USER_FACING_MARKERS.iter().any(|m| haystack.contains(m))
                || task.tags.iter().any(|t| t == "public-surface");
            if !touches_surface {
                continue;
            }
            if has_linked_task_matching(ctx, task, &["doc", "readme", "changelog"]) {
                continue;
            }
            findings.push(PlanValidationFinding {
                rule_id: self.rule_id().to_string(),
                severity: self.severity(),
                summary: format!("task {} touches user-facing surface area with no linked doc task", task.id),
                affected_tasks: vec![task.id.clone()],
                suggestion: "add a documentation task covering the new surface area".to_string(),
                confidence: 0.75,
                suggested_revision: self.suggest_revision_for(task),
            });
        }
        Ok(findings)
    }

    fn suggest_revision(
        &self,
        finding: &PlanValidationFinding,
        _ctx: &ValidationContext<'_>,
    ) -> Option<PlanRevision> {
        finding.suggested_revision.clone()
    }
}

impl DocumentationCoverageRule {
    fn suggest_revision_for(&self, task: &Task) -> Option<PlanRevision> {
        let new_task = Task {
            id: format!("{}-DOC", task.id),
            title: format!("Document: {}", task.title),
            description: format!("Document the user-facing behaviour introduced by {}.", task.id),
            scope: task.scope.clone(),
            priority: task.priority,
            effort: 1.0,
            impact: task.impact,
            acceptance_criteria: vec!["docs describe the new surface area".to_string()],
            dependencies: vec![task.id.clone()],
            tags: vec!["docs".to_string()],
        };
        Some(PlanRevision {
            revision_type: RevisionType::AddTask,
            rationale: format!("{} touches user-facing surface with no linked doc task", task.id),
            target_task_id: None,
            new_task: Some(new_task),
            modifications: None,
            dependency_additions: None,
        })
    }
}

/// Flags tasks whose title+description is near-duplicate of another task
/// in the same plan, via cosine similarity over embedder vectors. Degrades
/// to a no-op (never flags) when no embedder is available, rather than
/// risking false positives from a weaker fallback.
struct DuplicateDetectionRule;

impl Rule for DuplicateDetectionRule {
    fn rule_id(&self) -> &str {
        "duplicate-detection"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Consistency
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn is_fast(&self) -> bool {
        false
    }

    fn can_auto_revise(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> crate::error::OmniResult<Vec<PlanValidationFinding>> {
        let Some(embedder) = ctx.embedder.filter(|e| e.is_available()) else {
            return Ok(Vec::new());
        };

        let mut findings = Vec::new();
        let texts: Vec<String> = ctx
            .plan
            .tasks
            .iter()
            .map(|t| format!("{} {}", t.title, t.description))
            .collect();

        let mut vectors = Vec::with_capacity(texts.len());
        for text in &texts {
            match embedder.embed_single(text) {
                Ok(vector) => vectors.push(Some(vector)),
                Err(_) => vectors.push(None),
            }
        }

        let mut already_flagged = std::collections::HashSet::new();
        for i in 0..ctx.plan.tasks.len() {
            let Some(vi) = &vectors[i] else { continue };
            for j in (i + 1)..ctx.plan.tasks.len() {
                let Some(vj) = &vectors[j] else { continue };
                let similarity = cosine_similarity(vi, vj);
                if similarity >= ctx.config.duplicate_threshold {
                    let a = &ctx.plan.tasks[i];
                    let b = &ctx.plan.tasks[j];
                    if !already_flagged.insert(b.id.clone()) {
                        continue;
                    }
                    findings.push(PlanValidationFinding {
                        rule_id: self.rule_id().to_string(),
                        severity: self.severity(),
                        summary: format!(
                            "task {} looks like a duplicate of task {} (similarity {:.2})",
                            b.id, a.id, similarity
                        ),
                        affected_tasks: vec![a.id.clone(), b.id.clone()],
                        suggestion: format!("reference {} instead of duplicating its scope", a.id),
                        confidence: similarity,
                        suggested_revision: Some(PlanRevision {
                            revision_type: RevisionType::ModifyTask,
                            rationale: format!("duplicates task {}", a.id),
                            target_task_id: Some(b.id.clone()),
                            new_task: None,
                            modifications: Some(
                                json!({
                                    "acceptance_criteria_append":
                                        format!("verified no duplication with {}", a.id),
                                })
                                .as_object()
                                .cloned()
                                .unwrap(),
                            ),
                            dependency_additions: None,
                        }),
                    });
                }
            }
        }
        Ok(findings)
    }

    fn suggest_revision(
        &self,
        finding: &PlanValidationFinding,
        _ctx: &ValidationContext<'_>,
    ) -> Option<PlanRevision> {
        finding.suggested_revision.clone()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Canonical top-level locations a task's declared scope is expected to
/// fall under. A task whose scope paths match none of these gets a
/// consistency warning rather than a hard block.
const CANONICAL_LOCATIONS: &[&str] = &[
    "tests", "test", "components", "component", "services", "service", "api", "models", "model",
    "utils", "util", "config",
];

/// Declared file paths checked against a canonical location table.
struct ArchitecturalConsistencyRule;

impl Rule for ArchitecturalConsistencyRule {
    fn rule_id(&self) -> &str {
        "architectural-consistency"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Architecture
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn is_fast(&self) -> bool {
        true
    }

    fn can_auto_revise(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> crate::error::OmniResult<Vec<PlanValidationFinding>> {
        let mut findings = Vec::new();
        for task in &ctx.plan.tasks {
            if task.scope.is_empty() {
                continue;
            }
            let non_standard: Vec<&str> = task
                .scope
                .iter()
                .filter(|path| {
                    let lower = path.to_lowercase();
                    !CANONICAL_LOCATIONS.iter().any(|loc| lower.contains(loc))
                })
                .map(|s| s.as_str())
                .collect();
            if non_standard.is_empty() {
                continue;
            }
            findings.push(PlanValidationFinding {
                rule_id: self.rule_id().to_string(),
                severity: self.severity(),
                summary: format!(
                    "task {} declares scope outside canonical locations: {}",
                    task.id,
                    non_standard.join(", ")
                ),
                affected_tasks: vec![task.id.clone()],
                suggestion: "confirm the non-standard path is intentional".to_string(),
                confidence: 0.5,
                suggested_revision: None,
            });
        }
        Ok(findings)
    }

    fn suggest_revision(
        &self,
        _finding: &PlanValidationFinding,
        _ctx: &ValidationContext<'_>,
    ) -> Option<PlanRevision> {
        None
    }
}

/// Lexical detection of common performance anti-patterns in task text.
struct PerformancePatternRule;

const PERFORMANCE_MARKERS: &[(&str, &str)] = &[
    ("n+1", "possible N+1 query pattern"),
    ("for each", "loop-per-row access may hide an N+1 pattern"),
    ("no cache", "missing cache for a repeated expensive operation"),
    ("without cache", "missing cache for a repeated expensive operation"),
    ("blocking call", "blocking call mentioned in a hot-path task"),
    ("synchronous", "synchronous call may block a hot path"),
    ("unbounded", "unbounded load with no limit or pagination"),
    ("entire file", "loading an entire file/payload instead of streaming"),
    ("full table", "full table scan mentioned"),
];

impl Rule for PerformancePatternRule {
    fn rule_id(&self) -> &str {
        "performance-pattern"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Performance
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn is_fast(&self) -> bool {
        true
    }

    fn can_auto_revise(&self) -> bool {
        false
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> crate::error::OmniResult<Vec<PlanValidationFinding>> {
        let mut findings = Vec::new();
        for task in &ctx.plan.tasks {
            let haystack = format!("{} {}", task.title, task.description).to_lowercase();
            for (marker, note) in PERFORMANCE_MARKERS {
                if haystack.contains(marker) {
                    findings.push(PlanValidationFinding {
                        rule_id: self.rule_id().to_string(),
                        severity: self.severity(),
                        summary: format!("task {}: {}", task.id, note),
                        affected_tasks: vec![task.id.clone()],
                        suggestion: "review before implementation; add a note if intentional".to_string(),
                        confidence: 0.5,
                        suggested_revision: None,
                    });
                }
            }
        }
        Ok(findings)
    }

    fn suggest_revision(
        &self,
        _finding: &PlanValidationFinding,
        _ctx: &ValidationContext<'_>,
    ) -> Option<PlanRevision> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardrailConfig;
    use crate::types::ImplementationPlan;

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: String::new(),
            description: String::new(),
            scope: Vec::new(),
            priority: 0,
            effort: 1.0,
            impact: 1.0,
            acceptance_criteria: Vec::new(),
            dependencies: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_test_coverage_flags_untested_feature() {
        let mut feature = task("T1");
        feature.title = "Implement login feature".to_string();
        let plan = ImplementationPlan {
            tasks: vec![feature],
            revision_history: Vec::new(),
        };
        let config = GuardrailConfig::default();
        let ctx = ValidationContext {
            plan: &plan,
            config: &config,
            embedder: None,
        };
        let findings = TestCoverageRule.validate(&ctx).unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].suggested_revision.is_some());
    }

    #[test]
    fn test_test_coverage_exempts_trivial_tasks() {
        let mut trivial = task("T1");
        trivial.title = "Fix typo in README".to_string();
        let plan = ImplementationPlan {
            tasks: vec![trivial],
            revision_history: Vec::new(),
        };
        let config = GuardrailConfig::default();
        let ctx = ValidationContext {
            plan: &plan,
            config: &config,
            embedder: None,
        };
        let findings = TestCoverageRule.validate(&ctx).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_test_coverage_passes_when_test_task_linked() {
        let mut feature = task("T1");
        feature.title = "Implement login feature".to_string();
        let mut test_task = task("T2");
        test_task.title = "Add tests for login".to_string();
        test_task.dependencies.push("T1".to_string());
        let plan = ImplementationPlan {
            tasks: vec![feature, test_task],
            revision_history: Vec::new(),
        };
        let config = GuardrailConfig::default();
        let ctx = ValidationContext {
            plan: &plan,
            config: &config,
            embedder: None,
        };
        let findings = TestCoverageRule.validate(&ctx).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_duplicate_detection_noop_without_embedder() {
        let plan = ImplementationPlan {
            tasks: vec![task("T1"), task("T2")],
            revision_history: Vec::new(),
        };
        let config = GuardrailConfig::default();
        let ctx = ValidationContext {
            plan: &plan,
            config: &config,
            embedder: None,
        };
        let findings = DuplicateDetectionRule.validate(&ctx).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_architectural_consistency_flags_non_standard_path() {
        let mut weird = task("T1");
        weird.scope = vec!["src/random_spot/thing.rs".to_string()];
        let plan = ImplementationPlan {
            tasks: vec![weird],
            revision_history: Vec::new(),
        };
        let config = GuardrailConfig::default();
        let ctx = ValidationContext {
            plan: &plan,
            config: &config,
            embedder: None,
        };
        let findings = ArchitecturalConsistencyRule.validate(&ctx).unwrap();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_performance_pattern_detects_n_plus_one() {
        let mut risky = task("T1");
        risky.description = "for each user, query their profile separately".to_string();
        let plan = ImplementationPlan {
            tasks: vec![risky],
            revision_history: Vec::new(),
        };
        let config = GuardrailConfig::default();
        let ctx = ValidationContext {
            plan: &plan,
            config: &config,
            embedder: None,
        };
        let findings = PerformancePatternRule.validate(&ctx).unwrap();
        assert!(!findings.is_empty());
    }

    #[test]
    fn test_cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
