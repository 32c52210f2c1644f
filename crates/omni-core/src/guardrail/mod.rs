//! Plan-mode guardrail engine.
//!
//! Validates an [`ImplementationPlan`] against a catalog of rules before a
//! planning session hands it back for execution, and can optionally apply
//! machine-generated revisions for findings the engine is confident about.
//!
//! The engine itself only orchestrates: loading the catalog, running rules
//! sequentially or on a bounded pool, enforcing a per-rule timeout, and
//! applying revisions under a fixed set of conflict checks. Each rule's own
//! validation logic lives in [`rules`].

pub mod rules;

use std::time::{Duration, Instant};

use crate::config::GuardrailConfig;
use crate::embedder::Embedder;
use crate::error::OmniResult;
use crate::graph::DependencyGraph;
use crate::types::{
    AppliedRevision, ImplementationPlan, PlanGuardrailResult, PlanRevision, PlanValidationFinding,
    RevisionType, Severity, Task,
};

/// Everything a rule needs to validate a plan. Borrowed for the duration of
/// a single `validate`/`suggest_revision` call.
pub struct ValidationContext<'a> {
    /// The plan under validation.
    pub plan: &'a ImplementationPlan,
    /// Engine configuration (thresholds, canonical locations, etc).
    pub config: &'a GuardrailConfig,
    /// Embedder used for duplicate-detection's semantic-memory search.
    /// `None` when the embedding model is unavailable; duplicate-detection
    /// degrades to skipping (no false positives) rather than erroring.
    pub embedder: Option<&'a Embedder>,
}

/// A single guardrail rule.
///
/// Implementors should be cheap to construct; the catalog is rebuilt per
/// validation call so rules can hold no mutable state between calls.
pub trait Rule: Send + Sync {
    /// Stable identifier, e.g. `"test-coverage"`.
    fn rule_id(&self) -> &str;

    /// Rule category, used for reporting and config filtering.
    fn category(&self) -> crate::types::RuleCategory;

    /// Severity assigned to findings this rule produces, absent a
    /// finding-specific override.
    fn severity(&self) -> Severity;

    /// True if this rule completes in ≲100ms and performs no memory search.
    /// Fast-mode validation runs only `is_fast` rules.
    fn is_fast(&self) -> bool;

    /// Whether the engine should attempt `suggest_revision` for findings
    /// from this rule. Most rules support it; a few are report-only.
    fn can_auto_revise(&self) -> bool {
        true
    }

    /// Inspect the plan and report zero or more findings.
    fn validate(&self, ctx: &ValidationContext<'_>) -> OmniResult<Vec<PlanValidationFinding>>;

    /// Propose a machine-applicable fix for one of this rule's own
    /// findings. Returns `None` if no automatic fix makes sense.
    fn suggest_revision(
        &self,
        finding: &PlanValidationFinding,
        ctx: &ValidationContext<'_>,
    ) -> Option<PlanRevision>;
}

/// Runs the rule catalog against plans and, optionally, auto-revises them.
pub struct GuardrailEngine {
    config: GuardrailConfig,
    catalog: Vec<Box<dyn Rule>>,
}

impl GuardrailEngine {
    /// Build an engine with the full built-in catalog, honouring
    /// `config.disabled_rules`.
    pub fn new(config: GuardrailConfig) -> Self {
        let catalog = rules::default_catalog()
            .into_iter()
            .filter(|rule| !config.disabled_rules.iter().any(|id| id == rule.rule_id()))
            .collect();
        Self { config, catalog }
    }

    /// Run every enabled rule (or, in fast mode, only `is_fast` rules)
    /// against `plan` and aggregate the results. Does not mutate the plan.
    pub fn validate(
        &self,
        plan: &ImplementationPlan,
        embedder: Option<&Embedder>,
        fast_only: bool,
    ) -> PlanGuardrailResult {
        let ctx = ValidationContext {
            plan,
            config: &self.config,
            embedder,
        };

        let applicable: Vec<&Box<dyn Rule>> = self
            .catalog
            .iter()
            .filter(|r| !fast_only || r.is_fast())
            .collect();

        let mut findings = Vec::new();
        let mut timings = Vec::new();
        let mut errors = Vec::new();

        let outcomes: Vec<(String, Duration, Result<Vec<PlanValidationFinding>, String>)> =
            if self.config.parallel {
                run_parallel(&applicable, &ctx, &self.config)
            } else {
                run_sequential(&applicable, &ctx, &self.config)
            };

        for (rule_id, elapsed, outcome) in outcomes {
            timings.push((rule_id.clone(), elapsed.as_millis() as u64));
            match outcome {
                Ok(rule_findings) => findings.extend(rule_findings),
                Err(message) => {
                    errors.push((rule_id.clone(), message.clone()));
                    if !self.config.continue_on_error {
                        // Halt: stop aggregating further findings, but keep
                        // what has already been collected plus this error.
                        return PlanGuardrailResult {
                            findings,
                            timings,
                            errors,
                            revisions_skipped: Vec::new(),
                        };
                    }
                }
            }
        }

        PlanGuardrailResult {
            findings,
            timings,
            errors,
            revisions_skipped: Vec::new(),
        }
    }

    /// Convenience wrapper equivalent to `validate(plan, embedder, true)`.
    pub fn validate_fast(
        &self,
        plan: &ImplementationPlan,
        embedder: Option<&Embedder>,
    ) -> PlanGuardrailResult {
        self.validate(plan, embedder, true)
    }

    /// Run validation, then iteratively apply auto-revisions up to
    /// `max_iterations` passes or `max_revisions_per_plan` total revisions,
    /// whichever is hit first. Returns the final (possibly revised) plan
    /// alongside the guardrail result from the last validation pass.
    pub fn validate_and_revise(
        &self,
        mut plan: ImplementationPlan,
        embedder: Option<&Embedder>,
    ) -> (ImplementationPlan, PlanGuardrailResult) {
        let mut total_applied = plan.revision_history.len();
        let mut last_result = PlanGuardrailResult::default();

        for _iteration in 0..self.config.max_iterations {
            if total_applied >= self.config.max_revisions_per_plan {
                break;
            }

            let mut result = self.validate(&plan, embedder, false);
            let mut applicable: Vec<&PlanValidationFinding> = result
                .findings
                .iter()
                .filter(|f| {
                    f.confidence >= self.config.auto_revise_threshold && f.suggested_revision.is_some()
                })
                .collect();

            applicable.sort_by(|a, b| {
                b.severity.cmp(&a.severity).then_with(|| {
                    let rank_a = a
                        .suggested_revision
                        .as_ref()
                        .map(|r| r.revision_type.application_rank())
                        .unwrap_or(u8::MAX);
                    let rank_b = b
                        .suggested_revision
                        .as_ref()
                        .map(|r| r.revision_type.application_rank())
                        .unwrap_or(u8::MAX);
                    rank_a.cmp(&rank_b)
                })
            });

            if applicable.is_empty() {
                last_result = result;
                break;
            }

            let mut applied_this_pass = 0;
            for finding in applicable {
                if total_applied >= self.config.max_revisions_per_plan {
                    break;
                }
                let revision = finding.suggested_revision.clone().unwrap();
                match check_conflicts(&plan, &revision) {
                    Ok(()) => {
                        let before_snippet = describe_plan(&plan);
                        apply_revision(&mut plan, &revision);
                        let after_snippet = describe_plan(&plan);
                        plan.revision_history.push(AppliedRevision {
                            rule_id: finding.rule_id.clone(),
                            rationale: revision.rationale.clone(),
                            before_snippet,
                            after_snippet,
                            confidence: finding.confidence,
                        });
                        total_applied += 1;
                        applied_this_pass += 1;
                    }
                    Err(reason) => {
                        result.revisions_skipped.push((revision, reason));
                    }
                }
            }

            reconcile_plan(&mut plan);
            last_result = result;

            if applied_this_pass == 0 {
                break;
            }
        }

        (plan, last_result)
    }
}

/// Run rules one after another, each under its own timeout.
fn run_sequential(
    rules: &[&Box<dyn Rule>],
    ctx: &ValidationContext<'_>,
    config: &GuardrailConfig,
) -> Vec<(String, Duration, Result<Vec<PlanValidationFinding>, String>)> {
    rules
        .iter()
        .map(|rule| run_with_timeout(rule.as_ref(), ctx, config.rule_timeout_ms))
        .collect()
}

/// Run rules on a bounded worker pool. Each rule still gets its own
/// timeout; the pool only bounds how many run concurrently.
fn run_parallel(
    rules: &[&Box<dyn Rule>],
    ctx: &ValidationContext<'_>,
    config: &GuardrailConfig,
) -> Vec<(String, Duration, Result<Vec<PlanValidationFinding>, String>)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallel_workers.max(1))
        .build();

    let Ok(pool) = pool else {
        // Pool construction failed (e.g. no threads available); degrade to
        // sequential rather than losing validation entirely.
        return run_sequential(rules, ctx, config);
    };

    pool.install(|| {
        use rayon::prelude::*;
        rules
            .par_iter()
            .map(|rule| run_with_timeout(rule.as_ref(), ctx, config.rule_timeout_ms))
            .collect()
    })
}

/// Run a single rule's `validate`, enforcing its timeout budget. Rules are
/// pure in-memory checks with no I/O, so the timeout is checked against
/// elapsed wall-clock time after the call returns rather than via thread
/// cancellation (Rust has none): an overrun is reported as an error and its
/// findings discarded, same as any other rule failure.
fn run_with_timeout(
    rule: &dyn Rule,
    ctx: &ValidationContext<'_>,
    timeout_ms: u64,
) -> (String, Duration, Result<Vec<PlanValidationFinding>, String>) {
    let rule_id = rule.rule_id().to_string();
    let started = Instant::now();
    let result = rule.validate(ctx).map_err(|e| e.to_string());
    let elapsed = started.elapsed();

    if elapsed > Duration::from_millis(timeout_ms) {
        return (
            rule_id,
            elapsed,
            Err(format!("rule exceeded {timeout_ms}ms timeout")),
        );
    }
    (rule_id, elapsed, result)
}

/// Reject a revision if it fails any of the four conflict checks.
fn check_conflicts(plan: &ImplementationPlan, revision: &PlanRevision) -> Result<(), String> {
    match revision.revision_type {
        RevisionType::AddTask => {
            if let Some(new_task) = &revision.new_task {
                if plan.tasks.iter().any(|t| t.id == new_task.id) {
                    return Err(format!("duplicate task id {}", new_task.id));
                }
            } else {
                return Err("add_task revision missing new_task".to_string());
            }
        }
        RevisionType::ModifyTask | RevisionType::RemoveTask => {
            let Some(target_id) = &revision.target_task_id else {
                return Err(format!("{:?} revision missing target_task_id", revision.revision_type));
            };
            if !plan.tasks.iter().any(|t| &t.id == target_id) {
                return Err(format!("target task {target_id} does not exist"));
            }
            if revision.revision_type == RevisionType::RemoveTask {
                let depended_on_by: Vec<&str> = plan
                    .tasks
                    .iter()
                    .filter(|t| &t.id != target_id && t.dependencies.iter().any(|d| d == target_id))
                    .map(|t| t.id.as_str())
                    .collect();
                if !depended_on_by.is_empty() {
                    return Err(format!(
                        "task {target_id} is depended on by {}",
                        depended_on_by.join(", ")
                    ));
                }
            }
        }
        RevisionType::AddDependency => {
            let Some(target_id) = &revision.target_task_id else {
                return Err("add_dependency revision missing target_task_id".to_string());
            };
            let Some(additions) = &revision.dependency_additions else {
                return Err("add_dependency revision missing dependency_additions".to_string());
            };
            if !plan.tasks.iter().any(|t| &t.id == target_id) {
                return Err(format!("target task {target_id} does not exist"));
            }
            for dep in additions {
                if !plan.tasks.iter().any(|t| &t.id == dep) {
                    return Err(format!("dependency target {dep} does not exist"));
                }
            }
            if would_introduce_cycle(plan, target_id, additions) {
                return Err("dependency addition would introduce a cycle".to_string());
            }
        }
        RevisionType::ReorderTasks => {}
    }
    Ok(())
}

/// Build a throwaway [`DependencyGraph`] from the plan's task dependency
/// edges (mapping each task id to a node by insertion order) plus the
/// proposed additions, and ask it whether the result is cyclic.
fn would_introduce_cycle(plan: &ImplementationPlan, target_id: &str, additions: &[String]) -> bool {
    let graph = DependencyGraph::new();
    let mut ids: Vec<&str> = plan.tasks.iter().map(|t| t.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    let node_of = |id: &str| -> i64 {
        ids.iter().position(|x| *x == id).map(|p| p as i64).unwrap_or(-1)
    };

    for id in &ids {
        let _ = graph.add_symbol(node_of(id));
    }
    for task in &plan.tasks {
        for dep in &task.dependencies {
            let _ = graph.add_edge(&crate::types::DependencyEdge {
                source_id: node_of(&task.id),
                target_id: node_of(dep),
                kind: crate::types::DependencyKind::Calls,
            });
        }
    }
    for dep in additions {
        let _ = graph.add_edge(&crate::types::DependencyEdge {
            source_id: node_of(target_id),
            target_id: node_of(dep),
            kind: crate::types::DependencyKind::Calls,
        });
    }

    graph.has_cycles()
}

/// Apply a conflict-checked revision to the plan in place.
fn apply_revision(plan: &mut ImplementationPlan, revision: &PlanRevision) {
    match revision.revision_type {
        RevisionType::AddTask => {
            if let Some(task) = &revision.new_task {
                plan.tasks.push(task.clone());
            }
        }
        RevisionType::ModifyTask => {
            if let (Some(target_id), Some(modifications)) =
                (&revision.target_task_id, &revision.modifications)
            {
                if let Some(task) = plan.tasks.iter_mut().find(|t| &t.id == target_id) {
                    apply_modifications(task, modifications);
                }
            }
        }
        RevisionType::RemoveTask => {
            if let Some(target_id) = &revision.target_task_id {
                plan.tasks.retain(|t| &t.id != target_id);
            }
        }
        RevisionType::AddDependency => {
            if let (Some(target_id), Some(additions)) =
                (&revision.target_task_id, &revision.dependency_additions)
            {
                if let Some(task) = plan.tasks.iter_mut().find(|t| &t.id == target_id) {
                    for dep in additions {
                        if !task.dependencies.contains(dep) {
                            task.dependencies.push(dep.clone());
                        }
                    }
                }
            }
        }
        RevisionType::ReorderTasks => {
            plan.tasks.sort_by_key(|t| t.priority);
        }
    }
}

/// Apply field-level modifications (by name) to a task. Unknown field names
/// are ignored rather than erroring, since the catalog only ever proposes
/// fields it knows about.
fn apply_modifications(task: &mut Task, modifications: &serde_json::Map<String, serde_json::Value>) {
    for (field, value) in modifications {
        match field.as_str() {
            "title" => {
                if let Some(s) = value.as_str() {
                    task.title = s.to_string();
                }
            }
            "description" => {
                if let Some(s) = value.as_str() {
                    task.description = s.to_string();
                }
            }
            "priority" => {
                if let Some(n) = value.as_u64() {
                    task.priority = n as u32;
                }
            }
            "acceptance_criteria_append" => {
                if let Some(s) = value.as_str() {
                    task.acceptance_criteria.push(s.to_string());
                }
            }
            "tags_append" => {
                if let Some(s) = value.as_str() {
                    task.tags.push(s.to_string());
                }
            }
            _ => {}
        }
    }
}

/// After a revision pass: drop dependency ids that no longer resolve to a
/// task (orphans from a remove_task revision) and re-number priorities
/// densely in their current relative order.
fn reconcile_plan(plan: &mut ImplementationPlan) {
    let known_ids: std::collections::HashSet<&str> =
        plan.tasks.iter().map(|t| t.id.as_str()).collect();
    for task in &mut plan.tasks {
        task.dependencies.retain(|d| known_ids.contains(d.as_str()));
    }

    let mut ordered: Vec<usize> = (0..plan.tasks.len()).collect();
    ordered.sort_by_key(|&i| plan.tasks[i].priority);
    for (rank, idx) in ordered.into_iter().enumerate() {
        plan.tasks[idx].priority = rank as u32;
    }
}

/// A short human-readable snapshot of the plan's tasks, used for the
/// before/after audit trail on an [`AppliedRevision`].
fn describe_plan(plan: &ImplementationPlan) -> String {
    let titles: Vec<String> = plan
        .tasks
        .iter()
        .map(|t| format!("{}:{}", t.id, t.title))
        .collect();
    titles.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlanRevision, RevisionType};

    fn task(id: &str, deps: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            description: String::new(),
            scope: Vec::new(),
            priority: 0,
            effort: 1.0,
            impact: 1.0,
            acceptance_criteria: Vec::new(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_engine_runs_default_catalog() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let plan = ImplementationPlan {
            tasks: vec![task("T1", &[])],
            revision_history: Vec::new(),
        };
        let result = engine.validate(&plan, None, false);
        assert!(result.errors.is_empty());
        assert_eq!(result.timings.len(), engine.catalog.len());
    }

    #[test]
    fn test_fast_mode_runs_fewer_rules() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let plan = ImplementationPlan {
            tasks: vec![task("T1", &[])],
            revision_history: Vec::new(),
        };
        let fast = engine.validate_fast(&plan, None);
        let full = engine.validate(&plan, None, false);
        assert!(fast.timings.len() <= full.timings.len());
    }

    #[test]
    fn test_add_dependency_cycle_is_rejected() {
        let plan = ImplementationPlan {
            tasks: vec![task("A", &["B"]), task("B", &[])],
            revision_history: Vec::new(),
        };
        let revision = PlanRevision {
            revision_type: RevisionType::AddDependency,
            rationale: "test".to_string(),
            target_task_id: Some("B".to_string()),
            new_task: None,
            modifications: None,
            dependency_additions: Some(vec!["A".to_string()]),
        };
        assert!(check_conflicts(&plan, &revision).is_err());
    }

    #[test]
    fn test_remove_task_with_dependents_is_rejected() {
        let plan = ImplementationPlan {
            tasks: vec![task("A", &["B"]), task("B", &[])],
            revision_history: Vec::new(),
        };
        let revision = PlanRevision {
            revision_type: RevisionType::RemoveTask,
            rationale: "test".to_string(),
            target_task_id: Some("B".to_string()),
            new_task: None,
            modifications: None,
            dependency_additions: None,
        };
        assert!(check_conflicts(&plan, &revision).is_err());
    }

    #[test]
    fn test_auto_revise_adds_test_task() {
        let engine = GuardrailEngine::new(GuardrailConfig::default());
        let mut feature_task = task("T1", &[]);
        feature_task.title = "Implement new login feature".to_string();
        feature_task.tags = vec!["feature".to_string()];
        let plan = ImplementationPlan {
            tasks: vec![feature_task],
            revision_history: Vec::new(),
        };
        let (revised, _result) = engine.validate_and_revise(plan, None);
        assert!(revised.tasks.len() > 1, "expected a test task to be added");
        assert!(!revised.revision_history.is_empty());
    }

    #[test]
    fn test_reconcile_drops_orphan_dependencies() {
        let mut plan = ImplementationPlan {
            tasks: vec![task("A", &["ghost"])],
            revision_history: Vec::new(),
        };
        reconcile_plan(&mut plan);
        assert!(plan.tasks[0].dependencies.is_empty());
    }
}
