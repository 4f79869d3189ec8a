//! The wizard-facing operations.
//!
//! None of these return an error. Any failure on the model path (missing
//! credential, gateway error, timeout, malformed or unsafe answer) is logged,
//! reported through [`crate::FallbackMetrics`] and replaced by the matching
//! deterministic result from [`crate::fallback`].

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    client::ClientInner,
    errors::{Error, Result},
    fallback, tasks,
    telemetry::FallbackMetrics,
    types::{ComponentRef, Requirements, TaskKind, TaskRequest, TechStackEntry, WorkflowNode},
    validate,
};

/// Character cap for architecture explanations.
pub const MAX_EXPLANATION_CHARS: usize = 1500;
/// Character cap for a single component description.
pub const MAX_DESCRIPTION_CHARS: usize = 800;
/// Character cap for the requirement question list.
pub const MAX_QUESTIONS_CHARS: usize = 2000;

const UNAVAILABLE_TEXT: &str = "No description is available for this part of the architecture.";

#[derive(Clone)]
pub struct GenerationClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl GenerationClient {
    /// Architecture graph for the idea, or the baseline graph.
    pub async fn generate_workflow_nodes(
        &self,
        idea: &str,
        requirements: &Requirements,
    ) -> Vec<WorkflowNode> {
        let result = self
            .ask(tasks::workflow_task(idea, requirements))
            .await
            .and_then(|raw| validate::parse_workflow_nodes(&raw));
        self.or_fallback(TaskKind::Workflow, result, || {
            fallback::fallback_workflow(idea, requirements)
        })
    }

    pub async fn generate_tech_stack_with_reasons(
        &self,
        idea: &str,
        requirements: &Requirements,
    ) -> Vec<TechStackEntry> {
        let result = self
            .ask(tasks::tech_stack_task(idea, requirements))
            .await
            .and_then(|raw| validate::parse_tech_stack(&raw));
        self.or_fallback(TaskKind::TechStack, result, fallback::fallback_tech_stack)
    }

    pub async fn generate_workflow_explanation(
        &self,
        idea: &str,
        requirements: &Requirements,
        nodes: &[WorkflowNode],
    ) -> String {
        let result = self
            .ask(tasks::explanation_task(idea, requirements, nodes))
            .await
            .and_then(|raw| self.screen(&raw, MAX_EXPLANATION_CHARS));
        self.or_fallback(TaskKind::Explanation, result, || {
            self.first_safe([
                fallback::fallback_explanation(idea, nodes.len()),
                fallback::fallback_explanation("", nodes.len()),
            ])
        })
    }

    /// Three-bullet description of one component.
    pub async fn generate_component_description(
        &self,
        component_type: &str,
        label: &str,
        idea: Option<&str>,
    ) -> String {
        let result = self
            .ask(tasks::component_description_task(component_type, label, idea))
            .await
            .and_then(|raw| self.screen(&raw, MAX_DESCRIPTION_CHARS));
        self.or_fallback(TaskKind::ComponentDescription, result, || {
            self.description_fallback(component_type, label, idea)
        })
    }

    /// Descriptions for many components in one model call, keyed by component id.
    ///
    /// Every requested id gets an entry; ids the model skipped or answered
    /// unsafely get the templated description.
    pub async fn generate_component_descriptions(
        &self,
        components: &[ComponentRef],
        idea: Option<&str>,
    ) -> BTreeMap<String, String> {
        if components.is_empty() {
            return BTreeMap::new();
        }

        let answered = match self
            .ask(tasks::batch_description_task(components, idea))
            .await
            .and_then(|raw| validate::parse_description_map(&raw))
        {
            Ok(map) => map,
            Err(err) => {
                self.report_fallback(TaskKind::BatchDescriptions, &err);
                BTreeMap::new()
            }
        };

        let mut out = BTreeMap::new();
        for component in components {
            let text = match answered.get(&component.id) {
                Some(raw) => match self.screen(raw, MAX_DESCRIPTION_CHARS) {
                    Ok(text) => text,
                    Err(err) => {
                        self.report_fallback(TaskKind::BatchDescriptions, &err);
                        self.description_fallback(&component.component_type, &component.label, idea)
                    }
                },
                None => self.description_fallback(&component.component_type, &component.label, idea),
            };
            out.insert(component.id.clone(), text);
        }
        out
    }

    /// Numbered clarifying questions for a fresh idea.
    pub async fn generate_requirement_questions(&self, idea: &str) -> String {
        let result = self
            .ask(tasks::requirement_questions_task(idea))
            .await
            .and_then(|raw| self.screen(&raw, MAX_QUESTIONS_CHARS));
        self.or_fallback(
            TaskKind::RequirementQuestions,
            result,
            fallback::fallback_requirement_questions,
        )
    }

    async fn ask(&self, request: Result<TaskRequest>) -> Result<String> {
        let request = request?;
        // No credential means no call; fail before taking a queue slot.
        self.inner.credentials.get()?;
        let request = match request.model {
            Some(_) => request,
            None => request.with_model(self.inner.current_model()),
        };
        self.inner.scheduler.submit(request).await
    }

    fn screen(&self, raw: &str, max_chars: usize) -> Result<String> {
        validate::screen_free_text(raw, self.inner.policy.as_ref(), max_chars)
    }

    fn or_fallback<T>(&self, task: TaskKind, result: Result<T>, fallback: impl FnOnce() -> T) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                self.report_fallback(task, &err);
                fallback()
            }
        }
    }

    fn report_fallback(&self, task: TaskKind, err: &Error) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            task = %task,
            reason = err.reason(),
            error = %err,
            "model path failed, using fallback"
        );
        self.inner.telemetry.record_fallback(FallbackMetrics {
            task,
            reason: err.reason(),
        });
    }

    fn description_fallback(&self, component_type: &str, label: &str, idea: Option<&str>) -> String {
        self.first_safe([
            fallback::fallback_description(component_type, label, idea),
            fallback::fallback_description(component_type, label, None),
            fallback::fallback_description("", "", None),
        ])
    }

    /// First template the content policy accepts. Templates embed caller data,
    /// which can itself trip the screen.
    fn first_safe<const N: usize>(&self, candidates: [String; N]) -> String {
        candidates
            .into_iter()
            .find(|text| self.inner.policy.violation(text).is_none())
            .unwrap_or_else(|| UNAVAILABLE_TEXT.to_string())
    }
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("model", &self.inner.current_model())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}
