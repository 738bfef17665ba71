// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable operation definitions.
//!
//! A definition is an ordered list of steps. Dependencies are a strict
//! prefix of the order: a step may only depend on steps declared before it.

use crate::step::Step;
use pulse_core::retry::duration_ms;
use pulse_core::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(60);

/// Declarative metadata for one step of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl StepRef {
    /// A step with the default timeout and a single-attempt retry policy.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            dependencies: Vec::new(),
            timeout: DEFAULT_STEP_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Invalid definition shape, rejected at registration time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("definition id must not be empty")]
    EmptyId,

    #[error("definition '{0}' has no steps")]
    NoSteps(String),

    #[error("definition '{definition}' declares step '{step}' twice")]
    DuplicateStep { definition: String, step: String },

    #[error("step '{step}' depends on '{dependency}', which is not an earlier step")]
    BadDependency { step: String, dependency: String },
}

/// An immutable, registered operation: ordered steps plus their bodies.
pub struct OperationDefinition {
    id: String,
    name: String,
    steps: Vec<Arc<dyn Step>>,
}

impl OperationDefinition {
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder { id: id.into(), name: name.into(), steps: Vec::new() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Arc<dyn Step>] {
        &self.steps
    }

    /// `(step_id, step_name)` pairs, in execution order.
    pub fn step_labels(&self) -> Vec<(String, String)> {
        self.steps.iter().map(|s| (s.spec().id.clone(), s.spec().name.clone())).collect()
    }
}

impl std::fmt::Debug for OperationDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDefinition")
            .field("id", &self.id)
            .field("steps", &self.steps.iter().map(|s| &s.spec().id).collect::<Vec<_>>())
            .finish()
    }
}

/// Accumulates steps, then validates the whole definition at `build`.
pub struct DefinitionBuilder {
    id: String,
    name: String,
    steps: Vec<Arc<dyn Step>>,
}

impl DefinitionBuilder {
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn build(self) -> Result<OperationDefinition, DefinitionError> {
        if self.id.is_empty() {
            return Err(DefinitionError::EmptyId);
        }
        if self.steps.is_empty() {
            return Err(DefinitionError::NoSteps(self.id));
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let spec = step.spec();
            if seen.contains(&spec.id.as_str()) {
                return Err(DefinitionError::DuplicateStep {
                    definition: self.id,
                    step: spec.id.clone(),
                });
            }
            for dep in &spec.dependencies {
                if !seen.contains(&dep.as_str()) {
                    return Err(DefinitionError::BadDependency {
                        step: spec.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            seen.push(&spec.id);
        }

        Ok(OperationDefinition { id: self.id, name: self.name, steps: self.steps })
    }
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
