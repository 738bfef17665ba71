// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step contract.
//!
//! A step is the unit of work inside a run. Implementations must honor the
//! context's cancel token at every potentially long segment, report
//! progress only through the reporter, and tolerate re-invocation across
//! retry boundaries.

use crate::context::OperationContext;
use crate::definition::StepRef;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use pulse_core::StepError;

/// Unit of work with declarative metadata and an async body.
#[async_trait]
pub trait Step: Send + Sync {
    /// Step metadata: id, name, dependencies, timeout, retry policy.
    fn spec(&self) -> &StepRef;

    /// Skip guard, evaluated against the run params before the step would
    /// become active. A skipped step never executes.
    fn skippable_when(&self, _params: &serde_json::Value) -> bool {
        false
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<(), StepError>;
}

type StepBody =
    Box<dyn Fn(OperationContext) -> BoxFuture<'static, Result<(), StepError>> + Send + Sync>;
type SkipGuard = Box<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

/// A [`Step`] built from a closure. The workhorse for pipeline wiring and
/// tests: scraper/parser internals stay opaque behind the closure.
pub struct FnStep {
    spec: StepRef,
    skip: Option<SkipGuard>,
    body: StepBody,
}

impl FnStep {
    pub fn new<F, Fut>(spec: StepRef, body: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), StepError>> + Send + 'static,
    {
        Self { spec, skip: None, body: Box::new(move |ctx| Box::pin(body(ctx))) }
    }

    /// Attach a skip guard evaluated against the run params.
    pub fn skip_when(
        mut self,
        guard: impl Fn(&serde_json::Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.skip = Some(Box::new(guard));
        self
    }
}

#[async_trait]
impl Step for FnStep {
    fn spec(&self) -> &StepRef {
        &self.spec
    }

    fn skippable_when(&self, params: &serde_json::Value) -> bool {
        self.skip.as_ref().is_some_and(|guard| guard(params))
    }

    async fn execute(&self, ctx: &OperationContext) -> Result<(), StepError> {
        (self.body)(ctx.clone()).await
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
