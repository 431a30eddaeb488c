//! Resolves one model function call to an answer.
//!
//! Order: loop guard, local binding, remote catalog, and finally a
//! "no matching tool" response. Only the guard and real execution failures
//! are fatal; everything the model can recover from becomes a response.

use std::sync::Arc;

use super::predefined::{render_template, stdin_prompt};
use super::{check_args, BindingKind, ProcessExecutor, ToolBinding, ToolRegistry, ToolSpec};
use crate::error::GenerateError;
use crate::guard::{canonical_call, LoopGuard};
use crate::history::{History, Part, PendingToolCall, ToolOutcome};
use crate::mcp::{convert_result, RemoteTool, RemoteToolCatalog};
use crate::output::Renderer;
use crate::permissions::{Operator, Permission, PermissionManager, PromptResponse};

/// Everything appended to the history for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: ToolOutcome,
    /// Media returned alongside the answer (remote tools only).
    pub extra: Vec<Part>,
}

impl From<ToolOutcome> for Resolution {
    fn from(outcome: ToolOutcome) -> Self {
        Self {
            outcome,
            extra: Vec::new(),
        }
    }
}

pub struct ToolDispatcher {
    registry: ToolRegistry,
    catalog: Arc<RemoteToolCatalog>,
    permissions: Arc<PermissionManager>,
    operator: Arc<dyn Operator>,
    executor: Arc<dyn ProcessExecutor>,
    guard: LoopGuard,
    renderer: Arc<dyn Renderer>,
}

impl ToolDispatcher {
    pub fn new(
        registry: ToolRegistry,
        catalog: Arc<RemoteToolCatalog>,
        permissions: Arc<PermissionManager>,
        operator: Arc<dyn Operator>,
        executor: Arc<dyn ProcessExecutor>,
        guard: LoopGuard,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            registry,
            catalog,
            permissions,
            operator,
            executor,
            guard,
            renderer,
        }
    }

    pub fn catalog(&self) -> &Arc<RemoteToolCatalog> {
        &self.catalog
    }

    /// Definitions sent to the model. A binding hides a remote tool of the
    /// same name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs = self.registry.specs();
        for spec in self.catalog.specs() {
            if self.registry.get(&spec.name).is_none() {
                specs.push(spec);
            }
        }
        specs
    }

    /// Answers `call`, which must already be the last function call in
    /// `history`.
    pub async fn resolve(
        &self,
        call: &PendingToolCall,
        history: &History,
    ) -> Result<Resolution, GenerateError> {
        self.guard.check(call, history)?;

        if let Some(binding) = self.registry.get(&call.name) {
            return self.run_binding(binding, call).await;
        }
        if let Some(remote) = self.catalog.find(&call.name) {
            return self.run_remote(remote, call).await;
        }

        let raw = canonical_call(call);
        tracing::warn!(call = %raw, "model called an undeclared tool");
        self.renderer
            .render_warning(&format!("no matching tool for {}", raw));
        Ok(ToolOutcome::NoMatchingTool.into())
    }

    async fn run_binding(
        &self,
        binding: &ToolBinding,
        call: &PendingToolCall,
    ) -> Result<Resolution, GenerateError> {
        let args_json = call.args.canonical_json();

        match check_args(&binding.parameters, &call.args) {
            Ok(None) => {}
            Ok(Some(reason)) => return Ok(ToolOutcome::InvalidArguments(reason).into()),
            Err(err) => return Err(GenerateError::tool(&call.name, &args_json, err)),
        }
        if let Some(refusal) = self
            .gate(&call.name, &args_json, binding.requires_confirmation)
            .await?
        {
            return Ok(refusal.into());
        }

        self.renderer.tool_start(&call.name, &args_json);
        let answer = match &binding.kind {
            BindingKind::Executable { path, timeout } => {
                tracing::info!(tool = %call.name, path = %path.display(), "running tool");
                self.executor.run(path, &args_json, *timeout).await
            }
            BindingKind::StdinPrompt => {
                stdin_prompt(self.operator.as_ref(), &call.name, &call.args).await
            }
            BindingKind::TemplateFormat { template } => {
                render_template(template.as_deref(), &call.args)
            }
        }
        .map_err(|err| GenerateError::tool(&call.name, &args_json, err))?;

        self.renderer.tool_result(&call.name, &answer);
        Ok(ToolOutcome::Output(answer).into())
    }

    async fn run_remote(
        &self,
        remote: &RemoteTool,
        call: &PendingToolCall,
    ) -> Result<Resolution, GenerateError> {
        let args_json = call.args.canonical_json();

        match check_args(&remote.descriptor.input_schema, &call.args) {
            Ok(None) => {}
            Ok(Some(reason)) => return Ok(ToolOutcome::InvalidArguments(reason).into()),
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "skipping validation of remote tool arguments");
            }
        }
        if let Some(refusal) = self
            .gate(&call.name, &args_json, remote.descriptor.is_destructive())
            .await?
        {
            return Ok(refusal.into());
        }

        self.renderer.tool_start(&call.name, &args_json);
        tracing::info!(tool = %call.name, server = %remote.server_id(), "calling remote tool");
        let result = remote
            .session()
            .call_tool(&call.name, call.args.to_value())
            .await
            .map_err(|err| GenerateError::tool(&call.name, &args_json, err))?;
        let (outcome, extra) =
            convert_result(result).map_err(|err| GenerateError::tool(&call.name, &args_json, err))?;

        self.renderer
            .tool_result(&call.name, &outcome.render(&call.name));
        Ok(Resolution { outcome, extra })
    }

    /// Confirmation gate. `Some` is a refusal to record instead of running.
    async fn gate(
        &self,
        name: &str,
        args_json: &str,
        requires_confirmation: bool,
    ) -> Result<Option<ToolOutcome>, GenerateError> {
        match self.permissions.check(name, requires_confirmation) {
            Permission::Allow => Ok(None),
            Permission::Deny => {
                tracing::info!(tool = %name, "tool denied by configuration");
                Ok(Some(ToolOutcome::Disabled(format!(
                    "Tool '{}' is disabled by configuration.",
                    name
                ))))
            }
            Permission::Ask => match self.operator.confirm(name, args_json).await {
                Ok(PromptResponse::Yes) => Ok(None),
                Ok(PromptResponse::Always) => {
                    self.permissions
                        .set_session_override(name, Permission::Allow);
                    Ok(None)
                }
                Ok(PromptResponse::No) => {
                    tracing::info!(tool = %name, "operator declined tool call");
                    Ok(Some(ToolOutcome::Declined))
                }
                Err(err) => Err(GenerateError::tool(
                    name,
                    args_json,
                    err.context("confirmation prompt failed"),
                )),
            },
        }
    }
}
