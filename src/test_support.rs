//! Scripted fakes shared by the unit tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::classifier::{Increment, IncrementStream, Usage};
use crate::generate::PassContext;
use crate::guard::LoopGuard;
use crate::history::{History, PendingToolCall};
use crate::mcp::protocol::{CallToolResult, Tool};
use crate::mcp::{RemoteToolCatalog, ToolSession};
use crate::media::{ImageOutput, MediaHandler};
use crate::output::Renderer;
use crate::permissions::{Operator, Permission, PermissionConfig, PermissionManager, PromptResponse};
use crate::provider::{ModelClient, RequestOptions};
use crate::tools::{
    BindingKind, ProcessExecutor, ToolArgs, ToolBinding, ToolDispatcher, ToolRegistry,
};

pub fn call(name: &str, args: Value) -> PendingToolCall {
    PendingToolCall::new(name, ToolArgs::from_value(args).unwrap())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Token(String),
    Thought(String),
    ThoughtEnd,
    ToolStart(String),
    ToolResult(String, String),
    File(PathBuf),
    Inline(String),
    Warning(String),
}

/// Renderer that remembers everything it was asked to show.
#[derive(Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<Rendered>>,
}

impl RecordingRenderer {
    fn push(&self, event: Rendered) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Rendered> {
        self.events.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Rendered::Token(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn thoughts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Rendered::Thought(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn thought_ends(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Rendered::ThoughtEnd)
            .count()
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Rendered::File(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Rendered::Warning(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    pub fn tool_starts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Rendered::ToolStart(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn render_token(&self, token: &str) {
        self.push(Rendered::Token(token.to_string()));
    }

    fn render_thought(&self, text: &str) {
        self.push(Rendered::Thought(text.to_string()));
    }

    fn end_thought(&self) {
        self.push(Rendered::ThoughtEnd);
    }

    fn tool_start(&self, name: &str, _args: &str) {
        self.push(Rendered::ToolStart(name.to_string()));
    }

    fn tool_result(&self, name: &str, result: &str) {
        self.push(Rendered::ToolResult(name.to_string(), result.to_string()));
    }

    fn render_file(&self, _kind: &str, path: &Path) {
        self.push(Rendered::File(path.to_path_buf()));
    }

    fn render_inline_image(&self, payload: &str) {
        self.push(Rendered::Inline(payload.to_string()));
    }

    fn render_warning(&self, msg: &str) {
        self.push(Rendered::Warning(msg.to_string()));
    }

    fn render_error(&self, _err: &str) {}

    fn render_done(&self, _usage: &Usage) {}
}

/// Executor that records invocations instead of spawning processes.
#[derive(Default)]
pub struct FakeExecutor {
    pub calls: Mutex<Vec<(PathBuf, String)>>,
    answers: Mutex<VecDeque<Result<String, String>>>,
}

impl FakeExecutor {
    pub fn answer(&self, answer: &str) {
        self.answers
            .lock()
            .unwrap()
            .push_back(Ok(answer.to_string()));
    }

    pub fn fail(&self, message: &str) {
        self.answers
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessExecutor for FakeExecutor {
    async fn run(&self, path: &Path, json_args: &str, _timeout: Duration) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), json_args.to_string()));
        let next = self.answers.lock().unwrap().pop_front();
        match next {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(message)) => bail!("{}", message),
            None => Ok("ok".to_string()),
        }
    }
}

/// Operator with scripted answers. Runs out to "no" / empty lines.
#[derive(Default)]
pub struct FakeOperator {
    confirms: Mutex<VecDeque<PromptResponse>>,
    lines: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeOperator {
    pub fn will_confirm(&self, response: PromptResponse) {
        self.confirms.lock().unwrap().push_back(response);
    }

    pub fn will_type(&self, line: &str) {
        self.lines.lock().unwrap().push_back(line.to_string());
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Operator for FakeOperator {
    async fn confirm(&self, tool_name: &str, _args: &str) -> Result<PromptResponse> {
        self.prompts.lock().unwrap().push(tool_name.to_string());
        Ok(self
            .confirms
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PromptResponse::No))
    }

    async fn read_line(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.lines.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Model that plays back one script per pass and records what it was sent.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<VecDeque<Vec<Increment>>>,
    pub requests: Mutex<Vec<(History, RequestOptions)>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<Vec<Increment>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Waits `delay` before answering each request.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> History {
        self.requests.lock().unwrap()[index].0.clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn stream_generate(
        &self,
        history: &History,
        options: &RequestOptions,
    ) -> Result<IncrementStream> {
        self.requests
            .lock()
            .unwrap()
            .push((history.clone(), options.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(items) => Ok(futures::stream::iter(items.into_iter().map(Ok)).boxed()),
            None => bail!("no scripted response left"),
        }
    }
}

/// In-memory remote tool server.
pub struct FakeSession {
    id: String,
    tools: Vec<Value>,
    result: Mutex<Value>,
    pub calls: Mutex<Vec<(String, Value)>>,
    pub closes: AtomicUsize,
}

impl FakeSession {
    /// `tools` are raw `tools/list` descriptors.
    pub fn new(id: &str, tools: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            tools,
            result: Mutex::new(serde_json::json!({"content": []})),
            calls: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        })
    }

    /// Raw `tools/call` result returned for every call.
    pub fn respond_with(&self, result: Value) {
        *self.result.lock().unwrap() = result;
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolSession for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<Tool>> {
        Ok(self
            .tools
            .iter()
            .map(|t| serde_json::from_value(t.clone()).unwrap())
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        let raw = self.result.lock().unwrap().clone();
        Ok(serde_json::from_value(raw)?)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Catalog over a single fake server.
pub async fn catalog_of(session: &Arc<FakeSession>) -> RemoteToolCatalog {
    RemoteToolCatalog::from_sessions(vec![session.clone() as Arc<dyn ToolSession>])
        .await
        .unwrap()
}

/// Builder for a full pass context made of fakes.
pub struct Harness {
    pub renderer: Arc<RecordingRenderer>,
    pub executor: Arc<FakeExecutor>,
    pub operator: Arc<FakeOperator>,
    pub registry: ToolRegistry,
    pub permissions: PermissionConfig,
    pub auto_approve: bool,
    pub max_repeat: usize,
    pub catalog: Arc<RemoteToolCatalog>,
    pub image_output: ImageOutput,
    pub output_dir: tempfile::TempDir,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            renderer: Arc::new(RecordingRenderer::default()),
            executor: Arc::new(FakeExecutor::default()),
            operator: Arc::new(FakeOperator::default()),
            registry: ToolRegistry::new(),
            permissions: PermissionConfig::default(),
            auto_approve: false,
            max_repeat: 5,
            catalog: Arc::new(RemoteToolCatalog::empty()),
            image_output: ImageOutput::File,
            output_dir: tempfile::tempdir().unwrap(),
        }
    }
}

impl Harness {
    fn bind(mut self, name: &str, kind: BindingKind, requires_confirmation: bool) -> Self {
        let mut binding = ToolBinding::executable(name, "/unused");
        binding.kind = kind;
        binding.requires_confirmation = requires_confirmation;
        self.registry.register(binding);
        self
    }

    pub fn with_executable(self, name: &str, requires_confirmation: bool) -> Self {
        let path = PathBuf::from(format!("/opt/tools/{}", name));
        self.bind(
            name,
            BindingKind::Executable {
                path,
                timeout: Duration::from_secs(5),
            },
            requires_confirmation,
        )
    }

    pub fn with_template(self, name: &str, template: Option<&str>) -> Self {
        self.bind(
            name,
            BindingKind::TemplateFormat {
                template: template.map(str::to_string),
            },
            false,
        )
    }

    pub fn with_stdin_prompt(self, name: &str) -> Self {
        self.bind(name, BindingKind::StdinPrompt, false)
    }

    pub fn with_schema(mut self, name: &str, schema: Value) -> Self {
        let mut binding = self.registry.get(name).unwrap().clone();
        binding.parameters = schema;
        self.registry.register(binding);
        self
    }

    pub fn with_permission(mut self, name: &str, perm: Permission) -> Self {
        self.permissions.tools.insert(name.to_string(), perm);
        self
    }

    pub fn auto_approve(mut self) -> Self {
        self.auto_approve = true;
        self
    }

    pub fn max_repeat(mut self, max: usize) -> Self {
        self.max_repeat = max;
        self
    }

    pub fn with_catalog(mut self, catalog: RemoteToolCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn dispatcher(&self) -> ToolDispatcher {
        ToolDispatcher::new(
            self.registry.clone(),
            self.catalog.clone(),
            Arc::new(PermissionManager::new(
                self.permissions.clone(),
                self.auto_approve,
            )),
            self.operator.clone(),
            self.executor.clone(),
            LoopGuard::new(self.max_repeat),
            self.renderer.clone(),
        )
    }
}

/// Pass context around `client`.
pub fn context_with(harness: &Harness, client: Arc<dyn ModelClient>, show_thoughts: bool) -> PassContext {
    PassContext {
        client,
        options: RequestOptions {
            system_prompt: None,
            tools: harness.dispatcher().specs(),
            max_tokens: 1024,
        },
        dispatcher: harness.dispatcher(),
        media: MediaHandler::new(
            harness.image_output,
            harness.output_dir.path().to_path_buf(),
            false,
        ),
        renderer: harness.renderer.clone(),
        show_thoughts,
    }
}

/// Pass context for tests that feed the classifier directly.
pub fn context(harness: &Harness) -> PassContext {
    context_with(harness, Arc::new(ScriptedClient::default()), false)
}
