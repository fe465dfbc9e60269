//! Research agent: the reasoning/action state machine
//!
//! Each iteration recomputes the permitted tool set, asks the model for a
//! decision, executes the selected tool and feeds its result back into the
//! conversation. A clarification suspends the loop until
//! [`ResearchAgent::provide_clarification`] is called; the completion tool,
//! a finished decision or the forced final report ends it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::context::{ResearchContext, SharedContext};
use crate::agent::prompts::PromptLoader;
use crate::agent::state::{AgentLog, AgentStatus, LogStep};
use crate::agent::stream::{OutputChannel, StreamEmitter, StreamEvent};
use crate::agent::toolset::{Budgets, ToolSet};
use crate::error::{AiError, Result};
use crate::llm::{Message, ToolCall, ToolChoice};
use crate::structured::{StructuredProvider, StructuredRequest};
use crate::tools::{ReasoningArgs, ResearchTool, ToolEnv, ToolKind};

/// Default bound on how long an agent waits for a clarification answer
pub const DEFAULT_CLARIFICATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How the agent obtains its reasoning and selects the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    /// One structured decision containing the tool call
    #[serde(rename = "sgr-agent")]
    Sgr,
    /// Forced reasoning tool call, then a required tool choice
    #[serde(rename = "sgr-tools-agent")]
    SgrTools,
    /// Forced reasoning tool call, then an automatic tool choice
    #[serde(rename = "sgr-auto-tools-agent")]
    SgrAutoTools,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Sgr, AgentKind::SgrTools, AgentKind::SgrAutoTools];

    /// Public model name used to select the variant
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::Sgr => "sgr-agent",
            Self::SgrTools => "sgr-tools-agent",
            Self::SgrAutoTools => "sgr-auto-tools-agent",
        }
    }

    pub fn from_model_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.model_name() == name)
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            Self::Sgr => "sgr_agent",
            Self::SgrTools => "sgr_tool_calling_agent",
            Self::SgrAutoTools => "sgr_auto_tool_calling_agent",
        }
    }

    /// Tool choice for the action round-trip of tool-calling variants
    fn action_choice(&self) -> Option<ToolChoice> {
        match self {
            Self::Sgr => None,
            Self::SgrTools => Some(ToolChoice::Required),
            Self::SgrAutoTools => Some(ToolChoice::Auto),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.model_name())
    }
}

/// Configuration for one research run
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub budgets: Budgets,
    /// Actions offered before budgets are applied
    pub enabled_tools: Vec<ToolKind>,
    pub clarification_timeout: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Where the execution log is written when the run ends; `None` disables it
    pub logs_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            budgets: Budgets::default(),
            enabled_tools: ToolKind::ACTIONS.to_vec(),
            clarification_timeout: DEFAULT_CLARIFICATION_TIMEOUT,
            temperature: None,
            max_tokens: None,
            logs_dir: None,
        }
    }
}

impl AgentConfig {
    pub fn with_budgets(mut self, budgets: Budgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn with_enabled_tools(mut self, tools: Vec<ToolKind>) -> Self {
        self.enabled_tools = tools;
        self
    }

    pub fn with_clarification_timeout(mut self, timeout: Duration) -> Self {
        self.clarification_timeout = timeout;
        self
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_logs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = Some(dir.into());
        self
    }
}

/// One research session: context, conversation, log and output channel
pub struct ResearchAgent {
    id: String,
    kind: AgentKind,
    task: String,
    config: AgentConfig,
    provider: Arc<dyn StructuredProvider>,
    env: ToolEnv,
    prompts: PromptLoader,
    context: SharedContext,
    conversation: Mutex<Vec<Message>>,
    log: Mutex<Vec<LogStep>>,
    channel: OutputChannel,
}

impl ResearchAgent {
    pub fn new(
        kind: AgentKind,
        task: impl Into<String>,
        provider: Arc<dyn StructuredProvider>,
        env: ToolEnv,
        prompts: PromptLoader,
        config: AgentConfig,
    ) -> Self {
        Self {
            id: format!("{}_{}", kind.id_prefix(), uuid::Uuid::new_v4()),
            kind,
            task: task.into(),
            config,
            provider,
            env,
            prompts,
            context: ResearchContext::new().shared(),
            conversation: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            channel: OutputChannel::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn channel(&self) -> &OutputChannel {
        &self.channel
    }

    pub fn context(&self) -> SharedContext {
        Arc::clone(&self.context)
    }

    pub fn state(&self) -> AgentStatus {
        self.context.lock().state
    }

    /// Snapshot served by the state endpoint
    pub fn agent_state(&self) -> Value {
        self.context.lock().agent_state()
    }

    pub fn conversation(&self) -> Vec<Message> {
        self.conversation.lock().clone()
    }

    pub fn log(&self) -> Vec<LogStep> {
        self.log.lock().clone()
    }

    /// Permitted tools for the current context
    pub fn tool_set(&self) -> ToolSet {
        let ctx = self.context.lock();
        ToolSet::compute(&self.config.enabled_tools, &ctx, &self.config.budgets)
    }

    /// Deliver the requester's answer to a pending clarification.
    pub fn provide_clarification(&self, clarifications: &str) -> Result<()> {
        let signal = {
            let mut ctx = self.context.lock();
            if ctx.state != AgentStatus::WaitingForClarification {
                return Err(AiError::InvalidRequest(format!(
                    "agent {} is not waiting for clarification (state: {})",
                    self.id, ctx.state
                )));
            }
            self.conversation
                .lock()
                .push(Message::user(format!("CLARIFICATIONS: {clarifications}")));
            ctx.clarifications_used += 1;
            ctx.state = AgentStatus::Researching;
            ctx.clarification.clone()
        };
        signal.set();

        let preview: String = clarifications.chars().take(300).collect();
        tracing::info!(agent_id = %self.id, clarification = %preview, "Clarification received");
        Ok(())
    }

    /// Run the loop to a terminal state. Errors mark the run as failed; the
    /// channel is always finished and the log dumped before returning.
    pub async fn execute(&self) -> AgentStatus {
        tracing::info!(agent_id = %self.id, kind = %self.kind, task = %self.task, "Starting agent");

        self.conversation.lock().push(Message::user(format!(
            "\nORIGINAL USER REQUEST: '{}'\n(Use this for language consistency in reports)",
            self.task
        )));

        let mut emitter = self.channel.clone();
        if let Err(e) = self.run_loop(&mut emitter).await {
            let iteration = {
                let mut ctx = self.context.lock();
                ctx.state = AgentStatus::Failed;
                ctx.iteration
            };
            tracing::error!(agent_id = %self.id, iteration, error = %e, "Agent execution error");
            self.log.lock().push(LogStep::Error {
                step_number: iteration,
                timestamp: Utc::now(),
                error: e.to_string(),
            });
        }

        emitter.emit_complete().await;
        self.save_log().await;

        let state = self.state();
        tracing::info!(agent_id = %self.id, state = %state, "Agent finished");
        state
    }

    async fn run_loop(&self, emitter: &mut dyn StreamEmitter) -> Result<()> {
        self.context.lock().state = AgentStatus::Researching;

        loop {
            let iteration = {
                let mut ctx = self.context.lock();
                if ctx.state.is_terminal() {
                    return Ok(());
                }
                ctx.iteration += 1;
                ctx.iteration
            };
            tracing::info!(agent_id = %self.id, iteration, "Step started");

            let tools = self.tool_set();
            let (reasoning, decided) = self.reasoning_phase(&tools, iteration, emitter).await?;
            self.context.lock().current_reasoning = Some(reasoning.clone());

            let action = self
                .select_action_phase(&tools, &reasoning, decided, iteration, emitter)
                .await?;
            self.action_phase(&action, iteration, emitter).await?;

            match action.kind() {
                ToolKind::Clarification => {
                    self.wait_for_clarification().await?;
                    continue;
                }
                ToolKind::CreateReport if iteration >= self.config.budgets.max_iterations => {
                    tracing::info!(agent_id = %self.id, iteration, "Final report written at iteration cap");
                    self.context.lock().state = AgentStatus::Completed;
                }
                _ => {}
            }

            {
                let mut ctx = self.context.lock();
                if !ctx.state.is_terminal() && reasoning.task_completed {
                    ctx.state = AgentStatus::Completed;
                }
            }
        }
    }

    fn prepare_messages(&self, tools: &ToolSet) -> Result<Vec<Message>> {
        let sources = self.context.lock().sorted_sources();
        let system = self
            .prompts
            .system_prompt(&self.task, tools.kinds(), &sources)?;
        let mut messages = vec![Message::system(system)];
        messages.extend(self.conversation.lock().iter().cloned());
        Ok(messages)
    }

    async fn reasoning_phase(
        &self,
        tools: &ToolSet,
        iteration: usize,
        emitter: &mut dyn StreamEmitter,
    ) -> Result<(ReasoningArgs, Option<ResearchTool>)> {
        let messages = self.prepare_messages(tools)?;

        let (reasoning, decided) = match self.kind {
            AgentKind::Sgr => {
                let request = StructuredRequest::with_output(messages, tools.next_step_schema())
                    .sampling(self.config.temperature, self.config.max_tokens);
                let completion = self.provider.stream_completion(request, emitter).await?;
                let parsed = completion.parsed.ok_or_else(|| {
                    AiError::StructuredOutput("structured reasoning response is empty".into())
                })?;
                let step = tools.parse_decision(parsed)?;
                (step.reasoning, Some(step.function))
            }
            AgentKind::SgrTools | AgentKind::SgrAutoTools => {
                let mut declared = tools.tool_schemas();
                declared.push(ToolKind::Reasoning.tool_schema());
                let request = StructuredRequest::with_tools(
                    messages,
                    declared,
                    ToolChoice::Function(ToolKind::Reasoning.name().to_string()),
                )
                .sampling(self.config.temperature, self.config.max_tokens);
                let completion = self.provider.stream_completion(request, emitter).await?;

                let call = completion
                    .tool_calls
                    .into_iter()
                    .next()
                    .ok_or_else(|| AiError::Tool("reasoning stage did not return a tool call".into()))?;
                let ResearchTool::Reasoning(reasoning) =
                    ResearchTool::from_call(&call.name, call.arguments)?
                else {
                    return Err(AiError::Tool(format!(
                        "expected a reasoning call, got '{}'",
                        call.name
                    )));
                };

                let tool_call_id = format!("{iteration}-reasoning");
                let result = ResearchTool::Reasoning(reasoning.clone())
                    .execute(&self.context, &self.env)
                    .await?;
                let call = Message::assistant_with_tool_calls(
                    None,
                    vec![ToolCall {
                        id: tool_call_id.clone(),
                        name: ToolKind::Reasoning.name().to_string(),
                        arguments: serde_json::to_value(&reasoning)?,
                    }],
                );
                self.conversation
                    .lock()
                    .extend([call, Message::tool_result(tool_call_id, result)]);
                (reasoning, None)
            }
        };

        self.log_reasoning(&reasoning, iteration)?;
        Ok((reasoning, decided))
    }

    async fn select_action_phase(
        &self,
        tools: &ToolSet,
        reasoning: &ReasoningArgs,
        decided: Option<ResearchTool>,
        iteration: usize,
        emitter: &mut dyn StreamEmitter,
    ) -> Result<ResearchTool> {
        let action = match (decided, self.kind.action_choice()) {
            (Some(action), _) => action,
            (None, Some(choice)) => {
                let messages = self.prepare_messages(tools)?;
                let request = StructuredRequest::with_tools(messages, tools.tool_schemas(), choice)
                    .sampling(self.config.temperature, self.config.max_tokens);
                let completion = self.provider.stream_completion(request, emitter).await?;
                let call = completion.tool_calls.into_iter().next().ok_or_else(|| {
                    AiError::Tool("action selection did not return a tool call".into())
                })?;
                ResearchTool::from_call(&call.name, call.arguments)?
            }
            (None, None) => {
                return Err(AiError::Tool("decision did not select a tool".into()));
            }
        };
        tools.validate(&action)?;

        let tool_call_id = format!("{iteration}-action");
        let arguments = action.arguments()?;
        let serialized = serde_json::to_string(&arguments)?;
        self.conversation
            .lock()
            .push(Message::assistant_with_tool_calls(
                Some(reasoning.next_step_summary().to_string()),
                vec![ToolCall {
                    id: tool_call_id.clone(),
                    name: action.kind().name().to_string(),
                    arguments,
                }],
            ));
        emitter
            .emit_tool_call(&tool_call_id, action.kind().name(), &serialized)
            .await;
        Ok(action)
    }

    async fn action_phase(
        &self,
        action: &ResearchTool,
        iteration: usize,
        emitter: &mut dyn StreamEmitter,
    ) -> Result<String> {
        let tool_call_id = format!("{iteration}-action");
        let name = action.kind().name();
        let result = action.execute(&self.context, &self.env).await?;

        self.conversation
            .lock()
            .push(Message::tool_result(tool_call_id.clone(), result.clone()));
        emitter.emit_tool_result(&tool_call_id, name, &result).await;

        let preview: String = result.chars().take(1000).collect();
        tracing::info!(agent_id = %self.id, iteration, tool = name, result = %preview, "Tool executed");
        self.log.lock().push(LogStep::ToolExecution {
            step_number: iteration,
            timestamp: Utc::now(),
            tool_name: name.to_string(),
            agent_tool_context: action.arguments()?,
            agent_tool_execution_result: result.clone(),
        });
        Ok(result)
    }

    async fn wait_for_clarification(&self) -> Result<()> {
        let signal = {
            let mut ctx = self.context.lock();
            ctx.clarification.clear();
            ctx.state = AgentStatus::WaitingForClarification;
            ctx.clarification.clone()
        };
        self.channel.push(StreamEvent::Suspended);
        tracing::info!(agent_id = %self.id, "Research paused, waiting for clarification");

        signal.wait(self.config.clarification_timeout).await
    }

    fn log_reasoning(&self, reasoning: &ReasoningArgs, iteration: usize) -> Result<()> {
        let (searches_used, clarifications_used) = {
            let ctx = self.context.lock();
            (ctx.searches_used, ctx.clarifications_used)
        };
        tracing::info!(
            agent_id = %self.id,
            iteration,
            searches_used,
            clarifications_used,
            enough_data = reasoning.enough_data,
            task_completed = reasoning.task_completed,
            next_step = reasoning.next_step_summary(),
            "Reasoning"
        );
        tracing::debug!(agent_id = %self.id, reasoning = ?reasoning, "Reasoning details");

        self.log.lock().push(LogStep::Reasoning {
            step_number: iteration,
            timestamp: Utc::now(),
            agent_reasoning: serde_json::to_value(reasoning)?,
        });
        Ok(())
    }

    async fn save_log(&self) {
        let Some(dir) = &self.config.logs_dir else {
            return;
        };
        let context = self.agent_state();
        let log = self.log();
        let dump = AgentLog {
            id: &self.id,
            task: &self.task,
            context,
            log: &log,
        };
        match dump.save(dir).await {
            Ok(path) => tracing::debug!(agent_id = %self.id, path = %path.display(), "Agent log saved"),
            Err(e) => tracing::warn!(agent_id = %self.id, error = %e, "Failed to save agent log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::context::FoundSource;
    use crate::llm::{MockLlmClient, MockStep};
    use crate::structured::NativeProvider;
    use crate::tools::{FileReportStore, SearchProvider, SearchResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    struct StaticSearch;

    #[async_trait]
    impl SearchProvider for StaticSearch {
        async fn search(&self, query: &str, _max: usize, _raw: bool) -> Result<SearchResponse> {
            Ok(SearchResponse {
                answer: None,
                sources: vec![FoundSource {
                    title: query.to_string(),
                    url: format!("https://example.com/{query}"),
                    snippet: "snippet".to_string(),
                    full_content: None,
                }],
            })
        }
    }

    fn reasoning(task_completed: bool) -> Value {
        json!({
            "reasoning_steps": ["assess", "act"],
            "current_situation": "s",
            "plan_status": "p",
            "enough_data": task_completed,
            "remaining_steps": ["next"],
            "task_completed": task_completed
        })
    }

    fn decision(function: Value, task_completed: bool) -> MockStep {
        let mut value = reasoning(task_completed);
        value["function"] = function;
        MockStep::json(value)
    }

    fn agent(kind: AgentKind, client: MockLlmClient, dir: &TempDir) -> ResearchAgent {
        let env = ToolEnv::new(
            Arc::new(StaticSearch),
            Arc::new(FileReportStore::new(dir.path().join("reports"))),
        );
        ResearchAgent::new(
            kind,
            "rust async runtimes",
            Arc::new(NativeProvider::new(Arc::new(client))),
            env,
            PromptLoader::builtin(),
            AgentConfig::default().with_logs_dir(dir.path().join("logs")),
        )
    }

    #[test]
    fn test_agent_kind_model_names() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::from_model_name(kind.model_name()), Some(kind));
        }
        assert_eq!(AgentKind::from_model_name("gpt-4o"), None);
    }

    #[tokio::test]
    async fn test_search_then_completion() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockLlmClient::from_steps(
            "mock",
            vec![
                decision(
                    json!({"tool_name_discriminator": "web_search", "reasoning": "r", "query": "tokio"}),
                    false,
                ),
                decision(
                    json!({
                        "tool_name_discriminator": "agent_completion",
                        "reasoning": "done",
                        "completed_steps": ["searched"],
                        "status": "completed"
                    }),
                    false,
                ),
            ],
        );
        let agent = agent(AgentKind::Sgr, client, &dir);
        assert!(agent.id().starts_with("sgr_agent_"));

        let state = agent.execute().await;
        assert_eq!(state, AgentStatus::Completed);

        let snapshot = agent.agent_state();
        assert_eq!(snapshot["iteration"], 2);
        assert_eq!(snapshot["searches_used"], 1);
        assert_eq!(snapshot["sources_count"], 1);

        let conversation = agent.conversation();
        assert!(conversation[0].content.contains("ORIGINAL USER REQUEST: 'rust async runtimes'"));
        assert_eq!(conversation[2].tool_call_id.as_deref(), Some("1-action"));

        let events = agent.channel().snapshot();
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolCall { name, .. } if name == "web_search")));
        assert_eq!(events.last(), Some(&StreamEvent::Finish));

        let mut logs = tokio::fs::read_dir(dir.path().join("logs")).await.unwrap();
        assert!(logs.next_entry().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_task_completed_flag_ends_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockLlmClient::from_steps(
            "mock",
            vec![decision(
                json!({
                    "tool_name_discriminator": "generate_plan",
                    "reasoning": "r",
                    "research_goal": "g",
                    "planned_steps": ["a", "b", "c"],
                    "search_strategies": ["x", "y"]
                }),
                true,
            )],
        );
        let agent = agent(AgentKind::Sgr, client, &dir);
        assert_eq!(agent.execute().await, AgentStatus::Completed);
    }

    #[tokio::test]
    async fn test_llm_error_marks_agent_failed() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockLlmClient::from_steps("mock", vec![MockStep::error("boom")]);
        let agent = agent(AgentKind::Sgr, client, &dir);

        assert_eq!(agent.execute().await, AgentStatus::Failed);
        assert!(agent.channel().is_finished());
        assert!(matches!(agent.log().last(), Some(LogStep::Error { .. })));
    }

    #[tokio::test]
    async fn test_tools_agent_uses_two_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockLlmClient::from_steps(
            "mock",
            vec![
                MockStep::tool_call("call_1", "reasoning", reasoning(false)),
                MockStep::tool_call(
                    "call_2",
                    "agent_completion",
                    json!({"reasoning": "done", "completed_steps": ["x"], "status": "failed"}),
                ),
            ],
        );
        let agent = agent(AgentKind::SgrTools, client.clone(), &dir);

        assert_eq!(agent.execute().await, AgentStatus::Failed);
        let requests = client.recorded_requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].tool_choice,
            Some(ToolChoice::Function("reasoning".to_string()))
        );
        assert_eq!(requests[1].tool_choice, Some(ToolChoice::Required));
        assert!(requests[1].tools.iter().all(|t| t.name != "reasoning"));

        let conversation = agent.conversation();
        assert_eq!(conversation[2].tool_call_id.as_deref(), Some("1-reasoning"));
    }

    #[tokio::test]
    async fn test_clarification_requires_waiting_state() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(AgentKind::Sgr, MockLlmClient::new("mock"), &dir);
        let err = agent.provide_clarification("EU").unwrap_err();
        assert!(err.is_client_error());
    }
}
