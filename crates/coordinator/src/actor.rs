//! The per-run coordinator actor.
//!
//! One actor owns one run: its store, its context working copy and its
//! event hub. All mutation funnels through the actor's mailbox, so the
//! run has exactly one writer; executor calls and timers run as spawned
//! tasks that marshal their results back as commands. The only
//! suspension points on the write path are the store commit and the
//! executor RPC itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use weft_context::ContextStore;
use weft_core::{DefinitionRef, Revision, RunId, SubscriptionId, TokenId};
use weft_definition::{validate_workflow, TaskDefinition, WorkflowDefinition};
use weft_executor::{ExecutorReply, TaskExecutor, TaskFailure, TransportError};
use weft_resource::{DefinitionCatalog, ResourceGateway};
use weft_store::{RunRecord, RunStatus, RunStore, TokenRecord, TokenStatus};
use weft_trace::{
    EventHub, MetricsRegistry, StreamFrame, SubscriptionFilter, TraceEvent, TraceEventKind,
    WorkflowEvent, WorkflowEventKind,
};

use crate::applier;
use crate::config::CoordinatorConfig;
use crate::dispatcher::{self, DispatchOutcome};
use crate::error::{CoordinatorError, ErrorKind};
use crate::plan::Plan;
use crate::planner::{self, PlannerInput};
use crate::trigger::Trigger;

/// Mailbox commands for one run actor.
pub(crate) enum Command {
    GetRun {
        reply: oneshot::Sender<RunRecord>,
    },
    GetContext {
        reply: oneshot::Sender<Value>,
    },
    Cancel {
        reason: String,
        kind: ErrorKind,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    Subscribe {
        filter: SubscriptionFilter,
        since_sequence: Option<u64>,
        reply: oneshot::Sender<Result<(SubscriptionId, mpsc::Receiver<StreamFrame>), CoordinatorError>>,
    },
    Trace {
        since_sequence: u64,
        type_prefix: Option<String>,
        reply: oneshot::Sender<Result<Vec<TraceEvent>, CoordinatorError>>,
    },
    ExecutorDone {
        token_id: TokenId,
        attempt: u32,
        result: Result<ExecutorReply, TransportError>,
    },
    AttemptTimeout {
        token_id: TokenId,
        attempt: u32,
    },
    Retry {
        token_id: TokenId,
        attempt: u32,
    },
    WorkflowDeadline,
}

/// A client-side handle to a run actor.
#[derive(Clone)]
pub struct RunHandle {
    run_id: RunId,
    commands: mpsc::Sender<Command>,
}

impl RunHandle {
    /// The run this handle addresses.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Snapshot of the run row.
    pub async fn get_run(&self) -> Result<RunRecord, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetRun { reply }).await?;
        rx.await
            .map_err(|_| CoordinatorError::RunNotActive(self.run_id))
    }

    /// Committed composite context view (`{input, state, output}`).
    pub async fn get_context(&self) -> Result<Value, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetContext { reply }).await?;
        rx.await
            .map_err(|_| CoordinatorError::RunNotActive(self.run_id))
    }

    /// Cancel the run.
    pub async fn cancel(&self, reason: impl Into<String>) -> Result<(), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Cancel {
            reason: reason.into(),
            kind: ErrorKind::Cancelled,
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| CoordinatorError::RunNotActive(self.run_id))?
    }

    /// Subscribe to the run's event streams, optionally catching up the
    /// trace from `since_sequence`.
    pub async fn subscribe(
        &self,
        filter: SubscriptionFilter,
        since_sequence: Option<u64>,
    ) -> Result<(SubscriptionId, mpsc::Receiver<StreamFrame>), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            filter,
            since_sequence,
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| CoordinatorError::RunNotActive(self.run_id))?
    }

    /// Committed trace events past `since_sequence`, optionally filtered
    /// by dotted type prefix.
    pub async fn trace(
        &self,
        since_sequence: u64,
        type_prefix: Option<String>,
    ) -> Result<Vec<TraceEvent>, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Trace {
            since_sequence,
            type_prefix,
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| CoordinatorError::RunNotActive(self.run_id))?
    }

    async fn send(&self, command: Command) -> Result<(), CoordinatorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoordinatorError::RunNotActive(self.run_id))
    }
}

/// Start a run: resolve and check the definition, run the start pass,
/// dispatch the root token, then hand the actor to the runtime.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn spawn_run(
    definition_ref: DefinitionRef,
    revision: Revision,
    input: Value,
    catalog: Arc<dyn DefinitionCatalog>,
    executor: Arc<dyn TaskExecutor>,
    store: Arc<dyn RunStore>,
    config: CoordinatorConfig,
    metrics: Arc<MetricsRegistry>,
) -> Result<RunHandle, CoordinatorError> {
    let gateway = Arc::new(ResourceGateway::new(
        Arc::clone(&catalog),
        config.run_cache_size,
    ));
    let definition = gateway.workflow(&definition_ref, revision).await?;
    validate_workflow(&definition)?;

    let run = RunRecord::new(RunId::v4(), definition_ref.clone(), revision, input.clone());
    let run_id = run.id;
    let context = ContextStore::new(
        definition.input_schema.clone(),
        definition.context_schema.clone(),
        definition.output_schema.clone(),
    );
    let hub = Arc::new(EventHub::new(config.subscriber_buffer_size));
    let (commands, mailbox) = mpsc::channel(config.mailbox_size);

    let mut actor = RunActor {
        run,
        definition: Arc::clone(&definition),
        store,
        ctx: context,
        hub,
        gateway,
        executor,
        config,
        metrics,
        commands: commands.clone(),
        mailbox,
        in_flight: HashMap::new(),
        attempts: HashMap::new(),
        cancellation: CancellationToken::new(),
        finalized: false,
    };

    tracing::info!(run_id = %run_id, definition = %definition_ref, "starting run");
    let plan = planner::plan(
        actor.planner_input(None).await?,
        Trigger::WorkflowStart { input: input.clone() },
    );
    actor.commit_plan(plan).await?;
    actor.hub.push_event(&WorkflowEvent::now(
        run_id,
        WorkflowEventKind::WorkflowStarted {
            definition_ref,
            input,
        },
    ));
    actor.metrics.counter("runs_started_total").inc();
    actor.after_pass().await;
    actor.dispatch_pending().await?;
    actor.arm_workflow_deadline();

    let handle = RunHandle { run_id, commands };
    tokio::spawn(actor.run());
    Ok(handle)
}

struct RunActor {
    run: RunRecord,
    definition: Arc<WorkflowDefinition>,
    store: Arc<dyn RunStore>,
    ctx: ContextStore,
    hub: Arc<EventHub>,
    gateway: Arc<ResourceGateway>,
    executor: Arc<dyn TaskExecutor>,
    config: CoordinatorConfig,
    metrics: Arc<MetricsRegistry>,
    commands: mpsc::Sender<Command>,
    mailbox: mpsc::Receiver<Command>,
    /// Token → attempt currently in flight at the executor.
    in_flight: HashMap<TokenId, u32>,
    /// Token → attempts used so far.
    attempts: HashMap<TokenId, u32>,
    /// Cancelled when the run reaches a terminal status; tears down
    /// spawned invocation and timer tasks.
    cancellation: CancellationToken,
    finalized: bool,
}

impl RunActor {
    async fn run(mut self) {
        while let Some(command) = self.mailbox.recv().await {
            if let Err(err) = self.handle(command).await {
                self.quarantine(&err).await;
            }
        }
        tracing::debug!(run_id = %self.run.id, "run actor stopped");
    }

    async fn handle(&mut self, command: Command) -> Result<(), CoordinatorError> {
        match command {
            Command::GetRun { reply } => {
                let _ = reply.send(self.run.clone());
                Ok(())
            }
            Command::GetContext { reply } => {
                let _ = reply.send(self.ctx.composite(None));
                Ok(())
            }
            Command::Cancel {
                reason,
                kind,
                reply,
            } => {
                let result = if self.run.status.is_terminal() {
                    Ok(())
                } else {
                    self.plan_and_commit(None, Trigger::CancelRun { reason, kind })
                        .await
                };
                let _ = reply.send(result);
                Ok(())
            }
            Command::Subscribe {
                filter,
                since_sequence,
                reply,
            } => {
                let result = self.subscribe(filter, since_sequence).await;
                let _ = reply.send(result);
                Ok(())
            }
            Command::Trace {
                since_sequence,
                type_prefix,
                reply,
            } => {
                let result = self
                    .store
                    .trace(since_sequence, type_prefix.as_deref())
                    .await
                    .map_err(CoordinatorError::from);
                let _ = reply.send(result);
                Ok(())
            }
            Command::ExecutorDone {
                token_id,
                attempt,
                result,
            } => self.on_executor_done(token_id, attempt, result).await,
            Command::AttemptTimeout { token_id, attempt } => {
                self.on_attempt_timeout(token_id, attempt).await
            }
            Command::Retry { token_id, attempt } => self.on_retry(token_id, attempt).await,
            Command::WorkflowDeadline => {
                if self.run.status.is_terminal() {
                    return Ok(());
                }
                tracing::warn!(run_id = %self.run.id, "workflow deadline expired");
                self.plan_and_commit(
                    None,
                    Trigger::CancelRun {
                        reason: "workflow deadline exceeded".into(),
                        kind: ErrorKind::Timeout,
                    },
                )
                .await
            }
        }
    }

    // ── planning plumbing ───────────────────────────────────────────────

    async fn planner_input(
        &self,
        task: Option<Arc<TaskDefinition>>,
    ) -> Result<PlannerInput, CoordinatorError> {
        Ok(PlannerInput {
            definition: Arc::clone(&self.definition),
            tokens: self.store.tokens().await?,
            context: self.ctx.clone(),
            run: self.run.clone(),
            task,
            max_tokens: self.config.max_tokens_per_run,
            merge_registry: self.config.merge_strategies.clone(),
        })
    }

    async fn commit_plan(&mut self, plan: Plan) -> Result<Vec<TraceEvent>, CoordinatorError> {
        let created = plan
            .events
            .iter()
            .filter(|e| matches!(e, TraceEventKind::TokenCreate { .. }))
            .count() as u64;
        let applied = applier::apply(plan, &mut self.run, self.store.as_ref(), &self.hub).await?;
        self.ctx = applied.context;
        if created > 0 {
            self.metrics.counter("tokens_created_total").inc_by(created);
        }
        Ok(applied.events)
    }

    /// One planning pass: marshal state, plan, commit, settle follow-ups.
    ///
    /// Deliberately does NOT dispatch: dispatching can itself need a
    /// failure pass, so the dispatch cursor runs only at the top level of
    /// a command (never from inside `dispatch_token`), keeping the call
    /// graph acyclic.
    async fn plan_and_commit(
        &mut self,
        task: Option<Arc<TaskDefinition>>,
        trigger: Trigger,
    ) -> Result<(), CoordinatorError> {
        tracing::debug!(run_id = %self.run.id, trigger = trigger.name(), "planning pass");
        let input = self.planner_input(task).await?;
        let plan = planner::plan(input, trigger);
        self.commit_plan(plan).await?;
        self.after_pass().await;
        Ok(())
    }

    /// Settle the aftermath of a committed pass: cancel executor calls
    /// for tokens that are no longer running, and announce a terminal
    /// run exactly once.
    async fn after_pass(&mut self) {
        let mut stale: Vec<TokenId> = Vec::new();
        for (&token_id, _) in &self.in_flight {
            match self.store.token(token_id).await {
                Ok(record) if record.status == TokenStatus::Running => {}
                _ => stale.push(token_id),
            }
        }
        for token_id in stale {
            self.in_flight.remove(&token_id);
            self.executor.cancel(token_id).await;
        }

        if self.run.status.is_terminal() && !self.finalized {
            self.finalized = true;
            self.cancellation.cancel();
            for (token_id, _) in std::mem::take(&mut self.in_flight) {
                self.executor.cancel(token_id).await;
            }
            match (&self.run.status, &self.run.final_output, &self.run.error) {
                (RunStatus::Completed, Some(final_output), _) => {
                    self.metrics.counter("runs_completed_total").inc();
                    self.hub.push_event(&WorkflowEvent::now(
                        self.run.id,
                        WorkflowEventKind::WorkflowCompleted {
                            final_output: final_output.clone(),
                        },
                    ));
                }
                (_, _, error) => {
                    self.metrics.counter("runs_failed_total").inc();
                    let (error_kind, message) = error
                        .as_ref()
                        .map_or(("internal".into(), String::new()), |e| {
                            (e.kind.clone(), e.message.clone())
                        });
                    self.hub.push_event(&WorkflowEvent::now(
                        self.run.id,
                        WorkflowEventKind::WorkflowFailed {
                            error_kind,
                            message,
                        },
                    ));
                }
            }
            tracing::info!(run_id = %self.run.id, status = %self.run.status, "run finished");
        }
    }

    // ── dispatch ────────────────────────────────────────────────────────

    async fn dispatch_pending(&mut self) -> Result<(), CoordinatorError> {
        if self.run.status.is_terminal() {
            return Ok(());
        }
        let pending = self.store.tokens_with_status(TokenStatus::Pending).await?;
        for token in pending {
            let attempt = self.attempts.get(&token.id).copied().unwrap_or(0) + 1;
            self.attempts.insert(token.id, attempt);
            self.dispatch_token(token, attempt).await?;
            if self.run.status.is_terminal() {
                break;
            }
        }
        Ok(())
    }

    async fn dispatch_token(
        &mut self,
        token: TokenRecord,
        attempt: u32,
    ) -> Result<(), CoordinatorError> {
        let Some(node) = self.definition.node(&token.node_ref).cloned() else {
            return self
                .plan_and_commit(
                    None,
                    Trigger::CancelRun {
                        reason: format!("node {} not in definition", token.node_ref),
                        kind: ErrorKind::Definition,
                    },
                )
                .await;
        };
        let task = match self.gateway.task(&node.task_ref, node.task_revision).await {
            Ok(task) => task,
            Err(err) => {
                return self
                    .plan_and_commit(
                        None,
                        Trigger::CancelRun {
                            reason: err.to_string(),
                            kind: ErrorKind::Definition,
                        },
                    )
                    .await;
            }
        };

        let timeout = node
            .timeout_ms
            .or(task.timeout_ms)
            .map_or(self.config.default_task_timeout, Duration::from_millis);
        let deadline = Utc::now()
            + chrono::Duration::milliseconds(i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX));

        let tokens = self.store.tokens().await?;
        let dispatch =
            dispatcher::prepare_dispatch(&token, tokens, &self.ctx, &node, &task, attempt, Some(deadline));
        self.commit_plan(dispatch.plan).await?;
        self.hub.push_event(&WorkflowEvent::now(
            self.run.id,
            WorkflowEventKind::TaskStarted {
                token_id: token.id,
                node_ref: token.node_ref.clone(),
                task_ref: node.task_ref.clone(),
            },
        ));
        self.metrics.counter("tasks_dispatched_total").inc();

        match dispatch.outcome {
            DispatchOutcome::Invoke(invocation) => {
                tracing::debug!(
                    run_id = %self.run.id,
                    token_id = %token.id,
                    task = %node.task_ref,
                    attempt,
                    "invoking executor"
                );
                self.in_flight.insert(token.id, attempt);
                let executor = Arc::clone(&self.executor);
                let commands = self.commands.clone();
                let cancelled = self.cancellation.clone();
                let token_id = token.id;
                tokio::spawn(async move {
                    let command = tokio::select! {
                        () = cancelled.cancelled() => return,
                        outcome = tokio::time::timeout(timeout, executor.invoke(invocation)) => {
                            match outcome {
                                Ok(result) => Command::ExecutorDone {
                                    token_id,
                                    attempt,
                                    result,
                                },
                                Err(_elapsed) => Command::AttemptTimeout { token_id, attempt },
                            }
                        }
                    };
                    let _ = commands.send(command).await;
                });
                Ok(())
            }
            DispatchOutcome::RejectInput(err) => {
                self.settle_failure(
                    token.id,
                    attempt,
                    TaskFailure::fatal("schema_violation", format!("task input: {err}")),
                )
                .await
            }
        }
    }

    // ── executor replies ────────────────────────────────────────────────

    async fn on_executor_done(
        &mut self,
        token_id: TokenId,
        attempt: u32,
        result: Result<ExecutorReply, TransportError>,
    ) -> Result<(), CoordinatorError> {
        if self.in_flight.get(&token_id) != Some(&attempt) {
            // A stale reply: the attempt timed out or the token was
            // already settled. Its effect on context is discarded.
            tracing::debug!(token_id = %token_id, attempt, "discarding stale executor reply");
            return Ok(());
        }
        self.in_flight.remove(&token_id);
        if self.run.status.is_terminal() {
            return Ok(());
        }
        let record = self.store.token(token_id).await?;
        if record.status != TokenStatus::Running {
            tracing::debug!(token_id = %token_id, status = %record.status, "discarding reply for settled token");
            return Ok(());
        }

        match result {
            Ok(ExecutorReply::Completed { output }) => {
                let task = self.task_for(&record).await?;
                self.hub.push_event(&WorkflowEvent::now(
                    self.run.id,
                    WorkflowEventKind::TaskCompleted {
                        token_id,
                        node_ref: record.node_ref.clone(),
                    },
                ));
                self.plan_and_commit(
                    Some(task),
                    Trigger::TaskCompleted {
                        token_id,
                        output,
                        attempt,
                    },
                )
                .await?;
                self.dispatch_pending().await?;
                Ok(())
            }
            Ok(ExecutorReply::Failed { error }) => {
                self.settle_failure(token_id, attempt, error).await
            }
            Err(transport) => {
                self.settle_failure(
                    token_id,
                    attempt,
                    TaskFailure::retryable("transport", transport.message),
                )
                .await
            }
        }
    }

    async fn on_attempt_timeout(
        &mut self,
        token_id: TokenId,
        attempt: u32,
    ) -> Result<(), CoordinatorError> {
        if self.in_flight.get(&token_id) != Some(&attempt) {
            return Ok(());
        }
        self.in_flight.remove(&token_id);
        if self.run.status.is_terminal() {
            return Ok(());
        }
        tracing::warn!(token_id = %token_id, attempt, "task attempt timed out");
        self.executor.cancel(token_id).await;
        self.settle_failure(
            token_id,
            attempt,
            TaskFailure::retryable("timeout", "task attempt exceeded its deadline"),
        )
        .await
    }

    /// Apply the retry policy to a failed attempt: either schedule the
    /// next attempt or run the task-failure pass.
    async fn settle_failure(
        &mut self,
        token_id: TokenId,
        attempt: u32,
        failure: TaskFailure,
    ) -> Result<(), CoordinatorError> {
        let record = self.store.token(token_id).await?;
        if record.status != TokenStatus::Running {
            return Ok(());
        }
        self.hub.push_event(&WorkflowEvent::now(
            self.run.id,
            WorkflowEventKind::TaskFailed {
                token_id,
                node_ref: record.node_ref.clone(),
                error: failure.to_string(),
            },
        ));

        let task = self.task_for(&record).await?;
        let policy = task.retry_policy();
        if failure.retryable && policy.admits_retry(attempt) {
            tracing::debug!(
                token_id = %token_id,
                attempt,
                max_attempts = policy.max_attempts,
                "scheduling retry"
            );
            // The attempt's failure stays visible on the trace even
            // though the token keeps running towards its next attempt.
            let plan = Plan {
                decisions: Vec::new(),
                events: vec![TraceEventKind::TaskEnd {
                    token_id,
                    node_ref: record.node_ref,
                    outcome: "failed".into(),
                    attempt,
                }],
                context_after: self.ctx.clone(),
                tokens_after: Vec::new(),
            };
            self.commit_plan(plan).await?;

            let commands = self.commands.clone();
            let cancelled = self.cancellation.clone();
            let backoff = Duration::from_millis(policy.backoff_ms);
            let next_attempt = attempt + 1;
            tokio::spawn(async move {
                tokio::select! {
                    () = cancelled.cancelled() => {}
                    () = tokio::time::sleep(backoff) => {
                        let _ = commands
                            .send(Command::Retry {
                                token_id,
                                attempt: next_attempt,
                            })
                            .await;
                    }
                }
            });
            Ok(())
        } else {
            self.plan_and_commit(
                Some(task),
                Trigger::TaskFailed {
                    token_id,
                    error: failure,
                    attempt,
                },
            )
            .await
        }
    }

    async fn on_retry(&mut self, token_id: TokenId, attempt: u32) -> Result<(), CoordinatorError> {
        if self.run.status.is_terminal() {
            return Ok(());
        }
        let record = self.store.token(token_id).await?;
        if record.status != TokenStatus::Running {
            return Ok(());
        }
        self.attempts.insert(token_id, attempt);
        self.dispatch_token(record, attempt).await
    }

    // ── queries and subscriptions ───────────────────────────────────────

    async fn subscribe(
        &mut self,
        filter: SubscriptionFilter,
        since_sequence: Option<u64>,
    ) -> Result<(SubscriptionId, mpsc::Receiver<StreamFrame>), CoordinatorError> {
        let (id, receiver) = self.hub.subscribe(filter);
        if let Some(since) = since_sequence {
            // Single-writer: no commit can interleave between this read
            // and the registration above, so the catch-up is gapless.
            let backlog = self.store.trace(since, None).await?;
            self.hub.push_backlog(id, &backlog);
        }
        Ok((id, receiver))
    }

    async fn task_for(
        &self,
        token: &TokenRecord,
    ) -> Result<Arc<TaskDefinition>, CoordinatorError> {
        let node = self
            .definition
            .node(&token.node_ref)
            .ok_or_else(|| {
                CoordinatorError::Internal(format!("node {} not in definition", token.node_ref))
            })?;
        Ok(self.gateway.task(&node.task_ref, node.task_revision).await?)
    }

    /// Internal invariant violated: mark the run `failed(internal)` and
    /// keep it for inspection.
    async fn quarantine(&mut self, err: &CoordinatorError) {
        tracing::error!(run_id = %self.run.id, error = %err, "quarantining run");
        if self.run.status.is_terminal() {
            return;
        }
        self.run.status = RunStatus::Failed;
        self.run.error = Some(crate::error::run_error(
            ErrorKind::Internal,
            err.to_string(),
            None,
            None,
            None,
        ));
        self.run.updated_at = Utc::now();
        let mut batch = weft_store::ApplyBatch::new();
        batch.run = Some(self.run.clone());
        batch.events = vec![TraceEventKind::CompletionFail {
            error_kind: ErrorKind::Internal.as_str().to_owned(),
            message: err.to_string(),
        }];
        if let Ok(events) = self.store.apply(batch).await {
            self.hub.push_trace(&events);
        }
        self.after_pass().await;
    }

    fn arm_workflow_deadline(&self) {
        let Some(timeout_ms) = self.definition.timeout_ms else {
            return;
        };
        let commands = self.commands.clone();
        let cancelled = self.cancellation.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                () = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                    let _ = commands.send(Command::WorkflowDeadline).await;
                }
            }
        });
    }
}
