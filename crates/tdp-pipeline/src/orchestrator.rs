//! Pipeline orchestration
//!
//! Drives the three stages in fixed order and owns everything the stages do
//! not: attempt accounting, backoff between retries, per-stage deadlines,
//! cooperative cancellation, and event emission. Stages stay oblivious to
//! retries; every attempt calls them fresh.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::connector::ConnectorRegistry;
use crate::error::{PipelineError, StageError, TransformError};
use crate::events::{EventSink, PipelineEvent, TracingSink};
use crate::extract::ExtractStage;
use crate::load::LoadStage;
use crate::retry::RetryPolicy;
use crate::state::{RunState, StageKind};
use crate::transform::TransformStage;

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    extract: ExtractStage,
    transform: TransformStage,
    load: LoadStage,
    retry: RetryPolicy,
    connector: Arc<ConnectorRegistry>,
    sink: Arc<dyn EventSink>,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig, connector: Arc<ConnectorRegistry>) -> Self {
        Self::with_sink(config, connector, Arc::new(TracingSink))
    }

    pub fn with_sink(
        config: PipelineConfig,
        connector: Arc<ConnectorRegistry>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            extract: ExtractStage::new(config.extract.clone()),
            transform: TransformStage::new(),
            load: LoadStage::new(config.load.clone()),
            retry: RetryPolicy::new(config.retry),
            config,
            connector,
            sink,
        }
    }

    /// Run the pipeline to completion.
    pub async fn run(&self, source: &Path, destination: &str) -> Result<RunState, PipelineError> {
        self.run_with_cancel(source, destination, &CancellationToken::new())
            .await
    }

    /// Run the pipeline, stopping between stages (and between retry
    /// attempts) once `cancel` fires. An attempt already in flight runs to
    /// completion.
    pub async fn run_with_cancel(
        &self,
        source: &Path,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<RunState, PipelineError> {
        let mut run = RunState::new(source, destination);
        run.mark_running();
        info!(
            run_id = %run.run_id,
            source = %source.display(),
            destination,
            "pipeline run starting"
        );
        self.sink.emit(&PipelineEvent::RunStarted {
            run_id: run.run_id,
            destination: destination.to_string(),
        });

        match self.drive(&mut run, cancel).await {
            Ok(()) => {
                run.mark_succeeded();
                self.sink.emit(&PipelineEvent::RunFinished {
                    run_id: run.run_id,
                    status: run.status,
                });
                info!(
                    run_id = %run.run_id,
                    rows = run.rows_loaded().unwrap_or(0),
                    "pipeline run succeeded"
                );
                Ok(run)
            }
            Err(err) => {
                run.mark_failed();
                self.sink.emit(&PipelineEvent::RunFinished {
                    run_id: run.run_id,
                    status: run.status,
                });
                error!(
                    run_id = %run.run_id,
                    stage = %err.stage,
                    kind = err.source.kind(),
                    attempts = err.attempts,
                    error = %err.source,
                    "pipeline run failed"
                );
                Err(err)
            }
        }
    }

    async fn drive(&self, run: &mut RunState, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let timeouts = self.config.timeouts;
        let source = run.source.clone();
        let destination = run.destination.clone();

        let extracted = self
            .run_stage(run, StageKind::Extract, cancel, timeouts.extract(), || {
                let stage = &self.extract;
                let source = source.clone();
                async move { stage.extract(&source).await.map_err(StageError::from) }.boxed()
            })
            .await?;
        run.stage_mut(StageKind::Extract).rows = Some(extracted.len() as u64);
        self.sink.emit(&PipelineEvent::RowCount {
            run_id: run.run_id,
            stage: StageKind::Extract,
            rows: extracted.len() as u64,
        });

        let cleaned = self
            .run_stage(run, StageKind::Transform, cancel, timeouts.transform(), || {
                let stage = self.transform;
                let input = extracted.clone();
                async move {
                    // The cleaning pass is pure CPU; keep it off the runtime
                    // worker threads.
                    tokio::task::spawn_blocking(move || stage.transform(&input))
                        .await
                        .map_err(|_| {
                            StageError::Transform(TransformError::SchemaMismatch(
                                "transform task panicked".to_string(),
                            ))
                        })?
                        .map_err(StageError::from)
                }
                .boxed()
            })
            .await?;
        run.stage_mut(StageKind::Transform).rows = Some(cleaned.len() as u64);
        info!(
            run_id = %run.run_id,
            input_rows = extracted.len(),
            retained_rows = cleaned.len(),
            dropped_rows = extracted.len() - cleaned.len(),
            "cleaning rules applied"
        );
        self.sink.emit(&PipelineEvent::RowCount {
            run_id: run.run_id,
            stage: StageKind::Transform,
            rows: cleaned.len() as u64,
        });

        let result = self
            .run_stage(run, StageKind::Load, cancel, timeouts.load(), || {
                let connector = Arc::clone(&self.connector);
                let stage = &self.load;
                let destination = destination.clone();
                let dataset = &cleaned;
                async move {
                    let dest = connector
                        .acquire(&destination)
                        .await
                        .map_err(StageError::Load)?;
                    stage.load(dataset, &dest).await
                }
                .boxed()
            })
            .await?;
        run.stage_mut(StageKind::Load).rows = Some(result.rows_written);
        self.sink.emit(&PipelineEvent::RowCount {
            run_id: run.run_id,
            stage: StageKind::Load,
            rows: result.rows_written,
        });

        Ok(())
    }

    /// Drive one stage through its attempts. `attempt_fn` builds a fresh
    /// future per attempt.
    async fn run_stage<'a, T, F>(
        &self,
        run: &mut RunState,
        stage: StageKind,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
        attempt_fn: F,
    ) -> Result<T, PipelineError>
    where
        F: Fn() -> BoxFuture<'a, Result<T, StageError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            if cancel.is_cancelled() {
                // Nothing started for this attempt; the stage keeps the
                // state it already had.
                warn!(run_id = %run.run_id, %stage, "run cancelled");
                return Err(PipelineError {
                    stage,
                    attempts: attempt - 1,
                    source: StageError::Cancelled { stage },
                });
            }

            run.stage_mut(stage).begin_attempt(attempt);
            self.sink.emit(&PipelineEvent::StageStarted {
                run_id: run.run_id,
                stage,
                attempt,
            });

            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt_fn()).await {
                    Ok(result) => result,
                    Err(_) => Err(StageError::Timeout { stage }),
                },
                None => attempt_fn().await,
            };

            match outcome {
                Ok(value) => {
                    run.stage_mut(stage).mark_succeeded();
                    self.sink.emit(&PipelineEvent::StageSucceeded {
                        run_id: run.run_id,
                        stage,
                        attempt,
                    });
                    return Ok(value);
                }
                Err(err) => {
                    let will_retry = self.retry.should_retry(&err, attempt);
                    self.sink.emit(&PipelineEvent::StageFailed {
                        run_id: run.run_id,
                        stage,
                        kind: err.kind(),
                        attempt,
                        will_retry,
                    });

                    if !will_retry {
                        run.stage_mut(stage).mark_failed();
                        error!(
                            run_id = %run.run_id,
                            %stage,
                            attempt,
                            kind = err.kind(),
                            error = %err,
                            "stage failed"
                        );
                        return Err(PipelineError {
                            stage,
                            attempts: attempt,
                            source: err,
                        });
                    }

                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        run_id = %run.run_id,
                        %stage,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "stage failed, backing off"
                    );
                    run.stage_mut(stage).mark_retrying();

                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            run.stage_mut(stage).mark_failed();
                            warn!(run_id = %run.run_id, %stage, "run cancelled during backoff");
                            return Err(PipelineError {
                                stage,
                                attempts: attempt,
                                source: StageError::Cancelled { stage },
                            });
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }
}
