//! Human-in-the-loop execution control
//!
//! [`ExecutionControlService`] sits between the application and the
//! execution control API. It caches status briefly, runs one polling
//! monitor per thread, and performs rollback and resume on request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentwire_core::{invoke_guarded, ActiveStreams, HilEvent, HilHandler, InterruptInfo};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::StatusCache;
use crate::client::ExecutionApi;
use crate::error::ExecutionError;
use crate::monitor::{MonitorCallbacks, MonitorConfig, PollDecision, PollSchedule, StopReason};
use crate::streaming::{consume_resume_stream, ResumeCallbacks, ResumeStreamSummary};
use crate::types::{
    ExecutionHealth, ExecutionHistory, ExecutionStatus, HilExecutionStatusData, ResumeRequest,
    ResumeResult, RollbackResult,
};

struct MonitorHandle {
    generation: u64,
    task: JoinHandle<()>,
}

struct Inner {
    api: Arc<dyn ExecutionApi>,
    config: MonitorConfig,
    cache: StatusCache,
    /// Serializes status fetches per thread so one cache window costs one request
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
    next_generation: AtomicU64,
    streams: ActiveStreams,
}

impl Inner {
    async fn status(&self, thread_id: &str) -> Result<ExecutionStatus, ExecutionError> {
        let swept = self.cache.sweep();
        if swept > 0 {
            log::debug!("Swept {} expired status entries", swept);
        }
        // A lock only the map refers to has no fetch in flight.
        self.fetch_locks
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        if let Some(status) = self.cache.get_fresh(thread_id) {
            return Ok(status);
        }

        let lock = self
            .fetch_locks
            .lock()
            .entry(thread_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have filled the cache while we waited.
        if let Some(status) = self.cache.get_fresh(thread_id) {
            return Ok(status);
        }

        let status = self.api.status(thread_id).await?;
        self.cache.store(thread_id, status.clone(), Instant::now());
        Ok(status)
    }

    /// Deregister a monitor that stopped on its own
    fn finish_monitor(&self, thread_id: &str, generation: u64) {
        let mut monitors = self.monitors.lock();
        if monitors
            .get(thread_id)
            .is_some_and(|handle| handle.generation == generation)
        {
            monitors.remove(thread_id);
        }
    }
}

/// Client-side coordinator for paused and resumable executions
///
/// Cheap to clone; clones share the cache, monitors and stream registry.
/// Monitors run as tokio tasks and keep running after the last clone is
/// dropped, so call [`Self::stop_all_monitoring`] on shutdown.
#[derive(Clone)]
pub struct ExecutionControlService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ExecutionControlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionControlService")
            .field("config", &self.inner.config)
            .field("cached", &self.inner.cache.len())
            .field("monitors", &self.inner.monitors.lock().len())
            .field("streams", &self.inner.streams)
            .finish()
    }
}

impl ExecutionControlService {
    pub fn new(api: Arc<dyn ExecutionApi>) -> Self {
        Self::with_config(api, MonitorConfig::default())
    }

    pub fn with_config(api: Arc<dyn ExecutionApi>, config: MonitorConfig) -> Self {
        Self::with_active_streams(api, config, ActiveStreams::new())
    }

    /// Share a stream registry with the primary chat stream
    ///
    /// While the primary stream holds a lease for a thread, resume streams
    /// for that thread are refused.
    pub fn with_active_streams(
        api: Arc<dyn ExecutionApi>,
        config: MonitorConfig,
        streams: ActiveStreams,
    ) -> Self {
        let cache = StatusCache::new(config.cache_ttl, config.cache_sweep_factor);
        Self {
            inner: Arc::new(Inner {
                api,
                config,
                cache,
                fetch_locks: Mutex::new(HashMap::new()),
                monitors: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                streams,
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn active_streams(&self) -> &ActiveStreams {
        &self.inner.streams
    }

    /// Number of threads with a cached status, fresh or not
    pub fn cached_status_count(&self) -> usize {
        self.inner.cache.len()
    }

    // ===== Request/response =====

    /// Current status, served from cache when fetched within the TTL
    pub async fn get_execution_status(
        &self,
        thread_id: &str,
    ) -> Result<ExecutionStatus, ExecutionError> {
        self.inner.status(thread_id).await
    }

    pub async fn get_execution_history(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<ExecutionHistory, ExecutionError> {
        self.inner.api.history(thread_id, limit).await
    }

    pub async fn get_health(&self) -> Result<ExecutionHealth, ExecutionError> {
        self.inner.api.health().await
    }

    /// Roll a thread back to a checkpoint
    ///
    /// A refused rollback is `Ok` with `success == false`. Never retried.
    pub async fn rollback_to_checkpoint(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<RollbackResult, ExecutionError> {
        let result = self.inner.api.rollback(thread_id, checkpoint_id).await?;
        if result.success {
            self.inner.cache.invalidate(thread_id);
        }
        Ok(result)
    }

    pub async fn resume_execution(
        &self,
        request: &ResumeRequest,
    ) -> Result<ResumeResult, ExecutionError> {
        let result = self.inner.api.resume(request).await?;
        self.inner.cache.invalidate(&request.thread_id);
        Ok(result)
    }

    /// Resume and read the resulting event stream to the end
    ///
    /// Fails with [`ExecutionError::StreamConflict`] while another stream for
    /// the same thread is registered in [`Self::active_streams`].
    pub async fn resume_execution_stream(
        &self,
        request: &ResumeRequest,
        callbacks: &dyn ResumeCallbacks,
    ) -> Result<ResumeStreamSummary, ExecutionError> {
        let _lease = self.inner.streams.open(&request.thread_id)?;
        let body = self.inner.api.resume_stream(request).await?;
        let summary = consume_resume_stream(body, callbacks).await;
        self.inner.cache.invalidate(&request.thread_id);
        summary
    }

    // ===== Monitoring =====

    /// Start polling `thread_id`, replacing any monitor already running for it
    ///
    /// The first poll happens immediately. Must be called within a tokio
    /// runtime.
    pub fn monitor_execution(
        &self,
        thread_id: &str,
        callbacks: Arc<dyn MonitorCallbacks>,
        poll_interval: Option<Duration>,
    ) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let schedule = PollSchedule::from_config(&self.inner.config, poll_interval);

        let mut monitors = self.inner.monitors.lock();
        if let Some(previous) = monitors.remove(thread_id) {
            log::debug!("Replacing monitor for {}", thread_id);
            previous.task.abort();
        }
        let task = tokio::spawn(run_monitor(
            self.inner.clone(),
            thread_id.to_string(),
            generation,
            callbacks,
            schedule,
        ));
        monitors.insert(thread_id.to_string(), MonitorHandle { generation, task });
        log::info!("Monitoring execution of {}", thread_id);
    }

    /// Returns `false` if no monitor was running
    pub fn stop_monitoring(&self, thread_id: &str) -> bool {
        match self.inner.monitors.lock().remove(thread_id) {
            Some(handle) => {
                handle.task.abort();
                log::info!("Stopped monitoring {}", thread_id);
                true
            }
            None => false,
        }
    }

    /// Stop every monitor and clear the status cache
    pub fn stop_all_monitoring(&self) {
        let handles: Vec<_> = self.inner.monitors.lock().drain().collect();
        for (thread_id, handle) in &handles {
            handle.task.abort();
            log::debug!("Stopped monitoring {}", thread_id);
        }
        self.inner.cache.clear();
        self.inner.fetch_locks.lock().clear();
        log::info!("Stopped {} monitors", handles.len());
    }

    #[cfg(test)]
    fn fetch_lock_count(&self) -> usize {
        self.inner.fetch_locks.lock().len()
    }

    pub fn is_monitoring(&self, thread_id: &str) -> bool {
        self.inner.monitors.lock().contains_key(thread_id)
    }

    /// Deliver an interrupt detected in-band, without waiting for a poll
    ///
    /// Stops the thread's monitor, since interrupts are resolved by an
    /// explicit resume rather than rediscovered by polling.
    pub fn push_interrupt(
        &self,
        thread_id: &str,
        interrupt: &InterruptInfo,
        callbacks: &dyn MonitorCallbacks,
    ) {
        self.stop_monitoring(thread_id);
        self.inner.cache.invalidate(thread_id);
        invoke_guarded("on_interrupt_detected", || {
            callbacks.on_interrupt_detected(thread_id, interrupt)
        });
    }

    /// HIL handler that forwards router-detected interrupts to [`Self::push_interrupt`]
    ///
    /// Interrupts that do not name a thread are attributed to `thread_id`.
    /// Install it as the router's default HIL handler.
    pub fn interrupt_handler(
        &self,
        thread_id: &str,
        callbacks: Arc<dyn MonitorCallbacks>,
    ) -> Arc<dyn HilHandler> {
        let service = self.clone();
        let default_thread = thread_id.to_string();
        Arc::new(move |event: &HilEvent| {
            let (explicit, info) = match event {
                HilEvent::Interrupt(interrupt) => (&interrupt.thread_id, interrupt.to_info()),
                HilEvent::ApprovalRequired(request) => {
                    (&request.thread_id, request.to_info("approval"))
                }
                HilEvent::ReviewRequired(request) => (&request.thread_id, request.to_info("review")),
                HilEvent::InputRequired(request) => (&request.thread_id, request.to_info("input")),
                HilEvent::Checkpoint { .. } | HilEvent::Status(_) => return,
            };
            let target = explicit.as_deref().unwrap_or(&default_thread);
            service.push_interrupt(target, &info, callbacks.as_ref());
        })
    }
}

async fn run_monitor(
    inner: Arc<Inner>,
    thread_id: String,
    generation: u64,
    callbacks: Arc<dyn MonitorCallbacks>,
    mut schedule: PollSchedule,
) {
    let (status, data, reason) = loop {
        let status = match inner.status(&thread_id).await {
            Ok(status) => status,
            Err(e) => {
                log::error!("Status poll for {} failed: {}", thread_id, e);
                inner.finish_monitor(&thread_id, generation);
                invoke_guarded("on_error", || callbacks.on_error(&thread_id, &e));
                return;
            }
        };

        let data = HilExecutionStatusData::from(&status);
        invoke_guarded("on_status_changed", || callbacks.on_status_changed(&data));

        match schedule.next(status.status) {
            PollDecision::Continue(delay) => tokio::time::sleep(delay).await,
            PollDecision::Stop(reason) => break (status, data, reason),
        }
    };

    // Final callbacks observe the monitor as stopped.
    inner.finish_monitor(&thread_id, generation);
    log::info!("Stopped monitoring {}: status {}", thread_id, status.status);

    match reason {
        StopReason::Interrupted => {
            for interrupt in &status.interrupts {
                invoke_guarded("on_interrupt_detected", || {
                    callbacks.on_interrupt_detected(&thread_id, interrupt)
                });
            }
        }
        StopReason::Completed => {
            invoke_guarded("on_completed", || callbacks.on_completed(&data));
        }
        StopReason::Failed => {}
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
