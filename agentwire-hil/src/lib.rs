//! Human-in-the-loop execution control for agent backends
//!
//! When an agent pauses for human input, the decision travels over a control
//! plane separate from the chat stream. This crate is the client side of it:
//!
//! - [`ExecutionClient`] talks to `/api/execution/*` over HTTP
//! - [`ExecutionControlService`] caches status, polls on an adaptive
//!   schedule, and drives rollback and resume
//! - [`consume_resume_stream`] decodes the resume SSE stream
//!
//! # Monitoring a Thread
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentwire_core::InterruptInfo;
//! use agentwire_hil::{ExecutionClient, ExecutionControlService, MonitorCallbacks};
//!
//! struct Ui;
//!
//! impl MonitorCallbacks for Ui {
//!     fn on_interrupt_detected(&self, thread_id: &str, interrupt: &InterruptInfo) {
//!         println!("{} is waiting on {}", thread_id, interrupt.id);
//!     }
//! }
//!
//! # async fn example() -> Result<(), agentwire_hil::ExecutionError> {
//! let client = ExecutionClient::from_env()?;
//! let service = ExecutionControlService::new(Arc::new(client));
//! service.monitor_execution("thread-1", Arc::new(Ui), None);
//! # Ok(())
//! # }
//! ```
//!
//! # Resuming
//!
//! ```no_run
//! use agentwire_hil::{ResumeAction, ResumeData, ResumeRequest, ResumeStreamEvent};
//!
//! # async fn example(service: agentwire_hil::ExecutionControlService) -> Result<(), agentwire_hil::ExecutionError> {
//! let request = ResumeRequest::new("thread-1", ResumeAction::Continue)
//!     .interrupt("int-1")
//!     .data(ResumeData::answer("us-east-1"));
//!
//! let summary = service
//!     .resume_execution_stream(&request, &|event: &ResumeStreamEvent| {
//!         println!("{:?}", event);
//!     })
//!     .await?;
//! assert!(summary.resume_ended);
//! # Ok(())
//! # }
//! ```

// Domain modules
pub mod cache;
pub mod client;
pub mod error;
pub mod monitor;
pub mod service;
pub mod streaming;
pub mod types;

// Client types
pub use client::{ByteStream, ExecutionApi, ExecutionClient, ExecutionClientBuilder, TokenSource};

// Error types
pub use error::ExecutionError;

// Service
pub use cache::StatusCache;
pub use monitor::{MonitorCallbacks, MonitorConfig, PollDecision, PollSchedule, StopReason};
pub use service::ExecutionControlService;

// Streaming
pub use streaming::{
    consume_resume_stream, ResumeCallbacks, ResumeStreamEvent, ResumeStreamSummary,
};

// Records
pub use types::{
    ExecutionHealth, ExecutionHistory, ExecutionState, ExecutionStatus, HilExecutionStatusData,
    ResumeAction, ResumeData, ResumeRequest, ResumeResult, RollbackResult,
};
