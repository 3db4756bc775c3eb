//! Job driver
//!
//! Submits one request on an open [`TransportSession`] and feeds every
//! event, in receipt order, into a [`FlowRenderer`].

use crate::error::LivegenError;
use crate::flow::{FlowRenderer, FlowUpdate};
use livegen_transport::{JobOutcome, JobRequest, TransportError, TransportSession};
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a finished job
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job_id: Uuid,
    pub outcome: JobOutcome,
    /// Every update applied to the screens, in order
    pub updates: Vec<FlowUpdate>,
}

/// Run `request` to its terminal event, or until `cancel` resolves
///
/// Cancelling closes the session and returns `Cancelled`; sessions in
/// `flow` keep whatever the events applied so far left them with.
///
/// # Errors
/// The transport error that ended the job, `Server` when it ended with an
/// `error` event
pub async fn run_job<S, C>(
    session: &mut TransportSession<S>,
    request: &JobRequest,
    flow: &mut FlowRenderer,
    cancel: C,
) -> Result<JobReport, LivegenError>
where
    S: AsyncRead + AsyncWrite,
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);
    let handle = session.submit(request).await?;
    let job_id = handle.job_id();
    let mut updates = Vec::new();

    loop {
        tokio::select! {
            biased;
            () = &mut cancel => {
                session.close().await;
                info!(job = %job_id, applied = updates.len(), "job cancelled by caller");
                return Err(TransportError::Cancelled.into());
            }
            event = session.next_event() => match event {
                Ok(Some(event)) => updates.extend(flow.apply(&event)),
                Ok(None) => break,
                Err(err) => {
                    warn!(job = %job_id, error = %err, "job aborted");
                    return Err(err.into());
                }
            }
        }
    }

    let outcome = handle.wait().await?;
    info!(job = %job_id, events = outcome.events, "job complete");
    Ok(JobReport {
        job_id,
        outcome,
        updates,
    })
}
