//! Transport session
//!
//! One connection carries one job: handshake, a single [`JobRequest`], any
//! number of non-terminal events and exactly one terminal event. The
//! session hands out a [`JobHandle`] whose result is settled at most once,
//! by the terminal event, a transport failure, or [`TransportSession::close`].

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::framing::{FrameReader, FrameWriter};
use crate::wire::{Handshake, JobRequest, ServerEvent};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Successful end of a job
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub result: serde_json::Value,
    /// Events delivered, terminal event included
    pub events: usize,
}

type Settlement = Result<JobOutcome, TransportError>;

/// Pending result of a submitted job
#[derive(Debug)]
pub struct JobHandle {
    job_id: Uuid,
    rx: oneshot::Receiver<Settlement>,
}

impl JobHandle {
    #[inline]
    #[must_use]
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Wait for the job to settle
    ///
    /// # Errors
    /// The settling error; `Cancelled` if the session went away first
    pub async fn wait(self) -> Settlement {
        self.rx.await.unwrap_or(Err(TransportError::Cancelled))
    }

    /// The settlement, if it already happened
    pub fn try_result(&mut self) -> Option<Settlement> {
        match self.rx.try_recv() {
            Ok(settled) => Some(settled),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TransportError::Cancelled)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Submitted,
    Closed,
}

/// Client side of one job connection
pub struct TransportSession<S> {
    job_id: Uuid,
    credential: String,
    reader: FrameReader<ReadHalf<S>>,
    writer: FrameWriter<WriteHalf<S>>,
    state: State,
    log: Vec<ServerEvent>,
    last_seq: HashMap<String, u64>,
    pending: Option<oneshot::Sender<Settlement>>,
}

impl<S> std::fmt::Debug for TransportSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("job_id", &self.job_id)
            .field("state", &self.state)
            .field("events", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl TransportSession<TcpStream> {
    /// Connect over TCP and complete the handshake
    ///
    /// # Errors
    /// Connection failures, plus everything [`TransportSession::open`] returns
    pub async fn connect(
        addr: impl ToSocketAddrs,
        credential: impl Into<String>,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        Self::open(stream, credential, config).await
    }
}

impl<S: AsyncRead + AsyncWrite> TransportSession<S> {
    /// Perform the handshake on an established stream
    ///
    /// # Errors
    /// `Rejected` when the server refuses the credential, `HandshakeTimeout`
    /// when it does not answer in time, `Protocol` on any other reply
    pub async fn open(
        stream: S,
        credential: impl Into<String>,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let (read, write) = tokio::io::split(stream);
        let mut session = Self {
            job_id: Uuid::new_v4(),
            credential: credential.into(),
            reader: FrameReader::new(read, config.max_frame_bytes),
            writer: FrameWriter::new(write, config.max_frame_bytes),
            state: State::Open,
            log: Vec::new(),
            last_seq: HashMap::new(),
            pending: None,
        };

        session
            .writer
            .send(&Handshake::Hello {
                token: session.credential.clone(),
            })
            .await?;

        let reply = tokio::time::timeout(config.handshake_timeout(), session.reader.next::<Handshake>())
            .await
            .map_err(|_| TransportError::HandshakeTimeout {
                millis: config.handshake_timeout_ms,
            })??;

        match reply {
            Some(Handshake::Ready) => {
                info!(job = %session.job_id, "transport session open");
                Ok(session)
            }
            Some(Handshake::Rejected { reason }) => {
                warn!(job = %session.job_id, %reason, "handshake rejected");
                Err(TransportError::Rejected { reason })
            }
            Some(Handshake::Hello { .. }) => {
                Err(TransportError::Protocol("unexpected hello from server".into()))
            }
            None => Err(TransportError::Closed),
        }
    }

    #[inline]
    #[must_use]
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Events delivered so far, in receipt order
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[ServerEvent] {
        &self.log
    }

    /// Send the job request; only one per session
    ///
    /// # Errors
    /// `AlreadySubmitted` on a second request, `Cancelled` after close
    pub async fn submit(&mut self, request: &JobRequest) -> Result<JobHandle, TransportError> {
        match self.state {
            State::Open => {}
            State::Submitted => return Err(TransportError::AlreadySubmitted),
            State::Closed => return Err(TransportError::Cancelled),
        }
        if let Err(err) = self.writer.send(request).await {
            self.state = State::Closed;
            return Err(err);
        }
        let (tx, rx) = oneshot::channel();
        self.pending = Some(tx);
        self.state = State::Submitted;
        info!(job = %self.job_id, action = %request.action, "job submitted");
        Ok(JobHandle {
            job_id: self.job_id,
            rx,
        })
    }

    /// Next event in receipt order, or `None` once the session is closed
    ///
    /// Stale `checkpoint` events, whose seq does not exceed the last one
    /// delivered for the same screen, are dropped here.
    ///
    /// # Errors
    /// Any transport failure; it also settles the job handle and closes the
    /// session
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>, TransportError> {
        if self.state == State::Closed {
            return Ok(None);
        }
        loop {
            let event = match self.reader.next::<ServerEvent>().await {
                Ok(Some(event)) => event,
                Ok(None) => return Err(self.fail(TransportError::Closed)),
                Err(err) => return Err(self.fail(err)),
            };

            if let ServerEvent::Checkpoint { screen_id, seq, .. } = &event {
                let last = self.last_seq.get(screen_id.as_str()).copied();
                if last.is_some_and(|last| *seq <= last) {
                    debug!(screen_id = %screen_id, seq, last = ?last, "dropped stale checkpoint");
                    continue;
                }
                self.last_seq.insert(screen_id.clone(), *seq);
            }

            debug!(job = %self.job_id, kind = event.kind(), screen_id = ?event.screen_id(), "event");
            self.log.push(event.clone());

            match &event {
                ServerEvent::Complete { result } => {
                    self.settle(Ok(JobOutcome {
                        result: result.clone(),
                        events: self.log.len(),
                    }));
                    self.finish().await;
                }
                ServerEvent::Error { reason } => {
                    self.settle(Err(TransportError::Server {
                        reason: reason.clone(),
                    }));
                    self.finish().await;
                }
                _ => {}
            }
            return Ok(Some(event));
        }
    }

    /// Cancel the job and close the connection
    ///
    /// Idempotent. Settles a still-pending handle with `Cancelled`.
    pub async fn close(&mut self) {
        if self.state == State::Closed {
            return;
        }
        if self.pending.is_some() {
            info!(job = %self.job_id, "job cancelled");
        }
        self.settle(Err(TransportError::Cancelled));
        self.finish().await;
    }

    fn settle(&mut self, settlement: Settlement) {
        if let Some(tx) = self.pending.take() {
            // The handle may already be dropped
            let _ = tx.send(settlement);
        }
    }

    fn fail(&mut self, err: TransportError) -> TransportError {
        warn!(job = %self.job_id, error = %err, "transport failed");
        self.settle(Err(err.clone()));
        self.state = State::Closed;
        err
    }

    async fn finish(&mut self) {
        self.state = State::Closed;
        if let Err(err) = self.writer.shutdown().await {
            debug!(job = %self.job_id, error = %err, "shutdown after close");
        }
    }
}
