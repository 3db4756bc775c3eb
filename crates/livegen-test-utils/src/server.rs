//! Scripted job server

use livegen_transport::{Handshake, JobRequest, ServerEvent};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// What the server saw from its client
#[derive(Debug, Clone, Default)]
pub struct ServerLog {
    pub hello: Option<Handshake>,
    pub request: Option<JobRequest>,
    pub rejected: bool,
    /// Events written before the client went away
    pub sent: usize,
}

/// Replays a fixed event list to one client
#[derive(Debug, Clone, Default)]
pub struct ScriptedServer {
    token: Option<String>,
    events: Vec<ServerEvent>,
    raw_lines: Vec<(usize, String)>,
    hold_open: bool,
}

impl ScriptedServer {
    #[must_use]
    pub fn new(events: Vec<ServerEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// Reject any hello whose token differs
    #[must_use]
    pub fn expecting_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Write `line` verbatim before event number `index`
    #[must_use]
    pub fn with_raw_line(mut self, index: usize, line: impl Into<String>) -> Self {
        self.raw_lines.push((index, line.into()));
        self
    }

    /// After the script, wait for the client to hang up instead of closing
    #[must_use]
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Serve over an in-memory duplex pipe
    #[must_use]
    pub fn spawn(self) -> (DuplexStream, JoinHandle<ServerLog>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (client, tokio::spawn(self.serve(server)))
    }

    /// Serve one TCP client on an ephemeral local port
    ///
    /// # Panics
    /// If the port cannot be bound
    pub async fn listen(self) -> (SocketAddr, JoinHandle<ServerLog>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            match listener.accept().await {
                Ok((stream, _)) => self.serve(stream).await,
                Err(_) => ServerLog::default(),
            }
        });
        (addr, handle)
    }

    pub async fn serve<S: AsyncRead + AsyncWrite>(self, stream: S) -> ServerLog {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut log = ServerLog::default();

        let Ok(Some(hello)) = lines.next_line().await else {
            return log;
        };
        log.hello = serde_json::from_str(&hello).ok();
        let token = match &log.hello {
            Some(Handshake::Hello { token }) => Some(token.as_str()),
            _ => None,
        };
        let accepted = match (&self.token, token) {
            (_, None) => false,
            (Some(expected), Some(token)) => expected == token,
            (None, Some(_)) => true,
        };
        let reply = if accepted {
            Handshake::Ready
        } else {
            log.rejected = true;
            Handshake::Rejected {
                reason: "invalid token".into(),
            }
        };
        if send(&mut write, &reply).await.is_err() || !accepted {
            return log;
        }

        let Ok(Some(request)) = lines.next_line().await else {
            return log;
        };
        log.request = serde_json::from_str(&request).ok();
        tracing::debug!(request = ?log.request, "scripted server got request");

        for (index, event) in self.events.iter().enumerate() {
            for (_, line) in self.raw_lines.iter().filter(|(at, _)| *at == index) {
                if write.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                    return log;
                }
            }
            if send(&mut write, event).await.is_err() {
                return log;
            }
            log.sent += 1;
        }

        if self.hold_open {
            // Drain until the client shuts its side down
            while let Ok(Some(_)) = lines.next_line().await {}
        }
        log
    }
}

async fn send<W, T>(write: &mut W, frame: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    write.write_all(&line).await?;
    write.flush().await
}
