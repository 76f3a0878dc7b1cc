//! A [`Client`] that forwards every call over bounded channels.
//!
//! The engine side ([`ChannelClient`]) lives on the inference thread. The host
//! side ([`ClientEndpoint`]) is owned by whatever thread renders questions and
//! collects answers. At most one query is outstanding at a time; each carries
//! an id so that a late answer to an abandoned query is discarded instead of
//! being taken for the answer to the next one.

use std::sync::mpsc::{
    sync_channel, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError,
};
use std::thread;
use std::time::{Duration, Instant};

use super::{Client, ClientError, Prompt, Question};
use crate::cancel::CancelToken;

/// Work sent from the engine to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Write { message: Prompt },
    Query { id: u64, question: Question },
}

/// The host's reply to [`ClientRequest::Query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub id: u64,
    pub label: String,
}

/// Create a connected client/endpoint pair.
///
/// `capacity` bounds the request queue (writes may run ahead of the host by
/// that many messages); `poll_interval` is how often a blocked call re-checks
/// `cancel` and its deadline.
pub fn channel(
    capacity: usize,
    poll_interval: Duration,
    cancel: CancelToken,
) -> (ChannelClient, ClientEndpoint) {
    let (request_tx, request_rx) = sync_channel(capacity.max(1));
    let (answer_tx, answer_rx) = sync_channel(1);
    (
        ChannelClient {
            requests: request_tx,
            answers: answer_rx,
            cancel,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            next_id: 1,
        },
        ClientEndpoint {
            requests: request_rx,
            answers: answer_tx,
        },
    )
}

pub struct ChannelClient {
    requests: SyncSender<ClientRequest>,
    answers: Receiver<Answer>,
    cancel: CancelToken,
    poll_interval: Duration,
    next_id: u64,
}

impl ChannelClient {
    /// Queue `request`, waiting while the host lags behind. `expires` bounds
    /// the wait for queries with a deadline.
    fn send(
        &self,
        mut request: ClientRequest,
        expires: Option<Instant>,
    ) -> Result<(), ClientError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            match self.requests.try_send(request) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    request = back;
                    let wait = match expires {
                        Some(expires) => {
                            let now = Instant::now();
                            if now >= expires {
                                return Err(ClientError::TimedOut);
                            }
                            (expires - now).min(self.poll_interval)
                        }
                        None => self.poll_interval,
                    };
                    thread::sleep(wait);
                }
                Err(TrySendError::Disconnected(_)) => return Err(ClientError::Disconnected),
            }
        }
    }

    fn drain_stale(&self) {
        while let Ok(stale) = self.answers.try_recv() {
            tracing::debug!(id = stale.id, "discarding stale answer");
        }
    }
}

impl Client for ChannelClient {
    fn write(&mut self, message: &Prompt) -> Result<(), ClientError> {
        self.send(
            ClientRequest::Write {
                message: message.clone(),
            },
            None,
        )
    }

    fn query(&mut self, question: &Question) -> Result<String, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        // The deadline covers queueing the question as well as the answer.
        let expires = question.deadline.map(|deadline| Instant::now() + deadline);

        self.drain_stale();
        self.send(
            ClientRequest::Query {
                id,
                question: question.clone(),
            },
            expires,
        )?;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            let wait = match expires {
                Some(expires) => {
                    let now = Instant::now();
                    if now >= expires {
                        return Err(ClientError::TimedOut);
                    }
                    (expires - now).min(self.poll_interval)
                }
                None => self.poll_interval,
            };
            match self.answers.recv_timeout(wait) {
                Ok(answer) if answer.id == id => return Ok(answer.label),
                Ok(answer) => {
                    tracing::debug!(id = answer.id, expected = id, "discarding stale answer");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(ClientError::Disconnected),
            }
        }
    }
}

/// Host side of [`channel`].
pub struct ClientEndpoint {
    requests: Receiver<ClientRequest>,
    answers: SyncSender<Answer>,
}

impl ClientEndpoint {
    /// Next request; `None` once the engine dropped its client.
    pub fn recv(&self) -> Option<ClientRequest> {
        self.requests.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ClientRequest>, ClientError> {
        match self.requests.recv_timeout(timeout) {
            Ok(request) => Ok(Some(request)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ClientError::Disconnected),
        }
    }

    pub fn try_recv(&self) -> Result<Option<ClientRequest>, ClientError> {
        match self.requests.try_recv() {
            Ok(request) => Ok(Some(request)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ClientError::Disconnected),
        }
    }

    pub fn answer(&self, id: u64, label: impl Into<String>) -> Result<(), ClientError> {
        self.answers
            .send(Answer {
                id,
                label: label.into(),
            })
            .map_err(|_| ClientError::Disconnected)
    }

    /// Answer every request with `client` until the engine hangs up.
    ///
    /// A failing `client` ends the loop and drops the endpoint, which the
    /// engine observes as a disconnect.
    pub fn serve<C: Client>(self, mut client: C) -> Result<(), ClientError> {
        while let Some(request) = self.recv() {
            match request {
                ClientRequest::Write { message } => client.write(&message)?,
                ClientRequest::Query { id, question } => {
                    let label = client.query(&question)?;
                    // The engine may have given up on this query already.
                    let _ = self.answer(id, label);
                }
            }
        }
        Ok(())
    }
}
