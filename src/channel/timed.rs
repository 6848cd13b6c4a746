use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::{ActuatorCommand, ChannelError, CommandChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Send(ActuatorCommand),
    Probe,
    Close,
}

type Reply = Result<(), ChannelError>;

/// Runs a [`CommandChannel`] on a dedicated writer thread and bounds every
/// operation by `timeout`. Probes have their own bound, since reopening a
/// link usually takes longer than a write.
///
/// The writer is the single owner of the inner channel, so commands reach it
/// in call order. While a timed-out operation is still stuck in the inner
/// channel, further calls fail with [`ChannelError::Busy`] instead of queuing.
/// A probe that finished after its caller gave up is reported by the next
/// probe call.
pub struct TimedChannel {
    requests: Option<Sender<Request>>,
    replies: Receiver<Reply>,
    timeout: Duration,
    probe_timeout: Duration,
    in_flight: Option<Request>,
    worker: Option<JoinHandle<()>>,
}

impl TimedChannel {
    pub fn spawn<C>(inner: C, timeout: Duration) -> Result<Self, ChannelError>
    where
        C: CommandChannel + Send + 'static,
    {
        let (request_tx, request_rx) = crossbeam_channel::bounded::<Request>(1);
        let (reply_tx, reply_rx) = crossbeam_channel::bounded::<Reply>(1);

        let worker = thread::Builder::new()
            .name("actuator-writer".into())
            .spawn(move || writer_loop(inner, request_rx, reply_tx))?;

        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            timeout,
            probe_timeout: timeout,
            in_flight: None,
            worker: Some(worker),
        })
    }

    /// Bounds probes by `probe_timeout` instead of the send timeout.
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout.max(self.timeout);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    fn call(&mut self, request: Request) -> Reply {
        let requests = self.requests.as_ref().ok_or(ChannelError::Closed)?;

        if let Some(pending) = self.in_flight {
            let stale = match self.replies.try_recv() {
                Ok(stale) => stale,
                Err(TryRecvError::Empty) => return Err(ChannelError::Busy),
                Err(TryRecvError::Disconnected) => {
                    return Err(ChannelError::Disconnected("writer thread exited".into()))
                }
            };
            self.in_flight = None;

            match (pending, &stale) {
                (Request::Send(command), Ok(())) => {
                    tracing::debug!("{} reached the actuator after the caller timed out", command)
                }
                (Request::Probe, Ok(())) => {
                    tracing::debug!("Timed-out probe completed successfully");
                    if request == Request::Probe {
                        return Ok(());
                    }
                }
                (pending, Err(e)) => {
                    tracing::debug!("Late failure from timed-out {:?}: {}", pending, e)
                }
                (Request::Close, Ok(())) => {}
            }
        }

        let bound = match request {
            Request::Probe => self.probe_timeout,
            _ => self.timeout,
        };

        requests
            .send_timeout(request, bound)
            .map_err(|_| ChannelError::Disconnected("writer thread exited".into()))?;

        match self.replies.recv_timeout(bound) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                self.in_flight = Some(request);
                Err(ChannelError::Timeout(bound))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ChannelError::Disconnected("writer thread exited".into()))
            }
        }
    }
}

impl CommandChannel for TimedChannel {
    fn send(&mut self, command: ActuatorCommand) -> Result<(), ChannelError> {
        self.call(Request::Send(command))
    }

    fn probe(&mut self) -> Result<(), ChannelError> {
        self.call(Request::Probe)
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        let result = self.call(Request::Close);
        // Dropping the sender stops the writer once it is idle
        self.requests = None;

        match &result {
            Ok(()) => {
                if let Some(worker) = self.worker.take() {
                    let _ = worker.join();
                }
            }
            Err(e) => {
                tracing::warn!("Actuator writer did not close cleanly ({}); detaching it", e);
                self.worker = None;
            }
        }
        result
    }
}

fn writer_loop<C: CommandChannel>(mut inner: C, requests: Receiver<Request>, replies: Sender<Reply>) {
    for request in requests.iter() {
        let (reply, last) = match request {
            Request::Send(command) => (inner.send(command), false),
            Request::Probe => (inner.probe(), false),
            Request::Close => (inner.close(), true),
        };
        if replies.send(reply).is_err() || last {
            break;
        }
    }
}
