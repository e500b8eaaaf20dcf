#![forbid(unsafe_code)]

//! Scripted transport.
//!
//! Each connect attempt consumes the next [`Attempt`] from the script. When
//! the script runs out, the optional responder decides, and without one the
//! attempt is refused. Accepted connections replay their [`Step`]s on
//! `recv` and then stay idle until closed.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;

use mailview_runtime::{
    ChannelState, ChannelStream, Connection, Endpoint, Inbound, Transport, TransportError,
};
use web_time::{Duration, Instant};

/// One step of a scripted connection, replayed on `recv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Deliver a text payload.
    Text(String),
    /// Return `Idle` this many times.
    Idle(usize),
    /// Fail with this error.
    Fail(TransportError),
    /// Close gracefully from the server side.
    Close,
    /// Stay idle until at least `n` values have been sent on this connection.
    AwaitSends(usize),
}

/// What happens on one connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Refuse(TransportError),
    Accept(Vec<Step>),
}

impl Attempt {
    /// Connection that delivers `payloads` and then idles.
    pub fn serve<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Accept(payloads.into_iter().map(|p| Step::Text(p.into())).collect())
    }

    /// Refused with an I/O error.
    #[must_use]
    pub fn refuse() -> Self {
        Self::Refuse(TransportError::Io("connection refused".into()))
    }
}

type Responder = Box<dyn Fn(&Endpoint) -> Attempt + Send + Sync>;

#[derive(Default)]
struct Record {
    connects: Vec<(Endpoint, Instant)>,
    sent: Vec<(usize, String)>,
    closed: Vec<usize>,
}

struct Shared {
    script: Mutex<VecDeque<Attempt>>,
    responder: Option<Responder>,
    record: Mutex<Record>,
    poll: Duration,
}

/// [`Transport`] driven by a script. Clones share script and record.
#[derive(Clone)]
pub struct ScriptedTransport {
    shared: Arc<Shared>,
}

impl fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("connects", &self.connect_count())
            .finish_non_exhaustive()
    }
}

impl ScriptedTransport {
    /// Transport with a fixed script.
    pub fn new(script: impl IntoIterator<Item = Attempt>) -> Self {
        Self::build(script.into_iter().collect(), None)
    }

    /// Transport that refuses every attempt.
    #[must_use]
    pub fn refusing() -> Self {
        Self::build(VecDeque::new(), None)
    }

    /// Transport answering every attempt with `responder`.
    pub fn responder(responder: impl Fn(&Endpoint) -> Attempt + Send + Sync + 'static) -> Self {
        Self::build(VecDeque::new(), Some(Box::new(responder)))
    }

    fn build(script: VecDeque<Attempt>, responder: Option<Responder>) -> Self {
        Self {
            shared: Arc::new(Shared {
                script: Mutex::new(script),
                responder,
                record: Mutex::new(Record::default()),
                poll: Duration::from_millis(2),
            }),
        }
    }

    fn record(&self) -> std::sync::MutexGuard<'_, Record> {
        self.shared.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of connect attempts so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.record().connects.len()
    }

    /// Time of each connect attempt.
    #[must_use]
    pub fn connect_times(&self) -> Vec<Instant> {
        self.record().connects.iter().map(|(_, t)| *t).collect()
    }

    /// Endpoint of each connect attempt.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.record().connects.iter().map(|(e, _)| e.clone()).collect()
    }

    /// Everything written by the client, tagged with the attempt index.
    #[must_use]
    pub fn sent(&self) -> Vec<(usize, String)> {
        self.record().sent.clone()
    }

    /// Attempt indices whose connection the client closed.
    #[must_use]
    pub fn closed(&self) -> Vec<usize> {
        self.record().closed.clone()
    }

    /// Block until `pred` holds or `timeout` elapses. Returns whether it held.
    pub fn wait_until(&self, timeout: Duration, pred: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if pred(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Transport for ScriptedTransport {
    fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let index = {
            let mut record = self.record();
            record.connects.push((endpoint.clone(), Instant::now()));
            record.connects.len() - 1
        };
        let next = self
            .shared
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let attempt = match (next, &self.shared.responder) {
            (Some(attempt), _) => attempt,
            (None, Some(responder)) => responder(endpoint),
            (None, None) => Attempt::refuse(),
        };
        match attempt {
            Attempt::Refuse(error) => Err(error),
            Attempt::Accept(steps) => Ok(Box::new(ScriptedConnection {
                index,
                steps: steps.into(),
                sends: 0,
                shared: Arc::clone(&self.shared),
            })),
        }
    }
}

struct ScriptedConnection {
    index: usize,
    steps: VecDeque<Step>,
    sends: usize,
    shared: Arc<Shared>,
}

impl Connection for ScriptedConnection {
    fn recv(&mut self) -> Result<Inbound, TransportError> {
        match self.steps.pop_front() {
            Some(Step::Text(text)) => Ok(Inbound::Text(text)),
            Some(Step::Idle(n)) => {
                if n > 1 {
                    self.steps.push_front(Step::Idle(n - 1));
                }
                thread::sleep(self.shared.poll);
                Ok(Inbound::Idle)
            }
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Close) => Ok(Inbound::Closed),
            Some(Step::AwaitSends(n)) => {
                if self.sends < n {
                    self.steps.push_front(Step::AwaitSends(n));
                }
                thread::sleep(self.shared.poll);
                Ok(Inbound::Idle)
            }
            None => {
                thread::sleep(self.shared.poll);
                Ok(Inbound::Idle)
            }
        }
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.sends += 1;
        self.shared
            .record
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sent
            .push((self.index, text.to_owned()));
        Ok(())
    }

    fn close(&mut self) {
        self.shared
            .record
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .closed
            .push(self.index);
    }
}

/// Read states from `stream` until `done` returns true for one of them, the
/// stream ends, or `timeout` elapses.
pub fn collect_states<T: Send + Sync + 'static>(
    stream: &mut ChannelStream<T>,
    timeout: Duration,
    mut done: impl FnMut(&ChannelState<T>) -> bool,
) -> Vec<ChannelState<T>> {
    let deadline = Instant::now() + timeout;
    let mut states = Vec::new();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match stream.next_timeout(remaining) {
            Some(state) => {
                let stop = done(&state);
                states.push(state);
                if stop {
                    break;
                }
            }
            None => break,
        }
    }
    states
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::parse("ws://test/mails/a").unwrap()
    }

    #[test]
    fn script_then_refuse() {
        let t = ScriptedTransport::new([Attempt::serve(["[1]"])]);
        let mut conn = t.connect(&endpoint()).unwrap();
        assert_eq!(conn.recv().unwrap(), Inbound::Text("[1]".into()));
        assert_eq!(conn.recv().unwrap(), Inbound::Idle);
        assert!(t.connect(&endpoint()).is_err());
        assert_eq!(t.connect_count(), 2);
    }

    #[test]
    fn await_sends_holds_until_written() {
        let t = ScriptedTransport::new([Attempt::Accept(vec![
            Step::AwaitSends(1),
            Step::Text("ok".into()),
        ])]);
        let mut conn = t.connect(&endpoint()).unwrap();
        assert_eq!(conn.recv().unwrap(), Inbound::Idle);
        assert_eq!(conn.recv().unwrap(), Inbound::Idle);
        conn.send_text("q").unwrap();
        assert_eq!(conn.recv().unwrap(), Inbound::Idle);
        assert_eq!(conn.recv().unwrap(), Inbound::Text("ok".into()));
        conn.close();
        assert_eq!(t.sent(), vec![(0, "q".to_owned())]);
        assert_eq!(t.closed(), vec![0]);
    }

    #[test]
    fn responder_sees_endpoint() {
        let t = ScriptedTransport::responder(|e| {
            if e.url().path().ends_with("inbox") {
                Attempt::serve(["[]"])
            } else {
                Attempt::refuse()
            }
        });
        assert!(t.connect(&endpoint()).is_ok());
        assert!(t.connect(&Endpoint::parse("ws://test/other").unwrap()).is_err());
    }
}
