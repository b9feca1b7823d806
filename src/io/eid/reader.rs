// src/io/eid/reader.rs
//
// EID reader connection.
//
// Owns the serial-over-Bluetooth link to one predetermined reader and relays
// its byte stream through the framer to the consumer's event channel. One
// background worker per connection: a grace period, a single dial, then a
// bounded-read poll loop. Every failure is terminal for the attempt and
// reported once; the caller retries with a fresh instance if it wants to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::io::{ConnectionState, ReaderError, ReaderEvent, TargetDescriptor};

use super::framer::{EidFramer, EidFramerConfig};
use super::link::{LinkConnector, SerialConnector};

// ============================================================================
// Configuration
// ============================================================================

/// Grace period before dialing. The radio stack needs a moment to settle
/// after launch; dialing earlier makes the reader intermittently refuse the
/// channel in the field.
pub const STARTUP_DELAY: Duration = Duration::from_secs(3);

/// Pause between bounded reads.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Bounded read size.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Baud rate of the reader's serial channel.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Reader connection configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EidReaderConfig {
    /// The peripheral being dialed.
    pub target: TargetDescriptor,
    /// OS serial device bound to the reader's RFCOMM channel
    /// (e.g. "/dev/rfcomm0", "/dev/cu.HR5-SPP", "COM5").
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Grace period before dialing.
    #[serde(default = "default_startup_delay")]
    pub startup_delay: Duration,
    /// Pause between bounded reads.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Bounded read size.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Name used in status lines ("Connecting to HR5...").
    #[serde(default)]
    pub display_name: Option<String>,
    /// Framing thresholds.
    #[serde(default)]
    pub framing: EidFramerConfig,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_startup_delay() -> Duration {
    STARTUP_DELAY
}

fn default_poll_interval() -> Duration {
    POLL_INTERVAL
}

fn default_read_buffer_size() -> usize {
    READ_BUFFER_SIZE
}

impl EidReaderConfig {
    /// Configuration with the field-deployment defaults.
    pub fn new(target: TargetDescriptor, port: impl Into<String>) -> Self {
        EidReaderConfig {
            target,
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            startup_delay: STARTUP_DELAY,
            poll_interval: POLL_INTERVAL,
            read_buffer_size: READ_BUFFER_SIZE,
            display_name: None,
            framing: EidFramerConfig::default(),
        }
    }
}

// ============================================================================
// EID Reader
// ============================================================================

/// Connection to one EID tag reader.
///
/// Create with [`EidReader::new`], which also returns the event channel, then
/// `start()` to dial and `stop()` to tear down. A reader instance is
/// single-shot: after a failure or a stop, retrying means constructing a new
/// instance; no resources are reused across attempts.
pub struct EidReader {
    config: EidReaderConfig,
    connector: Arc<dyn LinkConnector>,
    state: Arc<Mutex<ConnectionState>>,
    cancel_flag: Arc<AtomicBool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<ReaderEvent>,
}

impl EidReader {
    /// Reader dialing through the platform serial stack.
    pub fn new(config: EidReaderConfig) -> (Self, mpsc::UnboundedReceiver<ReaderEvent>) {
        Self::with_connector(config, Arc::new(SerialConnector))
    }

    /// Reader with a custom link connector. Tests use this to script the
    /// transport.
    pub fn with_connector(
        config: EidReaderConfig,
        connector: Arc<dyn LinkConnector>,
    ) -> (Self, mpsc::UnboundedReceiver<ReaderEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reader = EidReader {
            config,
            connector,
            state: Arc::new(Mutex::new(ConnectionState::Idle)),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            task_handle: None,
            events_tx,
        };
        (reader, events_rx)
    }

    /// Begin the connection attempt.
    ///
    /// Returns immediately; after the startup grace period the worker dials
    /// the reader and, on success, polls it until `stop()` or a failure.
    /// Rejected with [`ReaderError::AlreadyStarted`] unless the reader is
    /// idle. Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<(), ReaderError> {
        {
            let mut state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *state != ConnectionState::Idle {
                return Err(ReaderError::AlreadyStarted);
            }
            *state = ConnectionState::Connecting;
        }

        self.cancel_flag.store(false, Ordering::Relaxed);

        let handle = spawn_reader_stream(
            self.config.clone(),
            self.connector.clone(),
            self.state.clone(),
            self.cancel_flag.clone(),
            self.events_tx.clone(),
        );
        self.task_handle = Some(handle);

        Ok(())
    }

    /// Close the channel and release the worker.
    ///
    /// An in-flight read is not interrupted; the loop observes the flag on
    /// its next iteration. Safe to call repeatedly; the state is
    /// `Disconnected` afterwards every time.
    pub async fn stop(&mut self) {
        self.cancel_flag.store(true, Ordering::Relaxed);

        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }

        set_state(&self.state, ConnectionState::Disconnected);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The peripheral this reader dials.
    pub fn target(&self) -> &TargetDescriptor {
        &self.config.target
    }
}

fn set_state(cell: &Mutex<ConnectionState>, next: ConnectionState) {
    match cell.lock() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Spawn the reader stream task: grace period on the runtime, then the
/// blocking dial-and-poll loop on the blocking pool.
fn spawn_reader_stream(
    config: EidReaderConfig,
    connector: Arc<dyn LinkConnector>,
    state: Arc<Mutex<ConnectionState>>,
    cancel_flag: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<ReaderEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(config.startup_delay).await;

        if cancel_flag.load(Ordering::Relaxed) {
            let _ = tx.send(ReaderEvent::Ended("stopped".to_string()));
            return;
        }

        let tx_panic = tx.clone();
        let port_for_panic = config.port.clone();

        let result = tokio::task::spawn_blocking(move || {
            run_reader_blocking(config, connector, state, cancel_flag, tx)
        })
        .await;

        if let Err(e) = result {
            tlog!("[eid:{}] Reader task panicked: {:?}", port_for_panic, e);
            let _ = tx_panic.send(ReaderEvent::Ended("error".to_string()));
        }
    })
}

/// Blocking dial-and-poll loop.
///
/// Runs one connection attempt end to end: adapter check and dial, then
/// bounded reads fed to the framer until cancellation, stream closure, or a
/// read error. Loop exits do not move the connection state; only `stop()`
/// produces `Disconnected`.
fn run_reader_blocking(
    config: EidReaderConfig,
    connector: Arc<dyn LinkConnector>,
    state: Arc<Mutex<ConnectionState>>,
    cancel_flag: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<ReaderEvent>,
) {
    let name = config.display_name.clone().unwrap_or_else(|| "Reader".to_string());

    // State moved to Connecting when start() was accepted; the status line
    // fires here, when dialing actually begins.
    let _ = tx.send(ReaderEvent::Status(
        ConnectionState::Connecting,
        format!("Connecting to {}...", name),
    ));

    let mut link = match connector.connect(&config) {
        Ok(link) => link,
        Err(err) => {
            tlog!("[eid:{}] Connect failed: {}", config.port, err);
            set_state(&state, ConnectionState::Failed);
            let _ = tx.send(ReaderEvent::Error(err));
            let _ = tx.send(ReaderEvent::Ended("error".to_string()));
            return;
        }
    };

    set_state(&state, ConnectionState::Connected);
    tlog!(
        "[eid:{}] Connected at {} baud (target {})",
        config.port,
        config.baud_rate,
        config.target.address
    );
    let _ = tx.send(ReaderEvent::Status(
        ConnectionState::Connected,
        format!("{} Connected - Ready to scan", name),
    ));

    let mut framer = EidFramer::new(config.framing.clone());
    let mut buf = vec![0u8; config.read_buffer_size];
    let stream_reason;

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            stream_reason = "stopped";
            break;
        }

        if !link.is_connected() {
            stream_reason = "disconnected";
            break;
        }

        match link.read_chunk(&mut buf) {
            Ok(n) if n > 0 => {
                if let Some(eid) = framer.feed(&buf[..n]) {
                    tlog!("[eid:{}] Frame: {}", config.port, eid);
                    let _ = tx.send(ReaderEvent::Eid(eid));
                }
            }
            Ok(_) => {
                // EOF - channel closed by the peer
                stream_reason = "disconnected";
                break;
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // Quiet poll
            }
            Err(e) => {
                tlog!("[eid:{}] Read error: {}", config.port, e);
                let _ = tx.send(ReaderEvent::Error(ReaderError::read(e.to_string())));
                stream_reason = "error";
                break;
            }
        }

        std::thread::sleep(config.poll_interval);
    }

    tlog!("[eid:{}] Stream ended: {}", config.port, stream_reason);
    let _ = tx.send(ReaderEvent::Ended(stream_reason.to_string()));
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::eid::link::ReaderLink;
    use std::collections::VecDeque;
    use std::io;

    enum Step {
        Chunk(&'static [u8]),
        Quiet,
        Eof,
        Fail(io::ErrorKind, &'static str),
    }

    /// Scripted link: replays the steps, then stays quiet forever.
    struct MockLink {
        steps: VecDeque<Step>,
    }

    impl MockLink {
        fn new(steps: Vec<Step>) -> Self {
            MockLink {
                steps: steps.into(),
            }
        }
    }

    impl ReaderLink for MockLink {
        fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Step::Chunk(data)) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                Some(Step::Quiet) | None => Err(io::Error::new(io::ErrorKind::TimedOut, "quiet")),
                Some(Step::Eof) => Ok(0),
                Some(Step::Fail(kind, msg)) => Err(io::Error::new(kind, msg)),
            }
        }
    }

    /// Hands out its scripted link (or error) on the single connect call.
    struct MockConnector {
        outcome: Mutex<Option<Result<Box<dyn ReaderLink>, ReaderError>>>,
    }

    /// Link whose channel reports itself gone after connecting.
    struct DeadLink;

    impl ReaderLink for DeadLink {
        fn read_chunk(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "quiet"))
        }

        fn is_connected(&self) -> bool {
            false
        }
    }

    impl MockConnector {
        fn link(steps: Vec<Step>) -> Arc<Self> {
            Self::with_link(Box::new(MockLink::new(steps)))
        }

        fn with_link(link: Box<dyn ReaderLink>) -> Arc<Self> {
            Arc::new(MockConnector {
                outcome: Mutex::new(Some(Ok(link))),
            })
        }

        fn failing(err: ReaderError) -> Arc<Self> {
            Arc::new(MockConnector {
                outcome: Mutex::new(Some(Err(err))),
            })
        }
    }

    impl LinkConnector for MockConnector {
        fn connect(&self, _config: &EidReaderConfig) -> Result<Box<dyn ReaderLink>, ReaderError> {
            self.outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ReaderError::connect("mock connector reused")))
        }
    }

    fn test_config() -> EidReaderConfig {
        let mut config =
            EidReaderConfig::new(TargetDescriptor::new("00:07:80:E6:95:52"), "mock0");
        config.startup_delay = Duration::ZERO;
        config.poll_interval = Duration::from_millis(1);
        config.display_name = Some("HR5".to_string());
        config
    }

    async fn drain_until_ended(
        rx: &mut mpsc::UnboundedReceiver<ReaderEvent>,
    ) -> Vec<ReaderEvent> {
        let mut events = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
                Ok(Some(event)) => {
                    let ended = matches!(event, ReaderEvent::Ended(_));
                    events.push(event);
                    if ended {
                        break;
                    }
                }
                _ => panic!("event stream dried up before Ended"),
            }
        }
        events
    }

    fn eids(events: &[ReaderEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                ReaderEvent::Eid(id) => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_adapter_unavailable_never_reaches_connected() {
        let (mut reader, mut rx) =
            EidReader::with_connector(test_config(), MockConnector::failing(ReaderError::adapter()));
        reader.start().unwrap();

        let events = drain_until_ended(&mut rx).await;

        assert_eq!(
            events[0],
            ReaderEvent::Status(ConnectionState::Connecting, "Connecting to HR5...".into())
        );
        assert_eq!(events[1], ReaderEvent::Error(ReaderError::AdapterUnavailable));
        assert_eq!(events[2], ReaderEvent::Ended("error".into()));
        assert!(!events
            .iter()
            .any(|e| matches!(e, ReaderEvent::Status(ConnectionState::Connected, _))));
        assert_eq!(reader.state(), ConnectionState::Failed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_identifiers_flow_in_read_order() {
        let connector = MockConnector::link(vec![
            Step::Chunk(b"ABCD"),
            Step::Chunk(b"EF12"),
            Step::Quiet,
            Step::Chunk(b"34"),
            Step::Chunk(b"ZZZZ\rZZ9999\n"),
            Step::Eof,
        ]);
        let (mut reader, mut rx) = EidReader::with_connector(test_config(), connector);
        reader.start().unwrap();

        let events = drain_until_ended(&mut rx).await;

        assert_eq!(
            events[1],
            ReaderEvent::Status(
                ConnectionState::Connected,
                "HR5 Connected - Ready to scan".into()
            )
        );
        assert_eq!(eids(&events), vec!["ABCDEF1234", "ZZZZZZ9999"]);
        assert_eq!(*events.last().unwrap(), ReaderEvent::Ended("disconnected".into()));

        // A loop exit on its own does not move the state.
        assert_eq!(reader.state(), ConnectionState::Connected);

        reader.stop().await;
        assert_eq!(reader.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_failure_reported_once_then_nothing() {
        let connector = MockConnector::link(vec![
            Step::Chunk(b"AB1234CD56"),
            Step::Fail(io::ErrorKind::BrokenPipe, "reader went away"),
        ]);
        let (mut reader, mut rx) = EidReader::with_connector(test_config(), connector);
        reader.start().unwrap();

        let events = drain_until_ended(&mut rx).await;

        assert_eq!(eids(&events), vec!["AB1234CD56"]);
        let errors: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ReaderEvent::Error(_)))
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            *errors[0],
            ReaderEvent::Error(ReaderError::read("reader went away"))
        );
        assert_eq!(*events.last().unwrap(), ReaderEvent::Ended("error".into()));

        // Nothing after the failure: the Eid preceded the Error.
        let error_idx = events
            .iter()
            .position(|e| matches!(e, ReaderEvent::Error(_)))
            .unwrap();
        assert!(!events[error_idx..]
            .iter()
            .any(|e| matches!(e, ReaderEvent::Eid(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_channel_reporting_not_connected_ends_loop() {
        let (mut reader, mut rx) =
            EidReader::with_connector(test_config(), MockConnector::with_link(Box::new(DeadLink)));
        reader.start().unwrap();

        let events = drain_until_ended(&mut rx).await;
        assert_eq!(
            *events.last().unwrap(),
            ReaderEvent::Ended("disconnected".into())
        );
        assert!(eids(&events).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_is_idempotent() {
        let (mut reader, mut rx) = EidReader::with_connector(test_config(), MockConnector::link(vec![]));
        reader.start().unwrap();

        reader.stop().await;
        assert_eq!(reader.state(), ConnectionState::Disconnected);

        reader.stop().await;
        assert_eq!(reader.state(), ConnectionState::Disconnected);

        let events = drain_until_ended(&mut rx).await;
        assert_eq!(*events.last().unwrap(), ReaderEvent::Ended("stopped".into()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_without_start_is_safe() {
        let (mut reader, _rx) = EidReader::with_connector(test_config(), MockConnector::link(vec![]));
        reader.stop().await;
        assert_eq!(reader.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_rejected_unless_idle() {
        let (mut reader, _rx) = EidReader::with_connector(test_config(), MockConnector::link(vec![]));
        reader.start().unwrap();
        assert_eq!(reader.start(), Err(ReaderError::AlreadyStarted));

        reader.stop().await;
        // Single-shot by design: a stopped reader is not restartable either.
        assert_eq!(reader.start(), Err(ReaderError::AlreadyStarted));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_during_grace_period_skips_dialing() {
        let mut config = test_config();
        config.startup_delay = Duration::from_millis(200);
        let (mut reader, mut rx) = EidReader::with_connector(
            config,
            MockConnector::failing(ReaderError::connect("should never be dialed")),
        );
        reader.start().unwrap();
        reader.stop().await;

        let events = drain_until_ended(&mut rx).await;
        assert_eq!(events, vec![ReaderEvent::Ended("stopped".into())]);
        assert_eq!(reader.state(), ConnectionState::Disconnected);
    }
}
