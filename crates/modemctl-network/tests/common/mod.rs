//! Shared helpers: an in-process transport the test drives by hand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use modemctl_network::{
    Completion, Envelope, IndicationRouter, ModemRequest, ModemTransport, NetworkConfig,
    NetworkContext, Payload, TransportError,
};

/// Records requests; responses are delivered when the test says so.
#[derive(Default)]
pub struct ScriptedTransport {
    router: Mutex<Option<IndicationRouter>>,
    requests: Mutex<Vec<ModemRequest>>,
    /// Refuse every `send` with EIO.
    pub refuse: AtomicBool,
    /// Milliseconds each `send` blocks before accepting or refusing.
    pub stall_ms: AtomicU64,
    /// Answer every request with an empty success before `send` returns.
    pub answer_inline: AtomicBool,
    pub detach_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> Vec<ModemRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> ModemRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request sent")
    }

    /// Deliver an envelope as if it came from the modem.
    pub fn deliver(&self, envelope: Envelope) {
        let router = self.router.lock().unwrap().clone();
        router.expect("transport not attached").deliver(envelope);
    }

    /// Answer `request` with `status` and `payload`.
    pub fn respond(&self, request: &ModemRequest, status: i32, payload: Payload) {
        self.deliver(Envelope::response(
            request.slot,
            request.event_id,
            request.params.response_kind(),
            status,
            payload,
        ));
    }
}

impl ModemTransport for ScriptedTransport {
    fn attach(&self, router: IndicationRouter) -> Result<(), TransportError> {
        *self.router.lock().unwrap() = Some(router);
        Ok(())
    }

    fn send(&self, request: ModemRequest) -> Result<(), TransportError> {
        let stall = self.stall_ms.load(Ordering::SeqCst);
        if stall > 0 {
            std::thread::sleep(Duration::from_millis(stall));
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected(libc::EIO));
        }
        self.requests.lock().unwrap().push(request.clone());
        if self.answer_inline.load(Ordering::SeqCst) {
            self.respond(&request, 0, Payload::None);
        }
        Ok(())
    }

    fn detach(&self) {
        self.detach_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Config without the housekeeping thread.
pub fn test_config() -> NetworkConfig {
    NetworkConfig {
        request_timeout: None,
        ..Default::default()
    }
}

pub fn context(transport: &Arc<ScriptedTransport>) -> NetworkContext {
    NetworkContext::init(test_config(), transport.clone()).expect("context init")
}

/// Collects completions from any number of callbacks.
#[derive(Clone)]
pub struct Completions {
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl Completions {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn callback(&self) -> impl FnOnce(Completion) + Send + 'static {
        let tx = self.tx.clone();
        move |c: Completion| {
            let _ = tx.send(c);
        }
    }

    /// Everything received so far.
    pub fn drain(&self) -> Vec<Completion> {
        self.rx.try_iter().collect()
    }

    pub fn wait(&self, timeout: Duration) -> Option<Completion> {
        self.rx.recv_timeout(timeout).ok()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
