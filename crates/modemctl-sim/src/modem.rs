//! Simulated modem behind the [`ModemTransport`] seam.
//!
//! Requests travel over a crossbeam channel to a single named worker thread.
//! The worker answers from the [`ModemProfile`] after each slot's configured
//! delay, so envelopes for one slot always leave in the order their requests
//! arrived. Every envelope, including test injections, is delivered from the
//! worker thread.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use quanta::Instant;
use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use modemctl_network::types::{
    OperatorStatus, RegistrationInfo, RegistrationState, SelectionMode, SlotId,
};
use modemctl_network::{
    Envelope, IndicationRouter, MessageKind, ModemRequest, ModemTransport, Payload,
    RequestParams, SignalStrength, TransportError,
};

use crate::profile::{ModemProfile, SlotProfile, MAX_RSRP_JITTER_DB};

enum Command {
    Attach(IndicationRouter),
    Detach,
    Request(ModemRequest),
    Inject(Envelope),
    SetRegistration(SlotId, RegistrationInfo),
    SetSignal(SlotId, SignalStrength),
    Stop,
}

/// A modem simulated from a [`ModemProfile`].
pub struct SimModem {
    tx: Sender<Command>,
    slots: usize,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SimModem {
    pub fn new(profile: ModemProfile) -> Self {
        let slots = profile.slots.len();
        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name("modemctl-sim".into())
            .spawn(move || Worker::new(profile).run(rx))
            .expect("failed to spawn simulated modem worker");
        info!(slots, "simulated modem started");
        SimModem {
            tx,
            slots,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots
    }

    /// Deliver `envelope` as if the modem had produced it.
    pub fn inject(&self, envelope: Envelope) {
        let _ = self.tx.send(Command::Inject(envelope));
    }

    /// Replace the registration of `slot` and announce it with
    /// `RegistrationChanged`.
    pub fn set_registration(&self, slot: SlotId, info: RegistrationInfo) {
        let _ = self.tx.send(Command::SetRegistration(slot, info));
    }

    /// Replace the signal metrics of `slot` and announce them with
    /// `SignalStrengthChanged`.
    pub fn set_signal(&self, slot: SlotId, signal: SignalStrength) {
        let _ = self.tx.send(Command::SetSignal(slot, signal));
    }

    /// Stop the worker. Envelopes still queued are discarded.
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            // The last reference may be dropped from a callback on the worker
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl ModemTransport for SimModem {
    fn attach(&self, router: IndicationRouter) -> Result<(), TransportError> {
        self.tx
            .send(Command::Attach(router))
            .map_err(|_| TransportError::Disconnected)
    }

    fn send(&self, request: ModemRequest) -> Result<(), TransportError> {
        if request.slot >= self.slots {
            return Err(TransportError::Rejected(libc::ENXIO));
        }
        self.tx
            .send(Command::Request(request))
            .map_err(|_| TransportError::Disconnected)
    }

    fn detach(&self) {
        let _ = self.tx.send(Command::Detach);
    }
}

impl Drop for SimModem {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Worker ─────────────────────────────────────────────────────────────────

struct Scheduled {
    due: Instant,
    seq: u64,
    envelope: Envelope,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.due, self.seq) == (other.due, other.seq)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

struct SlotSim {
    profile: SlotProfile,
    cell_period: Option<Duration>,
    next_cell_report: Option<Instant>,
}

impl SlotSim {
    fn delay(&self) -> Duration {
        Duration::from_millis(self.profile.response_delay_ms)
    }
}

struct Worker {
    slots: Vec<SlotSim>,
    router: Option<IndicationRouter>,
    queue: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
    rng: StdRng,
}

impl Worker {
    fn new(profile: ModemProfile) -> Self {
        Worker {
            rng: StdRng::seed_from_u64(profile.seed),
            slots: profile
                .slots
                .into_iter()
                .map(|profile| SlotSim {
                    profile,
                    cell_period: None,
                    next_cell_report: None,
                })
                .collect(),
            router: None,
            queue: BinaryHeap::new(),
            seq: 0,
        }
    }

    fn run(mut self, rx: Receiver<Command>) {
        loop {
            let received = match self.next_deadline() {
                Some(deadline) => rx.recv_timeout(deadline.duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
            }
            self.report_cells(Instant::now());
            self.flush(Instant::now());
        }
        debug!(queued = self.queue.len(), "simulated modem stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        let queued = self.queue.peek().map(|Reverse(s)| s.due);
        let reports = self.slots.iter().filter_map(|s| s.next_cell_report);
        queued.into_iter().chain(reports).min()
    }

    fn schedule(&mut self, delay: Duration, envelope: Envelope) {
        self.seq += 1;
        self.queue.push(Reverse(Scheduled {
            due: Instant::now() + delay,
            seq: self.seq,
            envelope,
        }));
    }

    /// Deliver every envelope that is due.
    fn flush(&mut self, now: Instant) {
        while self.queue.peek().is_some_and(|Reverse(s)| s.due <= now) {
            let Some(Reverse(scheduled)) = self.queue.pop() else {
                break;
            };
            match &self.router {
                Some(router) => router.deliver(scheduled.envelope),
                None => trace!(
                    slot = scheduled.envelope.slot(),
                    kind = ?scheduled.envelope.kind(),
                    "no router attached; envelope discarded"
                ),
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Attach(router) => {
                self.router = Some(router);
                for slot in 0..self.slots.len() {
                    self.announce_registration(slot, Duration::ZERO);
                    self.announce_signal(slot);
                }
            }
            Command::Detach => {
                self.router = None;
                self.queue.clear();
                for slot in &mut self.slots {
                    slot.cell_period = None;
                    slot.next_cell_report = None;
                }
            }
            Command::Request(request) => self.answer(request),
            Command::Inject(envelope) => self.schedule(Duration::ZERO, envelope),
            Command::SetRegistration(slot, info) => {
                if let Some(sim) = self.slots.get_mut(slot) {
                    sim.profile.registration = info;
                    self.announce_registration(slot, Duration::ZERO);
                }
            }
            Command::SetSignal(slot, signal) => {
                if let Some(sim) = self.slots.get_mut(slot) {
                    sim.profile.signal = signal;
                    self.announce_signal(slot);
                }
            }
            Command::Stop => {}
        }
    }

    fn announce_registration(&mut self, slot: SlotId, delay: Duration) {
        let info = self.slots[slot].profile.registration.clone();
        self.schedule(
            delay,
            Envelope::indication(slot, MessageKind::RegistrationChanged, Payload::Registration(info)),
        );
    }

    fn announce_signal(&mut self, slot: SlotId) {
        let signal = self.slots[slot].profile.signal;
        self.schedule(
            Duration::ZERO,
            Envelope::indication(slot, MessageKind::SignalStrengthChanged, Payload::Signal(signal)),
        );
    }

    fn answer(&mut self, request: ModemRequest) {
        let ModemRequest {
            slot,
            event_id,
            params,
        } = request;
        let Some(sim) = self.slots.get_mut(slot) else {
            warn!(slot, event_id, "request for a slot the profile does not have");
            return;
        };
        let kind = params.response_kind();
        let delay = sim.delay();
        let duplicate = sim.profile.duplicate_responses;

        let (status, payload, registration_changed) = match sim.profile.failure_for(&params) {
            Some(errno) => {
                debug!(slot, event_id, ?kind, errno, "injected failure");
                (errno.checked_abs().map_or(-libc::EIO, |e| -e), Payload::None, false)
            }
            None => match Self::execute(sim, params) {
                Ok((payload, changed)) => (0, payload, changed),
                Err(errno) => (-errno, Payload::None, false),
            },
        };

        let response = Envelope::response(slot, event_id, kind, status, payload);
        if duplicate {
            self.schedule(delay, response.clone());
        }
        self.schedule(delay, response);
        if registration_changed {
            self.announce_registration(slot, delay);
        }
    }

    /// Apply `params` to the slot. Returns the response payload and whether
    /// the registration changed, or the errno the modem answers with.
    fn execute(sim: &mut SlotSim, params: RequestParams) -> Result<(Payload, bool), i32> {
        let profile = &mut sim.profile;
        match params {
            RequestParams::Scan => Ok((Payload::Operators(profile.operators.clone()), false)),
            RequestParams::ServingCellInfo => {
                Ok((Payload::Cells(profile.serving_cells.clone()), false))
            }
            RequestParams::NeighbouringCellInfo => {
                Ok((Payload::Cells(profile.neighbouring_cells.clone()), false))
            }
            RequestParams::RegistrationInfo => {
                Ok((Payload::Registration(profile.registration.clone()), false))
            }
            RequestParams::SetCellInfoListRate { period_ms } => {
                let period = (period_ms > 0).then(|| Duration::from_millis(u64::from(period_ms)));
                sim.cell_period = period;
                sim.next_cell_report = period.map(|p| Instant::now() + p);
                Ok((Payload::None, false))
            }
            RequestParams::SelectAuto => {
                let preferred = profile
                    .operators
                    .iter()
                    .position(|op| op.status == OperatorStatus::Current)
                    .or_else(|| {
                        profile
                            .operators
                            .iter()
                            .position(|op| op.status == OperatorStatus::Available)
                    })
                    .ok_or(libc::ENETUNREACH)?;
                register_on(profile, preferred, SelectionMode::Automatic);
                Ok((Payload::None, true))
            }
            RequestParams::SelectManual { operator_id, .. } => {
                let index = profile
                    .operators
                    .iter()
                    .position(|op| op.id == operator_id)
                    .ok_or(libc::ENOENT)?;
                if profile.operators[index].status == OperatorStatus::Forbidden {
                    profile.registration.reg_state = RegistrationState::Denied;
                    profile.registration.selection_mode = SelectionMode::Manual;
                    return Err(libc::EACCES);
                }
                register_on(profile, index, SelectionMode::Manual);
                Ok((Payload::None, true))
            }
        }
    }

    /// Emit `CellInfoListChanged` for every slot whose report period elapsed.
    fn report_cells(&mut self, now: Instant) {
        for slot in 0..self.slots.len() {
            let sim = &mut self.slots[slot];
            let (Some(period), Some(next)) = (sim.cell_period, sim.next_cell_report) else {
                continue;
            };
            if next > now {
                continue;
            }
            sim.next_cell_report = Some(now + period);

            let jitter = sim.profile.rsrp_jitter_db.clamp(0, MAX_RSRP_JITTER_DB);
            let mut cells: Vec<_> = sim
                .profile
                .serving_cells
                .iter()
                .chain(&sim.profile.neighbouring_cells)
                .cloned()
                .collect();
            for cell in &mut cells {
                let s = &mut cell.signal_strength;
                if jitter > 0 && s.rsrp != SignalStrength::UNAVAILABLE {
                    s.rsrp = s
                        .rsrp
                        .saturating_add(self.rng.random_range(-jitter..=jitter))
                        .clamp(-140, -44);
                }
            }
            trace!(slot, cells = cells.len(), "periodic cell report");
            self.schedule(
                Duration::ZERO,
                Envelope::indication(slot, MessageKind::CellInfoListChanged, Payload::Cells(cells)),
            );
        }
    }
}

fn register_on(profile: &mut SlotProfile, index: usize, mode: SelectionMode) {
    for (i, op) in profile.operators.iter_mut().enumerate() {
        if i == index {
            op.status = OperatorStatus::Current;
        } else if op.status == OperatorStatus::Current {
            op.status = OperatorStatus::Available;
        }
    }
    let op = &profile.operators[index];
    let reg = &mut profile.registration;
    reg.reg_state = if reg.mcc.is_empty() || reg.mcc == op.mcc {
        RegistrationState::RegisteredHome
    } else {
        RegistrationState::RegisteredRoaming
    };
    reg.operator_name = op.name.clone();
    reg.mcc = op.mcc.clone();
    reg.mnc = op.mnc.clone();
    reg.selection_mode = mode;
    reg.emergency_only = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use modemctl_network::types::OperatorInfo;

    fn slot_with_operators() -> SlotSim {
        SlotSim {
            profile: SlotProfile {
                operators: vec![
                    OperatorInfo {
                        id: "00101".into(),
                        name: "Home".into(),
                        mcc: "001".into(),
                        mnc: "01".into(),
                        status: OperatorStatus::Current,
                        ..Default::default()
                    },
                    OperatorInfo {
                        id: "00102".into(),
                        name: "Other".into(),
                        mcc: "001".into(),
                        mnc: "02".into(),
                        status: OperatorStatus::Available,
                        ..Default::default()
                    },
                    OperatorInfo {
                        id: "99901".into(),
                        status: OperatorStatus::Forbidden,
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
            cell_period: None,
            next_cell_report: None,
        }
    }

    #[test]
    fn manual_selection_moves_current_operator() {
        let mut sim = slot_with_operators();
        let params = RequestParams::SelectManual {
            operator_id: "00102".into(),
            mcc: "001".into(),
            mnc: "02".into(),
        };
        assert_eq!(Worker::execute(&mut sim, params), Ok((Payload::None, true)));
        let reg = &sim.profile.registration;
        assert_eq!(reg.reg_state, RegistrationState::RegisteredHome);
        assert_eq!(reg.operator_name, "Other");
        assert_eq!(reg.selection_mode, SelectionMode::Manual);
        assert_eq!(sim.profile.operators[0].status, OperatorStatus::Available);
        assert_eq!(sim.profile.operators[1].status, OperatorStatus::Current);
    }

    #[test]
    fn manual_selection_failures() {
        let mut sim = slot_with_operators();
        let unknown = RequestParams::SelectManual {
            operator_id: "12345".into(),
            mcc: String::new(),
            mnc: String::new(),
        };
        assert_eq!(Worker::execute(&mut sim, unknown), Err(libc::ENOENT));

        let forbidden = RequestParams::SelectManual {
            operator_id: "99901".into(),
            mcc: String::new(),
            mnc: String::new(),
        };
        assert_eq!(Worker::execute(&mut sim, forbidden), Err(libc::EACCES));
        assert_eq!(sim.profile.registration.reg_state, RegistrationState::Denied);
    }

    #[test]
    fn auto_selection_needs_an_operator() {
        let mut sim = SlotSim {
            profile: SlotProfile::default(),
            cell_period: None,
            next_cell_report: None,
        };
        assert_eq!(
            Worker::execute(&mut sim, RequestParams::SelectAuto),
            Err(libc::ENETUNREACH)
        );
    }

    #[test]
    fn cell_rate_zero_disables_reports() {
        let mut sim = slot_with_operators();
        Worker::execute(&mut sim, RequestParams::SetCellInfoListRate { period_ms: 100 }).unwrap();
        assert_eq!(sim.cell_period, Some(Duration::from_millis(100)));
        Worker::execute(&mut sim, RequestParams::SetCellInfoListRate { period_ms: 0 }).unwrap();
        assert!(sim.cell_period.is_none());
        assert!(sim.next_cell_report.is_none());
    }

    #[test]
    fn schedule_orders_by_due_then_sequence() {
        let mut worker = Worker::new(ModemProfile::default());
        let later = Envelope::indication(0, MessageKind::RegistrationChanged, Payload::None);
        let first = Envelope::indication(0, MessageKind::SignalStrengthChanged, Payload::None);
        let second = Envelope::indication(0, MessageKind::CellInfoListChanged, Payload::None);
        worker.schedule(Duration::from_secs(60), later);
        worker.schedule(Duration::ZERO, first);
        worker.schedule(Duration::ZERO, second);

        let order: Vec<_> = std::iter::from_fn(|| worker.queue.pop())
            .map(|Reverse(s)| s.envelope.kind())
            .collect();
        assert_eq!(
            order,
            vec![
                MessageKind::SignalStrengthChanged,
                MessageKind::CellInfoListChanged,
                MessageKind::RegistrationChanged,
            ]
        );
    }
}
