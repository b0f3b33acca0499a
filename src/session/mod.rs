//! Scan Session
//!
//! Gates camera frames so that at most one recognition is in flight, runs
//! the engine and decoder for the session's card kind, and hands results to
//! the listener.
//!
//! ```text
//!   Idle --frame accepted--> Processing --Continue / no record--> Idle
//!                               |
//!                               +--Stop / stop()--> Stopped --start()--> Idle
//! ```

pub mod listener;

pub use listener::{ChannelListener, Continuation, ScanEvent, ScanListener};

use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::capture::{CaptureControl, CaptureFrame};
use crate::decode::{decode_bank, decode_identity};
use crate::engine::{EngineHandle, RecognitionEngine};
use crate::geometry::{effective_image_rect, guide_frame, Size};

/// Kind of card a session scans for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    /// Resident identity card (front or back)
    #[default]
    Identity,
    /// Bank card number
    Bank,
}

/// Admission state of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Ready to accept the next frame
    Idle,
    /// A frame is being recognized
    Processing,
    /// Scanning ended; frames are rejected until `start`
    Stopped,
}

/// Admission gate guarded by one lock
#[derive(Debug)]
struct Gate {
    state: ScanState,
    /// A recognition call is running, possibly from before the last stop
    in_flight: bool,
    /// Bumped on every entry into Stopped; results of older generations
    /// are discarded
    generation: u64,
}

impl Gate {
    fn enter_stopped(&mut self) {
        self.state = ScanState::Stopped;
        self.generation += 1;
    }
}

/// One scanning session bound to a card kind and a shared engine
pub struct ScanSession<E> {
    id: Uuid,
    kind: ScanKind,
    screen: Size,
    engine: Arc<EngineHandle<E>>,
    gate: Mutex<Gate>,
    // Lock order: `listener` before `gate`.
    listener: Mutex<Option<Box<dyn ScanListener>>>,
    capture: Mutex<Box<dyn CaptureControl>>,
}

/// Finishes the admitted frame even if the listener panics
struct InFlight<'s, E: RecognitionEngine> {
    session: &'s ScanSession<E>,
    generation: u64,
    outcome: Option<Continuation>,
}

impl<E: RecognitionEngine> Drop for InFlight<'_, E> {
    fn drop(&mut self) {
        self.session.finish(self.generation, self.outcome);
    }
}

impl<E: RecognitionEngine> ScanSession<E> {
    /// Create a stopped session
    ///
    /// `screen` is the preview size used to letterbox bank frames.
    pub fn new(
        kind: ScanKind,
        screen: Size,
        engine: Arc<EngineHandle<E>>,
        capture: Box<dyn CaptureControl>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            screen,
            engine,
            gate: Mutex::new(Gate {
                state: ScanState::Stopped,
                in_flight: false,
                generation: 0,
            }),
            listener: Mutex::new(None),
            capture: Mutex::new(capture),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ScanKind {
        self.kind
    }

    pub fn state(&self) -> ScanState {
        self.gate.lock().state
    }

    /// Install the result listener, replacing any previous one
    pub fn set_listener(&self, listener: Box<dyn ScanListener>) {
        *self.listener.lock() = Some(listener);
    }

    /// Detach the listener; later results stop the session
    pub fn clear_listener(&self) {
        *self.listener.lock() = None;
    }

    /// Leave Stopped and ask capture to run
    ///
    /// If a frame accepted before the last `stop` is still being
    /// recognized, the session reads Processing until that call returns and
    /// its result is discarded. Starting a running session only restarts
    /// capture.
    pub fn start(&self) -> Result<()> {
        {
            let mut gate = self.gate.lock();
            if gate.state == ScanState::Stopped {
                gate.state = if gate.in_flight {
                    ScanState::Processing
                } else {
                    ScanState::Idle
                };
                info!(session = %self.id, kind = ?self.kind, "Scan started");
            }
        }
        self.capture.lock().start()
    }

    /// Force Stopped and ask capture to halt; safe to call repeatedly
    ///
    /// Waits for a listener callback in progress, so no result is handed
    /// over once this returns.
    pub fn stop(&self) {
        {
            let _listener = self.listener.lock();
            let mut gate = self.gate.lock();
            if gate.state != ScanState::Stopped {
                info!(session = %self.id, "Scan stopped");
                gate.enter_stopped();
            }
        }
        self.halt_capture();
    }

    /// Offer a frame; returns whether it was accepted for recognition
    ///
    /// Recognition and decoding run on the calling thread. Frames offered
    /// while another one is in flight, or after the session stopped, are
    /// dropped.
    pub fn on_frame(&self, frame: &CaptureFrame<'_>) -> bool {
        let generation = {
            let mut gate = self.gate.lock();
            let current = gate.state;
            if current != ScanState::Idle {
                trace!(session = %self.id, state = ?current, "Frame rejected");
                return false;
            }
            gate.state = ScanState::Processing;
            gate.in_flight = true;
            gate.generation
        };

        let mut flight = InFlight {
            session: self,
            generation,
            outcome: None,
        };
        flight.outcome = match self.kind {
            ScanKind::Identity => self.scan_identity(frame, generation),
            ScanKind::Bank => self.scan_bank(frame, generation),
        };
        true
    }

    fn scan_identity(&self, frame: &CaptureFrame<'_>, generation: u64) -> Option<Continuation> {
        let output = match self.engine.recognize_identity(frame) {
            Ok(output) => output,
            Err(e) => {
                debug!(session = %self.id, "Identity recognition skipped: {}", e);
                return None;
            }
        };
        let record = decode_identity(&output)?;
        debug!(session = %self.id, "Identity card recognized");
        self.deliver(generation, |listener| listener.on_identity_result(record, frame))
    }

    fn scan_bank(&self, frame: &CaptureFrame<'_>, generation: u64) -> Option<Continuation> {
        let image = frame.size();
        let guide = guide_frame(effective_image_rect(image, self.screen));
        let output = self.engine.recognize_bank(frame, guide);
        let scan = decode_bank(&output, image, guide)?;
        debug!(session = %self.id, "Bank card recognized");
        self.deliver(generation, |listener| {
            listener.on_bank_result(scan.record, frame, scan.crop)
        })
    }

    /// Hand a result to the listener unless the session stopped meanwhile
    ///
    /// The listener lock is held across the check and the callback, which
    /// `stop` also takes.
    fn deliver<F>(&self, generation: u64, notify: F) -> Option<Continuation>
    where
        F: FnOnce(&mut dyn ScanListener) -> Continuation,
    {
        let mut listener = self.listener.lock();
        if self.gate.lock().generation != generation {
            debug!(session = %self.id, "Discarding result of stopped session");
            return None;
        }
        let verdict = match listener.as_mut() {
            Some(listener) => notify(listener.as_mut()),
            None => Continuation::Stop,
        };
        Some(verdict)
    }

    fn finish(&self, generation: u64, outcome: Option<Continuation>) {
        let mut gate = self.gate.lock();
        gate.in_flight = false;
        if gate.generation != generation {
            // stopped while in flight; a restart waited for this call
            if gate.state == ScanState::Processing {
                gate.state = ScanState::Idle;
            }
            return;
        }
        if outcome == Some(Continuation::Stop) {
            gate.enter_stopped();
            drop(gate);
            info!(session = %self.id, "Listener requested stop");
            self.halt_capture();
        } else {
            gate.state = ScanState::Idle;
        }
    }

    fn halt_capture(&self) {
        if let Err(e) = self.capture.lock().stop() {
            warn!(session = %self.id, "Failed to halt capture: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{OwnedFrame, ReplayCapture};
    use crate::decode::{BankRecord, IdentityRecord};
    use crate::engine::{BankRequest, IdentityRequest, ReplayEngine};
    use crate::geometry::CropRect;
    use crate::testing::{bank_output, identity_back_output, identity_output};
    use crossbeam_channel::{bounded, Receiver, Sender};
    use std::panic::{self, AssertUnwindSafe};
    use std::path::Path;
    use std::thread;
    use std::time::Duration;

    const SCREEN: Size = Size {
        width: 640.0,
        height: 360.0,
    };

    #[derive(Default)]
    struct Recorded {
        identity: Vec<IdentityRecord>,
        bank: Vec<(BankRecord, CropRect)>,
    }

    struct RecordingListener {
        seen: Arc<Mutex<Recorded>>,
        verdict: Continuation,
    }

    impl ScanListener for RecordingListener {
        fn on_identity_result(&mut self, record: IdentityRecord, _frame: &CaptureFrame<'_>) -> Continuation {
            self.seen.lock().identity.push(record);
            self.verdict
        }

        fn on_bank_result(
            &mut self,
            record: BankRecord,
            _frame: &CaptureFrame<'_>,
            crop: CropRect,
        ) -> Continuation {
            self.seen.lock().bank.push((record, crop));
            self.verdict
        }
    }

    fn session<E: RecognitionEngine>(
        kind: ScanKind,
        engine: E,
        verdict: Continuation,
    ) -> (ScanSession<E>, ReplayCapture, Arc<Mutex<Recorded>>) {
        let handle = Arc::new(EngineHandle::new(engine));
        handle.init(Path::new("/res")).unwrap();
        let capture = ReplayCapture::new(Vec::new());
        let session = ScanSession::new(kind, SCREEN, handle, Box::new(capture.control()));
        let seen = Arc::new(Mutex::new(Recorded::default()));
        session.set_listener(Box::new(RecordingListener {
            seen: seen.clone(),
            verdict,
        }));
        (session, capture, seen)
    }

    #[test]
    fn test_new_session_rejects_until_started() {
        let (session, capture, _) = session(ScanKind::Identity, ReplayEngine::new(), Continuation::Continue);
        let owned = OwnedFrame::blank(64, 36);

        assert_eq!(session.state(), ScanState::Stopped);
        assert!(!session.on_frame(&owned.as_frame()));

        session.start().unwrap();
        assert!(capture.is_running());
        assert!(session.on_frame(&owned.as_frame()));
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[test]
    fn test_identity_result_with_continue() {
        let engine = ReplayEngine::new().with_identity(identity_back_output());
        let (session, capture, seen) = session(ScanKind::Identity, engine, Continuation::Continue);
        session.start().unwrap();

        let owned = OwnedFrame::blank(64, 36);
        assert!(session.on_frame(&owned.as_frame()));

        assert_eq!(session.state(), ScanState::Idle);
        assert!(capture.is_running());
        let seen = seen.lock();
        assert_eq!(seen.identity.len(), 1);
        assert_eq!(seen.identity[0].back.as_ref().unwrap().issue, "Police");
    }

    #[test]
    fn test_listener_stop_halts_capture() {
        let engine = ReplayEngine::new().with_identity(identity_back_output());
        let (session, capture, _) = session(ScanKind::Identity, engine, Continuation::Stop);
        session.start().unwrap();

        let owned = OwnedFrame::blank(64, 36);
        assert!(session.on_frame(&owned.as_frame()));
        assert_eq!(session.state(), ScanState::Stopped);
        assert!(!capture.is_running());
        assert!(!session.on_frame(&owned.as_frame()));
    }

    #[test]
    fn test_no_record_keeps_scanning() {
        let engine = ReplayEngine::new()
            .with_identity(Vec::new())
            .with_identity(identity_output(&[(0x22, b"Name")]));
        let (session, _, seen) = session(ScanKind::Identity, engine, Continuation::Stop);
        session.start().unwrap();

        let owned = OwnedFrame::blank(64, 36);
        assert!(session.on_frame(&owned.as_frame()));
        assert!(session.on_frame(&owned.as_frame()));
        assert_eq!(session.state(), ScanState::Idle);
        assert!(seen.lock().identity.is_empty());
    }

    #[test]
    fn test_missing_listener_stops() {
        let engine = ReplayEngine::new().with_identity(identity_back_output());
        let (session, _, _) = session(ScanKind::Identity, engine, Continuation::Continue);
        session.clear_listener();
        session.start().unwrap();

        let owned = OwnedFrame::blank(64, 36);
        assert!(session.on_frame(&owned.as_frame()));
        assert_eq!(session.state(), ScanState::Stopped);
    }

    #[test]
    fn test_identity_needs_initialized_engine() {
        let handle = Arc::new(EngineHandle::new(
            ReplayEngine::new().with_identity(identity_back_output()),
        ));
        let capture = ReplayCapture::new(Vec::new());
        let session = ScanSession::new(ScanKind::Identity, SCREEN, handle.clone(), Box::new(capture.control()));
        session.start().unwrap();

        let owned = OwnedFrame::blank(64, 36);
        assert!(session.on_frame(&owned.as_frame()));
        assert_eq!(session.state(), ScanState::Idle);
        assert!(!handle.is_initialized());
    }

    #[test]
    fn test_bank_result_carries_crop() {
        let engine = ReplayEngine::new().with_bank(bank_output("4000000000000000"));
        let (session, _, seen) = session(ScanKind::Bank, engine, Continuation::Stop);
        session.start().unwrap();

        let owned = OwnedFrame::blank(1280, 720);
        assert!(session.on_frame(&owned.as_frame()));

        let seen = seen.lock();
        let (record, crop) = &seen.bank[0];
        assert_eq!(record.number, "4000000000000000");
        let r = crop.rect();
        assert!(r.x >= 0.0 && r.y >= 0.0 && r.max_x() < 1280.0 && r.max_y() < 720.0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (session, capture, _) = session(ScanKind::Bank, ReplayEngine::new(), Continuation::Continue);
        session.start().unwrap();
        session.stop();
        session.stop();
        assert_eq!(session.state(), ScanState::Stopped);
        assert!(!capture.is_running());

        session.start().unwrap();
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[test]
    fn test_replay_feeds_frames_in_order() {
        let engine = ReplayEngine::new()
            .with_bank(Vec::new())
            .with_bank(bank_output("6222 0000 1111 2222"))
            .with_bank(bank_output("4000000000000000"));
        let handle = Arc::new(EngineHandle::new(engine));
        let frames = (0..4).map(|_| OwnedFrame::blank(1280, 720)).collect();
        let capture = ReplayCapture::new(frames);
        let session = ScanSession::new(ScanKind::Bank, SCREEN, handle, Box::new(capture.control()));
        let seen = Arc::new(Mutex::new(Recorded::default()));
        session.set_listener(Box::new(RecordingListener {
            seen: seen.clone(),
            verdict: Continuation::Stop,
        }));

        session.start().unwrap();
        let stats = capture.run(|frame| session.on_frame(frame));

        // second frame decodes and stops the session before the rest arrive
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.accepted, 2);
        assert_eq!(seen.lock().bank[0].0.number, "6222 0000 1111 2222");
    }

    /// Engine whose bank call parks until the test releases it
    struct GatedEngine {
        entered: Sender<()>,
        release: Receiver<()>,
        output: Vec<u8>,
    }

    impl RecognitionEngine for GatedEngine {
        fn init(&mut self, _resource_path: &Path) -> i32 {
            0
        }

        fn shutdown(&mut self) {}

        fn recognize_identity(&mut self, _request: &IdentityRequest<'_>, _out: &mut [u8]) -> i32 {
            0
        }

        fn recognize_bank(&mut self, _request: &BankRequest<'_>, out: &mut [u8]) -> i32 {
            self.entered.send(()).unwrap();
            self.release.recv().unwrap();
            out[..self.output.len()].copy_from_slice(&self.output);
            self.output.len() as i32
        }
    }

    fn gated(verdict: Continuation) -> (Arc<ScanSession<GatedEngine>>, Receiver<()>, Sender<()>, Arc<Mutex<Recorded>>) {
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        let engine = GatedEngine {
            entered: entered_tx,
            release: release_rx,
            output: bank_output("4000000000000000"),
        };
        let (session, _, seen) = session(ScanKind::Bank, engine, verdict);
        session.start().unwrap();
        (Arc::new(session), entered_rx, release_tx, seen)
    }

    #[test]
    fn test_frames_rejected_while_processing() {
        let (session, entered, release, seen) = gated(Continuation::Continue);

        let worker = {
            let session = session.clone();
            thread::spawn(move || {
                let owned = OwnedFrame::blank(1280, 720);
                session.on_frame(&owned.as_frame())
            })
        };
        entered.recv().unwrap();

        assert_eq!(session.state(), ScanState::Processing);
        let owned = OwnedFrame::blank(1280, 720);
        for _ in 0..3 {
            assert!(!session.on_frame(&owned.as_frame()));
        }

        release.send(()).unwrap();
        assert!(worker.join().unwrap());
        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(seen.lock().bank.len(), 1);
    }

    #[test]
    fn test_stop_during_recognition_discards_result() {
        let (session, entered, release, seen) = gated(Continuation::Continue);

        let worker = {
            let session = session.clone();
            thread::spawn(move || {
                let owned = OwnedFrame::blank(1280, 720);
                session.on_frame(&owned.as_frame())
            })
        };
        entered.recv().unwrap();
        session.stop();
        release.send(()).unwrap();

        assert!(worker.join().unwrap());
        assert_eq!(session.state(), ScanState::Stopped);
        assert!(seen.lock().bank.is_empty());
    }

    #[test]
    fn test_restart_while_in_flight_discards_stale_result() {
        let (session, entered, release, seen) = gated(Continuation::Stop);

        let worker = {
            let session = session.clone();
            thread::spawn(move || {
                let owned = OwnedFrame::blank(1280, 720);
                session.on_frame(&owned.as_frame())
            })
        };
        entered.recv().unwrap();
        session.stop();
        session.start().unwrap();

        // the frame accepted before the stop still occupies the session
        assert_eq!(session.state(), ScanState::Processing);
        let owned = OwnedFrame::blank(1280, 720);
        assert!(!session.on_frame(&owned.as_frame()));

        release.send(()).unwrap();
        assert!(worker.join().unwrap());
        assert!(seen.lock().bank.is_empty());
        assert_eq!(session.state(), ScanState::Idle);

        // the next frame runs in the new generation and its Stop is honoured
        release.send(()).unwrap();
        assert!(session.on_frame(&owned.as_frame()));
        assert_eq!(seen.lock().bank.len(), 1);
        assert_eq!(session.state(), ScanState::Stopped);
    }

    /// Listener whose bank callback parks until the test releases it
    struct BlockingListener {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl ScanListener for BlockingListener {
        fn on_identity_result(&mut self, _record: IdentityRecord, _frame: &CaptureFrame<'_>) -> Continuation {
            Continuation::Continue
        }

        fn on_bank_result(
            &mut self,
            _record: BankRecord,
            _frame: &CaptureFrame<'_>,
            _crop: CropRect,
        ) -> Continuation {
            self.entered.send(()).unwrap();
            self.release.recv().unwrap();
            Continuation::Continue
        }
    }

    #[test]
    fn test_stop_waits_for_listener_callback() {
        let engine = ReplayEngine::new().with_bank(bank_output("4000000000000000"));
        let (session, capture, _) = session(ScanKind::Bank, engine, Continuation::Continue);
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        session.set_listener(Box::new(BlockingListener {
            entered: entered_tx,
            release: release_rx,
        }));
        session.start().unwrap();
        let session = Arc::new(session);

        let worker = {
            let session = session.clone();
            thread::spawn(move || {
                let owned = OwnedFrame::blank(1280, 720);
                session.on_frame(&owned.as_frame())
            })
        };
        entered_rx.recv().unwrap();

        let (stopped_tx, stopped_rx) = bounded(1);
        let stopper = {
            let session = session.clone();
            thread::spawn(move || {
                session.stop();
                stopped_tx.send(()).unwrap();
            })
        };
        assert!(stopped_rx.recv_timeout(Duration::from_millis(100)).is_err());

        release_tx.send(()).unwrap();
        stopped_rx.recv().unwrap();
        stopper.join().unwrap();
        assert!(worker.join().unwrap());
        assert_eq!(session.state(), ScanState::Stopped);
        assert!(!capture.is_running());
    }

    struct PanickingListener;

    impl ScanListener for PanickingListener {
        fn on_identity_result(&mut self, _record: IdentityRecord, _frame: &CaptureFrame<'_>) -> Continuation {
            panic!("listener failed");
        }

        fn on_bank_result(
            &mut self,
            _record: BankRecord,
            _frame: &CaptureFrame<'_>,
            _crop: CropRect,
        ) -> Continuation {
            panic!("listener failed");
        }
    }

    #[test]
    fn test_panicking_listener_releases_gate() {
        let engine = ReplayEngine::new()
            .with_identity(identity_back_output())
            .with_identity(identity_back_output());
        let (session, _, _) = session(ScanKind::Identity, engine, Continuation::Stop);
        session.set_listener(Box::new(PanickingListener));
        session.start().unwrap();

        let owned = OwnedFrame::blank(64, 36);
        let result = panic::catch_unwind(AssertUnwindSafe(|| session.on_frame(&owned.as_frame())));
        assert!(result.is_err());
        assert_eq!(session.state(), ScanState::Idle);

        let seen = Arc::new(Mutex::new(Recorded::default()));
        session.set_listener(Box::new(RecordingListener {
            seen: seen.clone(),
            verdict: Continuation::Stop,
        }));
        assert!(session.on_frame(&owned.as_frame()));
        assert_eq!(seen.lock().identity.len(), 1);
        assert_eq!(session.state(), ScanState::Stopped);
    }
}
