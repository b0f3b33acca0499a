//! Application Coordinator
//!
//! Owns the configuration, the process-wide engine handle and the channel
//! that carries scan results to the UI side. Sessions are created here so
//! they all share one engine.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use tracing::{info, warn};

use crate::capture::CaptureControl;
use crate::config::ScannerConfig;
use crate::engine::{EngineHandle, RecognitionEngine};
use crate::session::{ChannelListener, ScanEvent, ScanKind, ScanSession};

/// Composition root for scanning
pub struct ScannerApp<E> {
    config: ScannerConfig,
    engine: Arc<EngineHandle<E>>,
    events_tx: Sender<ScanEvent>,
    events_rx: Receiver<ScanEvent>,
}

impl<E: RecognitionEngine> ScannerApp<E> {
    /// Create a coordinator around an uninitialized engine
    pub fn new(config: ScannerConfig, engine: E) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            engine: Arc::new(EngineHandle::new(engine)),
            events_tx,
            events_rx,
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Shared engine handle
    pub fn engine(&self) -> Arc<EngineHandle<E>> {
        self.engine.clone()
    }

    /// Receiver for results published by sessions created here
    pub fn events(&self) -> Receiver<ScanEvent> {
        self.events_rx.clone()
    }

    /// Create a session publishing to [`Self::events`]
    ///
    /// Identity sessions initialize the engine first. A failed init is
    /// logged and leaves the session unable to recognize until re-init.
    pub fn create_session(&self, kind: ScanKind, capture: Box<dyn CaptureControl>) -> ScanSession<E> {
        if kind == ScanKind::Identity {
            if let Err(e) = self.engine.init(&self.config.engine.resource_path()) {
                warn!("Identity scanning unavailable: {}", e);
            }
        }

        let session = ScanSession::new(
            kind,
            self.config.display.screen_size(),
            self.engine.clone(),
            capture,
        );
        session.set_listener(Box::new(ChannelListener::new(
            self.events_tx.clone(),
            self.config.scan.after_result(),
        )));
        info!(session = %session.id(), kind = ?kind, "Scan session created");
        session
    }

    /// Release the engine for the rest of the process
    pub fn shutdown(&self) {
        if self.engine.is_initialized() {
            self.engine.shutdown();
        }
    }
}
