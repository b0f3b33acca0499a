//! Result listeners
//!
//! A listener receives each decoded record while the frame it came from is
//! still borrowed, and decides whether scanning goes on.

use crossbeam_channel::Sender;
use image::GrayImage;
use tracing::{debug, warn};

use crate::capture::CaptureFrame;
use crate::decode::{BankRecord, IdentityRecord};
use crate::geometry::CropRect;

/// Listener's verdict after a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Keep scanning frames
    Continue,
    /// Stop the session and halt capture
    Stop,
}

/// Receives decoded scan results
///
/// Callbacks run with the session's listener lock held. They must not call
/// `stop`, `set_listener` or `clear_listener` on the session delivering
/// them; return [`Continuation::Stop`] to end scanning instead.
pub trait ScanListener: Send {
    /// An identity card was decoded from `frame`
    fn on_identity_result(&mut self, record: IdentityRecord, frame: &CaptureFrame<'_>) -> Continuation;

    /// A bank card was decoded from `frame`; `crop` surrounds its number
    fn on_bank_result(
        &mut self,
        record: BankRecord,
        frame: &CaptureFrame<'_>,
        crop: CropRect,
    ) -> Continuation;
}

/// A result detached from its frame, ready to cross threads
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Identity {
        record: IdentityRecord,
        /// Full frame as grayscale
        image: Option<GrayImage>,
    },
    Bank {
        record: BankRecord,
        crop: CropRect,
        /// Frame cut down to `crop`
        image: Option<GrayImage>,
    },
}

/// Forwards results over a channel to a UI-side consumer
///
/// Frame pixels are exported while still borrowed, so the consumer never
/// touches capture buffers. Returns `Stop` once the receiver is gone.
pub struct ChannelListener {
    tx: Sender<ScanEvent>,
    after_result: Continuation,
}

impl ChannelListener {
    pub fn new(tx: Sender<ScanEvent>, after_result: Continuation) -> Self {
        Self { tx, after_result }
    }

    fn forward(&self, event: ScanEvent) -> Continuation {
        match self.tx.send(event) {
            Ok(()) => {
                debug!("Scan result forwarded");
                self.after_result
            }
            Err(_) => {
                warn!("Scan result receiver dropped, stopping");
                Continuation::Stop
            }
        }
    }
}

impl ScanListener for ChannelListener {
    fn on_identity_result(&mut self, record: IdentityRecord, frame: &CaptureFrame<'_>) -> Continuation {
        self.forward(ScanEvent::Identity {
            record,
            image: frame.to_image(),
        })
    }

    fn on_bank_result(
        &mut self,
        record: BankRecord,
        frame: &CaptureFrame<'_>,
        crop: CropRect,
    ) -> Continuation {
        self.forward(ScanEvent::Bank {
            record,
            crop,
            image: frame.crop(&crop),
        })
    }
}
