//! Recognition Engine Adapter
//!
//! The recognition engine is an external, non-reentrant component with
//! process-wide init state. It is reached only through [`RecognitionEngine`],
//! and all calls go through one shared [`EngineHandle`].

pub mod replay;

pub use replay::ReplayEngine;

use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, error, info};

use crate::capture::CaptureFrame;
use crate::decode::engine_output;
use crate::error::ScanError;
use crate::geometry::Rect;

/// Output buffer size handed to identity recognition
pub const IDENTITY_OUTPUT_CAPACITY: usize = 1024;

/// Output buffer size handed to bank recognition
pub const BANK_OUTPUT_CAPACITY: usize = 512;

/// Bits per luma sample passed to identity recognition
pub const SAMPLE_DEPTH: i32 = 8;

/// Arguments of an identity recognition call
#[derive(Debug, Clone, Copy)]
pub struct IdentityRequest<'a> {
    pub luma: &'a [u8],
    pub width: i32,
    pub height: i32,
    pub row_stride: i32,
    pub sample_depth: i32,
}

/// Arguments of a bank recognition call
///
/// The guide edges bound the area the engine searches; it reports character
/// boxes relative to (`guide_left`, `guide_top`).
#[derive(Debug, Clone, Copy)]
pub struct BankRequest<'a> {
    pub luma: &'a [u8],
    pub chroma: &'a [u8],
    pub width: i32,
    pub height: i32,
    pub guide_left: i32,
    pub guide_top: i32,
    pub guide_right: i32,
    pub guide_bottom: i32,
}

/// Call contract of the external recognition engine
///
/// Recognition calls write into `out` and return the number of bytes
/// written; zero or negative means nothing was recognized.
pub trait RecognitionEngine: Send {
    /// Load engine resources; returns 0 on success
    fn init(&mut self, resource_path: &Path) -> i32;

    /// Release engine resources
    fn shutdown(&mut self);

    fn recognize_identity(&mut self, request: &IdentityRequest<'_>, out: &mut [u8]) -> i32;

    fn recognize_bank(&mut self, request: &BankRequest<'_>, out: &mut [u8]) -> i32;
}

struct EngineSlot<E> {
    engine: E,
    initialized: bool,
}

/// Process-wide owner of the recognition engine
///
/// Created once by the composition root and shared between sessions. The
/// internal lock serializes every engine call.
pub struct EngineHandle<E> {
    slot: Mutex<EngineSlot<E>>,
}

impl<E: RecognitionEngine> EngineHandle<E> {
    /// Wrap an engine that has not been initialized yet
    pub fn new(engine: E) -> Self {
        Self {
            slot: Mutex::new(EngineSlot {
                engine,
                initialized: false,
            }),
        }
    }

    /// Initialize the engine if it isn't already
    pub fn init(&self, resource_path: &Path) -> Result<(), ScanError> {
        let mut slot = self.slot.lock();
        if slot.initialized {
            return Ok(());
        }

        info!("Initializing recognition engine from {:?}", resource_path);
        let status = slot.engine.init(resource_path);
        if status != 0 {
            error!("Recognition engine init failed with status {}", status);
            return Err(ScanError::EngineInit { status });
        }
        slot.initialized = true;
        info!("Recognition engine initialized");
        Ok(())
    }

    /// Release the engine; a later `init` loads it again
    pub fn shutdown(&self) {
        let mut slot = self.slot.lock();
        slot.initialized = false;
        slot.engine.shutdown();
        info!("Recognition engine shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.lock().initialized
    }

    /// Run `f` with exclusive access to the engine
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut self.slot.lock().engine)
    }

    /// Run identity recognition on a frame, returning the bytes written
    pub fn recognize_identity(&self, frame: &CaptureFrame<'_>) -> Result<Vec<u8>, ScanError> {
        let mut slot = self.slot.lock();
        if !slot.initialized {
            return Err(ScanError::EngineUnavailable);
        }

        let request = IdentityRequest {
            luma: frame.luma,
            width: clamp_i32(frame.width as usize),
            height: clamp_i32(frame.height as usize),
            row_stride: clamp_i32(frame.row_stride),
            sample_depth: SAMPLE_DEPTH,
        };
        let mut out = vec![0u8; IDENTITY_OUTPUT_CAPACITY];
        let length = slot.engine.recognize_identity(&request, &mut out);
        Ok(written(&out, length))
    }

    /// Run bank recognition inside `guide`, returning the bytes written
    pub fn recognize_bank(&self, frame: &CaptureFrame<'_>, guide: Rect) -> Vec<u8> {
        let request = BankRequest {
            luma: frame.luma,
            chroma: frame.chroma,
            width: clamp_i32(frame.width as usize),
            height: clamp_i32(frame.height as usize),
            guide_left: guide.x as i32,
            guide_top: guide.y as i32,
            guide_right: guide.max_x() as i32,
            guide_bottom: guide.max_y() as i32,
        };
        let mut out = vec![0u8; BANK_OUTPUT_CAPACITY];
        let length = self.slot.lock().engine.recognize_bank(&request, &mut out);
        written(&out, length)
    }
}

fn clamp_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn written(out: &[u8], length: i32) -> Vec<u8> {
    match engine_output(out, length) {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            debug!("Engine call returned {}: {}", length, e);
            Vec::new()
        }
    }
}
