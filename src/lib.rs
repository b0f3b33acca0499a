//! CardScanner - identity and bank card scanning core
//!
//! Accepts camera frames, keeps at most one recognition in flight, decodes
//! the recognition engine's byte output into card records and computes the
//! crop rectangle around a recognized bank card number.

pub mod app;
pub mod capture;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod session;

#[cfg(test)]
mod testing;

pub use app::ScannerApp;
pub use capture::{CaptureControl, CaptureFrame, OwnedFrame};
pub use config::ScannerConfig;
pub use decode::{BankRecord, IdentityRecord};
pub use engine::{EngineHandle, RecognitionEngine};
pub use error::{DecodeError, ScanError};
pub use geometry::{CropRect, Rect, Size};
pub use session::{Continuation, ScanEvent, ScanKind, ScanListener, ScanSession, ScanState};
