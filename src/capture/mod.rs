//! Capture Layer
//!
//! The camera itself lives outside this crate. A scan session only needs to
//! receive frames and to tell the capture source when to run or halt.

pub mod frame;
pub mod replay;

pub use frame::{CaptureFrame, OwnedFrame};
pub use replay::{ReplayCapture, ReplayControl, ReplayStats};

use anyhow::Result;

/// Run/halt control over a capture source
pub trait CaptureControl: Send {
    /// Begin (or resume) delivering frames
    fn start(&mut self) -> Result<()>;

    /// Stop delivering frames; must be safe to call repeatedly
    fn stop(&mut self) -> Result<()>;
}
