//! In-memory capture source
//!
//! Delivers a fixed list of frames in order, standing in for the camera when
//! replaying engine dumps from the command line and in tests.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::frame::{CaptureFrame, OwnedFrame};
use super::CaptureControl;

/// Counters from one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Frames handed to the sink
    pub delivered: usize,
    /// Frames the sink accepted
    pub accepted: usize,
}

/// Replays owned frames to a frame sink until exhausted or stopped
pub struct ReplayCapture {
    frames: Vec<OwnedFrame>,
    running: Arc<AtomicBool>,
}

impl ReplayCapture {
    /// Create a replay source; it starts halted
    pub fn new(frames: Vec<OwnedFrame>) -> Self {
        Self {
            frames,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Control handle to give to a scan session
    pub fn control(&self) -> ReplayControl {
        ReplayControl {
            running: self.running.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Deliver frames in order while running
    ///
    /// Each frame is only borrowed for the duration of the `sink` call.
    pub fn run<F>(&self, mut sink: F) -> ReplayStats
    where
        F: FnMut(&CaptureFrame<'_>) -> bool,
    {
        let mut stats = ReplayStats::default();
        for owned in &self.frames {
            if !self.is_running() {
                debug!("Replay halted after {} frames", stats.delivered);
                break;
            }
            let frame = owned.as_frame();
            stats.delivered += 1;
            if sink(&frame) {
                stats.accepted += 1;
            }
        }
        stats
    }
}

/// Shared run flag of a [`ReplayCapture`]
#[derive(Debug, Clone)]
pub struct ReplayControl {
    running: Arc<AtomicBool>,
}

impl CaptureControl for ReplayControl {
    fn start(&mut self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_requires_start() {
        let capture = ReplayCapture::new(vec![OwnedFrame::blank(2, 2)]);
        let stats = capture.run(|_| true);
        assert_eq!(stats, ReplayStats::default());
    }

    #[test]
    fn test_replay_delivers_in_order_until_stopped() {
        let frames = (1..=5).map(|w| OwnedFrame::blank(w, 1)).collect();
        let capture = ReplayCapture::new(frames);
        let mut control = capture.control();
        control.start().unwrap();

        let mut widths = Vec::new();
        let stats = capture.run(|frame| {
            widths.push(frame.width);
            if frame.width == 3 {
                control.stop().unwrap();
            }
            frame.width % 2 == 1
        });

        assert_eq!(widths, vec![1, 2, 3]);
        assert_eq!(stats, ReplayStats { delivered: 3, accepted: 2 });
        assert!(!capture.is_running());
    }
}
