//! Canned-output engine
//!
//! Replays recorded engine output buffers instead of running recognition.
//! Used by the command line replay tool and by tests.

use std::collections::VecDeque;
use std::path::Path;

use super::{BankRequest, IdentityRequest, RecognitionEngine};

/// Engine that answers each call with the next queued buffer
#[derive(Debug, Default)]
pub struct ReplayEngine {
    identity: VecDeque<Vec<u8>>,
    bank: VecDeque<Vec<u8>>,
    init_status: i32,
    init_calls: usize,
    last_bank_guide: Option<(i32, i32, i32, i32)>,
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status code `init` will report
    pub fn with_init_status(mut self, status: i32) -> Self {
        self.init_status = status;
        self
    }

    /// Queue an identity output buffer
    pub fn with_identity(mut self, output: Vec<u8>) -> Self {
        self.identity.push_back(output);
        self
    }

    /// Queue a bank output buffer
    pub fn with_bank(mut self, output: Vec<u8>) -> Self {
        self.bank.push_back(output);
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls
    }

    /// Guide edges (left, top, right, bottom) of the latest bank call
    pub fn last_bank_guide(&self) -> Option<(i32, i32, i32, i32)> {
        self.last_bank_guide
    }

    fn emit(queue: &mut VecDeque<Vec<u8>>, out: &mut [u8]) -> i32 {
        let Some(canned) = queue.pop_front() else {
            return 0;
        };
        let len = canned.len().min(out.len());
        out[..len].copy_from_slice(&canned[..len]);
        i32::try_from(len).unwrap_or(i32::MAX)
    }
}

impl RecognitionEngine for ReplayEngine {
    fn init(&mut self, _resource_path: &Path) -> i32 {
        self.init_calls += 1;
        self.init_status
    }

    fn shutdown(&mut self) {}

    fn recognize_identity(&mut self, _request: &IdentityRequest<'_>, out: &mut [u8]) -> i32 {
        Self::emit(&mut self.identity, out)
    }

    fn recognize_bank(&mut self, request: &BankRequest<'_>, out: &mut [u8]) -> i32 {
        self.last_bank_guide = Some((
            request.guide_left,
            request.guide_top,
            request.guide_right,
            request.guide_bottom,
        ));
        Self::emit(&mut self.bank, out)
    }
}
