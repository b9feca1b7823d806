// src/io/eid/framer.rs
//
// Identifier framing for the EID byte stream.
//
// The reader's output framing is not documented reliably enough to parse by
// delimiter: tag reads arrive with stray control and separator bytes mixed
// into the payload, split across arbitrary read boundaries. Frames are
// recovered with a length-threshold heuristic plus aggressive noise
// stripping instead. The trade-off is deliberate: a burst carrying two
// back-to-back scans is emitted as one oversized frame, and consumers take
// a trailing fixed-width slice rather than relying on one-frame-per-scan.
// Downstream dedup depends on this behavior; do not split bursts here.

use serde::{Deserialize, Serialize};

/// Minimum number of clean characters before a frame is emitted.
pub const MIN_FRAME_LEN: usize = 10;

/// Hard ceiling on buffered characters. A buffer that grows past this
/// without producing a frame is treated as protocol desynchronisation and
/// discarded whole.
pub const MAX_BUFFER_LEN: usize = 1000;

/// Framing thresholds. The defaults match the deployed reader firmware's
/// observed behavior; change them only for a different tag format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EidFramerConfig {
    /// Clean-character threshold that completes a frame.
    pub min_frame_len: usize,
    /// Raw-buffer ceiling for desynchronisation recovery.
    pub max_buffer_len: usize,
}

impl Default for EidFramerConfig {
    fn default() -> Self {
        EidFramerConfig {
            min_frame_len: MIN_FRAME_LEN,
            max_buffer_len: MAX_BUFFER_LEN,
        }
    }
}

/// Stateful framer for the reader's identifier stream.
///
/// Restartable at any byte boundary; the only state is the accumulate/clear
/// cycle of its raw buffer.
pub struct EidFramer {
    raw: String,
    config: EidFramerConfig,
}

impl EidFramer {
    pub fn new(config: EidFramerConfig) -> Self {
        EidFramer {
            raw: String::new(),
            config,
        }
    }

    /// Feed one read chunk into the framer.
    ///
    /// Returns at most one completed frame per call: once the accumulated
    /// buffer holds `min_frame_len` characters, the whole buffer is filtered
    /// down to alphanumerics, and if the filtered text still meets the
    /// threshold it is emitted and the buffer cleared. Earlier noise is
    /// re-stripped on every call, so a frame never contains punctuation,
    /// whitespace, or control characters regardless of how the bytes were
    /// chunked.
    pub fn feed(&mut self, data: &[u8]) -> Option<String> {
        self.raw.push_str(&String::from_utf8_lossy(data));

        if self.raw.chars().count() >= self.config.min_frame_len {
            let clean: String = self.raw.chars().filter(|c| c.is_alphanumeric()).collect();
            if clean.chars().count() >= self.config.min_frame_len {
                self.raw.clear();
                return Some(clean);
            }
        }

        // Desynchronisation recovery: discard, don't truncate.
        if self.raw.chars().count() > self.config.max_buffer_len {
            self.raw.clear();
        }

        None
    }

    /// Drop any buffered data without emitting.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Number of raw (unstripped) characters currently buffered.
    pub fn buffered(&self) -> usize {
        self.raw.chars().count()
    }
}
