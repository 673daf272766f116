//! Flow-control windows (§4.3): one signed 31-bit window per scope
//! (connection, per-stream) per direction. Grounded on the teacher's
//! `src/stream.rs` state tracking (which never actually implemented flow
//! control — this module is new), generalized from RFC 7540 §6.9.

use crate::error::{Http2Error, WindowScope};

/// The largest value a WINDOW_UPDATE increment (or a window itself) may
/// hold: 2^31 - 1.
pub const MAX_WINDOW_SIZE: i64 = (1 << 31) - 1;

/// A single flow-control window. Signed because SETTINGS_INITIAL_WINDOW_SIZE
/// changes apply their delta to every open stream's send window and can push
/// a window negative (RFC 7540 §6.9.2); further sends stay blocked until
/// enough WINDOW_UPDATEs bring it non-negative again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowWindow {
    size: i64,
}

impl FlowWindow {
    #[must_use]
    pub fn new(initial: u32) -> Self {
        Self { size: i64::from(initial) }
    }

    #[must_use]
    pub fn available(self) -> i64 {
        self.size
    }

    /// Consumes `n` bytes of send (or receive) budget. The caller is
    /// responsible for ensuring `n <= available()` before calling this for
    /// an outbound send; inbound accounting calls this unconditionally and
    /// relies on the peer having respected our window.
    pub fn consume(&mut self, n: u32, scope: WindowScope) -> Result<(), Http2Error> {
        self.size -= i64::from(n);
        if self.size < -MAX_WINDOW_SIZE {
            return Err(Http2Error::FlowControlError(format!(
                "{scope:?} window underflowed below the minimum representable value"
            )));
        }
        Ok(())
    }

    /// Applies an incoming WINDOW_UPDATE increment, erroring if the window
    /// would overflow 2^31 - 1 (RFC 7540 §6.9.1).
    pub fn increment(&mut self, n: u32, scope: WindowScope) -> Result<(), Http2Error> {
        let new_size = self.size + i64::from(n);
        if new_size > MAX_WINDOW_SIZE {
            return Err(Http2Error::FlowControlError(format!(
                "{scope:?} window would overflow 2^31-1"
            )));
        }
        self.size = new_size;
        Ok(())
    }

    /// Applies a SETTINGS_INITIAL_WINDOW_SIZE change's delta to an
    /// already-open stream's send window (RFC 7540 §6.9.2). Saturates rather
    /// than erroring; only actual transmission is blocked by a negative
    /// window, not the settings-driven adjustment itself.
    pub fn adjust_by_delta(&mut self, delta: i64) {
        self.size = self.size.saturating_add(delta);
    }
}

/// How large a WINDOW_UPDATE increment must accumulate before this client
/// bothers sending one, instead of dribbling out a WINDOW_UPDATE per byte
/// read. Expressed as a fraction of the configured initial window.
#[must_use]
pub fn update_threshold(initial_window_size: u32) -> u32 {
    (initial_window_size / 2).max(1)
}

/// Tracks the inbound side of one flow-controlled scope: the window itself,
/// plus how many bytes have been consumed since the last WINDOW_UPDATE we
/// emitted. Returns the increment to send, if the accumulated amount has
/// crossed `update_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundFlow {
    window: FlowWindow,
    unacked: u32,
    threshold: u32,
}

impl InboundFlow {
    #[must_use]
    pub fn new(initial_window_size: u32) -> Self {
        Self {
            window: FlowWindow::new(initial_window_size),
            unacked: 0,
            threshold: update_threshold(initial_window_size),
        }
    }

    #[must_use]
    pub fn window(self) -> FlowWindow {
        self.window
    }

    /// Accounts for `n` freshly received bytes, returning the WINDOW_UPDATE
    /// increment to emit, if any.
    pub fn on_received(&mut self, n: u32, scope: WindowScope) -> Result<Option<u32>, Http2Error> {
        self.window.consume(n, scope)?;
        self.unacked = self.unacked.saturating_add(n);
        if self.unacked >= self.threshold {
            let increment = self.unacked;
            self.unacked = 0;
            self.window.increment(increment, scope)?;
            return Ok(Some(increment));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_blocks_at_zero() {
        let mut w = FlowWindow::new(10);
        assert!(w.consume(10, WindowScope::Request).is_ok());
        assert_eq!(w.available(), 0);
    }

    #[test]
    fn increment_rejects_overflow() {
        let mut w = FlowWindow::new(u32::try_from(MAX_WINDOW_SIZE).unwrap());
        assert!(w.increment(1, WindowScope::Connection).is_err());
    }

    #[test]
    fn settings_delta_can_go_negative() {
        let mut w = FlowWindow::new(100);
        w.adjust_by_delta(-150);
        assert_eq!(w.available(), -50);
    }

    #[test]
    fn inbound_flow_emits_update_past_threshold() {
        let mut flow = InboundFlow::new(100);
        assert_eq!(flow.on_received(40, WindowScope::Request).unwrap(), None);
        let increment = flow.on_received(40, WindowScope::Request).unwrap();
        assert_eq!(increment, Some(80));
    }
}
