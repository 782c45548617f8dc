//! Edge-triggered one-shot counters.
//!
//! The control record carries actions (calibrate, reboot, trigger capture)
//! as monotonically increasing counters layered on a level-triggered
//! transport: the client bumps the counter, the proxy fires the action when
//! it observes a value different from the last one it consumed. Repeated
//! ticks with an unchanged counter must not refire, and a counter that
//! jumped by more than one (edges coalesced by the whole-record protocol)
//! fires exactly once.

/// One edge-triggered trigger slot.
///
/// `observe` consumes the current counter value and reports whether the
/// associated action should fire this tick. Wraparound needs no special
/// case: inequality against the last observed value is the whole test.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeTrigger {
    last: u32,
}

impl EdgeTrigger {
    /// New trigger, synchronized to counter value 0.
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// Consume the current counter value; true exactly when it changed
    /// since the previous call.
    #[inline]
    pub fn observe(&mut self, current: u32) -> bool {
        let fired = current != self.last;
        self.last = current;
        fired
    }

    /// Synchronize to `current` without firing. Used at startup so
    /// pre-existing counter values are not mistaken for fresh edges.
    #[inline]
    pub fn sync(&mut self, current: u32) {
        self.last = current;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_value_is_noop() {
        let mut t = EdgeTrigger::new();
        assert!(!t.observe(0));
        assert!(!t.observe(0));
        assert!(!t.observe(0));
    }

    #[test]
    fn two_unit_deltas_fire_twice() {
        let mut t = EdgeTrigger::new();
        assert!(t.observe(1));
        assert!(t.observe(2));
        assert!(!t.observe(2));
    }

    #[test]
    fn jumped_delta_fires_once() {
        // Two edges coalesced into one observation fire a single action.
        let mut t = EdgeTrigger::new();
        assert!(t.observe(2));
        assert!(!t.observe(2));
    }

    #[test]
    fn wraparound_fires_once() {
        let mut t = EdgeTrigger::new();
        t.sync(u32::MAX);
        assert!(!t.observe(u32::MAX));
        assert!(t.observe(0));
        assert!(!t.observe(0));
    }

    #[test]
    fn sync_swallows_pending_edge() {
        let mut t = EdgeTrigger::new();
        t.sync(7);
        assert!(!t.observe(7));
        assert!(t.observe(8));
    }
}
