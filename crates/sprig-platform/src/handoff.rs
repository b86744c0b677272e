//! Lock-free handoff of analysis results between interrupt levels.
//!
//! Analysis runs in a low-priority interrupt and the audio tick in a high
//! one. [`AnalysisHandoff`] lets the analysis side publish a `(period,
//! fidelity)` pair that the audio side reads without locks and without
//! ever seeing half of one result and half of another.
//!
//! # Protocol
//!
//! Two slots and a sequence number, all `AtomicU32`. The writer fills the
//! slot the current sequence does not point at, then bumps the sequence
//! with release ordering. A reader loads the sequence, reads the slot it
//! names, and re-checks the sequence; a change means the writer reused
//! that slot mid-read and the read is retried.
//!
//! A reader that preempts the writer never retries: the writer is always
//! filling the other slot.
//!
//! Single writer, any number of readers.

use core::sync::atomic::{AtomicU32, Ordering, fence};

/// One published analysis result.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnalysisSnapshot {
    /// Period in samples.
    pub period: f32,
    /// Detection confidence, 0 to 1.
    pub fidelity: f32,
    /// Publication count; 0 means nothing has been published yet.
    pub sequence: u32,
}

#[derive(Debug)]
struct Slot {
    period: AtomicU32,
    fidelity: AtomicU32,
}

impl Slot {
    const fn new() -> Self {
        Self {
            period: AtomicU32::new(0),
            fidelity: AtomicU32::new(0),
        }
    }
}

/// Double-buffered `(period, fidelity)` cell.
///
/// # Example
///
/// ```rust
/// use sprig_platform::AnalysisHandoff;
///
/// static PITCH: AnalysisHandoff = AnalysisHandoff::new();
///
/// // analysis interrupt
/// PITCH.publish(109.1, 0.97);
///
/// // audio interrupt
/// let snap = PITCH.read();
/// assert_eq!(snap.period, 109.1);
/// assert_eq!(snap.sequence, 1);
/// ```
#[derive(Debug)]
pub struct AnalysisHandoff {
    slots: [Slot; 2],
    sequence: AtomicU32,
}

impl Default for AnalysisHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisHandoff {
    /// An empty cell. Reads return zeros with sequence 0 until the first
    /// publish.
    pub const fn new() -> Self {
        Self {
            slots: [Slot::new(), Slot::new()],
            sequence: AtomicU32::new(0),
        }
    }

    /// Publish a new result. Must only be called from one context.
    pub fn publish(&self, period: f32, fidelity: f32) {
        let next = self.sequence.load(Ordering::Relaxed).wrapping_add(1);
        let slot = &self.slots[(next & 1) as usize];

        // readers that catch any of the stores below also see the previous bump
        fence(Ordering::Release);
        slot.period.store(period.to_bits(), Ordering::Relaxed);
        slot.fidelity.store(fidelity.to_bits(), Ordering::Relaxed);
        self.sequence.store(next, Ordering::Release);
    }

    /// One read attempt. `None` if a publish overlapped it.
    pub fn try_read(&self) -> Option<AnalysisSnapshot> {
        let before = self.sequence.load(Ordering::Acquire);
        let slot = &self.slots[(before & 1) as usize];
        let period = slot.period.load(Ordering::Relaxed);
        let fidelity = slot.fidelity.load(Ordering::Relaxed);
        fence(Ordering::Acquire);
        let after = self.sequence.load(Ordering::Relaxed);

        (before == after).then(|| AnalysisSnapshot {
            period: f32::from_bits(period),
            fidelity: f32::from_bits(fidelity),
            sequence: before,
        })
    }

    /// Read the latest complete result, retrying across overlapping
    /// publishes.
    pub fn read(&self) -> AnalysisSnapshot {
        loop {
            if let Some(snapshot) = self.try_read() {
                return snapshot;
            }
            core::hint::spin_loop();
        }
    }

    /// Number of publishes so far, wrapping.
    pub fn sequence(&self) -> u32 {
        self.sequence.load(Ordering::Acquire)
    }
}
