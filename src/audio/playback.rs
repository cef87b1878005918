//! Gapless playback scheduling with hard interruption.
//!
//! [`PlaybackScheduler`] owns the playback clock and the set of in-flight
//! sources. Every decoded buffer is committed to start at
//! `max(clock, now)`, the clock then advances by the buffer's duration, so
//! buffers play back-to-back in call order with neither gap nor overlap.
//!
//! Completion is signalled through a channel rather than a callback: when a
//! source's end time passes, its [`SourceId`] is sent on the channel handed
//! to [`PlaybackScheduler::new`]. The owner feeds it back through
//! [`PlaybackScheduler::finish`], which reports when the set has drained.
//!
//! ```text
//! clock ──────────────▶
//! [ buf 1 ][ buf 2 ][ buf 3 ]          schedule × 3
//!             ▲ interrupt_all(): flush sink, clear set, clock = 0
//!                   [ buf 4 ]          starts at `now`
//! ```

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use super::device::AudioSink;

/// Identifies one scheduled buffer.
pub type SourceId = u64;

/// Where a buffer landed on the playback timeline (seconds since the
/// scheduler was created).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub id: SourceId,
    pub start: f64,
    pub duration: f64,
}

impl Slot {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A buffer committed to the timeline that has not finished playing.
#[derive(Debug)]
pub struct ScheduledSource {
    pub slot: Slot,
    timer: JoinHandle<()>,
}

/// Schedules decoded audio onto one output sink.
pub struct PlaybackScheduler {
    sink: Box<dyn AudioSink>,
    epoch: Instant,
    clock: f64,
    next_id: SourceId,
    active: HashMap<SourceId, ScheduledSource>,
    finished_tx: mpsc::UnboundedSender<SourceId>,
    released: bool,
}

impl PlaybackScheduler {
    /// Create a scheduler writing to `sink`. Finished source ids are sent on
    /// `finished_tx`.
    pub fn new(sink: Box<dyn AudioSink>, finished_tx: mpsc::UnboundedSender<SourceId>) -> Self {
        Self {
            sink,
            epoch: Instant::now(),
            clock: 0.0,
            next_id: 0,
            active: HashMap::new(),
            finished_tx,
            released: false,
        }
    }

    /// Seconds elapsed on the playback timeline.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// The "next free slot" cursor.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Number of sources that have not finished playing.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Commit `samples` (mono, `sample_rate` Hz) to play right after
    /// everything already scheduled, or immediately when the timeline has
    /// fallen behind real time.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&mut self, samples: &[f32], sample_rate: u32) -> Slot {
        let duration = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / sample_rate as f64
        };
        let start = self.clock.max(self.now());
        self.clock = start + duration;

        let id = self.next_id;
        self.next_id += 1;
        let slot = Slot {
            id,
            start,
            duration,
        };

        self.sink.enqueue(samples, sample_rate);

        let deadline = self.epoch + Duration::from_secs_f64(slot.end());
        let tx = self.finished_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(id);
        });

        self.active.insert(id, ScheduledSource { slot, timer });
        log::trace!(
            "playback: source {id} at {start:.3}s for {duration:.3}s ({} active)",
            self.active.len()
        );
        slot
    }

    /// Record that source `id` finished playing.
    ///
    /// Returns `true` when this removal emptied the active set. Ids that are
    /// no longer active (e.g. interrupted) are ignored and return `false`.
    pub fn finish(&mut self, id: SourceId) -> bool {
        self.active.remove(&id).is_some() && self.active.is_empty()
    }

    /// Stop everything immediately: flush the sink, drop every active
    /// source and reset the clock to zero. Idempotent.
    pub fn interrupt_all(&mut self) {
        for (_, source) in self.active.drain() {
            source.timer.abort();
        }
        self.sink.flush();
        self.clock = 0.0;
    }

    /// Interrupt and close the output device. Only the first call does
    /// anything.
    pub fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        self.interrupt_all();
        self.sink.release();
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::{FakeSink, FakeSpeakerLog};
    use std::sync::{Arc, Mutex};

    const RATE: u32 = 24_000;

    fn scheduler() -> (
        PlaybackScheduler,
        mpsc::UnboundedReceiver<SourceId>,
        Arc<Mutex<FakeSpeakerLog>>,
    ) {
        let log = Arc::new(Mutex::new(FakeSpeakerLog::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let sched = PlaybackScheduler::new(Box::new(FakeSink::new(Arc::clone(&log))), tx);
        (sched, rx, log)
    }

    fn secs(s: f64) -> Vec<f32> {
        vec![0.0; (s * RATE as f64) as usize]
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_without_gap_or_overlap() {
        let (mut sched, _rx, _log) = scheduler();

        let durations = [0.5, 0.25, 1.0, 0.125, 0.75];
        let mut prev: Option<Slot> = None;
        for d in durations {
            let slot = sched.schedule(&secs(d), RATE);
            assert!((slot.duration - d).abs() < 1e-9);
            if let Some(p) = prev {
                assert!(slot.start >= p.start);
                assert!(slot.start >= p.end() - 1e-9);
                assert!((slot.start - p.end()).abs() < 1e-9, "gap between slots");
            }
            prev = Some(slot);
        }
        assert_eq!(sched.active_count(), durations.len());
        assert!((sched.clock() - 2.625).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn late_buffer_starts_now_not_in_the_past() {
        let (mut sched, _rx, _log) = scheduler();

        sched.schedule(&secs(0.5), RATE);
        tokio::time::advance(Duration::from_secs(2)).await;

        let slot = sched.schedule(&secs(0.5), RATE);
        assert!(slot.start >= 2.0 - 1e-9);
        assert!(slot.start >= sched.now() - 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_sources_drain_the_set() {
        let (mut sched, mut rx, _log) = scheduler();

        let a = sched.schedule(&secs(0.5), RATE);
        let b = sched.schedule(&secs(0.5), RATE);

        let first = rx.recv().await.unwrap();
        assert_eq!(first, a.id);
        assert!(!sched.finish(first));

        let second = rx.recv().await.unwrap();
        assert_eq!(second, b.id);
        assert!(sched.finish(second));
        assert_eq!(sched.active_count(), 0);
        assert!(sched.now() >= 1.0 - 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_clears_set_and_resets_clock() {
        let (mut sched, mut rx, log) = scheduler();

        sched.schedule(&secs(1.0), RATE);
        sched.schedule(&secs(1.0), RATE);
        sched.interrupt_all();

        assert_eq!(sched.active_count(), 0);
        assert_eq!(sched.clock(), 0.0);
        assert_eq!(log.lock().unwrap().queued, 0);

        // Aborted timers never report completion.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_after_interrupt_starts_at_or_after_now() {
        let (mut sched, _rx, _log) = scheduler();

        tokio::time::advance(Duration::from_millis(1500)).await;
        sched.schedule(&secs(3.0), RATE);
        sched.interrupt_all();

        let slot = sched.schedule(&secs(0.5), RATE);
        assert!(slot.start >= sched.now() - 1e-3);
        assert!(slot.start >= 1.5 - 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_is_idempotent_on_empty_set() {
        let (mut sched, _rx, log) = scheduler();
        sched.interrupt_all();
        sched.interrupt_all();
        assert_eq!(sched.active_count(), 0);
        assert_eq!(sched.clock(), 0.0);
        assert_eq!(log.lock().unwrap().flushes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_finish_after_interrupt_is_ignored() {
        let (mut sched, _rx, _log) = scheduler();
        let slot = sched.schedule(&secs(0.5), RATE);
        sched.interrupt_all();
        assert!(!sched.finish(slot.id));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_releases_sink() {
        let (sched, _rx, log) = scheduler();
        assert!(log.lock().unwrap().open);
        drop(sched);
        assert!(!log.lock().unwrap().open);
    }

    #[tokio::test(start_paused = true)]
    async fn release_flushes_once_and_survives_drop() {
        let (mut sched, _rx, log) = scheduler();
        sched.schedule(&secs(1.0), RATE);

        sched.release();
        sched.release();
        drop(sched);

        let log = log.lock().unwrap();
        assert_eq!(log.flushes, 1);
        assert!(!log.open);
    }
}
