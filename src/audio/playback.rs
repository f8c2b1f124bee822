//! Gapless scheduling of audio chunks that arrive with uneven timing.
//!
//! Every chunk is scheduled at the queue's cursor rather than "now", and the
//! cursor then advances by the chunk's exact duration. Chunks therefore play
//! back to back no matter how jittery their arrival was.

use super::codec::AudioFrame;
use crate::error::Result;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use tracing::debug;

/// Identifier of one scheduled source on an output.
pub type SourceId = u64;

/// An audio sink with its own clock that can start sources at future times.
pub trait AudioOutput: Send {
    /// Current position of the output clock, in seconds.
    fn current_time(&self) -> f64;

    /// Start playing mono `samples` recorded at `sample_rate` at clock time `start_at`.
    fn start_source(
        &mut self,
        id: SourceId,
        samples: Vec<f32>,
        sample_rate: u32,
        start_at: f64,
    ) -> Result<()>;

    /// Stop a source immediately. Unknown or finished ids are ignored.
    fn stop_source(&mut self, id: SourceId);

    /// Sources that ended naturally since the last call.
    fn drain_finished(&mut self) -> Vec<SourceId>;
}

/// Ordered playback timeline over an [`AudioOutput`].
pub struct PlaybackQueue {
    output: Box<dyn AudioOutput>,
    cursor: f64,
    active: BTreeSet<SourceId>,
    next_id: SourceId,
}

impl PlaybackQueue {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            cursor: 0.0,
            active: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// Clock time at which the next chunk will start (if not already past).
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Number of sources scheduled or playing, as of the last reap.
    pub fn active_sources(&self) -> usize {
        self.active.len()
    }

    /// Forget sources that finished on their own.
    pub fn reap(&mut self) {
        for id in self.output.drain_finished() {
            self.active.remove(&id);
        }
    }

    /// Schedule a chunk right after everything already queued.
    pub fn schedule(&mut self, frame: &AudioFrame) -> Result<SourceId> {
        self.reap();

        let start_at = self.cursor.max(self.output.current_time());
        let id = self.next_id;
        self.next_id += 1;

        self.output
            .start_source(id, frame.to_mono(), frame.sample_rate, start_at)?;
        self.cursor = start_at + frame.duration_secs();
        self.active.insert(id);

        debug!(
            "Scheduled source {} at {:.3}s, cursor now {:.3}s",
            id, start_at, self.cursor
        );
        Ok(id)
    }

    /// Stop everything and rewind the cursor so the next chunk plays at once.
    pub fn interrupt(&mut self) {
        let stopped = std::mem::take(&mut self.active);
        for id in &stopped {
            self.output.stop_source(*id);
        }
        // Discard completions of the sources stopped above.
        self.output.drain_finished();
        self.cursor = 0.0;

        if !stopped.is_empty() {
            debug!("Interrupted playback, stopped {} source(s)", stopped.len());
        }
    }
}

/// Output that keeps a wall-clock timeline without producing sound.
///
/// Used when no audio device is available so sessions and players keep
/// correct scheduling behaviour in headless environments.
pub struct SilentOutput {
    epoch: Instant,
    scheduled: HashMap<SourceId, f64>,
}

impl SilentOutput {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            scheduled: HashMap::new(),
        }
    }
}

impl Default for SilentOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for SilentOutput {
    fn current_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn start_source(
        &mut self,
        id: SourceId,
        samples: Vec<f32>,
        sample_rate: u32,
        start_at: f64,
    ) -> Result<()> {
        let duration = samples.len() as f64 / sample_rate.max(1) as f64;
        self.scheduled.insert(id, start_at + duration);
        Ok(())
    }

    fn stop_source(&mut self, id: SourceId) {
        self.scheduled.remove(&id);
    }

    fn drain_finished(&mut self) -> Vec<SourceId> {
        let now = self.current_time();
        let finished: Vec<SourceId> = self
            .scheduled
            .iter()
            .filter(|(_, end)| **end <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &finished {
            self.scheduled.remove(id);
        }
        finished
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Output with a manually driven clock, shared with the test body.
    #[derive(Clone, Default)]
    pub(crate) struct ManualOutput {
        pub state: Arc<Mutex<ManualState>>,
    }

    #[derive(Default)]
    pub(crate) struct ManualState {
        pub now: f64,
        pub playing: HashMap<SourceId, (f64, f64)>,
        pub started: Vec<(SourceId, f64, usize)>,
        pub stopped: Vec<SourceId>,
    }

    impl ManualOutput {
        pub fn set_time(&self, now: f64) {
            self.state.lock().unwrap().now = now;
        }

        pub fn playing(&self) -> usize {
            self.state.lock().unwrap().playing.len()
        }

        pub fn started(&self) -> Vec<(SourceId, f64, usize)> {
            self.state.lock().unwrap().started.clone()
        }
    }

    impl AudioOutput for ManualOutput {
        fn current_time(&self) -> f64 {
            self.state.lock().unwrap().now
        }

        fn start_source(
            &mut self,
            id: SourceId,
            samples: Vec<f32>,
            sample_rate: u32,
            start_at: f64,
        ) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            let end = start_at + samples.len() as f64 / sample_rate as f64;
            state.playing.insert(id, (start_at, end));
            state.started.push((id, start_at, samples.len()));
            Ok(())
        }

        fn stop_source(&mut self, id: SourceId) {
            let mut state = self.state.lock().unwrap();
            state.playing.remove(&id);
            state.stopped.push(id);
        }

        fn drain_finished(&mut self) -> Vec<SourceId> {
            let mut state = self.state.lock().unwrap();
            let now = state.now;
            let done: Vec<SourceId> = state
                .playing
                .iter()
                .filter(|(_, (_, end))| *end <= now)
                .map(|(id, _)| *id)
                .collect();
            for id in &done {
                state.playing.remove(id);
            }
            done
        }
    }

    fn chunk(seconds: f64) -> AudioFrame {
        AudioFrame::mono(24_000, vec![0.0; (24_000.0 * seconds) as usize])
    }

    #[test]
    fn test_chunks_play_back_to_back() {
        let output = ManualOutput::default();
        let mut queue = PlaybackQueue::new(Box::new(output.clone()));

        output.set_time(1.0);
        queue.schedule(&chunk(0.5)).unwrap();
        // Second chunk arrives early: still starts where the first ends.
        output.set_time(1.1);
        queue.schedule(&chunk(0.25)).unwrap();

        let started = output.started();
        assert_eq!(started[0].1, 1.0);
        assert_eq!(started[1].1, 1.5);
        assert_eq!(queue.cursor(), 1.75);
    }

    #[test]
    fn test_late_chunk_starts_now() {
        let output = ManualOutput::default();
        let mut queue = PlaybackQueue::new(Box::new(output.clone()));

        queue.schedule(&chunk(0.5)).unwrap();
        output.set_time(3.0);
        queue.schedule(&chunk(0.5)).unwrap();

        assert_eq!(output.started()[1].1, 3.0);
        assert_eq!(queue.cursor(), 3.5);
    }

    #[test]
    fn test_cursor_never_decreases_between_schedules() {
        let output = ManualOutput::default();
        let mut queue = PlaybackQueue::new(Box::new(output.clone()));

        let mut previous = queue.cursor();
        for (i, seconds) in [0.2, 0.05, 0.4, 0.1, 0.3].iter().enumerate() {
            output.set_time(i as f64 * 0.15);
            queue.schedule(&chunk(*seconds)).unwrap();
            assert!(queue.cursor() >= previous);
            previous = queue.cursor();
        }
    }

    #[test]
    fn test_interrupt_stops_everything_and_resets_cursor() {
        let output = ManualOutput::default();
        let mut queue = PlaybackQueue::new(Box::new(output.clone()));

        for _ in 0..3 {
            queue.schedule(&chunk(1.0)).unwrap();
        }
        assert_eq!(queue.active_sources(), 3);
        assert_eq!(queue.cursor(), 3.0);

        queue.interrupt();
        assert_eq!(queue.active_sources(), 0);
        assert_eq!(queue.cursor(), 0.0);
        assert_eq!(output.playing(), 0);

        output.set_time(0.4);
        queue.schedule(&chunk(0.5)).unwrap();
        assert_eq!(output.started().last().unwrap().1, 0.4);
    }

    #[test]
    fn test_finished_sources_are_reaped() {
        let output = ManualOutput::default();
        let mut queue = PlaybackQueue::new(Box::new(output.clone()));

        queue.schedule(&chunk(0.5)).unwrap();
        queue.schedule(&chunk(0.5)).unwrap();
        output.set_time(0.75);
        queue.reap();
        assert_eq!(queue.active_sources(), 1);

        output.set_time(2.0);
        queue.reap();
        assert_eq!(queue.active_sources(), 0);
    }

    #[test]
    fn test_silent_output_finishes_sources() {
        let mut output = SilentOutput::new();
        output.start_source(1, vec![0.0; 10], 24_000, 0.0).unwrap();
        output
            .start_source(2, vec![0.0; 10], 24_000, 3_600.0)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(output.drain_finished(), vec![1]);
        output.stop_source(2);
        assert!(output.drain_finished().is_empty());
    }
}
