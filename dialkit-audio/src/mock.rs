//! Recording backend for tests: every sink operation is journaled and the
//! effective sink state stays observable after the player takes ownership.

use crate::Cue;
use crate::error::AudioError;
use crate::sink::{AudioBackend, CueSink};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub enum SinkOp {
    Play,
    Pause,
    Rewind,
    SetVolume(f32),
    SetLooping(bool),
}

#[derive(Default)]
struct SinkState {
    playing: AtomicBool,
    looping: AtomicBool,
    volume: Mutex<f32>,
    plays: AtomicUsize,
    ops: Mutex<Vec<SinkOp>>,
}

pub struct MockSink {
    state: Arc<SinkState>,
    reject_play: Arc<AtomicBool>,
}

impl CueSink for MockSink {
    fn play(&self) -> Result<(), AudioError> {
        if self.reject_play.load(Ordering::SeqCst) {
            return Err(AudioError::PlaybackRejected(
                "autoplay blocked".to_string(),
            ));
        }
        self.state.playing.store(true, Ordering::SeqCst);
        self.state.plays.fetch_add(1, Ordering::SeqCst);
        self.state.ops.lock().push(SinkOp::Play);
        Ok(())
    }

    fn pause(&self) {
        self.state.playing.store(false, Ordering::SeqCst);
        self.state.ops.lock().push(SinkOp::Pause);
    }

    fn rewind(&self) {
        self.state.ops.lock().push(SinkOp::Rewind);
    }

    fn set_volume(&self, volume: f32) {
        *self.state.volume.lock() = volume;
        self.state.ops.lock().push(SinkOp::SetVolume(volume));
    }

    fn set_looping(&self, looping: bool) {
        self.state.looping.store(looping, Ordering::SeqCst);
        self.state.ops.lock().push(SinkOp::SetLooping(looping));
    }
}

#[derive(Default)]
struct MockBackendInner {
    states: Mutex<HashMap<Cue, Arc<SinkState>>>,
    reject_play: Arc<AtomicBool>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<MockBackendInner>,
}

impl MockBackend {
    pub fn is_playing(&self, cue: Cue) -> bool {
        self.state(cue).playing.load(Ordering::SeqCst)
    }

    pub fn is_looping(&self, cue: Cue) -> bool {
        self.state(cue).looping.load(Ordering::SeqCst)
    }

    pub fn volume(&self, cue: Cue) -> f32 {
        *self.state(cue).volume.lock()
    }

    /// Number of successful `play()` calls on the cue's sink.
    pub fn play_count(&self, cue: Cue) -> usize {
        self.state(cue).plays.load(Ordering::SeqCst)
    }

    pub fn ops(&self, cue: Cue) -> Vec<SinkOp> {
        self.state(cue).ops.lock().clone()
    }

    /// Simulates the platform autoplay policy refusing playback.
    pub fn reject_playback(&self, reject: bool) {
        self.inner.reject_play.store(reject, Ordering::SeqCst);
    }

    fn state(&self, cue: Cue) -> Arc<SinkState> {
        self.inner
            .states
            .lock()
            .entry(cue)
            .or_default()
            .clone()
    }
}

impl AudioBackend for MockBackend {
    type Sink = MockSink;

    fn open(&self, cue: Cue) -> Result<MockSink, AudioError> {
        Ok(MockSink {
            state: self.state(cue),
            reject_play: self.inner.reject_play.clone(),
        })
    }
}
