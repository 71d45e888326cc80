use crate::Cue;
use crate::error::AudioError;
use crate::sink::{AudioBackend, CueSink};
use std::collections::HashMap;

/// Base volume per cue, scaled by the relative volume passed to
/// [`CuePlayer::play_scaled`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueVolumes {
    pub ringback: f32,
    pub ringing: f32,
    pub answered: f32,
    pub rejected: f32,
    pub moh: f32,
}

impl Default for CueVolumes {
    fn default() -> Self {
        Self {
            ringback: 0.8,
            ringing: 1.0,
            answered: 1.0,
            rejected: 1.0,
            moh: 0.6,
        }
    }
}

impl CueVolumes {
    pub fn volume(&self, cue: Cue) -> f32 {
        match cue {
            Cue::Ringback => self.ringback,
            Cue::Ringing => self.ringing,
            Cue::Answered => self.answered,
            Cue::Rejected => self.rejected,
            Cue::Moh => self.moh,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CuePlayerConfig {
    pub volumes: CueVolumes,
    /// Play every cue once at volume zero during construction. Some mobile
    /// platforms only unlock playback for elements that have already been
    /// started from a user gesture.
    pub silent_prewarm: bool,
}

/// Owns one pre-allocated sink per cue so playback starts without an
/// allocation in the signaling path. Playback failures are logged, never
/// propagated.
pub struct CuePlayer<B: AudioBackend> {
    sinks: HashMap<Cue, B::Sink>,
    volumes: CueVolumes,
}

impl<B: AudioBackend> CuePlayer<B> {
    pub fn new(backend: &B, config: CuePlayerConfig) -> Result<Self, AudioError> {
        let mut sinks = HashMap::with_capacity(Cue::ALL.len());
        for cue in Cue::ALL {
            sinks.insert(cue, backend.open(cue)?);
        }

        let player = Self {
            sinks,
            volumes: config.volumes,
        };
        if config.silent_prewarm {
            player.prewarm();
        }
        Ok(player)
    }

    pub fn play(&self, cue: Cue) {
        self.play_scaled(cue, 1.0);
    }

    /// Restarts the cue from the beginning at `base volume * relative_volume`
    /// with the cue's static loop flag.
    pub fn play_scaled(&self, cue: Cue, relative_volume: f32) {
        tracing::trace!(?cue, volume = f64::from(relative_volume), "Starting cue");
        let sink = &self.sinks[&cue];
        sink.pause();
        sink.rewind();
        sink.set_volume(self.volumes.volume(cue) * relative_volume);
        sink.set_looping(cue.loops());
        if let Err(err) = sink.play() {
            tracing::warn!(?cue, ?err, "Cue playback rejected");
        }
    }

    /// Idempotent: pausing an already-stopped cue is a no-op on the sink.
    pub fn stop(&self, cue: Cue) {
        tracing::trace!(?cue, "Stopping cue");
        let sink = &self.sinks[&cue];
        sink.pause();
        sink.rewind();
    }

    /// Stops every cue. Called on call termination so no looping cue can
    /// survive past the call's end.
    pub fn stop_all(&self) {
        tracing::trace!("Stopping all cues");
        for cue in Cue::ALL {
            self.stop(cue);
        }
    }

    fn prewarm(&self) {
        tracing::debug!("Pre-warming cue sinks");
        for cue in Cue::ALL {
            let sink = &self.sinks[&cue];
            sink.set_looping(false);
            sink.set_volume(0.0);
            if let Err(err) = sink.play() {
                tracing::debug!(?cue, ?err, "Cue pre-warm rejected");
            }
            sink.pause();
            sink.rewind();
        }
    }
}
