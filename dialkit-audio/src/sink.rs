use crate::Cue;
use crate::error::AudioError;

/// One playback handle for one cue, wrapping the platform's audio-element
/// primitives (play/pause/volume/loop/position).
pub trait CueSink: Send + Sync + 'static {
    fn play(&self) -> Result<(), AudioError>;
    fn pause(&self);
    /// Resets the playback position to the start.
    fn rewind(&self);
    fn set_volume(&self, volume: f32);
    fn set_looping(&self, looping: bool);
}

/// Creates sinks for named cues. Implementations bind the platform audio
/// stack; the player never allocates a sink outside construction.
pub trait AudioBackend: Send + Sync + 'static {
    type Sink: CueSink;

    fn open(&self, cue: Cue) -> Result<Self::Sink, AudioError>;
}
