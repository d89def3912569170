//! Voice I/O
//!
//! Audio capture, the speech decoder interface and speech synthesis. The
//! decoder and wake-word detector are external; audio and wake triggers reach
//! the engine as events.

mod capture;
mod decoder;
mod speech;

pub use capture::{AudioCapture, CHUNK_SAMPLES, SAMPLE_RATE, samples_to_wav, to_i16};
pub use decoder::{Decoder, Hypothesis};
pub use speech::{ProcessSpeaker, SilentSpeaker, Speaker};
