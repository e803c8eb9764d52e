use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub mod audio;
pub mod message;

pub use audio::{decode_pcm16, encode_pcm16, playback_duration, AudioError, AudioFrame};
pub use message::{parse_server_message, LiveServerMessage};

pub const DEFAULT_VOICE_NAME: &str = "Puck";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceLinkOptions {
    pub system_instruction: String,
    pub voice_name: String,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeakerRole {
    User,
    Model,
}

/// One entry of the ordered incoming stream. Audio fragments carry
/// base64 PCM16 at the output sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Audio(AudioFrame),
    Transcript { role: SpeakerRole, text: String },
    Interrupted,
    Closed,
}

#[async_trait]
pub trait VoiceChannel: Send + Sync {
    async fn send_audio(&self, frame: AudioFrame) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
    fn subscribe_events(&self) -> broadcast::Receiver<VoiceEvent>;
}

#[async_trait]
pub trait VoiceChannelConnector: Send + Sync {
    async fn connect(&self, options: VoiceLinkOptions) -> anyhow::Result<Arc<dyn VoiceChannel>>;
}
