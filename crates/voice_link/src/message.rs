use serde::Deserialize;

use crate::{audio::pcm_mime_type, AudioFrame, SpeakerRole, VoiceEvent};

const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerMessage {
    #[serde(default)]
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub data: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transcription {
    pub text: String,
}

impl LiveServerMessage {
    /// Flattens one server message into stream events: audio first, then the
    /// user and model transcriptions, then the interruption marker.
    pub fn into_events(self) -> Vec<VoiceEvent> {
        let Some(content) = self.server_content else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let audio = content
            .model_turn
            .and_then(|turn| turn.parts.into_iter().next())
            .and_then(|part| part.inline_data)
            .filter(|inline| !inline.data.is_empty());
        if let Some(inline) = audio {
            events.push(VoiceEvent::Audio(AudioFrame {
                data_b64: inline.data,
                mime_type: inline
                    .mime_type
                    .unwrap_or_else(|| pcm_mime_type(DEFAULT_OUTPUT_SAMPLE_RATE)),
            }));
        }

        for (role, transcription) in [
            (SpeakerRole::User, content.input_transcription),
            (SpeakerRole::Model, content.output_transcription),
        ] {
            if let Some(text) = transcription.map(|t| t.text).filter(|t| !t.is_empty()) {
                events.push(VoiceEvent::Transcript { role, text });
            }
        }

        if content.interrupted {
            events.push(VoiceEvent::Interrupted);
        }
        events
    }
}

pub fn parse_server_message(raw: &str) -> serde_json::Result<Vec<VoiceEvent>> {
    let message: LiveServerMessage = serde_json::from_str(raw)?;
    Ok(message.into_events())
}

#[cfg(test)]
#[path = "tests/message_tests.rs"]
mod tests;
