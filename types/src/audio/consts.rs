use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Sample rate of captured microphone audio on the wire.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio chunks streamed back by the model.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Number of mono samples in one captured chunk.
pub const CAPTURE_BUFFER_SIZE: usize = 512;

/// Interval between two captured video frames.
pub const FRAME_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Voice {
    Aoede,
    Puck,
    Ember,
    Cael,
    Custom(String),
}

impl Voice {
    pub fn as_str(&self) -> &str {
        match self {
            Voice::Aoede => "Aoede",
            Voice::Puck => "Puck",
            Voice::Ember => "Ember",
            Voice::Cael => "Cael",
            Voice::Custom(s) => s,
        }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Voice::Aoede
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Voice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Aoede" => Voice::Aoede,
            "Puck" => Voice::Puck,
            "Ember" => Voice::Ember,
            "Cael" => Voice::Cael,
            _ => Voice::Custom(s.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for Voice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Voice::from_str(&s).unwrap_or_else(|never| match never {}))
    }
}

#[cfg(test)]
mod tests {
    use super::Voice;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct VoiceHolder {
        #[serde(skip_serializing_if = "Option::is_none")]
        voice: Option<Voice>,
    }

    #[test]
    fn test_serialize() {
        let holder = VoiceHolder {
            voice: Some(Voice::Puck),
        };
        assert_eq!(serde_json::to_string(&holder).unwrap(), r#"{"voice":"Puck"}"#);

        let holder = VoiceHolder {
            voice: Some(Voice::Custom("Kore".to_string())),
        };
        assert_eq!(serde_json::to_string(&holder).unwrap(), r#"{"voice":"Kore"}"#);

        let holder = VoiceHolder { voice: None };
        assert_eq!(serde_json::to_string(&holder).unwrap(), "{}");
    }

    #[test]
    fn test_deserialize() {
        let holder: VoiceHolder = serde_json::from_str(r#"{"voice":"Aoede"}"#).unwrap();
        assert_eq!(holder.voice, Some(Voice::Aoede));

        let holder: VoiceHolder = serde_json::from_str(r#"{"voice":"Charon"}"#).unwrap();
        assert_eq!(holder.voice, Some(Voice::Custom("Charon".to_string())));
    }
}
