#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    config_frames: u64,
    audio_frames: u64,
    image_frames: u64,
    text_frames: u64,
    messages_received: u64,
    sessions: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sent(&mut self, kind: &str) {
        match kind {
            "config" => self.config_frames += 1,
            "audio" => self.audio_frames += 1,
            "image" => self.image_frames += 1,
            "text" => self.text_frames += 1,
            _ => {}
        }
    }

    pub(crate) fn record_received(&mut self) {
        self.messages_received += 1;
    }

    pub(crate) fn record_session(&mut self) {
        self.sessions += 1;
    }

    pub fn config_frames(&self) -> u64 {
        self.config_frames
    }

    pub fn audio_frames(&self) -> u64 {
        self.audio_frames
    }

    pub fn image_frames(&self) -> u64 {
        self.image_frames
    }

    pub fn text_frames(&self) -> u64 {
        self.text_frames
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Number of sessions successfully opened.
    pub fn sessions(&self) -> u64 {
        self.sessions
    }
}
