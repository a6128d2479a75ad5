use crate::audio::Voice;
use crate::mode::CaptureMode;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly AI Assistant.";
pub const DEFAULT_LANGUAGE: &str = "english";
pub const DEFAULT_MODEL_ID: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_TEMPERATURE: f32 = 0.6;

/// The options chosen by the user, sent once as the first frame of a session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// System instructions prepended to every model turn.
    system_prompt: String,

    /// Prebuilt voice the model answers with.
    voice: Voice,

    /// Conversation language, e.g. "english".
    language: String,

    function_calling: bool,
    auto_function_response: bool,
    code_execution: bool,
    google_search: bool,
    tool_usage: bool,

    /// Whether the user may barge in while the model is speaking.
    allow_interruptions: bool,

    /// Sampling temperature for the model.
    temperature: f32,

    /// Model identifier, without the "models/" prefix.
    model_id: String,

    structured_output: StructuredOutput,

    /// Capture mode active when the session was opened, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_mode: Option<CaptureMode>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            voice: Voice::default(),
            language: DEFAULT_LANGUAGE.to_string(),
            function_calling: true,
            auto_function_response: true,
            code_execution: false,
            google_search: true,
            tool_usage: true,
            allow_interruptions: false,
            temperature: DEFAULT_TEMPERATURE,
            model_id: DEFAULT_MODEL_ID.to_string(),
            structured_output: StructuredOutput::default(),
            current_mode: None,
        }
    }

    pub fn builder() -> SessionConfigurator {
        SessionConfigurator::new()
    }

    /// A snapshot of this config stamped with the capture mode in effect.
    pub fn snapshot(&self, mode: Option<CaptureMode>) -> Self {
        Self {
            current_mode: mode,
            ..self.clone()
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn structured_output(&self) -> &StructuredOutput {
        &self.structured_output
    }

    pub fn current_mode(&self) -> Option<CaptureMode> {
        self.current_mode
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StructuredOutput {
    pub enabled: bool,
    /// Response format, "json" unless overridden.
    pub format: String,
    /// JSON schema text; empty when no schema is enforced.
    pub schema: String,
    pub strict: bool,
}

impl Default for StructuredOutput {
    fn default() -> Self {
        Self {
            enabled: false,
            format: "json".to_string(),
            schema: String::new(),
            strict: true,
        }
    }
}

pub struct SessionConfigurator {
    config: SessionConfig,
}

impl SessionConfigurator {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.config.system_prompt = prompt.to_string();
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.config.voice = voice;
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.config.language = language.to_string();
        self
    }

    pub fn with_function_calling(mut self, enabled: bool) -> Self {
        self.config.function_calling = enabled;
        self
    }

    pub fn with_auto_function_response(mut self, enabled: bool) -> Self {
        self.config.auto_function_response = enabled;
        self
    }

    pub fn with_code_execution(mut self, enabled: bool) -> Self {
        self.config.code_execution = enabled;
        self
    }

    pub fn with_google_search(mut self, enabled: bool) -> Self {
        self.config.google_search = enabled;
        self
    }

    pub fn with_tool_usage(mut self, enabled: bool) -> Self {
        self.config.tool_usage = enabled;
        self
    }

    pub fn with_allow_interruptions(mut self, enabled: bool) -> Self {
        self.config.allow_interruptions = enabled;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn with_model_id(mut self, model_id: &str) -> Self {
        self.config.model_id = model_id.to_string();
        self
    }

    pub fn with_structured_output(mut self, structured_output: StructuredOutput) -> Self {
        self.config.structured_output = structured_output;
        self
    }

    pub fn with_current_mode(mut self, mode: CaptureMode) -> Self {
        self.config.current_mode = Some(mode);
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

impl Default for SessionConfigurator {
    fn default() -> Self {
        Self::new()
    }
}
