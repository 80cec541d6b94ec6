//! # Provider Defaults
//!
//! A small convenience lookup, kept from the teacher almost verbatim: given a
//! well-known provider, resolve its default base URL and a reasonable
//! default model. A host building `AgentOptions` is never required to use
//! this — `runtime_url` always takes precedence — but it saves the common
//! case of "point this at OpenAI/Anthropic with their usual defaults."

/// A well-known LLM provider, or a custom one identified by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Azure,
    Custom(String),
}

impl Provider {
    /// The provider's default API base URL. Empty for `Custom` — the caller
    /// is expected to supply `runtime_url` directly in that case.
    pub fn get_base_url(&self) -> &str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::Azure => "https://management.azure.com",
            Provider::Custom(_) => "",
        }
    }

    /// A reasonable default model for the provider. Always overridable via
    /// `AgentOptionsBuilder::model`.
    pub fn get_model(&self) -> &str {
        match self {
            Provider::OpenAi => "gpt-4o",
            Provider::Anthropic => "claude-3-5-sonnet-latest",
            Provider::Azure => "gpt-4o",
            Provider::Custom(_) => "",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::Azure => write!(f, "azure"),
            Provider::Custom(name) => write!(f, "{name}"),
        }
    }
}
