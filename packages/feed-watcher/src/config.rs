use std::time::Duration;

/// Configuration for the renderer session.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Command that starts the rendering sidecar (a browserless-style
    /// service wrapping headless Chromium).
    pub command: String,
    pub args: Vec<String>,
    /// Loopback port the sidecar listens on.
    pub port: u16,
    /// URL of the watched listing page.
    pub source_url: String,
    /// How long to wait for the sidecar to accept connections after spawn.
    pub startup_timeout: Duration,
    /// Navigation budget. Parse-complete, not full page load: unrelated
    /// subresources must not block extraction.
    pub navigation_timeout: Duration,
    /// How long to wait for the card markup before extracting whatever the
    /// page produced.
    pub selector_timeout: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: "browserless".to_string(),
            args: Vec::new(),
            port: 3030,
            source_url: "https://fanding.kr/@stellive/section/3498/".to_string(),
            startup_timeout: Duration::from_secs(20),
            navigation_timeout: Duration::from_secs(30),
            selector_timeout: Duration::from_secs(10),
        }
    }
}

impl RendererConfig {
    pub fn with_command(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        self.command = command.into();
        self.args = args;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }
}
