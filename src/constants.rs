/// User agent string for HTTP requests
pub const USER_AGENT: &str = concat!("geoglows-mcp/", env!("CARGO_PKG_VERSION"));

/// GEOGLOWS hydrology API base URL
pub const GEOGLOWS_API_BASE: &str = "https://geoglows.ecmwf.int/api/v2";

/// Upstream request timeout used when none is configured
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// OpenAI-compatible chat completions base URL for the decision step
pub const DEFAULT_LLM_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

pub const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash";

/// Artifact name for rendered charts
pub const DEFAULT_PLOT_FILE: &str = "geoglows_plot.png";

/// Chart dimensions in pixels
pub const PLOT_WIDTH: u32 = 1024;
pub const PLOT_HEIGHT: u32 = 576;
