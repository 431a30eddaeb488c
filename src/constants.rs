//! Centralized constants for kite.
//!
//! All magic numbers, default strings, and configuration constants live here
//! so they can be changed in one place.

/// Application name used in CLI output and directory paths.
pub const APP_NAME: &str = "kite";

/// Default LLM model identifier.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-6";

/// Maximum tokens for LLM completions.
pub const MAX_TOKENS: u64 = 4096;

/// Default system prompt prepended to every request.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are kite, a helpful assistant in the terminal. \
Be concise. Call the declared tools when they help answer the request.";

/// Configuration filename.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Per-project configuration filename.
pub const PROJECT_CONFIG_FILENAME: &str = "kite.toml";

/// Default LLM model identifier for OpenAI.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1";

/// Default LLM model identifier for OpenRouter.
pub const DEFAULT_OPENROUTER_MODEL: &str = "arcee-ai/trinity-large-preview:free";

/// Default base URL for local Ollama server.
pub const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default LLM model identifier for Ollama.
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3";

// --- Provider defaults ---

/// Default provider when none is configured.
pub const DEFAULT_PROVIDER: &str = "anthropic";

// --- Generation defaults ---

/// Default: one pass only. Feeding tool results back is opt-in.
pub const RECURSION_DEFAULT: bool = false;

/// Default number of identical calls allowed before the loop guard trips.
pub const MAX_REPEAT_CALLS_DEFAULT: usize = 5;

/// Default deadline for a single generation pass, in seconds.
pub const PASS_DEADLINE_DEFAULT_SECS: u64 = 300;

/// Finish reason that ends a pass successfully.
pub const FINISH_REASON_STOP: &str = "stop";

// --- Tool limits ---

/// Default timeout for local executable tools, in seconds.
pub const TOOL_DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Maximum bytes of tool stdout fed back to the model.
pub const TOOL_MAX_OUTPUT_SIZE: usize = 100 * 1024;

/// Environment variables removed before spawning a local tool.
pub const TOOL_STRIPPED_ENV_VARS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "OPENROUTER_API_KEY",
];

/// Maximum characters of tool arguments shown in a confirmation prompt.
pub const PROMPT_ARGS_DISPLAY_LIMIT: usize = 200;

// --- Remote tools ---

/// Protocol version announced during the remote tool handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Timeout for a single remote tool request, in seconds.
pub const MCP_REQUEST_TIMEOUT_SECS: u64 = 120;

// --- Media ---

/// Sample rate assumed for raw PCM audio without a `rate` parameter.
pub const PCM_DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Channel count assumed for raw PCM audio without a `channels` parameter.
pub const PCM_DEFAULT_CHANNELS: u16 = 1;

/// Bit depth of raw PCM (`audio/L16`) payloads.
pub const PCM_BITS_PER_SAMPLE: u16 = 16;

// --- Exit codes ---

/// Exit code for every fatal pass error except an exceeded deadline.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for an exceeded pass deadline (matches `timeout(1)`).
pub const EXIT_DEADLINE: i32 = 124;

/// Exit code when the run is interrupted with Ctrl+C.
pub const EXIT_INTERRUPTED: i32 = 130;

// --- Attachments ---

/// Bytes inspected for NUL bytes when deciding whether a file is binary.
pub const BINARY_DETECTION_BYTES: usize = 8192;

/// Largest file accepted by `--file`.
pub const ATTACHMENT_MAX_SIZE: u64 = 20 * 1024 * 1024;
