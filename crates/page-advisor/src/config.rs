use crate::error::AppError;

/// Bounds applied while gathering the local source corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorpusLimits {
    /// Maximum directory depth below the corpus root.
    pub max_depth: usize,
    /// Maximum total bytes of file content kept in the corpus.
    pub max_bytes: u64,
}

impl Default for CorpusLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Application configuration loaded explicitly from environment variables.
///
/// Everything has a default; the completion backend is configured separately through
/// `OpenAiClientConfig::from_env`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Browser executable started in headless mode for the audit.
    pub chrome_path: String,
    /// Audit engine executable.
    pub lighthouse_path: String,
    pub corpus: CorpusLimits,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `CHROME_PATH`: browser executable (default `google-chrome`)
    /// - `LIGHTHOUSE_PATH`: audit engine executable (default `lighthouse`)
    /// - `CORPUS_MAX_DEPTH`: directory depth bound for the local corpus (default 32)
    /// - `CORPUS_MAX_BYTES`: byte budget for the local corpus (default 8 MiB)
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = CorpusLimits::default();
        let max_depth = parse_var("CORPUS_MAX_DEPTH")?.unwrap_or(defaults.max_depth);
        let max_bytes = parse_var("CORPUS_MAX_BYTES")?.unwrap_or(defaults.max_bytes);

        Ok(Self {
            chrome_path: std::env::var("CHROME_PATH")
                .unwrap_or_else(|_| "google-chrome".to_string()),
            lighthouse_path: std::env::var("LIGHTHOUSE_PATH")
                .unwrap_or_else(|_| "lighthouse".to_string()),
            corpus: CorpusLimits {
                max_depth,
                max_bytes,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, AppError> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            AppError::Config(format!("{name} must be a non-negative integer, got {raw:?}"))
        }),
        Err(_) => Ok(None),
    }
}
