/// Fallback when `PIXSEEK_API_BASE_URL` is unset or blank.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

const BASE_URL_ENV: &str = "PIXSEEK_API_BASE_URL";
const USE_MOCK_ENV: &str = "PIXSEEK_USE_MOCK";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub use_mock_backend: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let use_mock_backend = std::env::var(USE_MOCK_ENV)
            .map(|value| {
                let value = value.trim();
                value == "1" || value.eq_ignore_ascii_case("true")
            })
            .unwrap_or(false);
        Self {
            base_url,
            use_mock_backend,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            use_mock_backend: false,
        }
    }
}
