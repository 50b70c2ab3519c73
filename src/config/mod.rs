// Configuration management module
// Loads the JSON service configuration and the provider credential

pub mod settings;

pub use settings::{
    API_KEY_ENV, BASE_URL_ENV, CONFIG_PATH_ENV, Config, ConfigError, LlmConfig, LoaderTimeout,
    OpenAiSettings, RetrieverConfig, ServerConfig, api_key_from_env, load_env_file,
    load_env_file_from,
};
