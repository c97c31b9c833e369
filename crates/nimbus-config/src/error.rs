use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Settings file not found. Looked in:\n\
        - NIMBUS_CONFIG_PATH\n\
        - ./nimbus.yaml\n\
        - ./.nimbus/nimbus.yaml\n\
        - ~/.config/nimbus/nimbus.yaml"
    )]
    SettingsFileNotFound,

    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("No providers configured")]
    NoProviders,

    #[error("Provider '{0}' is listed more than once")]
    DuplicateProvider(String),

    #[error("Provider '{0}' is listed but has no provider.{0} section")]
    MissingProviderSection(String),

    #[error("Provider '{provider}' is missing required setting '{field}'")]
    MissingField {
        provider: String,
        field: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
