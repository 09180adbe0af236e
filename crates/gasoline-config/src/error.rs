use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Config file not found. Looked in:\n\
        - the --config argument\n\
        - the GAS_CONFIG_PATH environment variable\n\
        - ./gas.config.json\n\
        - ~/.config/gasoline/gas.config.json"
    )]
    ConfigFileNotFound,

    #[error("Config file {path} does not exist")]
    ExplicitPathNotFound { path: PathBuf },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
