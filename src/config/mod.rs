mod settings;

pub use settings::{
    ApiConfig, JwtConfig, LoggingConfig, OtelConfig, ServerConfig, Settings, StreamConfig,
};
