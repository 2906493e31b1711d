//! 配置管理模块
//!
//! 提供 YAML 配置文件加载、环境变量覆盖和配置校验

mod path_utils;
mod types;
mod yaml;

pub use path_utils::{collapse_tilde, expand_tilde};
pub use types::{
    BackendConfig, Config, LoggingConfig, RetrySettings, ServerConfig, StreamingSettings,
};
pub use yaml::{
    apply_env_overrides, load_config, load_effective_config, parse_config, resolve_config_path,
    ConfigError, BACKEND_URL_ENV, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, HOST_ENV, PORT_ENV,
};

#[cfg(test)]
mod tests;
