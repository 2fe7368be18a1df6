/// Configuration module. This module is used to parse configuration from command line arguments
mod config;
/// Inner configuration module. This module is used to store the parsed configuration
/// and will be used to wire the expansion coordinator
mod inner;

pub use config::Config;
pub use inner::InnerConfig;
