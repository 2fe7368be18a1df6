use clap::Parser;

#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
/// A config
pub struct Config {
    #[clap(long = "node-name", value_name = "VALUE")]
    /// Node name
    pub node_name: String,
    #[clap(
        long = "resize-resource",
        value_name = "VALUE",
        default_value = "storage"
    )]
    /// Resource name tracked in the claim's resize-status map
    pub resize_resource: String,
    #[clap(long = "conflict-retries", value_name = "VALUE", default_value = "3")]
    /// Conditional-write attempts per persisted transition before giving up
    pub conflict_retries: usize,
    #[clap(long = "driver-timeout-sec", value_name = "VALUE", default_value = "30")]
    /// Seconds allowed for one driver node-expand call
    pub driver_timeout_sec: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::inner::InnerConfig;

    #[test]
    fn test_default_config() {
        // Set the args
        let args = vec!["volume-expander", "--node-name", "node1"];
        let config = Config::parse_from(args);
        assert_eq!(config.node_name, "node1");

        // Following are the default values
        assert_eq!(config.resize_resource, "storage");
        assert_eq!(config.conflict_retries, 3);
        assert_eq!(config.driver_timeout_sec, 30);

        // Cast to InnerConfig
        let inner_config: InnerConfig = config.try_into().unwrap();
        assert_eq!(inner_config.node_name.0, "node1");
        assert_eq!(inner_config.resize_resource, "storage");
        assert_eq!(inner_config.conflict_retries, 3);
        assert_eq!(inner_config.driver_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_custom_config() {
        let args = vec![
            "volume-expander",
            "--node-name",
            "node2",
            "--resize-resource",
            "storage",
            "--conflict-retries",
            "5",
            "--driver-timeout-sec",
            "10",
        ];
        let inner_config: InnerConfig = Config::parse_from(args).try_into().unwrap();
        assert_eq!(inner_config.node_name.0, "node2");
        assert_eq!(inner_config.conflict_retries, 5);
        assert_eq!(inner_config.driver_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_driver_timeout_is_rejected() {
        let args = vec![
            "volume-expander",
            "--node-name",
            "node1",
            "--driver-timeout-sec",
            "0",
        ];
        let result: Result<InnerConfig, _> = Config::parse_from(args).try_into();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_node_name_is_rejected() {
        let args = vec!["volume-expander", "--node-name", ""];
        let result: Result<InnerConfig, _> = Config::parse_from(args).try_into();
        assert!(result.is_err());
    }
}
