use std::time::Duration;

use crate::claim::NodeId;
use crate::common::error::ExpandError;
use crate::config::config::Config as SuperConfig;

/// Inner config struct
/// This struct is used to store the parsed config
/// and will be used to wire the expansion coordinator
#[derive(Clone, Debug)]
pub struct InnerConfig {
    /// Identity of the node this agent runs on
    pub node_name: NodeId,
    /// Resource name tracked in the claim's resize-status map
    pub resize_resource: String,
    /// Conditional-write attempts per persisted transition before giving up
    pub conflict_retries: usize,
    /// Bound on one driver node-expand call
    pub driver_timeout: Duration,
}

impl TryFrom<SuperConfig> for InnerConfig {
    type Error = ExpandError;

    #[inline]
    fn try_from(value: SuperConfig) -> Result<Self, Self::Error> {
        if value.node_name.is_empty() {
            return Err(ExpandError::ArgumentInvalid {
                context: vec!["node name is empty".to_owned()],
            });
        }
        if value.resize_resource.is_empty() {
            return Err(ExpandError::ArgumentInvalid {
                context: vec!["resize resource name is empty".to_owned()],
            });
        }
        if value.driver_timeout_sec == 0 {
            return Err(ExpandError::ArgumentInvalid {
                context: vec![format!(
                    "driver timeout {} is invalid, must be at least 1 second",
                    value.driver_timeout_sec
                )],
            });
        }
        Ok(InnerConfig {
            node_name: NodeId::from(value.node_name),
            resize_resource: value.resize_resource,
            conflict_retries: value.conflict_retries,
            driver_timeout: Duration::from_secs(value.driver_timeout_sec),
        })
    }
}
