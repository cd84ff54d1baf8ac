/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Parameters a node is started with.

use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use typed_builder::TypedBuilder;

use crate::{
    chain_manager::types::ChainManagerConfiguration,
    consensus::types::ConsensusConfiguration,
    mempool::dist_sync::DistSyncConfiguration,
    node::DriverConfiguration,
    state_manager::StateManagerConfiguration,
    types::data_types::{ChainID, NodeID},
};

/// Stores the user-defined parameters required to start a [chain node](crate::node::ChainNode).
///
/// ## Chain ID
///
/// Every chain is identified by a [chain ID](ChainID), which is mixed into the transactions
/// committees sign, so that a signature for one chain can never be used on another.
///
/// ## Pipelining
///
/// A committee does not wait for L1 to confirm the transaction of one log index before working on the
/// next. [`pipelining_limit`](Configuration::pipelining_limit) bounds how many unconfirmed anchor
/// outputs it builds on.
///
/// ## Log Events
///
/// The node logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.chain_id(...)`

    Optional:
    - `.server_nodes(...)`
    - `.access_nodes(...)`
    - `.pipelining_limit(...)`
    - `.redelivery_period(...)`
    - `.consensus_recovery_timeout(...)`
    - `.nodes_to_query(...)`
    - `.get_block_retry(...)`
    - `.request_cleaning_period(...)`
    - `.cache_cleaning_period(...)`
    - `.blocks_in_cache_duration(...)`
    - `.block_cache_max_size(...)`
    - `.dist_sync_max_msgs_per_tick(...)`
    - `.timer_tick_period(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the node's identity. Required."))]
    pub me: VerifyingKey,
    #[builder(setter(doc = "Set the chain ID of the chain. Required."))]
    pub chain_id: ChainID,
    #[builder(default, setter(doc = "Set the nodes this node may query for blocks and requests. Committee nodes are always included. Optional."))]
    pub server_nodes: Vec<NodeID>,
    #[builder(default, setter(doc = "Set the nodes that may query this node. Committee nodes are always included. Optional."))]
    pub access_nodes: Vec<NodeID>,
    #[builder(default = 3, setter(doc = "Set how many unconfirmed anchor outputs a committee may build on. Defaults to 3."))]
    pub pipelining_limit: usize,
    #[builder(default = Duration::from_secs(2), setter(doc = "Set how long an unacknowledged consensus message waits before being sent again. Defaults to 2 seconds."))]
    pub redelivery_period: Duration,
    #[builder(default = Duration::from_secs(20), setter(doc = "Set how long a consensus session may make no progress before it is restarted. Defaults to 20 seconds."))]
    pub consensus_recovery_timeout: Duration,
    #[builder(default = 5, setter(doc = "Set how many random peers a missing block is requested from. Defaults to 5."))]
    pub nodes_to_query: usize,
    #[builder(default = Duration::from_secs(3), setter(doc = "Set how long to wait for a missing block before requesting it again. Defaults to 3 seconds."))]
    pub get_block_retry: Duration,
    #[builder(default = Duration::from_secs(1), setter(doc = "Set how often block requests are checked for cancellation. Defaults to 1 second."))]
    pub request_cleaning_period: Duration,
    #[builder(default = Duration::from_secs(60), setter(doc = "Set how often the block cache is cleaned. Defaults to 60 seconds."))]
    pub cache_cleaning_period: Duration,
    #[builder(default = Duration::from_secs(60 * 60), setter(doc = "Set how long a block stays in the block cache. Defaults to 1 hour."))]
    pub blocks_in_cache_duration: Duration,
    #[builder(default = 1000, setter(doc = "Set the maximum number of blocks in the block cache. Defaults to 1000."))]
    pub block_cache_max_size: usize,
    #[builder(default = 100, setter(doc = "Set the maximum number of request queries sent on one timer tick. Defaults to 100."))]
    pub dist_sync_max_msgs_per_tick: usize,
    #[builder(default = Duration::from_millis(100), setter(doc = "Set the period of the driver's timer. Defaults to 100 milliseconds."))]
    pub timer_tick_period: Duration,
    #[builder(default = false, setter(doc = "Enable logging of events? Defaults to false."))]
    pub log_events: bool,
}

impl Into<(
    StateManagerConfiguration,
    DistSyncConfiguration,
    ConsensusConfiguration,
    ChainManagerConfiguration,
    DriverConfiguration,
)> for Configuration
{
    fn into(
        self,
    ) -> (
        StateManagerConfiguration,
        DistSyncConfiguration,
        ConsensusConfiguration,
        ChainManagerConfiguration,
        DriverConfiguration,
    ) {
        let state_manager_config = StateManagerConfiguration {
            nodes_to_query: self.nodes_to_query,
            get_block_retry: self.get_block_retry,
            request_cleaning_period: self.request_cleaning_period,
            cache_cleaning_period: self.cache_cleaning_period,
            blocks_in_cache_duration: self.blocks_in_cache_duration,
            block_cache_max_size: self.block_cache_max_size,
        };
        let dist_sync_config = DistSyncConfiguration {
            max_msgs_per_tick: self.dist_sync_max_msgs_per_tick,
        };
        let consensus_config = ConsensusConfiguration {
            chain_id: self.chain_id,
            redelivery_period: self.redelivery_period,
            recovery_timeout: self.consensus_recovery_timeout,
        };
        let chain_manager_config = ChainManagerConfiguration {
            pipelining_limit: self.pipelining_limit,
        };
        let driver_config = DriverConfiguration {
            me: NodeID::from(self.me),
            server_nodes: self.server_nodes,
            access_nodes: self.access_nodes,
            timer_tick_period: self.timer_tick_period,
        };
        (
            state_manager_config,
            dist_sync_config,
            consensus_config,
            chain_manager_config,
            driver_config,
        )
    }
}
