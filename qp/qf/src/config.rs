//! Framework sizing and configuration.

use alloc::vec::Vec;

use qp_core::{q_require, MAX_ACTIVE_LIMIT, MAX_EPOOL_LIMIT, MAX_TICK_RATE_LIMIT};

/// Sizing of one framework instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QfConfig {
    pub name: &'static str,
    /// Highest usable active-object priority
    pub max_active: u8,
    /// One past the highest signal that can be published; 0 disables publish-subscribe
    pub max_pub_signal: u16,
    /// Number of independent clock tick rates
    pub max_tick_rate: u8,
    /// Maximum number of event pools
    pub max_epool: u8,
    /// Capacity of the time-event arena
    pub max_time_evts: u16,
    /// Event pools as `(n_blocks, block_size)`, in ascending block size
    pub event_pools: Vec<(u16, usize)>,
}

impl Default for QfConfig {
    fn default() -> Self {
        Self {
            name: "QP",
            max_active: 32,
            max_pub_signal: 0,
            max_tick_rate: 1,
            max_epool: 3,
            max_time_evts: 32,
            event_pools: Vec::new(),
        }
    }
}

impl QfConfig {
    /// Creates a new framework configuration builder.
    pub fn builder() -> QfConfigBuilder {
        QfConfigBuilder::default()
    }

    pub(crate) fn validate(&self) {
        q_require!(
            self.max_active > 0 && self.max_active <= MAX_ACTIVE_LIMIT,
            "max_active {} outside 1..={}",
            self.max_active,
            MAX_ACTIVE_LIMIT
        );
        q_require!(
            self.max_tick_rate > 0 && self.max_tick_rate <= MAX_TICK_RATE_LIMIT,
            "max_tick_rate {} outside 1..={}",
            self.max_tick_rate,
            MAX_TICK_RATE_LIMIT
        );
        q_require!(
            self.max_epool > 0 && self.max_epool <= MAX_EPOOL_LIMIT,
            "max_epool {} outside 1..={}",
            self.max_epool,
            MAX_EPOOL_LIMIT
        );
    }
}

/// Builder for ergonomic framework configuration construction.
#[derive(Debug, Clone, Default)]
pub struct QfConfigBuilder {
    config: QfConfig,
}

impl QfConfigBuilder {
    /// Sets the application name.
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the highest usable active-object priority.
    pub fn max_active(mut self, max: u8) -> Self {
        self.config.max_active = max;
        self
    }

    /// Enables publish-subscribe for signals below `max`.
    pub fn max_pub_signal(mut self, max: u16) -> Self {
        self.config.max_pub_signal = max;
        self
    }

    /// Sets the number of clock tick rates.
    pub fn max_tick_rate(mut self, max: u8) -> Self {
        self.config.max_tick_rate = max;
        self
    }

    /// Sets the maximum number of event pools.
    pub fn max_epool(mut self, max: u8) -> Self {
        self.config.max_epool = max;
        self
    }

    /// Sets the capacity of the time-event arena.
    pub fn max_time_evts(mut self, max: u16) -> Self {
        self.config.max_time_evts = max;
        self
    }

    /// Adds the next event pool. Block sizes must ascend.
    pub fn event_pool(mut self, n_blocks: u16, block_size: usize) -> Self {
        self.config.event_pools.push((n_blocks, block_size));
        self
    }

    /// Builds the framework configuration.
    pub fn build(self) -> QfConfig {
        self.config
    }
}
