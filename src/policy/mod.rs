//! Deployment freeze policy gate

pub mod config;
pub mod freeze;

pub use config::{
    ConfigError, EntityFilter, FreezeConfig, FreezeEntityType, FreezeRule, FreezeWindowConfig,
    RuleCombination,
};
pub use freeze::{
    ActiveFreezeWindow, FreezeDecision, FreezeEvaluator, FreezeOutcome, FreezeScope,
    FREEZE_OUTCOME_NAME,
};
