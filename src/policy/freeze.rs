//! Freeze window evaluation
//!
//! The gate runs after a step's own work succeeds and before the success is
//! committed. An actor holding the override permission bypasses every window;
//! otherwise one decision lists all windows active for the node's scope.

use super::config::{
    ConfigError, EntityFilter, FreezeConfig, FreezeEntityType, FreezeRule, FreezeWindowConfig,
    RuleCombination,
};
use crate::access::{AccessChecker, Principal, FREEZE_OVERRIDE_PERMISSION};
use crate::core::NodeContext;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Name the freeze outcome is published under when a node is blocked
pub const FREEZE_OUTCOME_NAME: &str = "freezeOutcome";

/// Entity values describing where a node executes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreezeScope {
    values: HashMap<FreezeEntityType, String>,
}

impl FreezeScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope carrying the org and project dimensions from a node context
    pub fn for_node(ctx: &NodeContext) -> Self {
        Self::new()
            .with(FreezeEntityType::Org, &ctx.org_id)
            .with(FreezeEntityType::Project, &ctx.project_id)
    }

    pub fn with(mut self, entity_type: FreezeEntityType, value: impl Into<String>) -> Self {
        self.values.insert(entity_type, value.into());
        self
    }

    pub fn get(&self, entity_type: FreezeEntityType) -> Option<&str> {
        self.values.get(&entity_type).map(|v| v.as_str())
    }
}

/// A window that was active and matching at evaluation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFreezeWindow {
    pub identifier: String,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The payload published when a node is blocked by freeze windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeOutcome {
    pub frozen: bool,
    pub active_windows: Vec<ActiveFreezeWindow>,
}

/// Result of evaluating the gate for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreezeDecision {
    /// No active window matches, or the actor holds the override permission
    Clear,
    /// At least one active window matches and the actor cannot override
    Blocked(FreezeOutcome),
}

enum Matcher {
    All,
    Named(Vec<String>),
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Matcher::All => true,
            Matcher::Named(names) => value.is_some_and(|v| names.iter().any(|n| n == v)),
            Matcher::Pattern(re) => value.is_some_and(|v| re.is_match(v)),
        }
    }
}

struct CompiledRule {
    entity_type: FreezeEntityType,
    matcher: Matcher,
}

struct CompiledWindow {
    identifier: String,
    name: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rules: Vec<CompiledRule>,
}

impl CompiledWindow {
    fn active_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }

    fn applies_to(&self, scope: &FreezeScope, combination: RuleCombination) -> bool {
        // A window with no rules freezes everything in scope
        if self.rules.is_empty() {
            return true;
        }
        let mut matches = self
            .rules
            .iter()
            .map(|rule| rule.matcher.matches(scope.get(rule.entity_type)));
        match combination {
            RuleCombination::All => matches.all(|m| m),
            RuleCombination::Any => matches.any(|m| m),
        }
    }
}

/// Evaluates freeze windows against a node's scope
pub struct FreezeEvaluator {
    windows: Vec<CompiledWindow>,
    combination: RuleCombination,
    access: Arc<dyn AccessChecker>,
}

impl FreezeEvaluator {
    /// Compile the configuration; patterns were validated at load time but
    /// compilation errors still surface here rather than panicking.
    pub fn new(config: FreezeConfig, access: Arc<dyn AccessChecker>) -> Result<Self, ConfigError> {
        let combination = config.rule_combination;
        let windows = config
            .windows
            .into_iter()
            .map(compile_window)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            windows,
            combination,
            access,
        })
    }

    /// Evaluator with no windows; every node passes
    pub fn disabled(access: Arc<dyn AccessChecker>) -> Self {
        Self {
            windows: Vec::new(),
            combination: RuleCombination::default(),
            access,
        }
    }

    /// Decide whether the node may commit its success at `now`.
    pub async fn evaluate(
        &self,
        now: DateTime<Utc>,
        scope: &FreezeScope,
        actor: &Principal,
    ) -> FreezeDecision {
        let active: Vec<ActiveFreezeWindow> = self
            .windows
            .iter()
            .filter(|w| w.active_at(now) && w.applies_to(scope, self.combination))
            .map(|w| ActiveFreezeWindow {
                identifier: w.identifier.clone(),
                name: w.name.clone(),
                start: w.start,
                end: w.end,
            })
            .collect();

        if active.is_empty() {
            debug!(actor = %actor.id, "no active freeze window matches");
            return FreezeDecision::Clear;
        }

        if self
            .access
            .check_access(actor, "freeze", FREEZE_OVERRIDE_PERMISSION)
            .await
        {
            info!(
                actor = %actor.id,
                windows = active.len(),
                "actor holds override permission, bypassing active freeze windows"
            );
            return FreezeDecision::Clear;
        }

        info!(
            actor = %actor.id,
            windows = ?active.iter().map(|w| w.identifier.as_str()).collect::<Vec<_>>(),
            "blocked by active freeze windows"
        );
        FreezeDecision::Blocked(FreezeOutcome {
            frozen: true,
            active_windows: active,
        })
    }
}

fn compile_window(window: FreezeWindowConfig) -> Result<CompiledWindow, ConfigError> {
    let identifier = window.identifier;
    let rules = window
        .rules
        .into_iter()
        .map(|rule| compile_rule(&identifier, rule))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CompiledWindow {
        identifier,
        name: window.name,
        start: window.start,
        end: window.end,
        rules,
    })
}

fn compile_rule(identifier: &str, rule: FreezeRule) -> Result<CompiledRule, ConfigError> {
    let matcher = match rule.filter {
        EntityFilter::All => Matcher::All,
        EntityFilter::Named { names } => Matcher::Named(names),
        EntityFilter::Pattern { pattern } => {
            let re = Regex::new(&pattern).map_err(|source| ConfigError::BadPattern {
                identifier: identifier.to_string(),
                pattern,
                source,
            })?;
            Matcher::Pattern(re)
        }
    };
    Ok(CompiledRule {
        entity_type: rule.entity_type,
        matcher,
    })
}
