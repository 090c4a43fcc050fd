//! Plan: desired graph diffed against the last recorded snapshot

use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::output::PendingOutput;
use crate::resource::{Provider, ResourceId};
use crate::state::StackState;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Represents a planned action for a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub resource_id: ResourceId,
    pub provider: Provider,
    /// Human-readable description of the change
    pub description: String,
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    NoOp,
}

impl ActionType {
    /// Marker used in preview output
    pub fn symbol(&self) -> &'static str {
        match self {
            ActionType::Create => "+",
            ActionType::Update => "~",
            ActionType::Delete => "-",
            ActionType::NoOp => " ",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// A resource that cannot be declared until a provider output is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredResource {
    pub id: ResourceId,
    pub waiting_on: PendingOutput,
}

/// Plan containing all actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Creates/updates/no-ops in dependency order, then deletes in reverse
    pub actions: Vec<Action>,
    pub deferred: Vec<DeferredResource>,
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>, deferred: Vec<DeferredResource>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            deferred,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Diff the desired graph against recorded state
    ///
    /// Deferred resources already present in state are kept (no delete):
    /// they are waiting on an output, not removed from the composition.
    pub fn diff(
        graph: &ResourceGraph,
        state: &StackState,
        deferred: Vec<DeferredResource>,
    ) -> Result<Self> {
        let mut actions = Vec::with_capacity(graph.len());

        for resource in graph.topological_order()? {
            let key = resource.id.to_string();
            let fingerprint = resource.fingerprint();
            let (action_type, description) = match state.resources.get(&key) {
                None => (ActionType::Create, format!("create {}", key)),
                Some(record) if record.fingerprint != fingerprint => {
                    (ActionType::Update, format!("update {}", key))
                }
                Some(_) => (ActionType::NoOp, format!("{} unchanged", key)),
            };
            actions.push(Action {
                action_type,
                resource_id: resource.id.clone(),
                provider: resource.provider,
                description,
            });
        }

        let deferred_keys: HashSet<String> = deferred.iter().map(|d| d.id.to_string()).collect();
        let mut deletes: Vec<Action> = state
            .resources
            .values()
            .filter(|record| !graph.contains(&record.id))
            .filter(|record| !deferred_keys.contains(&record.id.to_string()))
            .map(|record| Action {
                action_type: ActionType::Delete,
                resource_id: record.id.clone(),
                provider: record.provider,
                description: format!("delete {}", record.id),
            })
            .collect();
        // Recorded order is dependency order; delete dependents first
        deletes.sort_by_key(|a| {
            std::cmp::Reverse(
                state
                    .resources
                    .get(&a.resource_id.to_string())
                    .map(|r| r.order)
                    .unwrap_or_default(),
            )
        });
        actions.extend(deletes);

        Ok(Self::new(actions, deferred))
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
            deferred: self.deferred.len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
    pub deferred: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )?;
        if self.deferred > 0 {
            write!(f, ", {} deferred", self.deferred)?;
        }
        Ok(())
    }
}
