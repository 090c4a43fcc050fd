//! Dependency graph between desired-state resources

use crate::error::{CloudError, Result};
use crate::resource::{Resource, ResourceId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Resources in declaration order plus their dependency edges
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource; ids must be unique
    pub fn insert(&mut self, resource: Resource) -> Result<()> {
        if self.index.contains_key(&resource.id) {
            return Err(CloudError::DuplicateResource(resource.id.to_string()));
        }
        self.index.insert(resource.id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    /// Every dependency edge points at a declared resource
    pub fn validate(&self) -> Result<()> {
        for resource in &self.resources {
            for dep in &resource.depends_on {
                if !self.contains(dep) {
                    return Err(CloudError::MissingDependency {
                        resource: resource.id.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Direct dependencies of a resource
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.get(id)
            .map(|r| r.depends_on.iter().collect())
            .unwrap_or_default()
    }

    /// Resources that directly depend on `id`
    pub fn dependents_of(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.resources
            .iter()
            .filter(|r| r.depends_on.contains(id))
            .map(|r| &r.id)
            .collect()
    }

    /// Dependencies first; ties broken by declaration order
    pub fn topological_order(&self) -> Result<Vec<&Resource>> {
        self.validate()?;

        let count = self.resources.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (i, resource) in self.resources.iter().enumerate() {
            for dep in &resource.depends_on {
                let j = self.index[dep];
                in_degree[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(&self.resources[i]);
            for &k in &dependents[i] {
                in_degree[k] -= 1;
                if in_degree[k] == 0 {
                    ready.push(Reverse(k));
                }
            }
        }

        if order.len() < count {
            let remaining: Vec<usize> = (0..count).filter(|&i| in_degree[i] > 0).collect();
            return Err(CloudError::CircularDependency(self.find_cycle(&remaining)));
        }
        Ok(order)
    }

    /// Walk dependency edges among the unresolved nodes until one repeats
    fn find_cycle(&self, remaining: &[usize]) -> Vec<String> {
        let Some(&start) = remaining.first() else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut current = start;
        loop {
            let next = self.resources[current]
                .depends_on
                .iter()
                .map(|d| self.index[d])
                .find(|j| remaining.contains(j));
            let Some(next) = next else {
                break;
            };
            if let Some(pos) = path.iter().position(|&p| p == next) {
                let mut cycle: Vec<String> = path[pos..]
                    .iter()
                    .map(|&i| self.resources[i].id.to_string())
                    .collect();
                cycle.push(self.resources[next].id.to_string());
                return cycle;
            }
            path.push(next);
            current = next;
        }
        path.iter()
            .map(|&i| self.resources[i].id.to_string())
            .collect()
    }
}
