//! Dependency graph resolution for Stage C plans (§4.8.2).
//!
//! Builds a directed graph over step ids (edge `u -> v` means "v depends
//! on u"), resolves `*`-glob wildcard dependency patterns, detects
//! cycles via DFS, and topologically sorts via Kahn's algorithm.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::PipelineError;
use crate::record::plan::Step;

pub struct DependencyGraph {
    /// u -> [v, ...] : v depends on u
    forward: HashMap<String, Vec<String>>,
    /// v -> [u, ...] : v depends on u (reverse of `forward`)
    reverse: HashMap<String, Vec<String>>,
    step_ids: Vec<String>,
}

/// Matches a `*`-glob dependency pattern against a concrete step id.
/// Splits the pattern on `*`; each non-empty part must occur in order
/// within the id, the first part anchored to the start and the last to
/// the end.
pub fn matches_wildcard(pattern: &str, id: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut cursor = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match id[cursor..].find(part) {
            None => return false,
            Some(pos) => {
                let abs_pos = cursor + pos;
                if i == 0 && abs_pos != 0 {
                    return false;
                }
                if i == parts.len() - 1 && !id.ends_with(part) {
                    return false;
                }
                cursor = abs_pos + part.len();
            }
        }
    }
    true
}

fn resolve_wildcard<'a>(pattern: &str, ids: &'a [String]) -> Vec<&'a str> {
    ids.iter()
        .map(String::as_str)
        .filter(|id| matches_wildcard(pattern, id))
        .collect()
}

impl DependencyGraph {
    pub fn build(steps: &[Step]) -> Self {
        let step_ids: Vec<String> = steps.iter().map(|s| s.id.clone()).collect();
        let mut forward: HashMap<String, Vec<String>> = HashMap::new();
        let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
        for id in &step_ids {
            forward.entry(id.clone()).or_default();
        }

        for step in steps {
            for pattern in &step.depends_on {
                let deps: Vec<String> = if pattern.contains('*') {
                    resolve_wildcard(pattern, &step_ids)
                        .into_iter()
                        .map(String::from)
                        .collect()
                } else if step_ids.iter().any(|id| id == pattern) {
                    vec![pattern.clone()]
                } else {
                    vec![]
                };
                for dep in deps {
                    if dep == step.id {
                        continue; // avoid self-dependency
                    }
                    forward.entry(dep.clone()).or_default().push(step.id.clone());
                    reverse.entry(step.id.clone()).or_default().push(dep);
                }
            }
        }

        Self {
            forward,
            reverse,
            step_ids,
        }
    }

    /// Returns the ids referenced by `depends_on` patterns that never
    /// resolved to any step (missing direct dependency, or a wildcard
    /// with zero matches).
    pub fn find_missing_dependencies(&self, steps: &[Step]) -> Vec<String> {
        let mut missing = HashSet::new();
        for step in steps {
            for pattern in &step.depends_on {
                if pattern.contains('*') {
                    if resolve_wildcard(pattern, &self.step_ids).is_empty() {
                        missing.insert(pattern.clone());
                    }
                } else if !self.step_ids.iter().any(|id| id == pattern) {
                    missing.insert(pattern.clone());
                }
            }
        }
        missing.into_iter().collect()
    }

    pub fn check_acyclic(&self) -> Result<(), String> {
        #[derive(PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(
            node: &'a str,
            forward: &'a HashMap<String, Vec<String>>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), String> {
            match marks.get(node) {
                Some(Mark::Visiting) => return Err(node.to_string()),
                Some(Mark::Done) => return Ok(()),
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            if let Some(neighbors) = forward.get(node) {
                for n in neighbors {
                    visit(n.as_str(), forward, marks)?;
                }
            }
            marks.insert(node, Mark::Done);
            Ok(())
        }

        for id in &self.step_ids {
            if let Err(representative) = visit(id.as_str(), &self.forward, &mut marks) {
                return Err(format!("circular dependency detected involving step: {representative}"));
            }
        }
        Ok(())
    }

    /// Kahn's algorithm. Returns step ids in a valid topological order.
    pub fn topological_order(&self) -> Result<Vec<String>, String> {
        let mut in_degree: HashMap<&str, usize> = self.step_ids.iter().map(|id| (id.as_str(), 0)).collect();
        for neighbors in self.forward.values() {
            for n in neighbors {
                *in_degree.entry(n.as_str()).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        // Deterministic ordering for a stable, reproducible sort.
        let mut queue: Vec<&str> = queue.drain(..).collect();
        queue.sort();
        let mut queue: VecDeque<&str> = queue.into();

        let mut result = Vec::with_capacity(self.step_ids.len());
        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());
            if let Some(neighbors) = self.forward.get(node) {
                let mut ready = Vec::new();
                for n in neighbors {
                    let deg = in_degree.get_mut(n.as_str()).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(n.as_str());
                    }
                }
                ready.sort();
                for r in ready {
                    queue.push_back(r);
                }
            }
        }

        if result.len() != self.step_ids.len() {
            let unprocessed: Vec<&str> = self
                .step_ids
                .iter()
                .map(String::as_str)
                .filter(|id| !result.iter().any(|r| r == id))
                .collect();
            return Err(format!("unable to resolve dependencies for steps: {unprocessed:?}"));
        }
        Ok(result)
    }

    /// Longest-path-from-roots level for every step; steps sharing a
    /// level may execute concurrently.
    pub fn levels(&self) -> HashMap<String, usize> {
        let mut levels: HashMap<String, usize> = HashMap::new();

        fn calc<'a>(
            node: &'a str,
            reverse: &'a HashMap<String, Vec<String>>,
            levels: &mut HashMap<String, usize>,
            visiting: &mut HashSet<&'a str>,
        ) -> usize {
            if let Some(level) = levels.get(node) {
                return *level;
            }
            if !visiting.insert(node) {
                return 0; // cycle guard, should not happen post-validation
            }
            let mut max_dep_level: isize = -1;
            if let Some(deps) = reverse.get(node) {
                for dep in deps {
                    let dep_level = calc(dep, reverse, levels, visiting);
                    max_dep_level = max_dep_level.max(dep_level as isize);
                }
            }
            let level = (max_dep_level + 1) as usize;
            levels.insert(node.to_string(), level);
            level
        }

        for id in &self.step_ids {
            let mut visiting = HashSet::new();
            calc(id.as_str(), &self.reverse, &mut levels, &mut visiting);
        }
        levels
    }

    pub fn is_valid_topological_order(&self, steps: &[Step]) -> bool {
        let mut by_order: Vec<&Step> = steps.iter().collect();
        by_order.sort_by_key(|s| s.execution_order);
        let position: HashMap<&str, usize> = by_order
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        for (node, neighbors) in &self.forward {
            let Some(&node_pos) = position.get(node.as_str()) else {
                continue;
            };
            for neighbor in neighbors {
                let Some(&neighbor_pos) = position.get(neighbor.as_str()) else {
                    continue;
                };
                if neighbor_pos <= node_pos {
                    return false;
                }
            }
        }
        true
    }
}

/// Resolves dependencies for a full step list: validates acyclicity
/// (with one repair pass per §4.8.2 step 3), topologically sorts, and
/// writes `execution_order` back (1-indexed).
pub fn resolve_dependencies(mut steps: Vec<Step>) -> Result<Vec<Step>, PipelineError> {
    if steps.is_empty() {
        return Ok(steps);
    }

    let mut graph = DependencyGraph::build(&steps);
    if let Err(cause) = graph.check_acyclic() {
        steps = repair_once(steps);
        graph = DependencyGraph::build(&steps);
        graph
            .check_acyclic()
            .map_err(|_| PipelineError::Dependency(cause))?;
    }

    let order = graph
        .topological_order()
        .map_err(PipelineError::Dependency)?;
    let position: HashMap<&str, usize> = order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
    steps.sort_by_key(|s| position.get(s.id.as_str()).copied().unwrap_or(usize::MAX));
    for (i, step) in steps.iter_mut().enumerate() {
        step.execution_order = (i + 1) as u32;
    }
    Ok(steps)
}

/// A single repair pass: strips self-dependencies and unresolved
/// wildcard patterns, then the caller retries exactly once.
fn repair_once(mut steps: Vec<Step>) -> Vec<Step> {
    let ids: HashSet<String> = steps.iter().map(|s| s.id.clone()).collect();
    for step in &mut steps {
        let my_id = step.id.clone();
        step.depends_on.retain(|pattern| {
            if pattern == &my_id {
                return false;
            }
            if pattern.contains('*') {
                ids.iter().any(|id| matches_wildcard(pattern, id) && id != &my_id)
            } else {
                ids.contains(pattern)
            }
        });
    }
    steps
}

/// Groups dependency-resolved steps into parallel execution phases,
/// ordered by dependency level (§4.8.2 step 5).
pub fn parallel_phases(steps: &[Step]) -> Vec<Vec<Step>> {
    if steps.is_empty() {
        return vec![];
    }
    let graph = DependencyGraph::build(steps);
    let levels = graph.levels();
    let max_level = levels.values().copied().max().unwrap_or(0);

    let mut by_id: HashMap<&str, &Step> = steps.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut phases = Vec::new();
    for level in 0..=max_level {
        let mut group: Vec<Step> = levels
            .iter()
            .filter(|(_, l)| **l == level)
            .filter_map(|(id, _)| by_id.remove(id.as_str()).cloned())
            .collect();
        group.sort_by_key(|s| s.execution_order);
        if !group.is_empty() {
            phases.push(group);
        }
    }
    phases
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn step(id: &str, depends_on: &[&str]) -> Step {
        Step {
            id: id.to_string(),
            description: "test".to_string(),
            tool: "noop".to_string(),
            inputs: Map::new(),
            preconditions: vec![],
            success_criteria: vec![],
            failure_handling: "retry".to_string(),
            estimated_duration_s: 10,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            execution_order: 0,
        }
    }

    #[test]
    fn topological_sort_orders_dependencies_first() {
        let steps = vec![step("b", &["a"]), step("a", &[])];
        let sorted = resolve_dependencies(steps).unwrap();
        let positions: Map<&str, u32> = sorted.iter().map(|s| (s.id.as_str(), s.execution_order)).collect();
        assert!(positions["a"] < positions["b"]);
    }

    #[test]
    fn cycle_is_detected_as_a_dependency_error() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        let result = resolve_dependencies(steps);
        assert!(matches!(result, Err(PipelineError::Dependency(_))));
    }

    #[test]
    fn wildcard_dependency_resolves_to_matching_ids() {
        let steps = vec![step("step_001_systemctl_restart", &[]), step("step_002_verify", &["*systemctl*"])];
        let sorted = resolve_dependencies(steps).unwrap();
        let verify = sorted.iter().find(|s| s.id == "step_002_verify").unwrap();
        assert_eq!(verify.execution_order, 2);
    }

    #[test]
    fn self_dependency_is_stripped_by_the_repair_pass() {
        let steps = vec![step("a", &["a"])];
        let sorted = resolve_dependencies(steps).unwrap();
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].execution_order, 1);
    }

    #[test]
    fn parallel_phases_group_independent_steps_together() {
        let steps = resolve_dependencies(vec![
            step("a", &[]),
            step("b", &[]),
            step("c", &["a", "b"]),
        ])
        .unwrap();
        let phases = parallel_phases(&steps);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].len(), 2);
        assert_eq!(phases[1].len(), 1);
        assert_eq!(phases[1][0].id, "c");
    }
}
