//! Cross-template dependency resolution.
//!
//! Templates reference each other through a reserved virtual import path:
//! the prefix `@templates/` followed by a slug, embedded anywhere in source
//! text. This module extracts those references and computes a safe compile
//! order over them.
//!
//! # Ordering semantics
//!
//! [`DependencyGraph::topological_order`] is cycle tolerant. A back-edge
//! discovered during traversal (an edge into a node currently on the DFS
//! path) is dropped and recorded as a [`CycleEdge`] warning rather than
//! failing the batch; the involved nodes still appear exactly once in the
//! output. All non-cyclic edges are respected: a slug is emitted only after
//! every remaining dependency.
//!
//! Roots and neighbors are visited in lexicographic slug order, so the
//! ordering, including which edge of a cycle gets dropped, is deterministic
//! across runs.

use crate::constants::TEMPLATE_IMPORT_PREFIX;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::warn;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            "{}([A-Za-z0-9][A-Za-z0-9_-]*)",
            regex::escape(TEMPLATE_IMPORT_PREFIX)
        ))
        .expect("reference pattern is valid")
    })
}

/// Extract the distinct template slugs referenced by a source text, in
/// first-seen order. Source with no reserved-import occurrences yields an
/// empty list.
#[must_use]
pub fn extract_dependencies(source: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in reference_pattern().captures_iter(source) {
        let slug = caps[1].to_string();
        if seen.insert(slug.clone()) {
            out.push(slug);
        }
    }
    out
}

/// A dropped back-edge that closed a dependency cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEdge {
    /// The slug whose dependency closed the cycle
    pub from: String,
    /// The already-in-progress slug the edge pointed back to
    pub to: String,
}

/// Result of a topological ordering pass.
#[derive(Debug, Default)]
pub struct TopoOrder {
    /// Every node exactly once, dependencies before dependents
    pub order: Vec<String>,
    /// Back-edges that were dropped to break cycles
    pub cycles: Vec<CycleEdge>,
}

/// Color states for the depth-first traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not yet visited
    White,
    /// Currently on the traversal path
    Gray,
    /// Fully visited
    Black,
}

/// Directed slug graph used to compute compile order.
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    fn ensure_node(&mut self, slug: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(slug) {
            index
        } else {
            let index = self.graph.add_node(slug.to_string());
            self.node_map.insert(slug.to_string(), index);
            index
        }
    }

    /// Record a template and its direct dependencies.
    ///
    /// Dependency slugs that never appear as templates themselves still
    /// become nodes; callers decide what to do with them when they surface
    /// in the order.
    pub fn add_template(&mut self, slug: &str, dependencies: &[String]) {
        let from = self.ensure_node(slug);
        for dep in dependencies {
            let to = self.ensure_node(dep);
            if !self.graph.contains_edge(from, to) {
                self.graph.add_edge(from, to, ());
            }
        }
    }

    /// Whether a slug is present in the graph.
    #[must_use]
    pub fn contains(&self, slug: &str) -> bool {
        self.node_map.contains_key(slug)
    }

    /// Total number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Compute a compile order with dependencies before dependents.
    ///
    /// Cycles are broken by dropping the offending back-edge; each drop is
    /// logged and reported in the returned [`TopoOrder`].
    #[must_use]
    pub fn topological_order(&self) -> TopoOrder {
        let mut colors: HashMap<NodeIndex, Color> = HashMap::new();
        let mut order = Vec::new();
        let mut cycles = Vec::new();

        let mut roots: Vec<NodeIndex> = self.graph.node_indices().collect();
        roots.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for root in roots {
            if colors.get(&root).copied().unwrap_or(Color::White) == Color::White {
                self.visit(root, &mut colors, &mut order, &mut cycles);
            }
        }

        for cycle in &cycles {
            warn!(
                from = %cycle.from,
                to = %cycle.to,
                "dependency cycle detected; ignoring back-edge"
            );
        }

        TopoOrder {
            order,
            cycles,
        }
    }

    fn visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        order: &mut Vec<String>,
        cycles: &mut Vec<CycleEdge>,
    ) {
        colors.insert(node, Color::Gray);

        let mut deps: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        deps.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for dep in deps {
            match colors.get(&dep).copied().unwrap_or(Color::White) {
                Color::Gray => cycles.push(CycleEdge {
                    from: self.graph[node].clone(),
                    to: self.graph[dep].clone(),
                }),
                Color::White => self.visit(dep, colors, order, cycles),
                Color::Black => {}
            }
        }

        colors.insert(node, Color::Black);
        order.push(self.graph[node].clone());
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_no_references() {
        assert!(extract_dependencies("<div>plain markup</div>").is_empty());
    }

    #[test]
    fn test_extract_distinct_in_order() {
        let source = r#"
            local hero = require("@templates/hero")
            local cta = require('@templates/cta-banner')
            local again = require("@templates/hero")
        "#;
        assert_eq!(extract_dependencies(source), vec!["hero", "cta-banner"]);
    }

    #[test]
    fn test_extract_matches_bare_occurrences() {
        // Any occurrence of the prefix counts, not just require calls.
        assert_eq!(extract_dependencies("see @templates/story for details"), vec!["story"]);
    }

    #[test]
    fn test_landing_hero_scenario() {
        let mut graph = DependencyGraph::new();
        graph.add_template("landing", &["hero".to_string()]);
        graph.add_template("hero", &[]);

        let topo = graph.topological_order();
        assert_eq!(topo.order, vec!["hero", "landing"]);
        assert!(topo.cycles.is_empty());
    }

    #[test]
    fn test_dag_never_places_dependent_first() {
        let mut graph = DependencyGraph::new();
        // a -> b, a -> c, b -> d, c -> d
        graph.add_template("a", &["b".to_string(), "c".to_string()]);
        graph.add_template("b", &["d".to_string()]);
        graph.add_template("c", &["d".to_string()]);
        graph.add_template("d", &[]);

        let topo = graph.topological_order();
        assert_eq!(topo.order.len(), 4);
        let pos = |slug: &str| topo.order.iter().position(|s| s == slug).unwrap();
        assert!(pos("d") < pos("b"));
        assert!(pos("d") < pos("c"));
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
    }

    #[test]
    fn test_mutual_cycle_emits_both_once() {
        let mut graph = DependencyGraph::new();
        graph.add_template("a", &["b".to_string()]);
        graph.add_template("b", &["a".to_string()]);

        let topo = graph.topological_order();
        assert_eq!(topo.order.len(), 2);
        assert!(topo.order.contains(&"a".to_string()));
        assert!(topo.order.contains(&"b".to_string()));
        assert_eq!(topo.cycles.len(), 1);
        // Lexicographic traversal starts at "a", so the back-edge b -> a is dropped.
        assert_eq!(topo.cycles[0], CycleEdge {
            from: "b".to_string(),
            to: "a".to_string(),
        });
    }

    #[test]
    fn test_cycle_resolution_is_deterministic() {
        let first = {
            let mut graph = DependencyGraph::new();
            graph.add_template("zeta", &["alpha".to_string()]);
            graph.add_template("alpha", &["zeta".to_string()]);
            graph.topological_order()
        };
        for _ in 0..16 {
            let mut graph = DependencyGraph::new();
            graph.add_template("zeta", &["alpha".to_string()]);
            graph.add_template("alpha", &["zeta".to_string()]);
            let again = graph.topological_order();
            assert_eq!(again.order, first.order);
            assert_eq!(again.cycles, first.cycles);
        }
    }

    #[test]
    fn test_self_reference_dropped() {
        let mut graph = DependencyGraph::new();
        graph.add_template("a", &["a".to_string()]);

        let topo = graph.topological_order();
        assert_eq!(topo.order, vec!["a"]);
        assert_eq!(topo.cycles.len(), 1);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = DependencyGraph::new();
        graph.add_template("a", &["b".to_string(), "b".to_string()]);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node_count(), 2);
    }
}
