//! Dependency graph engine
//!
//! Turns a `node -> [dependency]` map into in-degrees, transitive dependency
//! closures ("intermediates"), connected groups and depth levels.
//!
//! Edges point from a dependent to its dependency. Roots are nodes nothing
//! depends on and sit at depth 0; every dependency sits strictly deeper than
//! each of its dependents, so deploying deepest-first is dependency-safe.

use crate::error::GraphError;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Display;
use tracing::debug;

/// `node -> [dependency]`
pub type DependencyMap<K> = BTreeMap<K, Vec<K>>;

/// Every node of a dependency map: its keys plus every referenced dependency
fn all_nodes<K: Ord + Clone>(deps: &DependencyMap<K>) -> BTreeSet<K> {
    deps.iter()
        .flat_map(|(node, node_deps)| std::iter::once(node).chain(node_deps.iter()))
        .cloned()
        .collect()
}

fn distinct<K: Ord>(node_deps: &[K]) -> BTreeSet<&K> {
    node_deps.iter().collect()
}

/// Number of distinct dependents listing each node as a dependency
///
/// Nodes nobody lists get 0. A dependency repeated within one list counts once.
pub fn in_degrees<K: Ord + Clone>(deps: &DependencyMap<K>) -> BTreeMap<K, usize> {
    let mut result: BTreeMap<K, usize> = all_nodes(deps).into_iter().map(|n| (n, 0)).collect();

    for node_deps in deps.values() {
        for dep in distinct(node_deps) {
            if let Some(count) = result.get_mut(dep) {
                *count += 1;
            }
        }
    }

    result
}

/// Nodes with in-degree 0, sorted
pub fn roots<K: Ord + Clone>(in_degree: &BTreeMap<K, usize>) -> Vec<K> {
    in_degree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| node.clone())
        .collect()
}

/// Full transitive dependency closure of every node
///
/// Memoised so the whole map is walked once. Back-edges are skipped, so a
/// cyclic map terminates here; the cycle is reported by [`depths`].
pub fn intermediates<K: Ord + Clone>(deps: &DependencyMap<K>) -> BTreeMap<K, BTreeSet<K>> {
    let mut memo: BTreeMap<K, BTreeSet<K>> = BTreeMap::new();
    let mut visiting: BTreeSet<K> = BTreeSet::new();

    for node in all_nodes(deps) {
        visit(&node, deps, &mut memo, &mut visiting);
    }

    memo
}

fn visit<K: Ord + Clone>(
    node: &K,
    deps: &DependencyMap<K>,
    memo: &mut BTreeMap<K, BTreeSet<K>>,
    visiting: &mut BTreeSet<K>,
) -> BTreeSet<K> {
    if let Some(done) = memo.get(node) {
        return done.clone();
    }
    if !visiting.insert(node.clone()) {
        return BTreeSet::new();
    }

    let mut closure = BTreeSet::new();
    for dep in deps.get(node).into_iter().flatten() {
        closure.insert(dep.clone());
        closure.extend(visit(dep, deps, memo, visiting));
    }

    visiting.remove(node);
    memo.insert(node.clone(), closure.clone());
    closure
}

/// Disjoint-set forest over node indices
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Weakly-connected components of the dependency map
///
/// Two chains converging on a shared dependency land in the same group, and
/// so does every node reachable from either of them. Group numbers are dense
/// and follow the order of each component's smallest root; components without
/// a root (pure cycles) are numbered after, by smallest member.
pub fn groups<K: Ord + Clone>(deps: &DependencyMap<K>) -> BTreeMap<K, usize> {
    let nodes: Vec<K> = all_nodes(deps).into_iter().collect();
    let index: BTreeMap<&K, usize> = nodes.iter().enumerate().map(|(i, n)| (n, i)).collect();

    let mut uf = UnionFind::new(nodes.len());
    for (node, node_deps) in deps {
        let a = index[node];
        for dep in node_deps {
            uf.union(a, index[dep]);
        }
    }

    let in_degree = in_degrees(deps);
    let ordered = roots(&in_degree)
        .into_iter()
        .chain(nodes.iter().cloned());

    let mut component_group: BTreeMap<usize, usize> = BTreeMap::new();
    let mut result = BTreeMap::new();
    for node in ordered {
        let component = uf.find(index[&node]);
        let next = component_group.len();
        let group = *component_group.entry(component).or_insert(next);
        result.entry(node).or_insert(group);
    }

    result
}

/// Depth of every node: the longest path from any root
///
/// Topological relaxation over dependent -> dependency edges. A node is
/// finalised once, when the last of its dependents has been finalised, so
/// diamonds are never counted twice. Nodes left unfinalised are on, or only
/// reachable through, a cycle.
pub fn depths<K: Ord + Clone + Display>(
    deps: &DependencyMap<K>,
    roots: &[K],
) -> Result<BTreeMap<K, usize>, GraphError> {
    let nodes = all_nodes(deps);
    let mut remaining = in_degrees(deps);
    let mut depth: BTreeMap<K, usize> = BTreeMap::new();
    let mut queue: VecDeque<K> = VecDeque::new();

    for root in roots {
        if remaining.get(root) == Some(&0) && !depth.contains_key(root) {
            depth.insert(root.clone(), 0);
            queue.push_back(root.clone());
        }
    }

    let mut finalised = 0usize;
    while let Some(node) = queue.pop_front() {
        finalised += 1;
        let node_depth = depth.get(&node).copied().unwrap_or_default();

        for dep in distinct(deps.get(&node).map(Vec::as_slice).unwrap_or_default()) {
            let dep_depth = depth.entry(dep.clone()).or_insert(0);
            *dep_depth = (*dep_depth).max(node_depth + 1);

            if let Some(count) = remaining.get_mut(dep) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dep.clone());
                }
            }
        }
    }

    if finalised < nodes.len() {
        let stuck: Vec<String> = remaining
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(node, _)| node.to_string())
            .collect();
        debug!(finalised, total = nodes.len(), "depth leveling stalled");
        return Err(GraphError::Cycle { nodes: stuck });
    }

    Ok(depth)
}

/// Read-only view of a validated, acyclic dependency map
#[derive(Debug, Clone)]
pub struct DependencyGraph<K: Ord> {
    dependencies: DependencyMap<K>,
    in_degree: BTreeMap<K, usize>,
    roots: Vec<K>,
    intermediates: BTreeMap<K, BTreeSet<K>>,
    group: BTreeMap<K, usize>,
    depth: BTreeMap<K, usize>,
}

impl<K: Ord + Clone + Display> DependencyGraph<K> {
    /// Build the graph
    ///
    /// Fails if a dependency is not itself a key of the map, or if the map is
    /// cyclic.
    pub fn new(dependencies: DependencyMap<K>) -> Result<Self, GraphError> {
        for (node, node_deps) in &dependencies {
            if let Some(dangling) = node_deps.iter().find(|d| !dependencies.contains_key(*d)) {
                return Err(GraphError::DanglingDependency {
                    node: node.to_string(),
                    dependency: dangling.to_string(),
                });
            }
        }

        let dependencies: DependencyMap<K> = dependencies
            .into_iter()
            .map(|(node, mut node_deps)| {
                node_deps.sort();
                node_deps.dedup();
                (node, node_deps)
            })
            .collect();

        let in_degree = in_degrees(&dependencies);
        let roots = roots(&in_degree);
        let depth = depths(&dependencies, &roots)?;
        let intermediates = intermediates(&dependencies);
        let group = groups(&dependencies);

        debug!(
            nodes = dependencies.len(),
            roots = roots.len(),
            groups = group.values().collect::<BTreeSet<_>>().len(),
            "dependency graph built"
        );

        Ok(Self {
            dependencies,
            in_degree,
            roots,
            intermediates,
            group,
            depth,
        })
    }
}

impl<K: Ord + Clone> DependencyGraph<K> {
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn contains(&self, node: &K) -> bool {
        self.dependencies.contains_key(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &K> {
        self.dependencies.keys()
    }

    /// Direct dependencies, sorted and de-duplicated
    pub fn dependencies(&self, node: &K) -> &[K] {
        self.dependencies.get(node).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn in_degree(&self, node: &K) -> usize {
        self.in_degree.get(node).copied().unwrap_or_default()
    }

    pub fn in_degrees(&self) -> &BTreeMap<K, usize> {
        &self.in_degree
    }

    pub fn roots(&self) -> &[K] {
        &self.roots
    }

    /// Transitive dependency closure
    pub fn intermediates(&self, node: &K) -> Option<&BTreeSet<K>> {
        self.intermediates.get(node)
    }

    pub fn group(&self, node: &K) -> Option<usize> {
        self.group.get(node).copied()
    }

    pub fn depth(&self, node: &K) -> Option<usize> {
        self.depth.get(node).copied()
    }

    pub fn max_depth(&self) -> usize {
        self.depth.values().copied().max().unwrap_or_default()
    }

    /// Distinct group numbers, ascending
    pub fn group_ids(&self) -> Vec<usize> {
        self.group
            .values()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Members of one group, sorted
    pub fn members(&self, group: usize) -> Vec<&K> {
        self.group
            .iter()
            .filter(|(_, g)| **g == group)
            .map(|(node, _)| node)
            .collect()
    }

    /// All nodes, deepest first; ties broken by key
    pub fn depth_order(&self) -> Vec<&K> {
        let mut order: Vec<&K> = self.dependencies.keys().collect();
        order.sort_by(|a, b| {
            self.depth(b)
                .cmp(&self.depth(a))
                .then_with(|| a.cmp(b))
        });
        order
    }

    /// `group -> depth -> [node]`
    pub fn group_to_depth_to_nodes(&self) -> BTreeMap<usize, BTreeMap<usize, Vec<K>>> {
        let mut result: BTreeMap<usize, BTreeMap<usize, Vec<K>>> = BTreeMap::new();
        for node in self.dependencies.keys() {
            let (Some(group), Some(depth)) = (self.group(node), self.depth(node)) else {
                continue;
            };
            result
                .entry(group)
                .or_default()
                .entry(depth)
                .or_default()
                .push(node.clone());
        }
        result
    }
}
