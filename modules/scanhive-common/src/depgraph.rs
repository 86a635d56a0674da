use std::collections::{HashMap, HashSet, VecDeque};

use crate::ids::ModuleName;

/// Outcome of resolving a requested module set against a dependency map.
pub struct Resolution {
    /// Transitive closure of the requested set, including auto-included
    /// dependencies. Sorted for deterministic iteration.
    pub modules: Vec<ModuleName>,
    /// The single source node of the closure (no in-closure dependencies).
    pub producer: ModuleName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepGraphError {
    /// A dependency cycle exists among the given modules.
    Cycle(Vec<ModuleName>),
    /// More than one source node (no-dependency module) exists in the closure.
    AmbiguousProducer(Vec<ModuleName>),
    /// A referenced module has no entry in the dependency map at all.
    UnknownModule(ModuleName),
}

/// Computes `transitive_closure(requested)` over `dependencies`, then checks
/// the closure forms a DAG with exactly one source node.
///
/// `dependencies` maps a module name to the set of module names it declares
/// as dependencies. Every key that appears anywhere (requested or pulled in
/// by closure) must have an entry in `dependencies`, even if the entry is an
/// empty set.
pub fn resolve(
    requested: &[ModuleName],
    dependencies: &HashMap<ModuleName, HashSet<ModuleName>>,
) -> Result<Resolution, DepGraphError> {
    let mut closure: HashSet<ModuleName> = HashSet::new();
    let mut queue: VecDeque<ModuleName> = requested.iter().cloned().collect();

    while let Some(name) = queue.pop_front() {
        if closure.contains(&name) {
            continue;
        }
        let deps = dependencies
            .get(&name)
            .ok_or_else(|| DepGraphError::UnknownModule(name.clone()))?;
        closure.insert(name.clone());
        for dep in deps {
            if !closure.contains(dep) {
                queue.push_back(dep.clone());
            }
        }
    }

    let order = topological_order(&closure, dependencies)?;

    let sources: Vec<ModuleName> = closure
        .iter()
        .filter(|name| {
            dependencies
                .get(*name)
                .map(|deps| deps.iter().all(|d| !closure.contains(d)))
                .unwrap_or(true)
        })
        .cloned()
        .collect();

    let producer = match sources.len() {
        1 => sources.into_iter().next().unwrap(),
        _ => return Err(DepGraphError::AmbiguousProducer(sort(sources))),
    };

    Ok(Resolution {
        modules: order,
        producer,
    })
}

/// Kahn's algorithm restricted to `nodes`. Returns a dependency-first order
/// (a module always appears after every dependency it has within `nodes`),
/// or `Cycle` if the subgraph induced by `nodes` is not acyclic.
fn topological_order(
    nodes: &HashSet<ModuleName>,
    dependencies: &HashMap<ModuleName, HashSet<ModuleName>>,
) -> Result<Vec<ModuleName>, DepGraphError> {
    let mut in_degree: HashMap<ModuleName, usize> =
        nodes.iter().map(|n| (n.clone(), 0)).collect();
    let mut dependents: HashMap<ModuleName, Vec<ModuleName>> = HashMap::new();

    for node in nodes {
        let deps = dependencies.get(node).cloned().unwrap_or_default();
        for dep in &deps {
            if nodes.contains(dep) {
                *in_degree.get_mut(node).unwrap() += 1;
                dependents.entry(dep.clone()).or_default().push(node.clone());
            }
        }
    }

    let mut ready: VecDeque<ModuleName> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(n, _)| n.clone())
        .collect();
    ready.make_contiguous().sort();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = ready.pop_front() {
        order.push(node.clone());
        if let Some(next) = dependents.get(&node) {
            let mut newly_ready = Vec::new();
            for dependent in next {
                let deg = in_degree.get_mut(dependent).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(dependent.clone());
                }
            }
            newly_ready.sort();
            for n in newly_ready {
                ready.push_back(n);
            }
        }
    }

    if order.len() != nodes.len() {
        let remaining: Vec<ModuleName> = nodes
            .iter()
            .filter(|n| !order.contains(n))
            .cloned()
            .collect();
        return Err(DepGraphError::Cycle(sort(remaining)));
    }

    Ok(order)
}

fn sort(mut v: Vec<ModuleName>) -> Vec<ModuleName> {
    v.sort();
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(pairs: &[(&str, &[&str])]) -> HashMap<ModuleName, HashSet<ModuleName>> {
        pairs
            .iter()
            .map(|(name, ds)| {
                (
                    ModuleName::from(*name),
                    ds.iter().map(|d| ModuleName::from(*d)).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn resolves_simple_fan_out() {
        let map = deps(&[
            ("enumerator", &[]),
            ("resolver", &["enumerator"]),
            ("prober", &["enumerator"]),
        ]);
        let requested = vec![
            ModuleName::from("enumerator"),
            ModuleName::from("resolver"),
            ModuleName::from("prober"),
        ];
        let resolution = resolve(&requested, &map).unwrap();
        assert_eq!(resolution.producer, ModuleName::from("enumerator"));
        assert_eq!(resolution.modules.len(), 3);
        assert_eq!(resolution.modules[0], ModuleName::from("enumerator"));
    }

    #[test]
    fn auto_includes_transitive_dependency() {
        let map = deps(&[("enumerator", &[]), ("prober", &["enumerator"])]);
        let requested = vec![ModuleName::from("prober")];
        let resolution = resolve(&requested, &map).unwrap();
        let names: HashSet<_> = resolution.modules.into_iter().collect();
        assert!(names.contains(&ModuleName::from("enumerator")));
        assert!(names.contains(&ModuleName::from("prober")));
        assert_eq!(resolution.producer, ModuleName::from("enumerator"));
    }

    #[test]
    fn rejects_cycle() {
        let map = deps(&[("a", &["b"]), ("b", &["a"])]);
        let requested = vec![ModuleName::from("a")];
        let err = resolve(&requested, &map).unwrap_err();
        assert!(matches!(err, DepGraphError::Cycle(_)));
    }

    #[test]
    fn rejects_ambiguous_producer() {
        let map = deps(&[("a", &[]), ("b", &[]), ("c", &["a", "b"])]);
        let requested = vec![ModuleName::from("c")];
        let err = resolve(&requested, &map).unwrap_err();
        assert!(matches!(err, DepGraphError::AmbiguousProducer(_)));
    }

    #[test]
    fn rejects_unknown_module() {
        let map = deps(&[("a", &[])]);
        let requested = vec![ModuleName::from("ghost")];
        let err = resolve(&requested, &map).unwrap_err();
        assert!(matches!(err, DepGraphError::UnknownModule(_)));
    }

    #[test]
    fn single_module_with_no_deps_is_its_own_producer() {
        let map = deps(&[("solo", &[])]);
        let requested = vec![ModuleName::from("solo")];
        let resolution = resolve(&requested, &map).unwrap();
        assert_eq!(resolution.producer, ModuleName::from("solo"));
        assert_eq!(resolution.modules, vec![ModuleName::from("solo")]);
    }
}
