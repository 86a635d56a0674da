use std::collections::{HashMap, HashSet, VecDeque};

use scanhive_common::ModuleName;

use crate::error::RegistryError;

/// Validates the full catalog (not a single request's subset): the
/// dependency graph among enabled modules must be acyclic, and within any
/// weakly-connected component of that graph there must be exactly one
/// source node (a module with no in-component dependency). Two modules in
/// unrelated components may each be a producer for their own pipelines —
/// only a shared dependency closure is ambiguous.
pub fn validate_catalog(
    dependencies: &HashMap<ModuleName, HashSet<ModuleName>>,
) -> Result<(), RegistryError> {
    reject_cycles(dependencies)?;
    reject_ambiguous_components(dependencies)?;
    Ok(())
}

fn reject_cycles(
    dependencies: &HashMap<ModuleName, HashSet<ModuleName>>,
) -> Result<(), RegistryError> {
    let mut in_degree: HashMap<ModuleName, usize> =
        dependencies.keys().map(|n| (n.clone(), 0)).collect();
    let mut dependents: HashMap<ModuleName, Vec<ModuleName>> = HashMap::new();

    for (node, deps) in dependencies {
        for dep in deps {
            *in_degree.entry(node.clone()).or_insert(0) += 1;
            dependents.entry(dep.clone()).or_default().push(node.clone());
        }
    }

    let mut ready: VecDeque<ModuleName> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(n, _)| n.clone())
        .collect();

    let mut visited = 0usize;
    while let Some(node) = ready.pop_front() {
        visited += 1;
        if let Some(next) = dependents.get(&node) {
            for dependent in next {
                let deg = in_degree.get_mut(dependent).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.push_back(dependent.clone());
                }
            }
        }
    }

    if visited != in_degree.len() {
        let remaining: Vec<ModuleName> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(n, _)| n)
            .collect();
        return Err(RegistryError::Cycle(sort(remaining)));
    }

    Ok(())
}

fn reject_ambiguous_components(
    dependencies: &HashMap<ModuleName, HashSet<ModuleName>>,
) -> Result<(), RegistryError> {
    let mut undirected: HashMap<ModuleName, HashSet<ModuleName>> = HashMap::new();
    for (node, deps) in dependencies {
        undirected.entry(node.clone()).or_default();
        for dep in deps {
            undirected.entry(node.clone()).or_default().insert(dep.clone());
            undirected.entry(dep.clone()).or_default().insert(node.clone());
        }
    }

    let mut visited: HashSet<ModuleName> = HashSet::new();
    for start in undirected.keys() {
        if visited.contains(start) {
            continue;
        }
        let mut component = HashSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(node) = queue.pop_front() {
            if !component.insert(node.clone()) {
                continue;
            }
            visited.insert(node.clone());
            if let Some(neighbors) = undirected.get(&node) {
                for n in neighbors {
                    if !component.contains(n) {
                        queue.push_back(n.clone());
                    }
                }
            }
        }

        let sources: Vec<ModuleName> = component
            .iter()
            .filter(|name| {
                dependencies
                    .get(*name)
                    .map(|deps| deps.iter().all(|d| !component.contains(d)))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if sources.len() > 1 {
            return Err(RegistryError::AmbiguousProducer(sort(sources)));
        }
    }

    Ok(())
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
    fn accepts_well_formed_catalog() {
        let map = deps(&[
            ("enumerator", &[]),
            ("resolver", &["enumerator"]),
            ("prober", &["enumerator"]),
            ("crawler", &[]),
        ]);
        assert!(validate_catalog(&map).is_ok());
    }

    #[test]
    fn rejects_cycle() {
        let map = deps(&[("a", &["b"]), ("b", &["a"])]);
        assert!(matches!(
            validate_catalog(&map),
            Err(RegistryError::Cycle(_))
        ));
    }

    #[test]
    fn rejects_ambiguous_component() {
        let map = deps(&[("a", &[]), ("b", &[]), ("c", &["a", "b"])]);
        assert!(matches!(
            validate_catalog(&map),
            Err(RegistryError::AmbiguousProducer(_))
        ));
    }

    #[test]
    fn unrelated_components_may_each_have_their_own_producer() {
        let map = deps(&[
            ("enumerator", &[]),
            ("resolver", &["enumerator"]),
            ("crawler", &[]),
            ("link_extractor", &["crawler"]),
        ]);
        assert!(validate_catalog(&map).is_ok());
    }
}
