use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Error type for topology operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError<K: Debug + Clone> {
    /// The nodes in `path` form a cycle; the first node is repeated at the end.
    CycleDetected { path: Vec<K> },
}

impl<K: Debug + Clone> std::fmt::Display for TopologyError<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyError::CycleDetected { path } => {
                write!(f, "Cycle detected: ")?;
                for (i, node) in path.iter().enumerate() {
                    if i > 0 {
                        write!(f, " -> ")?;
                    }
                    write!(f, "{:?}", node)?;
                }
                Ok(())
            }
        }
    }
}

impl<K: Debug + Clone> std::error::Error for TopologyError<K> {}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Frame<K> {
    node: K,
    dependencies: Vec<K>,
    next: usize,
}

/// Dependency-first depth-first ordering.
///
/// Roots are visited in the order given and each node's dependencies in the
/// order `get_dependencies` returns them, so the result is deterministic:
/// every node appears after all of its dependencies, and unrelated nodes keep
/// their relative root order. Dependencies that are not themselves roots are
/// still visited, so passing a single root yields its ancestors.
///
/// The traversal keeps an explicit stack, so deep chains do not recurse.
pub fn topological_sort<K>(
    roots: impl IntoIterator<Item = K>,
    get_dependencies: impl Fn(&K) -> Vec<K>,
) -> Result<Vec<K>, TopologyError<K>>
where
    K: Hash + Eq + Clone + Debug,
{
    let mut marks: HashMap<K, Mark> = HashMap::new();
    let mut sorted = Vec::new();

    for root in roots {
        if marks.contains_key(&root) {
            continue;
        }
        marks.insert(root.clone(), Mark::Visiting);
        let mut stack = vec![Frame {
            dependencies: get_dependencies(&root),
            node: root,
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next == frame.dependencies.len() {
                if let Some(done) = stack.pop() {
                    marks.insert(done.node.clone(), Mark::Done);
                    sorted.push(done.node);
                }
                continue;
            }

            let dependency = frame.dependencies[frame.next].clone();
            frame.next += 1;

            match marks.get(&dependency) {
                Some(Mark::Done) => {}
                Some(Mark::Visiting) => {
                    let start = stack
                        .iter()
                        .position(|f| f.node == dependency)
                        .unwrap_or(0);
                    let mut path: Vec<K> = stack[start..].iter().map(|f| f.node.clone()).collect();
                    path.push(dependency);
                    return Err(TopologyError::CycleDetected { path });
                }
                None => {
                    marks.insert(dependency.clone(), Mark::Visiting);
                    stack.push(Frame {
                        dependencies: get_dependencies(&dependency),
                        node: dependency,
                        next: 0,
                    });
                }
            }
        }
    }

    Ok(sorted)
}
