use sha2::{Digest, Sha256};
use weft_config::{GraphSpec, WorkflowSpec};
use weft_workflow::Graph;

/// Hex sha256 of the source table, the bundle's cache key.
pub fn csv_hash(source: &[u8]) -> String {
  format!("{:x}", Sha256::digest(source))
}

/// Hash of the graph structure.
///
/// Unlike [`csv_hash`] this ignores formatting of the source: two tables
/// that produce the same nodes and edges share a version hash.
pub fn version_hash(graph: &Graph) -> Result<String, serde_json::Error> {
  let mut hasher = Sha256::new();
  hasher.update(graph.entry_point.as_deref().unwrap_or_default().as_bytes());
  hasher.update([0u8]);
  for (name, node) in &graph.nodes {
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    // BTreeMap-backed nodes serialize in a stable order.
    hasher.update(serde_json::to_vec(&node.stripped())?);
    hasher.update([0u8]);
  }
  Ok(format!("{:x}", hasher.finalize()))
}

/// Name given to a workflow whose rows carry no workflow name.
pub fn synthetic_graph_name(csv_hash: &str) -> String {
  let prefix: String = csv_hash.chars().take(12).collect();
  format!("graph-{}", prefix)
}

/// Look up a workflow by name. The synthetic name of an unnamed workflow
/// resolves to that workflow.
pub fn find_workflow<'a>(
  spec: &'a GraphSpec,
  name: &str,
  csv_hash: &str,
) -> Option<&'a WorkflowSpec> {
  spec.workflow(name).or_else(|| {
    if name == synthetic_graph_name(csv_hash) {
      spec.workflows().iter().find(|w| w.name.trim().is_empty())
    } else {
      None
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use weft_workflow::{EdgeLabel, Node, RuntimeHandle};

  #[test]
  fn test_csv_hash_is_stable_and_sensitive() {
    let source = b"graph,node\nflow,a\n";
    assert_eq!(csv_hash(source), csv_hash(source));
    assert_eq!(csv_hash(source).len(), 64);
    assert_ne!(csv_hash(source), csv_hash(b"graph,node\nflow,b\n"));
  }

  #[test]
  fn test_version_hash_tracks_structure() {
    let mut graph = Graph::new("flow");
    graph.add_node(Node::new("a", "echo").with_edge(EdgeLabel::Success, "b"));
    graph.add_node(Node::new("b", "echo"));
    graph.entry_point = Some("a".to_string());
    let before = version_hash(&graph).unwrap();

    assert_eq!(before, version_hash(&graph.clone()).unwrap());

    // the runtime slot never contributes
    let mut bound = graph.clone();
    if let Some(node) = bound.get_node_mut("a") {
      node.context.set_runtime(RuntimeHandle::new(42u8));
    }
    assert_eq!(before, version_hash(&bound).unwrap());

    graph.add_node(Node::new("c", "echo"));
    assert_ne!(before, version_hash(&graph).unwrap());
  }

  #[test]
  fn test_synthetic_name() {
    let hash = csv_hash(b"x");
    let name = synthetic_graph_name(&hash);
    assert_eq!(name, format!("graph-{}", &hash[..12]));
  }
}
