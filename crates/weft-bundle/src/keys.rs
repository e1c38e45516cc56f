//! Storage layout.
//!
//! ```text
//! bundles/{csv_hash}/{graph}.json
//! compiled/{graph}.json
//! ```

/// Key of the bundle for `graph` built from a source hashing to `csv_hash`.
pub fn bundle_key(csv_hash: &str, graph: &str) -> String {
  format!("bundles/{}/{}.json", sanitize(csv_hash), sanitize(graph))
}

/// Key of the precompiled artifact for `graph`.
pub fn compiled_key(graph: &str) -> String {
  format!("compiled/{}.json", sanitize(graph))
}

/// Keep key segments to one path component.
fn sanitize(segment: &str) -> String {
  let cleaned: String = segment
    .chars()
    .map(|c| match c {
      'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
      _ => '_',
    })
    .collect();

  if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
    format!("_{}", cleaned)
  } else {
    cleaned
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys() {
    assert_eq!(bundle_key("abc123", "TestGraph"), "bundles/abc123/TestGraph.json");
    assert_eq!(compiled_key("TestGraph"), "compiled/TestGraph.json");
  }

  #[test]
  fn test_keys_cannot_escape_their_directory() {
    assert_eq!(compiled_key("../etc/passwd"), "compiled/.._etc_passwd.json");
    assert_eq!(compiled_key(".."), "compiled/_...json");
    assert_eq!(compiled_key("my flow"), "compiled/my_flow.json");
  }
}
