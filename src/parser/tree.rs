use serde_json::{Map, Value};

/// Parsed form of an embedded blob or the canonical page data.
pub type DataTree = Value;

/// A container node reached while walking a [`DataTree`].
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Mapping(&'a Map<String, Value>),
    Sequence(&'a [Value]),
}

impl<'a> Node<'a> {
    /// Scalar children of this node (strings, numbers, bools).
    pub fn scalars(self) -> impl Iterator<Item = &'a Value> {
        let children: Box<dyn Iterator<Item = &'a Value>> = match self {
            Node::Mapping(map) => Box::new(map.values()),
            Node::Sequence(items) => Box::new(items.iter()),
        };
        children.filter(|v| !v.is_object() && !v.is_array())
    }
}

/// Value shapes the key-based finders can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Text,
    Number,
    Bool,
    Mapping,
    Sequence,
}

impl Kind {
    pub fn of(value: &Value) -> Option<Kind> {
        match value {
            Value::String(_) => Some(Kind::Text),
            Value::Number(_) => Some(Kind::Number),
            Value::Bool(_) => Some(Kind::Bool),
            Value::Object(_) => Some(Kind::Mapping),
            Value::Array(_) => Some(Kind::Sequence),
            Value::Null => None,
        }
    }
}

#[cfg(test)]
pub const SCALAR_OR_CONTAINER: &[Kind] = &[Kind::Text, Kind::Number, Kind::Mapping, Kind::Sequence];

/// Lazy depth-first walk over every mapping and sequence reachable from a root,
/// root included. Each call starts from scratch; nothing is shared between walks.
pub struct Walk<'a> {
    stack: Vec<&'a Value>,
}

pub fn walk(root: &Value) -> Walk<'_> {
    Walk { stack: vec![root] }
}

impl<'a> Iterator for Walk<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        while let Some(value) = self.stack.pop() {
            match value {
                Value::Object(map) => {
                    // Reverse push keeps pre-order in document order.
                    let containers: Vec<&Value> = map
                        .values()
                        .filter(|v| v.is_object() || v.is_array())
                        .collect();
                    self.stack.extend(containers.into_iter().rev());
                    return Some(Node::Mapping(map));
                }
                Value::Array(items) => {
                    self.stack.extend(
                        items
                            .iter()
                            .rev()
                            .filter(|v| v.is_object() || v.is_array()),
                    );
                    return Some(Node::Sequence(items));
                }
                _ => continue,
            }
        }
        None
    }
}

/// Every mapping reachable from `root`, in walk order.
pub fn mappings(root: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    walk(root).filter_map(|node| match node {
        Node::Mapping(map) => Some(map),
        Node::Sequence(_) => None,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn visits_root_and_nested_containers_depth_first() {
        let tree = json!({"a": {"b": [1, {"c": 2}]}, "d": {"e": 3}});
        let shapes: Vec<&str> = walk(&tree)
            .map(|n| match n {
                Node::Mapping(m) if m.contains_key("a") => "root",
                Node::Mapping(m) if m.contains_key("b") => "a",
                Node::Mapping(m) if m.contains_key("c") => "b[1]",
                Node::Mapping(m) if m.contains_key("e") => "d",
                Node::Sequence(_) => "b",
                Node::Mapping(_) => "?",
            })
            .collect();
        assert_eq!(shapes, vec!["root", "a", "b", "b[1]", "d"]);
    }

    #[test]
    fn scalar_root_yields_nothing() {
        assert_eq!(walk(&json!("text")).count(), 0);
        assert_eq!(walk(&json!(null)).count(), 0);
    }

    #[test]
    fn walk_is_restartable() {
        let tree = json!([{"x": 1}, {"y": [2]}]);
        assert_eq!(walk(&tree).count(), walk(&tree).count());
        assert_eq!(walk(&tree).count(), 4);
    }

    #[test]
    fn scalars_skip_containers() {
        let tree = json!({"a": "x", "b": {"c": 1}, "d": 2});
        let node = walk(&tree).next().unwrap();
        assert_eq!(node.scalars().count(), 2);
    }
}
