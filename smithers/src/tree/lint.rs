//! Serializer misuse warnings (spec §4.3).
//!
//! Attaches a `warnings` note to any node whose type is in the known set but
//! whose parent's type is neither `ROOT` nor a known type — a hint that the
//! author nested a plan-tree node somewhere it wasn't meant to go. Purely
//! advisory: warnings never change the XML a node produces.

use super::node::{Node, KNOWN_TYPES, ROOT};

/// Walks the tree in place, filling each node's `warnings` list.
pub fn attach_nesting_warnings(root: &mut Node) {
    walk(root, None);
}

fn walk(node: &mut Node, parent_type: Option<&str>) {
    node.warnings.clear();
    if let Some(parent_type) = parent_type {
        let node_known = KNOWN_TYPES.contains(&node.node_type.to_lowercase().as_str());
        let parent_known =
            parent_type == ROOT || KNOWN_TYPES.contains(&parent_type.to_lowercase().as_str());
        if node_known && !parent_known {
            node.warnings.push(format!(
                "node type `{}` nested under unrecognised parent type `{}`",
                node.node_type, parent_type
            ));
        }
    }

    let this_type = node.node_type.clone();
    for child in &mut node.children {
        walk(child, Some(&this_type));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::Node;

    #[test]
    fn warns_when_known_type_nested_under_unknown_parent() {
        let mut tree = Node::new("widget").with_child(Node::new("claude"));
        attach_nesting_warnings(&mut tree);
        assert_eq!(tree.children[0].warnings.len(), 1);
        assert!(tree.children[0].warnings[0].contains("claude"));
    }

    #[test]
    fn no_warning_under_root_or_known_parent() {
        let mut tree = Node::new(super::ROOT)
            .with_child(Node::new("claude"))
            .with_child(Node::new("phase").with_child(Node::new("human")));
        attach_nesting_warnings(&mut tree);
        assert!(tree.children[0].warnings.is_empty());
        assert!(tree.children[1].children[0].warnings.is_empty());
    }

    #[test]
    fn warnings_never_affect_serialized_xml() {
        use crate::tree::xml::to_canonical_xml;
        let mut tree = Node::new("widget").with_child(Node::new("claude"));
        let before = to_canonical_xml(&tree);
        attach_nesting_warnings(&mut tree);
        let after = to_canonical_xml(&tree);
        assert_eq!(before, after);
    }
}
