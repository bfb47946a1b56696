//! Small accessors over KDL nodes.
//!
//! Settings are written as child nodes whose positional arguments carry the
//! value, e.g. `smtp-port 465` or `recipients "a@x" "b@x"`.

use kdl::{KdlNode, KdlValue};

/// Find the first child node called `name`.
pub fn get_child<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlNode> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)
}

/// All child nodes called `name`, in document order.
pub fn get_children<'a>(node: &'a KdlNode, name: &'a str) -> impl Iterator<Item = &'a KdlNode> {
    node.children()
        .into_iter()
        .flat_map(|doc| doc.nodes().iter())
        .filter(move |child| child.name().value() == name)
}

/// Positional (unnamed) arguments of a node.
pub fn args(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|entry| entry.name().is_none())
        .map(|entry| entry.value())
}

/// First positional argument of a node, if it is a string.
pub fn get_first_arg_string(node: &KdlNode) -> Option<String> {
    args(node).next()?.as_string().map(str::to_string)
}

/// String value of the child node `name`.
pub fn get_string_entry(node: &KdlNode, name: &str) -> Option<String> {
    get_child(node, name).and_then(get_first_arg_string)
}

/// Integer value of the child node `name`.
pub fn get_int_entry(node: &KdlNode, name: &str) -> Option<i128> {
    args(get_child(node, name)?).next()?.as_integer()
}

/// Every string argument of the child node `name`.
pub fn get_string_list_entry(node: &KdlNode, name: &str) -> Vec<String> {
    get_child(node, name)
        .map(|child| {
            args(child)
                .filter_map(|v| v.as_string().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdl::KdlDocument;

    fn node(doc: &KdlDocument) -> &KdlNode {
        &doc.nodes()[0]
    }

    #[test]
    fn test_entry_accessors() {
        let doc: KdlDocument = r#"
            block {
                name "value"
                port 465
                list "a" "b" "c"
            }
        "#
        .parse()
        .unwrap();
        let block = node(&doc);

        assert_eq!(get_string_entry(block, "name"), Some("value".to_string()));
        assert_eq!(get_int_entry(block, "port"), Some(465));
        assert_eq!(get_string_list_entry(block, "list"), vec!["a", "b", "c"]);
        assert_eq!(get_string_entry(block, "missing"), None);
        assert!(get_string_list_entry(block, "missing").is_empty());
    }

    #[test]
    fn test_repeated_children() {
        let doc: KdlDocument = r#"
            block {
                env "A" "1"
                env "B" "2"
            }
        "#
        .parse()
        .unwrap();

        let names: Vec<String> = get_children(node(&doc), "env")
            .filter_map(get_first_arg_string)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
