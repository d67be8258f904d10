//! Hierarchical menu model.

use super::sort::{Sorter, Weighted};
use applib_core::DEFAULT_WEIGHT;

/// One level of a menu path.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuNode {
    label: String,
    weight: i64,
    action: Option<String>,
    children: Vec<MenuNode>,
}

impl MenuNode {
    fn container(label: &str) -> Self {
        Self {
            label: label.to_string(),
            weight: DEFAULT_WEIGHT,
            action: None,
            children: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn weight(&self) -> i64 {
        self.weight
    }

    /// Click action, set only on nodes declared as the end of a path.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn children(&self) -> &[MenuNode] {
        &self.children
    }

    pub fn child(&self, label: &str) -> Option<&MenuNode> {
        self.children.iter().find(|c| c.label == label)
    }
}

impl Weighted for MenuNode {
    fn weight(&self) -> i64 {
        self.weight
    }
}

/// The whole menu bar; top-level entries are the roots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuTree {
    roots: Vec<MenuNode>,
}

impl MenuTree {
    pub fn roots(&self) -> &[MenuNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Node at `path`, if it has been declared.
    pub fn node<S: AsRef<str>>(&self, path: &[S]) -> Option<&MenuNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.iter().find(|n| n.label == first.as_ref())?;
        for label in rest {
            node = node.child(label.as_ref())?;
        }
        Some(node)
    }

    /// Children listed under `parent`; the empty path names the roots.
    pub fn children_of<S: AsRef<str>>(&self, parent: &[S]) -> Option<&[MenuNode]> {
        if parent.is_empty() {
            return Some(&self.roots);
        }
        self.node(parent).map(MenuNode::children)
    }

    /// Create or update the node at `path`.
    ///
    /// Returns the parent paths whose child lists were re-sorted, deepest
    /// first. `path` must not be empty.
    pub(crate) fn declare<S: AsRef<str>>(
        &mut self,
        path: &[S],
        weight: i64,
        action: &str,
        sorter: &Sorter<'_>,
    ) -> Vec<Vec<String>> {
        let mut prefix = Vec::new();
        let mut changed = Vec::new();
        declare_in(&mut self.roots, &mut prefix, path, weight, action, sorter, &mut changed);
        changed
    }
}

fn declare_in<S: AsRef<str>>(
    siblings: &mut Vec<MenuNode>,
    prefix: &mut Vec<String>,
    path: &[S],
    weight: i64,
    action: &str,
    sorter: &Sorter<'_>,
    changed: &mut Vec<Vec<String>>,
) {
    let Some((label, rest)) = path.split_first() else {
        return;
    };
    let label = label.as_ref();

    let (index, created) = match siblings.iter().position(|n| n.label == label) {
        Some(index) => (index, false),
        None => {
            siblings.push(MenuNode::container(label));
            (siblings.len() - 1, true)
        }
    };

    let node = &mut siblings[index];
    let updated = if rest.is_empty() {
        node.weight = weight;
        node.action = Some(action.to_string());
        true
    } else {
        prefix.push(label.to_string());
        declare_in(&mut node.children, prefix, rest, weight, action, sorter, changed);
        prefix.pop();
        false
    };

    if created || updated {
        sorter.arrange(siblings);
        changed.push(prefix.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::sort::{NativeAscending, SortDirection};

    fn sorter() -> Sorter<'static> {
        Sorter {
            direction: SortDirection::Ascending,
            host: &NativeAscending,
        }
    }

    fn labels(nodes: &[MenuNode]) -> Vec<&str> {
        nodes.iter().map(MenuNode::label).collect()
    }

    #[test]
    fn intermediate_nodes_are_plain_containers() {
        let mut tree = MenuTree::default();
        tree.declare(&["File", "Submenu", "Quit"], 100, "quit", &sorter());

        let file = tree.node(&["File"]).unwrap();
        assert_eq!(file.weight(), DEFAULT_WEIGHT);
        assert_eq!(file.action(), None);
        let quit = tree.node(&["File", "Submenu", "Quit"]).unwrap();
        assert_eq!(quit.weight(), 100);
        assert_eq!(quit.action(), Some("quit"));
    }

    #[test]
    fn redeclaring_updates_in_place() {
        let mut tree = MenuTree::default();
        let s = sorter();
        tree.declare(&["Edit", "Copy"], 10, "copy()", &s);
        tree.declare(&["Edit", "Copy"], 70, "copy2()", &s);
        tree.declare(&["Edit", "Copy"], 30, "copy3()", &s);

        let edit = tree.node(&["Edit"]).unwrap();
        assert_eq!(edit.children().len(), 1);
        let copy = &edit.children()[0];
        assert_eq!(copy.weight(), 30);
        assert_eq!(copy.action(), Some("copy3()"));
    }

    #[test]
    fn reports_resorted_parents() {
        let mut tree = MenuTree::default();
        let s = sorter();
        let changed = tree.declare(&["File", "Open"], 10, "open()", &s);
        assert_eq!(changed, vec![vec!["File".to_string()], vec![]]);

        // Existing intermediate, new leaf: only the leaf's list is touched.
        let changed = tree.declare(&["File", "Save"], 20, "save()", &s);
        assert_eq!(changed, vec![vec!["File".to_string()]]);
    }

    #[test]
    fn garbage_scenario_orders_by_weight() {
        let mut tree = MenuTree::default();
        let s = sorter();
        tree.declare(&["Edit", "Garbage", "Number900"], 900, "alert(2);", &s);
        tree.declare(&["Edit", "Garbage", "Number50"], 50, "alert(2);", &s);
        tree.declare(&["Edit", "Garbage", "Number0"], 0, "alert(2);", &s);

        let garbage = tree.children_of(&["Edit", "Garbage"]).unwrap();
        assert_eq!(labels(garbage), vec!["Number0", "Number50", "Number900"]);
    }

    #[test]
    fn promoting_a_container_resorts_its_siblings() {
        let mut tree = MenuTree::default();
        let s = sorter();
        tree.declare(&["File", "Submenu", "Quit"], 100, "quit", &s);
        tree.declare(&["File", "Address Book"], 50, "book", &s);
        assert_eq!(labels(tree.children_of(&["File"]).unwrap()), vec!["Address Book", "Submenu"]);

        tree.declare(&["File", "Submenu"], 10, "sub", &s);
        assert_eq!(labels(tree.children_of(&["File"]).unwrap()), vec!["Submenu", "Address Book"]);
        assert_eq!(tree.node(&["File", "Submenu"]).unwrap().children().len(), 1);
    }
}
