//=========================================================================
// Attachment
//=========================================================================
//
// Host-side ownership tree for the nodes of one entity.
//
// An attachment is a named container of nodes with nested children,
// standing in for an entity's object hierarchy. The connector discovers
// its nodes by walking the tree depth-first. Detaching a node drops the
// tree's strong reference, which makes the node "gone" for every weak
// holder (dispatch caches, scene index).
//
//=========================================================================

use super::{node, same_node, Node, NodeRef};

//=== Attachment ==========================================================

#[derive(Default)]
pub struct Attachment {
    name: String,
    nodes: Vec<NodeRef>,
    children: Vec<Attachment>,
}

impl Attachment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    //--- Building ---------------------------------------------------------

    pub fn with_node<N: Node>(mut self, value: N) -> Self {
        self.nodes.push(node(value));
        self
    }

    pub fn with_node_ref(mut self, node: NodeRef) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_child(mut self, child: Attachment) -> Self {
        self.children.push(child);
        self
    }

    //--- Mutation ---------------------------------------------------------

    pub fn attach(&mut self, node: NodeRef) {
        self.nodes.push(node);
    }

    pub fn attach_child(&mut self, child: Attachment) {
        self.children.push(child);
    }

    /// Removes `node` from this attachment or any descendant.
    pub fn detach(&mut self, node: &NodeRef) -> bool {
        if let Some(pos) = self.nodes.iter().position(|n| same_node(n, node)) {
            self.nodes.remove(pos);
            return true;
        }
        self.children.iter_mut().any(|child| child.detach(node))
    }

    /// Removes the first direct child called `name`, with its whole subtree.
    pub fn detach_child(&mut self, name: &str) -> Option<Attachment> {
        let pos = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(pos))
    }

    //--- Traversal --------------------------------------------------------

    /// Appends every node in the subtree, depth-first, own nodes first.
    pub fn collect(&self, out: &mut Vec<NodeRef>) {
        out.extend(self.nodes.iter().cloned());
        for child in &self.children {
            child.collect(out);
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len() + self.children.iter().map(Attachment::node_count).sum::<usize>()
    }

    pub fn child(&self, name: &str) -> Option<&Attachment> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Attachment> {
        self.children.iter_mut().find(|c| c.name == name)
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::node_as;
    use std::rc::Rc;

    struct Marker(u8);
    impl Node for Marker {}

    #[test]
    fn collect_walks_depth_first() {
        let tree = Attachment::new("root")
            .with_node(Marker(1))
            .with_child(
                Attachment::new("arm")
                    .with_node(Marker(2))
                    .with_child(Attachment::new("hand").with_node(Marker(3))),
            )
            .with_child(Attachment::new("leg").with_node(Marker(4)));

        let mut out = Vec::new();
        tree.collect(&mut out);

        let order: Vec<u8> = out
            .iter()
            .map(|n| {
                let guard = n.borrow();
                node_as::<Marker>(&*guard).map(|m| m.0).unwrap_or(0)
            })
            .collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn detach_drops_the_strong_reference() {
        let shared = node(Marker(9));
        let weak = Rc::downgrade(&shared);

        let mut tree = Attachment::new("root")
            .with_child(Attachment::new("deep").with_node_ref(Rc::clone(&shared)));
        drop(shared);
        assert!(weak.upgrade().is_some());

        let handle = weak.upgrade().unwrap();
        assert!(tree.detach(&handle));
        drop(handle);

        assert!(weak.upgrade().is_none());
        assert_eq!(tree.node_count(), 0);
    }

    #[test]
    fn detach_child_removes_subtree() {
        let mut tree = Attachment::new("root")
            .with_child(Attachment::new("a").with_node(Marker(1)))
            .with_child(Attachment::new("b").with_node(Marker(2)));

        let removed = tree.detach_child("a").unwrap();
        assert_eq!(removed.name(), "a");
        assert!(tree.child("a").is_none());
        assert_eq!(tree.node_count(), 1);
        assert!(tree.detach_child("missing").is_none());
    }
}
