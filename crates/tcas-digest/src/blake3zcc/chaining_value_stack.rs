use super::{compress, concatenate, truncate, Node, BLOCK_LEN, IV, PARENT};

/// BLAKE3's chaining value stack (section 5.1.2).
///
/// Starts out as an empty Merkle tree. Nodes are appended on the right hand
/// side, and completed subtrees are merged into parent nodes right away, so
/// only a logarithmic number of chaining values is retained.
#[derive(Debug, Clone, Default)]
pub struct ChainingValueStack {
    stack: Vec<[u32; 8]>,
    total_nodes: u64,
}

impl ChainingValueStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node on the right hand side of the tree.
    pub fn append_node(&mut self, node: &Node) {
        let mut cv = node.chaining_value();
        let mut total = self.total_nodes;
        while total & 1 != 0 {
            let Some(left) = self.stack.pop() else {
                break;
            };
            cv = truncate(compress(
                &IV,
                &concatenate(&left, &cv),
                0,
                BLOCK_LEN as u32,
                PARENT,
            ));
            total >>= 1;
        }
        self.stack.push(cv);
        self.total_nodes += 1;
    }

    /// Terminate the tree with `last` and return its root node.
    pub fn root_node(&self, last: &Node) -> Node {
        self.stack.iter().rev().fold(*last, |node, left| {
            Node::parent(concatenate(left, &node.chaining_value()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stack_returns_last_node() {
        let last = Node::chunk(IV, [1; 16], 4, true);
        assert_eq!(ChainingValueStack::new().root_node(&last), last);
    }

    #[test]
    fn two_nodes_become_one_parent() {
        let a = Node::chunk(IV, [1; 16], 64, false);
        let b = Node::chunk(IV, [2; 16], 64, false);
        let mut stack = ChainingValueStack::new();
        stack.append_node(&a);
        let root = stack.root_node(&b);
        assert_eq!(
            root,
            Node::parent(concatenate(&a.chaining_value(), &b.chaining_value()))
        );

        // Appending both collapses them into a single stack entry.
        stack.append_node(&b);
        assert_eq!(stack.stack.len(), 1);
        assert_eq!(stack.stack[0], root.chaining_value());
    }

    #[test]
    fn stack_depth_follows_popcount() {
        let node = Node::chunk(IV, [3; 16], 64, false);
        let mut stack = ChainingValueStack::new();
        for n in 1..=37u64 {
            stack.append_node(&node);
            assert_eq!(stack.stack.len() as u32, n.count_ones());
        }
    }
}
