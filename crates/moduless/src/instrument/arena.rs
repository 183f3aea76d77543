//! Flat syntax tree with parent links.
//!
//! tree-sitter nodes borrow the tree and cannot be stored next to edits, so
//! the parse is copied once into an arena: nodes in pre-order, each carrying
//! its parent index and the field name it occupies in that parent.

use tree_sitter::Parser;

use crate::result::{ModulessError, ModulessResult};

/// Index of a node in a [`SyntaxArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// One syntax node
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    /// Grammar kind, e.g. `function_declaration`
    pub kind: &'static str,
    /// Byte offset of the first byte
    pub start: usize,
    /// Byte offset one past the last byte
    pub end: usize,
    /// Field this node fills in its parent, if any
    pub field: Option<&'static str>,
    /// Whether the node is named in the grammar (not punctuation)
    pub named: bool,
    /// Parent node; `None` for the root
    pub parent: Option<NodeId>,
    /// Children in source order
    pub children: Vec<NodeId>,
}

/// A parsed script as an arena of nodes
#[derive(Debug)]
pub struct SyntaxArena {
    nodes: Vec<SyntaxNode>,
    has_error: bool,
}

impl SyntaxArena {
    /// Parse JavaScript source
    pub fn parse(source: &str) -> ModulessResult<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .map_err(|err| ModulessError::instrumentation(format!("grammar: {err}")))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ModulessError::instrumentation("parser produced no tree"))?;

        let mut nodes: Vec<SyntaxNode> = Vec::new();
        let mut parents: Vec<NodeId> = Vec::new();
        let mut cursor = tree.walk();

        loop {
            let node = cursor.node();
            let id = NodeId(nodes.len());
            let parent = parents.last().copied();
            nodes.push(SyntaxNode {
                kind: node.kind(),
                start: node.start_byte(),
                end: node.end_byte(),
                field: cursor.field_name(),
                named: node.is_named(),
                parent,
                children: Vec::new(),
            });
            if let Some(NodeId(p)) = parent {
                nodes[p].children.push(id);
            }

            if cursor.goto_first_child() {
                parents.push(id);
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return Ok(Self {
                        nodes,
                        has_error: tree.root_node().has_error(),
                    });
                }
                parents.pop();
            }
        }
    }

    /// Whether the parser had to recover from a syntax error
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.has_error
    }

    /// The program node
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Borrow a node
    #[must_use]
    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.0]
    }

    /// Every node in pre-order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Source text of a node
    #[must_use]
    pub fn text<'s>(&self, id: NodeId, source: &'s str) -> &'s str {
        let node = self.node(id);
        &source[node.start..node.end]
    }

    /// First child filling the given field
    #[must_use]
    pub fn child_by_field(&self, id: NodeId, field: &str) -> Option<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .find(|child| self.node(*child).field == Some(field))
    }

    /// Named children, skipping punctuation and comments
    pub fn named_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(|child| self.node(*child).named && self.node(*child).kind != "comment")
    }

    /// Parent chain, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, |current| self.node(*current).parent)
    }

    /// Whether any child token has the given kind, e.g. `async`
    #[must_use]
    pub fn has_token(&self, id: NodeId, kind: &str) -> bool {
        self.node(id)
            .children
            .iter()
            .any(|child| self.node(*child).kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parents_and_fields() {
        let source = "function coverA() { return 1; }";
        let arena = SyntaxArena::parse(source).unwrap();
        assert!(!arena.has_error());

        let decl = arena
            .ids()
            .find(|id| arena.node(*id).kind == "function_declaration")
            .unwrap();
        assert_eq!(arena.node(decl).parent, Some(arena.root()));

        let name = arena.child_by_field(decl, "name").unwrap();
        assert_eq!(arena.text(name, source), "coverA");
        assert_eq!(arena.ancestors(name).next(), Some(decl));
    }

    #[test]
    fn test_preorder_ranges_nest() {
        let source = "const f = () => { g(1, [2]); };";
        let arena = SyntaxArena::parse(source).unwrap();
        for id in arena.ids() {
            if let Some(parent) = arena.node(id).parent {
                assert!(parent < id);
                assert!(arena.node(parent).start <= arena.node(id).start);
                assert!(arena.node(id).end <= arena.node(parent).end);
            }
        }
    }

    #[test]
    fn test_error_is_reported() {
        let arena = SyntaxArena::parse("function (").unwrap();
        assert!(arena.has_error());
    }
}
