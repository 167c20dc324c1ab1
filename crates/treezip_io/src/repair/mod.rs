//! An implementation of TreeRePair http://www.eti.uni-siegen.de/ti/veroeffentlichungen/12-repair.pdf
//!
//! The AST is lowered onto a ranked tree; the engine then mines the most
//! frequent digram (parent label, child position, child label), replaces
//! its occurrences with a fresh nonterminal and repeats until no digram
//! occurs more than once. Each nonterminal becomes a meta-rule whose body
//! is parameterized over its leaf holes.

pub mod digrams;
pub mod read;
pub mod tree;
pub mod write;

use crate::repair::digrams::{Digram, DigramIndex};
use crate::repair::tree::{
    GeneratedLabel, GenericCounter, Label, NodeIndex, Tree,
};
use crate::TokenWriterError;

/// A meta-rule synthesized by pattern extraction.
#[derive(Debug)]
pub struct Rule {
    pub label: GeneratedLabel,
    /// Number of formal parameters.
    pub arity: usize,
    /// The body tree, parameterized over `Label::Parameter` leaves.
    /// Lives in the same arena as the start tree.
    pub body: NodeIndex,
}

/// The output of the mining loop: a start tree plus the meta-rules it
/// references, in discovery order.
pub struct Compressed {
    pub tree: Tree,
    pub start: NodeIndex,
    pub rules: Vec<Rule>,
}

/// Build the body of the nonterminal replacing `digram`: a `parent`
/// node whose child at `digram.position` is a `child` node, every other
/// leaf a parameter. Formals are assigned positionally, the remaining
/// parent children first, then the child's children.
fn build_body(tree: &mut Tree, digram: &Digram) -> NodeIndex {
    let parent_arity = digram.parent.arity();
    let child_arity = digram.child.arity();

    let child_children = (0..child_arity)
        .map(|k| tree.add_leaf(Label::Parameter(parent_arity - 1 + k)))
        .collect();
    let child = tree.add_node(digram.child.clone(), child_children);

    let mut parent_children = Vec::with_capacity(parent_arity);
    for position in 0..parent_arity {
        if position == digram.position {
            parent_children.push(child);
        } else {
            let formal = if position < digram.position {
                position
            } else {
                position - 1
            };
            parent_children.push(tree.add_leaf(Label::Parameter(formal)));
        }
    }
    tree.add_node(digram.parent.clone(), parent_children)
}

/// Run the mining loop over `tree`, starting from `start`, until no
/// digram occurs more than once.
pub fn compress(mut tree: Tree, start: NodeIndex) -> Result<Compressed, TokenWriterError> {
    let mut index = DigramIndex::new();
    index.build(&tree, start);

    let mut generated_label_counter: GenericCounter<GeneratedLabel> = GenericCounter::new();
    let mut rules = vec![];

    while let Some(digram_id) = index.pop() {
        let digram = index.digram(digram_id).clone();
        let number_of_children = digram.parent.arity() + digram.child.arity() - 1;
        debug!(target: "repair", "Replacing digram {:?} with {} occurrences",
            digram, index.count(digram_id));

        let label = generated_label_counter.next();
        let generated = Label::Generated {
            label,
            arity: number_of_children,
        };
        let body = build_body(&mut tree, &digram);
        rules.push(Rule {
            label,
            arity: number_of_children,
            body,
        });

        'per_node: for occurrence in index.snapshot(digram_id) {
            if !index.is_active(occurrence) {
                // A previous substitution in this round consumed it.
                continue 'per_node;
            }
            let (instance, position) = index.site(occurrence);
            if *tree.label(instance) != digram.parent
                || *tree.label(tree.child(instance, position)) != digram.child
            {
                // The node has been rewritten, the digram doesn't apply anymore.
                debug_assert!(false, "An active occurrence should still match its digram");
                continue 'per_node;
            }

            let removed = tree.child(instance, position);

            // The labels of `instance` change and `removed` disappears:
            // every digram either one participates in is now invalid.
            index.remove_parent_roles(instance);
            index.remove_child_role(&tree, instance);
            index.remove_parent_roles(removed);

            // Keep the other children of `instance` in original order,
            // then inline the children of `removed`.
            let mut children = Vec::with_capacity(number_of_children);
            for (i, child) in tree.children(instance).iter().enumerate() {
                if i != position {
                    children.push(*child);
                }
            }
            children.extend(tree.children(removed).iter());

            if children.len() != number_of_children {
                return Err(TokenWriterError::InternalInvariant(format!(
                    "Expected {} grandchildren while replacing {:?}, found {}",
                    number_of_children,
                    digram,
                    children.len()
                )));
            }

            tree.set_children(removed, vec![]);
            tree.set_children(instance, children);
            tree.set_label(instance, generated.clone());
            index.reset_slots(instance, number_of_children);

            // The rewrite replaced every digram around `instance`: the
            // edges to its new children, and the edge from its parent.
            for i in 0..number_of_children {
                index.register_edge(&tree, instance, i);
            }
            if let Some((parent, parent_position)) = tree.parent(instance) {
                index.register_edge(&tree, parent, parent_position);
            }
        }
    }

    tree.sanity_check(start)?;
    debug!(target: "repair", "Mining produced {} rules, start tree down to {} nodes",
        rules.len(), tree.reachable_len(start));
    Ok(Compressed { tree, start, rules })
}

#[cfg(test)]
mod tests {
    use super::tree::Atom;
    use super::*;

    use treezip_shared::{InterfaceName, SharedString};

    fn identifier(tree: &mut Tree, name: &'static str) -> NodeIndex {
        let name = tree.add_leaf(Label::Terminal {
            atom: Atom::String(SharedString::from_str(name)),
            arity: 0,
        });
        tree.add_node(
            Label::Terminal {
                atom: Atom::Kind(InterfaceName::from_str("IdentifierExpression")),
                arity: 1,
            },
            vec![name],
        )
    }

    fn list(tree: &mut Tree, items: Vec<NodeIndex>) -> NodeIndex {
        let mut acc = tree.add_leaf(Label::builtin(Atom::Nil));
        for item in items.into_iter().rev() {
            acc = tree.add_node(Label::builtin(Atom::Cons), vec![item, acc]);
        }
        acc
    }

    #[test]
    fn test_mining_extracts_repeated_pattern() {
        let mut tree = Tree::new();
        let items = (0..10).map(|_| identifier(&mut tree, "x")).collect();
        let start = list(&mut tree, items);
        let before = tree.reachable_len(start);

        let compressed = compress(tree, start).unwrap();
        assert!(
            !compressed.rules.is_empty(),
            "A pattern repeated 10 times must be abbreviated"
        );
        assert!(compressed.tree.reachable_len(compressed.start) < before);
    }

    #[test]
    fn test_mining_is_idempotent() {
        let mut tree = Tree::new();
        let items = (0..10).map(|_| identifier(&mut tree, "x")).collect();
        let start = list(&mut tree, items);

        let compressed = compress(tree, start).unwrap();
        let again = compress(compressed.tree.clone(), compressed.start).unwrap();
        assert_eq!(
            again.rules.len(),
            0,
            "Every surviving digram occurs at most once"
        );
    }

    #[test]
    fn test_no_repeats_no_rules() {
        let mut tree = Tree::new();
        let item = identifier(&mut tree, "x");
        let start = list(&mut tree, vec![item]);
        let compressed = compress(tree, start).unwrap();
        assert_eq!(compressed.rules.len(), 0);
    }
}
