//! The encoder: lower the AST onto a ranked tree, mine shared patterns,
//! assign symbol codes and emit the header plus the preorder bodies.
//!
//! Code space, in fixed partition order:
//!
//! - `[0, P)` parameters, shared across meta-rules;
//! - `[P, P+6)` built-ins `nil, null, cons, false, true, absent`;
//! - meta-rules, grouped by rank ascending, discovery order within a rank;
//! - grammar kinds, in grammar insertion order;
//! - string constants, lexicographic ascending;
//! - numeric constants, by descending use count, ties first seen.

use crate::bytes::chunked::ChunkedWriter;
use crate::bytes::float::bytes_of_float;
use crate::bytes::varnum::WriteVarNum;
use crate::grammar::Grammar;
use crate::repair::tree::{Atom, Label, NodeIndex, Tree, BUILTINS};
use crate::repair::{compress, Compressed};
use crate::TokenWriterError;

use treezip_shared::{SharedString, Value, F64};

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

/// Encode `root` (a `Script` or `Module`) to `out`, recovering the
/// grammar from the tree itself. Returns the number of bytes written.
pub fn encode<W: Write>(root: &Value, out: W) -> Result<usize, TokenWriterError> {
    let grammar = Grammar::recover(root)?;
    Encoder::new(grammar).encode(root, out)
}

/// An encoder bound to a grammar.
///
/// The grammar is usually recovered from the tree being encoded (see
/// [`encode`]); a caller may also supply one, in which case kinds absent
/// from it fail with `UnknownKind`.
pub struct Encoder {
    grammar: Grammar,
}

impl Encoder {
    pub fn new(grammar: Grammar) -> Self {
        Encoder { grammar }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn encode<W: Write>(&self, root: &Value, out: W) -> Result<usize, TokenWriterError> {
        match root.as_node() {
            Some(node) if node.kind().as_str() == "Script" || node.kind().as_str() == "Module" => {}
            Some(node) => return Err(TokenWriterError::UnexpectedRoot(node.kind().clone())),
            None => {
                return Err(TokenWriterError::UnsupportedPrimitive(format!(
                    "Expected a node at the root, got {}",
                    root.class_name()
                )));
            }
        }

        let mut builder = TreeBuilder::new(&self.grammar);
        let start = builder.build(root)?;
        let TreeBuilder {
            tree,
            strings,
            numbers,
            ..
        } = builder;

        let compressed = compress(tree, start)?;
        let codes = CodeSpace::assign(&self.grammar, &compressed, strings, numbers)?;

        let mut writer = ChunkedWriter::new(out);
        self.write_header(&mut writer, &codes)
            .map_err(TokenWriterError::WriteError)?;
        for rule_index in &codes.rule_order {
            let rule = &compressed.rules[*rule_index];
            self.write_tree(&mut writer, &compressed.tree, rule.body, &codes)?;
        }
        self.write_tree(&mut writer, &compressed.tree, compressed.start, &codes)?;

        let (_, bytes_written) = writer.done().map_err(TokenWriterError::WriteError)?;
        info!(target: "write", "Encoded {} rules, {} bytes", compressed.rules.len(), bytes_written);
        Ok(bytes_written)
    }

    fn write_header<W: Write>(
        &self,
        out: &mut W,
        codes: &CodeSpace,
    ) -> Result<(), std::io::Error> {
        // 1. The grammar, as length-prefixed canonical JSON.
        let json = self.grammar.to_json_bytes();
        out.write_varnum(json.len() as u64)?;
        out.write_all(&json)?;

        // 2. Parameter count, 3. built-in count.
        out.write_varnum(codes.parameter_count as u64)?;
        out.write_varnum(BUILTINS.len() as u64)?;

        // 4. Meta-rule rank histogram: the rank-0 bucket is always
        // present; further buckets are (delta rank - 1, count) pairs.
        out.write_varnum((codes.histogram.len() - 1) as u64)?;
        let mut buckets = codes.histogram.iter();
        let (_, count) = buckets.next().expect("The rank-0 bucket is always present");
        out.write_varnum(*count as u64)?;
        let mut previous_rank = 0;
        for (rank, count) in buckets {
            out.write_varnum((rank - previous_rank - 1) as u64)?;
            out.write_varnum(*count as u64)?;
            previous_rank = *rank;
        }

        // 5. The grammar kind count is implicit.

        // 6. String pool: count, byte lengths, concatenated bytes.
        out.write_varnum(codes.string_pool.len() as u64)?;
        for string in &codes.string_pool {
            out.write_varnum(string.as_str().len() as u64)?;
        }
        for string in &codes.string_pool {
            out.write_all(string.as_str().as_bytes())?;
        }

        // 7. Numeric pool: count, little-endian doubles.
        out.write_varnum(codes.number_pool.len() as u64)?;
        for number in &codes.number_pool {
            out.write_all(&bytes_of_float(number.value()))?;
        }
        Ok(())
    }

    /// Emit a tree in preorder; each label contributes its code, and
    /// known ranks make the stream unambiguous without delimiters.
    fn write_tree<W: Write>(
        &self,
        out: &mut W,
        tree: &Tree,
        root: NodeIndex,
        codes: &CodeSpace,
    ) -> Result<(), TokenWriterError> {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let code = codes.code_of(tree.label(node), &self.grammar)?;
            out.write_varnum(code)
                .map_err(TokenWriterError::WriteError)?;
            stack.extend(tree.children(node).iter().rev());
        }
        Ok(())
    }
}

struct NumberInfo {
    value: F64,
    uses: usize,
    first_seen: usize,
}

/// Builds the ranked tree for an AST, interning strings and numbers.
struct TreeBuilder<'a> {
    grammar: &'a Grammar,
    tree: Tree,
    /// Interned strings with their use counts.
    strings: HashMap<SharedString, usize>,
    numbers: HashMap<u64, NumberInfo>,
}

impl<'a> TreeBuilder<'a> {
    fn new(grammar: &'a Grammar) -> Self {
        TreeBuilder {
            grammar,
            tree: Tree::new(),
            strings: HashMap::new(),
            numbers: HashMap::new(),
        }
    }

    fn build(&mut self, value: &Value) -> Result<NodeIndex, TokenWriterError> {
        match *value {
            Value::Null => Ok(self.tree.add_leaf(Label::builtin(Atom::Null))),
            Value::Absent => Ok(self.tree.add_leaf(Label::builtin(Atom::Absent))),
            Value::Bool(true) => Ok(self.tree.add_leaf(Label::builtin(Atom::True))),
            Value::Bool(false) => Ok(self.tree.add_leaf(Label::builtin(Atom::False))),
            Value::Number(number) => {
                let first_seen = self.numbers.len();
                let info = self
                    .numbers
                    .entry(number.to_bits())
                    .or_insert_with(|| NumberInfo {
                        value: number,
                        uses: 0,
                        first_seen,
                    });
                info.uses += 1;
                Ok(self.tree.add_leaf(Label::Terminal {
                    atom: Atom::Number(number),
                    arity: 0,
                }))
            }
            Value::String(ref string) => {
                *self.strings.entry(string.clone()).or_insert(0) += 1;
                Ok(self.tree.add_leaf(Label::Terminal {
                    atom: Atom::String(string.clone()),
                    arity: 0,
                }))
            }
            Value::List(ref items) => {
                // Right fold: cons(x0, cons(x1, ... cons(x_n-1, nil))).
                let mut accumulator = self.tree.add_leaf(Label::builtin(Atom::Nil));
                for item in items.iter().rev() {
                    let head = self.build(item)?;
                    accumulator = self
                        .tree
                        .add_node(Label::builtin(Atom::Cons), vec![head, accumulator]);
                }
                Ok(accumulator)
            }
            Value::Node(ref node) => {
                let (_, properties) = self
                    .grammar
                    .get(node.kind())
                    .ok_or_else(|| TokenWriterError::UnknownKind(node.kind().clone()))?;
                let arity = properties.len();
                let properties = properties.to_vec();
                let mut children = Vec::with_capacity(arity);
                for property in &properties {
                    let child = node.property(property.as_str()).ok_or_else(|| {
                        TokenWriterError::InconsistentShape {
                            kind: node.kind().clone(),
                            expected: properties
                                .iter()
                                .map(|f| f.as_str().to_string())
                                .collect(),
                            actual: node
                                .properties()
                                .map(|(name, _)| name.as_str().to_string())
                                .collect(),
                        }
                    })?;
                    children.push(self.build(child)?);
                }
                Ok(self.tree.add_node(
                    Label::Terminal {
                        atom: Atom::Kind(node.kind().clone()),
                        arity,
                    },
                    children,
                ))
            }
        }
    }
}

/// The assignment of a single integer code to every symbol.
struct CodeSpace {
    /// `P`: one more than the highest parameter index in use, i.e. the
    /// maximum meta-rule rank.
    parameter_count: usize,

    /// Rank histogram of meta-rules: rank -> count, rank 0 always present.
    histogram: BTreeMap<usize, usize>,

    /// Indices into `Compressed::rules`, in code order (rank ascending,
    /// discovery order within a rank).
    rule_order: Vec<usize>,

    /// Code of each meta-rule, indexed like `Compressed::rules`.
    rule_codes: Vec<u64>,

    string_pool: Vec<SharedString>,
    string_codes: HashMap<SharedString, u64>,

    number_pool: Vec<F64>,
    number_codes: HashMap<u64, u64>,

    kinds_base: u64,
}

impl CodeSpace {
    fn assign(
        grammar: &Grammar,
        compressed: &Compressed,
        strings: HashMap<SharedString, usize>,
        numbers: HashMap<u64, NumberInfo>,
    ) -> Result<CodeSpace, TokenWriterError> {
        let parameter_count = compressed
            .rules
            .iter()
            .map(|rule| rule.arity)
            .max()
            .unwrap_or(0);

        let mut histogram: BTreeMap<usize, usize> = BTreeMap::new();
        histogram.insert(0, 0);
        for rule in &compressed.rules {
            *histogram.entry(rule.arity).or_insert(0) += 1;
        }

        // Meta-rules are coded by rank ascending, then discovery order.
        // `rules` is already in discovery order, so a stable sort by
        // arity is exactly the code order.
        let mut rule_order: Vec<usize> = (0..compressed.rules.len()).collect();
        rule_order.sort_by_key(|index| compressed.rules[*index].arity);
        let meta_base = parameter_count as u64 + BUILTINS.len() as u64;
        let mut rule_codes = vec![0; compressed.rules.len()];
        for (offset, rule_index) in rule_order.iter().enumerate() {
            rule_codes[*rule_index] = meta_base + offset as u64;
        }

        let kinds_base = meta_base + compressed.rules.len() as u64;
        let strings_base = kinds_base + grammar.len() as u64;

        // Strings: lexicographic ascending. Interning guarantees
        // uniqueness; equal neighbors mean the pool is corrupt.
        let total_uses: usize = strings.values().sum();
        let mut string_pool: Vec<SharedString> = strings.into_iter().map(|(s, _)| s).collect();
        string_pool.sort();
        debug!(target: "write", "String pool: {} entries for {} uses", string_pool.len(), total_uses);
        for window in string_pool.windows(2) {
            if window[0] == window[1] {
                return Err(TokenWriterError::InternalInvariant(format!(
                    "Duplicate string {:?} in the pool",
                    window[0].as_str()
                )));
            }
        }
        let string_codes = string_pool
            .iter()
            .enumerate()
            .map(|(index, string)| (string.clone(), strings_base + index as u64))
            .collect();

        // Numerics: descending use count, ties by first interning.
        let numbers_base = strings_base + string_pool.len() as u64;
        let mut number_infos: Vec<NumberInfo> = numbers.into_iter().map(|(_, info)| info).collect();
        number_infos.sort_by(|a, b| {
            b.uses
                .cmp(&a.uses)
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        });
        let number_pool: Vec<F64> = number_infos.iter().map(|info| info.value).collect();
        let number_codes = number_pool
            .iter()
            .enumerate()
            .map(|(index, number)| (number.to_bits(), numbers_base + index as u64))
            .collect();

        Ok(CodeSpace {
            parameter_count,
            histogram,
            rule_order,
            rule_codes,
            string_pool,
            string_codes,
            number_pool,
            number_codes,
            kinds_base,
        })
    }

    fn code_of(&self, label: &Label, grammar: &Grammar) -> Result<u64, TokenWriterError> {
        let code = match *label {
            Label::Parameter(index) => {
                debug_assert!(index < self.parameter_count);
                index as u64
            }
            Label::Generated { label, .. } => self.rule_codes[label.0],
            Label::Terminal { ref atom, .. } => match *atom {
                Atom::Nil => self.builtin_code(0),
                Atom::Null => self.builtin_code(1),
                Atom::Cons => self.builtin_code(2),
                Atom::False => self.builtin_code(3),
                Atom::True => self.builtin_code(4),
                Atom::Absent => self.builtin_code(5),
                Atom::Kind(ref kind) => {
                    let (index, _) = grammar
                        .get(kind)
                        .ok_or_else(|| TokenWriterError::UnknownKind(kind.clone()))?;
                    self.kinds_base + index as u64
                }
                Atom::String(ref string) => *self
                    .string_codes
                    .get(string)
                    .ok_or_else(|| {
                        TokenWriterError::InternalInvariant(format!(
                            "String {:?} missing from the pool",
                            string.as_str()
                        ))
                    })?,
                Atom::Number(number) => *self
                    .number_codes
                    .get(&number.to_bits())
                    .ok_or_else(|| {
                        TokenWriterError::InternalInvariant(format!(
                            "Number {:?} missing from the pool",
                            number
                        ))
                    })?,
            },
        };
        Ok(code)
    }

    fn builtin_code(&self, offset: u64) -> u64 {
        self.parameter_count as u64 + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treezip_shared::Node;

    fn empty_script() -> Value {
        Node::named("Script")
            .with("directives", Value::List(vec![]))
            .with("statements", Value::List(vec![]))
            .into()
    }

    #[test]
    fn test_encode_rejects_bad_root() {
        let root: Value = Node::named("ExpressionStatement")
            .with("expression", Value::Null)
            .into();
        match encode(&root, vec![]) {
            Err(TokenWriterError::UnexpectedRoot(kind)) => {
                assert_eq!(kind, "ExpressionStatement");
            }
            other => panic!("Expected UnexpectedRoot, got {:?}", other.map(|_| ())),
        }
        match encode(&Value::Null, vec![]) {
            Err(TokenWriterError::UnsupportedPrimitive(_)) => {}
            other => panic!("Expected UnsupportedPrimitive, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let root: Value = Node::named("Script")
            .with("directives", Value::List(vec![]))
            .with(
                "statements",
                Value::List(
                    (0..5)
                        .map(|i| {
                            Node::named("ExpressionStatement")
                                .with(
                                    "expression",
                                    Node::named("LiteralNumericExpression")
                                        .with("value", Value::float(i as f64 % 3.))
                                        .into(),
                                )
                                .into()
                        })
                        .collect(),
                ),
            )
            .into();
        let mut first = vec![];
        let mut second = vec![];
        encode(&root, &mut first).unwrap();
        encode(&root, &mut second).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_empty_script_header() {
        let root = empty_script();
        let mut bytes = vec![];
        let written = encode(&root, &mut bytes).unwrap();
        assert_eq!(written, bytes.len());

        // Skip the grammar JSON, then check P = 0 and 6 built-ins.
        use crate::bytes::varnum::ReadVarNum;
        let mut cursor = std::io::Cursor::new(&bytes);
        let json_len = cursor.read_varnum().unwrap();
        cursor.set_position(cursor.position() + json_len);
        assert_eq!(cursor.read_varnum().unwrap(), 0, "P");
        assert_eq!(cursor.read_varnum().unwrap(), 6, "built-ins");
        assert_eq!(cursor.read_varnum().unwrap(), 0, "one rank bucket");
        assert_eq!(cursor.read_varnum().unwrap(), 0, "no rank-0 meta-rules");
    }
}
