//! The decoder: rebuild the symbol partitions from the header, buffer
//! each meta-rule body as a flat token sequence, then replay the start
//! tree in preorder, substituting actuals for parameters when a
//! meta-rule expands.

use crate::bytes::float::float_of_bytes;
use crate::bytes::varnum::ReadVarNum;
use crate::grammar::Grammar;
use crate::repair::tree::BUILTINS;
use crate::TokenReaderError;

use treezip_shared::{Node, SharedString, Value, F64};

use std::io::Read;

/// Decode an AST from `input`.
pub fn decode<R: Read>(input: R) -> Result<Value, TokenReaderError> {
    let decoder = Decoder::read(input)?;
    let root = decoder.replay_start()?;
    match root {
        Value::Node(ref node)
            if node.kind().as_str() == "Script" || node.kind().as_str() == "Module" => {}
        Value::Node(ref node) => {
            return Err(TokenReaderError::UnexpectedRoot(
                node.kind().as_str().to_string(),
            ));
        }
        ref other => {
            return Err(TokenReaderError::UnexpectedRoot(
                other.class_name().to_string(),
            ));
        }
    }
    Ok(root)
}

struct Decoder {
    grammar: Grammar,
    parameter_count: u64,
    /// The rank of each meta-rule, in code order.
    meta_ranks: Vec<usize>,
    strings: Vec<SharedString>,
    numbers: Vec<f64>,
    rule_bodies: Vec<Vec<u64>>,
    start: Vec<u64>,

    // Partition bases, in code-space order.
    meta_base: u64,
    kinds_base: u64,
    strings_base: u64,
    numbers_base: u64,
    end: u64,
}

impl Decoder {
    /// Read the header and buffer every tree, consuming the reader.
    fn read<R: Read>(mut reader: R) -> Result<Decoder, TokenReaderError> {
        // 1. The grammar.
        let json_len = reader.read_varnum().map_err(TokenReaderError::read_error)?;
        let mut json = vec![0; json_len as usize];
        reader
            .read_exact(&mut json)
            .map_err(TokenReaderError::read_error)?;
        let grammar = Grammar::from_json_bytes(&json)?;

        // 2. Parameter count, 3. built-in count.
        let parameter_count = reader.read_varnum().map_err(TokenReaderError::read_error)?;
        let builtins = reader.read_varnum().map_err(TokenReaderError::read_error)?;
        if builtins != BUILTINS.len() as u64 {
            return Err(TokenReaderError::VersionMismatch {
                expected: BUILTINS.len() as u64,
                got: builtins,
            });
        }

        // 4. Meta-rule rank histogram. The rank-0 bucket is always
        // present; subsequent buckets are (delta rank - 1, count).
        let extra_buckets = reader.read_varnum().map_err(TokenReaderError::read_error)?;
        let mut meta_ranks = vec![];
        let rank_zero_count = reader.read_varnum().map_err(TokenReaderError::read_error)?;
        for _ in 0..rank_zero_count {
            meta_ranks.push(0);
        }
        let mut rank: u64 = 0;
        for _ in 0..extra_buckets {
            let delta = reader.read_varnum().map_err(TokenReaderError::read_error)?;
            rank += delta + 1;
            let count = reader.read_varnum().map_err(TokenReaderError::read_error)?;
            for _ in 0..count {
                meta_ranks.push(rank as usize);
            }
        }

        // 6. String pool: count, byte lengths, concatenated bytes.
        let string_count = reader.read_varnum().map_err(TokenReaderError::read_error)?;
        let mut lengths = Vec::with_capacity(string_count as usize);
        for _ in 0..string_count {
            lengths.push(reader.read_varnum().map_err(TokenReaderError::read_error)?);
        }
        let mut strings = Vec::with_capacity(lengths.len());
        for length in lengths {
            let mut bytes = vec![0; length as usize];
            reader
                .read_exact(&mut bytes)
                .map_err(TokenReaderError::read_error)?;
            let string = String::from_utf8(bytes).map_err(TokenReaderError::Encoding)?;
            strings.push(SharedString::from_string(string));
        }

        // 7. Numeric pool: count, little-endian doubles.
        let number_count = reader.read_varnum().map_err(TokenReaderError::read_error)?;
        let mut numbers = Vec::with_capacity(number_count as usize);
        for _ in 0..number_count {
            let mut bytes = [0; 8];
            reader
                .read_exact(&mut bytes)
                .map_err(TokenReaderError::read_error)?;
            numbers.push(float_of_bytes(&bytes));
        }

        let meta_base = parameter_count + BUILTINS.len() as u64;
        let kinds_base = meta_base + meta_ranks.len() as u64;
        let strings_base = kinds_base + grammar.len() as u64;
        let numbers_base = strings_base + strings.len() as u64;
        let end = numbers_base + numbers.len() as u64;

        let mut decoder = Decoder {
            grammar,
            parameter_count,
            meta_ranks,
            strings,
            numbers,
            rule_bodies: vec![],
            start: vec![],
            meta_base,
            kinds_base,
            strings_base,
            numbers_base,
            end,
        };
        debug!(target: "read", "Header: P={}, {} meta-rules, {} kinds, {} strings, {} numbers",
            decoder.parameter_count, decoder.meta_ranks.len(), decoder.grammar.len(),
            decoder.strings.len(), decoder.numbers.len());

        // Buffer each meta-rule body, then the start tree. Known ranks
        // make each tree self-delimiting.
        for _ in 0..decoder.meta_ranks.len() {
            let body = decoder.read_tree(&mut reader)?;
            decoder.rule_bodies.push(body);
        }
        decoder.start = decoder.read_tree(&mut reader)?;
        Ok(decoder)
    }

    /// The number of subtrees following a tag.
    fn rank_of(&self, tag: u64) -> Result<usize, TokenReaderError> {
        if tag < self.parameter_count {
            Ok(0)
        } else if tag < self.meta_base {
            // Built-ins are leaves, except cons.
            Ok(if tag - self.parameter_count == 2 { 2 } else { 0 })
        } else if tag < self.kinds_base {
            Ok(self.meta_ranks[(tag - self.meta_base) as usize])
        } else if tag < self.strings_base {
            let (_, properties) = self
                .grammar
                .kind_at((tag - self.kinds_base) as usize)
                .expect("Tag checked against the kind partition");
            Ok(properties.len())
        } else if tag < self.end {
            Ok(0)
        } else {
            Err(TokenReaderError::UnknownTag(tag))
        }
    }

    fn read_tree<R: Read>(&self, reader: &mut R) -> Result<Vec<u64>, TokenReaderError> {
        let mut tokens = vec![];
        self.read_subtree(reader, &mut tokens)?;
        Ok(tokens)
    }

    fn read_subtree<R: Read>(
        &self,
        reader: &mut R,
        tokens: &mut Vec<u64>,
    ) -> Result<(), TokenReaderError> {
        let tag = reader.read_varnum().map_err(TokenReaderError::read_error)?;
        let rank = self.rank_of(tag)?;
        tokens.push(tag);
        for _ in 0..rank {
            self.read_subtree(reader, tokens)?;
        }
        Ok(())
    }

    fn replay_start(&self) -> Result<Value, TokenReaderError> {
        let mut cursor = 0;
        let result = self.replay(&self.start, &mut cursor, &[])?;
        if cursor != self.start.len() {
            return Err(TokenReaderError::InvalidValue(format!(
                "Trailing tokens after the start tree ({} of {} consumed)",
                cursor,
                self.start.len()
            )));
        }
        Ok(result)
    }

    /// Recursive preorder replay of a buffered token sequence.
    fn replay(
        &self,
        tokens: &[u64],
        cursor: &mut usize,
        actuals: &[Value],
    ) -> Result<Value, TokenReaderError> {
        let tag = *tokens
            .get(*cursor)
            .ok_or(TokenReaderError::Truncated)?;
        *cursor += 1;

        if tag < self.parameter_count {
            return actuals.get(tag as usize).cloned().ok_or_else(|| {
                TokenReaderError::InvalidValue(format!(
                    "Parameter {} used outside its meta-rule scope",
                    tag
                ))
            });
        }
        if tag < self.meta_base {
            return match tag - self.parameter_count {
                0 => Ok(Value::List(vec![])),
                1 => Ok(Value::Null),
                2 => {
                    let head = self.replay(tokens, cursor, actuals)?;
                    let tail = self.replay(tokens, cursor, actuals)?;
                    match tail {
                        Value::List(mut items) => {
                            items.insert(0, head);
                            Ok(Value::List(items))
                        }
                        other => Err(TokenReaderError::InvalidValue(format!(
                            "cons onto a non-list ({})",
                            other.class_name()
                        ))),
                    }
                }
                3 => Ok(Value::Bool(false)),
                4 => Ok(Value::Bool(true)),
                _ => Ok(Value::Absent),
            };
        }
        if tag < self.kinds_base {
            let index = (tag - self.meta_base) as usize;
            let rank = self.meta_ranks[index];
            let mut arguments = Vec::with_capacity(rank);
            for _ in 0..rank {
                arguments.push(self.replay(tokens, cursor, actuals)?);
            }
            let mut body_cursor = 0;
            return self.replay(&self.rule_bodies[index], &mut body_cursor, &arguments);
        }
        if tag < self.strings_base {
            let index = (tag - self.kinds_base) as usize;
            let (name, properties) = self
                .grammar
                .kind_at(index)
                .expect("Tag checked against the kind partition");
            let properties = properties.to_vec();
            let mut node = Node::new(name.clone());
            for property in properties {
                let value = self.replay(tokens, cursor, actuals)?;
                node.set(property, value);
            }
            return Ok(Value::Node(Box::new(node)));
        }
        if tag < self.numbers_base {
            let index = (tag - self.strings_base) as usize;
            return Ok(Value::String(self.strings[index].clone()));
        }
        if tag < self.end {
            let index = (tag - self.numbers_base) as usize;
            return Ok(Value::Number(F64::from(self.numbers[index])));
        }
        Err(TokenReaderError::UnknownTag(tag))
    }
}
