//! Encode an AST, then decode it, ensure that we obtain the same tree.

use treezip_io::bytes::varnum::ReadVarNum;
use treezip_io::grammar::Grammar;
use treezip_io::{decode, encode, TokenReaderError};
use treezip_shared::{Node, Value};

use std::io::{Cursor, Read};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn script(statements: Vec<Value>) -> Value {
    Node::named("Script")
        .with("directives", Value::List(vec![]))
        .with("statements", Value::List(statements))
        .into()
}

fn expression_statement(expression: Value) -> Value {
    Node::named("ExpressionStatement")
        .with("expression", expression)
        .into()
}

fn identifier(name: &'static str) -> Value {
    Node::named("IdentifierExpression")
        .with("name", Value::string(name))
        .into()
}

fn numeric_literal(value: f64) -> Value {
    Node::named("LiteralNumericExpression")
        .with("value", Value::from(value))
        .into()
}

fn roundtrip(root: &Value) -> Value {
    let mut bytes = vec![];
    let written = encode(root, &mut bytes).expect("Could not encode");
    assert_eq!(written, bytes.len());
    decode(Cursor::new(bytes)).expect("Could not decode")
}

/// The header fields, re-read from the wire for white-box assertions.
struct Header {
    grammar: Grammar,
    parameter_count: u64,
    builtin_count: u64,
    meta_rule_count: u64,
    strings: Vec<String>,
    numbers: Vec<f64>,
}

impl Header {
    fn parse(bytes: &[u8]) -> Header {
        let mut cursor = Cursor::new(bytes);
        let json_len = cursor.read_varnum().unwrap();
        let mut json = vec![0; json_len as usize];
        cursor.read_exact(&mut json).unwrap();
        let grammar = Grammar::from_json_bytes(&json).unwrap();

        let parameter_count = cursor.read_varnum().unwrap();
        let builtin_count = cursor.read_varnum().unwrap();

        let extra_buckets = cursor.read_varnum().unwrap();
        let mut meta_rule_count = cursor.read_varnum().unwrap();
        for _ in 0..extra_buckets {
            let _delta = cursor.read_varnum().unwrap();
            meta_rule_count += cursor.read_varnum().unwrap();
        }

        let string_count = cursor.read_varnum().unwrap();
        let lengths: Vec<u64> = (0..string_count)
            .map(|_| cursor.read_varnum().unwrap())
            .collect();
        let mut strings = vec![];
        for length in lengths {
            let mut bytes = vec![0; length as usize];
            cursor.read_exact(&mut bytes).unwrap();
            strings.push(String::from_utf8(bytes).unwrap());
        }

        let number_count = cursor.read_varnum().unwrap();
        let mut numbers = vec![];
        for _ in 0..number_count {
            let mut bytes = [0; 8];
            cursor.read_exact(&mut bytes).unwrap();
            numbers.push(f64::from_le_bytes(bytes));
        }

        Header {
            grammar,
            parameter_count,
            builtin_count,
            meta_rule_count,
            strings,
            numbers,
        }
    }
}

#[test]
fn test_roundtrip_empty_script() {
    init_logging();
    let root = script(vec![]);
    assert_eq!(roundtrip(&root), root);

    let mut bytes = vec![];
    encode(&root, &mut bytes).unwrap();
    let header = Header::parse(&bytes);
    assert_eq!(header.parameter_count, 0);
    assert_eq!(header.builtin_count, 6);
    assert_eq!(header.meta_rule_count, 0);
    assert!(header.strings.is_empty());
    assert!(header.numbers.is_empty());
}

#[test]
fn test_roundtrip_literal_one() {
    init_logging();
    let root = script(vec![expression_statement(numeric_literal(1.0))]);
    assert_eq!(roundtrip(&root), root);

    let mut bytes = vec![];
    encode(&root, &mut bytes).unwrap();
    let header = Header::parse(&bytes);
    assert_eq!(header.numbers, vec![1.0]);
}

#[test]
fn test_repeated_identifier_is_abbreviated() {
    init_logging();
    let root = script(
        (0..10)
            .map(|_| expression_statement(identifier("x")))
            .collect(),
    );
    assert_eq!(roundtrip(&root), root);

    let mut bytes = vec![];
    encode(&root, &mut bytes).unwrap();
    let header = Header::parse(&bytes);
    assert_eq!(header.strings, vec!["x".to_string()], "One pool entry for 10 uses");
    assert!(
        header.meta_rule_count >= 1,
        "The repeated statement pattern must be extracted"
    );
}

#[test]
fn test_roundtrip_list_order() {
    init_logging();
    let root = script(vec![
        expression_statement(identifier("a")),
        expression_statement(identifier("b")),
        expression_statement(identifier("c")),
    ]);
    let decoded = roundtrip(&root);
    assert_eq!(decoded, root);

    let node = decoded.as_node().unwrap();
    let statements = node.property("statements").unwrap().as_list().unwrap();
    assert_eq!(statements.len(), 3);
    for (statement, expected) in statements.iter().zip(&["a", "b", "c"]) {
        let expression = statement
            .as_node()
            .unwrap()
            .property("expression")
            .unwrap()
            .as_node()
            .unwrap();
        match expression.property("name").unwrap() {
            Value::String(name) => assert_eq!(name.as_str(), *expected),
            other => panic!("Expected a string, got {:?}", other),
        }
    }
}

#[test]
fn test_roundtrip_nan_payload() {
    init_logging();
    let nan = f64::from_bits(0x7ff8000000000001);
    let root = script(vec![expression_statement(numeric_literal(nan))]);
    let decoded = roundtrip(&root);
    assert_eq!(decoded, root);

    let mut bytes = vec![];
    encode(&root, &mut bytes).unwrap();
    let header = Header::parse(&bytes);
    assert_eq!(header.numbers.len(), 1);
    assert_eq!(header.numbers[0].to_bits(), 0x7ff8000000000001);
}

#[test]
fn test_version_mismatch() {
    init_logging();
    let root = script(vec![]);
    let mut bytes = vec![];
    encode(&root, &mut bytes).unwrap();

    // The built-in count sits right after the grammar and P = 0, both of
    // which fit in single-byte varnums here.
    let json_len = bytes[0] as usize;
    let builtin_offset = 1 + json_len + 1;
    assert_eq!(bytes[builtin_offset], 6);
    bytes[builtin_offset] = 7;

    match decode(Cursor::new(bytes)) {
        Err(TokenReaderError::VersionMismatch { expected, got }) => {
            assert_eq!(expected, 6);
            assert_eq!(got, 7);
        }
        other => panic!("Expected VersionMismatch, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_string_pool_is_sorted() {
    init_logging();
    let root = script(vec![
        expression_statement(identifier("zulu")),
        expression_statement(identifier("alpha")),
        expression_statement(identifier("mike")),
        expression_statement(identifier("alpha")),
    ]);
    assert_eq!(roundtrip(&root), root);

    let mut bytes = vec![];
    encode(&root, &mut bytes).unwrap();
    let header = Header::parse(&bytes);
    assert_eq!(
        header.strings,
        vec!["alpha".to_string(), "mike".to_string(), "zulu".to_string()]
    );
}

#[test]
fn test_numeric_pool_ordered_by_use_count() {
    init_logging();
    let root = script(vec![
        expression_statement(numeric_literal(1.0)),
        expression_statement(numeric_literal(2.0)),
        expression_statement(numeric_literal(2.0)),
        expression_statement(numeric_literal(2.0)),
        expression_statement(numeric_literal(3.0)),
        expression_statement(numeric_literal(3.0)),
    ]);
    assert_eq!(roundtrip(&root), root);

    let mut bytes = vec![];
    encode(&root, &mut bytes).unwrap();
    let header = Header::parse(&bytes);
    assert_eq!(header.numbers, vec![2.0, 3.0, 1.0]);
}

#[test]
fn test_grammar_invariance_after_decode() {
    init_logging();
    let root = script(vec![
        expression_statement(identifier("x")),
        expression_statement(numeric_literal(1.5)),
    ]);
    let decoded = roundtrip(&root);

    let mut bytes = vec![];
    encode(&root, &mut bytes).unwrap();
    let header = Header::parse(&bytes);

    let recovered = Grammar::recover(&decoded).unwrap();
    for (kind, properties) in recovered.kinds() {
        let (_, expected) = header
            .grammar
            .get(kind)
            .expect("Every decoded kind is in the encoded grammar");
        assert_eq!(properties, expected);
    }
}

#[test]
fn test_roundtrip_rich_tree() {
    init_logging();
    // Mixed primitives: null, absent, bools, nested lists, shared
    // subtrees, several kinds.
    let assignment = |name: &'static str, value: f64| -> Value {
        Node::named("AssignmentExpression")
            .with(
                "binding",
                Node::named("AssignmentTargetIdentifier")
                    .with("name", Value::string(name))
                    .into(),
            )
            .with("expression", numeric_literal(value))
            .into()
    };
    let root = script(vec![
        expression_statement(assignment("x", 1.0)),
        expression_statement(assignment("y", 1.0)),
        expression_statement(assignment("x", 2.0)),
        Node::named("IfStatement")
            .with("test", Node::named("LiteralBooleanExpression")
                .with("value", Value::from(true))
                .into())
            .with("consequent", expression_statement(identifier("x")))
            .with("alternate", Value::Absent)
            .into(),
        Node::named("VariableDeclarationStatement")
            .with(
                "declaration",
                Node::named("VariableDeclaration")
                    .with("kind", Value::string("let"))
                    .with(
                        "declarators",
                        Value::List(vec![Node::named("VariableDeclarator")
                            .with(
                                "binding",
                                Node::named("BindingIdentifier")
                                    .with("name", Value::string("z"))
                                    .into(),
                            )
                            .with("init", Value::Null)
                            .into()]),
                    )
                    .into(),
            )
            .into(),
    ]);
    assert_eq!(roundtrip(&root), root);
}

#[test]
fn test_roundtrip_module() {
    init_logging();
    let root: Value = Node::named("Module")
        .with("directives", Value::List(vec![]))
        .with("items", Value::List(vec![expression_statement(identifier("m"))]))
        .into();
    assert_eq!(roundtrip(&root), root);
}

#[test]
fn test_decode_truncated() {
    init_logging();
    let root = script(vec![expression_statement(identifier("x"))]);
    let mut bytes = vec![];
    encode(&root, &mut bytes).unwrap();
    bytes.truncate(bytes.len() - 1);
    match decode(Cursor::new(bytes)) {
        Err(TokenReaderError::Truncated) => {}
        other => panic!("Expected Truncated, got {:?}", other.map(|_| ())),
    }
}
