//! `describe`/`it` extraction from JavaScript and TypeScript sources.

use std::path::Path;

use tree_sitter::{Language, Node, Parser as TSParser, Tree};

use crate::id::TestId;
use crate::model::{TestCase, TestItem, TestLocation, TestSuite};

/// Callee names that open a suite.
const SUITE_FUNCTIONS: &[&str] = &["describe", "fdescribe", "xdescribe", "context", "suite"];

/// Callee names that declare a single test.
const CASE_FUNCTIONS: &[&str] = &["it", "fit", "xit", "test", "xtest", "specify"];

/// Member modifiers that keep the call a plain suite/test (`it.only(...)`).
const MODIFIERS: &[&str] = &["only", "skip", "todo", "concurrent", "failing"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Suite,
    Case,
}

/// A recognized `describe(...)`/`it(...)` call.
struct Block<'tree> {
    kind: BlockKind,
    name: String,
    callback: Option<Node<'tree>>,
}

/// Tree-sitter backed parser for Jest-style test files.
pub struct JestParser {
    javascript: Language,
    typescript: Language,
    tsx: Language,
}

impl JestParser {
    pub fn new() -> Self {
        Self {
            javascript: tree_sitter_javascript::LANGUAGE.into(),
            typescript: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            tsx: tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    fn language_for(&self, file: &Path) -> &Language {
        match file.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("ts")
                || ext.eq_ignore_ascii_case("mts")
                || ext.eq_ignore_ascii_case("cts") =>
            {
                &self.typescript
            }
            Some(ext) if ext.eq_ignore_ascii_case("tsx") => &self.tsx,
            _ => &self.javascript,
        }
    }

    fn parse_tree(&self, file: &Path, content: &str) -> Result<Tree, String> {
        let mut parser = TSParser::new();
        parser
            .set_language(self.language_for(file))
            .map_err(|e| format!("Failed to set language: {}", e))?;

        parser
            .parse(content, None)
            .ok_or_else(|| "Failed to parse content".to_string())
    }

    /// Parses `content` into a file-level suite.
    ///
    /// `Ok(None)` when the file declares no suites or tests.
    pub fn parse(&self, file: &Path, content: &str) -> Result<Option<TestSuite>, String> {
        let tree = self.parse_tree(file, content)?;

        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let mut root = TestSuite::new(
            TestId::for_file(file),
            file_name,
            TestLocation::new(file, 1, 1),
            None,
        );

        let mut ancestors = Vec::new();
        self.visit(tree.root_node(), content, file, &mut root, &mut ancestors);

        Ok((!root.is_empty()).then_some(root))
    }

    fn visit(
        &self,
        node: Node<'_>,
        content: &str,
        file: &Path,
        parent: &mut TestSuite,
        ancestors: &mut Vec<String>,
    ) {
        if node.kind() == "call_expression" {
            if let Some(block) = classify(&node, content) {
                let location = location_of(&node, file);
                match block.kind {
                    BlockKind::Suite => {
                        let mut suite = TestSuite::new(
                            parent.id.child(&block.name),
                            block.name.clone(),
                            location,
                            Some(parent.id.clone()),
                        );
                        if let Some(callback) = block.callback {
                            ancestors.push(block.name);
                            self.visit_children(callback, content, file, &mut suite, ancestors);
                            ancestors.pop();
                        }
                        parent.children.push(TestItem::Suite(suite));
                    }
                    BlockKind::Case => {
                        let mut full_name = ancestors.join(" ");
                        if !full_name.is_empty() {
                            full_name.push(' ');
                        }
                        full_name.push_str(&block.name);

                        parent.children.push(TestItem::Case(TestCase {
                            id: parent.id.child(&block.name),
                            name: block.name,
                            full_name,
                            location,
                            parent_id: Some(parent.id.clone()),
                        }));
                    }
                }
                return;
            }
        }

        self.visit_children(node, content, file, parent, ancestors);
    }

    fn visit_children(
        &self,
        node: Node<'_>,
        content: &str,
        file: &Path,
        parent: &mut TestSuite,
        ancestors: &mut Vec<String>,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, content, file, parent, ancestors);
        }
    }
}

impl Default for JestParser {
    fn default() -> Self {
        Self::new()
    }
}

fn node_text<'a>(node: &Node, content: &'a str) -> &'a str {
    &content[node.byte_range()]
}

fn location_of(node: &Node, file: &Path) -> TestLocation {
    let start = node.start_position();
    TestLocation::new(file, start.row as u32 + 1, start.column as u32 + 1)
}

fn classify<'tree>(node: &Node<'tree>, content: &str) -> Option<Block<'tree>> {
    let function = node.child_by_field_name("function")?;
    let callee = match function.kind() {
        "identifier" => node_text(&function, content),
        "member_expression" => {
            let object = function.child_by_field_name("object")?;
            let property = function.child_by_field_name("property")?;
            if object.kind() != "identifier" || !MODIFIERS.contains(&node_text(&property, content)) {
                return None;
            }
            node_text(&object, content)
        }
        _ => return None,
    };

    let kind = if SUITE_FUNCTIONS.contains(&callee) {
        BlockKind::Suite
    } else if CASE_FUNCTIONS.contains(&callee) {
        BlockKind::Case
    } else {
        return None;
    };

    let arguments = node.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let args: Vec<Node<'tree>> = arguments
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();

    let name = string_literal(args.first()?, content)?;
    let callback = args.get(1).copied().filter(|n| {
        matches!(
            n.kind(),
            "arrow_function" | "function_expression" | "function"
        )
    });

    Some(Block {
        kind,
        name,
        callback: callback.and_then(|c| c.child_by_field_name("body")),
    })
}

/// The value of a string or template literal, escapes decoded.
fn string_literal(node: &Node, content: &str) -> Option<String> {
    let text = node_text(node, content);
    let body = match node.kind() {
        "string" => strip_delimiters(text, &['\'', '"'])?,
        "template_string" => strip_delimiters(text, &['`'])?,
        _ => return None,
    };
    Some(unescape_js(body)).filter(|name| !name.is_empty())
}

/// `text` without exactly one matching delimiter at each end.
fn strip_delimiters<'a>(text: &'a str, delimiters: &[char]) -> Option<&'a str> {
    let open = text.chars().next()?;
    if !delimiters.contains(&open) || text.len() < 2 || !text.ends_with(open) {
        return None;
    }
    Some(&text[1..text.len() - 1])
}

/// Decodes JavaScript string escapes the way the runtime would.
fn unescape_js(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(escaped) = chars.next() else {
            out.push('\\');
            break;
        };
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !chars.peek().is_some_and(|c| c.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                push_code_point(&mut out, &hex, "\\x");
            }
            'u' if chars.peek() == Some(&'{') => {
                chars.next();
                let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                push_code_point(&mut out, &hex, "\\u");
            }
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                push_code_point(&mut out, &hex, "\\u");
            }
            // Line continuation.
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn push_code_point(out: &mut String, hex: &str, prefix: &str) {
    match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
        Some(ch) => out.push(ch),
        None => {
            out.push_str(prefix);
            out.push_str(hex);
        }
    }
}
