/// Entry-Point Detector
///
/// Finds the user function that test cases should call, by scanning the
/// top-level declarations of the source once.
///
/// **Priority (highest first):**
/// 1. `var|let|const name = function (...)` (also `async function`)
/// 2. `function name(...)` declaration (also `async`, `function*`, `export`)
/// 3. `var|let|const name = (...) => ...` or `name = x => ...`
///
/// Within one priority the first occurrence wins. Only bracket depth 0 is
/// considered, and comments, string/template literals and regex literals are
/// skipped, so nested helpers and text that merely looks like code are never
/// picked.
///
/// This is a lexer, not a parser. Unrecognized shapes yield `None` and the
/// runner falls back to whole-script execution.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryPointKind {
    FunctionBinding,
    Declaration,
    ArrowBinding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    pub kind: EntryPointKind,
}

/// Detect the entry point of `source`, if any.
pub fn detect(source: &str) -> Option<EntryPoint> {
    let tokens = Lexer::new(source).tokenize();

    let mut best: Option<(EntryPointKind, usize, String)> = None;
    for index in 0..tokens.len() {
        if tokens[index].depth != 0 {
            continue;
        }
        let found = match &tokens[index].tok {
            Tok::Ident(word) if matches!(word.as_str(), "var" | "let" | "const") => {
                match_binding(&tokens, index)
            }
            Tok::Ident(word) if word == "function" && is_statement_start(&tokens, index) => {
                match_declaration(&tokens, index)
            }
            _ => None,
        };

        if let Some((kind, name)) = found {
            let better = match &best {
                None => true,
                Some((best_kind, _, _)) => kind < *best_kind,
            };
            if better {
                best = Some((kind, index, name));
            }
        }
    }

    best.map(|(kind, _, name)| EntryPoint { name, kind })
}

/// Convenience wrapper returning only the name.
pub fn detect_entry_point(source: &str) -> Option<String> {
    detect(source).map(|entry| entry.name)
}

fn match_binding(tokens: &[Token], index: usize) -> Option<(EntryPointKind, String)> {
    let name = binding_name(tokens.get(index + 1)?)?;
    if !is_punct(tokens.get(index + 2), '=') {
        return None;
    }

    let mut value = index + 3;
    if is_ident(tokens.get(value), "async") && !matches!(tokens.get(value + 1).map(|t| &t.tok), Some(Tok::Arrow)) {
        value += 1;
    }

    match &tokens.get(value)?.tok {
        Tok::Ident(word) if word == "function" => Some((EntryPointKind::FunctionBinding, name)),
        Tok::Punct('(') => {
            let close = (value + 1..tokens.len())
                .find(|&i| tokens[i].depth == 0 && tokens[i].tok == Tok::Punct(')'))?;
            match tokens.get(close + 1).map(|t| &t.tok) {
                Some(Tok::Arrow) => Some((EntryPointKind::ArrowBinding, name)),
                _ => None,
            }
        }
        Tok::Ident(_) => match tokens.get(value + 1).map(|t| &t.tok) {
            Some(Tok::Arrow) => Some((EntryPointKind::ArrowBinding, name)),
            _ => None,
        },
        _ => None,
    }
}

fn match_declaration(tokens: &[Token], index: usize) -> Option<(EntryPointKind, String)> {
    let mut at = index + 1;
    if is_punct(tokens.get(at), '*') {
        at += 1;
    }
    let name = binding_name(tokens.get(at)?)?;
    if is_punct(tokens.get(at + 1), '(') {
        Some((EntryPointKind::Declaration, name))
    } else {
        None
    }
}

/// A `function` keyword starts a declaration only in statement position;
/// after `=`, `(`, `,` and friends it is an expression.
fn is_statement_start(tokens: &[Token], index: usize) -> bool {
    let mut start = index;
    while start > 0
        && tokens[start - 1].depth == 0
        && matches!(&tokens[start - 1].tok, Tok::Ident(w) if matches!(w.as_str(), "async" | "export" | "default"))
    {
        start -= 1;
    }

    if start == 0 {
        return true;
    }
    match &tokens[start - 1].tok {
        Tok::Punct(';') | Tok::Punct('}') => true,
        Tok::Punct(')') | Tok::Punct(']') | Tok::Literal | Tok::Ident(_) => {
            tokens[start].newline_before
        }
        _ => false,
    }
}

fn binding_name(token: &Token) -> Option<String> {
    match &token.tok {
        Tok::Ident(name) if !is_reserved(name) => Some(name.clone()),
        _ => None,
    }
}

fn is_punct(token: Option<&Token>, expected: char) -> bool {
    matches!(token.map(|t| &t.tok), Some(Tok::Punct(c)) if *c == expected)
}

fn is_ident(token: Option<&Token>, expected: &str) -> bool {
    matches!(token.map(|t| &t.tok), Some(Tok::Ident(w)) if w == expected)
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "break" | "case" | "catch" | "class" | "const" | "continue" | "debugger" | "default"
            | "delete" | "do" | "else" | "enum" | "export" | "extends" | "false" | "finally"
            | "for" | "function" | "if" | "import" | "in" | "instanceof" | "let" | "new"
            | "null" | "return" | "super" | "switch" | "this" | "throw" | "true" | "try"
            | "typeof" | "var" | "void" | "while" | "with" | "yield" | "await" | "static"
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Punct(char),
    /// Multi-character operator other than `=>` (`==`, `+=`, `/`, ...)
    Op,
    Arrow,
    /// String, template, number or regex literal
    Literal,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    /// Open brackets around the token, counting template interpolations
    depth: usize,
    newline_before: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Bracket,
    Interpolation,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    frames: Vec<Frame>,
    tokens: Vec<Token>,
    newline: bool,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            frames: Vec::new(),
            tokens: Vec::new(),
            newline: false,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            depth: self.frames.len(),
            newline_before: self.newline,
        });
        self.newline = false;
    }

    fn tokenize(mut self) -> Vec<Token> {
        while let Some(c) = self.peek(0) {
            match c {
                '\n' => {
                    self.newline = true;
                    self.pos += 1;
                }
                c if c.is_whitespace() => self.pos += 1,
                '/' if self.peek(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek(1) == Some('*') => self.skip_block_comment(),
                '/' if self.regex_allowed() => {
                    self.push(Tok::Literal);
                    self.skip_regex();
                }
                '\'' | '"' => {
                    self.push(Tok::Literal);
                    self.skip_string(c);
                }
                '`' => {
                    self.push(Tok::Literal);
                    self.pos += 1;
                    self.scan_template();
                }
                '(' | '[' | '{' => {
                    self.push(Tok::Punct(c));
                    self.frames.push(Frame::Bracket);
                    self.pos += 1;
                }
                '}' if self.frames.last() == Some(&Frame::Interpolation) => {
                    self.frames.pop();
                    self.pos += 1;
                    self.scan_template();
                }
                ')' | ']' | '}' => {
                    if self.frames.last() == Some(&Frame::Bracket) {
                        self.frames.pop();
                    }
                    self.push(Tok::Punct(c));
                    self.pos += 1;
                }
                '=' => self.lex_equals(),
                c if c.is_ascii_digit() => {
                    self.push(Tok::Literal);
                    while matches!(self.peek(0), Some(d) if d.is_alphanumeric() || d == '.' || d == '_') {
                        self.pos += 1;
                    }
                }
                c if is_ident_start(c) => {
                    let start = self.pos;
                    while matches!(self.peek(0), Some(d) if is_ident_part(d)) {
                        self.pos += 1;
                    }
                    let word: String = self.chars[start..self.pos].iter().collect();
                    self.push(Tok::Ident(word));
                }
                c if "!<>+-*/%&|^".contains(c) && self.peek(1) == Some('=') => {
                    self.pos += 2;
                    if self.peek(0) == Some('=') {
                        self.pos += 1;
                    }
                    self.push(Tok::Op);
                }
                '/' => {
                    self.pos += 1;
                    self.push(Tok::Op);
                }
                c => {
                    self.pos += 1;
                    self.push(Tok::Punct(c));
                }
            }
        }
        self.tokens
    }

    fn lex_equals(&mut self) {
        match self.peek(1) {
            Some('>') => {
                self.pos += 2;
                self.push(Tok::Arrow);
            }
            Some('=') => {
                while self.peek(0) == Some('=') {
                    self.pos += 1;
                }
                self.push(Tok::Op);
            }
            _ => {
                self.pos += 1;
                self.push(Tok::Punct('='));
            }
        }
    }

    /// A `/` begins a regex literal unless it follows something that ends an
    /// operand.
    fn regex_allowed(&self) -> bool {
        match self.tokens.last().map(|t| &t.tok) {
            None => true,
            Some(Tok::Punct(c)) => !matches!(c, ')' | ']' | '}'),
            Some(Tok::Op) | Some(Tok::Arrow) => true,
            Some(Tok::Literal) => false,
            Some(Tok::Ident(word)) => matches!(
                word.as_str(),
                "return" | "typeof" | "instanceof" | "in" | "of" | "new" | "delete" | "void"
                    | "throw" | "case" | "do" | "else" | "yield" | "await"
            ),
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while let Some(c) = self.peek(0) {
            if c == '*' && self.peek(1) == Some('/') {
                self.pos += 2;
                return;
            }
            if c == '\n' {
                self.newline = true;
            }
            self.pos += 1;
        }
    }

    fn skip_string(&mut self, quote: char) {
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            match c {
                '\\' => self.pos += 2,
                '\n' => return,
                c if c == quote => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn skip_regex(&mut self) {
        self.pos += 1;
        let mut in_class = false;
        while let Some(c) = self.peek(0) {
            match c {
                '\\' => self.pos += 2,
                '[' => {
                    in_class = true;
                    self.pos += 1;
                }
                ']' => {
                    in_class = false;
                    self.pos += 1;
                }
                '/' if !in_class => {
                    self.pos += 1;
                    break;
                }
                '\n' => break,
                _ => self.pos += 1,
            }
        }
        while matches!(self.peek(0), Some(f) if f.is_alphanumeric()) {
            self.pos += 1;
        }
    }

    /// Scan template text up to the closing backtick or the next `${`.
    fn scan_template(&mut self) {
        while let Some(c) = self.peek(0) {
            match c {
                '\\' => self.pos += 2,
                '`' => {
                    self.pos += 1;
                    return;
                }
                '$' if self.peek(1) == Some('{') => {
                    self.pos += 2;
                    self.frames.push(Frame::Interpolation);
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_declaration() {
        let source = "function twoSum(nums) { return nums[0] + nums[1]; }";
        assert_eq!(
            detect(source),
            Some(EntryPoint {
                name: "twoSum".to_string(),
                kind: EntryPointKind::Declaration
            })
        );
    }

    #[test]
    fn test_leetcode_style_var_function() {
        let source = r#"
/**
 * @param {number[]} prices
 * @return {number}
 */
var maxProfit = function(prices) {
    let best = 0;
    return best;
};
"#;
        assert_eq!(detect_entry_point(source).as_deref(), Some("maxProfit"));
        assert_eq!(detect(source).unwrap().kind, EntryPointKind::FunctionBinding);
    }

    #[test]
    fn test_arrow_bindings() {
        assert_eq!(
            detect_entry_point("const add = (a, b) => a + b;").as_deref(),
            Some("add")
        );
        assert_eq!(
            detect_entry_point("let double = x => x * 2").as_deref(),
            Some("double")
        );
        assert_eq!(
            detect_entry_point("const load = async (url) => url;").as_deref(),
            Some("load")
        );
        assert_eq!(
            detect_entry_point("const $sum = ($a) => $a;").as_deref(),
            Some("$sum")
        );
    }

    #[test]
    fn test_function_binding_beats_earlier_declaration() {
        let source = r#"
function helper(x) { return x; }
var solve = function(input) { return helper(input); };
"#;
        assert_eq!(detect_entry_point(source).as_deref(), Some("solve"));
    }

    #[test]
    fn test_declaration_beats_earlier_arrow() {
        let source = r#"
const square = (x) => x * x;
function main(nums) { return nums.map(square); }
"#;
        assert_eq!(detect_entry_point(source).as_deref(), Some("main"));
    }

    #[test]
    fn test_first_occurrence_within_priority() {
        let source = "function first() {}\nfunction second() {}";
        assert_eq!(detect_entry_point(source).as_deref(), Some("first"));
    }

    #[test]
    fn test_nested_functions_ignored() {
        let source = r#"
function outer(n) {
    function inner() { return n; }
    const alsoInner = function() {};
    return inner();
}
"#;
        assert_eq!(detect_entry_point(source).as_deref(), Some("outer"));

        let block_only = "{ function hidden() {} }";
        assert_eq!(detect_entry_point(block_only), None);
    }

    #[test]
    fn test_named_function_expression_is_not_a_declaration() {
        let source = "let handler = compute(function callback() { return 1; });";
        assert_eq!(detect_entry_point(source), None);

        let assigned = "const run = function inner() {};";
        assert_eq!(detect_entry_point(assigned).as_deref(), Some("run"));
    }

    #[test]
    fn test_comments_and_strings_ignored() {
        let source = r#"
// function fake() {}
/* var alsoFake = function() {} */
const text = "function notReal() {}";
const tpl = `const nope = () => 1; ${ (() => "function inTemplate() {}")() }`;
console.log(text, tpl);
"#;
        assert_eq!(detect_entry_point(source), None);
    }

    #[test]
    fn test_regex_literal_ignored() {
        let source = r#"
const pattern = /function fake\(/g;
console.log(pattern.test("x"));
"#;
        assert_eq!(detect_entry_point(source), None);
    }

    #[test]
    fn test_division_is_not_regex() {
        let source = "const half = total / 2; function real(x) { return x / 2; }";
        assert_eq!(detect_entry_point(source).as_deref(), Some("real"));
    }

    #[test]
    fn test_async_and_generator_declarations() {
        assert_eq!(
            detect_entry_point("async function fetchAll(items) { return items; }").as_deref(),
            Some("fetchAll")
        );
        assert_eq!(
            detect_entry_point("function* range(n) { yield n; }").as_deref(),
            Some("range")
        );
        assert_eq!(
            detect_entry_point("export function exported(a) { return a; }").as_deref(),
            Some("exported")
        );
    }

    #[test]
    fn test_declaration_after_asi_statement() {
        let source = "const total = 3\nfunction sum(values) { return values.length }";
        assert_eq!(detect_entry_point(source).as_deref(), Some("sum"));
    }

    #[test]
    fn test_no_entry_point() {
        assert_eq!(detect_entry_point("console.log(1 + 2);"), None);
        assert_eq!(detect_entry_point("const value = (1 + 2) * 3;"), None);
        assert_eq!(detect_entry_point("let x = 5;\nx == function"), None);
        assert_eq!(detect_entry_point(""), None);
    }

    #[test]
    fn test_unterminated_input_does_not_panic() {
        assert_eq!(detect_entry_point("const s = \"unterminated"), None);
        assert_eq!(detect_entry_point("function broken(").as_deref(), Some("broken"));
        assert_eq!(detect_entry_point("`${"), None);
        assert_eq!(detect_entry_point("/* open"), None);
    }
}
