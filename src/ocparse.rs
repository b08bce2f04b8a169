//! Lexer and recursive-descent parser for the OC grammar.
//!
//! ```text
//! file        = { namespace } .
//! namespace   = "namespace" ident "{" { element | component | controller } "}" .
//! element     = "element"   ident "{" { frequency | section | update } "}" .
//! component   = "component" ident "{" { section | update } "}" .
//! section     = ("input"|"output"|"state"|"config"|"memory") ( "{" {decl} "}" | ":" {decl} ) .
//! decl        = type ident [ "=" expr ] ";" .
//! update      = ("update"|"operation") "{" raw_body "}" .
//! ```
//!
//! The raw text of each `update` body is preserved verbatim, comments
//! and whitespace included, by slicing the source between the matching
//! braces. The reverse lifter depends on that.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    KwNamespace,
    KwElement,
    KwComponent,
    KwController,
    KwInput,
    KwOutput,
    KwState,
    KwConfig,
    KwMemory,
    KwUpdate,
    KwOperation,
    KwFrequency,
    TyFloat,
    TyInt,
    TyAuto,
    Identifier,
    Number,
    StringLiteral,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semicolon,
    Comma,
    Colon,
    Assign,
    Dot,
    Scope,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
    /// Byte offset of the token start in the source.
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Input,
    Output,
    State,
    Config,
    Memory,
}

impl SectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Input => "input",
            SectionKind::Output => "output",
            SectionKind::State => "state",
            SectionKind::Config => "config",
            SectionKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub ty: String,
    pub name: String,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Section {
    pub kind: SectionKind,
    pub variables: Vec<VarDecl>,
}

#[derive(Debug, Clone, Default)]
pub struct OcElement {
    pub name: String,
    pub frequency: Option<String>,
    pub sections: Vec<Section>,
    /// Verbatim `update` body text.
    pub update: String,
}

impl OcElement {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn section_vars(&self, kind: SectionKind) -> &[VarDecl] {
        self.section(kind).map(|s| s.variables.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default)]
pub struct OcComponent {
    pub name: String,
    pub sections: Vec<Section>,
    pub update: String,
}

impl OcComponent {
    pub fn section_vars(&self, kind: SectionKind) -> &[VarDecl] {
        self.sections
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.variables.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default)]
pub struct OcNamespace {
    pub name: String,
    pub elements: Vec<OcElement>,
    pub components: Vec<OcComponent>,
}

#[derive(Debug, Clone, Default)]
pub struct OcFile {
    pub namespaces: Vec<OcNamespace>,
}

#[derive(Debug)]
pub struct ParseOutcome {
    pub file: OcFile,
    pub errors: Vec<ParseError>,
}

impl ParseOutcome {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn parse_str(source: &str) -> ParseOutcome {
    let tokens = tokenize(source);
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        errors: Vec::new(),
    };
    let file = parser.parse_file();
    ParseOutcome {
        file,
        errors: parser.errors,
    }
}

// Lexer

fn classify(text: &str) -> TokenKind {
    match text {
        "namespace" => TokenKind::KwNamespace,
        "element" => TokenKind::KwElement,
        "component" => TokenKind::KwComponent,
        "controller" => TokenKind::KwController,
        "input" => TokenKind::KwInput,
        "output" => TokenKind::KwOutput,
        "state" => TokenKind::KwState,
        "config" => TokenKind::KwConfig,
        "memory" => TokenKind::KwMemory,
        "update" => TokenKind::KwUpdate,
        "operation" => TokenKind::KwOperation,
        "frequency" => TokenKind::KwFrequency,
        "float" => TokenKind::TyFloat,
        "int" => TokenKind::TyInt,
        "auto" => TokenKind::TyAuto,
        _ => TokenKind::Identifier,
    }
}

fn tokenize(source: &str) -> Vec<Token> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut line: u32 = 1;
    let mut column: u32 = 1;
    let mut pos = 0;

    macro_rules! push_punct {
        ($kind:expr, $text:expr, $len:expr) => {{
            tokens.push(Token {
                kind: $kind,
                text: $text.to_string(),
                line,
                column,
                offset: pos,
            });
            pos += $len;
            column += $len as u32;
        }};
    }

    while pos < bytes.len() {
        let c = bytes[pos];

        if c == b'\n' {
            pos += 1;
            line += 1;
            column = 1;
            continue;
        }
        if c == b' ' || c == b'\t' || c == b'\r' {
            pos += 1;
            column += 1;
            continue;
        }

        // Line comments are skipped as tokens; update-body slicing keeps
        // them in the raw text.
        if c == b'/' && pos + 1 < bytes.len() && bytes[pos + 1] == b'/' {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
                column += 1;
            }
            continue;
        }

        if c == b'"' {
            let start_line = line;
            let start_col = column;
            let start = pos;
            pos += 1;
            column += 1;
            while pos < bytes.len() && bytes[pos] != b'"' {
                if bytes[pos] == b'\\' && pos + 1 < bytes.len() {
                    pos += 1;
                    column += 1;
                }
                if bytes[pos] == b'\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
                pos += 1;
            }
            let text = source[start + 1..pos.min(source.len())].to_string();
            if pos < bytes.len() {
                pos += 1;
                column += 1;
            }
            tokens.push(Token {
                kind: TokenKind::StringLiteral,
                text,
                line: start_line,
                column: start_col,
                offset: start,
            });
            continue;
        }

        match c {
            b'{' => {
                push_punct!(TokenKind::LBrace, "{", 1);
                continue;
            }
            b'}' => {
                push_punct!(TokenKind::RBrace, "}", 1);
                continue;
            }
            b'(' => {
                push_punct!(TokenKind::LParen, "(", 1);
                continue;
            }
            b')' => {
                push_punct!(TokenKind::RParen, ")", 1);
                continue;
            }
            b';' => {
                push_punct!(TokenKind::Semicolon, ";", 1);
                continue;
            }
            b',' => {
                push_punct!(TokenKind::Comma, ",", 1);
                continue;
            }
            b'=' => {
                push_punct!(TokenKind::Assign, "=", 1);
                continue;
            }
            b'.' => {
                push_punct!(TokenKind::Dot, ".", 1);
                continue;
            }
            b':' => {
                if pos + 1 < bytes.len() && bytes[pos + 1] == b':' {
                    push_punct!(TokenKind::Scope, "::", 2);
                } else {
                    push_punct!(TokenKind::Colon, ":", 1);
                }
                continue;
            }
            _ => {}
        }

        // Number, possibly negative, with exponent and `f` suffix.
        let starts_number = c.is_ascii_digit()
            || (c == b'-' && pos + 1 < bytes.len() && bytes[pos + 1].is_ascii_digit());
        if starts_number {
            let start = pos;
            let start_col = column;
            if c == b'-' {
                pos += 1;
                column += 1;
            }
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
                column += 1;
            }
            if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                pos += 1;
                column += 1;
                if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
                    pos += 1;
                    column += 1;
                }
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                    column += 1;
                }
            }
            if pos < bytes.len() && (bytes[pos] == b'f' || bytes[pos] == b'F') {
                pos += 1;
                column += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text: source[start..pos].to_string(),
                line,
                column: start_col,
                offset: start,
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = pos;
            let start_col = column;
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
                column += 1;
            }
            let text = source[start..pos].to_string();
            tokens.push(Token {
                kind: classify(&text),
                text,
                line,
                column: start_col,
                offset: start,
            });
            continue;
        }

        // Anything else (operators inside update bodies, brackets, ...)
        // becomes a one-byte identifier token; only brace matching needs it.
        let ch_len = utf8_len(c);
        tokens.push(Token {
            kind: TokenKind::Identifier,
            text: source[pos..(pos + ch_len).min(source.len())].to_string(),
            line,
            column,
            offset: pos,
        });
        pos += ch_len;
        column += 1;
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        line,
        column,
        offset: source.len(),
    });
    tokens
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b & 0b1000_0000 == 0 => 1,
        b if b & 0b1110_0000 == 0b1100_0000 => 2,
        b if b & 0b1111_0000 == 0b1110_0000 => 3,
        _ => 4,
    }
}

// Parser

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl<'s> Parser<'s> {
    fn parse_file(&mut self) -> OcFile {
        let mut file = OcFile::default();
        while !self.at_end() {
            if self.check(TokenKind::KwNamespace) {
                file.namespaces.push(self.parse_namespace());
            } else {
                self.error("Expected 'namespace' at top level");
                self.advance();
            }
        }
        file
    }

    fn parse_namespace(&mut self) -> OcNamespace {
        let mut ns = OcNamespace::default();
        self.expect(TokenKind::KwNamespace);
        ns.name = self.expect_identifier();
        self.expect(TokenKind::LBrace);

        while !self.check(TokenKind::RBrace) && !self.at_end() {
            if self.check(TokenKind::KwElement) {
                ns.elements.push(self.parse_element());
            } else if self.check(TokenKind::KwComponent) {
                ns.components.push(self.parse_component());
            } else if self.check(TokenKind::KwController) {
                // Not translated; skip by brace matching.
                self.advance();
                self.skip_identifier();
                self.skip_brace_block();
            } else {
                self.error("Expected 'element', 'component', or 'controller' inside namespace");
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace);
        ns
    }

    fn parse_element(&mut self) -> OcElement {
        let mut elem = OcElement::default();
        self.expect(TokenKind::KwElement);
        elem.name = self.expect_identifier();
        self.expect(TokenKind::LBrace);

        while !self.check(TokenKind::RBrace) && !self.at_end() {
            if self.check(TokenKind::KwFrequency) {
                elem.frequency = Some(self.parse_frequency());
            } else if self.is_section_start() {
                if let Some(sec) = self.parse_section() {
                    elem.sections.push(sec);
                }
            } else if self.check(TokenKind::KwUpdate) || self.check(TokenKind::KwOperation) {
                elem.update = self.parse_update_body();
            } else {
                self.error("Unexpected token in element body");
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace);
        elem
    }

    fn parse_component(&mut self) -> OcComponent {
        let mut comp = OcComponent::default();
        self.expect(TokenKind::KwComponent);
        comp.name = self.expect_identifier();
        self.expect(TokenKind::LBrace);

        while !self.check(TokenKind::RBrace) && !self.at_end() {
            if self.is_section_start() {
                if let Some(sec) = self.parse_section() {
                    comp.sections.push(sec);
                }
            } else if self.check(TokenKind::KwUpdate) || self.check(TokenKind::KwOperation) {
                comp.update = self.parse_update_body();
            } else {
                self.error("Unexpected token in component body");
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace);
        comp
    }

    fn parse_frequency(&mut self) -> String {
        self.expect(TokenKind::KwFrequency);
        if self.check(TokenKind::Colon) {
            self.advance();
        }
        let mut freq = String::new();
        while !self.check(TokenKind::Semicolon)
            && !self.check(TokenKind::RBrace)
            && !self.is_section_start()
            && !self.check(TokenKind::KwUpdate)
            && !self.check(TokenKind::KwOperation)
            && !self.at_end()
        {
            if !freq.is_empty() {
                freq.push(' ');
            }
            freq.push_str(&self.current().text);
            self.advance();
        }
        if self.check(TokenKind::Semicolon) {
            self.advance();
        }
        freq
    }

    fn parse_section(&mut self) -> Option<Section> {
        let kind = match self.current().kind {
            TokenKind::KwInput => SectionKind::Input,
            TokenKind::KwOutput => SectionKind::Output,
            TokenKind::KwState => SectionKind::State,
            TokenKind::KwConfig => SectionKind::Config,
            TokenKind::KwMemory => SectionKind::Memory,
            _ => return None,
        };
        self.advance();

        let mut sec = Section {
            kind,
            variables: Vec::new(),
        };

        if self.check(TokenKind::LBrace) {
            self.advance();
            while !self.check(TokenKind::RBrace) && !self.at_end() {
                if let Some(var) = self.parse_var_decl() {
                    sec.variables.push(var);
                }
            }
            self.expect(TokenKind::RBrace);
        } else if self.check(TokenKind::Colon) {
            self.advance();
            while !self.is_section_start()
                && !self.check(TokenKind::RBrace)
                && !self.check(TokenKind::KwUpdate)
                && !self.check(TokenKind::KwOperation)
                && !self.check(TokenKind::KwFrequency)
                && !self.at_end()
            {
                if let Some(var) = self.parse_var_decl() {
                    sec.variables.push(var);
                }
            }
        } else {
            self.expect(TokenKind::LBrace);
        }

        Some(sec)
    }

    fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let ty = if self.is_type_token() || self.check(TokenKind::Identifier) {
            let t = self.current().text.clone();
            self.advance();
            t
        } else {
            self.error("Expected type in variable declaration");
            self.advance();
            return None;
        };

        let name = if self.check(TokenKind::Identifier) || self.is_keyword_usable_as_name() {
            let n = self.current().text.clone();
            self.advance();
            n
        } else {
            self.error("Expected variable name after type");
            return None;
        };

        let mut default_value = None;
        if self.check(TokenKind::Assign) {
            self.advance();
            let mut expr = String::new();
            let mut paren_depth = 0i32;
            while !self.at_end() {
                if self.check(TokenKind::Semicolon) && paren_depth == 0 {
                    break;
                }
                if self.check(TokenKind::LParen) {
                    paren_depth += 1;
                }
                if self.check(TokenKind::RParen) {
                    paren_depth -= 1;
                }
                if !expr.is_empty() {
                    expr.push(' ');
                }
                expr.push_str(&self.current().text);
                self.advance();
            }
            default_value = Some(expr);
        }

        if self.check(TokenKind::Semicolon) {
            self.advance();
        }

        Some(VarDecl {
            ty,
            name,
            default_value,
        })
    }

    /// Consume an `update`/`operation` body, returning the verbatim text
    /// between its braces.
    fn parse_update_body(&mut self) -> String {
        self.advance(); // update | operation
        if !self.check(TokenKind::LBrace) {
            self.error("Expected '{' after update");
            return String::new();
        }
        let body_start = self.current().offset + 1;
        self.advance();

        let mut depth = 1;
        let mut body_end = body_start;
        while !self.at_end() {
            match self.current().kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        body_end = self.current().offset;
                        self.advance();
                        return self.source[body_start..body_end].to_string();
                    }
                }
                _ => {}
            }
            self.advance();
        }
        self.error("Unterminated update body");
        self.source[body_start..body_end].to_string()
    }

    // Helpers

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_end(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) {
        if !self.check(kind) {
            let got = if self.at_end() {
                "EOF".to_string()
            } else {
                self.current().text.clone()
            };
            self.error(&format!("Expected {:?}, got '{}'", kind, got));
            return;
        }
        self.advance();
    }

    fn expect_identifier(&mut self) -> String {
        if self.check(TokenKind::Identifier) || self.is_keyword_usable_as_name() {
            let text = self.current().text.clone();
            self.advance();
            return text;
        }
        let got = if self.at_end() {
            "EOF".to_string()
        } else {
            self.current().text.clone()
        };
        self.error(&format!("Expected identifier, got '{}'", got));
        "<error>".to_string()
    }

    fn skip_identifier(&mut self) {
        if self.check(TokenKind::Identifier) || self.is_keyword_usable_as_name() {
            self.advance();
        }
    }

    fn skip_brace_block(&mut self) {
        if !self.check(TokenKind::LBrace) {
            return;
        }
        self.advance();
        let mut depth = 1;
        while !self.at_end() && depth > 0 {
            match self.current().kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                _ => {}
            }
            self.advance();
        }
    }

    fn is_type_token(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::TyFloat | TokenKind::TyInt | TokenKind::TyAuto
        )
    }

    fn is_keyword_usable_as_name(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::KwInput
                | TokenKind::KwOutput
                | TokenKind::KwState
                | TokenKind::KwConfig
                | TokenKind::KwMemory
        )
    }

    fn is_section_start(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::KwInput
                | TokenKind::KwOutput
                | TokenKind::KwState
                | TokenKind::KwConfig
                | TokenKind::KwMemory
        )
    }

    fn error(&mut self, message: &str) {
        let tok = self.current().clone();
        self.errors.push(ParseError {
            line: tok.line,
            column: tok.column,
            message: message.to_string(),
        });
    }
}
