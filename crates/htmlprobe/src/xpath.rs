//! XPath 1.0 evaluation over a parsed HTML tree.
//!
//! Expressions are tokenized and parsed into an AST once ([`XPath::compile`])
//! and evaluated against a flat, document-ordered index of the scraper tree.
//! The full expression language is supported (all axes except `namespace`,
//! predicates, unions, arithmetic, comparisons and the core function
//! library) apart from variable references.
//!
//! Evaluation uses the document's root element as the context node, so
//! relative paths like `body/div` resolve the way they do against a parsed
//! HTML fragment.

use scraper::{ElementRef, Html};
use std::collections::HashMap;
use thiserror::Error;

/// XPath syntax and evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XPathError {
    /// Malformed expression
    #[error("syntax error at {pos}: {message}")]
    Syntax {
        /// Character offset
        pos: usize,
        /// What went wrong
        message: String,
    },

    /// Expression ended early
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// Function outside the core library
    #[error("unknown function {0}()")]
    UnknownFunction(String),

    /// Function called with the wrong number of arguments
    #[error("{name}() takes {expected} arguments, got {got}")]
    Arity {
        /// Function name
        name: String,
        /// Accepted argument counts
        expected: String,
        /// Arguments given
        got: usize,
    },

    /// A node-set was required
    #[error("expression does not evaluate to a node-set")]
    NotANodeSet,

    /// `$name` references
    #[error("variables are not supported: ${0}")]
    Variable(String),

    /// The `namespace` axis
    #[error("unsupported axis {0}")]
    UnsupportedAxis(String),
}

type XResult<T> = Result<T, XPathError>;

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    DotDot,
    At,
    Comma,
    ColonColon,
    Slash,
    DoubleSlash,
    Pipe,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Star,
    Multiply,
    And,
    Or,
    Div,
    Mod,
    Literal(String),
    Number(f64),
    Name(String),
    Function(String),
    NodeType(String),
    Axis(String),
    Variable(String),
}

impl Token {
    const fn is_operator(&self) -> bool {
        matches!(
            self,
            Self::And
                | Self::Or
                | Self::Mod
                | Self::Div
                | Self::Multiply
                | Self::Slash
                | Self::DoubleSlash
                | Self::Pipe
                | Self::Plus
                | Self::Minus
                | Self::Eq
                | Self::Neq
                | Self::Lt
                | Self::Lte
                | Self::Gt
                | Self::Gte
        )
    }

    /// Whether a `*` or NCName after this token is an operator
    const fn operator_follows(prev: Option<&Self>) -> bool {
        match prev {
            None => false,
            Some(t) => {
                !(t.is_operator()
                    || matches!(
                        t,
                        Self::At | Self::ColonColon | Self::LParen | Self::LBracket | Self::Comma
                    ))
            }
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.') || (!c.is_ascii() && !c.is_whitespace())
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<(Token, usize)>,
}

impl Lexer {
    fn tokenize(src: &str) -> XResult<Vec<(Token, usize)>> {
        let mut lexer = Self {
            chars: src.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
        };
        lexer.run()?;
        Ok(lexer.tokens)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn next_non_space(&self, from: usize) -> (Option<char>, usize) {
        let mut i = from;
        while i < self.chars.len() && self.chars[i].is_whitespace() {
            i += 1;
        }
        (self.chars.get(i).copied(), i)
    }

    fn push(&mut self, token: Token, start: usize) {
        self.tokens.push((token, start));
    }

    fn syntax(&self, pos: usize, message: impl Into<String>) -> XPathError {
        XPathError::Syntax {
            pos,
            message: message.into(),
        }
    }

    fn run(&mut self) -> XResult<()> {
        while let Some(c) = self.peek_at(0) {
            let start = self.pos;
            if c.is_whitespace() {
                self.pos += 1;
                continue;
            }
            let two = (c, self.peek_at(1));
            let token = match two {
                ('(', _) => Some((Token::LParen, 1)),
                (')', _) => Some((Token::RParen, 1)),
                ('[', _) => Some((Token::LBracket, 1)),
                (']', _) => Some((Token::RBracket, 1)),
                ('@', _) => Some((Token::At, 1)),
                (',', _) => Some((Token::Comma, 1)),
                ('|', _) => Some((Token::Pipe, 1)),
                ('+', _) => Some((Token::Plus, 1)),
                ('-', _) => Some((Token::Minus, 1)),
                ('=', _) => Some((Token::Eq, 1)),
                ('!', Some('=')) => Some((Token::Neq, 2)),
                ('<', Some('=')) => Some((Token::Lte, 2)),
                ('<', _) => Some((Token::Lt, 1)),
                ('>', Some('=')) => Some((Token::Gte, 2)),
                ('>', _) => Some((Token::Gt, 1)),
                (':', Some(':')) => Some((Token::ColonColon, 2)),
                ('/', Some('/')) => Some((Token::DoubleSlash, 2)),
                ('/', _) => Some((Token::Slash, 1)),
                ('.', Some('.')) => Some((Token::DotDot, 2)),
                ('.', Some(d)) if d.is_ascii_digit() => None,
                ('.', _) => Some((Token::Dot, 1)),
                _ => None,
            };
            if let Some((token, len)) = token {
                self.pos += len;
                self.push(token, start);
                continue;
            }

            if c == '*' {
                self.pos += 1;
                let token = if Token::operator_follows(self.tokens.last().map(|(t, _)| t)) {
                    Token::Multiply
                } else {
                    Token::Star
                };
                self.push(token, start);
            } else if c == '"' || c == '\'' {
                let literal = self.literal(c)?;
                self.push(Token::Literal(literal), start);
            } else if c.is_ascii_digit() || c == '.' {
                let number = self.number();
                self.push(Token::Number(number), start);
            } else if c == '$' {
                self.pos += 1;
                let name = self.ncname();
                self.push(Token::Variable(name), start);
            } else if is_name_start(c) {
                self.name(start)?;
            } else {
                return Err(self.syntax(start, format!("unexpected character {c:?}")));
            }
        }
        Ok(())
    }

    fn literal(&mut self, quote: char) -> XResult<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek_at(0) {
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
                None => return Err(self.syntax(start, "unterminated string literal")),
            }
        }
    }

    fn number(&mut self) -> f64 {
        let start = self.pos;
        while matches!(self.peek_at(0), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek_at(0) == Some('.') {
            self.pos += 1;
            while matches!(self.peek_at(0), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse().unwrap_or(f64::NAN)
    }

    fn ncname(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek_at(0), Some(c) if is_name_char(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn name(&mut self, start: usize) -> XResult<()> {
        let mut name = self.ncname();

        if Token::operator_follows(self.tokens.last().map(|(t, _)| t)) {
            let token = match name.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "div" => Token::Div,
                "mod" => Token::Mod,
                other => {
                    return Err(self.syntax(start, format!("expected an operator, found {other}")))
                }
            };
            self.push(token, start);
            return Ok(());
        }

        // prefix:local or prefix:*
        if self.peek_at(0) == Some(':') && self.peek_at(1) != Some(':') {
            match self.peek_at(1) {
                Some('*') => {
                    self.pos += 2;
                    self.push(Token::Star, start);
                    return Ok(());
                }
                Some(c) if is_name_start(c) => {
                    self.pos += 1;
                    name.push(':');
                    name.push_str(&self.ncname());
                }
                _ => return Err(self.syntax(self.pos, "dangling ':' in name")),
            }
        }

        let (next, at) = self.next_non_space(self.pos);
        let token = match next {
            Some('(') => match name.as_str() {
                "node" | "text" | "comment" | "processing-instruction" => Token::NodeType(name),
                _ => Token::Function(name),
            },
            Some(':') if self.chars.get(at + 1) == Some(&':') => Token::Axis(name),
            _ => Token::Name(name),
        };
        self.push(token, start);
        Ok(())
    }
}

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
}

impl Axis {
    fn from_name(name: &str, pos: usize) -> XResult<Self> {
        Ok(match name {
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "self" => Self::SelfAxis,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "ancestor-or-self" => Self::AncestorOrSelf,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            "following" => Self::Following,
            "preceding" => Self::Preceding,
            "attribute" => Self::Attribute,
            "namespace" => return Err(XPathError::UnsupportedAxis(name.to_string())),
            other => {
                return Err(XPathError::Syntax {
                    pos,
                    message: format!("unknown axis {other}"),
                })
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Any,
    Name(String),
    Node,
    Text,
    Comment,
    ProcessingInstruction,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

impl Step {
    const fn descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
    Path { absolute: bool, steps: Vec<Step> },
    Filter { primary: Box<Expr>, predicates: Vec<Expr> },
    FilterPath { filter: Box<Expr>, steps: Vec<Step> },
}

// ============================================================================
// Parser
// ============================================================================

/// Deepest expression tree the parser will build
const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn parse(src: &str) -> XResult<Expr> {
        let mut parser = Self {
            tokens: Lexer::tokenize(src)?,
            pos: 0,
            depth: 0,
        };
        if parser.tokens.is_empty() {
            return Err(XPathError::UnexpectedEnd);
        }
        let expr = parser.parse_or()?;
        if let Some((token, pos)) = parser.tokens.get(parser.pos) {
            return Err(XPathError::Syntax {
                pos: *pos,
                message: format!("unexpected {token:?}"),
            });
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> XResult<(Token, usize)> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(XPathError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> XResult<()> {
        let (found, pos) = self.advance()?;
        if &found == token {
            Ok(())
        } else {
            Err(XPathError::Syntax {
                pos,
                message: format!("expected {token:?}, found {found:?}"),
            })
        }
    }

    fn nest(&mut self) -> XResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let pos = self
                .tokens
                .get(self.pos)
                .or_else(|| self.tokens.last())
                .map_or(0, |(_, pos)| *pos);
            return Err(XPathError::Syntax {
                pos,
                message: format!("expression nested deeper than {MAX_DEPTH} levels"),
            });
        }
        Ok(())
    }

    fn parse_or(&mut self) -> XResult<Expr> {
        let entry = self.depth;
        self.nest()?;
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            self.nest()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = entry;
        Ok(left)
    }

    fn parse_and(&mut self) -> XResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::And) {
            self.nest()?;
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> XResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::Neq) => CmpOp::Neq,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.nest()?;
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> XResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Lte) => CmpOp::Lte,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Gte) => CmpOp::Gte,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.nest()?;
            let right = self.parse_additive()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> XResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.nest()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> XResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Multiply) => ArithOp::Mul,
                Some(Token::Div) => ArithOp::Div,
                Some(Token::Mod) => ArithOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.nest()?;
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> XResult<Expr> {
        if self.eat(&Token::Minus) {
            self.nest()?;
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> XResult<Expr> {
        let mut left = self.parse_path()?;
        while self.eat(&Token::Pipe) {
            self.nest()?;
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_step(token: Option<&Token>) -> bool {
        matches!(
            token,
            Some(
                Token::Dot
                    | Token::DotDot
                    | Token::At
                    | Token::Star
                    | Token::Name(_)
                    | Token::NodeType(_)
                    | Token::Axis(_)
            )
        )
    }

    fn parse_path(&mut self) -> XResult<Expr> {
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let steps = if Self::starts_step(self.peek()) {
                    self.parse_relative_location()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![Step::descendant_or_self()];
                steps.extend(self.parse_relative_location()?);
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            t if Self::starts_step(t) => Ok(Expr::Path {
                absolute: false,
                steps: self.parse_relative_location()?,
            }),
            _ => {
                let primary = self.parse_primary()?;
                let predicates = self.parse_predicates()?;
                let filter = if predicates.is_empty() {
                    primary
                } else {
                    Expr::Filter {
                        primary: Box::new(primary),
                        predicates,
                    }
                };
                let mut steps = Vec::new();
                self.parse_step_tail(&mut steps)?;
                if steps.is_empty() {
                    Ok(filter)
                } else {
                    Ok(Expr::FilterPath {
                        filter: Box::new(filter),
                        steps,
                    })
                }
            }
        }
    }

    fn parse_relative_location(&mut self) -> XResult<Vec<Step>> {
        let mut steps = vec![self.parse_step()?];
        self.parse_step_tail(&mut steps)?;
        Ok(steps)
    }

    fn parse_step_tail(&mut self, steps: &mut Vec<Step>) -> XResult<()> {
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.parse_step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.parse_step()?);
            } else {
                return Ok(());
            }
        }
    }

    fn parse_step(&mut self) -> XResult<Step> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let Some(Token::Axis(name)) = self.peek().cloned() {
            let (_, pos) = self.advance()?;
            self.expect(&Token::ColonColon)?;
            Axis::from_name(&name, pos)?
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> XResult<NodeTest> {
        let (token, pos) = self.advance()?;
        match token {
            Token::Star => Ok(NodeTest::Any),
            Token::Name(name) => Ok(NodeTest::Name(name)),
            Token::NodeType(kind) => {
                self.expect(&Token::LParen)?;
                let test = match kind.as_str() {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => {
                        if let Some(Token::Literal(_)) = self.peek() {
                            self.pos += 1;
                        }
                        NodeTest::ProcessingInstruction
                    }
                };
                self.expect(&Token::RParen)?;
                Ok(test)
            }
            other => Err(XPathError::Syntax {
                pos,
                message: format!("expected a node test, found {other:?}"),
            }),
        }
    }

    fn parse_predicates(&mut self) -> XResult<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn parse_primary(&mut self) -> XResult<Expr> {
        let (token, pos) = self.advance()?;
        match token {
            Token::LParen => {
                let expr = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::Literal(s) => Ok(Expr::Literal(s)),
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Variable(name) => Err(XPathError::Variable(name)),
            Token::Function(name) => {
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Function(name, args))
            }
            other => Err(XPathError::Syntax {
                pos,
                message: format!("unexpected {other:?}"),
            }),
        }
    }
}

// ============================================================================
// Document index
// ============================================================================

#[derive(Debug)]
enum NodeKind<'a> {
    Root,
    Element {
        element: ElementRef<'a>,
        name: &'a str,
        attrs: Vec<(&'a str, &'a str)>,
    },
    Text(&'a str),
    Comment(&'a str),
}

#[derive(Debug)]
struct IndexedNode<'a> {
    kind: NodeKind<'a>,
    parent: Option<usize>,
    children: Vec<usize>,
    /// Index of the last node in this subtree
    end: usize,
}

/// Document-ordered view of a scraper tree. Index 0 is the root node.
#[derive(Debug)]
struct DomIndex<'a> {
    nodes: Vec<IndexedNode<'a>>,
}

impl<'a> DomIndex<'a> {
    fn build(html: &'a Html) -> Self {
        let mut slots = HashMap::new();
        let mut nodes: Vec<IndexedNode<'a>> = Vec::new();

        for node in html.tree.root().descendants() {
            let value = node.value();
            let kind = if let Some(element) = ElementRef::wrap(node) {
                let el = element.value();
                NodeKind::Element {
                    element,
                    name: el.name(),
                    attrs: el.attrs().collect(),
                }
            } else if let Some(text) = value.as_text() {
                NodeKind::Text(&**text)
            } else if let Some(comment) = value.as_comment() {
                NodeKind::Comment(&**comment)
            } else if value.is_document() || value.is_fragment() {
                NodeKind::Root
            } else {
                // doctypes and processing instructions are not in the data model
                continue;
            };

            let index = nodes.len();
            slots.insert(node.id(), index);
            let parent = node.parent().and_then(|p| slots.get(&p.id()).copied());
            nodes.push(IndexedNode {
                kind,
                parent,
                children: Vec::new(),
                end: index,
            });
            if let Some(p) = parent {
                nodes[p].children.push(index);
            }
        }

        for i in (0..nodes.len()).rev() {
            let end = nodes[i].children.last().map_or(i, |&c| nodes[c].end);
            nodes[i].end = end;
        }

        Self { nodes }
    }

    fn root_element(&self) -> usize {
        self.nodes
            .first()
            .and_then(|root| {
                root.children
                    .iter()
                    .copied()
                    .find(|&c| matches!(self.nodes[c].kind, NodeKind::Element { .. }))
            })
            .unwrap_or(0)
    }
}

/// A node in a node-set: a tree node or an attribute of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum XNode {
    Node(usize),
    Attr { owner: usize, slot: usize },
}

impl XNode {
    const fn order_key(self) -> (usize, usize) {
        match self {
            Self::Node(i) => (i, 0),
            Self::Attr { owner, slot } => (owner, slot + 1),
        }
    }
}

fn sort_dedup(nodes: &mut Vec<XNode>) {
    nodes.sort_by_key(|n| n.order_key());
    nodes.dedup();
}

// ============================================================================
// Evaluation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Nodes(Vec<XNode>),
    Bool(bool),
    Num(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy)]
struct Context {
    node: XNode,
    position: usize,
    size: usize,
}

struct Evaluator<'d, 'a> {
    index: &'d DomIndex<'a>,
}

fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    let digits = t.strip_prefix('-').unwrap_or(t);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1
        && digits.chars().any(|c| c.is_ascii_digit());
    if valid {
        t.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n == n.trunc() {
        if n == 0.0 {
            "0".to_string()
        } else {
            format!("{n:.0}")
        }
    } else {
        format!("{n}")
    }
}

fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

impl<'d, 'a> Evaluator<'d, 'a> {
    fn node(&self, i: usize) -> &IndexedNode<'a> {
        &self.index.nodes[i]
    }

    fn string_value(&self, n: XNode) -> String {
        match n {
            XNode::Attr { owner, slot } => match &self.node(owner).kind {
                NodeKind::Element { attrs, .. } => attrs[slot].1.to_string(),
                _ => String::new(),
            },
            XNode::Node(i) => match &self.node(i).kind {
                NodeKind::Text(t) | NodeKind::Comment(t) => (*t).to_string(),
                NodeKind::Root | NodeKind::Element { .. } => (i + 1..=self.node(i).end)
                    .filter_map(|j| match self.node(j).kind {
                        NodeKind::Text(t) => Some(t),
                        _ => None,
                    })
                    .collect(),
            },
        }
    }

    fn node_name(&self, n: XNode) -> String {
        match n {
            XNode::Attr { owner, slot } => match &self.node(owner).kind {
                NodeKind::Element { attrs, .. } => attrs[slot].0.to_string(),
                _ => String::new(),
            },
            XNode::Node(i) => match &self.node(i).kind {
                NodeKind::Element { name, .. } => (*name).to_string(),
                _ => String::new(),
            },
        }
    }

    fn to_bool(&self, v: &Value) -> bool {
        match v {
            Value::Nodes(ns) => !ns.is_empty(),
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
        }
    }

    fn to_num(&self, v: &Value) -> f64 {
        match v {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Str(s) => parse_number(s),
            Value::Nodes(_) => parse_number(&self.to_str(v)),
        }
    }

    fn to_str(&self, v: &Value) -> String {
        match v {
            Value::Str(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => number_to_string(*n),
            Value::Nodes(ns) => ns
                .first()
                .map(|&n| self.string_value(n))
                .unwrap_or_default(),
        }
    }

    // ---- axes --------------------------------------------------------------

    fn ancestors(&self, i: usize) -> Vec<XNode> {
        let mut out = Vec::new();
        let mut cur = self.node(i).parent;
        while let Some(p) = cur {
            out.push(XNode::Node(p));
            cur = self.node(p).parent;
        }
        out
    }

    fn siblings(&self, i: usize) -> (Vec<usize>, usize) {
        match self.node(i).parent {
            Some(p) => {
                let children = self.node(p).children.clone();
                let at = children.iter().position(|&c| c == i).unwrap_or(0);
                (children, at)
            }
            None => (vec![i], 0),
        }
    }

    /// Nodes along `axis` from `n`, in proximity order
    fn axis(&self, n: XNode, axis: Axis) -> Vec<XNode> {
        let i = match n {
            XNode::Node(i) => i,
            XNode::Attr { owner, .. } => {
                return match axis {
                    Axis::SelfAxis => vec![n],
                    Axis::Parent => vec![XNode::Node(owner)],
                    Axis::Ancestor | Axis::AncestorOrSelf => {
                        let mut out = Vec::new();
                        if axis == Axis::AncestorOrSelf {
                            out.push(n);
                        }
                        out.push(XNode::Node(owner));
                        out.extend(self.ancestors(owner));
                        out
                    }
                    Axis::Following => ((owner + 1)..self.index.nodes.len())
                        .map(XNode::Node)
                        .collect(),
                    Axis::Preceding => self.axis(XNode::Node(owner), Axis::Preceding),
                    _ => Vec::new(),
                };
            }
        };

        let end = self.node(i).end;
        match axis {
            Axis::Child => self.node(i).children.iter().map(|&c| XNode::Node(c)).collect(),
            Axis::Descendant => ((i + 1)..=end).map(XNode::Node).collect(),
            Axis::DescendantOrSelf => (i..=end).map(XNode::Node).collect(),
            Axis::SelfAxis => vec![n],
            Axis::Parent => self.node(i).parent.map(XNode::Node).into_iter().collect(),
            Axis::Ancestor => self.ancestors(i),
            Axis::AncestorOrSelf => {
                let mut out = vec![n];
                out.extend(self.ancestors(i));
                out
            }
            Axis::FollowingSibling => {
                let (siblings, at) = self.siblings(i);
                siblings[at + 1..].iter().map(|&s| XNode::Node(s)).collect()
            }
            Axis::PrecedingSibling => {
                let (siblings, at) = self.siblings(i);
                siblings[..at].iter().rev().map(|&s| XNode::Node(s)).collect()
            }
            Axis::Following => ((end + 1)..self.index.nodes.len())
                .map(XNode::Node)
                .collect(),
            Axis::Preceding => {
                let ancestors = self.ancestors(i);
                (0..i)
                    .rev()
                    .map(XNode::Node)
                    .filter(|a| !ancestors.contains(a))
                    .collect()
            }
            Axis::Attribute => match &self.node(i).kind {
                NodeKind::Element { attrs, .. } => (0..attrs.len())
                    .map(|slot| XNode::Attr { owner: i, slot })
                    .collect(),
                _ => Vec::new(),
            },
        }
    }

    fn node_test(&self, n: XNode, axis: Axis, test: &NodeTest) -> bool {
        let principal_is_attr = axis == Axis::Attribute;
        match (test, n) {
            (NodeTest::Node, _) => true,
            (NodeTest::Any, XNode::Attr { .. }) => principal_is_attr,
            (NodeTest::Any, XNode::Node(i)) => {
                !principal_is_attr && matches!(self.node(i).kind, NodeKind::Element { .. })
            }
            (NodeTest::Name(name), XNode::Attr { .. }) => {
                principal_is_attr && self.node_name(n) == *name
            }
            (NodeTest::Name(name), XNode::Node(i)) => {
                !principal_is_attr
                    && matches!(self.node(i).kind, NodeKind::Element { name: el, .. } if el == name.as_str())
            }
            (NodeTest::Text, XNode::Node(i)) => matches!(self.node(i).kind, NodeKind::Text(_)),
            (NodeTest::Comment, XNode::Node(i)) => {
                matches!(self.node(i).kind, NodeKind::Comment(_))
            }
            _ => false,
        }
    }

    // ---- expressions -------------------------------------------------------

    fn eval(&self, expr: &Expr, ctx: &Context) -> XResult<Value> {
        Ok(match expr {
            Expr::Or(l, r) => {
                Value::Bool(self.truthy(l, ctx)? || self.truthy(r, ctx)?)
            }
            Expr::And(l, r) => {
                Value::Bool(self.truthy(l, ctx)? && self.truthy(r, ctx)?)
            }
            Expr::Compare(op, l, r) => {
                let lv = self.eval(l, ctx)?;
                let rv = self.eval(r, ctx)?;
                Value::Bool(self.compare(*op, &lv, &rv))
            }
            Expr::Arith(op, l, r) => {
                let a = self.to_num(&self.eval(l, ctx)?);
                let b = self.to_num(&self.eval(r, ctx)?);
                Value::Num(match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Mod => a % b,
                })
            }
            Expr::Neg(e) => Value::Num(-self.to_num(&self.eval(e, ctx)?)),
            Expr::Union(l, r) => {
                let mut a = self.node_set(l, ctx)?;
                a.extend(self.node_set(r, ctx)?);
                sort_dedup(&mut a);
                Value::Nodes(a)
            }
            Expr::Literal(s) => Value::Str(s.clone()),
            Expr::Number(n) => Value::Num(*n),
            Expr::Function(name, args) => self.call(name, args, ctx)?,
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    vec![XNode::Node(0)]
                } else {
                    vec![ctx.node]
                };
                Value::Nodes(self.apply_steps(start, steps)?)
            }
            Expr::Filter {
                primary,
                predicates,
            } => {
                let mut nodes = self.node_set(primary, ctx)?;
                sort_dedup(&mut nodes);
                Value::Nodes(self.apply_predicates(nodes, predicates)?)
            }
            Expr::FilterPath { filter, steps } => {
                let nodes = self.node_set(filter, ctx)?;
                Value::Nodes(self.apply_steps(nodes, steps)?)
            }
        })
    }

    fn truthy(&self, expr: &Expr, ctx: &Context) -> XResult<bool> {
        Ok(self.to_bool(&self.eval(expr, ctx)?))
    }

    fn node_set(&self, expr: &Expr, ctx: &Context) -> XResult<Vec<XNode>> {
        match self.eval(expr, ctx)? {
            Value::Nodes(ns) => Ok(ns),
            _ => Err(XPathError::NotANodeSet),
        }
    }

    fn apply_steps(&self, mut current: Vec<XNode>, steps: &[Step]) -> XResult<Vec<XNode>> {
        for step in steps {
            let mut next = Vec::new();
            for &node in &current {
                let candidates: Vec<XNode> = self
                    .axis(node, step.axis)
                    .into_iter()
                    .filter(|&n| self.node_test(n, step.axis, &step.test))
                    .collect();
                next.extend(self.apply_predicates(candidates, &step.predicates)?);
            }
            sort_dedup(&mut next);
            current = next;
        }
        Ok(current)
    }

    fn apply_predicates(&self, mut nodes: Vec<XNode>, predicates: &[Expr]) -> XResult<Vec<XNode>> {
        for predicate in predicates {
            let size = nodes.len();
            let mut kept = Vec::with_capacity(size);
            for (i, &node) in nodes.iter().enumerate() {
                let ctx = Context {
                    node,
                    position: i + 1,
                    size,
                };
                let keep = match self.eval(predicate, &ctx)? {
                    Value::Num(n) => n == (i + 1) as f64,
                    other => self.to_bool(&other),
                };
                if keep {
                    kept.push(node);
                }
            }
            nodes = kept;
        }
        Ok(nodes)
    }

    fn compare(&self, op: CmpOp, l: &Value, r: &Value) -> bool {
        match (l, r) {
            (Value::Nodes(a), Value::Nodes(b)) => {
                let right: Vec<Value> = b.iter().map(|&n| Value::Str(self.string_value(n))).collect();
                a.iter().any(|&n| {
                    let left = Value::Str(self.string_value(n));
                    right.iter().any(|rv| self.compare_atomic(op, &left, rv))
                })
            }
            (Value::Nodes(a), Value::Bool(_)) => {
                self.compare_atomic(op, &Value::Bool(!a.is_empty()), r)
            }
            (Value::Bool(_), Value::Nodes(b)) => {
                self.compare_atomic(op, l, &Value::Bool(!b.is_empty()))
            }
            (Value::Nodes(a), other) => a
                .iter()
                .any(|&n| self.compare_atomic(op, &Value::Str(self.string_value(n)), other)),
            (other, Value::Nodes(b)) => b
                .iter()
                .any(|&n| self.compare_atomic(op, other, &Value::Str(self.string_value(n)))),
            _ => self.compare_atomic(op, l, r),
        }
    }

    /// Compare two non-node-set values
    fn compare_atomic(&self, op: CmpOp, l: &Value, r: &Value) -> bool {
        match op {
            CmpOp::Eq | CmpOp::Neq => {
                let equal = if matches!(l, Value::Bool(_)) || matches!(r, Value::Bool(_)) {
                    self.to_bool(l) == self.to_bool(r)
                } else if matches!(l, Value::Num(_)) || matches!(r, Value::Num(_)) {
                    self.to_num(l) == self.to_num(r)
                } else {
                    self.to_str(l) == self.to_str(r)
                };
                // NaN compares unequal to everything, so negation is exact
                (op == CmpOp::Eq) == equal
            }
            _ => {
                let a = self.to_num(l);
                let b = self.to_num(r);
                match op {
                    CmpOp::Lt => a < b,
                    CmpOp::Lte => a <= b,
                    CmpOp::Gt => a > b,
                    _ => a >= b,
                }
            }
        }
    }

    // ---- functions ---------------------------------------------------------

    fn arity(name: &str, args: &[Expr], min: usize, max: usize) -> XResult<()> {
        if args.len() < min || args.len() > max {
            let expected = if min == max {
                min.to_string()
            } else if max == usize::MAX {
                format!("at least {min}")
            } else {
                format!("{min} to {max}")
            };
            return Err(XPathError::Arity {
                name: name.to_string(),
                expected,
                got: args.len(),
            });
        }
        Ok(())
    }

    fn arg_str(&self, args: &[Expr], i: usize, ctx: &Context) -> XResult<String> {
        match args.get(i) {
            Some(e) => Ok(self.to_str(&self.eval(e, ctx)?)),
            None => Ok(self.string_value(ctx.node)),
        }
    }

    fn arg_num(&self, args: &[Expr], i: usize, ctx: &Context) -> XResult<f64> {
        match args.get(i) {
            Some(e) => Ok(self.to_num(&self.eval(e, ctx)?)),
            None => Ok(parse_number(&self.string_value(ctx.node))),
        }
    }

    fn first_node_arg(&self, args: &[Expr], ctx: &Context) -> XResult<Option<XNode>> {
        match args.first() {
            Some(e) => {
                let mut ns = self.node_set(e, ctx)?;
                sort_dedup(&mut ns);
                Ok(ns.first().copied())
            }
            None => Ok(Some(ctx.node)),
        }
    }

    fn call(&self, name: &str, args: &[Expr], ctx: &Context) -> XResult<Value> {
        let value = match name {
            "last" => {
                Self::arity(name, args, 0, 0)?;
                Value::Num(ctx.size as f64)
            }
            "position" => {
                Self::arity(name, args, 0, 0)?;
                Value::Num(ctx.position as f64)
            }
            "count" => {
                Self::arity(name, args, 1, 1)?;
                Value::Num(self.node_set(&args[0], ctx)?.len() as f64)
            }
            "id" => {
                Self::arity(name, args, 1, 1)?;
                let wanted: Vec<String> = match self.eval(&args[0], ctx)? {
                    Value::Nodes(ns) => ns
                        .iter()
                        .flat_map(|&n| {
                            self.string_value(n)
                                .split_whitespace()
                                .map(str::to_string)
                                .collect::<Vec<_>>()
                        })
                        .collect(),
                    other => self
                        .to_str(&other)
                        .split_whitespace()
                        .map(str::to_string)
                        .collect(),
                };
                let found = self
                    .index
                    .nodes
                    .iter()
                    .enumerate()
                    .filter(|(_, node)| match &node.kind {
                        NodeKind::Element { attrs, .. } => attrs
                            .iter()
                            .any(|(k, v)| *k == "id" && wanted.iter().any(|w| w == v)),
                        _ => false,
                    })
                    .map(|(i, _)| XNode::Node(i))
                    .collect();
                Value::Nodes(found)
            }
            "local-name" | "name" => {
                Self::arity(name, args, 0, 1)?;
                let n = self.first_node_arg(args, ctx)?;
                Value::Str(n.map(|n| self.node_name(n)).unwrap_or_default())
            }
            "string" => {
                Self::arity(name, args, 0, 1)?;
                Value::Str(self.arg_str(args, 0, ctx)?)
            }
            "concat" => {
                Self::arity(name, args, 2, usize::MAX)?;
                let mut out = String::new();
                for arg in args {
                    out.push_str(&self.to_str(&self.eval(arg, ctx)?));
                }
                Value::Str(out)
            }
            "starts-with" => {
                Self::arity(name, args, 2, 2)?;
                Value::Bool(self.arg_str(args, 0, ctx)?.starts_with(&self.arg_str(args, 1, ctx)?))
            }
            "contains" => {
                Self::arity(name, args, 2, 2)?;
                Value::Bool(self.arg_str(args, 0, ctx)?.contains(&self.arg_str(args, 1, ctx)?))
            }
            "substring-before" => {
                Self::arity(name, args, 2, 2)?;
                let s = self.arg_str(args, 0, ctx)?;
                let sep = self.arg_str(args, 1, ctx)?;
                Value::Str(s.find(&sep).map(|i| s[..i].to_string()).unwrap_or_default())
            }
            "substring-after" => {
                Self::arity(name, args, 2, 2)?;
                let s = self.arg_str(args, 0, ctx)?;
                let sep = self.arg_str(args, 1, ctx)?;
                Value::Str(
                    s.find(&sep)
                        .map(|i| s[i + sep.len()..].to_string())
                        .unwrap_or_default(),
                )
            }
            "substring" => {
                Self::arity(name, args, 2, 3)?;
                let s = self.arg_str(args, 0, ctx)?;
                let start = xpath_round(self.arg_num(args, 1, ctx)?);
                let end = if args.len() == 3 {
                    start + xpath_round(self.arg_num(args, 2, ctx)?)
                } else {
                    f64::INFINITY
                };
                Value::Str(
                    s.chars()
                        .enumerate()
                        .filter(|(i, _)| {
                            let p = (i + 1) as f64;
                            p >= start && p < end
                        })
                        .map(|(_, c)| c)
                        .collect(),
                )
            }
            "string-length" => {
                Self::arity(name, args, 0, 1)?;
                Value::Num(self.arg_str(args, 0, ctx)?.chars().count() as f64)
            }
            "normalize-space" => {
                Self::arity(name, args, 0, 1)?;
                let s = self.arg_str(args, 0, ctx)?;
                Value::Str(s.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            "translate" => {
                Self::arity(name, args, 3, 3)?;
                let s = self.arg_str(args, 0, ctx)?;
                let from: Vec<char> = self.arg_str(args, 1, ctx)?.chars().collect();
                let to: Vec<char> = self.arg_str(args, 2, ctx)?.chars().collect();
                Value::Str(
                    s.chars()
                        .filter_map(|c| match from.iter().position(|&f| f == c) {
                            Some(i) => to.get(i).copied(),
                            None => Some(c),
                        })
                        .collect(),
                )
            }
            "boolean" => {
                Self::arity(name, args, 1, 1)?;
                Value::Bool(self.truthy(&args[0], ctx)?)
            }
            "not" => {
                Self::arity(name, args, 1, 1)?;
                Value::Bool(!self.truthy(&args[0], ctx)?)
            }
            "true" => {
                Self::arity(name, args, 0, 0)?;
                Value::Bool(true)
            }
            "false" => {
                Self::arity(name, args, 0, 0)?;
                Value::Bool(false)
            }
            "number" => {
                Self::arity(name, args, 0, 1)?;
                Value::Num(self.arg_num(args, 0, ctx)?)
            }
            "sum" => {
                Self::arity(name, args, 1, 1)?;
                let ns = self.node_set(&args[0], ctx)?;
                Value::Num(ns.iter().map(|&n| parse_number(&self.string_value(n))).sum())
            }
            "floor" => {
                Self::arity(name, args, 1, 1)?;
                Value::Num(self.arg_num(args, 0, ctx)?.floor())
            }
            "ceiling" => {
                Self::arity(name, args, 1, 1)?;
                Value::Num(self.arg_num(args, 0, ctx)?.ceil())
            }
            "round" => {
                Self::arity(name, args, 1, 1)?;
                Value::Num(xpath_round(self.arg_num(args, 0, ctx)?))
            }
            other => return Err(XPathError::UnknownFunction(other.to_string())),
        };
        Ok(value)
    }
}

// ============================================================================
// Public API
// ============================================================================

/// A compiled XPath expression
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    /// Parse an expression
    pub fn compile(source: &str) -> Result<Self, XPathError> {
        Ok(Self {
            source: source.to_string(),
            expr: Parser::parse(source)?,
        })
    }

    /// The expression as written
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    fn run<'a>(&self, html: &'a Html) -> XResult<(DomIndex<'a>, Value)> {
        let index = DomIndex::build(html);
        let ctx = Context {
            node: XNode::Node(index.root_element()),
            position: 1,
            size: 1,
        };
        let value = Evaluator { index: &index }.eval(&self.expr, &ctx)?;
        Ok((index, value))
    }

    /// Elements selected by the expression, in document order.
    ///
    /// Text, comment and attribute nodes in the result are dropped. A result
    /// that isn't a node-set is an error.
    pub fn select<'a>(&self, html: &'a Html) -> Result<Vec<ElementRef<'a>>, XPathError> {
        let (index, value) = self.run(html)?;
        let Value::Nodes(mut nodes) = value else {
            return Err(XPathError::NotANodeSet);
        };
        sort_dedup(&mut nodes);
        Ok(nodes
            .into_iter()
            .filter_map(|n| match n {
                XNode::Node(i) => match index.nodes[i].kind {
                    NodeKind::Element { element, .. } => Some(element),
                    _ => None,
                },
                XNode::Attr { .. } => None,
            })
            .collect())
    }

    /// The XPath `string()` of the result
    pub fn evaluate_string(&self, html: &Html) -> Result<String, XPathError> {
        let (index, value) = self.run(html)?;
        let value = match value {
            Value::Nodes(mut ns) => {
                sort_dedup(&mut ns);
                Value::Nodes(ns)
            }
            other => other,
        };
        Ok(Evaluator { index: &index }.to_str(&value))
    }

    /// The XPath `number()` of the result
    pub fn evaluate_number(&self, html: &Html) -> Result<f64, XPathError> {
        let (index, value) = self.run(html)?;
        Ok(Evaluator { index: &index }.to_num(&value))
    }

    /// The XPath `boolean()` of the result
    pub fn evaluate_bool(&self, html: &Html) -> Result<bool, XPathError> {
        let (index, value) = self.run(html)?;
        Ok(Evaluator { index: &index }.to_bool(&value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Shop</title></head>
<body>
  <div id="main" class="content">
    <h1>Products</h1>
    <ul id="items">
      <li data-price="3">Apple</li>
      <li data-price="5">Banana</li>
      <li data-price="7"><a href="/cherry">Cherry</a></li>
    </ul>
    <!-- promo -->
    <p>Total: <b>15</b></p>
  </div>
  <form id="f"><input name="q" type="text"><input type="submit" submit="yes"></form>
</body>
</html>"#;

    fn page() -> Html {
        Html::parse_document(PAGE)
    }

    fn names(html: &Html, expr: &str) -> Vec<String> {
        XPath::compile(expr)
            .unwrap()
            .select(html)
            .unwrap()
            .iter()
            .map(|e| e.value().name().to_string())
            .collect()
    }

    fn texts(html: &Html, expr: &str) -> Vec<String> {
        XPath::compile(expr)
            .unwrap()
            .select(html)
            .unwrap()
            .iter()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .collect()
    }

    fn string(html: &Html, expr: &str) -> String {
        XPath::compile(expr).unwrap().evaluate_string(html).unwrap()
    }

    mod lexer_tests {
        use super::*;

        #[test]
        fn test_star_disambiguation() {
            let tokens: Vec<Token> = Lexer::tokenize("2 * 3")
                .unwrap()
                .into_iter()
                .map(|(t, _)| t)
                .collect();
            assert_eq!(tokens[1], Token::Multiply);

            let tokens: Vec<Token> = Lexer::tokenize("//*")
                .unwrap()
                .into_iter()
                .map(|(t, _)| t)
                .collect();
            assert_eq!(tokens, vec![Token::DoubleSlash, Token::Star]);
        }

        #[test]
        fn test_operator_names() {
            let tokens: Vec<Token> = Lexer::tokenize("a and b or div")
                .unwrap()
                .into_iter()
                .map(|(t, _)| t)
                .collect();
            assert_eq!(tokens[1], Token::And);
            assert_eq!(tokens[3], Token::Or);
            assert_eq!(tokens[4], Token::Name("div".to_string()));
        }

        #[test]
        fn test_function_axis_nodetype() {
            let tokens: Vec<Token> = Lexer::tokenize("child::text() | contains (., 'x')")
                .unwrap()
                .into_iter()
                .map(|(t, _)| t)
                .collect();
            assert_eq!(tokens[0], Token::Axis("child".to_string()));
            assert_eq!(tokens[2], Token::NodeType("text".to_string()));
            assert_eq!(tokens[6], Token::Function("contains".to_string()));
        }

        #[test]
        fn test_unterminated_literal() {
            assert!(matches!(
                Lexer::tokenize("'abc"),
                Err(XPathError::Syntax { .. })
            ));
        }

        #[test]
        fn test_numbers() {
            let tokens: Vec<Token> = Lexer::tokenize("1.5 .5 10")
                .unwrap()
                .into_iter()
                .map(|(t, _)| t)
                .collect();
            assert_eq!(
                tokens,
                vec![Token::Number(1.5), Token::Number(0.5), Token::Number(10.0)]
            );
        }
    }

    mod syntax_tests {
        use super::*;

        #[test]
        fn test_rejects_malformed() {
            for expr in ["", "//", "//div[", "a b", "@", "foo(", "//div]", "1 +", "child::"] {
                assert!(XPath::compile(expr).is_err(), "should reject {expr:?}");
            }
        }

        #[test]
        fn test_rejects_variables_and_namespace_axis() {
            assert_eq!(
                XPath::compile("$x").unwrap_err(),
                XPathError::Variable("x".to_string())
            );
            assert!(matches!(
                XPath::compile("namespace::*").unwrap_err(),
                XPathError::UnsupportedAxis(_)
            ));
        }

        #[test]
        fn test_deep_nesting_is_a_syntax_error() {
            for expr in [
                format!("{}1{}", "(".repeat(5000), ")".repeat(5000)),
                format!("{}1", "-".repeat(5000)),
                "(".repeat(5000),
                vec!["1"; 5000].join(" + "),
            ] {
                assert!(matches!(
                    XPath::compile(&expr).unwrap_err(),
                    XPathError::Syntax { .. }
                ));
            }
        }

        #[test]
        fn test_moderate_nesting_compiles() {
            let expr = format!("{}1{}", "(".repeat(40), ")".repeat(40));
            let html = Html::parse_document("<p>x</p>");
            let value = XPath::compile(&expr).unwrap().evaluate_number(&html).unwrap();
            assert_eq!(value, 1.0);
        }

        #[test]
        fn test_plain_words_are_relative_paths() {
            assert!(XPath::compile("Cherry").is_ok());
            assert!(XPath::compile("div.content").is_ok());
        }

        #[test]
        fn test_css_syntax_is_rejected() {
            assert!(XPath::compile("#main").is_err());
            assert!(XPath::compile("div > .item").is_err());
        }

        #[test]
        fn test_source_kept() {
            assert_eq!(XPath::compile("//a").unwrap().source(), "//a");
        }
    }

    mod path_tests {
        use super::*;

        #[test]
        fn test_descendant_names() {
            let html = page();
            assert_eq!(names(&html, "//li").len(), 3);
            assert_eq!(names(&html, "//ul/li/a"), vec!["a"]);
            assert_eq!(names(&html, "/html/body/div/h1"), vec!["h1"]);
        }

        #[test]
        fn test_relative_to_root_element() {
            let html = page();
            assert_eq!(names(&html, "body"), vec!["body"]);
            assert_eq!(names(&html, "head/title"), vec!["title"]);
            assert!(names(&html, "html").is_empty());
        }

        #[test]
        fn test_attribute_predicates() {
            let html = page();
            assert_eq!(names(&html, r#"//*[@id="items"]"#), vec!["ul"]);
            assert_eq!(names(&html, "//*[@submit or @type='submit']"), vec!["input"]);
            assert_eq!(texts(&html, "//li[@data-price > 4]"), vec!["Banana", "Cherry"]);
        }

        #[test]
        fn test_positional_predicates() {
            let html = page();
            assert_eq!(texts(&html, "//li[1]"), vec!["Apple"]);
            assert_eq!(texts(&html, "//li[last()]"), vec!["Cherry"]);
            assert_eq!(texts(&html, "(//li)[2]"), vec!["Banana"]);
            assert_eq!(texts(&html, "//li[position() < 3]"), vec!["Apple", "Banana"]);
        }

        #[test]
        fn test_reverse_axis_positions() {
            let html = page();
            assert_eq!(names(&html, "//a/ancestor::*[1]"), vec!["li"]);
            assert_eq!(texts(&html, "//li[3]/preceding-sibling::li[1]"), vec!["Banana"]);
        }

        #[test]
        fn test_sibling_and_parent_axes() {
            let html = page();
            assert_eq!(texts(&html, "//li[1]/following-sibling::li"), vec!["Banana", "Cherry"]);
            assert_eq!(names(&html, "//a/.."), vec!["li"]);
            assert_eq!(names(&html, "//h1/parent::div"), vec!["div"]);
        }

        #[test]
        fn test_contains_text_matches_all_ancestors() {
            let html = page();
            assert_eq!(
                names(&html, r#"//*[contains(., "Cherry")]"#),
                vec!["html", "body", "div", "ul", "li", "a"]
            );
        }

        #[test]
        fn test_union_is_document_ordered() {
            let html = page();
            assert_eq!(names(&html, "//p | //h1"), vec!["h1", "p"]);
        }

        #[test]
        fn test_non_element_results_dropped() {
            let html = page();
            assert!(names(&html, "//a/@href").is_empty());
            assert!(names(&html, "//li/text()").is_empty());
            assert!(names(&html, "//comment()").is_empty());
        }

        #[test]
        fn test_scalar_result_is_not_a_node_set() {
            let html = page();
            let err = XPath::compile("count(//li)").unwrap().select(&html).unwrap_err();
            assert_eq!(err, XPathError::NotANodeSet);
        }

        #[test]
        fn test_id_function() {
            let html = page();
            assert_eq!(names(&html, "id('main f')"), vec!["div", "form"]);
        }

        #[test]
        fn test_following_and_preceding() {
            let html = page();
            assert_eq!(names(&html, "//h1/following::b"), vec!["b"]);
            assert_eq!(names(&html, "//b/preceding::h1"), vec!["h1"]);
            assert!(names(&html, "//b/preceding::p").is_empty());
        }
    }

    mod function_tests {
        use super::*;

        #[test]
        fn test_string_functions() {
            let html = page();
            assert_eq!(string(&html, "string(//title)"), "Shop");
            assert_eq!(string(&html, "concat('a', 'b', 'c')"), "abc");
            assert_eq!(string(&html, "substring('12345', 2, 3)"), "234");
            assert_eq!(string(&html, "substring('12345', 1.5, 2.6)"), "234");
            assert_eq!(string(&html, "substring-before('a=b', '=')"), "a");
            assert_eq!(string(&html, "substring-after('a=b', '=')"), "b");
            assert_eq!(string(&html, "normalize-space('  a   b ')"), "a b");
            assert_eq!(string(&html, "translate('bar', 'abc', 'AB')"), "BAr");
            assert_eq!(string(&html, "//a/@href"), "/cherry");
            assert_eq!(string(&html, "name(//ul/@id)"), "id");
            assert_eq!(string(&html, "local-name(//ul)"), "ul");
        }

        #[test]
        fn test_number_functions() {
            let html = page();
            let num = |e: &str| XPath::compile(e).unwrap().evaluate_number(&html).unwrap();
            assert_eq!(num("count(//li)"), 3.0);
            assert_eq!(num("sum(//li/@data-price)"), 15.0);
            assert_eq!(num("1 + 2 * 3"), 7.0);
            assert_eq!(num("7 mod 4"), 3.0);
            assert_eq!(num("9 div 2"), 4.5);
            assert_eq!(num("-(2)"), -2.0);
            assert_eq!(num("round(2.5)"), 3.0);
            assert_eq!(num("floor(-1.5)"), -2.0);
            assert_eq!(num("ceiling(1.1)"), 2.0);
            assert_eq!(num("string-length('héllo')"), 5.0);
            assert!(num("number('abc')").is_nan());
        }

        #[test]
        fn test_boolean_functions() {
            let html = page();
            let b = |e: &str| XPath::compile(e).unwrap().evaluate_bool(&html).unwrap();
            assert!(b("boolean(//li)"));
            assert!(b("not(//table)"));
            assert!(b("true() and not(false())"));
            assert!(b("starts-with('abc', 'ab')"));
            assert!(b("//li = 'Banana'"));
            assert!(b("//li != 'Banana'"));
            assert!(b("//li/@data-price = 7"));
            assert!(!b("//table = 'x'"));
        }

        #[test]
        fn test_number_formatting() {
            let html = page();
            assert_eq!(string(&html, "1 div 0"), "Infinity");
            assert_eq!(string(&html, "0 div 0"), "NaN");
            assert_eq!(string(&html, "4 div 2"), "2");
            assert_eq!(string(&html, "1 div 4"), "0.25");
        }

        #[test]
        fn test_unknown_function_and_arity() {
            let html = page();
            let err = XPath::compile("frobnicate()").unwrap().select(&html).unwrap_err();
            assert_eq!(err, XPathError::UnknownFunction("frobnicate".to_string()));
            let err = XPath::compile("contains('a')").unwrap().select(&html).unwrap_err();
            assert!(matches!(err, XPathError::Arity { .. }));
        }
    }
}
