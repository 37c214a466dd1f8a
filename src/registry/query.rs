//! Search Pattern Language
//!
//! The subset of Solr query syntax the registry's search uses:
//! `field:value` terms with `*` / `?` wildcards and quoted phrases,
//! `AND` / `OR` / `NOT` (also `&&`, `||`, `!`), parentheses and `*:*`.
//!
//! Within a clause sequence `+clause` is required and `-clause` (or
//! `NOT clause`) excludes matches from the whole sequence. The remaining
//! plain clauses are OR-ed, but only narrow the result when no clause is
//! required, as in Solr.
//!
//! Attribute fields are looked up in a flattened index: every leaf is
//! reachable both by its `_`-joined path (`kernel_machine`) and by its
//! own key (`machine`).

use regex::Regex;
use serde_json::{Map, Value};
use std::cell::OnceCell;
use std::collections::HashMap;

use crate::error::FetchError;
use crate::node::RawNodeRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Required,
    Word(String),
}

/// Right-hand side of a `field:value` term
#[derive(Debug, Clone)]
pub enum ValuePattern {
    Exact(String),
    Wildcard(Regex),
}

impl ValuePattern {
    fn parse(raw: &str) -> Result<Self, String> {
        if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            return Ok(ValuePattern::Exact(unescape(&raw[1..raw.len() - 1])));
        }

        let mut literal = String::new();
        let mut pattern = String::from("(?s)^");
        let mut wildcard = false;
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let escaped = chars.next().ok_or("dangling escape")?;
                    literal.push(escaped);
                    pattern.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
                }
                '*' => {
                    wildcard = true;
                    pattern.push_str(".*");
                }
                '?' => {
                    wildcard = true;
                    pattern.push('.');
                }
                '"' => {}
                c => {
                    literal.push(c);
                    pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
                }
            }
        }
        pattern.push('$');

        if wildcard {
            Regex::new(&pattern)
                .map(ValuePattern::Wildcard)
                .map_err(|e| e.to_string())
        } else {
            Ok(ValuePattern::Exact(literal))
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            ValuePattern::Exact(expected) => expected == candidate,
            ValuePattern::Wildcard(re) => re.is_match(candidate),
        }
    }
}

/// Parsed search pattern
#[derive(Debug, Clone)]
pub enum Query {
    All,
    Term { field: String, value: ValuePattern },
    Not(Box<Query>),
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
}

impl Query {
    pub fn parse(pattern: &str) -> Result<Self, FetchError> {
        let fail = |reason: String| FetchError::Query {
            pattern: pattern.to_string(),
            reason,
        };

        let tokens = tokenize(pattern).map_err(fail)?;
        if tokens.is_empty() {
            return Err(fail("empty pattern".to_string()));
        }

        let mut parser = Parser { tokens, pos: 0 };
        let query = parser.parse_or().map_err(fail)?;
        if parser.pos < parser.tokens.len() {
            return Err(fail(format!("unexpected {:?}", parser.tokens[parser.pos])));
        }
        Ok(query)
    }

    pub fn matches(&self, record: &RawNodeRecord) -> bool {
        self.eval(&FieldIndex::new(record))
    }

    fn eval(&self, index: &FieldIndex<'_>) -> bool {
        match self {
            Query::All => true,
            Query::Term { field, value } => index.values(field).iter().any(|v| value.matches(v)),
            Query::Not(inner) => !inner.eval(index),
            Query::And(left, right) => left.eval(index) && right.eval(index),
            Query::Or(left, right) => left.eval(index) || right.eval(index),
        }
    }
}

fn tokenize(pattern: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' | '-' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Required);
                i += 1;
            }
            _ => {
                let mut word = String::new();
                let mut quoted = false;
                while i < chars.len() {
                    let c = chars[i];
                    if c == '\\' {
                        let escaped = chars.get(i + 1).ok_or("dangling escape")?;
                        word.push(c);
                        word.push(*escaped);
                        i += 2;
                        continue;
                    }
                    if c == '"' {
                        quoted = !quoted;
                    } else if !quoted && (c.is_whitespace() || c == '(' || c == ')') {
                        break;
                    }
                    word.push(c);
                    i += 1;
                }
                if quoted {
                    return Err("unterminated quote".to_string());
                }
                tokens.push(match word.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Word(word),
                });
            }
        }
    }

    Ok(tokens)
}

/// How a clause takes part in its sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occur {
    Should,
    Must,
    MustNot,
}

fn condition((occur, query): (Occur, Query)) -> Query {
    match occur {
        Occur::MustNot => Query::Not(Box::new(query)),
        Occur::Should | Occur::Must => query,
    }
}

fn join(clauses: Vec<Query>, combine: fn(Box<Query>, Box<Query>) -> Query) -> Option<Query> {
    clauses
        .into_iter()
        .reduce(|acc, clause| combine(Box::new(acc), Box::new(clause)))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    /// A clause sequence: `+` clauses are required, `-`/`NOT` clauses are
    /// excluded, and plain clauses are OR-ed only when nothing is required.
    fn parse_or(&mut self) -> Result<Query, String> {
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut excluded = Vec::new();

        loop {
            let (occur, clause) = self.parse_and()?;
            match occur {
                Occur::Must => required.push(clause),
                Occur::MustNot => excluded.push(clause),
                Occur::Should => optional.push(clause),
            }
            match self.peek() {
                Some(Token::Or) => self.pos += 1,
                Some(Token::Word(_) | Token::LParen | Token::Not | Token::Required) => {}
                _ => break,
            }
        }

        let base = join(required, Query::And)
            .or_else(|| join(optional, Query::Or))
            .unwrap_or(Query::All);
        Ok(excluded
            .into_iter()
            .fold(base, |acc, clause| Query::And(Box::new(acc), Box::new(Query::Not(Box::new(clause))))))
    }

    /// A lone clause keeps its modifier; inside an `AND` chain modifiers become plain conditions
    fn parse_and(&mut self) -> Result<(Occur, Query), String> {
        let first = self.parse_unary()?;
        if self.peek() != Some(&Token::And) {
            return Ok(first);
        }

        let mut left = condition(first);
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = condition(self.parse_unary()?);
            left = Query::And(Box::new(left), Box::new(right));
        }
        Ok((Occur::Should, left))
    }

    fn parse_unary(&mut self) -> Result<(Occur, Query), String> {
        let occur = match self.peek() {
            Some(Token::Not) => Occur::MustNot,
            Some(Token::Required) => Occur::Must,
            _ => return Ok((Occur::Should, self.parse_primary()?)),
        };
        self.pos += 1;
        let inner = condition(self.parse_unary()?);
        Ok((occur, inner))
    }

    fn parse_primary(&mut self) -> Result<Query, String> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(Token::Word(word)) => parse_term(&word),
            Some(token) => Err(format!("unexpected {:?}", token)),
            None => Err("unexpected end of pattern".to_string()),
        }
    }
}

fn parse_term(word: &str) -> Result<Query, String> {
    if word == "*" || word == "*:*" {
        return Ok(Query::All);
    }

    let colon = unescaped_colon(word).ok_or_else(|| format!("expected field:value, got '{}'", word))?;
    let field = unescape(&word[..colon]);
    let value = &word[colon + 1..];
    if field.is_empty() || value.is_empty() {
        return Err(format!("expected field:value, got '{}'", word));
    }

    Ok(Query::Term {
        field,
        value: ValuePattern::parse(value)?,
    })
}

fn unescaped_colon(word: &str) -> Option<usize> {
    let mut escaped = false;
    let mut quoted = false;
    for (idx, c) in word.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            ':' if !quoted => return Some(idx),
            _ => {}
        }
    }
    None
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Lazily built view of the searchable fields of one record
struct FieldIndex<'a> {
    record: &'a RawNodeRecord,
    attributes: OnceCell<HashMap<String, Vec<String>>>,
}

impl<'a> FieldIndex<'a> {
    fn new(record: &'a RawNodeRecord) -> Self {
        Self {
            record,
            attributes: OnceCell::new(),
        }
    }

    fn values(&self, field: &str) -> Vec<String> {
        let run_list = self.record.run_list.as_ref();
        match field {
            "name" => vec![self.record.name.clone()],
            "chef_environment" => self.record.chef_environment.iter().cloned().collect(),
            "role" | "roles" => run_list.map(|r| r.roles()).unwrap_or_default(),
            "recipe" | "recipes" => run_list.map(|r| r.recipes()).unwrap_or_default(),
            "run_list" => run_list
                .map(|r| r.items().iter().map(|item| item.to_string()).collect())
                .unwrap_or_default(),
            _ => self
                .attributes
                .get_or_init(|| index_attributes(&self.record.attributes))
                .get(field)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

fn index_attributes(attributes: &Map<String, Value>) -> HashMap<String, Vec<String>> {
    let mut index = HashMap::new();
    for (key, value) in attributes {
        index_value(key, key, value, &mut index);
    }
    index
}

fn index_value(path: &str, leaf: &str, value: &Value, index: &mut HashMap<String, Vec<String>>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                index_value(&format!("{}_{}", path, key), key, child, index);
            }
        }
        Value::Array(items) => {
            for item in items {
                index_value(path, leaf, item, index);
            }
        }
        Value::Null => {}
        scalar => {
            let text = match scalar {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if leaf != path {
                index.entry(leaf.to_string()).or_default().push(text.clone());
            }
            index.entry(path.to_string()).or_default().push(text);
        }
    }
}
