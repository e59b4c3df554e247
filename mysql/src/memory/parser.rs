//! Tokenizer and parser for the SQL subset the in-memory engine runs.
//!
//! The subset covers what the persistence layer generates plus the usual
//! hand-written setup statements:
//!
//! - `select <cols>|*|count(...) from t [where <conjunction>]`
//! - `insert into t set c = v, ...`
//! - `update t set c = v, ... [where <conjunction>]`
//! - `delete from t [where <conjunction>]`
//! - `create table`, `create index`, `alter table ... add|modify column`
//! - `show index from t`, `show tables [like 'p']`, `set names x`
//!
//! A conjunction is a list of `col op operand` or
//! `find_in_set(cast(col as char), operand)` joined by `and`.

use crate::classify::ER_PARSE_ERROR;
use crate::client::{ClientError, WireValue};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(String),
    Str(String),
    Param,
    Symbol(&'static str),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    start: usize,
    end: usize,
}

fn syntax_error(sql: &str, at: usize) -> ClientError {
    let near: String = sql.get(at..).unwrap_or("").chars().take(40).collect();
    ClientError::new(
        ER_PARSE_ERROR,
        format!("You have an error in your SQL syntax near '{near}'"),
    )
}

fn tokenize(sql: &str) -> Result<Vec<Spanned>, ClientError> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let offset = |i: usize| chars.get(i).map_or(sql.len(), |(pos, _)| *pos);
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (start, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let previous_is_operand = matches!(
            tokens.last().map(|t| &t.token),
            Some(Token::Word(_) | Token::Number(_) | Token::Str(_) | Token::Param | Token::Symbol(")"))
        );
        let next_is_digit = chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit());

        let token = if c.is_ascii_alphabetic() || c == '_' {
            let mut j = i + 1;
            while j < chars.len() && (chars[j].1.is_ascii_alphanumeric() || matches!(chars[j].1, '_' | '$')) {
                j += 1;
            }
            i = j;
            Token::Word(sql[start..offset(j)].to_string())
        } else if c == '`' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1 != '`' {
                j += 1;
            }
            if j == chars.len() {
                return Err(syntax_error(sql, start));
            }
            let word = sql[offset(i + 1)..offset(j)].to_string();
            i = j + 1;
            Token::Word(word)
        } else if c.is_ascii_digit() || (c == '-' && next_is_digit && !previous_is_operand) {
            let mut j = i + 1;
            while j < chars.len() && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                j += 1;
            }
            i = j;
            Token::Number(sql[start..offset(j)].to_string())
        } else if c == '\'' || c == '"' {
            let quote = c;
            let mut text = String::new();
            let mut j = i + 1;
            loop {
                let Some(&(_, ch)) = chars.get(j) else {
                    return Err(syntax_error(sql, start));
                };
                if ch == quote {
                    if chars.get(j + 1).is_some_and(|(_, n)| *n == quote) {
                        text.push(quote);
                        j += 2;
                        continue;
                    }
                    break;
                }
                if ch == '\\' {
                    if let Some(&(_, escaped)) = chars.get(j + 1) {
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            '0' => '\0',
                            other => other,
                        });
                        j += 2;
                        continue;
                    }
                }
                text.push(ch);
                j += 1;
            }
            i = j + 1;
            Token::Str(text)
        } else if c == '?' {
            i += 1;
            Token::Param
        } else {
            let next = chars.get(i + 1).map(|(_, n)| *n);
            let (symbol, width) = match (c, next) {
                ('<', Some('>')) => ("<>", 2),
                ('!', Some('=')) => ("!=", 2),
                ('<', Some('=')) => ("<=", 2),
                ('>', Some('=')) => (">=", 2),
                ('=', _) => ("=", 1),
                ('<', _) => ("<", 1),
                ('>', _) => (">", 1),
                ('(', _) => ("(", 1),
                (')', _) => (")", 1),
                (',', _) => (",", 1),
                (';', _) => (";", 1),
                ('.', _) => (".", 1),
                ('*', _) => ("*", 1),
                _ => return Err(syntax_error(sql, start)),
            };
            i += width;
            Token::Symbol(symbol)
        };

        tokens.push(Spanned {
            token,
            start,
            end: offset(i),
        });
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Param(usize),
    Literal(WireValue),
}

impl Operand {
    pub(crate) fn value(&self, params: &[WireValue]) -> WireValue {
        match self {
            Operand::Param(index) => params.get(*index).cloned().unwrap_or(WireValue::Null),
            Operand::Literal(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub(crate) fn matches(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::Ne => ordering != Equal,
            CompareOp::Lt => ordering == Less,
            CompareOp::Le => ordering != Greater,
            CompareOp::Gt => ordering == Greater,
            CompareOp::Ge => ordering != Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        operand: Operand,
    },
    InSet {
        column: String,
        operand: Operand,
    },
}

impl Predicate {
    pub(crate) fn column(&self) -> &str {
        match self {
            Predicate::Compare { column, .. } | Predicate::InSet { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assignment {
    pub column: String,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    All,
    Count,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Select {
    pub projection: Projection,
    pub table: String,
    pub filter: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnDef {
    pub name: String,
    pub column_type: String,
    pub auto_increment: bool,
    pub primary_key: bool,
    pub default: WireValue,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub keys: Vec<(Option<String>, Vec<String>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Position {
    Last,
    First,
    After(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Select(Select),
    Insert {
        table: String,
        assignments: Vec<Assignment>,
    },
    Update {
        table: String,
        assignments: Vec<Assignment>,
        filter: Vec<Predicate>,
    },
    Delete {
        table: String,
        filter: Vec<Predicate>,
    },
    CreateTable(CreateTable),
    AddColumn {
        table: String,
        column: ColumnDef,
        position: Position,
    },
    ModifyColumn {
        table: String,
        column: ColumnDef,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
    },
    ShowIndex {
        table: String,
    },
    ShowTables {
        pattern: Option<String>,
    },
    SetNames,
}

impl Command {
    pub(crate) fn is_ddl(&self) -> bool {
        matches!(
            self,
            Command::CreateTable(_)
                | Command::AddColumn { .. }
                | Command::ModifyColumn { .. }
                | Command::CreateIndex { .. }
        )
    }
}

/// A parsed statement and its number of `?` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Parsed {
    pub command: Command,
    pub param_count: usize,
}

pub(crate) fn parse(sql: &str) -> Result<Parsed, ClientError> {
    let mut parser = Parser {
        sql,
        tokens: tokenize(sql)?,
        pos: 0,
        params: 0,
    };
    let command = parser.command()?;
    parser.accept_symbol(";");
    if parser.pos < parser.tokens.len() {
        return Err(parser.error());
    }
    Ok(Parsed {
        command,
        param_count: parser.params,
    })
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

const TYPE_STOP_WORDS: [&str; 11] = [
    "not",
    "null",
    "auto_increment",
    "default",
    "comment",
    "after",
    "first",
    "primary",
    "unique",
    "key",
    "collate",
];

struct Parser<'s> {
    sql: &'s str,
    tokens: Vec<Spanned>,
    pos: usize,
    params: usize,
}

impl Parser<'_> {
    fn error(&self) -> ClientError {
        let at = self.tokens.get(self.pos).map_or(self.sql.len(), |t| t.start);
        syntax_error(self.sql, at)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn accept_keyword(&mut self, keyword: &str) -> bool {
        let found = self.is_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ClientError> {
        if self.accept_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn accept_symbol(&mut self, symbol: &str) -> bool {
        let found = matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), ClientError> {
        if self.accept_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn identifier(&mut self) -> Result<String, ClientError> {
        let word = match self.peek() {
            Some(Token::Word(word)) => word.clone(),
            _ => return Err(self.error()),
        };
        self.pos += 1;
        Ok(word)
    }

    /// `a.b.c` as its dotted parts.
    fn qualified(&mut self) -> Result<Vec<String>, ClientError> {
        let mut parts = vec![self.identifier()?];
        while self.accept_symbol(".") {
            parts.push(self.identifier()?);
        }
        Ok(parts)
    }

    /// A column reference; qualifiers are dropped.
    fn column_ref(&mut self) -> Result<String, ClientError> {
        let mut parts = self.qualified()?;
        parts.pop().ok_or_else(|| self.error())
    }

    fn table_name(&mut self) -> Result<String, ClientError> {
        Ok(self.qualified()?.join("."))
    }

    fn literal(&mut self) -> Result<WireValue, ClientError> {
        let value = match self.peek() {
            Some(Token::Number(text)) => parse_number(text).ok_or_else(|| self.error())?,
            Some(Token::Str(text)) => WireValue::Bytes(text.clone().into_bytes()),
            Some(Token::Word(word)) if word.eq_ignore_ascii_case("null") => WireValue::Null,
            _ => return Err(self.error()),
        };
        self.pos += 1;
        Ok(value)
    }

    fn operand(&mut self) -> Result<Operand, ClientError> {
        if matches!(self.peek(), Some(Token::Param)) {
            self.pos += 1;
            let index = self.params;
            self.params += 1;
            return Ok(Operand::Param(index));
        }
        Ok(Operand::Literal(self.literal()?))
    }

    fn command(&mut self) -> Result<Command, ClientError> {
        if self.accept_keyword("select") {
            self.select()
        } else if self.accept_keyword("insert") {
            self.expect_keyword("into")?;
            let table = self.table_name()?;
            self.expect_keyword("set")?;
            let assignments = self.assignments()?;
            Ok(Command::Insert { table, assignments })
        } else if self.accept_keyword("update") {
            let table = self.table_name()?;
            self.expect_keyword("set")?;
            let assignments = self.assignments()?;
            let filter = self.where_clause()?;
            Ok(Command::Update {
                table,
                assignments,
                filter,
            })
        } else if self.accept_keyword("delete") {
            self.expect_keyword("from")?;
            let table = self.table_name()?;
            let filter = self.where_clause()?;
            Ok(Command::Delete { table, filter })
        } else if self.accept_keyword("create") {
            self.create()
        } else if self.accept_keyword("alter") {
            self.alter()
        } else if self.accept_keyword("show") {
            self.show()
        } else if self.accept_keyword("set") {
            self.expect_keyword("names")?;
            self.pos = self.tokens.len();
            Ok(Command::SetNames)
        } else {
            Err(self.error())
        }
    }

    fn select(&mut self) -> Result<Command, ClientError> {
        let projection = if self.accept_symbol("*") {
            Projection::All
        } else if self.is_keyword("count") && matches!(self.peek_at(1), Some(Token::Symbol("("))) {
            self.pos += 2;
            while !self.accept_symbol(")") {
                if self.peek().is_none() {
                    return Err(self.error());
                }
                self.pos += 1;
            }
            Projection::Count
        } else {
            let mut columns = vec![self.column_ref()?];
            while self.accept_symbol(",") {
                columns.push(self.column_ref()?);
            }
            Projection::Columns(columns)
        };

        self.expect_keyword("from")?;
        let table = self.table_name()?;
        let filter = self.where_clause()?;

        Ok(Command::Select(Select {
            projection,
            table,
            filter,
        }))
    }

    fn assignments(&mut self) -> Result<Vec<Assignment>, ClientError> {
        let mut assignments = Vec::new();
        loop {
            let column = self.column_ref()?;
            self.expect_symbol("=")?;
            let operand = self.operand()?;
            assignments.push(Assignment { column, operand });
            if !self.accept_symbol(",") {
                return Ok(assignments);
            }
        }
    }

    fn where_clause(&mut self) -> Result<Vec<Predicate>, ClientError> {
        if !self.accept_keyword("where") {
            return Ok(Vec::new());
        }

        let mut predicates = vec![self.predicate()?];
        while self.accept_keyword("and") {
            predicates.push(self.predicate()?);
        }
        Ok(predicates)
    }

    fn predicate(&mut self) -> Result<Predicate, ClientError> {
        if self.accept_keyword("find_in_set") {
            self.expect_symbol("(")?;
            self.expect_keyword("cast")?;
            self.expect_symbol("(")?;
            let column = self.column_ref()?;
            self.expect_keyword("as")?;
            self.expect_keyword("char")?;
            self.expect_symbol(")")?;
            self.expect_symbol(",")?;
            let operand = self.operand()?;
            self.expect_symbol(")")?;
            return Ok(Predicate::InSet { column, operand });
        }

        let column = self.column_ref()?;
        let op = match self.peek() {
            Some(Token::Symbol("=")) => CompareOp::Eq,
            Some(Token::Symbol("<>" | "!=")) => CompareOp::Ne,
            Some(Token::Symbol("<")) => CompareOp::Lt,
            Some(Token::Symbol("<=")) => CompareOp::Le,
            Some(Token::Symbol(">")) => CompareOp::Gt,
            Some(Token::Symbol(">=")) => CompareOp::Ge,
            _ => return Err(self.error()),
        };
        self.pos += 1;
        let operand = self.operand()?;
        Ok(Predicate::Compare { column, op, operand })
    }

    fn create(&mut self) -> Result<Command, ClientError> {
        if self.accept_keyword("table") {
            return self.create_table();
        }

        self.accept_keyword("unique");
        self.expect_keyword("index")?;
        let name = self.identifier()?;
        self.expect_keyword("on")?;
        let table = self.table_name()?;
        let columns = self.key_list()?;
        Ok(Command::CreateIndex { name, table, columns })
    }

    fn create_table(&mut self) -> Result<Command, ClientError> {
        let name = self.table_name()?;
        self.expect_symbol("(")?;

        let mut table = CreateTable {
            name,
            columns: Vec::new(),
            primary_key: Vec::new(),
            keys: Vec::new(),
        };

        loop {
            if self.accept_keyword("primary") {
                self.expect_keyword("key")?;
                table.primary_key = self.key_list()?;
            } else if self.accept_keyword("key") || self.accept_keyword("index") {
                let named = matches!(self.peek(), Some(Token::Word(_)));
                let name = if named { Some(self.identifier()?) } else { None };
                let columns = self.key_list()?;
                table.keys.push((name, columns));
            } else {
                let column = self.column_def()?;
                if column.primary_key {
                    table.primary_key.push(column.name.clone());
                }
                table.columns.push(column);
            }

            if !self.accept_symbol(",") {
                break;
            }
        }
        self.expect_symbol(")")?;

        if self.accept_keyword("engine") {
            self.accept_symbol("=");
            self.identifier()?;
        }

        Ok(Command::CreateTable(table))
    }

    fn key_list(&mut self) -> Result<Vec<String>, ClientError> {
        self.expect_symbol("(")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.column_ref()?);
            if self.accept_symbol("(") {
                self.literal()?;
                self.expect_symbol(")")?;
            }
            if !self.accept_keyword("desc") {
                self.accept_keyword("asc");
            }
            if !self.accept_symbol(",") {
                break;
            }
        }
        self.expect_symbol(")")?;
        Ok(columns)
    }

    fn column_def(&mut self) -> Result<ColumnDef, ClientError> {
        let name = self.identifier()?;

        let first = self.pos;
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Symbol("(") => depth += 1,
                Token::Symbol(")") if depth == 0 => break,
                Token::Symbol(")") => depth -= 1,
                Token::Symbol("," | ";") if depth == 0 => break,
                Token::Word(w) if depth == 0 && TYPE_STOP_WORDS.iter().any(|s| w.eq_ignore_ascii_case(s)) => break,
                _ => {}
            }
            self.pos += 1;
        }
        if self.pos == first {
            return Err(self.error());
        }
        let start = self.tokens[first].start;
        let end = self.tokens[self.pos - 1].end;
        let column_type = self.sql[start..end].to_lowercase();

        let mut column = ColumnDef {
            name,
            column_type,
            auto_increment: false,
            primary_key: false,
            default: WireValue::Null,
            comment: String::new(),
        };

        loop {
            if self.accept_keyword("not") {
                self.expect_keyword("null")?;
            } else if self.accept_keyword("null") || self.accept_keyword("unique") {
            } else if self.accept_keyword("auto_increment") {
                column.auto_increment = true;
            } else if self.accept_keyword("default") {
                column.default = self.literal()?;
            } else if self.accept_keyword("comment") {
                match self.literal()? {
                    WireValue::Bytes(bytes) => column.comment = String::from_utf8_lossy(&bytes).into_owned(),
                    _ => return Err(self.error()),
                }
            } else if self.accept_keyword("primary") {
                self.expect_keyword("key")?;
                column.primary_key = true;
            } else {
                return Ok(column);
            }
        }
    }

    fn alter(&mut self) -> Result<Command, ClientError> {
        self.expect_keyword("table")?;
        let table = self.table_name()?;

        if self.accept_keyword("add") {
            self.accept_keyword("column");
            let column = self.column_def()?;
            let position = if self.accept_keyword("after") {
                Position::After(self.identifier()?)
            } else if self.accept_keyword("first") {
                Position::First
            } else {
                Position::Last
            };
            return Ok(Command::AddColumn {
                table,
                column,
                position,
            });
        }

        self.expect_keyword("modify")?;
        self.accept_keyword("column");
        let column = self.column_def()?;
        Ok(Command::ModifyColumn { table, column })
    }

    fn show(&mut self) -> Result<Command, ClientError> {
        if self.accept_keyword("tables") {
            let pattern = if self.accept_keyword("like") {
                match self.literal()? {
                    WireValue::Bytes(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                    _ => return Err(self.error()),
                }
            } else {
                None
            };
            return Ok(Command::ShowTables { pattern });
        }

        if !self.accept_keyword("index") && !self.accept_keyword("indexes") {
            self.expect_keyword("keys")?;
        }
        if !self.accept_keyword("from") {
            self.expect_keyword("in")?;
        }
        let table = self.table_name()?;
        Ok(Command::ShowIndex { table })
    }
}

fn parse_number(text: &str) -> Option<WireValue> {
    if text.contains('.') {
        return text.parse().ok().map(WireValue::Double);
    }
    text.parse::<i64>()
        .map(WireValue::Int)
        .or_else(|_| text.parse::<u64>().map(WireValue::UInt))
        .ok()
}
