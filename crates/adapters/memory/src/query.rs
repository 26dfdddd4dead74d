//! Parser for the demo pipeline syntax.
//!
//! A query is a sequence of operations applied left to right to a set of
//! nodes. Outside brackets:
//!
//! | Syntax | Effect |
//! |--------|--------|
//! | `form=value` | lift the node if it exists |
//! | `+form` / `-form` | keep / drop nodes of a form |
//! | `+#tag` / `-#tag` | keep / drop nodes carrying a matching tag |
//! | `delnode` | delete every node in the pipeline |
//! | `macro.exec name` | run a macro on the pipeline |
//! | `raise` | fail the query |
//!
//! Inside `[ ... ]` each token is an edit: `form=value` creates a node,
//! `+#tag` / `-#tag` add or remove a tag and `:prop=value` sets a property.
//! Braces and `|` are accepted and ignored.

use nodehook_domain::error::QueryError;
use nodehook_domain::node::{NodeRef, validate_form};
use nodehook_domain::tag::{TagPattern, normalize_tag};

/// One pipeline operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Lift(NodeRef),
    Edit(Vec<Edit>),
    FilterForm { keep: bool, form: String },
    FilterTag { keep: bool, pattern: TagPattern },
    DelNode,
    MacroExec(String),
    Raise,
}

/// One edit inside brackets.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Create(NodeRef),
    AddTag(String),
    DelTag(String),
    SetProp {
        prop: String,
        value: serde_json::Value,
    },
}

/// Parse a whole query. Nothing runs if any part is malformed.
///
/// # Errors
///
/// Returns [`QueryError::Syntax`] describing the first bad token.
pub fn parse(query: &str) -> Result<Vec<Op>, QueryError> {
    let tokens = tokenize(query);
    let mut ops = Vec::new();
    let mut iter = tokens.into_iter();

    while let Some(token) = iter.next() {
        match token.as_str() {
            "{" | "}" | "|" => {}
            "[" => {
                let mut edits = Vec::new();
                loop {
                    match iter.next().as_deref() {
                        Some("]") => break,
                        Some(token) => edits.push(parse_edit(token)?),
                        None => return Err(syntax("unclosed [")),
                    }
                }
                ops.push(Op::Edit(edits));
            }
            "]" => return Err(syntax("unexpected ]")),
            "delnode" => ops.push(Op::DelNode),
            "raise" => ops.push(Op::Raise),
            "macro.exec" => {
                let name = iter
                    .next()
                    .filter(|name| !matches!(name.as_str(), "[" | "]" | "{" | "}" | "|"))
                    .ok_or_else(|| syntax("macro.exec needs a macro name"))?;
                ops.push(Op::MacroExec(name));
            }
            other => ops.push(parse_pipeline_token(other)?),
        }
    }
    Ok(ops)
}

fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in query.chars() {
        if c.is_whitespace() || matches!(c, '[' | ']' | '{' | '}' | '|') {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            if !c.is_whitespace() {
                tokens.push(c.to_string());
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_pipeline_token(token: &str) -> Result<Op, QueryError> {
    if let Some(rest) = token.strip_prefix('+') {
        return parse_filter(true, rest);
    }
    if let Some(rest) = token.strip_prefix('-') {
        return parse_filter(false, rest);
    }
    if token.contains('=') {
        return parse_node(token).map(Op::Lift);
    }
    Err(syntax(format!("unknown operation {token:?}")))
}

fn parse_filter(keep: bool, rest: &str) -> Result<Op, QueryError> {
    if rest.starts_with('#') {
        let pattern = TagPattern::parse(rest).map_err(|err| syntax(err.to_string()))?;
        return Ok(Op::FilterTag { keep, pattern });
    }
    validate_form(rest).map_err(|err| syntax(err.to_string()))?;
    Ok(Op::FilterForm {
        keep,
        form: rest.to_string(),
    })
}

fn parse_edit(token: &str) -> Result<Edit, QueryError> {
    if let Some(tag) = token.strip_prefix("+#") {
        return normalize_tag(tag)
            .map(Edit::AddTag)
            .map_err(|err| syntax(err.to_string()));
    }
    if let Some(tag) = token.strip_prefix("-#") {
        return normalize_tag(tag)
            .map(Edit::DelTag)
            .map_err(|err| syntax(err.to_string()));
    }
    if let Some(assignment) = token.strip_prefix(':') {
        let (prop, value) = assignment
            .split_once('=')
            .ok_or_else(|| syntax(format!("property edit {token:?} needs a value")))?;
        validate_form(prop).map_err(|_| syntax(format!("bad property name {prop:?}")))?;
        if value.is_empty() {
            return Err(syntax(format!("property edit {token:?} needs a value")));
        }
        return Ok(Edit::SetProp {
            prop: prop.to_string(),
            value: parse_value(value),
        });
    }
    parse_node(token).map(Edit::Create)
}

fn parse_node(token: &str) -> Result<NodeRef, QueryError> {
    let (form, value) = token
        .split_once('=')
        .ok_or_else(|| syntax(format!("expected form=value, got {token:?}")))?;
    validate_form(form).map_err(|err| syntax(err.to_string()))?;
    if value.is_empty() {
        return Err(syntax(format!("{form} needs a primary value")));
    }
    Ok(NodeRef::new(form, value))
}

/// Numbers and booleans are stored as JSON scalars, everything else as a
/// string.
fn parse_value(text: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => value,
        _ => serde_json::Value::String(text.to_string()),
    }
}

fn syntax(message: impl Into<String>) -> QueryError {
    QueryError::Syntax(message.into())
}
