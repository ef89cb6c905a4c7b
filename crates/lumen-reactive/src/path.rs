#![forbid(unsafe_code)]

//! Dotted-path getters for watch expressions.

use std::rc::Rc;

use crate::value::Value;
use crate::watcher::Getter;

/// Parse a simple dot-delimited path. Returns `None` when the expression
/// contains anything beyond identifier characters, `$`, and dots.
#[must_use]
pub fn parse_path(path: &str) -> Option<Vec<Rc<str>>> {
    if path.is_empty()
        || !path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
    {
        return None;
    }
    Some(path.split('.').map(Rc::from).collect())
}

/// Build a getter walking the owner context by path. Reads go through the
/// tracked object accessors; missing intermediate keys yield `Null`.
#[must_use]
pub fn path_getter(path: &str) -> Option<Getter> {
    let segments = parse_path(path)?;
    Some(Box::new(move |ctx: &Value| {
        let mut cur = ctx.clone();
        for seg in &segments {
            match cur {
                Value::Object(obj) => cur = obj.get(seg),
                _ => return Ok(Value::Null),
            }
        }
        Ok(cur)
    }))
}
