// src/packages/json.rs

//! Descriptors from package-metadata web API objects
//!
//! Only an allow-list of properties is read; each one maps onto the same
//! slot the `%FIELD%` parser fills. Types are checked strictly.

use super::desc::{Field, Slot};
use super::descriptor::PackageDescriptor;
use crate::error::{Error, Result};
use serde_json::Value;

/// JSON property names and the descriptor fields they fill
pub static JSON_FIELDS: &[(&str, Field)] = &[
    ("Name", Field::Name),
    ("PackageBase", Field::Base),
    ("Version", Field::Version),
    ("Description", Field::Desc),
    ("URL", Field::Url),
    ("Maintainer", Field::Maintainer),
    ("URLPath", Field::UrlPath),
    ("NumVotes", Field::NumVotes),
    ("Popularity", Field::Popularity),
    ("OutOfDate", Field::OutOfDate),
    ("Depends", Field::Depends),
    ("MakeDepends", Field::MakeDepends),
    ("CheckDepends", Field::CheckDepends),
    ("OptDepends", Field::OptDepends),
    ("License", Field::License),
    ("Groups", Field::Groups),
    ("Provides", Field::Provides),
    ("Replaces", Field::Replaces),
    ("Conflicts", Field::Conflicts),
];

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(property: &str, expected: &'static str, found: &Value) -> Error {
    Error::JsonType {
        field: property.to_string(),
        expected,
        found: type_name(found),
    }
}

/// Every element must be a string
fn strings<'v>(property: &str, items: &'v [Value]) -> Result<Vec<&'v str>> {
    items
        .iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| mismatch(property, "array of strings", item))
        })
        .collect()
}

fn number(v: &Value) -> Option<f64> {
    v.as_u64().map(|n| n as f64).or_else(|| v.as_f64())
}

fn cast(desc: &mut PackageDescriptor, property: &str, field: Field, value: &Value) -> Result<()> {
    match (field.slot(desc), value) {
        (Slot::Str(s), Value::String(v)) => *s = v.clone(),
        (Slot::Str(s), Value::Array(items)) => match items.as_slice() {
            [Value::String(v)] => *s = v.clone(),
            _ => return Err(mismatch(property, "string", value)),
        },
        (Slot::Str(s), Value::Null) => s.clear(),
        (Slot::Str(_), other) => return Err(mismatch(property, "string", other)),

        (Slot::List(l), Value::String(v)) => *l = vec![v.clone()],
        (Slot::List(l), Value::Array(items)) => {
            *l = strings(property, items)?.into_iter().map(str::to_string).collect();
        }
        (Slot::List(l), Value::Null) => l.clear(),
        (Slot::List(_), other) => return Err(mismatch(property, "array of strings", other)),

        (Slot::Deps(d), Value::String(v)) => *d = vec![field.parse_dependency(v)],
        (Slot::Deps(d), Value::Array(items)) => {
            *d = strings(property, items)?
                .into_iter()
                .map(|s| field.parse_dependency(s))
                .collect();
        }
        (Slot::Deps(d), Value::Null) => d.clear(),
        (Slot::Deps(_), other) => return Err(mismatch(property, "array of strings", other)),

        (Slot::Num(n), Value::Number(v)) => {
            *n = v
                .as_u64()
                .ok_or_else(|| mismatch(property, "unsigned integer", value))?;
        }
        (Slot::Num(n), Value::Null) => *n = 0,
        (Slot::Num(_), other) => return Err(mismatch(property, "unsigned integer", other)),

        (Slot::Float(x), Value::Number(_)) => *x = number(value).unwrap_or(0.0),
        (Slot::Float(x), Value::Null) => *x = 0.0,
        (Slot::Float(_), other) => return Err(mismatch(property, "number", other)),
    }
    Ok(())
}

/// Build a fresh descriptor from one API result object
pub fn from_json(object: &Value) -> Result<PackageDescriptor> {
    let map = object
        .as_object()
        .ok_or_else(|| mismatch("result", "object", object))?;

    let mut desc = PackageDescriptor::default();
    for (property, field) in JSON_FIELDS {
        match map.get(*property) {
            Some(value) => cast(&mut desc, property, *field, value)?,
            None if *field == Field::Name => return Err(Error::MissingName),
            None => {}
        }
    }

    if desc.name.is_empty() {
        return Err(Error::MissingName);
    }
    Ok(desc)
}
