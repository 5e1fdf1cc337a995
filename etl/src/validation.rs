//! Validation of raw records against the JSON-Schema-like schema of their stream.
//!
//! Follows draft 4 semantics for `type`, `enum`, `properties`, `required`,
//! `additionalProperties`, `items`, `minItems`/`maxItems`, `uniqueItems`, `allOf`, `anyOf`,
//! `oneOf`, `not`, local `$ref`s, `pattern`, string lengths, numeric bounds, `multipleOf` and
//! the `date-time` and `date` formats. Other keywords are ignored.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use std::fmt;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{AdditionalProperties, ExclusiveBound, NULL_TYPE, SchemaNode};

const DATE_TIME_FORMAT: &str = "date-time";
const DATE_FORMAT: &str = "date";

/// Maximum number of references followed in a row before giving up.
const MAX_REFERENCE_HOPS: usize = 32;

const MULTIPLE_OF_TOLERANCE: f64 = 1e-9;

/// Location of a value inside a record, e.g. `address.lines[2].sku`.
#[derive(Debug, Clone, Default)]
struct FieldPath(Vec<PathSegment>);

#[derive(Debug, Clone)]
enum PathSegment {
    Field(String),
    Index(usize),
}

impl FieldPath {
    fn field(&self, name: &str) -> FieldPath {
        let mut path = self.clone();
        path.0.push(PathSegment::Field(name.to_owned()));
        path
    }

    fn index(&self, index: usize) -> FieldPath {
        let mut path = self.clone();
        path.0.push(PathSegment::Index(index));
        path
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<record>");
        }

        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => write!(f, "{name}")?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }

        Ok(())
    }
}

/// A single failed check.
#[derive(Debug, Clone)]
pub struct Violation {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "field `{}`: {}", self.path, self.reason)
    }
}

/// Validates records against the currently registered schema of their stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator;

impl RecordValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates `record` against `schema`.
    ///
    /// Fails with [`ErrorKind::ValidationError`] listing every violation found, each prefixed
    /// with the field path that caused it.
    pub fn validate(
        &self,
        stream: &str,
        record: &Map<String, Value>,
        schema: &SchemaNode,
    ) -> EtlResult<()> {
        let violations = self.violations(record, schema);
        if violations.is_empty() {
            return Ok(());
        }

        let detail = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");

        bail!(
            ErrorKind::ValidationError,
            "Record does not match stream schema",
            format!("stream `{stream}`, {detail}")
        );
    }

    /// Returns every violation of `record` against `schema`.
    ///
    /// `schema` is also the document `$ref`s are resolved against.
    pub fn violations(&self, record: &Map<String, Value>, schema: &SchemaNode) -> Vec<Violation> {
        let mut violations = Vec::new();
        let walker = Walker { root: schema };
        let path = FieldPath::default();

        // Keywords applying to the record as a whole need it as a value.
        if schema.reference.is_some() || schema.has_subschemas() {
            let record = Value::Object(record.clone());
            walker.validate_node(&record, schema, &path, 0, &mut violations);
        } else {
            walker.validate_object(record, schema, &path, &mut violations);
        }

        violations
    }
}

/// Walks a value and its schema node side by side.
struct Walker<'a> {
    root: &'a SchemaNode,
}

impl Walker<'_> {
    /// `hops` counts the references followed without descending into the value, so that a
    /// reference cycle ends in a violation.
    fn validate_node(
        &self,
        value: &Value,
        node: &SchemaNode,
        path: &FieldPath,
        hops: usize,
        out: &mut Vec<Violation>,
    ) {
        if let Some(reference) = &node.reference {
            if hops >= MAX_REFERENCE_HOPS {
                push(out, path, format!("reference `{reference}` does not terminate"));
                return;
            }

            // Keywords next to `$ref` are ignored.
            match self.root.resolve(reference) {
                Some(target) => self.validate_node(value, target, path, hops + 1, out),
                None => push(out, path, format!("cannot resolve reference `{reference}`")),
            }
            return;
        }

        if let Some(typ) = &node.typ {
            let names = typ.names();
            if !names.iter().any(|name| matches_type(value, name)) {
                push(out, path, format!("expected {}, found {}", names.join(" or "), kind_of(value)));
                return;
            }
        }

        if let Some(allowed) = &node.enum_values {
            if !allowed.contains(value) {
                push(out, path, format!("value {value} is not one of the allowed values"));
                return;
            }
        }

        self.validate_subschemas(value, node, path, hops, out);

        match value {
            Value::Object(map) => self.validate_object(map, node, path, out),
            Value::Array(elements) => self.validate_array(elements, node, path, out),
            Value::String(string) => validate_string(string, node, path, out),
            Value::Number(number) => {
                if let Some(number) = number.as_f64() {
                    validate_number(number, node, path, out);
                }
            }
            Value::Bool(_) | Value::Null => {}
        }
    }

    fn validate_subschemas(
        &self,
        value: &Value,
        node: &SchemaNode,
        path: &FieldPath,
        hops: usize,
        out: &mut Vec<Violation>,
    ) {
        for schema in &node.all_of {
            self.validate_node(value, schema, path, hops, out);
        }

        if !node.any_of.is_empty()
            && !node
                .any_of
                .iter()
                .any(|schema| self.is_valid(value, schema, path, hops))
        {
            push(out, path, "does not match any schema of anyOf".to_owned());
        }

        if !node.one_of.is_empty() {
            let matching = node
                .one_of
                .iter()
                .filter(|schema| self.is_valid(value, schema, path, hops))
                .count();
            if matching != 1 {
                push(
                    out,
                    path,
                    format!("matches {matching} schemas of oneOf, expected exactly one"),
                );
            }
        }

        if let Some(excluded) = node.not.as_deref() {
            if self.is_valid(value, excluded, path, hops) {
                push(out, path, "matches the schema of not".to_owned());
            }
        }
    }

    fn is_valid(&self, value: &Value, node: &SchemaNode, path: &FieldPath, hops: usize) -> bool {
        let mut scratch = Vec::new();
        self.validate_node(value, node, path, hops, &mut scratch);

        scratch.is_empty()
    }

    fn validate_object(
        &self,
        map: &Map<String, Value>,
        node: &SchemaNode,
        path: &FieldPath,
        out: &mut Vec<Violation>,
    ) {
        for name in &node.required {
            if !map.contains_key(name) {
                push(out, &path.field(name), "required property is missing".to_owned());
            }
        }

        for (name, value) in map {
            match (node.properties.get(name), &node.additional_properties) {
                (Some(property), _) => {
                    self.validate_node(value, property, &path.field(name), 0, out)
                }
                (None, Some(AdditionalProperties::Allowed(false))) => push(
                    out,
                    &path.field(name),
                    "additional properties are not allowed".to_owned(),
                ),
                (None, Some(AdditionalProperties::Schema(schema))) => {
                    self.validate_node(value, schema, &path.field(name), 0, out)
                }
                (None, _) => {}
            }
        }
    }

    fn validate_array(
        &self,
        elements: &[Value],
        node: &SchemaNode,
        path: &FieldPath,
        out: &mut Vec<Violation>,
    ) {
        let count = elements.len() as u64;
        if node.min_items.is_some_and(|min_items| count < min_items) {
            push(out, path, format!("{count} items are fewer than the minimum"));
        }
        if node.max_items.is_some_and(|max_items| count > max_items) {
            push(out, path, format!("{count} items are more than the maximum"));
        }

        if node.unique_items {
            let duplicate = elements
                .iter()
                .enumerate()
                .any(|(i, element)| elements[..i].contains(element));
            if duplicate {
                push(out, path, "items are not unique".to_owned());
            }
        }

        if let Some(items) = node.items.as_deref() {
            for (i, element) in elements.iter().enumerate() {
                self.validate_node(element, items, &path.index(i), 0, out);
            }
        }
    }
}

fn validate_string(string: &str, node: &SchemaNode, path: &FieldPath, out: &mut Vec<Violation>) {
    match node.format.as_deref() {
        Some(DATE_TIME_FORMAT) if DateTime::parse_from_rfc3339(string).is_err() => {
            push(out, path, format!("'{string}' is not a valid date-time"));
        }
        Some(DATE_FORMAT) if NaiveDate::parse_from_str(string, "%Y-%m-%d").is_err() => {
            push(out, path, format!("'{string}' is not a valid date"));
        }
        _ => {}
    }

    let length = string.chars().count() as u64;
    if node.min_length.is_some_and(|min_length| length < min_length) {
        push(out, path, format!("length {length} is shorter than the minimum"));
    }
    if node.max_length.is_some_and(|max_length| length > max_length) {
        push(out, path, format!("length {length} is longer than the maximum"));
    }

    if let Some(pattern) = &node.pattern {
        if !pattern.is_match(string) {
            push(out, path, format!("'{string}' does not match '{}'", pattern.as_str()));
        }
    }
}

fn validate_number(number: f64, node: &SchemaNode, path: &FieldPath, out: &mut Vec<Violation>) {
    let exclusive_minimum = matches!(node.exclusive_minimum, Some(ExclusiveBound::Flag(true)));
    let exclusive_maximum = matches!(node.exclusive_maximum, Some(ExclusiveBound::Flag(true)));

    if let Some(minimum) = node.minimum {
        if exclusive_minimum && number <= minimum {
            push(out, path, format!("{number} is not greater than {minimum}"));
        } else if number < minimum {
            push(out, path, format!("{number} is less than the minimum of {minimum}"));
        }
    }
    if let Some(maximum) = node.maximum {
        if exclusive_maximum && number >= maximum {
            push(out, path, format!("{number} is not less than {maximum}"));
        } else if number > maximum {
            push(out, path, format!("{number} is greater than the maximum of {maximum}"));
        }
    }

    if let Some(ExclusiveBound::Limit(limit)) = node.exclusive_minimum {
        if number <= limit {
            push(out, path, format!("{number} is not greater than {limit}"));
        }
    }
    if let Some(ExclusiveBound::Limit(limit)) = node.exclusive_maximum {
        if number >= limit {
            push(out, path, format!("{number} is not less than {limit}"));
        }
    }

    if let Some(multiple_of) = node.multiple_of.filter(|multiple_of| *multiple_of > 0.0) {
        if !is_multiple_of(number, multiple_of) {
            push(out, path, format!("{number} is not a multiple of {multiple_of}"));
        }
    }
}

/// Decimal divisors such as `0.01` have no exact binary form, so the quotient is compared to
/// the nearest integer with a relative tolerance.
fn is_multiple_of(number: f64, multiple_of: f64) -> bool {
    let quotient = number / multiple_of;
    if !quotient.is_finite() {
        return false;
    }

    (quotient - quotient.round()).abs() <= MULTIPLE_OF_TOLERANCE * quotient.abs().max(1.0)
}

/// Returns `true` if `value` is an instance of the JSON-Schema type `name`.
///
/// Unknown type names accept any value.
fn matches_type(value: &Value, name: &str) -> bool {
    match name {
        NULL_TYPE => value.is_null(),
        "boolean" => value.is_boolean(),
        "integer" => match value {
            Value::Number(number) => {
                number.is_i64()
                    || number.is_u64()
                    || number.as_f64().is_some_and(|n| n.is_finite() && n.fract() == 0.0)
            }
            _ => false,
        },
        "number" => value.is_number(),
        "string" => value.is_string(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn push(out: &mut Vec<Violation>, path: &FieldPath, reason: String) {
    out.push(Violation {
        path: path.to_string(),
        reason,
    });
}
