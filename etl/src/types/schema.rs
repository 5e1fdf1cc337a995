use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The literal type name marking a union member as nullable.
pub const NULL_TYPE: &str = "null";

/// Type descriptor of a schema node.
///
/// Either a single type name (`"string"`) or a union of type names (`["null", "string"]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeDescriptor {
    Single(String),
    Union(Vec<String>),
}

impl TypeDescriptor {
    /// Returns all type names allowed by this descriptor.
    pub fn names(&self) -> Vec<&str> {
        match self {
            TypeDescriptor::Single(name) => vec![name.as_str()],
            TypeDescriptor::Union(names) => names.iter().map(String::as_str).collect(),
        }
    }

    /// Returns `true` if the descriptor allows the value `null`.
    pub fn allows_null(&self) -> bool {
        self.names().contains(&NULL_TYPE)
    }
}

/// Exclusive numeric bound, either the draft-4 boolean flag or the later numeric form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExclusiveBound {
    Flag(bool),
    Limit(f64),
}

/// Value of `additionalProperties`: a flag or a schema for undeclared properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<SchemaNode>),
}

/// A `pattern` keyword, compiled when the schema is read.
///
/// Matching is unanchored, as JSON Schema requires.
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.0.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.as_str()).finish()
    }
}

impl Serialize for Pattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        Pattern::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// A node of a JSON-Schema-like description.
///
/// The same shape describes a whole stream (an object with `properties`), a single property
/// and the `items` of an array, so the tree is recursive and owned top-down. Keywords that the
/// loader does not interpret are ignored when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<TypeDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<ExclusiveBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<ExclusiveBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique_items: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<SchemaNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<SchemaNode>>,
    /// Local reference such as `#/definitions/address`.
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, SchemaNode>,
}

/// A property of a [`SchemaNode`], which is itself a schema node.
pub type PropertySpec = SchemaNode;

impl SchemaNode {
    /// Creates a node with a single type name and nothing else.
    pub fn with_type(typ: &str) -> Self {
        Self {
            typ: Some(TypeDescriptor::Single(typ.to_owned())),
            ..Default::default()
        }
    }

    /// Creates a node with a union of type names.
    pub fn with_union(types: &[&str]) -> Self {
        Self {
            typ: Some(TypeDescriptor::Union(
                types.iter().map(|t| (*t).to_owned()).collect(),
            )),
            ..Default::default()
        }
    }

    /// Creates an `object` node with the supplied properties.
    pub fn object<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = (S, SchemaNode)>,
        S: Into<String>,
    {
        Self {
            typ: Some(TypeDescriptor::Single("object".to_owned())),
            properties: properties
                .into_iter()
                .map(|(name, node)| (name.into(), node))
                .collect(),
            ..Default::default()
        }
    }

    /// Returns a copy of this node with the given `format`.
    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_owned());
        self
    }

    /// Returns a copy of this node with the given `items` schema.
    pub fn with_items(mut self, items: SchemaNode) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    /// Returns `true` when `additionalProperties` is the literal `false`.
    pub fn forbids_additional_properties(&self) -> bool {
        matches!(
            self.additional_properties,
            Some(AdditionalProperties::Allowed(false))
        )
    }

    /// Returns `true` if the node combines other schemas with `allOf`, `anyOf`, `oneOf` or
    /// `not`.
    pub fn has_subschemas(&self) -> bool {
        !self.all_of.is_empty()
            || !self.any_of.is_empty()
            || !self.one_of.is_empty()
            || self.not.is_some()
    }

    /// Resolves a local JSON pointer reference (`#`, `#/definitions/x`, `#/properties/a/items`)
    /// against this node as the document root.
    pub fn resolve(&self, reference: &str) -> Option<&SchemaNode> {
        let pointer = reference.strip_prefix('#')?;
        let mut segments = pointer.split('/').skip(1).map(unescape_pointer_segment);
        let mut node = self;

        while let Some(segment) = segments.next() {
            node = match segment.as_str() {
                "definitions" => node.definitions.get(&segments.next()?)?,
                "properties" => node.properties.get(&segments.next()?)?,
                "items" => node.items.as_deref()?,
                "not" => node.not.as_deref()?,
                "additionalProperties" => match node.additional_properties.as_ref()? {
                    AdditionalProperties::Schema(schema) => &**schema,
                    AdditionalProperties::Allowed(_) => return None,
                },
                "anyOf" => node.any_of.get(segments.next()?.parse::<usize>().ok()?)?,
                "oneOf" => node.one_of.get(segments.next()?.parse::<usize>().ok()?)?,
                "allOf" => node.all_of.get(segments.next()?.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(node)
    }
}

fn unescape_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_singer_schema() {
        let raw = json!({
            "type": "object",
            "properties": {
                "id": {"type": ["null", "integer"], "inclusion": "automatic", "minimum": 0},
                "modified": {"type": ["null", "string"], "format": "date-time"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "name": {"type": ["null", "string"], "maxLength": 60}
            },
            "required": ["id"]
        });

        let node: SchemaNode = serde_json::from_value(raw).unwrap();

        assert_eq!(node.typ, Some(TypeDescriptor::Single("object".to_owned())));
        assert_eq!(node.properties.len(), 4);
        assert_eq!(node.required, vec!["id".to_owned()]);

        let id = &node.properties["id"];
        assert!(id.typ.as_ref().unwrap().allows_null());
        assert_eq!(id.minimum, Some(0.0));

        let modified = &node.properties["modified"];
        assert_eq!(modified.format.as_deref(), Some("date-time"));

        let tags = &node.properties["tags"];
        assert_eq!(
            tags.items.as_deref(),
            Some(&SchemaNode::with_type("string"))
        );

        assert_eq!(node.properties["name"].max_length, Some(60));
    }

    #[test]
    fn test_exclusive_bounds_accept_both_forms() {
        let draft4: SchemaNode =
            serde_json::from_value(json!({"minimum": 1, "exclusiveMinimum": true})).unwrap();
        assert_eq!(draft4.exclusive_minimum, Some(ExclusiveBound::Flag(true)));

        let numeric: SchemaNode =
            serde_json::from_value(json!({"exclusiveMaximum": 10.5})).unwrap();
        assert_eq!(numeric.exclusive_maximum, Some(ExclusiveBound::Limit(10.5)));
    }

    #[test]
    fn test_additional_properties_flag() {
        let closed: SchemaNode =
            serde_json::from_value(json!({"additionalProperties": false})).unwrap();
        assert!(closed.forbids_additional_properties());

        let open: SchemaNode =
            serde_json::from_value(json!({"additionalProperties": {"type": "string"}})).unwrap();
        assert!(!open.forbids_additional_properties());
        assert_eq!(
            open.additional_properties,
            Some(AdditionalProperties::Schema(Box::new(SchemaNode::with_type(
                "string"
            ))))
        );
    }

    #[test]
    fn test_invalid_pattern_fails_to_deserialize() {
        let result = serde_json::from_value::<SchemaNode>(json!({"pattern": "(unclosed"}));
        assert!(result.is_err());

        let node: SchemaNode = serde_json::from_value(json!({"pattern": "^[a-z]+$"})).unwrap();
        assert!(node.pattern.as_ref().unwrap().is_match("abc"));
        assert!(!node.pattern.as_ref().unwrap().is_match("ABC"));
    }

    #[test]
    fn test_resolve_local_references() {
        let root: SchemaNode = serde_json::from_value(json!({
            "definitions": {"money": {"type": "number", "multipleOf": 0.01}},
            "properties": {
                "price": {"$ref": "#/definitions/money"},
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        }))
        .unwrap();

        assert_eq!(
            root.properties["price"].reference.as_deref(),
            Some("#/definitions/money")
        );
        assert_eq!(
            root.resolve("#/definitions/money").and_then(|n| n.multiple_of),
            Some(0.01)
        );
        assert_eq!(
            root.resolve("#/properties/tags/items"),
            Some(&SchemaNode::with_type("string"))
        );
        assert_eq!(root.resolve("#"), Some(&root));
        assert!(root.resolve("#/definitions/missing").is_none());
        assert!(root.resolve("other.json#/definitions/money").is_none());
    }
}
