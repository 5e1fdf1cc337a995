use crate::types::{
    ColumnMode, ColumnSchema, ColumnType, NULL_TYPE, PropertySpec, SchemaNode, TypeDescriptor,
};

const ARRAY_TYPE: &str = "array";
const OBJECT_TYPE: &str = "object";
const DATE_TIME_FORMAT: &str = "date-time";

/// Translates a [`SchemaNode`] into the store's column definitions.
///
/// Every property of the node yields exactly one column. Properties are visited in name order,
/// so translating the same node twice always yields the same columns in the same order.
pub fn translate_schema(schema: &SchemaNode) -> Vec<ColumnSchema> {
    schema
        .properties
        .iter()
        .map(|(name, property)| translate_property(name, property))
        .collect()
}

/// Translates a single property into a column.
///
/// A two-element union yields a column typed by its second element, nullable when the first
/// element is `"null"` and required otherwise. Other union shapes fall back to a nullable
/// string.
pub fn translate_property(name: &str, property: &PropertySpec) -> ColumnSchema {
    match &property.typ {
        Some(TypeDescriptor::Union(types)) if types.len() == 2 => {
            let mode = if types[0] == NULL_TYPE {
                ColumnMode::Nullable
            } else {
                ColumnMode::Required
            };

            translate_typed(name, &types[1], mode, property)
        }
        Some(TypeDescriptor::Single(typ)) => {
            translate_typed(name, typ, ColumnMode::Nullable, property)
        }
        Some(TypeDescriptor::Union(_)) => {
            ColumnSchema::new(name.to_owned(), ColumnType::String, ColumnMode::Nullable)
        }
        None if !property.properties.is_empty() => {
            translate_typed(name, OBJECT_TYPE, ColumnMode::Nullable, property)
        }
        None => ColumnSchema::new(name.to_owned(), ColumnType::String, ColumnMode::Nullable),
    }
}

fn translate_typed(
    name: &str,
    typ: &str,
    mode: ColumnMode,
    property: &PropertySpec,
) -> ColumnSchema {
    match typ {
        // Arrays cannot be null in the store, an absent array is stored as an empty one.
        ARRAY_TYPE => translate_array(name, property),
        OBJECT_TYPE => translate_object(name, mode, property),
        scalar => ColumnSchema::new(
            name.to_owned(),
            scalar_column_type(scalar, property.format.as_deref()),
            mode,
        ),
    }
}

fn translate_object(name: &str, mode: ColumnMode, property: &PropertySpec) -> ColumnSchema {
    // A record needs at least one field, free-form objects are kept as JSON text.
    if property.properties.is_empty() {
        return ColumnSchema::new(name.to_owned(), ColumnType::String, mode);
    }

    ColumnSchema::record(name.to_owned(), mode, translate_schema(property))
}

fn translate_array(name: &str, property: &PropertySpec) -> ColumnSchema {
    let Some(items) = property.items.as_deref() else {
        return ColumnSchema::new(name.to_owned(), ColumnType::String, ColumnMode::Repeated);
    };

    match element_type(items) {
        Some(OBJECT_TYPE) if !items.properties.is_empty() => {
            ColumnSchema::record(name.to_owned(), ColumnMode::Repeated, translate_schema(items))
        }
        // Nested arrays and free-form objects have no native element type.
        Some(ARRAY_TYPE) | Some(OBJECT_TYPE) | None => {
            ColumnSchema::new(name.to_owned(), ColumnType::String, ColumnMode::Repeated)
        }
        Some(scalar) => ColumnSchema::new(
            name.to_owned(),
            scalar_column_type(scalar, items.format.as_deref()),
            ColumnMode::Repeated,
        ),
    }
}

/// Resolves the single element type of an `items` node, looking through nullable unions.
fn element_type(items: &SchemaNode) -> Option<&str> {
    match &items.typ {
        Some(TypeDescriptor::Single(typ)) => Some(typ.as_str()),
        Some(TypeDescriptor::Union(types)) => {
            let mut non_null = types.iter().filter(|typ| *typ != NULL_TYPE);
            match (non_null.next(), non_null.next()) {
                (Some(typ), None) => Some(typ.as_str()),
                _ => None,
            }
        }
        None if !items.properties.is_empty() => Some(OBJECT_TYPE),
        None => None,
    }
}

/// Maps a scalar type name to the store's column type.
pub fn scalar_column_type(typ: &str, format: Option<&str>) -> ColumnType {
    match typ {
        "boolean" => ColumnType::Bool,
        "integer" => ColumnType::Int64,
        "number" => ColumnType::Float64,
        "string" if format == Some(DATE_TIME_FORMAT) => ColumnType::Timestamp,
        _ => ColumnType::String,
    }
}
