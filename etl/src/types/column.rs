use serde::{Deserialize, Serialize};
use std::fmt;

/// Native column type of the destination store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Bool,
    Int64,
    Float64,
    String,
    Timestamp,
    Record,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ColumnType::Bool => write!(f, "BOOL"),
            ColumnType::Int64 => write!(f, "INT64"),
            ColumnType::Float64 => write!(f, "FLOAT64"),
            ColumnType::String => write!(f, "STRING"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
            ColumnType::Record => write!(f, "RECORD"),
        }
    }
}

/// Mode of a column: whether it may hold null, must hold a value, or holds a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnMode {
    Nullable,
    Required,
    Repeated,
}

impl fmt::Display for ColumnMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ColumnMode::Nullable => write!(f, "NULLABLE"),
            ColumnMode::Required => write!(f, "REQUIRED"),
            ColumnMode::Repeated => write!(f, "REPEATED"),
        }
    }
}

/// Definition of a column in the destination store.
///
/// Children are only present for [`ColumnType::Record`] columns, including repeated records.
/// A tree of [`ColumnSchema`] is immutable once produced by the translator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub typ: ColumnType,
    pub mode: ColumnMode,
    pub children: Vec<ColumnSchema>,
}

impl ColumnSchema {
    pub fn new(name: String, typ: ColumnType, mode: ColumnMode) -> ColumnSchema {
        ColumnSchema {
            name,
            typ,
            mode,
            children: Vec::new(),
        }
    }

    pub fn record(name: String, mode: ColumnMode, children: Vec<ColumnSchema>) -> ColumnSchema {
        ColumnSchema {
            name,
            typ: ColumnType::Record,
            mode,
            children,
        }
    }

    /// Returns `true` if the column holds zero or more values.
    pub fn is_repeated(&self) -> bool {
        self.mode == ColumnMode::Repeated
    }

    /// Returns the child column with the given name, if any.
    pub fn child(&self, name: &str) -> Option<&ColumnSchema> {
        self.children.iter().find(|child| child.name == name)
    }
}

impl fmt::Display for ColumnSchema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.typ, self.mode)?;

        if !self.children.is_empty() {
            f.write_str(" <")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                child.fmt(f)?;
            }
            f.write_str(">")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_nested_column() {
        let column = ColumnSchema::record(
            "lines".to_owned(),
            ColumnMode::Repeated,
            vec![
                ColumnSchema::new("sku".to_owned(), ColumnType::String, ColumnMode::Nullable),
                ColumnSchema::new("qty".to_owned(), ColumnType::Int64, ColumnMode::Required),
            ],
        );

        assert_eq!(
            column.to_string(),
            "lines RECORD REPEATED <sku STRING NULLABLE, qty INT64 REQUIRED>"
        );
        assert!(column.is_repeated());
        assert_eq!(column.child("qty").map(|c| c.typ), Some(ColumnType::Int64));
        assert!(column.child("missing").is_none());
    }
}
