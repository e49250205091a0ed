//! Ordered table schemas.

use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use crate::error::SchemaError;
use crate::types::DataType;

/// An ordered mapping from column name to type.
///
/// Lookup is by name; iteration follows declaration order, and two schemas
/// with the same columns in a different order are different schemas.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: IndexMap<String, DataType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from name/type pairs, rejecting duplicate names.
    pub fn from_fields<I, S>(fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        let mut schema = Schema::new();
        for (name, ty) in fields {
            schema.push(name.into(), ty)?;
        }
        Ok(schema)
    }

    /// Build a schema from name/type-text pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self, SchemaError> {
        let mut schema = Schema::new();
        for (name, text) in pairs {
            let ty = DataType::parse(text).map_err(|source| SchemaError::InvalidType {
                name: name.to_string(),
                source,
            })?;
            schema.push(name.to_string(), ty)?;
        }
        Ok(schema)
    }

    fn push(&mut self, name: String, ty: DataType) -> Result<(), SchemaError> {
        if self.fields.contains_key(&name) {
            return Err(SchemaError::DuplicateName(name));
        }
        self.fields.insert(name, ty);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.fields.get(name)
    }

    /// Look up a column, failing with `ColumnNotFound`.
    pub fn field(&self, name: &str) -> Result<&DataType, SchemaError> {
        self.get(name)
            .ok_or_else(|| SchemaError::ColumnNotFound(name.to_string()))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.get_index_of(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn types(&self) -> impl Iterator<Item = &DataType> {
        self.fields.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataType)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl Eq for Schema {}

impl Hash for Schema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for (name, ty) in self.iter() {
            name.hash(state);
            ty.hash(state);
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.names().map(str::len).max().unwrap_or(0);
        write!(f, "Schema {{")?;
        for (name, ty) in self.iter() {
            write!(f, "\n  {:width$}  {}", name, ty, width = width)?;
        }
        write!(f, "\n}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(schema: &Schema) -> u64 {
        let mut hasher = DefaultHasher::new();
        schema.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_from_pairs() {
        let schema = Schema::from_pairs(&[("a", "int64"), ("b", "array<string>")]).unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.get("a"), Some(&DataType::int64()));
        assert_eq!(schema.index_of("b"), Some(1));
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Schema::from_pairs(&[("a", "int64"), ("a", "string")]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateName(name) if name == "a"));
    }

    #[test]
    fn test_invalid_type_reports_column() {
        let err = Schema::from_pairs(&[("a", "array<")]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidType { name, .. } if name == "a"));
    }

    #[test]
    fn test_order_is_significant() {
        let ab = Schema::from_pairs(&[("a", "int8"), ("b", "string")]).unwrap();
        let ba = Schema::from_pairs(&[("b", "string"), ("a", "int8")]).unwrap();
        assert_ne!(ab, ba);
        assert_eq!(ab.get("a"), ba.get("a"));

        let ab2 = Schema::from_pairs(&[("a", "int8"), ("b", "string")]).unwrap();
        assert_eq!(ab, ab2);
        assert_eq!(hash_of(&ab), hash_of(&ab2));
    }

    #[test]
    fn test_missing_field() {
        let schema = Schema::from_pairs(&[("a", "int8")]).unwrap();
        assert!(matches!(schema.field("z"), Err(SchemaError::ColumnNotFound(n)) if n == "z"));
    }

    #[test]
    fn test_display() {
        let schema = Schema::from_pairs(&[("id", "!int64"), ("label", "string")]).unwrap();
        assert_eq!(schema.to_string(), "Schema {\n  id     !int64\n  label  string\n}");
    }
}
