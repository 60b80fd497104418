//! Metadata catalog interface.
//!
//! Distribution decisions only need one fact from the catalog: whether a
//! column's type can be used as a hash-distribution key. The surrounding
//! engine supplies an implementation; [`MemoryCatalog`] covers tests and
//! embedded drivers.

use std::collections::HashMap;

use arrow_schema::DataType;
use datafusion_common::Column;

use crate::error::{OptError, OptResult};

/// Synchronous column type lookup.
pub trait MetadataCatalog {
    /// Type of the given column, if the catalog knows it.
    fn column_type(&self, column: &Column) -> Option<&DataType>;

    /// Whether the engine can hash-distribute rows on this column.
    fn is_hashable(&self, column: &Column) -> OptResult<bool> {
        let data_type = self
            .column_type(column)
            .ok_or_else(|| OptError::UnknownColumn(column.clone()))?;
        Ok(is_hashable_type(data_type))
    }
}

/// Whether values of this type have a well-defined distribution hash.
///
/// Nested and dictionary-encoded types are rejected; a hashed spec built over
/// them would not round-trip through the executor's hash function.
pub fn is_hashable_type(data_type: &DataType) -> bool {
    match data_type {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _)
        | DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Binary
        | DataType::LargeBinary
        | DataType::FixedSizeBinary(_)
        | DataType::Date32
        | DataType::Date64
        | DataType::Time32(_)
        | DataType::Time64(_)
        | DataType::Timestamp(_, _) => true,
        _ => false,
    }
}

/// In-memory catalog keyed by column.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    types: HashMap<Column, DataType>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, column: Column, data_type: DataType) {
        self.types.insert(column, data_type);
    }
}

impl FromIterator<(Column, DataType)> for MemoryCatalog {
    fn from_iter<I: IntoIterator<Item = (Column, DataType)>>(columns: I) -> Self {
        Self {
            types: columns.into_iter().collect(),
        }
    }
}

impl MetadataCatalog for MemoryCatalog {
    fn column_type(&self, column: &Column) -> Option<&DataType> {
        self.types.get(column)
    }
}
