//! Column value types and descriptors.

/// The declared element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ValueType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    /// A string, stored as a string-table offset or inline bytes.
    String,
}

impl ValueType {
    /// Width of one element in bytes as stored in fixed layouts.
    ///
    /// Strings occupy a 32-bit offset.
    #[must_use]
    pub const fn byte_width(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 | Self::String => 4,
            Self::I64 | Self::U64 => 8,
        }
    }

    /// Width of one element in bits.
    #[must_use]
    pub const fn bit_width(self) -> u32 {
        self.byte_width() as u32 * 8
    }

    /// `true` for the signed integer types.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// `true` for 64-bit integers.
    #[must_use]
    pub const fn is_64bit(self) -> bool {
        matches!(self, Self::I64 | Self::U64)
    }

    /// `true` for 32-bit integers.
    #[must_use]
    pub const fn is_int32(self) -> bool {
        matches!(self, Self::I32 | Self::U32)
    }
}

/// How many elements a column holds per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Arity {
    /// One element.
    #[default]
    Scalar,
    /// A fixed number of elements.
    Array(u32),
    /// An array whose length is read from the file's layout metadata.
    InferredArray,
}

impl Arity {
    #[must_use]
    pub const fn is_array(self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

/// One column of a record, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnDescriptor {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub value_type: ValueType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub arity: Arity,
    /// The column holds the record id.
    #[cfg_attr(feature = "serde", serde(default))]
    pub index: bool,
    /// The column is stored in the relationship map instead of the record.
    #[cfg_attr(feature = "serde", serde(default))]
    pub non_inline_relation: bool,
    /// The column references another table's id.
    #[cfg_attr(feature = "serde", serde(default))]
    pub foreign: bool,
}

impl ColumnDescriptor {
    /// Creates a scalar column.
    #[must_use]
    pub fn scalar(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            arity: Arity::Scalar,
            index: false,
            non_inline_relation: false,
            foreign: false,
        }
    }

    /// Creates an array column with `cardinality` elements.
    #[must_use]
    pub fn array(name: impl Into<String>, value_type: ValueType, cardinality: u32) -> Self {
        Self {
            arity: Arity::Array(cardinality),
            ..Self::scalar(name, value_type)
        }
    }

    /// Creates an array column whose length comes from the file.
    #[must_use]
    pub fn inferred_array(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            arity: Arity::InferredArray,
            ..Self::scalar(name, value_type)
        }
    }

    /// Marks the column as the record id.
    #[must_use]
    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    /// Marks the column as a non-inline relation.
    #[must_use]
    pub fn relation(mut self) -> Self {
        self.non_inline_relation = true;
        self.foreign = true;
        self
    }

    /// Marks the column as a foreign key.
    #[must_use]
    pub fn foreign(mut self) -> Self {
        self.foreign = true;
        self
    }

    /// Declared element count, if fixed.
    #[must_use]
    pub const fn declared_cardinality(&self) -> Option<u32> {
        match self.arity {
            Arity::Scalar => Some(1),
            Arity::Array(n) => Some(n),
            Arity::InferredArray => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(ValueType::U8.byte_width(), 1);
        assert_eq!(ValueType::I16.bit_width(), 16);
        assert_eq!(ValueType::String.byte_width(), 4);
        assert_eq!(ValueType::U64.bit_width(), 64);
    }

    #[test]
    fn descriptor_builders() {
        let id = ColumnDescriptor::scalar("ID", ValueType::U32).index();
        assert!(id.index);
        assert_eq!(id.declared_cardinality(), Some(1));

        let arr = ColumnDescriptor::array("Flags", ValueType::U8, 3);
        assert!(arr.arity.is_array());
        assert_eq!(arr.declared_cardinality(), Some(3));

        let inferred = ColumnDescriptor::inferred_array("Tail", ValueType::F32);
        assert_eq!(inferred.declared_cardinality(), None);

        let parent = ColumnDescriptor::scalar("Parent", ValueType::U32).relation();
        assert!(parent.non_inline_relation);
        assert!(parent.foreign);
    }

    #[test]
    fn type_predicates() {
        assert!(ValueType::I64.is_64bit());
        assert!(ValueType::I64.is_signed());
        assert!(!ValueType::F32.is_signed());
        assert!(ValueType::U32.is_int32());
        assert!(!ValueType::U16.is_int32());
    }
}
