//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value** - identity does
/// not matter, only the attribute values do. A `DocumentNumber` with the same
/// prefix and value is the same number; a `LorryReceipt` with the same fields
/// is still a different record (that one is an [`Entity`](crate::Entity)).
///
/// To "modify" a value object, construct a new one. The trait requires:
/// - **Clone**: values are cheap to copy
/// - **PartialEq**: compared by attribute values
/// - **Debug**: loggable in tests and traces
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
