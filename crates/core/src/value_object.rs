//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are immutable: two `Money` values with
/// the same minor-unit amount are the same value. To "modify" one, build a new
/// one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
