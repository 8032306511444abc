//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**; two instances with the same attribute
/// values are interchangeable. `Money` and account numbers are value objects,
/// while an `Account` is an entity.
///
/// ```ignore
/// let a = Money::parse("10.50")?;
/// let b = Money::parse("10,50")?;
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
