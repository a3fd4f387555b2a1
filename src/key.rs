//! Key model: the closed set of values a composite key is built from.
//!
//! Primitive parts (`Undefined`, `Null`, `Bool`, `Number`, `Str`) compare by
//! value; reference parts (`Object`, `Symbol`) compare by identity.

use core::any::Any;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::Deref;
use std::rc::{Rc, Weak};

/// Shared handle to an arbitrary value whose equality is identity.
///
/// Structured objects, arrays and closures all become `ObjectRef`s. Two
/// handles are equal only when they were cloned from the same allocation.
#[derive(Clone)]
pub struct ObjectRef(Rc<dyn Any>);

impl ObjectRef {
    pub fn new<T: Any>(value: T) -> Self {
        ObjectRef(Rc::new(value))
    }

    pub fn from_rc<T: Any>(rc: Rc<T>) -> Self {
        ObjectRef(rc)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).downcast_ref::<T>()
    }

    /// Thin address of the shared allocation; stable for as long as a
    /// strong or weak reference to it exists.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn Any> {
        Rc::downgrade(&self.0)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.addr())
    }
}

struct SymbolInner {
    description: Option<Box<str>>,
}

/// Unique, unforgeable token. Two symbols are equal only if one is a clone
/// of the other; the description is informational.
#[derive(Clone)]
pub struct Symbol(Rc<SymbolInner>);

impl Symbol {
    pub fn new(description: impl Into<Box<str>>) -> Self {
        Symbol(Rc::new(SymbolInner {
            description: Some(description.into()),
        }))
    }

    pub fn anonymous() -> Self {
        Symbol(Rc::new(SymbolInner { description: None }))
    }

    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(d) => write!(f, "Symbol({d})"),
            None => f.write_str("Symbol()"),
        }
    }
}

/// One slot of a composite key.
#[derive(Clone, Debug)]
pub enum KeyPart {
    /// The absent-value sentinel. Also stands in for holes.
    Undefined,
    /// The no-value sentinel; distinct from `Undefined` and from `"null"`.
    Null,
    Bool(bool),
    /// Compared with `NaN == NaN` and `+0 == -0`.
    Number(f64),
    Str(Rc<str>),
    Object(ObjectRef),
    Symbol(Symbol),
}

impl KeyPart {
    /// True for parts compared by identity rather than by value.
    pub fn is_reference(&self) -> bool {
        matches!(self, KeyPart::Object(_) | KeyPart::Symbol(_))
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KeyPart::Undefined, KeyPart::Undefined) | (KeyPart::Null, KeyPart::Null) => true,
            (KeyPart::Bool(a), KeyPart::Bool(b)) => a == b,
            (KeyPart::Number(a), KeyPart::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (KeyPart::Str(a), KeyPart::Str(b)) => a == b,
            (KeyPart::Object(a), KeyPart::Object(b)) => a == b,
            (KeyPart::Symbol(a), KeyPart::Symbol(b)) => a == b,
            _ => false,
        }
    }
}

// SameValueZero is reflexive, so `Eq` holds even for NaN.
impl Eq for KeyPart {}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl From<f64> for KeyPart {
    fn from(n: f64) -> Self {
        KeyPart::Number(n)
    }
}

impl From<f32> for KeyPart {
    fn from(n: f32) -> Self {
        KeyPart::Number(n.into())
    }
}

impl From<i32> for KeyPart {
    fn from(n: i32) -> Self {
        KeyPart::Number(n.into())
    }
}

impl From<u32> for KeyPart {
    fn from(n: u32) -> Self {
        KeyPart::Number(n.into())
    }
}

// Wide integers become `f64`, so magnitudes above 2^53 lose precision and
// may collide with neighbouring values.
impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        KeyPart::Number(n as f64)
    }
}

impl From<u64> for KeyPart {
    fn from(n: u64) -> Self {
        KeyPart::Number(n as f64)
    }
}

impl From<usize> for KeyPart {
    fn from(n: usize) -> Self {
        KeyPart::Number(n as f64)
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(Rc::from(s))
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for KeyPart {
    fn from(s: Rc<str>) -> Self {
        KeyPart::Str(s)
    }
}

impl From<ObjectRef> for KeyPart {
    fn from(o: ObjectRef) -> Self {
        KeyPart::Object(o)
    }
}

impl From<&ObjectRef> for KeyPart {
    fn from(o: &ObjectRef) -> Self {
        KeyPart::Object(o.clone())
    }
}

impl From<Symbol> for KeyPart {
    fn from(s: Symbol) -> Self {
        KeyPart::Symbol(s)
    }
}

impl From<&Symbol> for KeyPart {
    fn from(s: &Symbol) -> Self {
        KeyPart::Symbol(s.clone())
    }
}

/// The map's own copy of a key sequence, used as the stored key.
///
/// Created once per distinct key and shared between the entry and any
/// cursor or caller that asks for it; it never aliases a caller's buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct CompositeKey(Rc<[KeyPart]>);

impl CompositeKey {
    /// Shallow copy: reference parts are shared, not cloned.
    pub(crate) fn copy_from(parts: &[KeyPart]) -> Self {
        CompositeKey(Rc::from(parts))
    }

    pub fn as_slice(&self) -> &[KeyPart] {
        &self.0
    }

    /// True if both handles point at the same stored key.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for CompositeKey {
    type Target = [KeyPart];

    fn deref(&self) -> &[KeyPart] {
        &self.0
    }
}

impl AsRef<[KeyPart]> for CompositeKey {
    fn as_ref(&self) -> &[KeyPart] {
        &self.0
    }
}

impl PartialEq<[KeyPart]> for CompositeKey {
    fn eq(&self, other: &[KeyPart]) -> bool {
        *self.0 == *other
    }
}

impl<const N: usize> PartialEq<[KeyPart; N]> for CompositeKey {
    fn eq(&self, other: &[KeyPart; N]) -> bool {
        *self.0 == other[..]
    }
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: primitives compare by SameValueZero.
    #[test]
    fn primitive_equality_rules() {
        assert_eq!(KeyPart::Number(f64::NAN), KeyPart::Number(f64::NAN));
        assert_eq!(KeyPart::Number(0.0), KeyPart::Number(-0.0));
        assert_ne!(KeyPart::Number(1.0), KeyPart::from("1"));
        assert_ne!(KeyPart::Null, KeyPart::Undefined);
        assert_ne!(KeyPart::Null, KeyPart::from("null"));
        assert_ne!(KeyPart::Undefined, KeyPart::from("undefined"));
        assert_eq!(KeyPart::from(3), KeyPart::from(3.0));
    }

    /// Invariant: references compare by identity, never structurally.
    #[test]
    fn reference_equality_is_identity() {
        let a = ObjectRef::new(());
        let b = ObjectRef::new(());
        assert_eq!(KeyPart::from(&a), KeyPart::from(a.clone()));
        assert_ne!(KeyPart::from(&a), KeyPart::from(&b));

        let s1 = Symbol::new("s");
        let s2 = Symbol::new("s");
        assert_eq!(s1, s1.clone());
        assert_ne!(s1, s2);
        assert_eq!(s1.description(), Some("s"));
        assert_eq!(Symbol::anonymous().description(), None);
    }

    /// Invariant: every integer width maps onto the same number part.
    #[test]
    fn integer_widths_agree() {
        assert_eq!(KeyPart::from(7i64), KeyPart::from(7));
        assert_eq!(KeyPart::from(7u64), KeyPart::Number(7.0));
        assert_eq!(KeyPart::from(7usize), KeyPart::from(7u32));
        assert_eq!(KeyPart::from(-1i64), KeyPart::Number(-1.0));
        // Past 2^53 neighbouring integers share one f64.
        assert_eq!(KeyPart::from(u64::MAX), KeyPart::from(u64::MAX - 1));
    }

    /// Invariant: object hashing follows identity, like equality.
    #[test]
    fn object_hash_follows_identity() {
        use std::collections::HashSet;
        let a = ObjectRef::new(1u8);
        let b = ObjectRef::new(1u8);
        let set: HashSet<ObjectRef> = [a.clone(), a.clone(), b.clone()].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a));
        assert!(set.contains(&b));
    }

    /// Invariant: `copy_from` makes an independent container holding the same
    /// reference identities.
    #[test]
    fn composite_key_is_shallow_copy() {
        let obj = ObjectRef::new(vec![1, 2, 3]);
        let mut parts = vec![KeyPart::from(&obj), KeyPart::from("x")];
        let key = CompositeKey::copy_from(&parts);
        parts.push(KeyPart::Null);

        assert_eq!(key.len(), 2);
        assert_eq!(key, [KeyPart::from(&obj), KeyPart::from("x")]);
        match &key[0] {
            KeyPart::Object(o) => {
                assert_eq!(o, &obj);
                assert_eq!(o.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
            }
            other => panic!("unexpected part: {:?}", other),
        }
    }
}
