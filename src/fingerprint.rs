//! Composite key resolution.
//!
//! A key sequence is turned into a `Fingerprint`: every reference part is
//! replaced by its identity tag, primitives are normalized, and the result is
//! written as a self-delimiting byte string. Each slot starts with a kind
//! byte, so strings and tags can never be confused, and every payload is
//! either fixed-width or length-prefixed, so concatenation is injective.

use crate::identity::{Identity, IdentityRegistry, IdentityTag};
use crate::key::KeyPart;

const UNDEFINED: u8 = 0;
const BOOL: u8 = 1;
const NUMBER: u8 = 2;
const STRING: u8 = 3;
const TAG: u8 = 4;

/// Injective encoding of a key sequence after identity substitution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Fingerprint(Box<[u8]>);

impl Fingerprint {
    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

enum Primitive<'a> {
    Undefined,
    Bool(bool),
    Number(f64),
    Str(&'a str),
}

enum Slot<'a> {
    Primitive(Primitive<'a>),
    Ref(Identity<'a>),
}

fn classify(part: &KeyPart) -> Slot<'_> {
    match part {
        KeyPart::Undefined => Slot::Primitive(Primitive::Undefined),
        KeyPart::Null => Slot::Ref(Identity::Null),
        KeyPart::Bool(b) => Slot::Primitive(Primitive::Bool(*b)),
        KeyPart::Number(n) => Slot::Primitive(Primitive::Number(*n)),
        KeyPart::Str(s) => Slot::Primitive(Primitive::Str(s)),
        KeyPart::Object(o) => Slot::Ref(Identity::Object(o)),
        KeyPart::Symbol(s) => Slot::Ref(Identity::Token(s)),
    }
}

/// Bit pattern under which equal numbers encode identically: one NaN, one zero.
fn number_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0f64.to_bits()
    } else {
        n.to_bits()
    }
}

struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn with_arity(n: usize) -> Self {
        Self {
            buf: Vec::with_capacity(n * 9),
        }
    }

    fn tag(&mut self, tag: IdentityTag) {
        self.buf.push(TAG);
        self.buf.extend_from_slice(&tag.id().to_le_bytes());
    }

    fn primitive(&mut self, p: Primitive<'_>) {
        match p {
            Primitive::Undefined => self.buf.push(UNDEFINED),
            Primitive::Bool(b) => {
                self.buf.push(BOOL);
                self.buf.push(u8::from(b));
            }
            Primitive::Number(n) => {
                self.buf.push(NUMBER);
                self.buf.extend_from_slice(&number_bits(n).to_le_bytes());
            }
            Primitive::Str(s) => {
                self.buf.push(STRING);
                self.buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
                self.buf.extend_from_slice(s.as_bytes());
            }
        }
    }

    fn finish(self) -> Fingerprint {
        Fingerprint(self.buf.into_boxed_slice())
    }
}

/// Read mode: fingerprint `parts` without minting. Returns `None` as soon as
/// a reference part has no tag, since no stored key can contain it.
pub(crate) fn resolve(registry: &IdentityRegistry, parts: &[KeyPart]) -> Option<Fingerprint> {
    let mut enc = Encoder::with_arity(parts.len());
    for part in parts {
        match classify(part) {
            Slot::Ref(id) => enc.tag(registry.lookup(id)?),
            Slot::Primitive(p) => enc.primitive(p),
        }
    }
    Some(enc.finish())
}

/// Write mode: fingerprint `parts`, tagging unseen references.
pub(crate) fn resolve_or_mint(registry: &mut IdentityRegistry, parts: &[KeyPart]) -> Fingerprint {
    let mut enc = Encoder::with_arity(parts.len());
    for part in parts {
        match classify(part) {
            Slot::Ref(id) => enc.tag(registry.tag_or_mint(id)),
            Slot::Primitive(p) => enc.primitive(p),
        }
    }
    enc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{ObjectRef, Symbol};

    fn fp(reg: &mut IdentityRegistry, parts: &[KeyPart]) -> Fingerprint {
        resolve_or_mint(reg, parts)
    }

    fn s(v: &str) -> KeyPart {
        KeyPart::from(v)
    }

    /// Invariant: sequences differing in length, order, kind or value encode
    /// differently.
    #[test]
    fn encoding_is_injective_on_primitives() {
        let mut reg = IdentityRegistry::new();
        let cases: Vec<Vec<KeyPart>> = vec![
            vec![],
            vec![s("")],
            vec![s("a")],
            vec![s("a"), s("")],
            vec![s("ab")],
            vec![s("a"), s("b")],
            vec![s("b"), s("a")],
            vec![KeyPart::Undefined],
            vec![KeyPart::Null],
            vec![s("null")],
            vec![s("undefined")],
            vec![KeyPart::from(1)],
            vec![s("1")],
            vec![KeyPart::from(true)],
            vec![s("true")],
            vec![KeyPart::from(false)],
            vec![KeyPart::from(0)],
            vec![KeyPart::Number(f64::NAN)],
            vec![KeyPart::Number(f64::INFINITY)],
            vec![KeyPart::Undefined, KeyPart::Undefined],
        ];
        let fps: Vec<Fingerprint> = cases.iter().map(|c| fp(&mut reg, c)).collect();
        for (i, a) in fps.iter().enumerate() {
            for (j, b) in fps.iter().enumerate().skip(i + 1) {
                assert_ne!(a, b, "{:?} vs {:?}", cases[i], cases[j]);
            }
        }
    }

    /// Invariant: numbers are normalized so NaN == NaN and +0 == -0.
    #[test]
    fn numbers_are_normalized() {
        let mut reg = IdentityRegistry::new();
        let other_nan = f64::from_bits(f64::NAN.to_bits() ^ 1);
        assert!(other_nan.is_nan());
        assert_eq!(
            fp(&mut reg, &[KeyPart::Number(f64::NAN)]),
            fp(&mut reg, &[KeyPart::Number(other_nan)])
        );
        assert_eq!(
            fp(&mut reg, &[KeyPart::Number(0.0)]),
            fp(&mut reg, &[KeyPart::Number(-0.0)])
        );
    }

    /// Invariant: a string spelling a tag never matches the tag itself.
    #[test]
    fn strings_never_collide_with_tags() {
        let mut reg = IdentityRegistry::new();
        let obj = ObjectRef::new(());
        let by_ref = fp(&mut reg, &[KeyPart::from(&obj)]);
        let tag = reg.lookup(Identity::Object(&obj)).unwrap();
        let by_text = fp(&mut reg, &[KeyPart::from(tag.to_string())]);
        assert_ne!(by_ref, by_text);
    }

    /// Invariant: read mode short-circuits on unseen references and agrees
    /// with write mode once they are tagged.
    #[test]
    fn read_mode_requires_existing_tags() {
        let mut reg = IdentityRegistry::new();
        let obj = ObjectRef::new(());
        let sym = Symbol::new("k");
        let key = [s("x"), KeyPart::from(&obj), KeyPart::from(&sym), KeyPart::Null];

        assert!(resolve(&reg, &key).is_none());
        assert_eq!(reg.object_count(), 0);
        assert_eq!(reg.token_count(), 0);

        let written = resolve_or_mint(&mut reg, &key);
        assert_eq!(resolve(&reg, &key), Some(written.clone()));
        assert_eq!(resolve_or_mint(&mut reg, &key), written);
        assert_eq!(reg.object_count(), 1);
        assert_eq!(reg.token_count(), 2);
    }

    /// Invariant: identical-looking references are different keys; the same
    /// reference twice is order-sensitive with other references.
    #[test]
    fn references_encode_by_identity() {
        let mut reg = IdentityRegistry::new();
        let a = ObjectRef::new(());
        let b = ObjectRef::new(());
        let ab = fp(&mut reg, &[KeyPart::from(&a), KeyPart::from(&b)]);
        let ba = fp(&mut reg, &[KeyPart::from(&b), KeyPart::from(&a)]);
        let aa = fp(&mut reg, &[KeyPart::from(&a), KeyPart::from(&a)]);
        assert_ne!(ab, ba);
        assert_ne!(ab, aa);
        assert_eq!(aa.as_bytes().len(), 18);
    }

    /// Invariant: only `Null`, objects and symbols go through the registry;
    /// every other part is encoded in place under its own kind byte.
    #[test]
    fn parts_are_routed_by_kind() {
        let obj = ObjectRef::new(());
        let sym = Symbol::anonymous();
        let refs = [KeyPart::Null, KeyPart::from(&obj), KeyPart::from(&sym)];
        for part in &refs {
            assert!(matches!(classify(part), Slot::Ref(_)), "{:?}", part);
        }

        let reg = IdentityRegistry::new();
        let prims = [
            (KeyPart::Undefined, UNDEFINED),
            (KeyPart::from(false), BOOL),
            (KeyPart::from(2.5), NUMBER),
            (s("x"), STRING),
        ];
        for (part, kind) in &prims {
            assert!(matches!(classify(part), Slot::Primitive(_)), "{:?}", part);
            let bytes = resolve(&reg, std::slice::from_ref(part)).unwrap();
            assert_eq!(bytes.as_bytes()[0], *kind);
        }
    }

    #[test]
    fn empty_key_encodes_to_nothing() {
        let reg = IdentityRegistry::new();
        let empty = resolve(&reg, &[]).unwrap();
        assert!(empty.as_bytes().is_empty());
    }
}
