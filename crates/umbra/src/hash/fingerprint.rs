use std::fmt;

use sha2::{Digest, Sha256};

const PLACEHOLDER_DOMAIN: &[u8] = b"umbra:placeholder";
const BACK_REF_DOMAIN: u8 = 0xfe;
const COMBINE_DOMAIN: u8 = 0xfd;

/// A 256-bit digest. Shared machinery behind [`ContentHash`] and
/// [`StructuralHash`]; the two wrappers exist so the compiler rejects mixing
/// process-local and cross-run hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub const WIDTH: usize = 32;

    /// Digest of arbitrary input bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut writer = FingerprintWriter::new();
        writer.raw(bytes);
        writer.finish()
    }

    pub fn of_str(text: &str) -> Self {
        Self::of_bytes(text.as_bytes())
    }

    pub fn from_raw(raw: [u8; 32]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Fixed sentinel standing in for "cycle detected at unknown position"
    /// and for inputs the hashers refuse to read (oversized environments).
    pub fn placeholder() -> Self {
        Self::of_bytes(PLACEHOLDER_DOMAIN)
    }

    /// Encodes "cycle pointing `depth` frames up the ancestor stack".
    /// Distinct depths give distinct digests; equal depths give equal ones.
    pub fn back_ref(depth: usize) -> Self {
        let mut writer = FingerprintWriter::new();
        writer.tag(BACK_REF_DOMAIN);
        writer.u64(depth as u64);
        writer.finish()
    }

    /// Order-sensitive aggregation of several digests into one.
    pub fn combine(parts: &[Fingerprint]) -> Self {
        let mut writer = FingerprintWriter::new();
        writer.tag(COMBINE_DOMAIN);
        writer.u64(parts.len() as u64);
        for part in parts {
            writer.fingerprint(part);
        }
        writer.finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Incremental digest builder. All multi-byte integers go through here
/// little-endian so hashes do not depend on machine endianness, and all
/// variable-length fields are length-prefixed so adjacent fields cannot
/// bleed into each other.
pub(crate) struct FingerprintWriter {
    inner: Sha256,
}

impl FingerprintWriter {
    pub(crate) fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    pub(crate) fn tag(&mut self, tag: u8) {
        self.inner.update([tag]);
    }

    pub(crate) fn u8(&mut self, value: u8) {
        self.inner.update([value]);
    }

    pub(crate) fn u32(&mut self, value: u32) {
        self.inner.update(value.to_le_bytes());
    }

    pub(crate) fn u64(&mut self, value: u64) {
        self.inner.update(value.to_le_bytes());
    }

    pub(crate) fn i64(&mut self, value: i64) {
        self.inner.update(value.to_le_bytes());
    }

    pub(crate) fn f64_bits(&mut self, bits: u64) {
        self.inner.update(bits.to_le_bytes());
    }

    /// Length-prefixed byte string.
    pub(crate) fn bytes(&mut self, bytes: &[u8]) {
        self.u64(bytes.len() as u64);
        self.inner.update(bytes);
    }

    pub(crate) fn str(&mut self, text: &str) {
        self.bytes(text.as_bytes());
    }

    /// Unprefixed bytes; only for fixed-width material.
    pub(crate) fn raw(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub(crate) fn fingerprint(&mut self, fingerprint: &Fingerprint) {
        self.inner.update(fingerprint.as_bytes());
    }

    pub(crate) fn finish(self) -> Fingerprint {
        Fingerprint(self.inner.finalize().into())
    }
}

macro_rules! hash_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Fingerprint);

        impl $name {
            pub fn of_bytes(bytes: &[u8]) -> Self {
                Self(Fingerprint::of_bytes(bytes))
            }

            pub fn of_str(text: &str) -> Self {
                Self(Fingerprint::of_str(text))
            }

            pub fn from_fingerprint(fingerprint: Fingerprint) -> Self {
                Self(fingerprint)
            }

            pub fn placeholder() -> Self {
                Self(Fingerprint::placeholder())
            }

            pub fn back_ref(depth: usize) -> Self {
                Self(Fingerprint::back_ref(depth))
            }

            pub fn combine(parts: &[Self]) -> Self {
                let parts: Vec<Fingerprint> = parts.iter().map(|part| part.0).collect();
                Self(Fingerprint::combine(&parts))
            }

            pub fn fingerprint(&self) -> Fingerprint {
                self.0
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

hash_newtype!(
    /// A hash intended to be stable across processes and machines, provided
    /// its [`super::Portability`] says so.
    ContentHash
);

hash_newtype!(
    /// A hash valid only for the lifetime of one evaluation process; it may
    /// embed pointer identity or other session-local material.
    StructuralHash
);
