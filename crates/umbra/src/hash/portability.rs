/// Classification of whether a hash may leave the process that produced it.
///
/// `Portable` is the identity element of [`Portability::combine`]; any
/// non-portable operand taints the result with its exact kind, first taint
/// wins. A persistent cache must reject everything but `Portable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Portability {
    Portable,
    /// The hash embeds a memory address.
    NonPortablePointer,
    /// The hash embeds a value only stable within one process, such as a
    /// position counter or session nonce.
    NonPortableSessionLocal,
    /// The hash embeds an absolute filesystem path with no content
    /// fingerprint available.
    NonPortableRawPath,
}

impl Portability {
    pub fn is_portable(self) -> bool {
        matches!(self, Portability::Portable)
    }

    pub fn combine(a: Portability, b: Portability) -> Portability {
        match a {
            Portability::Portable => b,
            taint => taint,
        }
    }

    /// Fold another result's portability into this accumulator.
    pub(crate) fn absorb(&mut self, other: Portability) {
        *self = Portability::combine(*self, other);
    }
}
