/// A 32-byte BLAKE3 hash used as a fingerprint of compiler input.
///
/// The stylesheet compiler keeps the fingerprint of its last successful run,
/// so submitting unchanged settings doesn't rebuild an identical stylesheet.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for &byte in &self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(Hash32::hash("a { color: red }"), Hash32::hash("a { color: red }"));
        assert_ne!(Hash32::hash("a"), Hash32::hash("b"));
        assert_eq!(Hash32::hash("").to_hex().len(), 64);
    }
}
