use anyhow::{Context, Result};
use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// Keyed, invertible, length-preserving byte transform.
///
/// Audit payloads pass through this before being appended so the trail never
/// carries descriptive text in the clear. The construction is a raw ChaCha20
/// keystream XOR: `decode(encode(x)) == x` for every byte string, and the
/// output length always equals the input length.
///
/// Key material is generated once per controller instance, never persisted,
/// and zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyedTransform {
    key: [u8; KEY_LEN],
    nonce: [u8; NONCE_LEN],
}

impl KeyedTransform {
    /// Draw a fresh key and nonce from process entropy.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut key);
        rand::rng().fill_bytes(&mut nonce);
        Self { key, nonce }
    }

    /// Build from fixed parts, for deterministic behavior in tests.
    pub fn from_parts(key: [u8; KEY_LEN], nonce: [u8; NONCE_LEN]) -> Self {
        Self { key, nonce }
    }

    fn apply(&self, data: &[u8]) -> Vec<u8> {
        let mut buf = data.to_vec();
        let mut cipher = ChaCha20::new(&self.key.into(), &self.nonce.into());
        cipher.apply_keystream(&mut buf);
        buf
    }

    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        self.apply(data)
    }

    /// Inverse of [`encode`](Self::encode). The keystream XOR is an
    /// involution, so both directions run the same cipher.
    pub fn decode(&self, data: &[u8]) -> Vec<u8> {
        self.apply(data)
    }

    pub fn encode_text(&self, text: &str) -> Vec<u8> {
        self.encode(text.as_bytes())
    }

    pub fn decode_text(&self, cipher: &[u8]) -> Result<String> {
        String::from_utf8(self.decode(cipher)).context("decoded payload is not valid UTF-8")
    }
}

impl std::fmt::Debug for KeyedTransform {
    // never expose key material through Debug output
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedTransform").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed() -> KeyedTransform {
        KeyedTransform::from_parts([7u8; KEY_LEN], [3u8; NONCE_LEN])
    }

    #[test]
    fn encode_decode_round_trip() {
        let transform = fixed();
        let plain = "system_status: stable";
        let cipher = transform.encode_text(plain);
        assert_ne!(cipher, plain.as_bytes());
        assert_eq!(transform.decode_text(&cipher).unwrap(), plain);
    }

    #[test]
    fn output_length_matches_input() {
        let transform = KeyedTransform::generate();
        for len in [0usize, 1, 16, 63, 64, 65, 1024] {
            let data = vec![0xAB; len];
            assert_eq!(transform.encode(&data).len(), len);
        }
    }

    #[test]
    fn different_keys_produce_different_ciphertext() {
        let a = KeyedTransform::from_parts([1u8; KEY_LEN], [0u8; NONCE_LEN]);
        let b = KeyedTransform::from_parts([2u8; KEY_LEN], [0u8; NONCE_LEN]);
        let plain = b"test_payload";
        assert_ne!(a.encode(plain), b.encode(plain));
    }

    #[test]
    fn decode_with_wrong_key_garbles() {
        let a = fixed();
        let b = KeyedTransform::from_parts([9u8; KEY_LEN], [3u8; NONCE_LEN]);
        let cipher = a.encode_text("test_payload");
        assert_ne!(b.decode(&cipher), b"test_payload");
    }

    proptest! {
        #[test]
        fn round_trip_holds_for_all_inputs(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            key in any::<[u8; KEY_LEN]>(),
            nonce in any::<[u8; NONCE_LEN]>(),
        ) {
            let transform = KeyedTransform::from_parts(key, nonce);
            let cipher = transform.encode(&data);
            prop_assert_eq!(cipher.len(), data.len());
            prop_assert_eq!(transform.decode(&cipher), data);
        }
    }
}
