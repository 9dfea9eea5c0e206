
#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use crate::identity::{verify, KeyPair};

    fn key_pair_from_seed(seed: [u8; 32]) -> Option<KeyPair> {
        // Out-of-range scalars are rejected; proptest discards those cases.
        KeyPair::from_secret_bytes(&seed).ok()
    }

    proptest! {
        // Signature round-trip for arbitrary keys and messages
        #[test]
        fn test_sign_verify_round_trip(
            seed in any::<[u8; 32]>(),
            aux in any::<[u8; 32]>(),
            message in any::<Vec<u8>>()
        ) {
            let kp = key_pair_from_seed(seed);
            prop_assume!(kp.is_some());
            let kp = kp.unwrap();
            let sig = kp.sign_with_aux_rand(&message, &aux).unwrap();
            prop_assert!(verify(&kp.public_key(), &message, &sig));
        }

        // Flipping any single signature byte breaks verification
        #[test]
        fn test_signature_byte_flip_fails(
            seed in any::<[u8; 32]>(),
            message in any::<Vec<u8>>(),
            index in 0..64usize,
            flip in 1..=255u8
        ) {
            let kp = key_pair_from_seed(seed);
            prop_assume!(kp.is_some());
            let kp = kp.unwrap();
            let mut sig = kp.sign(&message).unwrap();
            sig[index] ^= flip;
            prop_assert!(!verify(&kp.public_key(), &message, &sig));
        }

        // Deterministic derivation of the x-only public key
        #[test]
        fn test_public_key_determinism(seed in any::<[u8; 32]>()) {
            let a = key_pair_from_seed(seed);
            prop_assume!(a.is_some());
            let a = a.unwrap();
            let b = KeyPair::from_secret_hex(a.secret_key_hex()).unwrap();
            prop_assert_eq!(a.public_key_hex(), b.public_key_hex());
            prop_assert_eq!(a.public_key_hex().len(), 64);
        }

        // Verification never panics on garbage
        #[test]
        fn test_verify_garbage_is_false(
            pk in any::<Vec<u8>>(),
            message in any::<Vec<u8>>(),
            sig in any::<Vec<u8>>()
        ) {
            prop_assume!(pk.len() != 32 || sig.len() != 64);
            prop_assert!(!verify(&pk, &message, &sig));
        }
    }
}
