#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use proptest::prelude::*;

    use crate::envelope::{
        sign_message, unwrap_encrypted, unwrap_hashed, verify_message, wrap_encrypted,
        wrap_hashed, DigestFailure, Envelope, SecurityMode, SignatureFailure,
    };
    use crate::fixtures;
    use crate::hash::sha256_hex;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        // Digest is deterministic and separates distinct messages.
        #[test]
        fn test_digest_determinism(a in "\\PC{0,100}", b in "\\PC{0,100}") {
            prop_assert_eq!(sha256_hex(&a), sha256_hex(&a));
            if a != b {
                prop_assert_ne!(sha256_hex(&a), sha256_hex(&b));
            }
        }

        // Any edit to a hashed payload is detected.
        #[test]
        fn test_hashed_detects_edits(msg in "\\PC{1,80}", suffix in "\\PC{1,8}") {
            let mut wire = wrap_hashed("alice", &msg).to_wire();
            wire.message.push_str(&suffix);
            let env = Envelope::from_wire(wire, SecurityMode::Hashed);
            prop_assert_eq!(unwrap_hashed(&env), Err(DigestFailure::Mismatch));
        }

        // Encrypt then decrypt under the matching key yields the plaintext.
        #[test]
        fn test_encrypt_decrypt_round_trip(msg in "[ -~]{0,60}") {
            let bob = fixtures::bob();
            let env = wrap_encrypted("alice", &msg, bob.public())?;
            prop_assert_eq!(unwrap_encrypted(&env, bob).ok(), Some(msg));
        }

        // Signatures verify, and flipping any bit of message or signature breaks them.
        #[test]
        fn test_signature_bit_flip(
            msg in prop::collection::vec(any::<u8>(), 1..64),
            flip_msg in any::<bool>(),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let alice = fixtures::alice();
            let mut sig = sign_message(&msg, alice)?;
            prop_assert!(verify_message(&msg, &sig, alice.public()).is_ok());

            let mut msg = msg;
            if flip_msg {
                let i = index.index(msg.len());
                msg[i] ^= 1 << bit;
            } else {
                let i = index.index(sig.len());
                sig[i] ^= 1 << bit;
            }
            prop_assert_eq!(
                verify_message(&msg, &sig, alice.public()),
                Err(SignatureFailure::Invalid)
            );
        }

        // Random payloads never panic the decryptor.
        #[test]
        fn test_decrypt_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..200)) {
            let wire = ht_proto::WireMessage::plain("x", BASE64.encode(&bytes));
            let env = Envelope::from_wire(wire, SecurityMode::Encrypted);
            prop_assert!(unwrap_encrypted(&env, fixtures::bob()).is_err());
        }
    }
}
