#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use ht_crypto::envelope::SecurityMode;
    use ht_crypto::keys::KeyMaterial;

    use crate::command::Command;
    use crate::directory::KeyDirectory;

    fn mode_strategy() -> impl Strategy<Value = SecurityMode> {
        prop::sample::select(SecurityMode::ALL.to_vec())
    }

    proptest! {
        // Re-announcing the same key never reports a change.
        #[test]
        fn test_upsert_idempotent(user in "[a-z]{1,8}", pem in "\\PC{1,40}", repeats in 1usize..5) {
            let mut dir = KeyDirectory::new();
            prop_assert!(dir.upsert(&user, KeyMaterial::from_pem(pem.clone())).is_none());
            for _ in 0..repeats {
                prop_assert!(dir.upsert(&user, KeyMaterial::from_pem(pem.clone())).is_none());
            }
            prop_assert_eq!(dir.len(), 1);
        }

        // Each rebind to a different key is reported exactly once.
        #[test]
        fn test_rebind_reported_once(keys in prop::collection::vec("[a-z]{4}", 1..12)) {
            let mut dir = KeyDirectory::new();
            let mut current: Option<String> = None;
            let mut expected = 0usize;
            let mut reported = 0usize;
            for k in &keys {
                if matches!(&current, Some(c) if c != k) {
                    expected += 1;
                }
                if dir.upsert("alice", KeyMaterial::from_pem(k.clone())).is_some() {
                    reported += 1;
                }
                current = Some(k.clone());
            }
            prop_assert_eq!(reported, expected);
            prop_assert_eq!(dir.lookup("alice"), Some(&KeyMaterial::from_pem(keys[keys.len() - 1].clone())));
        }

        // Parsing is total and only yields commands the mode defines.
        #[test]
        fn test_command_parse_total(line in "\\PC{0,40}", mode in mode_strategy()) {
            match Command::parse(&line, mode) {
                Command::Empty => prop_assert!(line.trim().is_empty()),
                Command::Send(text) => prop_assert_eq!(text, line),
                Command::EnterSecret(_) | Command::ExitSecret => {
                    prop_assert_eq!(mode, SecurityMode::Encrypted)
                }
                Command::Impersonate(_) | Command::RevertIdentity => {
                    prop_assert_eq!(mode, SecurityMode::Signed)
                }
            }
        }

        // Any word is accepted as a command argument.
        #[test]
        fn test_command_word_argument(user in "[A-Za-z0-9_]{1,16}") {
            prop_assert_eq!(
                Command::parse(&format!("!secret {user}"), SecurityMode::Encrypted),
                Command::EnterSecret(user.clone())
            );
            prop_assert_eq!(
                Command::parse(&format!("!impersonate {user}"), SecurityMode::Signed),
                Command::Impersonate(user)
            );
        }
    }
}
