#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::config::{CliOverrides, Config};
    use crate::output::{OutputFormat, Renderer};
    use ht_core::{Anomaly, Evaluation, Notice, Verdict};

    fn verdict_strategy() -> impl Strategy<Value = Verdict> {
        prop_oneof![
            Just(Verdict::Trusted),
            Just(Verdict::Opaque),
            Just(Verdict::Warning(Anomaly::HashMismatch)),
            Just(Verdict::Warning(Anomaly::InvalidSignature)),
        ]
    }

    proptest! {
        // JSON output is always one parseable line carrying the chat fields.
        #[test]
        fn test_json_chat_is_single_line(
            sender in "[a-z]{1,10}",
            text in "\\PC{0,60}",
            verdict in verdict_strategy(),
        ) {
            let notice = Notice::Chat(Evaluation { sender: sender.clone(), text: text.clone(), verdict });
            let line = Renderer::new(OutputFormat::Json, true).render(&notice);
            prop_assert!(!line.contains('\n'));
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            prop_assert_eq!(value["username"].as_str(), Some(sender.as_str()));
            prop_assert_eq!(value["text"].as_str(), Some(text.as_str()));
            prop_assert_eq!(value.get("anomaly").is_some(), verdict.anomaly().is_some());
        }

        // Overriding only the mode leaves every other value alone.
        #[test]
        fn test_mode_override_is_isolated(mode in prop::sample::select(vec!["plain", "hashed", "encrypted", "signed"])) {
            let base = Config::default();
            let config = base.clone().with_overrides(&CliOverrides {
                mode: Some(mode.to_string()),
                ..Default::default()
            });
            prop_assert_eq!(config.session.mode.as_str(), mode);
            prop_assert_eq!(&config.hub.addr, &base.hub.addr);
            prop_assert_eq!(config.identity.key_bits, base.identity.key_bits);
            prop_assert!(config.validate().is_ok());
        }
    }
}
