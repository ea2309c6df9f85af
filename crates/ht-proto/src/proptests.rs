#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::codec::{decode_line, encode_line, split_init};
    use crate::events::{ClientEvent, KeyRecord, ServerEvent, WireMessage};

    fn opt_field() -> impl Strategy<Value = Option<String>> {
        prop::option::of("[a-zA-Z0-9+/=]{1,40}")
    }

    proptest! {
        // A message forwarded by the hub decodes to what the client sent.
        #[test]
        fn test_message_survives_hub_forwarding(
            username in "\\PC{0,20}",
            message in "\\PC{0,200}",
            hash in opt_field(),
            signature in opt_field(),
        ) {
            let wire = WireMessage { username, message, hash, signature };
            let line = encode_line(&ClientEvent::Message(wire.clone()))?;
            let received: ServerEvent = decode_line(&line)?;
            prop_assert_eq!(received, ServerEvent::Message(wire));
        }

        // Registrations become newUser events with identical fields.
        #[test]
        fn test_registration_fields_preserved(
            username in "\\w{1,20}",
            public_key in "\\PC{0,300}",
        ) {
            let record = KeyRecord { username, public_key };
            let line = encode_line(&ClientEvent::RegisterPublicKey(record.clone()))?;
            let value: serde_json::Value = serde_json::from_str(&line)?;
            let forwarded = serde_json::json!({ "event": "newUser", "data": value["data"] });
            let received: ServerEvent = serde_json::from_value(forwarded)?;
            prop_assert_eq!(received, ServerEvent::NewUser(record));
        }

        // Splitting a roster keeps every entry once, in order, within the limit.
        #[test]
        fn test_init_split_is_lossless(
            roster in prop::collection::vec(("\\w{1,12}", "\\PC{0,60}"), 0..40),
            limit in 400usize..1200,
        ) {
            let chunks = split_init(&roster, limit)?;
            prop_assert!(!chunks.is_empty());
            for chunk in &chunks {
                let line = serde_json::to_string(&ServerEvent::Init(chunk.to_vec()))?;
                prop_assert!(line.len() <= limit);
            }
            prop_assert_eq!(chunks.concat(), roster);
        }

        // Arbitrary input never panics the decoder.
        #[test]
        fn test_decode_never_panics(line in "\\PC{0,200}") {
            let _ = decode_line::<ServerEvent>(&line);
        }
    }
}
