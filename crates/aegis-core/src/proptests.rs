
#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use tokio::sync::oneshot;

    use crate::{
        errors::RegistryError,
        registry::PendingRequestRegistry,
        types::{ConnectionRequest, RedirectConfig},
        uri::{build_connection_uri, build_launch_uri, parse_connection_uri, parse_launch_uri, CallbackUri},
    };

    fn optional_text() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("\\PC{1,24}")
    }

    prop_compose! {
        fn arb_request()(
            key in "[0-9a-f]{64}",
            secret in "\\PC{1,32}",
            relays in proptest::collection::vec("\\PC{1,32}", 1..4),
            perms in optional_text(),
            name in optional_text(),
            url in optional_text(),
            image in optional_text(),
            scheme in optional_text()
        ) -> ConnectionRequest {
            ConnectionRequest::builder(key, secret)
                .relays(relays)
                .permissions(perms)
                .display_name(name)
                .app_url(url)
                .app_image_url(image)
                .callback_scheme(scheme)
                .build()
                .unwrap()
        }
    }

    fn random_case(word: &str, mask: u32) -> String {
        word.chars()
            .enumerate()
            .map(|(i, c)| if mask & (1 << i) != 0 { c.to_ascii_uppercase() } else { c })
            .collect()
    }

    proptest! {
        // Connection URIs survive serialization unchanged
        #[test]
        fn test_connection_uri_round_trip(request in arb_request()) {
            let uri = build_connection_uri(&request);
            prop_assert_eq!(parse_connection_uri(&uri).unwrap(), request);
        }

        // The nested connection URI is recovered byte-for-byte from the launch URI
        #[test]
        fn test_launch_uri_round_trip(request in arb_request(), scheme in "[a-z][a-z0-9]{0,10}") {
            let connection_uri = build_connection_uri(&request);
            let redirect = RedirectConfig::for_scheme(&scheme);
            let launch = parse_launch_uri(&build_launch_uri(&connection_uri, &redirect)).unwrap();
            prop_assert_eq!(launch.connection_uri, connection_uri);
            prop_assert_eq!(launch.source, redirect.source);
            prop_assert_eq!(launch.success, redirect.success_path);
            prop_assert_eq!(launch.error, redirect.error_path);
        }

        // Each resolved token leaves the registry exactly once
        #[test]
        fn test_registry_size_tracks_resolutions(total in 1..40usize, resolved in 0..40usize) {
            let resolved = resolved.min(total);
            let registry = PendingRequestRegistry::new();
            let mut receivers = Vec::new();
            for i in 0..total {
                let (tx, rx) = oneshot::channel();
                registry.register(format!("t{i}"), tx).unwrap();
                receivers.push(rx);
            }
            for i in 0..resolved {
                let callback = CallbackUri::parse(&format!("app://x-callback-url/ok?state=t{i}")).unwrap();
                prop_assert!(registry.resolve(&callback).unwrap().is_some());
                prop_assert!(registry.resolve(&callback).unwrap().is_none());
            }
            prop_assert_eq!(registry.len(), total - resolved);
        }

        // A token-less callback is routed only when exactly one entry is pending
        #[test]
        fn test_fallback_only_with_single_pending(pending in 0..5usize) {
            let registry = PendingRequestRegistry::new();
            let mut receivers = Vec::new();
            for i in 0..pending {
                let (tx, rx) = oneshot::channel();
                registry.register(format!("t{i}"), tx).unwrap();
                receivers.push(rx);
            }
            let callback = CallbackUri::parse("app://x-callback-url/Success?pubkey=k").unwrap();

            match registry.resolve(&callback) {
                Ok(Some(_)) => prop_assert_eq!(pending, 1),
                Ok(None) => prop_assert_eq!(pending, 0),
                Err(RegistryError::AmbiguousCallback { pending: n }) => {
                    prop_assert!(pending > 1);
                    prop_assert_eq!(n, pending);
                }
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
            prop_assert_eq!(registry.len(), if pending == 1 { 0 } else { pending });
        }

        // "success" in any casing resolves with the flattened query
        #[test]
        fn test_success_marker_any_case(
            mask in 0u32..128,
            params in proptest::collection::hash_map("[a-z]{1,8}", "[a-zA-Z0-9]{0,8}", 0..5)
        ) {
            let registry = PendingRequestRegistry::new();
            let (tx, _rx) = oneshot::channel();
            registry.register("tok", tx).unwrap();

            let mut query: Vec<String> = params
                .iter()
                .filter(|(k, _)| k.as_str() != "state")
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            query.push("state=tok".into());
            let uri = format!("app://x-callback-url/{}?{}", random_case("success", mask), query.join("&"));

            let resolution = registry.resolve(&CallbackUri::parse(&uri).unwrap()).unwrap().unwrap();
            let credential = resolution.outcome().clone().unwrap();

            let mut expected: HashMap<String, String> = params
                .into_iter()
                .filter(|(k, _)| k != "state")
                .collect();
            expected.insert("state".into(), "tok".into());
            prop_assert_eq!(credential.query_parameters, expected);
            prop_assert_eq!(credential.full_callback_url, uri);
        }
    }
}
