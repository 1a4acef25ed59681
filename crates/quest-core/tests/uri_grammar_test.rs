//! Property tests for the URI grammar

use proptest::prelude::*;
use quest_core::uri::{
    classify_uris, is_dataset_name, new_dataset_name, uri_kind, ClassifyOptions, PublisherUri,
    ServiceUri, UriKind,
};

fn plugin_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

fn catalog_id() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_.-]{1,20}(/[A-Za-z0-9_.-]{1,8})?"
}

proptest! {
    #[test]
    fn service_uri_round_trips(
        provider in plugin_name(),
        service in plugin_name(),
        id in proptest::option::of(catalog_id())
    ) {
        let mut uri = ServiceUri::new(provider.clone(), service.clone());
        if let Some(id) = &id {
            uri = uri.with_catalog_id(id.clone());
        }
        let text = uri.to_string();
        let parsed: ServiceUri = text.parse().unwrap();

        prop_assert_eq!(&parsed, &uri);
        prop_assert_eq!(parsed.service_uri(), format!("svc://{}:{}", provider, service));
        prop_assert_eq!(uri_kind(&text).unwrap(), UriKind::Service);
    }

    #[test]
    fn publisher_uri_round_trips(provider in plugin_name(), publisher in plugin_name()) {
        let uri = PublisherUri::new(provider, publisher);
        let parsed: PublisherUri = uri.to_string().parse().unwrap();
        prop_assert_eq!(parsed, uri);
    }

    #[test]
    fn dataset_names_are_well_formed(_seed in 0u8..32) {
        let name = new_dataset_name();
        prop_assert_eq!(name.len(), 32);
        prop_assert!(name.starts_with('d'));
        prop_assert!(is_dataset_name(&name));
        prop_assert_eq!(uri_kind(&name).unwrap(), UriKind::Dataset);
    }

    #[test]
    fn classification_preserves_every_uri(
        services in proptest::collection::vec((plugin_name(), plugin_name()), 0..5),
        collections in proptest::collection::vec("[a-z][a-z0-9_]{0,10}", 0..5),
    ) {
        let mut uris: Vec<String> = services
            .iter()
            .map(|(p, s)| ServiceUri::new(p.clone(), s.clone()).to_string())
            .collect();
        uris.extend(collections.iter().cloned());

        let grouped = classify_uris(&uris, &ClassifyOptions::default()).unwrap();
        let total: usize = grouped.values().map(Vec::len).sum();
        prop_assert_eq!(total, uris.len());
        prop_assert_eq!(grouped.get(&UriKind::Service).map(Vec::len).unwrap_or(0), services.len());
    }
}
