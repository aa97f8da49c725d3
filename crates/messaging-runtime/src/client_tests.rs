//! Tests for the client factory helpers and the native client escape hatch.

use super::*;

/// Stand-in for a provider SDK client
#[derive(Debug, PartialEq)]
struct FakeServiceBusClient {
    namespace: String,
}

fn external_client() -> NativeClient {
    NativeClient::External {
        kind: ProviderKind::AzureServiceBus,
        client: Arc::new(FakeServiceBusClient {
            namespace: "contoso".to_string(),
        }),
    }
}

mod provider_check {
    use super::*;

    #[test]
    fn test_matching_kinds_pass() {
        assert!(ensure_provider(ProviderKind::InMemory, ProviderKind::InMemory).is_ok());
    }

    #[test]
    fn test_mismatch_names_both_providers() {
        let err = ensure_provider(ProviderKind::RabbitMq, ProviderKind::InMemory).unwrap_err();

        match err {
            MessagingError::UnsupportedCapability { requested, actual } => {
                assert_eq!(requested, "rabbit_mq");
                assert_eq!(actual, "in_memory");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

mod native_client {
    use super::*;

    #[test]
    fn test_external_client_downcasts_to_its_type() {
        let native = external_client();

        let client = native.downcast::<FakeServiceBusClient>().unwrap();

        assert_eq!(client.namespace, "contoso");
    }

    #[test]
    fn test_external_client_rejects_wrong_type() {
        let result = external_client().downcast::<String>();

        assert!(matches!(
            result,
            Err(MessagingError::UnsupportedCapability { ref actual, .. }) if actual == "azure_service_bus"
        ));
    }

    #[test]
    fn test_external_client_is_not_in_memory() {
        let native = external_client();

        assert_eq!(native.kind(), ProviderKind::AzureServiceBus);
        assert!(matches!(
            native.into_in_memory(),
            Err(MessagingError::UnsupportedCapability { .. })
        ));
    }

    #[test]
    fn test_in_memory_client_narrows_both_ways() {
        let broker = InMemoryBroker::default();
        let native = NativeClient::InMemory(broker.clone());

        assert_eq!(native.kind(), ProviderKind::InMemory);
        assert!(native.clone().into_in_memory().is_ok());
        assert!(native.downcast::<InMemoryBroker>().is_ok());
    }
}
