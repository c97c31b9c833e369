//! End-to-end behaviour of the registry over the memory provider

use futures_util::TryStreamExt;
use nimbus_cloud::memory::{MEMORY_IMAGE, MEMORY_ZONE};
use nimbus_cloud::{
    CachePolicy, CloudError, ComputeClient, ComputeConnector, ConnectorSettings,
    DestructionStatus, Instance, InstanceConnector, InstanceCreationRequest, InstanceStatus,
    InventorySystem, MemoryCompute, MemoryInventory, ProviderRegistry, TagUpdateStatus,
};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    registry: ProviderRegistry,
    compute: Arc<MemoryCompute>,
    inventory: Arc<MemoryInventory>,
}

async fn fixture_with(compute: MemoryCompute) -> Fixture {
    let compute = Arc::new(compute);
    let inventory = Arc::new(MemoryInventory::new("lab.example.com"));
    let connector = ComputeConnector::connect(
        ConnectorSettings::new("Lab", MEMORY_IMAGE),
        compute.clone(),
        inventory.clone(),
        CachePolicy::default(),
    )
    .await
    .unwrap();
    let registry =
        ProviderRegistry::new(vec![("p1".to_string(), Arc::new(connector) as Arc<dyn InstanceConnector>)])
            .unwrap();
    Fixture {
        registry,
        compute,
        inventory,
    }
}

async fn fixture() -> Fixture {
    fixture_with(MemoryCompute::new()).await
}

#[tokio::test]
async fn test_unknown_id_is_not_found_everywhere() {
    let fx = fixture().await;
    fx.registry
        .create(&InstanceCreationRequest::new("p1", MEMORY_ZONE, "m1.tiny", "web"))
        .await
        .unwrap();

    assert!(fx.registry.find_first("never-issued").await.unwrap().is_none());
    assert_eq!(
        fx.registry.destroy_first("never-issued").await.unwrap(),
        DestructionStatus::NotFound
    );
}

#[tokio::test]
async fn test_create_then_read_matches_request() {
    let fx = fixture().await;
    let request = InstanceCreationRequest::new("p1", MEMORY_ZONE, "c1.small", "web")
        .with_roles(["web", "frontend"]);
    let created = fx.registry.create(&request).await.unwrap();

    let read = fx.registry.find_first(&created.id).await.unwrap().unwrap();
    assert_eq!(read.id, created.id);
    assert_eq!(read.size, "c1.small");
    assert_eq!(read.location.as_deref(), Some(MEMORY_ZONE));
    assert_eq!(read.status, InstanceStatus::Building);
    assert_eq!(read.provider.as_deref(), Some("p1"));

    let fqdn = format!("{}.lab.example.com", created.id);
    assert_eq!(read.hostname.as_deref(), Some(fqdn.as_str()));
    let system = fx.inventory.system(&fqdn).unwrap();
    assert_eq!(system.roles.len(), 2);
}

#[tokio::test]
async fn test_add_tag_visible_through_warm_cache() {
    let fx = fixture().await;
    let created = fx
        .registry
        .create(&InstanceCreationRequest::new("p1", MEMORY_ZONE, "m1.tiny", "web"))
        .await
        .unwrap();
    fx.compute.set_status(&created.id, "ACTIVE");

    // warm the cache with the pre-mutation view
    let before = fx.registry.find_first(&created.id).await.unwrap().unwrap();
    assert!(before.tags.is_empty());

    assert_eq!(
        fx.registry.add_tag(&created.id, "blue").await.unwrap(),
        TagUpdateStatus::Updated
    );
    let after = fx.registry.find_first(&created.id).await.unwrap().unwrap();
    assert!(after.tags.contains("blue"));
}

#[tokio::test]
async fn test_delete_tag_for_unregistered_instance_is_not_found() {
    let fx = fixture().await;
    // a node the provider knows but the inventory does not
    let node = fx
        .compute
        .create_nodes(
            &nimbus_cloud::NodeTemplate {
                group: "stray".to_string(),
                hardware: "1".to_string(),
                image: "memory/img-base".to_string(),
                location: MEMORY_ZONE.to_string(),
            },
            1,
        )
        .await
        .unwrap()
        .remove(0);

    assert_eq!(
        fx.registry.delete_tag(&node.id, "blue").await.unwrap(),
        TagUpdateStatus::NotFound
    );
    assert_eq!(
        fx.registry.delete_tag("never-issued", "blue").await.unwrap(),
        TagUpdateStatus::NotFound
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reads_describe_once() {
    let fx = fixture_with(MemoryCompute::new().with_latency(Duration::from_millis(100))).await;
    let created = fx
        .registry
        .create(&InstanceCreationRequest::new("p1", MEMORY_ZONE, "m1.tiny", "web"))
        .await
        .unwrap();
    let connector = fx.registry.connector("p1").unwrap();

    // creation leaves a fresh entry; let it age out of the transient window
    tokio::time::advance(Duration::from_secs(10)).await;
    let baseline = fx.compute.describe_calls();

    let (a, b) = tokio::join!(
        connector.get_instance(&created.id),
        connector.get_instance(&created.id)
    );
    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_some());
    assert_eq!(fx.compute.describe_calls() - baseline, 1);
}

#[tokio::test]
async fn test_location_checked_before_size() {
    let fx = fixture().await;
    let request = InstanceCreationRequest::new("p1", "missing", "m1.tiny", "web");
    let err = fx.registry.create(&request).await.unwrap_err();
    assert!(matches!(err, CloudError::LocationUnavailable(_)));

    let request = InstanceCreationRequest::new("p1", "missing", "m9.nonexistent", "web");
    let err = fx.registry.create(&request).await.unwrap_err();
    assert!(matches!(err, CloudError::LocationUnavailable(_)));
    assert_eq!(fx.compute.create_calls(), 0);
}

#[tokio::test]
async fn test_blank_request_field_is_validation_error() {
    let fx = fixture().await;
    let request = InstanceCreationRequest::new("p1", MEMORY_ZONE, "m1.tiny", " ");
    match fx.registry.create(&request).await {
        Err(CloudError::Validation { field, .. }) => assert_eq!(field, "namePrefix"),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_destroyed_instances_drop_out_of_listing() {
    let fx = fixture().await;
    let a = fx
        .registry
        .create(&InstanceCreationRequest::new("p1", MEMORY_ZONE, "m1.tiny", "a"))
        .await
        .unwrap();
    let b = fx
        .registry
        .create(&InstanceCreationRequest::new("p1", MEMORY_ZONE, "m1.tiny", "b"))
        .await
        .unwrap();

    assert_eq!(
        fx.registry.destroy_first(&a.id).await.unwrap(),
        DestructionStatus::Destroyed
    );
    let listed: Vec<Instance> = fx.registry.list_all().try_collect().await.unwrap();
    assert_eq!(listed, vec![b]);
}

#[tokio::test]
async fn test_seeded_inventory_tags_show_up() {
    let fx = fixture().await;
    let created = fx
        .registry
        .create(&InstanceCreationRequest::new("p1", MEMORY_ZONE, "m1.tiny", "web"))
        .await
        .unwrap();
    let fqdn = format!("{}.lab.example.com", created.id);
    let mut system = InventorySystem::new(&fqdn);
    system.add_tag("seeded");
    fx.inventory.insert(system);

    // the entry written at creation predates the seed
    fx.registry
        .connector("p1")
        .unwrap()
        .add_tag(&created.id, "other")
        .await
        .unwrap();
    let read = fx.registry.find_first(&created.id).await.unwrap().unwrap();
    assert!(read.tags.contains("seeded"));
    assert!(read.tags.contains("other"));
}
