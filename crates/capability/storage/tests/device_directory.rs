use domain::Device;
use gateway_storage::{DeviceDirectory, InMemoryDeviceDirectory, StorageError};

#[tokio::test]
async fn find_by_unique_id_and_id() {
    let directory = InMemoryDeviceDirectory::new();
    directory
        .insert(Device::new(1, "201951132031", "truck-1"))
        .expect("insert");

    let by_unique = directory
        .find_device("201951132031")
        .await
        .expect("find")
        .expect("device");
    assert_eq!(by_unique.id, 1);

    let by_id = directory
        .find_device_by_id(1)
        .await
        .expect("find")
        .expect("device");
    assert_eq!(by_id.unique_id, "201951132031");

    assert!(directory.find_device("unknown").await.expect("find").is_none());
    assert!(directory.find_device_by_id(99).await.expect("find").is_none());
}

#[tokio::test]
async fn unique_id_cannot_be_reused() {
    let directory = InMemoryDeviceDirectory::new();
    directory
        .insert(Device::new(1, "ID123", "a"))
        .expect("insert");
    assert!(matches!(
        directory.insert(Device::new(2, "ID123", "b")),
        Err(StorageError::DuplicateUniqueId(uid)) if uid == "ID123"
    ));
    // 同 ID 覆盖允许
    directory
        .insert(Device::new(1, "ID123", "renamed").disabled())
        .expect("overwrite");
    let device = directory.find_device("ID123").await.expect("find").expect("device");
    assert!(!device.enabled);
    assert_eq!(directory.len(), 1);
}

#[tokio::test]
async fn seeds_build_directory() {
    let directory = InMemoryDeviceDirectory::from_seeds(vec![
        ("ID123".to_string(), 5),
        ("ID456".to_string(), 6),
    ]);
    let device = directory.find_device("ID456").await.expect("find").expect("device");
    assert_eq!(device.id, 6);
    assert_eq!(device.name, "ID456");
    assert!(device.enabled);
}
