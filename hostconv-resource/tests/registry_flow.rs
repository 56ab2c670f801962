//! End-to-end check/apply through the default registry with the fake driver.
//!
//! Run with: cargo test -p hostconv-resource --features test-util

use std::collections::BTreeMap;
use std::sync::Arc;

use hostconv_resource::lvm::LvmDriver;
use hostconv_resource::testing::FakeLvm;
use hostconv_resource::{ParamRenderer, StatusLevel, TaskError, default_registry};
use tokio_util::sync::CancellationToken;

fn renderer() -> ParamRenderer {
    let mut params = BTreeMap::new();
    params.insert("vg".to_string(), "vg0".to_string());
    ParamRenderer::new(params)
}

fn lv_config(name: &str) -> serde_json::Value {
    serde_json::json!({
        "group": "{{param \"vg\"}}",
        "name": name,
        "size": "1G",
    })
}

#[tokio::test]
async fn test_default_registry_knows_logical_volumes() {
    let registry = default_registry(Arc::new(FakeLvm::new())).unwrap();
    assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["lvm.logicalvolume"]);
}

#[tokio::test]
async fn test_plan_then_apply_then_converged() {
    let lvm = Arc::new(FakeLvm::new().with_group("vg0").with_volume("vg0", "swap"));
    let registry = default_registry(Arc::clone(&lvm) as Arc<dyn LvmDriver>).unwrap();
    let renderer = renderer();
    let cancel = CancellationToken::new();

    let mut data = registry
        .prepare("lvm.logicalvolume", &cancel, &renderer, &lv_config("data"))
        .await
        .unwrap();
    let mut swap = registry
        .prepare("lvm.logicalvolume", &cancel, &renderer, &lv_config("swap"))
        .await
        .unwrap();

    assert_eq!(
        data.check(&cancel, &renderer).await.unwrap().report().level,
        StatusLevel::WillChange
    );
    assert_eq!(
        swap.check(&cancel, &renderer).await.unwrap().report().level,
        StatusLevel::NoChange
    );

    let applied = data.apply(&cancel).await.unwrap();
    assert_eq!(applied.details()["device_path"], "/dev/mapper/vg0-data");
    swap.apply(&cancel).await.unwrap();
    assert_eq!(lvm.creates().len(), 1);

    // A fresh task against the converged system plans nothing.
    let mut again = registry
        .prepare("lvm.logicalvolume", &cancel, &renderer, &lv_config("data"))
        .await
        .unwrap();
    let status = again.check(&cancel, &renderer).await.unwrap();
    assert_eq!(status.report().level, StatusLevel::NoChange);
    assert!(!status.report().has_changes());
}

#[tokio::test]
async fn test_group_missing_until_apply() {
    let lvm = Arc::new(FakeLvm::new());
    let registry = default_registry(Arc::clone(&lvm) as Arc<dyn LvmDriver>).unwrap();
    let renderer = renderer();
    let cancel = CancellationToken::new();

    let mut task = registry
        .prepare("lvm.logicalvolume", &cancel, &renderer, &lv_config("data"))
        .await
        .unwrap();

    let status = task.check(&cancel, &renderer).await.unwrap();
    assert_eq!(status.report().level, StatusLevel::WillChange);
    assert_eq!(status.report().output.len(), 1);

    let err = task.apply(&cancel).await.err().unwrap();
    assert!(matches!(err, TaskError::GroupMissing { .. }));
    assert_eq!(lvm.volume_count(), 0);
}
