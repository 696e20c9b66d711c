//! Local variant end to end: filesystem change -> watch group -> debounce
//! -> dispatch queue -> bus adapter, converging on the same event shape the
//! remote stream produces.

use std::time::Duration;

use tokio::time::{sleep, timeout};

use driftwatch_core::{
    Bus, StoreEvent, WatchGroup, WatchGroupConfig, dispatch_queue, spawn_bus_adapter,
};

#[tokio::test(flavor = "multi_thread")]
async fn settled_local_changes_reach_the_bus() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().to_path_buf();

    let (queue, receiver) = dispatch_queue();
    let bus = Bus::new(16);
    let mut subscriber = bus.subscribe();
    let adapter = spawn_bus_adapter(receiver, bus);

    let producer = queue.clone();
    let watch_root = root.clone();
    let mut group = WatchGroup::new(
        WatchGroupConfig {
            debounce_window: Duration::from_millis(300),
        },
        move |path| {
            producer.push(StoreEvent::from_local_change(
                &watch_root,
                &path,
                "s3:ObjectCreated:*",
            ));
        },
    );
    group.add(&root, &[]).unwrap();

    // A burst of writes to one file must surface as a single bus event.
    let file = root.join("report.csv");
    for i in 0..4 {
        std::fs::write(&file, format!("row {i}\n")).unwrap();
        sleep(Duration::from_millis(80)).await;
    }

    let published = timeout(Duration::from_secs(5), subscriber.recv())
        .await
        .expect("no bus event after the quiet period")
        .unwrap();

    assert_eq!(published.event_name, "s3:ObjectCreated:*");
    assert_eq!(published.bucket, root.to_string_lossy());
    assert_eq!(published.key, "report.csv");
    assert_eq!(published.file_name, "report.csv");

    // Nothing else was coalesced into a second event.
    sleep(Duration::from_millis(800)).await;
    assert!(matches!(
        subscriber.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    group.stop().await;
    queue.shutdown();
    adapter.await.unwrap();
}
