use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use kodegen_tools_harvest::crawl_events::*;
use parking_lot::Mutex;
use tokio::time::timeout;

mod common;

fn page(crawl_id: &str, n: usize) -> CrawlEvent {
    CrawlEvent::page_crawled(crawl_id, &format!("https://example.com/{n}"))
}

#[tokio::test]
async fn test_event_bus_creation() {
    let bus = CrawlEventBus::new();
    assert_eq!(bus.subscriber_count(), 0);
    assert!(!bus.has_subscribers());
    assert!(!bus.is_shutdown());
}

#[tokio::test]
async fn test_publish_with_no_subscribers_still_records_history() {
    let bus = CrawlEventBus::new();
    let delivered = bus.publish(page("c1", 0)).unwrap();
    assert_eq!(delivered, 0);
    assert_eq!(bus.get_history("c1", &HistoryQuery::default()).len(), 1);
    assert_eq!(bus.get_global_history(&HistoryQuery::default()).len(), 1);
}

#[tokio::test]
async fn test_callback_receives_events_in_publish_order() {
    let bus = CrawlEventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(SubscriptionScope::crawl("c1"), move |event| {
        sink.lock().push(event.data["url"].as_str().unwrap_or_default().to_string());
        Ok(())
    })
    .unwrap();

    for n in 0..50 {
        bus.publish(page("c1", n)).unwrap();
    }
    bus.publish(page("other", 99)).unwrap();

    assert!(common::wait_until(Duration::from_secs(2), || seen.lock().len() == 50).await);
    let expected: Vec<String> = (0..50).map(|n| format!("https://example.com/{n}")).collect();
    assert_eq!(*seen.lock(), expected);
}

#[tokio::test]
async fn test_wildcard_receives_every_crawl() {
    let bus = CrawlEventBus::new();
    let mut all = bus.subscribe_receiver(SubscriptionScope::All).unwrap();
    let mut only_c2 = bus.subscribe_receiver(SubscriptionScope::crawl("c2")).unwrap();

    bus.publish(page("c1", 1)).unwrap();
    bus.publish(page("c2", 2)).unwrap();

    let first = timeout(Duration::from_millis(200), all.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_millis(200), all.recv()).await.unwrap().unwrap();
    assert_eq!(first.crawl_id, "c1");
    assert_eq!(second.crawl_id, "c2");

    let scoped = timeout(Duration::from_millis(200), only_c2.recv()).await.unwrap().unwrap();
    assert_eq!(scoped.crawl_id, "c2");
    assert!(only_c2.try_recv().unwrap().is_none());
}

#[tokio::test]
async fn test_failing_and_panicking_subscribers_are_isolated() {
    let bus = CrawlEventBus::new();
    let healthy = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&healthy);

    bus.subscribe(SubscriptionScope::All, |_| anyhow::bail!("subscriber broke"))
        .unwrap();
    bus.subscribe(SubscriptionScope::All, |_| panic!("subscriber panicked"))
        .unwrap();
    bus.subscribe(SubscriptionScope::All, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    for n in 0..5 {
        assert_eq!(bus.publish(page("c1", n)).unwrap(), 3);
    }

    assert!(common::wait_until(Duration::from_secs(2), || healthy.load(Ordering::SeqCst) == 5).await);
    assert!(
        common::wait_until(Duration::from_secs(2), || {
            bus.metrics().snapshot().subscriber_failures == 10
        })
        .await
    );
    // Failing subscribers keep their workers alive
    assert!(bus.publish(page("c1", 5)).is_ok());
    assert_eq!(bus.subscriber_count(), 3);
}

#[tokio::test]
async fn test_full_queue_drops_for_that_subscriber_only() {
    let bus = CrawlEventBus::with_config(EventBusConfig {
        subscriber_queue_capacity: 2,
        ..EventBusConfig::default()
    });
    let mut slow = bus.subscribe_receiver(SubscriptionScope::All).unwrap();

    for n in 0..5 {
        bus.publish(page("c1", n)).unwrap();
    }

    let snapshot = bus.metrics().snapshot();
    assert_eq!(snapshot.events_published, 5);
    assert_eq!(snapshot.events_delivered, 2);
    assert_eq!(snapshot.events_dropped, 3);
    assert!(slow.try_recv().unwrap().is_some());
    assert!(slow.try_recv().unwrap().is_some());
    assert!(slow.try_recv().unwrap().is_none());
    // History is unaffected by delivery drops
    assert_eq!(bus.get_history("c1", &HistoryQuery::default()).len(), 5);
}

#[tokio::test]
async fn test_history_filters() {
    let bus = CrawlEventBus::new();
    for n in 0..10 {
        bus.publish(page("c1", n)).unwrap();
    }
    let cutoff = Utc::now();
    tokio::time::sleep(Duration::from_millis(5)).await;
    bus.publish(CrawlEvent::error("c1", "boom", Some("stage"))).unwrap();
    bus.publish(page("c1", 10)).unwrap();

    let recent = bus.get_history("c1", &HistoryQuery::recent(3));
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].data["url"], "https://example.com/9");
    assert_eq!(recent[2].data["url"], "https://example.com/10");

    let errors = bus.get_history("c1", &HistoryQuery::default().of_type(EventType::Error));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].data["message"], "boom");

    let since = bus.get_history("c1", &HistoryQuery::default().since(cutoff));
    assert_eq!(since.len(), 2);

    assert!(bus.get_history("missing", &HistoryQuery::default()).is_empty());
}

#[tokio::test]
async fn test_history_is_bounded() {
    let bus = CrawlEventBus::with_config(EventBusConfig {
        history_capacity: 10,
        ..EventBusConfig::default()
    });
    for n in 0..25 {
        bus.publish(page("c1", n)).unwrap();
    }
    let history = bus.get_history("c1", &HistoryQuery::recent(100));
    assert_eq!(history.len(), 10);
    assert_eq!(history[0].data["url"], "https://example.com/15");
    assert_eq!(bus.get_global_history(&HistoryQuery::recent(100)).len(), 10);
}

#[tokio::test]
async fn test_cleanup_crawl_releases_history_and_scoped_subscriptions() {
    let bus = CrawlEventBus::new();
    let _scoped = bus.subscribe_receiver(SubscriptionScope::crawl("c1")).unwrap();
    let _global = bus.subscribe_receiver(SubscriptionScope::All).unwrap();
    bus.publish(page("c1", 0)).unwrap();

    assert_eq!(bus.cleanup_crawl("c1"), 1);
    assert!(bus.get_history("c1", &HistoryQuery::default()).is_empty());
    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(bus.get_global_history(&HistoryQuery::default()).len(), 1);
}

#[tokio::test]
async fn test_unsubscribe() {
    let bus = CrawlEventBus::new();
    let id = bus.subscribe(SubscriptionScope::All, |_| Ok(())).unwrap();
    assert_eq!(bus.subscriber_count(), 1);
    bus.unsubscribe(id).unwrap();
    assert_eq!(bus.subscriber_count(), 0);
    assert!(matches!(
        bus.unsubscribe(id),
        Err(EventBusError::SubscriptionNotFound(_))
    ));
}

#[tokio::test]
async fn test_shutdown_drains_queued_events() {
    let bus = CrawlEventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    bus.subscribe(SubscriptionScope::All, move |_| {
        std::thread::sleep(Duration::from_millis(2));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    for n in 0..20 {
        bus.publish(page("c1", n)).unwrap();
    }
    bus.shutdown(Duration::from_secs(5)).await.unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 20);
    assert!(bus.is_shutdown());
    assert!(matches!(bus.publish(page("c1", 99)), Err(EventBusError::Shutdown)));
    assert!(matches!(
        bus.subscribe_receiver(SubscriptionScope::All),
        Err(EventBusError::Shutdown)
    ));
}

#[test]
fn test_event_wire_shape() {
    let event = CrawlEvent::state_change("c1", "queued", "initializing", 0.5, Default::default());
    let json = event.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["crawl_id"], "c1");
    assert_eq!(value["event_type"], "state_change");
    assert_eq!(value["data"]["to_state"], "initializing");
    assert!(value["timestamp"].as_str().is_some());
    assert!(value["metadata"].is_object());

    let parsed = CrawlEvent::from_json(&json).unwrap();
    assert_eq!(parsed, event);
}

#[test]
fn test_subscribe_outside_runtime_fails() {
    let bus = CrawlEventBus::new();
    assert!(matches!(
        bus.subscribe(SubscriptionScope::All, |_| Ok(())),
        Err(EventBusError::NoRuntime)
    ));
}

#[tokio::test]
async fn test_metrics_report() {
    let bus = CrawlEventBus::new();
    bus.publish(page("c1", 0)).unwrap();
    let report = bus.get_metrics_report();
    assert!(report.starts_with("Crawl event bus"));
    assert!(report.contains("published"));
    assert!(report.contains("global history"));

    let quiet = CrawlEventBus::with_config(EventBusConfig {
        enable_metrics: false,
        ..EventBusConfig::default()
    });
    assert_eq!(quiet.get_metrics_report(), "Event bus metrics disabled");
}

#[tokio::test]
async fn test_dropped_receiver_is_removed_on_publish() {
    let bus = CrawlEventBus::new();
    let kept = bus.subscribe_receiver(SubscriptionScope::All).unwrap();
    let gone = bus.subscribe_receiver(SubscriptionScope::All).unwrap();
    assert_eq!(bus.metrics().snapshot().active_subscribers, 2);
    drop(gone);

    assert_eq!(bus.publish(page("c1", 0)).unwrap(), 1);
    let snapshot = bus.metrics().snapshot();
    assert_eq!(snapshot.active_subscribers, 1);
    assert_eq!(snapshot.events_dropped, 0);

    bus.publish(page("c1", 1)).unwrap();
    assert_eq!(bus.metrics().snapshot().events_dropped, 0);
    assert_eq!(bus.subscriber_count(), 1);
    drop(kept);
}

#[tokio::test]
async fn test_zero_queue_capacity_is_clamped() {
    let bus = CrawlEventBus::with_config(EventBusConfig {
        subscriber_queue_capacity: 0,
        ..EventBusConfig::default()
    });
    let mut receiver = bus.subscribe_receiver(SubscriptionScope::All).unwrap();
    assert_eq!(bus.publish(page("c1", 0)).unwrap(), 1);
    let event = timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("event arrives")
        .expect("queue open");
    assert_eq!(event.crawl_id, "c1");
}
