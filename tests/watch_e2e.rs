use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};

use wikiwatch::source::{channel, StreamFeed};
use wikiwatch::{
    Event, ExecutionError, Predicate, RateCounter, ReconnectPolicy, StreamError, WatchError,
    Watcher, WatcherConfig,
};

fn config() -> WatcherConfig {
    WatcherConfig {
        reconnect: ReconnectPolicy::disabled(),
        ..WatcherConfig::default()
    }
}

fn edit(user: &str, seq: usize) -> String {
    format!(r#"{{"user":"{user}","title":"Page {seq}","seq":{seq}}}"#)
}

fn wait_stopped(watcher: &Watcher) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while watcher.is_running() {
        assert!(Instant::now() < deadline, "watcher did not stop");
        thread::sleep(Duration::from_millis(2));
    }
}

fn recorder(tag: &'static str) -> (
    impl FnMut(&Event) -> wikiwatch::CallbackResult + Send + 'static,
    Receiver<(&'static str, u64)>,
) {
    let (tx, rx) = unbounded();
    let callback = move |e: &Event| -> wikiwatch::CallbackResult {
        let seq = e.get("seq").and_then(serde_json::Value::as_u64).unwrap_or(u64::MAX);
        tx.send((tag, seq))?;
        Ok(())
    };
    (callback, rx)
}

fn feed_and_close(feed: StreamFeed, messages: impl IntoIterator<Item = String>) {
    for message in messages {
        feed.send_data(message).unwrap();
    }
    drop(feed);
}

#[test]
fn watcher_preserves_event_order() {
    let (feed, connector) = channel();
    let (callback, rx) = recorder("all");
    let watcher = Watcher::builder()
        .config(config())
        .filter(Predicate::any_ipv4(), callback)
        .connect(connector);

    feed_and_close(feed, (0..100).map(|i| edit(&format!("10.0.{}.{}", i / 256, i % 256), i)));
    watcher.run().unwrap();
    wait_stopped(&watcher);

    let seqs: Vec<u64> = rx.try_iter().map(|(_, seq)| seq).collect();
    assert_eq!(seqs, (0..100).collect::<Vec<u64>>());
}

#[test]
fn watcher_delivers_to_bindings_in_registration_order() {
    let (feed, connector) = channel();
    let (tx, rx) = unbounded();
    let tx_first = tx.clone();
    let tx_edit = tx.clone();

    let watcher = Watcher::builder()
        .config(config())
        .on_edit(move |_: &Event| {
            tx_edit.send("edit")?;
            Ok(())
        })
        .filter(Predicate::username("alice").unwrap(), move |_: &Event| {
            tx_first.send("first")?;
            Ok(())
        })
        .filter(Predicate::username_regex("^ali").unwrap(), move |_: &Event| {
            tx.send("second")?;
            Ok(())
        })
        .connect(connector);

    feed_and_close(feed, [edit("alice", 0), edit("bob", 1)]);
    watcher.run().unwrap();
    wait_stopped(&watcher);

    let order: Vec<&str> = rx.try_iter().collect();
    assert_eq!(order, vec!["edit", "first", "second", "edit"]);
}

#[test]
fn callback_failure_does_not_stop_dispatch() {
    let (feed, connector) = channel();
    let (callback, rx) = recorder("healthy");
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);

    let watcher = Watcher::builder()
        .config(config())
        .filter(Predicate::any_ipv4(), move |e: &Event| {
            counted.fetch_add(1, Ordering::SeqCst);
            match e.get("seq").and_then(serde_json::Value::as_u64) {
                Some(1) => Err("rejected".into()),
                Some(2) => panic!("callback blew up"),
                _ => Ok(()),
            }
        })
        .filter(Predicate::any_ipv4(), callback)
        .connect(connector);

    feed_and_close(feed, (0..4).map(|i| edit("192.168.0.1", i)));
    watcher.run().unwrap();
    wait_stopped(&watcher);

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let seqs: Vec<u64> = rx.try_iter().map(|(_, seq)| seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
    assert_eq!(watcher.stats().callback_failures, 2);
}

#[test]
fn malformed_messages_are_skipped() {
    let (feed, connector) = channel();
    let (callback, rx) = recorder("any");
    let watcher = Watcher::builder()
        .config(config())
        .on_edit(callback)
        .connect(connector);

    feed_and_close(
        feed,
        [
            edit("a", 0),
            "{truncated".to_string(),
            "\"just a string\"".to_string(),
            edit("b", 1),
        ],
    );
    watcher.run().unwrap();
    wait_stopped(&watcher);

    assert_eq!(rx.try_iter().count(), 2);
    assert_eq!(watcher.stats().skipped_messages, 2);
}

#[test]
fn double_run_does_not_duplicate_delivery() {
    let (feed, connector) = channel();
    let (callback, rx) = recorder("once");
    let watcher = Watcher::builder()
        .config(config())
        .on_edit(callback)
        .connect(connector);

    watcher.run().unwrap();
    watcher.run().unwrap();
    assert!(watcher.is_running());

    feed_and_close(feed, (0..10).map(|i| edit("x", i)));
    wait_stopped(&watcher);

    assert_eq!(rx.try_iter().count(), 10);
}

#[test]
fn no_callbacks_after_stop_returns() {
    let (feed, connector) = channel();
    let (callback, rx) = recorder("late");
    let watcher = Watcher::builder()
        .config(config())
        .on_edit(callback)
        .connect(connector);

    watcher.run().unwrap();
    feed.send_data(edit("a", 0)).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().1, 0);

    watcher.stop().unwrap();
    assert!(!watcher.is_running());

    for i in 1..20 {
        // The reader may be gone already; a failed send is fine.
        let _ = feed.send_data(edit("a", i));
    }
    thread::sleep(Duration::from_millis(20));
    assert!(rx.try_recv().is_err());
}

#[test]
fn stop_without_run_is_noop() {
    let (_feed, connector) = channel();
    let watcher = Watcher::new(connector, config());
    watcher.stop().unwrap();
    assert!(!watcher.is_running());
}

#[test]
fn restart_after_stop_resumes_delivery() {
    let (feed, connector) = channel();
    let (callback, rx) = recorder("restart");
    let watcher = Watcher::builder()
        .config(config())
        .on_edit(callback)
        .connect(connector);

    watcher.run().unwrap();
    feed.send_data(edit("a", 0)).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().1, 0);
    watcher.stop().unwrap();

    feed.send_data(edit("a", 1)).unwrap();
    watcher.run().unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().1, 1);
    watcher.stop().unwrap();
}

#[test]
fn bindings_are_frozen_while_running() {
    let (_feed, connector) = channel();
    let watcher = Watcher::new(connector, config());
    watcher.run().unwrap();

    let err = watcher
        .add_filter(Predicate::any_ipv6(), |_: &Event| Ok(()))
        .unwrap_err();
    assert!(matches!(err, WatchError::Execution(ExecutionError::AlreadyRunning)));

    watcher.stop().unwrap();
    watcher
        .add_filter(Predicate::any_ipv6(), |_: &Event| Ok(()))
        .unwrap();
}

#[test]
fn stream_failure_returns_watcher_to_stopped() {
    let (feed, connector) = channel();
    let (callback, rx) = recorder("fail");
    let watcher = Watcher::builder()
        .config(config())
        .on_edit(callback)
        .connect(connector);

    feed.send_data(edit("a", 0)).unwrap();
    feed.fail(StreamError::Read {
        message: "connection reset".to_string(),
    })
    .unwrap();
    feed.send_data(edit("a", 1)).unwrap();

    watcher.run().unwrap();
    wait_stopped(&watcher);
    assert_eq!(rx.try_iter().count(), 1);

    // Running again picks up where the stream left off.
    watcher.run().unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().1, 1);
    watcher.stop().unwrap();
}

#[test]
fn rate_counter_as_edit_callback() {
    let (feed, connector) = channel();
    let (counter, samples) = RateCounter::new(Duration::from_millis(1));
    let watcher = Watcher::builder()
        .config(config())
        .on_edit(counter.into_callback())
        .connect(connector);

    watcher.run().unwrap();
    for i in 0..3 {
        feed.send_data(edit("a", i)).unwrap();
        thread::sleep(Duration::from_millis(20));
    }
    drop(feed);
    wait_stopped(&watcher);

    let sample = samples.try_recv().expect("at least one sample");
    assert_eq!(sample.edits_in_interval, 1);
}

fn change(namespace: i64, title_url: &str) -> String {
    format!(
        r#"{{"namespace":{namespace},"user":"192.168.33.44","title_url":"{title_url}","type":"{}"}}"#,
        if namespace == -1 { "log" } else { "edit" }
    )
}

fn delivered_urls(config: WatcherConfig) -> (Vec<String>, wikiwatch::DispatchStats) {
    let (feed, connector) = channel();
    let (tx, rx) = unbounded();
    let watcher = Watcher::builder()
        .config(config)
        .filter(Predicate::ipv4("192.168.33.44").unwrap(), move |e: &Event| {
            tx.send(e.text("title_url").unwrap_or_default().into_owned())?;
            Ok(())
        })
        .connect(connector);

    feed_and_close(
        feed,
        [
            change(0, "url_c"),
            change(0, "url_d"),
            change(-1, "url_e"),
            change(-1, "url_f"),
            change(-1, "url_g"),
        ],
    );
    watcher.run().unwrap();
    wait_stopped(&watcher);
    (rx.try_iter().collect(), watcher.stats())
}

#[test]
fn log_events_are_not_delivered() {
    let (urls, stats) = delivered_urls(config());
    assert_eq!(urls, vec!["url_c", "url_d"]);
    assert_eq!(stats.events, 2);
    assert_eq!(stats.skipped_messages, 3);
}

#[test]
fn log_events_delivered_when_skipping_disabled() {
    let (urls, stats) = delivered_urls(WatcherConfig {
        skip_log_events: false,
        ..config()
    });
    assert_eq!(urls, vec!["url_c", "url_d", "url_e", "url_f", "url_g"]);
    assert_eq!(stats.skipped_messages, 0);
}
