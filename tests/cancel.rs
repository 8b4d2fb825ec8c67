//! Queue-wide cancellation and pending-request snapshots.
//!
//! Kept in its own test binary: `cancel_all_pending_requests` sweeps the
//! process-global engine, so it must not race other tests' requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reqline::{
    cancel_all_pending_requests, get_all_pending_requests, perform, Error, RequestBuilder, Status,
};

#[test]
fn cancel_all_sweeps_queued_requests_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let statuses = Arc::new(Mutex::new(Vec::new()));

    let submit = |url: &str| {
        let calls = calls.clone();
        let statuses = statuses.clone();
        RequestBuilder::new(url)
            .callback(move |req| {
                calls.fetch_add(1, Ordering::SeqCst);
                statuses.lock().unwrap().push(req.status());
            })
            .send()
    };

    // No performer is running: both requests stay in the submission queue.
    let first = submit("http://127.0.0.1:1/a");
    let second = submit("http://127.0.0.1:1/b");
    assert!(first.is_pending());
    assert!(second.is_pending());

    let all = get_all_pending_requests();
    assert!(all.contains(&first));
    assert!(all.contains(&second));

    cancel_all_pending_requests();

    assert_eq!(first.status(), Status::Cancelled);
    assert_eq!(second.status(), Status::Cancelled);
    assert_eq!(first.error(), "Operation cancelled");
    assert!(matches!(
        first.take(),
        Err(Error::ResponseUnavailable(Status::Cancelled))
    ));

    // Callbacks ran synchronously during the sweep, once each.
    assert_eq!(first.wait_callback(), Status::Cancelled);
    assert_eq!(second.wait_callback(), Status::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        statuses.lock().unwrap().as_slice(),
        &[Status::Cancelled, Status::Cancelled]
    );

    // A second sweep finds nothing to do.
    cancel_all_pending_requests();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // A request cancelled through its own handle while queued never enters
    // the engine; the next tick still delivers its callback.
    let third = submit("http://127.0.0.1:1/c");
    assert!(third.cancel());
    assert!(!third.cancel());
    assert_eq!(third.error(), "Operation cancelled");
    perform().expect("tick");
    assert_eq!(third.wait_callback(), Status::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(get_all_pending_requests().is_empty());
}
