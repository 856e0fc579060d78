use std::sync::{Arc, Mutex, Weak};

use crate::{CancelCallback, CancelReason, OnCancelled};

#[test]
fn from_arc_fn() {
    struct X(Mutex<bool>);

    let x = Arc::new(X(Mutex::new(false)));
    let cb = CancelCallback::from_arc_fn(Arc::clone(&x), |x| {
        *x.0.lock().unwrap() = true;
    });
    cb.call(CancelReason::Cancelled);
    assert!(*x.0.lock().unwrap());
}

#[test]
fn from_weak_fn_live() {
    struct X(Mutex<bool>);

    let x = Arc::new(X(Mutex::new(false)));
    let cb = CancelCallback::from_weak_fn(Arc::downgrade(&x), |x| {
        *x.0.lock().unwrap() = true;
    });
    cb.call(CancelReason::Cancelled);
    assert!(*x.0.lock().unwrap());
}

#[test]
fn from_weak_fn_dead() {
    struct X(Mutex<bool>);

    let x_arc = Arc::new(X(Mutex::new(false)));
    let x = Arc::downgrade(&x_arc);
    let cb = CancelCallback::from_weak_fn(Weak::clone(&x), |x| {
        *x.0.lock().unwrap() = true;
    });
    drop(x_arc);
    cb.call(CancelReason::Cancelled);
    assert!(x.upgrade().is_none());
}

#[test]
fn from_fn() {
    let cb = CancelCallback::from_fn(|| {});
    cb.call(CancelReason::DeadlineExceeded);
}

struct Recorder(Mutex<Vec<CancelReason>>);

impl OnCancelled for Recorder {
    fn on_cancelled(&self, reason: CancelReason) {
        self.0.lock().unwrap().push(reason);
    }
}

#[test]
fn arc_receives_reason() {
    let r = Arc::new(Recorder(Mutex::new(Vec::new())));
    CancelCallback::Arc(r.clone()).call(CancelReason::DeadlineExceeded);
    assert_eq!(*r.0.lock().unwrap(), [CancelReason::DeadlineExceeded]);
}

#[test]
fn weak_dead_is_skipped() {
    let r = Arc::new(Recorder(Mutex::new(Vec::new())));
    let w: Weak<Recorder> = Arc::downgrade(&r);
    drop(r);
    CancelCallback::Weak(w).call(CancelReason::Cancelled);
}
