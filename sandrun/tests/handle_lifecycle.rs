//! Integration coverage for the handle lifecycle (§10.4 of SPEC_FULL.md):
//! concurrent operations on one handle and post-destroy rejection, driven
//! against an in-process fake control server standing in for the sandbox
//! binary's listening socket. `SandboxHandle` is synchronous, so this uses
//! plain threads rather than an async runtime.

use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use sandrun::SandboxHandle;
use sandrun_proto::protocol::{self, ControlRequest, ControlResponse};

/// Accepts connections on `id`'s control address and replies `ok` with a
/// null payload to every request, counting how many it handled. Good
/// enough to stand in for the sandbox binary for the RPCs this suite
/// exercises, none of which donate or expect FDs back.
fn spawn_fake_sandbox(id: &str) -> Arc<AtomicUsize> {
    let handled = Arc::new(AtomicUsize::new(0));
    let listener = sandrun::control::bind_listener(id).expect("bind fake sandbox listener");
    let counter = handled.clone();
    thread::spawn(move || {
        loop {
            let (mut conn, _) = match listener.accept() {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let request: ControlRequest = match protocol::read_frame(&mut conn) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let _ = request.method;
            let response = ControlResponse::ok(()).expect("encode ok response");
            if protocol::write_frame(&mut conn, &response).is_ok() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    });
    handled
}

fn fake_sandbox_id(test_name: &str) -> String {
    format!("sandrun-it-{test_name}-{}", std::process::id())
}

#[test]
fn concurrent_operations_on_one_handle_all_succeed() {
    let id = fake_sandbox_id("concurrent");
    let handled = spawn_fake_sandbox(&id);

    let mut child = Command::new("/bin/sleep")
        .arg("30")
        .spawn()
        .expect("spawn long-lived child");
    let handle = Arc::new(SandboxHandle::attach(&id, child.id() as i32, None));

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let handle = handle.clone();
            thread::spawn(move || handle.signal(format!("c{i}"), 0))
        })
        .collect();

    for worker in workers {
        worker
            .join()
            .expect("worker thread should not panic")
            .expect("signal RPC against the fake sandbox should succeed");
    }

    assert_eq!(handled.load(Ordering::SeqCst), 8);

    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn post_destroy_operations_are_rejected() {
    let id = fake_sandbox_id("post-destroy");
    let _handled = spawn_fake_sandbox(&id);

    let child = Command::new("/bin/sleep")
        .arg("30")
        .spawn()
        .expect("spawn long-lived child");
    let handle = SandboxHandle::attach(&id, child.id() as i32, None);

    assert!(handle.is_running());
    handle.signal("c1", 0).expect("signal before destroy should succeed");

    handle.destroy().expect("destroy should succeed");
    assert_eq!(handle.pid(), 0);

    let err = handle.signal("c1", 0).expect_err("signal after destroy must be rejected");
    assert!(matches!(err, sandrun::SandboxError::NotRunning { .. }));
}

#[test]
fn destroy_is_idempotent_against_a_live_child() {
    let child = Command::new("/bin/sleep")
        .arg("30")
        .spawn()
        .expect("spawn long-lived child");
    let handle = SandboxHandle::attach("sandrun-it-idempotent-destroy", child.id() as i32, None);

    handle.destroy().expect("first destroy should succeed");
    assert_eq!(handle.pid(), 0);
    handle.destroy().expect("second destroy should still succeed");
    assert_eq!(handle.pid(), 0);
}
