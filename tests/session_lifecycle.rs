//! End-to-end scenarios from spec §8 (S1, S2, S4, S5) plus the idempotence
//! properties (items 5, 6), driven against the in-process fake browser in
//! `support`.

mod support;

use std::collections::HashMap;
use std::time::Duration;

use cdpdrive::session::Session;
use cdpdrive::{CdpError, LaunchOptions};
use support::Canned;

async fn launch(canned: HashMap<String, Canned>) -> (cdpdrive::Scope, support::FakeBrowser) {
    let (reader, writer, browser) = support::spawn(canned);
    let dir = tempfile::tempdir().unwrap().into_path();
    let opts = LaunchOptions::new();
    let scope = Session::launch_over_transport(reader, writer, dir, &opts)
        .await
        .expect("handshake with fake browser should succeed");
    (scope, browser)
}

/// S1: single command success.
#[tokio::test]
async fn single_command_success() {
    let (scope, _browser) = launch(HashMap::new()).await;

    let result = scope
        .send_and_wait::<cdpdrive_cdp::GetVersion>(cdpdrive_cdp::GetVersion::default())
        .await
        .expect("Browser.getVersion should succeed");
    assert_eq!(result.product, "HeadlessChrome/test");
}

/// S2: command error surfaces as `CdpError::Protocol` with code and message
/// preserved verbatim.
#[tokio::test]
async fn command_error_surfaces_as_protocol_error() {
    let mut canned = HashMap::new();
    canned.insert(
        "Target.attachToTarget".to_string(),
        Canned::Error {
            code: -32602,
            message: "Cannot find context with specified id".to_string(),
        },
    );
    let (scope, _browser) = launch(canned).await;

    let err = scope
        .send_and_wait::<cdpdrive_cdp::AttachToTarget>(cdpdrive_cdp::AttachToTarget::new("bogus"))
        .await
        .unwrap_err();

    match err {
        CdpError::Protocol(protocol_err) => {
            assert_eq!(protocol_err.code, -32602);
            assert_eq!(protocol_err.message, "Cannot find context with specified id");
        }
        other => panic!("expected a protocol error, got {other:?}"),
    }
}

/// S4: a scope cancelled before its reply arrives unblocks with
/// `Cancelled`, and a sibling scope on the same session is unaffected.
#[tokio::test]
async fn scope_cancellation_unblocks_sendandwait_independently_of_siblings() {
    // No canned reply for Page.navigate: the fake browser never answers it,
    // so the only way this command resolves is via cancellation.
    let (scope, _browser) = launch(HashMap::new()).await;

    let child = scope.child();
    let waiter = tokio::spawn({
        let child = child.clone();
        async move {
            child
                .send_and_wait::<cdpdrive_cdp::Navigate>(cdpdrive_cdp::Navigate::new(
                    "https://slow-host.invalid",
                ))
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    child.cancel();
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, CdpError::Cancelled));

    // A sibling scope derived from the same root still works.
    let sibling = scope.child();
    let result = sibling
        .send_and_wait::<cdpdrive_cdp::GetVersion>(cdpdrive_cdp::GetVersion::default())
        .await
        .expect("sibling scope is unaffected by the cancelled child");
    assert_eq!(result.product, "HeadlessChrome/test");
}

/// S5: opening a second tab shares the session and transport but carries a
/// distinct target; closing the child scope closes only that target.
#[tokio::test]
async fn second_tab_shares_session_with_distinct_target() {
    let mut canned = HashMap::new();
    canned.insert(
        "Target.createTarget".to_string(),
        Canned::Result(serde_json::json!({ "targetId": "T2" })),
    );
    canned.insert(
        "Target.attachToTarget".to_string(),
        Canned::Result(serde_json::json!({ "sessionId": "S2" })),
    );
    let (root, _browser) = launch(canned).await;
    assert!(root.target().is_none());

    let tab = root.open_tab("about:blank").await.expect("open_tab");
    assert_eq!(tab.target().unwrap().target_id.0, "T2");
    assert_eq!(tab.target().unwrap().session_id.0, "S2");

    tab.cancel();
    assert!(tab.is_cancelled());
    assert!(!root.is_cancelled());

    // Cancelling the root still cancels every descendant, including tabs.
    let tab2 = root.open_tab("about:blank").await.expect("open_tab");
    root.cancel();
    assert!(tab2.is_cancelled());
}

/// Items 5/6: `close` and `cancel` are idempotent, and `cancel` after
/// `close` is a no-op.
#[tokio::test]
async fn close_and_cancel_are_idempotent() {
    let mut canned = HashMap::new();
    canned.insert("Browser.close".to_string(), Canned::Result(serde_json::json!({})));
    let (scope, _browser) = launch(canned).await;

    scope.close().await.expect("first close succeeds");
    scope.close().await.expect("second close is a no-op");
    scope.cancel();
    assert!(scope.is_cancelled());
}

/// Item 10: `SendAndWait` against an already-cancelled scope returns
/// `Cancelled` without writing a frame.
#[tokio::test]
async fn send_and_wait_with_already_cancelled_scope_is_cancelled_immediately() {
    let (scope, _browser) = launch(HashMap::new()).await;
    let child = scope.child();
    child.cancel();

    let err = child
        .send_and_wait::<cdpdrive_cdp::GetVersion>(cdpdrive_cdp::GetVersion::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CdpError::Cancelled));
}
