mod common;

use common::*;
use proptest::prelude::*;
use uvcd_common::event::BackendEvent;
use uvcd_common::types::SessionSnapshot;

const CAMS: [&str; 2] = ["camA", "camB"];

#[derive(Debug, Clone)]
enum Step {
    Attach(usize),
    Grant(usize),
    Deny,
    Ready(usize),
    ReadyFailed,
    Detach(usize),
    Closed(usize),
    Expire,
    Resume,
    Close,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..CAMS.len()).prop_map(Step::Attach),
        (0..CAMS.len()).prop_map(Step::Grant),
        Just(Step::Deny),
        (0..CAMS.len()).prop_map(Step::Ready),
        Just(Step::ReadyFailed),
        (0..CAMS.len()).prop_map(Step::Detach),
        (0..CAMS.len()).prop_map(Step::Closed),
        Just(Step::Expire),
        Just(Step::Resume),
        Just(Step::Close),
    ]
}

async fn apply(h: &mut Harness, step: &Step) {
    match step {
        Step::Attach(i) => h.deliver(attached(CAMS[*i])).await,
        Step::Grant(i) => h.deliver(granted(CAMS[*i])).await,
        Step::Deny => h.deliver(BackendEvent::PermissionResult(String::new())).await,
        Step::Ready(i) => h.deliver(ready(CAMS[*i])).await,
        Step::ReadyFailed => h.deliver(ready("")).await,
        Step::Detach(i) => h.deliver(detached(CAMS[*i])).await,
        Step::Closed(i) => h.deliver(closed(CAMS[*i])).await,
        Step::Expire => {
            if let Some(deadline) = h.manager.permission_deadline() {
                h.manager.on_permission_deadline(deadline).await;
            }
        }
        Step::Resume => h.manager.focus_changed(true).await,
        Step::Close => {
            h.manager.close().await;
        }
    }
}

fn check(h: &Harness, s: &SessionSnapshot) {
    assert_stream_invariant(s);
    assert_eq!(h.manager.is_pumping(), s.active_device.is_some());
    if let Some(active) = &s.active_device {
        assert_eq!(s.attached_device.as_ref(), Some(active));
        assert!(!s.permission_pending);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn session_invariants_hold(steps in prop::collection::vec(step(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let mut h = Harness::armed().await;
            for step in &steps {
                apply(&mut h, step).await;
                let s = h.snapshot();
                check(&h, &s);
            }

            // Closing twice leaves the same state behind.
            h.manager.close().await;
            let once = h.snapshot();
            h.manager.close().await;
            assert_eq!(h.snapshot(), once);
            assert_eq!(once.active_device, None);
        });
    }
}
