use crate::auth::SessionAuth;
use crate::auth::AuthBoundary;
use crate::badge::BadgeVisualState;
use crate::overlay::ClickOutcome;
use crate::tests::utils::{
    main_street_page, one, overlay_for, settle_limit, temp_prefs, with_binding, FakeApi,
    StaticAuth,
};
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn host_clicks_pass_through() {
    LocalSet::new()
        .run_until(async {
            let overlay = overlay_for(
                &main_street_page(),
                Rc::new(FakeApi::springfield()),
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;
            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);

            let link = one(&overlay, "#main a.property-card-link");
            assert_eq!(overlay.handle_click(link).await, ClickOutcome::PassThrough);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn badge_clicks_never_reach_the_card() {
    LocalSet::new()
        .run_until(async {
            let overlay = overlay_for(
                &main_street_page(),
                Rc::new(FakeApi::springfield()),
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;
            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);

            let value = one(&overlay, ".rc-badge__value");
            assert_eq!(overlay.handle_click(value).await, ClickOutcome::Consumed);
            let badge = one(&overlay, ".rc-badge");
            assert_eq!(overlay.handle_click(badge).await, ClickOutcome::Consumed);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn sign_in_from_the_badge() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            let auth = Rc::new(StaticAuth::signed_out());
            let overlay =
                overlay_for(&main_street_page(), api.clone(), auth.clone(), None).await;
            overlay.reconcile();
            with_binding(&overlay, "#main", |b| {
                assert_eq!(b.state, BadgeVisualState::SignInRequired)
            });

            let button = one(&overlay, ".rc-badge__action");
            assert_eq!(overlay.handle_click(button).await, ClickOutcome::SignIn);
            assert_eq!(auth.logins.get(), 1);

            assert!(overlay.settle(settle_limit()).await);
            with_binding(&overlay, "#main", |b| {
                assert!(matches!(b.state, BadgeVisualState::Value { .. }))
            });
            assert_eq!(api.calls(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn signing_in_after_a_rate_limit_refetches() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            api.rate_limited.set(true);
            let auth = Rc::new(StaticAuth::signed_in());
            let overlay =
                overlay_for(&main_street_page(), api.clone(), auth.clone(), None).await;
            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);
            with_binding(&overlay, "#main", |b| {
                assert_eq!(b.state, BadgeVisualState::RateLimited)
            });
            assert!(overlay.html().contains("Sign in for more"));

            api.rate_limited.set(false);
            let button = one(&overlay, ".rc-badge__action");
            assert_eq!(overlay.handle_click(button).await, ClickOutcome::SignIn);
            assert!(overlay.settle(settle_limit()).await);

            with_binding(&overlay, "#main", |b| {
                assert!(matches!(b.state, BadgeVisualState::Value { .. }))
            });
            assert_eq!(api.calls(), 2);
            assert_eq!(auth.logins.get(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn stored_session_sign_in_refreshes_once() {
    LocalSet::new()
        .run_until(async {
            let (store, _guard) = temp_prefs();
            let store = Rc::new(store);
            let auth = Rc::new(SessionAuth::new(store.clone()));
            auth.login().await.unwrap();
            let api = Rc::new(FakeApi::springfield());
            api.rate_limited.set(true);
            let overlay = overlay_for(
                &main_street_page(),
                api.clone(),
                auth.clone(),
                Some(store.clone()),
            )
            .await;
            let _handle = overlay.start();
            assert!(overlay.settle(settle_limit()).await);
            with_binding(&overlay, "#main", |b| {
                assert_eq!(b.state, BadgeVisualState::RateLimited)
            });

            api.rate_limited.set(false);
            let button = one(&overlay, ".rc-badge__action");
            assert_eq!(overlay.handle_click(button).await, ClickOutcome::SignIn);
            sleep(Duration::from_millis(100)).await;
            assert!(overlay.settle(settle_limit()).await);

            with_binding(&overlay, "#main", |b| {
                assert_eq!(b.mode.revision, 1);
                assert!(matches!(b.state, BadgeVisualState::Value { .. }));
            });
            assert_eq!(api.calls(), 2);
        })
        .await;
}
