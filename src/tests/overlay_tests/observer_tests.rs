use crate::badge::BadgeVisualState;
use crate::tests::utils::{
    badge_count, main_street_page, one, overlay_for, settle_limit, table, with_binding,
    zillow_card, zillow_detail, FakeApi, StaticAuth,
};
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn new_cards_are_picked_up_after_the_debounce() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            let overlay =
                overlay_for(&main_street_page(), api, Rc::new(StaticAuth::signed_in()), None)
                    .await;
            let _handle = overlay.start();
            assert_eq!(overlay.state().registry.len(), 1);

            let results = one(&overlay, "#results");
            overlay
                .host(|doc| {
                    doc.append_html(
                        results,
                        &zillow_card("elm", "7 Elm Ct, 12345", "$250,000", "2 bds"),
                    )
                })
                .unwrap();

            // Inside the debounce window nothing happens yet.
            sleep(Duration::from_millis(200)).await;
            assert_eq!(overlay.state().registry.len(), 1);

            sleep(Duration::from_millis(300)).await;
            assert_eq!(overlay.state().registry.len(), 2);
            assert!(overlay.settle(settle_limit()).await);
            assert_eq!(badge_count(&overlay), 2);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn bursts_coalesce_into_one_pass() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            let overlay =
                overlay_for(&main_street_page(), api, Rc::new(StaticAuth::signed_in()), None)
                    .await;
            let _handle = overlay.start();
            let results = one(&overlay, "#results");

            for i in 0..5 {
                let card = zillow_card(&format!("c{i}"), &format!("{i} Oak Ave, 12345"), "$200,000", "2 bds");
                overlay.host(|doc| doc.append_html(results, &card)).unwrap();
                sleep(Duration::from_millis(100)).await;
            }
            // The last change was 100ms ago, so the debounce has not fired.
            assert_eq!(overlay.state().registry.len(), 1);

            sleep(Duration::from_millis(400)).await;
            assert_eq!(overlay.state().registry.len(), 6);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn detail_panel_uses_the_short_debounce() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            let overlay =
                overlay_for(&main_street_page(), api, Rc::new(StaticAuth::signed_in()), None)
                    .await;
            let _handle = overlay.start();
            assert!(overlay.settle(settle_limit()).await);

            let body = one(&overlay, "body");
            let panel = zillow_detail("100 Main St, 12345", "$300,000", "3 bd", "N/A");
            overlay.host(|doc| doc.append_html(body, &panel)).unwrap();

            sleep(Duration::from_millis(200)).await;
            let detail = one(&overlay, "#detail");
            assert!(overlay.state().registry.get(detail).is_some());
            // Unknown fee on a detail panel: value shown with an advisory.
            assert!(overlay.html().contains("HOA fee not listed"));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn fee_aware_detail_refreshes_the_list_card() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            let overlay = overlay_for(
                &main_street_page(),
                api.clone(),
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;
            let _handle = overlay.start();
            assert!(overlay.settle(settle_limit()).await);
            with_binding(&overlay, "#main", |b| assert!(b.state.is_value_without_fee()));

            let body = one(&overlay, "body");
            let panel = zillow_detail("100 Main St, 12345", "$300,000", "3 bd", "$250/mo");
            overlay.host(|doc| doc.append_html(body, &panel)).unwrap();

            sleep(Duration::from_secs(1)).await;
            let detail = with_binding(&overlay, "#detail", |b| b.state.clone());
            assert!(matches!(
                detail,
                BadgeVisualState::Value {
                    fee_aware: true,
                    ..
                }
            ));
            with_binding(&overlay, "#main", |b| assert_eq!(b.state, detail));
            assert_eq!(api.calls(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn removed_cards_are_swept() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            let overlay = overlay_for(
                &main_street_page(),
                api.clone(),
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;
            let _handle = overlay.start();
            assert!(overlay.settle(settle_limit()).await);

            let item = one(&overlay, "#results > li");
            let results = one(&overlay, "#results");
            overlay.host(|doc| doc.detach(item));
            sleep(Duration::from_millis(500)).await;
            assert!(overlay.state().registry.is_empty());

            // Re-attaching the same node: cached, so no loading and no fetch.
            overlay
                .host(|doc| doc.append_existing(results, item))
                .unwrap();
            sleep(Duration::from_millis(500)).await;
            assert_eq!(badge_count(&overlay), 1);
            with_binding(&overlay, "#main", |b| {
                assert!(matches!(b.state, BadgeVisualState::Value { .. }))
            });
            assert_eq!(api.calls(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn polling_catches_in_place_text_changes() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(
                FakeApi::springfield().with_zip("12346", table(800.0, 950.0, 1_150.0, 1_400.0, 1_700.0)),
            );
            let overlay =
                overlay_for(&main_street_page(), api, Rc::new(StaticAuth::signed_in()), None)
                    .await;
            let _handle = overlay.start();
            assert!(overlay.settle(settle_limit()).await);

            let address = one(&overlay, "#main address");
            overlay
                .host(|doc| doc.replace_text(address, "200 Oak Ave, 12346"))
                .unwrap();

            // Text changes are invisible to the observer.
            sleep(Duration::from_millis(500)).await;
            with_binding(&overlay, "#main", |b| {
                assert_eq!(b.fingerprint.address, "100 main st 12345")
            });

            sleep(Duration::from_millis(500)).await;
            with_binding(&overlay, "#main", |b| {
                assert_eq!(b.fingerprint.address, "200 oak ave 12346")
            });
            assert!(overlay.settle(settle_limit()).await);
            assert_eq!(badge_count(&overlay), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn polling_visits_a_bounded_rotating_batch() {
    LocalSet::new()
        .run_until(async {
            let cards: Vec<String> = (0..10)
                .map(|i| zillow_card(&format!("c{i}"), &format!("{i} Oak Ave, 12345"), "$200,000", "2 bds"))
                .collect();
            let api = Rc::new(FakeApi::springfield());
            let overlay = overlay_for(
                &crate::tests::utils::zillow_page(&cards),
                api,
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;
            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);

            overlay.poll_tick();
            assert_eq!(overlay.state().poll_cursor, 6);
            overlay.poll_tick();
            assert_eq!(overlay.state().poll_cursor, 12);
            overlay.poll_tick();
            assert_eq!(overlay.state().poll_cursor, 8);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn stopping_ends_observation() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            let overlay =
                overlay_for(&main_street_page(), api, Rc::new(StaticAuth::signed_in()), None)
                    .await;
            overlay.start().stop();

            let results = one(&overlay, "#results");
            overlay
                .host(|doc| {
                    doc.append_html(
                        results,
                        &zillow_card("elm", "7 Elm Ct, 12345", "$250,000", "2 bds"),
                    )
                })
                .unwrap();
            sleep(Duration::from_secs(2)).await;
            assert_eq!(overlay.state().registry.len(), 1);
        })
        .await;
}
