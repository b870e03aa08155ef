use crate::badge::BadgeVisualState;
use crate::db::{keys, DisplayMode};
use crate::tests::utils::{
    badge_count, find, one, overlay_for, settle_limit, table, temp_prefs, with_binding,
    zillow_card, zillow_page, FakeApi, StaticAuth,
};
use std::rc::Rc;
use tokio::task::LocalSet;

fn cash_flow(state: &BadgeVisualState) -> f64 {
    match state {
        BadgeVisualState::Value { amount, .. } => *amount,
        other => panic!("expected a value, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn main_street_goes_from_loading_to_value() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            let overlay = overlay_for(
                &crate::tests::utils::main_street_page(),
                api.clone(),
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;

            let stats = overlay.reconcile();
            assert_eq!(stats.injected, 1);
            with_binding(&overlay, "#main", |b| {
                assert_eq!(b.state, BadgeVisualState::Loading)
            });
            let badge = one(&overlay, ".rc-badge");
            assert_eq!(
                overlay.state().doc.attr(badge, "data-rc-state"),
                Some("loading")
            );

            assert!(overlay.settle(settle_limit()).await);

            with_binding(&overlay, "#main", |b| {
                let amount = cash_flow(&b.state);
                assert!(amount.is_finite());
                assert!((amount - (-316.96)).abs() < 1.0, "got {amount}");
            });
            // Same badge element, redrawn in place.
            assert_eq!(one(&overlay, ".rc-badge"), badge);
            assert!(overlay.html().contains(r#"data-rc-state="value""#));
            assert!(overlay.html().contains("-$317/mo"));
            assert_eq!(api.calls(), 1);
            assert_eq!(api.area_calls.get(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn second_pass_changes_nothing() {
    LocalSet::new()
        .run_until(async {
            let page = zillow_page(&[
                zillow_card("a", "100 Main St, 12345", "$300,000", "3 bds"),
                zillow_card("b", "7 Elm Ct, 12345", "$250,000", "2 bds"),
                zillow_card("c", "9 Birch Rd, 99999", "$180,000", "2 bds"),
                zillow_card("d", "No price Ln, 12345", "Contact agent", "2 bds"),
            ]);
            let api = Rc::new(FakeApi::springfield());
            let overlay =
                overlay_for(&page, api.clone(), Rc::new(StaticAuth::signed_in()), None).await;

            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);

            let before = overlay.state().doc.mutation_count();
            let html = overlay.html();
            let stats = overlay.reconcile();
            assert_eq!(stats.skipped, 4);
            assert!(!stats.touched());
            assert_eq!(overlay.state().doc.mutation_count(), before);
            assert_eq!(overlay.html(), html);
            assert_eq!(badge_count(&overlay), 4);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn terminal_states_never_refetch() {
    LocalSet::new()
        .run_until(async {
            // 99999 has no reference data; the API answers with an error.
            let page = zillow_page(&[zillow_card("x", "9 Birch Rd, 99999", "$180,000", "2 bds")]);
            let api = Rc::new(FakeApi::springfield());
            let overlay =
                overlay_for(&page, api.clone(), Rc::new(StaticAuth::signed_in()), None).await;

            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);
            with_binding(&overlay, "#x", |b| {
                assert_eq!(b.state, BadgeVisualState::InsufficientData)
            });

            for _ in 0..3 {
                overlay.reconcile();
                overlay.poll_tick();
            }
            assert!(overlay.settle(settle_limit()).await);
            assert_eq!(api.calls(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn rate_limit_is_terminal_until_auth_changes() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            api.rate_limited.set(true);
            let overlay = overlay_for(
                &crate::tests::utils::main_street_page(),
                api.clone(),
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;

            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);
            with_binding(&overlay, "#main", |b| {
                assert_eq!(b.state, BadgeVisualState::RateLimited)
            });
            assert_eq!(find(&overlay, r#".rc-badge button[data-rc-action="sign-in"]"#).len(), 1);

            api.rate_limited.set(false);
            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);
            assert_eq!(api.calls(), 1);
            with_binding(&overlay, "#main", |b| {
                assert_eq!(b.state, BadgeVisualState::RateLimited)
            });
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn opening_a_rate_limited_listing_does_not_refetch() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            api.rate_limited.set(true);
            let overlay = overlay_for(
                &crate::tests::utils::main_street_page(),
                api.clone(),
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;
            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);
            assert_eq!(api.calls(), 1);

            // The expanded panel knows the HOA fee the list card did not.
            let body = one(&overlay, "body");
            let panel = crate::tests::utils::zillow_detail(
                "100 Main St, 12345",
                "$300,000",
                "3 bd",
                "$250/mo",
            );
            overlay.host(|doc| doc.append_html(body, &panel)).unwrap();
            for _ in 0..3 {
                overlay.reconcile();
                assert!(overlay.settle(settle_limit()).await);
            }

            with_binding(&overlay, "#detail", |b| {
                assert_eq!(b.state, BadgeVisualState::RateLimited)
            });
            assert_eq!(api.calls(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn missing_inputs_resolve_without_loading() {
    LocalSet::new()
        .run_until(async {
            let page = zillow_page(&[
                zillow_card("noprice", "1 A St, 12345", "Contact agent", "3 bds"),
                zillow_card("nozip", "2 B St", "$200,000", "3 bds"),
                zillow_card("noaddr", "", "$200,000", "3 bds"),
            ]);
            let api = Rc::new(FakeApi::springfield());
            let overlay =
                overlay_for(&page, api.clone(), Rc::new(StaticAuth::signed_in()), None).await;

            let stats = overlay.reconcile();
            assert_eq!(stats.injected, 2);
            assert_eq!(overlay.state().registry.in_flight(), 0);
            for css in ["#noprice", "#nozip"] {
                with_binding(&overlay, css, |b| {
                    assert_eq!(b.state, BadgeVisualState::InsufficientData)
                });
            }
            // A card without an address gets no badge at all.
            let card = one(&overlay, "#noaddr");
            assert!(overlay.state().registry.get(card).is_none());
            assert_eq!(badge_count(&overlay), 2);
            assert_eq!(api.calls(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn one_fetch_per_zip() {
    LocalSet::new()
        .run_until(async {
            let page = zillow_page(&[
                zillow_card("a", "100 Main St, 12345", "$300,000", "3 bds"),
                zillow_card("b", "7 Elm Ct, 12345", "$250,000", "2 bds"),
                zillow_card("c", "8 Pine Pl, 12345", "$410,000", "4 bds"),
            ]);
            let api = Rc::new(
                FakeApi::springfield().with_delay("12345", std::time::Duration::from_millis(200)),
            );
            let overlay =
                overlay_for(&page, api.clone(), Rc::new(StaticAuth::signed_in()), None).await;

            assert_eq!(overlay.reconcile().injected, 3);
            assert_eq!(overlay.state().registry.in_flight(), 3);
            assert!(overlay.settle(settle_limit()).await);

            assert_eq!(api.calls(), 1);
            assert_eq!(overlay.state().zip_cache.len(crate::cache::DataTier::FmrOnly), 1);
            for css in ["#a", "#b", "#c"] {
                with_binding(&overlay, css, |b| assert!(b.state.is_terminal()));
            }
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn swapped_listing_gets_a_fresh_badge() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(
                FakeApi::springfield().with_zip("12346", table(800.0, 950.0, 1_150.0, 1_400.0, 1_700.0)),
            );
            let overlay = overlay_for(
                &crate::tests::utils::main_street_page(),
                api.clone(),
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;
            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);
            let card = one(&overlay, "#main");
            let old_badge = one(&overlay, ".rc-badge");

            // The host reuses the same card node for a different listing.
            let address = one(&overlay, "#main address");
            overlay
                .host(|doc| doc.replace_children_html(address, "200 Oak Ave, 12346"))
                .unwrap();

            let stats = overlay.reconcile();
            assert_eq!(stats.reprocessed, 1);
            assert_eq!(one(&overlay, "#main"), card);

            let new_badge = one(&overlay, ".rc-badge");
            assert_ne!(new_badge, old_badge);
            assert!(!overlay.state().doc.is_connected(old_badge));
            with_binding(&overlay, "#main", |b| {
                assert_eq!(b.state, BadgeVisualState::Loading);
                assert_eq!(b.fingerprint.address, "200 oak ave 12346");
                assert_eq!(
                    overlay.state().doc.attr(new_badge, "data-rc-key"),
                    Some(b.fingerprint.digest().as_str())
                );
            });

            assert!(overlay.settle(settle_limit()).await);
            assert_eq!(api.calls(), 2);
            with_binding(&overlay, "#main", |b| assert!(cash_flow(&b.state).is_finite()));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn cached_listing_resolves_in_the_same_pass() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            let overlay = overlay_for(
                &crate::tests::utils::main_street_page(),
                api.clone(),
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;
            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);

            // The host re-renders the whole card.
            let item = one(&overlay, "#results > li");
            let fresh = zillow_card("main", "100 Main St, 12345", "$300,000", "3 bds");
            let inner = fresh
                .trim()
                .trim_start_matches("<li>")
                .trim_end_matches("</li>")
                .to_string();
            overlay
                .host(|doc| doc.replace_children_html(item, &inner))
                .unwrap();

            let stats = overlay.reconcile();
            assert_eq!(stats.injected, 1);
            assert_eq!(stats.swept, 1);
            assert_eq!(overlay.state().registry.in_flight(), 0);
            with_binding(&overlay, "#main", |b| assert!(cash_flow(&b.state).is_finite()));
            assert_eq!(badge_count(&overlay), 1);
            assert_eq!(api.calls(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn stray_badges_are_cleaned_up() {
    LocalSet::new()
        .run_until(async {
            let card = zillow_card("main", "100 Main St, 12345", "$300,000", "3 bds").replace(
                "</article>",
                r#"<span class="rc-badge" data-rc-key="old">$5/mo</span></article>"#,
            );
            let api = Rc::new(FakeApi::springfield());
            let overlay = overlay_for(
                &zillow_page(&[card]),
                api,
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;

            overlay.reconcile();
            assert_eq!(badge_count(&overlay), 1);
            let badge = one(&overlay, ".rc-badge");
            assert_ne!(overlay.state().doc.attr(badge, "data-rc-key"), Some("old"));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn hidden_cards_are_left_alone() {
    LocalSet::new()
        .run_until(async {
            let card = zillow_card("main", "100 Main St, 12345", "$300,000", "3 bds")
                .replacen("<li>", r#"<li style="display: none">"#, 1);
            let api = Rc::new(FakeApi::springfield());
            let overlay = overlay_for(
                &zillow_page(&[card]),
                api.clone(),
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;

            let stats = overlay.reconcile();
            assert_eq!(stats.hidden, 1);
            assert_eq!(badge_count(&overlay), 0);
            assert_eq!(api.calls(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn losing_the_address_removes_the_badge() {
    LocalSet::new()
        .run_until(async {
            let api = Rc::new(FakeApi::springfield());
            let overlay = overlay_for(
                &crate::tests::utils::main_street_page(),
                api,
                Rc::new(StaticAuth::signed_in()),
                None,
            )
            .await;
            overlay.reconcile();
            assert_eq!(badge_count(&overlay), 1);

            let address = one(&overlay, "#main address");
            overlay.host(|doc| doc.replace_children_html(address, "")).unwrap();

            let stats = overlay.reconcile();
            assert_eq!(stats.released, 1);
            assert_eq!(badge_count(&overlay), 0);
            assert!(overlay.state().registry.is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn six_bedrooms_scale_the_four_bedroom_rent() {
    LocalSet::new()
        .run_until(async {
            let (store, _guard) = temp_prefs();
            store.set(keys::DISPLAY_MODE, &DisplayMode::Rent).await.unwrap();

            let page = zillow_page(&[zillow_card("big", "12 Manor Dr, 12345", "$900,000", "6 bds")]);
            let api = Rc::new(FakeApi::springfield());
            let overlay = overlay_for(
                &page,
                api,
                Rc::new(StaticAuth::signed_in()),
                Some(Rc::new(store)),
            )
            .await;

            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);
            // round(1999 * 1.15^2)
            with_binding(&overlay, "#big", |b| {
                assert_eq!(
                    b.state,
                    BadgeVisualState::Value {
                        amount: 2_644.0,
                        fee_aware: true
                    }
                )
            });
            assert!(overlay.html().contains("$2,644/mo"));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn fee_aware_result_is_kept_over_fee_less() {
    LocalSet::new()
        .run_until(async {
            // The detail panel knows the HOA fee; the list card does not.
            let page = zillow_page(&[zillow_card(
                "main",
                "100 Main St, 12345",
                "$300,000",
                "3 bds",
            )])
            .replace(
                "</body>",
                &format!(
                    "{}</body>",
                    crate::tests::utils::zillow_detail(
                        "100 Main St, 12345",
                        "$300,000",
                        "3 bd",
                        "$250/mo"
                    )
                ),
            );
            let api = Rc::new(FakeApi::springfield());
            let overlay =
                overlay_for(&page, api.clone(), Rc::new(StaticAuth::signed_in()), None).await;

            overlay.reconcile();
            assert!(overlay.settle(settle_limit()).await);

            let detail = with_binding(&overlay, "#detail", |b| b.state.clone());
            let list = with_binding(&overlay, "#main", |b| b.state.clone());
            assert!(matches!(
                detail,
                BadgeVisualState::Value {
                    fee_aware: true,
                    ..
                }
            ));
            assert_eq!(list, detail);
            assert!((cash_flow(&detail) - (-566.96)).abs() < 1.0);
            assert_eq!(api.calls(), 1);
        })
        .await;
}
