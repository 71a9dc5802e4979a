//! Hub registry and fragment handles.
//!
//! - [`PortletHub`]: owns the page state and listener table; bootstraps the
//!   page and registers fragments.
//! - [`FragmentHandle`]: per-fragment surface for URL building, state
//!   mutation and listener (de)registration.

pub mod handle;
pub mod registry;

pub use handle::{FragmentHandle, UrlFuture};
pub use registry::PortletHub;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use super::*;
    use crate::cacheability::CacheLevel;
    use crate::codec::ParameterMap;
    use crate::config::HubConfig;
    use crate::error::HubError;
    use crate::events::{ListenerHandle, ListenerScope, STATE_CHANGE_EVENT};
    use crate::state::{
        CapabilityDescriptor, FragmentDefinition, PageDefinition, RenderState,
    };
    use crate::url::{UrlKind, UrlToken};

    //                private parms        public parms (owned / subscribed)
    //    portletA      parm1, parm2         -
    //    portletB      parm1, parm2         pubparm1 /  -
    //    portletC      parm1, parm2         pubparm2 / pubparm1
    //    portletD      parm2, pubparm1         -     / pubparm2
    //    portletE      parm1, parm2            -     / pubparm1, pubparm2
    //    portletF        -                     -
    fn page() -> PageDefinition {
        let initial = |v: &str| {
            ParameterMap::new()
                .with("parm1", vec![Some(v.to_string())])
                .with("parm2", vec![Some(format!("{v}-2")), None])
        };
        PageDefinition::new()
            .with_fragment(
                FragmentDefinition::new(
                    "portletA",
                    CapabilityDescriptor::new().with_private(["parm1", "parm2"]),
                )
                .with_initial_state(initial("a")),
            )
            .with_fragment(
                FragmentDefinition::new(
                    "portletB",
                    CapabilityDescriptor::new()
                        .with_private(["parm1", "parm2"])
                        .owning(["pubparm1"]),
                )
                .with_initial_state(initial("b")),
            )
            .with_fragment(
                FragmentDefinition::new(
                    "portletC",
                    CapabilityDescriptor::new()
                        .with_private(["parm1", "parm2"])
                        .owning(["pubparm2"])
                        .subscribing(["pubparm1"]),
                )
                .with_initial_state(
                    initial("c").with("pubparm2", vec![Some("shared2".to_string())]),
                ),
            )
            .with_fragment(FragmentDefinition::new(
                "portletD",
                CapabilityDescriptor::new()
                    .with_private(["parm2", "pubparm1"])
                    .subscribing(["pubparm2"]),
            ))
            .with_fragment(FragmentDefinition::new(
                "portletE",
                CapabilityDescriptor::new()
                    .with_private(["parm1", "parm2"])
                    .subscribing(["pubparm1", "pubparm2"]),
            ))
            .with_fragment(FragmentDefinition::new(
                "portletF",
                CapabilityDescriptor::new(),
            ))
    }

    fn hub() -> PortletHub {
        let hub = PortletHub::default();
        hub.bootstrap(&page()).unwrap();
        hub
    }

    fn value(v: &str) -> Vec<Option<String>> {
        vec![Some(v.to_string())]
    }

    fn parms() -> Value {
        json!({"rp1": ["resVal"], "rp2": ["resVal2"]})
    }

    async fn url(handle: &FragmentHandle, args: &[Value]) -> UrlToken {
        let url = handle.create_resource_url(args).unwrap().await.unwrap();
        UrlToken::decode(&url, "ph").unwrap()
    }

    /// Let spawned notification drains run.
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    type Seen = Arc<Mutex<Vec<RenderState>>>;

    fn recorder() -> (Seen, impl Fn(&str, &RenderState) + Send + Sync + 'static) {
        let seen: Seen = Arc::default();
        let sink = seen.clone();
        (seen, move |event_type: &str, state: &RenderState| {
            assert_eq!(event_type, STATE_CHANGE_EVENT);
            sink.lock().push(state.clone());
        })
    }

    // --- createResourceUrl argument handling ---

    #[tokio::test]
    async fn test_resource_url_argument_errors_are_synchronous() {
        let hub = hub();
        let a = hub.register("portletA").await.unwrap();

        let cases = [
            (
                vec![Value::Null, json!("parm1"), json!("parm2"), json!("parm3")],
                "TooManyArguments",
            ),
            (
                vec![json!({"rp1": ["resVal"]}), json!("Invalid")],
                "InvalidCacheability",
            ),
            (
                vec![json!("cacheLevelPage"), json!("cacheLevelFull")],
                "DuplicateCacheability",
            ),
            (vec![parms(), parms()], "DuplicateParameters"),
            (vec![json!("cacheLevelPage"), parms()], "AmbiguousArguments"),
            (vec![json!({"rp1": "resVal"})], "InvalidParameters"),
        ];
        for (args, variant) in cases {
            let err = a.create_resource_url(&args).err().unwrap();
            assert!(err.is_type_error(), "{args:?}");
            assert!(format!("{err:?}").starts_with(variant), "{args:?}: {err}");
        }
    }

    #[tokio::test]
    async fn test_resource_url_resolves_to_string() {
        let hub = hub();
        let a = hub.register("portletA").await.unwrap();

        for args in [
            vec![],
            vec![parms()],
            vec![Value::Null, json!("cacheLevelPortlet")],
            vec![json!("cacheLevelPortlet")],
            vec![parms(), json!("cacheLevelFull")],
        ] {
            let url = a.create_resource_url(&args).unwrap().await.unwrap();
            assert!(url.starts_with("/portal?ph="));
        }
    }

    #[tokio::test]
    async fn test_resource_url_defaults() {
        let hub = hub();
        let a = hub.register("portletA").await.unwrap();
        let token = url(&a, &[]).await;
        assert!(token.is_resource_url());
        assert!(token.parameters.is_empty());
        assert_eq!(token.cache_level, Some(CacheLevel::Full));
        assert!(token.state.is_empty());
    }

    #[tokio::test]
    async fn test_resource_url_identifies_initiator() {
        let hub = hub();
        let a = hub.register("portletA").await.unwrap();
        let b = hub.register("portletB").await.unwrap();
        let args = [parms(), json!("cacheLevelPage")];
        assert_eq!(url(&a, &args).await.initiator(), "portletA");
        assert_eq!(url(&b, &args).await.initiator(), "portletB");
    }

    #[tokio::test]
    async fn test_resource_url_carries_cacheability_and_parameters() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();

        for cache in ["cacheLevelPage", "cacheLevelPortlet", "cacheLevelFull"] {
            let token = url(&b, &[parms(), json!(cache)]).await;
            assert_eq!(token.cache_level.unwrap().as_str(), cache);
            assert_eq!(token.parameters.to_value(), parms());
        }

        for p in [
            json!({"rp1": ["resVal", "resVal1"], "rp2": ["resVal2"]}),
            json!({"rp1": ["resVal", null, "resVal1"], "rp2": ["resVal2"]}),
            json!({"rp1": ["resVal"], "rp2": [null]}),
        ] {
            let token = url(&b, &[p.clone(), json!("cacheLevelPage")]).await;
            assert_eq!(token.parameters.to_value(), p);
        }

        let token = url(&b, &[Value::Null, json!("cacheLevelPage")]).await;
        assert!(token.parameters.is_empty());
    }

    #[tokio::test]
    async fn test_resource_url_embeds_state_by_cache_level() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let c = hub.register("portletC").await.unwrap();
        let b_state = b.render_state().unwrap();
        let c_state = c.render_state().unwrap();

        let page = url(&b, &[parms(), json!("cacheLevelPage")]).await;
        assert_eq!(page.state_of("portletB"), b_state);
        assert_eq!(page.state_of("portletC"), c_state);
        assert_eq!(page.state.len(), 6);

        let portlet = url(&b, &[parms(), json!("cacheLevelPortlet")]).await;
        assert_eq!(portlet.state_of("portletB"), b_state);
        assert!(portlet.state_of("portletC").is_empty());

        let full = url(&b, &[parms(), json!("cacheLevelFull")]).await;
        assert!(full.state_of("portletB").is_empty());
        assert!(full.state_of("portletC").is_empty());
    }

    #[tokio::test]
    async fn test_resource_url_snapshot_taken_at_call_time() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let pending = b
            .create_resource_url(&[Value::Null, json!("cacheLevelPortlet")])
            .unwrap();
        b.set_render_state(&ParameterMap::new().with("parm1", value("later")))
            .unwrap();
        let token = UrlToken::decode(&pending.await.unwrap(), "ph").unwrap();
        assert_eq!(token.state_of("portletB").get_value("parm1"), Some("b"));
    }

    #[tokio::test]
    async fn test_typed_resource_url() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let p = ParameterMap::new().with("rp1", vec![None]);
        let raw = b
            .resource_url(Some(p.clone()), Some(CacheLevel::Portlet))
            .unwrap()
            .await
            .unwrap();
        let token = UrlToken::decode(&raw, "ph").unwrap();
        assert_eq!(token.parameters, p);
        assert_eq!(token.state.len(), 1);
    }

    // --- render and action URLs ---

    #[tokio::test]
    async fn test_render_and_action_urls() {
        let hub = hub();
        let c = hub.register("portletC").await.unwrap();

        let raw = c.create_render_url(&[json!({"r": ["1"]})]).unwrap().await.unwrap();
        let render = UrlToken::decode(&raw, "ph").unwrap();
        assert_eq!(render.kind, UrlKind::Render);
        assert_eq!(render.state_of("portletC"), c.render_state().unwrap());
        assert_eq!(render.cache_level, None);

        let raw = c.action_url(None).unwrap().await.unwrap();
        let action = UrlToken::decode(&raw, "ph").unwrap();
        assert_eq!(action.kind, UrlKind::Action);
        assert_eq!(action.initiator(), "portletC");

        let err = c
            .create_action_url(&[json!({}), json!("cacheLevelPage")])
            .err()
            .unwrap();
        assert!(err.is_type_error());
    }

    #[tokio::test]
    async fn test_custom_base_url() {
        let hub = PortletHub::new(HubConfig::default().with_base_url("/site/page?x=1"));
        hub.bootstrap(&page()).unwrap();
        let f = hub.register("portletF").await.unwrap();
        let raw = f.render_url(None).unwrap().await.unwrap();
        assert!(raw.starts_with("/site/page?x=1&ph="));
    }

    // --- shared state ---

    #[tokio::test]
    async fn test_public_parameter_shared_with_subscriber() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let c = hub.register("portletC").await.unwrap();
        let d = hub.register("portletD").await.unwrap();

        b.set_render_state(&ParameterMap::new().with("pubparm1", value("x")))
            .unwrap();

        let c_state = c.render_state().unwrap();
        assert_eq!(c_state.get("pubparm1").unwrap(), &[Some("x".to_string())]);
        // portletD has a private parameter of the same name
        assert!(!d.render_state().unwrap().contains("pubparm1"));

        let page = url(&b, &[parms(), json!("cacheLevelPage")]).await;
        assert_eq!(page.state_of("portletC").get_value("pubparm1"), Some("x"));
        assert_eq!(page.state_of("portletE").get_value("pubparm1"), Some("x"));
    }

    #[tokio::test]
    async fn test_subscriber_write_denied() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let c = hub.register("portletC").await.unwrap();
        b.set_render_state(&ParameterMap::new().with("pubparm1", value("x")))
            .unwrap();

        let err = c
            .set_render_state(&ParameterMap::new().with("pubparm1", value("y")))
            .unwrap_err();
        assert!(matches!(err, HubError::AccessDenied { .. }));
        assert_eq!(c.render_state().unwrap().get_value("pubparm1"), Some("x"));
        assert_eq!(b.render_state().unwrap().get_value("pubparm1"), Some("x"));
        assert_eq!(hub.pending_notifications(), 0);
    }

    // --- notifications ---

    #[tokio::test]
    async fn test_listener_notified_once_per_mutation() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let c = hub.register("portletC").await.unwrap();
        let (seen, callback) = recorder();
        c.add_event_listener(STATE_CHANGE_EVENT, callback).unwrap();

        settle().await;
        assert!(seen.lock().is_empty());

        b.set_render_state(&ParameterMap::new().with("pubparm1", value("x")))
            .unwrap();
        settle().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], c.render_state().unwrap());
        assert_eq!(seen[0].get_value("pubparm1"), Some("x"));
    }

    #[tokio::test]
    async fn test_portlet_scope_ignores_unrelated_mutations() {
        let hub = hub();
        let a = hub.register("portletA").await.unwrap();
        let c = hub.register("portletC").await.unwrap();
        let (seen_c, callback_c) = recorder();
        c.add_event_listener(STATE_CHANGE_EVENT, callback_c).unwrap();
        let (seen_page, callback_page) = recorder();
        c.add_event_listener_scoped(STATE_CHANGE_EVENT, ListenerScope::Page, callback_page)
            .unwrap();

        a.set_render_state(&ParameterMap::new().with("parm1", value("z")))
            .unwrap();
        settle().await;

        assert!(seen_c.lock().is_empty());
        assert_eq!(seen_page.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_removed_listener_gets_nothing_in_flight() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let (seen, callback) = recorder();
        let handle = b.add_event_listener(STATE_CHANGE_EVENT, callback).unwrap();

        b.set_render_state(&ParameterMap::new().with("parm1", value("1")))
            .unwrap();
        assert_eq!(hub.pending_notifications(), 1);
        assert!(b.remove_event_listener(handle));
        assert!(!b.remove_event_listener(handle));
        settle().await;
        assert_eq!(hub.flush_notifications(), 0);
        assert!(seen.lock().is_empty());

        b.set_render_state(&ParameterMap::new().with("parm1", value("2")))
            .unwrap();
        settle().await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_mutations_before_delivery_coalesce() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let (seen, callback) = recorder();
        b.add_event_listener(STATE_CHANGE_EVENT, callback).unwrap();

        for v in ["1", "2", "3"] {
            b.set_render_state(&ParameterMap::new().with("parm1", value(v)))
                .unwrap();
        }
        settle().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get_value("parm1"), Some("3"));
    }

    #[tokio::test]
    async fn test_listeners_invoked_in_registration_order() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let c = hub.register("portletC").await.unwrap();
        let e = hub.register("portletE").await.unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for handle in [&e, &b, &c] {
            let order = order.clone();
            let id = handle.id().to_string();
            handle
                .add_event_listener(STATE_CHANGE_EVENT, move |_: &str, _: &RenderState| {
                    order.lock().push(id.clone())
                })
                .unwrap();
        }

        b.set_render_state(&ParameterMap::new().with("pubparm1", value("x")))
            .unwrap();
        assert_eq!(hub.flush_notifications(), 3);
        assert_eq!(*order.lock(), vec!["portletE", "portletB", "portletC"]);
    }

    #[tokio::test]
    async fn test_listener_may_mutate_from_callback() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let c = hub.register("portletC").await.unwrap();
        let (seen_b, callback_b) = recorder();
        b.add_event_listener(STATE_CHANGE_EVENT, callback_b).unwrap();

        let writer = c.clone();
        c.add_event_listener(STATE_CHANGE_EVENT, move |_: &str, state: &RenderState| {
            let shared = state.get_value("pubparm1") == Some("x");
            if shared && state.get_value("parm1") != Some("seen") {
                writer
                    .set_render_state(&ParameterMap::new().with("parm1", value("seen")))
                    .unwrap();
            }
        })
        .unwrap();

        b.set_render_state(&ParameterMap::new().with("pubparm1", value("x")))
            .unwrap();
        settle().await;
        hub.flush_notifications();

        assert_eq!(c.render_state().unwrap().get_value("parm1"), Some("seen"));
        assert_eq!(seen_b.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_announce_on_subscribe() {
        let hub = PortletHub::new(HubConfig::default().with_announce_on_subscribe(true));
        hub.bootstrap(&page()).unwrap();
        let a = hub.register("portletA").await.unwrap();
        let (seen, callback) = recorder();
        a.add_event_listener(STATE_CHANGE_EVENT, callback).unwrap();
        settle().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get_value("parm1"), Some("a"));
    }

    #[tokio::test]
    async fn test_unsupported_event_type() {
        let hub = hub();
        let a = hub.register("portletA").await.unwrap();
        let err = a
            .add_event_listener("portlet.onError", |_: &str, _: &RenderState| {})
            .unwrap_err();
        assert!(matches!(err, HubError::UnsupportedEventType(_)));
    }

    #[tokio::test]
    async fn test_cannot_remove_other_fragments_listener() {
        let hub = hub();
        let a = hub.register("portletA").await.unwrap();
        let b = hub.register("portletB").await.unwrap();
        let handle = a
            .add_event_listener(STATE_CHANGE_EVENT, |_: &str, _: &RenderState| {})
            .unwrap();
        assert!(!b.remove_event_listener(handle));
        assert!(a.remove_event_listener(handle));
    }

    #[test]
    fn test_flush_without_runtime() {
        let hub = hub();
        let b = tokio_test::block_on(hub.register("portletB")).unwrap();
        let (seen, callback) = recorder();
        b.add_event_listener(STATE_CHANGE_EVENT, callback).unwrap();
        b.set_render_state(&ParameterMap::new().with("parm1", value("1")))
            .unwrap();
        assert_eq!(hub.pending_notifications(), 1);
        assert_eq!(hub.flush_notifications(), 1);
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_listener_added_after_commit_misses_queued_cycle() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let c = hub.register("portletC").await.unwrap();
        let (seen_b, callback_b) = recorder();
        b.add_event_listener(STATE_CHANGE_EVENT, callback_b).unwrap();

        b.set_render_state(&ParameterMap::new().with("pubparm1", value("x")))
            .unwrap();
        assert!(hub.pending_notifications() > 0);
        let (seen_c, callback_c) = recorder();
        c.add_event_listener(STATE_CHANGE_EVENT, callback_c).unwrap();
        settle().await;

        assert_eq!(seen_b.lock().len(), 1);
        assert!(seen_c.lock().is_empty());
    }

    // --- delivery on a multi-thread runtime ---

    /// Counts calls of one callback and how many of them overlap.
    #[derive(Default)]
    struct Overlap {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Overlap {
        fn run(&self, work: Duration) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(work);
            self.active.fetch_sub(1, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn active(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }
    }

    async fn wait_for(done: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    fn slow_listener(handle: &FragmentHandle, overlap: &Arc<Overlap>) -> ListenerHandle {
        let overlap = overlap.clone();
        handle
            .add_event_listener(STATE_CHANGE_EVENT, move |_: &str, _: &RenderState| {
                overlap.run(Duration::from_millis(150))
            })
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_deliveries_never_overlap_across_workers() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let overlap = Arc::new(Overlap::default());
        slow_listener(&b, &overlap);

        b.set_render_state(&ParameterMap::new().with("parm1", value("1")))
            .unwrap();
        wait_for(|| overlap.calls() == 1).await;
        // committed while the first callback is still running
        b.set_render_state(&ParameterMap::new().with("parm1", value("2")))
            .unwrap();
        wait_for(|| overlap.calls() == 2 && overlap.active() == 0).await;

        assert_eq!(overlap.peak.load(Ordering::SeqCst), 1);
        assert_eq!(hub.pending_notifications(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_removal_waits_for_delivery_in_progress() {
        let hub = hub();
        let b = hub.register("portletB").await.unwrap();
        let overlap = Arc::new(Overlap::default());
        let handle = slow_listener(&b, &overlap);

        b.set_render_state(&ParameterMap::new().with("parm1", value("1")))
            .unwrap();
        wait_for(|| overlap.calls() == 1).await;
        assert!(b.remove_event_listener(handle));
        assert_eq!(overlap.active(), 0);

        b.set_render_state(&ParameterMap::new().with("parm1", value("2")))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(overlap.calls(), 1);
    }
}
