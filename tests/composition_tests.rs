//! Composition engine and activation slot scenarios.

mod common;

use common::*;
use compose_navigator::*;
use parking_lot::Mutex;
use std::sync::Arc;

struct Recorder(Arc<Mutex<Vec<String>>>);

impl CompositionHooks for Recorder {
    fn binding_complete(&self, _node: NodeId, _viewmodel: &ViewModelHandle, _args: &[Arg]) -> Hook {
        self.0.lock().push("caller:binding_complete".to_string());
        Hook::done()
    }

    fn descendants_complete(
        &self,
        _node: NodeId,
        _viewmodel: &ViewModelHandle,
        _args: &[Arg],
    ) -> Hook {
        self.0.lock().push("caller:descendants_complete".to_string());
        Hook::done()
    }

    fn composition_complete(&self, _viewmodel: &ViewModelHandle, args: &[Arg]) -> Hook {
        self.0.lock().push(format!("caller:composition_complete:{args:?}"));
        Hook::done()
    }
}

#[tokio::test]
async fn test_named_view_is_loaded_and_parsed_once() {
    let host = Host::new();
    host.loader.register_view("views/home", "<section>home</section>");
    let first = host.region("first");
    let second = host.region("second");

    for region in [first, second] {
        host.engine
            .compose(
                region,
                CompositionOptions::new(Tracker::named("home").handle()).view("views/home"),
            )
            .await
            .unwrap();
    }

    assert_eq!(host.loader.view_loads(), 1);
    assert_eq!(host.document.parse_count(), 1);
    assert_eq!(host.document.text_content(second), vec!["<section>home</section>"]);
    assert_eq!(host.engine.cache_stats().hits, 1);
}

#[tokio::test]
async fn test_module_composition_uses_module_view() {
    let host = Host::new();
    let dashboard = Tracker::named("dashboard").handle();
    host.loader.register_module("pages/dashboard", dashboard.clone());
    host.loader.register_view("pages/dashboard", "<main>dashboard</main>");
    let region = host.region("content");

    host.engine
        .compose(
            "content",
            CompositionOptions::new(ViewModelSource::module("pages/dashboard")).activate(true),
        )
        .await
        .unwrap();

    assert!(dashboard.is_activated());
    assert_eq!(host.engine.viewmodel_of(region), Some(dashboard));
    assert_eq!(host.document.text_content(region), vec!["<main>dashboard</main>"]);
}

#[tokio::test]
async fn test_hooks_fire_in_stage_order() {
    let host = Host::new();
    let region = host.region("content");
    let vm = Tracker::named("page").with_view("<p>page</p>").handle();
    let caller = Arc::new(Mutex::new(Vec::new()));

    host.engine
        .compose(
            region,
            CompositionOptions::new(vm.clone())
                .args(vec![Some("x".to_string())])
                .activate(true)
                .hooks(Recorder(caller.clone())),
        )
        .await
        .unwrap();

    assert_eq!(
        events(&vm),
        vec!["activate", "binding_complete", "descendants_complete", "composition_complete"]
    );
    assert_eq!(
        *caller.lock(),
        vec![
            "caller:binding_complete".to_string(),
            "caller:descendants_complete".to_string(),
            r#"caller:composition_complete:[Some("x")]"#.to_string(),
        ]
    );
    assert_eq!(*tracker(&vm).activations.lock(), vec![vec![Some("x".to_string())]]);
}

#[tokio::test]
async fn test_swapping_deactivates_previous_occupant() {
    let host = Host::new();
    let region = host.region("content");
    let first = Tracker::named("first").with_view("<p>1</p>").handle();
    let second = Tracker::named("second").with_view("<p>2</p>").handle();

    for vm in [&first, &second] {
        host.engine
            .compose(region, CompositionOptions::new(vm.clone()).activate(true))
            .await
            .unwrap();
    }

    assert!(!first.is_activated());
    assert!(second.is_activated());
    assert_eq!(events(&first).last().map(String::as_str), Some("deactivate:true"));
    assert_eq!(host.document.text_content(region), vec!["<p>2</p>"]);
}

#[tokio::test]
async fn test_recomposing_same_instance_changes_nothing() {
    let host = Host::new();
    let region = host.region("content");
    let vm = Tracker::named("page").with_view("<p>page</p>").handle();
    let options = CompositionOptions::new(vm.clone()).activate(true);

    host.engine.compose(region, options.clone()).await.unwrap();
    let mutations = host.document.mutation_count();
    let recorded = events(&vm);

    host.engine.compose(region, options).await.unwrap();

    // Only the lifecycle reruns; no completion hook fires again.
    let mut expected = recorded;
    expected.extend(["deactivate:false".to_string(), "activate".to_string()]);
    assert_eq!(host.document.mutation_count(), mutations);
    assert_eq!(events(&vm), expected);
    assert!(vm.is_activated());
}

#[tokio::test]
async fn test_replaced_composition_skips_pending_completion() {
    let host = Host::new();
    host.document.hold_descendants(true);
    let region = host.region("content");
    let first = Tracker::named("first").with_view("<p>1</p>").handle();
    let second = Tracker::named("second").with_view("<p>2</p>").handle();

    let mut pending_first = Box::pin(
        host.engine
            .compose(region, CompositionOptions::new(first.clone()).activate(true)),
    );
    assert!(futures::poll!(&mut pending_first).is_pending());

    let mut pending_second = Box::pin(
        host.engine
            .compose(region, CompositionOptions::new(second.clone()).activate(true)),
    );
    assert!(futures::poll!(&mut pending_second).is_pending());

    pending_first.await.unwrap();
    assert_eq!(
        events(&first),
        vec!["activate", "binding_complete", "deactivate:true"]
    );

    host.document.settle_descendants(region);
    pending_second.await.unwrap();
    assert_eq!(
        events(&second),
        vec!["activate", "binding_complete", "descendants_complete", "composition_complete"]
    );
}

#[tokio::test]
async fn test_region_removal_deactivates_and_disposes() {
    let host = Host::new();
    let region = host.region("content");
    let vm = Tracker::named("page").with_view("<p>page</p>").handle();
    host.engine
        .compose(region, CompositionOptions::new(vm.clone()).activate(true))
        .await
        .unwrap();

    host.document.remove_node(region).await;

    assert!(!vm.is_activated());
    assert_eq!(
        events(&vm)[4..].to_vec(),
        vec!["deactivate:true".to_string(), "dispose".to_string()]
    );
    assert!(host.engine.viewmodel_of(region).is_none());
}

#[tokio::test]
async fn test_dispose_runs_when_deactivate_fails() {
    let host = Host::new();
    let region = host.region("content");
    let vm = Tracker::named("page")
        .with_view("<p>page</p>")
        .refusing_deactivate()
        .handle();
    host.engine
        .compose(region, CompositionOptions::new(vm.clone()).activate(true))
        .await
        .unwrap();

    let err = host.engine.dispose_region(region).await.unwrap_err();

    assert_eq!(err.to_string(), "page stays");
    assert_eq!(
        events(&vm)[4..].to_vec(),
        vec!["deactivate:true".to_string(), "dispose".to_string()]
    );
    assert!(host.engine.viewmodel_of(region).is_none());
}

#[tokio::test]
async fn test_removal_disposes_when_deactivate_fails() {
    init_logging();
    let host = Host::new();
    let region = host.region("content");
    let vm = Tracker::named("page")
        .with_view("<p>page</p>")
        .refusing_deactivate()
        .handle();
    host.engine
        .compose(region, CompositionOptions::new(vm.clone()).activate(true))
        .await
        .unwrap();

    host.document.remove_node(region).await;

    assert_eq!(events(&vm).last().map(String::as_str), Some("dispose"));
    assert!(host.engine.viewmodel_of(region).is_none());
}

#[tokio::test]
async fn test_recomposing_after_dispose_keeps_one_removal_callback() {
    let host = Host::new();
    let region = host.region("content");

    for _ in 0..3 {
        let vm = Tracker::named("page").with_view("<p>page</p>").handle();
        host.engine
            .compose(region, CompositionOptions::new(vm).activate(true))
            .await
            .unwrap();
        host.engine.dispose_region(region).await.unwrap();
    }

    assert_eq!(host.document.removal_callbacks(region), 1);
}

#[tokio::test]
async fn test_missing_module_view_is_a_composition_error() {
    let host = Host::new();
    host.loader.register_module("pages/blank", Tracker::named("blank").handle());
    let region = host.region("content");

    let err = host
        .engine
        .compose(region, CompositionOptions::new(ViewModelSource::module("pages/blank")))
        .await
        .unwrap_err();

    assert!(err.is_composition());
    assert!(err.to_string().starts_with("composer: "));
}

// ============================================================================
// Activation slot
// ============================================================================

#[tokio::test]
async fn test_slot_last_write_wins() {
    let host = Host::new();
    let slot = ActivationSlot::new(host.loader.clone());
    let first = Tracker::named("first").handle();
    let second = Tracker::named("second").handle();

    let write_first = slot.set(Some(first.clone().into()));
    let write_second = slot.set(Some(second.clone().into()));
    write_second.await.unwrap();
    assert_eq!(slot.settled().await.unwrap(), Some(second.clone()));

    drop(write_first);
    assert!(!first.is_activated());
    assert!(second.is_activated());
}

#[tokio::test]
async fn test_slot_shared_outcome() {
    let host = Host::new();
    let slot = ActivationSlot::new(host.loader.clone());
    let vm = Tracker::named("page").handle();

    let write = slot.set(Some(vm.clone().into()));
    let (a, b) = futures::join!(write.clone(), slot.settled());

    assert_eq!(a.unwrap(), Some(vm.clone()));
    assert_eq!(b.unwrap(), Some(vm.clone()));
    assert_eq!(events(&vm), vec!["activate"]);
}

#[tokio::test]
async fn test_slot_rejection_reaches_every_awaiter() {
    let host = Host::new();
    let slot = ActivationSlot::new(host.loader.clone());
    let write = slot.set(Some(Tracker::named("page").refusing().handle().into()));

    let (a, b) = futures::join!(write.clone(), write);

    assert_eq!(a.unwrap_err().to_string(), "page refused");
    assert_eq!(b.unwrap_err().to_string(), "page refused");
    assert!(slot.get().is_none());
}

#[tokio::test]
async fn test_superseded_write_releases_activation() {
    let host = Host::new();
    let slot = ActivationSlot::new(host.loader.clone());
    let vm = Tracker::named("page").stalling_once().handle();

    let mut first = slot.set(Some(vm.clone().into()));
    assert!(futures::poll!(&mut first).is_pending());
    assert_eq!(vm.state(), ActivationState::Activating);

    let second = slot.set(Some(vm.clone().into()));
    drop(first);
    assert_eq!(vm.state(), ActivationState::Inactive);

    assert_eq!(second.await.unwrap(), Some(vm.clone()));
    assert!(vm.is_activated());
    assert_eq!(events(&vm), vec!["stall", "activate"]);
}

#[tokio::test]
async fn test_slot_clears_with_none() {
    let host = Host::new();
    let slot = ActivationSlot::new(host.loader.clone());
    let vm = Tracker::named("page").handle();
    slot.set(Some(vm.clone().into())).await.unwrap();

    let cleared = slot.set(None).await.unwrap();

    assert!(cleared.is_none());
    assert!(slot.get().is_none());
    assert_eq!(events(&vm), vec!["activate", "deactivate:true"]);
}
