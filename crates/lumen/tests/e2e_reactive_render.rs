#![forbid(unsafe_code)]

//! Full-loop tests: reactive state drives batched re-renders into the
//! in-memory host.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lumen::{
    App, Computed, EvalError, MountOptions, VNode, Value, WatchSource, Watcher, WatcherOptions,
    observe, run_ticks, set_key,
};
use lumen_harness::{MemHost, NodeId, patcher};

fn li(key: &str) -> VNode<NodeId> {
    VNode::element("li", None, vec![VNode::text(key)]).keyed(key)
}

fn counter_app(host: &MemHost) -> (App<MemHost>, Value) {
    let state = Value::object([("n", Value::Int(0))]);
    let app = App::mount(
        patcher(host),
        host.create_root(),
        state.clone(),
        |ctx| {
            let n = ctx.as_object().and_then(|o| o.get("n").as_int()).unwrap_or(0);
            Ok(VNode::element(
                "div",
                None,
                vec![VNode::text(format!("count: {n}"))],
            ))
        },
    )
    .unwrap();
    (app, state)
}

#[test]
fn mutations_render_after_the_flush_not_before() {
    let host = MemHost::new();
    let (app, state) = counter_app(&host);
    let root = app.root().unwrap();
    assert_eq!(host.render_to_string(root), "<div>count: 0</div>");

    state.as_object().unwrap().set("n", Value::Int(2));
    // Batched: nothing happens until the microtask queue drains.
    assert_eq!(host.render_to_string(root), "<div>count: 0</div>");
    run_ticks();
    assert_eq!(host.render_to_string(root), "<div>count: 2</div>");
}

#[test]
fn many_mutations_one_render() {
    let host = MemHost::new();
    let renders = Rc::new(Cell::new(0u32));
    let renders2 = Rc::clone(&renders);
    let state = Value::object([("a", Value::Int(0)), ("b", Value::Int(0))]);
    let app = App::mount(
        patcher(&host),
        host.create_root(),
        state.clone(),
        move |ctx| {
            renders2.set(renders2.get() + 1);
            let o = ctx.as_object().ok_or_else(|| EvalError::msg("no state"))?;
            let sum = o.get("a").as_int().unwrap_or(0) + o.get("b").as_int().unwrap_or(0);
            Ok(VNode::element("div", None, vec![VNode::text(sum.to_string())]))
        },
    )
    .unwrap();
    assert_eq!(renders.get(), 1);

    let o = state.as_object().unwrap();
    o.set("a", Value::Int(1));
    o.set("b", Value::Int(2));
    o.set("a", Value::Int(3));
    run_ticks();
    assert_eq!(renders.get(), 2);
    assert_eq!(host.render_to_string(app.root().unwrap()), "<div>5</div>");
}

#[test]
fn keyed_list_updates_are_minimal() {
    let host = MemHost::new();
    let state = Value::object([(
        "items",
        Value::array([Value::str("a"), Value::str("b")]),
    )]);
    let app = App::mount(
        patcher(&host),
        host.create_root(),
        state.clone(),
        |ctx| {
            let items = ctx
                .as_object()
                .ok_or_else(|| EvalError::msg("no state"))?
                .get("items");
            let items = items
                .as_array()
                .ok_or_else(|| EvalError::msg("items missing"))?;
            let children = items
                .to_vec()
                .iter()
                .filter_map(|v| v.as_str().map(li))
                .collect();
            Ok(VNode::element("ul", None, children))
        },
    )
    .unwrap();
    let root = app.root().unwrap();
    assert_eq!(host.render_to_string(root), "<ul><li>a</li><li>b</li></ul>");

    host.reset_counters();
    state
        .as_object()
        .unwrap()
        .get_untracked("items")
        .as_array()
        .unwrap()
        .push(Value::str("c"));
    run_ticks();
    assert_eq!(
        host.render_to_string(root),
        "<ul><li>a</li><li>b</li><li>c</li></ul>"
    );
    let c = host.counters();
    assert_eq!(c.created_elements, 1);
    assert_eq!(c.removed, 0);
}

#[test]
fn watcher_render_and_updated_hook_order() {
    let host = MemHost::new();
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let state = Value::object([("n", Value::Int(0))]);
    observe(&state);

    let log_w = Rc::clone(&log);
    let _watch = Watcher::new(
        state.clone(),
        WatchSource::path("n"),
        Some(Box::new(move |_, _| log_w.borrow_mut().push("watch"))),
        WatcherOptions {
            user: true,
            ..Default::default()
        },
    )
    .unwrap();

    let log_r = Rc::clone(&log);
    let log_b = Rc::clone(&log);
    let log_u = Rc::clone(&log);
    let first = Cell::new(true);
    let app = App::mount_with(
        patcher(&host),
        host.create_root(),
        state.clone(),
        move |ctx| {
            let n = ctx.as_object().and_then(|o| o.get("n").as_int()).unwrap_or(0);
            if first.get() {
                first.set(false);
            } else {
                log_r.borrow_mut().push("render");
            }
            Ok(VNode::element("div", None, vec![VNode::text(n.to_string())]))
        },
        MountOptions {
            before_update: Some(Box::new(move || log_b.borrow_mut().push("before"))),
            updated: Some(Box::new(move || log_u.borrow_mut().push("updated"))),
            ..Default::default()
        },
    )
    .unwrap();

    state.as_object().unwrap().set("n", Value::Int(1));
    run_ticks();
    // Watchers flush in creation order, render last here; the updated
    // hook runs after the whole queue.
    assert_eq!(*log.borrow(), ["watch", "before", "render", "updated"]);
    assert_eq!(host.render_to_string(app.root().unwrap()), "<div>1</div>");
}

#[test]
fn computed_reads_subscribe_the_render() {
    let host = MemHost::new();
    let state = Value::object([("n", Value::Int(2))]);
    observe(&state);
    let state2 = state.clone();
    let squared = Rc::new(Computed::new(move |_| {
        let n = state2
            .as_object()
            .and_then(|o| o.get("n").as_int())
            .unwrap_or(0);
        Ok(Value::Int(n * n))
    }));

    let sq = Rc::clone(&squared);
    let app = App::mount(patcher(&host), host.create_root(), state.clone(), move |_| {
        let v = sq.get()?;
        Ok(VNode::element(
            "div",
            None,
            vec![VNode::text(v.as_int().unwrap_or(0).to_string())],
        ))
    })
    .unwrap();
    let root = app.root().unwrap();
    assert_eq!(host.render_to_string(root), "<div>4</div>");

    state.as_object().unwrap().set("n", Value::Int(3));
    run_ticks();
    assert_eq!(host.render_to_string(root), "<div>9</div>");
}

#[test]
fn mounted_root_refuses_new_keys() {
    let host = MemHost::new();
    let (app, state) = counter_app(&host);

    set_key(&state, "added", Value::Int(1));
    assert!(!state.as_object().unwrap().contains_key("added"));

    app.teardown();
    set_key(&state, "added", Value::Int(1));
    assert!(state.as_object().unwrap().contains_key("added"));
}

#[test]
fn teardown_stops_rendering() {
    let host = MemHost::new();
    let (app, state) = counter_app(&host);
    let root = app.root().unwrap();
    app.teardown();
    assert!(!app.is_mounted());

    state.as_object().unwrap().set("n", Value::Int(9));
    run_ticks();
    assert_eq!(host.render_to_string(root), "<div>count: 0</div>");
    // Second teardown is a no-op.
    app.teardown();
}

#[test]
fn force_update_rerenders_without_a_mutation() {
    let host = MemHost::new();
    let renders = Rc::new(Cell::new(0u32));
    let renders2 = Rc::clone(&renders);
    let state = Value::object([("n", Value::Int(0))]);
    let app = App::mount(patcher(&host), host.create_root(), state, move |_| {
        renders2.set(renders2.get() + 1);
        Ok(VNode::element("div", None, vec![]))
    })
    .unwrap();
    assert_eq!(renders.get(), 1);
    app.force_update();
    run_ticks();
    assert_eq!(renders.get(), 2);
}

#[test]
fn failed_rerender_keeps_the_previous_tree() {
    let host = MemHost::new();
    let state = Value::object([("n", Value::Int(0))]);
    let app = App::mount(
        patcher(&host),
        host.create_root(),
        state.clone(),
        |ctx| {
            let n = ctx.as_object().and_then(|o| o.get("n").as_int()).unwrap_or(0);
            if n < 0 {
                return Err(EvalError::msg("negative"));
            }
            Ok(VNode::element("div", None, vec![VNode::text(n.to_string())]))
        },
    )
    .unwrap();
    let root = app.root().unwrap();

    state.as_object().unwrap().set("n", Value::Int(-1));
    run_ticks();
    // The failed pass is reported and dropped; the old tree stands.
    assert_eq!(host.render_to_string(root), "<div>0</div>");

    state.as_object().unwrap().set("n", Value::Int(7));
    run_ticks();
    assert_eq!(host.render_to_string(root), "<div>7</div>");
}
