#![forbid(unsafe_code)]

//! Reactive conversion: containers, observers, and the imperative
//! add/remove helpers.
//!
//! [`RObject`] owns a map from field name to `(value, Dep)`; [`RArray`]
//! implements the seven mutating operations explicitly so insertion can
//! observe new elements and notify the array's dep. Non-mutating array
//! access is deliberately untracked: element reads cannot be intercepted,
//! so deep consumers must traverse ([`crate::traverse`]) to register
//! dependencies on contained observers.
//!
//! An [`Observer`] is attached at most once per container identity by
//! [`observe`]; re-observing returns the existing instance. Attachment is
//! refused while observation is toggled off or when the container carries
//! the skip flag.
//!
//! # Failure Modes
//!
//! Invalid mutations (writes to readonly state, runtime additions to root
//! state, sets on primitives) are refused with a developer warning; the
//! value is left unchanged and execution continues.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

use ahash::AHashMap;

use crate::dep::{Dep, current_target};
use crate::value::{Value, has_changed};

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Globally enable or disable observer attachment.
///
/// Used by hosts that must build values without tracking (e.g. evaluating
/// props in a non-reactive context).
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|c| c.set(enabled));
}

fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Per-container record that makes a value's fields trackable.
pub struct Observer {
    pub(crate) dep: Dep,
    vm_count: Cell<usize>,
    shallow: bool,
    mock: bool,
}

impl Observer {
    fn new(shallow: bool, mock: bool) -> Rc<Self> {
        Rc::new(Self {
            dep: if mock { Dep::mock() } else { Dep::new() },
            vm_count: Cell::new(0),
            shallow,
            mock,
        })
    }

    /// Container-level dep, notified on whole-value replace, add, delete,
    /// and array mutation.
    #[must_use]
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// Number of component roots using this container as root state.
    #[must_use]
    pub fn vm_count(&self) -> usize {
        self.vm_count.get()
    }

    pub fn inc_vm_count(&self) {
        self.vm_count.set(self.vm_count.get() + 1);
    }

    pub fn dec_vm_count(&self) {
        self.vm_count.set(self.vm_count.get().saturating_sub(1));
    }

    #[must_use]
    pub fn is_shallow(&self) -> bool {
        self.shallow
    }

    #[must_use]
    pub fn is_mock(&self) -> bool {
        self.mock
    }
}

struct Field {
    value: Value,
    dep: Dep,
}

struct ObjectInner {
    /// Insertion order, for deterministic iteration.
    keys: Vec<Rc<str>>,
    fields: AHashMap<Rc<str>, Field>,
    observer: Option<Rc<Observer>>,
    skip: bool,
    readonly: bool,
}

/// Reactive object container. Cloning clones the handle; identity is
/// shared.
#[derive(Clone)]
pub struct RObject {
    inner: Rc<RefCell<ObjectInner>>,
}

impl RObject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObjectInner {
                keys: Vec::new(),
                fields: AHashMap::new(),
                observer: None,
                skip: false,
                readonly: false,
            })),
        }
    }

    #[must_use]
    pub fn from_pairs<K: AsRef<str>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let obj = Self::new();
        for (k, v) in pairs {
            obj.define(k.as_ref(), v);
        }
        obj
    }

    #[must_use]
    pub fn ptr_eq(a: &RObject, b: &RObject) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().fields.contains_key(key)
    }

    /// Field names in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.inner.borrow().keys.clone()
    }

    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.borrow().observer.clone()
    }

    /// Opt this container out of observation.
    pub fn set_skip(&self, skip: bool) {
        self.inner.borrow_mut().skip = skip;
    }

    pub(crate) fn set_readonly(&self, readonly: bool) {
        self.inner.borrow_mut().readonly = readonly;
    }

    pub(crate) fn is_readonly(&self) -> bool {
        self.inner.borrow().readonly
    }

    /// Tracked field read.
    ///
    /// Registers the field's dep on the current collecting watcher, plus
    /// the child container's dep (and, for arrays, every contained
    /// observed element, since element access cannot be intercepted).
    /// Unwraps ref cells unless this container is shallow-observed.
    /// Missing fields read as `Null`.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        let (value, dep, shallow) = {
            let inner = self.inner.borrow();
            let Some(field) = inner.fields.get(key) else {
                return Value::Null;
            };
            let shallow = inner.observer.as_ref().is_some_and(|o| o.shallow);
            (field.value.clone(), field.dep.clone(), shallow)
        };
        if current_target().is_some() {
            dep.depend();
            if let Some(child) = observer_of(&value) {
                child.dep.depend();
                if let Value::Array(arr) = &value {
                    depend_array(arr);
                }
            }
        }
        match value {
            Value::Ref(r) if !shallow => r.get(),
            v => v,
        }
    }

    /// Untracked field read. Diagnostic/test use.
    #[must_use]
    pub fn get_untracked(&self, key: &str) -> Value {
        self.inner
            .borrow()
            .fields
            .get(key)
            .map(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }

    /// Reactive field write: no-op when unchanged, re-observes the new
    /// value, notifies the field's dep.
    ///
    /// Only declared fields can be written through the accessor; adding a
    /// key goes through [`set_key`].
    pub fn set(&self, key: &str, new_val: Value) {
        enum Outcome {
            Done,
            Forward(RefValue, Value),
            Store(Dep, Value, bool),
        }
        let outcome = {
            let mut inner = self.inner.borrow_mut();
            if inner.readonly {
                if cfg!(debug_assertions) {
                    tracing::warn!(target: "lumen::reactive", key, "set on readonly object refused");
                }
                Outcome::Done
            } else {
                let shallow = inner.observer.as_ref().is_some_and(|o| o.shallow);
                match inner.fields.get_mut(key) {
                    None => {
                        if cfg!(debug_assertions) {
                            tracing::warn!(
                                target: "lumen::reactive",
                                key,
                                "set on undeclared field refused; use set_key to add fields"
                            );
                        }
                        Outcome::Done
                    }
                    Some(field) => {
                        if !has_changed(&field.value, &new_val) {
                            Outcome::Done
                        } else if let Value::Ref(r) = &field.value
                            && !shallow
                            && !matches!(new_val, Value::Ref(_))
                        {
                            // Write through the ref cell instead of
                            // replacing it.
                            Outcome::Forward(r.clone(), new_val)
                        } else {
                            field.value = new_val.clone();
                            Outcome::Store(field.dep.clone(), new_val, shallow)
                        }
                    }
                }
            }
        };
        match outcome {
            Outcome::Done => {}
            Outcome::Forward(r, v) => r.set(v),
            Outcome::Store(dep, v, shallow) => {
                if !shallow {
                    let mock = self.observer().is_some_and(|o| o.mock);
                    observe_with(&v, false, mock);
                }
                dep.notify();
            }
        }
    }

    /// Install a field with its own dep. The primitive behind both initial
    /// conversion and [`set_key`]; does not notify.
    pub fn define(&self, key: &str, val: Value) {
        let observed = {
            let mut inner = self.inner.borrow_mut();
            let key: Rc<str> = Rc::from(key);
            if !inner.fields.contains_key(&key) {
                inner.keys.push(key.clone());
            }
            inner.fields.insert(
                key,
                Field {
                    value: val.clone(),
                    dep: Dep::new(),
                },
            );
            inner.observer.clone()
        };
        if let Some(ob) = observed
            && !ob.shallow
        {
            observe_with(&val, false, ob.mock);
        }
    }

    fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.fields.remove(key).is_some() {
            inner.keys.retain(|k| k.as_ref() != key);
            true
        } else {
            false
        }
    }

    fn ensure_observed(&self, shallow: bool, mock: bool) -> Option<Rc<Observer>> {
        if let Some(ob) = self.inner.borrow().observer.clone() {
            return Some(ob);
        }
        if !should_observe() || self.inner.borrow().skip {
            return None;
        }
        let ob = Observer::new(shallow, mock);
        self.inner.borrow_mut().observer = Some(ob.clone());
        if !shallow {
            let children: Vec<Value> = {
                let inner = self.inner.borrow();
                inner
                    .keys
                    .iter()
                    .filter_map(|k| inner.fields.get(k).map(|f| f.value.clone()))
                    .collect()
            };
            for child in children {
                observe_with(&child, false, mock);
            }
        }
        Some(ob)
    }
}

impl Default for RObject {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RObject")
            .field("keys", &self.keys())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

struct ArrayInner {
    items: Vec<Value>,
    observer: Option<Rc<Observer>>,
    skip: bool,
    readonly: bool,
}

/// Reactive array container.
///
/// The seven mutators (push, pop, shift, unshift, splice, sort, reverse)
/// observe inserted elements and notify the array observer's dep exactly
/// once per call. Reads are untracked by design.
#[derive(Clone)]
pub struct RArray {
    inner: Rc<RefCell<ArrayInner>>,
}

impl RArray {
    #[must_use]
    pub fn new() -> Self {
        Self::from_values([])
    }

    #[must_use]
    pub fn from_values(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ArrayInner {
                items: items.into_iter().collect(),
                observer: None,
                skip: false,
                readonly: false,
            })),
        }
    }

    #[must_use]
    pub fn ptr_eq(a: &RArray, b: &RArray) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    /// Untracked element read.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.borrow().items.get(index).cloned()
    }

    /// Untracked snapshot of the elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.borrow().items.clone()
    }

    #[must_use]
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.borrow().observer.clone()
    }

    pub fn set_skip(&self, skip: bool) {
        self.inner.borrow_mut().skip = skip;
    }

    pub(crate) fn set_readonly(&self, readonly: bool) {
        self.inner.borrow_mut().readonly = readonly;
    }

    pub(crate) fn is_readonly(&self) -> bool {
        self.inner.borrow().readonly
    }

    fn refuse_write(&self, op: &str) -> bool {
        if self.inner.borrow().readonly {
            if cfg!(debug_assertions) {
                tracing::warn!(target: "lumen::reactive", op, "mutation of readonly array refused");
            }
            true
        } else {
            false
        }
    }

    fn after_mutation(&self, inserted: &[Value]) {
        let ob = self.inner.borrow().observer.clone();
        if let Some(ob) = ob {
            for v in inserted {
                observe_with(v, false, ob.mock);
            }
            ob.dep.notify();
        }
    }

    pub fn push(&self, value: Value) {
        if self.refuse_write("push") {
            return;
        }
        self.inner.borrow_mut().items.push(value.clone());
        self.after_mutation(std::slice::from_ref(&value));
    }

    pub fn pop(&self) -> Option<Value> {
        if self.refuse_write("pop") {
            return None;
        }
        let popped = self.inner.borrow_mut().items.pop();
        self.after_mutation(&[]);
        popped
    }

    pub fn shift(&self) -> Option<Value> {
        if self.refuse_write("shift") {
            return None;
        }
        let shifted = {
            let mut inner = self.inner.borrow_mut();
            if inner.items.is_empty() {
                None
            } else {
                Some(inner.items.remove(0))
            }
        };
        self.after_mutation(&[]);
        shifted
    }

    pub fn unshift(&self, value: Value) {
        if self.refuse_write("unshift") {
            return;
        }
        self.inner.borrow_mut().items.insert(0, value.clone());
        self.after_mutation(std::slice::from_ref(&value));
    }

    /// Remove `delete_count` elements at `start` and insert `items` in
    /// their place; returns the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        if self.refuse_write("splice") {
            return Vec::new();
        }
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let len = inner.items.len();
            let start = start.min(len);
            let end = start + delete_count.min(len - start);
            let removed: Vec<Value> = inner.items.drain(start..end).collect();
            for (offset, item) in items.iter().cloned().enumerate() {
                inner.items.insert(start + offset, item);
            }
            removed
        };
        self.after_mutation(&items);
        removed
    }

    pub fn sort_by(&self, mut cmp: impl FnMut(&Value, &Value) -> Ordering) {
        if self.refuse_write("sort") {
            return;
        }
        self.inner.borrow_mut().items.sort_by(&mut cmp);
        self.after_mutation(&[]);
    }

    pub fn reverse(&self) {
        if self.refuse_write("reverse") {
            return;
        }
        self.inner.borrow_mut().items.reverse();
        self.after_mutation(&[]);
    }

    /// Index assignment, routed through splice so observation and
    /// notification follow the interception path.
    pub fn set_index(&self, index: usize, value: Value) {
        if self.refuse_write("set_index") {
            return;
        }
        {
            let mut inner = self.inner.borrow_mut();
            while inner.items.len() < index {
                inner.items.push(Value::Null);
            }
        }
        self.splice(index, 1, vec![value]);
    }

    fn ensure_observed(&self, shallow: bool, mock: bool) -> Option<Rc<Observer>> {
        if let Some(ob) = self.inner.borrow().observer.clone() {
            return Some(ob);
        }
        if !should_observe() || self.inner.borrow().skip {
            return None;
        }
        let ob = Observer::new(shallow, mock);
        self.inner.borrow_mut().observer = Some(ob.clone());
        if !shallow {
            for child in self.to_vec() {
                observe_with(&child, false, mock);
            }
        }
        Some(ob)
    }
}

impl Default for RArray {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RArray")
            .field("len", &self.len())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

struct RefInner {
    value: Value,
    dep: Dep,
    shallow: bool,
}

/// Single-value reference cell with its own dep.
#[derive(Clone)]
pub struct RefValue {
    inner: Rc<RefCell<RefInner>>,
}

impl RefValue {
    #[must_use]
    pub fn new(value: Value) -> Self {
        observe_with(&value, false, false);
        Self {
            inner: Rc::new(RefCell::new(RefInner {
                value,
                dep: Dep::new(),
                shallow: false,
            })),
        }
    }

    /// A ref whose inner value is not converted.
    #[must_use]
    pub fn shallow(value: Value) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RefInner {
                value,
                dep: Dep::new(),
                shallow: true,
            })),
        }
    }

    #[must_use]
    pub fn ptr_eq(a: &RefValue, b: &RefValue) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Tracked read.
    #[must_use]
    pub fn get(&self) -> Value {
        let (value, dep) = {
            let inner = self.inner.borrow();
            (inner.value.clone(), inner.dep.clone())
        };
        if current_target().is_some() {
            dep.depend();
            if let Some(ob) = observer_of(&value) {
                ob.dep.depend();
                if let Value::Array(arr) = &value {
                    depend_array(arr);
                }
            }
        }
        value
    }

    pub fn set(&self, value: Value) {
        let (dep, shallow) = {
            let mut inner = self.inner.borrow_mut();
            if !has_changed(&inner.value, &value) {
                return;
            }
            inner.value = value.clone();
            (inner.dep.clone(), inner.shallow)
        };
        if !shallow {
            observe_with(&value, false, false);
        }
        dep.notify();
    }
}

impl std::fmt::Debug for RefValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefValue")
            .field("value", &self.inner.borrow().value)
            .finish()
    }
}

/// Observer of a container value, if attached.
#[must_use]
pub fn observer_of(value: &Value) -> Option<Rc<Observer>> {
    match value {
        Value::Object(o) => o.observer(),
        Value::Array(a) => a.observer(),
        _ => None,
    }
}

/// Attach (or fetch) an observer for a container value, recursing into
/// children. Returns `None` for non-containers and refused attachments.
pub fn observe(value: &Value) -> Option<Rc<Observer>> {
    observe_with(value, false, false)
}

pub fn observe_with(value: &Value, shallow: bool, mock: bool) -> Option<Rc<Observer>> {
    match value {
        Value::Object(o) => o.ensure_observed(shallow, mock),
        Value::Array(a) => a.ensure_observed(shallow, mock),
        _ => None,
    }
}

/// Register deps on every observed element of an array, recursively.
/// Element access cannot be intercepted, so this runs on each tracked read
/// of an array-valued field.
pub(crate) fn depend_array(arr: &RArray) {
    let items = arr.to_vec();
    for v in items {
        if let Some(ob) = observer_of(&v) {
            ob.dep.depend();
        }
        if let Value::Array(nested) = &v {
            depend_array(nested);
        }
    }
}

fn is_readonly_value(value: &Value) -> bool {
    match value {
        Value::Object(o) => o.is_readonly(),
        Value::Array(a) => a.is_readonly(),
        _ => false,
    }
}

/// Mark a container tree readonly; every write path warns and refuses.
pub fn mark_readonly(value: &Value) {
    let mut seen: Vec<usize> = Vec::new();
    mark_readonly_inner(value, &mut seen);
}

fn mark_readonly_inner(value: &Value, seen: &mut Vec<usize>) {
    match value {
        Value::Object(o) => {
            let addr = Rc::as_ptr(&o.inner) as usize;
            if seen.contains(&addr) {
                return;
            }
            seen.push(addr);
            o.set_readonly(true);
            for key in o.keys() {
                mark_readonly_inner(&o.get_untracked(&key), seen);
            }
        }
        Value::Array(a) => {
            let addr = Rc::as_ptr(&a.inner) as usize;
            if seen.contains(&addr) {
                return;
            }
            seen.push(addr);
            a.set_readonly(true);
            for item in a.to_vec() {
                mark_readonly_inner(&item, seen);
            }
        }
        _ => {}
    }
}

/// Imperative property add (or array index set), with the same observation
/// and notification contract as an ordinary reactive assignment.
///
/// Refusals (warn, no-op): primitive targets, readonly targets, and
/// runtime additions to a container acting as a component's root state.
pub fn set_key(target: &Value, key: &str, val: Value) {
    if !target.is_container() {
        if cfg!(debug_assertions) {
            tracing::warn!(
                target: "lumen::reactive",
                key,
                "cannot set reactive property on a primitive or null value"
            );
        }
        return;
    }
    if is_readonly_value(target) {
        if cfg!(debug_assertions) {
            tracing::warn!(target: "lumen::reactive", key, "set on readonly target refused");
        }
        return;
    }
    match target {
        Value::Array(arr) => match key.parse::<usize>() {
            Ok(index) => arr.set_index(index, val),
            Err(_) => {
                if cfg!(debug_assertions) {
                    tracing::warn!(target: "lumen::reactive", key, "invalid array index");
                }
            }
        },
        Value::Object(obj) => {
            if obj.contains_key(key) {
                obj.set(key, val);
                return;
            }
            let ob = obj.observer();
            if ob.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                if cfg!(debug_assertions) {
                    tracing::warn!(
                        target: "lumen::reactive",
                        key,
                        "avoid adding reactive properties to root state at runtime; declare it upfront"
                    );
                }
                return;
            }
            match ob {
                None => {
                    // Unobserved target: plain add, no notification.
                    obj.define(key, val);
                }
                Some(ob) => {
                    obj.define(key, val);
                    ob.dep.notify();
                }
            }
        }
        _ => unreachable!("is_container checked above"),
    }
}

/// Imperative property delete (or array index removal), notifying the
/// container-level dep.
pub fn del_key(target: &Value, key: &str) {
    if !target.is_container() {
        if cfg!(debug_assertions) {
            tracing::warn!(
                target: "lumen::reactive",
                key,
                "cannot delete reactive property on a primitive or null value"
            );
        }
        return;
    }
    match target {
        Value::Array(arr) => {
            if let Ok(index) = key.parse::<usize>()
                && index < arr.len()
            {
                arr.splice(index, 1, Vec::new());
            }
        }
        Value::Object(obj) => {
            let ob = obj.observer();
            if ob.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                if cfg!(debug_assertions) {
                    tracing::warn!(
                        target: "lumen::reactive",
                        key,
                        "avoid deleting properties on root state; set the field to null instead"
                    );
                }
                return;
            }
            if obj.is_readonly() {
                if cfg!(debug_assertions) {
                    tracing::warn!(target: "lumen::reactive", key, "delete on readonly target refused");
                }
                return;
            }
            if obj.delete(key)
                && let Some(ob) = ob
            {
                ob.dep.notify();
            }
        }
        _ => unreachable!("is_container checked above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::watcher::{WatchSource, Watcher, WatcherOptions};
    use std::cell::Cell;

    fn counting_watcher(
        state: &Value,
        getter: impl FnMut(&Value) -> Result<Value, crate::error::EvalError> + 'static,
    ) -> (Watcher, Rc<Cell<u32>>) {
        let runs = Rc::new(Cell::new(0u32));
        let runs2 = Rc::clone(&runs);
        let w = Watcher::new(
            state.clone(),
            WatchSource::getter(getter),
            Some(Box::new(move |_, _| runs2.set(runs2.get() + 1))),
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        )
        .unwrap();
        (w, runs)
    }

    #[test]
    fn observe_is_idempotent_per_identity() {
        let v = Value::object([("a", Value::Int(1))]);
        let ob1 = observe(&v).unwrap();
        let ob2 = observe(&v).unwrap();
        assert!(Rc::ptr_eq(&ob1, &ob2));
    }

    #[test]
    fn observe_recurses_into_children() {
        let child = Value::object([("x", Value::Int(1))]);
        let v = Value::object([("child", child.clone())]);
        observe(&v).unwrap();
        assert!(observer_of(&child).is_some());
    }

    #[test]
    fn shallow_observe_does_not_recurse() {
        let child = Value::object([("x", Value::Int(1))]);
        let v = Value::object([("child", child.clone())]);
        observe_with(&v, true, false).unwrap();
        assert!(observer_of(&child).is_none());
    }

    #[test]
    fn toggle_observing_refuses_attachment() {
        toggle_observing(false);
        let v = Value::object([("a", Value::Int(1))]);
        assert!(observe(&v).is_none());
        toggle_observing(true);
        assert!(observe(&v).is_some());
    }

    #[test]
    fn skip_flag_refuses_attachment() {
        let obj = RObject::from_pairs([("a", Value::Int(1))]);
        obj.set_skip(true);
        assert!(observe(&Value::Object(obj)).is_none());
    }

    #[test]
    fn setter_noops_on_unchanged_value() {
        let state = Value::object([("n", Value::Int(1))]);
        observe(&state).unwrap();
        let s = state.clone();
        let (_w, runs) =
            counting_watcher(&state, move |ctx| Ok(ctx.as_object().unwrap().get("n")));
        let obj = s.as_object().unwrap();
        obj.set("n", Value::Int(1));
        assert_eq!(runs.get(), 0);
        obj.set("n", Value::Int(2));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn new_value_is_reobserved() {
        let state = Value::object([("child", Value::object([("x", Value::Int(1))]))]);
        observe(&state).unwrap();
        let replacement = Value::object([("x", Value::Int(2))]);
        state.as_object().unwrap().set("child", replacement.clone());
        assert!(observer_of(&replacement).is_some());
    }

    #[test]
    fn array_mutators_notify_once_and_observe_inserted() {
        let arr = RArray::from_values([Value::Int(1)]);
        let state = Value::object([("items", Value::Array(arr.clone()))]);
        observe(&state).unwrap();

        let s = state.clone();
        let (_w, runs) = counting_watcher(&state, move |_| {
            // Read the field so the array's container dep registers.
            Ok(s.as_object().unwrap().get("items"))
        });

        let inserted = Value::object([("x", Value::Int(9))]);
        arr.push(inserted.clone());
        assert_eq!(runs.get(), 1);
        assert!(observer_of(&inserted).is_some());

        arr.splice(0, 1, vec![Value::Int(7)]);
        assert_eq!(runs.get(), 2);

        arr.sort_by(|a, b| a.as_int().cmp(&b.as_int()));
        assert_eq!(runs.get(), 3);

        arr.reverse();
        assert_eq!(runs.get(), 4);

        arr.pop();
        assert_eq!(runs.get(), 5);
    }

    #[test]
    fn set_key_adds_and_notifies_container_dep() {
        let state = Value::object([("obj", Value::object([("a", Value::Int(1))]))]);
        observe(&state).unwrap();
        let s = state.clone();
        let (_w, runs) = counting_watcher(&state, move |_| {
            let obj = s.as_object().unwrap().get("obj");
            // Touch one key so both the field dep and child container dep
            // register.
            let _ = obj.as_object().unwrap().get("a");
            Ok(obj)
        });

        let obj = state.as_object().unwrap().get_untracked("obj");
        set_key(&obj, "b", Value::Int(2));
        assert_eq!(runs.get(), 1);
        assert_eq!(obj.as_object().unwrap().get_untracked("b").as_int(), Some(2));
    }

    #[test]
    fn set_key_rejects_root_state_addition() {
        let state = Value::object([("a", Value::Int(1))]);
        let ob = observe(&state).unwrap();
        ob.inc_vm_count();
        set_key(&state, "b", Value::Int(2));
        assert!(!state.as_object().unwrap().contains_key("b"));
    }

    #[test]
    fn set_key_rejects_primitive_target() {
        set_key(&Value::Int(1), "a", Value::Int(2));
        set_key(&Value::Null, "a", Value::Int(2));
    }

    #[test]
    fn set_key_array_index_goes_through_splice() {
        let arr = RArray::from_values([Value::Int(1), Value::Int(2)]);
        let v = Value::Array(arr.clone());
        observe(&v).unwrap();
        set_key(&v, "1", Value::Int(9));
        assert_eq!(arr.get(1).unwrap().as_int(), Some(9));
        // Out-of-range index extends.
        set_key(&v, "4", Value::Int(5));
        assert_eq!(arr.len(), 5);
        assert_eq!(arr.get(4).unwrap().as_int(), Some(5));
    }

    #[test]
    fn del_key_removes_and_notifies() {
        let obj = Value::object([("a", Value::Int(1)), ("b", Value::Int(2))]);
        observe(&obj).unwrap();
        del_key(&obj, "a");
        assert!(!obj.as_object().unwrap().contains_key("a"));
        // Deleting a missing key is a no-op.
        del_key(&obj, "zzz");
    }

    #[test]
    fn readonly_refuses_all_write_paths() {
        let state = Value::object([("a", Value::Int(1)), ("items", Value::array([Value::Int(1)]))]);
        observe(&state).unwrap();
        mark_readonly(&state);

        let obj = state.as_object().unwrap();
        obj.set("a", Value::Int(9));
        assert_eq!(obj.get_untracked("a").as_int(), Some(1));

        set_key(&state, "b", Value::Int(2));
        assert!(!obj.contains_key("b"));

        let items = obj.get_untracked("items");
        let arr = items.as_array().unwrap();
        arr.push(Value::Int(2));
        assert_eq!(arr.len(), 1);

        del_key(&state, "a");
        assert!(obj.contains_key("a"));
    }

    #[test]
    fn ref_cells_unwrap_transparently() {
        let cell = RefValue::new(Value::Int(5));
        let state = Value::object([("r", Value::Ref(cell.clone()))]);
        observe(&state).unwrap();
        // Read through the object accessor unwraps.
        assert_eq!(state.as_object().unwrap().get("r").as_int(), Some(5));
        // Write through the accessor forwards into the cell.
        state.as_object().unwrap().set("r", Value::Int(6));
        assert_eq!(cell.get().as_int(), Some(6));
        assert!(matches!(
            state.as_object().unwrap().get_untracked("r"),
            Value::Ref(_)
        ));
    }
}
