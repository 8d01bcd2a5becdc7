//! Single-writer observable cells.
//!
//! An `Observable<T>` holds one value plus a version counter and a list of
//! listeners. `set` replaces the value, bumps the version and notifies every
//! listener with the new value. Handles are cheap clones of the same cell, so
//! the writer and any number of readers can share it.
//!
//! Listeners run synchronously inside `set`, after the cell's borrow has been
//! released, so a listener may read (or even write) the cell it observes.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Listener<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    value: T,
    version: u64,
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

pub struct Observable<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: Clone + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                version: 0,
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Number of writes since construction.
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut inner = self.inner.borrow_mut();
            f(&mut inner.value);
            inner.version += 1;
        }
        self.notify();
    }

    /// Register `listener` for every future write. Dropping the returned
    /// `Subscription` unregisters it.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, Rc::new(listener)));
            id
        };

        let weak: Weak<RefCell<Inner<T>>> = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().listeners.retain(|(lid, _)| *lid != id);
                }
            })),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    fn notify(&self) {
        let (value, listeners) = {
            let inner = self.inner.borrow();
            let listeners: Vec<Listener<T>> =
                inner.listeners.iter().map(|(_, l)| Rc::clone(l)).collect();
            (inner.value.clone(), listeners)
        };
        for listener in listeners {
            listener(&value);
        }
    }
}

/// Guard returned by `Observable::subscribe`.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Keep the listener registered for the lifetime of the observable.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn set_bumps_version_and_notifies() {
        let cell = Observable::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = cell.subscribe(move |v| sink.borrow_mut().push(*v));

        cell.set(2);
        cell.update(|v| *v += 10);

        assert_eq!(cell.get(), 12);
        assert_eq!(cell.version(), 2);
        assert_eq!(*seen.borrow(), vec![2, 12]);
    }

    #[test]
    fn dropping_subscription_stops_notifications() {
        let cell = Observable::new(0);
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let sub = cell.subscribe(move |_| counter.set(counter.get() + 1));

        cell.set(1);
        drop(sub);
        cell.set(2);

        assert_eq!(hits.get(), 1);
        assert_eq!(cell.listener_count(), 0);
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let cell = Observable::new(0);
        cell.subscribe(|_| {}).detach();
        assert_eq!(cell.listener_count(), 1);
    }

    #[test]
    fn listener_may_read_the_cell_it_observes() {
        let cell = Observable::new(String::from("a"));
        let reader = cell.clone();
        let seen = Rc::new(RefCell::new(String::new()));
        let sink = Rc::clone(&seen);
        let _sub = cell.subscribe(move |_| *sink.borrow_mut() = reader.get());

        cell.set("b".to_string());
        assert_eq!(*seen.borrow(), "b");
    }
}
