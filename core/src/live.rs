//! Live bindings: resource reads that re-run when their inputs change.
//!
//! A `LiveBinding<T>` is an explicit subscription. It owns a fetch function
//! from the current inputs to a result, subscribes to each input
//! `Observable`, and publishes every successful result into its own
//! single-writer `Observable<T>`, seeded with the parsed placeholder.
//!
//! Fetches run synchronously on the thread that changed the input, so
//! recomputations never overlap and publish in the order they were issued.
//! Each recomputation still takes a generation number and only publishes if
//! no later one has published first, which keeps the value monotonic if an
//! input listener changes another input mid-fetch.
//!
//! A failed recomputation (parse error, manual-action misuse, strict
//! `error` hook) leaves the published value untouched and is recorded in
//! `last_error`.

use std::cell::Cell;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::client::ResourceClient;
use crate::error::ApiError;
use crate::observable::{Observable, Subscription};
use crate::options::ClientOptions;
use crate::types::{Page, PrimaryKey};

type Fetch<T> = Rc<dyn Fn() -> Result<T, ApiError>>;

struct Recompute<T> {
    fetch: Fetch<T>,
    value: Observable<T>,
    last_error: Observable<Option<ApiError>>,
    issued: Cell<u64>,
    published: Cell<u64>,
}

impl<T: Clone + 'static> Recompute<T> {
    fn run(&self) {
        let generation = self.issued.get() + 1;
        self.issued.set(generation);

        match (self.fetch)() {
            Ok(value) if generation > self.published.get() => {
                self.published.set(generation);
                self.value.set(value);
                if self.last_error.with(Option::is_some) {
                    self.last_error.set(None);
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(generation, error = %e, "live binding recompute failed");
                self.last_error.set(Some(e));
            }
        }
    }
}

/// An observable value kept in sync with a resource read.
pub struct LiveBinding<T> {
    recompute: Rc<Recompute<T>>,
    subscriptions: Vec<Subscription>,
}

impl<T: Clone + 'static> LiveBinding<T> {
    /// A binding seeded with `seed` that has not fetched yet.
    pub fn new(seed: T, fetch: impl Fn() -> Result<T, ApiError> + 'static) -> Self {
        Self {
            recompute: Rc::new(Recompute {
                fetch: Rc::new(fetch),
                value: Observable::new(seed),
                last_error: Observable::new(None),
                issued: Cell::new(0),
                published: Cell::new(0),
            }),
            subscriptions: Vec::new(),
        }
    }

    /// Re-run the fetch whenever `input` changes.
    pub fn watch<I: Clone + 'static>(&mut self, input: &Observable<I>) {
        let recompute = Rc::clone(&self.recompute);
        self.subscriptions
            .push(input.subscribe(move |_| recompute.run()));
    }

    /// Fetch now and publish the result.
    pub fn refresh(&self) {
        self.recompute.run();
    }

    /// The published value. Subscribe to it to observe updates.
    pub fn value(&self) -> Observable<T> {
        self.recompute.value.clone()
    }

    pub fn get(&self) -> T {
        self.recompute.value.get()
    }

    pub fn last_error(&self) -> Option<ApiError> {
        self.recompute.last_error.get()
    }

    /// Number of fetches issued so far.
    pub fn generation(&self) -> u64 {
        self.recompute.issued.get()
    }
}

fn current<S: Clone + 'static, D: 'static>(
    options: &Option<Observable<ClientOptions<S, D>>>,
) -> Option<ClientOptions<S, D>> {
    options.as_ref().map(Observable::get)
}

impl<S, D> ResourceClient<S, D>
where
    S: Clone + Serialize + DeserializeOwned + 'static,
    D: Clone + DeserializeOwned + 'static,
{
    /// Live `list`, seeded with the parsed placeholder page.
    pub fn ref_list(
        &self,
        options: Option<&Observable<ClientOptions<S, D>>>,
    ) -> Result<LiveBinding<Page<D>>, ApiError> {
        let options = options.cloned();
        let seed = self
            .resolve("list", current(&options).as_ref())?
            .parsed_list_placeholder();

        let client = self.clone();
        let inputs = options.clone();
        let mut binding = LiveBinding::new(seed, move || client.list(current(&inputs).as_ref()));
        if let Some(options) = &options {
            binding.watch(options);
        }
        binding.refresh();
        Ok(binding)
    }

    /// Live `retrieve`, seeded with the parsed placeholder.
    pub fn ref_retrieve(
        &self,
        pk: &Observable<PrimaryKey>,
        options: Option<&Observable<ClientOptions<S, D>>>,
    ) -> Result<LiveBinding<D>, ApiError> {
        let options = options.cloned();
        let seed = self
            .resolve("retrieve", current(&options).as_ref())?
            .parsed_placeholder();

        let client = self.clone();
        let key = pk.clone();
        let inputs = options.clone();
        let mut binding = LiveBinding::new(seed, move || {
            client.retrieve(key.get(), current(&inputs).as_ref())
        });
        binding.watch(pk);
        if let Some(options) = &options {
            binding.watch(options);
        }
        binding.refresh();
        Ok(binding)
    }

    /// Live custom action; the action name and key are inputs too.
    pub fn ref_action(
        &self,
        name: &Observable<String>,
        pk: Option<&Observable<PrimaryKey>>,
        options: Option<&Observable<ClientOptions<S, D>>>,
    ) -> Result<LiveBinding<D>, ApiError> {
        let options = options.cloned();
        let seed = self
            .resolve(&name.get(), current(&options).as_ref())?
            .parsed_placeholder();

        let client = self.clone();
        let action = name.clone();
        let key = pk.cloned();
        let inputs = options.clone();
        let mut binding = LiveBinding::new(seed, move || {
            client.action(
                &action.get(),
                key.as_ref().map(Observable::get),
                current(&inputs).as_ref(),
            )
        });
        binding.watch(name);
        if let Some(pk) = pk {
            binding.watch(pk);
        }
        if let Some(options) = &options {
            binding.watch(options);
        }
        binding.refresh();
        Ok(binding)
    }
}
