/*
Copyright 2024 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Ordered fallback chains: named strategies tried in sequence, first success wins

use log::debug;
use std::future::Future;
use std::pin::Pin;

type StrategyFuture<'a, T> = Pin<Box<dyn Future<Output = Option<T>> + Send + 'a>>;
type Strategy<'a, T> = Box<dyn FnOnce() -> StrategyFuture<'a, T> + Send + 'a>;

/// Value produced by a chain together with the strategy that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: &'static str,
}

/// A priority-ordered list of lazily evaluated strategies for one field
///
/// A strategy returns `None` to hand over to the next one. Strategies after
/// the first success are never started.
pub struct FallbackChain<'a, T> {
    field: &'static str,
    strategies: Vec<(&'static str, Strategy<'a, T>)>,
}

impl<'a, T: Send + 'a> FallbackChain<'a, T> {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            strategies: Vec::new(),
        }
    }

    /// Append a strategy at the lowest priority so far
    pub fn then<F, Fut>(mut self, name: &'static str, strategy: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Option<T>> + Send + 'a,
    {
        self.strategies
            .push((name, Box::new(move || Box::pin(strategy()))));
        self
    }

    /// Strategy names in priority order
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|(name, _)| *name).collect()
    }

    pub async fn resolve(self) -> Option<Resolved<T>> {
        for (name, strategy) in self.strategies {
            if let Some(value) = strategy().await {
                debug!("{} resolved by {}", self.field, name);
                return Some(Resolved {
                    value,
                    source: name,
                });
            }
        }
        debug!("{} exhausted every strategy", self.field);
        None
    }

    /// Resolve, falling back to `default` when every strategy declines
    pub async fn resolve_or(self, default: T) -> T {
        self.resolve()
            .await
            .map(|resolved| resolved.value)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_first_success_wins() {
        let chain = FallbackChain::new("capacity")
            .then("smartctl", || async { None })
            .then("sysfs", || async { Some("2 TiB".to_string()) })
            .then("never", || async { Some("wrong".to_string()) });

        assert_eq!(chain.names(), vec!["smartctl", "sysfs", "never"]);
        let resolved = chain.resolve().await.unwrap();
        assert_eq!(resolved.value, "2 TiB");
        assert_eq!(resolved.source, "sysfs");
    }

    #[tokio::test]
    async fn test_later_strategies_do_not_run() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let value = FallbackChain::new("model")
            .then("first", || async { Some(1) })
            .then("second", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(2)
            })
            .resolve_or(0)
            .await;

        assert_eq!(value, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_uses_default() {
        let chain: FallbackChain<'_, String> = FallbackChain::new("rotation");
        assert!(chain.resolve().await.is_none());

        let value = FallbackChain::new("rotation")
            .then("none", || async { None })
            .resolve_or("unknown".to_string())
            .await;
        assert_eq!(value, "unknown");
    }
}
