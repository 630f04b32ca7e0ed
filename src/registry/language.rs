// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Language-service registry.
//!
//! Each language maps to an ordered list of backend services; registration
//! order is precedence. Requests whose answers can be merged (code actions,
//! diagnostics) go to every service via [`merge_all`]; single-owner requests
//! (completion, hover) take the first non-empty answer via
//! [`first_non_empty`].
//!
//! The registry also remembers which service owns each open document, so a
//! document keeps talking to the backend it was first associated with even if
//! registrations change while it is open.

use anyhow::Result;
use lsp_types::Uri;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// A backend able to service requests for one or more languages.
pub trait LanguageService: Send + Sync {
    /// Short name used in logs (e.g. `"clangd"`).
    fn name(&self) -> &str;
}

/// Maps language IDs to ordered provider lists.
#[derive(Default)]
pub struct LanguageServiceRegistry {
    providers: RwLock<HashMap<String, Vec<Arc<dyn LanguageService>>>>,
    documents: RwLock<HashMap<Uri, Arc<dyn LanguageService>>>,
}

impl LanguageServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `provider` to the list of every language in `languages`.
    ///
    /// A provider that is already registered for a language (same instance)
    /// is left where it is and the duplicate is reported. Returns the number
    /// of languages the provider was newly added to.
    pub fn register<I, S>(&self, provider: &Arc<dyn LanguageService>, languages: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;

        for language in languages {
            let language = language.into();
            let list = providers.entry(language.clone()).or_default();
            if list.iter().any(|existing| Arc::ptr_eq(existing, provider)) {
                warn!(
                    "Provider {} is already registered for '{}'; ignoring duplicate",
                    provider.name(),
                    language
                );
                continue;
            }
            debug!(
                "Registered provider {} for '{}' at position {}",
                provider.name(),
                language,
                list.len()
            );
            list.push(provider.clone());
            added += 1;
        }

        added
    }

    /// Returns the providers for `language` in precedence order.
    #[must_use]
    pub fn providers_for(&self, language: &str) -> Vec<Arc<dyn LanguageService>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(language)
            .cloned()
            .unwrap_or_default()
    }

    /// Associates an opened document with the primary provider for its
    /// language and returns that provider.
    ///
    /// A document that is already associated keeps its existing owner.
    /// Returns `None` when no provider handles `language`.
    pub fn assign_document(
        &self,
        uri: &Uri,
        language: &str,
    ) -> Option<Arc<dyn LanguageService>> {
        if let Some(owner) = self.service_for_document(uri) {
            return Some(owner);
        }

        let Some(primary) = self.providers_for(language).into_iter().next() else {
            debug!("No provider for '{}' ({})", language, uri.as_str());
            return None;
        };

        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another caller may have won the race between the read above and here.
        let owner = documents.entry(uri.clone()).or_insert(primary);
        Some(owner.clone())
    }

    /// Returns the provider that owns `uri`, if the document is associated.
    #[must_use]
    pub fn service_for_document(&self, uri: &Uri) -> Option<Arc<dyn LanguageService>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }

    /// Forgets the owner of `uri` (document closed). Returns the old owner.
    pub fn release_document(&self, uri: &Uri) -> Option<Arc<dyn LanguageService>> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri)
    }
}

/// Queries providers in precedence order and returns the first non-empty answer.
///
/// Failing providers are logged and skipped. Returns an empty list if no
/// provider had anything to say.
pub async fn first_non_empty<T, F, Fut>(
    providers: &[Arc<dyn LanguageService>],
    mut query: F,
) -> Vec<T>
where
    F: FnMut(Arc<dyn LanguageService>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    for provider in providers {
        match query(provider.clone()).await {
            Ok(items) if !items.is_empty() => return items,
            Ok(_) => {}
            Err(e) => warn!("Provider {} failed: {e:#}", provider.name()),
        }
    }
    Vec::new()
}

/// Queries every provider and concatenates the answers in precedence order.
///
/// Failing providers are logged and contribute nothing.
pub async fn merge_all<T, F, Fut>(
    providers: &[Arc<dyn LanguageService>],
    mut query: F,
) -> Vec<T>
where
    F: FnMut(Arc<dyn LanguageService>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut merged = Vec::new();
    for provider in providers {
        match query(provider.clone()).await {
            Ok(items) => merged.extend(items),
            Err(e) => warn!("Provider {} failed: {e:#}", provider.name()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    struct NamedService(&'static str);

    impl LanguageService for NamedService {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn service(name: &'static str) -> Arc<dyn LanguageService> {
        Arc::new(NamedService(name))
    }

    fn names(providers: &[Arc<dyn LanguageService>]) -> Vec<&str> {
        providers.iter().map(|p| p.name()).collect()
    }

    fn uri(path: &str) -> Result<Uri> {
        format!("file://{path}")
            .parse()
            .map_err(|e| anyhow!("bad uri {path}: {e}"))
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let registry = LanguageServiceRegistry::new();
        let clangd = service("clangd");

        assert_eq!(registry.register(&clangd, ["c"]), 1);
        assert_eq!(registry.register(&clangd, ["c"]), 0);

        assert_eq!(names(&registry.providers_for("c")), vec!["clangd"]);
    }

    #[test]
    fn equal_names_are_distinct_providers() {
        let registry = LanguageServiceRegistry::new();
        registry.register(&service("clangd"), ["c"]);
        registry.register(&service("clangd"), ["c"]);

        assert_eq!(registry.providers_for("c").len(), 2);
    }

    #[test]
    fn registration_order_is_precedence() {
        let registry = LanguageServiceRegistry::new();
        let semantic = service("semantic");
        let syntactic = service("syntactic");

        registry.register(&semantic, ["swift", "objective-c"]);
        registry.register(&syntactic, ["swift"]);

        assert_eq!(
            names(&registry.providers_for("swift")),
            vec!["semantic", "syntactic"]
        );
        assert_eq!(names(&registry.providers_for("objective-c")), vec!["semantic"]);
        assert!(registry.providers_for("python").is_empty());
    }

    #[test]
    fn duplicate_in_one_call_only_counts_new_languages() {
        let registry = LanguageServiceRegistry::new();
        let clangd = service("clangd");
        registry.register(&clangd, ["c"]);

        assert_eq!(registry.register(&clangd, ["c", "cpp"]), 1);
        assert_eq!(names(&registry.providers_for("cpp")), vec!["clangd"]);
    }

    #[test]
    fn document_keeps_its_first_owner() -> Result<()> {
        let registry = LanguageServiceRegistry::new();
        registry.register(&service("first"), ["swift"]);
        let doc = uri("/work/main.swift")?;

        let owner = registry
            .assign_document(&doc, "swift")
            .context("expected an owner")?;
        assert_eq!(owner.name(), "first");

        // A new registration ahead of the document's owner does not move it
        let newcomer = service("second");
        registry.register(&newcomer, ["swift"]);
        let again = registry
            .assign_document(&doc, "swift")
            .context("expected an owner")?;
        assert!(Arc::ptr_eq(&owner, &again));

        let released = registry
            .release_document(&doc)
            .context("expected released owner")?;
        assert_eq!(released.name(), "first");
        assert!(registry.service_for_document(&doc).is_none());
        Ok(())
    }

    #[test]
    fn unhandled_language_has_no_owner() -> Result<()> {
        let registry = LanguageServiceRegistry::new();
        let doc = uri("/work/notes.txt")?;
        assert!(registry.assign_document(&doc, "plaintext").is_none());
        assert!(registry.service_for_document(&doc).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn first_non_empty_skips_empty_and_failing() {
        let providers = vec![
            service("broken"),
            service("empty"),
            service("answer"),
            service("late"),
        ];

        let result = first_non_empty(&providers, |p| async move {
            match p.name() {
                "broken" => Err(anyhow!("backend crashed")),
                "empty" => Ok(Vec::new()),
                name => Ok(vec![name.to_string()]),
            }
        })
        .await;

        assert_eq!(result, vec!["answer".to_string()]);
    }

    #[tokio::test]
    async fn merge_all_concatenates_in_order() {
        let providers = vec![service("a"), service("broken"), service("b")];

        let result = merge_all(&providers, |p| async move {
            match p.name() {
                "broken" => Err(anyhow!("backend crashed")),
                name => Ok(vec![format!("{name}-1"), format!("{name}-2")]),
            }
        })
        .await;

        assert_eq!(result, vec!["a-1", "a-2", "b-1", "b-2"]);
    }
}
