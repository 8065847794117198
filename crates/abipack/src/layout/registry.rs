// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared, build-once layout cache.

use super::StructLayout;
use crate::error::AbiResult;
use dashmap::DashMap;
use std::sync::Arc;

/// Named layouts, each built at most once and shared by `Arc`.
#[derive(Debug, Default)]
pub struct LayoutRegistry {
    layouts: DashMap<String, Arc<StructLayout>>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<StructLayout>> {
        self.layouts.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Register a layout under its own name, replacing any previous one.
    pub fn insert(&self, layout: StructLayout) -> Arc<StructLayout> {
        let layout = Arc::new(layout);
        self.layouts
            .insert(layout.name().to_string(), Arc::clone(&layout));
        layout
    }

    /// Return the cached layout, building it on first use.
    ///
    /// A failed build is not cached.
    pub fn get_or_build(
        &self,
        name: &str,
        build: impl FnOnce() -> AbiResult<StructLayout>,
    ) -> AbiResult<Arc<StructLayout>> {
        if let Some(layout) = self.get(name) {
            return Ok(layout);
        }
        let built = Arc::new(build()?);
        let entry = self.layouts.entry(name.to_string()).or_insert(built);
        Ok(Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.layouts.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
