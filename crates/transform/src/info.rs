//! Per-module function layout metadata.

use looptune_toolchain::{FunctionBlocks, ToolError, Toolchain};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Function list and block-selection weights for one module.
///
/// A function with two or fewer blocks has no interior block pair to
/// reorder and gets weight zero; everything else is weighted by its block
/// count, so block mutation gravitates toward the functions with the most
/// layout freedom.
#[derive(Debug)]
pub struct ModuleInfo {
    functions: Vec<FunctionBlocks>,
    weights: Vec<usize>,
}

impl ModuleInfo {
    pub fn from_functions(functions: Vec<FunctionBlocks>) -> Self {
        let weights = functions
            .iter()
            .map(|f| if f.block_count <= 2 { 0 } else { f.block_count })
            .collect();
        Self { functions, weights }
    }

    pub fn functions(&self) -> &[FunctionBlocks] {
        &self.functions
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Pick a function by block-count weight, or `None` when no function
    /// has a reorderable block pair.
    pub fn choose_weighted(&self, rng: &mut impl Rng) -> Option<&FunctionBlocks> {
        let dist = WeightedIndex::new(&self.weights).ok()?;
        Some(&self.functions[dist.sample(rng)])
    }
}

/// Cache of module metadata keyed by module path.
///
/// Owned by the transformation model (or injected) rather than process
/// global, so concurrent searches over different modules cannot collide.
/// An entry is computed once and read-only afterwards; candidates of the
/// same module share it through the `Arc`.
#[derive(Debug, Default)]
pub struct ModuleInfoCache {
    inner: Mutex<HashMap<PathBuf, Arc<ModuleInfo>>>,
}

impl ModuleInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_query(
        &self,
        toolchain: &Toolchain,
        module: &Path,
    ) -> Result<Arc<ModuleInfo>, ToolError> {
        if let Some(info) = self.inner.lock().unwrap().get(module) {
            return Ok(Arc::clone(info));
        }

        let info = Arc::new(ModuleInfo::from_functions(
            toolchain.list_functions(module)?,
        ));
        let mut cache = self.inner.lock().unwrap();
        Ok(Arc::clone(
            cache.entry(module.to_path_buf()).or_insert(info),
        ))
    }

    /// Seed an entry directly, bypassing the toolchain query.
    pub fn insert(&self, module: impl Into<PathBuf>, info: ModuleInfo) {
        self.inner
            .lock()
            .unwrap()
            .insert(module.into(), Arc::new(info));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn blocks(function: &str, block_count: usize) -> FunctionBlocks {
        FunctionBlocks {
            function: function.to_string(),
            block_count,
        }
    }

    #[test]
    fn test_small_functions_are_never_chosen() {
        let info = ModuleInfo::from_functions(vec![
            blocks("tiny", 1),
            blocks("small", 2),
            blocks("big", 12),
        ]);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..64 {
            let chosen = info.choose_weighted(&mut rng).unwrap();
            assert_eq!(chosen.function, "big");
        }
    }

    #[test]
    fn test_no_reorderable_function() {
        let info = ModuleInfo::from_functions(vec![blocks("a", 2), blocks("b", 1)]);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(info.choose_weighted(&mut rng).is_none());
    }

    #[test]
    fn test_cache_insert_and_lookup() {
        let cache = ModuleInfoCache::new();
        cache.insert("/m.bc", ModuleInfo::from_functions(vec![blocks("f", 5)]));
        let toolchain = Toolchain::new("/nonexistent");
        let info = cache.get_or_query(&toolchain, Path::new("/m.bc")).unwrap();
        assert_eq!(info.len(), 1);
    }
}
