//! The basic-block and function reordering transformation.

use crate::edit::{encode_edits, CodeLayoutEdit};
use crate::info::{ModuleInfo, ModuleInfoCache};
use crate::module::ModuleState;
use anyhow::Result;
use looptune_toolchain::{Measure, Toolchain};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Capability set a transformation kind exposes to the search driver.
///
/// Reordering is the one concrete kind implemented; new kinds plug in
/// without the driver changing.
pub trait Transform: Send {
    /// Derive a child with fresh random edits appended. The parent's edit
    /// sequence is always a prefix of the child's.
    fn mutate(&self, rng: &mut StdRng) -> Result<Self>
    where
        Self: Sized;

    /// Materialize the accumulated edits into a module artifact. Pure with
    /// respect to the base module.
    fn apply(&self) -> Result<ModuleState>;

    /// Fold the edit sequence into a newly materialized base module;
    /// afterwards `apply` is a no-op on the new base.
    fn update_module(&mut self) -> Result<()>;

    /// Measured cost of the transformed module, in seconds.
    fn evaluate(&self) -> Result<f64>;

    fn edit_count(&self) -> usize;
}

/// Probabilities steering mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MutationRates {
    /// Chance a mutation includes one function-level edit.
    pub p_funcs: f64,
    /// Per interior block: chance of swapping with its successor.
    pub p_swap: f64,
    /// Per interior block: chance of moving to a random other position.
    pub p_shuffle: f64,
}

impl Default for MutationRates {
    fn default() -> Self {
        Self {
            p_funcs: 0.8,
            p_swap: 0.2,
            p_shuffle: 0.01,
        }
    }
}

/// A reordering transformation: an edit log over a base module.
#[derive(Clone)]
pub struct Reordering {
    edits: Vec<CodeLayoutEdit>,
    module: ModuleState,
    toolchain: Arc<Toolchain>,
    cache: Arc<ModuleInfoCache>,
    measurer: Arc<dyn Measure>,
    rates: MutationRates,
}

impl Reordering {
    /// A transformation that does nothing, relative to `module`.
    pub fn new(
        module: ModuleState,
        toolchain: Arc<Toolchain>,
        cache: Arc<ModuleInfoCache>,
        measurer: Arc<dyn Measure>,
    ) -> Self {
        Self {
            edits: Vec::new(),
            module,
            toolchain,
            cache,
            measurer,
            rates: MutationRates::default(),
        }
    }

    pub fn with_rates(mut self, rates: MutationRates) -> Self {
        self.rates = rates;
        self
    }

    pub fn edits(&self) -> &[CodeLayoutEdit] {
        &self.edits
    }

    pub fn module(&self) -> &ModuleState {
        &self.module
    }

    fn random_edits(&self, rng: &mut StdRng) -> Result<Vec<CodeLayoutEdit>> {
        let info = self
            .cache
            .get_or_query(&self.toolchain, self.module.path())?;

        let mut edits = Vec::new();
        if rng.gen::<f64>() < self.rates.p_funcs {
            edits.extend(function_edit(&info, rng));
        }
        edits.extend(block_edits(&info, rng, self.rates));
        Ok(edits)
    }
}

/// One function-level swap or move between two distinct functions, kind
/// chosen uniformly. Needs at least two functions to say anything.
fn function_edit(info: &ModuleInfo, rng: &mut StdRng) -> Option<CodeLayoutEdit> {
    let functions = info.functions();
    if functions.len() < 2 {
        return None;
    }
    let first = rng.gen_range(0..functions.len());
    let second = loop {
        let candidate = rng.gen_range(0..functions.len());
        if candidate != first {
            break candidate;
        }
    };
    let a = functions[first].function.clone();
    let b = functions[second].function.clone();
    Some(if rng.gen::<bool>() {
        CodeLayoutEdit::SwapFunctions { a, b }
    } else {
        CodeLayoutEdit::MoveFunction { a, b }
    })
}

/// Block-level edits inside one weighted-chosen function: every interior
/// block independently gets a chance to swap with its successor and a
/// chance to move elsewhere.
fn block_edits(info: &ModuleInfo, rng: &mut StdRng, rates: MutationRates) -> Vec<CodeLayoutEdit> {
    let Some(chosen) = info.choose_weighted(rng) else {
        return Vec::new();
    };
    let function = chosen.function.clone();
    let blocks = chosen.block_count;

    let mut edits = Vec::new();
    for i in 1..blocks - 1 {
        if rng.gen::<f64>() < rates.p_swap {
            edits.push(CodeLayoutEdit::SwapBlocks {
                function: function.clone(),
                a: i,
                b: i + 1,
            });
        }
        if rng.gen::<f64>() < rates.p_shuffle {
            let to = loop {
                let candidate = rng.gen_range(1..blocks);
                if candidate != i {
                    break candidate;
                }
            };
            edits.push(CodeLayoutEdit::MoveBlock {
                function: function.clone(),
                from: i,
                to,
            });
        }
    }
    edits
}

impl Transform for Reordering {
    fn mutate(&self, rng: &mut StdRng) -> Result<Self> {
        let mut child = self.clone();
        child.edits.extend(self.random_edits(rng)?);
        Ok(child)
    }

    fn apply(&self) -> Result<ModuleState> {
        if self.edits.is_empty() {
            return Ok(self.module.clone());
        }
        let artifact = self
            .toolchain
            .reorder(self.module.path(), &encode_edits(&self.edits))?;
        Ok(ModuleState::temporary(artifact))
    }

    fn update_module(&mut self) -> Result<()> {
        let module = self.apply()?;
        // the previous scratch base is released when its last clone drops
        self.module = module;
        self.edits.clear();
        Ok(())
    }

    fn evaluate(&self) -> Result<f64> {
        let transformed = self.apply()?;
        self.measurer.measure(transformed.path())
    }

    fn edit_count(&self) -> usize {
        self.edits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looptune_toolchain::FunctionBlocks;
    use rand::SeedableRng;
    use std::path::Path;

    struct ConstMeasure(f64);

    impl Measure for ConstMeasure {
        fn measure(&self, _module: &Path) -> Result<f64> {
            Ok(self.0)
        }
    }

    fn blocks(function: &str, block_count: usize) -> FunctionBlocks {
        FunctionBlocks {
            function: function.to_string(),
            block_count,
        }
    }

    fn reordering(functions: Vec<FunctionBlocks>) -> Reordering {
        let cache = ModuleInfoCache::new();
        cache.insert("/m.bc", ModuleInfo::from_functions(functions));
        Reordering::new(
            ModuleState::external("/m.bc"),
            Arc::new(Toolchain::new("/nonexistent")),
            Arc::new(cache),
            Arc::new(ConstMeasure(1.0)),
        )
    }

    #[test]
    fn test_mutation_is_purely_additive() {
        let base = reordering(vec![blocks("f", 8), blocks("g", 6)]);
        let mut rng = StdRng::seed_from_u64(11);

        let mut current = base.mutate(&mut rng).unwrap();
        for _ in 0..20 {
            let child = current.mutate(&mut rng).unwrap();
            assert!(child.edit_count() >= current.edit_count());
            assert_eq!(
                &child.edits()[..current.edit_count()],
                current.edits(),
                "parent edits must stay a prefix of the child's"
            );
            current = child;
        }
    }

    #[test]
    fn test_forced_rates_touch_every_interior_block() {
        let base = reordering(vec![blocks("hot", 10)]).with_rates(MutationRates {
            p_funcs: 0.0,
            p_swap: 1.0,
            p_shuffle: 0.0,
        });
        let mut rng = StdRng::seed_from_u64(5);
        let child = base.mutate(&mut rng).unwrap();

        // one swap per interior block pair: blocks 1..=8 of 10
        assert_eq!(child.edit_count(), 8);
        for (offset, edit) in child.edits().iter().enumerate() {
            let i = offset + 1;
            assert_eq!(
                *edit,
                CodeLayoutEdit::SwapBlocks {
                    function: "hot".into(),
                    a: i,
                    b: i + 1,
                }
            );
        }
    }

    #[test]
    fn test_block_edits_never_touch_entry_block() {
        let base = reordering(vec![blocks("hot", 6)]).with_rates(MutationRates {
            p_funcs: 0.0,
            p_swap: 0.5,
            p_shuffle: 0.5,
        });
        let mut rng = StdRng::seed_from_u64(19);
        for _ in 0..50 {
            let child = base.mutate(&mut rng).unwrap();
            for edit in child.edits() {
                match edit {
                    CodeLayoutEdit::SwapBlocks { a, b, .. } => {
                        assert!(*a >= 1 && *b >= 1);
                    }
                    CodeLayoutEdit::MoveBlock { from, to, .. } => {
                        assert!(*from >= 1 && *to >= 1);
                        assert_ne!(from, to);
                    }
                    other => panic!("unexpected function edit {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_single_function_module_skips_function_edits() {
        let base = reordering(vec![blocks("only", 2)]).with_rates(MutationRates {
            p_funcs: 1.0,
            p_swap: 1.0,
            p_shuffle: 1.0,
        });
        let mut rng = StdRng::seed_from_u64(2);
        // one function and no reorderable blocks: mutation has nothing to say
        let child = base.mutate(&mut rng).unwrap();
        assert_eq!(child.edit_count(), 0);
    }

    #[test]
    fn test_empty_edit_log_applies_to_base_module() {
        let base = reordering(vec![blocks("f", 4)]);
        let applied = base.apply().unwrap();
        assert_eq!(applied.path(), Path::new("/m.bc"));
        assert!(!applied.is_temporary());
    }

    #[test]
    fn test_update_module_without_edits_keeps_the_base() {
        let mut base = reordering(vec![blocks("f", 4)]);
        base.update_module().unwrap();

        // folding an empty log is the identity: same base, still no edits,
        // and a subsequent apply is a no-op on it
        assert_eq!(base.module().path(), Path::new("/m.bc"));
        assert_eq!(base.edit_count(), 0);
        let applied = base.apply().unwrap();
        assert_eq!(applied.path(), Path::new("/m.bc"));
    }

    #[test]
    fn test_evaluate_uses_measurer() {
        let base = reordering(vec![blocks("f", 4)]);
        assert_eq!(base.evaluate().unwrap(), 1.0);
    }
}
