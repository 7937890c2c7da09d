//! Running many recipes at once
//!
//! Recipes are independent, so a batch fans out over a rayon pool. Each
//! recipe keeps its own outcome; one failure does not cancel the others.

use rayon::prelude::*;
use tracing::{error, info};

use landsight_core::{Error, Result};

use crate::recipe::Recipe;
use crate::runner::{Pipeline, RunReport};

/// How a batch of recipes is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// One recipe after another
    Sequential,
    /// All available cores
    #[default]
    Parallel,
    /// A dedicated pool of this many threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// `0` means all cores, `1` sequential
    pub fn from_jobs(jobs: usize) -> Self {
        match jobs {
            0 => ProcessingMode::Parallel,
            1 => ProcessingMode::Sequential,
            n => ProcessingMode::ParallelWith(n),
        }
    }

    /// Map `f` over `items`, keeping input order
    pub fn map<I, T, F>(&self, items: &[I], f: F) -> Result<Vec<T>>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => Ok(items.iter().map(f).collect()),
            ProcessingMode::Parallel => Ok(items.par_iter().map(f).collect()),
            ProcessingMode::ParallelWith(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(*threads)
                    .build()
                    .map_err(|e| Error::Other(format!("cannot build thread pool: {}", e)))?;
                Ok(pool.install(|| items.par_iter().map(f).collect()))
            }
        }
    }
}

/// Outcome of one recipe in a batch
#[derive(Debug)]
pub struct RecipeOutcome {
    pub recipe: String,
    pub result: Result<RunReport>,
}

impl RecipeOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Build a pipeline per recipe with `make` and run them all under `mode`
pub fn run_many<F>(recipes: &[Recipe], mode: ProcessingMode, make: F) -> Result<Vec<RecipeOutcome>>
where
    F: Fn(&Recipe) -> Result<Pipeline> + Sync + Send,
{
    info!("running {} recipe(s) {:?}", recipes.len(), mode);
    mode.map(recipes, |recipe| {
        let result = make(recipe).and_then(|pipeline| pipeline.run(recipe));
        if let Err(e) = &result {
            error!("recipe {} failed: {}", recipe.name, e);
        }
        RecipeOutcome {
            recipe: recipe.name.clone(),
            result,
        }
    })
}
