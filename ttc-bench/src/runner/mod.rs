//! Evaluation engine: generation, sampling strategies, fallback, and the run driver

pub mod driver;
pub mod fallback;
pub mod generate;
pub mod sampler;

pub use driver::{EvalError, Evaluator, RunOptions, RunOutcome};
pub use fallback::{run_with_fallback, FallbackOutcome};
pub use generate::{Generator, GeneratorConfig};
pub use sampler::{
    canonical_key, candidate_distance, score_candidate, select_best_of_n, select_majority,
    SampleOutcome, Sampler, Strategy,
};
