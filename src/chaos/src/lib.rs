pub mod classify;
pub mod engine;
pub mod freq;
pub mod graph;
pub mod inject;
pub mod pathtree;
pub mod token;

// Re-export commonly used types
pub use classify::{ChunkCarry, Classification, SequenceClassifier};
pub use engine::ChaosEngine;
pub use freq::FrequencyTable;
pub use inject::{Decision, DelayCrashInjector, Strategy};
pub use pathtree::PathTree;
pub use token::TokenInterner;
