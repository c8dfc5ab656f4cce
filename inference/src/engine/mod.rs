pub mod backends;
pub mod knowledge;
pub mod normalizer;
pub mod orchestrator;
pub mod pool;
pub mod processors;
pub mod ranker;
pub mod registry;
