pub mod traits;
pub mod evolution;
pub mod runtime;
pub mod manager;

pub use manager::{ConfigManager, AppConfig};
pub use evolution::{
    MutationIntensity, MutationKind, RunConfig, SelectionKind, VariationKind, PER_GENE_RATE,
};
pub use runtime::{CheckpointConfig, ExecutorConfig, PersistenceConfig, RuntimeConfig};
pub use traits::ConfigSection;
