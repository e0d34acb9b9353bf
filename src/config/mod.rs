pub mod evolution;
pub mod manager;
pub mod search;
pub mod traits;

pub use evolution::{EliminationPolicy, EvolutionConfig};
pub use manager::{load_config, AppConfig, ConfigManager, ENV_PREFIX};
pub use search::{validate_budget, SearchConfig, MAX_TIME_SECONDS};
pub use traits::ConfigSection;
