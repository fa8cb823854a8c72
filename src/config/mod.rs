pub mod orchestrator;

pub use orchestrator::{
    CollaboratorConfig, Endpoints, OrchestratorConfig, TrendingConfig, DEFAULT_CONFIG_PATH,
    ENV_CONFIG_PATH,
};
