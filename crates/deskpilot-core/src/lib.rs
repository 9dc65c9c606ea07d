pub mod controller;
pub mod run_state;
pub mod runner;
pub mod settings;

pub use controller::{RunController, StartError};
pub use run_state::{RunState, RunStatePatch, RunStateStore, RunTicket};
pub use runner::{AgentRunner, DryRunRunner, RunContext};
pub use settings::{
    load_server_config, store_server_config, MemorySettings, SettingsError, SettingsProvider,
    YamlSettingsStore,
};
