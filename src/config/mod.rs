//! Configuration loading and validation.
//!
//! Settings are layered: compiled defaults, then `config/default.toml`, then
//! an environment-specific file, then `OBSERVER_`-prefixed environment
//! variables. A [`SyncPreset`] can override the observer tuning block as a
//! bundle.

mod settings;

pub use settings::{
    CasSettings, ContractSettings, LoggingSettings, MetricsSettings, ObserverSettings,
    PaginationSettings, RpcSettings, Settings, SyncPreset,
};
