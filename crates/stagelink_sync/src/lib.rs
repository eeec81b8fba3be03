//! stagelink sync - mirrors a stage into an engine scene.
//!
//! This crate provides:
//!
//! - **Translators**: `SchemaTranslator` implementations per prim type,
//!   dispatched by a `TranslatorRegistry`
//! - **Task chains**: deferred asset builds with main-thread and worker steps
//! - **Twin tree**: the engine-side proxy of every translated prim
//! - **Change reconciliation**: incremental updates from stage notices
//! - **Asset cache**: content-hashed, deduplicated mesh assets
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stagelink_sync::{StageActor, SyncSettings, TranslatorRegistry};
//!
//! let stage = stagelink_core::load_usda("scene.usda")?;
//! let registry = Arc::new(TranslatorRegistry::with_defaults(stage.schemas().clone()));
//! let mut actor = StageActor::new(stage, SyncSettings::default(), registry)?;
//! actor.load()?;
//! println!("{} components", actor.world().component_count());
//! ```

pub mod asset;
pub mod context;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod settings;
pub mod stage_actor;
pub mod task_chain;
pub mod translator;
pub mod translators;
pub mod twin;
pub mod world;

// Re-export commonly used types
pub use asset::{
    Asset, AssetCache, AssetHash, AssetSnapshot, AssetStore, MaterialAssignment, MaterialSlot,
};
pub use context::{SyncState, TranslationContext};
pub use engine::{SyncEngine, SyncSnapshot};
pub use error::{ErrorLog, SyncError, SyncResult};
pub use reconcile::{ChangeReconciler, PrimChange, ReconcileReport};
pub use registry::{TranslatorHandle, TranslatorRegistry};
pub use settings::SyncSettings;
pub use stage_actor::{StageActor, StageEvent};
pub use task_chain::{build_worker_pool, ChainSet, Handoff, TaskChain, TaskStatus};
pub use translator::{CollapsingAxis, FallbackTranslator, SchemaTranslator};
pub use twin::{TwinNode, TwinTree};
pub use world::{
    Actor, ActorId, CameraSettings, Component, ComponentId, ComponentKind, LightSettings,
    LightType, SceneWorld,
};
