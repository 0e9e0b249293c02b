//! AceFlow feature modules.
//!
//! A common lifecycle ([`Module`]), the registry that wires modules together
//! ([`ModuleManager`]) and the three feature modules: core, collaboration
//! and intelligence.

#![warn(missing_docs)]

mod error;
mod params;
mod templates;

pub mod module;
pub mod manager;

pub mod core_module;
pub mod collaboration;
pub mod intelligence;

pub use error::{ModuleError, Result};
pub use module::{Module, ModuleBase, ModuleCallStats, ModuleConfig, ModuleMetadata, ModuleState};
pub use manager::{ModuleFactory, ModuleManager};

pub use core_module::{CoreModule, CoreModuleFactory, CORE_MODULE};
pub use collaboration::{
    parse_response, CollaborationModule, CollaborationModuleFactory, CollaborationRecord, CollaborationRequest,
    ParsedResponse, ResponseIntent, COLLABORATION_MODULE,
};
pub use intelligence::{
    IntelligenceModule, IntelligenceModuleFactory, IntentRecognizer, IntentResult, IntentType, INTELLIGENCE_MODULE,
};
