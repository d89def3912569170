//! Skills: catalog, manifests, templates and the handler contract

mod catalog;
pub mod handler;
pub mod manifest;
mod template;
mod types;

pub use catalog::Catalog;
pub use handler::{
    DEFAULT_HANDLER_TIMEOUT, EVENT_VERSION, EventIntent, EventRequest, EventSession, HandlerOutcome,
    OutputSpeech, ProcessHandler, RequestType, SkillEvent, SkillHandler, SkillOutput, SkillResponse,
    SlotValue, Slots,
};
pub use manifest::{IntentDef, IntentSchema, SkillManifest, SlotDef};
pub use template::{Template, Token};
pub use types::{Intent, Skill, SlotType};
