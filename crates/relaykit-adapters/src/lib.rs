//! Service plugins for RelayKit.
//!
//! Each module pairs a provider check with the tools of one external
//! service.  [`BUILTIN`] is the static table the CLI builds its registry
//! from.

pub mod brightdata;
pub mod comfyui;
pub mod confluence;
pub mod e2b;
pub mod gemini_image;
pub mod hackernews;
pub mod hap;
mod html;
pub mod jiandaoyun;
pub mod unstructured;

use std::sync::Arc;

use relaykit_core::{HttpSettings, PluginFactory, PluginRegistry};

pub use brightdata::BrightDataPlugin;
pub use comfyui::ComfyUiPlugin;
pub use confluence::ConfluencePlugin;
pub use e2b::E2bPlugin;
pub use gemini_image::GeminiImagePlugin;
pub use hackernews::HackerNewsPlugin;
pub use hap::HapPlugin;
pub use jiandaoyun::JiandaoyunPlugin;
pub use unstructured::UnstructuredPlugin;

/// Constructors for every bundled plugin.
pub static BUILTIN: &[PluginFactory] = &[
    |s| Arc::new(HapPlugin::new(s)),
    |s| Arc::new(JiandaoyunPlugin::new(s)),
    |s| Arc::new(HackerNewsPlugin::new(s)),
    |s| Arc::new(BrightDataPlugin::new(s)),
    |s| Arc::new(GeminiImagePlugin::new(s)),
    |s| Arc::new(UnstructuredPlugin::new(s)),
    |s| Arc::new(ComfyUiPlugin::new(s)),
    |s| Arc::new(E2bPlugin::new(s)),
    |s| Arc::new(ConfluencePlugin::new(s)),
];

/// Registry holding every bundled plugin.
pub fn builtin_registry(settings: &HttpSettings) -> PluginRegistry {
    PluginRegistry::from_table(BUILTIN, settings)
}
