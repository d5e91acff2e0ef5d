#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

#[cfg(feature = "grass")]
mod core;
mod error;
mod notice;
mod page;
mod reader;
mod registry;
mod render;
mod sanitize;
mod schema;
mod store;
#[cfg(feature = "grass")]
pub mod styles;
mod utils;

pub use crate::error::*;
pub use crate::notice::{Notice, NoticeKind};
pub use crate::page::{Hook, Menu, MenuEntry, PageArgs, SettingsPage, UpdateContext};
pub use crate::reader::{get_field, get_setting, parse_multi};
pub use crate::registry::{Action, Registry};
pub use crate::render::{Widget, render_field};
pub use crate::sanitize::{
    Sanitize, absint, floatval, intval, is_truthy, sanitize_email, sanitize_field, sanitize_key,
    sanitize_multi, sanitize_text, sanitize_textarea, sanitize_url,
};
pub use crate::schema::{FieldSpec, FieldType, Schemas, Section, SettingSchema};
pub use crate::store::{FileStore, MemoryStore, OptionStore};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
