//! Settings pages: a titled form over one or more registered settings.
//!
//! A [`SettingsPage`] ties a [`Registry`] to the request-level concerns of an
//! admin screen: menu placement, form markup, submission handling with the
//! optional reset button, notices, and hooks fired after an update.

use std::fmt::{self, Debug};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{RuntimeError, SettingsError};
use crate::notice::Notice;
use crate::reader::get_setting;
use crate::registry::Registry;
use crate::render::{render_field, render_page};
use crate::schema::Schemas;
use crate::store::OptionStore;

/// Where the page appears in the admin menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    /// Slug of the parent menu. `None` places the page at the top level.
    pub parent: Option<String>,
    /// Menu label, defaults to the page title.
    pub title: Option<String>,
    pub capability: String,
    pub icon_url: Option<String>,
    pub position: Option<u32>,
}

impl Menu {
    /// A top-level menu entry.
    pub fn top_level() -> Self {
        Self {
            parent: None,
            ..Self::default()
        }
    }

    /// A submenu entry under `parent`.
    pub fn under(parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = capability.into();
        self
    }

    pub fn icon_url(mut self, icon_url: impl Into<String>) -> Self {
        self.icon_url = Some(icon_url.into());
        self
    }

    pub fn position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }
}

impl Default for Menu {
    fn default() -> Self {
        Self {
            parent: Some("themes.php".into()),
            title: None,
            capability: "manage_options".into(),
            icon_url: None,
            position: None,
        }
    }
}

/// A menu item the host should register for a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub parent: Option<String>,
    pub page_title: String,
    pub menu_title: String,
    pub capability: String,
    pub slug: String,
    pub icon_url: Option<String>,
    pub position: Option<u32>,
}

/// Labels of the form buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArgs {
    pub submit: String,
    /// `None` hides the reset button.
    pub reset: Option<String>,
}

impl Default for PageArgs {
    fn default() -> Self {
        Self {
            submit: "Save Settings".into(),
            reset: Some("Reset Settings".into()),
        }
    }
}

/// State handed to hooks after a page's settings were updated.
pub struct UpdateContext<'a> {
    pub page: &'a str,
    pub store: &'a dyn OptionStore,
    pub notices: &'a mut Vec<Notice>,
}

type HookCallback = Box<dyn Fn(&mut UpdateContext<'_>) -> Result<(), RuntimeError> + Send + Sync>;

/// Callbacks attached to a settings page.
pub enum Hook {
    /// Runs after a submission has been stored.
    SettingsUpdated(HookCallback),
}

impl Hook {
    pub fn settings_updated<F>(fun: F) -> Self
    where
        F: Fn(&mut UpdateContext<'_>) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        Hook::SettingsUpdated(Box::new(fun))
    }
}

impl Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::SettingsUpdated(_) => write!(f, "Hook::SettingsUpdated(*)"),
        }
    }
}

#[derive(Serialize)]
struct FieldView<'a> {
    id: String,
    label: Option<&'a str>,
    html: String,
}

#[derive(Serialize)]
struct SectionView<'a> {
    id: &'a str,
    title: Option<&'a str>,
    description: Option<&'a str>,
    fields: Vec<FieldView<'a>>,
}

#[derive(Serialize)]
struct PageView<'a> {
    action: &'a str,
    title: &'a str,
    notices: &'a [Notice],
    sections: Vec<SectionView<'a>>,
    marker: String,
    empty: bool,
    submit: &'a str,
    reset: Option<&'a str>,
    reset_key: String,
}

/// An admin form over a set of settings.
#[derive(Debug)]
pub struct SettingsPage {
    title: String,
    menu: Option<Menu>,
    args: PageArgs,
    registry: Registry,
    hooks: Vec<Hook>,
    notices: Vec<Notice>,
}

impl SettingsPage {
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            title: "Custom Settings".into(),
            menu: Some(Menu::default()),
            args: PageArgs::default(),
            registry: Registry::new(page),
            hooks: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the menu placement, `None` keeps the page out of the menu.
    pub fn menu(mut self, menu: Option<Menu>) -> Self {
        self.menu = menu;
        self
    }

    pub fn submit_label(mut self, label: impl Into<String>) -> Self {
        self.args.submit = label.into();
        self
    }

    /// Sets the reset button label, `None` hides the button.
    pub fn reset_label(mut self, label: Option<impl Into<String>>) -> Self {
        self.args.reset = label.map(Into::into);
        self
    }

    pub fn add_hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Registers the page's settings, writing defaults of new ones to `store`.
    pub fn register(
        mut self,
        store: &mut dyn OptionStore,
        schemas: Schemas,
    ) -> Result<Self, SettingsError> {
        self.registry.register(store, schemas)?;
        Ok(self)
    }

    pub fn id(&self) -> &str {
        self.registry.page()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn args(&self) -> &PageArgs {
        &self.args
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Removes and returns the pending notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// The menu items to register for this page.
    ///
    /// A top-level page whose menu label differs from its title also gets a
    /// first submenu item carrying the full title.
    pub fn menu_entries(&self) -> Vec<MenuEntry> {
        let Some(menu) = &self.menu else {
            return Vec::new();
        };

        let slug = self.id().to_string();
        let menu_title = menu.title.clone().unwrap_or_else(|| self.title.clone());

        let mut entries = vec![MenuEntry {
            parent: menu.parent.clone(),
            page_title: self.title.clone(),
            menu_title: menu_title.clone(),
            capability: menu.capability.clone(),
            slug: slug.clone(),
            icon_url: menu.icon_url.clone(),
            position: menu.position,
        }];

        if menu.parent.is_none() && menu_title != self.title {
            entries.push(MenuEntry {
                parent: Some(slug.clone()),
                page_title: self.title.clone(),
                menu_title: self.title.clone(),
                capability: menu.capability.clone(),
                slug,
                icon_url: None,
                position: None,
            });
        }

        entries
    }

    /// Renders the whole form with the values currently stored.
    pub fn render(&self, store: &dyn OptionStore) -> Result<String, SettingsError> {
        let mut sections = Vec::new();

        for schema in self.registry.schemas() {
            let values = match get_setting(store, &schema.id)? {
                Some(Value::Object(values)) => values,
                _ => Map::new(),
            };

            let mut fields = Vec::new();
            for (name, field) in &schema.fields {
                let id = format!("{}_{}", schema.id, name);
                let input = format!("{}[{}]", schema.id, name);
                let value = values.get(name).unwrap_or(&Value::Null);

                fields.push(FieldView {
                    html: render_field(&id, &input, field, value)?,
                    label: field.label.as_deref(),
                    id,
                });
            }

            sections.push(SectionView {
                id: &schema.id,
                title: schema.title.as_deref(),
                description: schema.description.as_deref(),
                fields,
            });
        }

        // the general options screen prints notices on its own
        let notices: &[Notice] = match &self.menu {
            Some(Menu { parent: Some(parent), .. }) if parent == "options-general.php" => &[],
            _ => &self.notices,
        };

        let html = render_page(PageView {
            action: "options.php",
            title: &self.title,
            notices,
            sections,
            marker: self.registry.marker_key(),
            empty: self.registry.is_empty(),
            submit: &self.args.submit,
            reset: self.args.reset.as_deref(),
            reset_key: self.registry.reset_key(),
        })?;

        Ok(html)
    }

    /// Handles a form submission.
    ///
    /// `post` holds one entry per submitted setting, keyed by setting id,
    /// plus the reset button when it was pressed. With the reset button,
    /// every submitted setting is replaced by its defaults before going
    /// through the sanitizers. Each sanitized bundle replaces the stored
    /// one, then the update hooks run.
    pub fn submit(
        &mut self,
        store: &mut dyn OptionStore,
        post: &Map<String, Value>,
    ) -> Result<Vec<Notice>, SettingsError> {
        let reset = post.contains_key(&self.registry.reset_key());
        let marker = self.registry.marker_key();
        let mut notices = Vec::new();
        let mut updated = 0;

        for schema in self.registry.schemas() {
            let Some(entry) = post.get(&schema.id) else {
                continue;
            };

            let value = match entry {
                Value::Object(_) if reset => {
                    let mut values = self.registry.defaults(&schema.id);
                    values.insert(marker.clone(), Value::from(schema.id.as_str()));
                    Value::Object(self.registry.sanitize(&values))
                }
                Value::Object(raw) => Value::Object(self.registry.sanitize(raw)),
                other => {
                    tracing::warn!("setting {} submitted as a scalar, storing it as is", schema.id);
                    other.clone()
                }
            };

            store.set(&schema.id, value)?;
            updated += 1;
        }

        if updated == 0 {
            return Ok(notices);
        }

        tracing::info!("page {} updated {} settings", self.id(), updated);

        if reset {
            notices.push(Notice::updated(
                self.id(),
                "settings_reset",
                "Default settings have been reset.",
            ));
        } else {
            notices.push(Notice::updated(self.id(), "settings_updated", "Settings saved."));
        }

        let mut ctx = UpdateContext {
            page: self.registry.page(),
            store,
            notices: &mut notices,
        };

        for hook in &self.hooks {
            match hook {
                Hook::SettingsUpdated(callback) => {
                    if let Err(err) = callback(&mut ctx) {
                        tracing::error!("settings hook of page {} failed: {:#}", ctx.page, err);
                        ctx.notices.push(
                            Notice::error(ctx.page, "hook_failed", "An update hook failed.")
                                .with_detail(format!("{err:#}")),
                        );
                    }
                }
            }
        }

        self.notices.extend(notices.iter().cloned());

        Ok(notices)
    }

    /// Runs the action of an `action` field, named `{setting}_{field}`.
    pub fn invoke_action(&self, name: &str) -> anyhow::Result<()> {
        self.registry.invoke(name)
    }
}
