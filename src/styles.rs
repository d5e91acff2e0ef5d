//! Stylesheet compiler driven by settings pages.
//!
//! [`StyleCompiler`] exposes two pages: a "Compiler" page holding the
//! stylesheet source to compile, and a "Variables" page listing every variable
//! found in the theme's variables file. Submitting either page recompiles the
//! stylesheet with the [`grass`] compiler and writes the CSS next to the theme.
//!
//! Variable values from the settings are declared both before and after the
//! imports. A variables file declaring its values with `!default` picks them
//! up, and the compiler source always sees the edited values.

pub mod variables;

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde_json::Value;

use crate::core::Hash32;
use crate::error::StyleError;
use crate::notice::Notice;
use crate::page::{Hook, Menu, SettingsPage};
use crate::sanitize::to_text;
use crate::schema::{FieldSpec, Schemas, Section};
use crate::store::OptionStore;

pub use variables::{Variable, read_variables, scan_variables};

/// Identifier of the compiler page and of the setting holding the source.
pub const COMPILER_PAGE: &str = "styles";
/// Identifier of the variables page.
pub const VARIABLES_PAGE: &str = "style_variables";
/// Identifier of the setting holding variable values.
pub const VARIABLES_SETTING: &str = "style_vars";

/// Outcome of a successful [`StyleCompiler::compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    /// Where the CSS was written.
    pub path: Utf8PathBuf,
    /// The input was unchanged since the last run and nothing was written.
    pub skipped: bool,
}

/// Configuration and state of the stylesheet compiler.
#[derive(Debug)]
pub struct StyleCompiler {
    stylesheet_dir: Utf8PathBuf,
    template_dir: Utf8PathBuf,
    source: Option<Utf8PathBuf>,
    output: String,
    imports: Vec<String>,
    variables: IndexMap<String, String>,
    last: Mutex<Option<Fingerprint>>,
}

/// The input of a successful compile: the assembled source and the content
/// of every file the compiler read while resolving imports.
#[derive(Debug)]
struct Fingerprint {
    source: Hash32,
    files: Vec<(PathBuf, Hash32)>,
}

impl Fingerprint {
    fn is_current(&self, source: Hash32) -> bool {
        self.source == source
            && self.files.iter().all(|(path, hash)| {
                fs::read(path).is_ok_and(|bytes| Hash32::hash(bytes) == *hash)
            })
    }
}

/// File system handed to the compiler, remembering the files it reads.
#[derive(Debug, Default)]
struct RecordingFs {
    loaded: Mutex<Vec<(PathBuf, Hash32)>>,
}

impl RecordingFs {
    fn into_loaded(self) -> Vec<(PathBuf, Hash32)> {
        self.loaded.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl grass::Fs for RecordingFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let bytes = fs::read(path)?;

        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((path.to_path_buf(), Hash32::hash(&bytes)));

        Ok(bytes)
    }
}

/// Reads a field of a stored bundle as is, without decoding JSON strings.
fn stored_text(store: &dyn OptionStore, id: &str, name: &str) -> Result<String, StyleError> {
    let value = match store.get(id)? {
        Some(Value::Object(mut bundle)) => bundle.remove(name),
        _ => None,
    };

    Ok(value.map(|value| to_text(&value)).unwrap_or_default())
}

impl StyleCompiler {
    /// Creates a compiler for a theme.
    ///
    /// Imports are resolved against `stylesheet_dir` first, then against
    /// `template_dir`. By default variables are read from
    /// `{template_dir}/styles/variables.scss` and the CSS is written to
    /// `{stylesheet_dir}/css/settei-styles.css`.
    pub fn new(stylesheet_dir: impl Into<Utf8PathBuf>, template_dir: impl Into<Utf8PathBuf>) -> Self {
        let template_dir = template_dir.into();

        Self {
            stylesheet_dir: stylesheet_dir.into(),
            source: Some(template_dir.join("styles").join("variables.scss")),
            template_dir,
            output: "/css/settei-styles.css".into(),
            imports: Vec::new(),
            variables: IndexMap::new(),
            last: Mutex::new(None),
        }
    }

    /// Sets the variables definition file, `None` disables the variables page.
    pub fn variables_source(mut self, source: Option<impl Into<Utf8PathBuf>>) -> Self {
        self.source = source.map(Into::into);
        self
    }

    /// Sets the CSS output path, relative to the stylesheet directory.
    ///
    /// Never point this at the theme's own `style.css`.
    pub fn output(mut self, path: impl AsRef<str>) -> Self {
        self.output = format!("/{}", path.as_ref().trim_start_matches('/'));
        self
    }

    /// Adds files to `@import` before the compiler source.
    pub fn import<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports.extend(files.into_iter().map(Into::into));
        self
    }

    /// Sets a variable value directly.
    ///
    /// Variables also listed in the variables file take their value from the
    /// settings instead.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Returns a directly set variable value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Public path of the compiled stylesheet, relative to the theme root.
    pub fn href(&self) -> &str {
        &self.output
    }

    pub fn output_path(&self) -> Utf8PathBuf {
        self.stylesheet_dir.join(self.output.trim_start_matches('/'))
    }

    fn scanned(&self) -> Result<Vec<Variable>, StyleError> {
        match &self.source {
            Some(source) => Ok(read_variables(source)?.unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    /// Builds the compiler pages and registers their settings in `store`.
    ///
    /// The variables page is only created when the variables file defines at
    /// least one variable. Both pages recompile the stylesheet when updated.
    pub fn pages(self: &Arc<Self>, store: &mut dyn OptionStore) -> Result<Vec<SettingsPage>, StyleError> {
        let description = format!(
            "Paths of images and <strong>@import</strong> urls are relative to <kbd>{}</kbd>",
            self.template_dir
        );

        let compiler = SettingsPage::new(COMPILER_PAGE)
            .title("Compiler")
            .menu(Some(Menu::top_level().title("Styles")))
            .submit_label("Compile")
            .reset_label(None::<String>)
            .add_hook(self.hook())
            .register(
                store,
                Schemas::new().setting(
                    COMPILER_PAGE,
                    Section::new().field(
                        "compiler",
                        FieldSpec::new("textarea").description(description),
                    ),
                ),
            )?;

        let mut pages = vec![compiler];

        let scanned = self.scanned()?;
        if scanned.is_empty() {
            return Ok(pages);
        }

        let section = scanned.into_iter().fold(
            Section::new().description("Edit your stylesheet variables from this very dashboard."),
            |section, var| {
                section.field(
                    var.name,
                    FieldSpec::new("text")
                        .label(var.label)
                        .attribute("placeholder", var.default),
                )
            },
        );

        let variables = SettingsPage::new(VARIABLES_PAGE)
            .title("Variables")
            .menu(Some(Menu::under(COMPILER_PAGE)))
            .submit_label("Update Variables")
            .reset_label(Some("Reset Variables"))
            .add_hook(self.hook())
            .register(store, Schemas::new().setting(VARIABLES_SETTING, section))?;

        pages.push(variables);

        Ok(pages)
    }

    fn hook(self: &Arc<Self>) -> Hook {
        let compiler = Arc::clone(self);

        Hook::settings_updated(move |ctx| {
            let notice = compiler.compile_notice(ctx.store);
            ctx.notices.push(notice);
            Ok(())
        })
    }

    /// Resolves the value of every variable passed to the compiler.
    ///
    /// Directly set values come first. Variables from the variables file use
    /// their stored setting when it is not empty, else the file default.
    pub fn resolve_variables(
        &self,
        store: &dyn OptionStore,
    ) -> Result<IndexMap<String, String>, StyleError> {
        let mut variables = self.variables.clone();

        for var in self.scanned()? {
            let stored = stored_text(store, VARIABLES_SETTING, &var.name)?;
            let value = if stored.is_empty() { var.default } else { stored };

            variables.insert(var.name, value);
        }

        Ok(variables)
    }

    /// Assembles the full stylesheet source handed to the compiler.
    ///
    /// Variables are declared ahead of the imports for files using
    /// `!default`, and again after them so imported declarations can't
    /// override the edited values.
    pub fn source(&self, store: &dyn OptionStore) -> Result<String, StyleError> {
        let mut declarations = String::new();
        for (name, value) in self.resolve_variables(store)? {
            let _ = writeln!(declarations, "${name}: {value};");
        }

        let mut source = declarations.clone();

        for file in &self.imports {
            let _ = writeln!(source, "@import '{file}';");
        }

        if !self.imports.is_empty() {
            source.push_str(&declarations);
        }

        source.push_str(&stored_text(store, COMPILER_PAGE, "compiler")?);

        Ok(source)
    }

    /// Compiles the stylesheet and writes it to [`StyleCompiler::output_path`].
    ///
    /// The compile is skipped when neither the source nor any file it
    /// imported changed since the last run, and the output still exists.
    pub fn compile(&self, store: &dyn OptionStore) -> Result<Compiled, StyleError> {
        let source = self.source(store)?;
        let path = self.output_path();
        let hash = Hash32::hash(&source);

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        if path.is_file() && last.as_ref().is_some_and(|last| last.is_current(hash)) {
            tracing::debug!("stylesheet input unchanged ({:?}), skipping", hash);
            return Ok(Compiled { path, skipped: true });
        }

        let recorder = RecordingFs::default();

        let opts = grass::Options::default()
            .style(grass::OutputStyle::Compressed)
            .fs(&recorder)
            .load_path(self.stylesheet_dir.as_std_path())
            .load_path(self.template_dir.as_std_path());

        let css = grass::from_string(source, &opts)?;
        drop(opts);

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, css)?;

        *last = Some(Fingerprint {
            source: hash,
            files: recorder.into_loaded(),
        });
        tracing::info!("compiled stylesheet to {}", path);

        Ok(Compiled { path, skipped: false })
    }

    /// Compiles and reports the outcome as a notice for the compiler page.
    pub fn compile_notice(&self, store: &dyn OptionStore) -> Notice {
        match self.compile(store) {
            Ok(_) => Notice::updated(
                COMPILER_PAGE,
                "styles_compiled",
                "Stylesheet successfully compiled.",
            ),
            Err(err) => {
                tracing::error!("stylesheet compilation failed: {}", err);
                Notice::error(
                    COMPILER_PAGE,
                    "styles_failed",
                    "Compiler result with the following error:",
                )
                .with_detail(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::NoticeKind;
    use crate::store::MemoryStore;
    use camino::Utf8Path;
    use serde_json::{Map, json};

    struct Theme {
        _dir: tempfile::TempDir,
        root: Utf8PathBuf,
    }

    fn theme(variables: Option<&str>) -> Theme {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        fs::create_dir_all(root.join("styles")).unwrap();
        if let Some(text) = variables {
            fs::write(root.join("styles/variables.scss"), text).unwrap();
        }
        fs::write(root.join("styles/_base.scss"), "body { margin: 0; }").unwrap();

        Theme { _dir: dir, root }
    }

    fn submit(page: &mut SettingsPage, store: &mut MemoryStore, setting: &str, fields: Value) -> Vec<Notice> {
        let mut entry = fields.as_object().cloned().unwrap_or_default();
        entry.insert(format!("{}_setting", page.id()), json!(setting));

        let mut post = Map::new();
        post.insert(setting.into(), Value::Object(entry));
        page.submit(store, &post).unwrap()
    }

    #[test]
    fn test_builder() {
        let compiler = StyleCompiler::new("/theme", "/parent")
            .output("assets/site.css")
            .set("gutter", "20px");

        assert_eq!(compiler.href(), "/assets/site.css");
        assert_eq!(compiler.output_path(), Utf8Path::new("/theme/assets/site.css"));
        assert_eq!(compiler.get("gutter"), Some("20px"));
        assert_eq!(compiler.get("missing"), None);
    }

    #[test]
    fn test_pages_without_variables() {
        let theme = theme(None);
        let compiler = Arc::new(StyleCompiler::new(&theme.root, &theme.root));
        let mut store = MemoryStore::new();

        let pages = compiler.pages(&mut store).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id(), COMPILER_PAGE);
        assert_eq!(pages[0].args().reset, None);
        assert_eq!(store.get(COMPILER_PAGE).unwrap(), Some(json!({})));
    }

    #[test]
    fn test_variables_page() {
        let theme = theme(Some("$primary: red !default;\n$gutter: 10px !default;\n"));
        let compiler = Arc::new(StyleCompiler::new(&theme.root, &theme.root));
        let mut store = MemoryStore::new();

        let pages = compiler.pages(&mut store).unwrap();
        assert_eq!(pages.len(), 2);

        let html = pages[1].render(&store).unwrap();
        assert!(html.contains(r#"<label for="style_vars_primary">$primary</label>"#));
        assert!(html.contains(r#"placeholder="red""#));
        assert!(html.contains(r#"value="Reset Variables""#));

        store.set(VARIABLES_SETTING, json!({ "primary": "blue", "gutter": "" })).unwrap();
        let variables = compiler.resolve_variables(&store).unwrap();
        assert_eq!(variables["primary"], "blue");
        assert_eq!(variables["gutter"], "10px");
    }

    #[test]
    fn test_compile_on_submit() {
        let theme = theme(Some("$primary: red !default;\n"));
        let compiler = Arc::new(
            StyleCompiler::new(&theme.root, &theme.root).import(["styles/base"]),
        );
        let mut store = MemoryStore::new();
        let mut pages = compiler.pages(&mut store).unwrap();

        let notices = submit(
            &mut pages[0],
            &mut store,
            COMPILER_PAGE,
            json!({ "compiler": "a {\n\tcolor: $primary;\n}" }),
        );
        assert_eq!(notices.last().unwrap().code, "styles_compiled");

        let css = fs::read_to_string(compiler.output_path()).unwrap();
        assert!(css.contains("body{margin:0}"));
        assert!(css.contains("a{color:red}"));

        let notices = submit(&mut pages[1], &mut store, VARIABLES_SETTING, json!({ "primary": "blue" }));
        assert_eq!(notices.last().unwrap().kind, NoticeKind::Updated);

        let css = fs::read_to_string(compiler.output_path()).unwrap();
        assert!(css.contains("a{color:blue}"));
    }

    #[test]
    fn test_unchanged_input_is_skipped() {
        let theme = theme(None);
        let compiler = StyleCompiler::new(&theme.root, &theme.root);
        let mut store = MemoryStore::new();
        store.set(COMPILER_PAGE, json!({ "compiler": "p { margin: 0 }" })).unwrap();

        assert!(!compiler.compile(&store).unwrap().skipped);
        assert!(compiler.compile(&store).unwrap().skipped);

        fs::remove_file(compiler.output_path()).unwrap();
        assert!(!compiler.compile(&store).unwrap().skipped);
    }

    #[test]
    fn test_changed_import_recompiles() {
        let theme = theme(None);
        let compiler = StyleCompiler::new(&theme.root, &theme.root).import(["styles/base"]);
        let mut store = MemoryStore::new();
        store.set(COMPILER_PAGE, json!({ "compiler": "p { color: red }" })).unwrap();

        assert!(!compiler.compile(&store).unwrap().skipped);
        assert!(compiler.compile(&store).unwrap().skipped);

        fs::write(theme.root.join("styles/_base.scss"), "body { margin: 5px; }").unwrap();

        assert!(!compiler.compile(&store).unwrap().skipped);
        let css = fs::read_to_string(compiler.output_path()).unwrap();
        assert!(css.contains("body{margin:5px}"));
        assert!(css.contains("p{color:red}"));
    }

    #[test]
    fn test_edited_variable_beats_imported_file() {
        let theme = theme(Some("$font-size-h1: 36px;\n"));
        let compiler = StyleCompiler::new(&theme.root, &theme.root).import(["styles/variables"]);
        let mut store = MemoryStore::new();
        store.set(VARIABLES_SETTING, json!({ "font-size-h1": "40px" })).unwrap();
        store
            .set(COMPILER_PAGE, json!({ "compiler": "h1 { font-size: $font-size-h1; }" }))
            .unwrap();

        compiler.compile(&store).unwrap();

        let css = fs::read_to_string(compiler.output_path()).unwrap();
        assert!(css.contains("h1{font-size:40px}"));
    }

    #[test]
    fn test_stored_values_are_read_verbatim() {
        let theme = theme(Some("$columns: 1 2 !default;\n"));
        let compiler = StyleCompiler::new(&theme.root, &theme.root);
        let mut store = MemoryStore::new();
        store.set(VARIABLES_SETTING, json!({ "columns": "[1, 2]" })).unwrap();
        store.set(COMPILER_PAGE, json!({ "compiler": "[1]" })).unwrap();

        let variables = compiler.resolve_variables(&store).unwrap();
        assert_eq!(variables["columns"], "[1, 2]");
        assert!(compiler.source(&store).unwrap().ends_with("\n[1]"));
    }

    #[test]
    fn test_compile_error_notice() {
        let theme = theme(None);
        let compiler = StyleCompiler::new(&theme.root, &theme.root);
        let mut store = MemoryStore::new();
        store.set(COMPILER_PAGE, json!({ "compiler": "a { color: $undefined; }" })).unwrap();

        let notice = compiler.compile_notice(&store);
        assert!(notice.is_error());
        assert!(notice.detail.unwrap().contains("Undefined variable"));
        assert!(!compiler.output_path().exists());
    }
}
