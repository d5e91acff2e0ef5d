//! HTML markup for settings forms.
//!
//! Each [`FieldType`] maps onto a [`Widget`], and every widget has its own
//! template. Templates are HTML-escaped by default; only descriptions and
//! option labels, which come from the schema author, are emitted raw.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::Value;

use crate::sanitize::{absint, is_truthy, sanitize_key, to_text};
use crate::schema::{FieldSpec, FieldType};

const MACROS: &str = r#"{% macro attrs(attributes) %}{% for key, value in attributes %} {{ key }}="{{ value }}"{% endfor %}{% endmacro %}
{%- macro desc(description) %}{% if description %}<p class="description">{{ description|safe }}</p>{% endif %}{% endmacro %}
{%- macro missing(message) %}<span class="settei-error">{{ message }}</span>{% endmacro %}"#;

const CHECKBOX: &str = r#"{% from "macros.html" import attrs %}<label><input name="{{ name }}"{{ attrs(attributes) }} id="{{ id }}" type="checkbox" value="1"{% if checked %} checked="checked"{% endif %} />{% if description %} {{ description|safe }}{% endif %}</label>"#;

const RADIO: &str = r#"{% from "macros.html" import attrs, desc, missing %}{% if not options %}{{ missing("No options defined.") }}{% endif %}<fieldset id="{{ id }}">{% for key, label, checked in options %}{% if not loop.first %}<br />{% endif %}<label><input name="{{ name }}"{{ attrs(attributes) }} type="radio" value="{{ key }}"{% if checked %} checked="checked"{% endif %} /> {{ label|safe }}</label>{% endfor %}{{ desc(description) }}</fieldset>"#;

const SELECT: &str = r#"{% from "macros.html" import attrs, desc, missing %}{% if not options %}{{ missing("No options defined.") }}{% endif %}<select name="{{ name }}"{{ attrs(attributes) }} id="{{ id }}">{% for key, label, checked in options %}<option value="{{ key }}"{% if checked %} selected="selected"{% endif %}>{{ label|safe }}</option>{% endfor %}</select>{{ desc(description) }}"#;

const MEDIA: &str = r#"{% from "macros.html" import attrs, desc %}<fieldset class="settei-media" id="{{ id }}"><input name="{{ name }}"{{ attrs(attributes) }} type="hidden" value="{{ current }}" />{% if current %}<span class="settei-media-preview" data-attachment="{{ current }}"></span>{% endif %}<p><a class="button button-large settei-select-media" title="{{ label }}">Select {{ label }}</a> <a class="button button-small settei-remove-media" title="{{ label }}">Remove {{ label }}</a></p>{{ desc(description) }}</fieldset>"#;

const TEXTAREA: &str = r#"{% from "macros.html" import attrs, desc %}<textarea name="{{ name }}"{{ attrs(attributes) }} id="{{ id }}" class="large-text">{{ current }}</textarea>{{ desc(description) }}"#;

const MULTI: &str = r#"{% from "macros.html" import attrs, desc, missing %}{% if not options %}{{ missing("No options defined.") }}{% endif %}<fieldset id="{{ id }}">{% for key, label, checked in options %}{% if not loop.first %}<br />{% endif %}<label><input name="{{ name }}[{{ key }}]"{{ attrs(attributes) }} type="checkbox" value="1"{% if checked %} checked="checked"{% endif %} /> {{ label|safe }}</label>{% endfor %}{{ desc(description) }}</fieldset>"#;

const ACTION: &str = r#"{% from "macros.html" import attrs, desc, missing %}{% if not has_action %}{{ missing("No action defined.") }}{% endif %}<p class="settei-action"><input name="{{ name }}"{{ attrs(attributes) }} id="{{ id }}" type="button" class="button button-large" value="{{ label }}" data-action="{{ id }}" /></p>{{ desc(description) }}"#;

const INPUT: &str = r#"{% from "macros.html" import attrs, desc %}<input name="{{ name }}"{{ attrs(attributes) }} id="{{ id }}" type="{{ kind }}" value="{{ current }}" class="regular-text" />{{ desc(description) }}"#;

const PAGE: &str = r#"<form action="{{ action }}" method="POST" enctype="multipart/form-data" class="wrap">
<h2>{{ title }}</h2>
{%- for notice in notices %}
<div class="notice notice-{{ notice.kind }}" id="setting-error-{{ notice.code }}"><p>{{ notice.message }}</p>{% if notice.detail %}<pre>{{ notice.detail }}</pre>{% endif %}</div>
{%- endfor %}
{%- for section in sections %}
{% if section.title %}<h3>{{ section.title }}</h3>{% endif %}
{%- if section.description %}<p>{{ section.description|safe }}</p>{% endif %}
<input name="{{ section.id }}[{{ marker }}]" type="hidden" value="{{ section.id }}" />
{%- if section.fields %}
<table class="form-table">
{%- for field in section.fields %}
<tr><th scope="row">{% if field.label %}<label for="{{ field.id }}">{{ field.label }}</label>{% endif %}</th><td>{{ field.html|safe }}</td></tr>
{%- endfor %}
</table>
{%- endif %}
{%- endfor %}
{%- if not empty %}
<p class="submit"><input type="submit" class="button button-large button-primary" value="{{ submit }}" />
{%- if reset %} <input type="submit" name="{{ reset_key }}" class="button button-small" value="{{ reset }}" onclick="return confirm('Do you really want to reset all these settings to their default values ?');" />{% endif %}</p>
{%- endif %}
</form>"#;

static TEMPLATES: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();

    for (name, source) in [
        ("macros.html", MACROS),
        ("checkbox.html", CHECKBOX),
        ("radio.html", RADIO),
        ("select.html", SELECT),
        ("media.html", MEDIA),
        ("textarea.html", TEXTAREA),
        ("multi.html", MULTI),
        ("action.html", ACTION),
        ("input.html", INPUT),
        ("page.html", PAGE),
    ] {
        env.add_template(name, source)
            .expect("invalid built-in template");
    }

    env
});

/// The rendering strategy of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widget {
    Checkbox,
    Radio,
    Select,
    Media,
    Textarea,
    Multi,
    Action,
    /// Single-line `<input>` whose `type` is the field type name.
    Input,
}

impl Widget {
    pub fn for_type(kind: &FieldType) -> Self {
        match kind {
            FieldType::Checkbox => Widget::Checkbox,
            FieldType::Radio => Widget::Radio,
            FieldType::Select => Widget::Select,
            FieldType::Media => Widget::Media,
            FieldType::Textarea => Widget::Textarea,
            FieldType::Multi => Widget::Multi,
            FieldType::Action => Widget::Action,
            FieldType::Text
            | FieldType::Email
            | FieldType::Url
            | FieldType::Number
            | FieldType::Other(_) => Widget::Input,
        }
    }

    fn template(self) -> &'static str {
        match self {
            Widget::Checkbox => "checkbox.html",
            Widget::Radio => "radio.html",
            Widget::Select => "select.html",
            Widget::Media => "media.html",
            Widget::Textarea => "textarea.html",
            Widget::Multi => "multi.html",
            Widget::Action => "action.html",
            Widget::Input => "input.html",
        }
    }
}

/// Renders the control of a single field.
///
/// `id` is the DOM id and `name` the form input name of the field. `value` is
/// the currently stored value, already decoded for `multi` fields.
pub fn render_field(
    id: &str,
    name: &str,
    field: &FieldSpec,
    value: &Value,
) -> Result<String, minijinja::Error> {
    let widget = Widget::for_type(&field.kind);

    let attributes: Vec<(String, &str)> = field
        .attributes
        .iter()
        .map(|(key, value)| (sanitize_key(key), value.as_str()))
        .collect();

    let options: Vec<(&str, &str, bool)> = field
        .options()
        .into_iter()
        .flatten()
        .map(|(key, label)| {
            let checked = match widget {
                Widget::Multi => value.get(key).is_some_and(is_truthy),
                _ => to_text(value) == *key,
            };
            (key.as_str(), label.as_str(), checked)
        })
        .collect();

    let current = match widget {
        Widget::Media => Value::from(absint(value)),
        _ => Value::from(to_text(value)),
    };

    let template = TEMPLATES.get_template(widget.template())?;

    template.render(context! {
        id,
        name,
        kind => field.kind.as_str(),
        label => field.label.as_deref().unwrap_or_default(),
        description => field.description,
        attributes,
        options,
        current,
        checked => is_truthy(value),
        has_action => field.action.is_some(),
    })
}

pub(crate) fn render_page(ctx: impl Serialize) -> Result<String, minijinja::Error> {
    TEMPLATES.get_template("page.html")?.render(ctx)
}
