use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Updated,
    Error,
}

/// A message shown at the top of a settings page after a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Page or setting the notice belongs to.
    pub setting: String,
    /// Short machine-readable code, used as the element id suffix.
    pub code: String,
    pub message: String,
    /// Preformatted details, e.g. compiler output.
    pub detail: Option<String>,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn updated(
        setting: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            setting: setting.into(),
            code: code.into(),
            message: message.into(),
            detail: None,
            kind: NoticeKind::Updated,
        }
    }

    pub fn error(
        setting: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: NoticeKind::Error,
            ..Self::updated(setting, code, message)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == NoticeKind::Error
    }
}
