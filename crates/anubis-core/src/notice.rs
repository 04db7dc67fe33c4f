use crate::error::{ClientError, ServiceError, SyncError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
    Warning,
}

impl NoticeLevel {
    pub fn title(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Error => "Error",
            Self::Info => "Notice",
            Self::Warning => "Warning",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Error => "✗",
            Self::Info => "ℹ",
            Self::Warning => "⚠",
        }
    }
}

/// A transient, user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, text)
    }
}

impl From<&ClientError> for Notice {
    fn from(err: &ClientError) -> Self {
        match err {
            ClientError::Validation(ValidationError::EmptyMessage) => {
                Notice::warning("Type a message first")
            }
            ClientError::Validation(ValidationError::FormIncomplete) => {
                Notice::warning("Fix the highlighted fields before registering")
            }
            ClientError::Validation(e) => Notice::warning(e.to_string()),
            // Auth failures are shown verbatim.
            ClientError::Auth(e) => Notice::error(e.to_string()),
            ClientError::Sync(e) => Notice::from(e),
            ClientError::Send(_) => Notice::error("Message was not sent, try again"),
        }
    }
}

impl From<&SyncError> for Notice {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::Fetch { .. } | SyncError::Subscribe { .. } => {
                Notice::error(format!("Could not load messages: {}", err))
            }
            SyncError::Directory {
                source: ServiceError::Unauthenticated,
                ..
            } => Notice::warning("Sign in first"),
            SyncError::Directory {
                what,
                source: ServiceError::NotFound(_),
            } => Notice::warning(format!("No such {}", what)),
            SyncError::Directory { what, .. } => {
                Notice::error(format!("Could not load {}, try again", what))
            }
            SyncError::NoActiveChannel => Notice::warning("Open a channel first"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthError, SendError};

    #[test]
    fn auth_errors_are_verbatim() {
        let err = ClientError::from(AuthError::AccountDisabled);
        let notice = Notice::from(&err);
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.text, "Account is disabled");
    }

    #[test]
    fn local_rejections_are_warnings() {
        let err = ClientError::from(ValidationError::EmptyMessage);
        assert_eq!(Notice::from(&err).level, NoticeLevel::Warning);
    }

    #[test]
    fn directory_failures_name_what_failed() {
        let err = ClientError::from(SyncError::Directory {
            what: "servers",
            source: ServiceError::Network("timed out".into()),
        });
        let notice = Notice::from(&err);
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.text, "Could not load servers, try again");

        let err = ClientError::from(SyncError::Directory {
            what: "channel",
            source: ServiceError::NotFound("c9".into()),
        });
        assert_eq!(Notice::from(&err), Notice::warning("No such channel"));
    }

    #[test]
    fn missing_session_or_channel_is_a_warning() {
        let err = ClientError::from(SyncError::NoActiveChannel);
        assert_eq!(Notice::from(&err), Notice::warning("Open a channel first"));

        let err = ClientError::from(SyncError::Directory {
            what: "account",
            source: ServiceError::Unauthenticated,
        });
        assert_eq!(Notice::from(&err), Notice::warning("Sign in first"));
    }

    #[test]
    fn message_load_failure_keeps_its_wording() {
        let err = ClientError::from(SyncError::Fetch {
            channel: "general".into(),
            source: ServiceError::Network("reset".into()),
        });
        assert!(Notice::from(&err).text.starts_with("Could not load messages"));
    }

    #[test]
    fn send_failure_does_not_leak_transport_detail() {
        let err = ClientError::from(SendError(ServiceError::Network("connection reset".into())));
        let notice = Notice::from(&err);
        assert!(!notice.text.contains("connection reset"));
    }
}
