use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    Busy,
    Permission,
    Corrupt,
    Io,
    Timeout,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    key: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            key: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Display form of the key the failing operation addressed, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_key(mut self, key: impl fmt::Display) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(key) = &self.key {
            write!(f, " (key: {key})")?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Map an engine failure onto the error taxonomy, keeping the engine error as source.
pub(crate) fn engine_error(context: &str, err: impl Into<redb::Error>) -> Error {
    let err: redb::Error = err.into();
    let kind = match &err {
        redb::Error::DatabaseAlreadyOpen => ErrorKind::Busy,
        redb::Error::Corrupted(_)
        | redb::Error::TableDoesNotExist(_)
        | redb::Error::TableTypeMismatch { .. } => ErrorKind::Corrupt,
        redb::Error::Io(io) => map_io_error_kind(io),
        _ => ErrorKind::Internal,
    };
    Error::new(kind).with_message(context).with_source(err)
}

pub(crate) fn map_io_error_kind(err: &std::io::Error) -> ErrorKind {
    match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Busy => 5,
        ErrorKind::Permission => 6,
        ErrorKind::Corrupt => 7,
        ErrorKind::Io => 8,
        ErrorKind::Timeout => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::{engine_error, to_exit_code, Error, ErrorKind};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::NotFound, 3),
            (ErrorKind::Busy, 5),
            (ErrorKind::Permission, 6),
            (ErrorKind::Corrupt, 7),
            (ErrorKind::Io, 8),
            (ErrorKind::Timeout, 9),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::NotFound)
            .with_message("no record for key")
            .with_key("\"KX1\"");
        let text = err.to_string();
        assert!(text.starts_with("NotFound: no record for key"));
        assert!(text.contains("(key: \"KX1\")"));
        assert!(err.is_not_found());
    }

    #[test]
    fn already_open_database_is_busy() {
        let err = engine_error("open", redb::DatabaseError::DatabaseAlreadyOpen);
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(err.message(), Some("open"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn engine_permission_error_is_mapped() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = engine_error("write", redb::StorageError::Io(io));
        assert_eq!(err.kind(), ErrorKind::Permission);
    }
}
