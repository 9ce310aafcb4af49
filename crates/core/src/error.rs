//! Error types for the e57 file library.
//!
//! All fallible operations in the workspace return [`Result`]. The error
//! model is a single [`Error`] carrying an [`ErrorKind`] tag plus a
//! human-readable context string; the kind list is the stable surface and
//! will not change without a major version bump.
//!
//! Low-level I/O faults are mapped at the call site to the kind naming the
//! failed operation (`OpenFailed`, `ReadFailed`, ...) rather than wrapped
//! generically, so there is intentionally no `From<io::Error>` here.

use thiserror::Error;

/// Result type alias for e57 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Tag identifying the failure class of an [`Error`].
///
/// The kinds form a flat taxonomy. `InvarianceViolation` is raised only by
/// the explicit invariant-check entry points; normal operations raise the
/// specific kind that characterizes the violation instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A public API call was given an argument that makes no sense
    BadApiArgument,
    /// Opening or creating the underlying file failed
    OpenFailed,
    /// Seeking in the underlying file failed
    LseekFailed,
    /// Reading from the underlying file failed
    ReadFailed,
    /// Writing to the underlying file failed
    WriteFailed,
    /// Closing or syncing the underlying file failed
    CloseFailed,
    /// A page failed CRC verification
    BadChecksum,
    /// The file does not start with the E57 signature
    BadFileSignature,
    /// The file's major version is not supported
    UnknownFileVersion,
    /// Recorded lengths or offsets are inconsistent with the actual file
    BadFileLength,
    /// The XML section could not be set up for parsing
    XmlParserInit,
    /// The XML parser reported a fault
    XmlParser,
    /// The XML document is well-formed XML but not a valid tree description
    BadXmlFormat,
    /// A recorded configuration value (e.g. page size) is invalid
    BadConfiguration,
    /// The session has already been closed
    ImageFileNotOpen,
    /// A write operation was attempted on a read-mode session
    FileIsReadOnly,
    /// The extension prefix is already registered
    DuplicatePrefix,
    /// The extension URI is already registered
    DuplicateUri,
    /// An element name or path is lexically malformed or names nothing
    BadPathName,
    /// An element name uses a prefix that has not been declared
    UndefinedNamespacePrefix,
    /// The node is already attached to a parent
    AlreadyHasParent,
    /// The structure already has a child with that name
    PathAlreadyExists,
    /// A value lies outside its declared `[min, max]` bounds
    ValueOutOfBounds,
    /// An invariant check found inconsistent internal state
    InvarianceViolation,
    /// A bug: internal state that should be unreachable
    Internal,
}

impl ErrorKind {
    /// Canonical string form of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadApiArgument => "bad API argument",
            ErrorKind::OpenFailed => "open failed",
            ErrorKind::LseekFailed => "lseek failed",
            ErrorKind::ReadFailed => "read failed",
            ErrorKind::WriteFailed => "write failed",
            ErrorKind::CloseFailed => "close failed",
            ErrorKind::BadChecksum => "bad checksum",
            ErrorKind::BadFileSignature => "bad file signature",
            ErrorKind::UnknownFileVersion => "unknown file version",
            ErrorKind::BadFileLength => "bad file length",
            ErrorKind::XmlParserInit => "XML parser init failed",
            ErrorKind::XmlParser => "XML parser error",
            ErrorKind::BadXmlFormat => "bad XML format",
            ErrorKind::BadConfiguration => "bad configuration",
            ErrorKind::ImageFileNotOpen => "image file not open",
            ErrorKind::FileIsReadOnly => "file is read-only",
            ErrorKind::DuplicatePrefix => "duplicate namespace prefix",
            ErrorKind::DuplicateUri => "duplicate namespace URI",
            ErrorKind::BadPathName => "bad path name",
            ErrorKind::UndefinedNamespacePrefix => "undefined namespace prefix",
            ErrorKind::AlreadyHasParent => "node already has parent",
            ErrorKind::PathAlreadyExists => "path already exists",
            ErrorKind::ValueOutOfBounds => "value out of bounds",
            ErrorKind::InvarianceViolation => "invariance violation",
            ErrorKind::Internal => "internal error",
        }
    }

    /// True for kinds produced by faults of the underlying file or its
    /// recorded contents (as opposed to caller mistakes).
    pub fn is_file_fault(&self) -> bool {
        matches!(
            self,
            ErrorKind::OpenFailed
                | ErrorKind::LseekFailed
                | ErrorKind::ReadFailed
                | ErrorKind::WriteFailed
                | ErrorKind::CloseFailed
                | ErrorKind::BadChecksum
                | ErrorKind::BadFileSignature
                | ErrorKind::UnknownFileVersion
                | ErrorKind::BadFileLength
                | ErrorKind::BadConfiguration
        )
    }

    /// True for kinds caused by a structurally invalid request against the
    /// tree or the registry. Fixing these requires changing the input.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ErrorKind::BadApiArgument
                | ErrorKind::DuplicatePrefix
                | ErrorKind::DuplicateUri
                | ErrorKind::BadPathName
                | ErrorKind::UndefinedNamespacePrefix
                | ErrorKind::AlreadyHasParent
                | ErrorKind::PathAlreadyExists
                | ErrorKind::ValueOutOfBounds
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error type for all e57 operations.
#[derive(Debug, Error)]
#[error("{kind}: {context}")]
pub struct Error {
    kind: ErrorKind,
    context: String,
}

impl Error {
    /// Create an error with the given kind and context.
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
        }
    }

    /// The kind tag of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The context message of this error.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Shorthand for a `BadApiArgument` error.
    pub fn bad_api_argument(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::BadApiArgument, context)
    }

    /// Shorthand for a `BadPathName` error.
    pub fn bad_path_name(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::BadPathName, context)
    }

    /// Shorthand for an `ImageFileNotOpen` error.
    pub fn not_open(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::ImageFileNotOpen, context)
    }

    /// Shorthand for a `FileIsReadOnly` error.
    pub fn read_only(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::FileIsReadOnly, context)
    }

    /// Shorthand for an `Internal` error.
    pub fn internal(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, context)
    }

    /// Map an `io::Error` to the kind naming the failed operation.
    pub fn io(kind: ErrorKind, op: &str, err: &std::io::Error) -> Self {
        Error::new(kind, format!("{op}: {err}"))
    }
}
