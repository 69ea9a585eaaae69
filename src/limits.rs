use crate::constants;

/// Resource ceilings applied to one parse.
///
/// A `Limits` value is captured once when the [`Multipart`](crate::Multipart)
/// is constructed and stays read-only for the lifetime of that parse. The
/// defaults are deliberately conservative; every ceiling can be overridden
/// with the builder methods.
///
/// # Examples
///
/// ```
/// use multiform::Limits;
///
/// let limits = Limits::new()
///     .max_parts(64)
///     .max_file_size(1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct Limits {
    pub(crate) max_header_count: usize,
    pub(crate) max_header_size: usize,
    pub(crate) max_total_header_size: usize,
    pub(crate) max_parts: usize,
    pub(crate) max_text_field_size: u64,
    pub(crate) max_total_text_field_size: u64,
    pub(crate) max_filename_length: usize,
    pub(crate) max_file_size: u64,
    pub(crate) max_total_file_size: u64,
}

impl Limits {
    /// Creates the default set of limits.
    pub fn new() -> Limits {
        Limits::default()
    }

    /// Maximum number of headers one part may carry. Default: `16`.
    pub fn max_header_count(mut self, limit: usize) -> Limits {
        self.max_header_count = limit;
        self
    }

    /// Maximum size of a single header line, in bytes, excluding the CRLF
    /// terminator. Default: `1024`.
    pub fn max_header_size(mut self, limit: usize) -> Limits {
        self.max_header_size = limit;
        self
    }

    /// Maximum combined size of one part's header block, in bytes, excluding
    /// the CRLF separators. Default: `4096`.
    pub fn max_total_header_size(mut self, limit: usize) -> Limits {
        self.max_total_header_size = limit;
        self
    }

    /// Maximum number of parts in the stream. Default: `1024`.
    pub fn max_parts(mut self, limit: usize) -> Limits {
        self.max_parts = limit;
        self
    }

    /// Maximum size of a single text field, in bytes. Default: `65536`.
    pub fn max_text_field_size(mut self, limit: u64) -> Limits {
        self.max_text_field_size = limit;
        self
    }

    /// Maximum combined size of all text fields, in bytes.
    /// Default: `1048576`.
    pub fn max_total_text_field_size(mut self, limit: u64) -> Limits {
        self.max_total_text_field_size = limit;
        self
    }

    /// Maximum length of a sanitized filename, in bytes. Default: `128`.
    pub fn max_filename_length(mut self, limit: usize) -> Limits {
        self.max_filename_length = limit;
        self
    }

    /// Maximum size of a single file, in bytes. Default: `4194304`.
    pub fn max_file_size(mut self, limit: u64) -> Limits {
        self.max_file_size = limit;
        self
    }

    /// Maximum combined size of all files, in bytes. Default: `16777216`.
    pub fn max_total_file_size(mut self, limit: u64) -> Limits {
        self.max_total_file_size = limit;
        self
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_header_count: constants::DEFAULT_MAX_HEADER_COUNT,
            max_header_size: constants::DEFAULT_MAX_HEADER_SIZE,
            max_total_header_size: constants::DEFAULT_MAX_TOTAL_HEADER_SIZE,
            max_parts: constants::DEFAULT_MAX_PARTS,
            max_text_field_size: constants::DEFAULT_MAX_TEXT_FIELD_SIZE,
            max_total_text_field_size: constants::DEFAULT_MAX_TOTAL_TEXT_FIELD_SIZE,
            max_filename_length: constants::DEFAULT_MAX_FILENAME_LENGTH,
            max_file_size: constants::DEFAULT_MAX_FILE_SIZE,
            max_total_file_size: constants::DEFAULT_MAX_TOTAL_FILE_SIZE,
        }
    }
}
