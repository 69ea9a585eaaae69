pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CR: u8 = b'\r';
pub(crate) const LF: u8 = b'\n';
pub(crate) const CRLF: &[u8] = b"\r\n";

pub(crate) const DEFAULT_MAX_HEADER_COUNT: usize = 16;
pub(crate) const DEFAULT_MAX_HEADER_SIZE: usize = 1024;
pub(crate) const DEFAULT_MAX_TOTAL_HEADER_SIZE: usize = 4096;
pub(crate) const DEFAULT_MAX_PARTS: usize = 1024;
pub(crate) const DEFAULT_MAX_TEXT_FIELD_SIZE: u64 = 64 * 1024;
pub(crate) const DEFAULT_MAX_TOTAL_TEXT_FIELD_SIZE: u64 = 1024 * 1024;
pub(crate) const DEFAULT_MAX_FILENAME_LENGTH: usize = 128;
pub(crate) const DEFAULT_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;
pub(crate) const DEFAULT_MAX_TOTAL_FILE_SIZE: u64 = 16 * 1024 * 1024;
