/// Upper bound on bytes inspected by the admission probe, and on a single request line.
pub const MAX_PEEK: usize = 8192;

/// Priority key for a request whose size could not be determined.
///
/// Smaller than any real file size, so SFF dequeues these first.
pub const INVALID_SIZE: i64 = -1;

/// A target containing this segment is served by running a program instead of reading a file.
pub const DYNAMIC_MARKER: &str = "cgi";

/// Appended to static targets that end in `/`.
pub const INDEX_FILE: &str = "index.html";

pub const SERVER_NAME: &str = "wserver";

const _: () = assert!(INVALID_SIZE < 0, "sentinel must sort below every real size");

/// Upper bound on request line plus headers read by the handler.
pub const MAX_REQUEST_HEAD: u64 = 64 * 1024;
