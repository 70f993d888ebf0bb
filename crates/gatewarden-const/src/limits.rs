//! Size ceilings bounding memory use.

/// Maximum bytes read from the local allowlist file.
pub const MAX_LOCAL_FILE_BYTES: u64 = 8 * 1024 * 1024;

/// Maximum bytes accepted from the remote allowlist endpoint.
///
/// Responses larger than this abort the fetch attempt rather than buffer
/// unbounded payloads.
pub const MAX_REMOTE_BODY_BYTES: u64 = 8 * 1024 * 1024;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Maximum page size for list endpoints.
pub const MAX_PAGE_LIMIT: usize = 100;
