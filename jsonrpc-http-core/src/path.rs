//! Service path convention.
//!
//! JSON-RPC services are mounted under [`JSONRPC_PATH_PREFIX`]. A service
//! registered as `calc` is reached at `/jsonrpc/calc`, below whatever
//! context path the hosting instance advertises.

/// Prefix under which every service path is mounted.
pub const JSONRPC_PATH_PREFIX: &str = "/jsonrpc/";

/// Collapse every run of consecutive `/` into a single `/`.
///
/// ```
/// use jsonrpc_http_core::collapse_slashes;
///
/// assert_eq!(collapse_slashes("//a///b/"), "/a/b/");
/// ```
pub fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(ch);
    }
    out
}

/// Mount a service path under [`JSONRPC_PATH_PREFIX`].
///
/// `add` and `/add` both become `/jsonrpc/add`.
pub fn service_path(path: &str) -> String {
    collapse_slashes(&format!("{JSONRPC_PATH_PREFIX}{path}"))
}

/// Join a context path and a service path into a request path.
///
/// The result always starts with `/` and never contains `//`.
pub fn request_path(context_path: &str, path: &str) -> String {
    let joined = collapse_slashes(&format!("{context_path}{}", service_path(path)));
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

/// Derive a default service path from a dotted type name.
///
/// `com.example.Calc` becomes `com/example/Calc`.
pub fn class_name_to_path(name: &str) -> String {
    name.replace('.', "/")
}
