//! File-URL helpers.
//!
//! Service arguments and harness overrides may arrive either as native paths
//! or as `file://` URLs; these helpers convert between the two forms with
//! percent encoding on the path edges. Conversions are string-level and
//! lossy by contract: anything that is not a convertible `file://` URL comes
//! back as an empty string.

use std::path::MAIN_SEPARATOR_STR;

const FILE_URL_PREFIX: &str = "file://";

/// Bytes that stay unencoded besides ASCII alphanumerics.
const NOENCODE: &[u8] = b"!'()*-._";

fn percent_encode(edge: &str) -> String {
    let mut out = String::with_capacity(edge.len());
    for &b in edge.as_bytes() {
        if b.is_ascii_alphanumeric() || NOENCODE.contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn percent_decode(edge: &str) -> String {
    let bytes = edge.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                // %XX with two hex digits decodes; malformed escapes pass through
                let hi = bytes.get(i + 1).copied().and_then(hex_val);
                let lo = bytes.get(i + 2).copied().and_then(hex_val);
                if let (Some(h), Some(l)) = (hi, lo) {
                    out.push((h << 4) | l);
                    i += 3;
                    continue;
                }
                out.push(b'%');
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Convert a native path to a `file://` URL.
///
/// Inputs that already look like file URLs pass through unchanged; an empty
/// input yields an empty output.
pub fn url_from_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    if path.starts_with(FILE_URL_PREFIX) {
        return path.to_string();
    }

    let edges: Vec<&str> = path.split(MAIN_SEPARATOR_STR).collect();
    let mut url = String::from(FILE_URL_PREFIX);
    let mut start = 0;
    if edges[0].is_empty() {
        start += 1;
    }

    #[cfg(windows)]
    {
        // \\host\path keeps the host after file://; C:\foo becomes /C:/foo
        if start < edges.len() && edges[start].is_empty() {
            start += 1;
            if start < edges.len() {
                url.push_str(edges[start]);
                start += 1;
            }
        } else if start < edges.len()
            && edges[start].len() == 2
            && edges[start].as_bytes()[1] == b':'
        {
            url.push('/');
            url.push_str(edges[start]);
            start += 1;
        }
    }

    for edge in &edges[start..] {
        if !edge.is_empty() {
            url.push('/');
            url.push_str(&percent_encode(edge));
        }
    }
    url
}

/// Convert a `file://` URL back to a native path.
///
/// Returns an empty string for non-file URLs and for host forms that have no
/// native equivalent (anything other than `localhost` on Unix).
pub fn path_from_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix(FILE_URL_PREFIX) else {
        return String::new();
    };
    if rest.is_empty() {
        return String::new();
    }

    let edges: Vec<&str> = rest.split('/').collect();
    let mut start = 0;
    if edges[0].is_empty() {
        start += 1;
    }
    if start >= edges.len() {
        return String::new();
    }

    let first_edge = percent_decode(edges[start]);
    let mut path = String::new();
    if rest.starts_with('/') {
        // no host component
        #[cfg(windows)]
        {
            if first_edge.len() == 2 && first_edge.as_bytes()[1] == b':' {
                path.push_str(&first_edge);
            } else {
                path.push_str(MAIN_SEPARATOR_STR);
                path.push_str(&first_edge);
            }
        }
        #[cfg(not(windows))]
        {
            path.push_str(MAIN_SEPARATOR_STR);
            path.push_str(&first_edge);
        }
        start += 1;
    } else {
        // localhost is everybody's own machine; other hosts only mean
        // something as \\host\path on Windows
        if first_edge == "localhost" {
            // fall through with an empty prefix so the remaining edges
            // produce a plain absolute path
        } else {
            #[cfg(windows)]
            {
                path.push('\\');
                path.push_str(&first_edge);
            }
            #[cfg(not(windows))]
            {
                return String::new();
            }
        }
        start += 1;
    }

    for edge in &edges[start..] {
        path.push_str(MAIN_SEPARATOR_STR);
        path.push_str(&percent_decode(edge));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_url_from_plain_path() {
        assert_eq!(url_from_path("/tmp/service"), "file:///tmp/service");
        assert_eq!(
            url_from_path("/tmp/with space/file.lz"),
            "file:///tmp/with%20space/file.lz"
        );
    }

    #[test]
    fn test_url_from_path_passthrough_and_empty() {
        assert_eq!(url_from_path("file:///already/url"), "file:///already/url");
        assert_eq!(url_from_path(""), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_path_from_url_basic() {
        assert_eq!(path_from_url("file:///tmp/service"), "/tmp/service");
        assert_eq!(
            path_from_url("file:///tmp/with%20space/file.lz"),
            "/tmp/with space/file.lz"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_path_from_url_localhost_host() {
        assert_eq!(path_from_url("file://localhost/tmp/x"), "/tmp/x");
    }

    #[cfg(unix)]
    #[test]
    fn test_path_from_url_foreign_host_bails() {
        assert_eq!(path_from_url("file://otherhost/tmp/x"), "");
    }

    #[test]
    fn test_path_from_url_rejects_non_file_urls() {
        assert_eq!(path_from_url("http://example.com/x"), "");
        assert_eq!(path_from_url("/plain/path"), "");
        assert_eq!(path_from_url("file://"), "");
    }

    #[test]
    fn test_percent_decode_forms() {
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("a+b"), "a b");
        // malformed escapes pass through untouched
        assert_eq!(percent_decode("a%2"), "a%2");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
    }

    #[cfg(unix)]
    #[test]
    fn test_roundtrip_preserves_path() {
        for p in ["/tmp/a", "/srv/build output/LZMA", "/x/y.z-q_w"] {
            assert_eq!(path_from_url(&url_from_path(p)), p);
        }
    }
}
