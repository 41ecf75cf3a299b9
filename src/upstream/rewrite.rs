//! Outbound request rewriting for a single-host reverse proxy.

use axum::http::header::{HeaderMap, HeaderName, CONNECTION};
use axum::http::uri::{InvalidUri, Uri};
use url::{Position, Url};

/// Headers that describe one connection and must not cross the proxy.
static HOP_BY_HOP: [HeaderName; 8] = [
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    HeaderName::from_static("proxy-authenticate"),
    HeaderName::from_static("proxy-authorization"),
    HeaderName::from_static("te"),
    HeaderName::from_static("trailer"),
    HeaderName::from_static("transfer-encoding"),
    HeaderName::from_static("upgrade"),
];

/// Point `uri` at `base`: scheme and authority come from `base`, the paths
/// are joined with exactly one slash and the queries with `&`.
pub fn rewrite_uri(base: &Url, uri: &Uri) -> Result<Uri, InvalidUri> {
    let authority = &base[Position::BeforeHost..Position::AfterPort];
    let path = join_paths(base.path(), uri.path());

    let query = match (base.query().unwrap_or(""), uri.query().unwrap_or("")) {
        ("", "") => String::new(),
        (q, "") | ("", q) => format!("?{q}"),
        (a, b) => format!("?{a}&{b}"),
    };

    format!("{}://{}{}{}", base.scheme(), authority, path, query).parse()
}

fn join_paths(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

/// Strip hop-by-hop headers, including any named in `Connection`.
pub fn remove_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    headers.remove(CONNECTION);
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}
