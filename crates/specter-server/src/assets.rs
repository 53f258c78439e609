//! Embedded runner assets served at the harness root

use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "runner/"]
struct RunnerAsset;

/// Serve an embedded runner asset, or `None` to delegate down the
/// handler chain. The rendered harness document owns the root path.
pub fn runner_asset(url_path: &str) -> Option<Response<Body>> {
    let path = url_path.trim_start_matches('/');
    if path.is_empty() {
        return None;
    }

    let content = RunnerAsset::get(path)?;
    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();

    Some(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime)
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from(content.data.to_vec()))
            .unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serves_harness_glue() {
        let response = runner_asset("/harness.js").unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mime = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(mime.contains("javascript"), "unexpected mime {mime}");
    }

    #[test]
    fn test_root_delegates() {
        assert!(runner_asset("/").is_none());
    }

    #[test]
    fn test_unknown_asset_delegates() {
        assert!(runner_asset("/no-such-asset.js").is_none());
    }
}
