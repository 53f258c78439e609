//! Harness-document synthesis
//!
//! Renders the base harness template by substituting one module script
//! tag per discovered test file and the serialized environment map.
//! Rendering is a pure function; writing the document to disk is the
//! caller's responsibility.

use crate::env::EnvironmentMap;
use crate::error::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Placeholder replaced with the joined module script tags.
pub const SCRIPT_TAGS_PLACEHOLDER: &str = "{test}";

/// Placeholder replaced with the pretty-printed environment map.
pub const ENV_PLACEHOLDER: &str = "{env}";

/// Render one ES-module script tag for a test file, relative to the
/// server root.
pub fn script_tag(path: &Path) -> String {
    format!(
        r#"<script type="module" src="./{}"></script>"#,
        path.display()
    )
}

/// Render the harness document from a template, a module list, and an
/// environment map.
///
/// The first occurrence of each placeholder is substituted, matching the
/// template contract of exactly two distinct placeholders.
pub fn render_harness(
    template: &str,
    modules: &[PathBuf],
    env: &EnvironmentMap,
) -> Result<String> {
    let tags = modules
        .iter()
        .map(|path| script_tag(path))
        .collect::<Vec<_>>()
        .join("\n");
    let env_json = serde_json::to_string_pretty(&Value::Object(env.clone()))?;

    Ok(template
        .replacen(SCRIPT_TAGS_PLACEHOLDER, &tags, 1)
        .replacen(ENV_PLACEHOLDER, &env_json, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::parse_overlay;
    use std::collections::HashMap;

    const TEMPLATE: &str = "<html>{test}\n<script>env = {env}</script></html>";

    fn modules(paths: &[&str]) -> Vec<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_one_tag_per_module_in_order() {
        let html = render_harness(
            TEMPLATE,
            &modules(&["test/a.js", "test/b.js", "c.js"]),
            &EnvironmentMap::new(),
        )
        .unwrap();

        assert_eq!(html.matches("<script type=\"module\"").count(), 3);
        let a = html.find("src=\"./test/a.js\"").unwrap();
        let b = html.find("src=\"./test/b.js\"").unwrap();
        let c = html.find("src=\"./c.js\"").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_empty_module_list_renders_no_tags() {
        let html = render_harness(TEMPLATE, &[], &EnvironmentMap::new()).unwrap();
        assert!(!html.contains("<script type=\"module\""));
        assert!(!html.contains(SCRIPT_TAGS_PLACEHOLDER));
    }

    #[test]
    fn test_environment_is_pretty_json() {
        let overlay = parse_overlay("API=\"local\"\nRETRIES=3", &HashMap::new());
        let html = render_harness(TEMPLATE, &[], &overlay).unwrap();
        assert!(html.contains("\"API\": \"local\""));
        assert!(html.contains("\"RETRIES\": 3"));
    }

    #[test]
    fn test_placeholders_are_consumed() {
        let html = render_harness(TEMPLATE, &modules(&["a.js"]), &EnvironmentMap::new()).unwrap();
        assert!(!html.contains(SCRIPT_TAGS_PLACEHOLDER));
        assert!(!html.contains(ENV_PLACEHOLDER));
    }

    #[test]
    fn test_script_tag_shape() {
        assert_eq!(
            script_tag(Path::new("test/first.spec.js")),
            r#"<script type="module" src="./test/first.spec.js"></script>"#
        );
    }
}
