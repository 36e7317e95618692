use std::sync::Arc;

use anyhow::{Context, Result};
use minijinja::{Environment, path_loader};
use minijinja_autoreload::AutoReloader;

pub type Templates = Arc<AutoReloader>;

pub fn create(template_path: impl Into<String>) -> Templates {
    let template_path = template_path.into();
    Arc::new(AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        let template_path = template_path.as_str();
        notifier.watch_path(template_path, true);
        env.set_loader(path_loader(template_path));
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("status_class", status_class);
        Ok(env)
    }))
}

pub fn render<S>(templates: &Templates, template_name: &str, context: S) -> Result<String>
where S: serde::Serialize {
    let env = templates.acquire_env().context("Failed to get template environment")?;
    let template = env.get_template(template_name).context("Failed to get template")?;
    template.render(context).context("Failed to render template")
}

/// Groups raw Drone states into the handful of cell styles the page knows.
fn status_class(state: String) -> &'static str {
    match state.as_str() {
        "success" => "success",
        "failure" | "error" | "killed" | "declined" => "failure",
        "running" | "pending" | "blocked" => "running",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use dashboard_core::models::{BuildInfo, BuildStatus, RepoEntry};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_status_class() {
        assert_eq!(status_class("success".to_string()), "success");
        assert_eq!(status_class("killed".to_string()), "failure");
        assert_eq!(status_class("pending".to_string()), "running");
        assert_eq!(status_class("skipped".to_string()), "unknown");
    }

    #[test]
    fn renders_home() {
        let templates = create(concat!(env!("CARGO_MANIFEST_DIR"), "/../../templates"));
        let repos = vec![RepoEntry::new("metwork-framework", "mfext", [
            (
                "integration",
                BuildStatus::Found(BuildInfo {
                    state: "failure".to_string(),
                    number: 812,
                    url: "https://drone.example.com/metwork-framework/mfext/812".to_string(),
                }),
            ),
            ("master", BuildStatus::Unknown),
        ])];
        let html = render(&templates, "home.html", json!({
            "org": "metwork-framework",
            "branches": ["integration", "master"],
            "repos": repos,
            "generated_in_ms": 12,
        }))
        .unwrap();
        // Auto-escaping encodes slashes.
        let escaped = |url: &str| url.replace('/', "&#x2f;");
        assert!(html.contains(&escaped("https://github.com/metwork-framework/mfext/tree/integration")));
        assert!(html.contains(&escaped("https://drone.example.com/metwork-framework/mfext/812")));
        assert!(html.contains("class=\"status failure\""));
        assert!(html.contains("class=\"status unknown\""));
        assert!(html.contains(">master<"));
    }
}
