//! Container image recipe for the Context7 MCP server.

use std::path::{Path, PathBuf};

use crate::config::{WrapperConfig, SERVER_BINARY, TRANSPORT};
use crate::error::WrapperResult;

/// Static description of the image: base, package, restricted account, entry point.
#[derive(Debug, Clone)]
pub struct ImageRecipe {
    pub base_image: String,
    pub package: String,
    pub user: String,
    pub entrypoint: Vec<String>,
    pub default_args: Vec<String>,
}

impl ImageRecipe {
    pub fn from_config(config: &WrapperConfig) -> Self {
        Self {
            base_image: config.base_image.clone(),
            package: config.package.clone(),
            user: config.user.clone(),
            entrypoint: vec![SERVER_BINARY.to_string()],
            default_args: vec!["--transport".to_string(), TRANSPORT.to_string()],
        }
    }

    /// Render the Dockerfile text.
    pub fn render(&self) -> String {
        let user = &self.user;
        let home = format!("/home/{user}");
        let mut out = String::new();

        out.push_str(&format!("FROM {}\n\n", self.base_image));
        out.push_str(&format!(
            "RUN npm install -g {} && npm cache clean --force\n\n",
            self.package
        ));
        out.push_str(&format!(
            "RUN addgroup -S {user} && adduser -S -G {user} -h {home} -s /sbin/nologin {user} \\\n    && mkdir -p {home} && chown -R {user}:{user} {home}\n\n"
        ));
        out.push_str(&format!("USER {user}\n"));
        out.push_str(&format!("WORKDIR {home}\n\n"));
        out.push_str(&format!("ENTRYPOINT {}\n", json_array(&self.entrypoint)));
        out.push_str(&format!("CMD {}\n", json_array(&self.default_args)));
        out
    }

    /// Write `Dockerfile` into a build context directory, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> WrapperResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("Dockerfile");
        std::fs::write(&path, self.render())?;
        tracing::info!("Wrote {}", path.display());
        Ok(path)
    }
}

fn json_array(items: &[String]) -> String {
    // Exec form; serde_json quotes and escapes each element.
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_contract() {
        let recipe = ImageRecipe::from_config(&WrapperConfig::default());
        let text = recipe.render();

        assert!(text.starts_with("FROM node:20-alpine\n"));
        assert!(text.contains("npm install -g @upstash/context7-mcp"));
        assert!(text.contains("adduser -S -G context7"));
        assert!(text.contains("USER context7\n"));
        assert!(text.contains("ENTRYPOINT [\"context7-mcp\"]"));
        assert!(text.contains("CMD [\"--transport\",\"stdio\"]"));
        assert!(!text.contains("USER root"));
    }

    #[test]
    fn test_write_to_creates_context() {
        let dir = tempfile::tempdir().unwrap();
        let context = dir.path().join("build");
        let recipe = ImageRecipe::from_config(&WrapperConfig::default());

        let path = recipe.write_to(&context).unwrap();
        assert_eq!(path, context.join("Dockerfile"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), recipe.render());
    }
}
