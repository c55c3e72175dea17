//! Dockerfile catalog for repositories that do not ship their own.

use minijinja::Environment;

use crate::error::EngineResult;
use crate::model::BuildSpec;

const NODE: &str = include_str!("../../templates/recipes/node.Dockerfile.j2");
const PYTHON: &str = include_str!("../../templates/recipes/python.Dockerfile.j2");
const GO: &str = include_str!("../../templates/recipes/go.Dockerfile.j2");
const RUST: &str = include_str!("../../templates/recipes/rust.Dockerfile.j2");
const STATIC: &str = include_str!("../../templates/recipes/static.Dockerfile.j2");
const GENERIC: &str = include_str!("../../templates/recipes/generic.Dockerfile.j2");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeKind {
    Node,
    Python,
    Go,
    Rust,
    Static,
    Generic,
}

impl RecipeKind {
    /// Best-effort guess from the names of files at the source root.
    pub fn detect<'a>(files: impl IntoIterator<Item = &'a str>) -> Self {
        let files: Vec<&str> = files.into_iter().map(str::trim).collect();
        let has = |name: &str| files.contains(&name);

        if has("package.json") {
            RecipeKind::Node
        } else if has("requirements.txt") || has("pyproject.toml") {
            RecipeKind::Python
        } else if has("go.mod") {
            RecipeKind::Go
        } else if has("Cargo.toml") {
            RecipeKind::Rust
        } else if has("index.html") {
            RecipeKind::Static
        } else {
            RecipeKind::Generic
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecipeKind::Node => "node",
            RecipeKind::Python => "python",
            RecipeKind::Go => "go",
            RecipeKind::Rust => "rust",
            RecipeKind::Static => "static",
            RecipeKind::Generic => "generic",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            RecipeKind::Node => NODE,
            RecipeKind::Python => PYTHON,
            RecipeKind::Go => GO,
            RecipeKind::Rust => RUST,
            RecipeKind::Static => STATIC,
            RecipeKind::Generic => GENERIC,
        }
    }

    fn default_build(&self) -> Option<&'static str> {
        match self {
            RecipeKind::Go => Some("mkdir -p /out && go build -o /out/app ."),
            RecipeKind::Rust => Some(
                "cargo install --path . --root /tmp/build && mkdir -p /out && cp /tmp/build/bin/* /out/app",
            ),
            _ => None,
        }
    }

    fn default_start(&self) -> &'static str {
        match self {
            RecipeKind::Node => "npm start",
            RecipeKind::Python => "python app.py",
            RecipeKind::Go | RecipeKind::Rust => "/app/app",
            RecipeKind::Static => "nginx -g 'daemon off;'",
            RecipeKind::Generic => "./start.sh",
        }
    }

    pub fn render(&self, build: &BuildSpec, port: u16) -> EngineResult<String> {
        let build_command = build.build_command.as_deref().or(self.default_build());
        let start_command = build
            .start_command
            .as_deref()
            .unwrap_or(self.default_start());

        let mut env = Environment::new();
        env.add_template("Dockerfile", self.template())?;
        let tmpl = env.get_template("Dockerfile")?;
        let rendered = tmpl.render(minijinja::context! {
            build_command => build_command,
            start_command => start_command,
            port => port,
        })?;
        Ok(rendered)
    }
}
