//! Manifest parsing: declared dependencies and entry points.
//!
//! Malformed manifests yield empty facts with a debug log; a broken
//! `package.json` never fails the analysis.

use regex::Regex;
use serde_json::Value as Json;
use std::sync::LazyLock;
use tracing::debug;

use super::report::{Dependency, Ecosystem};

static PEP508_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(.*)$").expect("valid regex literal")
});

static SETUP_PY_REQUIRES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)install_requires\s*=\s*\[(.*?)\]").expect("valid regex literal")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("valid regex literal"));

static POM_DEPENDENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<dependency>(.*?)</dependency>").expect("valid regex literal")
});

static XML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(artifactId|version|scope)>\s*([^<]+?)\s*</").expect("valid regex literal")
});

/// Facts read from one manifest
#[derive(Debug, Default, PartialEq)]
pub struct ManifestFacts {
    pub dependencies: Vec<Dependency>,
    /// Root-relative paths the manifest declares as entry points
    pub declared_entries: Vec<String>,
    pub project_name: Option<String>,
}

/// Parse a manifest by file name. `path` is root-relative.
pub fn parse_manifest(path: &str, content: &str) -> ManifestFacts {
    let (dir, file_name) = match path.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", path),
    };

    let mut dependencies = Vec::new();
    let mut declared_entries = Vec::new();
    let mut project_name = None;
    let mut add = |ecosystem, name: &str, version: Option<&str>, dev: bool| {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        dependencies.push(Dependency {
            ecosystem,
            name: name.to_string(),
            version: version
                .map(str::trim)
                .filter(|v| !v.is_empty() && *v != "*")
                .map(str::to_string),
            dev,
            source: path.to_string(),
        });
    };

    match file_name {
        "package.json" => {
            let Ok(json) = serde_json::from_str::<Json>(content) else {
                debug!(path, "Unparseable package.json");
                return ManifestFacts::default();
            };
            project_name = json.get("name").and_then(Json::as_str).map(str::to_string);
            for (section, dev) in [("dependencies", false), ("devDependencies", true)] {
                if let Some(deps) = json.get(section).and_then(Json::as_object) {
                    for (name, version) in deps {
                        add(Ecosystem::Npm, name.as_str(), version.as_str(), dev);
                    }
                }
            }
            let mut entries = Vec::new();
            if let Some(main) = json.get("main").and_then(Json::as_str) {
                entries.push(main.to_string());
            }
            match json.get("bin") {
                Some(Json::String(bin)) => entries.push(bin.clone()),
                Some(Json::Object(bins)) => {
                    entries.extend(bins.values().filter_map(Json::as_str).map(str::to_string))
                }
                _ => {}
            }
            declared_entries = entries
                .iter()
                .filter_map(|e| join_relative(dir, e))
                .collect();
        }
        "requirements.txt" => {
            for line in content.lines() {
                let line = line.split('#').next().unwrap_or_default().trim();
                if line.is_empty() || line.starts_with('-') {
                    continue;
                }
                if let Some((name, version)) = pep508(line) {
                    add(Ecosystem::Pypi, &name, version.as_deref(), false);
                }
            }
        }
        "setup.py" => {
            if let Some(caps) = SETUP_PY_REQUIRES.captures(content) {
                for quoted in QUOTED.captures_iter(&caps[1]) {
                    if let Some((name, version)) = pep508(&quoted[1]) {
                        add(Ecosystem::Pypi, &name, version.as_deref(), false);
                    }
                }
            }
        }
        "Pipfile" => {
            let Some(table) = parse_toml(path, content) else {
                return ManifestFacts::default();
            };
            for (section, dev) in [("packages", false), ("dev-packages", true)] {
                for (name, spec) in toml_table(&table, &[section]) {
                    add(Ecosystem::Pypi, name.as_str(), toml_version(spec), dev);
                }
            }
        }
        "pyproject.toml" => {
            let Some(table) = parse_toml(path, content) else {
                return ManifestFacts::default();
            };
            project_name = toml_path(&table, &["project", "name"])
                .or_else(|| toml_path(&table, &["tool", "poetry", "name"]))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            // PEP 621
            if let Some(deps) =
                toml_path(&table, &["project", "dependencies"]).and_then(|v| v.as_array())
            {
                for (name, version) in deps.iter().filter_map(|d| d.as_str()).filter_map(pep508) {
                    add(Ecosystem::Pypi, &name, version.as_deref(), false);
                }
            }
            for (_, group) in toml_table(&table, &["project", "optional-dependencies"]) {
                for (name, version) in group
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|d| d.as_str())
                    .filter_map(pep508)
                {
                    add(Ecosystem::Pypi, &name, version.as_deref(), true);
                }
            }
            // Poetry
            for (name, spec) in toml_table(&table, &["tool", "poetry", "dependencies"]) {
                if name != "python" {
                    add(Ecosystem::Pypi, name.as_str(), toml_version(spec), false);
                }
            }
            for (name, spec) in toml_table(&table, &["tool", "poetry", "dev-dependencies"]) {
                add(Ecosystem::Pypi, name.as_str(), toml_version(spec), true);
            }
            for (_, group) in toml_table(&table, &["tool", "poetry", "group"]) {
                if let Some(deps) = group.get("dependencies").and_then(|d| d.as_table()) {
                    for (name, spec) in deps {
                        add(Ecosystem::Pypi, name.as_str(), toml_version(spec), true);
                    }
                }
            }
        }
        "Cargo.toml" => {
            let Some(table) = parse_toml(path, content) else {
                return ManifestFacts::default();
            };
            project_name = toml_path(&table, &["package", "name"])
                .and_then(|v| v.as_str())
                .map(str::to_string);
            for (section, dev) in [
                ("dependencies", false),
                ("dev-dependencies", true),
                ("build-dependencies", true),
            ] {
                for (name, spec) in toml_table(&table, &[section]) {
                    add(Ecosystem::Cargo, name.as_str(), toml_version(spec), dev);
                }
            }
            if let Some(bins) = table.get("bin").and_then(|b| b.as_array()) {
                declared_entries = bins
                    .iter()
                    .filter_map(|b| b.get("path").and_then(|p| p.as_str()))
                    .filter_map(|p| join_relative(dir, p))
                    .collect();
            }
        }
        "go.mod" => {
            let mut in_block = false;
            for line in content.lines() {
                let line = line.split("//").next().unwrap_or_default().trim();
                if line.starts_with("require (") {
                    in_block = true;
                    continue;
                }
                if in_block && line == ")" {
                    in_block = false;
                    continue;
                }
                let spec = if in_block {
                    line
                } else if let Some(rest) = line.strip_prefix("require ") {
                    rest.trim()
                } else {
                    continue;
                };
                let mut parts = spec.split_whitespace();
                if let Some(module) = parts.next() {
                    add(Ecosystem::Go, module, parts.next(), false);
                }
            }
        }
        "pom.xml" => {
            for block in POM_DEPENDENCY.captures_iter(content) {
                let (mut artifact, mut version, mut scope) = (None, None, None);
                for tag in XML_TAG.captures_iter(&block[1]) {
                    let value = tag.get(2).map(|m| m.as_str());
                    match &tag[1] {
                        "artifactId" => artifact = value,
                        "version" => version = value,
                        _ => scope = value,
                    }
                }
                if let Some(artifact) = artifact {
                    add(Ecosystem::Maven, artifact, version, scope == Some("test"));
                }
            }
        }
        "composer.json" => {
            let Ok(json) = serde_json::from_str::<Json>(content) else {
                debug!(path, "Unparseable composer.json");
                return ManifestFacts::default();
            };
            project_name = json.get("name").and_then(Json::as_str).map(str::to_string);
            for (section, dev) in [("require", false), ("require-dev", true)] {
                if let Some(deps) = json.get(section).and_then(Json::as_object) {
                    for (name, version) in deps {
                        if name == "php" || name.starts_with("ext-") {
                            continue;
                        }
                        add(Ecosystem::Composer, name.as_str(), version.as_str(), dev);
                    }
                }
            }
        }
        _ => {}
    }

    ManifestFacts {
        dependencies,
        declared_entries,
        project_name,
    }
}

/// `flask>=2.0 ; python_version > "3"` -> (`flask`, `>=2.0`)
fn pep508(spec: &str) -> Option<(String, Option<String>)> {
    let spec = spec.split(';').next().unwrap_or_default();
    let caps = PEP508_NAME.captures(spec)?;
    let name = caps[1].to_lowercase();
    let version = caps
        .get(2)
        .map(|m| m.as_str().trim().trim_start_matches("==").trim().to_string())
        .filter(|v| !v.is_empty());
    Some((name, version))
}

fn parse_toml(path: &str, content: &str) -> Option<toml::Table> {
    match content.parse::<toml::Table>() {
        Ok(table) => Some(table),
        Err(err) => {
            debug!(path, error = %err, "Unparseable TOML manifest");
            None
        }
    }
}

fn toml_path<'a>(table: &'a toml::Table, keys: &[&str]) -> Option<&'a toml::Value> {
    let (first, rest) = keys.split_first()?;
    let mut value = table.get(*first)?;
    for key in rest {
        value = value.get(*key)?;
    }
    Some(value)
}

fn toml_table<'a>(
    table: &'a toml::Table,
    keys: &[&str],
) -> impl Iterator<Item = (&'a String, &'a toml::Value)> + use<'a> {
    toml_path(table, keys)
        .and_then(|v| v.as_table())
        .into_iter()
        .flat_map(|t| t.iter())
}

/// Version from `"1.0"` or `{ version = "1.0", ... }`
fn toml_version(spec: &toml::Value) -> Option<&str> {
    spec.as_str()
        .or_else(|| spec.get("version").and_then(|v| v.as_str()))
}

/// Resolve `rel` against `dir`, both root-relative; `None` if it escapes the root
pub(crate) fn join_relative(dir: &str, rel: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in rel.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(facts: &ManifestFacts) -> Vec<(&str, bool)> {
        facts
            .dependencies
            .iter()
            .map(|d| (d.name.as_str(), d.dev))
            .collect()
    }

    #[test]
    fn test_package_json() {
        let content = r#"{
            "name": "web",
            "main": "./lib/index.js",
            "bin": {"web": "bin/cli.js"},
            "dependencies": {"react": "^18.0.0", "express": "4"},
            "devDependencies": {"jest": "29"}
        }"#;
        let facts = parse_manifest("web/package.json", content);
        assert_eq!(
            names(&facts),
            vec![("express", false), ("react", false), ("jest", true)]
        );
        assert_eq!(facts.dependencies[1].version.as_deref(), Some("^18.0.0"));
        assert_eq!(facts.declared_entries, vec!["web/lib/index.js", "web/bin/cli.js"]);
        assert_eq!(facts.project_name.as_deref(), Some("web"));
    }

    #[test]
    fn test_requirements_txt() {
        let content = "# web\nFlask==2.3.0\nrequests>=2\n-r base.txt\nuvicorn[standard] ; python_version>'3.8'\n\n";
        let facts = parse_manifest("requirements.txt", content);
        assert_eq!(
            names(&facts),
            vec![("flask", false), ("requests", false), ("uvicorn", false)]
        );
        assert_eq!(facts.dependencies[0].version.as_deref(), Some("2.3.0"));
        assert_eq!(facts.dependencies[1].version.as_deref(), Some(">=2"));
    }

    #[test]
    fn test_pyproject_pep621_and_poetry() {
        let content = r#"
[project]
name = "svc"
dependencies = ["fastapi>=0.100", "pydantic"]

[project.optional-dependencies]
test = ["pytest"]

[tool.poetry.dependencies]
python = "^3.11"
django = "4.2"
"#;
        let facts = parse_manifest("pyproject.toml", content);
        assert_eq!(
            names(&facts),
            vec![
                ("fastapi", false),
                ("pydantic", false),
                ("pytest", true),
                ("django", false)
            ]
        );
    }

    #[test]
    fn test_pipfile() {
        let content = "[packages]\nflask = \"*\"\n\n[dev-packages]\npytest = \">=7\"\n";
        let facts = parse_manifest("Pipfile", content);
        assert_eq!(names(&facts), vec![("flask", false), ("pytest", true)]);
        assert_eq!(facts.dependencies[0].version, None);
    }

    #[test]
    fn test_cargo_toml() {
        let content = r#"
[package]
name = "tool"

[[bin]]
name = "tool"
path = "src/bin/tool.rs"

[dependencies]
serde = { version = "1", features = ["derive"] }
axum = "0.7"

[dev-dependencies]
tempfile = "3"
"#;
        let facts = parse_manifest("Cargo.toml", content);
        assert_eq!(
            names(&facts),
            vec![("serde", false), ("axum", false), ("tempfile", true)]
        );
        assert_eq!(facts.dependencies[0].version.as_deref(), Some("1"));
        assert_eq!(facts.declared_entries, vec!["src/bin/tool.rs"]);
        assert_eq!(facts.project_name.as_deref(), Some("tool"));
    }

    #[test]
    fn test_go_mod() {
        let content = "module example.com/x\n\nrequire github.com/gin-gonic/gin v1.9.0\n\nrequire (\n\tgolang.org/x/text v0.3.0 // indirect\n)\n";
        let facts = parse_manifest("go.mod", content);
        assert_eq!(
            names(&facts),
            vec![("github.com/gin-gonic/gin", false), ("golang.org/x/text", false)]
        );
    }

    #[test]
    fn test_pom_xml() {
        let content = r#"<project><dependencies>
            <dependency><groupId>org.springframework.boot</groupId><artifactId>spring-boot-starter-web</artifactId></dependency>
            <dependency><artifactId>junit</artifactId><version>4.13</version><scope>test</scope></dependency>
        </dependencies></project>"#;
        let facts = parse_manifest("pom.xml", content);
        assert_eq!(
            names(&facts),
            vec![("spring-boot-starter-web", false), ("junit", true)]
        );
    }

    #[test]
    fn test_composer_json_and_setup_py() {
        let composer = r#"{"require": {"php": ">=8", "laravel/framework": "^10"}, "require-dev": {"phpunit/phpunit": "^10"}}"#;
        assert_eq!(
            names(&parse_manifest("composer.json", composer)),
            vec![("laravel/framework", false), ("phpunit/phpunit", true)]
        );

        let setup = "setup(name='x', install_requires=['flask>=2', \"click\"])";
        assert_eq!(
            names(&parse_manifest("setup.py", setup)),
            vec![("flask", false), ("click", false)]
        );
    }

    #[test]
    fn test_malformed_manifest_is_empty() {
        assert_eq!(parse_manifest("package.json", "{not json"), ManifestFacts::default());
        assert_eq!(parse_manifest("Cargo.toml", "[[["), ManifestFacts::default());
    }

    #[test]
    fn test_join_relative() {
        assert_eq!(join_relative("web", "./lib/index.js").as_deref(), Some("web/lib/index.js"));
        assert_eq!(join_relative("a/b", "../c.js").as_deref(), Some("a/c.js"));
        assert_eq!(join_relative("", "../escape.js"), None);
    }
}
