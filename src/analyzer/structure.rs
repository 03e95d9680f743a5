//! Structural Inference
//!
//! Deterministic facts derived from paths and file contents: imports,
//! public names, entry points, component grouping and API surface.
//! Everything here iterates the snapshot in path order and collects into
//! ordered containers, so the same snapshot always yields the same facts.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::debug;

use super::manifest::join_relative;
use super::report::{ComponentInfo, EntryPoint, EntryPointReason};
use super::scanner::{FileRecord, Language, RepositorySnapshot, RoleTag};
use crate::constants::analysis::{ENTRY_POINT_MAX_DEPTH, MAX_SURFACE_ITEMS, SOURCE_READ_BYTES};

// =============================================================================
// Per-file Facts
// =============================================================================

/// Something a source file imports
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Import {
    /// Top-level package or module name (`flask`, `react`, `@scope/pkg`)
    Module(String),
    /// Relative import resolved to a root-relative path without extension
    Path(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFacts {
    pub imports: BTreeSet<Import>,
    /// Public names in declaration order
    pub surface: Vec<String>,
    /// Runs as a program on its own
    pub main_guard: bool,
}

static PY_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:from\s+(\.*)([\w.]*)\s+import|import\s+([\w.]+))").expect("valid regex literal")
});
static PY_SURFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:async\s+)?(?:def|class)\s+([A-Za-z]\w*)").expect("valid regex literal")
});
static PY_MAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^if\s+__name__\s*==\s*['"]__main__['"]"#).expect("valid regex literal")
});

static JS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:\bfrom\s+|\bimport\s+|\brequire\s*\(\s*)['"]([^'"]+)['"]"#).expect("valid regex literal")
});
static JS_SURFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^export\s+(?:default\s+)?(?:async\s+)?(?:function\*?|class|const|let|interface|type|enum)\s+([A-Za-z_$][\w$]*)")
        .expect("valid regex literal")
});

static RUST_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:use\s+(?:crate::)?(\w+)|mod\s+(\w+)\s*;)").expect("valid regex literal")
});
static RUST_SURFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^pub\s+(?:async\s+)?(?:fn|struct|enum|trait|type|const|static)\s+(\w+)").expect("valid regex literal")
});
static RUST_MAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:async\s+)?fn\s+main\s*\(").expect("valid regex literal"));

static GO_IMPORT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^import\s+(?:\w+\s+)?"([^"]+)""#).expect("valid regex literal")
});
static GO_IMPORT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)import\s*\((.*?)\)").expect("valid regex literal"));
static GO_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid regex literal"));
static GO_SURFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:func\s+(?:\([^)]*\)\s*)?|type\s+)([A-Z]\w*)").expect("valid regex literal")
});
static GO_MAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*(?://[^\n]*\n\s*)*package\s+main\b.*\nfunc\s+main\s*\(").expect("valid regex literal")
});

static JVM_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^import\s+(?:static\s+)?([\w.]+)").expect("valid regex literal"));
static JVM_SURFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*public\s+(?:(?:final|abstract|static|sealed)\s+)*(?:class|interface|enum|record)\s+(\w+)")
        .expect("valid regex literal")
});

static RUBY_SURFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:class|module|def)\s+([A-Za-z]\w*)").expect("valid regex literal")
});

/// Extract imports, public names and main-guard from one file's text
pub fn file_facts(record: &FileRecord, content: &str) -> FileFacts {
    let mut facts = FileFacts::default();
    let dir = record.dir();

    match record.language_guess {
        Language::Python => {
            for caps in PY_IMPORT.captures_iter(content) {
                let dots = caps.get(1).map_or(0, |m| m.as_str().len());
                let module = caps.get(2).or(caps.get(3)).map_or("", |m| m.as_str());
                if dots > 0 {
                    let mut rel = "../".repeat(dots - 1);
                    rel.push_str(&module.replace('.', "/"));
                    if let Some(path) = join_relative(dir, &rel) {
                        facts.imports.insert(Import::Path(path));
                    }
                } else if let Some(top) = module.split('.').next().filter(|t| !t.is_empty()) {
                    facts.imports.insert(Import::Module(top.to_string()));
                }
            }
            facts.surface = captures(&PY_SURFACE, content);
            facts.main_guard = PY_MAIN.is_match(content);
        }
        Language::JavaScript | Language::TypeScript | Language::Vue | Language::Svelte => {
            for caps in JS_IMPORT.captures_iter(content) {
                let spec = &caps[1];
                if spec.starts_with('.') {
                    if let Some(path) = join_relative(dir, strip_extension(spec)) {
                        facts.imports.insert(Import::Path(path));
                    }
                } else {
                    let mut parts = spec.split('/');
                    let first = parts.next().unwrap_or_default();
                    let name = match (first.starts_with('@'), parts.next()) {
                        (true, Some(second)) => format!("{first}/{second}"),
                        _ => first.to_string(),
                    };
                    facts.imports.insert(Import::Module(name));
                }
            }
            facts.surface = captures(&JS_SURFACE, content);
        }
        Language::Rust => {
            for caps in RUST_IMPORT.captures_iter(content) {
                if let Some(m) = caps.get(1) {
                    facts.imports.insert(Import::Module(m.as_str().to_string()));
                } else if let Some(m) = caps.get(2)
                    && let Some(path) = join_relative(dir, m.as_str())
                {
                    facts.imports.insert(Import::Path(path));
                }
            }
            facts.surface = captures(&RUST_SURFACE, content);
            facts.main_guard = RUST_MAIN.is_match(content);
        }
        Language::Go => {
            for caps in GO_IMPORT_LINE.captures_iter(content) {
                facts.imports.insert(Import::Module(caps[1].to_string()));
            }
            for block in GO_IMPORT_BLOCK.captures_iter(content) {
                for caps in GO_QUOTED.captures_iter(&block[1]) {
                    facts.imports.insert(Import::Module(caps[1].to_string()));
                }
            }
            facts.surface = captures(&GO_SURFACE, content);
            facts.main_guard = GO_MAIN.is_match(content);
        }
        Language::Java | Language::Kotlin | Language::Scala => {
            for caps in JVM_IMPORT.captures_iter(content) {
                facts.imports.insert(Import::Module(caps[1].to_string()));
            }
            facts.surface = captures(&JVM_SURFACE, content);
        }
        Language::Ruby => {
            facts.surface = captures(&RUBY_SURFACE, content);
        }
        _ => {}
    }

    facts
}

fn captures(re: &Regex, content: &str) -> Vec<String> {
    re.captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn strip_extension(spec: &str) -> &str {
    match spec.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') && !stem.is_empty() && !stem.ends_with('.') => stem,
        _ => spec,
    }
}

/// Read and index every source file, in path order
pub fn index_sources(snapshot: &RepositorySnapshot, max_content_bytes: u64) -> BTreeMap<String, FileFacts> {
    let mut index = BTreeMap::new();
    for record in snapshot.files.iter().filter(|f| f.role_tag == RoleTag::Source) {
        match snapshot.read_text(&record.path, max_content_bytes, SOURCE_READ_BYTES) {
            Ok(Some(content)) => {
                index.insert(record.path.clone(), file_facts(record, &content));
            }
            Ok(None) => {}
            Err(err) => debug!(path = %record.path, error = %err, "Source file unreadable"),
        }
    }
    index
}

/// Top-level module names imported anywhere, for framework detection
pub fn imported_modules(index: &BTreeMap<String, FileFacts>) -> BTreeSet<String> {
    index
        .values()
        .flat_map(|f| f.imports.iter())
        .filter_map(|i| match i {
            Import::Module(name) => Some(name.clone()),
            Import::Path(_) => None,
        })
        .collect()
}

// =============================================================================
// Entry Points
// =============================================================================

const ENTRY_NAMES: &[&str] = &[
    "main.py", "app.py", "__main__.py", "manage.py", "wsgi.py", "asgi.py",
    "index.js", "index.ts", "server.js", "server.ts", "app.js", "app.ts", "main.js", "main.ts",
    "main.rs", "main.go", "Main.java", "Main.kt", "Program.cs", "main.c", "main.cpp",
];

/// Entry points ordered by depth, then path
pub fn find_entry_points(
    snapshot: &RepositorySnapshot,
    declared: &[String],
    index: &BTreeMap<String, FileFacts>,
) -> Vec<EntryPoint> {
    let mut found: BTreeMap<&str, EntryPointReason> = BTreeMap::new();

    for record in snapshot.with_role(RoleTag::Source) {
        let depth = record.path.matches('/').count();
        if depth <= ENTRY_POINT_MAX_DEPTH && ENTRY_NAMES.contains(&record.file_name()) {
            found.entry(&record.path).or_insert(EntryPointReason::NamingConvention);
        }
    }

    for path in declared {
        // declared paths may omit the extension (`"main": "lib/index"`)
        let resolved = snapshot
            .get(path)
            .or_else(|| ["js", "ts", "mjs", "cjs"].iter().find_map(|ext| snapshot.get(&format!("{path}.{ext}"))));
        if let Some(record) = resolved {
            found.entry(&record.path).or_insert(EntryPointReason::Manifest);
        }
    }

    for (path, facts) in index {
        if facts.main_guard
            && let Some(record) = snapshot.get(path)
        {
            found.entry(&record.path).or_insert(EntryPointReason::MainGuard);
        }
    }

    let mut entries: Vec<EntryPoint> = found
        .into_iter()
        .map(|(path, reason)| EntryPoint {
            path: path.to_string(),
            reason,
        })
        .collect();
    sort_entry_points(&mut entries);
    entries
}

pub fn sort_entry_points(entries: &mut [EntryPoint]) {
    entries.sort_by(|a, b| {
        let depth = |p: &str| p.matches('/').count();
        depth(&a.path).cmp(&depth(&b.path)).then_with(|| a.path.cmp(&b.path))
    });
}

// =============================================================================
// Components
// =============================================================================

const MODULE_INDICATORS: &[&str] = &[
    "src", "lib", "app", "apps", "packages", "pkg", "internal", "cmd", "components", "modules",
    "services", "controllers", "models", "views", "util", "utils", "helpers", "api",
];

/// Component a source file belongs to, from its directory path
pub fn component_name(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    let dirs = &parts[..parts.len().saturating_sub(1)];

    for (i, part) in dirs.iter().enumerate() {
        if MODULE_INDICATORS.contains(&part.to_lowercase().as_str()) {
            return match dirs.get(i + 1) {
                Some(sub) => sub.to_string(),
                None => part.to_string(),
            };
        }
    }

    dirs.first().map_or_else(|| "root".to_string(), |d| d.to_string())
}

/// Purpose inferred from a component's name alone
pub fn default_purpose(name: &str) -> Option<&'static str> {
    let purpose = match name.to_lowercase().as_str() {
        "api" | "apis" | "routes" | "routers" | "controllers" | "handlers" | "endpoints" => {
            "HTTP request handling and routing"
        }
        "models" | "entities" | "schemas" | "schema" | "domain" => "Data models and schemas",
        "services" | "service" => "Business logic services",
        "util" | "utils" | "helpers" | "common" | "shared" => "Shared helper utilities",
        "components" | "ui" | "views" | "pages" | "templates" | "widgets" => {
            "User interface components"
        }
        "cli" | "cmd" | "bin" | "commands" => "Command-line entry points",
        "config" | "settings" | "conf" => "Configuration loading",
        "db" | "database" | "storage" | "repositories" | "migrations" | "store" => {
            "Data persistence"
        }
        "core" | "engine" => "Core domain logic",
        "auth" | "security" => "Authentication and authorization",
        "middleware" | "middlewares" => "Request middleware",
        "src" | "lib" | "app" | "root" => "Main application code",
        _ => return None,
    };
    Some(purpose)
}

/// Group source files into components and fill in surface and dependencies
pub fn build_components(
    snapshot: &RepositorySnapshot,
    index: &BTreeMap<String, FileFacts>,
) -> BTreeMap<String, ComponentInfo> {
    let mut components: BTreeMap<String, ComponentInfo> = BTreeMap::new();
    for record in snapshot.with_role(RoleTag::Source) {
        components
            .entry(component_name(&record.path))
            .or_default()
            .file_refs
            .push(record.path.clone());
    }

    let owner: BTreeMap<&str, &str> = components
        .iter()
        .flat_map(|(name, info)| info.file_refs.iter().map(move |p| (p.as_str(), name.as_str())))
        .collect();

    let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (name, info) in &components {
        let mut depends_on = BTreeSet::new();
        for facts in info.file_refs.iter().filter_map(|p| index.get(p)) {
            for import in &facts.imports {
                let target = match import {
                    Import::Module(module) => components
                        .contains_key(module.as_str())
                        .then_some(module.as_str()),
                    Import::Path(path) => resolve_owner(&owner, path),
                };
                if let Some(target) = target
                    && target != name
                {
                    depends_on.insert(target.to_string());
                }
            }
        }
        edges.insert(name.clone(), depends_on);
    }

    for (name, info) in components.iter_mut() {
        info.purpose = default_purpose(name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Code in `{name}`"));

        let mut seen = BTreeSet::new();
        info.public_surface = info
            .file_refs
            .iter()
            .filter_map(|p| index.get(p))
            .flat_map(|f| f.surface.iter())
            .filter(|s| seen.insert(s.as_str()))
            .take(MAX_SURFACE_ITEMS)
            .cloned()
            .collect();
        info.depends_on = edges.remove(name).unwrap_or_default();
    }

    components
}

/// Component owning the file an extensionless import path points to
fn resolve_owner<'a>(owner: &BTreeMap<&'a str, &'a str>, import_path: &str) -> Option<&'a str> {
    let package_prefix = format!("{import_path}/");
    owner.iter().find_map(|(file, component)| {
        let stem = strip_extension(file);
        (stem == import_path || file.starts_with(&package_prefix)).then_some(*component)
    })
}

// =============================================================================
// API Surface
// =============================================================================

const API_DIRS: &[&str] = &[
    "api", "apis", "routes", "routers", "controllers", "endpoints", "handlers",
];
const API_STEMS: &[&str] = &[
    "routes", "router", "urls", "views", "controller", "controllers", "endpoints", "handlers", "api",
];

/// Source files that look like HTTP routes or handlers
pub fn find_api_files(snapshot: &RepositorySnapshot) -> Vec<String> {
    snapshot
        .with_role(RoleTag::Source)
        .filter(|record| {
            let in_api_dir = record
                .dir()
                .split('/')
                .any(|d| API_DIRS.contains(&d.to_lowercase().as_str()));
            let stem = record.file_name().split('.').next().unwrap_or_default().to_lowercase();
            in_api_dir
                || API_STEMS.contains(&stem.as_str())
                || stem.ends_with("_controller")
                || stem.ends_with("controller")
                || stem.ends_with("_routes")
                || stem.ends_with("_handler")
        })
        .map(|r| r.path.clone())
        .collect()
}
