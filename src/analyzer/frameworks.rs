//! Framework detection from dependency names, marker files and imports.

use std::collections::{BTreeMap, BTreeSet};

use super::report::{Dependency, FrameworkCategory};
use super::scanner::RepositorySnapshot;

struct Indicator {
    name: &'static str,
    category: FrameworkCategory,
    /// Exact dependency names, or prefixes ending in `/`
    dependencies: &'static [&'static str],
    /// File names or root-relative path prefixes
    files: &'static [&'static str],
    /// Top-level module names seen in imports
    imports: &'static [&'static str],
}

macro_rules! indicator {
    ($name:literal, $cat:ident, deps: [$($d:literal),*], files: [$($f:literal),*], imports: [$($i:literal),*]) => {
        Indicator {
            name: $name,
            category: FrameworkCategory::$cat,
            dependencies: &[$($d),*],
            files: &[$($f),*],
            imports: &[$($i),*],
        }
    };
}

const INDICATORS: &[Indicator] = &[
    // Frontend
    indicator!("react", Frontend, deps: ["react", "react-dom"], files: [], imports: ["react"]),
    indicator!("vue", Frontend, deps: ["vue"], files: ["vue.config.js"], imports: ["vue"]),
    indicator!("angular", Frontend, deps: ["@angular/core", "@angular/"], files: ["angular.json"], imports: []),
    indicator!("svelte", Frontend, deps: ["svelte"], files: ["svelte.config.js"], imports: []),
    indicator!("nextjs", Frontend, deps: ["next"], files: ["next.config.js", "next.config.mjs"], imports: []),
    indicator!("tailwind", Frontend, deps: ["tailwindcss"], files: ["tailwind.config.js"], imports: []),
    // Backend
    indicator!("express", Backend, deps: ["express"], files: [], imports: ["express"]),
    indicator!("nestjs", Backend, deps: ["@nestjs/core", "@nestjs/"], files: ["nest-cli.json"], imports: []),
    indicator!("django", Backend, deps: ["django"], files: ["manage.py"], imports: ["django"]),
    indicator!("flask", Backend, deps: ["flask"], files: [], imports: ["flask"]),
    indicator!("fastapi", Backend, deps: ["fastapi", "starlette"], files: [], imports: ["fastapi"]),
    indicator!("spring", Backend, deps: ["spring-boot-starter", "spring-boot-starter-web", "spring-core"], files: [], imports: []),
    indicator!("laravel", Backend, deps: ["laravel/framework"], files: ["artisan"], imports: []),
    indicator!("rails", Backend, deps: ["rails"], files: ["config/routes.rb"], imports: []),
    indicator!("actix", Backend, deps: ["actix-web"], files: [], imports: ["actix_web"]),
    indicator!("axum", Backend, deps: ["axum"], files: [], imports: ["axum"]),
    indicator!("gin", Backend, deps: ["github.com/gin-gonic/gin"], files: [], imports: []),
    // Database
    indicator!("postgresql", Database, deps: ["pg", "psycopg2", "psycopg2-binary", "psycopg", "asyncpg", "postgres"], files: [], imports: ["psycopg2"]),
    indicator!("mongodb", Database, deps: ["mongodb", "mongoose", "pymongo"], files: [], imports: ["pymongo"]),
    indicator!("mysql", Database, deps: ["mysql", "mysql2", "mysqlclient"], files: [], imports: []),
    indicator!("redis", Database, deps: ["redis", "ioredis"], files: [], imports: ["redis"]),
    indicator!("sqlalchemy", Database, deps: ["sqlalchemy"], files: ["alembic.ini"], imports: ["sqlalchemy"]),
    indicator!("prisma", Database, deps: ["prisma", "@prisma/client"], files: ["prisma/schema.prisma"], imports: []),
    // Testing
    indicator!("jest", Testing, deps: ["jest"], files: ["jest.config.js", "jest.config.ts"], imports: []),
    indicator!("mocha", Testing, deps: ["mocha"], files: [".mocharc.json"], imports: []),
    indicator!("pytest", Testing, deps: ["pytest"], files: ["pytest.ini", "conftest.py"], imports: ["pytest"]),
    indicator!("cypress", Testing, deps: ["cypress"], files: ["cypress.config.js", "cypress.config.ts"], imports: []),
    // Tooling
    indicator!("typescript", Tooling, deps: ["typescript"], files: ["tsconfig.json"], imports: []),
    indicator!("webpack", Tooling, deps: ["webpack"], files: ["webpack.config.js"], imports: []),
    indicator!("vite", Tooling, deps: ["vite"], files: ["vite.config.js", "vite.config.ts"], imports: []),
    indicator!("docker", Tooling, deps: [], files: ["Dockerfile", "docker-compose.yml", "docker-compose.yaml", "compose.yaml"], imports: []),
    indicator!("github-actions", Tooling, deps: [], files: [".github/workflows/"], imports: []),
    indicator!("terraform", Tooling, deps: [], files: ["main.tf"], imports: []),
];

/// Detected frameworks grouped by category
/// Category of a known framework name
pub fn category_of(name: &str) -> Option<FrameworkCategory> {
    INDICATORS
        .iter()
        .find(|indicator| indicator.name == name)
        .map(|indicator| indicator.category)
}

pub fn detect(
    snapshot: &RepositorySnapshot,
    dependencies: &[Dependency],
    imports: &BTreeSet<String>,
) -> BTreeMap<FrameworkCategory, BTreeSet<String>> {
    let dep_names: BTreeSet<&str> = dependencies.iter().map(|d| d.name.as_str()).collect();
    let mut found: BTreeMap<FrameworkCategory, BTreeSet<String>> = BTreeMap::new();

    for indicator in INDICATORS {
        let by_dependency = indicator.dependencies.iter().any(|pattern| {
            if pattern.ends_with('/') {
                dep_names.iter().any(|d| d.starts_with(pattern))
            } else {
                dep_names.contains(pattern)
            }
        });
        let by_file = || {
            indicator.files.iter().any(|marker| {
                snapshot.files.iter().any(|f| {
                    if marker.ends_with('/') || marker.contains('/') {
                        f.path.starts_with(marker)
                    } else {
                        f.file_name() == *marker
                    }
                })
            })
        };
        let by_import = || indicator.imports.iter().any(|i| imports.contains(*i));

        if by_dependency || by_file() || by_import() {
            found
                .entry(indicator.category)
                .or_default()
                .insert(indicator.name.to_string());
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::report::Ecosystem;
    use crate::analyzer::scanner::{FileRecord, Language, RoleTag};
    use std::path::{Path, PathBuf};

    fn snapshot(paths: &[&str]) -> RepositorySnapshot {
        let files = paths
            .iter()
            .map(|p| {
                let language_guess = Language::from_path(p);
                FileRecord {
                    path: p.to_string(),
                    size: 1,
                    language_guess,
                    role_tag: RoleTag::classify(Path::new(p), language_guess),
                }
            })
            .collect();
        RepositorySnapshot::new(PathBuf::from("/r"), files, vec![])
    }

    fn dep(name: &str) -> Dependency {
        Dependency {
            ecosystem: Ecosystem::Npm,
            name: name.into(),
            version: None,
            dev: false,
            source: "package.json".into(),
        }
    }

    #[test]
    fn test_detect_from_dependencies() {
        let found = detect(
            &snapshot(&["package.json"]),
            &[dep("react"), dep("express"), dep("@angular/router")],
            &BTreeSet::new(),
        );
        assert!(found[&FrameworkCategory::Frontend].contains("react"));
        assert!(found[&FrameworkCategory::Frontend].contains("angular"));
        assert!(found[&FrameworkCategory::Backend].contains("express"));
    }

    #[test]
    fn test_detect_from_files() {
        let found = detect(
            &snapshot(&["Dockerfile", "tsconfig.json", ".github/workflows/ci.yml", "manage.py"]),
            &[],
            &BTreeSet::new(),
        );
        let tooling = &found[&FrameworkCategory::Tooling];
        assert!(tooling.contains("docker"));
        assert!(tooling.contains("typescript"));
        assert!(tooling.contains("github-actions"));
        assert!(found[&FrameworkCategory::Backend].contains("django"));
    }

    #[test]
    fn test_detect_from_imports() {
        let imports: BTreeSet<String> = ["fastapi".to_string()].into_iter().collect();
        let found = detect(&snapshot(&["app/main.py"]), &[], &imports);
        assert_eq!(
            found.get(&FrameworkCategory::Backend).map(|s| s.len()),
            Some(1)
        );
    }

    #[test]
    fn test_nothing_detected() {
        assert!(detect(&snapshot(&["src/util.py"]), &[], &BTreeSet::new()).is_empty());
    }
}
