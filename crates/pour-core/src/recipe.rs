//! TOML recipe parsing
//!
//! A recipe names one package release and everything needed to install it:
//! where the tarball lives, which sibling packages it expects, which vendored
//! helper binaries must be replaced on which OS, and how to smoke-test it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use pour_schema::{Os, PackageName, Sha256Digest, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The recipe shipped with pour.
pub const HTTPYAC_RECIPE: &str = include_str!("../recipes/httpyac.toml");

/// Errors that can occur when loading or parsing a recipe.
#[derive(Error, Debug)]
pub enum RecipeError {
    /// An I/O error occurred while reading a recipe file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be deserialized into a valid recipe.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The recipe parsed but is not usable.
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl RecipeError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// What is fetched and installed. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: PackageName,
    pub version: Version,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
    /// SPDX license identifier
    #[serde(default)]
    pub license: String,
    /// Tarball location: `https://`, `file://` or a local path
    pub url: String,
    /// Expected SHA-256 digest of the tarball
    pub sha256: Sha256Digest,
}

/// Sibling packages the install expects to find already installed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependencies {
    /// Needed on every OS.
    #[serde(default)]
    pub runtime: Vec<String>,
    /// Extra dependencies keyed by OS name (`linux = ["xsel"]`).
    #[serde(flatten)]
    pub per_os: BTreeMap<String, Vec<String>>,
}

impl Dependencies {
    /// Every dependency that applies to `os`, runtime ones first.
    pub fn for_os(&self, os: &Os) -> Vec<&str> {
        self.runtime
            .iter()
            .chain(self.per_os.get(os.as_str()).into_iter().flatten())
            .map(String::as_str)
            .collect()
    }
}

/// A host-built replacement for a vendored helper binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperSpec {
    /// Sibling package that provides the binary.
    pub package: String,
    /// Executable name inside the sibling's `bin/`; also the link name.
    pub binary: String,
}

/// Where the vendored fallback binaries live and what replaces them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSpec {
    /// Path relative to the npm prefix. `{name}` expands to the package name.
    pub path: String,
    /// Helpers keyed by OS name. OSes without an entry keep an empty directory.
    #[serde(default)]
    pub helpers: BTreeMap<String, HelperSpec>,
}

impl FallbackSpec {
    /// The fallback path with `{name}` substituted.
    pub fn relative_path(&self, name: &PackageName) -> PathBuf {
        PathBuf::from(self.path.replace("{name}", name.as_str()))
    }

    pub fn helper_for(&self, os: &Os) -> Option<&HelperSpec> {
        self.helpers.get(os.as_str())
    }
}

/// Functional check run against the installed executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokeSpec {
    /// Request-block fixture written into the test directory.
    pub fixture: String,
    #[serde(default = "default_fixture_name")]
    pub fixture_name: String,
    /// Arguments passed to the executable.
    pub command: Vec<String>,
    /// Substrings that must all appear in stdout.
    #[serde(default)]
    pub expect: Vec<String>,
    /// Also check that `--version` prints the package version.
    #[serde(default = "default_true")]
    pub check_version: bool,
    /// Executable to run; defaults to the package name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
}

fn default_fixture_name() -> String {
    "test_cases".to_string()
}

fn default_true() -> bool {
    true
}

/// Complete recipe definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub package: PackageDescriptor,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallbacks: Option<FallbackSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<SmokeSpec>,
}

impl Recipe {
    /// Parse a recipe from a TOML file on disk.
    pub fn from_file(path: &Path) -> Result<Self, RecipeError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a recipe from a TOML string.
    pub fn parse(content: &str) -> Result<Self, RecipeError> {
        let recipe: Self = toml::from_str(content)?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Look up a recipe shipped with pour.
    pub fn builtin(name: &str) -> Option<Self> {
        match PackageName::new(name).as_str() {
            "httpyac" => Self::parse(HTTPYAC_RECIPE).ok(),
            _ => None,
        }
    }

    /// Names of the recipes shipped with pour.
    pub fn builtin_names() -> &'static [&'static str] {
        &["httpyac"]
    }

    pub fn validate(&self) -> Result<(), RecipeError> {
        let pkg = &self.package;
        if pkg.name.is_empty() {
            return Err(RecipeError::invalid("package.name", "must not be empty"));
        }
        if !pkg.version.is_semver() {
            return Err(RecipeError::invalid(
                "package.version",
                format!("'{}' is not a semantic version", pkg.version),
            ));
        }
        if pkg.url.is_empty() {
            return Err(RecipeError::invalid("package.url", "must not be empty"));
        }

        if let Some(fallbacks) = &self.fallbacks {
            let rel = fallbacks.relative_path(&pkg.name);
            let escapes = rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
            if rel.as_os_str().is_empty() || escapes {
                return Err(RecipeError::invalid(
                    "fallbacks.path",
                    format!("'{}' must be a plain relative path", fallbacks.path),
                ));
            }
            for (os, helper) in &fallbacks.helpers {
                if !Os::from(os.as_str()).is_supported() {
                    return Err(RecipeError::invalid(
                        "fallbacks.helpers",
                        format!("unknown OS '{os}'"),
                    ));
                }
                if helper.binary.contains('/') || helper.binary.is_empty() {
                    return Err(RecipeError::invalid(
                        "fallbacks.helpers",
                        format!("'{}' is not a bare executable name", helper.binary),
                    ));
                }
            }
        }

        if let Some(test) = &self.test {
            if test.command.is_empty() {
                return Err(RecipeError::invalid("test.command", "must not be empty"));
            }
        }

        Ok(())
    }

    /// Executable the smoke test invokes.
    pub fn test_executable(&self) -> String {
        self.test
            .as_ref()
            .and_then(|t| t.executable.clone())
            .unwrap_or_else(|| self.package.name.to_string())
    }

    /// Serialize this recipe to a pretty-printed TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl std::str::FromStr for Recipe {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[package]
name = "demo"
version = "1.0.0"
url = "file:///tmp/demo-1.0.0.tgz"
sha256 = "0000000000000000000000000000000000000000000000000000000000000000"
"#;

    #[test]
    fn test_builtin_httpyac() {
        let recipe = Recipe::builtin("httpyac").unwrap();
        assert_eq!(recipe.package.name, PackageName::from("httpyac"));
        assert_eq!(recipe.package.version, Version::from("6.3.4"));
        assert_eq!(recipe.package.license, "MIT");
        assert_eq!(
            recipe.package.sha256.as_str(),
            "76a5c10217722db90ab21d81c76f9f31c1507806c084f3b874f993fc623ff8ae"
        );

        let fallbacks = recipe.fallbacks.as_ref().unwrap();
        assert_eq!(
            fallbacks.relative_path(&recipe.package.name),
            PathBuf::from("lib/node_modules/httpyac/node_modules/clipboardy/fallbacks")
        );
        assert_eq!(
            fallbacks.helper_for(&Os::Linux),
            Some(&HelperSpec {
                package: "xsel".to_string(),
                binary: "xsel".to_string()
            })
        );
        assert!(fallbacks.helper_for(&Os::MacOs).is_none());

        let test = recipe.test.as_ref().unwrap();
        assert_eq!(test.command, vec!["send", "test_cases", "--all"]);
        assert!(test.expect.iter().any(|e| e == "\"name\": \"Europe\""));
        assert_eq!(recipe.test_executable(), "httpyac");
    }

    #[test]
    fn test_dependencies_for_os() {
        let recipe = Recipe::builtin("httpyac").unwrap();
        assert_eq!(recipe.dependencies.for_os(&Os::Linux), vec!["node", "xsel"]);
        assert_eq!(recipe.dependencies.for_os(&Os::MacOs), vec!["node"]);
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(Recipe::builtin("curl").is_none());
    }

    #[test]
    fn test_minimal_recipe_defaults() {
        let recipe = Recipe::parse(MINIMAL).unwrap();
        assert!(recipe.fallbacks.is_none());
        assert!(recipe.test.is_none());
        assert!(recipe.dependencies.runtime.is_empty());
    }

    #[test]
    fn test_rejects_non_semver_version() {
        let bad = MINIMAL.replace("1.0.0\"", "latest\"");
        let err = Recipe::parse(&bad).unwrap_err();
        assert!(err.to_string().contains("package.version"));
    }

    #[test]
    fn test_rejects_bad_digest() {
        let bad = MINIMAL.replace(&"0".repeat(64), "abc");
        assert!(matches!(Recipe::parse(&bad), Err(RecipeError::Parse(_))));
    }

    #[test]
    fn test_rejects_escaping_fallback_path() {
        let bad = format!("{MINIMAL}\n[fallbacks]\npath = \"../outside\"\n");
        let err = Recipe::parse(&bad).unwrap_err();
        assert!(err.to_string().contains("fallbacks.path"));
    }

    #[test]
    fn test_rejects_helper_for_unknown_os() {
        let bad = format!(
            "{MINIMAL}\n[fallbacks]\npath = \"fb\"\n[fallbacks.helpers.plan9]\npackage = \"x\"\nbinary = \"x\"\n"
        );
        assert!(Recipe::parse(&bad).is_err());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let recipe = Recipe::builtin("httpyac").unwrap();
        let toml = recipe.to_toml().unwrap();
        let again = Recipe::parse(&toml).unwrap();
        assert_eq!(again.package.url, recipe.package.url);
    }
}
