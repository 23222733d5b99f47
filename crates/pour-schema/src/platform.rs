//! Host platform descriptor.

use crate::arch::Arch;
use serde::{Deserialize, Serialize};

/// Operating system family of the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Os {
    /// Linux and Linux-like hosts
    Linux,
    /// macOS
    MacOs,
    /// Windows
    Windows,
    /// Anything else, kept verbatim (e.g. `freebsd`)
    Other(String),
}

impl Os {
    /// Get the operating system this binary was compiled for.
    pub fn current() -> Self {
        Self::from(std::env::consts::OS)
    }

    /// Lowercase name, matching `std::env::consts::OS`.
    ///
    /// This is also the name of the per-OS subdirectory vendored fallback
    /// trees use (`fallbacks/linux`, `fallbacks/windows`, ...).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Other(name) => name,
        }
    }

    /// Whether pour knows how packages behave on this OS.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for Os {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "linux" => Self::Linux,
            "macos" | "darwin" | "osx" => Self::MacOs,
            "windows" | "win32" => Self::Windows,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Os {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Os> for String {
    fn from(os: Os) -> Self {
        os.as_str().to_string()
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `{operating system, architecture}` pair describing the machine
/// performing the install. Read-only once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPlatform {
    /// Operating system family
    pub os: Os,
    /// Native CPU architecture
    pub arch: Arch,
}

impl HostPlatform {
    /// Build a descriptor from explicit values.
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Describe the running host.
    pub fn detect() -> Self {
        Self::new(Os::current(), Arch::current())
    }
}

impl std::fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_parsing() {
        assert_eq!(Os::from("Linux"), Os::Linux);
        assert_eq!(Os::from("darwin"), Os::MacOs);
        assert_eq!(Os::from("freebsd"), Os::Other("freebsd".to_string()));
        assert!(!Os::from("freebsd").is_supported());
        assert!(Os::Windows.is_supported());
    }

    #[test]
    fn test_host_display() {
        let host = HostPlatform::new(Os::Linux, Arch::X86_64);
        assert_eq!(host.to_string(), "linux-x86_64");
    }

    #[test]
    fn test_host_serde_round_trip_uses_plain_names() {
        let host = HostPlatform::new(Os::MacOs, Arch::Arm64);
        let json = serde_json::to_string(&host).unwrap();
        assert_eq!(json, r#"{"os":"macos","arch":"arm64"}"#);
    }
}
