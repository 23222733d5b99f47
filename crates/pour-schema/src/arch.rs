//! CPU architectures and their Mach-O encodings.

/// CPU architecture of the host or of a binary slice.
///
/// The architecture is used to pick the one slice worth keeping out of a
/// universal (fat) Mach-O binary. Values map to the Mach-O `cputype` field.
///
/// # Example
///
/// ```
/// use pour_schema::Arch;
///
/// let current = Arch::current();
/// println!("Running on: {}", current);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// ARM64 (Apple Silicon, aarch64 Linux)
    Arm64,
    /// `x86_64`
    #[serde(rename = "x86_64")]
    X86_64,
    /// 32-bit ARM
    Arm,
    /// 32-bit x86
    I386,
    /// Any architecture without a Mach-O CPU type
    Other,
}

/// Flag or-ed into a Mach-O CPU type for 64-bit ABIs.
const CPU_ARCH_ABI64: u32 = 0x0100_0000;
const CPU_TYPE_X86: u32 = 7;
const CPU_TYPE_ARM: u32 = 12;

impl Arch {
    /// Get the architecture this binary was compiled for.
    pub fn current() -> Self {
        std::env::consts::ARCH.parse().unwrap_or(Self::Other)
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
            Self::Arm => "arm",
            Self::I386 => "i386",
            Self::Other => "other",
        }
    }

    /// Mach-O `cputype` for this architecture, if it has one.
    pub fn macho_cpu_type(&self) -> Option<u32> {
        match self {
            Self::Arm64 => Some(CPU_TYPE_ARM | CPU_ARCH_ABI64),
            Self::X86_64 => Some(CPU_TYPE_X86 | CPU_ARCH_ABI64),
            Self::Arm => Some(CPU_TYPE_ARM),
            Self::I386 => Some(CPU_TYPE_X86),
            Self::Other => None,
        }
    }

    /// The generic ("ALL") Mach-O `cpusubtype` for this architecture.
    ///
    /// When a fat binary carries several slices of the same CPU type
    /// (`arm64` and `arm64e`, `x86_64` and `x86_64h`) the generic one is kept.
    pub fn macho_generic_subtype(&self) -> Option<u32> {
        match self {
            Self::Arm64 | Self::Arm => Some(0),
            Self::X86_64 | Self::I386 => Some(3),
            Self::Other => None,
        }
    }

    /// Map a Mach-O `cputype` back to an architecture.
    pub fn from_macho_cpu_type(cpu_type: u32) -> Self {
        match cpu_type {
            t if t == CPU_TYPE_ARM | CPU_ARCH_ABI64 => Self::Arm64,
            t if t == CPU_TYPE_X86 | CPU_ARCH_ABI64 => Self::X86_64,
            CPU_TYPE_ARM => Self::Arm,
            CPU_TYPE_X86 => Self::I386,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
            "arm" | "armv7" => Ok(Self::Arm),
            "i386" | "i686" | "x86" => Ok(Self::I386),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_type_round_trip() {
        for arch in [Arch::Arm64, Arch::X86_64, Arch::Arm, Arch::I386] {
            let cpu = arch.macho_cpu_type().unwrap();
            assert_eq!(Arch::from_macho_cpu_type(cpu), arch);
        }
        assert_eq!(Arch::from_macho_cpu_type(18), Arch::Other);
    }

    #[test]
    fn test_known_cpu_type_values() {
        assert_eq!(Arch::Arm64.macho_cpu_type(), Some(0x0100_000c));
        assert_eq!(Arch::X86_64.macho_cpu_type(), Some(0x0100_0007));
        assert_eq!(Arch::Other.macho_cpu_type(), None);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("aarch64".parse::<Arch>(), Ok(Arch::Arm64));
        assert_eq!("AMD64".parse::<Arch>(), Ok(Arch::X86_64));
        assert!("riscv64".parse::<Arch>().is_err());
    }
}
