//! Release identifier parsing
//!
//! Release directories are named
//! `<version>_<Feature1>_..._<FeatureN>[Net6]_Softkey_<Engine>_ENU`. The
//! version and the known feature tokens become the image tag
//! `<short_name>:<version>`.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Marker appended to feature tokens of releases built for the core runtime
const RUNTIME_MARKER: &str = "Net6";

/// Feature token to short code
const FEATURE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("SalesEnterprise", "se"),
    ("ServiceEnterprise", "se"),
    ("Marketing", "m"),
    ("Studio", "studio"),
    ("BankSales", "bs"),
    ("BankCustomerJourney", "bcj"),
    ("Lending", "l"),
];

/// Four component product version, `Major.Minor.Build.Revision`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl ProductVersion {
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self { major, minor, build, revision }
    }
}

impl std::str::FromStr for ProductVersion {
    type Err = String;

    /// Accepts two to four dot separated non-negative integers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if !(2..=4).contains(&parts.len()) {
            return Err(format!("Invalid version: {}", s));
        }

        let mut numbers = [0u32; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u32>()
                .map_err(|_| format!("Invalid version component '{}' in {}", part, s))?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2], numbers[3]))
    }
}

impl std::fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
    }
}

/// Identity of a release used to name images
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactTag {
    pub short_name: String,

    /// `None` only for lookups that should match any version
    pub version: Option<ProductVersion>,
}

impl ArtifactTag {
    /// Parse a release identifier. Never fails: an unreadable version becomes `0.0.0.0`.
    pub fn parse(identifier: &str) -> Self {
        let mut tokens = identifier.split('_');

        let version = tokens
            .next()
            .and_then(|first| first.parse::<ProductVersion>().ok())
            .unwrap_or_default();

        let short_name = tokens
            .filter_map(|token| abbreviate(&token.replace(RUNTIME_MARKER, "")))
            .collect::<Vec<_>>()
            .join("_");

        Self {
            short_name,
            version: Some(version),
        }
    }

    /// Parse the final component of `path`, ignoring a `.zip` extension
    pub fn from_path(path: &Path) -> Self {
        let identifier = match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("zip") => path.file_stem(),
            _ => path.file_name(),
        };
        let identifier = identifier
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::parse(&identifier)
    }

    /// Reference used to look up existing images; `*` stands for an absent version
    pub fn reference_filter(&self) -> String {
        match &self.version {
            Some(version) => format!("{}:{}", self.short_name, version),
            None => format!("{}:*", self.short_name),
        }
    }

    /// Tag given to a newly built image. `None` when the version is absent.
    pub fn image_tag(&self) -> Option<String> {
        self.version
            .as_ref()
            .map(|version| format!("{}:{}", self.short_name, version))
    }
}

impl std::fmt::Display for ArtifactTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reference_filter())
    }
}

fn abbreviate(token: &str) -> Option<&'static str> {
    if token.is_empty() {
        return None;
    }
    FEATURE_ABBREVIATIONS
        .iter()
        .find(|(feature, _)| *feature == token)
        .map(|(_, short)| *short)
}
