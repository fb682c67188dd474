//! Font configuration.

use std::{collections::HashSet, fs, path::Path};

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::ConfigError;

#[derive(Debug, Deserialize)]
struct RawFleetConfig {
    fonts: Vec<RawFontConfig>,
}

#[derive(Debug, Deserialize)]
struct RawFontConfig {
    name: String,
    repo: String,
    #[serde(default)]
    files: Vec<RawVariantConfig>,
}

#[derive(Debug, Deserialize)]
struct RawVariantConfig {
    variant: String,
    weight: u16,
    asset_pattern: String,
    #[serde(default)]
    font_pattern: Option<String>,
}

/// Configuration of a single font variant (a style / weight combination).
#[derive(Debug, Clone)]
pub struct VariantConfig {
    variant: String,
    weight: u16,
    asset_pattern: Regex,
    font_pattern: Regex,
}

impl VariantConfig {
    /// Returns the variant name, such as `Regular`.
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Returns the CSS font weight.
    pub fn weight(&self) -> u16 {
        self.weight
    }

    /// Returns the pattern selecting the release asset. The first asset whose name contains
    /// a match is used.
    pub fn asset_pattern(&self) -> &Regex {
        &self.asset_pattern
    }

    /// Returns the case-insensitive pattern selecting the font file in an archive asset.
    /// If not configured, it is derived from the font name.
    pub fn font_pattern(&self) -> &Regex {
        &self.font_pattern
    }
}

/// Configuration of a tracked font family.
#[derive(Debug, Clone)]
pub struct FontConfig {
    name: String,
    repo: String,
    variants: Vec<VariantConfig>,
}

impl FontConfig {
    /// Creates a configuration without variants.
    ///
    /// # Errors
    ///
    /// Returns an error if the name cannot be used as a directory / file name prefix
    /// (e.g., contains slashes or control chars), or the repo is not in the `owner/repo` form.
    pub fn new(name: impl Into<String>, repo: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let repo = repo.into();
        let invalid = |message: &str| ConfigError::Invalid {
            font: name.clone(),
            message: message.to_owned(),
        };

        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(invalid("name must be a non-empty file name"));
        }
        if name.chars().any(char::is_control) {
            return Err(invalid("name must not contain control chars"));
        }
        let is_valid_repo = repo
            .split_once('/')
            .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
        if !is_valid_repo {
            return Err(invalid("repo must have the `owner/repo` form"));
        }

        Ok(Self {
            name,
            repo,
            variants: vec![],
        })
    }

    /// Adds a variant to this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the variant name is invalid or duplicated, the weight is out of
    /// the CSS range `1..=1000`, or a pattern is not a valid regex.
    pub fn with_variant(
        mut self,
        variant: &str,
        weight: u16,
        asset_pattern: &str,
        font_pattern: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if variant.is_empty() || variant.contains(['/', '\\']) {
            return Err(self.invalid(format!("invalid variant name `{variant}`")));
        }
        if self.variants.iter().any(|config| config.variant == variant) {
            return Err(self.invalid(format!("duplicate variant `{variant}`")));
        }
        if !(1..=1000).contains(&weight) {
            return Err(self.invalid(format!("weight {weight} of variant `{variant}` is out of range")));
        }

        let pattern_err = |source| ConfigError::Pattern {
            font: self.name.clone(),
            variant: variant.to_owned(),
            source,
        };
        let asset_pattern = Regex::new(asset_pattern).map_err(pattern_err)?;
        let font_pattern = match font_pattern {
            Some(pattern) => pattern.to_owned(),
            None => format!(".*{}.*", regex::escape(&self.name)),
        };
        let font_pattern = RegexBuilder::new(&font_pattern)
            .case_insensitive(true)
            .build()
            .map_err(pattern_err)?;

        self.variants.push(VariantConfig {
            variant: variant.to_owned(),
            weight,
            asset_pattern,
            font_pattern,
        });
        Ok(self)
    }

    fn invalid(&self, message: String) -> ConfigError {
        ConfigError::Invalid {
            font: self.name.clone(),
            message,
        }
    }

    /// Returns the font name. This is used as the CSS font family and the output directory name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the GitHub repository publishing the font, in the `owner/repo` form.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Returns configured variants.
    pub fn variants(&self) -> &[VariantConfig] {
        &self.variants
    }
}

/// Configuration of all tracked fonts, usually loaded from `fonts.json`.
///
/// All entries are validated on load, so that processing never fails on a malformed configuration.
#[derive(Debug, Clone, Default)]
pub struct FleetConfig {
    fonts: Vec<FontConfig>,
}

impl FleetConfig {
    /// Creates a configuration from the provided fonts.
    ///
    /// # Errors
    ///
    /// Returns an error if font names are not unique.
    pub fn new(fonts: Vec<FontConfig>) -> Result<Self, ConfigError> {
        let mut names = HashSet::with_capacity(fonts.len());
        for font in &fonts {
            if !names.insert(font.name.as_str()) {
                return Err(font.invalid("duplicate font name".to_owned()));
            }
        }
        Ok(Self { fonts })
    }

    /// Parses the configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, misses required keys, or contains invalid values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawFleetConfig = serde_json::from_str(json)?;
        let fonts = raw
            .fonts
            .into_iter()
            .map(|raw_font| {
                let mut font = FontConfig::new(raw_font.name, raw_font.repo)?;
                if raw_font.files.is_empty() {
                    return Err(font.invalid("no variants configured".to_owned()));
                }
                for file in raw_font.files {
                    font = font.with_variant(
                        &file.variant,
                        file.weight,
                        &file.asset_pattern,
                        file.font_pattern.as_deref(),
                    )?;
                }
                Ok(font)
            })
            .collect::<Result<_, ConfigError>>()?;
        Self::new(fonts)
    }

    /// Loads the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its contents are invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Returns all configured fonts.
    pub fn fonts(&self) -> &[FontConfig] {
        &self.fonts
    }

    /// Looks up a font by name.
    pub fn font(&self, name: &str) -> Option<&FontConfig> {
        self.fonts.iter().find(|font| font.name == name)
    }
}
