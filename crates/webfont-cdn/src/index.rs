//! Browsable index of the output directory.

use std::{collections::BTreeMap, fs, io, path::Path};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Subset file in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetIndexEntry {
    /// Subset identifier (the hash part of the file name).
    pub id: String,
    /// Subset file name.
    pub filename: String,
    /// File size in bytes.
    pub size: u64,
}

/// Font variant in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantIndexEntry {
    /// Variant name.
    pub variant: String,
    /// Name of the pretty-printed stylesheet, if present.
    pub css_file: Option<String>,
    /// Subsets of the variant ordered by file name.
    pub subsets: Vec<SubsetIndexEntry>,
}

/// Font in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontIndexEntry {
    /// Font name.
    pub name: String,
    /// Variants ordered by name.
    pub variants: Vec<VariantIndexEntry>,
    /// Total size of subset files in bytes.
    pub total_size: u64,
    /// Total number of subset files.
    pub total_files: usize,
}

/// Index of built fonts, usually stored as `index.json` in the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontIndex {
    /// Generation timestamp (RFC 3339, UTC).
    pub generated_at: String,
    /// Number of indexed fonts.
    pub total_fonts: usize,
    /// Indexed fonts ordered by name.
    pub fonts: Vec<FontIndexEntry>,
}

impl FontIndex {
    /// Saves the index as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}

/// Scans the output directory and indexes subsets of each font. Subsets are grouped by variant,
/// which is taken from their `{font}-{variant}-{id}.woff2` file names. Fonts without subsets
/// are not indexed.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read.
pub fn build_index(output_dir: &Path) -> io::Result<FontIndex> {
    let mut font_dirs = vec![];
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            font_dirs.push(entry.path());
        }
    }
    font_dirs.sort();

    let mut fonts = vec![];
    for font_dir in font_dirs {
        let Some(name) = font_dir.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if let Some(font) = index_font(&font_dir, name)? {
            fonts.push(font);
        }
    }

    Ok(FontIndex {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        total_fonts: fonts.len(),
        fonts,
    })
}

fn index_font(font_dir: &Path, font_name: &str) -> io::Result<Option<FontIndexEntry>> {
    let mut subset_files = vec![];
    let mut css_files = vec![];
    for entry in fs::read_dir(font_dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        if file_name.ends_with(".woff2") {
            subset_files.push((file_name, metadata.len()));
        } else if file_name.ends_with(".css") {
            css_files.push(file_name);
        }
    }
    if subset_files.is_empty() {
        return Ok(None);
    }
    subset_files.sort();

    let total_files = subset_files.len();
    let total_size = subset_files.iter().map(|(_, size)| size).sum();
    let mut variants = BTreeMap::<String, Vec<SubsetIndexEntry>>::new();
    for (filename, size) in subset_files {
        let stem = filename.trim_end_matches(".woff2");
        let parts: Vec<_> = stem.split('-').collect();
        let [.., variant, id] = parts.as_slice() else {
            continue;
        };
        if parts.len() < 3 {
            continue;
        }
        let variant = (*variant).to_owned();
        let subset = SubsetIndexEntry {
            id: (*id).to_owned(),
            size,
            filename,
        };
        variants.entry(variant).or_default().push(subset);
    }

    let variants = variants
        .into_iter()
        .map(|(variant, subsets)| {
            let css_name = format!("{font_name}-{variant}.css");
            let css_file = css_files.iter().find(|name| **name == css_name).cloned();
            VariantIndexEntry {
                variant,
                css_file,
                subsets,
            }
        })
        .collect();
    Ok(Some(FontIndexEntry {
        name: font_name.to_owned(),
        variants,
        total_size,
        total_files,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let inter = dir.path().join("Inter");
        fs::create_dir_all(&inter).unwrap();
        fs::write(inter.join("Inter-Regular-aaaa.woff2"), [0_u8; 10]).unwrap();
        fs::write(inter.join("Inter-Regular-bbbb.woff2"), [0_u8; 20]).unwrap();
        fs::write(inter.join("Inter-Bold-cccc.woff2"), [0_u8; 5]).unwrap();
        fs::write(inter.join("Inter-Regular.css"), "").unwrap();
        fs::write(inter.join("Inter-Regular.min.css"), "").unwrap();
        fs::write(inter.join("LICENSE.txt"), "").unwrap();

        let empty = dir.path().join("Empty");
        fs::create_dir_all(&empty).unwrap();
        fs::write(empty.join("Empty-Regular.css"), "").unwrap();
        fs::write(dir.path().join("index.json"), "{}").unwrap();

        let index = build_index(dir.path()).unwrap();
        assert_eq!(index.total_fonts, 1);
        chrono::DateTime::parse_from_rfc3339(&index.generated_at).unwrap();

        let font = &index.fonts[0];
        assert_eq!(font.name, "Inter");
        assert_eq!(font.total_files, 3);
        assert_eq!(font.total_size, 35);
        let variant_names: Vec<_> = font.variants.iter().map(|v| v.variant.as_str()).collect();
        assert_eq!(variant_names, ["Bold", "Regular"]);

        let [bold, regular] = font.variants.as_slice() else {
            unreachable!();
        };
        assert_eq!(bold.css_file, None);
        assert_eq!(regular.css_file.as_deref(), Some("Inter-Regular.css"));
        assert_eq!(
            regular.subsets,
            [
                SubsetIndexEntry {
                    id: "aaaa".to_owned(),
                    filename: "Inter-Regular-aaaa.woff2".to_owned(),
                    size: 10,
                },
                SubsetIndexEntry {
                    id: "bbbb".to_owned(),
                    filename: "Inter-Regular-bbbb.woff2".to_owned(),
                    size: 20,
                },
            ]
        );

        let path = dir.path().join("index.json");
        index.save(&path).unwrap();
        let loaded: FontIndex = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, index);
    }
}
