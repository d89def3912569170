//! Skill manifest loading
//!
//! A skill lives in its own directory:
//!
//! ```text
//! <root>/<SkillName>/
//!   src/handler                              executable handler
//!   speechAssets/IntentSchema.json           intents and slots
//!   speechAssets/SampleUtterances.txt        "IntentName utterance" per line
//!   speechAssets/customSlotTypes/<TypeName>  one vocabulary entry per line
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::{Error, Result};

/// Intent schema file contents
#[derive(Debug, Clone, Deserialize)]
pub struct IntentSchema {
    pub intents: Vec<IntentDef>,
}

/// One intent declaration
#[derive(Debug, Clone, Deserialize)]
pub struct IntentDef {
    pub intent: String,
    #[serde(default)]
    pub slots: Option<Vec<SlotDef>>,
    #[serde(default)]
    pub persist: bool,
}

/// One slot declaration
#[derive(Debug, Clone, Deserialize)]
pub struct SlotDef {
    pub name: String,
    #[serde(rename = "type")]
    pub slot_type: String,
}

/// A parsed, not yet bound, skill manifest
#[derive(Debug, Clone)]
pub struct SkillManifest {
    pub name: String,
    pub schema: IntentSchema,
    /// Utterance templates grouped by intent name
    pub utterances: IndexMap<String, Vec<String>>,
    pub custom_slots: IndexMap<String, Vec<String>>,
    /// Path of the handler executable, when loaded from disk
    pub handler_path: Option<PathBuf>,
}

impl SkillManifest {
    /// Build a manifest from schema JSON and sample utterance text
    ///
    /// # Errors
    ///
    /// Returns error if the schema is not valid JSON of the expected shape
    pub fn parse(name: &str, schema_json: &str, utterances: &str) -> Result<Self> {
        let schema: IntentSchema = serde_json::from_str(schema_json)
            .map_err(|e| Error::Skill(format!("{name}: invalid intent schema: {e}")))?;

        let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
        for line in utterances.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (intent, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            if schema.intents.iter().any(|i| i.intent == intent) {
                grouped
                    .entry(intent.to_string())
                    .or_default()
                    .push(rest.trim().to_string());
            } else {
                tracing::warn!(skill = name, line, "utterance for unknown intent ignored");
            }
        }

        Ok(Self {
            name: name.to_string(),
            schema,
            utterances: grouped,
            custom_slots: IndexMap::new(),
            handler_path: None,
        })
    }

    /// Add a custom slot type from its file contents (blank lines ignored)
    #[must_use]
    pub fn with_custom_slot(mut self, type_name: &str, contents: &str) -> Self {
        let values = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        self.custom_slots.insert(type_name.to_string(), values);
        self
    }
}

/// Read a single skill directory
///
/// # Errors
///
/// Returns error if required directories or files are missing or malformed
pub fn read_manifest(dir: &Path) -> Result<SkillManifest> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Skill(format!("invalid skill directory: {}", dir.display())))?;

    let src_dir = dir.join("src");
    let assets_dir = dir.join("speechAssets");
    if !src_dir.is_dir() || !assets_dir.is_dir() {
        return Err(Error::Skill(format!(
            "{name}: missing src/ or speechAssets/ directory"
        )));
    }

    let schema_file = assets_dir.join("IntentSchema.json");
    let utterances_file = assets_dir.join("SampleUtterances.txt");
    if !schema_file.is_file() || !utterances_file.is_file() {
        return Err(Error::Skill(format!(
            "{name}: missing IntentSchema.json or SampleUtterances.txt"
        )));
    }

    let schema = std::fs::read_to_string(&schema_file)?;
    let utterances = std::fs::read_to_string(&utterances_file)?;
    let mut manifest = SkillManifest::parse(name, &schema, &utterances)?;

    let slots_dir = assets_dir.join("customSlotTypes");
    if slots_dir.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(&slots_dir)?.flatten().collect();
        entries.sort_by_key(std::fs::DirEntry::file_name);

        for entry in entries {
            let path = entry.path();
            let Some(type_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if type_name.starts_with('.') || !path.is_file() {
                continue;
            }
            let contents = std::fs::read_to_string(&path)?;
            manifest = manifest.with_custom_slot(type_name, &contents);
        }
    }

    manifest.handler_path = Some(src_dir.join("handler"));
    Ok(manifest)
}

/// Read every skill directory under `root`
///
/// Loading is best-effort per skill: a skill that fails to load is logged
/// and skipped. Directories are visited in name order.
///
/// # Errors
///
/// Returns error only if `root` itself cannot be read
pub fn discover(root: &Path) -> Result<Vec<SkillManifest>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .map_err(|e| Error::Skill(format!("{}: {e}", root.display())))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut manifests = Vec::with_capacity(dirs.len());
    for dir in dirs {
        tracing::debug!(path = %dir.display(), "loading skill");
        match read_manifest(&dir) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => tracing::warn!(path = %dir.display(), error = %e, "failed to load skill"),
        }
    }

    Ok(manifests)
}
