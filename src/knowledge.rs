/// Developer glossary and game-script context injected into scoring prompts.
///
/// Both sources are optional. They only help the model understand project
/// vocabulary; rendering caps keep the prompt small.
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::corpus::{Decoder, load_sources};

/// Glossary entries rendered per category.
pub const GLOSSARY_SAMPLE: usize = 10;
/// Script files rendered per category.
pub const SCRIPT_FILES_SAMPLE: usize = 3;
/// Entries rendered per script file.
pub const SCRIPT_ENTRIES_SAMPLE: usize = 3;
/// Script files loaded from one directory.
pub const MAX_SCRIPT_FILES: usize = 50;

// ── Glossary ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlossaryCategory {
    Classes,
    Functions,
    Bugs,
    Other,
}

impl GlossaryCategory {
    pub const ALL: [GlossaryCategory; 4] = [
        GlossaryCategory::Classes,
        GlossaryCategory::Functions,
        GlossaryCategory::Bugs,
        GlossaryCategory::Other,
    ];

    /// Category selected by a `#` heading line.
    fn from_heading(heading: &str) -> Self {
        let h = heading.to_lowercase();
        if ["클래스", "구조체", "class", "struct"].iter().any(|k| h.contains(k)) {
            GlossaryCategory::Classes
        } else if ["함수", "function"].iter().any(|k| h.contains(k)) {
            GlossaryCategory::Functions
        } else if ["버그", "bug"].iter().any(|k| h.contains(k)) {
            GlossaryCategory::Bugs
        } else {
            GlossaryCategory::Other
        }
    }

    fn title(self) -> &'static str {
        match self {
            GlossaryCategory::Classes => "Classes and structs",
            GlossaryCategory::Functions => "Key functions",
            GlossaryCategory::Bugs => "Known bug patterns",
            GlossaryCategory::Other => "Other notes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlossaryEntry {
    pub category: GlossaryCategory,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Glossary {
    pub entries: Vec<GlossaryEntry>,
}

impl Glossary {
    /// Parse glossary text. `#` lines switch the current category (entries
    /// before any heading are `Other`); body lines are `name,description`;
    /// anything else is ignored.
    pub fn parse(text: &str) -> Self {
        let mut category = GlossaryCategory::Other;
        let mut entries = Vec::new();

        for line in text.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            if let Some(heading) = line.strip_prefix('#') {
                category = GlossaryCategory::from_heading(heading);
                continue;
            }
            let Some((name, description)) = line.split_once(',') else {
                continue;
            };
            let (name, description) = (name.trim(), description.trim());
            if name.is_empty() {
                continue;
            }
            entries.push(GlossaryEntry {
                category,
                name: name.to_string(),
                description: description.to_string(),
            });
        }
        Self { entries }
    }

    pub fn in_category(&self, category: GlossaryCategory) -> impl Iterator<Item = &GlossaryEntry> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

pub fn load_glossary(path: &Path, decoder: &Decoder) -> Result<Glossary> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read glossary: {}", path.display()))?;
    let text = decoder
        .decode(&bytes)
        .with_context(|| format!("Failed to decode glossary: {}", path.display()))?;
    let glossary = Glossary::parse(&text);
    info!("Loaded {} glossary entries from {}", glossary.len(), path.display());
    Ok(glossary)
}

// ── Scripts ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptCategory {
    Dialogs,
    Quests,
    Items,
    Skills,
    Misc,
}

impl ScriptCategory {
    pub const ALL: [ScriptCategory; 5] = [
        ScriptCategory::Dialogs,
        ScriptCategory::Quests,
        ScriptCategory::Items,
        ScriptCategory::Skills,
        ScriptCategory::Misc,
    ];

    /// Category inferred from a script's file name.
    pub fn from_file_name(name: &str) -> Self {
        let n = name.to_lowercase();
        let any = |keys: &[&str]| keys.iter().any(|k| n.contains(k));
        if any(&["dialog", "conversation", "talk"]) {
            ScriptCategory::Dialogs
        } else if any(&["quest", "mission"]) {
            ScriptCategory::Quests
        } else if any(&["item", "equip", "weapon"]) {
            ScriptCategory::Items
        } else if any(&["skill", "ability", "spell"]) {
            ScriptCategory::Skills
        } else {
            ScriptCategory::Misc
        }
    }

    fn title(self) -> &'static str {
        match self {
            ScriptCategory::Dialogs => "Dialog",
            ScriptCategory::Quests => "Quest",
            ScriptCategory::Items => "Item",
            ScriptCategory::Skills => "Skill",
            ScriptCategory::Misc => "Misc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    /// `None` for bare-value lines.
    pub key: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptSection {
    pub name: String,
    pub entries: Vec<ScriptEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptFile {
    pub name: String,
    pub category: ScriptCategory,
    pub sections: Vec<ScriptSection>,
}

impl ScriptFile {
    /// Parse `[section]` headers, `key=value` lines and bare values.
    /// `//` lines are comments; lines before the first header go to a
    /// `default` section.
    pub fn parse(name: &str, text: &str) -> Self {
        let mut sections: Vec<ScriptSection> = Vec::new();

        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            if line.len() > 1 && line.starts_with('[') && line.ends_with(']') {
                sections.push(ScriptSection {
                    name: line[1..line.len() - 1].trim().to_string(),
                    entries: Vec::new(),
                });
                continue;
            }

            let entry = match line.split_once('=') {
                Some((key, value)) => ScriptEntry {
                    key: Some(key.trim().to_string()),
                    value: value.trim().to_string(),
                },
                None => ScriptEntry {
                    key: None,
                    value: line.to_string(),
                },
            };
            if sections.is_empty() {
                sections.push(ScriptSection {
                    name: "default".to_string(),
                    entries: Vec::new(),
                });
            }
            if let Some(section) = sections.last_mut() {
                section.entries.push(entry);
            }
        }

        Self {
            name: name.to_string(),
            category: ScriptCategory::from_file_name(name),
            sections,
        }
    }

    /// `(section, value)` pairs in file order.
    pub fn samples(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sections.iter().flat_map(|s| {
            s.entries
                .iter()
                .map(move |e| (s.name.as_str(), e.value.as_str()))
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.entries.is_empty())
    }
}

/// Load up to [`MAX_SCRIPT_FILES`] `.txt` scripts from `dir`, in path order.
pub fn load_scripts(dir: &Path, decoder: &Decoder) -> Result<Vec<ScriptFile>> {
    let (files, _) = load_sources(dir, &["txt".to_string()], decoder)
        .with_context(|| format!("Failed to load scripts from {}", dir.display()))?;

    let scripts: Vec<ScriptFile> = files
        .iter()
        .take(MAX_SCRIPT_FILES)
        .map(|f| {
            let name = f.path.rsplit('/').next().unwrap_or(&f.path);
            ScriptFile::parse(name, &f.text)
        })
        .filter(|s| !s.is_empty())
        .collect();

    info!("Loaded {} script files from {}", scripts.len(), dir.display());
    Ok(scripts)
}

// ── Rendering ───────────────────────────────────────────────

/// Everything the ranker may show the model besides the code itself.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeContext {
    pub glossary: Glossary,
    pub scripts: Vec<ScriptFile>,
}

impl KnowledgeContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.glossary.is_empty() && self.scripts.is_empty()
    }

    /// Prompt text, or `None` when there is nothing to show.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        let mut parts = Vec::new();

        let mut glossary = String::new();
        for category in GlossaryCategory::ALL {
            let mut entries = self.glossary.in_category(category).peekable();
            if entries.peek().is_none() {
                continue;
            }
            let _ = writeln!(glossary, "- {}:", category.title());
            for entry in entries.take(GLOSSARY_SAMPLE) {
                let _ = writeln!(glossary, "  * {}: {}", entry.name, entry.description);
            }
        }
        if !glossary.is_empty() {
            parts.push(format!("## Developer knowledge\n{}", glossary.trim_end()));
        }

        let mut scripts = String::new();
        for category in ScriptCategory::ALL {
            let files: Vec<&ScriptFile> =
                self.scripts.iter().filter(|s| s.category == category).collect();
            if files.is_empty() {
                continue;
            }
            let _ = writeln!(scripts, "- {} scripts ({} files):", category.title(), files.len());
            for file in files.iter().take(SCRIPT_FILES_SAMPLE) {
                let _ = writeln!(scripts, "  * {}:", file.name);
                for (section, value) in file.samples().take(SCRIPT_ENTRIES_SAMPLE) {
                    let _ = writeln!(scripts, "    * {section}: {value}");
                }
            }
        }
        if !scripts.is_empty() {
            parts.push(format!("## Game script data\n{}", scripts.trim_end()));
        }

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }
}
