//! Project context discovery and rendering
//!
//! A project may ship a Markdown file (`PILOT.md` by default) with
//! heading-delimited sections that steer the oracle:
//!
//! ```markdown
//! # Storefront
//!
//! ## Description
//! Admin panel for the web shop.
//!
//! ## Goals
//! - Keep product listings current
//!
//! ## Custom Commands
//! - "deploy" → git push origin main
//!
//! ## Preferences
//! - browser: firefox
//! ```
//!
//! Parsing is best-effort. Lines that do not fit their section are skipped
//! and the raw text is kept so nothing is lost if no section is recognized.

use pilot_core::config::ContextSettings;
use pilot_core::{PilotError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

fn heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid regex"))
}

fn list_item() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(.*)$").expect("valid regex"))
}

fn command_arrow() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*(?:→|->|=>)\s*").expect("valid regex"))
}

/// Parsed project context, read-only once loaded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectContext {
    pub name: String,
    pub description: String,
    pub goals: Vec<String>,
    pub instructions: Vec<String>,
    /// Trigger phrase → literal command
    pub custom_commands: BTreeMap<String, String>,
    pub preferences: BTreeMap<String, String>,
    /// Unparsed file contents
    pub raw: String,
}

impl ProjectContext {
    /// Look up a custom command by its trigger (trimmed, case-insensitive)
    pub fn resolve_command(&self, command: &str) -> Option<&str> {
        let wanted = command.trim();
        self.custom_commands
            .iter()
            .find(|(trigger, _)| trigger.eq_ignore_ascii_case(wanted))
            .map(|(_, expansion)| expansion.as_str())
    }

    /// True when no section was recognized
    pub fn is_unstructured(&self) -> bool {
        self.description.is_empty()
            && self.goals.is_empty()
            && self.instructions.is_empty()
            && self.custom_commands.is_empty()
            && self.preferences.is_empty()
    }

    /// Parse context text; `fallback_name` is used when there is no H1 title
    pub fn parse(text: &str, fallback_name: &str) -> Self {
        let mut context = ProjectContext {
            raw: text.to_string(),
            ..Default::default()
        };
        let mut section = Section::Preamble;
        let mut paragraph: Vec<String> = Vec::new();

        for line in text.lines() {
            if let Some(caps) = heading().captures(line) {
                context.apply_paragraph(section, &mut paragraph);
                let title = caps[2].trim();
                if caps[1].len() == 1 && context.name.is_empty() {
                    context.name = title.to_string();
                    section = Section::Preamble;
                } else {
                    section = Section::from_title(title);
                }
                continue;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                context.apply_paragraph(section, &mut paragraph);
                continue;
            }

            match list_item().captures(line) {
                Some(caps) => {
                    context.apply_paragraph(section, &mut paragraph);
                    context.apply_item(section, caps[1].trim());
                }
                // Commands and preferences are one entry per line
                None if section.is_keyed() => context.apply_item(section, trimmed),
                None => paragraph.push(trimmed.to_string()),
            }
        }
        context.apply_paragraph(section, &mut paragraph);

        if context.name.is_empty() {
            context.name = fallback_name.to_string();
        }
        context
    }

    fn apply_paragraph(&mut self, section: Section, paragraph: &mut Vec<String>) {
        if paragraph.is_empty() {
            return;
        }
        let text = paragraph.join(" ");
        paragraph.clear();

        match section {
            Section::Description => {
                if !self.description.is_empty() {
                    self.description.push_str("\n\n");
                }
                self.description.push_str(&text);
            }
            Section::Goals => self.goals.push(text),
            Section::Instructions => self.instructions.push(text),
            _ => {}
        }
    }

    fn apply_item(&mut self, section: Section, item: &str) {
        if item.is_empty() {
            return;
        }
        match section {
            Section::Description => {
                if !self.description.is_empty() {
                    self.description.push('\n');
                }
                self.description.push_str(item);
            }
            Section::Goals => self.goals.push(item.to_string()),
            Section::Instructions => self.instructions.push(item.to_string()),
            Section::CustomCommands => match parse_custom_command(item) {
                Some((trigger, expansion)) => {
                    self.custom_commands.insert(trigger, expansion);
                }
                None => debug!("Skipping malformed custom command: {}", item),
            },
            Section::Preferences => match parse_preference(item) {
                Some((key, value)) => {
                    self.preferences.insert(key, value);
                }
                None => debug!("Skipping malformed preference: {}", item),
            },
            Section::Preamble | Section::Unknown => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Description,
    Goals,
    Instructions,
    CustomCommands,
    Preferences,
    Unknown,
}

impl Section {
    fn is_keyed(self) -> bool {
        matches!(self, Section::CustomCommands | Section::Preferences)
    }

    fn from_title(title: &str) -> Self {
        match title.trim_end_matches(':').to_ascii_lowercase().as_str() {
            "description" | "about" | "overview" => Section::Description,
            "goals" | "goal" => Section::Goals,
            "instructions" | "rules" => Section::Instructions,
            "custom commands" | "commands" => Section::CustomCommands,
            "preferences" => Section::Preferences,
            _ => Section::Unknown,
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    s.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '“' | '”'))
        .trim()
}

/// `"trigger" → action`, also accepting `->` and `=>`
fn parse_custom_command(item: &str) -> Option<(String, String)> {
    let mut parts = command_arrow().splitn(item, 2);
    let trigger = strip_quotes(parts.next()?);
    let expansion = strip_quotes(parts.next()?);
    if trigger.is_empty() || expansion.is_empty() {
        return None;
    }
    Some((trigger.to_string(), expansion.to_string()))
}

/// `key: value` or `key = value`
fn parse_preference(item: &str) -> Option<(String, String)> {
    let (key, value) = item.split_once(':').or_else(|| item.split_once('='))?;
    let key = strip_quotes(key.trim().trim_matches('*'));
    let value = strip_quotes(value);
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Finds, parses and caches the project context file
///
/// The first successful lookup is cached for the lifetime of the loader;
/// share the loader through an `Arc` to share the cache between commands.
#[derive(Debug)]
pub struct ProjectContextLoader {
    file_names: Vec<String>,
    cache: OnceLock<Option<Arc<ProjectContext>>>,
}

impl ProjectContextLoader {
    pub fn new(file_names: Vec<String>) -> Self {
        Self {
            file_names,
            cache: OnceLock::new(),
        }
    }

    /// Walk upward from `start_dir` until a recognized file is found
    pub fn find_context_file(&self, start_dir: &Path) -> Option<PathBuf> {
        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &self.file_names {
                let candidate = current.join(name);
                if candidate.is_file() {
                    debug!("Found project context at {}", candidate.display());
                    return Some(candidate);
                }
            }
            dir = current.parent();
        }
        None
    }

    /// Read and parse a context file
    pub fn load_context(&self, path: &Path) -> Result<ProjectContext> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PilotError::Context(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let fallback_name = context_root(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());

        Ok(ProjectContext::parse(&text, &fallback_name))
    }

    /// Lazily discover and load the context, caching the result
    ///
    /// A missing or unreadable file yields `None`; the lookup is not retried.
    pub fn get_or_load(&self, start_dir: &Path) -> Option<Arc<ProjectContext>> {
        self.cache
            .get_or_init(|| {
                let path = self.find_context_file(start_dir)?;
                match self.load_context(&path) {
                    Ok(context) => {
                        info!(
                            "Loaded project context '{}' from {}",
                            context.name,
                            path.display()
                        );
                        Some(Arc::new(context))
                    }
                    Err(e) => {
                        warn!("Ignoring project context: {}", e);
                        None
                    }
                }
            })
            .clone()
    }
}

impl Default for ProjectContextLoader {
    fn default() -> Self {
        Self::new(ContextSettings::default().file_names)
    }
}

/// Directory the context file describes (`.pilot/context.md` belongs to the
/// directory holding `.pilot`)
fn context_root(path: &Path) -> &Path {
    let parent = path.parent().unwrap_or(path);
    if parent.file_name().is_some_and(|n| n == pilot_core::config::PILOT_DIR) {
        parent.parent().unwrap_or(parent)
    } else {
        parent
    }
}

/// Render context as a prompt block; empty when there is none
pub fn format_context_for_prompt(context: Option<&ProjectContext>) -> String {
    let Some(context) = context else {
        return String::new();
    };

    let mut out = format!("## PROJECT CONTEXT: {}\n", context.name);

    if context.is_unstructured() {
        let raw = context.raw.trim();
        if !raw.is_empty() {
            out.push('\n');
            out.push_str(raw);
            out.push('\n');
        }
        return out;
    }

    if !context.description.is_empty() {
        out.push('\n');
        out.push_str(&context.description);
        out.push('\n');
    }

    let mut list = |title: &str, items: &mut dyn Iterator<Item = String>| {
        let mut items = items.peekable();
        if items.peek().is_none() {
            return;
        }
        out.push_str(&format!("\n{}:\n", title));
        for item in items {
            out.push_str(&format!("- {}\n", item));
        }
    };

    list("Goals", &mut context.goals.iter().cloned());
    list("Instructions", &mut context.instructions.iter().cloned());
    list(
        "Custom commands",
        &mut context
            .custom_commands
            .iter()
            .map(|(trigger, expansion)| format!("\"{}\" → {}", trigger, expansion)),
    );
    list(
        "Preferences",
        &mut context
            .preferences
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value)),
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"# Storefront

## Description
Admin panel for the web shop.
Runs on staging first.

## Goals
- Keep product listings current
- Never delete orders

## Instructions
1. Log in before editing
2) Save after every change

## Custom Commands
- "deploy" → git push origin main
- "open admin" -> navigate to https://shop.test/admin
- this line has no arrow
- "" → nothing

## Preferences
- browser: firefox
- **speed** = careful
- not a pair

## Notes
- ignored section
"#;

    #[test]
    fn test_default_loader_uses_configured_names() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".pilot")).unwrap();
        fs::write(temp.path().join(".pilot/context.md"), "# Shop\n").unwrap();

        let loader = ProjectContextLoader::default();
        assert_eq!(
            loader.find_context_file(temp.path()),
            Some(temp.path().join(".pilot/context.md"))
        );
    }

    #[test]
    fn test_parse_sections() {
        let context = ProjectContext::parse(SAMPLE, "fallback");

        assert_eq!(context.name, "Storefront");
        assert_eq!(
            context.description,
            "Admin panel for the web shop. Runs on staging first."
        );
        assert_eq!(
            context.goals,
            vec!["Keep product listings current", "Never delete orders"]
        );
        assert_eq!(
            context.instructions,
            vec!["Log in before editing", "Save after every change"]
        );
        assert_eq!(context.custom_commands.len(), 2);
        assert_eq!(context.custom_commands["deploy"], "git push origin main");
        assert_eq!(
            context.custom_commands["open admin"],
            "navigate to https://shop.test/admin"
        );
        assert_eq!(context.preferences["browser"], "firefox");
        assert_eq!(context.preferences["speed"], "careful");
        assert_eq!(context.preferences.len(), 2);
        assert_eq!(context.raw, SAMPLE);
    }

    #[test]
    fn test_resolve_command_is_trimmed_and_case_insensitive() {
        let context = ProjectContext::parse(SAMPLE, "x");
        assert_eq!(
            context.resolve_command("  DEPLOY "),
            Some("git push origin main")
        );
        assert_eq!(context.resolve_command("deploy now"), None);
    }

    #[test]
    fn test_fallback_name_without_title() {
        let context = ProjectContext::parse("## Goals\n- ship it\n", "my-app");
        assert_eq!(context.name, "my-app");
        assert_eq!(context.goals, vec!["ship it"]);
    }

    #[test]
    fn test_find_context_file_walks_upward() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp.path().join("PILOT.md"), "# Root\n").unwrap();

        let loader = ProjectContextLoader::default();
        let found = loader.find_context_file(&nested).unwrap();
        assert_eq!(found, temp.path().join("PILOT.md"));
    }

    #[test]
    fn test_find_context_file_prefers_nearest() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("sub");
        fs::create_dir_all(nested.join(".pilot")).unwrap();
        fs::write(temp.path().join("PILOT.md"), "# Outer\n").unwrap();
        fs::write(nested.join(".pilot/context.md"), "# Inner\n").unwrap();

        let loader = ProjectContextLoader::default();
        let found = loader.find_context_file(&nested).unwrap();
        assert_eq!(found, nested.join(".pilot/context.md"));

        let context = loader.load_context(&found).unwrap();
        assert_eq!(context.name, "Inner");
    }

    #[test]
    fn test_find_context_file_none() {
        let temp = TempDir::new().unwrap();
        let loader = ProjectContextLoader::new(vec!["NO_SUCH_CONTEXT_FILE.md".to_string()]);
        assert!(loader.find_context_file(temp.path()).is_none());
    }

    #[test]
    fn test_load_context_fallback_name_from_directory() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("storefront");
        fs::create_dir_all(project.join(".pilot")).unwrap();
        fs::write(project.join(".pilot/context.md"), "## Goals\n- a\n").unwrap();

        let loader = ProjectContextLoader::default();
        let context = loader
            .load_context(&project.join(".pilot/context.md"))
            .unwrap();
        assert_eq!(context.name, "storefront");
    }

    #[test]
    fn test_load_missing_file_is_context_error() {
        let loader = ProjectContextLoader::default();
        let err = loader
            .load_context(Path::new("/definitely/not/here/PILOT.md"))
            .unwrap_err();
        assert!(matches!(err, PilotError::Context(_)));
    }

    #[test]
    fn test_get_or_load_caches_first_result() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("PILOT.md"), "# First\n").unwrap();

        let loader = ProjectContextLoader::default();
        let first = loader.get_or_load(temp.path()).unwrap();

        fs::write(temp.path().join("PILOT.md"), "# Second\n").unwrap();
        let second = loader.get_or_load(temp.path()).unwrap();

        assert_eq!(second.name, "First");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_format_none_is_empty() {
        assert_eq!(format_context_for_prompt(None), "");
    }

    #[test]
    fn test_format_structured_context() {
        let context = ProjectContext::parse(SAMPLE, "x");
        let block = format_context_for_prompt(Some(&context));

        assert!(block.starts_with("## PROJECT CONTEXT: Storefront\n"));
        assert!(block.contains("Admin panel for the web shop."));
        assert!(block.contains("Goals:\n- Keep product listings current\n"));
        assert!(block.contains("\"deploy\" → git push origin main"));
        assert!(block.contains("Preferences:\n- browser: firefox\n"));
        assert!(!block.contains("ignored section"));
    }

    #[test]
    fn test_format_unstructured_falls_back_to_raw() {
        let context = ProjectContext::parse("Always use the staging site.\n", "shop");
        let block = format_context_for_prompt(Some(&context));
        assert_eq!(
            block,
            "## PROJECT CONTEXT: shop\n\nAlways use the staging site.\n"
        );
    }
}
