//! Configuration loading from `~/.strata/config.toml` with defaults.
//!
//! A config file may list `include = ["base.toml", ...]`. Included files are
//! merged in order and the including file wins; `STRATA_*` environment
//! variables are applied last.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use strata_types::config::{strata_home, StrataConfig};
use strata_types::error::{StrataError, StrataResult};
use tracing::{info, warn};

/// Maximum include nesting depth.
const MAX_INCLUDE_DEPTH: u32 = 10;

/// Load configuration from a TOML file, with defaults, then apply
/// environment overrides.
///
/// If the config contains an `include` field, included files are loaded
/// and deep-merged first, then the root config overrides them. Any read or
/// parse failure falls back to defaults with a warning.
pub fn load_config(path: Option<&Path>) -> StrataConfig {
    let mut config = load_config_file(path);
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

fn load_config_file(path: Option<&Path>) -> StrataConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(path = %config_path.display(), "Config file not found, using defaults");
        return StrataConfig::default();
    }

    let root = match read_table(&config_path) {
        Ok(table) => table,
        Err(e) => {
            warn!(error = %e, path = %config_path.display(), "Unusable config file, using defaults");
            return StrataConfig::default();
        }
    };

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let mut layers = ConfigLayers::new(&config_path);
    let merged = match layers.expand(root.clone(), config_dir, 0) {
        Ok(merged) => merged,
        Err(e) => {
            warn!(error = %e, "Config includes skipped, using root config only");
            let mut root = root;
            root.remove("include");
            root
        }
    };

    match toml::Value::Table(merged).try_into::<StrataConfig>() {
        Ok(config) => {
            info!(path = %config_path.display(), files = layers.visited.len(), "Loaded configuration");
            config
        }
        Err(e) => {
            warn!(error = %e, path = %config_path.display(), "Config has invalid values, using defaults");
            StrataConfig::default()
        }
    }
}

fn read_table(path: &Path) -> StrataResult<toml::Table> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| StrataError::Config(format!("cannot read {}: {e}", path.display())))?;
    toml::from_str(&contents)
        .map_err(|e| StrataError::Config(format!("cannot parse {}: {e}", path.display())))
}

/// Expands `include = [...]` lists. Each file may be loaded once per
/// expansion; paths must stay inside the including file's directory.
struct ConfigLayers {
    visited: HashSet<PathBuf>,
}

impl ConfigLayers {
    fn new(root: &Path) -> Self {
        let canonical = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            visited: HashSet::from([canonical]),
        }
    }

    /// Merge `table`'s includes in listed order, then `table` itself on top.
    /// The returned table has no `include` keys left.
    fn expand(&mut self, mut table: toml::Table, dir: &Path, depth: u32) -> StrataResult<toml::Table> {
        let includes = match table.remove("include") {
            None => return Ok(table),
            Some(toml::Value::Array(items)) => items,
            Some(other) => {
                return Err(StrataError::Config(format!(
                    "include must be a list of paths, got {}",
                    other.type_str()
                )));
            }
        };
        if !includes.is_empty() && depth >= MAX_INCLUDE_DEPTH {
            return Err(StrataError::Config(format!(
                "includes nested deeper than {MAX_INCLUDE_DEPTH} levels"
            )));
        }

        let mut merged = toml::Table::new();
        for item in includes {
            let Some(relative) = item.as_str() else {
                return Err(StrataError::Config(format!("include entry is not a path: {item}")));
            };
            let path = self.admit(dir, relative)?;
            info!(include = %relative, "Loading config include");
            let child_dir = path.parent().unwrap_or(dir).to_path_buf();
            let child = self.expand(read_table(&path)?, &child_dir, depth + 1)?;
            merge_tables(&mut merged, child);
        }
        merge_tables(&mut merged, table);
        Ok(merged)
    }

    /// Resolve an include path against `dir` and record it as visited.
    fn admit(&mut self, dir: &Path, relative: &str) -> StrataResult<PathBuf> {
        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            return Err(StrataError::Config(format!("absolute include path: {relative}")));
        }
        if candidate.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(StrataError::Config(format!("include path leaves its directory: {relative}")));
        }

        let base = std::fs::canonicalize(dir)
            .map_err(|e| StrataError::Config(format!("cannot resolve {}: {e}", dir.display())))?;
        let path = std::fs::canonicalize(base.join(candidate))
            .map_err(|e| StrataError::Config(format!("cannot resolve include {relative}: {e}")))?;
        if !path.starts_with(&base) {
            return Err(StrataError::Config(format!("include path leaves its directory: {relative}")));
        }
        if !self.visited.insert(path.clone()) {
            return Err(StrataError::Config(format!("include cycle through {relative}")));
        }
        Ok(path)
    }
}

/// Merge `overlay` into `base`: tables merge key by key, anything else in
/// `overlay` replaces what `base` had.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply `STRATA_*` overrides read through `lookup`.
///
/// Values that fail to parse are ignored with a warning.
pub fn apply_env_overrides(config: &mut StrataConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(dir) = lookup("STRATA_DATA_DIR").filter(|v| !v.trim().is_empty()) {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(level) = lookup("STRATA_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
        config.log_level = level;
    }
    if let Some(limit) = parse_override::<usize>(&lookup, "STRATA_MEMORY_LIMIT") {
        config.memory.max_memories = limit;
    }
    if let Some(enabled) = lookup("STRATA_BACKUP_ENABLED") {
        match parse_bool(&enabled) {
            Some(enabled) => config.backup.enabled = enabled,
            None => warn!(var = "STRATA_BACKUP_ENABLED", value = %enabled, "Ignoring unparseable override"),
        }
    }
    if let Some(secs) = parse_override::<u64>(&lookup, "STRATA_BACKUP_INTERVAL") {
        config.backup.interval_secs = secs;
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Option<T> {
    let raw = lookup(var)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var, value = %raw, "Ignoring unparseable override");
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    strata_home().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_lines(path: &Path, lines: &[&str]) {
        let mut f = std::fs::File::create(path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
    }

    #[test]
    fn test_load_config_missing_file() {
        let config = load_config_file(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.memory.max_memories, 1000);
    }

    #[test]
    fn test_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("config.toml");
        write_lines(&root, &["[memory]", "max_memories = 50", "[backup]", "keep_count = 3"]);

        let config = load_config_file(Some(&root));
        assert_eq!(config.memory.max_memories, 50);
        assert_eq!(config.backup.keep_count, 3);
        assert_eq!(config.backup.interval_secs, 3600);
        assert_eq!(config.lock.lease_ttl_ms, 30_000);
    }

    #[test]
    fn test_invalid_toml_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("config.toml");
        write_lines(&root, &["[memory", "max_memories = "]);
        assert_eq!(load_config_file(Some(&root)), StrataConfig::default());
    }

    #[test]
    fn test_merge_tables_nested() {
        let mut base: toml::Table = toml::from_str(
            r#"
            log_level = "info"
            [backup]
            interval_secs = 60
            keep_count = 4
        "#,
        )
        .unwrap();
        let overlay: toml::Table = toml::from_str(
            r#"
            [backup]
            interval_secs = 120
        "#,
        )
        .unwrap();
        merge_tables(&mut base, overlay);
        let backup = base["backup"].as_table().unwrap();
        assert_eq!(backup["interval_secs"].as_integer(), Some(120));
        assert_eq!(backup["keep_count"].as_integer(), Some(4));
        assert_eq!(base["log_level"].as_str(), Some("info"));
    }

    #[test]
    fn test_later_include_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_lines(&dir.path().join("a.toml"), &["[backup]", "keep_count = 2", "max_age_days = 9"]);
        write_lines(&dir.path().join("b.toml"), &["[backup]", "keep_count = 5"]);
        let root = dir.path().join("config.toml");
        write_lines(&root, &["include = [\"a.toml\", \"b.toml\"]"]);

        let config = load_config_file(Some(&root));
        assert_eq!(config.backup.keep_count, 5);
        assert_eq!(config.backup.max_age_days, 9);
    }

    #[test]
    fn test_include_must_be_a_list() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("config.toml");
        write_lines(&root, &["include = \"base.toml\"", "log_level = \"warn\""]);
        assert_eq!(load_config_file(Some(&root)).log_level, "warn");
    }

    #[test]
    fn test_basic_include() {
        let dir = tempfile::tempdir().unwrap();
        let base_path = dir.path().join("base.toml");
        let root_path = dir.path().join("config.toml");
        write_lines(&base_path, &["log_level = \"debug\"", "[memory]", "max_memories = 64"]);
        write_lines(&root_path, &["include = [\"base.toml\"]", "log_level = \"warn\""]);

        let config = load_config_file(Some(&root_path));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.memory.max_memories, 64);
    }

    #[test]
    fn test_nested_include() {
        let dir = tempfile::tempdir().unwrap();
        write_lines(&dir.path().join("grandchild.toml"), &["[backup]", "keep_count = 2"]);
        write_lines(
            &dir.path().join("child.toml"),
            &["include = [\"grandchild.toml\"]", "log_level = \"debug\""],
        );
        let root = dir.path().join("config.toml");
        write_lines(&root, &["include = [\"child.toml\"]", "log_level = \"info\""]);

        let config = load_config_file(Some(&root));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.backup.keep_count, 2);
    }

    #[test]
    fn test_circular_include_detected() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.toml");
        write_lines(&a_path, &["include = [\"b.toml\"]", "log_level = \"trace\""]);
        write_lines(&dir.path().join("b.toml"), &["include = [\"a.toml\"]"]);

        // Include resolution fails; the root file alone still applies.
        let config = load_config_file(Some(&a_path));
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_path_traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("config.toml");
        write_lines(&root, &["include = [\"../etc/passwd\"]"]);
        assert_eq!(load_config_file(Some(&root)).log_level, "info");
    }

    #[test]
    fn test_absolute_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("config.toml");
        write_lines(&root, &["include = [\"/etc/shadow\"]"]);
        assert_eq!(load_config_file(Some(&root)).log_level, "info");
    }

    #[test]
    fn test_max_depth_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..12 {
            let path = dir.path().join(format!("level{i}.toml"));
            let include = format!("include = [\"level{}.toml\"]", i + 1);
            let level = format!("log_level = \"level{i}\"");
            if i < 11 {
                write_lines(&path, &[&include, &level]);
            } else {
                write_lines(&path, &[&level, "[memory]", "max_memories = 7"]);
            }
        }
        let config = load_config_file(Some(&dir.path().join("level0.toml")));
        assert_eq!(config.log_level, "level0");
        assert_eq!(config.memory.max_memories, 1000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = StrataConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("STRATA_DATA_DIR", "/srv/strata"),
                ("STRATA_LOG_LEVEL", "debug"),
                ("STRATA_MEMORY_LIMIT", "250"),
                ("STRATA_BACKUP_ENABLED", "false"),
                ("STRATA_BACKUP_INTERVAL", "900"),
            ]),
        );
        assert_eq!(config.data_dir, PathBuf::from("/srv/strata"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.memory.max_memories, 250);
        assert!(!config.backup.enabled);
        assert_eq!(config.backup.interval_secs, 900);
    }

    #[test]
    fn test_unparseable_env_overrides_ignored() {
        let mut config = StrataConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("STRATA_MEMORY_LIMIT", "lots"),
                ("STRATA_BACKUP_ENABLED", "maybe"),
                ("STRATA_BACKUP_INTERVAL", "-5"),
            ]),
        );
        assert_eq!(config, StrataConfig::default());
    }
}
