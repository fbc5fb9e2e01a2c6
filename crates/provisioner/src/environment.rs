//! Machine-scope environment bindings.
//!
//! The [`EnvironmentConfigurator`] writes a single variable pointing at an
//! installed software's home, and only when the variable is absent or blank.
//! An existing value is never overwritten.

use crate::error::{Error, Result};
use crate::probe::InstalledStateProbe;
use crate::types::StepOutcome;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Default environment file on Unix hosts.
pub const DEFAULT_ENVIRONMENT_FILE: &str = "/etc/environment";

/// Serializes read-modify-write cycles on environment files in this process.
static FILE_UPDATE_LOCK: Mutex<()> = Mutex::new(());

/// Registry key holding machine-scope variables on Windows.
pub const WINDOWS_ENVIRONMENT_KEY: &str =
    "HKLM\\SYSTEM\\CurrentControlSet\\Control\\Session Manager\\Environment";

/// Get/set access to machine-scope environment variables.
pub trait EnvironmentStore: Send + Sync {
    /// Current value, `None` when unset.
    fn get(&self, name: &str) -> Result<Option<String>>;

    /// Persist `value` at machine scope.
    fn set(&self, name: &str, value: &str) -> Result<()>;
}

/// Where [`MachineEnvironment`] persists variables.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Backing {
    /// Windows machine environment via `reg query` and `setx /M`.
    Registry,
    /// `KEY="value"` lines in a file.
    File(PathBuf),
}

/// The host's machine-wide environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineEnvironment {
    backing: Backing,
}

impl Default for MachineEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineEnvironment {
    /// The platform default store.
    #[must_use]
    pub fn new() -> Self {
        if cfg!(windows) {
            Self {
                backing: Backing::Registry,
            }
        } else {
            Self::file(DEFAULT_ENVIRONMENT_FILE)
        }
    }

    /// A store backed by an environment file.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    /// Human-readable location of the store.
    #[must_use]
    pub fn location(&self) -> String {
        match &self.backing {
            Backing::Registry => WINDOWS_ENVIRONMENT_KEY.to_string(),
            Backing::File(path) => path.display().to_string(),
        }
    }
}

impl EnvironmentStore for MachineEnvironment {
    fn get(&self, name: &str) -> Result<Option<String>> {
        match &self.backing {
            Backing::Registry => {
                use crate::registry::{RegCli, Registry};
                RegCli::new().get_value(WINDOWS_ENVIRONMENT_KEY, name)
            }
            Backing::File(path) => {
                let content = read_environment_file(path)?;
                Ok(parse_environment(&content).remove(name))
            }
        }
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        match &self.backing {
            Backing::Registry => setx(name, value),
            Backing::File(path) => {
                let _guard = FILE_UPDATE_LOCK
                    .lock()
                    .map_err(|_| Error::config("environment file lock poisoned"))?;
                let content = read_environment_file(path)?;
                let updated = upsert_environment_line(&content, name, value);
                replace_file(path, &updated)
            }
        }
    }
}

fn setx(name: &str, value: &str) -> Result<()> {
    let output = std::process::Command::new("setx")
        .args([name, value, "/M"])
        .output()
        .map_err(|e| Error::config(format!("failed to run setx for {name}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::config(format!(
            "setx {name} /M failed: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

/// Write `content` to a sibling file and rename it over `path`.
fn replace_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::config(format!("cannot create {}: {e}", parent.display())))?;
    }

    let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    temp_name.push(".nodeprep-tmp");
    let temp = path.with_file_name(temp_name);

    let written = fs::write(&temp, content).and_then(|()| {
        if let Ok(metadata) = fs::metadata(path) {
            fs::set_permissions(&temp, metadata.permissions())?;
        }
        fs::rename(&temp, path)
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(Error::config(format!("cannot write {}: {e}", path.display())));
    }
    Ok(())
}

fn read_environment_file(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::config(format!(
            "cannot read {}: {e}",
            path.display()
        ))),
    }
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Parse `KEY=value` lines. Later assignments win.
#[must_use]
pub fn parse_environment(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(split_assignment)
        .map(|(key, value)| (key.to_string(), unquote(value).to_string()))
        .collect()
}

/// Set `name` to `value`, keeping every other line.
///
/// The last assignment of `name` is replaced in place and earlier ones are
/// dropped, so [`parse_environment`] reads back `value`. Without one, the
/// assignment is appended.
#[must_use]
pub fn upsert_environment_line(content: &str, name: &str, value: &str) -> String {
    let assignment = format!("{name}=\"{value}\"");
    let is_target = |line: &str| split_assignment(line).is_some_and(|(key, _)| key == name);
    let last = content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| is_target(line).then_some(i))
        .last();

    let mut lines: Vec<String> = content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| match last {
            Some(last) if i == last => Some(assignment.clone()),
            _ if is_target(line) => None,
            _ => Some(line.to_string()),
        })
        .collect();
    if last.is_none() {
        lines.push(assignment);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// In-memory environment for tests. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnvironment {
    values: Arc<RwLock<HashMap<String, String>>>,
    writes: Arc<AtomicUsize>,
    read_only: bool,
}

impl MemoryEnvironment {
    /// Create an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment whose writes fail.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Seed a value without counting it as a write.
    #[must_use]
    pub fn with(self, name: &str, value: &str) -> Self {
        if let Ok(mut values) = self.values.write() {
            values.insert(name.to_string(), value.to_string());
        }
        self
    }

    /// Number of `set` calls that succeeded.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl EnvironmentStore for MemoryEnvironment {
    fn get(&self, name: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| Error::config("environment lock poisoned"))?;
        Ok(values.get(name).cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        if self.read_only {
            return Err(Error::config(format!("cannot set {name}: access denied")));
        }
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::config("environment lock poisoned"))?;
        values.insert(name.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sets one machine-scope variable to a probed install home.
pub struct EnvironmentConfigurator {
    name: String,
    store: Box<dyn EnvironmentStore>,
}

impl EnvironmentConfigurator {
    /// Create a configurator for variable `name`.
    pub fn new(name: impl Into<String>, store: Box<dyn EnvironmentStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    /// Variable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value, empty when unset.
    pub fn current(&self) -> Result<String> {
        Ok(self.store.get(&self.name)?.unwrap_or_default())
    }

    /// Write the install home reported by `probe` unless the variable is set.
    ///
    /// The probe is consulted only when a write is needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the store cannot be read or
    /// written, or when the probe reports nothing to bind.
    pub fn ensure_configured(&self, probe: &dyn InstalledStateProbe) -> Result<StepOutcome> {
        let current = self.current()?;
        if !current.trim().is_empty() {
            log::debug!("{} already set to {}", self.name, current);
            return Ok(StepOutcome::AlreadySatisfied {
                detail: format!("{}={current}", self.name),
            });
        }

        let version = probe.current_version()?.ok_or_else(|| {
            Error::config(format!(
                "cannot configure {}: no installed version found",
                self.name
            ))
        })?;
        let home = probe
            .install_home(&version)?
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| {
                Error::config(format!(
                    "cannot configure {}: no install home recorded for version {version}",
                    self.name
                ))
            })?;

        log::info!("Configuring {}", self.name);
        self.store.set(&self.name, &home)?;

        Ok(StepOutcome::Applied {
            detail: format!("{}={home}", self.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::RegistryProbe;
    use crate::registry::MemoryRegistry;

    const KEY: &str = "HKEY_LOCAL_MACHINE\\SOFTWARE\\JavaSoft\\Java Runtime Environment";

    fn installed_probe() -> RegistryProbe {
        let registry = MemoryRegistry::new();
        registry.set(KEY, "CurrentVersion", "1.8.0");
        registry.set(&format!("{KEY}\\1.8.0"), "JavaHome", "C:\\Java");
        RegistryProbe::new(Box::new(registry), KEY, "CurrentVersion", "JavaHome")
    }

    fn empty_probe() -> RegistryProbe {
        RegistryProbe::new(
            Box::new(MemoryRegistry::new()),
            KEY,
            "CurrentVersion",
            "JavaHome",
        )
    }

    #[test]
    fn test_configurator_sets_unset_binding() {
        let env = MemoryEnvironment::new();
        let configurator = EnvironmentConfigurator::new("JAVA_HOME", Box::new(env.clone()));

        let outcome = configurator.ensure_configured(&installed_probe()).unwrap();

        assert!(outcome.is_applied());
        assert_eq!(env.get("JAVA_HOME").unwrap(), Some("C:\\Java".to_string()));
        assert_eq!(env.writes(), 1);
    }

    #[test]
    fn test_configurator_treats_blank_as_unset() {
        let env = MemoryEnvironment::new().with("JAVA_HOME", "   ");
        let configurator = EnvironmentConfigurator::new("JAVA_HOME", Box::new(env.clone()));

        configurator.ensure_configured(&installed_probe()).unwrap();

        assert_eq!(env.get("JAVA_HOME").unwrap(), Some("C:\\Java".to_string()));
    }

    #[test]
    fn test_configurator_never_overwrites() {
        let env = MemoryEnvironment::new().with("JAVA_HOME", "D:\\OtherJava");
        let configurator = EnvironmentConfigurator::new("JAVA_HOME", Box::new(env.clone()));

        // Probe reports nothing; it must not even be consulted.
        let outcome = configurator.ensure_configured(&empty_probe()).unwrap();

        assert!(!outcome.is_applied());
        assert_eq!(env.writes(), 0);
        assert_eq!(
            env.get("JAVA_HOME").unwrap(),
            Some("D:\\OtherJava".to_string())
        );
    }

    #[test]
    fn test_configurator_is_idempotent() {
        let env = MemoryEnvironment::new();
        let configurator = EnvironmentConfigurator::new("JAVA_HOME", Box::new(env.clone()));
        let probe = installed_probe();

        assert!(configurator.ensure_configured(&probe).unwrap().is_applied());
        assert!(!configurator.ensure_configured(&probe).unwrap().is_applied());
        assert_eq!(env.writes(), 1);
    }

    #[test]
    fn test_configurator_without_installed_version() {
        let env = MemoryEnvironment::new();
        let configurator = EnvironmentConfigurator::new("JAVA_HOME", Box::new(env.clone()));

        let err = configurator.ensure_configured(&empty_probe()).unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(env.writes(), 0);
    }

    #[test]
    fn test_configurator_write_failure_is_configuration_error() {
        let configurator =
            EnvironmentConfigurator::new("JAVA_HOME", Box::new(MemoryEnvironment::read_only()));
        let err = configurator
            .ensure_configured(&installed_probe())
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_parse_environment() {
        let content = "# comment\nPATH=\"/usr/bin:/bin\"\nexport LANG=en_US.UTF-8\nJAVA_HOME='/opt/java'\n\n";
        let vars = parse_environment(content);
        assert_eq!(vars.get("PATH").map(String::as_str), Some("/usr/bin:/bin"));
        assert_eq!(vars.get("LANG").map(String::as_str), Some("en_US.UTF-8"));
        assert_eq!(vars.get("JAVA_HOME").map(String::as_str), Some("/opt/java"));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_upsert_environment_line_appends() {
        let updated = upsert_environment_line("PATH=\"/bin\"\n", "JAVA_HOME", "/opt/java");
        assert_eq!(updated, "PATH=\"/bin\"\nJAVA_HOME=\"/opt/java\"\n");
    }

    #[test]
    fn test_upsert_environment_line_replaces_blank() {
        let updated = upsert_environment_line("# env\nJAVA_HOME=\nPATH=\"/bin\"", "JAVA_HOME", "/opt/java");
        assert_eq!(updated, "# env\nJAVA_HOME=\"/opt/java\"\nPATH=\"/bin\"\n");
    }

    #[test]
    fn test_upsert_environment_line_collapses_duplicates() {
        let content = "JAVA_HOME=\"/old\"\nPATH=\"/bin\"\nJAVA_HOME=\n";
        let updated = upsert_environment_line(content, "JAVA_HOME", "/opt/java");
        assert_eq!(updated, "PATH=\"/bin\"\nJAVA_HOME=\"/opt/java\"\n");
        assert_eq!(
            parse_environment(&updated).get("JAVA_HOME").map(String::as_str),
            Some("/opt/java")
        );
    }

    #[test]
    fn test_configurator_with_duplicate_assignments_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environment");
        fs::write(&path, "JAVA_HOME=\"/old\"\nJAVA_HOME=\n").unwrap();
        let env = MachineEnvironment::file(&path);
        let configurator = EnvironmentConfigurator::new("JAVA_HOME", Box::new(env.clone()));
        let probe = installed_probe();

        assert!(configurator.ensure_configured(&probe).unwrap().is_applied());
        assert!(!configurator.ensure_configured(&probe).unwrap().is_applied());
        assert_eq!(env.get("JAVA_HOME").unwrap(), Some("C:\\Java".to_string()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "JAVA_HOME=\"C:\\Java\"\n");
    }

    #[test]
    fn test_machine_environment_parallel_sets_keep_every_binding() {
        let dir = tempfile::tempdir().unwrap();
        for round in 0..50 {
            let path = dir.path().join(format!("environment-{round}"));
            fs::write(&path, "PATH=\"/usr/bin\"\n").unwrap();
            let env = MachineEnvironment::file(&path);

            std::thread::scope(|scope| {
                for name in ["JAVA_HOME", "ES_HOME", "NODE_HOME", "GRADLE_HOME"] {
                    let env = env.clone();
                    scope.spawn(move || env.set(name, "/opt/x").unwrap());
                }
            });

            let vars = parse_environment(&fs::read_to_string(&path).unwrap());
            assert_eq!(vars.len(), 5, "round {round}: {vars:?}");
        }
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".nodeprep-tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_machine_environment_keeps_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environment");
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        MachineEnvironment::file(&path).set("ES_HOME", "/srv/elastic").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_machine_environment_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environment");
        fs::write(&path, "PATH=\"/usr/bin\"\n").unwrap();
        let env = MachineEnvironment::file(&path);

        assert_eq!(env.get("ES_HOME").unwrap(), None);
        env.set("ES_HOME", "/srv/elastic").unwrap();

        assert_eq!(env.get("ES_HOME").unwrap(), Some("/srv/elastic".to_string()));
        assert_eq!(env.get("PATH").unwrap(), Some("/usr/bin".to_string()));
        assert_eq!(env.location(), path.display().to_string());
    }

    #[test]
    fn test_machine_environment_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env = MachineEnvironment::file(dir.path().join("nope"));
        assert_eq!(env.get("JAVA_HOME").unwrap(), None);
    }
}
