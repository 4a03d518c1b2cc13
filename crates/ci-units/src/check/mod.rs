//! Consistency check between unit configs and their generated artifacts.
//!
//! A run goes through four stages in order: scanning units, checking each
//! registry file, looking for orphaned registry files and checking the
//! units regex of the root pipeline. Problems never stop the run; they are
//! collected as [`Finding`]s.

pub mod root_regex;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::RegistryError;
use crate::layout::{Layout, REGISTRY_EXTENSION};
use crate::unit::{discover_units, unit_registration, CIUnit};

pub use root_regex::{expected_units_regex, QuoteStyle, RootRegex};

/// Hint printed when fixable problems were left in place.
pub const FIX_HINT: &str = "Run `ci-units check --fix` to fix the problems above.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingKind {
    /// Cannot be repaired by regenerating; fails the run even with `--fix`.
    Unrecoverable,
    /// Drift that `--fix` would repair.
    Fixable,
    /// Drift that was repaired during this run.
    Fixed,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingKind::Unrecoverable => write!(f, "error"),
            FindingKind::Fixable => write!(f, "out of date"),
            FindingKind::Fixed => write!(f, "fixed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: FindingKind,
    /// Affected file, relative to the project root.
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.kind, self.path.display(), self.message)
    }
}

/// Outcome of a [`Checker`] run.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub findings: Vec<Finding>,
}

impl CheckReport {
    pub fn count(&self, kind: FindingKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    pub fn unrecoverable(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.kind == FindingKind::Unrecoverable)
    }

    /// No unrecoverable problems and nothing left to fix.
    pub fn is_success(&self) -> bool {
        self.count(FindingKind::Unrecoverable) == 0 && self.count(FindingKind::Fixable) == 0
    }

    pub fn needs_fix_hint(&self) -> bool {
        self.count(FindingKind::Fixable) > 0
    }

    fn push(&mut self, kind: FindingKind, path: PathBuf, message: impl Into<String>) {
        let finding = Finding {
            kind,
            path,
            message: message.into(),
        };
        log::debug!("{}", finding);
        self.findings.push(finding);
    }
}

/// Checks, and with `fix` repairs, every generated artifact of a project.
#[derive(Debug, Clone)]
pub struct Checker {
    layout: Layout,
    fix: bool,
}

/// Registry files that must not be reported as orphans.
#[derive(Default)]
struct KnownUnits {
    /// `(provider, id)` of every unit whose config loaded.
    registered: HashSet<(String, String)>,
    /// Ids whose config could not be read. Their registry files are kept.
    broken: HashSet<String>,
}

impl KnownUnits {
    fn owns(&self, provider: &str, id: &str) -> bool {
        self.broken.contains(id)
            || self
                .registered
                .contains(&(provider.to_string(), id.to_string()))
    }
}

impl Checker {
    pub fn new(layout: Layout, fix: bool) -> Self {
        Self { layout, fix }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn run(&self) -> CheckReport {
        let _span = tracing::info_span!("check", fix = self.fix).entered();
        let mut report = CheckReport::default();

        let registered = match discover_units(&self.layout) {
            Ok(units) => units,
            Err(e) => {
                // Without the unit list every registry file would look orphaned.
                report.push(
                    FindingKind::Unrecoverable,
                    self.relative(&self.layout.units_root()),
                    e.to_string(),
                );
                return report;
            }
        };
        log::debug!("Found {} unit directories", registered.len());

        let mut known = KnownUnits::default();
        for unit in &registered {
            match unit.load() {
                Ok(unit) => {
                    self.check_registration(&unit, &mut report);
                    known
                        .registered
                        .insert((unit.provider_name().to_string(), unit.id.clone()));
                }
                Err(e) => {
                    report.push(
                        FindingKind::Unrecoverable,
                        self.relative(&unit.config_path()),
                        e.to_string(),
                    );
                    known.broken.insert(unit.id.clone());
                }
            }
        }

        self.check_orphans(&known, &mut report);
        self.check_root_regex(registered.iter().map(|u| u.id.as_str()), &mut report);

        report
    }

    fn check_registration(&self, unit: &CIUnit, report: &mut CheckReport) {
        let path = unit.registry_path(&self.layout);
        let relative = self.relative(&path);

        let expected = match unit_registration(unit) {
            Ok(text) => text,
            Err(e) => {
                report.push(FindingKind::Unrecoverable, relative, e.to_string());
                return;
            }
        };

        let actual = match read_optional(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                report.push(FindingKind::Unrecoverable, relative, e.to_string());
                return;
            }
        };

        let state = match actual {
            Some(bytes) if bytes == expected.as_bytes() => return,
            Some(_) => "out of sync",
            None => "missing",
        };
        if self.fix {
            match write_atomic(&path, &expected) {
                Ok(()) => report.push(
                    FindingKind::Fixed,
                    relative,
                    format!("regenerated registry file for unit '{}'", unit.id),
                ),
                Err(e) => report.push(FindingKind::Unrecoverable, relative, e.to_string()),
            }
        } else {
            report.push(
                FindingKind::Fixable,
                relative,
                format!("registry file for unit '{}' is {}", unit.id, state),
            );
        }
    }

    fn check_orphans(&self, known: &KnownUnits, report: &mut CheckReport) {
        let root = self.layout.registry_root();
        if !root.is_dir() {
            return;
        }

        for entry in WalkDir::new(&root)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let err = RegistryError::ScanFailed {
                        path: root.clone(),
                        source: e,
                    };
                    report.push(FindingKind::Unrecoverable, self.relative(&root), err.to_string());
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(REGISTRY_EXTENSION)
            {
                continue;
            }

            let (Some(provider), Some(id)) = (
                path.parent()
                    .and_then(Path::file_name)
                    .and_then(|name| name.to_str()),
                path.file_stem().and_then(|stem| stem.to_str()),
            ) else {
                continue;
            };

            if known.owns(provider, id) {
                continue;
            }

            let relative = self.relative(path);
            if self.fix {
                match fs::remove_file(path) {
                    Ok(()) => report.push(
                        FindingKind::Fixed,
                        relative,
                        format!("removed registry file of unknown unit '{}'", id),
                    ),
                    Err(e) => {
                        let err = RegistryError::RemoveFile {
                            path: path.to_path_buf(),
                            source: e,
                        };
                        report.push(FindingKind::Unrecoverable, relative, err.to_string());
                    }
                }
            } else {
                report.push(
                    FindingKind::Fixable,
                    relative,
                    format!("registry file of unknown unit '{}'", id),
                );
            }
        }
    }

    fn check_root_regex<'a>(&self, ids: impl Iterator<Item = &'a str>, report: &mut CheckReport) {
        let path = self.layout.root_pipeline();
        let relative = self.relative(&path);
        let expected = expected_units_regex(ids);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                let err = RegistryError::ReadFile {
                    path: path.clone(),
                    source: e,
                };
                report.push(FindingKind::Unrecoverable, relative, err.to_string());
                return;
            }
        };

        let Some(found) = RootRegex::find(&content) else {
            let err = RegistryError::MissingUnitsRegex(path.clone());
            report.push(
                FindingKind::Unrecoverable,
                relative,
                format!("{}; expected regex: {}", err, expected),
            );
            return;
        };

        if found.value == expected {
            return;
        }

        if self.fix {
            let updated = found.replace(&content, &expected);
            match write_atomic(&path, &updated) {
                Ok(()) => report.push(
                    FindingKind::Fixed,
                    relative,
                    format!("updated units regex to {}", expected),
                ),
                Err(e) => report.push(FindingKind::Unrecoverable, relative, e.to_string()),
            }
        } else {
            report.push(
                FindingKind::Fixable,
                relative,
                format!(
                    "units regex is out of date: expected {}, found {}",
                    expected, found.value
                ),
            );
        }
    }

    fn relative(&self, path: &Path) -> PathBuf {
        self.layout.relative_path(path)
    }
}

/// Reads a file as raw bytes. A missing file is `None`.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, RegistryError> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RegistryError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes through a sibling temporary file renamed over `path`.
fn write_atomic(path: &Path, content: &str) -> Result<(), RegistryError> {
    let write_err = |source: io::Error| RegistryError::WriteFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp, content).map_err(write_err)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    Ok(())
}
