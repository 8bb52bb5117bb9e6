//! Frame origin classification for separating script code from everything else.
//!
//! Only frames from the user's own script files are worth reporting. Tracing
//! infrastructure (the tracer's own files, the thread library that starts
//! traced threads) must never appear in its own trace, and native or
//! file-less modules have nothing useful to show.
//!
//! # Classification Rules
//!
//! 1. **No source file** - module is not backed by a user file → `NoSource`
//! 2. **Ignore set** - exact file match → `Ignored` (takes precedence)
//! 3. **Include prefixes** - when any are configured, the file must start
//!    with one of them → otherwise `NotIncluded`
//! 4. Everything else → `Script`
//!
//! Paths are compared after turning `\` into `/`, so a trace decoded on
//! Windows matches rules written either way.

use log::debug;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::symbolization::{Function, Module, SymbolRegistry};

/// Origin of a frame, decided from its module's source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameOrigin {
    /// User script code, reported
    Script,
    /// Source file is in the ignore set
    Ignored,
    /// Include prefixes are configured and none matched
    NotIncluded,
    /// Module has no source file, or is unknown
    #[default]
    NoSource,
}

impl FrameOrigin {
    /// Returns true if this frame belongs in a resolved stack.
    #[must_use]
    pub fn is_script(self) -> bool {
        matches!(self, FrameOrigin::Script)
    }
}

/// Filter rules supplied by the host that owns the traced process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterConfig {
    /// Files whose frames are never reported
    pub ignore_files: Vec<String>,
    /// When non-empty, only files under one of these prefixes are reported
    pub include_prefixes: Vec<String>,
    /// Tracer and thread-library files, ignored like `ignore_files`
    pub infrastructure_files: Vec<String>,
}

/// Decides which frames are reportable script frames.
///
/// Both rule sets only grow during a session, so adding a rule can only
/// ever remove frames from later stacks.
#[derive(Debug, Default)]
pub struct FrameFilter {
    ignored: BTreeSet<String>,
    include_prefixes: Vec<String>,
    diagnostics: FilterDiagnostics,
}

impl FrameFilter {
    /// Filter with no rules: every frame with a source file is reportable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(config: &FilterConfig) -> Self {
        let mut filter = Self::new();
        filter.ignore(&config.infrastructure_files);
        filter.ignore(&config.ignore_files);
        filter.include(&config.include_prefixes);
        filter
    }

    /// Add files to the ignore set.
    pub fn ignore<I, S>(&mut self, files: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for file in files {
            let file = normalize(file.as_ref()).into_owned();
            if self.ignored.insert(file.clone()) {
                debug!("Ignoring frames from {file}");
            }
        }
    }

    /// Add prefixes to the include list.
    pub fn include<I, S>(&mut self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for prefix in prefixes {
            let prefix = normalize(prefix.as_ref()).into_owned();
            if !self.include_prefixes.contains(&prefix) {
                debug!("Including frames under {prefix}");
                self.include_prefixes.push(prefix);
            }
        }
    }

    /// Classify a source file path.
    #[must_use]
    pub fn classify_source(&self, source_file: Option<&str>) -> FrameOrigin {
        let origin = match source_file {
            None => FrameOrigin::NoSource,
            Some(path) => {
                let path = normalize(path);
                if self.ignored.contains(path.as_ref()) {
                    FrameOrigin::Ignored
                } else if !self.include_prefixes.is_empty()
                    && !self.include_prefixes.iter().any(|p| path.starts_with(p.as_str()))
                {
                    FrameOrigin::NotIncluded
                } else {
                    FrameOrigin::Script
                }
            }
        };
        self.diagnostics.record(origin);
        origin
    }

    /// Classify a module. Unknown modules have no source file.
    #[must_use]
    pub fn classify_module(&self, module: Option<&Module>) -> FrameOrigin {
        self.classify_source(module.and_then(|m| m.source_file.as_deref()))
    }

    /// Returns true if `function`'s owning module passes the filter.
    #[must_use]
    pub fn is_reportable(&self, registry: &SymbolRegistry, function: &Function) -> bool {
        self.classify_module(registry.module_of(function)).is_script()
    }

    pub fn ignored_files(&self) -> impl Iterator<Item = &str> {
        self.ignored.iter().map(String::as_str)
    }

    #[must_use]
    pub fn include_prefixes(&self) -> &[String] {
        &self.include_prefixes
    }

    #[must_use]
    pub fn diagnostics(&self) -> &FilterDiagnostics {
        &self.diagnostics
    }
}

fn normalize(path: &str) -> Cow<'_, str> {
    if path.contains('\\') {
        Cow::Owned(path.replace('\\', "/"))
    } else {
        Cow::Borrowed(path)
    }
}

// =============================================================================
// CLASSIFICATION DIAGNOSTICS
// =============================================================================

/// Counts classification outcomes so a report can explain why stacks came
/// out empty (everything ignored, include prefix too narrow, ...).
#[derive(Debug, Default)]
pub struct FilterDiagnostics {
    script: AtomicU64,
    ignored: AtomicU64,
    not_included: AtomicU64,
    no_source: AtomicU64,
}

impl FilterDiagnostics {
    fn record(&self, origin: FrameOrigin) {
        let counter = match origin {
            FrameOrigin::Script => &self.script,
            FrameOrigin::Ignored => &self.ignored,
            FrameOrigin::NotIncluded => &self.not_included,
            FrameOrigin::NoSource => &self.no_source,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn count(&self, origin: FrameOrigin) -> u64 {
        match origin {
            FrameOrigin::Script => &self.script,
            FrameOrigin::Ignored => &self.ignored,
            FrameOrigin::NotIncluded => &self.not_included,
            FrameOrigin::NoSource => &self.no_source,
        }
        .load(Ordering::Relaxed)
    }

    /// Percentage of classified frames that were script frames.
    ///
    /// Returns 100.0 if nothing has been classified yet.
    #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for percentages
    pub fn script_coverage(&self) -> f64 {
        let script = self.count(FrameOrigin::Script);
        let total = script
            + self.count(FrameOrigin::Ignored)
            + self.count(FrameOrigin::NotIncluded)
            + self.count(FrameOrigin::NoSource);

        if total > 0 {
            (script as f64 / total as f64) * 100.0
        } else {
            100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rules_requires_source_file() {
        let filter = FrameFilter::new();
        assert_eq!(filter.classify_source(Some("a.py")), FrameOrigin::Script);
        assert_eq!(filter.classify_source(None), FrameOrigin::NoSource);
        assert!(!FrameOrigin::NoSource.is_script());
    }

    #[test]
    fn test_ignore_is_exact_match() {
        let mut filter = FrameFilter::new();
        filter.ignore(["/lib/threading.py"]);

        assert_eq!(filter.classify_source(Some("/lib/threading.py")), FrameOrigin::Ignored);
        assert_eq!(filter.classify_source(Some("/lib/threading.pyc")), FrameOrigin::Script);
    }

    #[test]
    fn test_include_prefix_restricts() {
        let mut filter = FrameFilter::new();
        filter.include(["/home/user/project/"]);

        assert_eq!(filter.classify_source(Some("/home/user/project/app.py")), FrameOrigin::Script);
        assert_eq!(filter.classify_source(Some("/usr/lib/python/json.py")), FrameOrigin::NotIncluded);
    }

    #[test]
    fn test_ignore_beats_include() {
        let mut filter = FrameFilter::new();
        filter.include(["/srv/"]);
        filter.ignore(["/srv/tracer.py"]);

        assert_eq!(filter.classify_source(Some("/srv/tracer.py")), FrameOrigin::Ignored);
        assert_eq!(filter.classify_source(Some("/srv/app.py")), FrameOrigin::Script);
    }

    #[test]
    fn test_backslash_paths_match() {
        let mut filter = FrameFilter::new();
        filter.ignore([r"C:\Python\Lib\threading.py"]);
        filter.include(["C:/work/"]);

        assert_eq!(filter.classify_source(Some("C:/Python/Lib/threading.py")), FrameOrigin::Ignored);
        assert_eq!(filter.classify_source(Some(r"C:\work\script.py")), FrameOrigin::Script);
    }

    #[test]
    fn test_from_config_ignores_infrastructure() {
        let config = FilterConfig {
            infrastructure_files: vec!["/pkg/etwtrace/__init__.py".to_string()],
            ..FilterConfig::default()
        };
        let filter = FrameFilter::from_config(&config);

        assert_eq!(filter.classify_source(Some("/pkg/etwtrace/__init__.py")), FrameOrigin::Ignored);
        assert_eq!(filter.ignored_files().count(), 1);
    }

    #[test]
    fn test_adding_ignore_never_adds_frames() {
        let paths = [Some("a.py"), Some("b.py"), None, Some("lib/c.py")];
        let mut filter = FrameFilter::new();
        let before: Vec<bool> = paths.iter().map(|p| filter.classify_source(*p).is_script()).collect();

        filter.ignore(["b.py"]);
        let after: Vec<bool> = paths.iter().map(|p| filter.classify_source(*p).is_script()).collect();

        for (was, now) in before.iter().zip(&after) {
            assert!(*was || !*now, "ignore rule added a frame");
        }
        assert_eq!(after, vec![true, false, false, true]);
    }

    #[test]
    fn test_diagnostics_coverage() {
        let filter = FrameFilter::new();
        assert!((filter.diagnostics().script_coverage() - 100.0).abs() < f64::EPSILON);

        let _ = filter.classify_source(Some("a.py"));
        let _ = filter.classify_source(None);

        assert_eq!(filter.diagnostics().count(FrameOrigin::Script), 1);
        assert_eq!(filter.diagnostics().count(FrameOrigin::NoSource), 1);
        assert!((filter.diagnostics().script_coverage() - 50.0).abs() < 0.01);
    }
}
