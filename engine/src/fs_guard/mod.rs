use crate::config::SecurityConfig;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Number of denied attempts kept in the audit trail
const AUDIT_CAPACITY: usize = 256;

/// Whether a path is about to be read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// A single rule a path broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Matches the sensitive-path deny list
    DeniedPath(PathBuf),
    /// Could not be resolved (missing, broken symlink, `..` in a new path)
    Unresolvable(String),
    /// Resolves outside every allowed root
    OutsideAllowedRoots,
    /// Extension not in the read allow-list (`None` = no extension)
    DisallowedExtension(Option<String>),
    /// Write target is protected
    DisallowedWriteTarget(String),
    /// Too many components below the allowed root
    TooDeep { depth: usize, max: usize },
    /// File exceeds the per-file size limit
    TooLarge { size: u64, max: u64 },
    /// A FIFO, socket or device rather than a regular file
    NotRegularFile,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DeniedPath(p) => write!(f, "matches deny list ({})", p.display()),
            Violation::Unresolvable(reason) => write!(f, "cannot be resolved: {}", reason),
            Violation::OutsideAllowedRoots => f.write_str("resolves outside allowed roots"),
            Violation::DisallowedExtension(Some(ext)) => {
                write!(f, "extension .{} is not allowed", ext)
            }
            Violation::DisallowedExtension(None) => f.write_str("files without extension are not allowed"),
            Violation::DisallowedWriteTarget(name) => write!(f, "{} may not be written", name),
            Violation::TooDeep { depth, max } => {
                write!(f, "depth {} exceeds limit of {}", depth, max)
            }
            Violation::TooLarge { size, max } => {
                write!(f, "size {} bytes exceeds limit of {} bytes", size, max)
            }
            Violation::NotRegularFile => f.write_str("not a regular file"),
        }
    }
}

/// Outcome of `SecurityGate::validate`.
///
/// `violations` holds every broken rule, not only the first.
#[derive(Debug, Clone)]
pub struct PathValidation {
    pub ok: bool,
    pub resolved_path: Option<PathBuf>,
    pub violations: Vec<Violation>,
}

impl PathValidation {
    /// Convert into a `Result`, keeping every violation in the error.
    pub fn into_result(self, requested: &Path) -> Result<PathBuf, EngineError> {
        match (self.ok, self.resolved_path) {
            (true, Some(resolved)) => Ok(resolved),
            _ => Err(EngineError::PathRejected {
                path: requested.to_path_buf(),
                violations: self.violations.iter().map(|v| v.to_string()).collect(),
            }),
        }
    }
}

/// A denied attempt, kept for audit.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub path: PathBuf,
    pub mode: AccessMode,
    pub violations: Vec<String>,
    pub at: DateTime<Utc>,
}

/// SecurityGate validates and resolves every path before it is read or written.
///
/// It maintains a deny list of sensitive paths and performs double canonicalization
/// checks to prevent symlink-based bypass attacks.
///
/// # Security Model
///
/// Validation runs every gate and collects all violations:
/// 1. Check deny list before canonicalization
/// 2. Canonicalize path to resolve symlinks and .. patterns
/// 3. Check deny list after canonicalization
/// 4. Verify path is within one of the allowed roots
/// 5. Verify depth below that root
/// 6. Read: extension allow-list and size limit. Write: protected targets
#[derive(Debug)]
pub struct SecurityGate {
    allowed_roots: Vec<PathBuf>,
    allowed_extensions: HashSet<String>,
    denied_write_targets: HashSet<String>,
    max_depth: usize,
    max_file_size: u64,
    deny_list: Vec<PathBuf>,
    audit: Mutex<VecDeque<AuditRecord>>,
}

impl SecurityGate {
    /// Creates a gate from validated security configuration.
    ///
    /// Allowed roots are expected to be canonical already
    /// (`Config::validate_and_process` does that); any root that still fails
    /// to canonicalize is kept as given and will simply never match.
    ///
    /// The deny list includes common sensitive paths:
    /// - .ssh, .gnupg (keys)
    /// - .env (environment variables)
    /// - .aws/credentials, .config/gcloud, .kube/config (cloud credentials)
    /// - id_rsa, id_ed25519, id_dsa (SSH private keys)
    pub fn new(config: &SecurityConfig) -> Self {
        let allowed_roots = config
            .allowed_roots
            .iter()
            .map(|root| root.canonicalize().unwrap_or_else(|_| root.clone()))
            .collect();

        let deny_list = vec![
            PathBuf::from(".ssh"),
            PathBuf::from(".env"),
            PathBuf::from(".aws/credentials"),
            PathBuf::from(".config/gcloud"),
            PathBuf::from("id_rsa"),
            PathBuf::from("id_ed25519"),
            PathBuf::from("id_dsa"),
            PathBuf::from(".gnupg"),
            PathBuf::from(".kube/config"),
            PathBuf::from("credentials"),
            PathBuf::from("private_key"),
            PathBuf::from(".npmrc"),
            PathBuf::from(".pypirc"),
        ];

        Self {
            allowed_roots,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            denied_write_targets: config.denied_write_targets.iter().cloned().collect(),
            max_depth: config.max_depth,
            max_file_size: config.max_file_size_bytes,
            deny_list,
            audit: Mutex::new(VecDeque::new()),
        }
    }

    /// Validates a path through every gate.
    ///
    /// Relative paths are joined to the first allowed root. For `Write` targets
    /// that do not exist yet, the nearest existing ancestor is canonicalized and
    /// the remaining components re-attached.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::{Path, PathBuf};
    /// use cadre_engine::config::SecurityConfig;
    /// use cadre_engine::fs_guard::{AccessMode, SecurityGate};
    ///
    /// let config = SecurityConfig {
    ///     allowed_roots: vec![PathBuf::from("/home/user/project")],
    ///     ..SecurityConfig::default()
    /// };
    /// let gate = SecurityGate::new(&config);
    ///
    /// let valid = gate.validate(Path::new("/home/user/project/src/main.rs"), AccessMode::Read);
    /// assert!(valid.ok);
    ///
    /// let invalid = gate.validate(Path::new("/home/user/project/../.ssh/id_rsa"), AccessMode::Read);
    /// assert!(!invalid.ok);
    /// ```
    pub fn validate(&self, path: &Path, mode: AccessMode) -> PathValidation {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            match self.allowed_roots.first() {
                Some(root) => root.join(path),
                None => path.to_path_buf(),
            }
        };

        let mut violations = Vec::new();

        // Gate 1: Check deny list before canonicalization
        if let Some(denied) = self.denied_entry(&absolute) {
            violations.push(Violation::DeniedPath(denied));
        }

        // Gate 2: Canonicalize to resolve symlinks and .. patterns
        let canonical = match resolve(&absolute, mode) {
            Ok(canonical) => canonical,
            Err(reason) => {
                violations.push(Violation::Unresolvable(reason));
                if mode == AccessMode::Read {
                    if let Some(v) = self.extension_violation(&absolute) {
                        violations.push(v);
                    }
                }
                return self.finish(path, mode, None, violations);
            }
        };

        // Gate 3: Check deny list after canonicalization (catches symlink bypasses)
        if let Some(denied) = self.denied_entry(&canonical) {
            if !violations.contains(&Violation::DeniedPath(denied.clone())) {
                violations.push(Violation::DeniedPath(denied));
            }
        }

        // Gate 4: Verify within an allowed root
        match self
            .allowed_roots
            .iter()
            .find(|root| canonical.starts_with(root))
        {
            Some(root) => {
                // Gate 5: Depth below the root
                let depth = canonical
                    .strip_prefix(root)
                    .map(|rel| rel.components().count())
                    .unwrap_or(0);
                if depth > self.max_depth {
                    violations.push(Violation::TooDeep {
                        depth,
                        max: self.max_depth,
                    });
                }
            }
            None => violations.push(Violation::OutsideAllowedRoots),
        }

        // Gate 6: Mode-specific rules
        match mode {
            AccessMode::Read => {
                let metadata = std::fs::metadata(&canonical);
                let is_dir = metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false);
                if !is_dir {
                    if let Some(v) = self.extension_violation(&canonical) {
                        violations.push(v);
                    }
                    if let Ok(meta) = &metadata {
                        if !meta.is_file() {
                            violations.push(Violation::NotRegularFile);
                        } else if meta.len() > self.max_file_size {
                            violations.push(Violation::TooLarge {
                                size: meta.len(),
                                max: self.max_file_size,
                            });
                        }
                    }
                }
            }
            AccessMode::Write => {
                if let Some(v) = self.write_target_violation(&canonical) {
                    violations.push(v);
                }
            }
        }

        self.finish(path, mode, Some(canonical), violations)
    }

    /// Validate and convert straight into a `Result`.
    pub fn validate_or_reject(&self, path: &Path, mode: AccessMode) -> Result<PathBuf, EngineError> {
        self.validate(path, mode).into_result(path)
    }

    /// Re-check the size limit once the actual byte count is known.
    ///
    /// Metadata can change between validation and read; the loader calls this
    /// after every read and discards the content on failure.
    pub fn check_read_size(&self, path: &Path, size: u64) -> Result<(), Violation> {
        if size > self.max_file_size {
            let violation = Violation::TooLarge {
                size,
                max: self.max_file_size,
            };
            self.record(path, AccessMode::Read, std::slice::from_ref(&violation));
            return Err(violation);
        }
        Ok(())
    }

    /// Per-file read limit in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Cheap pre-filter used during enumeration: true when the file's
    /// extension is on the read allow-list. Does not record anything.
    pub fn is_allowed_extension(&self, path: &Path) -> bool {
        self.extension_violation(path).is_none()
    }

    /// Returns the canonical allowed roots.
    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Snapshot of recent denied attempts, oldest first.
    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.audit
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn finish(
        &self,
        requested: &Path,
        mode: AccessMode,
        resolved: Option<PathBuf>,
        violations: Vec<Violation>,
    ) -> PathValidation {
        let ok = violations.is_empty() && resolved.is_some();
        if !ok {
            self.record(requested, mode, &violations);
        }
        PathValidation {
            ok,
            resolved_path: resolved,
            violations,
        }
    }

    fn record(&self, path: &Path, mode: AccessMode, violations: &[Violation]) {
        let reasons: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
        warn!(
            "Denied {:?} access to {}: {}",
            mode,
            path.display(),
            reasons.join("; ")
        );

        let mut audit = self
            .audit
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if audit.len() == AUDIT_CAPACITY {
            audit.pop_front();
        }
        audit.push_back(AuditRecord {
            path: path.to_path_buf(),
            mode,
            violations: reasons,
            at: Utc::now(),
        });
    }

    /// Returns the deny-list entry a path matches, if any.
    ///
    /// This checks both:
    /// - If the path ends with a denied path
    /// - If any component in the path matches a denied entry
    fn denied_entry(&self, path: &Path) -> Option<PathBuf> {
        self.deny_list
            .iter()
            .find(|denied| {
                path.ends_with(denied)
                    || path.components().any(|c| {
                        c.as_os_str()
                            .to_str()
                            .is_some_and(|s| denied.as_os_str().to_str() == Some(s))
                    })
            })
            .cloned()
    }

    fn extension_violation(&self, path: &Path) -> Option<Violation> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext {
            Some(ext) if self.allowed_extensions.contains(&ext) => None,
            other => Some(Violation::DisallowedExtension(other)),
        }
    }

    fn write_target_violation(&self, path: &Path) -> Option<Violation> {
        if path
            .components()
            .any(|c| c.as_os_str().to_str() == Some(".git"))
        {
            return Some(Violation::DisallowedWriteTarget(".git".to_string()));
        }
        let name = path.file_name().and_then(|n| n.to_str())?;
        if self.denied_write_targets.contains(name) {
            return Some(Violation::DisallowedWriteTarget(name.to_string()));
        }
        None
    }
}

/// Canonicalize a path. Write targets may not exist yet, so for those the
/// nearest existing ancestor is resolved and the missing tail re-attached.
fn resolve(path: &Path, mode: AccessMode) -> Result<PathBuf, String> {
    match path.canonicalize() {
        Ok(canonical) => Ok(canonical),
        Err(e) if mode == AccessMode::Read => Err(e.to_string()),
        Err(e) => {
            let mut existing = path;
            let mut tail = Vec::new();
            while !existing.exists() {
                let name = existing.file_name().ok_or_else(|| e.to_string())?;
                tail.push(name.to_os_string());
                existing = existing.parent().ok_or_else(|| e.to_string())?;
            }
            if path
                .strip_prefix(existing)
                .map(|rest| rest.components().any(|c| matches!(c, Component::ParentDir)))
                .unwrap_or(true)
            {
                return Err("parent segments in a path that does not exist".to_string());
            }
            let mut canonical = existing.canonicalize().map_err(|e| e.to_string())?;
            for part in tail.iter().rev() {
                canonical.push(part);
            }
            Ok(canonical)
        }
    }
}
