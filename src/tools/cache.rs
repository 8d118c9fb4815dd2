//! The tool cache: verified tool handles and checksummed artifact fetches.
//!
//! Discovery walks a prioritized candidate list (explicit configuration
//! override, the managed cache `bin/` directory, the ambient `PATH`) and
//! probes each candidate's version until one satisfies the constraint.
//! Fetches are idempotent, keyed by (locator, checksum), and serialized
//! per locator so concurrent callers reuse one download.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use regex::Regex;

use crate::tools::{ExecutionResult, ToolError};
use crate::util::hash::{sha256_file, sha256_str};
use crate::util::process::ProcessBuilder;

/// Version probes get a short, fixed deadline; a tool that cannot print its
/// version in this time is treated as unusable.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for full tool invocations.
const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(600);

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("static regex"));

/// What a caller requires of an external tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Logical tool name, also the executable name searched on PATH.
    pub name: String,

    /// Arguments for the version probe.
    pub probe_args: Vec<String>,

    /// Acceptable version range; `None` accepts any probed version.
    pub version_req: Option<semver::VersionReq>,

    /// Capability flags the handle should advertise.
    pub capabilities: BTreeSet<String>,

    /// Shown to the operator when the tool is missing.
    pub install_hint: Option<String>,
}

impl ToolSpec {
    /// A spec probing `<name> --version` with no version constraint.
    pub fn new(name: impl Into<String>) -> Self {
        ToolSpec {
            name: name.into(),
            probe_args: vec!["--version".to_string()],
            version_req: None,
            capabilities: BTreeSet::new(),
            install_hint: None,
        }
    }

    /// Set the acceptable version range.
    pub fn with_version_req(mut self, req: semver::VersionReq) -> Self {
        self.version_req = Some(req);
        self
    }

    /// Set the version probe arguments.
    pub fn with_probe_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.probe_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the install hint.
    pub fn with_install_hint(mut self, hint: impl Into<String>) -> Self {
        self.install_hint = Some(hint.into());
        self
    }

    fn memo_key(&self) -> String {
        match &self.version_req {
            Some(req) => format!("{}@{}", self.name, req),
            None => format!("{}@*", self.name),
        }
    }
}

/// A verified reference to an external tool.
///
/// Valid for the current run only; handles are re-verified on the next run,
/// never trusted across process restarts.
#[derive(Debug, Clone)]
pub struct ToolHandle {
    /// Logical tool name.
    pub name: String,

    /// Resolved executable path.
    pub path: PathBuf,

    /// Version reported by the probe.
    pub version: semver::Version,

    /// Capability flags carried over from the spec.
    pub capabilities: BTreeSet<String>,
}

impl ToolHandle {
    /// Whether the handle advertises a capability flag.
    pub fn has_capability(&self, flag: &str) -> bool {
        self.capabilities.contains(flag)
    }
}

/// Injected download capability, so the cache itself carries no network
/// client policy and tests can count or fake transfers.
pub trait Downloader: Send + Sync {
    /// Stream the artifact at `url` into `dest`.
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<(), ToolError>;
}

/// Downloader backed by a blocking HTTP client.
pub struct HttpDownloader;

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<(), ToolError> {
        let map_err = |e: &dyn std::fmt::Display| ToolError::Download {
            locator: url.to_string(),
            message: e.to_string(),
        };

        let mut response = reqwest::blocking::get(url).map_err(|e| map_err(&e))?;
        if !response.status().is_success() {
            return Err(ToolError::Download {
                locator: url.to_string(),
                message: format!("server returned {}", response.status()),
            });
        }

        response.copy_to(dest).map_err(|e| map_err(&e))?;
        Ok(())
    }
}

/// Shared tool and artifact cache for one process.
pub struct ToolCache {
    cache_root: PathBuf,
    overrides: BTreeMap<String, PathBuf>,
    invoke_timeout: Duration,
    downloader: Box<dyn Downloader>,
    verified: Mutex<HashMap<String, ToolHandle>>,
    fetch_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ToolCache {
    /// Create a cache rooted at `cache_root` with the real HTTP downloader.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self::with_downloader(cache_root, Box::new(HttpDownloader))
    }

    /// Create a cache with an injected downloader.
    pub fn with_downloader(cache_root: impl Into<PathBuf>, downloader: Box<dyn Downloader>) -> Self {
        ToolCache {
            cache_root: cache_root.into(),
            overrides: BTreeMap::new(),
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            downloader,
            verified: Mutex::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Pin a tool to an explicit executable path (configuration override).
    pub fn with_override(mut self, tool: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(tool.into(), path.into());
        self
    }

    /// Set the invocation deadline.
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    /// The managed cache root.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Locate and verify a tool satisfying `spec`.
    ///
    /// Candidates are tried in priority order: configuration override, the
    /// managed `bin/` directory, then `PATH`. The first candidate whose
    /// probed version satisfies the constraint wins and is memoized for the
    /// rest of the run.
    pub fn verify(&self, spec: &ToolSpec) -> Result<ToolHandle, ToolError> {
        let memo_key = spec.memo_key();
        if let Some(handle) = self.verified.lock().unwrap().get(&memo_key) {
            return Ok(handle.clone());
        }

        let mut closest: Option<(PathBuf, semver::Version)> = None;

        for candidate in self.candidates(&spec.name) {
            let probed = self.probe_version(spec, &candidate);

            // Without a version constraint, a candidate that exists but
            // prints nothing version-shaped is still usable.
            let version = match (probed, &spec.version_req) {
                (Some(version), _) => version,
                (None, None) => semver::Version::new(0, 0, 0),
                (None, Some(_)) => continue,
            };

            let satisfied = spec
                .version_req
                .as_ref()
                .map(|req| req.matches(&version))
                .unwrap_or(true);

            if satisfied {
                tracing::debug!(
                    "verified {} {} at {}",
                    spec.name,
                    version,
                    candidate.display()
                );
                let handle = ToolHandle {
                    name: spec.name.clone(),
                    path: candidate,
                    version,
                    capabilities: spec.capabilities.clone(),
                };
                self.verified
                    .lock()
                    .unwrap()
                    .insert(memo_key, handle.clone());
                return Ok(handle);
            }

            if closest.is_none() {
                closest = Some((candidate, version));
            }
        }

        match closest {
            Some((path, found)) => Err(ToolError::VersionMismatch {
                tool: spec.name.clone(),
                path,
                found,
                required: spec
                    .version_req
                    .clone()
                    .expect("a candidate can only miss an existing constraint"),
            }),
            None => Err(ToolError::NotFound {
                tool: spec.name.clone(),
                install_hint: spec.install_hint.clone(),
            }),
        }
    }

    /// Fetch an artifact into the managed cache, verifying its checksum.
    ///
    /// The cache path is keyed by (locator, checksum), so a matching cached
    /// file short-circuits the download. A checksum mismatch discards the
    /// partial download and leaves nothing at the final path. Concurrent
    /// fetches of the same locator are serialized; the waiters reuse the
    /// first caller's result.
    pub fn fetch(&self, locator: &str, expected_checksum: &str) -> Result<PathBuf, ToolError> {
        let lock = self.locator_lock(locator);
        let _guard = lock.lock().unwrap();

        let final_path = self.artifact_path(locator, expected_checksum);

        if final_path.is_file() {
            let actual = sha256_file(&final_path).map_err(io_from_anyhow)?;
            if actual == expected_checksum {
                tracing::debug!("cache hit for {}", locator);
                return Ok(final_path);
            }
            // A corrupted cache entry is replaced, never served.
            tracing::warn!("discarding corrupted cache entry {}", final_path.display());
            std::fs::remove_file(&final_path)?;
        }

        let parent = final_path.parent().expect("artifact paths have parents");
        std::fs::create_dir_all(parent)?;

        tracing::info!("downloading {}", locator);
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        self.downloader.download(locator, temp.as_file_mut())?;
        temp.as_file_mut().flush()?;

        let actual = sha256_file(temp.path()).map_err(io_from_anyhow)?;
        if actual != expected_checksum {
            // Dropping the NamedTempFile unlinks the partial download.
            return Err(ToolError::ChecksumMismatch {
                locator: locator.to_string(),
                expected: expected_checksum.to_string(),
                actual,
            });
        }

        temp.persist(&final_path).map_err(|e| ToolError::Io(e.error))?;
        Ok(final_path)
    }

    /// Run a verified tool to completion.
    ///
    /// Exit codes are reported, not interpreted. Exceeding the configured
    /// deadline kills the process and yields [`ToolError::Timeout`].
    pub fn invoke(
        &self,
        handle: &ToolHandle,
        args: &[String],
        working_dir: &Path,
    ) -> Result<ExecutionResult, ToolError> {
        tracing::debug!(
            "invoking {} {} in {}",
            handle.path.display(),
            args.join(" "),
            working_dir.display()
        );

        let output = ProcessBuilder::new(&handle.path)
            .args(args)
            .cwd(working_dir)
            .exec_timeout(self.invoke_timeout)
            .map_err(|e| ToolError::Io(std::io::Error::other(e.to_string())))?;

        let Some(output) = output else {
            return Err(ToolError::Timeout {
                tool: handle.name.clone(),
                timeout_secs: self.invoke_timeout.as_secs(),
            });
        };

        Ok(ExecutionResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Candidate executable locations for a tool, highest priority first.
    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(path) = self.overrides.get(name) {
            candidates.push(path.clone());
        }

        let managed = self.cache_root.join("bin").join(name);
        if managed.is_file() {
            candidates.push(managed);
        }

        if let Ok(path) = which::which(name) {
            candidates.push(path);
        }

        candidates.retain(|p| p.is_file());
        candidates
    }

    /// Probe a candidate's version; `None` when it cannot be executed or
    /// prints nothing version-shaped.
    fn probe_version(&self, spec: &ToolSpec, candidate: &Path) -> Option<semver::Version> {
        let output = ProcessBuilder::new(candidate)
            .args(&spec.probe_args)
            .exec_timeout(PROBE_TIMEOUT)
            .ok()??;

        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        parse_version(&text)
    }

    fn artifact_path(&self, locator: &str, checksum: &str) -> PathBuf {
        let file_name = locator
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("artifact");
        let key = format!(
            "{}-{}",
            &sha256_str(locator)[..12],
            &checksum[..checksum.len().min(12)]
        );
        self.cache_root.join("artifacts").join(key).join(file_name)
    }

    fn locator_lock(&self, locator: &str) -> Arc<Mutex<()>> {
        let mut table = self.fetch_locks.lock().unwrap();
        table.entry(locator.to_string()).or_default().clone()
    }
}

/// Extract the first version-looking token from probe output.
fn parse_version(text: &str) -> Option<semver::Version> {
    let caps = VERSION_RE.captures(text)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some(semver::Version::new(major, minor, patch))
}

fn io_from_anyhow(e: anyhow::Error) -> ToolError {
    ToolError::Io(std::io::Error::other(e.to_string()))
}
