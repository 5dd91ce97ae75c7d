//! Repository identifier parsing

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MEMORY_MARKER: &str = "ram://";
pub const ISOLATED_MARKERS: &[&str] = &["docker://", "container://"];
pub const LOCAL_MARKER: &str = "local://";

const TRANSPORT_SCHEMES: &[&str] = &["https://", "http://", "ssh://", "git://", "file://"];

/// Storage strategy a repository is loaded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Existing directory, used in place
    Local,
    /// Clone under the memory-backed root, gated by admission control
    MemoryResident,
    /// Clone inside an isolation context
    Isolated,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => write!(f, "local"),
            Backend::MemoryResident => write!(f, "memory"),
            Backend::Isolated => write!(f, "isolated"),
        }
    }
}

/// Normalized form of a repository identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSource {
    /// Clone URL or filesystem path
    pub location: String,
    pub backend: Backend,
    /// Last path segment without `.git`
    pub name: String,
}

impl RepoSource {
    /// Whether `location` must be fetched with the VCS client
    pub fn is_remote(&self) -> bool {
        has_transport(&self.location)
    }

    /// Name or id of an existing isolation context, for isolated
    /// identifiers that do not point at a remote
    pub fn context_reference(&self) -> Option<&str> {
        if self.backend == Backend::Isolated && !self.is_remote() && !self.location.is_empty() {
            Some(&self.location)
        } else {
            None
        }
    }
}

/// Parse an identifier into its location, backend and name.
///
/// Bare `host/org/repo` strings become `https://` URLs, explicit transports
/// pass through, `ram://` / `docker://` / `container://` / `local://`
/// select a backend, and everything else is a local path. Remote locations
/// without a marker default to the memory-resident backend. An isolated
/// marker followed by anything but a remote names an existing context.
pub fn parse(identifier: &str) -> RepoSource {
    let identifier = identifier.trim();

    let (backend, rest) = if let Some(rest) = identifier.strip_prefix(MEMORY_MARKER) {
        (Some(Backend::MemoryResident), rest)
    } else if let Some(rest) = ISOLATED_MARKERS
        .iter()
        .find_map(|marker| identifier.strip_prefix(marker))
    {
        (Some(Backend::Isolated), rest)
    } else if let Some(rest) = identifier.strip_prefix(LOCAL_MARKER) {
        (Some(Backend::Local), rest)
    } else {
        (None, identifier)
    };

    let location = if backend != Some(Backend::Local) && is_bare_remote(rest) {
        format!("https://{}", rest)
    } else {
        rest.to_string()
    };

    let backend = backend.unwrap_or(if has_transport(&location) {
        Backend::MemoryResident
    } else {
        Backend::Local
    });

    RepoSource {
        name: derive_name(&location),
        location,
        backend,
    }
}

fn has_transport(location: &str) -> bool {
    TRANSPORT_SCHEMES
        .iter()
        .any(|scheme| location.starts_with(scheme))
        || scp_like().is_match(location)
}

fn is_bare_remote(candidate: &str) -> bool {
    !has_transport(candidate) && !Path::new(candidate).exists() && bare_remote().is_match(candidate)
}

fn derive_name(location: &str) -> String {
    let trimmed = location.trim_end_matches('/');
    let segment = trimmed
        .rsplit(['/', ':', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or(trimmed);
    let name = segment.strip_suffix(".git").unwrap_or(segment);
    if name.is_empty() || name == "." || name == ".." {
        "repo".to_string()
    } else {
        name.to_string()
    }
}

fn bare_remote() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,}/[^/\s]+/[^/\s]+(/.*)?$")
            .expect("valid bare remote regex")
    })
}

fn scp_like() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.-]+@[A-Za-z0-9.-]+:[^/\s].*$").expect("valid scp regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_remote() {
        let source = parse("github.com/user/repo");
        assert_eq!(source.location, "https://github.com/user/repo");
        assert_eq!(source.backend, Backend::MemoryResident);
        assert_eq!(source.name, "repo");
        assert!(source.is_remote());
    }

    #[test]
    fn test_parse_explicit_transport_unchanged() {
        for url in [
            "https://github.com/user/repo",
            "https://github.com/user/repo.git",
            "ssh://git@github.com/user/repo.git",
            "git@github.com:user/repo.git",
        ] {
            let source = parse(url);
            assert_eq!(source.location, url);
            assert_eq!(source.backend, Backend::MemoryResident);
            assert_eq!(source.name, "repo");
        }
    }

    #[test]
    fn test_parse_memory_marker() {
        let source = parse("ram://github.com/user/tool.git");
        assert_eq!(source.backend, Backend::MemoryResident);
        assert_eq!(source.location, "https://github.com/user/tool.git");
        assert_eq!(source.name, "tool");
    }

    #[test]
    fn test_parse_isolated_markers() {
        let docker = parse("docker://github.com/user/repo");
        assert_eq!(docker.backend, Backend::Isolated);
        assert_eq!(docker.location, "https://github.com/user/repo");

        let container = parse("container://https://gitlab.com/group/project.git");
        assert_eq!(container.backend, Backend::Isolated);
        assert_eq!(container.location, "https://gitlab.com/group/project.git");
        assert_eq!(container.name, "project");
        assert_eq!(container.context_reference(), None);
    }

    #[test]
    fn test_parse_context_reference() {
        let source = parse("container://test_container_123");
        assert_eq!(source.backend, Backend::Isolated);
        assert_eq!(source.context_reference(), Some("test_container_123"));
        assert_eq!(source.name, "test_container_123");

        assert_eq!(parse("docker://4f2a9c").context_reference(), Some("4f2a9c"));
        assert_eq!(parse("test_container_123").context_reference(), None);
    }

    #[test]
    fn test_parse_local_paths() {
        let source = parse("/tmp/some/checkout");
        assert_eq!(source.backend, Backend::Local);
        assert_eq!(source.location, "/tmp/some/checkout");
        assert_eq!(source.name, "checkout");
        assert!(!source.is_remote());

        let relative = parse("./project/");
        assert_eq!(relative.backend, Backend::Local);
        assert_eq!(relative.name, "project");

        let dot = parse(".");
        assert_eq!(dot.backend, Backend::Local);
        assert_eq!(dot.name, "repo");
    }

    #[test]
    fn test_parse_local_marker_never_rewritten() {
        let source = parse("local://github.com/user/repo");
        assert_eq!(source.backend, Backend::Local);
        assert_eq!(source.location, "github.com/user/repo");
    }

    #[test]
    fn test_absolute_path_with_domain_segment_stays_local() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("example.com").join("org").join("repo");
        std::fs::create_dir_all(&nested).unwrap();

        let source = parse(&nested.to_string_lossy());
        assert_eq!(source.backend, Backend::Local);
        assert_eq!(source.location, nested.to_string_lossy());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Local.to_string(), "local");
        assert_eq!(Backend::MemoryResident.to_string(), "memory");
        assert_eq!(Backend::Isolated.to_string(), "isolated");
    }
}
