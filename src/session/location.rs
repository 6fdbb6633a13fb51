use crate::settings::PathMapping;
use std::fmt::{Display, Formatter};

/// File and line, either in the engine file system or in the local workspace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub target: String,
    pub line: i32,
}

impl Location {
    pub fn new(target: impl Into<String>, line: i32) -> Self {
        Self {
            target: target.into(),
            line,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.target, self.line)
    }
}

/// Converts locations between the engine and the local workspace by path prefixes.
#[derive(Debug, Default, Clone)]
pub struct LocationMapper {
    /// Engine prefix -> local prefix.
    remote_to_local: Vec<(String, String)>,
    /// Local prefix -> engine prefix.
    local_to_remote: Vec<(String, String)>,
}

impl LocationMapper {
    pub fn new(mappings: &[PathMapping]) -> Self {
        let mut mapper = LocationMapper::default();
        for mapping in mappings {
            mapper
                .remote_to_local
                .push((norm_prefix(&mapping.remote), mapping.local.clone()));
            mapper
                .local_to_remote
                .push((norm_prefix(&mapping.local), mapping.remote.clone()));
        }

        // longest prefix wins
        mapper
            .remote_to_local
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        mapper
            .local_to_remote
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        mapper
    }

    pub fn to_local(&self, remote: &Location) -> Location {
        Location::new(apply_map(&remote.target, &self.remote_to_local), remote.line)
    }

    pub fn to_remote(&self, local: &Location) -> Location {
        Location::new(apply_map(&local.target, &self.local_to_remote), local.line)
    }

    pub fn local_path(&self, remote: &str) -> String {
        apply_map(remote, &self.remote_to_local)
    }
}

fn apply_map(path: &str, mapping: &[(String, String)]) -> String {
    let normalized = norm_path(path);
    for (from, to) in mapping {
        if let Some(suffix) = normalized.strip_prefix(from.as_str()) {
            return join_with_style(to, suffix);
        }
    }
    path.to_string()
}

fn join_with_style(prefix: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return prefix.to_string();
    }
    let mut out = prefix.to_string();
    let windows_style = out.contains('\\');
    if !out.ends_with('/') && !out.ends_with('\\') {
        out.push(if windows_style { '\\' } else { '/' });
    }
    if windows_style {
        out.push_str(&suffix.replace('/', "\\"));
    } else {
        out.push_str(suffix);
    }
    out
}

fn norm_prefix(s: &str) -> String {
    let mut out = norm_path(s);
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}

fn norm_path(s: &str) -> String {
    s.replace('\\', "/")
}

#[cfg(test)]
mod test {
    use super::*;

    fn mapper() -> LocationMapper {
        LocationMapper::new(&[
            PathMapping {
                remote: "/var/www".into(),
                local: "/home/dev/site".into(),
            },
            PathMapping {
                remote: "/var/www/vendor".into(),
                local: "/home/dev/vendor".into(),
            },
            PathMapping {
                remote: "C:\\inetpub".into(),
                local: "/mnt/win".into(),
            },
        ])
    }

    #[test]
    fn test_to_local() {
        struct TestCase {
            remote: &'static str,
            local: &'static str,
        }
        let test_cases = [
            TestCase {
                remote: "/var/www/index.php",
                local: "/home/dev/site/index.php",
            },
            TestCase {
                remote: "/var/www/vendor/lib/a.php",
                local: "/home/dev/vendor/lib/a.php",
            },
            TestCase {
                remote: "C:\\inetpub\\app\\a.php",
                local: "/mnt/win/app/a.php",
            },
            TestCase {
                remote: "/var/wwwx/a.php",
                local: "/var/wwwx/a.php",
            },
        ];

        let mapper = mapper();
        for tc in test_cases {
            let local = mapper.to_local(&Location::new(tc.remote, 7));
            assert_eq!(local, Location::new(tc.local, 7));
        }
    }

    #[test]
    fn test_to_remote() {
        let mapper = mapper();
        assert_eq!(
            mapper.to_remote(&Location::new("/home/dev/site/a/b.php", 1)),
            Location::new("/var/www/a/b.php", 1)
        );
        assert_eq!(
            mapper.to_remote(&Location::new("/mnt/win/x.php", 2)),
            Location::new("C:\\inetpub\\x.php", 2)
        );
        assert_eq!(
            mapper.to_remote(&Location::new("/other/x.php", 3)),
            Location::new("/other/x.php", 3)
        );
    }
}
