use std::path::{Path, PathBuf};

use aero_store::Location;

use crate::error::AclError;

/// Absolute, `/`-separated path of a DAV resource.
/// `.`, `..`, empty segments and record file names are refused,
/// a trailing slash is dropped.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourcePath(String);

impl ResourcePath {
    pub fn parse(raw: &str) -> Result<Self, AclError> {
        if raw.is_empty() {
            return Err(AclError::Setup("empty resource path".into()));
        }
        if !raw.starts_with('/') {
            return Err(AclError::Setup(format!("resource path {:?} is not absolute", raw)));
        }

        let trimmed = raw.strip_suffix('/').unwrap_or(raw);
        if trimmed.is_empty() {
            return Ok(Self("/".into()));
        }

        for segment in trimmed[1..].split('/') {
            let valid = !segment.is_empty()
                && segment != "."
                && segment != ".."
                && !segment.contains(['\\', '\0'])
                && !aero_store::is_store_file(segment);
            if !valid {
                return Err(AclError::Setup(format!(
                    "invalid segment {:?} in resource path {:?}",
                    segment, raw
                )));
            }
        }
        Ok(Self(trimmed.into()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Where the resource lives under `root`
    pub fn to_fs(&self, root: &Path) -> PathBuf {
        self.segments().fold(root.to_path_buf(), |acc, s| acc.join(s))
    }
}

impl std::fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ResourcePath {
    type Err = AclError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn setup_error(resource: &ResourcePath, msg: String) -> AclError {
    tracing::error!(path=%resource, err=%msg, "no directory context for resource");
    AclError::Setup(msg)
}

/// Find the directory whose record file holds the ACL of `resource`:
/// the directory itself for a collection, the parent directory for an object
/// or for a resource that is not created yet.
pub async fn directory_context(root: &Path, resource: &ResourcePath) -> Result<Location, AclError> {
    let fs_path = resource.to_fs(root);

    match tokio::fs::metadata(&fs_path).await {
        Ok(meta) if meta.is_dir() => return Ok(Location::in_dir(fs_path)),
        Ok(meta) if meta.is_file() => match fs_path.parent() {
            Some(parent) => return Ok(Location::in_dir(parent)),
            None => {
                return Err(setup_error(
                    resource,
                    format!("{} has no parent directory", fs_path.display()),
                ))
            }
        },
        Ok(_) => {
            return Err(setup_error(
                resource,
                format!("{} is neither a file nor a directory", fs_path.display()),
            ))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
        Err(e) => {
            return Err(setup_error(
                resource,
                format!("unable to stat {}: {}", fs_path.display(), e),
            ))
        }
    };

    // The resource does not exist yet, its ACL goes in its parent directory
    if resource.is_root() {
        return Err(setup_error(
            resource,
            format!("DAV root {} does not exist", fs_path.display()),
        ));
    }
    let parent = match fs_path.parent() {
        Some(p) => p,
        None => {
            return Err(setup_error(
                resource,
                format!("{} has no parent directory", fs_path.display()),
            ))
        }
    };
    match tokio::fs::metadata(parent).await {
        Ok(meta) if meta.is_dir() => Ok(Location::in_dir(parent)),
        Ok(_) => Err(setup_error(
            resource,
            format!("{} is not a directory", parent.display()),
        )),
        Err(e) => Err(setup_error(
            resource,
            format!("parent directory {} is unusable: {}", parent.display(), e),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_paths() {
        assert_eq!(ResourcePath::parse("/").unwrap().as_str(), "/");
        assert_eq!(
            ResourcePath::parse("/alice/calendar/").unwrap().as_str(),
            "/alice/calendar"
        );
        assert_eq!(
            ResourcePath::parse("/alice/calendar/a.ics").unwrap(),
            ResourcePath::parse("/alice/calendar/a.ics").unwrap()
        );
        assert!(ResourcePath::parse("/alice/calendar/.aclrc").is_ok());

        for bad in [
            "",
            "alice",
            "/alice//calendar",
            "/alice/../bob",
            "/./x",
            "//",
            "/alice/calendar/.acl",
            "/alice/calendar/.acl.0011223344556677.tmp",
            "/.acl/x.ics",
        ] {
            assert!(
                matches!(ResourcePath::parse(bad), Err(AclError::Setup(_))),
                "{:?} should be refused",
                bad
            );
        }
    }

    #[test]
    fn fs_mapping() {
        let p = ResourcePath::parse("/alice/calendar/a.ics").unwrap();
        assert_eq!(
            p.segments().collect::<Vec<_>>(),
            vec!["alice", "calendar", "a.ics"]
        );
        assert_eq!(
            p.to_fs(Path::new("/srv/dav")),
            PathBuf::from("/srv/dav/alice/calendar/a.ics")
        );
        assert_eq!(
            ResourcePath::parse("/").unwrap().to_fs(Path::new("/srv/dav")),
            PathBuf::from("/srv/dav")
        );
    }

    #[tokio::test]
    async fn contexts() {
        let root = tempfile::tempdir().unwrap();
        let cal = root.path().join("alice").join("calendar");
        tokio::fs::create_dir_all(&cal).await.unwrap();
        tokio::fs::write(cal.join("a.ics"), b"BEGIN:VCALENDAR").await.unwrap();

        let ctx = |p: &str| ResourcePath::parse(p).unwrap();

        // collection: itself
        let loc = directory_context(root.path(), &ctx("/alice/calendar")).await.unwrap();
        assert_eq!(loc.dir(), cal.as_path());

        // object: its collection
        let loc = directory_context(root.path(), &ctx("/alice/calendar/a.ics")).await.unwrap();
        assert_eq!(loc.dir(), cal.as_path());

        // not uploaded yet: the parent
        let loc = directory_context(root.path(), &ctx("/alice/calendar/b.ics")).await.unwrap();
        assert_eq!(loc.dir(), cal.as_path());

        // root
        let loc = directory_context(root.path(), &ctx("/")).await.unwrap();
        assert_eq!(loc.dir(), root.path());

        // no parent directory
        let res = directory_context(root.path(), &ctx("/bob/calendar/x.ics")).await;
        assert!(matches!(res, Err(AclError::Setup(_))));

        // parent is a file
        let res = directory_context(root.path(), &ctx("/alice/calendar/a.ics/x")).await;
        assert!(matches!(res, Err(AclError::Setup(_))));
    }

    #[tokio::test]
    async fn missing_root() {
        let root = tempfile::tempdir().unwrap();
        let gone = root.path().join("gone");
        let res = directory_context(&gone, &ResourcePath::parse("/").unwrap()).await;
        assert!(matches!(res, Err(AclError::Setup(_))));
    }
}
