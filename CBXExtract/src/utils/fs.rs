//! Filesystem helpers for staging and extraction output

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Open up permissions on a staged file so cleanup is never blocked.
pub fn make_permissive(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o777))?;
    }
    #[cfg(not(unix))]
    {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// Delete `path` if it is a file. Returns whether something was removed.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    // Read-only covers left by other tools would otherwise fail on Windows
    make_permissive(path)?;
    fs::remove_file(path)?;
    Ok(true)
}

/// True if `dir` exists and holds at least one entry
pub fn dir_is_non_empty(dir: &Path) -> io::Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    Ok(fs::read_dir(dir)?.next().is_some())
}

/// Join an archive entry name onto `dest`, refusing names that would land
/// outside of it (absolute paths, drive prefixes, `..`).
pub fn join_entry(dest: &Path, entry_name: &str) -> Option<PathBuf> {
    let normalized = entry_name.replace('\\', "/");
    let mut out = dest.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    (depth > 0).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_join_entry_plain() {
        let dest = Path::new("/out");
        assert_eq!(join_entry(dest, "a/b.jpg"), Some(PathBuf::from("/out/a/b.jpg")));
        assert_eq!(join_entry(dest, "./c.png"), Some(PathBuf::from("/out/c.png")));
        assert_eq!(
            join_entry(dest, "dir\\page.jpg"),
            Some(PathBuf::from("/out/dir/page.jpg"))
        );
    }

    #[test]
    fn test_join_entry_rejects_escape() {
        let dest = Path::new("/out");
        assert_eq!(join_entry(dest, "../evil.jpg"), None);
        assert_eq!(join_entry(dest, "a/../../evil.jpg"), None);
        assert_eq!(join_entry(dest, "/etc/passwd"), None);
        assert_eq!(join_entry(dest, ""), None);
        assert_eq!(join_entry(dest, "./"), None);
    }

    #[test]
    fn test_dir_is_non_empty() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("pages");
        assert!(!dir_is_non_empty(&dir).unwrap());

        fs::create_dir(&dir).unwrap();
        assert!(!dir_is_non_empty(&dir).unwrap());

        fs::write(dir.join("000.jpg"), b"x").unwrap();
        assert!(dir_is_non_empty(&dir).unwrap());
    }

    #[test]
    fn test_remove_file_if_exists() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("cover.jpg");
        assert!(!remove_file_if_exists(&file).unwrap());

        fs::write(&file, b"x").unwrap();
        assert!(remove_file_if_exists(&file).unwrap());
        assert!(!file.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_make_permissive() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let file = temp.path().join("book.cbz");
        fs::write(&file, b"x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o400)).unwrap();

        make_permissive(&file).unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }
}
