/*!
 * File metadata preservation (timestamps, permissions)
 */

use std::path::Path;

use filetime::FileTime;

/// Copy permissions and timestamps from `source` to `dest` without
/// following symlinks on either side.
pub fn copy_metadata(source: &Path, dest: &Path) -> std::io::Result<()> {
    let metadata = std::fs::symlink_metadata(source)?;

    std::fs::set_permissions(dest, metadata.permissions())?;

    let accessed = FileTime::from_last_access_time(&metadata);
    let modified = FileTime::from_last_modification_time(&metadata);
    filetime::set_symlink_file_times(dest, accessed, modified)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn mtime_is_copied() {
        let mut source = NamedTempFile::new().unwrap();
        source.write_all(b"test").unwrap();
        source.flush().unwrap();

        let dest = NamedTempFile::new().unwrap();

        copy_metadata(source.path(), dest.path()).unwrap();

        let source_meta = fs::metadata(source.path()).unwrap();
        let dest_meta = fs::metadata(dest.path()).unwrap();
        assert_eq!(
            source_meta.modified().unwrap(),
            dest_meta.modified().unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_copied() {
        use std::os::unix::fs::PermissionsExt;

        let source = NamedTempFile::new().unwrap();
        let dest = NamedTempFile::new().unwrap();

        let mut perms = fs::metadata(source.path()).unwrap().permissions();
        perms.set_mode(0o640);
        fs::set_permissions(source.path(), perms).unwrap();

        copy_metadata(source.path(), dest.path()).unwrap();

        let dest_mode = fs::metadata(dest.path()).unwrap().permissions().mode();
        assert_eq!(dest_mode & 0o777, 0o640);
    }
}
