//! Remote path conventions for backups, staging uploads and re-containered output.
//!
//! Remote paths are `/`-separated and relative to the remote root.

fn split_dir(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// `(stem, Some(ext))` for `name.ext`; dotfiles have no extension.
fn split_ext(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Where the original is kept: `<dir>/<stem>.backup.<ext>`.
pub fn backup_path_for(remote_path: &str) -> String {
    let (dir, name) = split_dir(remote_path);
    match split_ext(name) {
        (stem, Some(ext)) => format!("{}{}.backup.{}", dir, stem, ext),
        (stem, None) => format!("{}{}.backup", dir, stem),
    }
}

/// Final location of the encoded file: the original path with the output container.
pub fn encoded_path_for(remote_path: &str, container: &str) -> String {
    let (dir, name) = split_dir(remote_path);
    let (stem, _) = split_ext(name);
    format!("{}{}.{}", dir, stem, container)
}

/// Temporary name an upload is written to before it is moved into place.
pub fn staging_path_for(remote_path: &str) -> String {
    format!("{}.partial", remote_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_path_for() {
        assert_eq!(
            backup_path_for("movies/Heat (1995)/Heat.mkv"),
            "movies/Heat (1995)/Heat.backup.mkv"
        );
        assert_eq!(backup_path_for("a.b.avi"), "a.b.backup.avi");
        assert_eq!(backup_path_for("shows/README"), "shows/README.backup");
        assert_eq!(backup_path_for(".hidden"), ".hidden.backup");
    }

    #[test]
    fn test_encoded_path_for() {
        assert_eq!(encoded_path_for("movies/a.avi", "mkv"), "movies/a.mkv");
        assert_eq!(encoded_path_for("movies/a.mkv", "mkv"), "movies/a.mkv");
        assert_eq!(encoded_path_for("noext", "mkv"), "noext.mkv");
    }

    #[test]
    fn test_staging_path_for() {
        assert_eq!(staging_path_for("movies/a.mkv"), "movies/a.mkv.partial");
    }
}
