//! Safe ZIP extraction for uploads (§4.G). Rejects absolute paths, `..`
//! components, and any entry whose resolved path would land outside the
//! destination directory — a malicious archive cannot write outside
//! `uploads/<app_id>/`.

use anyhow::{bail, Context};
use std::{
    fs,
    io,
    path::{Component, Path, PathBuf},
};
use zip::ZipArchive;

pub fn extract_zip(archive_path: &Path, dest: &Path) -> anyhow::Result<()> {
    let file = fs::File::open(archive_path).context("failed to open uploaded zip")?;
    let mut archive = ZipArchive::new(file).context("not a valid zip archive")?;

    fs::create_dir_all(dest).context("failed to create extraction directory")?;
    let dest_canonical = dest.canonicalize().context("failed to resolve extraction directory")?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("failed to read zip entry")?;
        let Some(name) = entry.enclosed_name() else {
            bail!("zip entry has an unsafe path");
        };

        let target = safe_join(&dest_canonical, &name)?;

        if entry.is_dir() {
            fs::create_dir_all(&target).context("failed to create directory from zip")?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).context("failed to create parent directory from zip")?;
        }
        let mut out = fs::File::create(&target).context("failed to create file from zip")?;
        io::copy(&mut entry, &mut out).context("failed to write extracted file")?;
    }

    Ok(())
}

/// Joins `name` onto `base` component-by-component, rejecting anything that
/// isn't a plain path segment (no `..`, no root, no prefix) so the result is
/// guaranteed to stay under `base` without needing the target to already
/// exist (it doesn't, until this very call creates it).
fn safe_join(base: &Path, name: &Path) -> anyhow::Result<PathBuf> {
    let mut target = base.to_path_buf();
    for component in name.components() {
        match component {
            Component::Normal(segment) => target.push(segment),
            Component::CurDir => {}
            _ => bail!("zip entry escapes the extraction directory: {}", name.display()),
        }
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_parent_traversal() {
        let base = Path::new("/tmp/uploads/app-1");
        let err = safe_join(base, Path::new("../../etc/passwd")).unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }

    #[test]
    fn accepts_nested_normal_path() {
        let base = Path::new("/tmp/uploads/app-1");
        let joined = safe_join(base, Path::new("src/main.py")).unwrap();
        assert_eq!(joined, Path::new("/tmp/uploads/app-1/src/main.py"));
    }

    #[test]
    fn extracts_nested_entries_into_the_destination() {
        let workdir = tempfile::tempdir().unwrap();
        let archive_path = workdir.path().join("bundle.zip");
        let file = fs::File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("Dockerfile", options).unwrap();
        writer.write_all(b"FROM scratch").unwrap();
        writer.start_file("src/main.py", options).unwrap();
        writer.write_all(b"print('hi')").unwrap();
        writer.finish().unwrap();

        let dest = workdir.path().join("extracted");
        extract_zip(&archive_path, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("Dockerfile")).unwrap(), "FROM scratch");
        assert_eq!(fs::read_to_string(dest.join("src/main.py")).unwrap(), "print('hi')");
    }
}
