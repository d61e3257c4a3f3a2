//! Shared kind-inference precedence used by both the upload handler and the
//! template catalog's directory scan (§4.G / §4.J): `.tar` suffix first,
//! then a compose file, then a Dockerfile, else source. A ZIP commonly
//! extracts into a single top-level wrapper folder (e.g. `myapp-main/`), so
//! the compose/Dockerfile scan walks the tree rather than just `root`'s
//! immediate children.
use deploy_models::AppKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const MAX_SCAN_DEPTH: usize = 4;

async fn contains_any(root: &Path, names: &[&str]) -> bool {
    let mut pending: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];
    while let Some((dir, depth)) = pending.pop() {
        if depth > MAX_SCAN_DEPTH {
            continue;
        }
        let Ok(mut entries) = fs::read_dir(&dir).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else { continue };
            if file_type.is_dir() {
                pending.push((entry.path(), depth + 1));
                continue;
            }
            if entry.file_name().to_str().is_some_and(|name| names.contains(&name)) {
                return true;
            }
        }
    }
    false
}

pub async fn detect_kind(root: &Path, uploaded_filename: Option<&str>) -> AppKind {
    if uploaded_filename.map(|name| name.ends_with(".tar")).unwrap_or(false) {
        return AppKind::ContainerImageArchive;
    }

    if contains_any(root, &["docker-compose.yml", "docker-compose.yaml"]).await {
        return AppKind::Compose;
    }

    if contains_any(root, &["Dockerfile"]).await {
        return AppKind::ContainerBuild;
    }

    AppKind::Source
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("bundle.tar"), &[], AppKind::ContainerImageArchive)]
    #[case(None, &["docker-compose.yml"], AppKind::Compose)]
    #[case(None, &["docker-compose.yaml"], AppKind::Compose)]
    #[case(None, &["Dockerfile"], AppKind::ContainerBuild)]
    #[case(None, &[], AppKind::Source)]
    // a .tar upload wins even over a compose file already in the bundle
    #[case(Some("bundle.tar"), &["docker-compose.yml"], AppKind::ContainerImageArchive)]
    #[tokio::test]
    async fn precedence(#[case] uploaded_filename: Option<&str>, #[case] present: &[&str], #[case] expected: AppKind) {
        let dir = tempfile::tempdir().unwrap();
        for name in present {
            tokio::fs::write(dir.path().join(name), b"").await.unwrap();
        }
        assert_eq!(detect_kind(dir.path(), uploaded_filename).await, expected);
    }

    #[tokio::test]
    async fn finds_a_dockerfile_nested_in_a_single_wrapper_folder() {
        // The common zip-extraction shape: myapp-main/Dockerfile.
        let dir = tempfile::tempdir().unwrap();
        let wrapper = dir.path().join("myapp-main");
        tokio::fs::create_dir_all(&wrapper).await.unwrap();
        tokio::fs::write(wrapper.join("Dockerfile"), b"").await.unwrap();

        assert_eq!(detect_kind(dir.path(), None).await, AppKind::ContainerBuild);
    }
}
