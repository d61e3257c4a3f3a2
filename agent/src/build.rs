//! Build & run dispatch per app kind (§4.F's table). Each branch produces a
//! live [`ProcessHandle`] (or none, for compose apps) that the supervisor
//! then uses to track liveness.

use crate::{
    config::AgentConfig,
    registry::ProcessHandle,
    tools::{compose, container},
};
use anyhow::{bail, Context};
use deploy_models::{agent::RunRequest, AppKind};
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, File},
    process::Command,
};
use uuid::Uuid;

fn app_name(app_id: Uuid) -> String {
    app_id.to_string()
}

fn root_path(app_id: Uuid) -> String {
    format!("/apps/{app_id}")
}

async fn open_log(log_path: &str) -> anyhow::Result<std::fs::File> {
    if let Some(parent) = Path::new(log_path).parent() {
        fs::create_dir_all(parent).await.context("failed to create log directory")?;
    }
    let file = File::options().create(true).append(true).open(log_path).await.context("failed to open log file")?;
    Ok(file.into_std().await)
}

fn forwarded_env(config: &AgentConfig) -> Vec<(String, String)> {
    config
        .forwarded_env_vars
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
        .collect()
}

/// Builds (unless `reuse_image`) and runs the app, returning the handle the
/// registry should track. Route installation has already happened by the
/// time this is called (§5 ordering guarantee 1).
pub async fn build_and_run(config: &AgentConfig, request: &RunRequest, gpus: &[u32]) -> anyhow::Result<ProcessHandle> {
    match request.kind {
        AppKind::ContainerBuild => build_and_run_container(config, request, gpus, false).await,
        AppKind::ContainerImageArchive => build_and_run_image_archive(config, request).await,
        AppKind::Compose => run_compose(config, request).await,
        AppKind::Source => run_source(config, request, gpus).await,
    }
}

async fn build_and_run_container(
    config: &AgentConfig,
    request: &RunRequest,
    gpus: &[u32],
    network_host: bool,
) -> anyhow::Result<ProcessHandle> {
    let binary = &config.containers.binary;
    let name = app_name(request.app_id);

    if !request.reuse_image {
        container::build(binary, &name, &request.path).await.context("container build failed")?;
    }

    container::run(binary, container::RunArgs {
        name: &name,
        image: &name,
        port: request.port,
        gpus: (!gpus.is_empty()).then_some(gpus),
        network_host,
        env: &forwarded_env(config),
        root_path: root_path(request.app_id),
    })
    .await
    .context("container run failed")?;

    Ok(ProcessHandle::Container { name })
}

/// Always `--gpus all --network host`, per §4.F's table — image-archive
/// containers get the host's full GPU visibility regardless of the VRAM
/// allocation's specific indices (an asymmetry the spec flags as open
/// question 2, preserved here rather than resolved).
async fn build_and_run_image_archive(config: &AgentConfig, request: &RunRequest) -> anyhow::Result<ProcessHandle> {
    let binary = &config.containers.binary;
    let name = app_name(request.app_id);

    if !request.reuse_image {
        let original_tag = read_archive_manifest_tag(&request.path).await.context("failed to read image manifest")?;
        container::load(binary, &request.path).await.context("container load failed")?;
        container::tag(binary, &original_tag, &name).await.context("container tag failed")?;
    }

    container::run(binary, container::RunArgs {
        name: &name,
        image: &name,
        port: request.port,
        gpus: Some(&[]), // empty slice forces the `--gpus all` branch
        network_host: true,
        env: &forwarded_env(config),
        root_path: root_path(request.app_id),
    })
    .await
    .context("container run failed")?;

    Ok(ProcessHandle::Container { name })
}

/// Reads `manifest.json` out of a Docker/OCI image tar to recover the
/// original repository tag so it can be retagged to `<app_id>`.
async fn read_archive_manifest_tag(tar_path: &str) -> anyhow::Result<String> {
    let file = std::fs::File::open(tar_path).context("failed to open image archive")?;
    let mut archive = tar::Archive::new(file);
    for entry in archive.entries().context("failed to read archive entries")? {
        let mut entry = entry.context("failed to read archive entry")?;
        if entry.path().context("bad entry path")?.as_os_str() == "manifest.json" {
            let mut contents = String::new();
            use std::io::Read;
            entry.read_to_string(&mut contents).context("failed to read manifest.json")?;
            let manifest: Vec<serde_json::Value> =
                serde_json::from_str(&contents).context("manifest.json is not valid JSON")?;
            let tag = manifest
                .first()
                .and_then(|m| m.get("RepoTags"))
                .and_then(|tags| tags.get(0))
                .and_then(|tag| tag.as_str())
                .context("manifest.json has no RepoTags")?;
            return Ok(tag.to_string());
        }
    }
    bail!("no manifest.json found in image archive")
}

async fn run_compose(config: &AgentConfig, request: &RunRequest) -> anyhow::Result<ProcessHandle> {
    let binary = &config.containers.binary;
    let project = app_name(request.app_id);
    let compose_file = locate_compose_file(&request.path).await.context("no docker-compose file found")?;
    compose::up(binary, &compose_file.to_string_lossy(), &project).await.context("compose up failed")?;
    Ok(ProcessHandle::Compose { project })
}

async fn locate_compose_file(dir: &str) -> anyhow::Result<PathBuf> {
    for candidate in ["docker-compose.yml", "docker-compose.yaml"] {
        let path = Path::new(dir).join(candidate);
        if fs::try_exists(&path).await.unwrap_or(false) {
            validate_compose_file(&path).await?;
            return Ok(path);
        }
    }
    bail!("no docker-compose.y(a)ml in {dir}")
}

/// Parses the compose file far enough to confirm it is structurally valid
/// before handing it to the compose tool, rather than discovering a syntax
/// error only after `up` has already partially run.
async fn validate_compose_file(path: &Path) -> anyhow::Result<()> {
    let contents = fs::read_to_string(path).await.context("failed to read compose file")?;
    let _: docker_compose_types::Compose =
        serde_yaml::from_str(&contents).context("compose file failed to parse")?;
    Ok(())
}

async fn run_source(config: &AgentConfig, request: &RunRequest, gpus: &[u32]) -> anyhow::Result<ProcessHandle> {
    let entrypoint = locate_entrypoint(&request.path).await.context("no Python entrypoint found")?;
    let venv = config.work_root.join(app_name(request.app_id)).join("venv");
    create_venv(&venv).await.context("failed to create virtualenv")?;

    let requirements = Path::new(&request.path).join("requirements.txt");
    if fs::try_exists(&requirements).await.unwrap_or(false) {
        install_requirements(&venv, &requirements).await.context("failed to install requirements.txt")?;
    }

    let python = venv.join("bin").join("python");
    let cuda_visible_devices = gpus.iter().map(u32::to_string).collect::<Vec<_>>().join(",");

    let log_file = open_log(&request.log_path).await?;
    let log_file_err = log_file.try_clone().context("failed to duplicate log handle")?;

    let child = Command::new(python)
        .arg(&entrypoint)
        .current_dir(&request.path)
        .env("PORT", request.port.to_string())
        .env("ROOT_PATH", root_path(request.app_id))
        .env("CUDA_VISIBLE_DEVICES", cuda_visible_devices)
        .envs(forwarded_env(config))
        .stdout(log_file)
        .stderr(log_file_err)
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn source app")?;

    Ok(ProcessHandle::Child(child))
}

async fn locate_entrypoint(dir: &str) -> anyhow::Result<PathBuf> {
    let app_py = Path::new(dir).join("app.py");
    if fs::try_exists(&app_py).await.unwrap_or(false) {
        return Ok(app_py);
    }
    let mut entries = fs::read_dir(dir).await.context("failed to read app directory")?;
    while let Some(entry) = entries.next_entry().await.context("failed to iterate app directory")? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("py") {
            return Ok(path);
        }
    }
    bail!("no .py entrypoint found in {dir}")
}

async fn create_venv(venv: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(venv.parent().unwrap_or(venv)).await.ok();
    let status = Command::new("python3").arg("-m").arg("venv").arg(venv).status().await.context("venv creation failed to spawn")?;
    if !status.success() {
        bail!("python3 -m venv exited with {status}");
    }
    Ok(())
}

async fn install_requirements(venv: &Path, requirements: &Path) -> anyhow::Result<()> {
    let pip = venv.join("bin").join("pip");
    let status = Command::new(pip)
        .arg("install")
        .arg("-r")
        .arg(requirements)
        .status()
        .await
        .context("pip install failed to spawn")?;
    if !status.success() {
        bail!("pip install exited with {status}");
    }
    Ok(())
}

