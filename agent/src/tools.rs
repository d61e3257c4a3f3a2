//! Thin wrappers around the subprocess tools this agent drives: the container
//! runtime, the compose tool, the GPU query tool, and the proxy daemon reload.
//! None of these are parsed beyond what §6.4 promises; a missing binary or a
//! non-zero exit is surfaced as an error and left for the caller to decide
//! whether it is fatal.

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

#[async_trait]
pub trait CommandExt {
    /// Runs the command and returns stdout, failing on a non-zero exit.
    async fn invoke(&mut self) -> anyhow::Result<String>;
}

#[async_trait]
impl CommandExt for Command {
    async fn invoke(&mut self) -> anyhow::Result<String> {
        let output = self.output().await.context("failed to spawn subprocess")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("command failed with status {}: {stderr}", output.status.code().unwrap_or(-1));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// One row of `nvidia-smi --query-gpu=index,memory.total,memory.used`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuRow {
    pub index: u32,
    pub total_mib: u32,
    pub used_mib: u32,
}

/// Queries the GPU tool for current memory usage (§6.4). A non-zero exit or
/// malformed row is a soft failure: callers treat it as "no GPUs available".
pub async fn query_gpus(binary: &str) -> anyhow::Result<Vec<GpuRow>> {
    let output = Command::new(binary)
        .arg("--query-gpu=index,memory.total,memory.used")
        .arg("--format=csv,noheader,nounits")
        .invoke()
        .await?;
    parse_gpu_rows(&output)
}

fn parse_gpu_rows(output: &str) -> anyhow::Result<Vec<GpuRow>> {
    let mut rows = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [index, total_mib, used_mib] = fields[..] else {
            bail!("malformed GPU query row: {line}");
        };
        rows.push(GpuRow {
            index: index.parse().context("bad GPU index")?,
            total_mib: total_mib.parse().context("bad GPU total")?,
            used_mib: used_mib.parse().context("bad GPU used")?,
        });
    }
    Ok(rows)
}

/// Container runtime invocations (docker/podman-compatible CLI, §6.4).
pub mod container {
    use super::*;

    pub async fn build(binary: &str, name: &str, context: &str) -> anyhow::Result<()> {
        Command::new(binary).args(["build", "-t", name, context]).invoke().await?;
        Ok(())
    }

    pub async fn load(binary: &str, tar_path: &str) -> anyhow::Result<()> {
        Command::new(binary).args(["load", "-i", tar_path]).invoke().await?;
        Ok(())
    }

    pub async fn tag(binary: &str, src: &str, dst: &str) -> anyhow::Result<()> {
        Command::new(binary).args(["tag", src, dst]).invoke().await?;
        Ok(())
    }

    pub struct RunArgs<'a> {
        pub name: &'a str,
        pub image: &'a str,
        pub port: u16,
        pub gpus: Option<&'a [u32]>,
        pub network_host: bool,
        pub env: &'a [(String, String)],
        pub root_path: String,
    }

    /// `run --rm [--gpus ...] -p port:port -e ... --name <name> <image>` (detached).
    pub async fn run(binary: &str, args: RunArgs<'_>) -> anyhow::Result<()> {
        let mut cmd = Command::new(binary);
        cmd.args(["run", "--rm", "-d"]);
        match args.gpus {
            Some(indices) if !indices.is_empty() => {
                let devices = indices.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
                cmd.arg("--gpus").arg(format!("device={devices}"));
            }
            Some(_) => {
                cmd.arg("--gpus").arg("all");
            }
            None => {}
        }
        if args.network_host {
            cmd.arg("--network").arg("host");
        } else {
            cmd.arg("-p").arg(format!("{0}:{0}", args.port));
        }
        cmd.arg("-e").arg(format!("PORT={}", args.port));
        cmd.arg("-e").arg(format!("ROOT_PATH={}", args.root_path));
        for (key, value) in args.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg("--name").arg(args.name).arg(args.image);
        cmd.invoke().await?;
        Ok(())
    }

    pub async fn stop(binary: &str, name: &str) -> anyhow::Result<()> {
        Command::new(binary).args(["stop", name]).invoke().await?;
        Ok(())
    }

    pub async fn remove(binary: &str, name: &str) -> anyhow::Result<()> {
        Command::new(binary).args(["rm", "-f", name]).invoke().await?;
        Ok(())
    }

    pub async fn is_running(binary: &str, name: &str) -> anyhow::Result<bool> {
        let output = Command::new(binary)
            .args(["inspect", "-f", "{{.State.Running}}", name])
            .invoke()
            .await?;
        Ok(output.trim() == "true")
    }

    pub async fn exit_code(binary: &str, name: &str) -> anyhow::Result<i32> {
        let output = Command::new(binary).args(["inspect", "-f", "{{.State.ExitCode}}", name]).invoke().await?;
        output.trim().parse().context("bad exit code from inspect")
    }
}

/// Compose tool invocations (§6.4). `compose` is a subcommand of the same
/// container runtime binary in this contract, not a separate executable.
pub mod compose {
    use super::*;

    pub async fn up(binary: &str, file: &str, project: &str) -> anyhow::Result<()> {
        Command::new(binary)
            .args(["compose", "-f", file, "-p", project, "up", "--build", "-d"])
            .invoke()
            .await?;
        Ok(())
    }

    pub async fn down(binary: &str, project: &str) -> anyhow::Result<()> {
        Command::new(binary).args(["compose", "-p", project, "down"]).invoke().await?;
        Ok(())
    }

    /// True if at least one container for the project is still running.
    pub async fn any_running(binary: &str, project: &str) -> anyhow::Result<bool> {
        let output = Command::new(binary).args(["compose", "-p", project, "ps", "-q"]).invoke().await?;
        let ids: Vec<&str> = output.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let Some(first) = ids.first() else {
            return Ok(false);
        };
        container::is_running(binary, first).await
    }
}

/// Triggers a reload of the reverse proxy daemon. Missing tool or non-zero
/// exit is logged and swallowed per §4.A: best-effort, never fails the caller.
pub async fn reload_proxy(binary: &str) {
    match Command::new(binary).args(["-s", "reload"]).invoke().await {
        Ok(_) => {}
        Err(e) => warn!("proxy reload via {binary} failed, ignoring: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rows() {
        let input = "0, 40960, 1000\n1, 40960, 2000\n";
        let rows = parse_gpu_rows(input).unwrap();
        assert_eq!(rows, vec![
            GpuRow { index: 0, total_mib: 40960, used_mib: 1000 },
            GpuRow { index: 1, total_mib: 40960, used_mib: 2000 },
        ]);
    }

    #[test]
    fn parse_rows_ignores_blank_lines() {
        let rows = parse_gpu_rows("0, 100, 0\n\n").unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn parse_rows_rejects_malformed() {
        assert!(parse_gpu_rows("not,a,valid,row,here").is_err());
    }
}
