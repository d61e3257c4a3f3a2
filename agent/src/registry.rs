//! The process registry (component E): `app_id -> ProcessEntry` on the
//! agent, guarded by a single mutex alongside the GPU-usage bookkeeping it
//! implies (actual reservations live in [`crate::vram::VramAllocator`]; this
//! map tracks which shares belong to which app so they can be released).

use deploy_models::AppKind;
use std::collections::HashMap;
use tokio::{process::Child, sync::Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How the agent can observe whether a running app is still alive.
pub enum ProcessHandle {
    /// A source app launched directly by this agent.
    Child(Child),
    /// A container-backed app (`container_build` or `container_image_archive`),
    /// identified by its container name.
    Container { name: String },
    /// A `compose` app, identified by its compose project name.
    Compose { project: String },
    /// A recovered entry with no live handle; liveness is probed by port/inspect.
    Unowned,
}

pub struct ProcessEntry {
    pub kind: AppKind,
    pub port: u16,
    pub handle: ProcessHandle,
    pub gpu_shares: Vec<(u32, u32)>,
    pub cancel: CancellationToken,
}

impl ProcessEntry {
    pub fn gpu_indices(&self) -> Vec<u32> {
        self.gpu_shares.iter().map(|(index, _)| *index).collect()
    }
}

#[derive(Default)]
pub struct Registry {
    entries: Mutex<HashMap<Uuid, ProcessEntry>>,
}

impl Registry {
    /// Inserts an empty-ish entry as soon as `/run` accepts a request, before
    /// the build has even started, so the stop path knows the app exists.
    pub async fn insert(&self, app_id: Uuid, entry: ProcessEntry) {
        self.entries.lock().await.insert(app_id, entry);
    }

    /// Replaces the live handle once the subprocess has actually been spawned.
    pub async fn set_handle(&self, app_id: Uuid, handle: ProcessHandle) {
        if let Some(entry) = self.entries.lock().await.get_mut(&app_id) {
            entry.handle = handle;
        }
    }

    pub async fn contains(&self, app_id: Uuid) -> bool {
        self.entries.lock().await.contains_key(&app_id)
    }

    /// Removes and returns the entry, releasing it from the registry. The
    /// caller is responsible for releasing the VRAM shares it reports.
    pub async fn remove(&self, app_id: Uuid) -> Option<ProcessEntry> {
        self.entries.lock().await.remove(&app_id)
    }

    pub async fn cancel(&self, app_id: Uuid) {
        if let Some(entry) = self.entries.lock().await.get(&app_id) {
            entry.cancel.cancel();
        }
    }

    pub async fn port_of(&self, app_id: Uuid) -> Option<u16> {
        self.entries.lock().await.get(&app_id).map(|entry| entry.port)
    }

    /// Non-blocking liveness check against an owned `Child` handle (source
    /// apps). `NoHandle` means the caller must fall back to a container
    /// inspect or TCP probe instead.
    pub async fn probe_child(&self, app_id: Uuid) -> ChildLiveness {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(&app_id) else {
            return ChildLiveness::NoHandle;
        };
        match &mut entry.handle {
            ProcessHandle::Child(child) => match child.try_wait() {
                Ok(Some(status)) => ChildLiveness::Exited(status.code()),
                Ok(None) => ChildLiveness::Running,
                Err(_) => ChildLiveness::Exited(None),
            },
            _ => ChildLiveness::NoHandle,
        }
    }
}

pub enum ChildLiveness {
    Running,
    Exited(Option<i32>),
    NoHandle,
}
