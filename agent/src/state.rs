use crate::{clients::controller::ControllerClient, config::AgentConfig, registry::Registry, routes_store::RoutesStore, vram::VramAllocator};
use std::sync::Arc;

/// Shared state threaded through every HTTP handler and background task.
#[derive(Clone)]
pub struct AgentState {
    pub config: Arc<AgentConfig>,
    pub routes: Arc<RoutesStore>,
    pub vram: Arc<VramAllocator>,
    pub registry: Arc<Registry>,
    pub controller: Arc<dyn ControllerClient>,
}
