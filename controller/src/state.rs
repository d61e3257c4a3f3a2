use crate::{
    clients::agent::AgentClient,
    config::ControllerConfig,
    repositories::{apps::AppsRepository, templates::TemplatesRepository, users::UsersRepository},
    services::port_pool::PortPool,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct ControllerState {
    pub config: Arc<ControllerConfig>,
    pub apps: Arc<AppsRepository>,
    pub templates: Arc<TemplatesRepository>,
    pub users: Arc<UsersRepository>,
    pub ports: Arc<PortPool>,
    pub agent: Arc<dyn AgentClient>,
}
