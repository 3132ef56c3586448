//! Shared application state handed to every HTTP handler.

use crate::hub::Hub;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(hub: Hub, pipeline: Pipeline) -> Self {
        Self { hub, pipeline }
    }
}
