//! In-memory stand-ins for the controller and the duration probe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::controller::{Connector, Controller, ControllerError};
use crate::probe::{DurationProbe, ProbeError};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ActiveScene,
    SetActiveScene(String),
    SetInputPlaylist(String, Vec<String>),
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub scene: String,
    pub calls: Vec<Call>,
    pub connects: usize,
    pub refuse_connect: bool,
    pub fail_scene_query: bool,
    pub fail_scene_switch: bool,
    pub fail_playlist: bool,
}

/// Scriptable controller; clones share state so a test keeps a handle while
/// the supervisor owns the session.
#[derive(Debug, Clone, Default)]
pub struct FakeObs(Arc<Mutex<FakeState>>);

impl FakeObs {
    pub fn with_scene(scene: &str) -> Self {
        let obs = Self::default();
        obs.update(|s| s.scene = scene.to_string());
        obs
    }

    pub fn update(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.0.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().calls.clone()
    }

    /// Calls other than scene queries.
    pub fn commands(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| *c != Call::ActiveScene).collect()
    }

    pub fn connects(&self) -> usize {
        self.0.lock().unwrap().connects
    }
}

#[async_trait]
impl Controller for FakeObs {
    async fn active_scene(&mut self) -> Result<String, ControllerError> {
        let mut state = self.0.lock().unwrap();
        state.calls.push(Call::ActiveScene);
        if state.fail_scene_query {
            return Err(ControllerError::Closed);
        }
        Ok(state.scene.clone())
    }

    async fn set_active_scene(&mut self, scene: &str) -> Result<(), ControllerError> {
        let mut state = self.0.lock().unwrap();
        state.calls.push(Call::SetActiveScene(scene.to_string()));
        if state.fail_scene_switch {
            return Err(ControllerError::Rejected {
                request: "SetCurrentProgramScene".to_string(),
                code: 600,
                comment: "No scene".to_string(),
            });
        }
        state.scene = scene.to_string();
        Ok(())
    }

    async fn set_input_playlist(&mut self, input: &str, paths: &[String]) -> Result<(), ControllerError> {
        let mut state = self.0.lock().unwrap();
        state.calls.push(Call::SetInputPlaylist(input.to_string(), paths.to_vec()));
        if state.fail_playlist {
            return Err(ControllerError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for FakeObs {
    async fn connect(&self) -> Result<Box<dyn Controller>, ControllerError> {
        let mut state = self.0.lock().unwrap();
        state.connects += 1;
        if state.refuse_connect {
            return Err(ControllerError::Timeout("connect"));
        }
        Ok(Box::new(self.clone()))
    }
}

/// Fixed durations per path; unknown paths fail to probe.
pub struct FakeProbe {
    durations: HashMap<String, f64>,
}

impl FakeProbe {
    pub fn new(durations: &[(&str, f64)]) -> Self {
        Self {
            durations: durations.iter().map(|(p, d)| (p.to_string(), *d)).collect(),
        }
    }
}

#[async_trait]
impl DurationProbe for FakeProbe {
    async fn duration(&self, path: &str) -> Result<f64, ProbeError> {
        self.durations
            .get(path)
            .copied()
            .ok_or_else(|| ProbeError::Unparseable("N/A".to_string()))
    }
}
