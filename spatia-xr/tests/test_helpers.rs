//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use spatia_xr::config::SessionConfig;
use spatia_xr::sim::{MemoryScene, SimSettings, SimulatedHost};
use spatia_xr::{SessionCoordinator, SpatialEnvironmentDetector, Subject, XrEvent};

pub fn coordinator(settings: SimSettings) -> (Arc<SimulatedHost>, SessionCoordinator) {
    let host = SimulatedHost::new(settings);
    let coordinator = SessionCoordinator::new(
        host.clone(),
        SpatialEnvironmentDetector::new(host.clone()),
        SessionConfig::default(),
    );
    (host, coordinator)
}

pub fn scene() -> Arc<Mutex<MemoryScene>> {
    Arc::new(Mutex::new(MemoryScene::new()))
}

/// Record every event a subject emits, by wire name.
pub fn record<E: XrEvent + 'static>(subject: &Subject<E>, log: &Arc<Mutex<Vec<String>>>) {
    let sink = Arc::clone(log);
    subject.subscribe(move |event: &E| sink.lock().push(event.name().to_string()));
}

pub fn event_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}
