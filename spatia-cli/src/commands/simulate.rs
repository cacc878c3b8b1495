//! Replay a scripted session against the simulated host

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;
use glam::Vec3;
use parking_lot::Mutex;
use spatia_xr::host::{
    Handedness, InputSourceId, InputSourceInfo, InputSourceKind, ObjectId, PlaneHandle,
    PlaneOrientation,
};
use spatia_xr::sim::{MemoryScene, SimFrame, SimSettings, SimulatedHost};
use spatia_xr::{
    FeatureOverrides, InputEvent, InputEventKind, InteractionManager, Pose, SceneCollaborator,
    SessionCoordinator, SessionMode, SpatialEnvironmentDetector, Subject, XrConfig, XrEvent,
};

const CONTROLLER: InputSourceId = InputSourceId(1);
const HAND: InputSourceId = InputSourceId(2);
const LAMP: ObjectId = ObjectId(1);
const VASE: ObjectId = ObjectId(2);

const FLOOR: PlaneHandle = PlaneHandle(1);
const WALL: PlaneHandle = PlaneHandle(2);

/// What a replay produced
#[derive(Debug, Default)]
pub struct Summary {
    pub frames: u64,
    pub events: Vec<String>,
    pub placements: usize,
    pub selected: Option<ObjectId>,
}

pub async fn run(config: XrConfig, mode: SessionMode, frames: u32) -> Result<()> {
    println!("{} Simulating {} session for {} frames", "→".blue().bold(), mode, frames);
    let summary = replay(config, mode, frames, true).await?;

    println!(
        "{} {} frames, {} events, {} placements",
        "✓".green(),
        summary.frames,
        summary.events.len(),
        summary.placements
    );
    if let Some(selected) = summary.selected {
        println!("  selected {}", selected);
    }
    Ok(())
}

/// Drive a full session: negotiate, attach, run the frame script, tear down.
pub async fn replay(
    config: XrConfig,
    mode: SessionMode,
    frames: u32,
    print: bool,
) -> Result<Summary> {
    let host = SimulatedHost::new(SimSettings::default());
    let coordinator = SessionCoordinator::new(
        host.clone(),
        SpatialEnvironmentDetector::new(host.clone()),
        config.session.clone(),
    );

    let scene = Arc::new(Mutex::new(MemoryScene::new()));
    scene.lock().add_object(LAMP, Vec3::new(0.0, 1.0, -2.0), 0.3);
    scene.lock().add_object(VASE, pinch_target() + Vec3::new(0.03, 0.0, 0.0), 0.05);

    let mut manager = InteractionManager::new(config, scene.clone());
    let log = Arc::new(Mutex::new(Vec::new()));
    let frame_no = Arc::new(AtomicU32::new(0));
    let printer = Printer { log: log.clone(), frame: frame_no.clone(), print };
    printer.watch(coordinator.events(), "session");
    printer.watch(manager.planes().events(), "planes");
    printer.watch(manager.anchors().events(), "anchors");
    printer.watch(manager.controllers().events(), "controller");
    printer.watch(manager.hands().events(), "hands");

    let session = coordinator
        .request_session(mode, FeatureOverrides::default())
        .await
        .context("session negotiation failed")?;
    manager.attach_session(&session).await;
    manager.input_sources_changed(
        &[
            InputSourceInfo {
                id: CONTROLLER,
                handedness: Handedness::Right,
                kind: InputSourceKind::Controller,
            },
            InputSourceInfo {
                id: HAND,
                handedness: Handedness::Left,
                kind: InputSourceKind::Hand,
            },
        ],
        &[],
    );

    for index in 0..frames {
        frame_no.store(index, Ordering::Relaxed);
        let Some(request) = host.take_frame_request() else {
            break;
        };
        let frame = script_frame(index, mode, &manager);
        manager.on_frame(request, &frame);

        for kind in script_input(index) {
            manager
                .handle_input(InputEvent::new(CONTROLLER, *kind))
                .await
                .context("input dispatch failed")?;
        }
    }

    let frames_run = manager.frames();
    manager.detach_session();
    coordinator.end_session().await;

    let scene = scene.lock();
    let events = log.lock().clone();
    Ok(Summary {
        frames: frames_run,
        events,
        placements: scene.placements.len(),
        selected: scene.selected(),
    })
}

/// Point the left index tip lands on
fn pinch_target() -> Vec3 {
    Vec3::new(-0.3, 1.1, -0.6)
}

fn script_frame(index: u32, mode: SessionMode, manager: &InteractionManager) -> SimFrame {
    let time = f64::from(index) * 16.0;
    let mut frame = SimFrame::new(time)
        .with_controller(CONTROLLER, Pose::from_position(Vec3::new(0.0, 1.0, 0.0)))
        .with_hand(
            HAND,
            pinch_target() + Vec3::new(0.0, 0.0, 0.12),
            if (2..=3).contains(&index) { 0.01 } else { 0.04 },
            0.06,
        );

    if mode.is_ar() {
        let floor_stamp = if index >= 3 { 2.0 } else { 1.0 };
        frame = frame.with_plane(
            FLOOR,
            PlaneOrientation::Horizontal,
            square(if index >= 3 { 3.0 } else { 2.0 }),
            Pose::IDENTITY,
            floor_stamp,
        );
        if index >= 2 {
            frame = frame.with_plane(
                WALL,
                PlaneOrientation::Vertical,
                square(1.5),
                Pose::from_position(Vec3::new(0.0, 1.5, -3.0)),
                1.0,
            );
        }
        if index < 4 {
            frame = frame.with_hit(Pose::from_position(Vec3::new(0.3, 0.0, -1.5)));
        }
    }

    let drift = Vec3::new(0.001 * index as f32, 0.0, 0.0);
    for anchor in manager.anchors().anchors() {
        let pose = Pose::new(anchor.pose.position + drift, anchor.pose.orientation);
        frame = frame.with_anchor(anchor.handle, pose);
    }
    frame
}

fn script_input(index: u32) -> &'static [InputEventKind] {
    match index {
        1 => &[InputEventKind::Select],
        2 => &[InputEventKind::SelectStart],
        3 => &[InputEventKind::SqueezeStart, InputEventKind::SqueezeEnd],
        4 => &[InputEventKind::SelectEnd],
        _ => &[],
    }
}

fn square(size: f32) -> Vec<Vec3> {
    let h = size / 2.0;
    vec![
        Vec3::new(-h, 0.0, -h),
        Vec3::new(h, 0.0, -h),
        Vec3::new(h, 0.0, h),
        Vec3::new(-h, 0.0, h),
    ]
}

#[derive(Clone)]
struct Printer {
    log: Arc<Mutex<Vec<String>>>,
    frame: Arc<AtomicU32>,
    print: bool,
}

impl Printer {
    fn watch<E: XrEvent + 'static>(&self, subject: &Subject<E>, component: &'static str) {
        let printer = self.clone();
        subject.subscribe(move |event: &E| {
            printer.log.lock().push(event.name().to_string());
            if printer.print {
                println!(
                    "{:>6} {:<10} {:<14} {}",
                    format!("#{}", printer.frame.load(Ordering::Relaxed)).dimmed(),
                    component.cyan(),
                    event.name().bold(),
                    format!("{:?}", event).dimmed()
                );
            }
        });
    }
}
