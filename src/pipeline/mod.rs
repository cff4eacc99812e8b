//! Frame worker thread: drains inbound frames and commands in arrival order and drives the
//! [`Controller`](crate::Controller).

pub mod commands;

use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::{
    control::{Controller, InputSink},
    types::LandmarkFrame,
};

use self::commands::Command;

/// One message for the frame worker.
#[derive(Clone, Debug)]
pub enum Inbound {
    Frame(LandmarkFrame),
    Command(Command),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePolicy {
    /// Skip frames that are already stale when the worker gets to them (live capture).
    Latest,
    /// Process every frame (replay).
    Every,
}

/// Spawns the worker. Dropping every sender stops it; the join handle returns the controller
/// after it has been shut down.
pub fn start_pipeline<S: InputSink + 'static>(
    controller: Controller<S>,
    policy: FramePolicy,
) -> (Sender<Inbound>, thread::JoinHandle<Controller<S>>) {
    let (tx, rx) = crossbeam_channel::bounded(64);
    let handle = thread::spawn(move || run_worker_loop(controller, rx, policy));
    (tx, handle)
}

fn run_worker_loop<S: InputSink>(
    mut controller: Controller<S>,
    inbound_rx: Receiver<Inbound>,
    policy: FramePolicy,
) -> Controller<S> {
    let mut pending = None;
    loop {
        let message = match pending.take() {
            Some(message) => message,
            None => match inbound_rx.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };
        match message {
            Inbound::Command(command) => {
                log::debug!("applying {command:?}");
                controller.apply_command(command);
            }
            Inbound::Frame(frame) => {
                let frame = match policy {
                    FramePolicy::Latest => {
                        let (frame, next) = recv_latest_frame(frame, &inbound_rx);
                        pending = next;
                        frame
                    }
                    FramePolicy::Every => frame,
                };
                controller.process_frame(&frame);
            }
        }
    }
    controller.shutdown();
    controller
}

/// Replaces `frame` with any newer frames already queued. Stops at the first command, which is
/// handed back so it still runs after this frame.
fn recv_latest_frame(mut frame: LandmarkFrame, inbound_rx: &Receiver<Inbound>) -> (LandmarkFrame, Option<Inbound>) {
    while let Ok(next) = inbound_rx.try_recv() {
        match next {
            Inbound::Frame(newer) => frame = newer,
            command => return (frame, Some(command)),
        }
    }
    (frame, None)
}
