//! Host input events and the single place that decides how to react to them.
//!
//! winit events are first translated into [`AppEvent`] (tracking pointer state
//! so drags can be told apart from plain moves) and then handed to
//! [`dispatch`], which returns what the render loop should do next.

use std::path::PathBuf;

use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{Key, NamedKey};

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    KeyPressed { key: Key, repeat: bool },
    KeyReleased { key: Key },
    MouseMoved { x: f64, y: f64 },
    MouseDragged { x: f64, y: f64, button: MouseButton },
    MousePressed { x: f64, y: f64, button: MouseButton },
    MouseReleased { x: f64, y: f64, button: MouseButton },
    MouseEntered,
    MouseExited,
    WindowResized { width: u32, height: u32 },
    FileDropped(PathBuf),
    CloseRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResponse {
    Continue,
    Resize { width: u32, height: u32 },
    Exit,
}

/// Remembers the cursor position and held buttons between events.
#[derive(Debug, Default)]
pub struct PointerTracker {
    position: (f64, f64),
    held: Vec<MouseButton>,
    inside: bool,
}

impl PointerTracker {
    pub fn moved(&mut self, x: f64, y: f64) -> AppEvent {
        self.position = (x, y);
        match self.held.first() {
            Some(&button) => AppEvent::MouseDragged { x, y, button },
            None => AppEvent::MouseMoved { x, y },
        }
    }

    pub fn button(&mut self, state: ElementState, button: MouseButton) -> AppEvent {
        let (x, y) = self.position;
        match state {
            ElementState::Pressed => {
                if !self.held.contains(&button) {
                    self.held.push(button);
                }
                AppEvent::MousePressed { x, y, button }
            }
            ElementState::Released => {
                self.held.retain(|held| *held != button);
                AppEvent::MouseReleased { x, y, button }
            }
        }
    }

    pub fn entered(&mut self) -> AppEvent {
        self.inside = true;
        AppEvent::MouseEntered
    }

    pub fn left(&mut self) -> AppEvent {
        self.inside = false;
        AppEvent::MouseExited
    }

    pub fn is_inside(&self) -> bool {
        self.inside
    }
}

/// Maps a winit window event onto an [`AppEvent`]; events the sketch has no
/// callback for yield `None`.
pub fn translate(event: &WindowEvent, pointer: &mut PointerTracker) -> Option<AppEvent> {
    let translated = match event {
        WindowEvent::KeyboardInput { event, .. } => match event.state {
            ElementState::Pressed => AppEvent::KeyPressed {
                key: event.logical_key.clone(),
                repeat: event.repeat,
            },
            ElementState::Released => AppEvent::KeyReleased {
                key: event.logical_key.clone(),
            },
        },
        WindowEvent::CursorMoved { position, .. } => pointer.moved(position.x, position.y),
        WindowEvent::MouseInput { state, button, .. } => pointer.button(*state, *button),
        WindowEvent::CursorEntered { .. } => pointer.entered(),
        WindowEvent::CursorLeft { .. } => pointer.left(),
        WindowEvent::Resized(size) => AppEvent::WindowResized {
            width: size.width,
            height: size.height,
        },
        WindowEvent::DroppedFile(path) => AppEvent::FileDropped(path.clone()),
        WindowEvent::CloseRequested | WindowEvent::Destroyed => AppEvent::CloseRequested,
        _ => return None,
    };
    Some(translated)
}

/// Decides the render loop's reaction to one event.
pub fn dispatch(event: &AppEvent, escape_quits: bool) -> EventResponse {
    match event {
        AppEvent::CloseRequested => EventResponse::Exit,
        AppEvent::KeyPressed {
            key: Key::Named(NamedKey::Escape),
            ..
        } if escape_quits => {
            tracing::info!("escape pressed; exiting");
            EventResponse::Exit
        }
        AppEvent::WindowResized { width, height } => EventResponse::Resize {
            width: *width,
            height: *height,
        },
        AppEvent::FileDropped(path) => {
            tracing::debug!(path = %path.display(), "file dropped on window; ignoring");
            EventResponse::Continue
        }
        other => {
            tracing::trace!(event = ?other, "event has no handler");
            EventResponse::Continue
        }
    }
}
