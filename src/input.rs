//! Host-independent input events.
//!
//! The host translates its own pointer/wheel/keyboard callbacks into
//! [`InputEvent`]s and feeds them to `MaskPanel::handle_input`. Positions are
//! in host display space; the panel maps them through its `HostView`.

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// A button was pressed. `button` names which one.
    Down(MouseButton),
    /// The pointer moved.
    Move,
    /// A button was released.
    Up(MouseButton),
    /// Wheel scrolled; positive is away from the user (scroll up).
    Wheel { delta: f32 },
    /// A key was pressed while the panel had focus.
    Key(Key),
    /// The pointer left the panel.
    Leave,
}

/// One event from the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    pub kind: EventKind,
    /// Host display coordinates.
    pub x: f32,
    pub y: f32,
    /// Buttons held when the event was generated.
    pub buttons: Buttons,
    pub modifiers: Modifiers,
}

impl InputEvent {
    pub fn new(kind: EventKind, x: f32, y: f32) -> Self {
        Self {
            kind,
            x,
            y,
            buttons: Buttons::default(),
            modifiers: Modifiers::default(),
        }
    }

    pub fn down(button: MouseButton, x: f32, y: f32) -> Self {
        let mut event = Self::new(EventKind::Down(button), x, y);
        event.buttons.set(button, true);
        event
    }

    pub fn moved(x: f32, y: f32) -> Self {
        Self::new(EventKind::Move, x, y)
    }

    pub fn up(button: MouseButton, x: f32, y: f32) -> Self {
        Self::new(EventKind::Up(button), x, y)
    }

    pub fn wheel(delta: f32, x: f32, y: f32) -> Self {
        Self::new(EventKind::Wheel { delta }, x, y)
    }

    pub fn key(key: Key) -> Self {
        Self::new(EventKind::Key(key), 0.0, 0.0)
    }

    pub fn with_buttons(mut self, buttons: Buttons) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Set of held mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons {
    pub left: bool,
    pub right: bool,
    pub middle: bool,
}

impl Buttons {
    pub const LEFT: Buttons = Buttons {
        left: true,
        right: false,
        middle: false,
    };

    pub const RIGHT: Buttons = Buttons {
        left: false,
        right: true,
        middle: false,
    };

    pub fn set(&mut self, button: MouseButton, held: bool) {
        match button {
            MouseButton::Left => self.left = held,
            MouseButton::Right => self.right = held,
            MouseButton::Middle => self.middle = held,
        }
    }

    pub fn any(&self) -> bool {
        self.left || self.right || self.middle
    }
}

/// Keys the panel reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Delete,
}

/// Keyboard modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub const CTRL: Modifiers = Modifiers {
        shift: false,
        ctrl: true,
        alt: false,
        meta: false,
    };

    /// Ctrl on most platforms, Cmd on macOS.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}
