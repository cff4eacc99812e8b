use std::{fmt, str::FromStr, time::Instant};

use serde::{Deserialize, Serialize};

pub const LANDMARK_COUNT: usize = 21;
pub const FEATURE_LEN: usize = LANDMARK_COUNT * 3;

/// MediaPipe hand landmark indices used across the crate.
pub mod landmark {
    pub const WRIST: usize = 0;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_TIP: usize = 20;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Coarse handedness reported by the vision collaborator. Unreliable; the role
/// tracker never trusts it for slot assignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandednessHint {
    Left,
    Right,
    #[default]
    Unknown,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandSkeleton {
    points: [Landmark; LANDMARK_COUNT],
    pub handedness: HandednessHint,
}

impl HandSkeleton {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self {
            points,
            handedness: HandednessHint::Unknown,
        }
    }

    /// Builds a skeleton from a slice, rejecting anything that is not exactly 21 points.
    pub fn from_points(points: &[Landmark]) -> Option<Self> {
        let points: [Landmark; LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self::new(points))
    }

    pub fn with_handedness(mut self, handedness: HandednessHint) -> Self {
        self.handedness = handedness;
        self
    }

    pub fn points(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.points
    }

    pub fn point(&self, idx: usize) -> Landmark {
        self.points[idx]
    }

    pub fn translated(&self, dx: f32, dy: f32, dz: f32) -> Self {
        let mut out = self.clone();
        for p in out.points.iter_mut() {
            p.x += dx;
            p.y += dy;
            p.z += dz;
        }
        out
    }

    pub fn scaled(&self, factor: f32) -> Self {
        let mut out = self.clone();
        for p in out.points.iter_mut() {
            p.x *= factor;
            p.y *= factor;
            p.z *= factor;
        }
        out
    }
}

/// Closed gesture vocabulary shared by the rule classifier, bindings and the mode machines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GestureLabel {
    #[default]
    None,
    OpenPalm,
    PinchIndex,
    VSign,
    Fist,
    Knife,
    Other,
}

impl GestureLabel {
    /// Labels the adaptive classifier always trains first, in this order.
    pub const BOOTSTRAP: [GestureLabel; 5] = [
        GestureLabel::OpenPalm,
        GestureLabel::Fist,
        GestureLabel::VSign,
        GestureLabel::PinchIndex,
        GestureLabel::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GestureLabel::None => "NONE",
            GestureLabel::OpenPalm => "OPEN_PALM",
            GestureLabel::PinchIndex => "PINCH_INDEX",
            GestureLabel::VSign => "V_SIGN",
            GestureLabel::Fist => "FIST",
            GestureLabel::Knife => "KNIFE",
            GestureLabel::Other => "OTHER",
        }
    }

    /// Whether the label may appear in user bindings. KNIFE stays internal to the rule classifier.
    pub fn is_bindable(&self) -> bool {
        !matches!(self, GestureLabel::Knife)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, GestureLabel::None)
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GestureLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(GestureLabel::None),
            "OPEN_PALM" => Ok(GestureLabel::OpenPalm),
            "PINCH_INDEX" => Ok(GestureLabel::PinchIndex),
            "V_SIGN" => Ok(GestureLabel::VSign),
            "FIST" => Ok(GestureLabel::Fist),
            "KNIFE" => Ok(GestureLabel::Knife),
            "OTHER" => Ok(GestureLabel::Other),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown gesture label: {0}")]
pub struct UnknownLabel(pub String);

/// Logical duty of a tracked hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandRole {
    Primary,
    Secondary,
}

impl HandRole {
    pub const ALL: [HandRole; 2] = [HandRole::Primary, HandRole::Secondary];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandRole::Primary => "primary",
            HandRole::Secondary => "secondary",
        }
    }
}

impl FromStr for HandRole {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "cursor" => Ok(HandRole::Primary),
            "secondary" | "other" => Ok(HandRole::Secondary),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
}

/// Injector-agnostic description of one OS input event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionIntent {
    /// Normalized [0,1] position; the injector maps it onto the screen.
    PointerMove { x: f32, y: f32 },
    MouseDown { button: MouseButton },
    MouseUp { button: MouseButton },
    Click {
        button: MouseButton,
        at: Option<(f32, f32)>,
    },
    DoubleClick,
    /// Positive scrolls up.
    Scroll { amount: i32 },
    KeyPress { name: String },
    Hotkey { keys: Vec<String> },
}

impl ActionIntent {
    pub fn key(name: &str) -> Self {
        ActionIntent::KeyPress {
            name: name.to_string(),
        }
    }

    pub fn hotkey(keys: &[&str]) -> Self {
        ActionIntent::Hotkey {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn left_click() -> Self {
        ActionIntent::Click {
            button: MouseButton::Left,
            at: None,
        }
    }
}

/// One acquisition-loop input: zero to two skeletons stamped with capture time.
#[derive(Clone, Debug)]
pub struct LandmarkFrame {
    pub hands: Vec<HandSkeleton>,
    pub timestamp: Instant,
}

impl LandmarkFrame {
    pub fn new(hands: Vec<HandSkeleton>, timestamp: Instant) -> Self {
        Self { hands, timestamp }
    }
}
