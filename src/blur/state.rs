use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayState {
    #[default]
    Hidden,
    /// Opaque and catching the pointer.
    Visible,
    /// Alpha 0 and click-through while the pointer is over the target.
    HoverTransparent,
}

impl OverlayState {
    pub fn is_shown(self) -> bool {
        !matches!(self, Self::Hidden)
    }
}

pub fn can_transition(from: OverlayState, to: OverlayState) -> bool {
    matches!(
        (from, to),
        (OverlayState::Hidden, OverlayState::Visible)
            | (OverlayState::Visible, OverlayState::Hidden)
            | (OverlayState::Visible, OverlayState::HoverTransparent)
            | (OverlayState::HoverTransparent, OverlayState::Visible)
            | (OverlayState::HoverTransparent, OverlayState::Hidden)
    ) || from == to
}
