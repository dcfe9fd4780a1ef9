use serde::Serialize;

/// Requests processed in order by the tracking loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurCommand {
    ShowBlur,
    HideBlur,
    ToggleBlur,
    UpdatePosition,
    ReEvaluate,
    /// The pointer moved onto the overlay.
    PointerEntered,
    /// The hover watcher saw the pointer leave the target. Stale generations
    /// are ignored.
    HoverEnded { generation: u64 },
    TestCapture,
    Shutdown,
}

/// Outcome of the last diagnostic capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCaptureResult {
    Saved { path: std::path::PathBuf, width: u32, height: u32 },
    Failed { error: String },
}
