pub mod capture;
pub mod effect;
pub mod geometry;
pub mod hover;
pub mod locator;
pub mod messages;
pub mod overlay;
pub mod poller;
pub mod service;
pub mod state;
pub mod tracking;
pub mod visibility;

pub use geometry::ScreenRect;
pub use messages::BlurCommand;
pub use service::{BlurService, Diagnostics, ServiceHandle};
pub use state::OverlayState;
pub use tracking::TrackingLoop;
