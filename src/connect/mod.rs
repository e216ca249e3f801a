//! OAuth connection handshake: a pure session state machine plus the popup
//! boundary it is driven through.

pub mod browser;
pub mod popup;
pub mod session;

pub use browser::BrowserLauncher;
pub use popup::{
    PopupFeatures, PopupHandle, PopupLauncher, PopupWindow, WindowGeometry, WindowMessage,
    await_popup,
};
pub use session::{ConnectEvent, ConnectionSession, ConnectionState};
