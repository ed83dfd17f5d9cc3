mod error;
mod iina;
mod ipc;
mod system;

pub use error::PlayerIpcError;
pub use iina::{IinaPlayer, PlayerOptions};
pub use ipc::{IpcMessage, IpcRequest};
pub use system::{set_system_mute, set_system_volume};
