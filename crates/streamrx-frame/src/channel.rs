//! Stable channel ids shared by both ends of a session.
//!
//! The data transport prefixes every message with one of these ids. Both
//! peers must agree on the enumeration; ids a receiver does not declare are
//! dropped, so new channels can be added without breaking older clients.

/// Session-level control messages.
pub const GENERAL: u8 = 0;

/// Host statistics records (telemetry).
pub const STATS: u8 = 1;

/// Host video packets when video is carried over the data transport.
pub const HOST_VIDEO: u8 = 2;

/// Host audio packets when audio is carried over the data transport.
pub const HOST_AUDIO: u8 = 3;

/// Mouse buttons and wheel (reliable, ordered).
pub const MOUSE_RELIABLE: u8 = 4;

/// Absolute mouse position (unreliable, latest wins).
pub const MOUSE_ABSOLUTE: u8 = 5;

/// Relative mouse motion (unreliable, ordered).
pub const MOUSE_RELATIVE: u8 = 6;

/// Keyboard events.
pub const KEYBOARD: u8 = 7;

/// Touch events.
pub const TOUCH: u8 = 8;

/// Controller arrival/removal.
pub const CONTROLLERS: u8 = 9;

/// Number of per-controller state channels.
pub const CONTROLLER_COUNT: u8 = 16;

const CONTROLLER_BASE: u8 = 10;

/// Channel id carrying the state of controller `index`.
pub fn controller_channel(index: u8) -> Option<u8> {
    (index < CONTROLLER_COUNT).then(|| CONTROLLER_BASE + index)
}

/// Returns a human-readable name for a channel id.
pub fn channel_name(id: u8) -> &'static str {
    match id {
        GENERAL => "GENERAL",
        STATS => "STATS",
        HOST_VIDEO => "HOST_VIDEO",
        HOST_AUDIO => "HOST_AUDIO",
        MOUSE_RELIABLE => "MOUSE_RELIABLE",
        MOUSE_ABSOLUTE => "MOUSE_ABSOLUTE",
        MOUSE_RELATIVE => "MOUSE_RELATIVE",
        KEYBOARD => "KEYBOARD",
        TOUCH => "TOUCH",
        CONTROLLERS => "CONTROLLERS",
        10..=25 => "CONTROLLER",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_channels_are_contiguous() {
        assert_eq!(controller_channel(0), Some(10));
        assert_eq!(controller_channel(15), Some(25));
        assert_eq!(controller_channel(16), None);
        assert_eq!(channel_name(25), "CONTROLLER");
        assert_eq!(channel_name(26), "UNKNOWN");
    }
}
