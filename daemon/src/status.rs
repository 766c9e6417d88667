use std::fmt;

/// Coarse availability of the watched server.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Availability {
    /// Nothing has been observed yet (fresh start, or recovery found nothing usable).
    Unknown,
    Online,
    Offline,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Availability::Unknown => "unknown",
            Availability::Online => "online",
            Availability::Offline => "offline",
        })
    }
}

/// Last known status of the server as far as the published notice is concerned.
///
/// A player count exists only while online, so it lives inside the `Online`
/// variant instead of beside the availability.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum StatusSnapshot {
    #[default]
    Unknown,
    Online {
        players: u32,
    },
    Offline,
}

impl StatusSnapshot {
    pub fn availability(&self) -> Availability {
        match self {
            StatusSnapshot::Unknown => Availability::Unknown,
            StatusSnapshot::Online { .. } => Availability::Online,
            StatusSnapshot::Offline => Availability::Offline,
        }
    }

    pub fn player_count(&self) -> Option<u32> {
        match self {
            StatusSnapshot::Online { players } => Some(*players),
            _ => None,
        }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusSnapshot::Online { players } => write!(f, "online ({players} players)"),
            other => write!(f, "{}", other.availability()),
        }
    }
}
