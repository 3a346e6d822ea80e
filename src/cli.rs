use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::ClientConfig;
use crate::error::{Result, StudyRoomError};
use crate::model::{RoomMode, RoomPayload};
use crate::roster::Presence;

#[derive(Parser, Debug)]
#[command(name = "study-rooms")]
#[command(version)]
#[command(about = "Browse, join, and schedule study rooms from the terminal")]
pub struct Args {
    /// TOML config file (overrides STUDY_ROOMS_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the study-room API
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Local storage database
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (e.g. debug, study_rooms=trace)
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Skip per-room detail requests when listing
    #[arg(long, global = true)]
    pub no_details: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a credential and identity obtained from signing in
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
    },
    /// Forget the stored credential
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// List rooms
    Rooms {
        /// Match name or description
        #[arg(long, short)]
        search: Option<String>,
        /// Require a tag (repeatable)
        #[arg(long, short)]
        tag: Vec<String>,
        /// Only rooms I created
        #[arg(long, conflicts_with = "joined")]
        mine: bool,
        /// Only rooms I joined
        #[arg(long)]
        joined: bool,
        /// Show every room in a section instead of a preview
        #[arg(long)]
        all: bool,
    },
    /// Show one room and its participants
    Show { id: String },
    /// Join a room
    Join { id: String },
    /// Leave a room
    Leave { id: String },
    /// Delete a room you own
    Delete { id: String },
    /// Create a room
    Create(RoomFields),
    /// Edit a room; unspecified fields keep their current value
    Edit {
        id: String,
        #[command(flatten)]
        fields: RoomFields,
    },
    /// Set how a participant shows up in a room's roster
    Presence {
        id: String,
        status: Presence,
        /// Participant id (default: yourself)
        #[arg(long)]
        participant: Option<String>,
        /// Display name override
        #[arg(long)]
        name: Option<String>,
        /// Avatar URL override
        #[arg(long)]
        avatar: Option<String>,
    },
    /// Month calendar
    Calendar {
        /// Month to show as yyyy-mm (default: current month)
        #[arg(long)]
        month: Option<String>,
    },
    /// Upcoming schedule
    Schedule {
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// List discussion threads
    Threads,
    /// Show one discussion thread
    Thread { id: String },
    /// Start a discussion thread
    Post {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Reply to a discussion thread
    Reply { id: String, text: String },
    /// Print shell completions
    Completions { shell: Shell },
}

/// Room fields accepted by `create` and `edit`.
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct RoomFields {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub capacity: Option<u32>,
    /// yyyy-mm-dd
    #[arg(long)]
    pub date: Option<String>,
    /// HH:mm
    #[arg(long)]
    pub start: Option<String>,
    /// HH:mm
    #[arg(long)]
    pub end: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    /// online, offline, or hybrid
    #[arg(long)]
    pub mode: Option<String>,
    /// Tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

impl RoomFields {
    /// Overlay the given fields onto `base`.
    pub fn apply_to(&self, mut base: RoomPayload) -> Result<RoomPayload> {
        if let Some(v) = &self.name {
            base.name = v.clone();
        }
        if let Some(v) = &self.description {
            base.description = v.clone();
        }
        if let Some(v) = self.capacity {
            base.capacity = v;
        }
        if let Some(v) = &self.date {
            base.date = v.clone();
        }
        if let Some(v) = &self.start {
            base.start_time = v.clone();
        }
        if let Some(v) = &self.end {
            base.end_time = v.clone();
        }
        if let Some(v) = &self.location {
            base.location = v.clone();
        }
        if let Some(v) = &self.mode {
            base.mode = RoomMode::parse(v)
                .ok_or_else(|| StudyRoomError::Invalid(format!("unknown mode {v:?}")))?;
        }
        if !self.tags.is_empty() {
            base.tags = self.tags.clone();
        }
        Ok(base)
    }
}

impl Args {
    /// Apply command-line overrides, the last configuration layer.
    pub fn apply_overrides(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.api_url {
            config.api_base_url = url.clone();
        }
        if let Some(path) = &self.storage {
            config.storage_path = path.clone();
        }
        if let Some(level) = &self.log {
            config.log_level = level.clone();
        }
        if self.no_details {
            config.fetch_details = false;
        }
    }
}

/// Parse `yyyy-mm` into (year, month).
pub fn parse_month(s: &str) -> Result<(i32, u32)> {
    let invalid = || StudyRoomError::Invalid(format!("month {s:?} is not yyyy-mm"));
    let (y, m) = s.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let month: u32 = m.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_rooms_filters() {
        let args = Args::parse_from(["study-rooms", "rooms", "--search", "calc", "-t", "math", "-t", "exam", "--joined"]);
        match args.command {
            Command::Rooms { search, tag, joined, mine, .. } => {
                assert_eq!(search.as_deref(), Some("calc"));
                assert_eq!(tag, ["math", "exam"]);
                assert!(joined);
                assert!(!mine);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_mine_conflicts_with_joined() {
        assert!(Args::try_parse_from(["study-rooms", "rooms", "--mine", "--joined"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["study-rooms", "whoami", "--api-url", "http://x"]);
        let mut c = ClientConfig::default();
        args.apply_overrides(&mut c);
        assert_eq!(c.api_base_url, "http://x");
    }

    #[test]
    fn test_edit_fields_overlay() {
        let args = Args::parse_from(["study-rooms", "edit", "4", "--start", "10:00", "--mode", "Offline"]);
        let Command::Edit { id, fields } = args.command else {
            panic!("expected edit");
        };
        assert_eq!(id, "4");
        let base = RoomPayload {
            name: "A".into(),
            start_time: "09:00".into(),
            ..Default::default()
        };
        let p = fields.apply_to(base).unwrap();
        assert_eq!(p.start_time, "10:00");
        assert_eq!(p.mode, RoomMode::Offline);
        assert_eq!(p.name, "A");
    }

    #[test]
    fn test_bad_mode_rejected() {
        let fields = RoomFields {
            mode: Some("in person".into()),
            ..Default::default()
        };
        assert!(fields.apply_to(RoomPayload::default()).is_err());
    }

    #[test]
    fn test_presence_value_enum() {
        let args = Args::parse_from(["study-rooms", "presence", "4", "away", "--participant", "9"]);
        let Command::Presence { status, participant, .. } = args.command else {
            panic!("expected presence");
        };
        assert_eq!(status, Presence::Away);
        assert_eq!(participant.as_deref(), Some("9"));
        assert!(Args::try_parse_from(["study-rooms", "presence", "4", "busy"]).is_err());
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("2024-03").unwrap(), (2024, 3));
        assert!(parse_month("2024-13").is_err());
        assert!(parse_month("March").is_err());
    }
}
