//! Terminal render surfaces.
//!
//! Every function here is a pure formatter from view models to a `String`;
//! printing is left to the binary. Colors come from `colored` and switch
//! off automatically when stdout is not a terminal.

use chrono::{Datelike, NaiveDate};
use colored::*;

use crate::calendar::{day_label, host_label, week_strip, DateGroups, MonthGrid};
use crate::dashboard::{LoadStatus, RoomEntry};
use crate::discussion::Thread;
use crate::listing::Section;
use crate::roster::{ParticipantRole, Roster};

const RULE_WIDTH: usize = 50;

fn rule() -> String {
    "=".repeat(RULE_WIDTH).bright_blue().to_string()
}

fn time_range(entry: &RoomEntry) -> String {
    format!("{}-{}", entry.view.start_label(), entry.view.end_label())
}

fn badge(entry: &RoomEntry) -> String {
    if entry.is_owner() {
        format!(" {}", "[owner]".bright_green().bold())
    } else if entry.is_joined() {
        format!(" {}", "[joined]".bright_cyan())
    } else {
        String::new()
    }
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// One-room summary card as used in lists.
pub fn room_card(entry: &RoomEntry) -> String {
    let v = &entry.view;
    let mut out = format!(
        "{} {}{}\n",
        format!("#{}", v.room_id).dimmed(),
        v.name.bold(),
        badge(entry)
    );
    if !v.subject.is_empty() {
        out.push_str(&format!("  {}\n", v.subject.bright_yellow()));
    }
    out.push_str(&format!("  {}\n", v.description));
    let when = match v.date {
        Some(_) => format!("{} {}", v.date_label(), time_range(entry)),
        None => time_range(entry),
    };
    let location = if v.location.is_empty() { "-" } else { v.location.as_str() };
    out.push_str(&format!(
        "  {} {}  {} {} ({})  {} {}\n",
        "When:".bright_yellow(),
        when,
        "Where:".bright_yellow(),
        location,
        v.mode,
        "Seats:".bright_yellow(),
        v.occupancy_label()
    ));
    if !v.tags.is_empty() {
        out.push_str(&format!("  {}\n", v.tags.iter().map(|t| format!("#{t}")).collect::<Vec<_>>().join(" ").cyan()));
    }
    out
}

pub fn room_list(entries: &[&RoomEntry]) -> String {
    if entries.is_empty() {
        return format!("{}\n", "No study rooms available.".dimmed());
    }
    entries.iter().map(|e| room_card(e)).collect::<Vec<_>>().join("\n")
}

/// A dashboard section, previewed unless `show_all`.
pub fn section(section: &Section<'_>, show_all: bool) -> String {
    let mut out = format!("{} ({})\n", section.title.bright_cyan().bold(), section.rooms.len());
    if section.is_empty() {
        out.push_str(&format!("  {}\n", "Nothing here yet.".dimmed()));
        return out;
    }
    let shown: &[&RoomEntry] = if show_all { &section.rooms } else { section.preview() };
    out.push_str(&room_list(shown));
    if !show_all && section.has_more() {
        out.push_str(&format!("{}\n", "… view all with --all".dimmed()));
    }
    out
}

/// Full detail view of one room with its participants.
pub fn room_detail(entry: &RoomEntry, roster: &Roster) -> String {
    let v = &entry.view;
    let mut out = format!("{}\n{}{}\n{}\n", rule(), v.name.bright_cyan().bold(), badge(entry), rule());
    let field = |label: &str, value: &str| format!("{}: {}\n", label.bright_yellow(), value);
    out.push_str(&field("Room", v.room_id.as_str()));
    if !v.subject.is_empty() {
        out.push_str(&field("Subject", &v.subject));
    }
    out.push_str(&field("Description", &v.description));
    let date = if v.date.is_some() { v.date_label() } else { "-".to_string() };
    out.push_str(&field("Date", &date));
    out.push_str(&field("Time", &time_range(entry)));
    out.push_str(&field("Location", if v.location.is_empty() { "-" } else { v.location.as_str() }));
    out.push_str(&field("Mode", &v.mode.to_string()));
    out.push_str(&field("Host", host_label(v)));
    out.push_str(&field("Your role", &entry.role.to_string()));
    if !v.tags.is_empty() {
        out.push_str(&field("Tags", &v.tags.join(", ")));
    }
    out.push_str(&format!(
        "\n{} {}\n",
        "Participants".bright_green(),
        roster.occupancy_label()
    ));
    for p in &roster.participants {
        let role = match p.role {
            ParticipantRole::Host => " (host)".bold().to_string(),
            ParticipantRole::Participant => String::new(),
        };
        out.push_str(&format!("  ● {}{} [{}] {}\n", p.name, role, p.status, p.avatar.dimmed()));
    }
    out
}

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

const WEEKDAY_HEADER: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Month grid followed by an agenda of the month's rooms.
pub fn month_calendar(grid: &MonthGrid, groups: &DateGroups<'_>, today: NaiveDate) -> String {
    let mut out = format!("{}\n", grid.title().bright_cyan().bold());
    out.push_str(&WEEKDAY_HEADER.map(|d| format!("{d:>4}")).concat());
    out.push('\n');
    for week in grid.weeks() {
        for cell in week {
            let text = match cell {
                None => "    ".to_string(),
                Some(date) => {
                    let day = date.day();
                    let busy = !grid.rooms_on(day, groups).is_empty();
                    let label = format!("{:>3}{}", day, if busy { "*" } else { " " });
                    if *date == today {
                        label.reversed().to_string()
                    } else if busy {
                        label.bright_green().to_string()
                    } else {
                        label
                    }
                }
            };
            out.push_str(&text);
        }
        out.push('\n');
    }

    let mut any = false;
    for day in 1..=grid.days_in_month() {
        for room in grid.rooms_on(day, groups) {
            any = true;
            out.push_str(&format!(
                "{:>3}  {} {}  {}\n",
                day,
                format!("{}-{}", room.start_label(), room.end_label()).dimmed(),
                room.name.bold(),
                format!("Host: {}", host_label(room)).dimmed()
            ));
        }
    }
    if grid.has_unplaced(groups) {
        out.push_str(&format!("{}\n", "There are rooms, but none are dated in this month.".dimmed()));
    } else if !any {
        out.push_str(&format!("{}\n", "No rooms this month.".dimmed()));
    }
    out
}

/// Seven-day strip and the next few rooms.
pub fn schedule_widget(rooms: &[&crate::normalize::RoomView], today: NaiveDate) -> String {
    let mut out = format!("{}\n", "Upcoming schedule".bright_cyan().bold());
    let strip: Vec<String> = week_strip(today)
        .iter()
        .map(|d| {
            let cell = format!("{} {:>2}", d.day_name(), d.date.day());
            if d.is_today {
                cell.bold().to_string()
            } else {
                cell
            }
        })
        .collect();
    out.push_str(&strip.join("  "));
    out.push('\n');
    if rooms.is_empty() {
        out.push_str(&format!("{}\n", "No study rooms available.".dimmed()));
        return out;
    }
    for room in rooms {
        let when = room.date.map(|d| day_label(d, today)).unwrap_or_default();
        out.push_str(&format!(
            "  {:<10} {} {}  {}\n",
            when,
            format!("{}-{}", room.start_label(), room.end_label()).dimmed(),
            room.name.bold(),
            room.location
        ));
    }
    out
}

// ---------------------------------------------------------------------------
// Discussions
// ---------------------------------------------------------------------------

pub fn thread_list(threads: &[Thread]) -> String {
    if threads.is_empty() {
        return format!("{}\n", "No discussions yet.".dimmed());
    }
    threads
        .iter()
        .map(|t| {
            format!(
                "{} {}  {} · {} replies · {}\n",
                t.id.to_string()[..8].dimmed(),
                t.title.bold(),
                t.author,
                t.reply_count(),
                t.last_activity().format("%Y-%m-%d %H:%M")
            )
        })
        .collect()
}

pub fn thread_detail(thread: &Thread) -> String {
    let mut out = format!("{}\n{}\n", thread.title.bright_cyan().bold(), rule());
    if !thread.subject.is_empty() {
        out.push_str(&format!("{}: {}\n", "Subject".bright_yellow(), thread.subject));
    }
    out.push_str(&format!(
        "{} {}\n",
        thread.author.bold(),
        thread.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
    ));
    if !thread.body.is_empty() {
        out.push_str(&format!("{}\n", thread.body));
    }
    for r in &thread.replies {
        out.push_str(&format!(
            "  ↳ {} {}: {}\n",
            r.author.bold(),
            r.created_at.format("%H:%M").to_string().dimmed(),
            r.text
        ));
    }
    out
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub fn status_line(status: &LoadStatus) -> String {
    match status {
        LoadStatus::Idle => String::new(),
        LoadStatus::Loading => "Loading study rooms...".dimmed().to_string(),
        LoadStatus::Ready => String::new(),
        LoadStatus::Failed(msg) => format!("{} {}", "error:".bright_red().bold(), msg),
        LoadStatus::LoginRequired => format!(
            "{} run `study-rooms login` first",
            "not logged in:".bright_red().bold()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::group_by_date;
    use crate::ledger::MembershipLedger;
    use crate::model::RawRoomRecord;
    use crate::normalize::normalize;
    use crate::ownership::Role;
    use crate::roster::{roster, OverrideMap};
    use serde_json::json;

    fn entry(v: serde_json::Value, role: Role) -> RoomEntry {
        colored::control::set_override(false);
        let view = normalize(&RawRoomRecord::from_value(v).unwrap(), None, &MembershipLedger::default());
        RoomEntry { view, role }
    }

    #[test]
    fn test_room_card_defaults_and_badge() {
        let e = entry(json!({"room_id": 3}), Role::Owner);
        let s = room_card(&e);
        assert!(s.contains("Unnamed Room"), "{s}");
        assert!(s.contains("[owner]"));
        assert!(s.contains("00:00-00:00"));
        assert!(s.contains("0/0"));
        assert!(s.contains("hybrid"));
    }

    #[test]
    fn test_room_list_empty() {
        colored::control::set_override(false);
        assert!(room_list(&[]).contains("No study rooms available."));
    }

    #[test]
    fn test_room_detail_lists_participants() {
        let e = entry(json!({"room_id": 3, "host": "bob", "capacity": 5}), Role::Stranger);
        let r = roster(&e.view, None, &OverrideMap::new());
        let s = room_detail(&e, &r);
        assert!(s.contains("Host: bob"), "{s}");
        assert!(s.contains("1/5"));
        assert!(s.contains("stranger"));
    }

    #[test]
    fn test_month_calendar_marks_busy_day() {
        let e = entry(json!({"room_id": 1, "name": "Algebra", "date": "2024-03-05", "host": "bob"}), Role::Stranger);
        let views = [e.view];
        let groups = group_by_date(&views);
        let grid = MonthGrid::new(2024, 3).unwrap();
        let s = month_calendar(&grid, &groups, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(s.contains("March 2024"));
        assert!(s.contains("  5*"), "{s}");
        assert!(s.contains("Algebra"));
        assert!(s.contains("Host: bob"));
    }

    #[test]
    fn test_month_calendar_unplaced_hint() {
        let e = entry(json!({"date": "2024-04-02"}), Role::Stranger);
        let views = [e.view];
        let groups = group_by_date(&views);
        let grid = MonthGrid::new(2024, 3).unwrap();
        let s = month_calendar(&grid, &groups, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(s.contains("none are dated in this month"));
    }

    #[test]
    fn test_schedule_widget_labels() {
        let e = entry(json!({"name": "Bio", "date": "2024-03-05", "start_time": "09:00"}), Role::Stranger);
        let s = schedule_widget(&[&e.view], NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert!(s.contains("Today"));
        assert!(s.contains("09:00-00:00"));
    }

    #[test]
    fn test_status_line_login_hint() {
        colored::control::set_override(false);
        assert!(status_line(&LoadStatus::LoginRequired).contains("study-rooms login"));
        assert!(status_line(&LoadStatus::Ready).is_empty());
    }
}
