use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use clap::{CommandFactory, Parser};
use colored::*;
use uuid::Uuid;

use study_rooms::calendar::{group_by_date, upcoming, MonthGrid};
use study_rooms::cli::{parse_month, Args, Command};
use study_rooms::client::RoomApiBuilder;
use study_rooms::config::ClientConfig;
use study_rooms::dashboard::{Dashboard, RoomEntry};
use study_rooms::discussion::DiscussionBoard;
use study_rooms::error::{Result, StudyRoomError};
use study_rooms::listing::{all_tags, matches_query, matches_tags, sections};
use study_rooms::model::{RoomId, RoomPayload};
use study_rooms::normalize::DEFAULT_HOST;
use study_rooms::observability::init_tracing;
use study_rooms::render;
use study_rooms::roster::{load_overrides, roster, set_override, ParticipantOverride};
use study_rooms::session::{CurrentUser, Session};
use study_rooms::storage::{SharedStore, SqliteStore};

/// Exit status when no credential is stored.
const EXIT_LOGIN_REQUIRED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Command::Completions { shell } = args.command {
        let mut cmd = Args::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(StudyRoomError::AuthMissing) => {
            eprintln!(
                "{}",
                "Not signed in. Run `study-rooms login` first.".bright_yellow()
            );
            ExitCode::from(EXIT_LOGIN_REQUIRED)
        }
        Err(e) => {
            eprintln!("{} {}", "error:".bright_red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = ClientConfig::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    init_tracing(&config.log_level);

    let store: SharedStore = Arc::new(SqliteStore::open(&config.storage_path)?);
    let api = RoomApiBuilder::from_config(config.api_config()).build();
    let dashboard = Dashboard::new(api, Arc::clone(&store));
    let today = Local::now().date_naive();

    match args.command {
        Command::Login {
            token,
            user_id,
            username,
            email,
        } => {
            let session = Session::save(store.as_ref(), &token, &CurrentUser::new(user_id, username, email))?;
            if let Some(user) = session.user {
                println!("{} {}", "Signed in as".bright_green(), user.username.bold());
            }
        }
        Command::Logout => {
            Session::clear(store.as_ref())?;
            println!("{}", "Signed out.".bright_green());
        }
        Command::Whoami => {
            let session = Session::load(store.as_ref())?;
            session.require_token()?;
            match session.user {
                Some(u) => println!("{} <{}> (id {})", u.username.bold(), u.email, u.id),
                None => println!("{}", "Credential stored, identity unknown.".bright_yellow()),
            }
        }
        Command::Rooms {
            search,
            tag,
            mine,
            joined,
            all,
        } => {
            dashboard.refresh().await?;
            let state = dashboard.snapshot();
            let keep = |e: &RoomEntry| {
                search.as_deref().map_or(true, |q| matches_query(&e.view, q)) && matches_tags(&e.view, &tag)
            };
            if mine || joined {
                let user = Session::load(store.as_ref())?.user;
                let split = sections(&state.rooms, user.as_ref());
                let mut section = if mine { split.created } else { split.joined };
                section.rooms.retain(|e| keep(e));
                print!("{}", render::section(&section, all));
            } else {
                let shown: Vec<&RoomEntry> = state.rooms.iter().filter(|e| keep(e)).collect();
                print!("{}", render::room_list(&shown));
                let tags = all_tags(&state.rooms);
                if !tags.is_empty() {
                    println!("{} {}", "Tags:".bright_blue(), tags.join(", "));
                }
            }
        }
        Command::Show { id } => {
            let id = RoomId::new(id);
            let entry = load_room(&dashboard, &id).await?;
            let user = Session::load(store.as_ref())?.user;
            let overrides = load_overrides(store.as_ref())?;
            let r = roster(&entry.view, user.as_ref(), &overrides);
            print!("{}", render::room_detail(&entry, &r));
        }
        Command::Join { id } => {
            let id = RoomId::new(id);
            load_room(&dashboard, &id).await?;
            dashboard.join(&id)?;
            report(&dashboard, &id, "Joined");
        }
        Command::Leave { id } => {
            let id = RoomId::new(id);
            load_room(&dashboard, &id).await?;
            dashboard.leave(&id)?;
            report(&dashboard, &id, "Left");
        }
        Command::Delete { id } => {
            let id = RoomId::new(id);
            let entry = load_room(&dashboard, &id).await?;
            dashboard.delete(&id).await?;
            println!("{} {}", "Deleted".bright_green(), entry.view.name.bold());
        }
        Command::Create(fields) => {
            let payload = fields.apply_to(RoomPayload::default())?;
            let entry = dashboard.create(&payload).await?;
            println!("{}", "Room created.".bright_green());
            print!("{}", render::room_card(&entry));
        }
        Command::Edit { id, fields } => {
            let id = RoomId::new(id);
            let current = load_room(&dashboard, &id).await?;
            let payload = fields.apply_to(current.view.to_payload())?;
            payload.validate()?;
            let entry = dashboard.save_edit(&id, &payload).await?;
            println!("{}", "Room updated.".bright_green());
            print!("{}", render::room_card(&entry));
        }
        Command::Presence {
            id,
            status,
            participant,
            name,
            avatar,
        } => {
            let participant = match participant {
                Some(p) => p,
                None => Session::load(store.as_ref())?
                    .user
                    .map(|u| u.id)
                    .ok_or(StudyRoomError::AuthMissing)?,
            };
            let value = ParticipantOverride {
                name,
                avatar,
                status: Some(status),
            };
            set_override(store.as_ref(), &RoomId::new(id), &participant, value)?;
            println!("{} {} is {}", "Saved.".bright_green(), participant, status);
        }
        Command::Calendar { month } => {
            let grid = match month {
                Some(m) => {
                    let (year, month) = parse_month(&m)?;
                    MonthGrid::new(year, month)?
                }
                None => MonthGrid::containing(today)?,
            };
            dashboard.refresh().await?;
            let state = dashboard.snapshot();
            let groups = group_by_date(state.rooms.iter().map(|e| &e.view));
            print!("{}", render::month_calendar(&grid, &groups, today));
        }
        Command::Schedule { limit } => {
            dashboard.refresh().await?;
            let state = dashboard.snapshot();
            let rooms = upcoming(state.rooms.iter().map(|e| &e.view), today, limit);
            print!("{}", render::schedule_widget(&rooms, today));
        }
        Command::Threads => {
            let threads = DiscussionBoard::new(store.as_ref()).threads()?;
            print!("{}", render::thread_list(&threads));
        }
        Command::Thread { id } => {
            let id = parse_thread_id(&id)?;
            let thread = DiscussionBoard::new(store.as_ref())
                .thread(id)?
                .ok_or_else(|| StudyRoomError::Invalid(format!("no thread {id}")))?;
            print!("{}", render::thread_detail(&thread));
        }
        Command::Post { title, subject, body } => {
            let author = author(&store)?;
            let thread = DiscussionBoard::new(store.as_ref()).post_thread(&author, &title, &subject, &body)?;
            println!("{} {}", "Posted thread".bright_green(), thread.id);
        }
        Command::Reply { id, text } => {
            let id = parse_thread_id(&id)?;
            let author = author(&store)?;
            DiscussionBoard::new(store.as_ref()).reply(id, &author, &text)?;
            println!("{}", "Reply posted.".bright_green());
        }
        Command::Completions { .. } => {}
    }
    Ok(())
}

/// Refresh and look up one room; unknown ids are an error.
async fn load_room(dashboard: &Dashboard, id: &RoomId) -> Result<RoomEntry> {
    dashboard.refresh().await?;
    dashboard
        .snapshot()
        .room(id)
        .cloned()
        .ok_or_else(|| StudyRoomError::Invalid(format!("unknown room {id}")))
}

fn report(dashboard: &Dashboard, id: &RoomId, verb: &str) {
    if let Some(entry) = dashboard.snapshot().room(id) {
        println!("{} {}", verb.bright_green(), entry.view.name.bold());
        print!("{}", render::room_card(entry));
    }
}

fn author(store: &SharedStore) -> Result<String> {
    Ok(Session::load(store.as_ref())?
        .user
        .map(|u| u.username)
        .unwrap_or_else(|| DEFAULT_HOST.to_string()))
}

fn parse_thread_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| StudyRoomError::Invalid(format!("thread id {s:?} is not a UUID")))
}
