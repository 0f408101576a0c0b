mod domain;
mod export;
mod logging;
mod report;
mod settings;
mod storage;
mod timeparse;
mod tracker;

use std::env;
use std::error::Error;
use std::io;
use std::path::PathBuf;

use chrono::Local;
use clap::{Parser, Subcommand};
use crossterm::style::{Color, Stylize, style};
use crossterm::tty::IsTty;
use log::debug;

use crate::export::ExportFormat;
use crate::logging::init_logging;
use crate::settings::{Settings, resolve_data_dir};
use crate::storage::StoreLock;
use crate::tracker::{EntryChanges, EntryEnd, MemoRequest, Outcome, Tracker};

#[derive(Debug, Parser)]
#[command(name = "track", about = "Command-line time tracker", version)]
struct Cli {
	/// Directory holding the state, log and settings files.
	#[arg(long, global = true)]
	data_dir: Option<PathBuf>,
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Create the data directory and a default settings file.
	Init,
	/// Start tracking a new task (`@alias` names are expanded).
	Start {
		activity: String,
		/// Stop the running task first.
		#[arg(short, long)]
		force: bool,
	},
	/// Stop the current task and log it.
	Stop,
	/// Pause the current task.
	Pause,
	/// Resume the paused task.
	Resume,
	/// Show the current task.
	Status,
	/// Add a note to the active task.
	#[command(alias = "notes")]
	Note { text: String },
	/// Start a new task named after the last logged one.
	Prev,
	/// Add a completed entry after the fact.
	Add {
		activity: String,
		/// Start time, e.g. 'today 10am' or '25-07-2025 14:00'.
		#[arg(long)]
		start: String,
		/// End time, e.g. 'today 11am'.
		#[arg(long, conflicts_with = "duration", required_unless_present = "duration")]
		end: Option<String>,
		/// Duration, e.g. '1h30m' or '45m'.
		#[arg(long = "for", value_name = "DURATION")]
		duration: Option<String>,
	},
	/// Log a task of the given duration that ended just now.
	Backdate { duration: String, activity: String },
	/// Show the entries for a day: 'today', 'yesterday' or DD-MM-YYYY.
	Log {
		#[arg(default_value = "today")]
		when: String,
	},
	/// Remove an entry by its ID within a day.
	Remove {
		id: usize,
		#[arg(long, default_value = "today")]
		when: String,
	},
	/// Change an entry's activity, start or end.
	Edit {
		id: usize,
		#[arg(long, default_value = "today")]
		when: String,
		#[arg(long)]
		activity: Option<String>,
		#[arg(long)]
		start: Option<String>,
		#[arg(long)]
		end: Option<String>,
	},
	/// Export the whole log as CSV or XLSX.
	Export {
		#[arg(long, default_value_t = ExportFormat::Csv)]
		format: ExportFormat,
		#[arg(long)]
		out_dir: Option<PathBuf>,
	},
	/// Manage activity aliases.
	Alias {
		#[command(subcommand)]
		command: AliasCommand,
	},
	/// Save, list or remove memos.
	Memo {
		text: Option<String>,
		#[arg(long, value_name = "ID", conflicts_with_all = ["text", "list"])]
		remove: Option<usize>,
		#[arg(long, conflicts_with = "text")]
		list: bool,
	},
}

#[derive(Debug, Subcommand)]
enum AliasCommand {
	/// Add or update an alias, e.g. `alias add @w "Client work"`.
	Add { alias: String, activity: String },
	Remove { alias: String },
	List,
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn run() -> Result<(), Box<dyn Error>> {
	let cli = Cli::parse();
	let data_dir = resolve_data_dir(cli.data_dir);

	let settings = Settings::load(&data_dir).unwrap_or_else(|err| {
		eprintln!("warning: {err}; using default settings");
		Settings::default()
	});
	let _logger = match init_logging(&settings.log_level(), &data_dir) {
		Ok(handle) => Some(handle),
		Err(err) => {
			eprintln!("warning: logging disabled: {err}");
			None
		}
	};

	let _lock = StoreLock::acquire(&data_dir)?;
	let tracker = Tracker::new(&data_dir);
	let now = Local::now().naive_local();
	debug!("event=command command={:?}", cli.command);

	let outcome = match cli.command {
		Command::Init => {
			if Settings::write_default(&data_dir)? {
				Outcome::ok(format!("initialized timetrack in {}", data_dir.display()))
			} else {
				Outcome::ok(format!("already initialized in {}", data_dir.display()))
			}
		}
		Command::Start { activity, force } => tracker.start(&activity, force, now)?,
		Command::Stop => tracker.stop(now)?,
		Command::Pause => tracker.pause(now)?,
		Command::Resume => tracker.resume(now)?,
		Command::Status => tracker.status(now),
		Command::Note { text } => tracker.add_note(&text)?,
		Command::Prev => tracker.start_previous(now)?,
		Command::Add {
			activity,
			start,
			end,
			duration,
		} => match entry_end(end, duration) {
			Some(end) => tracker.add_entry(&activity, &start, &end, now)?,
			None => Outcome::fail("Error: Provide exactly one of --end or --for."),
		},
		Command::Backdate { duration, activity } => tracker.backdate(&duration, &activity, now)?,
		Command::Log { when } => tracker.get_log(&when, now),
		Command::Remove { id, when } => tracker.remove_entry(&when, id, now)?,
		Command::Edit {
			id,
			when,
			activity,
			start,
			end,
		} => {
			let changes = EntryChanges {
				activity,
				start,
				end,
			};
			tracker.edit_entry(id, &when, &changes, now)?
		}
		Command::Export { format, out_dir } => {
			let out_dir = out_dir.unwrap_or_else(|| settings.export_dir(&data_dir));
			tracker.export(format, &out_dir, now)
		}
		Command::Alias { command } => match command {
			AliasCommand::Add { alias, activity } => tracker.add_alias(&alias, &activity)?,
			AliasCommand::Remove { alias } => tracker.remove_alias(&alias)?,
			AliasCommand::List => tracker.list_aliases(),
		},
		Command::Memo { text, remove, list } => tracker.memo(memo_request(text, remove, list), now)?,
	};

	print_outcome(&outcome);
	Ok(())
}

fn entry_end(end: Option<String>, duration: Option<String>) -> Option<EntryEnd> {
	match (end, duration) {
		(Some(end), None) => Some(EntryEnd::At(end)),
		(None, Some(duration)) => Some(EntryEnd::For(duration)),
		_ => None,
	}
}

fn memo_request(text: Option<String>, remove: Option<usize>, list: bool) -> MemoRequest {
	match (text, remove) {
		(_, Some(index)) => MemoRequest::Remove(index),
		(Some(text), None) if !list => MemoRequest::Add(text),
		_ => MemoRequest::List,
	}
}

/// Failures are shown in red when stdout is a terminal.
fn print_outcome(outcome: &Outcome) {
	let plain = outcome.success || !io::stdout().is_tty() || env::var_os("NO_COLOR").is_some();
	if plain {
		println!("{}", outcome.message);
	} else {
		println!("{}", style(&outcome.message).with(Color::Red));
	}
}
