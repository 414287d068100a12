use std::path::PathBuf;

use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};

/// What the program was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Find the candidates and record them in the store
    Discover,
    /// Select, fetch and assemble from the recorded candidates
    Assemble { yes: bool },
    /// Discover then assemble
    Run { yes: bool },
    /// Show the ranked candidates of the store
    List,
}

/// Settings given on the command line, taking precedence over any other source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub cache: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub budget: Option<f64>,
    pub channels: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub config: Option<PathBuf>,
    pub verbose: u8,
    pub quiet: bool,
    pub action: Action,
    pub overrides: Overrides,
}

/// Parse the process arguments, exiting on error or help
pub fn parse() -> Args {
    Args::from_matches(&build().get_matches())
}

fn channels_arg() -> Arg {
    Arg::new("channels")
        .value_name("CHANNEL")
        .num_args(1..)
        .action(ArgAction::Append)
        .help("Channel names or URLs to look for clips in. Replaces the configured channels")
}

fn budget_arg() -> Arg {
    Arg::new("budget")
        .long("budget")
        .value_name("SECS")
        .value_parser(value_parser!(f64))
        .help("Target runtime of the output video, in seconds")
}

fn yes_arg() -> Arg {
    Arg::new("yes")
        .long("yes")
        .short('y')
        .action(ArgAction::SetTrue)
        .help("Do not wait for the manual check of the fetched clips")
}

fn path_arg(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .value_name("PATH")
        .value_parser(value_parser!(PathBuf))
        .global(true)
        .help(help)
}

/// Build the command line interface
pub fn build() -> Command {
    command!()
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Configuration file [default: ./clipreel.toml if it exists]"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Log more details, twice for even more"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .action(ArgAction::SetTrue)
                .global(true)
                .conflicts_with("verbose")
                .help("Only log warnings and errors"),
        )
        .arg(path_arg("cache", "cache", "Candidate store database"))
        .arg(path_arg("work_dir", "work-dir", "Directory for the fetched clips, emptied at each run"))
        .arg(path_arg("out_dir", "out-dir", "Directory for the output video"))
        .subcommand(
            Command::new("discover")
                .about("Look for recent popular clips and record them as candidates")
                .arg(channels_arg()),
        )
        .subcommand(
            Command::new("assemble")
                .about("Fetch the most viewed recorded candidates and assemble them")
                .arg(budget_arg())
                .arg(yes_arg()),
        )
        .subcommand(
            Command::new("run")
                .about("Discover then assemble")
                .arg(budget_arg())
                .arg(yes_arg())
                .arg(channels_arg()),
        )
        .subcommand(Command::new("list").about("Show the recorded candidates, most viewed first"))
}

impl Args {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let path = |id| matches.get_one::<PathBuf>(id).cloned();

        let mut overrides = Overrides {
            cache: path("cache"),
            work_dir: path("work_dir"),
            out_dir: path("out_dir"),
            ..Overrides::default()
        };

        let yes = |sub: &ArgMatches| sub.get_flag("yes");
        let action = match matches.subcommand() {
            Some(("discover", sub)) => {
                overrides.channels = channels(sub);
                Action::Discover
            }
            Some(("assemble", sub)) => {
                overrides.budget = sub.get_one::<f64>("budget").copied();
                Action::Assemble { yes: yes(sub) }
            }
            Some(("run", sub)) => {
                overrides.budget = sub.get_one::<f64>("budget").copied();
                overrides.channels = channels(sub);
                Action::Run { yes: yes(sub) }
            }
            _ => Action::List,
        };

        Self {
            config: path("config"),
            verbose: matches.get_count("verbose"),
            quiet: matches.get_flag("quiet"),
            action,
            overrides,
        }
    }
}

fn channels(matches: &ArgMatches) -> Option<Vec<String>> {
    matches
        .get_many::<String>("channels")
        .map(|values| values.cloned().collect())
}
