//! M3U Manager - command line front end
//! Drives the same editor session and plugin menu a graphical shell would.

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{info, warn};

use m3u_manager::config::{self, AppConfig, Section, SharedConfig};
use m3u_manager::menu::{self, MenuEntry};
use m3u_manager::models::ItemFilter;
use m3u_manager::playlist_file;
use m3u_manager::plugins::{PluginContext, PluginRegistry};
use m3u_manager::tree::{GroupId, PlaylistTree};
use m3u_manager::{EditorSession, Error, Result};

#[derive(Parser, Debug)]
#[command(name = "m3u-manager")]
#[command(about = "Edit M3U playlists with nested groups and plugin actions", long_about = None)]
struct Args {
    /// Config file (default: the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Plugin directory (default: the per-user data location)
    #[arg(long, global = true)]
    plugins_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the group tree with channel counts
    Show { file: PathBuf },

    /// Print the rows of one level with their unique ids
    List {
        file: PathBuf,
        /// Group path, `/` separated
        #[arg(long)]
        path: Option<String>,
    },

    /// Load a playlist and save it in the format of the output extension
    Convert { input: PathBuf, output: PathBuf },

    /// Merge a playlist into another
    Merge {
        target: PathBuf,
        import: PathBuf,
        /// Group path to merge into, `/` separated
        #[arg(long)]
        into: Option<String>,
        /// Output file (default: overwrite target)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Manage plugin units
    Plugins {
        #[command(subcommand)]
        command: PluginCommand,
    },

    /// Run a plugin menu action on a playlist
    Run {
        file: PathBuf,
        /// Menu path, e.g. "Legacy Plugins/EPG Data Plugin/Assign All"
        menu_path: String,
        /// Group path to work in, `/` separated
        #[arg(long)]
        path: Option<String>,
        /// Unique ids of the rows to select
        #[arg(long = "select")]
        select: Vec<String>,
        /// Select every row of the level
        #[arg(long, conflicts_with = "select")]
        all: bool,
        /// Output file (default: overwrite input)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
        /// Seconds to wait for background work
        #[arg(long, default_value = "600")]
        timeout: u64,
    },

    /// Switch between the light and dark theme
    Theme,
}

#[derive(Subcommand, Debug)]
enum PluginCommand {
    /// List units and their state
    List,
    /// Enable a unit
    Enable { unit: String },
    /// Disable a unit
    Disable { unit: String },
    /// Install a unit file or archive (.json, .zip, .tar, .tar.gz, .tgz)
    Install {
        source: PathBuf,
        /// Enable the installed units
        #[arg(long)]
        enable: bool,
    },
    /// Print the menu built from the active units
    Menu,
    /// Show or change the settings of a unit
    Settings {
        unit: String,
        /// New values as key=value
        values: Vec<String>,
    },
}

fn split_path(path: Option<&str>) -> Vec<String> {
    path.unwrap_or_default()
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_group(tree: &PlaylistTree, id: GroupId, depth: usize) {
    for &child in tree.child_groups(id) {
        let name = tree.group_name(child).unwrap_or_default();
        println!(
            "{}{} ({} channels)",
            "  ".repeat(depth),
            name,
            tree.channels_under(child).len()
        );
        print_group(tree, child, depth + 1);
    }
}

fn print_notices(session: &mut EditorSession) {
    for notice in session.take_notices() {
        eprintln!("[{}] {}", notice.title, notice.message);
    }
}

fn open_at(session: &mut EditorSession, file: &Path, path: &[String]) -> Result<()> {
    session.open(file)?;
    for key in path {
        session.open_group(key)?;
    }
    Ok(())
}

fn registry(shared: &SharedConfig, plugins_dir: Option<&Path>) -> Result<PluginRegistry> {
    let directory = match plugins_dir {
        Some(dir) => dir.to_path_buf(),
        None => config::plugins_dir()?,
    };
    let ctx = PluginContext::new(shared.clone(), config::cache_dir());
    let mut registry = PluginRegistry::new(ctx, &directory);
    registry.load();
    Ok(registry)
}

fn run_plugins(command: PluginCommand, shared: &SharedConfig, plugins_dir: Option<&Path>) -> Result<()> {
    let mut registry = registry(shared, plugins_dir)?;
    match command {
        PluginCommand::List => {
            for unit in registry.units() {
                println!(
                    "{:<8} {:<16} {}",
                    if unit.active { "ACTIVE" } else { "INACTIVE" },
                    unit.unit,
                    unit.name
                );
            }
        }
        PluginCommand::Enable { unit } => registry.toggle(&unit, true)?,
        PluginCommand::Disable { unit } => registry.toggle(&unit, false)?,
        PluginCommand::Install { source, enable } => {
            let units = if enable {
                registry.install_and_enable(&source)?
            } else {
                registry.install(&source)?
            };
            println!("Installed units: {}", units.join(", "));
        }
        PluginCommand::Menu => {
            for line in menu::build_menu(&registry).outline() {
                println!("{}", line);
            }
        }
        PluginCommand::Settings { unit, values } => {
            if !values.is_empty() {
                let mut updates = Section::new();
                for pair in values {
                    let (key, value) = pair.split_once('=').ok_or_else(|| {
                        Error::Validation(format!("Expected key=value, got '{}'", pair))
                    })?;
                    updates.insert(key.trim().to_string(), value.to_string());
                }
                registry.apply_settings(&unit, &updates)?;
            }
            match registry.open_settings(&unit)? {
                Some(settings) => {
                    for (key, value) in settings {
                        println!("{} = {}", key, value);
                    }
                }
                None => println!("{} has no settings", unit),
            }
        }
    }
    Ok(())
}

fn run(args: Args, shared: SharedConfig) -> Result<()> {
    let plugins_dir = args.plugins_dir.as_deref();
    match args.command {
        Command::Show { file } => {
            let tree = playlist_file::load_file(&file)?;
            println!("{} ({} channels)", file.display(), tree.channel_count());
            print_group(&tree, tree.root(), 1);
        }
        Command::List { file, path } => {
            let mut session = EditorSession::new(shared);
            open_at(&mut session, &file, &split_path(path.as_deref()))?;
            for item in session.items() {
                println!("{:?}\t{}\t{}", item.kind, item.unique_id, item.display_name);
            }
        }
        Command::Convert { input, output } => {
            let tree = playlist_file::load_file(&input)?;
            let written = playlist_file::save_file(&output, &tree)?;
            println!("Wrote {}", written.display());
        }
        Command::Merge {
            target,
            import,
            into,
            output,
        } => {
            let mut session = EditorSession::new(shared);
            open_at(&mut session, &target, &split_path(into.as_deref()))?;
            let keys = session.import_file(&import)?;
            if !keys.is_empty() {
                info!("Merged groups: {}", keys.join(", "));
            }
            let written = session.save_as(output.as_deref().unwrap_or(target.as_path()))?;
            println!("Wrote {}", written.display());
        }
        Command::Plugins { command } => run_plugins(command, &shared, plugins_dir)?,
        Command::Run {
            file,
            menu_path,
            path,
            select,
            all,
            output,
            timeout,
        } => {
            let mut registry = registry(&shared, plugins_dir)?;
            let mut session = EditorSession::new(shared);
            open_at(&mut session, &file, &split_path(path.as_deref()))?;

            if all {
                session.select_items(true, ItemFilter::All);
            }
            for uid in &select {
                if !session.toggle_selected(uid) {
                    warn!("No row with unique id '{}'", uid);
                }
            }

            let menu = menu::build_menu(&registry);
            let labels = split_path(Some(&menu_path));
            let handle = match menu.find(&labels[..]) {
                Some(MenuEntry::Action(handle)) => handle.clone(),
                _ => return Err(Error::NotFound(format!("menu action '{}'", menu_path))),
            };
            registry.invoke(&handle, &mut session)?;
            session.pump_until_idle(Duration::from_secs(timeout));
            print_notices(&mut session);

            let written = session.save_as(output.as_deref().unwrap_or(file.as_path()))?;
            println!("Wrote {}", written.display());
        }
        Command::Theme => {
            let mut session = EditorSession::new(shared);
            let theme = session.toggle_theme()?;
            println!("Theme: {:?}", theme);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let app_config = match &args.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let shared = config::shared(app_config);

    let operation = format!("{:?}", args.command)
        .split([' ', '{', '('])
        .next()
        .unwrap_or_default()
        .to_string();
    match run(args, shared) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} failed: {}", operation, e);
            ExitCode::FAILURE
        }
    }
}
